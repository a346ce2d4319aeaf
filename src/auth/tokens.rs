//! Credential storage types

use std::fmt;

use serde::{Deserialize, Serialize};

/// Refresh when less than this many seconds remain.
pub const REFRESH_MARGIN_SECS: i64 = 5 * 60;
/// Lifetime assumed when the token endpoint omits `expires_in`.
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 60 * 60;
/// Soft lifetime of an imported session cookie. The provider does not expose the real one.
pub const COOKIE_SOFT_LIFETIME_SECS: i64 = 30 * 24 * 60 * 60;
/// Warn about cookie expiry when less than this remains.
pub const COOKIE_WARNING_SECS: i64 = 3 * 24 * 60 * 60;

/// Current unix time in seconds
pub fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Token pair returned by a successful code exchange or refresh.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
    pub scope: Option<String>,
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// Stored OAuth access token
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_at: i64,
    #[serde(default)]
    pub scope: Option<String>,
}

impl OAuthToken {
    /// Build a stored token from a grant. The previous refresh token is kept
    /// when the provider does not rotate it.
    pub fn from_grant(grant: TokenGrant, previous_refresh: Option<String>, now: i64) -> Self {
        let lifetime = grant
            .expires_in
            .and_then(|secs| i64::try_from(secs).ok())
            .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);

        Self {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token.or(previous_refresh),
            expires_at: now + lifetime,
            scope: grant.scope,
        }
    }

    pub fn needs_refresh(&self, now: i64) -> bool {
        self.expires_at - now < REFRESH_MARGIN_SECS
    }

    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

impl fmt::Debug for OAuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthToken")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Stored session cookie
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCookie {
    pub cookie: String,
    /// Soft expiry, used only for the user-facing warning.
    pub expires_at: i64,
}

impl SessionCookie {
    pub fn new(cookie: String, now: i64) -> Self {
        Self {
            cookie,
            expires_at: now + COOKIE_SOFT_LIFETIME_SECS,
        }
    }

    pub fn expires_soon(&self, now: i64) -> bool {
        self.expires_at - now < COOKIE_WARNING_SECS
    }
}

impl fmt::Debug for SessionCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCookie")
            .field("cookie", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Whatever identifies the user to a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credential {
    Oauth(OAuthToken),
    Session(SessionCookie),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(refresh: Option<&str>, expires_in: Option<u64>) -> TokenGrant {
        TokenGrant {
            access_token: "new-access".to_string(),
            refresh_token: refresh.map(String::from),
            expires_in,
            scope: None,
        }
    }

    #[test]
    fn test_from_grant_keeps_previous_refresh_token() {
        let token = OAuthToken::from_grant(grant(None, Some(3600)), Some("old-rt".into()), 1_000);
        assert_eq!(token.refresh_token.as_deref(), Some("old-rt"));
        assert_eq!(token.expires_at, 4_600);
    }

    #[test]
    fn test_from_grant_rotates_refresh_token() {
        let token =
            OAuthToken::from_grant(grant(Some("new-rt"), Some(60)), Some("old-rt".into()), 1_000);
        assert_eq!(token.refresh_token.as_deref(), Some("new-rt"));
    }

    #[test]
    fn test_from_grant_without_expiry_uses_default_lifetime() {
        let token = OAuthToken::from_grant(grant(None, None), None, 0);
        assert_eq!(token.expires_at, DEFAULT_TOKEN_LIFETIME_SECS);
    }

    #[test]
    fn test_refresh_margin() {
        let token = OAuthToken {
            access_token: "a".into(),
            refresh_token: None,
            expires_at: 1_000,
            scope: None,
        };
        assert!(!token.needs_refresh(1_000 - 301));
        assert!(token.needs_refresh(1_000 - 299));
        assert!(!token.is_expired(999));
        assert!(token.is_expired(1_000));
    }

    #[test]
    fn test_cookie_soft_expiry() {
        let cookie = SessionCookie::new("SAPISID=abc".into(), 0);
        assert_eq!(cookie.expires_at, COOKIE_SOFT_LIFETIME_SECS);
        assert!(!cookie.expires_soon(0));
        assert!(cookie.expires_soon(COOKIE_SOFT_LIFETIME_SECS - 60));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let cred = Credential::Oauth(OAuthToken {
            access_token: "secret-access".into(),
            refresh_token: Some("secret-refresh".into()),
            expires_at: 10,
            scope: None,
        });
        let printed = format!("{:?}", cred);
        assert!(!printed.contains("secret-access"));
        assert!(!printed.contains("secret-refresh"));
    }
}

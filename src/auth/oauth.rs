//! OAuth2 authorization-code flow with PKCE, plus token refresh

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use oauth2::{
    basic::BasicClient, AuthUrl, AuthorizationCode, ClientId, PkceCodeVerifier, RedirectUrl,
    RefreshToken, TokenResponse, TokenUrl,
};
use url::Url;

use super::callback::{read_callback, CallbackResult};
use super::pending::{PendingAuthorization, PendingStore};
use super::pkce;
use super::tokens::{now_secs, Credential, OAuthToken, TokenGrant};
use super::OAuthConfig;
use crate::models::ProviderKind;
use crate::settings::ExtensionSettings;

/// Token endpoint of an OAuth provider
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// `grant_type=authorization_code` with the PKCE verifier.
    async fn exchange_code(&self, client_id: &str, code: &str, verifier: &str)
        -> Result<TokenGrant>;

    /// `grant_type=refresh_token`.
    async fn refresh(&self, client_id: &str, refresh_token: &str) -> Result<TokenGrant>;
}

/// Token endpoint reached over HTTP with the `oauth2` crate.
pub struct OAuthEndpoint {
    config: OAuthConfig,
}

impl OAuthEndpoint {
    pub fn new(config: OAuthConfig) -> Self {
        Self { config }
    }
}

/// Build the OAuth2 client for a public (secretless) client id
fn build_client(config: &OAuthConfig, client_id: &str) -> Result<BasicClient> {
    let auth_url = AuthUrl::new(config.authorize_url.clone())?;
    let token_url = TokenUrl::new(config.token_url.clone())?;
    let redirect_url = RedirectUrl::new(config.redirect_uri.clone())?;

    Ok(
        BasicClient::new(ClientId::new(client_id.to_string()), None, auth_url, Some(token_url))
            .set_redirect_uri(redirect_url),
    )
}

fn grant_from<T: TokenResponse<oauth2::basic::BasicTokenType>>(resp: &T) -> TokenGrant {
    TokenGrant {
        access_token: resp.access_token().secret().to_string(),
        refresh_token: resp.refresh_token().map(|t| t.secret().to_string()),
        expires_in: resp.expires_in().map(|d| d.as_secs()),
        scope: resp.scopes().map(|scopes| {
            scopes
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        }),
    }
}

#[async_trait]
impl TokenEndpoint for OAuthEndpoint {
    async fn exchange_code(
        &self,
        client_id: &str,
        code: &str,
        verifier: &str,
    ) -> Result<TokenGrant> {
        let client = build_client(&self.config, client_id)?;
        tracing::debug!("Exchanging authorization code at {}", self.config.token_url);

        let resp = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(verifier.to_string()))
            .request_async(oauth2::reqwest::async_http_client)
            .await
            .context("Failed to exchange authorization code")?;

        Ok(grant_from(&resp))
    }

    async fn refresh(&self, client_id: &str, refresh_token: &str) -> Result<TokenGrant> {
        let client = build_client(&self.config, client_id)?;
        tracing::debug!("Refreshing access token at {}", self.config.token_url);

        let resp = client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(oauth2::reqwest::async_http_client)
            .await
            .context("Failed to refresh access token")?;

        Ok(grant_from(&resp))
    }
}

/// Outcome of processing a redirect-back URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// No callback for this extension, or no pending verifier. Nothing changed.
    NoCallback,
    Authorized,
    /// The user declined at the provider. Nothing changed.
    Denied(String),
    /// The code exchange failed. The pending verifier is gone, prior credential kept.
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    NotNeeded,
    Refreshed,
    Failed,
}

/// Establishes and maintains an OAuth credential for one provider.
pub struct Authenticator {
    kind: ProviderKind,
    config: OAuthConfig,
    endpoint: Arc<dyn TokenEndpoint>,
    pending: Arc<dyn PendingStore>,
}

impl Authenticator {
    pub fn new(
        kind: ProviderKind,
        config: OAuthConfig,
        endpoint: Arc<dyn TokenEndpoint>,
        pending: Arc<dyn PendingStore>,
    ) -> Self {
        Self {
            kind,
            config,
            endpoint,
            pending,
        }
    }

    /// Start an authorization: store a fresh verifier and return the URL the
    /// user agent must visit. Overwrites any earlier pending attempt.
    pub fn begin_authorization(&self, client_id: &str) -> Result<Url> {
        let verifier = pkce::generate_verifier()?;
        let challenge = pkce::challenge_for(&verifier);
        let scope = self.config.scopes.join(" ");

        let url = Url::parse_with_params(
            &self.config.authorize_url,
            &[
                ("response_type", "code"),
                ("client_id", client_id),
                ("scope", scope.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("code_challenge_method", "S256"),
                ("code_challenge", challenge.as_str()),
                ("state", self.kind.module_name()),
            ],
        )
        .context("Invalid authorize URL")?;

        self.pending.put(
            self.kind,
            PendingAuthorization {
                verifier,
                created_at: now_secs(),
            },
        )?;

        tracing::info!("Authorization started for {}", self.kind);
        Ok(url)
    }

    /// Process a redirect-back URL. Only the code exchange touches the network.
    pub async fn complete_authorization(
        &self,
        settings: &mut ExtensionSettings,
        callback: &Url,
    ) -> Result<CompletionOutcome> {
        let result = match read_callback(callback, self.kind.module_name()) {
            Some(result) => result,
            None => return Ok(CompletionOutcome::NoCallback),
        };
        let pending = match self.pending.get(self.kind)? {
            Some(pending) => pending,
            None => {
                tracing::debug!("Callback for {} without a pending verifier", self.kind);
                return Ok(CompletionOutcome::NoCallback);
            }
        };
        if settings.client_id.is_empty() {
            return Ok(CompletionOutcome::NoCallback);
        }

        let code = match result {
            CallbackResult::Code(code) => code,
            CallbackResult::Denied(reason) => {
                self.pending.remove(self.kind)?;
                tracing::info!("{} authorization declined: {}", self.kind, reason);
                return Ok(CompletionOutcome::Denied(reason));
            }
        };

        let exchanged = self
            .endpoint
            .exchange_code(&settings.client_id, &code, &pending.verifier)
            .await;
        self.pending.remove(self.kind)?;

        match exchanged {
            Ok(grant) => {
                settings.credential = Some(Credential::Oauth(OAuthToken::from_grant(
                    grant,
                    None,
                    now_secs(),
                )));
                tracing::info!("Authorization complete for {}", self.kind);
                Ok(CompletionOutcome::Authorized)
            }
            Err(e) => {
                tracing::warn!("Code exchange failed for {}: {:#}", self.kind, e);
                Ok(CompletionOutcome::Failed(format!("{:#}", e)))
            }
        }
    }

    /// Refresh the stored token when less than five minutes remain.
    ///
    /// On failure the stale token is left in place.
    pub async fn refresh_if_needed(&self, settings: &mut ExtensionSettings) -> RefreshOutcome {
        let token = match &settings.credential {
            Some(Credential::Oauth(token)) => token.clone(),
            _ => return RefreshOutcome::NotNeeded,
        };
        if !token.needs_refresh(now_secs()) {
            return RefreshOutcome::NotNeeded;
        }

        let refresh_token = match token.refresh_token {
            Some(rt) => rt,
            None => {
                tracing::warn!("{} token expiring and no refresh token stored", self.kind);
                return RefreshOutcome::Failed;
            }
        };
        if settings.client_id.is_empty() {
            tracing::warn!("{} token expiring but no client id configured", self.kind);
            return RefreshOutcome::Failed;
        }

        tracing::info!("Refreshing {} token...", self.kind);
        match self
            .endpoint
            .refresh(&settings.client_id, &refresh_token)
            .await
        {
            Ok(grant) => {
                settings.credential = Some(Credential::Oauth(OAuthToken::from_grant(
                    grant,
                    Some(refresh_token),
                    now_secs(),
                )));
                tracing::info!("{} token refreshed", self.kind);
                RefreshOutcome::Refreshed
            }
            Err(e) => {
                tracing::warn!("{} token refresh failed: {:#}", self.kind, e);
                RefreshOutcome::Failed
            }
        }
    }

    /// Pending authorization, if one is in flight.
    pub fn pending(&self) -> Result<Option<PendingAuthorization>> {
        self.pending.get(self.kind)
    }
}

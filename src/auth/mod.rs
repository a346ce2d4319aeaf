//! Authentication for music providers
//!
//! Spotify uses the OAuth2 authorization-code flow with PKCE and refreshes its
//! access token shortly before expiry. YouTube Music authenticates with a
//! browser session cookie that is validated once before it is stored.

pub mod callback;
pub mod cookie;
pub mod oauth;
pub mod pending;
pub mod pkce;
pub mod tokens;

pub use oauth::{Authenticator, CompletionOutcome, OAuthEndpoint};
pub use pending::FilePendingStore;
pub use tokens::{now_secs, Credential, SessionCookie};

/// OAuth2 endpoints and client registration for a provider
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub authorize_url: String,
    pub token_url: String,
    /// Redirect URI registered with the provider
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

impl OAuthConfig {
    /// Spotify accounts service
    pub fn spotify(redirect_uri: &str) -> Self {
        Self {
            authorize_url: "https://accounts.spotify.com/authorize".to_string(),
            token_url: "https://accounts.spotify.com/api/token".to_string(),
            redirect_uri: redirect_uri.to_string(),
            scopes: [
                "user-read-private",
                "user-read-currently-playing",
                "user-read-playback-state",
                "user-modify-playback-state",
                "user-top-read",
                "user-read-recently-played",
                "playlist-read-private",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

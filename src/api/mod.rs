//! Remote music service adapters
//!
//! Every provider exposes the same request surface ([`MusicService`]) and the
//! same lifecycle hooks ([`Provider`]). The injector and the tools only see
//! these traits.

pub mod client;
pub mod ids;
pub mod spotify;
pub mod ytmusic;

use async_trait::async_trait;

use crate::host::Host;
use crate::models::{
    ControlOutcome, ItemSummary, NowPlaying, PlaylistSummary, ProviderKind, SearchKind, TimeRange,
};
use crate::settings::ExtensionSettings;
use crate::tools::ToolKey;

pub use spotify::SpotifyProvider;
pub use ytmusic::YtMusicProvider;

/// Errors from a provider API call
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not authorized by the provider; log in again")]
    Unauthorized,

    #[error("HTTP {status} for {url}: {body}")]
    Http {
        status: u16,
        url: String,
        body: String,
    },

    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected response from {url}: {detail}")]
    Malformed { url: String, detail: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Unsupported(String),
}

impl ApiError {
    pub fn network(url: &str, source: reqwest::Error) -> Self {
        ApiError::Network {
            url: url.to_string(),
            source,
        }
    }

    pub fn malformed(url: &str, detail: impl Into<String>) -> Self {
        ApiError::Malformed {
            url: url.to_string(),
            detail: detail.into(),
        }
    }
}

/// Request surface of one authenticated provider session.
///
/// Each call is independent and read-only apart from `control_playback`,
/// which acts on the remote player and never on local state.
#[async_trait]
pub trait MusicService: Send + Sync {
    /// Display name of the signed-in account.
    async fn profile_name(&self) -> Result<String, ApiError>;

    async fn currently_playing(&self) -> Result<NowPlaying, ApiError>;

    async fn search(&self, query: &str, kind: SearchKind) -> Result<Vec<ItemSummary>, ApiError>;

    async fn top_items(&self, range: TimeRange) -> Result<Vec<ItemSummary>, ApiError>;

    async fn recent_items(&self, limit: u32) -> Result<Vec<ItemSummary>, ApiError>;

    async fn playlists(&self) -> Result<Vec<PlaylistSummary>, ApiError>;

    async fn playlist_items(&self, playlist: &str) -> Result<Vec<ItemSummary>, ApiError>;

    async fn control_playback(
        &self,
        action: crate::models::PlaybackAction,
        target: Option<&str>,
    ) -> Result<ControlOutcome, ApiError>;
}

/// Capability set of a provider: credential upkeep, service construction,
/// and which tools it can back.
#[async_trait]
pub trait Provider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn supported_tools(&self) -> &'static [ToolKey];

    /// Provider-specific preconditions beyond a stored credential.
    fn is_configured(&self, settings: &ExtensionSettings) -> bool;

    /// Bring the stored credential up to date before it is used.
    async fn refresh_credential(&self, settings: &mut ExtensionSettings, host: &dyn Host);

    /// Service bound to the stored credential, or `None` if there is no usable one.
    fn service(&self, settings: &ExtensionSettings) -> Option<Box<dyn MusicService>>;
}

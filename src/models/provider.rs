//! Music provider identity

use std::fmt;

use serde::{Deserialize, Serialize};

/// A remote music provider the extension can read from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
pub enum ProviderKind {
    #[serde(rename = "spotify")]
    #[value(name = "spotify")]
    Spotify,
    #[serde(rename = "ytmusic")]
    #[value(name = "ytmusic")]
    YouTubeMusic,
}

impl ProviderKind {
    /// Key of this provider's settings table in the host's settings bag.
    pub fn module_name(self) -> &'static str {
        match self {
            ProviderKind::Spotify => "spotify",
            ProviderKind::YouTubeMusic => "ytmusic",
        }
    }

    /// Identifier of the injected prompt slot.
    pub fn inject_id(self) -> &'static str {
        match self {
            ProviderKind::Spotify => "spotify_inject",
            ProviderKind::YouTubeMusic => "ytmusic_inject",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ProviderKind::Spotify => "Spotify",
            ProviderKind::YouTubeMusic => "YouTube Music",
        }
    }

    /// Prefix for function tool names (`SpotifySearchTracks`, ...).
    pub fn tool_prefix(self) -> &'static str {
        match self {
            ProviderKind::Spotify => "Spotify",
            ProviderKind::YouTubeMusic => "YouTubeMusic",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.module_name())
    }
}

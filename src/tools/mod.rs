//! Function tools exposed to the host's LLM integration
//!
//! [`sync`] mirrors the per-tool settings flags into the host registry.
//! Tool actions never fail: errors come back as displayable text.

pub mod schema;

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::{ApiError, MusicService};
use crate::extension::Extension;
use crate::models::{NowPlaying, PlaybackAction, ProviderKind, SearchKind, TimeRange};
use crate::settings::ExtensionSettings;

const DEFAULT_RECENT_LIMIT: u32 = 20;
const MAX_RECENT_LIMIT: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKey {
    SearchTracks,
    ControlPlayback,
    GetCurrentTrack,
    GetTopTracks,
    GetRecentTracks,
    GetPlaylists,
    GetPlaylistTracks,
}

impl ToolKey {
    pub const ALL: [ToolKey; 7] = [
        ToolKey::SearchTracks,
        ToolKey::ControlPlayback,
        ToolKey::GetCurrentTrack,
        ToolKey::GetTopTracks,
        ToolKey::GetRecentTracks,
        ToolKey::GetPlaylists,
        ToolKey::GetPlaylistTracks,
    ];

    pub fn enabled_in(self, settings: &ExtensionSettings) -> bool {
        match self {
            ToolKey::SearchTracks => settings.search_tracks,
            ToolKey::ControlPlayback => settings.control_playback,
            ToolKey::GetCurrentTrack => settings.get_current_track,
            ToolKey::GetTopTracks => settings.get_top_tracks,
            ToolKey::GetRecentTracks => settings.get_recent_tracks,
            ToolKey::GetPlaylists => settings.get_playlists,
            ToolKey::GetPlaylistTracks => settings.get_playlist_tracks,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            ToolKey::SearchTracks => "SearchTracks",
            ToolKey::ControlPlayback => "ControlPlayback",
            ToolKey::GetCurrentTrack => "GetCurrentTrack",
            ToolKey::GetTopTracks => "GetTopTracks",
            ToolKey::GetRecentTracks => "GetRecentTracks",
            ToolKey::GetPlaylists => "GetPlaylists",
            ToolKey::GetPlaylistTracks => "GetPlaylistTracks",
        }
    }

    pub fn tool_name(self, kind: ProviderKind) -> String {
        format!("{}{}", kind.tool_prefix(), self.suffix())
    }

    pub fn display_name(self, kind: ProviderKind) -> String {
        let action = match self {
            ToolKey::SearchTracks => "Search Tracks",
            ToolKey::ControlPlayback => "Control Playback",
            ToolKey::GetCurrentTrack => "Get Current Track",
            ToolKey::GetTopTracks => "Get Top Tracks",
            ToolKey::GetRecentTracks => "Get Recent Tracks",
            ToolKey::GetPlaylists => "Get Playlists",
            ToolKey::GetPlaylistTracks => "Get Playlist Tracks",
        };
        format!("{}: {}", kind.display_name(), action)
    }

    pub fn description(self, kind: ProviderKind) -> String {
        let service = kind.display_name();
        match self {
            ToolKey::SearchTracks => format!(
                "Search for tracks, albums or artists on {}. Returns names, artists and URIs.",
                service
            ),
            ToolKey::ControlPlayback => format!(
                "Control {} playback on the user's active device: play a track by URI, pause, resume, skip to next or go to previous.",
                service
            ),
            ToolKey::GetCurrentTrack => match kind {
                ProviderKind::Spotify => {
                    "Get the track the user is currently listening to on Spotify.".to_string()
                }
                ProviderKind::YouTubeMusic => {
                    "Get the track the user most recently played on YouTube Music. This is the latest history entry and may not be playing right now.".to_string()
                }
            },
            ToolKey::GetTopTracks => {
                format!("Get the user's most listened tracks on {}.", service)
            }
            ToolKey::GetRecentTracks => {
                format!("Get the tracks the user recently played on {}.", service)
            }
            ToolKey::GetPlaylists => format!("List the user's playlists on {}.", service),
            ToolKey::GetPlaylistTracks => {
                format!("List the tracks of one of the user's {} playlists.", service)
            }
        }
    }

    pub fn parameters(self) -> Value {
        schema::parameters(self)
    }
}

/// Result handed back to the LLM.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToolOutput {
    Text(String),
    Items(Vec<Value>),
}

impl fmt::Display for ToolOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolOutput::Text(text) => f.write_str(text),
            ToolOutput::Items(items) => {
                let json = serde_json::to_string_pretty(items).map_err(|_| fmt::Error)?;
                f.write_str(&json)
            }
        }
    }
}

/// Behavior behind a registered tool.
#[async_trait]
pub trait ToolAction: Send + Sync {
    async fn invoke(&self, args: Value) -> ToolOutput;

    /// Re-checked by the host before offering the tool.
    async fn should_register(&self) -> bool;
}

/// Tool descriptor registered with the host.
#[derive(Clone)]
pub struct FunctionTool {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub parameters: Value,
    pub action: Arc<dyn ToolAction>,
}

impl fmt::Debug for FunctionTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionTool")
            .field("name", &self.name)
            .field("display_name", &self.display_name)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

#[derive(Deserialize)]
struct ControlArgs {
    action: String,
    #[serde(default)]
    uri: Option<String>,
}

#[derive(Deserialize)]
struct TopArgs {
    #[serde(default, rename = "timeRange")]
    time_range: Option<String>,
}

#[derive(Deserialize)]
struct RecentArgs {
    #[serde(default)]
    limit: Option<u32>,
}

#[derive(Deserialize)]
struct PlaylistArgs {
    #[serde(rename = "playlistId")]
    playlist_id: String,
}

/// Failure of a tool call, rendered as text for the LLM
enum ToolError {
    Args(String),
    Api(ApiError),
}

impl From<ApiError> for ToolError {
    fn from(e: ApiError) -> Self {
        ToolError::Api(e)
    }
}

fn parse_args<T: serde::de::DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    // Hosts pass `{}` or nothing for parameterless calls
    let args = if args.is_null() {
        Value::Object(Default::default())
    } else {
        args
    };
    serde_json::from_value(args).map_err(|e| ToolError::Args(e.to_string()))
}

fn items<T: Serialize>(list: Vec<T>) -> ToolOutput {
    ToolOutput::Items(
        list.iter()
            .filter_map(|item| match serde_json::to_value(item) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!("Dropping tool result item that failed to serialize: {}", e);
                    None
                }
            })
            .collect(),
    )
}

/// A provider-backed tool.
struct ProviderTool {
    key: ToolKey,
    extension: Extension,
}

impl ProviderTool {
    async fn call(&self, service: &dyn MusicService, args: Value) -> Result<ToolOutput, ToolError> {
        let kind = self.extension.kind();
        Ok(match self.key {
            ToolKey::SearchTracks => {
                let args: SearchArgs = parse_args(args)?;
                let search_kind = args
                    .kind
                    .as_deref()
                    .unwrap_or_default()
                    .parse::<SearchKind>()
                    .map_err(|e| ToolError::Args(e.to_string()))?;
                items(service.search(&args.query, search_kind).await?)
            }
            ToolKey::ControlPlayback => {
                let args: ControlArgs = parse_args(args)?;
                let action = args
                    .action
                    .parse::<PlaybackAction>()
                    .map_err(|e| ToolError::Args(e.to_string()))?;
                let outcome = service.control_playback(action, args.uri.as_deref()).await?;
                ToolOutput::Text(outcome.to_string())
            }
            ToolKey::GetCurrentTrack => match service.currently_playing().await? {
                NowPlaying::Playing(snapshot) => {
                    let lead = match kind {
                        ProviderKind::Spotify => "Currently playing",
                        ProviderKind::YouTubeMusic => "Most recently played",
                    };
                    let mut text = format!("{}: {}", lead, snapshot.title);
                    if !snapshot.artists.is_empty() {
                        text.push_str(&format!(" by {}", snapshot.artists.join(", ")));
                    }
                    if let Some(album) = &snapshot.album {
                        text.push_str(&format!(" ({})", album));
                    }
                    ToolOutput::Text(text)
                }
                NowPlaying::Nothing => ToolOutput::Text("Nothing is currently playing.".to_string()),
            },
            ToolKey::GetTopTracks => {
                let args: TopArgs = parse_args(args)?;
                let range = args
                    .time_range
                    .as_deref()
                    .unwrap_or_default()
                    .parse::<TimeRange>()
                    .map_err(|e| ToolError::Args(e.to_string()))?;
                items(service.top_items(range).await?)
            }
            ToolKey::GetRecentTracks => {
                let args: RecentArgs = parse_args(args)?;
                let limit = args
                    .limit
                    .unwrap_or(DEFAULT_RECENT_LIMIT)
                    .clamp(1, MAX_RECENT_LIMIT);
                items(service.recent_items(limit).await?)
            }
            ToolKey::GetPlaylists => items(service.playlists().await?),
            ToolKey::GetPlaylistTracks => {
                let args: PlaylistArgs = parse_args(args)?;
                items(service.playlist_items(&args.playlist_id).await?)
            }
        })
    }
}

#[async_trait]
impl ToolAction for ProviderTool {
    async fn invoke(&self, args: Value) -> ToolOutput {
        let kind = self.extension.kind();
        let name = self.key.tool_name(kind);
        tracing::info!("Tool call {} {}", name, args);

        let service = match self.extension.service().await {
            Ok(Some(service)) => service,
            Ok(None) => {
                return ToolOutput::Text(format!(
                    "Not logged in to {}. Ask the user to log in from the extension settings.",
                    kind.display_name()
                ))
            }
            Err(e) => {
                tracing::warn!("{} failed: {:#}", name, e);
                return ToolOutput::Text(format!("Error: {:#}", e));
            }
        };

        match self.call(service.as_ref(), args).await {
            Ok(output) => output,
            Err(ToolError::Args(msg)) => {
                tracing::warn!("{} called with invalid arguments: {}", name, msg);
                ToolOutput::Text(format!("Error: invalid arguments: {}", msg))
            }
            Err(ToolError::Api(ApiError::Unsupported(msg))) => ToolOutput::Text(msg),
            Err(ToolError::Api(e)) => {
                self.extension.handle_api_error(&e);
                ToolOutput::Text(format!("Error: {}", e))
            }
        }
    }

    async fn should_register(&self) -> bool {
        match self.extension.settings() {
            Ok(settings) => self.key.enabled_in(&settings) && self.extension.is_authenticated(&settings),
            Err(e) => {
                tracing::warn!("Failed to load {} settings: {:#}", self.extension.kind(), e);
                false
            }
        }
    }
}

/// Make the host registry match the enabled tool flags.
///
/// Supported and enabled tools are (re)registered, everything else is
/// unregistered by name. Returns the number of registered tools.
pub fn sync(extension: &Extension) -> Result<usize> {
    let kind = extension.kind();
    let settings = extension.settings()?;
    let supported = extension.provider().supported_tools();
    let host = extension.host();

    let mut registered = 0;
    for key in ToolKey::ALL {
        let name = key.tool_name(kind);
        if supported.contains(&key) && key.enabled_in(&settings) {
            host.register_function_tool(FunctionTool {
                name,
                display_name: key.display_name(kind),
                description: key.description(kind),
                parameters: key.parameters(),
                action: Arc::new(ProviderTool {
                    key,
                    extension: extension.clone(),
                }),
            });
            registered += 1;
        } else {
            host.unregister_function_tool(&name);
        }
    }

    tracing::debug!("{} tools registered for {}", registered, kind);
    Ok(registered)
}

//! Spotify Web API adapter

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;

use super::client::{check_response, read_json};
use super::ids::{spotify_playlist_id, spotify_uri};
use super::{ApiError, MusicService, Provider};
use crate::auth::{now_secs, Authenticator, Credential};
use crate::host::Host;
use crate::models::{
    ControlOutcome, ItemKind, ItemSummary, NowPlaying, PlaybackAction, PlaybackSnapshot,
    PlaylistSummary, ProviderKind, SearchKind, TimeRange,
};
use crate::settings::ExtensionSettings;
use crate::tools::ToolKey;

pub const SPOTIFY_API_BASE: &str = "https://api.spotify.com/v1";

const SEARCH_LIMIT: u32 = 10;
const TOP_LIMIT: u32 = 20;
const PLAYLIST_LIMIT: u32 = 50;
const PLAYLIST_ITEMS_LIMIT: u32 = 100;

#[derive(Debug, Deserialize)]
struct ArtistRef {
    name: String,
    #[serde(default)]
    uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AlbumRef {
    name: String,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    artists: Vec<ArtistRef>,
    #[serde(default)]
    uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Track {
    name: String,
    #[serde(default)]
    artists: Vec<ArtistRef>,
    album: Option<AlbumRef>,
    #[serde(default)]
    uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ShowRef {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Episode {
    name: String,
    show: Option<ShowRef>,
    #[serde(default)]
    uri: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum PlayableItem {
    Track(Track),
    Episode(Episode),
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct CurrentlyPlaying {
    item: Option<PlayableItem>,
}

#[derive(Debug, Deserialize)]
struct Paging<T> {
    #[serde(default = "Vec::new")]
    items: Vec<Option<T>>,
}

#[derive(Debug, Deserialize)]
struct PlayHistory {
    track: Track,
}

#[derive(Debug, Deserialize)]
struct PlaylistEntry {
    track: Option<PlayableItem>,
}

#[derive(Debug, Deserialize)]
struct Owner {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TracksRef {
    total: u32,
}

#[derive(Debug, Deserialize)]
struct SimplifiedPlaylist {
    id: String,
    name: String,
    #[serde(default)]
    uri: Option<String>,
    owner: Option<Owner>,
    tracks: Option<TracksRef>,
}

#[derive(Debug, Deserialize)]
struct Device {
    id: Option<String>,
    #[serde(default)]
    is_active: bool,
    name: String,
}

#[derive(Debug, Deserialize)]
struct Devices {
    #[serde(default)]
    devices: Vec<Device>,
}

#[derive(Debug, Deserialize)]
struct Profile {
    id: String,
    display_name: Option<String>,
}

fn artist_names(artists: &[ArtistRef]) -> Vec<String> {
    artists.iter().map(|a| a.name.clone()).collect()
}

fn release_year(date: Option<&str>) -> Option<String> {
    date.and_then(|d| d.split('-').next())
        .filter(|y| !y.is_empty())
        .map(String::from)
}

impl Track {
    fn summary(self) -> ItemSummary {
        ItemSummary {
            name: self.name,
            artists: artist_names(&self.artists),
            album: self.album.map(|a| a.name),
            uri: self.uri,
        }
    }
}

impl PlayableItem {
    fn snapshot(self) -> Option<PlaybackSnapshot> {
        match self {
            PlayableItem::Track(track) => Some(PlaybackSnapshot {
                title: track.name,
                artists: artist_names(&track.artists),
                release_year: release_year(
                    track.album.as_ref().and_then(|a| a.release_date.as_deref()),
                ),
                album: track.album.map(|a| a.name),
                kind: ItemKind::Track,
            }),
            PlayableItem::Episode(episode) => Some(PlaybackSnapshot {
                title: episode.name,
                artists: episode.show.map(|s| s.name).into_iter().collect(),
                album: None,
                release_year: None,
                kind: ItemKind::Episode,
            }),
            PlayableItem::Other => None,
        }
    }

    fn summary(self) -> Option<ItemSummary> {
        match self {
            PlayableItem::Track(track) => Some(track.summary()),
            PlayableItem::Episode(episode) => Some(ItemSummary {
                name: episode.name,
                artists: episode.show.map(|s| s.name).into_iter().collect(),
                album: None,
                uri: episode.uri,
            }),
            PlayableItem::Other => None,
        }
    }
}

/// Spotify Web API session for one access token.
pub struct SpotifyService {
    http: reqwest::Client,
    base: String,
    token: String,
}

impl SpotifyService {
    pub fn new(http: reqwest::Client, base: &str, token: &str) -> Self {
        Self {
            http,
            base: base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    /// GET a Spotify path with bearer auth.
    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<reqwest::Response, ApiError> {
        let url = format!("{}{}", self.base, path);
        tracing::debug!("Spotify GET {}", url);

        let resp = self
            .http
            .get(&url)
            .query(query)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| ApiError::network(&url, e))?;

        check_response(resp, &url).await
    }

    /// PUT/POST a player command. Empty bodies still carry a Content-Length.
    async fn command(
        &self,
        method: Method,
        path: &str,
        device_id: &str,
        body: Option<serde_json::Value>,
    ) -> Result<(), ApiError> {
        let url = format!("{}{}", self.base, path);
        tracing::debug!("Spotify {} {}", method, url);

        let req = self
            .http
            .request(method, &url)
            .query(&[("device_id", device_id)])
            .bearer_auth(&self.token);
        let req = match body {
            Some(body) => req.json(&body),
            None => req.header(reqwest::header::CONTENT_LENGTH, "0"),
        };

        let resp = req.send().await.map_err(|e| ApiError::network(&url, e))?;
        check_response(resp, &url).await?;
        Ok(())
    }

    async fn active_device(&self) -> Result<Option<(String, String)>, ApiError> {
        let url = format!("{}/me/player/devices", self.base);
        let resp = self.get("/me/player/devices", &[]).await?;
        let devices: Devices = read_json(resp, &url).await?;

        Ok(devices
            .devices
            .into_iter()
            .filter(|d| d.is_active)
            .find_map(|d| d.id.map(|id| (id, d.name))))
    }
}

#[async_trait]
impl MusicService for SpotifyService {
    async fn profile_name(&self) -> Result<String, ApiError> {
        let url = format!("{}/me", self.base);
        let resp = self.get("/me", &[]).await?;
        let profile: Profile = read_json(resp, &url).await?;
        Ok(profile.display_name.filter(|n| !n.is_empty()).unwrap_or(profile.id))
    }

    async fn currently_playing(&self) -> Result<NowPlaying, ApiError> {
        let path = "/me/player/currently-playing";
        let url = format!("{}{}", self.base, path);
        let resp = self
            .get(path, &[("additional_types", "track,episode".to_string())])
            .await?;

        if resp.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(NowPlaying::Nothing);
        }

        let current: CurrentlyPlaying = read_json(resp, &url).await?;
        Ok(current
            .item
            .and_then(PlayableItem::snapshot)
            .map_or(NowPlaying::Nothing, NowPlaying::Playing))
    }

    async fn search(&self, query: &str, kind: SearchKind) -> Result<Vec<ItemSummary>, ApiError> {
        let url = format!("{}/search", self.base);
        let resp = self
            .get(
                "/search",
                &[
                    ("q", query.to_string()),
                    ("type", kind.as_str().to_string()),
                    ("limit", SEARCH_LIMIT.to_string()),
                ],
            )
            .await?;
        let mut body: serde_json::Value = read_json(resp, &url).await?;
        let section = body
            .get_mut(format!("{}s", kind.as_str()))
            .map(serde_json::Value::take)
            .ok_or_else(|| ApiError::malformed(&url, "missing search section"))?;

        let parse_err = |e: serde_json::Error| ApiError::malformed(&url, e.to_string());
        let items = match kind {
            SearchKind::Track => serde_json::from_value::<Paging<Track>>(section)
                .map_err(parse_err)?
                .items
                .into_iter()
                .flatten()
                .map(Track::summary)
                .collect(),
            SearchKind::Album => serde_json::from_value::<Paging<AlbumRef>>(section)
                .map_err(parse_err)?
                .items
                .into_iter()
                .flatten()
                .map(|a| ItemSummary {
                    artists: artist_names(&a.artists),
                    name: a.name,
                    album: None,
                    uri: a.uri,
                })
                .collect(),
            SearchKind::Artist => serde_json::from_value::<Paging<ArtistRef>>(section)
                .map_err(parse_err)?
                .items
                .into_iter()
                .flatten()
                .map(|a| ItemSummary {
                    name: a.name,
                    artists: Vec::new(),
                    album: None,
                    uri: a.uri,
                })
                .collect(),
        };
        Ok(items)
    }

    async fn top_items(&self, range: TimeRange) -> Result<Vec<ItemSummary>, ApiError> {
        let url = format!("{}/me/top/tracks", self.base);
        let resp = self
            .get(
                "/me/top/tracks",
                &[
                    ("time_range", range.as_str().to_string()),
                    ("limit", TOP_LIMIT.to_string()),
                ],
            )
            .await?;
        let page: Paging<Track> = read_json(resp, &url).await?;
        Ok(page.items.into_iter().flatten().map(Track::summary).collect())
    }

    async fn recent_items(&self, limit: u32) -> Result<Vec<ItemSummary>, ApiError> {
        let url = format!("{}/me/player/recently-played", self.base);
        let resp = self
            .get("/me/player/recently-played", &[("limit", limit.to_string())])
            .await?;
        let page: Paging<PlayHistory> = read_json(resp, &url).await?;
        Ok(page
            .items
            .into_iter()
            .flatten()
            .map(|h| h.track.summary())
            .collect())
    }

    async fn playlists(&self) -> Result<Vec<PlaylistSummary>, ApiError> {
        let url = format!("{}/me/playlists", self.base);
        let resp = self
            .get("/me/playlists", &[("limit", PLAYLIST_LIMIT.to_string())])
            .await?;
        let page: Paging<SimplifiedPlaylist> = read_json(resp, &url).await?;
        Ok(page
            .items
            .into_iter()
            .flatten()
            .map(|p| PlaylistSummary {
                id: p.id,
                name: p.name,
                owner: p.owner.and_then(|o| o.display_name),
                track_count: p.tracks.map(|t| t.total),
                uri: p.uri,
            })
            .collect())
    }

    async fn playlist_items(&self, playlist: &str) -> Result<Vec<ItemSummary>, ApiError> {
        let id = spotify_playlist_id(playlist).ok_or_else(|| {
            ApiError::InvalidArgument(format!("'{}' is not a Spotify playlist", playlist))
        })?;
        let path = format!("/playlists/{}/tracks", id);
        let url = format!("{}{}", self.base, path);
        let resp = self
            .get(&path, &[("limit", PLAYLIST_ITEMS_LIMIT.to_string())])
            .await?;
        let page: Paging<PlaylistEntry> = read_json(resp, &url).await?;
        Ok(page
            .items
            .into_iter()
            .flatten()
            .filter_map(|entry| entry.track.and_then(PlayableItem::summary))
            .collect())
    }

    async fn control_playback(
        &self,
        action: PlaybackAction,
        target: Option<&str>,
    ) -> Result<ControlOutcome, ApiError> {
        let (device_id, device_name) = match self.active_device().await? {
            Some(device) => device,
            None => return Ok(ControlOutcome::NoActiveDevice),
        };

        match action {
            PlaybackAction::Play => {
                let body = match target {
                    Some(raw) => {
                        let uri = spotify_uri(raw).ok_or_else(|| {
                            ApiError::InvalidArgument(format!("'{}' is not a Spotify URI", raw))
                        })?;
                        if uri.starts_with("spotify:track:") || uri.starts_with("spotify:episode:")
                        {
                            Some(json!({ "uris": [uri] }))
                        } else {
                            Some(json!({ "context_uri": uri }))
                        }
                    }
                    None => None,
                };
                self.command(Method::PUT, "/me/player/play", &device_id, body)
                    .await?;
            }
            PlaybackAction::Resume => {
                self.command(Method::PUT, "/me/player/play", &device_id, None)
                    .await?;
            }
            PlaybackAction::Pause => {
                self.command(Method::PUT, "/me/player/pause", &device_id, None)
                    .await?;
            }
            PlaybackAction::Next => {
                self.command(Method::POST, "/me/player/next", &device_id, None)
                    .await?;
            }
            PlaybackAction::Previous => {
                self.command(Method::POST, "/me/player/previous", &device_id, None)
                    .await?;
            }
        }

        Ok(ControlOutcome::Done(format!(
            "Playback {} on {}.",
            match action {
                PlaybackAction::Play | PlaybackAction::Resume => "started",
                PlaybackAction::Pause => "paused",
                PlaybackAction::Next => "skipped to the next track",
                PlaybackAction::Previous => "returned to the previous track",
            },
            device_name
        )))
    }
}

const SPOTIFY_TOOLS: &[ToolKey] = &[
    ToolKey::SearchTracks,
    ToolKey::ControlPlayback,
    ToolKey::GetCurrentTrack,
    ToolKey::GetTopTracks,
    ToolKey::GetRecentTracks,
    ToolKey::GetPlaylists,
    ToolKey::GetPlaylistTracks,
];

/// Spotify: OAuth credential with refresh, Web API service.
pub struct SpotifyProvider {
    authenticator: Authenticator,
    http: reqwest::Client,
    api_base: String,
}

impl SpotifyProvider {
    pub fn new(authenticator: Authenticator, api_base: Option<&str>) -> Self {
        Self {
            authenticator,
            http: reqwest::Client::new(),
            api_base: api_base.unwrap_or(SPOTIFY_API_BASE).to_string(),
        }
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }
}

#[async_trait]
impl Provider for SpotifyProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Spotify
    }

    fn supported_tools(&self) -> &'static [ToolKey] {
        SPOTIFY_TOOLS
    }

    fn is_configured(&self, settings: &ExtensionSettings) -> bool {
        !settings.client_id.is_empty()
    }

    async fn refresh_credential(&self, settings: &mut ExtensionSettings, _host: &dyn Host) {
        self.authenticator.refresh_if_needed(settings).await;
    }

    fn service(&self, settings: &ExtensionSettings) -> Option<Box<dyn MusicService>> {
        if !self.is_configured(settings) {
            return None;
        }
        match &settings.credential {
            Some(Credential::Oauth(token)) if !token.is_expired(now_secs()) => Some(Box::new(
                SpotifyService::new(self.http.clone(), &self.api_base, &token.access_token),
            )),
            Some(Credential::Oauth(_)) => {
                tracing::debug!("Spotify token expired and not refreshed; treating as logged out");
                None
            }
            _ => None,
        }
    }
}

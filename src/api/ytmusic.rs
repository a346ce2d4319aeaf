//! YouTube Music adapter
//!
//! Talks to the internal `youtubei/v1` API used by the web client,
//! authenticated with the user's browser session cookie. There is no
//! "now playing" endpoint: the most recent listening-history entry stands in
//! for it. That is a heuristic. A track finished hours ago still shows up
//! as current, and a paused track is indistinguishable from a playing one.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::{json, Value};

use super::client::{check_response, read_json};
use super::ids::{normalize_playlist_id, normalize_video_id};
use super::{ApiError, MusicService, Provider};
use crate::auth::cookie::{sapisid, sapisid_hash};
use crate::auth::{now_secs, Credential};
use crate::host::{Host, NoticeLevel};
use crate::models::{
    ControlOutcome, ItemKind, ItemSummary, NowPlaying, PlaybackAction, PlaybackSnapshot,
    PlaylistSummary, ProviderKind, SearchKind, TimeRange,
};
use crate::settings::ExtensionSettings;
use crate::tools::ToolKey;

pub const YTMUSIC_ORIGIN: &str = "https://music.youtube.com";
pub const YTMUSIC_API_BASE: &str = "https://music.youtube.com/youtubei/v1";

const CLIENT_NAME: &str = "WEB_REMIX";
const CLIENT_VERSION: &str = "1.20241023.01.00";
const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

const HISTORY_BROWSE_ID: &str = "FEmusic_history";
const LIBRARY_PLAYLISTS_BROWSE_ID: &str = "FEmusic_liked_playlists";

const SONGS_FILTER: &str = "EgWKAQIIAWoMEA4QChADEAQQCRAF";
const ALBUMS_FILTER: &str = "EgWKAQIYAWoMEA4QChADEAQQCRAF";
const ARTISTS_FILTER: &str = "EgWKAQIgAWoMEA4QChADEAQQCRAF";

const PAGE_TYPE_ARTIST: &str = "MUSIC_PAGE_TYPE_ARTIST";
const PAGE_TYPE_ALBUM: &str = "MUSIC_PAGE_TYPE_ALBUM";
const PAGE_TYPE_POINTER: &str =
    "/navigationEndpoint/browseEndpoint/browseEndpointContextSupportedConfigs/browseEndpointContextMusicConfig/pageType";

/// Collect every value stored under `key`, depth first.
fn collect_by_key<'a>(value: &'a Value, key: &str, out: &mut Vec<&'a Value>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                if k == key {
                    out.push(v);
                } else {
                    collect_by_key(v, key, out);
                }
            }
        }
        Value::Array(items) => {
            for v in items {
                collect_by_key(v, key, out);
            }
        }
        _ => {}
    }
}

fn runs_text(runs: Option<&Value>) -> Option<String> {
    let text: String = runs?
        .as_array()?
        .iter()
        .filter_map(|r| r.get("text").and_then(Value::as_str))
        .collect();
    (!text.trim().is_empty()).then_some(text)
}

/// Parse a `musicResponsiveListItemRenderer` into a summary.
fn parse_list_item(renderer: &Value) -> Option<ItemSummary> {
    let columns = renderer.get("flexColumns")?.as_array()?;
    let runs_of = |i: usize| -> Vec<&Value> {
        columns
            .get(i)
            .and_then(|c| c.pointer("/musicResponsiveListItemFlexColumnRenderer/text/runs"))
            .and_then(Value::as_array)
            .map(|runs| runs.iter().collect())
            .unwrap_or_default()
    };

    let title_runs = runs_of(0);
    let title = title_runs
        .first()
        .and_then(|r| r.get("text"))
        .and_then(Value::as_str)?
        .to_string();

    let mut artists = Vec::new();
    let mut album = None;
    for run in (1..columns.len()).flat_map(|i| runs_of(i)) {
        let text = run.get("text").and_then(Value::as_str).unwrap_or_default();
        match run.pointer(PAGE_TYPE_POINTER).and_then(Value::as_str) {
            Some(PAGE_TYPE_ARTIST) => artists.push(text.to_string()),
            Some(PAGE_TYPE_ALBUM) if album.is_none() => album = Some(text.to_string()),
            _ => {}
        }
    }
    if artists.is_empty() {
        // History and uploads often list artists without links
        if let Some(text) = runs_of(1)
            .first()
            .and_then(|r| r.get("text"))
            .and_then(Value::as_str)
            .filter(|t| !t.trim().is_empty() && t.trim() != "•")
        {
            artists.push(text.to_string());
        }
    }

    let video_id = renderer
        .pointer("/playlistItemData/videoId")
        .or_else(|| {
            title_runs
                .first()
                .and_then(|r| r.pointer("/navigationEndpoint/watchEndpoint/videoId"))
        })
        .and_then(Value::as_str);

    Some(ItemSummary {
        name: title,
        artists,
        album,
        uri: video_id.map(|id| format!("{}/watch?v={}", YTMUSIC_ORIGIN, id)),
    })
}

fn parse_list_items(body: &Value) -> Vec<ItemSummary> {
    let mut renderers = Vec::new();
    collect_by_key(body, "musicResponsiveListItemRenderer", &mut renderers);
    renderers.into_iter().filter_map(parse_list_item).collect()
}

/// Parse a `musicTwoRowItemRenderer` playlist card.
fn parse_playlist_card(card: &Value) -> Option<PlaylistSummary> {
    let browse_id = card
        .pointer("/navigationEndpoint/browseEndpoint/browseId")
        .and_then(Value::as_str)?;
    let id = normalize_playlist_id(browse_id)?;
    let name = runs_text(card.pointer("/title/runs"))?;

    Some(PlaylistSummary {
        uri: Some(format!("{}/playlist?list={}", YTMUSIC_ORIGIN, id)),
        id,
        name,
        owner: runs_text(card.pointer("/subtitle/runs")),
        track_count: None,
    })
}

/// YouTube Music session for one cookie.
pub struct YtMusicService {
    http: reqwest::Client,
    base: String,
    cookie: String,
}

impl YtMusicService {
    pub fn new(http: reqwest::Client, base: &str, cookie: &str) -> Self {
        Self {
            http,
            base: base.trim_end_matches('/').to_string(),
            cookie: cookie.to_string(),
        }
    }

    /// POST to a `youtubei/v1` endpoint with the web client context.
    async fn post(&self, endpoint: &str, body: Value) -> Result<Value, ApiError> {
        let url = format!("{}/{}?prettyPrint=false", self.base, endpoint);
        let sapisid = sapisid(&self.cookie).ok_or(ApiError::Unauthorized)?;
        tracing::debug!("YouTube Music POST {}", url);

        let mut payload = json!({
            "context": {
                "client": {
                    "clientName": CLIENT_NAME,
                    "clientVersion": CLIENT_VERSION,
                    "hl": "en",
                },
                "user": {},
            }
        });
        if let (Some(target), Value::Object(extra)) = (payload.as_object_mut(), body) {
            target.extend(extra);
        }

        let resp = self
            .http
            .post(&url)
            .header(reqwest::header::COOKIE, &self.cookie)
            .header(
                reqwest::header::AUTHORIZATION,
                sapisid_hash(sapisid, YTMUSIC_ORIGIN, now_secs()),
            )
            .header(reqwest::header::ORIGIN, YTMUSIC_ORIGIN)
            .header("X-Origin", YTMUSIC_ORIGIN)
            .header("X-Goog-AuthUser", "0")
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ApiError::network(&url, e))?;

        let resp = check_response(resp, &url).await?;
        read_json(resp, &url).await
    }

    async fn browse(&self, browse_id: &str) -> Result<Value, ApiError> {
        self.post("browse", json!({ "browseId": browse_id })).await
    }

    async fn history(&self) -> Result<Vec<ItemSummary>, ApiError> {
        Ok(parse_list_items(&self.browse(HISTORY_BROWSE_ID).await?))
    }
}

#[async_trait]
impl MusicService for YtMusicService {
    async fn profile_name(&self) -> Result<String, ApiError> {
        let body = self.post("account/account_menu", json!({})).await?;
        let mut names = Vec::new();
        collect_by_key(&body, "accountName", &mut names);
        Ok(names
            .into_iter()
            .find_map(|n| runs_text(n.get("runs")))
            .unwrap_or_else(|| "[Authenticated]".to_string()))
    }

    /// Most recent history entry. See the module docs for the caveat.
    async fn currently_playing(&self) -> Result<NowPlaying, ApiError> {
        let latest = self.history().await?.into_iter().next();
        match latest {
            Some(item) => {
                tracing::debug!("Most recent YouTube Music track: {}", item.name);
                Ok(NowPlaying::Playing(PlaybackSnapshot {
                    title: item.name,
                    artists: item.artists,
                    album: item.album,
                    release_year: None,
                    kind: ItemKind::Track,
                }))
            }
            None => {
                tracing::debug!("No recent tracks in YouTube Music history");
                Ok(NowPlaying::Nothing)
            }
        }
    }

    async fn search(&self, query: &str, kind: SearchKind) -> Result<Vec<ItemSummary>, ApiError> {
        let params = match kind {
            SearchKind::Track => SONGS_FILTER,
            SearchKind::Album => ALBUMS_FILTER,
            SearchKind::Artist => ARTISTS_FILTER,
        };
        let body = self
            .post("search", json!({ "query": query, "params": params }))
            .await?;
        Ok(parse_list_items(&body))
    }

    async fn top_items(&self, _range: TimeRange) -> Result<Vec<ItemSummary>, ApiError> {
        Err(ApiError::Unsupported(
            "YouTube Music does not provide top tracks.".to_string(),
        ))
    }

    async fn recent_items(&self, limit: u32) -> Result<Vec<ItemSummary>, ApiError> {
        let mut items = self.history().await?;
        items.truncate(limit as usize);
        Ok(items)
    }

    async fn playlists(&self) -> Result<Vec<PlaylistSummary>, ApiError> {
        let body = self.browse(LIBRARY_PLAYLISTS_BROWSE_ID).await?;
        let mut cards = Vec::new();
        collect_by_key(&body, "musicTwoRowItemRenderer", &mut cards);
        Ok(cards.into_iter().filter_map(parse_playlist_card).collect())
    }

    async fn playlist_items(&self, playlist: &str) -> Result<Vec<ItemSummary>, ApiError> {
        let id = normalize_playlist_id(playlist).ok_or_else(|| {
            ApiError::InvalidArgument(format!("'{}' is not a YouTube Music playlist", playlist))
        })?;
        let body = self.browse(&format!("VL{}", id)).await?;
        Ok(parse_list_items(&body))
    }

    async fn control_playback(
        &self,
        action: PlaybackAction,
        target: Option<&str>,
    ) -> Result<ControlOutcome, ApiError> {
        let mut message = format!(
            "YouTube Music does not support remote playback control ({}).",
            action
        );
        if let Some(id) = target.and_then(normalize_video_id) {
            message.push_str(&format!(" Open {}/watch?v={} to play it.", YTMUSIC_ORIGIN, id));
        }
        Ok(ControlOutcome::Unsupported(message))
    }
}

const YTMUSIC_TOOLS: &[ToolKey] = &[
    ToolKey::SearchTracks,
    ToolKey::GetCurrentTrack,
    ToolKey::GetRecentTracks,
    ToolKey::GetPlaylists,
    ToolKey::GetPlaylistTracks,
];

/// YouTube Music: session-cookie credential, internal web API service.
pub struct YtMusicProvider {
    http: reqwest::Client,
    api_base: String,
    expiry_warned: AtomicBool,
}

impl YtMusicProvider {
    pub fn new(api_base: Option<&str>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.unwrap_or(YTMUSIC_API_BASE).to_string(),
            expiry_warned: AtomicBool::new(false),
        }
    }

    /// Confirm a cookie is live with one authenticated call.
    /// Returns the account name on success.
    pub async fn validate_cookie(&self, cookie: &str) -> Result<String, ApiError> {
        if sapisid(cookie).is_none() {
            return Err(ApiError::InvalidArgument(
                "cookie has no SAPISID; copy the full Cookie header from music.youtube.com"
                    .to_string(),
            ));
        }
        YtMusicService::new(self.http.clone(), &self.api_base, cookie)
            .profile_name()
            .await
    }
}

#[async_trait]
impl Provider for YtMusicProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::YouTubeMusic
    }

    fn supported_tools(&self) -> &'static [ToolKey] {
        YTMUSIC_TOOLS
    }

    fn is_configured(&self, _settings: &ExtensionSettings) -> bool {
        true
    }

    async fn refresh_credential(&self, settings: &mut ExtensionSettings, host: &dyn Host) {
        // Cookies cannot be refreshed; only warn before the soft expiry.
        if let Some(Credential::Session(cookie)) = &settings.credential {
            if cookie.expires_soon(now_secs()) && !self.expiry_warned.swap(true, Ordering::Relaxed)
            {
                host.notify(
                    NoticeLevel::Warning,
                    "Your YouTube Music cookies will expire soon. Please update them.",
                );
            }
        }
    }

    fn service(&self, settings: &ExtensionSettings) -> Option<Box<dyn MusicService>> {
        match &settings.credential {
            Some(Credential::Session(cookie)) => Some(Box::new(YtMusicService::new(
                self.http.clone(),
                &self.api_base,
                &cookie.cookie,
            ))),
            _ => None,
        }
    }
}

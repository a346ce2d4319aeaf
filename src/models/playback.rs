//! Playback and library models returned by the music services

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use serde::{Deserialize, Serialize};

/// Named values substituted into the user's prompt template.
pub type TemplateVars = BTreeMap<String, String>;

/// What kind of item is playing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Track,
    Episode,
}

/// The item most recently reported as playing. Read fresh on every cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackSnapshot {
    pub title: String,
    pub artists: Vec<String>,
    pub album: Option<String>,
    pub release_year: Option<String>,
    pub kind: ItemKind,
}

impl PlaybackSnapshot {
    /// Map the snapshot to template variables. Missing fields become empty strings.
    pub fn template_vars(&self) -> TemplateVars {
        let mut vars = TemplateVars::new();
        vars.insert("song".into(), self.title.clone());
        vars.insert("track".into(), self.title.clone());
        vars.insert("artist".into(), self.artists.join(", "));
        vars.insert("album".into(), self.album.clone().unwrap_or_default());
        vars.insert("year".into(), self.release_year.clone().unwrap_or_default());
        vars
    }
}

/// Result of asking a provider what is playing.
#[derive(Debug, Clone, PartialEq)]
pub enum NowPlaying {
    Playing(PlaybackSnapshot),
    /// Nothing playing, or no recent activity for history-based providers.
    Nothing,
}

/// Track, album or artist as listed by search, history, top items or playlists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemSummary {
    pub name: String,
    pub artists: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistSummary {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    Track,
    Album,
    Artist,
}

impl SearchKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SearchKind::Track => "track",
            SearchKind::Album => "album",
            SearchKind::Artist => "artist",
        }
    }
}

impl FromStr for SearchKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "track" | "song" | "" => Ok(SearchKind::Track),
            "album" => Ok(SearchKind::Album),
            "artist" => Ok(SearchKind::Artist),
            other => bail!("Unknown search type: {}. Use: track, album, artist", other),
        }
    }
}

/// Affinity window for top items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeRange {
    ShortTerm,
    #[default]
    MediumTerm,
    LongTerm,
}

impl TimeRange {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeRange::ShortTerm => "short_term",
            TimeRange::MediumTerm => "medium_term",
            TimeRange::LongTerm => "long_term",
        }
    }
}

impl FromStr for TimeRange {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "short_term" | "short" => Ok(TimeRange::ShortTerm),
            "medium_term" | "medium" | "" => Ok(TimeRange::MediumTerm),
            "long_term" | "long" => Ok(TimeRange::LongTerm),
            other => bail!(
                "Unknown time range: {}. Use: short_term, medium_term, long_term",
                other
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackAction {
    Play,
    Pause,
    Resume,
    Next,
    Previous,
}

impl FromStr for PlaybackAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "play" => Ok(PlaybackAction::Play),
            "pause" => Ok(PlaybackAction::Pause),
            "resume" => Ok(PlaybackAction::Resume),
            "next" | "skip" => Ok(PlaybackAction::Next),
            "previous" | "prev" => Ok(PlaybackAction::Previous),
            other => bail!(
                "Unknown action: {}. Use: play, pause, resume, next, previous",
                other
            ),
        }
    }
}

impl fmt::Display for PlaybackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlaybackAction::Play => "play",
            PlaybackAction::Pause => "pause",
            PlaybackAction::Resume => "resume",
            PlaybackAction::Next => "next",
            PlaybackAction::Previous => "previous",
        };
        f.write_str(s)
    }
}

/// Result of a playback control request. None of these are errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlOutcome {
    Done(String),
    NoActiveDevice,
    Unsupported(String),
}

impl fmt::Display for ControlOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlOutcome::Done(msg) => f.write_str(msg),
            ControlOutcome::NoActiveDevice => f.write_str(
                "No active device found. Start playback on a device first, then try again.",
            ),
            ControlOutcome::Unsupported(msg) => f.write_str(msg),
        }
    }
}

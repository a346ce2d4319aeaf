//! Per-provider extension settings
//!
//! Settings live in the host's settings bag as one flat table per provider.
//! Every key has a default. Reading merges stored keys over the defaults so
//! tables written by older versions pick up new keys. Keys this version does
//! not know survive a read-modify-write cycle untouched.

pub mod schema;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::auth::Credential;
use crate::models::ProviderKind;

/// Where the host places injected text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionPosition {
    None,
    AfterPrompt,
    InChat,
    BeforePrompt,
}

impl InjectionPosition {
    /// Numeric value understood by the host prompt API.
    pub fn host_value(self) -> i8 {
        match self {
            InjectionPosition::None => -1,
            InjectionPosition::AfterPrompt => 0,
            InjectionPosition::InChat => 1,
            InjectionPosition::BeforePrompt => 2,
        }
    }
}

impl FromStr for InjectionPosition {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "none" | "-1" => Ok(InjectionPosition::None),
            "after_prompt" | "0" => Ok(InjectionPosition::AfterPrompt),
            "in_chat" | "1" => Ok(InjectionPosition::InChat),
            "before_prompt" | "2" => Ok(InjectionPosition::BeforePrompt),
            other => bail!(
                "Unknown position: {}. Use: none, after_prompt, in_chat, before_prompt",
                other
            ),
        }
    }
}

impl fmt::Display for InjectionPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InjectionPosition::None => "none",
            InjectionPosition::AfterPrompt => "after_prompt",
            InjectionPosition::InChat => "in_chat",
            InjectionPosition::BeforePrompt => "before_prompt",
        };
        f.write_str(s)
    }
}

/// Message role of injected text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionRole {
    System,
    User,
    Assistant,
}

impl InjectionRole {
    pub fn host_value(self) -> u8 {
        match self {
            InjectionRole::System => 0,
            InjectionRole::User => 1,
            InjectionRole::Assistant => 2,
        }
    }
}

impl FromStr for InjectionRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "system" | "0" => Ok(InjectionRole::System),
            "user" | "1" => Ok(InjectionRole::User),
            "assistant" | "2" => Ok(InjectionRole::Assistant),
            other => bail!("Unknown role: {}. Use: system, user, assistant", other),
        }
    }
}

impl fmt::Display for InjectionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InjectionRole::System => "system",
            InjectionRole::User => "user",
            InjectionRole::Assistant => "assistant",
        };
        f.write_str(s)
    }
}

/// Settings of one provider extension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionSettings {
    /// OAuth client id (Spotify only)
    #[serde(default)]
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<Credential>,
    pub template: String,
    pub position: InjectionPosition,
    pub role: InjectionRole,
    pub depth: u32,
    pub scan: bool,

    // Tools
    pub search_tracks: bool,
    pub control_playback: bool,
    pub get_current_track: bool,
    pub get_top_tracks: bool,
    pub get_recent_tracks: bool,
    pub get_playlists: bool,
    pub get_playlist_tracks: bool,

    /// Keys written by other versions, preserved as-is
    #[serde(flatten)]
    pub extra: BTreeMap<String, toml::Value>,
}

impl ExtensionSettings {
    pub fn defaults(kind: ProviderKind) -> Self {
        Self {
            client_id: String::new(),
            credential: None,
            template: format!(
                "[{{{{user}}}} is listening to {{{{song}}}} by {{{{artist}}}} on {}]",
                kind.display_name()
            ),
            position: InjectionPosition::InChat,
            role: InjectionRole::System,
            depth: 1,
            scan: true,
            search_tracks: true,
            control_playback: true,
            get_current_track: true,
            get_top_tracks: true,
            get_recent_tracks: true,
            get_playlists: true,
            get_playlist_tracks: true,
            extra: BTreeMap::new(),
        }
    }

    /// Read settings from a stored table, filling missing keys from the defaults.
    ///
    /// A stored value of the wrong type is dropped in favor of its default
    /// rather than failing the whole read.
    pub fn from_table(kind: ProviderKind, stored: &toml::Table) -> Result<Self> {
        let defaults = Self::defaults(kind).to_table()?;

        let mut merged = defaults.clone();
        merged.extend(stored.iter().map(|(k, v)| (k.clone(), v.clone())));
        if let Ok(settings) = toml::Value::Table(merged).try_into() {
            return Ok(settings);
        }

        let mut merged = defaults;
        for (key, value) in stored {
            let mut candidate = merged.clone();
            candidate.insert(key.clone(), value.clone());
            if toml::Value::Table(candidate.clone())
                .try_into::<Self>()
                .is_ok()
            {
                merged = candidate;
            } else {
                tracing::warn!(
                    "Ignoring invalid value for '{}' in {} settings",
                    key,
                    kind
                );
            }
        }

        toml::Value::Table(merged)
            .try_into()
            .with_context(|| format!("Failed to read {} settings", kind))
    }

    pub fn to_table(&self) -> Result<toml::Table> {
        match toml::Value::try_from(self).context("Failed to serialize settings")? {
            toml::Value::Table(table) => Ok(table),
            _ => bail!("Settings did not serialize to a table"),
        }
    }

    /// True when injection is configured: a non-empty template and a position.
    pub fn injection_enabled(&self) -> bool {
        !self.template.trim().is_empty() && self.position != InjectionPosition::None
    }
}

/// Persistence callback for extension settings.
///
/// `load` always returns a complete settings object; `save` persists it.
/// Callers reload before writing back after an await, since the stored
/// settings may change meanwhile.
pub trait SettingsStore: Send + Sync {
    fn load(&self, kind: ProviderKind) -> Result<ExtensionSettings>;
    fn save(&self, kind: ProviderKind, settings: &ExtensionSettings) -> Result<()>;
}

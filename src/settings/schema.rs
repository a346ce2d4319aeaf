//! Declarative settings schema
//!
//! One table describes every user-editable key. It drives both rendering
//! (`settings show`) and change handling (`settings set`), so adding a
//! setting means adding a row here and a field on `ExtensionSettings`.

use anyhow::{bail, Context, Result};

use super::{ExtensionSettings, InjectionPosition, InjectionRole};
use crate::models::ProviderKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Position,
    Role,
    Number,
    Bool,
}

#[derive(Debug, Clone, Copy)]
pub struct SettingField {
    pub key: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    /// Restricts the field to one provider
    pub only: Option<ProviderKind>,
}

const fn field(key: &'static str, label: &'static str, kind: FieldKind) -> SettingField {
    SettingField {
        key,
        label,
        kind,
        only: None,
    }
}

pub const FIELDS: &[SettingField] = &[
    SettingField {
        key: "client_id",
        label: "Client ID",
        kind: FieldKind::Text,
        only: Some(ProviderKind::Spotify),
    },
    field("template", "Injection template", FieldKind::Text),
    field("position", "Injection position", FieldKind::Position),
    field("role", "Injection role", FieldKind::Role),
    field("depth", "Injection depth", FieldKind::Number),
    field("scan", "Include in world info scan", FieldKind::Bool),
    field("search_tracks", "Tool: search tracks", FieldKind::Bool),
    field("control_playback", "Tool: control playback", FieldKind::Bool),
    field("get_current_track", "Tool: get current track", FieldKind::Bool),
    field("get_top_tracks", "Tool: get top tracks", FieldKind::Bool),
    field("get_recent_tracks", "Tool: get recent tracks", FieldKind::Bool),
    field("get_playlists", "Tool: get playlists", FieldKind::Bool),
    field("get_playlist_tracks", "Tool: get playlist tracks", FieldKind::Bool),
];

/// Fields that apply to a provider, in display order.
pub fn fields_for(kind: ProviderKind) -> impl Iterator<Item = &'static SettingField> {
    FIELDS
        .iter()
        .filter(move |f| f.only.map_or(true, |only| only == kind))
}

/// Render current values as `(label, key, value)` rows.
pub fn render(kind: ProviderKind, settings: &ExtensionSettings) -> Result<Vec<(String, String, String)>> {
    let table = settings.to_table()?;
    Ok(fields_for(kind)
        .map(|f| {
            let value = match table.get(f.key) {
                Some(toml::Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            };
            (f.label.to_string(), f.key.to_string(), value)
        })
        .collect())
}

/// Apply a raw user-entered value to one key, returning the updated settings.
pub fn apply(
    kind: ProviderKind,
    settings: &ExtensionSettings,
    key: &str,
    raw: &str,
) -> Result<ExtensionSettings> {
    let field = fields_for(kind)
        .find(|f| f.key == key)
        .with_context(|| format!("Unknown setting '{}' for {}", key, kind))?;

    let value = match field.kind {
        FieldKind::Text => toml::Value::String(raw.to_string()),
        FieldKind::Position => {
            toml::Value::String(raw.parse::<InjectionPosition>()?.to_string())
        }
        FieldKind::Role => toml::Value::String(raw.parse::<InjectionRole>()?.to_string()),
        FieldKind::Number => {
            let n: u32 = raw
                .trim()
                .parse()
                .with_context(|| format!("'{}' expects a non-negative number", key))?;
            toml::Value::Integer(i64::from(n))
        }
        FieldKind::Bool => toml::Value::Boolean(parse_bool(raw)?),
    };

    let mut table = settings.to_table()?;
    table.insert(key.to_string(), value);
    toml::Value::Table(table)
        .try_into()
        .with_context(|| format!("Invalid value for '{}'", key))
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        other => bail!("Expected true/false, got '{}'", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_only_for_spotify() {
        assert!(fields_for(ProviderKind::Spotify).any(|f| f.key == "client_id"));
        assert!(!fields_for(ProviderKind::YouTubeMusic).any(|f| f.key == "client_id"));
    }

    #[test]
    fn test_every_field_is_a_settings_key() {
        let table = ExtensionSettings::defaults(ProviderKind::Spotify)
            .to_table()
            .unwrap();
        for f in FIELDS {
            assert!(table.contains_key(f.key), "missing key {}", f.key);
        }
    }

    #[test]
    fn test_apply_by_kind() {
        let s = ExtensionSettings::defaults(ProviderKind::Spotify);
        let s = apply(ProviderKind::Spotify, &s, "position", "before-prompt").unwrap();
        assert_eq!(s.position, InjectionPosition::BeforePrompt);
        let s = apply(ProviderKind::Spotify, &s, "role", "assistant").unwrap();
        assert_eq!(s.role, InjectionRole::Assistant);
        let s = apply(ProviderKind::Spotify, &s, "depth", "3").unwrap();
        assert_eq!(s.depth, 3);
        let s = apply(ProviderKind::Spotify, &s, "scan", "off").unwrap();
        assert!(!s.scan);
        let s = apply(ProviderKind::Spotify, &s, "template", "{{song}}").unwrap();
        assert_eq!(s.template, "{{song}}");
    }

    #[test]
    fn test_apply_rejects_bad_input() {
        let s = ExtensionSettings::defaults(ProviderKind::YouTubeMusic);
        assert!(apply(ProviderKind::YouTubeMusic, &s, "depth", "-2").is_err());
        assert!(apply(ProviderKind::YouTubeMusic, &s, "scan", "maybe").is_err());
        assert!(apply(ProviderKind::YouTubeMusic, &s, "client_id", "x").is_err());
        assert!(apply(ProviderKind::YouTubeMusic, &s, "credential", "x").is_err());
    }

    #[test]
    fn test_render_rows() {
        let s = ExtensionSettings::defaults(ProviderKind::Spotify);
        let rows = render(ProviderKind::Spotify, &s).unwrap();
        let depth = rows.iter().find(|(_, k, _)| k == "depth").unwrap();
        assert_eq!(depth.2, "1");
        let position = rows.iter().find(|(_, k, _)| k == "position").unwrap();
        assert_eq!(position.2, "in_chat");
    }
}

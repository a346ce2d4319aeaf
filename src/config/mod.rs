//! Configuration and settings storage

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::models::ProviderKind;
use crate::settings::{ExtensionSettings, SettingsStore};

pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8888/callback";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Substituted for `{{user}}`
    pub user_name: String,
    /// Substituted for `{{char}}`
    pub char_name: String,
    /// OAuth redirect URI registered with Spotify
    pub redirect_uri: String,
    pub poll_interval_secs: u64,
    /// Write injected prompts here instead of stdout
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spotify_api_base: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ytmusic_api_base: Option<String>,
    /// Extension settings tables keyed by module name
    pub extensions: BTreeMap<String, toml::Table>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_name: "User".to_string(),
            char_name: "Assistant".to_string(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            prompt_file: None,
            spotify_api_base: None,
            ytmusic_api_base: None,
            extensions: BTreeMap::new(),
        }
    }
}

impl Config {
    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("com", "now-playing-cli", "now-playing-cli")
            .context("Could not determine config directory")
    }

    /// Get default config file path
    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    /// Directory for short-lived state such as pending authorizations
    pub fn cache_dir() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.cache_dir().to_path_buf())
    }

    /// Load configuration from disk. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Save configuration to disk
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content).context("Failed to write config file")?;

        // Restrictive permissions: the file holds tokens and cookies
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(path, perms).context("Failed to set config permissions")?;
        }

        Ok(())
    }

    /// Settings of one provider, with defaults for every missing key.
    pub fn settings(&self, kind: ProviderKind) -> Result<ExtensionSettings> {
        match self.extensions.get(kind.module_name()) {
            Some(table) => ExtensionSettings::from_table(kind, table),
            None => Ok(ExtensionSettings::defaults(kind)),
        }
    }

    pub fn put_settings(&mut self, kind: ProviderKind, settings: &ExtensionSettings) -> Result<()> {
        self.extensions
            .insert(kind.module_name().to_string(), settings.to_table()?);
        Ok(())
    }

    pub fn api_base(&self, kind: ProviderKind) -> Option<&str> {
        match kind {
            ProviderKind::Spotify => self.spotify_api_base.as_deref(),
            ProviderKind::YouTubeMusic => self.ytmusic_api_base.as_deref(),
        }
    }
}

/// Settings persisted in the config file. Every save re-reads the file so
/// keys written elsewhere in the meantime are kept.
pub struct ConfigStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ConfigStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }
}

impl SettingsStore for ConfigStore {
    fn load(&self, kind: ProviderKind) -> Result<ExtensionSettings> {
        Config::load_from(&self.path)?.settings(kind)
    }

    fn save(&self, kind: ProviderKind, settings: &ExtensionSettings) -> Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("Settings lock poisoned"))?;
        let mut config = Config::load_from(&self.path)?;
        config.put_settings(kind, settings)?;
        config.save_to(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::tokens::{Credential, OAuthToken};

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.poll_interval_secs, 60);
        assert_eq!(config.redirect_uri, DEFAULT_REDIRECT_URI);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
            user_name = "Alex"

            [extensions.spotify]
            client_id = "abc"
            "#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.user_name, "Alex");
        assert_eq!(config.char_name, "Assistant");

        let spotify = config.settings(ProviderKind::Spotify).unwrap();
        assert_eq!(spotify.client_id, "abc");
        assert_eq!(spotify.depth, 1);
        assert_eq!(
            config.settings(ProviderKind::YouTubeMusic).unwrap(),
            ExtensionSettings::defaults(ProviderKind::YouTubeMusic)
        );
    }

    #[test]
    fn test_store_round_trip_preserves_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.user_name = "Alex".into();
        config.save_to(&path).unwrap();

        let store = ConfigStore::new(path.clone());
        let mut settings = store.load(ProviderKind::Spotify).unwrap();
        settings.client_id = "abc".into();
        settings.credential = Some(Credential::Oauth(OAuthToken {
            access_token: "a".into(),
            refresh_token: Some("r".into()),
            expires_at: 1_700_000_000,
            scope: None,
        }));
        store.save(ProviderKind::Spotify, &settings).unwrap();

        assert_eq!(store.load(ProviderKind::Spotify).unwrap(), settings);
        assert_eq!(Config::load_from(&path).unwrap().user_name, "Alex");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }
}

//! Pending authorization storage
//!
//! Holds the PKCE verifier between the redirect to the provider and the
//! redirect back. One entry per provider; a new authorization attempt
//! overwrites the previous one.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::ProviderKind;

/// Verifier bound to one in-flight authorization-code exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAuthorization {
    pub verifier: String,
    pub created_at: i64,
}

/// Short-lived storage for pending authorizations.
pub trait PendingStore: Send + Sync {
    fn get(&self, kind: ProviderKind) -> Result<Option<PendingAuthorization>>;
    fn put(&self, kind: ProviderKind, pending: PendingAuthorization) -> Result<()>;
    fn remove(&self, kind: ProviderKind) -> Result<()>;
}

/// Pending authorizations kept in a small TOML file in the cache directory.
pub struct FilePendingStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FilePendingStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    fn read(&self) -> Result<BTreeMap<String, PendingAuthorization>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content =
            fs::read_to_string(&self.path).context("Failed to read pending authorization file")?;
        match toml::from_str(&content) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                tracing::warn!("Discarding unreadable pending authorization file: {}", e);
                Ok(BTreeMap::new())
            }
        }
    }

    fn write(&self, entries: &BTreeMap<String, PendingAuthorization>) -> Result<()> {
        if entries.is_empty() {
            if self.path.exists() {
                fs::remove_file(&self.path)
                    .context("Failed to remove pending authorization file")?;
            }
            return Ok(());
        }

        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).context("Failed to create cache directory")?;
        }
        let content =
            toml::to_string_pretty(entries).context("Failed to serialize pending authorization")?;
        fs::write(&self.path, content).context("Failed to write pending authorization file")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&self.path, perms)
                .context("Failed to set pending authorization permissions")?;
        }

        Ok(())
    }
}

impl PendingStore for FilePendingStore {
    fn get(&self, kind: ProviderKind) -> Result<Option<PendingAuthorization>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.read()?.remove(kind.module_name()))
    }

    fn put(&self, kind: ProviderKind, pending: PendingAuthorization) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries = self.read()?;
        entries.insert(kind.module_name().to_string(), pending);
        self.write(&entries)
    }

    fn remove(&self, kind: ProviderKind) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries = self.read()?;
        if entries.remove(kind.module_name()).is_some() {
            self.write(&entries)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(verifier: &str) -> PendingAuthorization {
        PendingAuthorization {
            verifier: verifier.to_string(),
            created_at: 42,
        }
    }

    #[test]
    fn test_file_store_put_get_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePendingStore::new(dir.path().join("pending.toml"));

        assert_eq!(store.get(ProviderKind::Spotify).unwrap(), None);
        store.put(ProviderKind::Spotify, pending("first")).unwrap();
        assert_eq!(
            store.get(ProviderKind::Spotify).unwrap(),
            Some(pending("first"))
        );

        store.remove(ProviderKind::Spotify).unwrap();
        assert_eq!(store.get(ProviderKind::Spotify).unwrap(), None);
        assert!(!dir.path().join("pending.toml").exists());
    }

    #[test]
    fn test_second_attempt_overwrites_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePendingStore::new(dir.path().join("pending.toml"));

        store.put(ProviderKind::Spotify, pending("first")).unwrap();
        store.put(ProviderKind::Spotify, pending("second")).unwrap();
        assert_eq!(
            store.get(ProviderKind::Spotify).unwrap().unwrap().verifier,
            "second"
        );
    }

    #[test]
    fn test_providers_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePendingStore::new(dir.path().join("pending.toml"));

        store.put(ProviderKind::Spotify, pending("s")).unwrap();
        store.put(ProviderKind::YouTubeMusic, pending("y")).unwrap();
        store.remove(ProviderKind::YouTubeMusic).unwrap();
        assert_eq!(store.get(ProviderKind::Spotify).unwrap(), Some(pending("s")));
    }
}

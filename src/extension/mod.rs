//! One provider extension bound to its host and settings store
//!
//! Settings are reloaded on every use instead of being cached across an
//! await, so a logout that lands while a request is in flight takes effect
//! before the credential is used again.

use std::sync::Arc;

use anyhow::Result;

use crate::api::{ApiError, MusicService, Provider};
use crate::host::{Host, NoticeLevel};
use crate::models::ProviderKind;
use crate::settings::{ExtensionSettings, SettingsStore};

#[derive(Clone)]
pub struct Extension {
    provider: Arc<dyn Provider>,
    host: Arc<dyn Host>,
    store: Arc<dyn SettingsStore>,
}

impl Extension {
    pub fn new(
        provider: Arc<dyn Provider>,
        host: Arc<dyn Host>,
        store: Arc<dyn SettingsStore>,
    ) -> Self {
        Self {
            provider,
            host,
            store,
        }
    }

    pub fn kind(&self) -> ProviderKind {
        self.provider.kind()
    }

    pub fn provider(&self) -> &dyn Provider {
        self.provider.as_ref()
    }

    pub fn host(&self) -> &dyn Host {
        self.host.as_ref()
    }

    pub fn settings(&self) -> Result<ExtensionSettings> {
        self.store.load(self.kind())
    }

    pub fn save_settings(&self, settings: &ExtensionSettings) -> Result<()> {
        self.store.save(self.kind(), settings)
    }

    /// Credential present and provider preconditions met.
    pub fn is_authenticated(&self, settings: &ExtensionSettings) -> bool {
        settings.credential.is_some() && self.provider.is_configured(settings)
    }

    /// Service bound to a freshly refreshed credential, or `None` when
    /// logged out or not configured.
    pub async fn service(&self) -> Result<Option<Box<dyn MusicService>>> {
        let mut settings = self.settings()?;
        if !self.is_authenticated(&settings) {
            return Ok(None);
        }

        let before = settings.credential.clone();
        self.provider
            .refresh_credential(&mut settings, self.host.as_ref())
            .await;

        let mut current = self.settings()?;
        if current.credential != before {
            // Changed while refreshing: a logout or another refresh won
            if current.credential.is_none() {
                tracing::debug!("{} logged out during refresh", self.kind());
                return Ok(None);
            }
            return Ok(self.provider.service(&current));
        }

        if settings.credential != before {
            current.credential = settings.credential;
            self.save_settings(&current)?;
        }
        Ok(self.provider.service(&current))
    }

    /// Apply the error policy for a failed provider call. An authorization
    /// failure clears the stored credential.
    pub fn handle_api_error(&self, err: &ApiError) {
        match err {
            ApiError::Unauthorized => {
                tracing::warn!("{} rejected the stored credential", self.kind());
                if let Err(e) = self.clear_credential() {
                    tracing::warn!("Failed to clear {} credential: {:#}", self.kind(), e);
                }
                self.host.notify(
                    NoticeLevel::Warning,
                    &format!(
                        "{} session is no longer valid. Please log in again.",
                        self.kind().display_name()
                    ),
                );
            }
            other => tracing::warn!("{} request failed: {}", self.kind(), other),
        }
    }

    fn clear_credential(&self) -> Result<ExtensionSettings> {
        let mut settings = self.settings()?;
        settings.credential = None;
        self.save_settings(&settings)?;
        Ok(settings)
    }

    /// Forget the credential and remove any injected prompt.
    pub fn logout(&self) -> Result<()> {
        let settings = self.clear_credential()?;
        self.clear_prompt(&settings);
        tracing::info!("Logged out of {}", self.kind());
        Ok(())
    }

    pub fn clear_prompt(&self, settings: &ExtensionSettings) {
        self.host.set_extension_prompt(
            self.kind().inject_id(),
            "",
            settings.position,
            settings.depth,
            settings.scan,
            settings.role,
        );
    }
}

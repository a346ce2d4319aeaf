//! Prompt injection of the current track
//!
//! Every run clears the injected prompt first, so overlapping or failed runs
//! never leave stale text behind. The worst an overlap can do is flicker.

use std::future::Future;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::extension::Extension;
use crate::models::NowPlaying;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectOutcome {
    /// Logged out, no template, or injection disabled. Not an error.
    NotConfigured,
    NothingPlaying,
    Injected(String),
    /// The cycle was aborted; the prompt stays cleared.
    Failed,
}

pub struct PromptInjector {
    extension: Extension,
}

impl PromptInjector {
    pub fn new(extension: Extension) -> Self {
        Self { extension }
    }

    /// One injection cycle. Never returns an error; failures are logged.
    pub async fn run(&self) -> InjectOutcome {
        let kind = self.extension.kind();
        let settings = match self.extension.settings() {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Failed to load {} settings: {:#}", kind, e);
                return InjectOutcome::Failed;
            }
        };

        self.extension.clear_prompt(&settings);

        if !settings.injection_enabled() || !self.extension.is_authenticated(&settings) {
            tracing::debug!("{} injection not configured", kind);
            return InjectOutcome::NotConfigured;
        }

        let service = match self.extension.service().await {
            Ok(Some(service)) => service,
            Ok(None) => return InjectOutcome::NotConfigured,
            Err(e) => {
                tracing::warn!("{} injection aborted: {:#}", kind, e);
                return InjectOutcome::Failed;
            }
        };

        let snapshot = match service.currently_playing().await {
            Ok(NowPlaying::Playing(snapshot)) => snapshot,
            Ok(NowPlaying::Nothing) => {
                tracing::debug!("Nothing playing on {}", kind);
                return InjectOutcome::NothingPlaying;
            }
            Err(e) => {
                self.extension.handle_api_error(&e);
                return InjectOutcome::Failed;
            }
        };

        // Settings may have changed while the request was out
        let settings = match self.extension.settings() {
            Ok(settings) if settings.credential.is_some() && settings.injection_enabled() => {
                settings
            }
            Ok(_) => return InjectOutcome::NotConfigured,
            Err(e) => {
                tracing::warn!("Failed to load {} settings: {:#}", kind, e);
                return InjectOutcome::Failed;
            }
        };

        let host = self.extension.host();
        let text = host.substitute_params(&settings.template, &snapshot.template_vars());
        host.set_extension_prompt(
            kind.inject_id(),
            &text,
            settings.position,
            settings.depth,
            settings.scan,
            settings.role,
        );
        tracing::info!("Injected {} context: {}", kind, text);
        InjectOutcome::Injected(text)
    }

    /// Run a cycle every `period` until `shutdown` resolves, then clear the prompt.
    ///
    /// Cycles run one at a time; ticks missed during a slow cycle are skipped.
    pub async fn watch<F>(&self, period: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        tracing::info!(
            "Watching {} every {}s",
            self.extension.kind(),
            period.as_secs()
        );
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {}
            }
            tokio::select! {
                _ = &mut shutdown => break,
                outcome = self.run() => tracing::debug!("Injection cycle: {:?}", outcome),
            }
        }

        match self.extension.settings() {
            Ok(settings) => self.extension.clear_prompt(&settings),
            Err(e) => tracing::warn!("Failed to clear prompt on exit: {:#}", e),
        }
        tracing::info!("Stopped watching {}", self.extension.kind());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ItemKind, PlaybackSnapshot, ProviderKind};
    use crate::settings::{InjectionPosition, SettingsStore};
    use crate::testing::{fixture, FakeProvider, FakeResponse};

    fn playing() -> NowPlaying {
        NowPlaying::Playing(PlaybackSnapshot {
            title: "Song A".into(),
            artists: vec!["Artist B".into()],
            album: Some("Album C".into()),
            release_year: None,
            kind: ItemKind::Track,
        })
    }

    #[tokio::test]
    async fn test_run_injects_substituted_template() {
        let provider = FakeProvider::new(ProviderKind::Spotify).responding(FakeResponse::Ok(playing()));
        let (ext, host, store) = fixture(provider, true);
        let mut settings = store.load(ProviderKind::Spotify).unwrap();
        settings.template = "{{user}} listening to {{song}} by {{artist}}".into();
        store.save(ProviderKind::Spotify, &settings).unwrap();

        let outcome = PromptInjector::new(ext).run().await;

        assert_eq!(
            outcome,
            InjectOutcome::Injected("User listening to Song A by Artist B".into())
        );
        let prompts = host.prompts();
        assert_eq!(prompts.len(), 2);
        assert_eq!(prompts[0].1, "");
        assert_eq!(prompts[1].0, "spotify_inject");
        assert_eq!(prompts[1].1, "User listening to Song A by Artist B");
    }

    #[tokio::test]
    async fn test_run_after_logout_is_noop() {
        let provider = FakeProvider::new(ProviderKind::Spotify).responding(FakeResponse::Ok(playing()));
        let calls = provider.calls();
        let (ext, host, _store) = fixture(provider, true);
        ext.logout().unwrap();

        let outcome = PromptInjector::new(ext).run().await;

        assert_eq!(outcome, InjectOutcome::NotConfigured);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert!(host.prompts().iter().all(|p| p.1.is_empty()));
    }

    #[tokio::test]
    async fn test_position_none_is_not_configured() {
        let provider = FakeProvider::new(ProviderKind::YouTubeMusic).responding(FakeResponse::Ok(playing()));
        let (ext, _host, store) = fixture(provider, true);
        let mut settings = store.load(ProviderKind::YouTubeMusic).unwrap();
        settings.position = InjectionPosition::None;
        store.save(ProviderKind::YouTubeMusic, &settings).unwrap();

        assert_eq!(PromptInjector::new(ext).run().await, InjectOutcome::NotConfigured);
    }

    #[tokio::test]
    async fn test_nothing_playing_leaves_prompt_cleared() {
        let provider = FakeProvider::new(ProviderKind::Spotify).responding(FakeResponse::Ok(NowPlaying::Nothing));
        let (ext, host, _store) = fixture(provider, true);

        assert_eq!(PromptInjector::new(ext).run().await, InjectOutcome::NothingPlaying);
        assert_eq!(host.prompts().len(), 1);
        assert_eq!(host.prompts()[0].1, "");
    }

    #[tokio::test]
    async fn test_unauthorized_clears_credential() {
        let provider = FakeProvider::new(ProviderKind::Spotify).responding(FakeResponse::Status(401));
        let (ext, _host, store) = fixture(provider, true);

        assert_eq!(PromptInjector::new(ext).run().await, InjectOutcome::Failed);
        assert!(store.load(ProviderKind::Spotify).unwrap().credential.is_none());
    }

    #[tokio::test]
    async fn test_http_error_keeps_credential() {
        let provider = FakeProvider::new(ProviderKind::Spotify).responding(FakeResponse::Status(503));
        let (ext, _host, store) = fixture(provider, true);

        assert_eq!(PromptInjector::new(ext).run().await, InjectOutcome::Failed);
        assert!(store.load(ProviderKind::Spotify).unwrap().credential.is_some());
    }

    #[tokio::test]
    async fn test_logout_during_refresh_skips_injection() {
        let provider = FakeProvider::new(ProviderKind::Spotify)
            .responding(FakeResponse::Ok(playing()))
            .logout_during_refresh();
        let calls = provider.calls();
        let (ext, host, _store) = fixture(provider, true);

        assert_eq!(PromptInjector::new(ext).run().await, InjectOutcome::NotConfigured);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert!(host.prompts().iter().all(|p| p.1.is_empty()));
    }

    #[tokio::test]
    async fn test_watch_runs_until_shutdown_then_clears() {
        let provider = FakeProvider::new(ProviderKind::Spotify).responding(FakeResponse::Ok(playing()));
        let calls = provider.calls();
        let (ext, host, _store) = fixture(provider, true);
        let injector = PromptInjector::new(ext);

        injector
            .watch(
                Duration::from_millis(10),
                tokio::time::sleep(Duration::from_millis(100)),
            )
            .await;

        assert!(calls.load(std::sync::atomic::Ordering::SeqCst) >= 2);
        assert_eq!(host.prompts().last().map(|p| p.1.as_str()), Some(""));
    }
}

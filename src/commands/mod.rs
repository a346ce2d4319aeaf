//! CLI command handlers

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use url::Url;

use crate::api::{Provider, SpotifyProvider, YtMusicProvider};
use crate::auth::cookie::normalize_cookie;
use crate::auth::{
    now_secs, Authenticator, CompletionOutcome, Credential, FilePendingStore, OAuthConfig,
    OAuthEndpoint, SessionCookie,
};
use crate::config::{Config, ConfigStore};
use crate::extension::Extension;
use crate::host::{Host, LocalHost, NoticeLevel};
use crate::inject::{InjectOutcome, PromptInjector};
use crate::models::{NowPlaying, ProviderKind};
use crate::settings::schema;
use crate::tools::{self, ToolKey};

enum Backend {
    Spotify(Arc<SpotifyProvider>),
    YtMusic(Arc<YtMusicProvider>),
}

/// Everything one command invocation needs for a provider.
pub struct Session {
    config: Config,
    backend: Backend,
    extension: Extension,
}

impl Session {
    pub fn open(kind: ProviderKind, config_path: &Path) -> Result<Self> {
        let config = Config::load_from(config_path)?;
        let host = Arc::new(LocalHost::new(
            &config.user_name,
            &config.char_name,
            config.prompt_file.clone(),
        ));
        let store = Arc::new(ConfigStore::new(config_path.to_path_buf()));

        let (backend, provider): (Backend, Arc<dyn Provider>) = match kind {
            ProviderKind::Spotify => {
                let oauth = OAuthConfig::spotify(&config.redirect_uri);
                let pending = Arc::new(FilePendingStore::new(
                    Config::cache_dir()?.join("pending.toml"),
                ));
                let authenticator = Authenticator::new(
                    kind,
                    oauth.clone(),
                    Arc::new(OAuthEndpoint::new(oauth)),
                    pending,
                );
                let provider = Arc::new(SpotifyProvider::new(authenticator, config.api_base(kind)));
                (Backend::Spotify(provider.clone()), provider)
            }
            ProviderKind::YouTubeMusic => {
                let provider = Arc::new(YtMusicProvider::new(config.api_base(kind)));
                (Backend::YtMusic(provider.clone()), provider)
            }
        };

        let extension = Extension::new(provider, host, store);
        Ok(Self {
            config,
            backend,
            extension,
        })
    }

    fn kind(&self) -> ProviderKind {
        self.extension.kind()
    }

    fn host(&self) -> &dyn Host {
        self.extension.host()
    }

    /// Start a login: print the authorize URL (Spotify) or validate and
    /// store a session cookie (YouTube Music).
    pub async fn login(&self, cookie: Option<String>, cookie_file: Option<PathBuf>) -> Result<()> {
        match &self.backend {
            Backend::Spotify(provider) => {
                let settings = self.extension.settings()?;
                if settings.client_id.trim().is_empty() {
                    self.host().notify(
                        NoticeLevel::Error,
                        "Set your Spotify client ID first: now-playing settings set client_id <ID>",
                    );
                    return Ok(());
                }

                let url = provider
                    .authenticator()
                    .begin_authorization(settings.client_id.trim())?;
                println!();
                println!("To authorize, visit: {}", url);
                println!();
                println!("Then pass the page you are redirected to:");
                println!("  now-playing callback '<redirected URL>'");
                Ok(())
            }
            Backend::YtMusic(provider) => {
                let raw = match (cookie, cookie_file) {
                    (Some(cookie), _) => cookie,
                    (None, Some(path)) => fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read {}", path.display()))?,
                    (None, None) => bail!("Pass the YouTube Music cookie with --cookie or --cookie-file"),
                };
                let cookie = normalize_cookie(&raw);

                let name = match provider.validate_cookie(&cookie).await {
                    Ok(name) => name,
                    Err(e) => {
                        self.host().notify(
                            NoticeLevel::Error,
                            &format!("YouTube Music cookie was rejected: {}", e),
                        );
                        return Ok(());
                    }
                };

                let mut settings = self.extension.settings()?;
                settings.credential = Some(Credential::Session(SessionCookie::new(cookie, now_secs())));
                self.extension.save_settings(&settings)?;
                tools::sync(&self.extension)?;
                self.host().notify(
                    NoticeLevel::Success,
                    &format!("Logged in to YouTube Music as {}", name),
                );
                Ok(())
            }
        }
    }

    /// Finish a Spotify login from the redirect-back URL.
    pub async fn callback(&self, url: &str) -> Result<()> {
        let provider = match &self.backend {
            Backend::Spotify(provider) => provider,
            Backend::YtMusic(_) => bail!("YouTube Music logs in with a cookie; use `login --cookie`"),
        };
        let url = Url::parse(url).context("Invalid callback URL")?;

        let mut settings = self.extension.settings()?;
        let outcome = provider
            .authenticator()
            .complete_authorization(&mut settings, &url)
            .await?;

        match outcome {
            CompletionOutcome::NoCallback => {
                println!("No pending Spotify authorization matches that URL.");
            }
            CompletionOutcome::Denied(reason) => {
                self.host().notify(
                    NoticeLevel::Warning,
                    &format!("Spotify authorization was declined: {}", reason),
                );
            }
            CompletionOutcome::Failed(reason) => {
                self.host().notify(
                    NoticeLevel::Error,
                    &format!("Spotify login failed: {}", reason),
                );
            }
            CompletionOutcome::Authorized => {
                let mut current = self.extension.settings()?;
                current.credential = settings.credential;
                self.extension.save_settings(&current)?;
                tools::sync(&self.extension)?;

                let account = match self.extension.service().await? {
                    Some(service) => service.profile_name().await.ok(),
                    None => None,
                };
                let message = match account {
                    Some(name) => format!("Logged in to Spotify as {}", name),
                    None => "Logged in to Spotify".to_string(),
                };
                self.host().notify(NoticeLevel::Success, &message);
            }
        }
        Ok(())
    }

    pub fn logout(&self) -> Result<()> {
        self.extension.logout()?;
        tools::sync(&self.extension)?;
        self.host().notify(
            NoticeLevel::Info,
            &format!("Logged out of {}.", self.kind().display_name()),
        );
        Ok(())
    }

    pub async fn status(&self) -> Result<()> {
        let kind = self.kind();
        let settings = self.extension.settings()?;
        let now = now_secs();

        println!("Provider:    {}", kind.display_name());
        if kind == ProviderKind::Spotify {
            match settings.client_id.as_str() {
                "" => println!("Client ID:   none"),
                id => println!("Client ID:   {}", id),
            }
        }

        match &settings.credential {
            Some(Credential::Oauth(token)) if !token.is_expired(now) => {
                println!("Token:       valid");
                println!("  expires_at: {}", format_time(token.expires_at));
                if token.refresh_token.is_some() {
                    println!("  refresh:    present");
                }
            }
            Some(Credential::Oauth(_)) => println!("Token:       expired"),
            Some(Credential::Session(cookie)) => {
                let state = if cookie.expires_soon(now) {
                    "expiring soon"
                } else {
                    "stored"
                };
                println!("Cookie:      {}", state);
                println!("  expires_at: {}", format_time(cookie.expires_at));
            }
            None => println!("Credential:  none"),
        }

        if let Backend::Spotify(provider) = &self.backend {
            if let Some(pending) = provider.authenticator().pending()? {
                println!("Pending:     authorization started {}", format_time(pending.created_at));
            }
        }

        if let Some(service) = self.extension.service().await? {
            match service.profile_name().await {
                Ok(name) => println!("Account:     {}", name),
                Err(e) => {
                    println!("Account:     unavailable ({})", e);
                    self.extension.handle_api_error(&e);
                }
            }
        }

        println!(
            "Injection:   {}",
            if settings.injection_enabled() {
                format!("{} (depth {}, role {})", settings.position, settings.depth, settings.role)
            } else {
                "off".to_string()
            }
        );
        Ok(())
    }

    /// Print what is playing without injecting it.
    pub async fn now(&self) -> Result<()> {
        let kind = self.kind();
        let Some(service) = self.extension.service().await? else {
            println!("Not logged in to {}.", kind.display_name());
            return Ok(());
        };

        let playing = match service.currently_playing().await {
            Ok(playing) => playing,
            Err(e) => {
                self.extension.handle_api_error(&e);
                return Err(e).context("Failed to get the current track");
            }
        };

        match playing {
            NowPlaying::Playing(snapshot) => {
                println!("{}", snapshot.title);
                if !snapshot.artists.is_empty() {
                    println!("  Artist: {}", snapshot.artists.join(", "));
                }
                if let Some(album) = &snapshot.album {
                    println!("  Album:  {}", album);
                }
                if let Some(year) = &snapshot.release_year {
                    println!("  Year:   {}", year);
                }
                if kind == ProviderKind::YouTubeMusic {
                    println!("  (most recent history entry; may not be playing now)");
                }
            }
            NowPlaying::Nothing => println!("Nothing playing."),
        }
        Ok(())
    }

    pub async fn inject(&self) -> Result<()> {
        match PromptInjector::new(self.extension.clone()).run().await {
            InjectOutcome::Injected(_) => {}
            InjectOutcome::NothingPlaying => println!("Nothing playing; prompt cleared."),
            InjectOutcome::NotConfigured => println!(
                "{} injection is not configured (log in and set a template and position).",
                self.kind().display_name()
            ),
            InjectOutcome::Failed => bail!("Injection failed; see the log for details"),
        }
        Ok(())
    }

    pub async fn watch(&self, interval: Option<u64>) -> Result<()> {
        let secs = interval.unwrap_or(self.config.poll_interval_secs).max(1);
        tools::sync(&self.extension)?;

        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        };
        PromptInjector::new(self.extension.clone())
            .watch(Duration::from_secs(secs), shutdown)
            .await;
        Ok(())
    }

    pub async fn tools_list(&self) -> Result<()> {
        let kind = self.kind();
        tools::sync(&self.extension)?;
        let registered = self.host().registered_tools();
        let supported = self.extension.provider().supported_tools();

        let active = futures::future::join_all(
            registered.iter().map(|tool| tool.action.should_register()),
        )
        .await;

        println!("\n{} tools:", kind.display_name());
        println!("{:-<60}", "");
        for key in ToolKey::ALL {
            let name = key.tool_name(kind);
            let state = match registered.iter().position(|t| t.name == name) {
                Some(i) if active[i] => "active",
                Some(_) => "registered, not logged in",
                None if supported.contains(&key) => "disabled",
                None => "unsupported",
            };
            println!("{}", name);
            println!("  [{}] {}", state, key.description(kind));
            println!();
        }
        Ok(())
    }

    pub async fn tools_call(&self, name: &str, args: Option<&str>) -> Result<()> {
        tools::sync(&self.extension)?;
        let tool = self
            .host()
            .registered_tools()
            .into_iter()
            .find(|t| t.name == name)
            .with_context(|| format!("No enabled tool named '{}'", name))?;

        let args = match args {
            Some(raw) => serde_json::from_str(raw).context("--args must be a JSON object")?,
            None => serde_json::json!({}),
        };
        if !tool.action.should_register().await {
            tracing::warn!("{} would not be offered to the model right now", tool.name);
        }

        println!("{}", tool.action.invoke(args).await);
        Ok(())
    }

    pub fn settings_show(&self) -> Result<()> {
        let kind = self.kind();
        let settings = self.extension.settings()?;
        let rows = schema::render(kind, &settings)?;
        let width = rows.iter().map(|(label, _, _)| label.len()).max().unwrap_or(0);

        println!("\n{} settings:", kind.display_name());
        println!("{:-<60}", "");
        for (label, key, value) in rows {
            println!("{:<width$}  {} = {}", label, key, value, width = width);
        }
        Ok(())
    }

    pub fn settings_set(&self, key: &str, value: &str) -> Result<()> {
        let kind = self.kind();
        let settings = self.extension.settings()?;
        let updated = schema::apply(kind, &settings, key, value)?;
        self.extension.save_settings(&updated)?;
        tools::sync(&self.extension)?;
        println!("{}.{} updated.", kind, key);
        Ok(())
    }
}

fn format_time(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|t| t.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| secs.to_string())
}

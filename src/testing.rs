//! In-memory fakes of the host, stores, token endpoint and provider

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::api::{ApiError, MusicService, Provider};
use crate::auth::oauth::TokenEndpoint;
use crate::auth::pending::{PendingAuthorization, PendingStore};
use crate::auth::tokens::{
    now_secs, Credential, OAuthToken, SessionCookie, TokenGrant, COOKIE_SOFT_LIFETIME_SECS,
};
use crate::extension::Extension;
use crate::host::{substitute, Host, NoticeLevel};
use crate::models::{
    ControlOutcome, ItemSummary, NowPlaying, PlaybackAction, PlaylistSummary, ProviderKind,
    SearchKind, TemplateVars, TimeRange,
};
use crate::settings::{ExtensionSettings, InjectionPosition, InjectionRole, SettingsStore};
use crate::tools::{FunctionTool, ToolKey};

#[derive(Default)]
pub struct MemoryPendingStore {
    entries: Mutex<HashMap<ProviderKind, PendingAuthorization>>,
}

impl PendingStore for MemoryPendingStore {
    fn get(&self, kind: ProviderKind) -> Result<Option<PendingAuthorization>> {
        Ok(self.entries.lock().unwrap().get(&kind).cloned())
    }

    fn put(&self, kind: ProviderKind, pending: PendingAuthorization) -> Result<()> {
        self.entries.lock().unwrap().insert(kind, pending);
        Ok(())
    }

    fn remove(&self, kind: ProviderKind) -> Result<()> {
        self.entries.lock().unwrap().remove(&kind);
        Ok(())
    }
}

/// Token endpoint answering every request with the same grant, or failing.
pub struct FakeTokenEndpoint {
    grant: Option<TokenGrant>,
    exchanges: Mutex<Vec<(String, String, String)>>,
    refreshes: Mutex<Vec<String>>,
}

impl Default for FakeTokenEndpoint {
    fn default() -> Self {
        Self::granting("fake-access", None)
    }
}

impl FakeTokenEndpoint {
    pub fn granting(access: &str, refresh: Option<&str>) -> Self {
        Self {
            grant: Some(TokenGrant {
                access_token: access.to_string(),
                refresh_token: refresh.map(String::from),
                expires_in: Some(3600),
                scope: None,
            }),
            exchanges: Mutex::new(Vec::new()),
            refreshes: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            grant: None,
            ..Self::default()
        }
    }

    /// `(client_id, code, verifier)` of every code exchange.
    pub fn exchanges(&self) -> Vec<(String, String, String)> {
        self.exchanges.lock().unwrap().clone()
    }

    pub fn refreshes(&self) -> Vec<String> {
        self.refreshes.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.exchanges.lock().unwrap().len() + self.refreshes.lock().unwrap().len()
    }

    fn answer(&self) -> Result<TokenGrant> {
        match &self.grant {
            Some(grant) => Ok(grant.clone()),
            None => bail!("token endpoint returned HTTP 400: invalid_grant"),
        }
    }
}

#[async_trait]
impl TokenEndpoint for FakeTokenEndpoint {
    async fn exchange_code(
        &self,
        client_id: &str,
        code: &str,
        verifier: &str,
    ) -> Result<TokenGrant> {
        self.exchanges.lock().unwrap().push((
            client_id.to_string(),
            code.to_string(),
            verifier.to_string(),
        ));
        self.answer()
    }

    async fn refresh(&self, _client_id: &str, refresh_token: &str) -> Result<TokenGrant> {
        self.refreshes.lock().unwrap().push(refresh_token.to_string());
        self.answer()
    }
}

#[derive(Default)]
pub struct MemorySettingsStore {
    settings: Mutex<BTreeMap<ProviderKind, ExtensionSettings>>,
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self, kind: ProviderKind) -> Result<ExtensionSettings> {
        Ok(self
            .settings
            .lock()
            .unwrap()
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| ExtensionSettings::defaults(kind)))
    }

    fn save(&self, kind: ProviderKind, settings: &ExtensionSettings) -> Result<()> {
        self.settings.lock().unwrap().insert(kind, settings.clone());
        Ok(())
    }
}

pub type PromptCall = (String, String, InjectionPosition, u32, bool, InjectionRole);

/// Host that records every call. `{{user}}` resolves to "User".
#[derive(Default)]
pub struct RecordingHost {
    prompts: Mutex<Vec<PromptCall>>,
    tools: Mutex<BTreeMap<String, FunctionTool>>,
    notices: Mutex<Vec<(NoticeLevel, String)>>,
}

impl RecordingHost {
    pub fn prompts(&self) -> Vec<PromptCall> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn notices(&self) -> Vec<(NoticeLevel, String)> {
        self.notices.lock().unwrap().clone()
    }
}

impl Host for RecordingHost {
    fn set_extension_prompt(
        &self,
        id: &str,
        text: &str,
        position: InjectionPosition,
        depth: u32,
        scan: bool,
        role: InjectionRole,
    ) {
        self.prompts.lock().unwrap().push((
            id.to_string(),
            text.to_string(),
            position,
            depth,
            scan,
            role,
        ));
    }

    fn substitute_params(&self, template: &str, vars: &TemplateVars) -> String {
        let mut all = vars.clone();
        all.insert("user".to_string(), "User".to_string());
        all.insert("char".to_string(), "Char".to_string());
        substitute(template, &all)
    }

    fn register_function_tool(&self, tool: FunctionTool) {
        self.tools.lock().unwrap().insert(tool.name.clone(), tool);
    }

    fn unregister_function_tool(&self, name: &str) {
        self.tools.lock().unwrap().remove(name);
    }

    fn registered_tools(&self) -> Vec<FunctionTool> {
        self.tools.lock().unwrap().values().cloned().collect()
    }

    fn notify(&self, level: NoticeLevel, message: &str) {
        self.notices
            .lock()
            .unwrap()
            .push((level, message.to_string()));
    }
}

/// What the fake service answers to `currently_playing`.
#[derive(Debug, Clone)]
pub enum FakeResponse {
    Ok(NowPlaying),
    /// HTTP status; 401 maps to `Unauthorized`
    Status(u16),
}

pub struct FakeService {
    response: FakeResponse,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl MusicService for FakeService {
    async fn profile_name(&self) -> Result<String, ApiError> {
        Ok("Fake User".to_string())
    }

    async fn currently_playing(&self) -> Result<NowPlaying, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.response {
            FakeResponse::Ok(now) => Ok(now.clone()),
            FakeResponse::Status(401) => Err(ApiError::Unauthorized),
            FakeResponse::Status(status) => Err(ApiError::Http {
                status: *status,
                url: "fake://currently-playing".to_string(),
                body: String::new(),
            }),
        }
    }

    async fn search(&self, _query: &str, _kind: SearchKind) -> Result<Vec<ItemSummary>, ApiError> {
        Ok(vec![ItemSummary {
            name: "Song A".to_string(),
            artists: vec!["Artist B".to_string()],
            album: Some("Album C".to_string()),
            uri: Some("fake:track:1".to_string()),
        }])
    }

    async fn top_items(&self, _range: TimeRange) -> Result<Vec<ItemSummary>, ApiError> {
        Ok(Vec::new())
    }

    async fn recent_items(&self, _limit: u32) -> Result<Vec<ItemSummary>, ApiError> {
        Ok(Vec::new())
    }

    async fn playlists(&self) -> Result<Vec<PlaylistSummary>, ApiError> {
        Ok(Vec::new())
    }

    async fn playlist_items(&self, _playlist: &str) -> Result<Vec<ItemSummary>, ApiError> {
        Ok(Vec::new())
    }

    async fn control_playback(
        &self,
        _action: PlaybackAction,
        _target: Option<&str>,
    ) -> Result<ControlOutcome, ApiError> {
        Ok(ControlOutcome::NoActiveDevice)
    }
}

pub struct FakeProvider {
    kind: ProviderKind,
    tools: &'static [ToolKey],
    response: FakeResponse,
    calls: Arc<AtomicUsize>,
    rotate: bool,
    logout_on_refresh: bool,
    store: Option<Arc<MemorySettingsStore>>,
}

impl FakeProvider {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            tools: &ToolKey::ALL,
            response: FakeResponse::Ok(NowPlaying::Nothing),
            calls: Arc::new(AtomicUsize::new(0)),
            rotate: false,
            logout_on_refresh: false,
            store: None,
        }
    }

    pub fn responding(mut self, response: FakeResponse) -> Self {
        self.response = response;
        self
    }

    pub fn supporting(mut self, tools: &'static [ToolKey]) -> Self {
        self.tools = tools;
        self
    }

    /// Replace the credential with [`Self::rotated_credential`] on refresh.
    pub fn rotating_credential(mut self) -> Self {
        self.rotate = true;
        self
    }

    /// Log out through the store while the refresh is in flight.
    pub fn logout_during_refresh(mut self) -> Self {
        self.logout_on_refresh = true;
        self
    }

    /// Number of `currently_playing` calls made by services of this provider.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    pub fn rotated_credential() -> Credential {
        Credential::Oauth(OAuthToken {
            access_token: "rotated".to_string(),
            refresh_token: Some("rt".to_string()),
            expires_at: 4_000_000_000,
            scope: None,
        })
    }

    fn initial_credential(kind: ProviderKind) -> Credential {
        match kind {
            ProviderKind::Spotify => Credential::Oauth(OAuthToken {
                access_token: "access".to_string(),
                refresh_token: Some("rt".to_string()),
                expires_at: now_secs() + 3600,
                scope: None,
            }),
            ProviderKind::YouTubeMusic => Credential::Session(SessionCookie {
                cookie: "SAPISID=abc".to_string(),
                expires_at: now_secs() + COOKIE_SOFT_LIFETIME_SECS,
            }),
        }
    }
}

#[async_trait]
impl Provider for FakeProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn supported_tools(&self) -> &'static [ToolKey] {
        self.tools
    }

    fn is_configured(&self, settings: &ExtensionSettings) -> bool {
        self.kind != ProviderKind::Spotify || !settings.client_id.is_empty()
    }

    async fn refresh_credential(&self, settings: &mut ExtensionSettings, _host: &dyn Host) {
        if self.rotate {
            settings.credential = Some(Self::rotated_credential());
        }
        if self.logout_on_refresh {
            if let Some(store) = &self.store {
                let mut stored = store.load(self.kind).unwrap();
                stored.credential = None;
                store.save(self.kind, &stored).unwrap();
            }
        }
    }

    fn service(&self, settings: &ExtensionSettings) -> Option<Box<dyn MusicService>> {
        settings.credential.as_ref()?;
        Some(Box::new(FakeService {
            response: self.response.clone(),
            calls: self.calls.clone(),
        }))
    }
}

/// Extension over a fake provider, a recording host and a memory store.
/// `logged_in` seeds a client id and a valid credential.
pub fn fixture(
    mut provider: FakeProvider,
    logged_in: bool,
) -> (Extension, Arc<RecordingHost>, Arc<MemorySettingsStore>) {
    let kind = provider.kind;
    let host = Arc::new(RecordingHost::default());
    let store = Arc::new(MemorySettingsStore::default());

    let mut settings = ExtensionSettings::defaults(kind);
    settings.client_id = "client-1".to_string();
    if logged_in {
        settings.credential = Some(FakeProvider::initial_credential(kind));
    }
    store.save(kind, &settings).unwrap();

    provider.store = Some(store.clone());
    let ext = Extension::new(Arc::new(provider), host.clone(), store.clone());
    (ext, host, store)
}

//! Remote persona config synchronization
//!
//! Lists and downloads persona config bundles from the council API with a
//! bearer credential, validates them, and persists the synchronized bundle
//! in [`SyncState`].

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{CacheKeys, TtlCache};
use crate::error::{Error, NetworkErrorKind, Result};
use crate::network::{Request, RetryClient};
use crate::persona::{PersonaConfig, PersonaSource, RawPersona};

use super::state::SyncState;

const LIST_TTL: Duration = Duration::from_secs(2 * 60);
const DOWNLOAD_TTL: Duration = Duration::from_secs(10 * 60);
const LIST_TIMEOUT: Duration = Duration::from_secs(10);
const LIST_RETRIES: u32 = 2;
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(15);

const REQUIRED_CONFIG_FIELDS: [&str; 3] = ["id", "name", "version"];

// ─────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────

/// A remote config as listed by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSummary {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Persona ids in the bundle
    #[serde(default)]
    pub personas: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    pub version: String,
}

/// Point-in-time view of the synchronizer
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub has_credential: bool,
    pub api_base_url: String,
    pub current_config_id: Option<String>,
    pub current_config_name: Option<String>,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub auto_sync_enabled: bool,
    pub sync_in_progress: bool,
}

/// Outcome of comparing the local config with its remote listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateCheck {
    pub config_id: String,
    pub local_version: String,
    pub remote_version: String,
    pub update_available: bool,
}

/// Remote persona config access
#[async_trait]
pub trait ConfigSynchronizer: Send + Sync {
    /// Configs the credential can access
    async fn list_remote_configs(&self) -> Result<Vec<ConfigSummary>>;

    /// Download and validate one config without persisting it
    async fn download_config(&self, config_id: &str) -> Result<PersonaConfig>;

    /// Download `config_id`, hand it to `apply`, then persist it as the
    /// current config
    ///
    /// State is written only after `apply` accepts the config; any error
    /// before that leaves it untouched.
    async fn sync_from_remote(
        &self,
        config_id: &str,
        apply: &(dyn for<'c> Fn(&'c PersonaConfig) -> Result<()> + Send + Sync),
    ) -> Result<PersonaConfig>;

    /// Compare the current config's version with the remote listing
    ///
    /// Only reports; never applies the update.
    async fn check_for_updates(&self) -> Result<Option<UpdateCheck>>;

    fn sync_status(&self) -> SyncStatus;

    fn current_config(&self) -> Option<PersonaConfig>;
}

// ─────────────────────────────────────────────────────────────────
// Remote Synchronizer
// ─────────────────────────────────────────────────────────────────

/// Clears the in-progress flag when a sync ends
struct SyncGuard<'a>(&'a AtomicBool);

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// [`ConfigSynchronizer`] over the council HTTP API
pub struct RemoteConfigSync {
    client: RetryClient,
    state_path: PathBuf,
    state: RwLock<SyncState>,
    summaries: TtlCache<Vec<ConfigSummary>>,
    configs: TtlCache<PersonaConfig>,
    keys: CacheKeys,
    in_progress: AtomicBool,
}

impl RemoteConfigSync {
    /// Load state from `state_path`; a missing file starts from defaults
    pub fn new(client: RetryClient, state_path: impl Into<PathBuf>) -> Self {
        let state_path = state_path.into();
        let state = SyncState::load(&state_path);
        Self::with_state(client, state_path, state)
    }

    pub fn with_state(client: RetryClient, state_path: impl Into<PathBuf>, state: SyncState) -> Self {
        let max_size = state.cache.max_size.max(1);
        Self {
            client,
            state_path: state_path.into(),
            state: RwLock::new(state),
            summaries: TtlCache::new(max_size, LIST_TTL),
            configs: TtlCache::new(max_size, DOWNLOAD_TTL),
            keys: CacheKeys::default(),
            in_progress: AtomicBool::new(false),
        }
    }

    /// Override the credential for this process without persisting it
    pub fn with_credential(self, credential: impl Into<String>) -> Self {
        self.state.write().credential = credential.into();
        self
    }

    /// Override the API base URL for this process without persisting it
    pub fn with_api_base_url(self, api_base_url: impl Into<String>) -> Self {
        self.state.write().api_base_url = api_base_url.into();
        self
    }

    /// Store a new credential and persist it
    pub fn set_credential(&self, credential: impl Into<String>) -> Result<()> {
        let mut next = self.state.read().clone();
        next.credential = credential.into();
        next.save(&self.state_path)?;
        *self.state.write() = next;
        self.summaries.clear();
        info!("Credential updated");
        Ok(())
    }

    pub fn clear_cache(&self) {
        self.summaries.clear();
        self.configs.clear();
        debug!("Config cache cleared");
    }

    pub fn state_path(&self) -> &PathBuf {
        &self.state_path
    }

    /// Periodically run [`ConfigSynchronizer::check_for_updates`] until
    /// `token` fires; `None` when auto-sync is disabled
    pub fn spawn_auto_check(self: &Arc<Self>, token: CancellationToken) -> Option<JoinHandle<()>> {
        let (enabled, interval_ms) = {
            let state = self.state.read();
            (state.sync.auto_sync, state.sync.sync_interval)
        };
        if !enabled || interval_ms == 0 {
            return None;
        }

        let period = Duration::from_millis(interval_ms);
        let this = Arc::clone(self);
        info!(interval_ms, "Auto-sync update checks started");
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = this.check_for_updates().await {
                            warn!(error = %e, "Update check failed");
                        }
                    }
                }
            }
            debug!("Auto-sync update checks stopped");
        }))
    }

    /// Credential and base URL, or `Auth` when no credential is configured
    fn credentials(&self) -> Result<(String, String)> {
        let state = self.state.read();
        if !state.has_credential() {
            return Err(Error::auth(
                "no credential configured; set sync.credential before using remote configs",
            ));
        }
        Ok((
            state.credential.clone(),
            state.api_base_url.trim_end_matches('/').to_string(),
        ))
    }

    fn retry_attempts(&self) -> u32 {
        self.state.read().sync.retry_attempts
    }
}

#[async_trait]
impl ConfigSynchronizer for RemoteConfigSync {
    async fn list_remote_configs(&self) -> Result<Vec<ConfigSummary>> {
        let (credential, base) = self.credentials()?;

        let key = self.keys.user_configs(&credential);
        if let Some(cached) = self.summaries.get(&key) {
            debug!(count = cached.len(), "Using cached config list");
            return Ok(cached);
        }

        let url = format!("{}/api/configs", base);
        let request = Request::get(&url)
            .with_bearer(&credential)
            .with_timeout(LIST_TIMEOUT)
            .with_retries(LIST_RETRIES, self.client.config().retry_delay);
        let response = self.client.request(request).await.map_err(rejected_credential)?;

        let data = envelope(&url, response.data)?;
        let configs: Vec<ConfigSummary> = serde_json::from_value(data)
            .map_err(|e| Error::config_validation(format!("malformed config list: {}", e)))?;

        self.summaries.set(key, configs.clone(), Some(LIST_TTL));
        info!(count = configs.len(), "Remote configs listed");
        Ok(configs)
    }

    async fn download_config(&self, config_id: &str) -> Result<PersonaConfig> {
        let (credential, base) = self.credentials()?;

        let key = self.keys.config(config_id);
        if let Some(cached) = self.configs.get(&key) {
            debug!(config = %config_id, "Using cached config");
            return Ok(cached);
        }

        let url = Url::parse_with_params(&format!("{}/api/download", base), &[("configId", config_id)])
            .map_err(|e| Error::config_field_invalid("sync.api_base_url", e.to_string()))?;
        let request = Request::get(url.as_str())
            .with_bearer(&credential)
            .with_timeout(DOWNLOAD_TIMEOUT)
            .with_retries(self.retry_attempts(), self.client.config().retry_delay);
        let response = self.client.request(request).await.map_err(rejected_credential)?;

        let data = envelope(url.as_str(), response.data)?;
        let config = validate_config(data)?;

        self.configs.set(key, config.clone(), Some(DOWNLOAD_TTL));
        info!(config = %config.id, name = %config.name, personas = config.personas.len(), "Config downloaded");
        Ok(config)
    }

    async fn sync_from_remote(
        &self,
        config_id: &str,
        apply: &(dyn for<'c> Fn(&'c PersonaConfig) -> Result<()> + Send + Sync),
    ) -> Result<PersonaConfig> {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::validation("config_id", "another sync is already in progress"));
        }
        let _guard = SyncGuard(&self.in_progress);

        info!(config = %config_id, "Sync started");
        let listed = self.list_remote_configs().await?;
        if !listed.iter().any(|c| c.id == config_id) {
            return Err(Error::NotFound {
                what: "Config".to_string(),
                id: config_id.to_string(),
                hints: vec![
                    "Use 'list_persona_configs' to see the configs your credential can access."
                        .to_string(),
                ],
            });
        }

        let config = self.download_config(config_id).await?;
        apply(&config)?;

        let mut next = self.state.read().clone();
        next.current_config = Some(config.clone());
        next.last_sync_time = Some(Utc::now());
        next.save(&self.state_path)?;
        *self.state.write() = next;

        info!(config = %config.id, name = %config.name, "Sync completed");
        Ok(config)
    }

    async fn check_for_updates(&self) -> Result<Option<UpdateCheck>> {
        let Some(current) = self.current_config() else {
            return Ok(None);
        };
        if self.in_progress.load(Ordering::SeqCst) {
            return Ok(None);
        }

        let listed = self.list_remote_configs().await?;
        let Some(remote) = listed.into_iter().find(|c| c.id == current.id) else {
            return Ok(None);
        };

        let check = UpdateCheck {
            update_available: remote.version != current.version,
            config_id: current.id,
            local_version: current.version,
            remote_version: remote.version,
        };
        if check.update_available {
            info!(
                config = %check.config_id,
                local = %check.local_version,
                remote = %check.remote_version,
                "Config update available; sync manually to apply it"
            );
        }
        Ok(Some(check))
    }

    fn sync_status(&self) -> SyncStatus {
        let state = self.state.read();
        SyncStatus {
            has_credential: state.has_credential(),
            api_base_url: state.api_base_url.clone(),
            current_config_id: state.current_config.as_ref().map(|c| c.id.clone()),
            current_config_name: state.current_config.as_ref().map(|c| c.name.clone()),
            last_sync_time: state.last_sync_time,
            auto_sync_enabled: state.sync.auto_sync,
            sync_in_progress: self.in_progress.load(Ordering::SeqCst),
        }
    }

    fn current_config(&self) -> Option<PersonaConfig> {
        self.state.read().current_config.clone()
    }
}

// ─────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────

/// Map a rejected credential to `Auth`
fn rejected_credential(err: Error) -> Error {
    match err {
        Error::Network {
            kind: NetworkErrorKind::Http { status: status @ (401 | 403) },
            ..
        } => Error::auth(format!("credential rejected by the server (HTTP {})", status)),
        other => other,
    }
}

/// Unwrap a `{success, data, error?}` response body
fn envelope(url: &str, body: Value) -> Result<Value> {
    let success = body.get("success").and_then(Value::as_bool).unwrap_or(false);
    if !success {
        let message = body
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("server reported failure")
            .to_string();
        return Err(Error::network(url, NetworkErrorKind::Transport { message }));
    }
    Ok(body.get("data").cloned().unwrap_or(Value::Null))
}

fn non_empty_str(value: &Value, field: &str) -> bool {
    value
        .get(field)
        .and_then(Value::as_str)
        .map_or(false, |s| !s.trim().is_empty())
}

/// Check a downloaded bundle's shape before accepting it
fn validate_config(data: Value) -> Result<PersonaConfig> {
    for field in REQUIRED_CONFIG_FIELDS {
        if !non_empty_str(&data, field) {
            return Err(Error::config_field_invalid(field, format!("config is missing '{}'", field)));
        }
    }

    let personas = match data.get("personas").and_then(Value::as_array) {
        Some(personas) if !personas.is_empty() => personas,
        _ => {
            return Err(Error::config_field_invalid(
                "personas",
                "config must contain at least one persona",
            ))
        }
    };
    // Same acceptance rules as repository ingestion
    for (i, persona) in personas.iter().enumerate() {
        RawPersona::from_value(persona.clone())
            .and_then(|raw| raw.into_persona(PersonaSource::Local))
            .map_err(|e| {
                Error::config_field_invalid(
                    format!("personas[{}]", i),
                    format!("persona {} is invalid: {}", i + 1, e),
                )
            })?;
    }

    serde_json::from_value(data).map_err(|e| Error::config_validation(e.to_string()))
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

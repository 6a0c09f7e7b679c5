//! Resilient persona repository
//!
//! Resolution order for [`PersonaRepository::get_all`]:
//! 1. a fresh in-memory snapshot, merged with local personas
//! 2. remote sources, one at a time in priority order, stopping at the
//!    first one yielding at least one valid persona
//! 3. the built-in default set
//!
//! Source failures are logged and never surfaced while a fallback exists.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::{CacheKeys, CacheStats, TtlCache};
use crate::error::{Error, Result};
use crate::network::{Request, RetryClient};

use super::defaults::default_personas;
use super::search::{self, SearchHit};
use super::sources::{by_priority, default_sources, SourceConfig};
use super::types::{Persona, PersonaConfig, PersonaSource, RawPersona};

// ─────────────────────────────────────────────────────────────────
// Store Trait
// ─────────────────────────────────────────────────────────────────

/// Read access to the current persona set
#[async_trait]
pub trait PersonaStore: Send + Sync {
    /// Every persona currently available; never fails
    async fn get_all(&self) -> Vec<Persona>;

    /// Look up a persona by id
    async fn get_by_id(&self, id: &str) -> Option<Persona>;
}

// ─────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────

/// Repository tuning
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    pub sources: Vec<SourceConfig>,
    /// How long a resolved snapshot stays fresh
    pub cache_duration: Duration,
    /// Capacity of the per-persona lookup cache
    pub cache_max_size: usize,
    /// Default TTL of per-persona lookup entries
    pub cache_ttl: Duration,
    /// Delay before the background warm-up fetch
    pub warm_up_delay: Duration,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            sources: default_sources(),
            cache_duration: Duration::from_secs(5 * 60),
            cache_max_size: 1000,
            cache_ttl: Duration::from_secs(5 * 60),
            warm_up_delay: Duration::from_millis(100),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Stats
// ─────────────────────────────────────────────────────────────────

/// Repository statistics snapshot
#[derive(Debug, Clone, Serialize)]
pub struct RepositoryStats {
    pub total_personas: usize,
    pub local_personas: usize,
    pub cached_personas: usize,
    pub last_fetch_time: Option<DateTime<Utc>>,
    pub cache_valid: bool,
    pub by_source: BTreeMap<String, usize>,
    pub cache_stats: CacheStats,
}

// ─────────────────────────────────────────────────────────────────
// Repository
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct RepoState {
    /// Base set from exactly one successful source (remote or default)
    base: Vec<Persona>,
    fetched_at: Option<Instant>,
    fetched_at_utc: Option<DateTime<Utc>>,
    /// User-supplied personas; override base entries with the same id
    local: Vec<Persona>,
}

impl RepoState {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.map_or(false, |t| t.elapsed() < ttl)
    }

    fn merged(&self) -> Vec<Persona> {
        merge(&self.base, &self.local)
    }

    fn invalidate(&mut self) {
        self.base.clear();
        self.fetched_at = None;
        self.fetched_at_utc = None;
    }
}

/// Multi-source persona repository with caching and fallback
pub struct PersonaRepository {
    client: RetryClient,
    config: RepositoryConfig,
    state: RwLock<RepoState>,
    cache: TtlCache<Persona>,
    keys: CacheKeys,
    /// Serializes source resolution so concurrent callers fetch once
    resolve_lock: tokio::sync::Mutex<()>,
}

impl PersonaRepository {
    /// Create a repository with no local personas
    pub fn new(client: RetryClient, config: RepositoryConfig) -> Self {
        let cache = TtlCache::new(config.cache_max_size, config.cache_ttl);
        Self {
            client,
            config,
            state: RwLock::new(RepoState::default()),
            cache,
            keys: CacheKeys::default(),
            resolve_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Create a repository seeded with local persona records
    ///
    /// Invalid records are dropped with a warning.
    pub fn with_local(client: RetryClient, config: RepositoryConfig, local: Vec<Value>) -> Self {
        let repo = Self::new(client, config);
        let personas = parse_records(local, PersonaSource::Local);
        info!(count = personas.len(), "Local personas loaded");
        repo.state.write().local = personas;
        repo
    }

    /// Pre-populate the cache shortly after construction
    ///
    /// Runs on a background task; the caller is never blocked and failures
    /// only show up in the logs.
    pub fn spawn_warm_up(self: &Arc<Self>) -> JoinHandle<()> {
        let repo = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(repo.config.warm_up_delay).await;
            let count = repo.get_all().await.len();
            debug!(count, "Persona cache warmed up");
        })
    }

    // ─────────────────────────────────────────────────────────────
    // Resolution
    // ─────────────────────────────────────────────────────────────

    /// All personas: fresh snapshot, else remote sources, else defaults
    pub async fn get_all(&self) -> Vec<Persona> {
        if let Some(personas) = self.fresh_snapshot() {
            return personas;
        }

        let _guard = self.resolve_lock.lock().await;
        // Another caller may have resolved while we waited
        if let Some(personas) = self.fresh_snapshot() {
            return personas;
        }

        let (base, source) = match self.fetch_from_sources().await {
            Some(personas) => (personas, PersonaSource::Remote),
            None => {
                warn!("All persona sources failed, using built-in defaults");
                (default_personas(), PersonaSource::Default)
            }
        };

        self.cache.clear();
        for persona in &base {
            self.cache.set(self.keys.persona(&persona.id), persona.clone(), None);
        }

        let mut state = self.state.write();
        state.base = base;
        state.fetched_at = Some(Instant::now());
        state.fetched_at_utc = Some(Utc::now());
        let merged = state.merged();
        info!(
            source = %source,
            base = state.base.len(),
            local = state.local.len(),
            "Persona set resolved"
        );
        merged
    }

    fn fresh_snapshot(&self) -> Option<Vec<Persona>> {
        let state = self.state.read();
        state
            .is_fresh(self.config.cache_duration)
            .then(|| state.merged())
    }

    /// Try each source in priority order; `None` if every one failed
    async fn fetch_from_sources(&self) -> Option<Vec<Persona>> {
        for source in by_priority(&self.config.sources) {
            let request = Request::get(&source.url)
                .with_timeout(Duration::from_millis(source.timeout_ms))
                .with_retries(source.retry_attempts, self.client.config().retry_delay);

            match self.client.request(request).await {
                Ok(response) => match response.data {
                    Value::Array(items) => {
                        let personas = parse_records(items, PersonaSource::Remote);
                        if personas.is_empty() {
                            warn!(source = %source.name, "Source returned no valid personas");
                            continue;
                        }
                        info!(source = %source.name, count = personas.len(), "Personas fetched");
                        return Some(personas);
                    }
                    _ => {
                        warn!(source = %source.name, "Source response is not a JSON array");
                    }
                },
                Err(e) => {
                    warn!(source = %source.name, error = %e, "Persona source failed");
                }
            }
        }
        None
    }

    // ─────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────

    /// Look up a persona by id; local entries win
    pub async fn get_by_id(&self, id: &str) -> Option<Persona> {
        if let Some(p) = self.state.read().local.iter().find(|p| p.id == id) {
            return Some(p.clone());
        }
        if let Some(p) = self.cache.get(&self.keys.persona(id)) {
            return Some(p);
        }
        self.get_all().await.into_iter().find(|p| p.id == id)
    }

    /// Personas matching a free-text query, best match first
    pub async fn search(&self, query: &str) -> Vec<Persona> {
        self.search_ranked(query)
            .await
            .into_iter()
            .map(|hit| hit.persona)
            .collect()
    }

    /// Ranked search with per-field match explanation
    pub async fn search_ranked(&self, query: &str) -> Vec<SearchHit> {
        search::rank(&self.get_all().await, query)
    }

    /// Personas whose category equals `category` (case-insensitive)
    pub async fn get_by_category(&self, category: &str) -> Vec<Persona> {
        let wanted = category.to_lowercase();
        self.get_all()
            .await
            .into_iter()
            .filter(|p| p.category.as_deref().map(str::to_lowercase).as_deref() == Some(wanted.as_str()))
            .collect()
    }

    /// Sorted, de-duplicated category names
    pub async fn get_categories(&self) -> Vec<String> {
        let mut categories: Vec<String> = self
            .get_all()
            .await
            .into_iter()
            .filter_map(|p| p.category)
            .collect();
        categories.sort();
        categories.dedup();
        categories
    }

    // ─────────────────────────────────────────────────────────────
    // Mutation
    // ─────────────────────────────────────────────────────────────

    /// Replace the local persona set from a config bundle
    ///
    /// Invalidates the snapshot so the next read re-resolves. Returns the
    /// number of personas accepted.
    pub fn update_from_config(&self, config: &PersonaConfig) -> Result<usize> {
        if config.personas.is_empty() {
            return Err(Error::config_field_invalid(
                "personas",
                format!("config '{}' contains no personas", config.id),
            ));
        }

        let personas = parse_records(config.personas.clone(), PersonaSource::Local);
        if personas.is_empty() {
            return Err(Error::config_field_invalid(
                "personas",
                format!("config '{}' contains no valid personas", config.id),
            ));
        }

        let count = personas.len();
        {
            let mut state = self.state.write();
            state.local = personas;
            state.invalidate();
        }
        self.cache.clear();
        info!(config = %config.id, count, "Local personas replaced from config");
        Ok(count)
    }

    /// Drop the snapshot; the next read re-resolves from sources
    pub fn clear_cache(&self) {
        self.state.write().invalidate();
        self.cache.clear();
        debug!("Persona cache cleared");
    }

    /// Invalidate and immediately re-resolve
    pub async fn refresh_cache(&self) -> Vec<Persona> {
        self.clear_cache();
        self.get_all().await
    }

    /// Current statistics; does not trigger a fetch
    pub fn stats(&self) -> RepositoryStats {
        let state = self.state.read();
        let merged = state.merged();

        let mut by_source = BTreeMap::new();
        for p in &merged {
            *by_source.entry(p.source.to_string()).or_insert(0) += 1;
        }

        RepositoryStats {
            total_personas: merged.len(),
            local_personas: state.local.len(),
            cached_personas: state.base.len(),
            last_fetch_time: state.fetched_at_utc,
            cache_valid: state.is_fresh(self.config.cache_duration),
            by_source,
            cache_stats: self.cache.stats(),
        }
    }
}

#[async_trait]
impl PersonaStore for PersonaRepository {
    async fn get_all(&self) -> Vec<Persona> {
        PersonaRepository::get_all(self).await
    }

    async fn get_by_id(&self, id: &str) -> Option<Persona> {
        PersonaRepository::get_by_id(self, id).await
    }
}

// ─────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────

/// Validate raw records, dropping invalid ones and duplicate ids
pub fn parse_records(values: Vec<Value>, source: PersonaSource) -> Vec<Persona> {
    let mut seen = HashSet::new();
    let mut personas = Vec::with_capacity(values.len());

    for (index, value) in values.into_iter().enumerate() {
        match RawPersona::from_value(value).and_then(|raw| raw.into_persona(source)) {
            Ok(persona) => {
                if seen.insert(persona.id.clone()) {
                    personas.push(persona);
                } else {
                    warn!(id = %persona.id, source = %source, "Duplicate persona id dropped");
                }
            }
            Err(e) => warn!(index, source = %source, error = %e, "Invalid persona record dropped"),
        }
    }
    personas
}

/// Base set with local overrides applied and local-only ids appended
fn merge(base: &[Persona], local: &[Persona]) -> Vec<Persona> {
    let mut merged: Vec<Persona> = base
        .iter()
        .map(|b| local.iter().find(|l| l.id == b.id).unwrap_or(b).clone())
        .collect();

    let base_ids: HashSet<&str> = base.iter().map(|p| p.id.as_str()).collect();
    merged.extend(local.iter().filter(|l| !base_ids.contains(l.id.as_str())).cloned());
    merged
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{ClientConfig, MockReply, MockTransport};
    use serde_json::json;

    fn sources() -> Vec<SourceConfig> {
        (1..=3)
            .map(|i| SourceConfig {
                name: format!("s{}", i),
                url: format!("http://source{}", i),
                priority: i,
                timeout_ms: 100,
                retry_attempts: 0,
            })
            .collect()
    }

    fn repo_with(transport: Arc<MockTransport>, local: Vec<Value>) -> PersonaRepository {
        let client = RetryClient::new(
            transport,
            ClientConfig {
                retry_delay: Duration::from_millis(1),
                ..Default::default()
            },
        );
        let config = RepositoryConfig {
            sources: sources(),
            ..Default::default()
        };
        PersonaRepository::with_local(client, config, local)
    }

    fn record(id: &str, name: &str) -> Value {
        json!({"id": id, "name": name, "rule": "r", "goal": "g", "version": "1"})
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_sources_fail_falls_back_to_defaults() {
        let transport = Arc::new(MockTransport::new());
        transport.route("http://source1", MockReply::Status(500));
        transport.route("http://source2", MockReply::Fail("refused".into()));
        transport.route("http://source3", MockReply::Hang);
        let repo = repo_with(transport.clone(), vec![]);

        let personas = repo.get_all().await;

        assert!(!personas.is_empty());
        assert!(personas.iter().all(|p| p.source == PersonaSource::Default));
        assert_eq!(personas.len(), default_personas().len());
        assert_eq!(transport.calls("http://source3"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_valid_source_wins_in_priority_order() {
        let transport = Arc::new(MockTransport::new());
        transport.route("http://source1", MockReply::Json(200, json!({"not": "an array"})));
        transport.route("http://source2", MockReply::Json(200, json!([record("a", "A")])));
        transport.route("http://source3", MockReply::Json(200, json!([record("b", "B")])));
        let repo = repo_with(transport.clone(), vec![]);

        let personas = repo.get_all().await;
        assert_eq!(personas.len(), 1);
        assert_eq!(personas[0].id, "a");
        assert_eq!(personas[0].source, PersonaSource::Remote);
        assert_eq!(transport.calls("http://source3"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_or_all_invalid_array_is_a_failed_source() {
        let transport = Arc::new(MockTransport::new());
        transport.route("http://source1", MockReply::Json(200, json!([])));
        transport.route("http://source2", MockReply::Json(200, json!([{"id": "x"}, 5])));
        transport.route("http://source3", MockReply::Json(200, json!([record("c", "C")])));
        let repo = repo_with(transport, vec![]);

        let personas = repo.get_all().await;
        assert_eq!(personas.len(), 1);
        assert_eq!(personas[0].id, "c");
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_overrides_same_id_and_adds_new() {
        let transport = Arc::new(MockTransport::new());
        transport.route(
            "http://source1",
            MockReply::Json(200, json!([record("a", "Remote A"), record("b", "Remote B")])),
        );
        let repo = repo_with(
            transport,
            vec![record("a", "Local A"), record("z", "Local Z")],
        );

        let personas = repo.get_all().await;
        assert_eq!(personas.len(), 3);

        let a = personas.iter().find(|p| p.id == "a").unwrap();
        assert_eq!(a.name, "Local A");
        assert_eq!(a.source, PersonaSource::Local);
        assert!(personas.iter().any(|p| p.id == "z"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_reused_until_expiry() {
        let transport = Arc::new(MockTransport::new());
        transport.route("http://source1", MockReply::Json(200, json!([record("a", "A")])));
        let repo = repo_with(transport.clone(), vec![]);

        repo.get_all().await;
        repo.get_all().await;
        assert_eq!(transport.calls("http://source1"), 1);
        assert!(repo.stats().cache_valid);

        tokio::time::advance(Duration::from_secs(5 * 60)).await;
        assert!(!repo.stats().cache_valid);
        repo.get_all().await;
        assert_eq!(transport.calls("http://source1"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_from_config_replaces_local_and_invalidates() {
        let transport = Arc::new(MockTransport::new());
        transport.route("http://source1", MockReply::Json(200, json!([record("a", "A")])));
        let repo = repo_with(transport.clone(), vec![record("old", "Old")]);
        repo.get_all().await;

        let config = PersonaConfig {
            id: "cfg".into(),
            name: "Cfg".into(),
            version: "1".into(),
            description: None,
            personas: vec![record("new", "New"), json!({"id": "broken"})],
            updated_at: None,
        };
        assert_eq!(repo.update_from_config(&config).unwrap(), 1);
        assert!(!repo.stats().cache_valid);

        let personas = repo.get_all().await;
        assert!(personas.iter().any(|p| p.id == "new"));
        assert!(!personas.iter().any(|p| p.id == "old"));
        assert_eq!(transport.calls("http://source1"), 2);
    }

    #[tokio::test]
    async fn test_update_from_config_rejects_empty() {
        let repo = repo_with(Arc::new(MockTransport::new()), vec![]);
        let config = PersonaConfig {
            id: "cfg".into(),
            name: "Cfg".into(),
            version: "1".into(),
            description: None,
            personas: vec![json!({"name": "no id"})],
            updated_at: None,
        };
        let err = repo.update_from_config(&config).unwrap_err();
        assert!(matches!(err, Error::ConfigValidation { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_queries_over_defaults() {
        let repo = repo_with(Arc::new(MockTransport::new()), vec![]);

        let categories = repo.get_categories().await;
        assert_eq!(categories, vec!["analytical", "critical", "supportive"]);

        assert_eq!(repo.get_by_category("ANALYTICAL").await.len(), 2);
        assert!(repo.get_by_id("warm-sister").await.is_some());
        assert!(repo.get_by_id("missing").await.is_none());
        assert_eq!(repo.search("critic").await[0].id, "grumpy-critic");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_by_source() {
        let repo = repo_with(Arc::new(MockTransport::new()), vec![record("mine", "Mine")]);
        repo.get_all().await;

        let stats = repo.stats();
        assert_eq!(stats.local_personas, 1);
        assert_eq!(stats.by_source["local"], 1);
        assert_eq!(stats.by_source["default"], default_personas().len());
        assert!(stats.last_fetch_time.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_warm_up_populates_cache() {
        let repo = Arc::new(repo_with(Arc::new(MockTransport::new()), vec![]));
        assert!(!repo.stats().cache_valid);

        repo.spawn_warm_up().await.unwrap();
        assert!(repo.stats().cache_valid);
    }
}

//! Tool dispatch
//!
//! Every inbound operation runs through [`ToolService::call`]: arguments
//! are sanitized, validated before any I/O, executed, timed and recorded.
//! Failures come back as [`ErrorResponse`] values, never as panics.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::collaboration::{CollaborationMode, Orchestrator};
use crate::error::{Error, ErrorResponse, Result};
use crate::persona::{Persona, PersonaConfig, PersonaRepository, PersonaSource};
use crate::sync::ConfigSynchronizer;

use super::args::{bounded_str, config_id, opt_str, opt_str_list, sanitize_args};
use super::stats::ToolStats;

const PERSONA_NAME_MAX: usize = 50;
const QUERY_MIN: usize = 5;
const QUERY_MAX: usize = 2000;
const PERSONA_IDS_MAX: usize = 10;
const SUGGESTIONS: usize = 3;

// ─────────────────────────────────────────────────────────────────
// Tool Names
// ─────────────────────────────────────────────────────────────────

/// Operations exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    SummonPersona,
    ListPersonas,
    SearchPersonas,
    ListPersonaConfigs,
    DownloadPersonaConfig,
    StartCollaboration,
    GetToolStats,
}

impl Tool {
    pub const ALL: [Tool; 7] = [
        Tool::SummonPersona,
        Tool::ListPersonas,
        Tool::SearchPersonas,
        Tool::ListPersonaConfigs,
        Tool::DownloadPersonaConfig,
        Tool::StartCollaboration,
        Tool::GetToolStats,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tool::SummonPersona => "summon_persona",
            Tool::ListPersonas => "list_personas",
            Tool::SearchPersonas => "search_personas",
            Tool::ListPersonaConfigs => "list_persona_configs",
            Tool::DownloadPersonaConfig => "download_persona_config",
            Tool::StartCollaboration => "start_collaboration",
            Tool::GetToolStats => "get_tool_stats",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Tool::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Compact persona entry for listings
#[derive(Debug, Clone, Serialize)]
pub struct PersonaListing {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl From<&Persona> for PersonaListing {
    fn from(p: &Persona) -> Self {
        Self {
            id: p.id.clone(),
            name: p.name.clone(),
            description: p.description_or_default().to_string(),
            category: p.category.clone(),
            tags: p.tags.clone(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Service
// ─────────────────────────────────────────────────────────────────

/// Validating, instrumented front door to the council
pub struct ToolService {
    repository: Arc<PersonaRepository>,
    orchestrator: Arc<Orchestrator>,
    sync: Arc<dyn ConfigSynchronizer>,
    stats: ToolStats,
}

impl ToolService {
    pub fn new(
        repository: Arc<PersonaRepository>,
        orchestrator: Arc<Orchestrator>,
        sync: Arc<dyn ConfigSynchronizer>,
    ) -> Self {
        Self {
            repository,
            orchestrator,
            sync,
            stats: ToolStats::new(),
        }
    }

    pub fn stats(&self) -> &ToolStats {
        &self.stats
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Run the tool called `name` with raw JSON arguments
    pub async fn call(&self, name: &str, args: Value) -> std::result::Result<Value, ErrorResponse> {
        let Some(tool) = Tool::parse(name) else {
            let err = Error::validation(
                "tool",
                format!(
                    "unknown tool '{}'; available: {}",
                    name,
                    Tool::ALL.map(|t| t.as_str()).join(", ")
                ),
            );
            return Err(ErrorResponse::from(&err));
        };

        let started = Instant::now();
        let args = sanitize_args(args);
        let outcome = self.dispatch(tool, &args).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        self.stats.record(tool.as_str(), outcome.is_ok(), elapsed_ms);

        match outcome {
            Ok(value) => {
                debug!(tool = %tool, elapsed_ms, "Tool call succeeded");
                Ok(value)
            }
            Err(e) => {
                warn!(tool = %tool, elapsed_ms, error = %e.format_for_log(), "Tool call failed");
                Err(ErrorResponse::from(&e))
            }
        }
    }

    async fn dispatch(&self, tool: Tool, args: &Value) -> Result<Value> {
        match tool {
            Tool::SummonPersona => {
                let name = bounded_str(args, "persona_name", 1, PERSONA_NAME_MAX)?;
                Ok(serde_json::to_value(self.summon_persona(name).await?)?)
            }
            Tool::ListPersonas => {
                let category = opt_str(args, "category")?.filter(|s| !s.is_empty());
                let source = match opt_str(args, "source")?.filter(|s| !s.is_empty()) {
                    Some(s) => Some(PersonaSource::parse(s).ok_or_else(|| {
                        Error::validation("source", "must be one of local, remote, default")
                    })?),
                    None => None,
                };
                self.list_personas(category, source).await
            }
            Tool::SearchPersonas => {
                let query = bounded_str(args, "query", QUERY_MIN, QUERY_MAX)?;
                self.search_personas(query).await
            }
            Tool::ListPersonaConfigs => {
                let configs = self.sync.list_remote_configs().await?;
                Ok(json!({ "total": configs.len(), "configs": configs }))
            }
            Tool::DownloadPersonaConfig => {
                let id = config_id(args, "config_id")?;
                self.download_persona_config(id).await
            }
            Tool::StartCollaboration => {
                let query = bounded_str(args, "query", QUERY_MIN, QUERY_MAX)?;
                let persona_ids = opt_str_list(args, "persona_ids", PERSONA_IDS_MAX)?;
                let mode = opt_str(args, "mode")?
                    .filter(|s| !s.is_empty())
                    .map(CollaborationMode::parse)
                    .transpose()?;

                let mut config = self.orchestrator.default_config();
                config.persona_ids = persona_ids;
                if let Some(mode) = mode {
                    config.mode = mode;
                }
                let result = self.orchestrator.start_collaboration(query, config).await?;
                Ok(serde_json::to_value(result)?)
            }
            Tool::GetToolStats => {
                let name = opt_str(args, "tool_name")?.filter(|s| !s.is_empty());
                Ok(json!({
                    "tools": self.stats.usage(name),
                    "summary": self.stats.summary(),
                }))
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Operations
    // ─────────────────────────────────────────────────────────────

    /// Resolve a persona by id, then by exact name
    pub async fn summon_persona(&self, name: &str) -> Result<Persona> {
        if let Some(persona) = self.repository.get_by_id(name).await {
            return Ok(persona);
        }

        let all = self.repository.get_all().await;
        if let Some(persona) = all.iter().find(|p| p.name.eq_ignore_ascii_case(name)) {
            return Ok(persona.clone());
        }

        let mut hints: Vec<String> = self
            .repository
            .search_ranked(name)
            .await
            .into_iter()
            .take(SUGGESTIONS)
            .map(|hit| format!("Did you mean '{}' ({})?", hit.persona.name, hit.persona.id))
            .collect();
        hints.push("Use 'search_personas' to look a persona up by keyword.".to_string());

        Err(Error::NotFound {
            what: "Persona".to_string(),
            id: name.to_string(),
            hints,
        })
    }

    /// Listing grouped by source, optionally filtered
    ///
    /// `category` matches the category or any tag, case-insensitively.
    pub async fn list_personas(&self, category: Option<&str>, source: Option<PersonaSource>) -> Result<Value> {
        let wanted = category.map(str::to_lowercase);
        let personas: Vec<Persona> = self
            .repository
            .get_all()
            .await
            .into_iter()
            .filter(|p| source.map_or(true, |s| p.source == s))
            .filter(|p| match &wanted {
                None => true,
                Some(w) => {
                    p.category.as_deref().map_or(false, |c| c.to_lowercase().contains(w.as_str()))
                        || p.tags.iter().any(|t| t.to_lowercase().contains(w.as_str()))
                }
            })
            .collect();

        let mut groups: BTreeMap<&'static str, Vec<PersonaListing>> = BTreeMap::new();
        for persona in &personas {
            groups
                .entry(persona.source.as_str())
                .or_default()
                .push(PersonaListing::from(persona));
        }

        Ok(json!({
            "total": personas.len(),
            "filters": { "category": category, "source": source },
            "groups": groups,
        }))
    }

    pub async fn search_personas(&self, query: &str) -> Result<Value> {
        let hits = self.repository.search_ranked(query).await;
        Ok(json!({ "query": query, "total": hits.len(), "results": hits }))
    }

    /// Sync a remote config and make its personas the local set
    ///
    /// The config is persisted only once the repository has accepted it.
    pub async fn download_persona_config(&self, id: &str) -> Result<Value> {
        let applied = AtomicUsize::new(0);
        let repository = &self.repository;
        let apply = |config: &PersonaConfig| -> Result<()> {
            applied.store(repository.update_from_config(config)?, Ordering::SeqCst);
            Ok(())
        };
        let config = self.sync.sync_from_remote(id, &apply).await?;
        let applied = applied.load(Ordering::SeqCst);
        info!(config = %config.id, applied, "Persona config applied");

        Ok(json!({
            "config": {
                "id": config.id,
                "name": config.name,
                "version": config.version,
                "description": config.description,
            },
            "personas_applied": applied,
        }))
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaboration::{Classifier, CollaborationConfig, KeywordClassifier, TemplateProvider};
    use crate::network::{ClientConfig, MockTransport, RetryClient};
    use crate::persona::{PersonaStore, RepositoryConfig, SourceConfig};
    use crate::sync::{RemoteConfigSync, SyncState};
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        service: ToolService,
        transport: Arc<MockTransport>,
        _dir: TempDir,
    }

    /// Every remote source is unrouted, so the defaults are served
    fn fixture() -> Fixture {
        let transport = Arc::new(MockTransport::new());
        let client = RetryClient::new(
            transport.clone(),
            ClientConfig {
                retry_delay: Duration::from_millis(1),
                ..Default::default()
            },
        );
        let repository = Arc::new(PersonaRepository::new(
            client.clone(),
            RepositoryConfig {
                sources: vec![SourceConfig {
                    name: "test".into(),
                    url: "http://personas.test".into(),
                    priority: 1,
                    timeout_ms: 100,
                    retry_attempts: 0,
                }],
                ..Default::default()
            },
        ));
        let classifier: Arc<dyn Classifier> = Arc::new(KeywordClassifier::new());
        let orchestrator = Arc::new(Orchestrator::new(
            repository.clone() as Arc<dyn PersonaStore>,
            Arc::new(TemplateProvider::new(classifier.clone())),
            classifier,
            CollaborationConfig::default(),
            10,
        ));
        let dir = TempDir::new().unwrap();
        let sync = Arc::new(RemoteConfigSync::with_state(
            client,
            dir.path().join("state.json"),
            SyncState::default(),
        ));

        Fixture {
            service: ToolService::new(repository, orchestrator, sync),
            transport,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_search_validates_before_any_network_call() {
        let f = fixture();

        let empty = f.service.call("search_personas", json!({"query": ""})).await.unwrap_err();
        assert_eq!(empty.kind, "VALIDATION_ERROR");

        let long = f
            .service
            .call("search_personas", json!({"query": "q".repeat(3000)}))
            .await
            .unwrap_err();
        assert_eq!(long.kind, "VALIDATION_ERROR");

        assert_eq!(f.transport.total_calls(), 0);
        assert_eq!(f.service.stats().usage(Some("search_personas"))[0].error_count, 2);
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let f = fixture();
        let err = f.service.call("delete_everything", json!({})).await.unwrap_err();
        assert_eq!(err.kind, "VALIDATION_ERROR");
        assert!(err.message.contains("summon_persona"));
        assert!(f.service.stats().usage(None).is_empty());
    }

    #[tokio::test]
    async fn test_summon_by_id_and_name() {
        let f = fixture();

        let by_id = f.service.call("summon_persona", json!({"persona_name": "warm-sister"})).await.unwrap();
        assert_eq!(by_id["name"], "Warm Sister");

        let by_name = f
            .service
            .call("summon_persona", json!({"persona_name": "  grumpy critic "}))
            .await
            .unwrap();
        assert_eq!(by_name["id"], "grumpy-critic");
        assert_eq!(by_name["source"], "default");
    }

    #[tokio::test]
    async fn test_summon_unknown_has_hints() {
        let f = fixture();
        let err = f
            .service
            .call("summon_persona", json!({"persona_name": "Critic"}))
            .await
            .unwrap_err();

        assert_eq!(err.kind, "NOT_FOUND");
        assert!(err.hints.iter().any(|h| h.contains("grumpy-critic")));
        assert!(err.hints.iter().any(|h| h.contains("list_personas")));
        assert!(err.hints.iter().any(|h| h.contains("search_personas")));
    }

    #[tokio::test]
    async fn test_list_personas_filters_and_groups() {
        let f = fixture();

        let all = f.service.call("list_personas", json!({})).await.unwrap();
        assert_eq!(all["total"], 5);
        assert_eq!(all["groups"]["default"].as_array().unwrap().len(), 5);

        let supportive = f
            .service
            .call("list_personas", json!({"category": "SUPPORT"}))
            .await
            .unwrap();
        assert_eq!(supportive["total"], 2);

        let remote = f.service.call("list_personas", json!({"source": "remote"})).await.unwrap();
        assert_eq!(remote["total"], 0);

        let bad = f.service.call("list_personas", json!({"source": "cloud"})).await.unwrap_err();
        assert_eq!(bad.kind, "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_collaboration_argument_validation() {
        let f = fixture();

        let ids: Vec<String> = (0..11).map(|i| format!("p{}", i)).collect();
        let too_many = f
            .service
            .call("start_collaboration", json!({"query": "Plan the launch", "persona_ids": ids}))
            .await
            .unwrap_err();
        assert_eq!(too_many.kind, "VALIDATION_ERROR");

        let bad_mode = f
            .service
            .call("start_collaboration", json!({"query": "Plan the launch", "mode": "chaotic"}))
            .await
            .unwrap_err();
        assert_eq!(bad_mode.kind, "VALIDATION_ERROR");

        assert_eq!(f.transport.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_start_collaboration_runs() {
        let f = fixture();
        let result = f
            .service
            .call(
                "start_collaboration",
                json!({"query": "Evaluate risk of launching this product now", "mode": "parallel",
                       "persona_ids": ["grumpy-critic", "warm-sister"]}),
            )
            .await
            .unwrap();

        assert_eq!(result["strategy"], "parallel");
        assert_eq!(result["analyses"].as_array().unwrap().len(), 2);
        assert!(!result["action_plan"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remote_configs_need_credential() {
        let f = fixture();

        let list = f.service.call("list_persona_configs", json!({})).await.unwrap_err();
        assert_eq!(list.kind, "AUTH_ERROR");

        let bad_id = f
            .service
            .call("download_persona_config", json!({"config_id": "a/b"}))
            .await
            .unwrap_err();
        assert_eq!(bad_id.kind, "VALIDATION_ERROR");

        let download = f
            .service
            .call("download_persona_config", json!({"config_id": "team-a"}))
            .await
            .unwrap_err();
        assert_eq!(download.kind, "AUTH_ERROR");
        assert_eq!(f.transport.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_tool_stats_report() {
        let f = fixture();
        f.service.call("list_personas", json!({})).await.unwrap();
        f.service.call("list_personas", json!({})).await.unwrap();
        let _ = f.service.call("search_personas", json!({"query": ""})).await;

        let report = f.service.call("get_tool_stats", json!({})).await.unwrap();
        assert_eq!(report["summary"]["total_calls"], 3);
        assert_eq!(report["summary"]["most_used_tool"], "list_personas");

        let one = f
            .service
            .call("get_tool_stats", json!({"tool_name": "search_personas"}))
            .await
            .unwrap();
        assert_eq!(one["tools"].as_array().unwrap().len(), 1);
    }
}

//! Common test utilities and fixtures
//!
//! Shared persona records, offline network plumbing and in-memory stores.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use persona_council::collaboration::{
    Classifier, CollaborationConfig, KeywordClassifier, Orchestrator, TemplateProvider,
};
use persona_council::network::{ClientConfig, MockTransport, RetryClient};
use persona_council::persona::{
    parse_records, Persona, PersonaRepository, PersonaSource, PersonaStore, RepositoryConfig,
    SourceConfig,
};

pub const PRIMARY_URL: &str = "https://primary.personas.test/personas.json";
pub const MIRROR_URL: &str = "https://mirror.personas.test/personas.json";

// ─────────────────────────────────────────────────────────────────
// Persona Records
// ─────────────────────────────────────────────────────────────────

/// Minimal valid persona record
pub fn record(id: &str, name: &str, rule: &str, goal: &str) -> Value {
    json!({ "id": id, "name": name, "rule": rule, "goal": goal, "version": "1.0" })
}

/// Critical persona whose goal mentions risk
pub fn skeptic() -> Value {
    record(
        "skeptic",
        "Skeptic",
        "Question every assumption and scrutinize weak points without mercy",
        "Expose the risk hiding in every plan",
    )
}

/// Supportive persona whose goal mentions the product
pub fn cheerleader() -> Value {
    record(
        "cheerleader",
        "Cheerleader",
        "Encourage the team and stay positive about their effort",
        "Celebrate the product and its strengths",
    )
}

/// Records parsed the way a source would parse them
pub fn personas(records: Vec<Value>, source: PersonaSource) -> Vec<Persona> {
    parse_records(records, source)
}

/// Write `records` as a JSON array under `dir`
pub fn write_personas_file(dir: &Path, records: &[Value]) -> PathBuf {
    let path = dir.join("personas.json");
    fs::write(&path, Value::Array(records.to_vec()).to_string()).unwrap();
    path
}

// ─────────────────────────────────────────────────────────────────
// Network
// ─────────────────────────────────────────────────────────────────

/// Retry client over `transport` with millisecond backoff
pub fn client(transport: Arc<MockTransport>) -> RetryClient {
    RetryClient::new(
        transport,
        ClientConfig {
            timeout: Duration::from_millis(200),
            retry_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            ..Default::default()
        },
    )
}

pub fn source(name: &str, url: &str, priority: u32) -> SourceConfig {
    SourceConfig {
        name: name.to_string(),
        url: url.to_string(),
        priority,
        timeout_ms: 200,
        retry_attempts: 1,
    }
}

/// Repository over a primary and a mirror source
pub fn repository(transport: Arc<MockTransport>, local: Vec<Value>) -> Arc<PersonaRepository> {
    let config = RepositoryConfig {
        sources: vec![source("mirror", MIRROR_URL, 2), source("primary", PRIMARY_URL, 1)],
        ..Default::default()
    };
    Arc::new(PersonaRepository::with_local(client(transport), config, local))
}

// ─────────────────────────────────────────────────────────────────
// Stores & Orchestrators
// ─────────────────────────────────────────────────────────────────

/// Fixed persona set
pub struct StaticStore(pub Vec<Persona>);

#[async_trait]
impl PersonaStore for StaticStore {
    async fn get_all(&self) -> Vec<Persona> {
        self.0.clone()
    }

    async fn get_by_id(&self, id: &str) -> Option<Persona> {
        self.0.iter().find(|p| p.id == id).cloned()
    }
}

/// Orchestrator with the keyword classifier and template provider
pub fn orchestrator(store: Arc<dyn PersonaStore>) -> Orchestrator {
    let classifier: Arc<dyn Classifier> = Arc::new(KeywordClassifier::new());
    Orchestrator::new(
        store,
        Arc::new(TemplateProvider::new(classifier.clone())),
        classifier,
        CollaborationConfig::default(),
        20,
    )
}

//! Configuration system tests
//!
//! Tests configuration loading, validation and the `config` subcommands

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

use persona_council::collaboration::CollaborationMode;
use persona_council::config::{init_config, AppConfig};
use persona_council::error::Error;

/// Test fixture for configuration testing
struct ConfigFixture {
    _temp_dir: TempDir,
    config_path: PathBuf,
}

impl ConfigFixture {
    fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        Self {
            _temp_dir: temp_dir,
            config_path,
        }
    }

    fn write_config(&self, content: &str) {
        fs::write(&self.config_path, content).unwrap();
    }

    fn path(&self) -> &str {
        self.config_path.to_str().unwrap()
    }
}

fn council_cmd() -> Command {
    Command::cargo_bin("persona-council").unwrap()
}

// ─────────────────────────────────────────────────────────────────
// Loading
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_empty_config_uses_defaults() {
    let fixture = ConfigFixture::new();
    fixture.write_config("");

    let config = AppConfig::load(Some(fixture.path())).unwrap();
    assert_eq!(config.repository.sources.len(), 3);
    assert_eq!(config.network.timeout_ms, 15_000);
    assert_eq!(config.collaboration.max_rounds, 3);
}

#[test]
fn test_full_config() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[repository]
cache_duration_secs = 60
warm_up = false

[[repository.sources]]
name = "internal"
url = "https://personas.internal.example.com/all.json"
priority = 1
timeout_ms = 5000
retry_attempts = 1

[cache]
max_size = 50
default_ttl_secs = 120

[network]
timeout_ms = 4000
retry_attempts = 2
retry_delay_ms = 250
max_delay_ms = 2000
batch_concurrency = 5
user_agent = "council-test"

[collaboration]
mode = "sequential"
max_rounds = 4
timeout_per_round_ms = 10000
enable_cross_validation = false
history_size = 10

[sync]
api_base_url = "https://configs.example.com"
state_path = "/tmp/council-state.json"

[logging]
level = "warn"
max_files = 2
json_format = true
"#,
    );

    let config = AppConfig::load(Some(fixture.path())).unwrap();

    assert_eq!(config.repository.sources.len(), 1);
    assert_eq!(config.repository.sources[0].name, "internal");
    assert!(!config.repository.warm_up);
    assert_eq!(config.cache.max_size, 50);
    assert_eq!(config.network.user_agent, "council-test");
    assert_eq!(config.logging.level, "warn");
    assert_eq!(config.state_path(), PathBuf::from("/tmp/council-state.json"));

    let client = config.client_config();
    assert_eq!(client.timeout, Duration::from_millis(4000));
    assert_eq!(client.batch_concurrency, 5);

    let repo = config.repository_config();
    assert_eq!(repo.cache_duration, Duration::from_secs(60));
    assert_eq!(repo.cache_ttl, Duration::from_secs(120));

    let collab = config.collaboration_config().unwrap();
    assert_eq!(collab.mode, CollaborationMode::Sequential);
    assert_eq!(collab.max_rounds, 4);
    assert!(!collab.enable_cross_validation);
}

#[test]
fn test_missing_explicit_file_is_not_found() {
    let err = AppConfig::load(Some("/nonexistent/path/council.toml")).unwrap_err();
    assert!(matches!(err, Error::ConfigNotFound { .. }));
    assert_eq!(err.exit_code(), 10);
}

// ─────────────────────────────────────────────────────────────────
// Invalid Configuration
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_syntax_error_is_parse_error() {
    let fixture = ConfigFixture::new();
    fixture.write_config("[collaboration\nmode = ");

    let err = AppConfig::load(Some(fixture.path())).unwrap_err();
    assert!(matches!(err, Error::ConfigParse { .. }));
}

#[test]
fn test_non_http_source_rejected() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[[repository.sources]]
name = "disk"
url = "file:///etc/personas.json"
"#,
    );

    let err = AppConfig::load(Some(fixture.path())).unwrap_err();
    assert!(matches!(err, Error::ConfigValidation { .. }));
    assert!(err.to_string().contains("http"));
}

#[test]
fn test_out_of_range_rounds_rejected() {
    let fixture = ConfigFixture::new();
    fixture.write_config("[collaboration]\nmax_rounds = 0\n");
    assert!(AppConfig::load(Some(fixture.path())).is_err());
}

#[test]
fn test_unknown_mode_rejected() {
    let fixture = ConfigFixture::new();
    fixture.write_config("[collaboration]\nmode = \"round-robin\"\n");
    assert!(AppConfig::load(Some(fixture.path())).is_err());
}

// ─────────────────────────────────────────────────────────────────
// Init
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_init_writes_loadable_config() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("council.toml");
    let path_str = path.to_str().unwrap();

    let written = init_config(Some(path_str), false).unwrap();
    assert_eq!(written, path);
    assert!(AppConfig::load(Some(path_str)).is_ok());

    // Refuses to overwrite without force
    assert!(init_config(Some(path_str), false).is_err());
    assert!(init_config(Some(path_str), true).is_ok());
}

// ─────────────────────────────────────────────────────────────────
// CLI
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_cli_validate_valid_file() {
    let fixture = ConfigFixture::new();
    fixture.write_config("[logging]\nlevel = \"debug\"\n");

    council_cmd()
        .args(["--config", fixture.path(), "config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"));
}

#[test]
fn test_cli_validate_invalid_file() {
    let fixture = ConfigFixture::new();
    fixture.write_config("[cache]\nmax_size = 0\n");

    council_cmd()
        .args(["--config", fixture.path(), "config", "validate"])
        .assert()
        .code(10)
        .stderr(predicate::str::contains("E102"));
}

#[test]
fn test_cli_show_redacts_credential() {
    let fixture = ConfigFixture::new();
    fixture.write_config("[sync]\ncredential = \"super-secret\"\n");

    council_cmd()
        .args(["--config", fixture.path(), "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[collaboration]"))
        .stdout(predicate::str::contains("super-secret").not());
}

#[test]
fn test_cli_init_creates_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("council.toml");

    council_cmd()
        .args(["config", "init", "--path", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration file created"));

    assert!(fs::read_to_string(&path).unwrap().contains("[repository]"));
}

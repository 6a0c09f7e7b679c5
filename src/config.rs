//! Configuration system for Persona Council
//!
//! Supports multiple configuration sources with the following precedence (highest to lowest):
//! 1. CLI arguments
//! 2. Environment variables (PERSONA_COUNCIL_* prefix)
//! 3. Configuration file (TOML)
//! 4. Default values

use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::collaboration::{CollaborationConfig, CollaborationMode};
use crate::error::{Error, Result};
use crate::network::ClientConfig;
use crate::persona::{default_sources, RepositoryConfig, SourceConfig};
use crate::sync::SyncState;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "PERSONA_COUNCIL_";

const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Remote persona sources and snapshot caching
    pub repository: RepositorySettings,

    /// Per-persona lookup cache
    pub cache: CacheSettings,

    /// Outbound HTTP policy
    pub network: NetworkSettings,

    /// Collaboration defaults
    pub collaboration: CollaborationSettings,

    /// Remote config synchronization
    pub sync: SyncSettings,

    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Persona repository settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositorySettings {
    /// Remote endpoints, tried in ascending priority
    pub sources: Vec<SourceConfig>,

    /// How long a fetched persona set stays fresh, in seconds
    pub cache_duration_secs: u64,

    /// Fetch personas in the background right after startup
    pub warm_up: bool,
}

/// Lookup cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Maximum number of cached entries
    pub max_size: usize,

    /// Default entry TTL in seconds
    pub default_ttl_secs: u64,
}

/// Network settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    /// Per-attempt timeout in milliseconds
    pub timeout_ms: u64,

    /// Retries after the first attempt
    pub retry_attempts: u32,

    /// Base backoff delay in milliseconds
    pub retry_delay_ms: u64,

    /// Backoff ceiling in milliseconds
    pub max_delay_ms: u64,

    /// Concurrent requests in a batch
    pub batch_concurrency: usize,

    /// User-Agent header sent with every request
    pub user_agent: String,
}

/// Collaboration defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollaborationSettings {
    /// parallel, sequential or intelligent
    pub mode: String,

    /// Rounds for dialogue-style collaboration (1-10)
    pub max_rounds: u32,

    /// Bound on each provider call in milliseconds
    pub timeout_per_round_ms: u64,

    pub enable_cross_validation: bool,

    /// Finished sessions kept in history
    pub history_size: usize,
}

/// Config synchronization settings
///
/// Unset values fall back to the persisted sync state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,

    /// Bearer credential for the config API
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,

    /// Sync state file (default: ~/.persona-council/state.json)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_path: Option<String>,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (empty = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Enable JSON formatted logging
    pub json_format: bool,
}

// Default implementations

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            sources: default_sources(),
            cache_duration_secs: 300,
            warm_up: true,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_size: 1000,
            default_ttl_secs: 300,
        }
    }
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 15_000,
            retry_attempts: 3,
            retry_delay_ms: 1_000,
            max_delay_ms: 30_000,
            batch_concurrency: 3,
            user_agent: format!("persona-council/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for CollaborationSettings {
    fn default() -> Self {
        Self {
            mode: "intelligent".to_string(),
            max_rounds: 3,
            timeout_per_round_ms: 30_000,
            enable_cross_validation: true,
            history_size: 100,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            max_files: 5,
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::default();

        // 1. Load from config file if it exists
        let config_file = Self::find_config_file(config_path)?;
        if let Some(path) = config_file {
            debug!(path = %path.display(), "Loading configuration file");
            let content = fs::read_to_string(&path).map_err(|e| Error::IoRead {
                path: path.clone(),
                message: e.to_string(),
            })?;
            config = toml::from_str(&content).map_err(|e| Error::config_parse(e.to_string()))?;
            info!(path = %path.display(), "Configuration loaded from file");
        }

        // 2. Apply environment variable overrides
        config.apply_env_overrides();

        // 3. Expand paths
        config.expand_paths();

        // 4. Validate
        config.validate()?;

        Ok(config)
    }

    /// Find the configuration file to use
    pub fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        // If explicit path provided, use it (error if not found)
        if let Some(path) = explicit_path {
            let path = PathBuf::from(expand_path(path));
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(Error::config_not_found(path));
        }

        let search_paths = [
            // Current directory
            Some(PathBuf::from("persona-council.toml")),
            // User config directory
            dirs::config_dir().map(|p| p.join("persona-council").join("config.toml")),
            // Home directory
            Some(default_config_path()),
        ];

        for path in search_paths.iter().flatten() {
            if path.exists() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path.clone()));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        // Repository / cache
        if let Some(n) = env_parse("CACHE_DURATION_SECS") {
            self.repository.cache_duration_secs = n;
        }
        if let Some(flag) = env_flag("WARM_UP") {
            self.repository.warm_up = flag;
        }
        if let Some(n) = env_parse("CACHE_MAX_SIZE") {
            self.cache.max_size = n;
        }

        // Network
        if let Some(n) = env_parse("TIMEOUT_MS") {
            self.network.timeout_ms = n;
        }
        if let Some(n) = env_parse("RETRY_ATTEMPTS") {
            self.network.retry_attempts = n;
        }
        if let Some(n) = env_parse("RETRY_DELAY_MS") {
            self.network.retry_delay_ms = n;
        }

        // Collaboration
        if let Some(val) = env_var("MODE") {
            self.collaboration.mode = val;
        }
        if let Some(n) = env_parse("MAX_ROUNDS") {
            self.collaboration.max_rounds = n;
        }
        if let Some(n) = env_parse("TIMEOUT_PER_ROUND_MS") {
            self.collaboration.timeout_per_round_ms = n;
        }
        if let Some(flag) = env_flag("CROSS_VALIDATION") {
            self.collaboration.enable_cross_validation = flag;
        }

        // Sync
        if let Some(val) = env_var("CREDENTIAL") {
            self.sync.credential = Some(val);
        }
        if let Some(val) = env_var("API_BASE_URL") {
            self.sync.api_base_url = Some(val);
        }
        if let Some(val) = env_var("STATE_PATH") {
            self.sync.state_path = Some(val);
        }

        // Logging
        if let Some(val) = env_var("LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Some(val) = env_var("LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Some(flag) = env_flag("LOG_JSON") {
            self.logging.json_format = flag;
        }
    }

    /// Expand ~ and other path variables
    fn expand_paths(&mut self) {
        if let Some(ref path) = self.sync.state_path {
            self.sync.state_path = Some(expand_path(path));
        }
        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(expand_path(file));
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        for source in &self.repository.sources {
            validate_http_url("repository.sources.url", &source.url)?;
        }

        if self.cache.max_size == 0 {
            return Err(Error::config_field_invalid(
                "cache.max_size",
                "max_size must be greater than 0",
            ));
        }

        if !VALID_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.level",
                format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    VALID_LEVELS.join(", ")
                ),
            ));
        }

        if !(1..=10).contains(&self.collaboration.max_rounds) {
            return Err(Error::config_field_invalid(
                "collaboration.max_rounds",
                "max_rounds must be between 1 and 10",
            ));
        }

        CollaborationMode::parse(&self.collaboration.mode).map_err(|_| {
            Error::config_field_invalid(
                "collaboration.mode",
                format!(
                    "Invalid mode '{}'. Must be one of: parallel, sequential, intelligent",
                    self.collaboration.mode
                ),
            )
        })?;

        if let Some(ref base) = self.sync.api_base_url {
            validate_http_url("sync.api_base_url", base)?;
        }

        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    // Component Settings
    // ─────────────────────────────────────────────────────────────

    /// Retry client policy
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: Duration::from_millis(self.network.timeout_ms),
            retry_attempts: self.network.retry_attempts,
            retry_delay: Duration::from_millis(self.network.retry_delay_ms),
            max_delay: Duration::from_millis(self.network.max_delay_ms),
            batch_concurrency: self.network.batch_concurrency.max(1),
            user_agent: self.network.user_agent.clone(),
        }
    }

    /// Persona repository tuning
    pub fn repository_config(&self) -> RepositoryConfig {
        RepositoryConfig {
            sources: self.repository.sources.clone(),
            cache_duration: Duration::from_secs(self.repository.cache_duration_secs),
            cache_max_size: self.cache.max_size,
            cache_ttl: Duration::from_secs(self.cache.default_ttl_secs),
            ..Default::default()
        }
    }

    /// Default collaboration settings for new sessions
    pub fn collaboration_config(&self) -> Result<CollaborationConfig> {
        Ok(CollaborationConfig {
            mode: CollaborationMode::parse(&self.collaboration.mode)?,
            persona_ids: Vec::new(),
            max_rounds: self.collaboration.max_rounds,
            timeout_per_round: Duration::from_millis(self.collaboration.timeout_per_round_ms),
            enable_cross_validation: self.collaboration.enable_cross_validation,
        })
    }

    /// Sync state file location
    pub fn state_path(&self) -> PathBuf {
        self.sync
            .state_path
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(SyncState::default_path)
    }

    /// Copy with secrets masked, for display
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.sync.credential.is_some() {
            config.sync.credential = Some("********".to_string());
        }
        config
    }
}

fn validate_http_url(field: &str, raw: &str) -> Result<()> {
    let url = Url::parse(raw)
        .map_err(|e| Error::config_field_invalid(field, format!("Invalid URL '{}': {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(Error::config_field_invalid(
            field,
            format!("URL '{}' must use http or https, not {}", raw, scheme),
        )),
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(format!("{}{}", ENV_PREFIX, name)).ok()
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env_var(name).and_then(|val| val.parse().ok())
}

fn env_flag(name: &str) -> Option<bool> {
    env_var(name).map(|val| val.to_lowercase() == "true" || val == "1")
}

/// Expand ~ and environment variables in paths
fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or_else(|_| std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// ~/.persona-council/config.toml
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".persona-council")
        .join("config.toml")
}

/// Initialize a new configuration file, returning where it was written
pub fn init_config(path: Option<&str>, force: bool) -> Result<PathBuf> {
    let config_path = path
        .map(|p| PathBuf::from(expand_path(p)))
        .unwrap_or_else(default_config_path);

    // Check if file exists
    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Configuration file already exists: {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    // Create parent directories
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::IoWrite {
            path: parent.to_path_buf(),
            message: format!("failed to create config directory: {}", e),
        })?;
    }

    fs::write(&config_path, generate_default_config()).map_err(|e| Error::IoWrite {
        path: config_path.clone(),
        message: e.to_string(),
    })?;

    info!(path = %config_path.display(), "Configuration file created");
    Ok(config_path)
}

/// Generate default configuration content with comments
pub fn generate_default_config() -> String {
    r#"# Persona Council Configuration

[repository]
# How long a fetched persona set stays fresh (seconds)
cache_duration_secs = 300

# Fetch personas in the background right after startup
warm_up = true

# Remote persona sources, tried in ascending priority until one yields personas.
# When every source fails the built-in personas are used.
[[repository.sources]]
name = "gitee"
url = "https://gitee.com/persona-council/personas/raw/main/personas.json"
priority = 1
timeout_ms = 10000
retry_attempts = 2

[[repository.sources]]
name = "github"
url = "https://raw.githubusercontent.com/persona-council/personas/main/personas.json"
priority = 2
timeout_ms = 15000
retry_attempts = 3

[[repository.sources]]
name = "jsdelivr"
url = "https://cdn.jsdelivr.net/gh/persona-council/personas@main/personas.json"
priority = 3
timeout_ms = 12000
retry_attempts = 2

[cache]
# Maximum number of cached personas
max_size = 1000

# Default entry lifetime (seconds)
default_ttl_secs = 300

[network]
# Per-attempt timeout in milliseconds
timeout_ms = 15000

# Retries after the first attempt
retry_attempts = 3

# Base backoff delay and ceiling in milliseconds
retry_delay_ms = 1000
max_delay_ms = 30000

# Concurrent requests in a batch
batch_concurrency = 3

[collaboration]
# parallel, sequential or intelligent
mode = "intelligent"

# Rounds for dialogue-style collaboration (1-10)
max_rounds = 3

# Bound on each analysis call in milliseconds
timeout_per_round_ms = 30000

# Compare persona outputs for agreement and disagreement
enable_cross_validation = true

# Finished sessions kept in history
history_size = 100

[sync]
# Config API endpoint
# api_base_url = "https://api.persona-council.dev"

# Bearer credential (or export PERSONA_COUNCIL_CREDENTIAL)
# credential = ""

# Sync state file
# state_path = "~/.persona-council/state.json"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log file path (comment out to disable file logging)
# file = "~/.persona-council/logs/council.log"

# Number of rotated log files to keep
max_files = 5

# Enable JSON formatted logging
json_format = false
"#
    .to_string()
}

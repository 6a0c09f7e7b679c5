//! Persisted synchronizer state
//!
//! A single JSON document holding the credential, the API base URL, the
//! last synchronized persona config and tuning knobs. Writes go through a
//! temp file and a rename so a crash never leaves a torn document.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::persona::PersonaConfig;

/// Default remote API
pub const DEFAULT_API_BASE_URL: &str = "https://api.persona-council.dev";

/// Cache tuning carried in the state document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheSettings {
    /// Milliseconds
    pub duration: u64,
    pub max_size: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            duration: 5 * 60 * 1000,
            max_size: 1000,
        }
    }
}

/// Auto-sync tuning carried in the state document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AutoSyncSettings {
    pub auto_sync: bool,
    /// Milliseconds between update checks
    pub sync_interval: u64,
    pub retry_attempts: u32,
}

impl Default for AutoSyncSettings {
    fn default() -> Self {
        Self {
            auto_sync: true,
            sync_interval: 60 * 60 * 1000,
            retry_attempts: 3,
        }
    }
}

/// Everything the synchronizer persists between runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncState {
    pub credential: String,
    pub api_base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_config: Option<PersonaConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_time: Option<DateTime<Utc>>,
    pub cache: CacheSettings,
    pub sync: AutoSyncSettings,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            credential: String::new(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            current_config: None,
            last_sync_time: None,
            cache: CacheSettings::default(),
            sync: AutoSyncSettings::default(),
        }
    }
}

impl SyncState {
    /// `~/.persona-council/state.json`
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".persona-council")
            .join("state.json")
    }

    /// Read the state at `path`
    ///
    /// A missing file yields defaults. An unreadable or corrupt file is
    /// logged and also yields defaults; it is overwritten on the next save.
    pub fn load(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No sync state yet, using defaults");
                return Self::default();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read sync state, using defaults");
                return Self::default();
            }
        };

        match serde_json::from_str::<SyncState>(&content) {
            Ok(mut state) => {
                if state.api_base_url.trim().is_empty() {
                    state.api_base_url = DEFAULT_API_BASE_URL.to_string();
                }
                state
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt sync state, using defaults");
                Self::default()
            }
        }
    }

    /// Write the state to `path` atomically
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::IoWrite {
                path: parent.to_path_buf(),
                message: e.to_string(),
            })?;
        }

        let content = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content).map_err(|e| Error::IoWrite {
            path: tmp.clone(),
            message: e.to_string(),
        })?;
        fs::rename(&tmp, path).map_err(|e| Error::IoWrite {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        debug!(path = %path.display(), "Sync state saved");
        Ok(())
    }

    pub fn has_credential(&self) -> bool {
        !self.credential.trim().is_empty()
    }
}

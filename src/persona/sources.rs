//! Remote persona source endpoints

use serde::{Deserialize, Serialize};

/// One remote endpoint serving a JSON array of persona records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Short label used in logs
    pub name: String,
    pub url: String,
    /// Lower is tried first
    pub priority: u32,
    pub timeout_ms: u64,
    pub retry_attempts: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            url: String::new(),
            priority: 100,
            timeout_ms: 10_000,
            retry_attempts: 2,
        }
    }
}

/// Mirror endpoints shipped with the council, in priority order
pub fn default_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig {
            name: "gitee".to_string(),
            url: "https://gitee.com/persona-council/personas/raw/main/personas.json".to_string(),
            priority: 1,
            timeout_ms: 10_000,
            retry_attempts: 2,
        },
        SourceConfig {
            name: "github".to_string(),
            url: "https://raw.githubusercontent.com/persona-council/personas/main/personas.json"
                .to_string(),
            priority: 2,
            timeout_ms: 15_000,
            retry_attempts: 3,
        },
        SourceConfig {
            name: "jsdelivr".to_string(),
            url: "https://cdn.jsdelivr.net/gh/persona-council/personas@main/personas.json"
                .to_string(),
            priority: 3,
            timeout_ms: 12_000,
            retry_attempts: 2,
        },
    ]
}

/// Sources sorted by ascending priority; ties keep their listed order
pub fn by_priority(sources: &[SourceConfig]) -> Vec<SourceConfig> {
    let mut sorted = sources.to_vec();
    sorted.sort_by_key(|s| s.priority);
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sources_ordered() {
        let sources = by_priority(&default_sources());
        assert_eq!(sources.len(), 3);
        assert_eq!(sources[0].name, "gitee");
        assert_eq!(sources[2].name, "jsdelivr");
    }

    #[test]
    fn test_by_priority_sorts() {
        let sources = vec![
            SourceConfig { name: "b".into(), priority: 2, ..Default::default() },
            SourceConfig { name: "a".into(), priority: 1, ..Default::default() },
        ];
        let sorted = by_priority(&sources);
        assert_eq!(sorted[0].name, "a");
    }
}

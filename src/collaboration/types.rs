//! Collaboration data model: modes, strategies, analysis records and results

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ─────────────────────────────────────────────────────────────────
// Mode & Strategy
// ─────────────────────────────────────────────────────────────────

/// Execution mode requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CollaborationMode {
    Parallel,
    Sequential,
    /// Strategy chosen per query from complexity and roster composition
    #[default]
    Intelligent,
}

impl CollaborationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollaborationMode::Parallel => "parallel",
            CollaborationMode::Sequential => "sequential",
            CollaborationMode::Intelligent => "intelligent",
        }
    }

    /// Parse a mode name (case-insensitive)
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "parallel" => Ok(CollaborationMode::Parallel),
            "sequential" => Ok(CollaborationMode::Sequential),
            "intelligent" => Ok(CollaborationMode::Intelligent),
            other => Err(Error::validation(
                "mode",
                format!(
                    "unknown mode '{}', expected parallel, sequential or intelligent",
                    other
                ),
            )),
        }
    }
}

impl fmt::Display for CollaborationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Strategy that actually ran for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    Parallel,
    Sequential,
    /// Parallel round followed by a round-table round
    IntelligentHybrid,
    /// Multi-round dialogue across the whole roster
    IntelligentDialogue,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Parallel => "parallel",
            Strategy::Sequential => "sequential",
            Strategy::IntelligentHybrid => "intelligent-hybrid",
            Strategy::IntelligentDialogue => "intelligent-dialogue",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────

/// Effective configuration of one collaboration session
#[derive(Debug, Clone, PartialEq)]
pub struct CollaborationConfig {
    pub mode: CollaborationMode,
    /// Explicit roster; empty means intelligent selection
    pub persona_ids: Vec<String>,
    /// Rounds for the dialogue strategy
    pub max_rounds: u32,
    /// Bound on every provider call
    pub timeout_per_round: Duration,
    pub enable_cross_validation: bool,
}

impl Default for CollaborationConfig {
    fn default() -> Self {
        Self {
            mode: CollaborationMode::Intelligent,
            persona_ids: Vec::new(),
            max_rounds: 3,
            timeout_per_round: Duration::from_secs(30),
            enable_cross_validation: true,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Records
// ─────────────────────────────────────────────────────────────────

/// One persona's analysis in one round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaAnalysis {
    pub persona_id: String,
    pub persona_name: String,
    pub query: String,
    pub round: u32,
    pub analysis: String,
    /// In [0, 1]; zero when `error` is set
    pub confidence: f64,
    pub execution_time_ms: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PersonaAnalysis {
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Lexical agreement and disagreement across a session's analyses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidation {
    pub common_points: Vec<String>,
    pub disagreements: Vec<String>,
    /// In [0.1, 0.95]
    pub confidence_score: f64,
    pub recommendations: Vec<String>,
}

/// Reduction of all analyses into one structured view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Synthesis {
    pub summary: String,
    pub key_insights: Vec<String>,
    pub risks: Vec<String>,
    pub opportunities: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// One ordered step of the action plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionStep {
    /// 1-based position in the plan
    pub step: u32,
    pub action: String,
    pub priority: Priority,
    /// Steps that must finish first
    pub dependencies: Vec<u32>,
    pub timeline: String,
}

/// Final, immutable output of a collaboration session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaborationResult {
    pub session_id: String,
    pub query: String,
    pub selected_personas: Vec<String>,
    pub strategy: Strategy,
    pub analyses: Vec<PersonaAnalysis>,
    pub cross_validation: CrossValidation,
    pub synthesis: Synthesis,
    pub action_plan: Vec<ActionStep>,
    pub execution_time_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mode_parse() {
        assert_eq!(CollaborationMode::parse("Parallel").unwrap(), CollaborationMode::Parallel);
        assert_eq!(CollaborationMode::parse(" intelligent ").unwrap(), CollaborationMode::Intelligent);
        assert!(matches!(
            CollaborationMode::parse("chaotic"),
            Err(Error::Validation { .. })
        ));
    }

    #[test]
    fn test_strategy_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_value(Strategy::IntelligentHybrid).unwrap(),
            json!("intelligent-hybrid")
        );
        assert_eq!(Strategy::IntelligentDialogue.to_string(), "intelligent-dialogue");
    }
}

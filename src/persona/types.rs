//! Persona data types and ingestion-boundary validation
//!
//! Records from remote sources and local files arrive as loosely-typed
//! JSON ([`RawPersona`]) and are turned into immutable [`Persona`] values
//! by [`RawPersona::into_persona`]. Nothing else constructs a `Persona`
//! from untrusted input.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

// ─────────────────────────────────────────────────────────────────
// Source
// ─────────────────────────────────────────────────────────────────

/// Provenance of a persona, used for merge priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonaSource {
    /// Supplied by the user; always wins on id conflicts
    Local,
    /// Fetched from a remote persona source
    Remote,
    /// Built-in fallback set
    Default,
}

impl PersonaSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersonaSource::Local => "local",
            PersonaSource::Remote => "remote",
            PersonaSource::Default => "default",
        }
    }

    /// Parse a source name (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "local" => Some(PersonaSource::Local),
            "remote" => Some(PersonaSource::Remote),
            "default" => Some(PersonaSource::Default),
            _ => None,
        }
    }
}

impl fmt::Display for PersonaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────
// Persona
// ─────────────────────────────────────────────────────────────────

/// A validated persona definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Persona {
    pub id: String,
    pub name: String,
    /// Behavioral instructions
    pub rule: String,
    pub goal: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub limitations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_personas: Vec<String>,
    pub source: PersonaSource,
}

impl Persona {
    /// Name, goal and rule joined and lowercased, for keyword matching
    pub fn profile_text(&self) -> String {
        format!("{} {} {}", self.name, self.goal, self.rule).to_lowercase()
    }

    pub fn description_or_default(&self) -> &str {
        self.description.as_deref().unwrap_or("No description")
    }
}

// ─────────────────────────────────────────────────────────────────
// Raw Persona (ingestion boundary)
// ─────────────────────────────────────────────────────────────────

/// Untrusted persona record as received from a source
///
/// Every field is optional and loosely typed so a single malformed field
/// rejects only its own record, never the whole payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPersona {
    pub id: Option<Value>,
    pub name: Option<Value>,
    pub rule: Option<Value>,
    pub goal: Option<Value>,
    pub version: Option<Value>,
    pub description: Option<Value>,
    pub category: Option<Value>,
    pub tags: Option<Value>,
    pub capabilities: Option<Value>,
    pub limitations: Option<Value>,
    pub examples: Option<Value>,
    pub related_personas: Option<Value>,
}

impl RawPersona {
    /// Parse a JSON value into a raw record
    pub fn from_value(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(Error::validation("persona", "record is not a JSON object"));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Trim, filter and validate into a [`Persona`]
    ///
    /// Required fields (`id`, `name`, `rule`, `goal`, `version`) must be
    /// strings that are non-empty after trimming.
    pub fn into_persona(self, source: PersonaSource) -> Result<Persona> {
        let id = required("id", self.id)?;
        let name = required("name", self.name)?;
        let rule = required("rule", self.rule)?;
        let goal = required("goal", self.goal)?;
        let version = required("version", self.version)?;

        Ok(Persona {
            id,
            name,
            rule,
            goal,
            version,
            description: optional(self.description),
            category: optional(self.category),
            tags: string_list(self.tags),
            capabilities: string_list(self.capabilities),
            limitations: string_list(self.limitations),
            examples: string_list(self.examples),
            related_personas: string_list(self.related_personas),
            source,
        })
    }
}

fn required(field: &str, value: Option<Value>) -> Result<String> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(Value::String(_)) | None | Some(Value::Null) => Err(Error::validation(
            format!("persona.{}", field),
            "required field is missing or empty",
        )),
        Some(_) => Err(Error::validation(
            format!("persona.{}", field),
            "required field must be a string",
        )),
    }
}

fn optional(value: Option<Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// Keep only the string entries of a JSON array
fn string_list(value: Option<Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.trim().to_string()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

// ─────────────────────────────────────────────────────────────────
// Persona Config (downloaded or locally supplied bundle)
// ─────────────────────────────────────────────────────────────────

/// A named bundle of persona records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonaConfig {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub personas: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(v: Value) -> RawPersona {
        RawPersona::from_value(v).unwrap()
    }

    #[test]
    fn test_valid_record_is_trimmed() {
        let p = raw(json!({
            "id": "  critic ",
            "name": "Critic",
            "rule": " Be harsh ",
            "goal": "Find flaws",
            "version": "1.0",
            "description": "  ",
            "tags": ["a", 3, null, " b "]
        }))
        .into_persona(PersonaSource::Remote)
        .unwrap();

        assert_eq!(p.id, "critic");
        assert_eq!(p.rule, "Be harsh");
        assert_eq!(p.description, None);
        assert_eq!(p.tags, vec!["a", "b"]);
        assert_eq!(p.source, PersonaSource::Remote);
    }

    #[test]
    fn test_missing_required_field_rejected() {
        let err = raw(json!({"id": "x", "name": "X", "rule": "r", "goal": "g"}))
            .into_persona(PersonaSource::Local)
            .unwrap_err();
        assert!(err.to_string().contains("persona.version"));
    }

    #[test]
    fn test_whitespace_only_required_field_rejected() {
        let result = raw(json!({"id": "x", "name": "   ", "rule": "r", "goal": "g", "version": "1"}))
            .into_persona(PersonaSource::Local);
        assert!(result.is_err());
    }

    #[test]
    fn test_non_string_required_field_rejected() {
        let result = raw(json!({"id": 7, "name": "X", "rule": "r", "goal": "g", "version": "1"}))
            .into_persona(PersonaSource::Local);
        assert!(result.is_err());
    }

    #[test]
    fn test_non_object_record_rejected() {
        assert!(RawPersona::from_value(json!("just a string")).is_err());
        assert!(RawPersona::from_value(json!([1, 2])).is_err());
    }

    #[test]
    fn test_source_parse() {
        assert_eq!(PersonaSource::parse("REMOTE"), Some(PersonaSource::Remote));
        assert_eq!(PersonaSource::parse("elsewhere"), None);
        assert_eq!(serde_json::to_value(PersonaSource::Default).unwrap(), json!("default"));
    }
}

//! Ranked persona search with per-field match explanation

use serde::Serialize;

use super::types::Persona;

/// Fields a search term can match, with their ranking weights
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchField {
    Name,
    Id,
    Category,
    Tags,
    Goal,
    Description,
}

impl MatchField {
    fn weight(&self) -> u32 {
        match self {
            MatchField::Name => 5,
            MatchField::Id => 3,
            MatchField::Category => 3,
            MatchField::Tags => 2,
            MatchField::Goal => 2,
            MatchField::Description => 1,
        }
    }
}

/// A persona that matched a search, with the reasons it matched
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub persona: Persona,
    pub score: u32,
    pub matched_fields: Vec<MatchField>,
}

/// Search terms: the whole query plus its individual words
fn terms(query: &str) -> Vec<String> {
    let whole = query.trim().to_lowercase();
    let mut terms = vec![whole.clone()];
    for word in whole.split_whitespace() {
        if word.chars().count() > 1 && !terms.iter().any(|t| t == word) {
            terms.push(word.to_string());
        }
    }
    terms.retain(|t| !t.is_empty());
    terms
}

fn field_matches(persona: &Persona, field: MatchField, term: &str) -> bool {
    let contains = |s: &str| s.to_lowercase().contains(term);
    match field {
        MatchField::Name => contains(&persona.name),
        MatchField::Id => contains(&persona.id),
        MatchField::Category => persona.category.as_deref().map_or(false, contains),
        MatchField::Tags => persona.tags.iter().any(|t| contains(t)),
        MatchField::Goal => contains(&persona.goal),
        MatchField::Description => persona.description.as_deref().map_or(false, contains),
    }
}

const FIELDS: [MatchField; 6] = [
    MatchField::Name,
    MatchField::Id,
    MatchField::Category,
    MatchField::Tags,
    MatchField::Goal,
    MatchField::Description,
];

/// Rank personas against a free-text query, best match first
///
/// Matching is case-insensitive substring matching of the whole query
/// and of each of its words. A whole-query hit counts double.
pub fn rank(personas: &[Persona], query: &str) -> Vec<SearchHit> {
    let terms = terms(query);
    if terms.is_empty() {
        return Vec::new();
    }

    let mut hits: Vec<SearchHit> = personas
        .iter()
        .filter_map(|persona| {
            let mut score = 0;
            let mut matched_fields = Vec::new();
            for field in FIELDS {
                for (i, term) in terms.iter().enumerate() {
                    if field_matches(persona, field, term) {
                        score += if i == 0 { field.weight() * 2 } else { field.weight() };
                        if !matched_fields.contains(&field) {
                            matched_fields.push(field);
                        }
                    }
                }
            }
            (score > 0).then(|| SearchHit {
                persona: persona.clone(),
                score,
                matched_fields,
            })
        })
        .collect();

    // Stable sort keeps source order among equal scores
    hits.sort_by(|a, b| b.score.cmp(&a.score));
    hits
}

//! Persona scoring and greedy composite selection

use std::collections::HashSet;

use tracing::debug;

use crate::error::{Error, Result};
use crate::persona::Persona;

use super::classify::{Archetype, ArchetypeSet, Classifier, QueryAnalysis};

/// Upper bound on an intelligently selected roster
pub const MAX_PERSONAS: usize = 4;
/// Candidates are admitted unconditionally until this many are selected
pub const MIN_PERSONAS: usize = 2;
/// Minimum combined score for admission past the minimum
pub const ADMISSION_THRESHOLD: f64 = 3.0;

// ─────────────────────────────────────────────────────────────────
// Scoring
// ─────────────────────────────────────────────────────────────────

/// Relevance of a persona to an analyzed query
pub fn base_score(classifier: &dyn Classifier, persona: &Persona, query: &QueryAnalysis) -> f64 {
    let mut score = 2 * classifier.type_matches(persona, query.query_type);

    let goal = persona.goal.to_lowercase();
    let rule = persona.rule.to_lowercase();
    let description = persona.description.as_deref().unwrap_or_default().to_lowercase();
    let tags: Vec<String> = persona.tags.iter().map(|t| t.to_lowercase()).collect();

    for keyword in &query.keywords {
        let keyword = keyword.as_str();
        if goal.contains(keyword) {
            score += 3;
        }
        if description.contains(keyword) {
            score += 2;
        }
        if tags.iter().any(|t| t.contains(keyword)) {
            score += 1;
        }
        if rule.contains(keyword) {
            score += 1;
        }
    }

    if let (Some(wanted), Some(category)) = (query.category, persona.category.as_deref()) {
        if category.eq_ignore_ascii_case(wanted.as_str()) {
            score += 5;
        }
    }

    let archetypes = classifier.archetypes(persona);
    for (needed, archetype) in [
        (query.needs_critical, Archetype::Critical),
        (query.needs_creative, Archetype::Creative),
        (query.needs_analytical, Archetype::Analytical),
    ] {
        if needed && archetypes.contains(archetype) {
            score += 4;
        }
    }

    score as f64
}

/// Bonus for what a candidate adds to the roster so far
fn diversity_bonus(selected: &[Scored<'_>], candidate: &Scored<'_>) -> f64 {
    let mut bonus = 0.0;

    let categories: HashSet<&str> = selected
        .iter()
        .filter_map(|s| s.persona.category.as_deref())
        .collect();
    if let Some(category) = candidate.persona.category.as_deref() {
        if !categories.contains(category) {
            bonus += 3.0;
        }
    }

    let tags: HashSet<&str> = selected
        .iter()
        .flat_map(|s| s.persona.tags.iter().map(String::as_str))
        .collect();
    let new_tags = candidate
        .persona
        .tags
        .iter()
        .filter(|t| !tags.contains(t.as_str()))
        .count();
    bonus += 0.5 * new_tags as f64;

    let covered = roster_archetypes(selected);
    for archetype in candidate.archetypes.iter() {
        if !covered.contains(archetype) {
            bonus += 2.0;
        }
    }
    bonus
}

/// Bonus for balancing the roster against the query's needs
fn complementary_bonus(selected: &[Scored<'_>], candidate: &Scored<'_>, query: &QueryAnalysis) -> f64 {
    let covered = roster_archetypes(selected);
    let mut bonus = 0.0;

    if covered.contains(Archetype::Critical) && candidate.archetypes.contains(Archetype::Supportive) {
        bonus += 2.0;
    }
    if covered.contains(Archetype::Supportive) && candidate.archetypes.contains(Archetype::Critical) {
        bonus += 2.0;
    }
    if query.is_complex && candidate.archetypes.contains(Archetype::Analytical) {
        bonus += 1.0;
    }
    if query.is_innovative && candidate.archetypes.contains(Archetype::Creative) {
        bonus += 1.0;
    }
    bonus
}

struct Scored<'a> {
    persona: &'a Persona,
    score: f64,
    archetypes: ArchetypeSet,
}

fn roster_archetypes(selected: &[Scored<'_>]) -> ArchetypeSet {
    selected
        .iter()
        .fold(ArchetypeSet::default(), |acc, s| acc.union(s.archetypes))
}

// ─────────────────────────────────────────────────────────────────
// Selection
// ─────────────────────────────────────────────────────────────────

/// Pick a balanced roster of 1 to [`MAX_PERSONAS`] personas for `query`
///
/// Returns an empty roster only when `personas` is empty.
pub fn intelligent_selection(
    classifier: &dyn Classifier,
    query: &str,
    personas: &[Persona],
) -> Vec<Persona> {
    let Some(first) = personas.first() else {
        return Vec::new();
    };

    let analysis = classifier.analyze_query(query);
    let mut ranked: Vec<Scored<'_>> = personas
        .iter()
        .map(|p| Scored {
            persona: p,
            score: base_score(classifier, p, &analysis),
            archetypes: classifier.archetypes(p),
        })
        .collect();
    // Stable: equal scores keep repository order
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut selected: Vec<Scored<'_>> = Vec::new();
    let mut rest = ranked.into_iter();
    if let Some(anchor) = rest.next() {
        if anchor.score > 0.0 {
            selected.push(anchor);
        }
    }

    for candidate in rest {
        if selected.len() >= MAX_PERSONAS {
            break;
        }
        if candidate.score < 1.0 {
            continue;
        }
        let total = candidate.score
            + diversity_bonus(&selected, &candidate)
            + complementary_bonus(&selected, &candidate, &analysis);

        debug!(persona = %candidate.persona.id, base = candidate.score, total, "Selection candidate");
        if total >= ADMISSION_THRESHOLD || selected.len() < MIN_PERSONAS {
            selected.push(candidate);
        }
    }

    if selected.is_empty() {
        return vec![first.clone()];
    }
    selected.into_iter().map(|s| s.persona.clone()).collect()
}

/// The personas among `personas` whose id is listed in `ids`
pub fn select_explicit(personas: &[Persona], ids: &[String]) -> Result<Vec<Persona>> {
    let selected: Vec<Persona> = personas
        .iter()
        .filter(|p| ids.iter().any(|id| id == &p.id))
        .cloned()
        .collect();

    if selected.is_empty() {
        return Err(Error::NotFound {
            what: "Persona".to_string(),
            id: ids.join(", "),
            hints: vec!["None of the requested persona ids exist.".to_string()],
        });
    }
    Ok(selected)
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaboration::classify::KeywordClassifier;
    use crate::persona::{default_personas, PersonaSource};

    fn persona(id: &str, category: &str, goal: &str, rule: &str, tags: &[&str]) -> Persona {
        Persona {
            id: id.to_string(),
            name: id.to_string(),
            rule: rule.to_string(),
            goal: goal.to_string(),
            version: "1".to_string(),
            description: None,
            category: Some(category.to_string()),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            capabilities: vec![],
            limitations: vec![],
            examples: vec![],
            related_personas: vec![],
            source: PersonaSource::Local,
        }
    }

    #[test]
    fn test_selection_bounds_on_defaults() {
        let c = KeywordClassifier::new();
        for query in [
            "Evaluate risk of launching this product now",
            "We need creative ideas for our new brand",
            "hello world",
            "随便聊聊",
        ] {
            let selected = intelligent_selection(&c, query, &default_personas());
            assert!(!selected.is_empty(), "empty roster for {query}");
            assert!(selected.len() <= MAX_PERSONAS);
        }
    }

    #[test]
    fn test_no_relevant_persona_falls_back_to_first() {
        let c = KeywordClassifier::new();
        let personas = vec![
            persona("a", "misc", "Bake bread", "Knead", &[]),
            persona("b", "misc", "Paint walls", "Brush", &[]),
        ];
        let selected = intelligent_selection(&c, "zzz qqq", &personas);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, "a");
    }

    #[test]
    fn test_critical_query_picks_critic_first() {
        let c = KeywordClassifier::new();
        let selected = intelligent_selection(&c, "What is the biggest risk in this plan", &default_personas());
        assert_eq!(selected[0].id, "grumpy-critic");
    }

    #[test]
    fn test_category_match_scores() {
        let c = KeywordClassifier::new();
        let analysis = c.analyze_query("Improve the product onboarding");
        let product = persona("p", "Product", "Ship features", "Be pragmatic", &[]);
        let other = persona("o", "misc", "Ship features", "Be pragmatic", &[]);
        assert_eq!(
            base_score(&c, &product, &analysis) - base_score(&c, &other, &analysis),
            5.0
        );
    }

    #[test]
    fn test_explicit_selection() {
        let personas = default_personas();
        let selected =
            select_explicit(&personas, &["warm-sister".into(), "nobody".into()]).unwrap();
        assert_eq!(selected.len(), 1);

        let err = select_explicit(&personas, &["nobody".into()]).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }
}

//! Cross-validation of a session's persona analyses
//!
//! Stateless: the result depends only on the analyses passed in and the
//! personas that produced them. Failed analyses are left out of the text
//! mining but still pull the mean confidence down.

use std::collections::HashMap;

use crate::persona::Persona;

use super::classify::{Archetype, ArchetypeSet, Classifier, Theme};
use super::types::{CrossValidation, PersonaAnalysis};

const RECOMMENDATION_KEY_CHARS: usize = 20;
const MAX_RECOMMENDATIONS: usize = 3;
const SENTIMENT_THRESHOLD: f64 = 0.1;
const DISTINCT_RECOMMENDATION_RATIO: f64 = 0.7;
const AGREEMENT_SUFFIX: &str = " (multiple analysts agree)";

const THEME_POINTS: [(Theme, &str); 3] = [
    (Theme::Risk, "Multiple analysts identified potential risks and challenges"),
    (Theme::Opportunity, "Analysts broadly see real opportunities and advantages"),
    (Theme::Recommendation, "Every side proposed concrete next steps"),
];
const NO_COMMON_POINT: &str = "Each analyst contributed a distinct, valuable perspective";
const SENTIMENT_SPLIT: &str = "Analysts disagree on the overall outlook: some are optimistic, others pessimistic";
const DIVERGENT_ACTIONS: &str = "Recommended actions point in different directions";
const ROLE_TENSION: &str = "Critical and supportive viewpoints are in clear tension";
const DEFAULT_RECOMMENDATION: &str = "Weigh every perspective and agree on a balanced plan of action";

/// Cross-validate `analyses`; `roster` supplies the archetypes of their authors
pub fn cross_validate(
    classifier: &dyn Classifier,
    analyses: &[PersonaAnalysis],
    roster: &[Persona],
) -> CrossValidation {
    if analyses.len() < 2 {
        return CrossValidation {
            common_points: vec!["Only one analysis available; nothing to cross-validate".to_string()],
            disagreements: vec![],
            confidence_score: 0.7,
            recommendations: vec!["Add more personas to the collaboration to raise confidence".to_string()],
        };
    }

    let usable: Vec<&PersonaAnalysis> = analyses.iter().filter(|a| !a.is_failed()).collect();

    let common_points = common_points(classifier, &usable);
    let disagreements = disagreements(classifier, &usable, analyses, roster);
    let recommendations = merged_recommendations(classifier, &usable);
    let confidence_score = blended_confidence(common_points.len(), disagreements.len(), analyses);

    CrossValidation {
        common_points,
        disagreements,
        confidence_score,
        recommendations,
    }
}

/// Result used when cross-validation is switched off
pub fn skipped(analyses: &[PersonaAnalysis]) -> CrossValidation {
    CrossValidation {
        common_points: vec![],
        disagreements: vec![],
        confidence_score: mean_confidence(analyses).clamp(0.1, 0.95),
        recommendations: vec![],
    }
}

fn common_points(classifier: &dyn Classifier, usable: &[&PersonaAnalysis]) -> Vec<String> {
    let majority = ((usable.len() + 1) / 2).max(1);

    let mut points: Vec<String> = THEME_POINTS
        .iter()
        .filter(|(theme, _)| {
            usable
                .iter()
                .filter(|a| classifier.mentions(&a.analysis, *theme))
                .count()
                >= majority
        })
        .map(|(_, point)| point.to_string())
        .collect();

    if points.is_empty() {
        points.push(NO_COMMON_POINT.to_string());
    }
    points
}

fn disagreements(
    classifier: &dyn Classifier,
    usable: &[&PersonaAnalysis],
    all: &[PersonaAnalysis],
    roster: &[Persona],
) -> Vec<String> {
    let mut found = Vec::new();

    let sentiments: Vec<f64> = usable.iter().map(|a| classifier.sentiment(&a.analysis)).collect();
    if sentiments.iter().any(|s| *s > SENTIMENT_THRESHOLD)
        && sentiments.iter().any(|s| *s < -SENTIMENT_THRESHOLD)
    {
        found.push(SENTIMENT_SPLIT.to_string());
    }

    let phrases: Vec<String> = usable
        .iter()
        .flat_map(|a| classifier.extract_recommendations(&a.analysis))
        .collect();
    let distinct = {
        let mut unique: Vec<&String> = phrases.iter().collect();
        unique.sort();
        unique.dedup();
        unique.len()
    };
    if distinct as f64 > phrases.len() as f64 * DISTINCT_RECOMMENDATION_RATIO {
        found.push(DIVERGENT_ACTIONS.to_string());
    }

    let authors: ArchetypeSet = all
        .iter()
        .filter_map(|a| roster.iter().find(|p| p.id == a.persona_id))
        .fold(ArchetypeSet::default(), |acc, p| acc.union(classifier.archetypes(p)));
    if authors.contains(Archetype::Critical) && authors.contains(Archetype::Supportive) {
        found.push(ROLE_TENSION.to_string());
    }

    found
}

/// Most frequent recommendation phrases, keyed by their leading characters
fn merged_recommendations(classifier: &dyn Classifier, usable: &[&PersonaAnalysis]) -> Vec<String> {
    let phrases: Vec<String> = usable
        .iter()
        .flat_map(|a| classifier.extract_recommendations(&a.analysis))
        .collect();

    // (key, first full phrase, count) in first-seen order
    let mut grouped: Vec<(String, &str, usize)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for phrase in &phrases {
        let key: String = phrase.chars().take(RECOMMENDATION_KEY_CHARS).collect();
        match index.get(&key) {
            Some(&i) => grouped[i].2 += 1,
            None => {
                index.insert(key.clone(), grouped.len());
                grouped.push((key, phrase, 1));
            }
        }
    }
    grouped.sort_by(|a, b| b.2.cmp(&a.2));

    let merged: Vec<String> = grouped
        .into_iter()
        .take(MAX_RECOMMENDATIONS)
        .map(|(_, phrase, count)| {
            if count > 1 {
                format!("{}{}", phrase, AGREEMENT_SUFFIX)
            } else {
                phrase.to_string()
            }
        })
        .collect();

    if merged.is_empty() {
        vec![DEFAULT_RECOMMENDATION.to_string()]
    } else {
        merged
    }
}

fn mean_confidence(analyses: &[PersonaAnalysis]) -> f64 {
    if analyses.is_empty() {
        return 0.0;
    }
    analyses.iter().map(|a| a.confidence).sum::<f64>() / analyses.len() as f64
}

fn blended_confidence(common: usize, disagreements: usize, analyses: &[PersonaAnalysis]) -> f64 {
    let mut base = 0.5;
    base += f64::min(0.3, 0.1 * common as f64);
    base -= f64::min(0.2, 0.05 * disagreements as f64);
    base += f64::min(0.2, 0.05 * analyses.len().saturating_sub(1) as f64);

    ((base + mean_confidence(analyses)) / 2.0).clamp(0.1, 0.95)
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaboration::classify::KeywordClassifier;
    use crate::persona::default_personas;
    use chrono::Utc;

    fn analysis(persona_id: &str, text: &str, confidence: f64) -> PersonaAnalysis {
        PersonaAnalysis {
            persona_id: persona_id.to_string(),
            persona_name: persona_id.to_string(),
            query: "q".to_string(),
            round: 1,
            analysis: text.to_string(),
            confidence,
            execution_time_ms: 0,
            timestamp: Utc::now(),
            error: None,
        }
    }

    fn failed(persona_id: &str) -> PersonaAnalysis {
        PersonaAnalysis {
            error: Some("provider down".into()),
            ..analysis(persona_id, "Analysis failed: risk of everything", 0.0)
        }
    }

    #[test]
    fn test_single_analysis_is_degenerate() {
        let c = KeywordClassifier::new();
        let cv = cross_validate(&c, &[analysis("a", "anything", 0.9)], &[]);
        assert_eq!(cv.confidence_score, 0.7);
        assert!(cv.disagreements.is_empty());
        assert_eq!(cv.recommendations.len(), 1);
    }

    #[test]
    fn test_majority_theme_becomes_common_point() {
        let c = KeywordClassifier::new();
        let analyses = vec![
            analysis("a", "The main risk is cost.", 0.7),
            analysis("b", "Timeline risk dominates.", 0.7),
            analysis("c", "Looks fine to me.", 0.7),
        ];
        let cv = cross_validate(&c, &analyses, &[]);
        assert!(cv.common_points.iter().any(|p| p.contains("risks")));
    }

    #[test]
    fn test_failed_analyses_excluded_from_mining() {
        let c = KeywordClassifier::new();
        let analyses = vec![
            analysis("a", "All good here.", 0.8),
            failed("b"),
            failed("c"),
        ];
        let cv = cross_validate(&c, &analyses, &[]);
        assert_eq!(cv.common_points, vec![NO_COMMON_POINT.to_string()]);

        // Failed records still count towards the mean
        let healthy = cross_validate(
            &c,
            &[analysis("a", "All good here.", 0.8), analysis("b", "All good here.", 0.8), analysis("c", "All good here.", 0.8)],
            &[],
        );
        assert!(cv.confidence_score < healthy.confidence_score);
    }

    #[test]
    fn test_sentiment_split_and_role_tension() {
        let c = KeywordClassifier::new();
        let roster = default_personas();
        let analyses = vec![
            analysis("grumpy-critic", "serious risk and a clear problem", 0.6),
            analysis("warm-sister", "great opportunity and real strength", 0.6),
        ];
        let cv = cross_validate(&c, &analyses, &roster);
        assert!(cv.disagreements.contains(&SENTIMENT_SPLIT.to_string()));
        assert!(cv.disagreements.contains(&ROLE_TENSION.to_string()));
    }

    #[test]
    fn test_recommendations_merged_by_prefix() {
        let c = KeywordClassifier::new();
        let analyses = vec![
            analysis("a", "You should run a small pilot in March.", 0.6),
            analysis("b", "You should run a small pilot in April.", 0.6),
            analysis("c", "You should hire a designer soon.", 0.6),
        ];
        let cv = cross_validate(&c, &analyses, &[]);
        assert_eq!(cv.recommendations[0], "run a small pilot in March (multiple analysts agree)");
        assert_eq!(cv.recommendations[1], "hire a designer soon");
        // Three distinct phrases out of three
        assert!(cv.disagreements.contains(&DIVERGENT_ACTIONS.to_string()));
    }

    #[test]
    fn test_confidence_bounds() {
        let c = KeywordClassifier::new();
        let low = cross_validate(&c, &[failed("a"), failed("b")], &[]);
        assert!(low.confidence_score >= 0.1);

        let many: Vec<_> = (0..8)
            .map(|i| analysis(&format!("p{i}"), "risk opportunity recommend", 1.0))
            .collect();
        let high = cross_validate(&c, &many, &[]);
        assert!(high.confidence_score <= 0.95);
    }

    #[test]
    fn test_skipped_uses_mean_confidence() {
        let cv = skipped(&[analysis("a", "x", 0.6), analysis("b", "y", 0.8)]);
        assert!((cv.confidence_score - 0.7).abs() < 1e-9);
        assert!(cv.common_points.is_empty());
    }
}

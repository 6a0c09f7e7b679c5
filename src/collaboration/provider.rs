//! Analysis provider seam and the deterministic template provider
//!
//! The orchestrator never generates analysis text itself. Everything
//! textual goes through [`AnalysisProvider`], which a deployment backs with
//! a language model. [`TemplateProvider`] is the built-in stand-in: fully
//! deterministic and archetype-aware, so results are reproducible.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::persona::Persona;

use super::classify::{Archetype, Classifier, Theme};
use super::types::{ActionStep, CrossValidation, PersonaAnalysis, Priority, Synthesis};

/// Input for one persona analysis
#[derive(Debug, Clone, Copy)]
pub struct AnalysisRequest<'a> {
    pub persona: &'a Persona,
    /// The caller's original query
    pub query: &'a str,
    /// Role-conditioned prompt, including any prior-round context
    pub prompt: &'a str,
    pub round: u32,
}

/// Performs per-persona analysis, synthesis and action planning
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    async fn analyze(&self, request: AnalysisRequest<'_>) -> Result<String>;

    async fn synthesize(
        &self,
        query: &str,
        analyses: &[PersonaAnalysis],
        cross_validation: &CrossValidation,
    ) -> Result<Synthesis>;

    async fn plan_actions(&self, query: &str, synthesis: &Synthesis) -> Result<Vec<ActionStep>>;
}

/// Role-conditioned prompt for `persona` answering `query`
pub fn build_prompt(persona: &Persona, query: &str) -> String {
    let mut prompt = format!(
        "You are \"{}\".\n\nGoal: {}\nRules: {}\n",
        persona.name, persona.goal, persona.rule
    );
    if let Some(description) = &persona.description {
        prompt.push_str(&format!("Description: {}\n", description));
    }
    prompt.push_str(&format!(
        "\nAnalyze the following from your role's perspective:\n\n{}\n\n\
         Structure your answer as: core view, key findings, risks, concrete recommendations. \
         Stay in character.",
        query
    ));
    prompt
}

// ─────────────────────────────────────────────────────────────────
// Template Provider
// ─────────────────────────────────────────────────────────────────

const CRITICAL_TEMPLATES: &[&str] = &[
    "Core view: {name} sees a serious problem in \"{query}\". \
     Key findings: weak assumptions, hidden flaws, missing evidence. \
     Risk: failure here is costly and hard to undo. \
     Recommendation: you should stop and run a small pilot before any commitment.",
    "Core view: {name} thinks \"{query}\" looks too optimistic. \
     Key findings: the difficult parts are glossed over. \
     Risk: every concern ignored now becomes a problem later. \
     Recommendation: you should validate feasibility with a small test first.",
];

const CREATIVE_TEMPLATES: &[&str] = &[
    "Core view: {name} sees creative potential in \"{query}\" from many angles. \
     Key findings: several fresh possibilities stand out. \
     Risk: playing it safe could make the result forgettable. \
     Recommendation: you should try one bold idea that breaks the usual pattern.",
    "Core view: {name} finds real room for innovation in \"{query}\". \
     Key findings: recent trends open new combinations. \
     Risk: existing frameworks may limit imagination. \
     Recommendation: you should run a brainstorm and collect more inspiration.",
];

const SUPPORTIVE_TEMPLATES: &[&str] = &[
    "Core view: {name} sees great strength and opportunity in \"{query}\". \
     Key findings: the advantages are real and promising. \
     Risk: momentum fades when good progress goes unnoticed. \
     Recommendation: you should build on these strengths and share early success.",
    "Core view: {name} is excited about \"{query}\" and its positive upside. \
     Key findings: effective foundations and a great opportunity. \
     Risk: doubt can stall a feasible plan. \
     Recommendation: you should celebrate quick wins to keep energy high.",
];

const NEUTRAL_TEMPLATES: &[&str] = &[
    "Core view: {name} believes \"{query}\" deserves a careful look at every dimension. \
     Key findings: the data points to a few decisive factors. \
     Risk: implementation may face constraints worth planning for. \
     Recommendation: you should draft a detailed plan and execute it step by step.",
    "Core view: {name} treats \"{query}\" as a question worth thinking through. \
     Key findings: several dimensions interact in non-obvious ways. \
     Risk: changing conditions during execution. \
     Recommendation: you should survey the current state before choosing a targeted approach.",
];

/// Deterministic, archetype-aware [`AnalysisProvider`]
pub struct TemplateProvider {
    classifier: Arc<dyn Classifier>,
}

impl TemplateProvider {
    pub fn new(classifier: Arc<dyn Classifier>) -> Self {
        Self { classifier }
    }

    fn templates_for(&self, persona: &Persona) -> &'static [&'static str] {
        let archetypes = self.classifier.archetypes(persona);
        if archetypes.contains(Archetype::Critical) {
            CRITICAL_TEMPLATES
        } else if archetypes.contains(Archetype::Creative) && !archetypes.contains(Archetype::Supportive) {
            CREATIVE_TEMPLATES
        } else if archetypes.contains(Archetype::Supportive) {
            SUPPORTIVE_TEMPLATES
        } else {
            NEUTRAL_TEMPLATES
        }
    }

    /// Sentences of successful analyses that mention `theme`
    fn sentences_about(&self, analyses: &[PersonaAnalysis], theme: Theme, limit: usize) -> Vec<String> {
        let mut found: Vec<String> = Vec::new();
        for analysis in analyses.iter().filter(|a| !a.is_failed()) {
            for sentence in analysis.analysis.split_terminator(['.', '。', '\n']) {
                let sentence = sentence.trim();
                if sentence.is_empty() || !self.classifier.mentions(sentence, theme) {
                    continue;
                }
                let entry = format!("{}: {}", analysis.persona_name, sentence);
                if !found.contains(&entry) {
                    found.push(entry);
                }
                if found.len() == limit {
                    return found;
                }
            }
        }
        found
    }
}

#[async_trait]
impl AnalysisProvider for TemplateProvider {
    async fn analyze(&self, request: AnalysisRequest<'_>) -> Result<String> {
        let templates = self.templates_for(request.persona);
        let index = (request.query.chars().count() + request.round as usize) % templates.len();
        Ok(templates[index]
            .replace("{name}", &request.persona.name)
            .replace("{query}", request.query))
    }

    async fn synthesize(
        &self,
        query: &str,
        analyses: &[PersonaAnalysis],
        cross_validation: &CrossValidation,
    ) -> Result<Synthesis> {
        let succeeded = analyses.iter().filter(|a| !a.is_failed()).count();
        let mut personas: Vec<&str> = Vec::new();
        for analysis in analyses {
            if !personas.contains(&analysis.persona_name.as_str()) {
                personas.push(&analysis.persona_name);
            }
        }

        let summary = format!(
            "{} of {} analyses from {} succeeded on \"{}\" (confidence {:.2}).",
            succeeded,
            analyses.len(),
            personas.join(", "),
            query,
            cross_validation.confidence_score
        );

        let mut key_insights = cross_validation.common_points.clone();
        key_insights.extend(cross_validation.disagreements.iter().cloned());

        Ok(Synthesis {
            summary,
            key_insights,
            risks: self.sentences_about(analyses, Theme::Risk, 5),
            opportunities: self.sentences_about(analyses, Theme::Opportunity, 5),
            recommendations: cross_validation.recommendations.clone(),
        })
    }

    async fn plan_actions(&self, query: &str, synthesis: &Synthesis) -> Result<Vec<ActionStep>> {
        let mut steps = vec![ActionStep {
            step: 1,
            action: format!("Clarify goals and success criteria for: {}", query),
            priority: Priority::High,
            dependencies: vec![],
            timeline: "1-2 days".to_string(),
        }];

        for (i, recommendation) in synthesis.recommendations.iter().take(3).enumerate() {
            steps.push(ActionStep {
                step: steps.len() as u32 + 1,
                action: recommendation.clone(),
                priority: if i == 0 { Priority::High } else { Priority::Medium },
                dependencies: vec![1],
                timeline: "1 week".to_string(),
            });
        }

        if let Some(risk) = synthesis.risks.first() {
            steps.push(ActionStep {
                step: steps.len() as u32 + 1,
                action: format!("Mitigate the leading risk ({})", risk),
                priority: Priority::Medium,
                dependencies: vec![1],
                timeline: "1-2 weeks".to_string(),
            });
        }

        let previous: Vec<u32> = steps.iter().map(|s| s.step).collect();
        steps.push(ActionStep {
            step: steps.len() as u32 + 1,
            action: "Review outcomes and adjust the plan".to_string(),
            priority: Priority::Low,
            dependencies: previous,
            timeline: "2-4 weeks".to_string(),
        });
        Ok(steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaboration::classify::KeywordClassifier;
    use crate::persona::default_personas;
    use chrono::Utc;

    fn provider() -> TemplateProvider {
        TemplateProvider::new(Arc::new(KeywordClassifier::new()))
    }

    fn persona(id: &str) -> Persona {
        default_personas().into_iter().find(|p| p.id == id).unwrap()
    }

    #[test]
    fn test_prompt_carries_role() {
        let p = persona("grumpy-critic");
        let prompt = build_prompt(&p, "Is this a good idea?");
        assert!(prompt.contains(&p.goal));
        assert!(prompt.contains(&p.rule));
        assert!(prompt.contains("Is this a good idea?"));
    }

    #[tokio::test]
    async fn test_analysis_is_deterministic_and_archetyped() {
        let provider = provider();
        let critic = persona("grumpy-critic");
        let request = AnalysisRequest {
            persona: &critic,
            query: "Launch next week",
            prompt: "",
            round: 1,
        };
        let first = provider.analyze(request).await.unwrap();
        let second = provider.analyze(request).await.unwrap();
        assert_eq!(first, second);
        assert!(first.contains("Grumpy Critic"));
        assert!(first.contains("Launch next week"));

        let c = KeywordClassifier::new();
        assert!(c.sentiment(&first) < 0.0);
    }

    #[tokio::test]
    async fn test_plan_dependencies_point_backwards() {
        let synthesis = Synthesis {
            recommendations: vec!["run a pilot".into(), "hire".into()],
            risks: vec!["cost".into()],
            ..Default::default()
        };
        let steps = provider().plan_actions("q", &synthesis).await.unwrap();
        assert_eq!(steps.len(), 5);
        for (i, step) in steps.iter().enumerate() {
            assert_eq!(step.step as usize, i + 1);
            assert!(step.dependencies.iter().all(|d| *d < step.step));
        }
        assert_eq!(steps.last().unwrap().priority, Priority::Low);
    }

    #[tokio::test]
    async fn test_synthesis_skips_failed_analyses() {
        let ok = PersonaAnalysis {
            persona_id: "a".into(),
            persona_name: "A".into(),
            query: "q".into(),
            round: 1,
            analysis: "There is a real risk of delay. Great opportunity in Asia.".into(),
            confidence: 0.8,
            execution_time_ms: 1,
            timestamp: Utc::now(),
            error: None,
        };
        let failed = PersonaAnalysis {
            persona_id: "b".into(),
            persona_name: "B".into(),
            analysis: "Analysis failed: risk engine offline".into(),
            confidence: 0.0,
            error: Some("offline".into()),
            ..ok.clone()
        };
        let cv = CrossValidation {
            common_points: vec!["p".into()],
            disagreements: vec![],
            confidence_score: 0.6,
            recommendations: vec!["r".into()],
        };

        let synthesis = provider().synthesize("q", &[ok, failed], &cv).await.unwrap();
        assert_eq!(synthesis.risks, vec!["A: There is a real risk of delay"]);
        assert_eq!(synthesis.opportunities, vec!["A: Great opportunity in Asia"]);
        assert!(synthesis.summary.starts_with("1 of 2"));
        assert_eq!(synthesis.recommendations, vec!["r"]);
    }
}

//! Collaboration orchestrator
//!
//! Drives one session end to end: selection, strategy execution,
//! cross-validation, synthesis and action planning. Each orchestrator
//! owns its session registry; nothing is shared between instances.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::persona::{Persona, PersonaStore};

use super::classify::{Archetype, ArchetypeSet, Classifier};
use super::provider::{build_prompt, AnalysisProvider, AnalysisRequest};
use super::selection::{intelligent_selection, select_explicit};
use super::session::{Session, SessionInfo, SessionRegistry};
use super::types::{
    CollaborationConfig, CollaborationMode, CollaborationResult, PersonaAnalysis, Strategy,
};
use super::validation;

/// Complexity above which a complementary roster runs the hybrid strategy
const HYBRID_COMPLEXITY: f64 = 0.7;

/// Per-run state threaded through the strategies
struct RunContext<'a> {
    session_id: &'a str,
    query: &'a str,
    config: &'a CollaborationConfig,
    token: &'a CancellationToken,
}

/// Archives the session however the run ends, including when the
/// collaboration future is dropped mid-flight
struct ArchiveOnDrop<'a> {
    sessions: &'a SessionRegistry,
    id: String,
}

impl Drop for ArchiveOnDrop<'_> {
    fn drop(&mut self) {
        self.sessions.archive(&self.id);
    }
}

/// Runs collaboration sessions over a persona store and analysis provider
pub struct Orchestrator {
    store: Arc<dyn PersonaStore>,
    provider: Arc<dyn AnalysisProvider>,
    classifier: Arc<dyn Classifier>,
    defaults: CollaborationConfig,
    sessions: SessionRegistry,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn PersonaStore>,
        provider: Arc<dyn AnalysisProvider>,
        classifier: Arc<dyn Classifier>,
        defaults: CollaborationConfig,
        history_size: usize,
    ) -> Self {
        Self {
            store,
            provider,
            classifier,
            defaults,
            sessions: SessionRegistry::new(history_size),
        }
    }

    /// Configuration new sessions start from
    pub fn default_config(&self) -> CollaborationConfig {
        self.defaults.clone()
    }

    pub fn active_sessions(&self) -> Vec<SessionInfo> {
        self.sessions.active()
    }

    pub fn session_history(&self, limit: Option<usize>) -> Vec<SessionInfo> {
        self.sessions.history(limit)
    }

    /// Abort a running session; it ends as failed
    pub fn cancel_session(&self, session_id: &str) -> bool {
        let cancelled = self.sessions.cancel(session_id);
        if cancelled {
            info!(session_id = %session_id, "Session cancellation requested");
        }
        cancelled
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    // ─────────────────────────────────────────────────────────────
    // Session Lifecycle
    // ─────────────────────────────────────────────────────────────

    /// Run a full collaboration for `query`
    ///
    /// The session is archived whatever the outcome. Per-persona failures
    /// are recorded in the result; selection, synthesis or planning
    /// failures and cancellation fail the session and are returned.
    pub async fn start_collaboration(
        &self,
        query: &str,
        config: CollaborationConfig,
    ) -> Result<CollaborationResult> {
        let session = Session::new(query, config.clone());
        let token = session.cancel_token();
        let started = session.started();
        let id = self.sessions.insert(session);
        let _archive = ArchiveOnDrop {
            sessions: &self.sessions,
            id: id.clone(),
        };

        info!(session_id = %id, mode = %config.mode, "Collaboration started");

        let ctx = RunContext {
            session_id: &id,
            query,
            config: &config,
            token: &token,
        };
        let outcome = self.run(&ctx, started).await;

        match &outcome {
            Ok(result) => {
                self.sessions
                    .update(&id, |s| s.mark_completed(result.clone()))?;
                info!(
                    session_id = %id,
                    strategy = %result.strategy,
                    analyses = result.analyses.len(),
                    elapsed_ms = result.execution_time_ms,
                    "Collaboration completed"
                );
            }
            Err(e) => {
                let message = e.to_string();
                // The session is still active here; only a repeated
                // terminal transition could fail
                let _ = self.sessions.update(&id, |s| s.mark_failed(message));
                warn!(session_id = %id, error = %e, "Collaboration failed");
            }
        }
        outcome
    }

    async fn run(&self, ctx: &RunContext<'_>, started: Instant) -> Result<CollaborationResult> {
        self.sessions.update(ctx.session_id, |s| s.mark_running())?;

        let personas = self.store.get_all().await;
        let roster = if ctx.config.persona_ids.is_empty() {
            intelligent_selection(self.classifier.as_ref(), ctx.query, &personas)
        } else {
            select_explicit(&personas, &ctx.config.persona_ids)?
        };
        if roster.is_empty() {
            return Err(Error::CollaborationFailed {
                session_id: ctx.session_id.to_string(),
                message: "no personas available".to_string(),
            });
        }

        let names: Vec<String> = roster.iter().map(|p| p.name.clone()).collect();
        self.sessions.update(ctx.session_id, |s| {
            s.set_selected(names.clone());
            Ok(())
        })?;
        info!(session_id = %ctx.session_id, personas = ?names, "Personas selected");

        let strategy = self.choose_strategy(ctx.config.mode, ctx.query, &roster);
        debug!(session_id = %ctx.session_id, strategy = %strategy, "Strategy chosen");

        let analyses = match strategy {
            Strategy::Parallel => self.parallel_round(ctx, &roster, ctx.query, 1).await?,
            Strategy::Sequential => self.run_sequential(ctx, &roster).await?,
            Strategy::IntelligentHybrid => self.run_hybrid(ctx, &roster).await?,
            Strategy::IntelligentDialogue => self.run_dialogue(ctx, &roster).await?,
        };

        let cross_validation = if ctx.config.enable_cross_validation {
            validation::cross_validate(self.classifier.as_ref(), &analyses, &roster)
        } else {
            validation::skipped(&analyses)
        };

        let synthesis = self
            .bounded(ctx, "synthesis", self.provider.synthesize(ctx.query, &analyses, &cross_validation))
            .await?;
        let action_plan = self
            .bounded(ctx, "action planning", self.provider.plan_actions(ctx.query, &synthesis))
            .await?;

        Ok(CollaborationResult {
            session_id: ctx.session_id.to_string(),
            query: ctx.query.to_string(),
            selected_personas: names,
            strategy,
            analyses,
            cross_validation,
            synthesis,
            action_plan,
            execution_time_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Strategy for `mode`; intelligent mode decides from the query and roster
    pub fn choose_strategy(&self, mode: CollaborationMode, query: &str, roster: &[Persona]) -> Strategy {
        match mode {
            CollaborationMode::Parallel => Strategy::Parallel,
            CollaborationMode::Sequential => Strategy::Sequential,
            CollaborationMode::Intelligent => {
                let coverage = roster.iter().fold(ArchetypeSet::default(), |acc, p| {
                    acc.union(self.classifier.archetypes(p))
                });
                let complementary = roster.len() > 2 && coverage.len() >= 2;

                if self.classifier.complexity(query) > HYBRID_COMPLEXITY && complementary {
                    Strategy::IntelligentHybrid
                } else if coverage.contains(Archetype::Critical) && coverage.contains(Archetype::Creative) {
                    Strategy::IntelligentDialogue
                } else {
                    Strategy::Parallel
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Strategies
    // ─────────────────────────────────────────────────────────────

    /// Every persona at once against the same prompt
    async fn parallel_round(
        &self,
        ctx: &RunContext<'_>,
        roster: &[Persona],
        prompt_query: &str,
        round: u32,
    ) -> Result<Vec<PersonaAnalysis>> {
        join_all(
            roster
                .iter()
                .map(|persona| self.dispatch(ctx, persona, prompt_query, round)),
        )
        .await
        .into_iter()
        .collect()
    }

    /// One persona at a time, each seeing the analyses before it
    async fn run_sequential(&self, ctx: &RunContext<'_>, roster: &[Persona]) -> Result<Vec<PersonaAnalysis>> {
        let mut analyses = Vec::with_capacity(roster.len());
        for (i, persona) in roster.iter().enumerate() {
            let prompt_query = with_transcript(ctx.query, "Previous analyses", &analyses);
            analyses.push(self.dispatch(ctx, persona, &prompt_query, 1).await?);
            debug!(session_id = %ctx.session_id, persona = %persona.id, done = i + 1, total = roster.len(), "Sequential step finished");
        }
        Ok(analyses)
    }

    /// A parallel round, then a round-table round seeded with its output
    async fn run_hybrid(&self, ctx: &RunContext<'_>, roster: &[Persona]) -> Result<Vec<PersonaAnalysis>> {
        let mut analyses = self.parallel_round(ctx, roster, ctx.query, 1).await?;
        let seeded = with_transcript(ctx.query, "Round-table: first-round analyses", &analyses);
        analyses.extend(self.parallel_round(ctx, roster, &seeded, 2).await?);
        Ok(analyses)
    }

    /// The full roster for `max_rounds` rounds, each prompt carrying the
    /// dialogue so far
    async fn run_dialogue(&self, ctx: &RunContext<'_>, roster: &[Persona]) -> Result<Vec<PersonaAnalysis>> {
        let rounds = ctx.config.max_rounds.max(1);
        let mut analyses = Vec::with_capacity(roster.len() * rounds as usize);

        for round in 1..=rounds {
            debug!(session_id = %ctx.session_id, round, rounds, "Dialogue round");
            for persona in roster {
                let heading = format!("Dialogue so far (round {})", round);
                let prompt_query = with_transcript(ctx.query, &heading, &analyses);
                analyses.push(self.dispatch(ctx, persona, &prompt_query, round).await?);
            }
        }
        Ok(analyses)
    }

    // ─────────────────────────────────────────────────────────────
    // Dispatch
    // ─────────────────────────────────────────────────────────────

    /// One persona analysis under the round timeout
    ///
    /// Provider errors and timeouts degrade into a zero-confidence record;
    /// only cancellation is returned as an error.
    async fn dispatch(
        &self,
        ctx: &RunContext<'_>,
        persona: &Persona,
        prompt_query: &str,
        round: u32,
    ) -> Result<PersonaAnalysis> {
        let prompt = build_prompt(persona, prompt_query);
        let request = AnalysisRequest {
            persona,
            query: ctx.query,
            prompt: &prompt,
            round,
        };
        let timeout = ctx.config.timeout_per_round;
        let started = Instant::now();

        let outcome = tokio::select! {
            biased;
            _ = ctx.token.cancelled() => {
                return Err(Error::cancelled(format!("analysis by {} in {}", persona.id, ctx.session_id)));
            }
            result = tokio::time::timeout(timeout, self.provider.analyze(request)) => result,
        };

        let (analysis, error) = match outcome {
            Ok(Ok(text)) => (text, None),
            Ok(Err(e)) => (format!("Analysis failed: {}", e), Some(e.to_string())),
            Err(_) => {
                let message = format!("analysis timed out after {}ms", timeout.as_millis());
                (format!("Analysis failed: {}", message), Some(message))
            }
        };
        if let Some(error) = &error {
            warn!(session_id = %ctx.session_id, persona = %persona.id, round, error = %error, "Persona analysis failed");
        }

        let confidence = match error {
            Some(_) => 0.0,
            None => self.classifier.analysis_confidence(&analysis),
        };
        let record = PersonaAnalysis {
            persona_id: persona.id.clone(),
            persona_name: persona.name.clone(),
            query: ctx.query.to_string(),
            round,
            analysis,
            confidence,
            execution_time_ms: started.elapsed().as_millis() as u64,
            timestamp: chrono::Utc::now(),
            error,
        };

        self.sessions.update(ctx.session_id, |s| {
            s.push_analysis(record.clone());
            Ok(())
        })?;
        Ok(record)
    }

    /// Await a provider step under the round timeout and the session token
    async fn bounded<T>(
        &self,
        ctx: &RunContext<'_>,
        step: &str,
        future: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let timeout = ctx.config.timeout_per_round;
        tokio::select! {
            biased;
            _ = ctx.token.cancelled() => Err(Error::cancelled(format!("{} in {}", step, ctx.session_id))),
            result = tokio::time::timeout(timeout, future) => match result {
                Ok(inner) => inner,
                Err(_) => Err(Error::CollaborationFailed {
                    session_id: ctx.session_id.to_string(),
                    message: format!("{} timed out after {}ms", step, timeout.as_millis()),
                }),
            },
        }
    }
}

/// `query` followed by the successful analyses so far under `heading`
fn with_transcript(query: &str, heading: &str, analyses: &[PersonaAnalysis]) -> String {
    let mut text = query.to_string();
    let mut entries = analyses.iter().filter(|a| !a.is_failed()).peekable();
    if entries.peek().is_none() {
        return text;
    }

    text.push_str(&format!("\n\n{}:\n", heading));
    for a in entries {
        text.push_str(&format!("\n[{}, round {}]\n{}\n", a.persona_name, a.round, a.analysis));
    }
    text
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

//! Collaboration session state and the bounded session registry
//!
//! A session only moves forward: pending → running → completed | failed.
//! Every session leaves the active set through [`SessionRegistry::archive`],
//! which pushes it to the front of a size-capped history.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};

use super::types::{CollaborationConfig, CollaborationResult, PersonaAnalysis};

// ─────────────────────────────────────────────────────────────────
// Session Status
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl SessionStatus {
    fn stage(&self) -> u8 {
        match self {
            SessionStatus::Pending => 0,
            SessionStatus::Running => 1,
            SessionStatus::Completed | SessionStatus::Failed => 2,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.stage() == 2
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────

/// One end-to-end collaboration run
#[derive(Debug)]
pub struct Session {
    id: String,
    query: String,
    config: CollaborationConfig,
    status: SessionStatus,
    selected_personas: Vec<String>,
    /// Append-only
    analyses: Vec<PersonaAnalysis>,
    result: Option<CollaborationResult>,
    error: Option<String>,
    started_at: DateTime<Utc>,
    started: Instant,
    finished: Option<Instant>,
    cancel: CancellationToken,
}

impl Session {
    pub fn new(query: impl Into<String>, config: CollaborationConfig) -> Self {
        Self {
            id: format!("session_{}", Uuid::new_v4()),
            query: query.into(),
            config,
            status: SessionStatus::Pending,
            selected_personas: Vec::new(),
            analyses: Vec::new(),
            result: None,
            error: None,
            started_at: Utc::now(),
            started: Instant::now(),
            finished: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn config(&self) -> &CollaborationConfig {
        &self.config
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn analyses(&self) -> &[PersonaAnalysis] {
        &self.analyses
    }

    pub fn result(&self) -> Option<&CollaborationResult> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Token tripped by [`SessionRegistry::cancel`]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    fn transition(&mut self, to: SessionStatus) -> Result<()> {
        if self.status.is_terminal() || to.stage() <= self.status.stage() {
            return Err(Error::Internal(format!(
                "invalid session transition {} -> {} for {}",
                self.status, to, self.id
            )));
        }
        debug!(session_id = %self.id, from = %self.status, to = %to, "Session transition");
        self.status = to;
        if to.is_terminal() {
            self.finished = Some(Instant::now());
        }
        Ok(())
    }

    /// pending → running
    pub fn mark_running(&mut self) -> Result<()> {
        self.transition(SessionStatus::Running)
    }

    /// running → completed
    pub fn mark_completed(&mut self, result: CollaborationResult) -> Result<()> {
        if self.status != SessionStatus::Running {
            return Err(Error::Internal(format!(
                "session {} cannot complete from {}",
                self.id, self.status
            )));
        }
        self.transition(SessionStatus::Completed)?;
        self.result = Some(result);
        Ok(())
    }

    /// pending | running → failed
    pub fn mark_failed(&mut self, error: impl Into<String>) -> Result<()> {
        self.transition(SessionStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }

    pub fn set_selected(&mut self, names: Vec<String>) {
        self.selected_personas = names;
    }

    pub fn push_analysis(&mut self, analysis: PersonaAnalysis) {
        self.analyses.push(analysis);
    }

    /// Elapsed time, frozen once the session is terminal
    pub fn duration_ms(&self) -> u64 {
        let end = self.finished.unwrap_or_else(Instant::now);
        end.duration_since(self.started).as_millis() as u64
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id.clone(),
            query: self.query.clone(),
            status: self.status,
            selected_personas: self.selected_personas.clone(),
            started_at: self.started_at,
            duration_ms: self.duration_ms(),
        }
    }
}

/// Summary view of a session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub query: String,
    pub status: SessionStatus,
    pub selected_personas: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

// ─────────────────────────────────────────────────────────────────
// Session Registry
// ─────────────────────────────────────────────────────────────────

/// Active sessions plus a bounded, newest-first history
pub struct SessionRegistry {
    active: RwLock<HashMap<String, Session>>,
    history: RwLock<VecDeque<Session>>,
    capacity: usize,
}

impl SessionRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            active: RwLock::new(HashMap::new()),
            history: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Register a new session; returns its id
    pub fn insert(&self, session: Session) -> String {
        let id = session.id.clone();
        self.active.write().insert(id.clone(), session);
        id
    }

    /// Run `f` against an active session
    pub fn update<T>(&self, id: &str, f: impl FnOnce(&mut Session) -> Result<T>) -> Result<T> {
        let mut active = self.active.write();
        let session = active
            .get_mut(id)
            .ok_or_else(|| Error::not_found("session", id))?;
        f(session)
    }

    /// Move a session from the active set to the front of the history
    ///
    /// A session that is not yet terminal is marked failed first.
    pub fn archive(&self, id: &str) {
        let Some(mut session) = self.active.write().remove(id) else {
            return;
        };
        if !session.status.is_terminal() {
            // Only reachable when the owning task was dropped mid-run
            let _ = session.mark_failed("session abandoned before completion");
        }

        let mut history = self.history.write();
        history.push_front(session);
        history.truncate(self.capacity);
    }

    /// Trip the cancellation token of an active session
    pub fn cancel(&self, id: &str) -> bool {
        match self.active.read().get(id) {
            Some(session) if !session.status.is_terminal() => {
                session.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Active sessions, newest first
    pub fn active(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self.active.read().values().map(Session::info).collect();
        infos.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        infos
    }

    /// Archived sessions, newest first
    pub fn history(&self, limit: Option<usize>) -> Vec<SessionInfo> {
        let history = self.history.read();
        history
            .iter()
            .take(limit.unwrap_or(usize::MAX))
            .map(Session::info)
            .collect()
    }

    /// Result of an archived session, if it completed
    pub fn archived_result(&self, id: &str) -> Option<CollaborationResult> {
        self.history
            .read()
            .iter()
            .find(|s| s.id == id)
            .and_then(|s| s.result.clone())
    }

    pub fn active_count(&self) -> usize {
        self.active.read().len()
    }

    pub fn history_len(&self) -> usize {
        self.history.read().len()
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaboration::types::{CrossValidation, Strategy};

    fn session(query: &str) -> Session {
        Session::new(query, CollaborationConfig::default())
    }

    #[test]
    fn test_session_id_format() {
        let s = session("q");
        assert!(s.id().starts_with("session_"));
        assert_eq!(s.id().len(), "session_".len() + 36);
        assert_ne!(s.id(), session("q").id());
    }

    #[test]
    fn test_forward_transitions() {
        let mut s = session("q");
        assert_eq!(s.status(), SessionStatus::Pending);
        s.mark_running().unwrap();
        s.mark_failed("boom").unwrap();
        assert_eq!(s.status(), SessionStatus::Failed);
        assert_eq!(s.error(), Some("boom"));
    }

    #[test]
    fn test_backward_transitions_rejected() {
        let mut s = session("q");
        s.mark_running().unwrap();
        assert!(s.mark_running().is_err());
        s.mark_failed("x").unwrap();
        assert!(s.mark_running().is_err());
        assert!(s.mark_failed("again").is_err());
        assert_eq!(s.status(), SessionStatus::Failed);
    }

    #[test]
    fn test_cannot_complete_from_pending() {
        let mut s = session("q");
        let result = CollaborationResult {
            session_id: s.id().to_string(),
            query: "q".into(),
            selected_personas: vec![],
            strategy: Strategy::Parallel,
            analyses: vec![],
            cross_validation: CrossValidation {
                common_points: vec![],
                disagreements: vec![],
                confidence_score: 0.7,
                recommendations: vec![],
            },
            synthesis: Default::default(),
            action_plan: vec![],
            execution_time_ms: 0,
        };
        assert!(s.mark_completed(result).is_err());
        assert_eq!(s.status(), SessionStatus::Pending);
    }

    #[test]
    fn test_history_is_bounded_newest_first() {
        let registry = SessionRegistry::new(2);
        for q in ["first", "second", "third"] {
            let id = registry.insert(session(q));
            registry.update(&id, |s| s.mark_running()).unwrap();
            registry.archive(&id);
        }

        let history = registry.history(None);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].query, "third");
        assert_eq!(history[1].query, "second");
        assert_eq!(registry.active_count(), 0);
        assert_eq!(registry.history(Some(1)).len(), 1);
    }

    #[test]
    fn test_archive_marks_unfinished_sessions_failed() {
        let registry = SessionRegistry::new(10);
        let id = registry.insert(session("q"));
        registry.archive(&id);

        assert_eq!(registry.history(None)[0].status, SessionStatus::Failed);
    }

    #[test]
    fn test_cancel_trips_token() {
        let registry = SessionRegistry::new(10);
        let s = session("q");
        let token = s.cancel_token();
        let id = registry.insert(s);

        assert!(registry.cancel(&id));
        assert!(token.is_cancelled());
        assert!(!registry.cancel("session_missing"));
    }
}

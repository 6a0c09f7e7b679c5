//! Multi-persona collaboration
//!
//! A query goes through persona selection, one of four execution
//! strategies, cross-validation, synthesis and action planning. Text
//! generation sits behind [`AnalysisProvider`]; keyword heuristics sit
//! behind [`Classifier`].

mod classify;
mod orchestrator;
mod provider;
mod selection;
mod session;
mod types;
mod validation;

pub use classify::{
    Archetype, ArchetypeSet, Classifier, KeywordClassifier, QueryAnalysis, QueryCategory,
    QueryType, Theme, KEYWORD_TABLE_VERSION,
};
pub use orchestrator::Orchestrator;
pub use provider::{build_prompt, AnalysisProvider, AnalysisRequest, TemplateProvider};
pub use selection::{
    base_score, intelligent_selection, select_explicit, ADMISSION_THRESHOLD, MAX_PERSONAS,
    MIN_PERSONAS,
};
pub use session::{Session, SessionInfo, SessionRegistry, SessionStatus};
pub use types::{
    ActionStep, CollaborationConfig, CollaborationMode, CollaborationResult, CrossValidation,
    PersonaAnalysis, Priority, Strategy, Synthesis,
};
pub use validation::{cross_validate, skipped as skipped_validation};

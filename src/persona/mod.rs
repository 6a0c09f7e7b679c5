//! Persona catalog: validated persona definitions, their remote sources,
//! the built-in fallback set and the caching repository that merges them.

mod defaults;
mod repository;
mod search;
mod sources;
mod types;

pub use defaults::{default_personas, DEFAULT_PERSONA_VERSION};
pub use repository::{
    parse_records, PersonaRepository, PersonaStore, RepositoryConfig, RepositoryStats,
};
pub use search::{rank, MatchField, SearchHit};
pub use sources::{by_priority, default_sources, SourceConfig};
pub use types::{Persona, PersonaConfig, PersonaSource, RawPersona};

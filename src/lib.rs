//! Persona Council
//!
//! Multi-persona collaboration engine. Personas are fetched from remote
//! sources with caching and a built-in fallback, selected per query, run
//! through one of several collaboration strategies and reduced to a
//! cross-validated synthesis with an action plan.
//!
//! - [`persona`]: persona catalog and resilient repository
//! - [`collaboration`]: selection, strategies, sessions and synthesis
//! - [`tools`]: validated caller-facing operations
//! - [`sync`]: remote persona config synchronization
//! - [`network`] and [`cache`]: outbound HTTP and TTL caching

pub mod cache;
pub mod collaboration;
pub mod config;
pub mod error;
pub mod logging;
pub mod network;
pub mod persona;
pub mod sync;
pub mod tools;
pub mod version;

pub use error::{Error, ErrorResponse, Result};

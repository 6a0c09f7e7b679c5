//! Caller-facing tool operations
//!
//! - [`ToolService`]: validated, instrumented dispatch by tool name
//! - [`ToolStats`]: per-tool call counters
//! - [`sanitize_args`]: bounds raw JSON arguments

mod args;
mod service;
mod stats;

pub use args::{sanitize_args, MAX_ARRAY_LEN, MAX_STRING_CHARS};
pub use service::{PersonaListing, Tool, ToolService};
pub use stats::{StatsSummary, ToolStats, ToolUsage};

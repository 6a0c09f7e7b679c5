//! Error types for Persona Council
//!
//! Provides structured error handling with:
//! - Numeric error codes for machine parsing
//! - User-friendly messages with suggestions
//! - A serializable response form for tool callers
//! - Exit codes for CLI

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Result type alias for council operations
pub type Result<T> = std::result::Result<T, Error>;

/// Numeric error codes for machine parsing and documentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    // Configuration errors (1xx)
    ConfigNotFound = 100,
    ConfigParseError = 101,
    ConfigValidation = 102,

    // IO errors (2xx)
    IoRead = 200,
    IoWrite = 201,
    IoPermission = 202,
    IoNotFound = 203,
    Serialization = 204,

    // Network errors (3xx)
    NetworkTimeout = 300,
    NetworkHttp = 301,
    NetworkTransport = 302,

    // Auth errors (4xx)
    AuthenticationFailed = 400,

    // Validation errors (5xx)
    InvalidArgument = 500,

    // Lookup errors (6xx)
    NotFound = 600,

    // Collaboration errors (7xx)
    CollaborationFailed = 700,
    Cancelled = 701,

    // Internal errors (9xx)
    InternalError = 900,
}

impl ErrorCode {
    /// Get the string code (e.g., "E100")
    pub fn as_str(&self) -> String {
        format!("E{}", *self as u16)
    }

    /// Get the exit code for CLI (maps to 1-125 range)
    pub fn exit_code(&self) -> i32 {
        match *self as u16 {
            100..=199 => 10, // Config errors
            200..=299 => 20, // IO errors
            300..=399 => 30, // Network errors
            400..=499 => 40, // Auth errors
            500..=599 => 50, // Validation errors
            600..=699 => 60, // Lookup errors
            700..=799 => 70, // Collaboration errors
            900..=999 => 90, // Internal errors
            _ => 1,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Failure classes of an outbound HTTP request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkErrorKind {
    /// The attempt did not finish inside its timeout
    Timeout { timeout_ms: u64 },
    /// The server answered with a non-2xx status
    Http { status: u16 },
    /// Anything else: DNS, connect, TLS, body decoding
    Transport { message: String },
}

impl NetworkErrorKind {
    /// Wire tag reported to callers
    pub fn tag(&self) -> &'static str {
        match self {
            NetworkErrorKind::Timeout { .. } => "TIMEOUT",
            NetworkErrorKind::Http { .. } => "HTTP_ERROR",
            NetworkErrorKind::Transport { .. } => "NETWORK_ERROR",
        }
    }
}

impl fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkErrorKind::Timeout { timeout_ms } => {
                write!(f, "timed out after {}ms", timeout_ms)
            }
            NetworkErrorKind::Http { status } => write!(f, "HTTP {}", status),
            NetworkErrorKind::Transport { message } => write!(f, "{}", message),
        }
    }
}

/// Main error type for the council
#[derive(Error, Debug, Clone)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Configuration parse error
    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    /// Configuration validation error (local config or downloaded persona config)
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String, field: Option<String> },

    /// Generic configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    // ─────────────────────────────────────────────────────────────
    // IO Errors
    // ─────────────────────────────────────────────────────────────

    /// File read error
    #[error("Failed to read file {path}: {message}")]
    IoRead { path: PathBuf, message: String },

    /// File write error
    #[error("Failed to write file {path}: {message}")]
    IoWrite { path: PathBuf, message: String },

    /// Other IO failure without a known path
    #[error("IO error: {0}")]
    Io(String),

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    Json(String),

    /// TOML decode error
    #[error("TOML error: {0}")]
    Toml(String),

    // ─────────────────────────────────────────────────────────────
    // Caller-Facing Errors
    // ─────────────────────────────────────────────────────────────

    /// Malformed or out-of-range caller input
    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    /// Unknown persona or config id
    #[error("{what} not found: {id}")]
    NotFound {
        what: String,
        id: String,
        hints: Vec<String>,
    },

    /// Outbound request failed after retries
    #[error("Request to {url} failed ({}): {kind}", .kind.tag())]
    Network { url: String, kind: NetworkErrorKind },

    /// Missing or rejected credential
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    // ─────────────────────────────────────────────────────────────
    // Collaboration Errors
    // ─────────────────────────────────────────────────────────────

    /// A collaboration session failed as a whole
    #[error("Collaboration {session_id} failed: {message}")]
    CollaborationFailed { session_id: String, message: String },

    /// Work was aborted by a cancellation signal
    #[error("Cancelled: {what}")]
    Cancelled { what: String },

    // ─────────────────────────────────────────────────────────────
    // Internal Errors
    // ─────────────────────────────────────────────────────────────

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    // ─────────────────────────────────────────────────────────────
    // Error Classification
    // ─────────────────────────────────────────────────────────────

    /// Get the numeric error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::ConfigNotFound { .. } => ErrorCode::ConfigNotFound,
            Error::ConfigParse { .. } => ErrorCode::ConfigParseError,
            Error::ConfigValidation { .. } => ErrorCode::ConfigValidation,
            Error::Config(_) => ErrorCode::ConfigValidation,

            Error::IoRead { .. } => ErrorCode::IoRead,
            Error::IoWrite { .. } => ErrorCode::IoWrite,
            Error::Io(_) => ErrorCode::IoRead,
            Error::Json(_) => ErrorCode::Serialization,
            Error::Toml(_) => ErrorCode::ConfigParseError,

            Error::Validation { .. } => ErrorCode::InvalidArgument,
            Error::NotFound { .. } => ErrorCode::NotFound,
            Error::Network { kind, .. } => match kind {
                NetworkErrorKind::Timeout { .. } => ErrorCode::NetworkTimeout,
                NetworkErrorKind::Http { .. } => ErrorCode::NetworkHttp,
                NetworkErrorKind::Transport { .. } => ErrorCode::NetworkTransport,
            },
            Error::Auth { .. } => ErrorCode::AuthenticationFailed,

            Error::CollaborationFailed { .. } => ErrorCode::CollaborationFailed,
            Error::Cancelled { .. } => ErrorCode::Cancelled,

            Error::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Short machine tag distinguishing the error kind
    pub fn kind_tag(&self) -> &'static str {
        match self {
            Error::ConfigNotFound { .. }
            | Error::ConfigParse { .. }
            | Error::Config(_)
            | Error::Toml(_) => "CONFIG_ERROR",
            Error::ConfigValidation { .. } => "CONFIG_VALIDATION_ERROR",
            Error::IoRead { .. } | Error::IoWrite { .. } | Error::Io(_) | Error::Json(_) => {
                "IO_ERROR"
            }
            Error::Validation { .. } => "VALIDATION_ERROR",
            Error::NotFound { .. } => "NOT_FOUND",
            Error::Network { kind, .. } => kind.tag(),
            Error::Auth { .. } => "AUTH_ERROR",
            Error::CollaborationFailed { .. } => "COLLABORATION_FAILED",
            Error::Cancelled { .. } => "CANCELLED",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Check if the error is retryable
    ///
    /// Only transient network failures qualify; auth, validation and
    /// lookup failures are surfaced immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Network { .. })
    }

    /// Get the exit code for CLI
    pub fn exit_code(&self) -> i32 {
        self.code().exit_code()
    }

    // ─────────────────────────────────────────────────────────────
    // User-Friendly Messages
    // ─────────────────────────────────────────────────────────────

    /// Get a user-friendly suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::ConfigNotFound { .. } => Some(
                "Run 'persona-council config init' to create a default configuration file."
            ),
            Error::ConfigParse { .. } | Error::Toml(_) => Some(
                "Check your configuration file syntax. Run 'persona-council config validate' to see details."
            ),
            Error::ConfigValidation { .. } => Some(
                "Review the configuration and fix the invalid values. Every persona needs id, name, rule and goal."
            ),
            Error::Validation { .. } => Some(
                "Check the argument lengths and formats, then try again."
            ),
            Error::NotFound { .. } => Some(
                "Use 'list_personas' to see every available persona, or 'search_personas' to look one up by keyword."
            ),
            Error::Network { kind: NetworkErrorKind::Timeout { .. }, .. } => Some(
                "The remote endpoint did not answer in time. Check your network or raise network.timeout_ms."
            ),
            Error::Network { .. } => Some(
                "Check your network connection and verify the endpoint URL is correct."
            ),
            Error::Auth { .. } => Some(
                "Set sync.credential in the configuration file or export PERSONA_COUNCIL_CREDENTIAL."
            ),
            Error::Cancelled { .. } => Some(
                "The operation was cancelled before it finished. Start it again if needed."
            ),
            _ => None,
        }
    }

    /// Remediation hints attached to this error, most specific first
    pub fn hints(&self) -> Vec<String> {
        let mut hints = match self {
            Error::NotFound { hints, .. } => hints.clone(),
            _ => Vec::new(),
        };
        if let Some(s) = self.suggestion() {
            hints.push(s.to_string());
        }
        hints
    }

    /// Format the error for terminal display with colors
    pub fn format_for_terminal(&self) -> String {
        let code = self.code();

        let mut output = format!(
            "\x1b[31mError [{}]\x1b[0m: {}\n",
            code.as_str(),
            self
        );

        for hint in self.hints() {
            output.push_str(&format!("\n\x1b[33mHint\x1b[0m: {}\n", hint));
        }

        output
    }

    /// Format the error for logging (no colors)
    pub fn format_for_log(&self) -> String {
        let code = self.code();
        format!("[{}] {}", code.as_str(), self)
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Constructors (for ergonomic error creation)
// ─────────────────────────────────────────────────────────────────

impl Error {
    /// Create a config not found error
    pub fn config_not_found(path: impl Into<PathBuf>) -> Self {
        Error::ConfigNotFound { path: path.into() }
    }

    /// Create a config parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Error::ConfigParse {
            message: message.into(),
        }
    }

    /// Create a config validation error
    pub fn config_validation(message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: None,
        }
    }

    /// Create a config validation error with field name
    pub fn config_field_invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create an argument validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a not found error without extra hints
    pub fn not_found(what: impl Into<String>, id: impl Into<String>) -> Self {
        Error::NotFound {
            what: what.into(),
            id: id.into(),
            hints: Vec::new(),
        }
    }

    /// Create a network error
    pub fn network(url: impl Into<String>, kind: NetworkErrorKind) -> Self {
        Error::Network {
            url: url.into(),
            kind,
        }
    }

    /// Create an auth error
    pub fn auth(message: impl Into<String>) -> Self {
        Error::Auth {
            message: message.into(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(what: impl Into<String>) -> Self {
        Error::Cancelled { what: what.into() }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Toml(e.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Error::Config(format!("TOML serialization error: {}", e))
    }
}

// ─────────────────────────────────────────────────────────────────
// Structured Response
// ─────────────────────────────────────────────────────────────────

/// Caller-facing representation of a failure
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Machine tag such as `VALIDATION_ERROR` or `TIMEOUT`
    pub kind: String,
    /// Numeric code, e.g. `E500`
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Remediation hints, possibly empty
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<String>,
    /// CLI exit code of the originating error
    #[serde(skip)]
    pub exit_code: i32,
}

impl ErrorResponse {
    /// Format the response for terminal display with colors
    pub fn format_for_terminal(&self) -> String {
        let mut output = format!("\x1b[31mError [{}]\x1b[0m: {}\n", self.code, self.message);
        for hint in &self.hints {
            output.push_str(&format!("\n\x1b[33mHint\x1b[0m: {}\n", hint));
        }
        output
    }
}

impl From<&Error> for ErrorResponse {
    fn from(err: &Error) -> Self {
        Self {
            kind: err.kind_tag().to_string(),
            code: err.code().as_str(),
            message: err.to_string(),
            hints: err.hints(),
            exit_code: err.exit_code(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_format() {
        assert_eq!(ErrorCode::ConfigNotFound.as_str(), "E100");
        assert_eq!(ErrorCode::NetworkTimeout.as_str(), "E300");
        assert_eq!(ErrorCode::InternalError.as_str(), "E900");
    }

    #[test]
    fn test_error_exit_codes() {
        assert_eq!(ErrorCode::ConfigNotFound.exit_code(), 10);
        assert_eq!(ErrorCode::IoRead.exit_code(), 20);
        assert_eq!(ErrorCode::NetworkHttp.exit_code(), 30);
        assert_eq!(ErrorCode::InvalidArgument.exit_code(), 50);
        assert_eq!(ErrorCode::InternalError.exit_code(), 90);
    }

    #[test]
    fn test_network_kind_tags() {
        let timeout = Error::network("http://x", NetworkErrorKind::Timeout { timeout_ms: 10 });
        let http = Error::network("http://x", NetworkErrorKind::Http { status: 503 });
        let transport = Error::network(
            "http://x",
            NetworkErrorKind::Transport { message: "refused".into() },
        );

        assert_eq!(timeout.kind_tag(), "TIMEOUT");
        assert_eq!(http.kind_tag(), "HTTP_ERROR");
        assert_eq!(transport.kind_tag(), "NETWORK_ERROR");
        assert!(http.to_string().contains("503"));
    }

    #[test]
    fn test_error_retryable() {
        assert!(Error::network("u", NetworkErrorKind::Http { status: 500 }).is_retryable());
        assert!(!Error::auth("no credential").is_retryable());
        assert!(!Error::validation("query", "too short").is_retryable());
        assert!(!Error::cancelled("session").is_retryable());
    }

    #[test]
    fn test_not_found_hints() {
        let err = Error::NotFound {
            what: "Persona".into(),
            id: "ghost".into(),
            hints: vec!["Did you mean 'host'?".into()],
        };
        let hints = err.hints();
        assert_eq!(hints[0], "Did you mean 'host'?");
        assert!(hints.iter().any(|h| h.contains("list_personas")));
    }

    #[test]
    fn test_error_response() {
        let err = Error::validation("query", "must be at least 5 characters");
        let resp = ErrorResponse::from(&err);
        assert_eq!(resp.kind, "VALIDATION_ERROR");
        assert_eq!(resp.code, "E500");
        assert!(resp.message.contains("query"));

        assert_eq!(resp.exit_code, 50);

        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["kind"], "VALIDATION_ERROR");
        assert!(json.get("exit_code").is_none());
    }

    #[test]
    fn test_format_for_terminal() {
        let err = Error::config_not_found("/test/config.toml");
        let formatted = err.format_for_terminal();

        assert!(formatted.contains("E100"));
        assert!(formatted.contains("\x1b[31m"));
        assert!(formatted.contains("Hint"));
    }

    #[test]
    fn test_format_for_log() {
        let err = Error::auth("missing credential");
        let formatted = err.format_for_log();

        assert!(formatted.contains("[E400]"));
        assert!(!formatted.contains("\x1b["));
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let err: Error = json_err.into();
        assert_eq!(err.code(), ErrorCode::Serialization);
    }

    #[test]
    fn test_error_from_toml_and_io() {
        let toml_err = toml::from_str::<toml::Value>("key = ").unwrap_err();
        let err: Error = toml_err.into();
        assert_eq!(err.kind_tag(), "CONFIG_ERROR");
        assert_eq!(err.exit_code(), 10);

        let io_err: Error = std::io::Error::new(std::io::ErrorKind::Other, "disk gone").into();
        assert_eq!(io_err.kind_tag(), "IO_ERROR");
        assert_eq!(io_err.exit_code(), 20);
    }
}

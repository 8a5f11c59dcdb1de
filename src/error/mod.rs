//! Error types for offcache.
//!
//! Uses `thiserror` for structured error types that map to exit codes.
//!
//! ## Error Taxonomy
//!
//! Errors are categorized into five main categories:
//! - **Network**: Connection, timeout, or upstream failures
//! - **Configuration**: Config file parsing, validation, or missing values
//! - **Storage**: Cache store and database failures
//! - **Protocol**: Malformed requests, payloads, or invalid lifecycle transitions
//! - **Internal**: Unexpected errors, bugs, or unclassified issues
//!
//! Each error has a stable error code (e.g., `OFC-N001`) for programmatic handling.

use thiserror::Error;

use crate::core::lifecycle::WorkerState;

// =============================================================================
// Error Categories
// =============================================================================

/// High-level error categories for classification and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Network issues (timeout, connection refused, upstream errors).
    Network,
    /// Configuration issues (parse errors, invalid values, missing files).
    Configuration,
    /// Cache store issues (database, serialization of stored entries).
    Storage,
    /// Protocol issues (bad requests, invalid state transitions).
    Protocol,
    /// Internal errors (bugs, unexpected state, unclassified).
    Internal,
}

impl ErrorCategory {
    /// Returns a human-readable description of the category.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network error",
            Self::Configuration => "Configuration error",
            Self::Storage => "Storage error",
            Self::Protocol => "Protocol error",
            Self::Internal => "Internal error",
        }
    }

    /// Returns a short code prefix for this category.
    #[must_use]
    pub const fn code_prefix(&self) -> &'static str {
        match self {
            Self::Network => "N",
            Self::Configuration => "C",
            Self::Storage => "S",
            Self::Protocol => "P",
            Self::Internal => "X",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

// =============================================================================
// Exit Codes
// =============================================================================

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// Unexpected failure
    GeneralError = 1,
    /// Install or activation did not complete
    LifecycleError = 2,
    /// Parse/format/config errors
    ParseError = 3,
    /// Timeout
    Timeout = 4,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as Self
    }
}

/// Main error type for offcache operations.
#[derive(Error, Debug)]
pub enum OffcacheError {
    // ==========================================================================
    // Network errors (Category: Network)
    // ==========================================================================
    /// Request timed out after specified duration.
    #[error("request timeout after {seconds}s for {url}")]
    Timeout { url: String, seconds: u64 },

    /// Connection could not be established.
    #[error("connection failed for {url}: {message}")]
    ConnectionFailed { url: String, message: String },

    /// Generic network error.
    #[error("network error: {0}")]
    Network(String),

    /// Upstream answered with a status that does not count as success.
    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    // ==========================================================================
    // Configuration errors (Category: Configuration)
    // ==========================================================================
    /// Error parsing configuration file.
    #[error("config parse error at {path}: {message}")]
    ConfigParse { path: String, message: String },

    /// Invalid value in configuration.
    #[error("invalid config value for '{key}': {message}")]
    ConfigInvalid {
        key: String,
        value: String,
        message: String,
    },

    /// Generic configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    // ==========================================================================
    // Storage errors (Category: Storage)
    // ==========================================================================
    /// Cache store operation failed.
    #[error("cache store error: {0}")]
    Storage(String),

    /// `SQLite` failure.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    // ==========================================================================
    // Protocol / lifecycle errors (Category: Protocol)
    // ==========================================================================
    /// A URL could not be parsed or resolved against the origin.
    #[error("invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    /// Install step failed; the new version never becomes eligible for activation.
    #[error("install failed: {reason}")]
    InstallFailed { reason: String },

    /// Activate step failed.
    #[error("activation failed: {reason}")]
    ActivateFailed { reason: String },

    /// Lifecycle transition not allowed from the current state.
    #[error("invalid worker state transition: {from} -> {to}")]
    InvalidTransition { from: WorkerState, to: WorkerState },

    /// Malformed control message or payload.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    // ==========================================================================
    // I/O errors (Category: Internal)
    // ==========================================================================
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ==========================================================================
    // Generic wrapper (Category: Internal)
    // ==========================================================================
    /// Catch-all for other errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OffcacheError {
    /// Map error to process exit code.
    #[must_use]
    pub const fn exit_code(&self) -> ExitCode {
        match self {
            Self::ConfigParse { .. }
            | Self::ConfigInvalid { .. }
            | Self::Config(_)
            | Self::InvalidUrl { .. }
            | Self::MalformedPayload(_) => ExitCode::ParseError,

            Self::Timeout { .. } => ExitCode::Timeout,

            Self::InstallFailed { .. }
            | Self::ActivateFailed { .. }
            | Self::InvalidTransition { .. } => ExitCode::LifecycleError,

            Self::ConnectionFailed { .. }
            | Self::Network(_)
            | Self::HttpStatus { .. }
            | Self::Storage(_)
            | Self::Database(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Other(_) => ExitCode::GeneralError,
        }
    }

    /// Returns the error category for classification and routing.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Timeout { .. }
            | Self::ConnectionFailed { .. }
            | Self::Network(_)
            | Self::HttpStatus { .. } => ErrorCategory::Network,

            Self::ConfigParse { .. } | Self::ConfigInvalid { .. } | Self::Config(_) => {
                ErrorCategory::Configuration
            }

            Self::Storage(_) | Self::Database(_) => ErrorCategory::Storage,

            Self::InvalidUrl { .. }
            | Self::InstallFailed { .. }
            | Self::ActivateFailed { .. }
            | Self::InvalidTransition { .. }
            | Self::MalformedPayload(_) => ErrorCategory::Protocol,

            Self::Io(_) | Self::Json(_) | Self::Other(_) => ErrorCategory::Internal,
        }
    }

    /// Returns a stable error code for programmatic handling.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "OFC-N001",
            Self::ConnectionFailed { .. } => "OFC-N002",
            Self::Network(_) => "OFC-N003",
            Self::HttpStatus { .. } => "OFC-N004",

            Self::ConfigParse { .. } => "OFC-C001",
            Self::ConfigInvalid { .. } => "OFC-C002",
            Self::Config(_) => "OFC-C003",

            Self::Storage(_) => "OFC-S001",
            Self::Database(_) => "OFC-S002",

            Self::InvalidUrl { .. } => "OFC-P001",
            Self::InstallFailed { .. } => "OFC-P002",
            Self::ActivateFailed { .. } => "OFC-P003",
            Self::InvalidTransition { .. } => "OFC-P004",
            Self::MalformedPayload(_) => "OFC-P005",

            Self::Io(_) => "OFC-X001",
            Self::Json(_) => "OFC-X002",
            Self::Other(_) => "OFC-X003",
        }
    }

    /// Whether a later attempt might succeed without any change on our side.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::ConnectionFailed { .. } | Self::Network(_) => true,
            Self::HttpStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Build an error from a `reqwest` failure, keeping timeouts distinct.
    #[must_use]
    pub fn from_reqwest(err: &reqwest::Error, url: &str, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
                seconds: timeout_secs,
            }
        } else if err.is_connect() {
            Self::ConnectionFailed {
                url: url.to_string(),
                message: err.to_string(),
            }
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Result type alias for offcache operations.
pub type Result<T> = std::result::Result<T, OffcacheError>;

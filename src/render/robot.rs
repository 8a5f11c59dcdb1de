//! Machine-readable output.
//!
//! Every JSON result is wrapped in a versioned envelope so scripts can
//! check `schemaVersion` and `command` before reading `data`.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;

/// Current envelope schema.
pub const SCHEMA_VERSION: &str = "offcache.v1";

/// JSON envelope around a command result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RobotOutput<T> {
    pub schema_version: &'static str,
    pub generated_at: DateTime<Utc>,
    pub command: String,
    pub data: T,
    pub errors: Vec<String>,
}

impl<T: Serialize> RobotOutput<T> {
    /// Wrap `data` produced by `command`.
    pub fn new(command: impl Into<String>, data: T) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            generated_at: Utc::now(),
            command: command.into(),
            data,
            errors: Vec::new(),
        }
    }

    /// Attach non-fatal errors.
    #[must_use]
    pub fn with_errors(mut self, errors: Vec<String>) -> Self {
        self.errors = errors;
        self
    }

    /// Serialize, compact or indented.
    ///
    /// # Errors
    /// Returns an error if `data` cannot be serialized.
    pub fn render(&self, pretty: bool) -> Result<String> {
        Ok(if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        })
    }
}

//! Error rendering for the CLI.

use serde::Serialize;

use crate::cli::args::OutputFormat;
use crate::error::OffcacheError;

/// Structured error for JSON output.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorJson {
    pub error: bool,
    pub code: &'static str,
    pub category: String,
    pub message: String,
    pub retryable: bool,
    pub exit_code: u8,
}

impl ErrorJson {
    #[must_use]
    pub fn from_error(error: &OffcacheError) -> Self {
        Self {
            error: true,
            code: error.error_code(),
            category: error.category().to_string(),
            message: error.to_string(),
            retryable: error.is_retryable(),
            exit_code: error.exit_code() as u8,
        }
    }
}

/// Render an error for stderr in the requested format.
#[must_use]
pub fn render_error(error: &OffcacheError, format: OutputFormat, pretty: bool) -> String {
    match format {
        OutputFormat::Json => render_error_json(error, pretty),
        OutputFormat::Human => render_simple(error),
    }
}

/// Render error as structured JSON for machine consumption.
#[must_use]
pub fn render_error_json(error: &OffcacheError, pretty: bool) -> String {
    let error_json = ErrorJson::from_error(error);
    let rendered = if pretty {
        serde_json::to_string_pretty(&error_json)
    } else {
        serde_json::to_string(&error_json)
    };
    rendered.unwrap_or_else(|_| render_simple(error))
}

fn render_simple(error: &OffcacheError) -> String {
    let mut out = format!("Error [{}]: {error}", error.error_code());
    if error.is_retryable() {
        out.push_str("\n  (retryable: check that the origin is reachable and try again)");
    }
    out
}

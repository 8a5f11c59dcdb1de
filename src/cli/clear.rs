//! Clear command implementation.

use serde::Serialize;

use crate::cli::{OutputFormat, build_worker, emit, live_network};
use crate::core::messages::ControlMessage;
use crate::error::{OffcacheError, Result};
use crate::storage::ResolvedConfig;

#[derive(Debug, Serialize)]
struct ClearResult {
    success: bool,
    deleted: Vec<String>,
}

/// Execute the clear command by sending the worker a `CACHE_CLEAR` message.
///
/// # Errors
/// Returns an error if the store cannot be opened or the clear fails.
pub async fn execute(config: &ResolvedConfig, format: OutputFormat, pretty: bool) -> Result<()> {
    let worker = build_worker(config, live_network(config)?)?;
    let deleted = worker.store().keys()?;

    let reply = worker.dispatch_message(ControlMessage::CacheClear).await?;
    if !reply.is_some_and(|r| r.success) {
        return Err(OffcacheError::Storage("cache clear failed".to_string()));
    }

    let result = ClearResult {
        success: true,
        deleted,
    };
    emit(format, pretty, "clear", &result, |r| {
        format!("Cleared {} cache generation(s).\n", r.deleted.len())
    })
}

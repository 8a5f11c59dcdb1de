//! Sync command implementation.

use crate::cli::args::SyncArgs;
use crate::cli::{OutputFormat, build_worker, emit, live_network};
use crate::core::sync::SyncReport;
use crate::error::{OffcacheError, Result};
use crate::storage::ResolvedConfig;

/// Execute the sync command: one replay pass over pending writes.
///
/// # Errors
/// Returns an error if the tag is not the sync tag or the cache cannot be read.
pub async fn execute(
    args: &SyncArgs,
    config: &ResolvedConfig,
    format: OutputFormat,
    pretty: bool,
) -> Result<()> {
    let worker = build_worker(config, live_network(config)?)?;
    let tag = args
        .tag
        .clone()
        .unwrap_or_else(|| worker.settings().sync_tag.clone());

    let report = worker.dispatch_sync(&tag).await?.ok_or_else(|| OffcacheError::ConfigInvalid {
        key: "sync.tag".to_string(),
        value: tag.clone(),
        message: format!("no sync handler for this tag (expected '{}')", worker.settings().sync_tag),
    })?;

    emit(format, pretty, "sync", &report, render_human)
}

fn render_human(report: &SyncReport) -> String {
    if report.attempted == 0 {
        return "No pending writes.\n".to_string();
    }
    format!(
        "Replayed {} pending write(s): {} delivered, {} retained.\n",
        report.attempted, report.delivered, report.retained
    )
}

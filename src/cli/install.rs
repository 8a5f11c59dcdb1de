//! Install command implementation.

use serde::Serialize;

use crate::cli::{OutputFormat, build_worker, emit, live_network};
use crate::core::lifecycle::WorkerState;
use crate::error::Result;
use crate::storage::ResolvedConfig;

/// Outcome of an install.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallSummary {
    pub state: WorkerState,
    pub precache: String,
    pub precached: usize,
    pub caches: Vec<String>,
    pub clients_claimed: bool,
}

/// Execute the install command: precache, then activate.
///
/// # Errors
/// Returns an error if any manifest URL fails or activation fails.
pub async fn execute(config: &ResolvedConfig, format: OutputFormat, pretty: bool) -> Result<()> {
    let worker = build_worker(config, live_network(config)?)?;
    tracing::debug!(origin = %config.origin, manifest = ?worker.settings().manifest, "starting install");

    worker.dispatch_install().await?;

    let store = worker.store();
    let precache = worker.settings().precache_name.clone();
    let summary = InstallSummary {
        state: worker.state(),
        precached: store.entry_count(&precache)?,
        precache,
        caches: store.keys()?,
        clients_claimed: worker.clients_claimed(),
    };

    emit(format, pretty, "install", &summary, render_human)
}

fn render_human(summary: &InstallSummary) -> String {
    let mut out = format!(
        "Installed: {} entries in {} (worker {})\n",
        summary.precached, summary.precache, summary.state
    );
    out.push_str(&format!("Caches: {}\n", summary.caches.join(", ")));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_summary_lists_caches() {
        let text = render_human(&InstallSummary {
            state: WorkerState::Activated,
            precache: "p1".to_string(),
            precached: 4,
            caches: vec!["p1".to_string(), "r1".to_string()],
            clients_claimed: true,
        });
        assert!(text.contains("4 entries in p1"));
        assert!(text.contains("activated"));
        assert!(text.contains("p1, r1"));
    }
}

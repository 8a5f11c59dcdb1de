//! Caches command implementation.

use serde::Serialize;

use crate::cli::args::CachesArgs;
use crate::cli::{OutputFormat, emit};
use crate::error::Result;
use crate::storage::{self, CacheStore, ResolvedConfig};

/// One cache generation as listed.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSummary {
    pub name: String,
    pub current: bool,
    pub entries: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<EntrySummary>>,
}

/// One stored entry as listed.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntrySummary {
    pub method: String,
    pub url: String,
    pub status: u16,
    pub cached_at: String,
}

/// Summarize every generation in `store`.
///
/// # Errors
/// Returns an error if the store cannot be read.
pub fn summarize(
    store: &dyn CacheStore,
    current: &[&str],
    with_entries: bool,
) -> Result<Vec<CacheSummary>> {
    store
        .keys()?
        .into_iter()
        .map(|name| {
            let entries = store.entries(&name)?;
            let keys = with_entries.then(|| {
                entries
                    .iter()
                    .map(|e| EntrySummary {
                        method: e.request.method.to_string(),
                        url: e.request.url.to_string(),
                        status: e.response.status,
                        cached_at: e.cached_at.to_rfc3339(),
                    })
                    .collect()
            });
            Ok(CacheSummary {
                current: current.contains(&name.as_str()),
                entries: entries.len(),
                keys,
                name,
            })
        })
        .collect()
}

/// Execute the caches command.
///
/// # Errors
/// Returns an error if the store cannot be opened or read.
pub fn execute(
    args: &CachesArgs,
    config: &ResolvedConfig,
    format: OutputFormat,
    pretty: bool,
) -> Result<()> {
    let store = storage::open_store(config)?;
    let caches = &config.config.caches;
    let current = [caches.precache_name.as_str(), caches.runtime_name.as_str()];
    let summaries = summarize(store.as_ref(), &current, args.entries)?;
    emit(format, pretty, "caches", &summaries, |s| render_human(s))
}

fn render_human(summaries: &[CacheSummary]) -> String {
    if summaries.is_empty() {
        return "No cache generations.\n".to_string();
    }
    let mut out = format!("{:<32} {:>8}  {}\n", "Cache", "Entries", "State");
    for summary in summaries {
        let state = if summary.current { "current" } else { "stale" };
        out.push_str(&format!("{:<32} {:>8}  {state}\n", summary.name, summary.entries));
        for key in summary.keys.iter().flatten() {
            out.push_str(&format!("    {} {} ({})\n", key.method, key.url, key.status));
        }
    }
    out
}

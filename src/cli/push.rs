//! Push command implementation.

use crate::cli::args::PushArgs;
use crate::cli::{OutputFormat, build_worker, emit, live_network};
use crate::core::push::NotificationIntent;
use crate::error::Result;
use crate::storage::ResolvedConfig;

/// Execute the push command: render `payload` as the worker would.
///
/// # Errors
/// Returns an error if the store cannot be opened or the notifier fails.
pub async fn execute(
    args: &PushArgs,
    config: &ResolvedConfig,
    format: OutputFormat,
    pretty: bool,
) -> Result<()> {
    let worker = build_worker(config, live_network(config)?)?;
    let data = args.payload.as_deref().map(str::as_bytes);
    let intent = worker.dispatch_push(data).await?;
    emit(format, pretty, "push", &intent, |i| render_human(i.as_ref()))
}

fn render_human(intent: Option<&NotificationIntent>) -> String {
    let Some(intent) = intent else {
        return "Push had no data; no notification shown.\n".to_string();
    };
    let actions: Vec<&str> = intent.actions.iter().map(|a| a.title.as_str()).collect();
    format!(
        "{}\n  {}\n  tag: {}  url: {}\n  actions: {}\n",
        intent.title,
        intent.body,
        intent.tag,
        intent.url,
        actions.join(" / ")
    )
}

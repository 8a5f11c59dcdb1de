//! CLI argument parsing and command dispatch.

pub mod args;
pub mod caches;
pub mod clear;
pub mod fetch;
pub mod install;
pub mod push;
pub mod serve;
pub mod sync;

use std::sync::Arc;

use serde::Serialize;

pub use args::{Cli, Commands, OutputFormat};

use crate::core::http::HttpNetwork;
use crate::core::network::Network;
use crate::core::worker::CacheWorker;
use crate::error::Result;
use crate::render::RobotOutput;
use crate::storage::{self, ResolvedConfig};

/// Build a worker over the configured store and the live network.
///
/// # Errors
/// Returns an error if the store cannot be opened or the settings are invalid.
pub fn build_worker(config: &ResolvedConfig, network: Arc<dyn Network>) -> Result<CacheWorker> {
    let store = storage::open_store(config)?;
    let settings = config.worker_settings()?;
    Ok(CacheWorker::builder(settings, network, store).build())
}

/// The live network for `config`.
///
/// # Errors
/// Returns an error if the HTTP client cannot be built.
pub fn live_network(config: &ResolvedConfig) -> Result<Arc<dyn Network>> {
    Ok(Arc::new(HttpNetwork::new(config.timeout)?))
}

/// Print a command result in the requested format.
///
/// # Errors
/// Returns an error if JSON serialization fails.
pub fn emit<T: Serialize>(
    format: OutputFormat,
    pretty: bool,
    command: &str,
    data: &T,
    human: impl FnOnce(&T) -> String,
) -> Result<()> {
    match format {
        OutputFormat::Human => print!("{}", human(data)),
        OutputFormat::Json => println!("{}", RobotOutput::new(command, data).render(pretty)?),
    }
    Ok(())
}

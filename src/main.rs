//! offcache - offline cache manager
//!
//! CLI entry point.

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use clap::Parser;
use std::process::ExitCode;

use offcache::cli::{self, Cli, Commands};
use offcache::core::logging::{self, LogSettings};
use offcache::render::error::render_error;
use offcache::storage::ResolvedConfig;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = LogSettings::resolve(cli.log_level.as_deref(), cli.json_output, cli.verbose);
    logging::init(&settings);

    let format = cli.effective_format();
    let pretty = cli.pretty;

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(code = e.error_code(), "{}", e);
            eprintln!("{}", render_error(&e, format, pretty));
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run(cli: Cli) -> offcache::Result<()> {
    let format = cli.effective_format();
    let pretty = cli.pretty;

    let Some(command) = &cli.command else {
        print_quickstart();
        return Ok(());
    };

    let listen = match command {
        Commands::Serve(args) => args.listen.as_deref(),
        _ => None,
    };
    let config = ResolvedConfig::resolve(&cli, listen)?;
    tracing::debug!(
        origin = %config.origin,
        origin_source = %config.sources.origin,
        timeout_source = %config.sources.timeout,
        "configuration resolved"
    );

    match command {
        Commands::Serve(args) => cli::serve::execute(args, &config).await,
        Commands::Install => cli::install::execute(&config, format, pretty).await,
        Commands::Caches(args) => cli::caches::execute(args, &config, format, pretty),
        Commands::Clear => cli::clear::execute(&config, format, pretty).await,
        Commands::Sync(args) => cli::sync::execute(args, &config, format, pretty).await,
        Commands::Fetch(args) => cli::fetch::execute(args, &config, format, pretty).await,
        Commands::Push(args) => cli::push::execute(args, &config, format, pretty).await,
    }
}

/// Print quickstart help when no command is given.
fn print_quickstart() {
    println!(
        r"offcache - offline cache manager

Precache an app shell, serve it offline, and replay writes made offline.

USAGE:
    offcache [OPTIONS] <COMMAND>

COMMANDS:
    serve    Run the worker as a local proxy in front of the origin
    install  Precache the manifest and activate
    caches   List cache generations
    clear    Delete every cache generation
    sync     Replay pending message writes
    fetch    Fetch a path through the worker
    push     Render a push payload as a notification

QUICK START:
    offcache --origin http://localhost:3000 install
    offcache --origin http://localhost:3000 serve --listen 127.0.0.1:8787
    offcache fetch /api/messages -X POST -d '{{...}}'
    offcache sync

For more help: offcache --help
"
    );
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
}

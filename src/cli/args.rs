//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Offline cache manager - precache, cache/network arbitration and write
/// replay for one web origin.
#[derive(Parser, Debug)]
#[command(name = "offcache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    // === Global flags ===
    /// Output format
    #[arg(long, value_enum, default_value = "human", global = true)]
    pub format: OutputFormat,

    /// Shorthand for --format json
    #[arg(long, global = true)]
    pub json: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Log level
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Emit JSONL logs to stderr
    #[arg(long, global = true)]
    pub json_output: bool,

    /// Verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file path (overrides OFFCACHE_CONFIG)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Origin to govern (overrides OFFCACHE_ORIGIN)
    #[arg(long, value_name = "URL", global = true)]
    pub origin: Option<String>,
}

impl Cli {
    /// Resolve the effective output format.
    #[must_use]
    pub fn effective_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            self.format
        }
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the worker as a local HTTP proxy in front of the origin
    Serve(ServeArgs),

    /// Precache the manifest and activate, evicting stale generations
    Install,

    /// List cache generations and their entry counts
    Caches(CachesArgs),

    /// Delete every cache generation
    Clear,

    /// Replay pending message writes
    Sync(SyncArgs),

    /// Fetch a path through the worker
    Fetch(FetchArgs),

    /// Render a push payload as a notification
    Push(PushArgs),
}

/// Arguments for the `serve` command.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Listen address (overrides OFFCACHE_LISTEN)
    #[arg(long, value_name = "ADDR")]
    pub listen: Option<String>,

    /// Seconds between background sync passes (0 disables)
    #[arg(long, value_name = "SECONDS")]
    pub sync_interval: Option<u64>,
}

/// Arguments for the `caches` command.
#[derive(Parser, Debug)]
pub struct CachesArgs {
    /// Also list the keys stored in each generation
    #[arg(long)]
    pub entries: bool,
}

/// Arguments for the `sync` command.
#[derive(Parser, Debug)]
pub struct SyncArgs {
    /// Sync tag to fire (defaults to the configured tag)
    #[arg(long, value_name = "TAG")]
    pub tag: Option<String>,
}

/// Arguments for the `fetch` command.
#[derive(Parser, Debug)]
pub struct FetchArgs {
    /// Root-relative path or absolute URL
    pub path: String,

    /// HTTP method
    #[arg(long, short = 'X', default_value = "GET")]
    pub method: String,

    /// Request body
    #[arg(long, short = 'd', value_name = "BODY")]
    pub data: Option<String>,

    /// Treat the request as a page navigation
    #[arg(long)]
    pub navigate: bool,

    /// Extra request header (`Name: value`), repeatable
    #[arg(long = "header", short = 'H', value_name = "HEADER")]
    pub headers: Vec<String>,
}

/// Arguments for the `push` command.
#[derive(Parser, Debug)]
pub struct PushArgs {
    /// Push data (usually a JSON object); omit for an empty push
    pub payload: Option<String>,
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    #[default]
    Human,
    /// JSON output
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn json_flag_overrides_format() {
        let cli = Cli::parse_from(["offcache", "--json", "caches"]);
        assert_eq!(cli.effective_format(), OutputFormat::Json);
        assert!(matches!(cli.command, Some(Commands::Caches(_))));
    }

    #[test]
    fn fetch_args() {
        let cli = Cli::parse_from([
            "offcache",
            "fetch",
            "/api/messages",
            "-X",
            "POST",
            "-d",
            "{}",
            "-H",
            "Content-Type: application/json",
        ]);
        let Some(Commands::Fetch(args)) = cli.command else {
            panic!("expected fetch");
        };
        assert_eq!(args.path, "/api/messages");
        assert_eq!(args.method, "POST");
        assert_eq!(args.data.as_deref(), Some("{}"));
        assert_eq!(args.headers, vec!["Content-Type: application/json"]);
    }

    #[test]
    fn global_origin_after_subcommand() {
        let cli = Cli::parse_from(["offcache", "install", "--origin", "https://app.test"]);
        assert_eq!(cli.origin.as_deref(), Some("https://app.test"));
    }
}

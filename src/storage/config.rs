//! Configuration file loading and management.
//!
//! Loads configuration from:
//! - Linux/macOS: `~/.config/offcache/config.toml`
//! - Windows: `%APPDATA%/offcache/config.toml`
//!
//! ## Precedence
//!
//! Settings are resolved with the following precedence (highest first):
//! 1. CLI flags
//! 2. Environment variables
//! 3. Config file
//! 4. Built-in defaults
//!
//! ## Environment Variables
//!
//! - `OFFCACHE_ORIGIN`: Origin the worker governs (e.g., `https://app.example.com`)
//! - `OFFCACHE_LISTEN`: Proxy listen address (e.g., `127.0.0.1:8787`)
//! - `OFFCACHE_TIMEOUT`: Network timeout in seconds
//! - `OFFCACHE_CONFIG`: Override config file path

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use super::AppPaths;
use crate::cli::args::Cli;
use crate::core::push::NotificationDefaults;
use crate::core::worker::WorkerSettings;
use crate::error::{OffcacheError, Result};

// =============================================================================
// Environment Variable Names
// =============================================================================

/// Environment variable for the governed origin.
pub const ENV_ORIGIN: &str = "OFFCACHE_ORIGIN";
/// Environment variable for the proxy listen address.
pub const ENV_LISTEN: &str = "OFFCACHE_LISTEN";
/// Environment variable for timeout in seconds.
pub const ENV_TIMEOUT: &str = "OFFCACHE_TIMEOUT";
/// Environment variable to override config file path.
pub const ENV_CONFIG: &str = "OFFCACHE_CONFIG";

/// Upper bound for the network timeout.
const MAX_TIMEOUT_SECS: u64 = 300;

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Fully resolved configuration after merging CLI, env vars, and config file.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// The merged file configuration (with overrides applied).
    pub config: Config,
    /// Origin governed by the worker.
    pub origin: Url,
    /// Network timeout.
    pub timeout: Duration,
    /// Proxy listen address.
    pub listen: SocketAddr,
    /// Source of each setting for debugging.
    pub sources: ConfigSources,
}

/// Tracks the source of each configuration value.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub origin: ConfigSource,
    pub timeout: ConfigSource,
    pub listen: ConfigSource,
}

/// Where a configuration value came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Value from CLI flag.
    Cli,
    /// Value from environment variable.
    Env,
    /// Value from config file.
    ConfigFile,
    /// Built-in default.
    #[default]
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI flag"),
            Self::Env => write!(f, "environment variable"),
            Self::ConfigFile => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

impl ResolvedConfig {
    /// Resolve final configuration from CLI args, environment variables, and config file.
    ///
    /// `listen_arg` is the `serve --listen` flag, when present.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The config file exists but is invalid
    /// - Any resolved value is invalid (e.g., unparseable origin)
    pub fn resolve(cli: &Cli, listen_arg: Option<&str>) -> Result<Self> {
        let config = Self::load_config(cli)?;
        Self::resolve_with(config, cli, listen_arg)
    }

    /// Resolve against an already-loaded config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the merged configuration is invalid.
    pub fn resolve_with(mut config: Config, cli: &Cli, listen_arg: Option<&str>) -> Result<Self> {
        let mut sources = ConfigSources::default();

        if let Some(origin) = Self::pick(
            cli.origin.clone(),
            ENV_ORIGIN,
            &config.general.origin,
            &GeneralConfig::default().origin,
            &mut sources.origin,
        ) {
            config.general.origin = origin;
        }
        if let Some(listen) = Self::pick(
            listen_arg.map(str::to_string),
            ENV_LISTEN,
            &config.server.listen,
            &ServerConfig::default().listen,
            &mut sources.listen,
        ) {
            config.server.listen = listen;
        }
        if let Some(timeout) = Self::resolve_timeout(&config, &mut sources.timeout)? {
            config.general.timeout_seconds = timeout;
        }

        config.validate()?;

        let origin = parse_origin(&config.general.origin)?;
        let listen = parse_listen(&config.server.listen)?;
        let timeout = Duration::from_secs(config.general.timeout_seconds);

        Ok(Self {
            config,
            origin,
            timeout,
            listen,
            sources,
        })
    }

    /// Load config file, respecting `--config` and `OFFCACHE_CONFIG`.
    fn load_config(cli: &Cli) -> Result<Config> {
        if let Some(path) = &cli.config {
            Config::load_from(path)
        } else if let Ok(path) = std::env::var(ENV_CONFIG) {
            Config::load_from(Path::new(&path))
        } else {
            Config::load()
        }
    }

    /// CLI flag, then env var, then the file value (which already holds the default).
    fn pick(
        cli_value: Option<String>,
        env_var: &str,
        file_value: &str,
        default_value: &str,
        source: &mut ConfigSource,
    ) -> Option<String> {
        if let Some(value) = cli_value {
            *source = ConfigSource::Cli;
            return Some(value);
        }
        if let Ok(value) = std::env::var(env_var) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                *source = ConfigSource::Env;
                return Some(trimmed.to_string());
            }
        }
        *source = if file_value == default_value {
            ConfigSource::Default
        } else {
            ConfigSource::ConfigFile
        };
        None
    }

    fn resolve_timeout(config: &Config, source: &mut ConfigSource) -> Result<Option<u64>> {
        if let Ok(value) = std::env::var(ENV_TIMEOUT) {
            let secs = value.trim().parse::<u64>().map_err(|_| OffcacheError::ConfigInvalid {
                key: ENV_TIMEOUT.to_string(),
                value: value.clone(),
                message: "expected a whole number of seconds".to_string(),
            })?;
            *source = ConfigSource::Env;
            return Ok(Some(secs));
        }
        *source = if config.general.timeout_seconds == GeneralConfig::default().timeout_seconds {
            ConfigSource::Default
        } else {
            ConfigSource::ConfigFile
        };
        Ok(None)
    }

    /// Settings for the worker, derived from the merged configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync pattern is not a valid regular expression.
    pub fn worker_settings(&self) -> Result<WorkerSettings> {
        let c = &self.config;
        Ok(WorkerSettings {
            origin: self.origin.clone(),
            precache_name: c.caches.precache_name.clone(),
            runtime_name: c.caches.runtime_name.clone(),
            manifest: c.caches.manifest.clone(),
            shell_document: c.caches.shell_document.clone(),
            api_prefix: c.routing.api_prefix.clone(),
            sync_tag: c.sync.tag.clone(),
            sync_pattern: compile_pattern(&c.sync.pattern)?,
            notifications: c.notifications.clone(),
        })
    }

    /// Path of the `SQLite` cache database.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.config
            .storage
            .path
            .clone()
            .unwrap_or_else(|| AppPaths::new().cache_db_file())
    }
}

fn parse_origin(value: &str) -> Result<Url> {
    let url = Url::parse(value).map_err(|e| OffcacheError::ConfigInvalid {
        key: "general.origin".to_string(),
        value: value.to_string(),
        message: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") || url.host().is_none() {
        return Err(OffcacheError::ConfigInvalid {
            key: "general.origin".to_string(),
            value: value.to_string(),
            message: "origin must be an http(s) URL with a host".to_string(),
        });
    }
    Ok(url)
}

fn parse_listen(value: &str) -> Result<SocketAddr> {
    value.parse().map_err(|_| OffcacheError::ConfigInvalid {
        key: "server.listen".to_string(),
        value: value.to_string(),
        message: "expected host:port".to_string(),
    })
}

fn compile_pattern(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| OffcacheError::ConfigInvalid {
        key: "sync.pattern".to_string(),
        value: pattern.to_string(),
        message: e.to_string(),
    })
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings.
    pub general: GeneralConfig,
    /// Cache generations and precache manifest.
    pub caches: CachesConfig,
    /// Request routing.
    pub routing: RoutingConfig,
    /// Background sync.
    pub sync: SyncConfig,
    /// Notification defaults.
    pub notifications: NotificationDefaults,
    /// Cache store backend.
    pub storage: StorageConfig,
    /// Proxy host.
    pub server: ServerConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Origin governed by the worker.
    pub origin: String,
    /// Timeout for network requests in seconds.
    pub timeout_seconds: u64,
}

/// Cache generation names and precache manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CachesConfig {
    /// Name of the current precache generation.
    pub precache_name: String,
    /// Name of the current runtime cache generation.
    pub runtime_name: String,
    /// Root-relative URLs fetched at install time.
    pub manifest: Vec<String>,
    /// Document served to navigations when offline.
    pub shell_document: String,
}

/// Routing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Path prefix of network-first API requests.
    pub api_prefix: String,
}

/// Background sync settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Tag that triggers replay of pending writes.
    pub tag: String,
    /// Regular expression matched against request URLs to find message writes.
    pub pattern: String,
    /// Seconds between sync attempts while serving. 0 disables periodic sync.
    pub interval_secs: u64,
}

/// Cache store backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// In-process only; lost on exit.
    Memory,
    /// `SQLite` database file.
    #[default]
    Sqlite,
}

/// Cache store settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend to use.
    pub backend: StorageBackend,
    /// Database path (defaults to the platform data dir).
    pub path: Option<PathBuf>,
}

/// Proxy host settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address.
    pub listen: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:3000".to_string(),
            timeout_seconds: 30,
        }
    }
}

impl Default for CachesConfig {
    fn default() -> Self {
        Self {
            precache_name: "offcache-precache-v1".to_string(),
            runtime_name: "offcache-runtime-v1".to_string(),
            manifest: vec![
                "/".to_string(),
                "/index.html".to_string(),
                "/manifest.json".to_string(),
                "/favicon.ico".to_string(),
            ],
            shell_document: "/".to_string(),
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            api_prefix: "/api/".to_string(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tag: "sync-messages".to_string(),
            pattern: "/messages".to_string(),
            interval_secs: 60,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8787".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default config file path.
    ///
    /// Returns default config if the file doesn't exist.
    ///
    /// # Errors
    /// Returns error only if the file exists but is invalid.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific path.
    ///
    /// Returns default config if the file doesn't exist.
    ///
    /// # Errors
    /// Returns error only if the file exists but is invalid.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(?path, "Config file not found, using defaults");
            return Ok(Self::default());
        }

        tracing::debug!(?path, "Loading config file");
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| OffcacheError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Save configuration to a specific path.
    ///
    /// # Errors
    /// Returns error if the file cannot be serialized or written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| OffcacheError::Config(format!("Failed to serialize config: {e}")))?;

        fs::write(path, content)?;
        tracing::debug!(?path, "Config file saved");
        Ok(())
    }

    /// Get the config file path.
    #[must_use]
    pub fn config_path() -> PathBuf {
        AppPaths::new().config_file()
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns an error describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        let invalid = |key: &str, value: &str, message: &str| OffcacheError::ConfigInvalid {
            key: key.to_string(),
            value: value.to_string(),
            message: message.to_string(),
        };

        parse_origin(&self.general.origin)?;

        if self.general.timeout_seconds == 0 || self.general.timeout_seconds > MAX_TIMEOUT_SECS {
            return Err(invalid(
                "general.timeout_seconds",
                &self.general.timeout_seconds.to_string(),
                "timeout must be between 1 and 300 seconds",
            ));
        }

        let caches = &self.caches;
        if caches.precache_name.trim().is_empty() {
            return Err(invalid("caches.precache_name", &caches.precache_name, "must not be empty"));
        }
        if caches.runtime_name.trim().is_empty() {
            return Err(invalid("caches.runtime_name", &caches.runtime_name, "must not be empty"));
        }
        if caches.precache_name == caches.runtime_name {
            return Err(invalid(
                "caches.runtime_name",
                &caches.runtime_name,
                "precache and runtime generations need distinct names",
            ));
        }
        if !caches.shell_document.starts_with('/') {
            return Err(invalid(
                "caches.shell_document",
                &caches.shell_document,
                "must be a root-relative path",
            ));
        }
        if let Some(bad) = caches.manifest.iter().find(|u| !u.starts_with('/')) {
            return Err(invalid("caches.manifest", bad, "entries must be root-relative paths"));
        }

        if !self.routing.api_prefix.starts_with('/') {
            return Err(invalid(
                "routing.api_prefix",
                &self.routing.api_prefix,
                "must start with '/'",
            ));
        }

        if self.sync.tag.trim().is_empty() {
            return Err(invalid("sync.tag", &self.sync.tag, "must not be empty"));
        }
        compile_pattern(&self.sync.pattern)?;

        parse_listen(&self.server.listen)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[allow(unsafe_code)]
    fn with_env_vars(vars: &[(&str, &str)], f: impl FnOnce()) {
        let _guard = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let keys = [ENV_ORIGIN, ENV_LISTEN, ENV_TIMEOUT, ENV_CONFIG];
        let prior: Vec<_> = keys.iter().map(|k| (*k, std::env::var(k).ok())).collect();
        // SAFETY: env mutation is serialized by ENV_LOCK.
        unsafe {
            for key in keys {
                std::env::remove_var(key);
            }
            for (key, value) in vars {
                std::env::set_var(key, value);
            }
        }
        f();
        // SAFETY: env mutation is serialized by ENV_LOCK.
        unsafe {
            for (key, value) in prior {
                match value {
                    Some(v) => std::env::set_var(key, v),
                    None => std::env::remove_var(key),
                }
            }
        }
    }

    fn make_test_cli() -> Cli {
        Cli {
            command: None,
            format: crate::cli::args::OutputFormat::Human,
            json: false,
            pretty: false,
            log_level: None,
            json_output: false,
            verbose: false,
            config: None,
            origin: None,
        }
    }

    #[test]
    fn default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn load_missing_file_returns_default() {
        let config = Config::load_from(Path::new("/nonexistent/offcache.toml")).unwrap();
        assert_eq!(config.caches.precache_name, "offcache-precache-v1");
        assert_eq!(config.sync.tag, "sync-messages");
    }

    #[test]
    fn load_valid_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[general]
origin = "https://chat.example.com"

[caches]
precache_name = "shell-v7"
manifest = ["/", "/app.js"]

[sync]
pattern = "/api/(messages|drafts)"
"#
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.general.origin, "https://chat.example.com");
        assert_eq!(config.caches.precache_name, "shell-v7");
        assert_eq!(config.caches.runtime_name, "offcache-runtime-v1");
        assert_eq!(config.caches.manifest, vec!["/", "/app.js"]);
        assert_eq!(config.general.timeout_seconds, 30);
        config.validate().unwrap();
    }

    #[test]
    fn load_invalid_toml_returns_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "this is not [valid toml").unwrap();
        let err = Config::load_from(file.path()).unwrap_err();
        assert!(matches!(err, OffcacheError::ConfigParse { .. }));
    }

    #[test]
    fn roundtrip_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.routing.api_prefix = "/v2/".to_string();
        config.storage.backend = StorageBackend::Memory;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.routing.api_prefix, "/v2/");
        assert_eq!(loaded.storage.backend, StorageBackend::Memory);
    }

    #[test]
    fn validate_rejects_identical_generation_names() {
        let mut config = Config::default();
        config.caches.runtime_name = config.caches.precache_name.clone();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, OffcacheError::ConfigInvalid { ref key, .. } if key == "caches.runtime_name"));
    }

    #[test]
    fn validate_rejects_bad_sync_pattern() {
        let mut config = Config::default();
        config.sync.pattern = "(unclosed".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_relative_api_prefix() {
        let mut config = Config::default();
        config.routing.api_prefix = "api/".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_http_origin() {
        let mut config = Config::default();
        config.general.origin = "ftp://files.example.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_timeout_bounds() {
        let mut config = Config::default();
        config.general.timeout_seconds = 0;
        assert!(config.validate().is_err());
        config.general.timeout_seconds = 301;
        assert!(config.validate().is_err());
        config.general.timeout_seconds = 300;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn resolved_defaults() {
        with_env_vars(&[], || {
            let resolved = ResolvedConfig::resolve_with(Config::default(), &make_test_cli(), None).unwrap();
            assert_eq!(resolved.origin.as_str(), "http://localhost:3000/");
            assert_eq!(resolved.timeout, Duration::from_secs(30));
            assert_eq!(resolved.listen.port(), 8787);
            assert_eq!(resolved.sources.timeout, ConfigSource::Default);
            assert_eq!(resolved.sources.origin, ConfigSource::Default);
            assert_eq!(resolved.sources.listen, ConfigSource::Default);
        });
    }

    #[test]
    fn file_values_are_attributed_to_the_file() {
        with_env_vars(&[], || {
            let mut config = Config::default();
            config.general.origin = "https://file.example.com".to_string();
            config.server.listen = "127.0.0.1:9100".to_string();
            let resolved = ResolvedConfig::resolve_with(config, &make_test_cli(), None).unwrap();
            assert_eq!(resolved.sources.origin, ConfigSource::ConfigFile);
            assert_eq!(resolved.sources.listen, ConfigSource::ConfigFile);
            assert_eq!(resolved.sources.timeout, ConfigSource::Default);
        });
    }

    #[test]
    fn cli_origin_beats_env() {
        with_env_vars(&[(ENV_ORIGIN, "https://env.example.com")], || {
            let mut cli = make_test_cli();
            cli.origin = Some("https://cli.example.com".to_string());
            let resolved = ResolvedConfig::resolve_with(Config::default(), &cli, None).unwrap();
            assert_eq!(resolved.origin.host_str(), Some("cli.example.com"));
            assert_eq!(resolved.sources.origin, ConfigSource::Cli);
        });
    }

    #[test]
    fn env_overrides_file() {
        with_env_vars(
            &[
                (ENV_ORIGIN, "https://env.example.com"),
                (ENV_TIMEOUT, "12"),
                (ENV_LISTEN, "0.0.0.0:9000"),
            ],
            || {
                let resolved =
                    ResolvedConfig::resolve_with(Config::default(), &make_test_cli(), None).unwrap();
                assert_eq!(resolved.origin.host_str(), Some("env.example.com"));
                assert_eq!(resolved.timeout, Duration::from_secs(12));
                assert_eq!(resolved.listen.port(), 9000);
                assert_eq!(resolved.sources.origin, ConfigSource::Env);
                assert_eq!(resolved.sources.timeout, ConfigSource::Env);
                assert_eq!(resolved.sources.listen, ConfigSource::Env);
            },
        );
    }

    #[test]
    fn listen_flag_beats_env() {
        with_env_vars(&[(ENV_LISTEN, "0.0.0.0:9000")], || {
            let resolved =
                ResolvedConfig::resolve_with(Config::default(), &make_test_cli(), Some("127.0.0.1:7000"))
                    .unwrap();
            assert_eq!(resolved.listen.port(), 7000);
            assert_eq!(resolved.sources.listen, ConfigSource::Cli);
        });
    }

    #[test]
    fn bad_env_timeout_is_rejected() {
        with_env_vars(&[(ENV_TIMEOUT, "soon")], || {
            let err = ResolvedConfig::resolve_with(Config::default(), &make_test_cli(), None)
                .unwrap_err();
            assert!(matches!(err, OffcacheError::ConfigInvalid { .. }));
        });
    }

    #[test]
    fn worker_settings_carry_config() {
        with_env_vars(&[], || {
            let mut config = Config::default();
            config.sync.pattern = "/api/messages$".to_string();
            let resolved = ResolvedConfig::resolve_with(config, &make_test_cli(), None).unwrap();
            let settings = resolved.worker_settings().unwrap();
            assert_eq!(settings.precache_name, "offcache-precache-v1");
            assert!(settings.sync_pattern.is_match("http://localhost:3000/api/messages"));
            assert!(!settings.sync_pattern.is_match("http://localhost:3000/api/messages/1"));
        });
    }

    #[test]
    fn config_source_display() {
        assert_eq!(ConfigSource::Cli.to_string(), "CLI flag");
        assert_eq!(ConfigSource::Env.to_string(), "environment variable");
        assert_eq!(ConfigSource::ConfigFile.to_string(), "config file");
        assert_eq!(ConfigSource::Default.to_string(), "default");
    }
}

//! Configuration for the Alldone terminal client.
//!
//! Priority, highest first:
//! 1. CLI arguments
//! 2. Environment variables (clap `env`)
//! 3. TOML config file (`~/.config/alldone/config.toml`)
//! 4. Compiled defaults
//!
//! A missing default config file is fine; an explicit `--config` path that
//! does not exist is an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

/// Server the client talks to when nothing else is configured.
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// The API URL is not a valid absolute URL.
    #[error("invalid API URL {url:?}: {source}")]
    InvalidUrl {
        /// The rejected value.
        url: String,
        /// Parser error.
        source: url::ParseError,
    },
}

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    api: ApiFileConfig,
}

/// `[api]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ApiFileConfig {
    url: Option<String>,
    timeout_secs: Option<u64>,
}

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the Alldone server.
    pub api_url: Url,
    /// End-to-end timeout of every request.
    pub request_timeout: Duration,
    /// Log filter directive.
    pub log_level: String,
    /// Log file path; `None` means `$TMPDIR/alldone.log`.
    pub log_file: Option<PathBuf>,
}

impl ClientConfig {
    /// Loads configuration by merging CLI args, env vars and the TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed,
    /// or the resulting API URL is invalid.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Self::resolve(cli, &file)
    }

    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Result<Self, ConfigError> {
        let raw = cli
            .api_url
            .as_deref()
            .or(file.api.url.as_deref())
            .unwrap_or(DEFAULT_API_URL);
        let api_url = Url::parse(raw).map_err(|source| ConfigError::InvalidUrl {
            url: raw.to_string(),
            source,
        })?;

        Ok(Self {
            api_url,
            request_timeout: file
                .api
                .timeout_secs
                .map_or(DEFAULT_TIMEOUT, Duration::from_secs),
            log_level: cli.log_level.clone(),
            log_file: cli.log_file.clone(),
        })
    }

    /// Where logs are written.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("alldone.log"))
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Terminal client for the Alldone task list")]
pub struct CliArgs {
    /// Base URL of the Alldone server.
    #[arg(long, env = "ALLDONE_API_URL")]
    pub api_url: Option<String>,

    /// Path to config file (default: `~/.config/alldone/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "ALLDONE_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/alldone.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

fn load_config_file(explicit_path: Option<&Path>) -> Result<ConfigFile, ConfigError> {
    if let Some(path) = explicit_path {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        return Ok(toml::from_str(&contents)?);
    }

    let Some(config_dir) = dirs::config_dir() else {
        return Ok(ConfigFile::default());
    };
    let path = config_dir.join("alldone").join("config.toml");
    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(source) => Err(ConfigError::ReadFile { path, source }),
    }
}

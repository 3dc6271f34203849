//! Configuration file handling for ocpp-conform

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use ocpp_conform_v16::ConnectOptions;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::cli::Cli;
use crate::output::OutputFormat;

pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Load a `.env` file from the working directory or one of its parents
///
/// Must run before argument parsing so clap's `env` attributes see the
/// values. Variables already set in the environment win over the file.
pub fn load_dotenv() -> Option<PathBuf> {
    dotenvy::dotenv().ok()
}

/// Settings that can be stored in the config file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Central system base URL
    pub endpoint: Option<String>,
    /// Charge point identity
    pub identity: Option<String>,
    /// Batch timeout in seconds for every suite
    pub timeout: Option<u64>,
    pub call_timeout: Option<u64>,
    pub connect_timeout: Option<u64>,
    /// Suites to run when none are given on the command line
    pub suites: Option<Vec<String>>,
    pub output: Option<OutputFormat>,
    pub no_color: Option<bool>,
}

/// Rejected settings; the harness stops before opening a session
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("No endpoint configured (use --endpoint or WEBSOCKET_URL)")]
    MissingEndpoint,

    #[error("Invalid endpoint {url}: {reason}")]
    InvalidEndpoint { url: String, reason: String },

    #[error("Endpoint must use ws:// or wss://, got {0}://")]
    UnsupportedScheme(String),

    #[error("No charge point identity configured (use --identity or CHARGE_POINT_ID)")]
    MissingIdentity,

    #[error("Invalid charge point identity {0:?}: must not contain '/'")]
    InvalidIdentity(String),

    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),
}

impl Config {
    /// Load configuration from the default config file
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("ocpp-conform");

        Ok(config_dir.join("config.toml"))
    }

    /// Merge CLI arguments over config file values and validate the result
    pub fn merge_with_args(&self, cli: &Cli) -> Result<RunConfig, ConfigError> {
        let endpoint = cli
            .endpoint
            .clone()
            .or_else(|| self.endpoint.clone())
            .ok_or(ConfigError::MissingEndpoint)?;
        let identity = cli
            .identity
            .clone()
            .or_else(|| self.identity.clone())
            .ok_or(ConfigError::MissingIdentity)?;

        let timeout = cli.timeout.or(self.timeout);
        let call_timeout = cli
            .call_timeout
            .or(self.call_timeout)
            .unwrap_or(DEFAULT_CALL_TIMEOUT_SECS);
        let connect_timeout = cli
            .connect_timeout
            .or(self.connect_timeout)
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS);

        let suites = if cli.suites.is_empty() {
            self.suites.clone().unwrap_or_default()
        } else {
            cli.suites.clone()
        };

        Ok(RunConfig {
            endpoint: parse_endpoint(&endpoint)?,
            identity: parse_identity(&identity)?,
            timeout: timeout.map(|secs| positive("timeout", secs)).transpose()?,
            call_timeout: positive("call timeout", call_timeout)?,
            connect_timeout: positive("connect timeout", connect_timeout)?,
            suites,
            output: cli.output.or(self.output).unwrap_or_default(),
            no_color: cli.no_color || self.no_color.unwrap_or(false),
            quiet: cli.quiet,
        })
    }
}

/// Fully resolved configuration after merging CLI args
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub endpoint: Url,
    pub identity: String,
    /// Overrides every suite's own batch timeout when set
    pub timeout: Option<Duration>,
    pub call_timeout: Duration,
    pub connect_timeout: Duration,
    /// Empty means every registered suite
    pub suites: Vec<String>,
    pub output: OutputFormat,
    pub no_color: bool,
    pub quiet: bool,
}

impl RunConfig {
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions::new(self.endpoint.clone(), self.identity.clone())
            .with_call_timeout(self.call_timeout)
            .with_connect_timeout(self.connect_timeout)
    }
}

fn parse_endpoint(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidEndpoint {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "ws" | "wss" => {}
        other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(ConfigError::InvalidEndpoint {
            url: raw.to_string(),
            reason: "missing host".to_string(),
        });
    }
    Ok(url)
}

fn parse_identity(raw: &str) -> Result<String, ConfigError> {
    let identity = raw.trim();
    if identity.is_empty() {
        return Err(ConfigError::MissingIdentity);
    }
    if identity.contains('/') {
        return Err(ConfigError::InvalidIdentity(identity.to_string()));
    }
    Ok(identity.to_string())
}

fn positive(name: &'static str, secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::ZeroTimeout(name));
    }
    Ok(Duration::from_secs(secs))
}

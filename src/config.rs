//! Configuration file management for the checker.
//!
//! Settings are layered, later layers winning:
//!
//! 1. Default values (lowest priority)
//! 2. Configuration file given with `--config`
//! 3. Command-line arguments (highest priority)
//!
//! The merged [`Config`] is then validated into a [`CheckConfig`], which is
//! the only thing the connection and the checks ever see.
//!
//! # Example Configuration File
//!
//! ```toml
//! server = "example.com"
//! port = 443
//! warn = 15
//! crit = 5
//! canonical = "www.example.com"
//! timeout = 10
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::expiry::{ThresholdPolicy, DEFAULT_CRIT_DAYS, DEFAULT_WARN_DAYS};
use crate::probe::{ConnectionTarget, DEFAULT_TIMEOUT};
use crate::report::OutputFormat;

const MAX_TIMEOUT: u64 = 300;

/// Raw, possibly partial configuration.
///
/// All fields are optional to support partial configuration and merging.
/// Numeric fields are wider than their final types so out-of-range values
/// reach [`Config::validate`] instead of failing to deserialize.
#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// Hostname to connect to
    pub server: Option<String>,
    /// Destination port
    pub port: Option<i64>,
    /// Critical threshold in days
    pub crit: Option<i64>,
    /// Warning threshold in days
    pub warn: Option<i64>,
    /// Expected identity name; empty disables the name check
    pub canonical: Option<String>,
    /// Server name sent during the handshake
    pub sni: Option<String>,
    /// Connect and handshake timeout in seconds
    pub timeout: Option<u64>,
    /// Accept certificates that do not chain to a trusted root
    pub insecure: Option<bool>,
    /// Extra PEM trust anchors, used together with the system store
    pub ca_file: Option<PathBuf>,
    /// Output format: text, json
    pub output: Option<String>,
}

/// Validated settings for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckConfig {
    pub target: ConnectionTarget,
    pub policy: ThresholdPolicy,
    /// Empty when the name check is disabled
    pub expected_name: String,
    pub timeout: Duration,
    pub verify: bool,
    pub ca_file: Option<PathBuf>,
    pub output: OutputFormat,
}

impl Config {
    /// Loads configuration from a TOML file.
    ///
    /// # Returns
    ///
    /// * `Ok(Config)` - Successfully parsed configuration
    /// * `Err(ConfigError::Io)` - File could not be read
    /// * `Err(ConfigError::Parse)` - File contains invalid TOML
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.as_ref().display(), e)))?;

        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        Ok(config)
    }

    /// Configuration with every default filled in. `server` has no default
    /// and `canonical`/`sni` fall back to the server during validation.
    pub fn defaults() -> Self {
        Config {
            server: None,
            port: Some(443),
            crit: Some(DEFAULT_CRIT_DAYS),
            warn: Some(DEFAULT_WARN_DAYS),
            canonical: None,
            sni: None,
            timeout: Some(DEFAULT_TIMEOUT),
            insecure: Some(false),
            ca_file: None,
            output: Some(OutputFormat::Text.to_string()),
        }
    }

    /// Merges this configuration with another, prioritizing the other's values.
    pub fn merge_with(mut self, other: Config) -> Self {
        if other.server.is_some() {
            self.server = other.server;
        }
        if other.port.is_some() {
            self.port = other.port;
        }
        if other.crit.is_some() {
            self.crit = other.crit;
        }
        if other.warn.is_some() {
            self.warn = other.warn;
        }
        if other.canonical.is_some() {
            self.canonical = other.canonical;
        }
        if other.sni.is_some() {
            self.sni = other.sni;
        }
        if other.timeout.is_some() {
            self.timeout = other.timeout;
        }
        if other.insecure.is_some() {
            self.insecure = other.insecure;
        }
        if other.ca_file.is_some() {
            self.ca_file = other.ca_file;
        }
        if other.output.is_some() {
            self.output = other.output;
        }
        self
    }

    /// Output format to use even when validation fails, so errors can be
    /// reported in the format the caller asked for.
    pub fn output_format(&self) -> OutputFormat {
        self.output
            .as_deref()
            .and_then(|output| OutputFormat::from_str(output).ok())
            .unwrap_or_default()
    }

    /// Checks every value and produces the settings for a run.
    ///
    /// Missing values take their defaults, so this also works on a config
    /// that was never merged with [`Config::defaults`].
    pub fn validate(self) -> Result<CheckConfig, ConfigError> {
        let server = self
            .server
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConfigError::Validation("server is required".to_string()))?;
        if server.chars().any(|c| c.is_whitespace() || c == '/') {
            return Err(ConfigError::Validation(format!(
                "server '{}' is not a valid hostname",
                server
            )));
        }

        let port = self.port.unwrap_or(443);
        let port = u16::try_from(port)
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| {
                ConfigError::Validation(format!("port {} is outside 1-65535", port))
            })?;

        let crit = self.crit.unwrap_or(DEFAULT_CRIT_DAYS);
        let warn = self.warn.unwrap_or(DEFAULT_WARN_DAYS);
        if crit < 0 {
            return Err(ConfigError::Validation(format!(
                "crit must not be negative, got {}",
                crit
            )));
        }
        if warn < 0 {
            return Err(ConfigError::Validation(format!(
                "warn must not be negative, got {}",
                warn
            )));
        }
        if warn <= crit {
            warn!(
                "warning threshold ({}d) is not above critical threshold ({}d), WARNING is unreachable",
                warn, crit
            );
        }

        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);
        if timeout == 0 || timeout > MAX_TIMEOUT {
            return Err(ConfigError::Validation(format!(
                "timeout must be between 1 and {} seconds, got {}",
                MAX_TIMEOUT, timeout
            )));
        }

        let sni = match self.sni {
            Some(sni) if sni.trim().is_empty() => {
                return Err(ConfigError::Validation("sni must not be empty".to_string()))
            }
            Some(sni) => sni.trim().to_string(),
            None => server.clone(),
        };

        if let Some(path) = &self.ca_file {
            if !path.is_file() {
                return Err(ConfigError::Validation(format!(
                    "ca_file {} is not a readable file",
                    path.display()
                )));
            }
        }

        let output = match self.output {
            Some(output) => OutputFormat::from_str(&output).map_err(|_| {
                ConfigError::Validation(format!(
                    "unknown output format '{}', expected text or json",
                    output
                ))
            })?,
            None => OutputFormat::default(),
        };

        Ok(CheckConfig {
            expected_name: self.canonical.unwrap_or_else(|| server.clone()),
            target: ConnectionTarget::new(&server, port).with_sni(&sni),
            policy: ThresholdPolicy::new(warn, crit),
            timeout: Duration::from_secs(timeout),
            verify: !self.insecure.unwrap_or(false),
            ca_file: self.ca_file,
            output,
        })
    }

    /// Generates an example configuration file in TOML format.
    pub fn example_toml() -> String {
        let example = Config {
            server: Some("example.com".to_string()),
            canonical: Some("www.example.com".to_string()),
            ..Config::defaults()
        };

        toml::to_string_pretty(&example)
            .unwrap_or_else(|_| "# Error generating example".to_string())
    }
}

/// Errors that can occur during configuration loading and parsing.
#[derive(Debug)]
pub enum ConfigError {
    /// I/O error (file not found, permission denied, etc.)
    Io(String),
    /// TOML parsing error (invalid syntax, type mismatch, etc.)
    Parse(String),
    /// Validation error (missing required fields, invalid values, etc.)
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "IO Error: {}", msg),
            ConfigError::Parse(msg) => write!(f, "Parse Error: {}", msg),
            ConfigError::Validation(msg) => write!(f, "Validation Error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

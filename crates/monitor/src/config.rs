//! Configuration management for astmon.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/astmon/config.toml`.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("manager host must not be empty")]
    EmptyHost,

    #[error("manager port must not be 0")]
    InvalidPort,

    #[error("{name} must be between 1 and 300 seconds, got {value}")]
    InvalidTimeout { name: &'static str, value: u64 },

    #[error("poll_interval_secs must be between 5 and 86400 seconds, got {0}")]
    InvalidPollInterval(u64),

    #[error("extension entries must not be empty")]
    EmptyExtension,

    #[error("extension {0} is listed more than once")]
    DuplicateExtension(String),

    #[error("extension {0:?} must not contain line breaks")]
    InvalidExtension(String),

    #[error("mailbox entries must not be empty")]
    EmptyMailbox,

    #[error("mailbox {0} is listed more than once")]
    DuplicateMailbox(String),

    #[error("mailbox {0:?} must not contain line breaks")]
    InvalidMailbox(String),

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Bounds for connect and action timeouts in seconds.
const TIMEOUT_RANGE_SECS: std::ops::RangeInclusive<u64> = 1..=300;

/// Bounds for the poll interval in seconds. The lower bound caps how often
/// a dead manager is re-dialled, since reconnects happen once per tick.
const POLL_INTERVAL_RANGE_SECS: std::ops::RangeInclusive<u64> = 5..=86_400;

/// Main configuration structure for astmon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General process configuration.
    pub daemon: DaemonConfig,

    /// Manager (AMI) endpoint and credentials.
    pub manager: ManagerConfig,

    /// What to watch and how often.
    pub monitor: MonitorConfig,
}

/// General process configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
}

/// Manager endpoint configuration.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ManagerConfig {
    /// Host name or address of the telephony server.
    pub host: String,

    /// Manager interface port.
    pub port: u16,

    /// Manager user name.
    pub username: String,

    /// Manager secret.
    pub secret: String,

    /// Timeout for establishing the TCP connection and reading the banner.
    pub connect_timeout_secs: u64,

    /// Timeout for each request-response exchange.
    pub action_timeout_secs: u64,
}

/// Monitored targets and poll cadence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitorConfig {
    /// Seconds between poll cycles.
    pub poll_interval_secs: u64,

    /// SIP extensions whose registration status is polled.
    pub extensions: Vec<String>,

    /// Voicemail mailboxes (`box@context`) whose waiting count is polled.
    pub mailboxes: Vec<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: ami::DEFAULT_PORT,
            username: "admin".to_string(),
            secret: String::new(),
            connect_timeout_secs: ami::DEFAULT_TIMEOUT_SECS,
            action_timeout_secs: ami::DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            extensions: Vec::new(),
            mailboxes: Vec::new(),
        }
    }
}

impl fmt::Debug for ManagerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("action_timeout_secs", &self.action_timeout_secs)
            .finish()
    }
}

impl ManagerConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.action_timeout_secs)
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("astmon")
        .join("config.toml")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - ASTMON_HOST: Override manager host
    /// - ASTMON_PORT: Override manager port
    /// - ASTMON_USERNAME: Override manager user name
    /// - ASTMON_SECRET: Override manager secret
    /// - ASTMON_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    pub fn apply_env_overrides(&mut self) {
        if let Some(host) = non_empty_env("ASTMON_HOST") {
            tracing::info!("Overriding manager host from environment: {}", host);
            self.manager.host = host;
        }

        if let Some(port) = non_empty_env("ASTMON_PORT") {
            match port.parse::<u16>() {
                Ok(port) => {
                    tracing::info!("Overriding manager port from environment: {}", port);
                    self.manager.port = port;
                }
                Err(_) => {
                    tracing::warn!("Ignoring invalid ASTMON_PORT value: {}", port);
                }
            }
        }

        if let Some(username) = non_empty_env("ASTMON_USERNAME") {
            tracing::info!("Overriding manager username from environment: {}", username);
            self.manager.username = username;
        }

        if let Some(secret) = non_empty_env("ASTMON_SECRET") {
            tracing::info!("Overriding manager secret from environment");
            self.manager.secret = secret;
        }

        if let Some(level) = non_empty_env("ASTMON_LOG_LEVEL") {
            tracing::info!("Overriding log_level from environment: {}", level);
            self.daemon.log_level = level;
        }
    }

    /// Validate the configuration values.
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.manager.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }

        if self.manager.port == 0 {
            return Err(ConfigError::InvalidPort);
        }

        for (name, value) in [
            ("connect_timeout_secs", self.manager.connect_timeout_secs),
            ("action_timeout_secs", self.manager.action_timeout_secs),
        ] {
            if !TIMEOUT_RANGE_SECS.contains(&value) {
                return Err(ConfigError::InvalidTimeout { name, value });
            }
        }

        if !POLL_INTERVAL_RANGE_SECS.contains(&self.monitor.poll_interval_secs) {
            return Err(ConfigError::InvalidPollInterval(
                self.monitor.poll_interval_secs,
            ));
        }

        let mut seen = HashSet::new();
        for extension in &self.monitor.extensions {
            if extension.trim().is_empty() {
                return Err(ConfigError::EmptyExtension);
            }
            if extension.contains(['\r', '\n']) {
                return Err(ConfigError::InvalidExtension(extension.clone()));
            }
            if !seen.insert(extension.as_str()) {
                return Err(ConfigError::DuplicateExtension(extension.clone()));
            }
        }

        let mut seen = HashSet::new();
        for mailbox in &self.monitor.mailboxes {
            if mailbox.trim().is_empty() {
                return Err(ConfigError::EmptyMailbox);
            }
            if mailbox.contains(['\r', '\n']) {
                return Err(ConfigError::InvalidMailbox(mailbox.clone()));
            }
            if !seen.insert(mailbox.as_str()) {
                return Err(ConfigError::DuplicateMailbox(mailbox.clone()));
            }
        }

        let level = self.daemon.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.daemon.log_level.clone()));
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| {
            anyhow::anyhow!(
                "Invalid TOML configuration: {}",
                format_toml_error(toml_str, &e)
            )
        })
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Format a TOML deserialization error with the line and column it points at.
fn format_toml_error(source: &str, error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        let before = &source[..span.start.min(source.len())];
        let line = before.matches('\n').count() + 1;
        let column = before.rsplit('\n').next().map_or(0, |l| l.chars().count()) + 1;
        msg.push_str(&format!(" (line {}, column {})", line, column));
    }

    msg
}

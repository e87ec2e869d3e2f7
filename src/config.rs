//! Configuration module for healthwatch.
//!
//! Loads the target list and engine settings from a TOML file. Invalid
//! configuration is fatal: the engine never starts partially configured.

use std::env;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::metrics::MetricThresholds;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("cannot parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// A monitored endpoint, loaded once at startup and immutable thereafter.
#[derive(Debug, Clone, Deserialize)]
pub struct Target {
    pub name: String,
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default = "default_expected_status")]
    pub expected_status: u16,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: f64,
    #[serde(default = "default_critical")]
    pub critical: bool,
}

impl Target {
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs_f64(self.timeout)
    }
}

/// Engine cycle settings.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    /// Seconds between cycles.
    #[serde(default = "default_check_interval")]
    pub check_interval: f64,
    /// Consecutive failures before an incident opens.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            check_interval: default_check_interval(),
            failure_threshold: default_failure_threshold(),
        }
    }
}

/// Alert dispatch settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AlertConfig {
    /// Minimum seconds between two alerts sharing a key.
    #[serde(default = "default_cooldown")]
    pub cooldown_seconds: u64,
    /// In-memory alert history capacity.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default)]
    pub thresholds: MetricThresholds,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            cooldown_seconds: default_cooldown(),
            history_capacity: default_history_capacity(),
            thresholds: MetricThresholds::default(),
        }
    }
}

/// Webhook notifier settings.
#[derive(Debug, Clone, Deserialize)]
pub struct NotifierConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Falls back to the SLACK_WEBHOOK_URL environment variable.
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Add a channel-wide mention to critical alerts.
    #[serde(default = "default_mention_channel")]
    pub mention_channel: bool,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            webhook_url: None,
            mention_channel: default_mention_channel(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub targets: Vec<Target>,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut config: Config = toml::from_str(&raw)?;

        if config.notifier.webhook_url.is_none() {
            if let Ok(url) = env::var("SLACK_WEBHOOK_URL") {
                if !url.is_empty() {
                    config.notifier.webhook_url = Some(url);
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.targets.is_empty() {
            return Err(ConfigError::Invalid("no targets configured".to_string()));
        }

        let mut names = std::collections::HashSet::new();
        for target in &self.targets {
            if target.name.is_empty() {
                return Err(ConfigError::Invalid("target with empty name".to_string()));
            }
            if !names.insert(target.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate target name: {}",
                    target.name
                )));
            }
            if target.url.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "target {} has an empty url",
                    target.name
                )));
            }
            if !(target.timeout > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "target {} has a non-positive timeout",
                    target.name
                )));
            }
            if reqwest::Method::from_bytes(target.method.as_bytes()).is_err() {
                return Err(ConfigError::Invalid(format!(
                    "target {} has an invalid method: {}",
                    target.name, target.method
                )));
            }
        }

        if self.monitoring.failure_threshold < 1 {
            return Err(ConfigError::Invalid(
                "failure_threshold must be at least 1".to_string(),
            ));
        }
        if !(self.monitoring.check_interval > 0.0) {
            return Err(ConfigError::Invalid(
                "check_interval must be positive".to_string(),
            ));
        }

        Ok(())
    }

    pub fn check_interval_duration(&self) -> Duration {
        Duration::from_secs_f64(self.monitoring.check_interval)
    }
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_expected_status() -> u16 {
    200
}

fn default_timeout() -> f64 {
    10.0
}

fn default_critical() -> bool {
    true
}

fn default_check_interval() -> f64 {
    30.0
}

fn default_failure_threshold() -> u32 {
    2
}

fn default_cooldown() -> u64 {
    300
}

fn default_history_capacity() -> usize {
    1000
}

fn default_mention_channel() -> bool {
    true
}

fn default_http_port() -> u16 {
    8080
}

fn default_db_path() -> String {
    "healthwatch.db".to_string()
}

//! Configuration management for crashnote.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::classify::ErrorKind;
use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "crashnote";

/// Environment variable prefix.
const ENV_PREFIX: &str = "CRASHNOTE_";

/// Upper bound on automatic retries per fingerprint.
const MAX_RETRIES_LIMIT: u32 = 100;

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `CRASHNOTE_`, sections split on `__`)
/// 2. TOML config file at `~/.config/crashnote/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ambient environment configuration.
    pub reporter: ReporterConfig,
    /// Error handler configuration.
    pub handler: HandlerConfig,
    /// Classifier configuration.
    pub classifier: ClassifierConfig,
}

/// Ambient environment used when a report does not supply its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReporterConfig {
    /// User agent to report instead of the process's own.
    pub user_agent: Option<String>,
    /// Location to report instead of the working directory.
    pub url: Option<String>,
    /// Read the user identifier from the file store.
    pub storage_enabled: bool,
    /// Path to the file store.
    /// Defaults to `~/.local/share/crashnote/session.json`
    pub storage_path: Option<PathBuf>,
}

/// Error handler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerConfig {
    /// Forward incidents to the report sink.
    pub enable_reporting: bool,
    /// Allow automatic retries of network failures.
    pub enable_auto_retry: bool,
    /// Maximum retries per error fingerprint.
    pub max_retries: u32,
    /// Base delay between retries in milliseconds.
    pub retry_delay_ms: u64,
    /// Append incidents as JSON lines to this file instead of stdout.
    pub output_path: Option<PathBuf>,
}

/// Classifier configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Extra rules, checked before the built-in ones.
    pub custom_rules: Vec<RuleConfig>,
}

/// A user-defined classification rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Kind assigned when the pattern matches.
    pub kind: ErrorKind,
    /// Regex matched case-insensitively against the error message.
    pub pattern: String,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            user_agent: None,
            url: None,
            storage_enabled: true,
            storage_path: None, // Will be resolved to default at runtime
        }
    }
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            enable_reporting: true,
            enable_auto_retry: false,
            max_retries: 3,
            retry_delay_ms: 1000,
            output_path: None,
        }
    }
}

impl HandlerConfig {
    /// Get the retry delay as a Duration.
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate the configuration file at `path`.
    ///
    /// Unlike [`Config::load_from`], a missing file is an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist, cannot be parsed or
    /// fails validation.
    pub fn check_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::config_validation(format!(
                "configuration file not found: {}",
                path.display()
            )));
        }
        Self::load_from(Some(path.to_path_buf()))
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.handler.max_retries > MAX_RETRIES_LIMIT {
            return Err(Error::config_validation(format!(
                "max_retries ({}) cannot exceed {MAX_RETRIES_LIMIT}",
                self.handler.max_retries
            )));
        }

        for rule in &self.classifier.custom_rules {
            if regex::Regex::new(&rule.pattern).is_err() {
                return Err(Error::config_validation(format!(
                    "invalid regex pattern: {}",
                    rule.pattern
                )));
            }
        }

        Ok(())
    }

    /// Get the file store path, resolving defaults if not set.
    #[must_use]
    pub fn storage_path(&self) -> PathBuf {
        self.reporter
            .storage_path
            .clone()
            .unwrap_or_else(crate::environment::default_store_path)
    }
}

//! Configuration loading, validation, and management for the dialectic worker.
//!
//! Loads configuration from `~/.dialectic/worker.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Log output format for the CLI subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(ConfigError::ValidationError(format!(
                "unknown log_format '{other}' (expected 'pretty' or 'json')"
            ))),
        }
    }
}

/// The root configuration structure.
///
/// Maps directly to `~/.dialectic/worker.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Share of the wallet balance a single job may commit
    #[serde(default = "default_rationality_threshold")]
    pub rationality_threshold: f64,

    /// Tokens reserved between input and output when sizing headroom
    #[serde(default = "default_safety_buffer_tokens")]
    pub safety_buffer_tokens: u64,

    /// Longest continuation chain before a chunk is forced terminal
    #[serde(default = "default_max_continuations")]
    pub max_continuations: u32,

    /// Most recent history messages that are never compressed
    #[serde(default = "default_history_tail_len")]
    pub history_tail_len: usize,

    /// Characters per token for the built-in estimator
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: usize,

    /// User text inserted between two anchored assistant turns
    #[serde(default = "default_user_spacer")]
    pub user_spacer: String,

    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_rationality_threshold() -> f64 {
    0.8
}
fn default_safety_buffer_tokens() -> u64 {
    32
}
fn default_max_continuations() -> u32 {
    5
}
fn default_history_tail_len() -> usize {
    4
}
fn default_chars_per_token() -> usize {
    4
}
fn default_user_spacer() -> String {
    "Go on.".into()
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            rationality_threshold: default_rationality_threshold(),
            safety_buffer_tokens: default_safety_buffer_tokens(),
            max_continuations: default_max_continuations(),
            history_tail_len: default_history_tail_len(),
            chars_per_token: default_chars_per_token(),
            user_spacer: default_user_spacer(),
            log_format: LogFormat::default(),
        }
    }
}

impl WorkerConfig {
    /// Load configuration from the default path (~/.dialectic/worker.toml).
    ///
    /// Environment overrides:
    /// - `DIALECTIC_MAX_CONTINUATIONS`
    /// - `DIALECTIC_LOG_FORMAT`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("worker.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup, then re-validate.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("DIALECTIC_MAX_CONTINUATIONS") {
            self.max_continuations = raw.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "DIALECTIC_MAX_CONTINUATIONS must be a positive integer, got '{raw}'"
                ))
            })?;
        }

        if let Some(raw) = lookup("DIALECTIC_LOG_FORMAT") {
            self.log_format = raw.parse()?;
        }

        self.validate()
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".dialectic")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.rationality_threshold > 0.0 && self.rationality_threshold <= 1.0) {
            return Err(ConfigError::ValidationError(
                "rationality_threshold must be in (0.0, 1.0]".into(),
            ));
        }

        if self.max_continuations == 0 {
            return Err(ConfigError::ValidationError(
                "max_continuations must be >= 1".into(),
            ));
        }

        if self.chars_per_token == 0 {
            return Err(ConfigError::ValidationError(
                "chars_per_token must be >= 1".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

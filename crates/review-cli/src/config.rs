//! Configuration file loading for the review tool.
//!
//! Settings come from `review.toml` in the current directory; every key is
//! optional and command-line flags take precedence over the file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chess_review::{AnalysisConfig, ChannelConfig, Thresholds};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when loading or parsing configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse the configuration file as valid TOML.
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    /// A value is out of range.
    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Review tool configuration.
///
/// ```toml
/// engine_path = "/usr/local/bin/stockfish"
/// depth = 14
/// threshold = 1.0
/// search_timeout_ms = 60000
///
/// [engine_options]
/// Threads = 2
/// Hash = 128
/// ```
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ReviewConfig {
    /// Path to the UCI engine. Defaults to "stockfish" (assumes it's in PATH).
    #[serde(default = "default_engine_path")]
    pub engine_path: PathBuf,
    /// Search depth per position.
    #[serde(default = "default_depth")]
    pub depth: u32,
    /// Classification threshold in pawns.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Upper bound on a single search.
    #[serde(default = "default_search_timeout_ms")]
    pub search_timeout_ms: u64,
    /// UCI options sent to the engine after the handshake.
    #[serde(default)]
    pub engine_options: BTreeMap<String, toml::Value>,
}

fn default_engine_path() -> PathBuf {
    PathBuf::from("stockfish")
}

fn default_depth() -> u32 {
    10
}

fn default_threshold() -> f64 {
    1.0
}

fn default_search_timeout_ms() -> u64 {
    60_000
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            engine_path: default_engine_path(),
            depth: default_depth(),
            threshold: default_threshold(),
            search_timeout_ms: default_search_timeout_ms(),
            engine_options: BTreeMap::new(),
        }
    }
}

impl ReviewConfig {
    /// Load a specific file, falling back to defaults when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ReadError`] if the file exists but cannot be read,
    /// [`ConfigError::ParseError`] if it is not valid TOML and
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.depth == 0 {
            return Err(ConfigError::Invalid("depth must be at least 1".to_string()));
        }
        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "threshold must be a positive number, got {}",
                self.threshold
            )));
        }
        if self.search_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "search_timeout_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply command-line overrides.
    pub fn with_overrides(
        mut self,
        engine: Option<PathBuf>,
        depth: Option<u32>,
        threshold: Option<f64>,
    ) -> Result<Self, ConfigError> {
        if let Some(engine) = engine {
            self.engine_path = engine;
        }
        if let Some(depth) = depth {
            self.depth = depth;
        }
        if let Some(threshold) = threshold {
            self.threshold = threshold;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn channel_config(&self) -> ChannelConfig {
        let options = self
            .engine_options
            .iter()
            .map(|(name, value)| {
                let value = match value {
                    toml::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (name.clone(), value)
            })
            .collect();
        ChannelConfig {
            search_timeout: Duration::from_millis(self.search_timeout_ms),
            options,
            ..ChannelConfig::default()
        }
    }

    pub fn analysis_config(&self) -> AnalysisConfig {
        AnalysisConfig {
            depth: self.depth,
            thresholds: self.thresholds(),
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds::new(self.threshold)
    }
}

//! Runtime configuration for matchmaking, registration and reporting.

use derive_getters::Getters;
use derive_more::{Display, Error};
use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Tunables shared by the matchmaker, coordinator and participants.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Setters, Serialize, Deserialize)]
#[setters(prefix = "with_")]
pub struct ArenaConfig {
    /// Delay between registration attempts while the state is not live.
    #[serde(default = "default_registration_interval_ms")]
    registration_interval_ms: u64,

    /// Registration attempts before giving up.
    #[serde(default = "default_registration_attempts")]
    registration_attempts: u32,

    /// How long the matchmaker waits before re-querying the directory.
    #[serde(default = "default_directory_refresh_ms")]
    directory_refresh_ms: u64,

    /// Account backend base URL. Results are not reported when unset.
    #[serde(default)]
    #[setters(into)]
    backend_url: Option<String>,

    /// Broadcast events buffered per subscriber.
    #[serde(default = "default_event_capacity")]
    event_capacity: usize,
}

fn default_registration_interval_ms() -> u64 {
    500
}

fn default_registration_attempts() -> u32 {
    40
}

fn default_directory_refresh_ms() -> u64 {
    1000
}

fn default_event_capacity() -> usize {
    64
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            registration_interval_ms: default_registration_interval_ms(),
            registration_attempts: default_registration_attempts(),
            directory_refresh_ms: default_directory_refresh_ms(),
            backend_url: None,
            event_capacity: default_event_capacity(),
        }
    }
}

impl ArenaConfig {
    /// Loads configuration from a TOML file. Missing keys take defaults.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;
        Self::from_toml(&content)
    }

    /// Parses configuration from TOML text.
    #[instrument(skip(content))]
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;
        if config.registration_attempts == 0 {
            return Err(ConfigError::new("registration_attempts must be at least 1"));
        }
        info!(
            registration_interval_ms = config.registration_interval_ms,
            registration_attempts = config.registration_attempts,
            backend = ?config.backend_url,
            "Config loaded"
        );
        Ok(config)
    }

    /// Registration retry interval.
    pub fn registration_interval(&self) -> Duration {
        Duration::from_millis(self.registration_interval_ms)
    }

    /// Matchmaker refresh wait.
    pub fn directory_refresh(&self) -> Duration {
        Duration::from_millis(self.directory_refresh_ms)
    }

    /// Upper bound on the time spent retrying registration.
    pub fn registration_timeout(&self) -> Duration {
        self.registration_interval() * self.registration_attempts
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_give_twenty_second_registration_window() {
        let config = ArenaConfig::default();
        assert_eq!(config.registration_interval(), Duration::from_millis(500));
        assert_eq!(config.registration_timeout(), Duration::from_secs(20));
        assert_eq!(config.directory_refresh(), Duration::from_secs(1));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ArenaConfig::from_toml("registration_attempts = 3\n").unwrap();
        assert_eq!(*config.registration_attempts(), 3);
        assert_eq!(*config.registration_interval_ms(), 500);
        assert_eq!(config.backend_url(), &None);
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let err = ArenaConfig::from_toml("registration_attempts = 0\n").unwrap_err();
        assert!(err.message.contains("registration_attempts"));
    }

    #[test]
    fn test_setters_chain() {
        let config = ArenaConfig::default()
            .with_registration_interval_ms(10)
            .with_backend_url(Some("http://localhost:5000".to_string()));
        assert_eq!(*config.registration_interval_ms(), 10);
        assert_eq!(config.backend_url().as_deref(), Some("http://localhost:5000"));
    }
}

//! Client configuration
//!
//! Read from the environment; every value has a default so a local backend
//! works with no setup.

use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_API_BASE: &str = "http://localhost:8001";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

pub const DEFAULT_COUNCIL_MODELS: [&str; 3] = [
    "openai/gpt-4o",
    "anthropic/claude-sonnet-4",
    "google/gemini-2.5-flash",
];
pub const DEFAULT_CHAIRMAN_MODEL: &str = "google/gemini-2.5-flash";

/// Invalid configuration value
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a non-negative integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },
    #[error("{var} must not be empty")]
    Empty { var: &'static str },
}

/// Which models deliberate and which one synthesizes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CouncilSettings {
    pub council_models: Vec<String>,
    pub chairman_model: String,
}

impl Default for CouncilSettings {
    fn default() -> Self {
        Self {
            council_models: DEFAULT_COUNCIL_MODELS.iter().map(|m| (*m).to_string()).collect(),
            chairman_model: DEFAULT_CHAIRMAN_MODEL.to_string(),
        }
    }
}

/// Configuration for the council client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Backend base URL, without trailing slash
    pub api_base: String,
    pub connect_timeout: Duration,
    pub council: CouncilSettings,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            council: CouncilSettings::default(),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(base) = lookup("COUNCIL_API_BASE") {
            let base = base.trim().trim_end_matches('/');
            if base.is_empty() {
                return Err(ConfigError::Empty {
                    var: "COUNCIL_API_BASE",
                });
            }
            config.api_base = base.to_string();
        }

        if let Some(raw) = lookup("COUNCIL_CONNECT_TIMEOUT_SECS") {
            let secs = raw
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidNumber {
                    var: "COUNCIL_CONNECT_TIMEOUT_SECS",
                    value: raw.clone(),
                })?;
            config.connect_timeout = Duration::from_secs(secs);
        }

        if let Some(raw) = lookup("COUNCIL_MODELS") {
            let models: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(String::from)
                .collect();
            if models.is_empty() {
                return Err(ConfigError::Empty {
                    var: "COUNCIL_MODELS",
                });
            }
            config.council.council_models = models;
        }

        if let Some(chairman) = lookup("COUNCIL_CHAIRMAN_MODEL") {
            let chairman = chairman.trim();
            if chairman.is_empty() {
                return Err(ConfigError::Empty {
                    var: "COUNCIL_CHAIRMAN_MODEL",
                });
            }
            config.council.chairman_model = chairman.to_string();
        }

        Ok(config)
    }
}

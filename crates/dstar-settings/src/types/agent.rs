//! Default agent configuration and logging settings.

use dstar_core::AgentConfig;
use serde::{Deserialize, Serialize};

/// Default agent configuration, in settings-file spelling.
///
/// The wire format of [`AgentConfig`] is snake_case; this mirror keeps the
/// settings file uniformly camelCase.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentSettings {
    /// See [`AgentConfig::max_iterations`].
    pub max_iterations: u32,
    /// See [`AgentConfig::max_debug_attempts`].
    pub max_debug_attempts: u32,
    /// See [`AgentConfig::execution_timeout_seconds`].
    pub execution_timeout_seconds: f64,
    /// See [`AgentConfig::temperature`].
    pub temperature: f64,
    /// See [`AgentConfig::max_tokens`].
    pub max_tokens: u32,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self::from(&AgentConfig::default())
    }
}

impl AgentSettings {
    /// The wire configuration these settings describe. Not validated.
    pub fn config(&self) -> AgentConfig {
        AgentConfig {
            max_iterations: self.max_iterations,
            max_debug_attempts: self.max_debug_attempts,
            execution_timeout_seconds: self.execution_timeout_seconds,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

impl From<&AgentConfig> for AgentSettings {
    fn from(cfg: &AgentConfig) -> Self {
        Self {
            max_iterations: cfg.max_iterations,
            max_debug_attempts: cfg.max_debug_attempts,
            execution_timeout_seconds: cfg.execution_timeout_seconds,
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: dstar_core::logging::DEFAULT_LEVEL.to_string(),
        }
    }
}

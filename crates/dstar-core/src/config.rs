//! Agent configuration sent with every start command.
//!
//! Every field has an inclusive valid range. Values outside the range are
//! rejected on the client before anything is sent; nothing is clamped.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Inclusive bounds for `max_iterations`.
pub const MAX_ITERATIONS_RANGE: (u32, u32) = (1, 100);
/// Inclusive bounds for `max_debug_attempts`.
pub const MAX_DEBUG_ATTEMPTS_RANGE: (u32, u32) = (1, 10);
/// Inclusive bounds for `execution_timeout_seconds`.
pub const EXECUTION_TIMEOUT_RANGE: (f64, f64) = (10.0, 600.0);
/// Inclusive bounds for `temperature`.
pub const TEMPERATURE_RANGE: (f64, f64) = (0.0, 1.0);
/// Inclusive bounds for `max_tokens`.
pub const MAX_TOKENS_RANGE: (u32, u32) = (1024, 16384);

/// Name of a configuration field, used in validation errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigField {
    /// `max_iterations`
    MaxIterations,
    /// `max_debug_attempts`
    MaxDebugAttempts,
    /// `execution_timeout_seconds`
    ExecutionTimeoutSeconds,
    /// `temperature`
    Temperature,
    /// `max_tokens`
    MaxTokens,
}

impl ConfigField {
    /// Wire name of the field.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MaxIterations => "max_iterations",
            Self::MaxDebugAttempts => "max_debug_attempts",
            Self::ExecutionTimeoutSeconds => "execution_timeout_seconds",
            Self::Temperature => "temperature",
            Self::MaxTokens => "max_tokens",
        }
    }
}

impl fmt::Display for ConfigField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options controlling one remote analysis run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Upper bound on plan/verify iterations.
    pub max_iterations: u32,
    /// Debug retries per failed code execution.
    pub max_debug_attempts: u32,
    /// Per-execution timeout on the remote side.
    pub execution_timeout_seconds: f64,
    /// Sampling temperature for the remote model.
    pub temperature: f64,
    /// Token budget per model call.
    pub max_tokens: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            max_debug_attempts: 3,
            execution_timeout_seconds: 60.0,
            temperature: 1.0,
            max_tokens: 4096,
        }
    }
}

impl AgentConfig {
    /// Check every field against its bounds, reporting the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_int(
            ConfigField::MaxIterations,
            self.max_iterations,
            MAX_ITERATIONS_RANGE,
        )?;
        check_int(
            ConfigField::MaxDebugAttempts,
            self.max_debug_attempts,
            MAX_DEBUG_ATTEMPTS_RANGE,
        )?;
        check_float(
            ConfigField::ExecutionTimeoutSeconds,
            self.execution_timeout_seconds,
            EXECUTION_TIMEOUT_RANGE,
        )?;
        check_float(
            ConfigField::Temperature,
            self.temperature,
            TEMPERATURE_RANGE,
        )?;
        check_int(ConfigField::MaxTokens, self.max_tokens, MAX_TOKENS_RANGE)
    }

    /// Merge `patch` field by field, returning the merged configuration.
    ///
    /// `self` is left untouched; the result is validated as a whole so a
    /// patch with any bad field is rejected entirely.
    pub fn merged(&self, patch: &AgentConfigPatch) -> Result<Self, ConfigError> {
        let mut next = self.clone();
        if let Some(v) = patch.max_iterations {
            next.max_iterations = v;
        }
        if let Some(v) = patch.max_debug_attempts {
            next.max_debug_attempts = v;
        }
        if let Some(v) = patch.execution_timeout_seconds {
            next.execution_timeout_seconds = v;
        }
        if let Some(v) = patch.temperature {
            next.temperature = v;
        }
        if let Some(v) = patch.max_tokens {
            next.max_tokens = v;
        }
        next.validate()?;
        Ok(next)
    }
}

/// A partial configuration edit. `None` fields are left as they are.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfigPatch {
    /// New `max_iterations`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
    /// New `max_debug_attempts`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_debug_attempts: Option<u32>,
    /// New `execution_timeout_seconds`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_timeout_seconds: Option<f64>,
    /// New `temperature`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// New `max_tokens`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl AgentConfigPatch {
    /// Whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

fn check_int(field: ConfigField, value: u32, (min, max): (u32, u32)) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value: f64::from(value),
            min: f64::from(min),
            max: f64::from(max),
        })
    }
}

fn check_float(field: ConfigField, value: f64, (min, max): (f64, f64)) -> Result<(), ConfigError> {
    // NaN fails `contains`, which is what we want.
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

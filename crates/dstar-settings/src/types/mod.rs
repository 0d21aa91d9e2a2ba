//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a settings
//! file may name any subset of fields.

mod agent;
mod server;

pub use agent::*;
pub use server::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type for the DS-STAR client.
///
/// ```json
/// {
///   "server": { "baseUrl": "https://dstar.internal:8443" },
///   "agent": { "maxIterations": 40 },
///   "logging": { "level": "info" }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// Where the DS-STAR server lives.
    pub server: ServerSettings,
    /// WebSocket connection tuning.
    pub connection: ConnectionSettings,
    /// Default agent configuration for new sessions.
    pub agent: AgentSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl ClientSettings {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let base = self.server.base_url.as_str();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(SettingsError::InvalidValue(format!(
                "server.baseUrl must start with http:// or https://, got '{base}'"
            )));
        }
        if !self.server.ws_path.starts_with('/') {
            return Err(SettingsError::InvalidValue(format!(
                "server.wsPath must start with '/', got '{}'",
                self.server.ws_path
            )));
        }
        if self.connection.event_channel_capacity == 0
            || self.connection.outbound_channel_capacity == 0
        {
            return Err(SettingsError::InvalidValue(
                "connection channel capacities must be at least 1".into(),
            ));
        }
        self.agent.config().validate()?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn defaults_validate() {
        assert!(ClientSettings::default().validate().is_ok());
    }

    #[test]
    fn camel_case_round_trip_names() {
        let json = serde_json::to_value(ClientSettings::default()).unwrap();
        assert!(json["server"]["baseUrl"].is_string());
        assert!(json["connection"]["connectTimeoutMs"].is_u64());
        assert!(json["agent"]["maxDebugAttempts"].is_u64());
        assert!(json["logging"]["level"].is_string());
    }

    #[test]
    fn non_http_base_url_rejected() {
        let mut settings = ClientSettings::default();
        settings.server.base_url = "localhost:8000".into();
        assert_matches!(settings.validate(), Err(SettingsError::InvalidValue(_)));
    }

    #[test]
    fn out_of_range_agent_rejected() {
        let mut settings = ClientSettings::default();
        settings.agent.max_tokens = 10;
        assert_matches!(settings.validate(), Err(SettingsError::Agent(_)));
    }

    #[test]
    fn zero_capacity_rejected() {
        let mut settings = ClientSettings::default();
        settings.connection.event_channel_capacity = 0;
        assert_matches!(settings.validate(), Err(SettingsError::InvalidValue(_)));
    }
}

//! # dstar-settings
//!
//! Layered client settings for the DS-STAR client.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`ClientSettings::default()`]
//! 2. **User file**: `~/.dstar/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `DSTAR_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

use std::sync::OnceLock;

static SETTINGS: OnceLock<ClientSettings> = OnceLock::new();

/// Get the global settings instance.
///
/// On first call, loads settings from `~/.dstar/settings.json` with env var
/// overrides. If loading fails, logs the failure and returns compiled
/// defaults.
pub fn get_settings() -> &'static ClientSettings {
    SETTINGS.get_or_init(|| {
        load_settings().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to load settings, using defaults");
            ClientSettings::default()
        })
    })
}

/// Initialize the global settings with a specific value.
///
/// Returns the settings back if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: ClientSettings) -> std::result::Result<(), ClientSettings> {
    SETTINGS.set(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_then_get_returns_injected() {
        let mut custom = ClientSettings::default();
        custom.server.base_url = "https://injected.example".into();
        // Another test in this binary may have initialized first.
        if init_settings(custom).is_ok() {
            assert_eq!(get_settings().server.base_url, "https://injected.example");
        }
        assert!(init_settings(ClientSettings::default()).is_err());
    }

    #[test]
    fn default_settings_values() {
        let settings = ClientSettings::default();
        assert_eq!(settings.server.base_url, "http://localhost:8000");
        assert_eq!(settings.server.ws_path, "/ws/query");
        assert_eq!(settings.connection.connect_timeout_ms, 10_000);
        assert_eq!(settings.agent.config(), dstar_core::AgentConfig::default());
        assert_eq!(settings.logging.level, "warn");
    }
}

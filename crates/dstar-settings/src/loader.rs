//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`ClientSettings::default()`]
//! 2. If `~/.dstar/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `DSTAR_*` environment variable overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use dstar_core::config::{
    EXECUTION_TIMEOUT_RANGE, MAX_DEBUG_ATTEMPTS_RANGE, MAX_ITERATIONS_RANGE, MAX_TOKENS_RANGE,
    TEMPERATURE_RANGE,
};
use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::ClientSettings;

/// Resolve the path to the settings file (`~/.dstar/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".dstar").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<ClientSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or an out-of-range value is
/// an error.
pub fn load_settings_from_path(path: &Path) -> Result<ClientSettings> {
    let mut settings = read_layers(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Defaults with the settings file merged on top. No env, no validation.
fn read_layers(path: &Path) -> Result<ClientSettings> {
    let defaults = serde_json::to_value(ClientSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Numeric values must parse and fall inside the field's range; anything else
/// is ignored with a warning and the file/default value stays.
pub fn apply_env_overrides(settings: &mut ClientSettings) {
    // ── Server / logging ────────────────────────────────────────────
    if let Some(v) = read_env_string("DSTAR_SERVER_URL") {
        settings.server.base_url = v;
    }
    if let Some(v) = read_env_string("DSTAR_LOG_LEVEL") {
        settings.logging.level = v;
    }

    // ── Connection ──────────────────────────────────────────────────
    if let Some(v) = read_env_u64("DSTAR_CONNECT_TIMEOUT_MS", 100, 600_000) {
        settings.connection.connect_timeout_ms = v;
    }
    if let Some(v) = read_env_u32("DSTAR_CONNECT_RETRIES", 0, 100) {
        settings.connection.connect_retries = v;
    }

    // ── Agent defaults ──────────────────────────────────────────────
    let (lo, hi) = MAX_ITERATIONS_RANGE;
    if let Some(v) = read_env_u32("DSTAR_MAX_ITERATIONS", lo, hi) {
        settings.agent.max_iterations = v;
    }
    let (lo, hi) = MAX_DEBUG_ATTEMPTS_RANGE;
    if let Some(v) = read_env_u32("DSTAR_MAX_DEBUG_ATTEMPTS", lo, hi) {
        settings.agent.max_debug_attempts = v;
    }
    let (lo, hi) = EXECUTION_TIMEOUT_RANGE;
    if let Some(v) = read_env_f64("DSTAR_EXECUTION_TIMEOUT", lo, hi) {
        settings.agent.execution_timeout_seconds = v;
    }
    let (lo, hi) = TEMPERATURE_RANGE;
    if let Some(v) = read_env_f64("DSTAR_TEMPERATURE", lo, hi) {
        settings.agent.temperature = v;
    }
    let (lo, hi) = MAX_TOKENS_RANGE;
    if let Some(v) = read_env_u32("DSTAR_MAX_TOKENS", lo, hi) {
        settings.agent.max_tokens = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u32` within a range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a finite `f64` within a range.
pub fn parse_f64_range(val: &str, min: f64, max: f64) -> Option<f64> {
    let n: f64 = val.trim().parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_u32(name: &str, min: u32, max: u32) -> Option<u32> {
    let val = std::env::var(name).ok()?;
    let result = parse_u32_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u32 env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_f64(name: &str, min: f64, max: f64) -> Option<f64> {
    let val = std::env::var(name).ok()?;
    let result = parse_f64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid f64 env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn write_settings(body: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, body).unwrap();
        (dir, path)
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = json!({"server": {"baseUrl": "http://a", "wsPath": "/ws/query"}});
        let source = json!({"server": {"baseUrl": "https://b"}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["baseUrl"], "https://b");
        assert_eq!(merged["server"]["wsPath"], "/ws/query");
    }

    #[test]
    fn merge_null_preserves_target() {
        let merged = deep_merge(json!({"a": 1, "b": 2}), json!({"a": null}));
        assert_eq!(merged, json!({"a": 1, "b": 2}));
    }

    #[test]
    fn merge_array_replace() {
        let merged = deep_merge(json!({"items": [1, 2, 3]}), json!({"items": [4]}));
        assert_eq!(merged["items"], json!([4]));
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let merged = deep_merge(json!({"a": {"nested": true}}), json!({"a": 42}));
        assert_eq!(merged["a"], 42);
    }

    // ── layered load ────────────────────────────────────────────────

    #[test]
    fn missing_file_yields_defaults() {
        let settings = read_layers(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings, ClientSettings::default());
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let (_dir, path) = write_settings(
            r#"{"server": {"baseUrl": "https://dstar.example"}, "agent": {"maxIterations": 40}}"#,
        );
        let settings = read_layers(&path).unwrap();
        assert_eq!(settings.server.base_url, "https://dstar.example");
        assert_eq!(settings.server.ws_path, "/ws/query");
        assert_eq!(settings.agent.max_iterations, 40);
        assert_eq!(settings.agent.max_tokens, 4096);
    }

    #[test]
    fn invalid_json_is_error() {
        let (_dir, path) = write_settings("not valid json");
        assert_matches!(load_settings_from_path(&path), Err(SettingsError::Json(_)));
    }

    #[test]
    fn out_of_range_agent_value_is_error() {
        let (_dir, path) = write_settings(r#"{"agent": {"temperature": 1.5}}"#);
        assert_matches!(load_settings_from_path(&path), Err(SettingsError::Agent(_)));
    }

    #[test]
    fn wrong_type_is_json_error() {
        let (_dir, path) = write_settings(r#"{"connection": {"connectTimeoutMs": "soon"}}"#);
        assert_matches!(load_settings_from_path(&path), Err(SettingsError::Json(_)));
    }

    // ── parsers ─────────────────────────────────────────────────────

    #[test]
    fn parse_u32_bounds() {
        assert_eq!(parse_u32_range("1", 1, 100), Some(1));
        assert_eq!(parse_u32_range("100", 1, 100), Some(100));
        assert_eq!(parse_u32_range("0", 1, 100), None);
        assert_eq!(parse_u32_range("101", 1, 100), None);
        assert_eq!(parse_u32_range("-1", 1, 100), None);
        assert_eq!(parse_u32_range(" 7 ", 1, 100), Some(7));
    }

    #[test]
    fn parse_u64_bounds() {
        assert_eq!(parse_u64_range("5000", 100, 600_000), Some(5000));
        assert_eq!(parse_u64_range("99", 100, 600_000), None);
        assert_eq!(parse_u64_range("abc", 100, 600_000), None);
    }

    #[test]
    fn parse_f64_bounds() {
        assert_eq!(parse_f64_range("0.5", 0.0, 1.0), Some(0.5));
        assert_eq!(parse_f64_range("1", 0.0, 1.0), Some(1.0));
        assert_eq!(parse_f64_range("1.01", 0.0, 1.0), None);
        assert_eq!(parse_f64_range("NaN", 0.0, 1.0), None);
        assert_eq!(parse_f64_range("inf", 10.0, 600.0), None);
    }
}

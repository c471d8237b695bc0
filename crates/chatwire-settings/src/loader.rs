//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::ChatwireSettings;

/// Resolve the path to the settings file (`~/.chatwire/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".chatwire").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<ChatwireSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<ChatwireSettings> {
    let mut settings = read_file_layer(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

fn read_file_layer(path: &Path) -> Result<ChatwireSettings> {
    let defaults = serde_json::to_value(ChatwireSettings::default())?;

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
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `CHATWIRE_*` overrides. Values that fail to parse are ignored.
pub fn apply_env_overrides(settings: &mut ChatwireSettings) {
    if let Some(v) = read_env_string("CHATWIRE_BASE_URL") {
        settings.gateway.base_url = v;
    }
    if let Some(v) = read_env_string("CHATWIRE_API_KEY") {
        settings.gateway.api_key = Some(SecretString::from(v));
    }

    if let Some(v) = read_env_u32("CHATWIRE_MAX_ITERATIONS", 1, 100) {
        settings.orchestrator.max_iterations = v;
    }
    if let Some(v) = read_env_u64("CHATWIRE_FLUSH_INTERVAL_MS", 0, 10_000) {
        settings.orchestrator.flush_interval_ms = v;
    }
    if let Some(v) = read_env_u64("CHATWIRE_TOOL_TIMEOUT_MS", 1, 3_600_000) {
        settings.orchestrator.tool_timeout_ms = v;
    }

    if let Some(v) = read_env_string("CHATWIRE_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_env_bool("CHATWIRE_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.trim().parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = read_env_string(name)?;
    let parsed = parse_bool(&val);
    if parsed.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    parsed
}

fn read_env_u32(name: &str, min: u32, max: u32) -> Option<u32> {
    let val = read_env_string(name)?;
    let parsed = parse_u32_range(&val, min, max);
    if parsed.is_none() {
        tracing::warn!(key = name, value = %val, min, max, "invalid integer env var, ignoring");
    }
    parsed
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = read_env_string(name)?;
    let parsed = parse_u64_range(&val, min, max);
    if parsed.is_none() {
        tracing::warn!(key = name, value = %val, min, max, "invalid integer env var, ignoring");
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_nested_override() {
        let target = json!({"gateway": {"baseUrl": "a", "idleTimeoutMs": 1}});
        let source = json!({"gateway": {"baseUrl": "b"}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["gateway"]["baseUrl"], "b");
        assert_eq!(merged["gateway"]["idleTimeoutMs"], 1);
    }

    #[test]
    fn merge_null_preserves_target() {
        let merged = deep_merge(json!({"a": 1}), json!({"a": null}));
        assert_eq!(merged["a"], 1);
    }

    #[test]
    fn merge_arrays_replace() {
        let merged = deep_merge(json!({"a": [1, 2, 3]}), json!({"a": [4]}));
        assert_eq!(merged["a"], json!([4]));
    }

    #[test]
    fn merge_new_keys_added() {
        let merged = deep_merge(json!({"a": 1}), json!({"b": {"c": 2}}));
        assert_eq!(merged, json!({"a": 1, "b": {"c": 2}}));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = read_file_layer(&dir.path().join("nope.json")).unwrap();
        assert_eq!(settings.orchestrator.max_iterations, 10);
        assert_eq!(settings.gateway.base_url, "http://localhost:8080/api/v1");
    }

    #[test]
    fn partial_file_overrides_only_its_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{
                "gateway": {"baseUrl": "https://gw.example/api/v1", "apiKey": "sk-file"},
                "orchestrator": {"maxIterations": 3},
                "logging": {"json": true}
            }"#,
        )
        .unwrap();

        let settings = read_file_layer(&path).unwrap();
        assert_eq!(settings.gateway.base_url, "https://gw.example/api/v1");
        assert!(settings.gateway.api_key.is_some());
        assert_eq!(settings.gateway.idle_timeout_ms, 90_000);
        assert_eq!(settings.orchestrator.max_iterations, 3);
        assert_eq!(settings.orchestrator.flush_interval_ms, 100);
        assert!(settings.logging.json);
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = read_file_layer(&path).unwrap_err();
        assert!(matches!(err, crate::SettingsError::Json(_)));
    }

    #[test]
    fn wrong_type_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"orchestrator": {"maxIterations": "many"}}"#).unwrap();
        assert!(read_file_layer(&path).is_err());
    }

    #[test]
    fn parse_bool_variants() {
        for v in ["true", "1", "YES", "On"] {
            assert_eq!(parse_bool(v), Some(true), "{v}");
        }
        for v in ["false", "0", "no", "OFF"] {
            assert_eq!(parse_bool(v), Some(false), "{v}");
        }
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
    }

    #[test]
    fn parse_u32_bounds() {
        assert_eq!(parse_u32_range("100", 1, 100), Some(100));
        assert_eq!(parse_u32_range("0", 1, 100), None);
        assert_eq!(parse_u32_range("4294967296", 1, u32::MAX), None);
        assert_eq!(parse_u32_range(" 7 ", 1, 100), Some(7));
    }

    #[test]
    fn parse_u64_bounds() {
        assert_eq!(parse_u64_range("5", 1, 100), Some(5));
        assert_eq!(parse_u64_range("1", 1, 100), Some(1));
        assert_eq!(parse_u64_range("100", 1, 100), Some(100));
        assert_eq!(parse_u64_range("0", 1, 100), None);
        assert_eq!(parse_u64_range("101", 1, 100), None);
        assert_eq!(parse_u64_range("-3", 0, 100), None);
        assert_eq!(parse_u64_range("ten", 0, 100), None);
    }
}

//! Layered settings: compiled defaults, then `~/.convo/settings.json`, then
//! `CONVO_*` environment variables, then validation.
//!
//! The file only needs the keys it changes. Nested objects merge key by key,
//! arrays and scalars replace the default outright, and `null` leaves the
//! default in place.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::ConvoSettings;

/// Resolve the convo home directory (`~/.convo`).
pub fn convo_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".convo")
}

/// Resolve the path to the settings file (`~/.convo/settings.json`).
pub fn settings_path() -> PathBuf {
    convo_home().join("settings.json")
}

/// Load `~/.convo/settings.json` with env overrides applied.
pub fn load_settings() -> Result<ConvoSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from `path` with env overrides applied.
///
/// A missing file means defaults. Unreadable or malformed files are errors,
/// and so is a merged result that fails validation.
pub fn load_settings_from_path(path: &Path) -> Result<ConvoSettings> {
    let defaults = serde_json::to_value(ConvoSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: ConvoSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Merge `source` over `target`, recursing into objects.
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

/// Apply `CONVO_*` environment variable overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut ConvoSettings) {
    apply_overrides_with(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup` instead of the process environment.
///
/// Invalid values are logged and ignored (falling back to file/default).
pub fn apply_overrides_with<F>(settings: &mut ConvoSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let string = |name: &str| lookup(name).filter(|v| !v.is_empty());
    let u64_in = |name: &str, min: u64, max: u64| {
        let val = lookup(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    };
    let usize_in = |name: &str, min: usize, max: usize| {
        let val = lookup(name)?;
        let result = parse_usize_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid usize env var, ignoring");
        }
        result
    };

    // ── Stream settings ─────────────────────────────────────────────
    if let Some(v) = u64_in("CONVO_INACTIVITY_TIMEOUT_MS", 1_000, 3_600_000) {
        settings.stream.inactivity_timeout_ms = v;
    }
    if let Some(v) = usize_in("CONVO_MAX_FRAGMENT_BYTES", 1_024, 67_108_864) {
        settings.stream.max_fragment_bytes = v;
    }
    if let Some(v) = parse_enum("CONVO_COMPLETION_MODE", string("CONVO_COMPLETION_MODE")) {
        settings.stream.completion = v;
    }

    // ── Client settings ─────────────────────────────────────────────
    if let Some(v) = string("CONVO_ENDPOINT") {
        settings.client.endpoint = v;
    }
    if let Some(v) = parse_enum("CONVO_AUTH_SCHEME", string("CONVO_AUTH_SCHEME")) {
        settings.client.auth_scheme = v;
    }
    if let Some(v) = u64_in("CONVO_CONNECT_TIMEOUT_MS", 100, 600_000) {
        settings.client.connect_timeout_ms = v;
    }
    if let Some(v) = string("CONVO_STATE_PATH") {
        settings.client.state_path = Some(v);
    }

    // ── Logging settings ────────────────────────────────────────────
    if let Some(v) = string("CONVO_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = string("CONVO_LOG_FORMAT") {
        settings.logging.format = v;
    }
}

// ── Value parsing ───────────────────────────────────────────────────────────

/// Parse a wire-named enum value (e.g. `terminalChar`, `userkey`).
fn parse_enum<T: DeserializeOwned>(name: &str, val: Option<String>) -> Option<T> {
    let val = val?;
    match serde_json::from_value(Value::String(val.clone())) {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!(key = name, value = %val, "invalid enum env var, ignoring");
            None
        }
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

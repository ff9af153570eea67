//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`AgoraSettings::default()`]
//! 2. If a settings file exists, deep-merge its values over the defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. Validate cross-field constraints

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::AgoraSettings;

/// Default settings file location (`~/.agora/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".agora").join("settings.json")
}

/// Load settings from `path` (or the default location) with env overrides.
pub fn load_settings(path: Option<&Path>) -> Result<AgoraSettings> {
    let path = path.map_or_else(settings_path, Path::to_path_buf);
    let mut settings = load_file(&path)?;
    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());
    validate(&settings)?;
    Ok(settings)
}

/// Load settings from a file without consulting the environment.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_file(path: &Path) -> Result<AgoraSettings> {
    let defaults = serde_json::to_value(AgoraSettings::default())?;

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
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
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

/// Apply environment overrides read through `lookup`.
///
/// Invalid values are logged and ignored, keeping the file/default value.
pub fn apply_env_overrides<F>(settings: &mut AgoraSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("AGORA_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u64_in("AGORA_PORT", 0, 65535) {
        settings.server.port = v as u16;
    }
    if let Some(v) = env.string("AGORA_DB_PATH") {
        settings.database.path = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("AGORA_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("AGORA_LOG_JSON") {
        settings.logging.json = v;
    }

    // ── Debate timing ───────────────────────────────────────────────
    if let Some(v) = env.u64_in("AGORA_SPEECH_TIMEOUT_SECS", 1, 86_400) {
        settings.debate.speech_timeout_secs = v;
    }
    if let Some(v) = env.u64_in("AGORA_INACTIVITY_TIMEOUT_SECS", 1, 604_800) {
        settings.debate.inactivity_timeout_secs = v;
    }
    if let Some(v) = env.u64_in("AGORA_MAX_DURATION_SECS", 1, 604_800) {
        settings.debate.max_duration_secs = v;
    }
    if let Some(v) = env.u64_in("AGORA_WAITING_TIMEOUT_SECS", 1, 604_800) {
        settings.debate.waiting_timeout_secs = v;
    }

    // ── Judge ───────────────────────────────────────────────────────
    if let Some(v) = env.bool("AGORA_JUDGE_ENABLED") {
        settings.judge.enabled = v;
    }
    if let Some(v) = env.string("AGORA_JUDGE_MODEL") {
        settings.judge.model = v;
    }
    if let Some(v) = env.string("AGORA_JUDGE_URL") {
        settings.judge.api_url = v;
    }
    if let Some(v) = env
        .string("OPENAI_API_KEY")
        .or_else(|| env.string("CHATGPT_API_KEY"))
    {
        settings.judge.api_key = Some(v);
    }
}

/// Reject combinations no session could run with.
pub fn validate(settings: &AgoraSettings) -> Result<()> {
    let debate = &settings.debate;
    if debate.min_content_length > debate.max_content_length {
        return Err(SettingsError::InvalidValue(format!(
            "debate.minContentLength ({}) exceeds debate.maxContentLength ({})",
            debate.min_content_length, debate.max_content_length
        )));
    }
    if debate.identifier_prefix_len == 0 {
        return Err(SettingsError::InvalidValue(
            "debate.identifierPrefixLen must be at least 1".into(),
        ));
    }
    if settings.server.heartbeat_miss_threshold == 0 {
        return Err(SettingsError::InvalidValue(
            "server.heartbeatMissThreshold must be at least 1".into(),
        ));
    }
    if settings.server.heartbeat_interval_secs == 0 {
        return Err(SettingsError::InvalidValue(
            "server.heartbeatIntervalSecs must be at least 1".into(),
        ));
    }
    Ok(())
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = (self.lookup)(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u64_in(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = (self.lookup)(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid integer env var, ignoring");
        }
        result
    }
}

//! Settings structures. All sections use camelCase keys and fall back to
//! compiled defaults for any missing field.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgoraSettings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub debate: DebateSettings,
    pub judge: JudgeSettings,
    pub logging: LoggingSettings,
}

/// Network listener and per-connection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port. `0` picks a free port.
    pub port: u16,
    /// Outbound frames buffered per connection before dropping.
    pub max_send_queue: usize,
    /// Interval between heartbeat probes sent to participants.
    pub heartbeat_interval_secs: u64,
    /// Unanswered probes tolerated before a participant is considered dead.
    pub heartbeat_miss_threshold: u32,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8081,
            max_send_queue: 256,
            heartbeat_interval_secs: 30,
            heartbeat_miss_threshold: 3,
        }
    }
}

impl ServerSettings {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseSettings {
    pub path: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: "./debate.db".to_string(),
        }
    }
}

/// Session timing and speech limits.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DebateSettings {
    pub speech_timeout_secs: u64,
    pub inactivity_timeout_secs: u64,
    pub max_duration_secs: u64,
    /// How long a session may sit in `waiting` before it times out.
    pub waiting_timeout_secs: u64,
    pub min_content_length: usize,
    pub max_content_length: usize,
    /// Settling delay between the second join and the session start.
    pub start_delay_ms: u64,
    /// Rounds used when a create request does not name a positive count.
    pub default_rounds: u32,
    /// Characters of the participant's unique id kept in its display identifier.
    pub identifier_prefix_len: usize,
}

impl Default for DebateSettings {
    fn default() -> Self {
        Self {
            speech_timeout_secs: 120,
            inactivity_timeout_secs: 1800,
            max_duration_secs: 3600,
            waiting_timeout_secs: 1800,
            min_content_length: 50,
            max_content_length: 2000,
            start_delay_ms: 1000,
            default_rounds: 5,
            identifier_prefix_len: 8,
        }
    }
}

/// External judge settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JudgeSettings {
    pub enabled: bool,
    pub api_url: String,
    /// Never written back out.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f64,
}

impl Default for JudgeSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: None,
            model: "gpt-4".to_string(),
            timeout_secs: 30,
            max_tokens: 1000,
            temperature: 0.7,
        }
    }
}

impl JudgeSettings {
    /// Enabled and holding a usable key.
    pub fn is_usable(&self) -> bool {
        self.enabled
            && self
                .api_key
                .as_deref()
                .is_some_and(|k| !k.is_empty() && k != "your-api-key-here")
    }
}

impl std::fmt::Debug for JudgeSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JudgeSettings")
            .field("enabled", &self.enabled)
            .field("api_url", &self.api_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive; `RUST_LOG` wins when set.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

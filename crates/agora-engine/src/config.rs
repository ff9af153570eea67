use std::time::Duration;

use agora_settings::AgoraSettings;

/// Timing and validation knobs used by the engine.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub speech_timeout: Duration,
    pub inactivity_timeout: Duration,
    pub max_duration: Duration,
    pub waiting_timeout: Duration,
    pub start_delay: Duration,
    pub min_content_length: usize,
    pub max_content_length: usize,
    pub default_rounds: u32,
    pub identifier_prefix_len: usize,
    /// Upper bound on one judge call, on top of the client's own timeout.
    pub judge_timeout: Duration,
    /// Only used to describe heartbeat endings.
    pub heartbeat_miss_threshold: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_settings(&AgoraSettings::default())
    }
}

impl EngineConfig {
    pub fn from_settings(settings: &AgoraSettings) -> Self {
        let debate = &settings.debate;
        Self {
            speech_timeout: Duration::from_secs(debate.speech_timeout_secs),
            inactivity_timeout: Duration::from_secs(debate.inactivity_timeout_secs),
            max_duration: Duration::from_secs(debate.max_duration_secs),
            waiting_timeout: Duration::from_secs(debate.waiting_timeout_secs),
            start_delay: Duration::from_millis(debate.start_delay_ms),
            min_content_length: debate.min_content_length,
            max_content_length: debate.max_content_length,
            default_rounds: debate.default_rounds.max(1),
            identifier_prefix_len: debate.identifier_prefix_len.max(1),
            judge_timeout: Duration::from_secs(settings.judge.timeout_secs.max(1)),
            heartbeat_miss_threshold: settings.server.heartbeat_miss_threshold,
        }
    }
}

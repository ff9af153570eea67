//! Debate domain types shared by the store, engine and server.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a debate session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Waiting,
    Active,
    Completed,
    Timeout,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Timeout => "timeout",
        }
    }

    /// `completed` and `timeout` accept no further mutation.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Timeout)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(Self::Waiting),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "timeout" => Ok(Self::Timeout),
            other => Err(format!("unknown session status: {other}")),
        }
    }
}

/// The stance a participant argues for the whole session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Supporting,
    Opposing,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Supporting => "supporting",
            Self::Opposing => "opposing",
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::Supporting => Self::Opposing,
            Self::Opposing => Self::Supporting,
        }
    }

    /// Capitalised label used in prompts and summaries.
    pub fn label(self) -> &'static str {
        match self {
            Self::Supporting => "Supporting",
            Self::Opposing => "Opposing",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "supporting" => Ok(Self::Supporting),
            "opposing" => Ok(Self::Opposing),
            other => Err(format!("unknown side: {other}")),
        }
    }
}

/// Outcome of a finished debate. `None` means no verdict was possible.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    Supporting,
    Opposing,
    Draw,
    None,
}

impl Winner {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Supporting => "supporting",
            Self::Opposing => "opposing",
            Self::Draw => "draw",
            Self::None => "none",
        }
    }
}

impl fmt::Display for Winner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Winner {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "supporting" => Ok(Self::Supporting),
            "opposing" => Ok(Self::Opposing),
            "draw" => Ok(Self::Draw),
            "none" => Ok(Self::None),
            other => Err(format!("unknown winner: {other}")),
        }
    }
}

/// Why a participant's connection went away.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisconnectCause {
    ConnectionLost,
    HeartbeatTimeout,
}

impl DisconnectCause {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConnectionLost => "connection_lost",
            Self::HeartbeatTimeout => "heartbeat_timeout",
        }
    }
}

/// Cause of a terminal transition. Rendered into the result's `reason` code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EndReason {
    Completed,
    SpeechTimeout,
    InactivityTimeout,
    MaxDurationTimeout,
    ServerRestart,
    Disconnected {
        identifier: String,
        cause: DisconnectCause,
    },
}

impl EndReason {
    /// Wire code, e.g. `speech_timeout` or `heartbeat_timeout_alpha-1234abcd`.
    pub fn code(&self) -> String {
        match self {
            Self::Completed => "completed".into(),
            Self::SpeechTimeout => "speech_timeout".into(),
            Self::InactivityTimeout => "inactivity_timeout".into(),
            Self::MaxDurationTimeout => "max_duration_timeout".into(),
            Self::ServerRestart => "server_restart".into(),
            Self::Disconnected { identifier, cause } => {
                format!("{}_{}", cause.as_str(), identifier)
            }
        }
    }

    /// Bounded label for metrics (no participant identifiers).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::SpeechTimeout => "speech_timeout",
            Self::InactivityTimeout => "inactivity_timeout",
            Self::MaxDurationTimeout => "max_duration_timeout",
            Self::ServerRestart => "server_restart",
            Self::Disconnected { cause, .. } => cause.as_str(),
        }
    }

    /// Terminal status this reason leads to.
    pub fn status(&self) -> SessionStatus {
        match self {
            Self::Completed => SessionStatus::Completed,
            _ => SessionStatus::Timeout,
        }
    }
}

/// Speech body as submitted by a participant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechMessage {
    #[serde(default = "default_format")]
    pub format: String,
    pub content: String,
}

fn default_format() -> String {
    "markdown".into()
}

impl SpeechMessage {
    pub fn markdown(content: impl Into<String>) -> Self {
        Self {
            format: default_format(),
            content: content.into(),
        }
    }
}

/// One accepted speech. Transcripts are append-only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub round: u32,
    pub speaker: String,
    pub side: Side,
    pub timestamp: String,
    pub message: SpeechMessage,
}

/// Final verdict of a session, written once.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebateResult {
    pub winner: Winner,
    pub supporting_score: u32,
    pub opposing_score: u32,
    pub summary: SpeechMessage,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrip_and_terminal() {
        for s in [
            SessionStatus::Waiting,
            SessionStatus::Active,
            SessionStatus::Completed,
            SessionStatus::Timeout,
        ] {
            assert_eq!(s.as_str().parse::<SessionStatus>().unwrap(), s);
        }
        assert!(!SessionStatus::Waiting.is_terminal());
        assert!(!SessionStatus::Active.is_terminal());
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Timeout.is_terminal());
        assert!("error".parse::<SessionStatus>().is_err());
    }

    #[test]
    fn side_opposite() {
        assert_eq!(Side::Supporting.opposite(), Side::Opposing);
        assert_eq!(Side::Opposing.opposite(), Side::Supporting);
    }

    #[test]
    fn end_reason_codes() {
        assert_eq!(EndReason::Completed.code(), "completed");
        assert_eq!(EndReason::SpeechTimeout.code(), "speech_timeout");
        let r = EndReason::Disconnected {
            identifier: "alpha-1234abcd".into(),
            cause: DisconnectCause::HeartbeatTimeout,
        };
        assert_eq!(r.code(), "heartbeat_timeout_alpha-1234abcd");
        assert_eq!(r.kind(), "heartbeat_timeout");
        assert_eq!(r.status(), SessionStatus::Timeout);
        assert_eq!(EndReason::Completed.status(), SessionStatus::Completed);
    }

    #[test]
    fn speech_message_defaults_format() {
        let msg: SpeechMessage = serde_json::from_str(r#"{"content":"hi"}"#).unwrap();
        assert_eq!(msg.format, "markdown");
    }

    #[test]
    fn result_serializes_lowercase_winner() {
        let result = DebateResult {
            winner: Winner::None,
            supporting_score: 50,
            opposing_score: 50,
            summary: SpeechMessage::markdown("x"),
            reason: "speech_timeout".into(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["winner"], "none");
        assert_eq!(json["reason"], "speech_timeout");
    }
}

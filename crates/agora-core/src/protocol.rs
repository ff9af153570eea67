//! Wire protocol for participant and observer connections.
//!
//! Every frame is an envelope `{"type", "timestamp", "data"}`. Inbound frames
//! are decoded into [`ClientMessage`]; unknown types decode to
//! [`ClientMessage::Unknown`] so callers can log and ignore them. Outbound
//! frames are [`ServerMessage`] variants encoded with a fresh timestamp.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::debate::{DebateResult, Side, SpeechMessage, TranscriptEntry};
use crate::errors::{ClientError, LoginRejection};

/// RFC 3339 timestamp used in envelopes and transcript entries.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Failure to decode an inbound frame.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed envelope: {0}")]
    Envelope(String),
    #[error("invalid {kind} payload: {detail}")]
    Payload { kind: String, detail: String },
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, alias = "payload")]
    data: Value,
}

// ── Inbound payloads ────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub bot_name: String,
    pub bot_uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debate_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebateSpeech {
    pub debate_id: String,
    pub debate_key: String,
    pub speaker: String,
    pub message: SpeechMessage,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeDebate {
    pub debate_id: String,
}

/// A decoded inbound frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientMessage {
    Login(LoginRequest),
    Speech(DebateSpeech),
    Subscribe(SubscribeDebate),
    Ping,
    Pong,
    Unknown(String),
}

impl ClientMessage {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let raw: RawEnvelope =
            serde_json::from_str(text).map_err(|e| ProtocolError::Envelope(e.to_string()))?;

        fn payload<T: serde::de::DeserializeOwned>(
            kind: &str,
            data: Value,
        ) -> Result<T, ProtocolError> {
            serde_json::from_value(data).map_err(|e| ProtocolError::Payload {
                kind: kind.to_string(),
                detail: e.to_string(),
            })
        }

        Ok(match raw.kind.as_str() {
            "login" | "bot_login" => Self::Login(payload(&raw.kind, raw.data)?),
            "debate_speech" => Self::Speech(payload(&raw.kind, raw.data)?),
            "subscribe_debate" => Self::Subscribe(payload(&raw.kind, raw.data)?),
            "ping" => Self::Ping,
            "pong" => Self::Pong,
            _ => Self::Unknown(raw.kind),
        })
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::Login(_) => "login",
            Self::Speech(_) => "debate_speech",
            Self::Subscribe(_) => "subscribe_debate",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Unknown(kind) => kind,
        }
    }
}

// ── Outbound payloads ───────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginConfirmed {
    pub status: String,
    pub message: String,
    pub debate_id: String,
    pub debate_key: String,
    pub bot_identifier: String,
    pub topic: String,
    pub joined_bots: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRejected {
    pub status: String,
    pub reason: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debate_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u32>,
}

impl From<&LoginRejection> for LoginRejected {
    fn from(r: &LoginRejection) -> Self {
        Self {
            status: "rejected".into(),
            reason: r.reason.as_str().into(),
            message: r.message.clone(),
            debate_id: r.debate_id.clone(),
            retry_after: r.retry_after,
        }
    }
}

/// Session context pushed at start and after every accepted speech.
///
/// `your_side`/`your_identifier` are set only for participant recipients;
/// `debate_log` is absent on `debate_start`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnState {
    pub debate_id: String,
    pub topic: String,
    pub supporting_side: String,
    pub opposing_side: String,
    pub total_rounds: u32,
    pub current_round: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub your_side: Option<Side>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub your_identifier: Option<String>,
    pub next_speaker: String,
    pub timeout_seconds: u64,
    pub min_content_length: usize,
    pub max_content_length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debate_log: Option<Vec<TranscriptEntry>>,
}

impl TurnState {
    /// Personalise a shared state for one participant.
    pub fn for_participant(&self, side: Side, identifier: &str) -> Self {
        Self {
            your_side: Some(side),
            your_identifier: Some(identifier.to_string()),
            ..self.clone()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebateEnd {
    pub debate_id: String,
    pub topic: String,
    pub supporting_side: String,
    pub opposing_side: String,
    pub total_rounds: u32,
    pub status: String,
    pub debate_log: Vec<TranscriptEntry>,
    pub debate_result: DebateResult,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebateWaiting {
    pub debate_id: String,
    pub topic: String,
    pub total_rounds: u32,
    pub status: String,
    pub joined_bots: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub server_time: String,
}

impl Heartbeat {
    pub fn now() -> Self {
        Self {
            server_time: now_rfc3339(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error_code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debate_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub recoverable: bool,
}

impl ErrorPayload {
    pub fn from_error(err: &ClientError, debate_id: Option<&str>) -> Self {
        Self {
            error_code: err.code.as_str().into(),
            message: err.message.clone(),
            debate_id: debate_id.map(str::to_string),
            details: None,
            recoverable: err.recoverable,
        }
    }
}

/// An outbound frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    LoginConfirmed(LoginConfirmed),
    LoginRejected(LoginRejected),
    DebateStart(TurnState),
    DebateUpdate(TurnState),
    DebateEnd(DebateEnd),
    DebateWaiting(DebateWaiting),
    Ping(Heartbeat),
    Pong(Heartbeat),
    Error(ErrorPayload),
}

impl ServerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LoginConfirmed(_) => "login_confirmed",
            Self::LoginRejected(_) => "login_rejected",
            Self::DebateStart(_) => "debate_start",
            Self::DebateUpdate(_) => "debate_update",
            Self::DebateEnd(_) => "debate_end",
            Self::DebateWaiting(_) => "debate_waiting",
            Self::Ping(_) => "ping",
            Self::Pong(_) => "pong",
            Self::Error(_) => "error",
        }
    }

    /// Encode as an envelope stamped with the current time.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut value {
            let _ = map.insert("timestamp".into(), Value::String(now_rfc3339()));
        }
        serde_json::to_string(&value)
    }

    pub fn error(err: &ClientError, debate_id: Option<&str>) -> Self {
        Self::Error(ErrorPayload::from_error(err, debate_id))
    }
}

//! Shared vocabulary for the debate orchestrator: ids, domain enums,
//! transcript and result records, refusal types, and the wire protocol.

pub mod debate;
pub mod errors;
pub mod ids;
pub mod protocol;

pub use debate::{
    DebateResult, DisconnectCause, EndReason, SessionStatus, Side, SpeechMessage, TranscriptEntry,
    Winner,
};
pub use errors::{ClientError, ErrorCode, LoginRejection, RejectReason};
pub use ids::{ConnectionId, SessionId};

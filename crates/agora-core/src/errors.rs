use std::fmt;

/// Why a login was refused. Serialized as the `reason` of `login_rejected`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    NoAvailableDebate,
    DebateNotFound,
    DebateNotReady,
    DebateFull,
    DuplicateIdentifier,
    InternalError,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoAvailableDebate => "no_available_debate",
            Self::DebateNotFound => "debate_not_found",
            Self::DebateNotReady => "debate_not_ready",
            Self::DebateFull => "debate_full",
            Self::DuplicateIdentifier => "duplicate_identifier",
            Self::InternalError => "internal_error",
        }
    }
}

/// A refused login. Not an error of the caller; it may retry.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("login rejected ({}): {message}", reason.as_str())]
pub struct LoginRejection {
    pub reason: RejectReason,
    pub message: String,
    pub debate_id: Option<String>,
    pub retry_after: Option<u32>,
}

impl LoginRejection {
    pub fn new(reason: RejectReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
            debate_id: None,
            retry_after: None,
        }
    }

    pub fn for_debate(mut self, debate_id: impl Into<String>) -> Self {
        self.debate_id = Some(debate_id.into());
        self
    }

    pub fn retry_after(mut self, secs: u32) -> Self {
        self.retry_after = Some(secs);
        self
    }
}

/// Codes carried by `error` frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidMessageType,
    InvalidMessageFormat,
    DebateNotFound,
    DebateNotActive,
    InvalidDebateKey,
    NotYourTurn,
    ContentTooShort,
    ContentTooLong,
    WaitingTimeout,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidMessageType => "INVALID_MESSAGE_TYPE",
            Self::InvalidMessageFormat => "INVALID_MESSAGE_FORMAT",
            Self::DebateNotFound => "DEBATE_NOT_FOUND",
            Self::DebateNotActive => "DEBATE_NOT_ACTIVE",
            Self::InvalidDebateKey => "INVALID_DEBATE_KEY",
            Self::NotYourTurn => "NOT_YOUR_TURN",
            Self::ContentTooShort => "CONTENT_TOO_SHORT",
            Self::ContentTooLong => "CONTENT_TOO_LONG",
            Self::WaitingTimeout => "WAITING_TIMEOUT",
        }
    }

    /// Whether the sender may fix the frame and resubmit.
    pub fn default_recoverable(self) -> bool {
        matches!(
            self,
            Self::InvalidMessageFormat
                | Self::NotYourTurn
                | Self::ContentTooShort
                | Self::ContentTooLong
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validation failure reported to the originating connection only.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ClientError {
    pub code: ErrorCode,
    pub message: String,
    pub recoverable: bool,
}

impl ClientError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            recoverable: code.default_recoverable(),
        }
    }

    pub fn recoverable(mut self, recoverable: bool) -> Self {
        self.recoverable = recoverable;
        self
    }
}

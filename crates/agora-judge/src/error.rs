/// Failure of an external judge call. Never surfaced to participants; the
/// result synthesizer falls back to local scoring on any of these.
#[derive(Debug, thiserror::Error)]
pub enum JudgeError {
    #[error("judge not configured: {0}")]
    NotConfigured(String),

    #[error("judge returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("judge call timed out")]
    Timeout,

    #[error("judge returned no choices")]
    EmptyResponse,

    #[error("malformed judge response: {0}")]
    MalformedResponse(String),
}

impl JudgeError {
    /// Bounded label for logs and metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::NotConfigured(_) => "not_configured",
            Self::Http { .. } => "http",
            Self::Network(_) => "network",
            Self::Timeout => "timeout",
            Self::EmptyResponse => "empty_response",
            Self::MalformedResponse(_) => "malformed_response",
        }
    }
}

impl From<reqwest::Error> for JudgeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::MalformedResponse(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

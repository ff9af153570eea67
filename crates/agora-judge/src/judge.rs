use async_trait::async_trait;

use agora_core::{TranscriptEntry, Winner};

use crate::error::JudgeError;

/// Everything a judge needs, copied out of the session before the call.
#[derive(Clone, Debug)]
pub struct JudgeRequest {
    pub topic: String,
    pub supporting: String,
    pub opposing: String,
    pub transcript: Vec<TranscriptEntry>,
}

/// A validated verdict: winner is never `None` and scores lie in 0..=100.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JudgeVerdict {
    pub winner: Winner,
    pub supporting_score: u32,
    pub opposing_score: u32,
    pub summary: String,
}

#[async_trait]
pub trait Judge: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    async fn judge(&self, request: &JudgeRequest) -> Result<JudgeVerdict, JudgeError>;
}

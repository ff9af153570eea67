use agora_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0}")]
    Internal(String),
}

impl EngineError {
    /// Missing rows surface as `SessionNotFound` instead of a store failure.
    pub(crate) fn from_lookup(id: &str, error: StoreError) -> Self {
        match error {
            StoreError::NotFound(_) => Self::SessionNotFound(id.to_string()),
            other => Self::Store(other),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DocError {
    #[error("malformed input: {0}")]
    MalformedInput(String),
    #[error("incomplete stream: {0}")]
    IncompleteStream(String),
    #[error("conversion failure: {0}")]
    ConversionFailure(String),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DocError {
    /// Storage backends surface io and serde failures; callers only care that the slot is gone.
    pub fn into_storage(self) -> DocError {
        match self {
            DocError::StorageUnavailable(_) => self,
            other => DocError::StorageUnavailable(other.to_string()),
        }
    }
}

pub type DocResult<T> = Result<T, DocError>;

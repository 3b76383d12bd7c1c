use ragcore_domain::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("version conflict on {key}: expected {expected}, found {actual}")]
    Conflict {
        key: String,
        expected: u64,
        actual: u64,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("backend error: {0}")]
    Backend(String),
}

impl KvError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            KvError::NotFound(_) => ErrorKind::NotFound,
            KvError::Conflict { .. } => ErrorKind::Conflict,
            KvError::Serialization(_) => ErrorKind::InvalidInput,
            KvError::Backend(_) => ErrorKind::Internal,
        }
    }
}

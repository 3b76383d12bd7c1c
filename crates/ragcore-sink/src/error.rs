use ragcore_domain::ErrorKind;
use ragcore_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink not configured: {0}")]
    NotConfigured(String),

    #[error("writeBatch called before begin")]
    NotBegun,

    #[error("commit called more than once")]
    AlreadyCommitted,

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid batch: {0}")]
    Invalid(String),
}

impl SinkError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SinkError::NotConfigured(_) => ErrorKind::NotFound,
            SinkError::NotBegun | SinkError::AlreadyCommitted | SinkError::Invalid(_) => {
                ErrorKind::InvalidInput
            }
            SinkError::Store(e) => e.kind(),
        }
    }
}

use ragcore_domain::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("backend error: {0}")]
    Backend(String),
}

impl BlobError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BlobError::NotFound(_) => ErrorKind::NotFound,
            BlobError::Io(_) | BlobError::Backend(_) => ErrorKind::Internal,
        }
    }
}

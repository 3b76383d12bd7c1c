use ragcore_domain::ErrorKind;
use ragcore_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphRagError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("tenant mismatch")]
    TenantMismatch,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("llm provider error: {0}")]
    Llm(#[from] ragcore_ner::NerError),
}

impl GraphRagError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GraphRagError::InvalidInput(_) => ErrorKind::InvalidInput,
            GraphRagError::TenantMismatch => ErrorKind::TenantMismatch,
            GraphRagError::Store(e) => e.kind(),
            GraphRagError::Llm(e) => e.kind(),
        }
    }
}

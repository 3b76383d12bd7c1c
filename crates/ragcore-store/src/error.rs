use ragcore_domain::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("cross-scope edge: source org '{source_org}' != target org '{target_org}'")]
    CrossScopeEdge {
        source_org: String,
        target_org: String,
    },

    #[error("tenant mismatch")]
    TenantMismatch,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("version conflict on {0}")]
    Conflict(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::CrossScopeEdge { .. } | StoreError::TenantMismatch => {
                ErrorKind::TenantMismatch
            }
            StoreError::Serialization(_) => ErrorKind::InvalidInput,
            StoreError::Conflict(_) => ErrorKind::Conflict,
            StoreError::Backend(_) => ErrorKind::Internal,
        }
    }
}

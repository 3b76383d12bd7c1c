use thiserror::Error;

/// The cross-cutting error taxonomy every crate-local error classifies itself into.
///
/// `ragcore-api` uses `kind()` to map any error reaching the control-plane boundary to an HTTP
/// status; nothing below that boundary needs to know about HTTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    PermissionDenied,
    TenantMismatch,
    AlreadyExists,
    Conflict,
    RateLimited,
    UpstreamUnavailable,
    RetriableTransport,
    Internal,
}

impl ErrorKind {
    pub fn is_retriable(self) -> bool {
        matches!(self, ErrorKind::RetriableTransport | ErrorKind::RateLimited)
    }
}

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid scope: {0}")]
    InvalidScope(String),

    #[error("invalid entity type '{0}'")]
    InvalidEntityType(String),

    #[error("cross-scope edge: source org '{source_org}' != target org '{target_org}'")]
    CrossScopeEdge {
        source_org: String,
        target_org: String,
    },

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl DomainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::InvalidScope(_) => ErrorKind::InvalidInput,
            DomainError::InvalidEntityType(_) => ErrorKind::InvalidInput,
            DomainError::CrossScopeEdge { .. } => ErrorKind::TenantMismatch,
            DomainError::InvalidConfig(_) => ErrorKind::InvalidInput,
        }
    }
}

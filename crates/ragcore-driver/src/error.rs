use ragcore_domain::{DriverId, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("driver not configured: {0}")]
    DriverNotConfigured(DriverId),

    #[error("driver unavailable: {0}")]
    Unavailable(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("retriable transport error: {0}")]
    RetriableTransport(String),

    #[error("invalid driver input: {0}")]
    Invalid(String),

    #[error("internal driver error: {0}")]
    Internal(String),
}

impl DriverError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DriverError::DriverNotConfigured(_) => ErrorKind::NotFound,
            DriverError::Unavailable(_) => ErrorKind::UpstreamUnavailable,
            DriverError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            DriverError::NotFound(_) => ErrorKind::NotFound,
            DriverError::RateLimited(_) => ErrorKind::RateLimited,
            DriverError::RetriableTransport(_) => ErrorKind::RetriableTransport,
            DriverError::Invalid(_) => ErrorKind::InvalidInput,
            DriverError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Maps an outbound HTTP status the way every driver implementation should, per §7.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => DriverError::PermissionDenied(message),
            404 => DriverError::NotFound(message),
            429 => DriverError::RateLimited(message),
            500..=599 => DriverError::RetriableTransport(message),
            _ => DriverError::Internal(message),
        }
    }
}

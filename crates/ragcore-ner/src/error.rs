use ragcore_domain::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NerError {
    #[error("llm provider error: {0}")]
    Llm(String),

    #[error("invalid input: {0}")]
    Invalid(String),

    /// Deliberately carries no context: observer lookups across tenants must not leak whether a
    /// record exists, so a wrong tenant and a missing id return the exact same error.
    #[error("not found")]
    NotFound,

    #[error("provider not configured: {0}")]
    ProviderNotConfigured(String),
}

impl NerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NerError::Llm(_) => ErrorKind::UpstreamUnavailable,
            NerError::Invalid(_) => ErrorKind::InvalidInput,
            NerError::NotFound => ErrorKind::NotFound,
            NerError::ProviderNotConfigured(_) => ErrorKind::NotFound,
        }
    }
}

use ragcore_domain::ErrorKind;
use ragcore_driver::DriverError;
use ragcore_kv::KvError;
use ragcore_sink::SinkError;
use ragcore_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("endpoint/unit not configured: {0}")]
    NotConfigured(String),

    #[error("unit is already running")]
    AlreadyRunning,

    #[error("sink not specified for unit")]
    MissingSink,

    #[error("staging provider not specified for unit")]
    MissingStagingProvider,

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("kv error: {0}")]
    Kv(#[from] KvError),

    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("sink error: {0}")]
    Sink(#[from] SinkError),
}

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::NotConfigured(_) => ErrorKind::NotFound,
            IngestError::AlreadyRunning => ErrorKind::Conflict,
            IngestError::MissingSink => ErrorKind::InvalidInput,
            IngestError::MissingStagingProvider => ErrorKind::InvalidInput,
            IngestError::InvalidConfig(_) => ErrorKind::InvalidInput,
            IngestError::Store(e) => e.kind(),
            IngestError::Kv(e) => e.kind(),
            IngestError::Driver(e) => e.kind(),
            IngestError::Sink(e) => e.kind(),
        }
    }

    /// Terminal-error message recorded on the run: the top-level message only, never a chained
    /// cause or stack trace.
    pub fn sanitized_message(&self) -> String {
        self.to_string()
    }
}

pub mod demo;
pub mod driver;
pub mod error;
pub mod http;
pub mod record;
pub mod registry;

pub use demo::DemoDriver;
pub use driver::Driver;
pub use error::DriverError;
pub use http::HttpDriver;
pub use record::{EdgeSpec, NormalizedRecord, Provenance, SyncBatch, SyncIssue, SyncOutcome};
pub use registry::DriverRegistry;

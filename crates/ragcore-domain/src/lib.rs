pub mod error;
pub mod logical_key;
pub mod types;

pub use error::{DomainError, ErrorKind};
pub use logical_key::{edge_logical_key, node_logical_key, stable_stringify};
pub use types::*;

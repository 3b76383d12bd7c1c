pub mod error;
pub mod filter;
pub mod memory;
pub mod metadata_store;
pub mod graph_store;
pub mod postgres_store;

pub use error::StoreError;
pub use filter::{Direction, EdgeFilter, NodeFilter};
pub use graph_store::{EdgeUpsert, GraphStore, NodeUpsert};
pub use memory::InMemoryStore;
pub use metadata_store::MetadataStore;
pub use postgres_store::PostgresStore;

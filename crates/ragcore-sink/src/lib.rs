pub mod error;
pub mod graph_sink;
pub mod registry;
pub mod sink;

pub use error::SinkError;
pub use graph_sink::GraphSink;
pub use registry::SinkRegistry;
pub use sink::{Sink, SinkCtx, WriteStats};

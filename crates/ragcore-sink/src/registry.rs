use std::collections::HashMap;
use std::sync::Arc;

use ragcore_domain::SinkId;

use crate::error::SinkError;
use crate::sink::Sink;

/// Lookup of sinks by sink id (C6). The default sink (id `"graph"`) is the graph store sink; the
/// registry just resolves ids the same way `DriverRegistry` resolves driver ids.
#[derive(Default)]
pub struct SinkRegistry {
    sinks: HashMap<SinkId, Arc<dyn Sink>>,
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: SinkId, sink: Arc<dyn Sink>) -> &mut Self {
        self.sinks.insert(id, sink);
        self
    }

    pub fn for_id(&self, id: &SinkId) -> Result<Arc<dyn Sink>, SinkError> {
        self.sinks
            .get(id)
            .cloned()
            .ok_or_else(|| SinkError::NotConfigured(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph_sink::GraphSink;
    use ragcore_store::InMemoryStore;

    #[test]
    fn unregistered_sink_id_is_not_configured() {
        let registry = SinkRegistry::new();
        assert!(registry.for_id(&SinkId::new("graph")).is_err());
    }

    #[test]
    fn registered_sink_resolves_by_id() {
        let mut registry = SinkRegistry::new();
        registry.register(
            SinkId::new("graph"),
            Arc::new(GraphSink::new(Arc::new(InMemoryStore::new()))),
        );
        assert!(registry.for_id(&SinkId::new("graph")).is_ok());
    }
}

use std::sync::Arc;

use ragcore_graphrag::GraphRagService;
use ragcore_ingest::IngestionEngine;
use ragcore_store::{GraphStore, MetadataStore};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MetadataStore>,
    pub graph_store: Arc<dyn GraphStore>,
    pub engine: Arc<IngestionEngine>,
    pub graphrag: Arc<GraphRagService>,
    pub auth_token: Arc<String>,
}

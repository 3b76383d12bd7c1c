use std::collections::HashMap;

use async_trait::async_trait;
use ragcore_domain::{EndpointId, GraphEdge, GraphNode, NodeId, Scope};
use serde_json::Value;

use crate::error::StoreError;
use crate::filter::{Direction, EdgeFilter, NodeFilter};

/// Input to `upsertNode`. Locate-then-merge semantics live in the implementation (§4.2).
#[derive(Debug, Clone)]
pub struct NodeUpsert {
    pub id: Option<NodeId>,
    pub tenant_id: String,
    pub project_id: Option<String>,
    pub entity_type: String,
    pub display_name: String,
    pub canonical_path: Option<String>,
    pub source_system: Option<String>,
    pub spec_ref: Option<String>,
    pub properties: HashMap<String, Value>,
    pub scope: Scope,
    pub origin_endpoint_id: Option<EndpointId>,
    pub origin_vendor: Option<String>,
    pub external_id: HashMap<String, Value>,
    pub phase: Option<String>,
    pub provenance: HashMap<String, Value>,
    /// Disambiguates records with no `external_id` (§4.2's `fallbackId` logical-key component).
    /// Two distinct no-id records of the same type/scope/origin would otherwise hash to the same
    /// logical key and merge into one node.
    pub fallback_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EdgeUpsert {
    pub id: Option<ragcore_domain::EdgeId>,
    pub tenant_id: String,
    pub project_id: Option<String>,
    pub edge_type: String,
    pub source_node_id: NodeId,
    pub target_node_id: NodeId,
    pub scope: Scope,
    pub confidence: Option<f64>,
    pub metadata: HashMap<String, Value>,
    pub origin_endpoint_id: Option<EndpointId>,
    pub origin_vendor: Option<String>,
}

/// Tenant-scoped node/edge store with a deterministic identity layer and an embedding index (C4).
#[async_trait]
pub trait GraphStore: Send + Sync + 'static {
    async fn upsert_node(&self, input: NodeUpsert) -> Result<GraphNode, StoreError>;

    async fn get_node(&self, org_id: &str, id: &NodeId) -> Result<Option<GraphNode>, StoreError>;

    async fn get_node_by_logical_key(
        &self,
        org_id: &str,
        logical_key: &str,
    ) -> Result<Option<GraphNode>, StoreError>;

    async fn upsert_edge(&self, input: EdgeUpsert) -> Result<GraphEdge, StoreError>;

    async fn list_nodes(&self, org_id: &str, filter: NodeFilter) -> Result<Vec<GraphNode>, StoreError>;

    async fn list_edges(&self, org_id: &str, filter: EdgeFilter) -> Result<Vec<GraphEdge>, StoreError>;

    /// Neighbors of `node_id` via edges matching `edge_types` (empty = any) in `direction`,
    /// capped at `per_node_limit`. Used by the graph expander's BFS.
    async fn neighbors(
        &self,
        org_id: &str,
        node_id: &NodeId,
        edge_types: &[String],
        direction: Direction,
        per_node_limit: usize,
    ) -> Result<Vec<(GraphEdge, NodeId)>, StoreError>;

    async fn put_embedding(
        &self,
        org_id: &str,
        entity_id: &NodeId,
        vector: Vec<f32>,
        model_id: &str,
    ) -> Result<(), StoreError>;

    /// Cosine similarity search over the model-filtered subset, descending by score, ties broken
    /// by more-recent `createdAt`.
    async fn search_embeddings(
        &self,
        org_id: &str,
        query: &[f32],
        limit: usize,
        model_id: Option<&str>,
    ) -> Result<Vec<(NodeId, f32)>, StoreError>;
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_have_similarity_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_have_similarity_zero() {
        assert!((cosine_similarity(&[1.0, 0.0], &[0.0, 1.0])).abs() < 1e-6);
    }
}

use std::collections::HashSet;
use std::sync::Arc;

use ragcore_domain::GraphNode;
use ragcore_store::{cosine_similarity, GraphStore, NodeFilter};

use crate::error::GraphRagError;

#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub project_id: Option<String>,
    pub profile_ids: Vec<String>,
    pub entity_kinds: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub tenant_id: String,
    pub query: String,
    pub embedding: Option<Vec<f32>>,
    pub filter: SearchFilter,
    pub vector_weight: f64,
    pub keyword_weight: f64,
    pub min_score: f64,
    pub top_k: usize,
}

impl SearchRequest {
    pub fn new(tenant_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            query: query.into(),
            embedding: None,
            filter: SearchFilter::default(),
            vector_weight: 0.5,
            keyword_weight: 0.5,
            min_score: 0.0,
            top_k: 10,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchHit {
    pub node_id: ragcore_domain::NodeId,
    pub score: f64,
}

/// Combines vector (cosine) and keyword search with reciprocal-rank fusion (§4.5).
pub struct HybridSearcher {
    store: Arc<dyn GraphStore>,
    embedding_model_id: String,
}

const RRF_K: f64 = 60.0;

impl HybridSearcher {
    pub fn new(store: Arc<dyn GraphStore>, embedding_model_id: impl Into<String>) -> Self {
        Self {
            store,
            embedding_model_id: embedding_model_id.into(),
        }
    }

    pub async fn search(&self, req: &SearchRequest) -> Result<Vec<SearchHit>, GraphRagError> {
        let keyword_ranked = self.keyword_search(req).await?;

        let vector_ranked = match &req.embedding {
            Some(vector) => self.vector_search(req, vector).await?,
            None => Vec::new(),
        };

        let fused = fuse(&vector_ranked, &keyword_ranked, req.vector_weight, req.keyword_weight);

        let mut hits: Vec<SearchHit> = fused
            .into_iter()
            .filter(|(_, score)| *score >= req.min_score)
            .map(|(node_id, score)| SearchHit { node_id, score })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        hits.truncate(req.top_k);
        Ok(hits)
    }

    /// Nodes in scope for `req`: entity-kind filtering delegates to the store, `projectId` and
    /// `profileIds` are applied here since neither leg's store call carries them.
    async fn filtered_nodes(&self, req: &SearchRequest) -> Result<Vec<GraphNode>, GraphRagError> {
        let filter = NodeFilter {
            entity_types: req.filter.entity_kinds.clone(),
            neighbor_of: None,
            limit: 0,
        };
        let nodes = self.store.list_nodes(&req.tenant_id, filter).await?;
        Ok(nodes
            .into_iter()
            .filter(|n| match &req.filter.project_id {
                Some(p) => n.project_id.as_deref() == Some(p.as_str()),
                None => true,
            })
            .filter(|n| node_matches_profiles(n, &req.filter.profile_ids))
            .collect())
    }

    async fn keyword_search(
        &self,
        req: &SearchRequest,
    ) -> Result<Vec<ragcore_domain::NodeId>, GraphRagError> {
        let nodes = self.filtered_nodes(req).await?;
        let needle = req.query.to_lowercase();

        let mut matches: Vec<(ragcore_domain::NodeId, usize)> = nodes
            .into_iter()
            .filter_map(|n| {
                let haystack = n.display_name.to_lowercase();
                haystack.contains(&needle).then(|| {
                    let rank_key = haystack.matches(&needle).count();
                    (n.id.clone(), rank_key)
                })
            })
            .collect();
        matches.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(matches.into_iter().map(|(id, _)| id).collect())
    }

    async fn vector_search(
        &self,
        req: &SearchRequest,
        query: &[f32],
    ) -> Result<Vec<ragcore_domain::NodeId>, GraphRagError> {
        let allowed: HashSet<ragcore_domain::NodeId> = self
            .filtered_nodes(req)
            .await?
            .into_iter()
            .map(|n| n.id)
            .collect();
        let results = self
            .store
            .search_embeddings(&req.tenant_id, query, 100, Some(&self.embedding_model_id))
            .await?;
        Ok(results
            .into_iter()
            .map(|(id, _)| id)
            .filter(|id| allowed.contains(id))
            .collect())
    }
}

/// A node matches when `profile_ids` is empty (no filter requested) or its `profileId` property
/// is one of the requested ids. Nodes with no `profileId` property never match a non-empty filter.
fn node_matches_profiles(node: &GraphNode, profile_ids: &[String]) -> bool {
    if profile_ids.is_empty() {
        return true;
    }
    node.properties
        .get("profileId")
        .and_then(|v| v.as_str())
        .map(|p| profile_ids.iter().any(|id| id == p))
        .unwrap_or(false)
}

/// Reciprocal-rank fusion: `score(node) = sum(weight / (RRF_K + rank))` over each leg where the
/// node appears. A leg with zero entries contributes nothing, so an empty vector search collapses
/// fusion to keyword-only.
fn fuse(
    vector_ranked: &[ragcore_domain::NodeId],
    keyword_ranked: &[ragcore_domain::NodeId],
    vector_weight: f64,
    keyword_weight: f64,
) -> Vec<(ragcore_domain::NodeId, f64)> {
    use std::collections::HashMap;

    let mut scores: HashMap<ragcore_domain::NodeId, f64> = HashMap::new();
    for (rank, id) in vector_ranked.iter().enumerate() {
        *scores.entry(id.clone()).or_insert(0.0) += vector_weight / (RRF_K + rank as f64 + 1.0);
    }
    for (rank, id) in keyword_ranked.iter().enumerate() {
        *scores.entry(id.clone()).or_insert(0.0) += keyword_weight / (RRF_K + rank as f64 + 1.0);
    }
    scores.into_iter().collect()
}

pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    cosine_similarity(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragcore_domain::{NodeId, Scope};
    use ragcore_store::{GraphStore, InMemoryStore, NodeUpsert};
    use std::collections::HashMap;

    fn node_upsert(name: &str, profile_id: &str) -> NodeUpsert {
        NodeUpsert {
            id: None,
            tenant_id: "t1".into(),
            project_id: None,
            entity_type: "doc".into(),
            display_name: name.into(),
            canonical_path: None,
            source_system: None,
            spec_ref: None,
            properties: HashMap::from([("profileId".to_string(), serde_json::json!(profile_id))]),
            scope: Scope::org("t1"),
            origin_endpoint_id: None,
            origin_vendor: None,
            external_id: HashMap::new(),
            phase: None,
            provenance: HashMap::new(),
            fallback_id: Some(name.to_string()),
        }
    }

    #[tokio::test]
    async fn keyword_search_filters_by_profile_ids() {
        let store = Arc::new(InMemoryStore::new());
        store.upsert_node(node_upsert("alpha report", "eng")).await.unwrap();
        store.upsert_node(node_upsert("alpha notes", "sales")).await.unwrap();

        let searcher = HybridSearcher::new(store, "model1");
        let mut req = SearchRequest::new("t1", "alpha");
        req.filter.profile_ids = vec!["eng".into()];

        let hits = searcher.search(&req).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn fusion_without_vector_leg_is_keyword_only() {
        let keyword = vec![NodeId::from("a".to_string()), NodeId::from("b".to_string())];
        let fused = fuse(&[], &keyword, 0.5, 0.5);
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn node_present_in_both_legs_scores_higher() {
        let a = NodeId::from("a".to_string());
        let b = NodeId::from("b".to_string());
        let vector = vec![a.clone()];
        let keyword = vec![a.clone(), b.clone()];
        let fused = fuse(&vector, &keyword, 0.5, 0.5);
        let score_a = fused.iter().find(|(id, _)| *id == a).unwrap().1;
        let score_b = fused.iter().find(|(id, _)| *id == b).unwrap().1;
        assert!(score_a > score_b);
    }
}

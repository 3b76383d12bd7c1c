use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use ragcore_domain::{GraphEdge, GraphNode, NodeId};
use ragcore_store::{Direction, GraphStore};
use tracing::warn;

use crate::communities::{Community, CommunityProvider};
use crate::error::GraphRagError;
use crate::expand::{ExpandConfig, GraphExpander};
use crate::search::{HybridSearcher, SearchRequest};

#[derive(Debug, Clone)]
pub struct ContextBuilderConfig {
    pub top_k: i64,
    pub score_threshold: f64,
    pub max_hops: i64,
    pub max_nodes_per_hop: i64,
    pub max_total_nodes: i64,
    pub edge_types: Vec<String>,
    pub include_communities: bool,
    pub max_communities: i64,
    pub include_content: bool,
    pub max_content_length: i64,
}

impl Default for ContextBuilderConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            score_threshold: 0.5,
            max_hops: 3,
            max_nodes_per_hop: 20,
            max_total_nodes: 100,
            edge_types: Vec::new(),
            include_communities: false,
            max_communities: 5,
            include_content: false,
            max_content_length: 500,
        }
    }
}

/// Replaces non-positive numeric fields with `ContextBuilderConfig::default()`'s values.
/// Booleans are left as the caller set them (§4.6: "booleans are not coerced").
fn apply_defaults(mut config: ContextBuilderConfig) -> ContextBuilderConfig {
    let defaults = ContextBuilderConfig::default();
    if config.top_k <= 0 {
        config.top_k = defaults.top_k;
    }
    if config.score_threshold <= 0.0 {
        config.score_threshold = defaults.score_threshold;
    }
    if config.max_hops <= 0 {
        config.max_hops = defaults.max_hops;
    }
    if config.max_nodes_per_hop <= 0 {
        config.max_nodes_per_hop = defaults.max_nodes_per_hop;
    }
    if config.max_total_nodes <= 0 {
        config.max_total_nodes = defaults.max_total_nodes;
    }
    if config.max_communities <= 0 {
        config.max_communities = defaults.max_communities;
    }
    if config.max_content_length <= 0 {
        config.max_content_length = defaults.max_content_length;
    }
    config
}

fn cache_key(tenant_id: &str, query: &str, config: &ContextBuilderConfig) -> String {
    let mut edge_types = config.edge_types.clone();
    edge_types.sort();
    format!(
        "{tenant_id}|{query}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}",
        config.top_k,
        config.score_threshold,
        config.max_hops,
        config.max_nodes_per_hop,
        config.max_total_nodes,
        edge_types.join(","),
        config.include_communities,
        config.max_communities,
        config.include_content,
        config.max_content_length,
    )
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RagContext {
    pub seeds: Vec<GraphNode>,
    pub expanded_nodes: Vec<GraphNode>,
    pub expanded_edges: Vec<GraphEdge>,
    pub communities: Vec<CommunitySummary>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CommunitySummary {
    pub id: String,
    pub node_ids: Vec<NodeId>,
}

impl From<Community> for CommunitySummary {
    fn from(c: Community) -> Self {
        Self {
            id: c.id,
            node_ids: c.node_ids,
        }
    }
}

struct BoundedCache {
    capacity: usize,
    order: Vec<String>,
    entries: HashMap<String, RagContext>,
}

impl BoundedCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: Vec::new(),
            entries: HashMap::new(),
        }
    }

    fn get(&self, key: &str) -> Option<RagContext> {
        self.entries.get(key).cloned()
    }

    /// Inserts a new key at the back of the eviction queue. Updating an existing key replaces its
    /// value in place without moving it in `order` (§4.6: "updates to existing keys do not rotate
    /// eviction order").
    fn insert(&mut self, key: String, value: RagContext) {
        if self.entries.contains_key(&key) {
            self.entries.insert(key, value);
            return;
        }
        if self.order.len() >= self.capacity {
            let oldest = self.order.remove(0);
            self.entries.remove(&oldest);
        }
        self.order.push(key.clone());
        self.entries.insert(key, value);
    }
}

/// Composes the hybrid searcher, graph expander, and community provider into a RAG context
/// (§4.6). Each phase is independently skippable: a failure in search or expansion or community
/// lookup is logged and the phase contributes nothing, rather than failing the whole request.
pub struct ContextBuilder {
    store: Arc<dyn GraphStore>,
    searcher: Arc<HybridSearcher>,
    expander: Arc<GraphExpander>,
    community_provider: Option<Arc<dyn CommunityProvider>>,
    cache: RwLock<BoundedCache>,
}

impl ContextBuilder {
    pub fn new(
        store: Arc<dyn GraphStore>,
        searcher: Arc<HybridSearcher>,
        expander: Arc<GraphExpander>,
        community_provider: Option<Arc<dyn CommunityProvider>>,
        cache_capacity: usize,
    ) -> Self {
        Self {
            store,
            searcher,
            expander,
            community_provider,
            cache: RwLock::new(BoundedCache::new(cache_capacity)),
        }
    }

    pub async fn build(
        &self,
        tenant_id: &str,
        query: &str,
        embedding: Option<Vec<f32>>,
        config: ContextBuilderConfig,
    ) -> RagContext {
        let config = apply_defaults(config);
        let key = cache_key(tenant_id, query, &config);

        if let Some(cached) = self.cache.read().unwrap().get(&key) {
            return cached;
        }

        let mut search_req = SearchRequest::new(tenant_id, query);
        search_req.embedding = embedding;
        search_req.top_k = config.top_k as usize;
        search_req.min_score = config.score_threshold;

        let seeds = match self.searcher.search(&search_req).await {
            Ok(hits) => self.resolve_seed_nodes(tenant_id, &hits).await,
            Err(e) => {
                warn!(error = %e, "seed search failed, continuing with empty seeds");
                Vec::new()
            }
        };

        let seed_ids: Vec<NodeId> = seeds.iter().map(|n| n.id.clone()).collect();
        let (expanded_nodes, expanded_edges) = if !seed_ids.is_empty() {
            let expand_config = ExpandConfig {
                edge_types: config.edge_types.clone(),
                direction: Direction::Both,
                max_hops: config.max_hops as usize,
                max_nodes_per_hop: config.max_nodes_per_hop as usize,
                max_total_nodes: config.max_total_nodes as usize,
                per_node_limit: config.max_nodes_per_hop as usize,
            };
            match self.expander.expand(tenant_id, &seed_ids, &expand_config).await {
                Ok(result) => (result.nodes, result.edges),
                Err(e) => {
                    warn!(error = %e, "graph expansion failed, continuing without it");
                    (Vec::new(), Vec::new())
                }
            }
        } else {
            (Vec::new(), Vec::new())
        };

        let communities = if config.include_communities {
            let mut covered: Vec<NodeId> = seed_ids.clone();
            covered.extend(expanded_nodes.iter().map(|n| n.id.clone()));
            match &self.community_provider {
                Some(provider) => {
                    match provider
                        .get_communities(tenant_id, &covered, config.max_communities as usize)
                        .await
                    {
                        Ok(cs) => cs.into_iter().map(CommunitySummary::from).collect(),
                        Err(e) => {
                            warn!(error = %e, "community lookup failed, continuing without it");
                            Vec::new()
                        }
                    }
                }
                None => Vec::new(),
            }
        } else {
            Vec::new()
        };

        let context = RagContext {
            seeds,
            expanded_nodes,
            expanded_edges,
            communities,
        };
        self.cache.write().unwrap().insert(key, context.clone());
        context
    }

    async fn resolve_seed_nodes(
        &self,
        tenant_id: &str,
        hits: &[crate::search::SearchHit],
    ) -> Vec<GraphNode> {
        let mut nodes = Vec::new();
        for hit in hits {
            if let Ok(Some(node)) = self.store.get_node(tenant_id, &hit.node_id).await {
                nodes.push(node);
            }
        }
        nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_positive_fields_fall_back_to_defaults_but_booleans_are_untouched() {
        let config = ContextBuilderConfig {
            top_k: 0,
            score_threshold: -1.0,
            include_communities: true,
            ..ContextBuilderConfig::default()
        };
        let applied = apply_defaults(config);
        assert_eq!(applied.top_k, 10);
        assert_eq!(applied.score_threshold, 0.5);
        assert!(applied.include_communities);
    }

    #[test]
    fn cache_update_does_not_rotate_eviction_order() {
        let mut cache = BoundedCache::new(2);
        cache.insert("a".to_string(), RagContext::default());
        cache.insert("b".to_string(), RagContext::default());
        cache.insert("a".to_string(), RagContext::default());
        cache.insert("c".to_string(), RagContext::default());
        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
    }
}

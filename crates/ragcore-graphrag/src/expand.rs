use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use ragcore_domain::{GraphEdge, GraphNode, NodeId};
use ragcore_store::{Direction, GraphStore};

use crate::error::GraphRagError;

#[derive(Debug, Clone)]
pub struct ExpandConfig {
    pub edge_types: Vec<String>,
    pub direction: Direction,
    pub max_hops: usize,
    pub max_nodes_per_hop: usize,
    pub max_total_nodes: usize,
    pub per_node_limit: usize,
}

impl Default for ExpandConfig {
    fn default() -> Self {
        Self {
            edge_types: Vec::new(),
            direction: Direction::Both,
            max_hops: 2,
            max_nodes_per_hop: 20,
            max_total_nodes: 100,
            per_node_limit: 50,
        }
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ExpansionResult {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub max_hops: usize,
    /// Hop distance each node in `nodes` was first reached at. Carried so a later `apply_filter`
    /// pass can recompute `max_hops` over whatever subset survives, instead of reporting the
    /// pre-filter depth. Not part of the wire response.
    #[serde(skip)]
    pub node_hops: HashMap<NodeId, usize>,
}

/// Budget-bounded BFS from seed nodes (§4.4), grounded on a `petgraph`-style visited-set
/// traversal generalized to a remote store instead of an in-memory `DiGraph`.
pub struct GraphExpander {
    store: Arc<dyn GraphStore>,
}

impl GraphExpander {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    pub async fn expand(
        &self,
        tenant_id: &str,
        seeds: &[NodeId],
        config: &ExpandConfig,
    ) -> Result<ExpansionResult, GraphRagError> {
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut nodes_by_id: HashMap<NodeId, GraphNode> = HashMap::new();
        let mut node_hops: HashMap<NodeId, usize> = HashMap::new();
        let mut edges: Vec<GraphEdge> = Vec::new();
        let mut queue: VecDeque<(NodeId, usize)> = VecDeque::new();
        let mut reached_hop: usize = 0;

        for seed in seeds {
            if let Some(node) = self.store.get_node(tenant_id, seed).await? {
                if visited.insert(seed.clone()) {
                    nodes_by_id.insert(seed.clone(), node);
                    node_hops.insert(seed.clone(), 0);
                    queue.push_back((seed.clone(), 0));
                }
            }
        }

        while let Some((node_id, hop)) = queue.pop_front() {
            if hop >= config.max_hops {
                continue;
            }
            if nodes_by_id.len() >= config.max_total_nodes {
                break;
            }

            let neighbors = self
                .store
                .neighbors(
                    tenant_id,
                    &node_id,
                    &config.edge_types,
                    config.direction,
                    config.per_node_limit,
                )
                .await?;

            let mut added_this_hop = 0usize;
            for (edge, neighbor_id) in neighbors {
                if nodes_by_id.len() >= config.max_total_nodes {
                    break;
                }
                if !visited.contains(&neighbor_id) {
                    if added_this_hop >= config.max_nodes_per_hop {
                        continue;
                    }
                    let Some(node) = self.store.get_node(tenant_id, &neighbor_id).await? else {
                        continue;
                    };
                    visited.insert(neighbor_id.clone());
                    nodes_by_id.insert(neighbor_id.clone(), node);
                    node_hops.insert(neighbor_id.clone(), hop + 1);
                    queue.push_back((neighbor_id.clone(), hop + 1));
                    added_this_hop += 1;
                    reached_hop = reached_hop.max(hop + 1);
                }
                if visited.contains(&edge.source_node_id) && visited.contains(&edge.target_node_id) {
                    edges.push(edge);
                }
            }
        }

        let mut edges_dedup: Vec<GraphEdge> = Vec::new();
        let mut seen_edge_ids = HashSet::new();
        for edge in edges {
            if seen_edge_ids.insert(edge.id.clone()) {
                edges_dedup.push(edge);
            }
        }

        Ok(ExpansionResult {
            nodes: nodes_by_id.into_values().collect(),
            edges: edges_dedup,
            max_hops: reached_hop,
            node_hops,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExpansionFilter {
    pub node_types: Vec<String>,
    pub edge_types: Vec<String>,
}

/// Post-BFS filter pass (§4.4 Filtered expander): prunes nodes/edges, drops edges whose endpoints
/// no longer exist, and recomputes `maxHops`.
pub fn apply_filter(result: ExpansionResult, filter: &ExpansionFilter) -> ExpansionResult {
    let nodes: Vec<GraphNode> = result
        .nodes
        .into_iter()
        .filter(|n| filter.node_types.is_empty() || filter.node_types.contains(&n.entity_type))
        .collect();
    let node_ids: HashSet<&NodeId> = nodes.iter().map(|n| &n.id).collect();

    let edges: Vec<GraphEdge> = result
        .edges
        .into_iter()
        .filter(|e| filter.edge_types.is_empty() || filter.edge_types.contains(&e.edge_type))
        .filter(|e| node_ids.contains(&e.source_node_id) && node_ids.contains(&e.target_node_id))
        .collect();

    let max_hops = nodes
        .iter()
        .filter_map(|n| result.node_hops.get(&n.id))
        .copied()
        .max()
        .unwrap_or(0);
    let node_hops = nodes
        .iter()
        .filter_map(|n| result.node_hops.get(&n.id).map(|hop| (n.id.clone(), *hop)))
        .collect();

    ExpansionResult {
        nodes,
        edges,
        max_hops,
        node_hops,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragcore_domain::Scope;
    use ragcore_store::InMemoryStore;

    #[tokio::test]
    async fn unresolved_seed_is_silently_dropped() {
        let store = Arc::new(InMemoryStore::new());
        let expander = GraphExpander::new(store);
        let result = expander
            .expand("t1", &[NodeId::from("missing".to_string())], &ExpandConfig::default())
            .await
            .unwrap();
        assert!(result.nodes.is_empty());
        assert_eq!(result.max_hops, 0);
    }

    fn node(id: &str, entity_type: &str) -> GraphNode {
        let now = chrono::Utc::now();
        GraphNode {
            id: NodeId::from(id.to_string()),
            tenant_id: "t1".into(),
            project_id: None,
            entity_type: entity_type.into(),
            display_name: id.into(),
            canonical_path: None,
            source_system: None,
            spec_ref: None,
            properties: Default::default(),
            version: 1,
            scope: Scope::org("t1"),
            origin_endpoint_id: None,
            origin_vendor: None,
            logical_key: format!("key-{id}"),
            external_id: Default::default(),
            phase: None,
            provenance: Default::default(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn apply_filter_recomputes_max_hops_over_surviving_nodes() {
        let a = node("a", "project");
        let b = node("b", "task");
        let result = ExpansionResult {
            nodes: vec![a.clone(), b.clone()],
            edges: vec![],
            max_hops: 2,
            node_hops: HashMap::from([(a.id.clone(), 0), (b.id.clone(), 2)]),
        };

        // Filtering out the deep node ("task", hop 2) must drop max_hops to the shallow
        // survivor's depth, not keep reporting the pre-filter value of 2.
        let filtered = apply_filter(
            result,
            &ExpansionFilter { node_types: vec!["project".into()], edge_types: vec![] },
        );
        assert_eq!(filtered.nodes.len(), 1);
        assert_eq!(filtered.max_hops, 0);
    }
}

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use ragcore_domain::NodeId;
use ragcore_store::{Direction, GraphStore};

use crate::error::GraphRagError;

#[derive(Debug, Clone, serde::Serialize)]
pub struct Community {
    pub id: String,
    pub node_ids: Vec<NodeId>,
    pub summary: Option<String>,
}

/// Supplies communities covering a set of nodes for the context builder's community phase.
#[async_trait]
pub trait CommunityProvider: Send + Sync + 'static {
    async fn get_communities(
        &self,
        tenant_id: &str,
        node_ids: &[NodeId],
        max_communities: usize,
    ) -> Result<Vec<Community>, GraphRagError>;
}

/// Connected-components provider: a community is the set of nodes reachable from each seed
/// through `neighbors`, capped at `max_communities`. No ML clustering, just graph structure —
/// adequate as a default and replaceable by a real community-detection backend.
pub struct ConnectedComponentsProvider {
    store: Arc<dyn GraphStore>,
    per_component_limit: usize,
}

impl ConnectedComponentsProvider {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            store,
            per_component_limit: 50,
        }
    }
}

#[async_trait]
impl CommunityProvider for ConnectedComponentsProvider {
    async fn get_communities(
        &self,
        tenant_id: &str,
        node_ids: &[NodeId],
        max_communities: usize,
    ) -> Result<Vec<Community>, GraphRagError> {
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut communities = Vec::new();

        for seed in node_ids {
            if visited.contains(seed) || communities.len() >= max_communities {
                continue;
            }
            let mut component = Vec::new();
            let mut queue = VecDeque::new();
            queue.push_back(seed.clone());
            visited.insert(seed.clone());

            while let Some(node_id) = queue.pop_front() {
                component.push(node_id.clone());
                if component.len() >= self.per_component_limit {
                    break;
                }
                let neighbors = self
                    .store
                    .neighbors(tenant_id, &node_id, &[], Direction::Both, self.per_component_limit)
                    .await?;
                for (_, neighbor_id) in neighbors {
                    if visited.insert(neighbor_id.clone()) {
                        queue.push_back(neighbor_id);
                    }
                }
            }

            let id = format!("community-{}", communities.len() + 1);
            communities.push(Community {
                id,
                node_ids: component,
                summary: None,
            });
        }

        Ok(communities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragcore_store::InMemoryStore;

    #[tokio::test]
    async fn isolated_seed_forms_its_own_singleton_community() {
        let store = Arc::new(InMemoryStore::new());
        let provider = ConnectedComponentsProvider::new(store);
        let communities = provider
            .get_communities("t1", &[NodeId::from("a".to_string())], 5)
            .await
            .unwrap();
        assert_eq!(communities.len(), 1);
        assert_eq!(communities[0].node_ids.len(), 1);
    }
}

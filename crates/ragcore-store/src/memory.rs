use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use ragcore_domain::{
    edge_logical_key, node_logical_key, AuditEvent, Endpoint, EndpointId, EdgeId, GraphEdge,
    GraphNode, IngestionRun, NodeId, RunId, UnitConfig, UnitId, UnitStatus,
};
use uuid::Uuid;

use crate::error::StoreError;
use crate::filter::{Direction, EdgeFilter, NodeFilter};
use crate::graph_store::{cosine_similarity, EdgeUpsert, GraphStore, NodeUpsert};
use crate::metadata_store::MetadataStore;

#[derive(Default)]
struct Inner {
    endpoints: HashMap<EndpointId, Endpoint>,
    unit_configs: HashMap<(EndpointId, UnitId), UnitConfig>,
    unit_statuses: HashMap<(EndpointId, UnitId), UnitStatus>,
    runs: HashMap<RunId, IngestionRun>,
    events: Vec<AuditEvent>,

    nodes: HashMap<NodeId, GraphNode>,
    nodes_by_logical_key: HashMap<String, NodeId>,
    edges: HashMap<EdgeId, GraphEdge>,
    edges_by_logical_key: HashMap<String, EdgeId>,
    // (entity_id, model_id) -> (vector, created_at_nanos)
    embeddings: HashMap<(NodeId, String), (Vec<f32>, i64)>,
}

/// `Arc<RwLock<..>>`-backed store, the default/test-friendly C3+C4 backend. Writes to a given
/// node/edge serialize because every mutator takes the single write lock; this stands in for a
/// per-key mutex until a real per-key-lock pool is worth the complexity.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for InMemoryStore {
    async fn get_endpoint(&self, id: &EndpointId) -> Result<Option<Endpoint>, StoreError> {
        Ok(self.inner.read().expect("lock").endpoints.get(id).cloned())
    }

    async fn list_endpoints(
        &self,
        project_id: Option<&str>,
        search: Option<&str>,
        first: usize,
    ) -> Result<Vec<Endpoint>, StoreError> {
        let guard = self.inner.read().expect("lock");
        let mut out: Vec<Endpoint> = guard
            .endpoints
            .values()
            .filter(|e| e.is_active())
            .filter(|e| project_id.map_or(true, |p| e.project_id.as_deref() == Some(p)))
            .filter(|e| {
                search.map_or(true, |s| {
                    e.display_name.to_lowercase().contains(&s.to_lowercase())
                })
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out.truncate(if first == 0 { usize::MAX } else { first });
        Ok(out)
    }

    async fn upsert_endpoint(&self, endpoint: Endpoint) -> Result<Endpoint, StoreError> {
        let mut guard = self.inner.write().expect("lock");
        guard.endpoints.insert(endpoint.id.clone(), endpoint.clone());
        Ok(endpoint)
    }

    async fn soft_delete_endpoint(&self, id: &EndpointId, reason: &str) -> Result<(), StoreError> {
        let mut guard = self.inner.write().expect("lock");
        let endpoint = guard
            .endpoints
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        endpoint.deleted_at = Some(Utc::now());
        endpoint.delete_reason = Some(reason.to_string());
        Ok(())
    }

    async fn get_unit_config(
        &self,
        endpoint_id: &EndpointId,
        unit_id: &UnitId,
    ) -> Result<Option<UnitConfig>, StoreError> {
        Ok(self
            .inner
            .read()
            .expect("lock")
            .unit_configs
            .get(&(endpoint_id.clone(), unit_id.clone()))
            .cloned())
    }

    async fn put_unit_config(
        &self,
        endpoint_id: &EndpointId,
        unit_id: &UnitId,
        config: UnitConfig,
    ) -> Result<(), StoreError> {
        self.inner
            .write()
            .expect("lock")
            .unit_configs
            .insert((endpoint_id.clone(), unit_id.clone()), config);
        Ok(())
    }

    async fn get_unit_status(
        &self,
        endpoint_id: &EndpointId,
        unit_id: &UnitId,
    ) -> Result<Option<UnitStatus>, StoreError> {
        Ok(self
            .inner
            .read()
            .expect("lock")
            .unit_statuses
            .get(&(endpoint_id.clone(), unit_id.clone()))
            .cloned())
    }

    async fn put_unit_status(
        &self,
        endpoint_id: &EndpointId,
        unit_id: &UnitId,
        status: UnitStatus,
    ) -> Result<(), StoreError> {
        self.inner
            .write()
            .expect("lock")
            .unit_statuses
            .insert((endpoint_id.clone(), unit_id.clone()), status);
        Ok(())
    }

    async fn list_unit_statuses(
        &self,
        endpoint_id: &EndpointId,
    ) -> Result<Vec<UnitStatus>, StoreError> {
        let guard = self.inner.read().expect("lock");
        Ok(guard
            .unit_statuses
            .iter()
            .filter(|((eid, _), _)| eid == endpoint_id)
            .map(|(_, v)| v.clone())
            .collect())
    }

    async fn create_run(&self, run: IngestionRun) -> Result<IngestionRun, StoreError> {
        let mut guard = self.inner.write().expect("lock");
        guard.runs.insert(run.id.clone(), run.clone());
        Ok(run)
    }

    async fn update_run(&self, run: IngestionRun) -> Result<IngestionRun, StoreError> {
        let mut guard = self.inner.write().expect("lock");
        guard.runs.insert(run.id.clone(), run.clone());
        Ok(run)
    }

    async fn get_run(&self, id: &RunId) -> Result<Option<IngestionRun>, StoreError> {
        Ok(self.inner.read().expect("lock").runs.get(id).cloned())
    }

    async fn append_event(&self, event: AuditEvent) -> Result<(), StoreError> {
        self.inner.write().expect("lock").events.push(event);
        Ok(())
    }

    async fn list_events(
        &self,
        endpoint_id: Option<&EndpointId>,
        limit: usize,
    ) -> Result<Vec<AuditEvent>, StoreError> {
        let guard = self.inner.read().expect("lock");
        let mut matched: Vec<AuditEvent> = guard
            .events
            .iter()
            .filter(|e| endpoint_id.map_or(true, |id| e.endpoint_id() == Some(id)))
            .cloned()
            .collect();
        let start = matched.len().saturating_sub(if limit == 0 { matched.len() } else { limit });
        Ok(matched.split_off(start))
    }
}

#[async_trait]
impl GraphStore for InMemoryStore {
    async fn upsert_node(&self, input: NodeUpsert) -> Result<GraphNode, StoreError> {
        input.scope.validate().map_err(|_| StoreError::TenantMismatch)?;
        let logical_key = node_logical_key(
            &input.entity_type,
            &input.scope.org_id,
            input.scope.project_id.as_deref(),
            input.scope.domain_id.as_deref(),
            input.scope.team_id.as_deref(),
            input.origin_endpoint_id.as_ref().map(|e| e.as_str()),
            input.origin_vendor.as_deref(),
            input.canonical_path.as_deref(),
            input.fallback_id.as_deref(),
            &serde_json::to_value(&input.external_id).unwrap_or(serde_json::Value::Null),
        );

        let mut guard = self.inner.write().expect("lock");
        let existing_id = input
            .id
            .clone()
            .or_else(|| guard.nodes_by_logical_key.get(&logical_key).cloned());

        let now = Utc::now();
        if let Some(id) = existing_id {
            if let Some(existing) = guard.nodes.get(&id).cloned() {
                let mut merged = existing.clone();
                merged.version += 1;
                merged.display_name = input.display_name;
                for (k, v) in input.properties {
                    merged.properties.insert(k, v);
                }
                if input.canonical_path.is_some() {
                    merged.canonical_path = input.canonical_path;
                }
                if input.source_system.is_some() {
                    merged.source_system = input.source_system;
                }
                // previous origin/provenance preserved when caller doesn't override
                if input.origin_endpoint_id.is_some() {
                    merged.origin_endpoint_id = input.origin_endpoint_id;
                }
                if input.origin_vendor.is_some() {
                    merged.origin_vendor = input.origin_vendor;
                }
                for (k, v) in input.provenance {
                    merged.provenance.insert(k, v);
                }
                if input.phase.is_some() {
                    merged.phase = input.phase;
                }
                merged.updated_at = now;
                guard.nodes.insert(id.clone(), merged.clone());
                return Ok(merged);
            }
        }

        let id = input.id.unwrap_or_else(|| NodeId::new(Uuid::new_v4().to_string()));
        let node = GraphNode {
            id: id.clone(),
            tenant_id: input.tenant_id,
            project_id: input.project_id,
            entity_type: input.entity_type,
            display_name: input.display_name,
            canonical_path: input.canonical_path,
            source_system: input.source_system,
            spec_ref: input.spec_ref,
            properties: input.properties,
            version: 1,
            scope: input.scope,
            origin_endpoint_id: input.origin_endpoint_id,
            origin_vendor: input.origin_vendor,
            logical_key: logical_key.clone(),
            external_id: input.external_id,
            phase: input.phase,
            provenance: input.provenance,
            created_at: now,
            updated_at: now,
        };
        guard.nodes.insert(id.clone(), node.clone());
        guard.nodes_by_logical_key.insert(logical_key, id);
        Ok(node)
    }

    async fn get_node(&self, org_id: &str, id: &NodeId) -> Result<Option<GraphNode>, StoreError> {
        let guard = self.inner.read().expect("lock");
        Ok(guard
            .nodes
            .get(id)
            .filter(|n| n.scope.org_id == org_id)
            .cloned())
    }

    async fn get_node_by_logical_key(
        &self,
        org_id: &str,
        logical_key: &str,
    ) -> Result<Option<GraphNode>, StoreError> {
        let guard = self.inner.read().expect("lock");
        Ok(guard
            .nodes_by_logical_key
            .get(logical_key)
            .and_then(|id| guard.nodes.get(id))
            .filter(|n| n.scope.org_id == org_id)
            .cloned())
    }

    async fn upsert_edge(&self, input: EdgeUpsert) -> Result<GraphEdge, StoreError> {
        input.scope.validate().map_err(|_| StoreError::TenantMismatch)?;
        let mut guard = self.inner.write().expect("lock");

        let source = guard
            .nodes
            .get(&input.source_node_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(input.source_node_id.to_string()))?;
        let target = guard
            .nodes
            .get(&input.target_node_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(input.target_node_id.to_string()))?;
        if source.scope.org_id != target.scope.org_id || source.scope.org_id != input.scope.org_id {
            return Err(StoreError::CrossScopeEdge {
                source_org: source.scope.org_id,
                target_org: target.scope.org_id,
            });
        }

        let logical_key = edge_logical_key(
            &input.edge_type,
            &input.scope.org_id,
            input.scope.project_id.as_deref(),
            input.scope.domain_id.as_deref(),
            input.scope.team_id.as_deref(),
            input.origin_endpoint_id.as_ref().map(|e| e.as_str()),
            input.origin_vendor.as_deref(),
            &source.logical_key,
            &target.logical_key,
        );

        let existing_id = input
            .id
            .clone()
            .or_else(|| guard.edges_by_logical_key.get(&logical_key).cloned());

        let now = Utc::now();
        let created_at = existing_id
            .as_ref()
            .and_then(|id| guard.edges.get(id))
            .map(|e| e.created_at)
            .unwrap_or(now);

        let id = existing_id.unwrap_or_else(|| EdgeId::new(Uuid::new_v4().to_string()));
        let edge = GraphEdge {
            id: id.clone(),
            tenant_id: input.tenant_id,
            project_id: input.project_id,
            edge_type: input.edge_type,
            source_node_id: input.source_node_id,
            target_node_id: input.target_node_id,
            source_logical_key: source.logical_key,
            target_logical_key: target.logical_key,
            scope: input.scope,
            confidence: input.confidence,
            metadata: input.metadata,
            logical_key: logical_key.clone(),
            created_at,
            updated_at: now,
        };
        guard.edges.insert(id.clone(), edge.clone());
        guard.edges_by_logical_key.insert(logical_key, id);
        Ok(edge)
    }

    async fn list_nodes(&self, org_id: &str, filter: NodeFilter) -> Result<Vec<GraphNode>, StoreError> {
        let guard = self.inner.read().expect("lock");
        let mut out: Vec<GraphNode> = guard
            .nodes
            .values()
            .filter(|n| n.scope.org_id == org_id)
            .filter(|n| filter.entity_types.is_empty() || filter.entity_types.contains(&n.entity_type))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if filter.limit > 0 {
            out.truncate(filter.limit);
        }
        Ok(out)
    }

    async fn list_edges(&self, org_id: &str, filter: EdgeFilter) -> Result<Vec<GraphEdge>, StoreError> {
        let guard = self.inner.read().expect("lock");
        let mut out: Vec<GraphEdge> = guard
            .edges
            .values()
            .filter(|e| e.scope.org_id == org_id)
            .filter(|e| filter.edge_types.is_empty() || filter.edge_types.contains(&e.edge_type))
            .filter(|e| {
                filter
                    .node_id
                    .as_ref()
                    .map_or(true, |id| &e.source_node_id == id || &e.target_node_id == id)
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if filter.limit > 0 {
            out.truncate(filter.limit);
        }
        Ok(out)
    }

    async fn neighbors(
        &self,
        org_id: &str,
        node_id: &NodeId,
        edge_types: &[String],
        direction: Direction,
        per_node_limit: usize,
    ) -> Result<Vec<(GraphEdge, NodeId)>, StoreError> {
        let guard = self.inner.read().expect("lock");
        let mut out = Vec::new();
        for edge in guard.edges.values() {
            if edge.scope.org_id != org_id {
                continue;
            }
            if !edge_types.is_empty() && !edge_types.contains(&edge.edge_type) {
                continue;
            }
            let other = if &edge.source_node_id == node_id
                && matches!(direction, Direction::Outgoing | Direction::Both)
            {
                Some(edge.target_node_id.clone())
            } else if &edge.target_node_id == node_id
                && matches!(direction, Direction::Incoming | Direction::Both)
            {
                Some(edge.source_node_id.clone())
            } else {
                None
            };
            if let Some(other) = other {
                out.push((edge.clone(), other));
            }
            if per_node_limit > 0 && out.len() >= per_node_limit {
                break;
            }
        }
        Ok(out)
    }

    async fn put_embedding(
        &self,
        org_id: &str,
        entity_id: &NodeId,
        vector: Vec<f32>,
        model_id: &str,
    ) -> Result<(), StoreError> {
        let guard = self.inner.read().expect("lock");
        if !guard.nodes.get(entity_id).map_or(false, |n| n.scope.org_id == org_id) {
            return Err(StoreError::NotFound(entity_id.to_string()));
        }
        drop(guard);
        let now = Utc::now().timestamp_nanos_opt().unwrap_or(0);
        self.inner
            .write()
            .expect("lock")
            .embeddings
            .insert((entity_id.clone(), model_id.to_string()), (vector, now));
        Ok(())
    }

    async fn search_embeddings(
        &self,
        org_id: &str,
        query: &[f32],
        limit: usize,
        model_id: Option<&str>,
    ) -> Result<Vec<(NodeId, f32)>, StoreError> {
        let guard = self.inner.read().expect("lock");
        let mut scored: Vec<(NodeId, f32, i64)> = guard
            .embeddings
            .iter()
            .filter(|((_, m), _)| model_id.map_or(true, |want| want == m))
            .filter(|((id, _), _)| guard.nodes.get(id).map_or(false, |n| n.scope.org_id == org_id))
            .map(|((id, _), (vec, created))| (id.clone(), cosine_similarity(query, vec), *created))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then(b.2.cmp(&a.2)));
        scored.truncate(limit);
        Ok(scored.into_iter().map(|(id, score, _)| (id, score)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragcore_domain::Scope;
    use std::collections::HashMap;

    // `name` doubles as the fallback id, so two calls with the same name merge (simulating a
    // repeat observation of the same no-external-id record) and two calls with different names
    // stay distinct, the same way a driver-supplied synthetic id would behave.
    fn node_input(org: &str, entity_type: &str, name: &str) -> NodeUpsert {
        NodeUpsert {
            id: None,
            tenant_id: org.to_string(),
            project_id: None,
            entity_type: entity_type.to_string(),
            display_name: name.to_string(),
            canonical_path: None,
            source_system: None,
            spec_ref: None,
            properties: HashMap::new(),
            scope: Scope::org(org),
            origin_endpoint_id: None,
            origin_vendor: None,
            external_id: HashMap::new(),
            phase: None,
            provenance: HashMap::new(),
            fallback_id: Some(name.to_string()),
        }
    }

    #[tokio::test]
    async fn upsert_twice_increments_version_and_keeps_logical_key() {
        let store = InMemoryStore::new();
        let n1 = store.upsert_node(node_input("org1", "project", "Alpha")).await.unwrap();
        let n2 = store.upsert_node(node_input("org1", "project", "Alpha")).await.unwrap();
        assert_eq!(n1.logical_key, n2.logical_key);
        assert_eq!(n2.version, n1.version + 1);
        assert_eq!(n2.id, n1.id);
    }

    #[tokio::test]
    async fn distinct_fallback_ids_keep_no_external_id_records_apart() {
        let store = InMemoryStore::new();
        let a = store.upsert_node(node_input("org1", "project", "Alpha")).await.unwrap();
        let b = store.upsert_node(node_input("org1", "project", "Beta")).await.unwrap();
        assert_ne!(a.id, b.id);
        assert_ne!(a.logical_key, b.logical_key);
    }

    #[tokio::test]
    async fn cross_tenant_read_returns_none() {
        let store = InMemoryStore::new();
        let n = store.upsert_node(node_input("A", "project", "Alpha")).await.unwrap();
        assert!(store.get_node("B", &n.id).await.unwrap().is_none());
        let listed = store.list_nodes("B", NodeFilter::default()).await.unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn upsert_edge_rejects_cross_scope() {
        let store = InMemoryStore::new();
        let a = store.upsert_node(node_input("A", "project", "Alpha")).await.unwrap();
        let b = store.upsert_node(node_input("B", "project", "Beta")).await.unwrap();
        let err = store
            .upsert_edge(EdgeUpsert {
                id: None,
                tenant_id: "A".into(),
                project_id: None,
                edge_type: "references".into(),
                source_node_id: a.id,
                target_node_id: b.id,
                scope: Scope::org("A"),
                confidence: None,
                metadata: HashMap::new(),
                origin_endpoint_id: None,
                origin_vendor: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::CrossScopeEdge { .. }));
    }

    #[tokio::test]
    async fn search_embeddings_returns_nearest_first() {
        let store = InMemoryStore::new();
        let a = store.upsert_node(node_input("A", "project", "Alpha")).await.unwrap();
        let b = store.upsert_node(node_input("A", "project", "Beta")).await.unwrap();
        store.put_embedding("A", &a.id, vec![1.0, 0.0], "m1").await.unwrap();
        store.put_embedding("A", &b.id, vec![0.0, 1.0], "m1").await.unwrap();
        let top = store.search_embeddings("A", &[1.0, 0.0], 1, Some("m1")).await.unwrap();
        assert_eq!(top[0].0, a.id);
    }
}

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use ragcore_domain::{NodeId, RunId};
use ragcore_driver::{NormalizedRecord, SyncBatch};
use ragcore_store::{EdgeUpsert, GraphStore, NodeUpsert};
use tracing::warn;

use crate::error::SinkError;
use crate::sink::{Sink, SinkCtx, WriteStats};

/// The default sink named in §4.1: writes each record into C4 using `entityType`, `logicalId`,
/// `scope`, and `edges`. Edge endpoints are resolved against the logical ids upserted earlier in
/// the same batch; an edge referencing an id this sink hasn't seen is dropped and logged, never
/// silently left dangling. Records with no `logicalId` fall back to the provenance
/// `sourceEventId` to keep the node's logical key from colliding with another no-id record of the
/// same type/scope/origin.
pub struct GraphSink {
    store: Arc<dyn GraphStore>,
    began: RwLock<HashSet<RunId>>,
}

impl GraphSink {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            store,
            began: RwLock::new(HashSet::new()),
        }
    }

    fn properties_of(record: &NormalizedRecord) -> HashMap<String, serde_json::Value> {
        match &record.payload {
            serde_json::Value::Object(map) => map.clone().into_iter().collect(),
            other => HashMap::from([("payload".to_string(), other.clone())]),
        }
    }
}

#[async_trait]
impl Sink for GraphSink {
    async fn begin(&self, ctx: &SinkCtx) -> Result<(), SinkError> {
        self.began.write().expect("lock").insert(ctx.run_id.clone());
        Ok(())
    }

    async fn write_batch(&self, batch: &SyncBatch, ctx: &SinkCtx) -> Result<WriteStats, SinkError> {
        if !self.began.read().expect("lock").contains(&ctx.run_id) {
            return Err(SinkError::NotBegun);
        }

        let mut local_ids: HashMap<String, NodeId> = HashMap::new();
        let mut stats = WriteStats::default();

        for record in &batch.records {
            let external_id = record
                .logical_id
                .as_ref()
                .map(|id| HashMap::from([("id".to_string(), serde_json::Value::String(id.clone()))]))
                .unwrap_or_default();

            let node = self
                .store
                .upsert_node(NodeUpsert {
                    id: None,
                    tenant_id: record.scope.org_id.clone(),
                    project_id: record.scope.project_id.clone(),
                    entity_type: record.entity_type.clone(),
                    display_name: record
                        .display_name
                        .clone()
                        .unwrap_or_else(|| record.entity_type.clone()),
                    canonical_path: None,
                    source_system: record.provenance.vendor.clone(),
                    spec_ref: None,
                    properties: Self::properties_of(record),
                    scope: record.scope.clone(),
                    origin_endpoint_id: Some(record.provenance.endpoint_id.clone()),
                    origin_vendor: record.provenance.vendor.clone(),
                    external_id,
                    phase: record.phase.clone(),
                    provenance: HashMap::new(),
                    fallback_id: record
                        .logical_id
                        .is_none()
                        .then(|| record.provenance.source_event_id.clone())
                        .flatten(),
                })
                .await?;
            stats.upserts += 1;

            if let Some(logical_id) = &record.logical_id {
                local_ids.insert(logical_id.clone(), node.id.clone());
            }
        }

        for record in &batch.records {
            for edge in &record.edges {
                let (Some(source), Some(target)) = (
                    local_ids.get(&edge.source_logical_id),
                    local_ids.get(&edge.target_logical_id),
                ) else {
                    warn!(
                        edge_type = %edge.edge_type,
                        source = %edge.source_logical_id,
                        target = %edge.target_logical_id,
                        "dropping edge with unresolved endpoint in this batch"
                    );
                    continue;
                };

                let metadata = match &edge.properties {
                    Some(serde_json::Value::Object(map)) => map.clone().into_iter().collect(),
                    Some(other) => HashMap::from([("properties".to_string(), other.clone())]),
                    None => HashMap::new(),
                };

                self.store
                    .upsert_edge(EdgeUpsert {
                        id: None,
                        tenant_id: record.scope.org_id.clone(),
                        project_id: record.scope.project_id.clone(),
                        edge_type: edge.edge_type.clone(),
                        source_node_id: source.clone(),
                        target_node_id: target.clone(),
                        scope: record.scope.clone(),
                        confidence: None,
                        metadata,
                        origin_endpoint_id: Some(record.provenance.endpoint_id.clone()),
                        origin_vendor: record.provenance.vendor.clone(),
                    })
                    .await?;
                stats.edges += 1;
            }
        }

        Ok(stats)
    }

    async fn commit(&self, ctx: &SinkCtx, _stats: &HashMap<String, f64>) -> Result<(), SinkError> {
        if !self.began.write().expect("lock").remove(&ctx.run_id) {
            return Err(SinkError::AlreadyCommitted);
        }
        Ok(())
    }

    async fn abort(&self, ctx: &SinkCtx, _err: &str) -> Result<(), SinkError> {
        self.began.write().expect("lock").remove(&ctx.run_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragcore_domain::{EndpointId, Scope, UnitId};
    use ragcore_driver::{EdgeSpec, Provenance};
    use ragcore_store::InMemoryStore;

    fn ctx() -> SinkCtx {
        SinkCtx {
            run_id: RunId::new("run1"),
            endpoint_id: EndpointId::new("ep1"),
            unit_id: UnitId::new("unit1"),
        }
    }

    fn record(logical_id: &str, entity_type: &str) -> NormalizedRecord {
        NormalizedRecord {
            entity_type: entity_type.into(),
            logical_id: Some(logical_id.into()),
            display_name: Some(logical_id.into()),
            scope: Scope::org("org1"),
            provenance: Provenance {
                endpoint_id: EndpointId::new("ep1"),
                vendor: Some("demo".into()),
                source_event_id: None,
            },
            payload: serde_json::json!({ "id": logical_id }),
            phase: None,
            edges: vec![],
        }
    }

    #[tokio::test]
    async fn write_batch_before_begin_fails() {
        let sink = GraphSink::new(Arc::new(InMemoryStore::new()));
        let batch = SyncBatch { records: vec![record("a", "project")] };
        let err = sink.write_batch(&batch, &ctx()).await.unwrap_err();
        assert!(matches!(err, SinkError::NotBegun));
    }

    #[tokio::test]
    async fn begin_write_commit_upserts_nodes_and_edges() {
        let sink = GraphSink::new(Arc::new(InMemoryStore::new()));
        let c = ctx();
        sink.begin(&c).await.unwrap();

        let mut a = record("a", "project");
        a.edges.push(EdgeSpec {
            edge_type: "depends_on".into(),
            source_logical_id: "a".into(),
            target_logical_id: "b".into(),
            properties: None,
        });
        let b = record("b", "project");

        let stats = sink
            .write_batch(&SyncBatch { records: vec![a, b] }, &c)
            .await
            .unwrap();
        assert_eq!(stats.upserts, 2);
        assert_eq!(stats.edges, 1);

        sink.commit(&c, &HashMap::new()).await.unwrap();
        // commit is at-most-once
        assert!(sink.commit(&c, &HashMap::new()).await.is_err());
    }

    #[tokio::test]
    async fn records_without_logical_id_stay_distinct_via_source_event_id() {
        let store = Arc::new(InMemoryStore::new());
        let sink = GraphSink::new(store.clone());
        let c = ctx();
        sink.begin(&c).await.unwrap();

        let no_id_record = |event_id: &str| NormalizedRecord {
            entity_type: "project".into(),
            logical_id: None,
            display_name: Some("untitled".into()),
            scope: Scope::org("org1"),
            provenance: Provenance {
                endpoint_id: EndpointId::new("ep1"),
                vendor: Some("demo".into()),
                source_event_id: Some(event_id.into()),
            },
            payload: serde_json::json!({}),
            phase: None,
            edges: vec![],
        };

        let batch = SyncBatch {
            records: vec![no_id_record("evt-1"), no_id_record("evt-2")],
        };
        let stats = sink.write_batch(&batch, &c).await.unwrap();
        assert_eq!(stats.upserts, 2);

        let nodes = store.list_nodes("org1", Default::default()).await.unwrap();
        assert_eq!(nodes.len(), 2, "distinct source_event_ids must not merge into one node");
    }

    #[tokio::test]
    async fn edge_to_unresolved_id_is_dropped() {
        let sink = GraphSink::new(Arc::new(InMemoryStore::new()));
        let c = ctx();
        sink.begin(&c).await.unwrap();

        let mut a = record("a", "project");
        a.edges.push(EdgeSpec {
            edge_type: "depends_on".into(),
            source_logical_id: "a".into(),
            target_logical_id: "missing".into(),
            properties: None,
        });

        let stats = sink
            .write_batch(&SyncBatch { records: vec![a] }, &c)
            .await
            .unwrap();
        assert_eq!(stats.upserts, 1);
        assert_eq!(stats.edges, 0);
    }
}

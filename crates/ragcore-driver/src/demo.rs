use async_trait::async_trait;
use ragcore_domain::{Endpoint, IngestionUnit, RunMode, ScheduleKind, SinkId, UnitId};
use serde_json::{json, Value};
use tracing::debug;

use crate::driver::Driver;
use crate::error::DriverError;
use crate::record::{NormalizedRecord, Provenance, SyncBatch, SyncOutcome};

/// A reference driver that simulates a source system locally: one unit, synthetic project
/// records, a page counter carried in the checkpoint. Grounded on the orchestration tool's
/// `LocalDriver` stub (synthetic handles, no real I/O); generalized from cloud-resource
/// provisioning to pull-based `syncUnit` paging.
#[derive(Debug, Default, Clone)]
pub struct DemoDriver;

impl DemoDriver {
    pub fn new() -> Self {
        Self
    }

    fn page_of(checkpoint: &Value) -> u64 {
        checkpoint
            .as_object()
            .and_then(|o| o.get("page"))
            .and_then(|v| v.as_u64())
            .unwrap_or(0)
    }
}

#[async_trait]
impl Driver for DemoDriver {
    fn name(&self) -> &'static str {
        "demo"
    }

    async fn list_units(&self, endpoint: &Endpoint) -> Result<Vec<IngestionUnit>, DriverError> {
        debug!(endpoint_id = %endpoint.id, "DemoDriver: list_units");
        Ok(vec![IngestionUnit {
            id: UnitId::new("projects"),
            kind: "projects".into(),
            display_name: "Projects".into(),
            dataset_id: "projects".into(),
            default_mode: RunMode::Incremental,
            supported_modes: vec![RunMode::Full, RunMode::Incremental],
            default_sink_id: SinkId::new("graph"),
            default_schedule_kind: ScheduleKind::Manual,
            default_interval_minutes: None,
            default_policy: Default::default(),
            cdm_model_id: None,
        }])
    }

    async fn sync_unit(
        &self,
        endpoint: &Endpoint,
        unit_id: &UnitId,
        checkpoint: Value,
        limit: usize,
    ) -> Result<SyncOutcome, DriverError> {
        let page = Self::page_of(&checkpoint);
        debug!(endpoint_id = %endpoint.id, unit_id = %unit_id, page, "DemoDriver: sync_unit");

        // Only page 0 produces records; every later page is an empty incremental tick, the same
        // shape as a real source that has caught up to head.
        let batches = if page == 0 {
            let count = limit.min(3).max(1);
            let records = (0..count)
                .map(|i| NormalizedRecord {
                    entity_type: "project".into(),
                    logical_id: Some(format!("demo-project-{i}")),
                    display_name: Some(format!("Demo Project {i}")),
                    scope: ragcore_domain::Scope::org(&endpoint.domain_id.clone().unwrap_or_else(|| "demo-org".into())),
                    provenance: Provenance {
                        endpoint_id: endpoint.id.clone(),
                        vendor: Some("demo".into()),
                        source_event_id: Some(format!("evt-{i}")),
                    },
                    payload: json!({ "id": format!("demo-project-{i}"), "name": format!("Demo Project {i}") }),
                    phase: None,
                    edges: vec![],
                })
                .collect();
            vec![SyncBatch { records }]
        } else {
            vec![]
        };

        Ok(SyncOutcome {
            new_checkpoint: json!({ "page": page + 1 }),
            stats: Default::default(),
            batches,
            source_event_ids: None,
            errors: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_endpoint() -> Endpoint {
        Endpoint {
            id: ragcore_domain::EndpointId::new("ep1"),
            source_id: "ep1".into(),
            display_name: "Demo".into(),
            driver_id: ragcore_domain::DriverId::new("demo"),
            url: "demo://local".into(),
            auth_policy_ref: None,
            project_id: None,
            domain_id: Some("org1".into()),
            labels: vec![],
            config: Default::default(),
            detected_version: None,
            capabilities: vec![],
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            deleted_at: None,
            delete_reason: None,
        }
    }

    #[tokio::test]
    async fn first_sync_produces_records_and_advances_checkpoint() {
        let driver = DemoDriver::new();
        let ep = dummy_endpoint();
        let unit_id = UnitId::new("projects");
        let outcome = driver
            .sync_unit(&ep, &unit_id, Value::Null, 10)
            .await
            .unwrap();
        assert_eq!(outcome.batches.len(), 1);
        assert!(!outcome.batches[0].records.is_empty());
        assert_eq!(outcome.new_checkpoint, json!({ "page": 1 }));
    }

    #[tokio::test]
    async fn second_sync_with_advanced_checkpoint_is_empty() {
        let driver = DemoDriver::new();
        let ep = dummy_endpoint();
        let unit_id = UnitId::new("projects");
        let outcome = driver
            .sync_unit(&ep, &unit_id, json!({ "page": 1 }), 10)
            .await
            .unwrap();
        assert!(outcome.batches.is_empty());
        assert_eq!(outcome.new_checkpoint, json!({ "page": 2 }));
    }
}

use async_trait::async_trait;
use ragcore_domain::{
    AuditEvent, Endpoint, EndpointId, IngestionRun, RunId, UnitConfig, UnitId, UnitStatus,
};

use crate::error::StoreError;

/// Durable store of endpoints, unit configuration, unit status projections, runs, and the audit
/// log (C3).
#[async_trait]
pub trait MetadataStore: Send + Sync + 'static {
    async fn get_endpoint(&self, id: &EndpointId) -> Result<Option<Endpoint>, StoreError>;

    /// Lists active (non soft-deleted) endpoints by default; `search` matches display name.
    async fn list_endpoints(
        &self,
        project_id: Option<&str>,
        search: Option<&str>,
        first: usize,
    ) -> Result<Vec<Endpoint>, StoreError>;

    async fn upsert_endpoint(&self, endpoint: Endpoint) -> Result<Endpoint, StoreError>;

    async fn soft_delete_endpoint(&self, id: &EndpointId, reason: &str) -> Result<(), StoreError>;

    async fn get_unit_config(
        &self,
        endpoint_id: &EndpointId,
        unit_id: &UnitId,
    ) -> Result<Option<UnitConfig>, StoreError>;

    async fn put_unit_config(
        &self,
        endpoint_id: &EndpointId,
        unit_id: &UnitId,
        config: UnitConfig,
    ) -> Result<(), StoreError>;

    async fn get_unit_status(
        &self,
        endpoint_id: &EndpointId,
        unit_id: &UnitId,
    ) -> Result<Option<UnitStatus>, StoreError>;

    async fn put_unit_status(
        &self,
        endpoint_id: &EndpointId,
        unit_id: &UnitId,
        status: UnitStatus,
    ) -> Result<(), StoreError>;

    async fn list_unit_statuses(
        &self,
        endpoint_id: &EndpointId,
    ) -> Result<Vec<UnitStatus>, StoreError>;

    async fn create_run(&self, run: IngestionRun) -> Result<IngestionRun, StoreError>;

    async fn update_run(&self, run: IngestionRun) -> Result<IngestionRun, StoreError>;

    async fn get_run(&self, id: &RunId) -> Result<Option<IngestionRun>, StoreError>;

    async fn append_event(&self, event: AuditEvent) -> Result<(), StoreError>;

    async fn list_events(
        &self,
        endpoint_id: Option<&EndpointId>,
        limit: usize,
    ) -> Result<Vec<AuditEvent>, StoreError>;
}

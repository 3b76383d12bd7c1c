use async_trait::async_trait;
use ragcore_domain::{Endpoint, IngestionUnit, UnitId};
use serde_json::Value;

use crate::error::DriverError;
use crate::record::SyncOutcome;

/// A source-system plugin (§6 driver contract). Implementations are stateless beyond whatever
/// HTTP client they hold; all durable state (checkpoints, run records) lives in C1/C3.
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn list_units(&self, endpoint: &Endpoint) -> Result<Vec<IngestionUnit>, DriverError>;

    /// Estimated lag in seconds behind the source's head, when the driver can tell. Default
    /// implementation returns `None`, mirroring the orchestration tool's no-op default for
    /// orphan-detection methods a driver doesn't support.
    async fn estimate_lag(
        &self,
        _endpoint: &Endpoint,
        _unit_id: &UnitId,
    ) -> Result<Option<f64>, DriverError> {
        Ok(None)
    }

    /// `checkpoint` is handed to the driver exactly as it was returned from the previous call's
    /// `new_checkpoint` (or `Value::Null` on the first run) — the engine never inspects or wraps
    /// it.
    async fn sync_unit(
        &self,
        endpoint: &Endpoint,
        unit_id: &UnitId,
        checkpoint: Value,
        limit: usize,
    ) -> Result<SyncOutcome, DriverError>;
}

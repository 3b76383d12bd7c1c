use std::collections::HashMap;

use async_trait::async_trait;
use ragcore_domain::{EndpointId, RunId, UnitId};
use ragcore_driver::SyncBatch;

use crate::error::SinkError;

#[derive(Debug, Clone)]
pub struct SinkCtx {
    pub run_id: RunId,
    pub endpoint_id: EndpointId,
    pub unit_id: UnitId,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WriteStats {
    pub upserts: u64,
    pub edges: u64,
}

/// `begin → writeBatch* → commit` or `begin → writeBatch* → abort` (§4.1). No batch is visible
/// before `begin`; `commit` runs at most once; `abort` must restore the sink to its pre-`begin`
/// state regardless of how many batches were written.
#[async_trait]
pub trait Sink: Send + Sync + 'static {
    async fn begin(&self, ctx: &SinkCtx) -> Result<(), SinkError>;

    async fn write_batch(&self, batch: &SyncBatch, ctx: &SinkCtx) -> Result<WriteStats, SinkError>;

    async fn commit(&self, ctx: &SinkCtx, stats: &HashMap<String, f64>) -> Result<(), SinkError>;

    async fn abort(&self, ctx: &SinkCtx, err: &str) -> Result<(), SinkError>;
}

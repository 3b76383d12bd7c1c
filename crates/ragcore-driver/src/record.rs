use serde::{Deserialize, Serialize};
use serde_json::Value;

use ragcore_domain::{EndpointId, Scope};

/// One source-system provenance stamp carried by every normalized record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    pub endpoint_id: EndpointId,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub source_event_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeSpec {
    #[serde(rename = "type")]
    pub edge_type: String,
    pub source_logical_id: String,
    pub target_logical_id: String,
    #[serde(default)]
    pub properties: Option<Value>,
}

/// The driver's output unit, normalized independently of the source system's native shape. The
/// sink turns this into a `NodeUpsert`/`EdgeUpsert` pair (§4.1's default graph sink).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub entity_type: String,
    #[serde(default)]
    pub logical_id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    pub scope: Scope,
    pub provenance: Provenance,
    pub payload: Value,
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SyncBatch {
    pub records: Vec<NormalizedRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncIssue {
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
    #[serde(default)]
    pub sample: Option<Value>,
}

/// Result of one `syncUnit` call. `new_checkpoint` is opaque and must be stored flat — the engine
/// never wraps it (the checkpoint-flattening invariant, §4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub new_checkpoint: Value,
    #[serde(default)]
    pub stats: std::collections::HashMap<String, f64>,
    pub batches: Vec<SyncBatch>,
    #[serde(default)]
    pub source_event_ids: Option<Vec<String>>,
    #[serde(default)]
    pub errors: Option<Vec<SyncIssue>>,
}

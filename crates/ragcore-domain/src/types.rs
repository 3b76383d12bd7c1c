use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::DomainError;

/// Newtype wrapper shared by every stable stringly-typed id in the data model.
macro_rules! newtype_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

newtype_id!(EndpointId);
newtype_id!(UnitId);
newtype_id!(NodeId);
newtype_id!(EdgeId);
newtype_id!(RunId);
newtype_id!(ObservationId);
newtype_id!(DriverId);
newtype_id!(SinkId);

/// The four-level tenancy key gating every read. `orgId` is mandatory; the rest narrow further.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub org_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
}

impl Scope {
    pub fn org(org_id: impl Into<String>) -> Self {
        Self {
            org_id: org_id.into(),
            domain_id: None,
            project_id: None,
            team_id: None,
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.org_id.trim().is_empty() {
            return Err(DomainError::InvalidScope("orgId must not be empty".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------------------------
// Endpoint
// ---------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: EndpointId,
    /// Derived slug, stable across renames of `display_name`.
    pub source_id: String,
    pub display_name: String,
    pub driver_id: DriverId,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_policy_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_id: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub config: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_version: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub delete_reason: Option<String>,
}

impl Endpoint {
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}

// ---------------------------------------------------------------------------------------------
// Ingestion unit
// ---------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunMode {
    Full,
    Incremental,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScheduleKind {
    Manual,
    Interval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitMode {
    Raw,
    Cdm,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionUnit {
    pub id: UnitId,
    pub kind: String,
    pub display_name: String,
    pub dataset_id: String,
    pub default_mode: RunMode,
    pub supported_modes: Vec<RunMode>,
    pub default_sink_id: SinkId,
    pub default_schedule_kind: ScheduleKind,
    #[serde(default)]
    pub default_interval_minutes: Option<u32>,
    #[serde(default)]
    pub default_policy: HashMap<String, Value>,
    #[serde(default)]
    pub cdm_model_id: Option<String>,
}

/// Per-unit override record. Free-form `policy` preserves unknown keys verbatim (§9) while
/// exposing the well-known `cursorField` / `primaryKeys` through accessors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitConfig {
    pub enabled: bool,
    pub run_mode: RunMode,
    pub mode: UnitMode,
    pub sink_id: Option<SinkId>,
    #[serde(default)]
    pub sink_endpoint_id: Option<EndpointId>,
    /// The object-store backend `startRun` stages batches through. `None` only when a caller
    /// has explicitly cleared it; `configure()` does not require it, but `startRun` does.
    #[serde(default = "UnitConfig::default_staging_provider_id")]
    pub staging_provider_id: Option<String>,
    pub schedule_kind: ScheduleKind,
    #[serde(default)]
    pub interval_minutes: Option<u32>,
    #[serde(default)]
    pub policy: HashMap<String, Value>,
    #[serde(default)]
    pub filter: Option<Value>,
}

impl UnitConfig {
    fn default_staging_provider_id() -> Option<String> {
        Some("default".to_string())
    }

    pub fn cursor_field(&self) -> Option<&str> {
        self.policy.get("cursorField").and_then(|v| v.as_str())
    }

    pub fn primary_keys(&self) -> Vec<String> {
        self.policy
            .get("primaryKeys")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// §4.1 configure() preconditions, independent of any sink/endpoint lookup.
    pub fn validate_shape(&self) -> Result<(), DomainError> {
        if self.schedule_kind == ScheduleKind::Interval {
            match self.interval_minutes {
                Some(m) if m >= 1 => {}
                _ => {
                    return Err(DomainError::InvalidConfig(
                        "INTERVAL schedule requires intervalMinutes >= 1".into(),
                    ))
                }
            }
        }
        if self.mode == UnitMode::Cdm && self.sink_endpoint_id.is_none() {
            return Err(DomainError::InvalidConfig(
                "cdm mode requires sinkEndpointId".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunState {
    Idle,
    Running,
    Succeeded,
    Failed,
    Paused,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed | RunState::Paused)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Idle => "IDLE",
            RunState::Running => "RUNNING",
            RunState::Succeeded => "SUCCEEDED",
            RunState::Failed => "FAILED",
            RunState::Paused => "PAUSED",
        };
        write!(f, "{s}")
    }
}

/// Ephemeral projection of a unit's latest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitStatus {
    pub unit_id: UnitId,
    pub state: RunState,
    #[serde(default)]
    pub last_run_id: Option<RunId>,
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub stats: HashMap<String, f64>,
    #[serde(default)]
    pub checkpoint: Option<Checkpoint>,
}

impl UnitStatus {
    pub fn idle(unit_id: UnitId) -> Self {
        Self {
            unit_id,
            state: RunState::Idle,
            last_run_id: None,
            last_run_at: None,
            last_error: None,
            stats: HashMap::new(),
            checkpoint: None,
        }
    }
}

/// An opaque driver-owned value, stored flat. The engine never inspects its shape — see the
/// checkpoint-flattening invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub value: Value,
    /// CAS token; incremented on every successful write.
    pub version: u64,
    pub last_success_unix: Option<i64>,
}

impl Checkpoint {
    pub fn empty() -> Self {
        Self {
            value: Value::Null,
            version: 0,
            last_success_unix: None,
        }
    }
}

// ---------------------------------------------------------------------------------------------
// Graph node / edge
// ---------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: NodeId,
    pub tenant_id: String,
    #[serde(default)]
    pub project_id: Option<String>,
    pub entity_type: String,
    pub display_name: String,
    #[serde(default)]
    pub canonical_path: Option<String>,
    #[serde(default)]
    pub source_system: Option<String>,
    #[serde(default)]
    pub spec_ref: Option<String>,
    #[serde(default)]
    pub properties: HashMap<String, Value>,
    pub version: u64,
    pub scope: Scope,
    #[serde(default)]
    pub origin_endpoint_id: Option<EndpointId>,
    #[serde(default)]
    pub origin_vendor: Option<String>,
    pub logical_key: String,
    #[serde(default)]
    pub external_id: HashMap<String, Value>,
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub provenance: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: EdgeId,
    pub tenant_id: String,
    #[serde(default)]
    pub project_id: Option<String>,
    pub edge_type: String,
    pub source_node_id: NodeId,
    pub target_node_id: NodeId,
    pub source_logical_key: String,
    pub target_logical_key: String,
    pub scope: Scope,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    pub logical_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------------------------
// Observed entity
// ---------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservationStatus {
    Pending,
    Matched,
    Created,
    Review,
    Merged,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservedEntity {
    pub id: ObservationId,
    pub tenant_id: String,
    pub source_type: String,
    pub source_id: String,
    #[serde(default)]
    pub source_url: Option<String>,
    pub payload: Value,
    pub observed_at: DateTime<Utc>,
    pub status: ObservationStatus,
    #[serde(default)]
    pub canonical_id: Option<String>,
    #[serde(default)]
    pub match_score: f64,
    #[serde(default)]
    pub matched_by: Option<String>,
}

// ---------------------------------------------------------------------------------------------
// Ingestion run
// ---------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionRun {
    pub id: RunId,
    pub endpoint_id: EndpointId,
    pub unit_id: UnitId,
    pub mode: RunMode,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    pub state: RunState,
    #[serde(default)]
    pub stats: HashMap<String, f64>,
    #[serde(default)]
    pub error: Option<String>,
}

impl IngestionRun {
    pub fn new(id: RunId, endpoint_id: EndpointId, unit_id: UnitId, mode: RunMode) -> Self {
        Self {
            id,
            endpoint_id,
            unit_id,
            mode,
            started_at: Utc::now(),
            ended_at: None,
            state: RunState::Running,
            stats: HashMap::new(),
            error: None,
        }
    }
}

// ---------------------------------------------------------------------------------------------
// Audit events (ambient supplement, §3.1)
// ---------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum AuditEvent {
    RunStarted {
        id: Uuid,
        at: DateTime<Utc>,
        endpoint_id: EndpointId,
        unit_id: UnitId,
        run_id: RunId,
    },
    RunSucceeded {
        id: Uuid,
        at: DateTime<Utc>,
        endpoint_id: EndpointId,
        unit_id: UnitId,
        run_id: RunId,
    },
    RunFailed {
        id: Uuid,
        at: DateTime<Utc>,
        endpoint_id: EndpointId,
        unit_id: UnitId,
        run_id: RunId,
        message: String,
    },
    RunPaused {
        id: Uuid,
        at: DateTime<Utc>,
        endpoint_id: EndpointId,
        unit_id: UnitId,
    },
    CheckpointReset {
        id: Uuid,
        at: DateTime<Utc>,
        endpoint_id: EndpointId,
        unit_id: UnitId,
    },
    UnitConfigured {
        id: Uuid,
        at: DateTime<Utc>,
        endpoint_id: EndpointId,
        unit_id: UnitId,
    },
    EndpointSoftDeleted {
        id: Uuid,
        at: DateTime<Utc>,
        endpoint_id: EndpointId,
    },
    ObservationResolved {
        id: Uuid,
        at: DateTime<Utc>,
        tenant_id: String,
        observation_id: ObservationId,
        status: ObservationStatus,
    },
}

impl AuditEvent {
    pub fn endpoint_id(&self) -> Option<&EndpointId> {
        match self {
            AuditEvent::RunStarted { endpoint_id, .. }
            | AuditEvent::RunSucceeded { endpoint_id, .. }
            | AuditEvent::RunFailed { endpoint_id, .. }
            | AuditEvent::RunPaused { endpoint_id, .. }
            | AuditEvent::CheckpointReset { endpoint_id, .. }
            | AuditEvent::UnitConfigured { endpoint_id, .. }
            | AuditEvent::EndpointSoftDeleted { endpoint_id, .. } => Some(endpoint_id),
            AuditEvent::ObservationResolved { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_requires_org_id() {
        let s = Scope {
            org_id: "".into(),
            domain_id: None,
            project_id: None,
            team_id: None,
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn interval_schedule_requires_positive_minutes() {
        let mut cfg = UnitConfig {
            enabled: true,
            run_mode: RunMode::Incremental,
            mode: UnitMode::Raw,
            sink_id: Some(SinkId::new("graph")),
            sink_endpoint_id: None,
            staging_provider_id: Some("default".into()),
            schedule_kind: ScheduleKind::Interval,
            interval_minutes: None,
            policy: HashMap::new(),
            filter: None,
        };
        assert!(cfg.validate_shape().is_err());
        cfg.interval_minutes = Some(0);
        assert!(cfg.validate_shape().is_err());
        cfg.interval_minutes = Some(5);
        assert!(cfg.validate_shape().is_ok());
    }

    #[test]
    fn cdm_mode_requires_sink_endpoint() {
        let cfg = UnitConfig {
            enabled: true,
            run_mode: RunMode::Full,
            mode: UnitMode::Cdm,
            sink_id: Some(SinkId::new("graph")),
            sink_endpoint_id: None,
            staging_provider_id: Some("default".into()),
            schedule_kind: ScheduleKind::Manual,
            interval_minutes: None,
            policy: HashMap::new(),
            filter: None,
        };
        assert!(cfg.validate_shape().is_err());
    }

    #[test]
    fn run_state_terminal_matrix() {
        assert!(!RunState::Idle.is_terminal());
        assert!(!RunState::Running.is_terminal());
        assert!(RunState::Succeeded.is_terminal());
        assert!(RunState::Failed.is_terminal());
        assert!(RunState::Paused.is_terminal());
    }
}

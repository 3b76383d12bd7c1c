use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Raw YAML representation of a bootstrap file (`endpoints.yml`): endpoint defaults plus their
/// unit overrides. Unknown keys under `config`/`policy` are preserved verbatim rather than
/// rejected, per the unit-configuration passthrough rule.
#[derive(Debug, Deserialize, Serialize)]
pub struct RawBootstrapFile {
    #[serde(default)]
    pub endpoints: Vec<RawEndpoint>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RawEndpoint {
    pub id: String,
    pub display_name: String,
    pub driver: String,
    pub url: String,
    pub auth_policy_ref: Option<String>,
    pub project_id: Option<String>,
    pub domain_id: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub config: HashMap<String, Value>,
    #[serde(default)]
    pub units: Vec<RawUnit>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RawUnit {
    pub id: String,
    #[serde(default)]
    pub enabled: bool,
    /// "full" or "incremental".
    pub run_mode: String,
    /// "raw" or "cdm".
    #[serde(default = "default_unit_mode")]
    pub mode: String,
    pub sink_id: Option<String>,
    pub sink_endpoint_id: Option<String>,
    #[serde(default)]
    pub staging_provider_id: Option<String>,
    /// "manual" or "interval".
    #[serde(default = "default_schedule_kind")]
    pub schedule_kind: String,
    pub interval_minutes: Option<u32>,
    #[serde(default)]
    pub policy: HashMap<String, Value>,
    pub filter: Option<Value>,
}

fn default_unit_mode() -> String {
    "raw".to_string()
}

fn default_schedule_kind() -> String {
    "manual".to_string()
}

use std::path::Path;

use ragcore_domain::{
    DriverId, Endpoint, EndpointId, RunMode, ScheduleKind, SinkId, UnitConfig, UnitId, UnitMode,
};
use tracing::debug;

use crate::error::ConfigError;
use crate::raw::{RawBootstrapFile, RawEndpoint, RawUnit};

/// One bootstrap endpoint plus its unit overrides, ready to be upserted through `MetadataStore`.
#[derive(Debug, Clone)]
pub struct EndpointSeed {
    pub endpoint: Endpoint,
    pub units: Vec<(UnitId, UnitConfig)>,
}

/// Load and convert a single bootstrap YAML file. Unlike the orchestration tool's recursive
/// directory walk over `enclave/config.yml` files, server bootstrap here is one flat file
/// (`endpoints.yml`) since endpoints are otherwise created through the control-plane API.
pub fn load_bootstrap_file(path: &Path) -> Result<Vec<EndpointSeed>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let raw: RawBootstrapFile = serde_yaml::from_str(&content).map_err(|e| ConfigError::YamlParse {
        path: path.display().to_string(),
        source: e,
    })?;

    debug!(endpoints = raw.endpoints.len(), path = %path.display(), "loaded bootstrap file");

    raw.endpoints
        .into_iter()
        .map(|e| convert_endpoint(e, path))
        .collect()
}

fn convert_endpoint(raw: RawEndpoint, path: &Path) -> Result<EndpointSeed, ConfigError> {
    let now = chrono::Utc::now();
    let units = raw
        .units
        .iter()
        .map(|u| convert_unit(u, path))
        .collect::<Result<Vec<_>, _>>()?;

    let endpoint = Endpoint {
        id: EndpointId::new(&raw.id),
        source_id: slugify(&raw.id),
        display_name: raw.display_name,
        driver_id: DriverId::new(&raw.driver),
        url: raw.url,
        auth_policy_ref: raw.auth_policy_ref,
        project_id: raw.project_id,
        domain_id: raw.domain_id,
        labels: raw.labels,
        config: raw.config,
        detected_version: None,
        capabilities: Vec::new(),
        created_at: now,
        updated_at: now,
        deleted_at: None,
        delete_reason: None,
    };

    Ok(EndpointSeed { endpoint, units })
}

fn convert_unit(raw: &RawUnit, path: &Path) -> Result<(UnitId, UnitConfig), ConfigError> {
    let run_mode = parse_run_mode(&raw.run_mode, path)?;
    let mode = parse_unit_mode(&raw.mode, path)?;
    let schedule_kind = parse_schedule_kind(&raw.schedule_kind, path)?;

    let config = UnitConfig {
        enabled: raw.enabled,
        run_mode,
        mode,
        sink_id: raw.sink_id.as_deref().map(SinkId::new),
        sink_endpoint_id: raw.sink_endpoint_id.as_deref().map(EndpointId::new),
        staging_provider_id: raw.staging_provider_id.clone().or_else(|| Some("default".to_string())),
        schedule_kind,
        interval_minutes: raw.interval_minutes,
        policy: raw.policy.clone(),
        filter: raw.filter.clone(),
    };
    config.validate_shape().map_err(|e| ConfigError::Conversion {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    Ok((UnitId::new(&raw.id), config))
}

fn slugify(id: &str) -> String {
    id.to_lowercase().replace([' ', '_'], "-")
}

fn parse_run_mode(s: &str, path: &Path) -> Result<RunMode, ConfigError> {
    match s {
        "full" => Ok(RunMode::Full),
        "incremental" => Ok(RunMode::Incremental),
        other => Err(ConfigError::Conversion {
            path: path.display().to_string(),
            message: format!("unknown run mode '{}'", other),
        }),
    }
}

fn parse_unit_mode(s: &str, path: &Path) -> Result<UnitMode, ConfigError> {
    match s {
        "raw" => Ok(UnitMode::Raw),
        "cdm" => Ok(UnitMode::Cdm),
        other => Err(ConfigError::Conversion {
            path: path.display().to_string(),
            message: format!("unknown unit mode '{}'", other),
        }),
    }
}

fn parse_schedule_kind(s: &str, path: &Path) -> Result<ScheduleKind, ConfigError> {
    match s {
        "manual" => Ok(ScheduleKind::Manual),
        "interval" => Ok(ScheduleKind::Interval),
        other => Err(ConfigError::Conversion {
            path: path.display().to_string(),
            message: format!("unknown schedule kind '{}'", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_fixture(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn loads_endpoint_with_units() {
        let f = write_fixture(
            r#"
endpoints:
  - id: ep1
    display_name: "GitHub org"
    driver: github
    url: "https://api.github.com"
    units:
      - id: repos
        enabled: true
        run_mode: incremental
        mode: raw
        schedule_kind: interval
        interval_minutes: 15
        policy:
          cursorField: updatedAt
          primaryKeys: [id]
"#,
        );
        let seeds = load_bootstrap_file(f.path()).unwrap();
        assert_eq!(seeds.len(), 1);
        assert_eq!(seeds[0].endpoint.id.as_str(), "ep1");
        assert_eq!(seeds[0].units.len(), 1);
        let (unit_id, cfg) = &seeds[0].units[0];
        assert_eq!(unit_id.as_str(), "repos");
        assert_eq!(cfg.cursor_field(), Some("updatedAt"));
        assert_eq!(cfg.primary_keys(), vec!["id".to_string()]);
    }

    #[test]
    fn rejects_interval_schedule_without_minutes() {
        let f = write_fixture(
            r#"
endpoints:
  - id: ep1
    display_name: "GitHub org"
    driver: github
    url: "https://api.github.com"
    units:
      - id: repos
        enabled: true
        run_mode: incremental
        mode: raw
        schedule_kind: interval
"#,
        );
        assert!(load_bootstrap_file(f.path()).is_err());
    }

    #[test]
    fn missing_file_returns_error() {
        let path = Path::new("/nonexistent/endpoints.yml");
        assert!(load_bootstrap_file(path).is_err());
    }
}

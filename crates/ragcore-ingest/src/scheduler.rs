use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use ragcore_domain::{Endpoint, RunState, ScheduleKind};
use ragcore_store::MetadataStore;
use tracing::{debug, warn};

use crate::engine::IngestionEngine;
use crate::error::IngestError;

/// Drives `INTERVAL`-scheduled units (§4.1 Scheduling). A unit fires at most once every
/// `intervalMinutes`, counted from the end of its last successful run; manual `startRun` calls
/// reset the clock the same way a scheduled run does, since both write `lastRunAt`. The
/// `(endpointId, unitId)` in-flight set on `IngestionEngine` is what actually enforces "at most
/// one run per unit" — this just decides when to ask.
pub struct Scheduler {
    engine: Arc<IngestionEngine>,
    store: Arc<dyn MetadataStore>,
}

impl Scheduler {
    pub fn new(engine: Arc<IngestionEngine>, store: Arc<dyn MetadataStore>) -> Self {
        Self { engine, store }
    }

    /// Discovers every unit on `endpoint` and starts a run for each enabled `INTERVAL` unit that
    /// is due and not already running. Returns the number of runs started.
    pub async fn tick(&self, endpoint: &Endpoint) -> Result<usize, IngestError> {
        let mut started = 0;
        for unit in self.engine.discover(endpoint).await? {
            let Some(config) = self.store.get_unit_config(&endpoint.id, &unit.id).await? else {
                continue;
            };
            if !config.enabled || config.schedule_kind != ScheduleKind::Interval {
                continue;
            }
            let Some(minutes) = config.interval_minutes else {
                continue;
            };

            let status = self.store.get_unit_status(&endpoint.id, &unit.id).await?;
            if status.as_ref().map(|s| s.state) == Some(RunState::Running) {
                continue;
            }
            let due = match status.and_then(|s| s.last_run_at) {
                None => true,
                Some(last) => Utc::now() - last >= ChronoDuration::minutes(minutes as i64),
            };
            if !due {
                continue;
            }

            match self.engine.start_run(&endpoint.id, &unit.id).await {
                Ok(_) => started += 1,
                Err(IngestError::AlreadyRunning) => {}
                Err(e) => warn!(
                    endpoint_id = %endpoint.id,
                    unit_id = %unit.id,
                    error = %e,
                    "scheduled run failed to start"
                ),
            }
        }
        debug!(endpoint_id = %endpoint.id, started, "scheduler tick complete");
        Ok(started)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragcore_domain::{DriverId, EndpointId, RunMode, SinkId, UnitConfig, UnitId, UnitMode};
    use ragcore_driver::DriverRegistry;
    use ragcore_driver::DemoDriver;
    use ragcore_sink::{GraphSink, SinkRegistry};
    use ragcore_store::{InMemoryStore, MetadataStore};
    use std::collections::HashMap;
    use std::time::Duration;

    fn endpoint() -> Endpoint {
        let now = Utc::now();
        Endpoint {
            id: EndpointId::new("ep1"),
            source_id: "demo".into(),
            display_name: "Demo".into(),
            driver_id: DriverId::new("demo"),
            url: "https://example.invalid".into(),
            auth_policy_ref: None,
            project_id: None,
            domain_id: None,
            labels: vec![],
            config: HashMap::new(),
            detected_version: None,
            capabilities: vec![],
            created_at: now,
            updated_at: now,
            deleted_at: None,
            delete_reason: None,
        }
    }

    async fn new_engine_and_store() -> (Arc<IngestionEngine>, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let mut drivers = DriverRegistry::new();
        drivers.register(DriverId::new("demo"), Arc::new(DemoDriver::new()));
        let mut sinks = SinkRegistry::new();
        sinks.register(SinkId::new("graph"), Arc::new(GraphSink::new(store.clone())));
        let engine = Arc::new(IngestionEngine::new(
            store.clone(),
            Arc::new(ragcore_kv::InMemoryKvStore::new()),
            Arc::new(drivers),
            Arc::new(sinks),
        ));
        (engine, store)
    }

    #[tokio::test]
    async fn never_run_interval_unit_is_due_immediately() {
        let (engine, store) = new_engine_and_store().await;
        let ep = endpoint();
        store.upsert_endpoint(ep.clone()).await.unwrap();
        let unit_id = UnitId::new("projects");
        engine
            .configure(
                &ep.id,
                &unit_id,
                UnitConfig {
                    enabled: true,
                    run_mode: RunMode::Incremental,
                    mode: UnitMode::Raw,
                    sink_id: Some(SinkId::new("graph")),
                    sink_endpoint_id: None,
                    staging_provider_id: Some("default".into()),
                    schedule_kind: ScheduleKind::Interval,
                    interval_minutes: Some(5),
                    policy: HashMap::new(),
                    filter: None,
                },
            )
            .await
            .unwrap();

        let scheduler = Scheduler::new(engine.clone(), store.clone());
        let started = scheduler.tick(&ep).await.unwrap();
        assert_eq!(started, 1);
        tokio::time::sleep(Duration::from_millis(20)).await;

        // A second tick right away must not fire again: one run is still in flight or just
        // completed and the clock hasn't elapsed.
        let started_again = scheduler.tick(&ep).await.unwrap();
        assert_eq!(started_again, 0);
    }

    #[tokio::test]
    async fn manual_schedule_units_are_never_triggered() {
        let (engine, store) = new_engine_and_store().await;
        let ep = endpoint();
        store.upsert_endpoint(ep.clone()).await.unwrap();
        let unit_id = UnitId::new("projects");
        engine
            .configure(
                &ep.id,
                &unit_id,
                UnitConfig {
                    enabled: true,
                    run_mode: RunMode::Incremental,
                    mode: UnitMode::Raw,
                    sink_id: Some(SinkId::new("graph")),
                    sink_endpoint_id: None,
                    staging_provider_id: Some("default".into()),
                    schedule_kind: ScheduleKind::Manual,
                    interval_minutes: None,
                    policy: HashMap::new(),
                    filter: None,
                },
            )
            .await
            .unwrap();

        let scheduler = Scheduler::new(engine, store);
        assert_eq!(scheduler.tick(&ep).await.unwrap(), 0);
    }
}

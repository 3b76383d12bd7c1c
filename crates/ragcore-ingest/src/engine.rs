use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use ragcore_domain::{
    AuditEvent, Checkpoint, Endpoint, EndpointId, IngestionRun, IngestionUnit, RunState, SinkId,
    UnitConfig, UnitId, UnitStatus,
};
use ragcore_driver::{Driver, DriverRegistry};
use ragcore_kv::KvStore;
use ragcore_sink::{Sink, SinkCtx, SinkRegistry};
use ragcore_store::MetadataStore;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::IngestError;
use crate::retry::{retry_if_transient, RetryPolicy};

/// Records handed to the driver per `syncUnit` call. One run pulls at most this many records
/// before the driver must hand back a checkpoint to resume from.
const SYNC_LIMIT: usize = 500;

/// Owns the per-unit run state machine (§4.1). One instance is shared (via `Arc`) between the
/// control plane, the scheduler, and every in-flight run's background task.
pub struct IngestionEngine {
    store: Arc<dyn MetadataStore>,
    kv: Arc<dyn KvStore>,
    drivers: Arc<DriverRegistry>,
    sinks: Arc<SinkRegistry>,
    retry_policy: RetryPolicy,
    in_flight: RwLock<HashSet<(EndpointId, UnitId)>>,
    cancel_requested: RwLock<HashSet<(EndpointId, UnitId)>>,
}

impl IngestionEngine {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        kv: Arc<dyn KvStore>,
        drivers: Arc<DriverRegistry>,
        sinks: Arc<SinkRegistry>,
    ) -> Self {
        Self {
            store,
            kv,
            drivers,
            sinks,
            retry_policy: RetryPolicy::default(),
            in_flight: RwLock::new(HashSet::new()),
            cancel_requested: RwLock::new(HashSet::new()),
        }
    }

    /// Key the primary per-unit checkpoint is stored under in the CAS-versioned `KvStore`.
    /// Distinct from `CheckpointFacility`'s namespace, which is for downstream post-ingestion
    /// hooks keyed by tenant scope rather than `(endpointId, unitId)`.
    fn checkpoint_key(endpoint_id: &EndpointId, unit_id: &UnitId) -> String {
        format!("ingest|checkpoint|{endpoint_id}|{unit_id}")
    }

    /// Reads the primary checkpoint flat, with the `KvStore`'s own version as the CAS token.
    /// Returns `Checkpoint::empty()` (version 0) when nothing has been written yet.
    async fn load_checkpoint(
        &self,
        endpoint_id: &EndpointId,
        unit_id: &UnitId,
    ) -> Result<Checkpoint, IngestError> {
        let key = Self::checkpoint_key(endpoint_id, unit_id);
        match self.kv.get(&key).await? {
            Some(versioned) => {
                let last_success_unix = versioned.value.get("last_success_unix").and_then(Value::as_i64);
                let value = versioned
                    .value
                    .get("value")
                    .cloned()
                    .unwrap_or(Value::Null);
                Ok(Checkpoint {
                    value,
                    version: versioned.version,
                    last_success_unix,
                })
            }
            None => Ok(Checkpoint::empty()),
        }
    }

    /// Persists `checkpoint` with CAS against `expected_version` (the version `load_checkpoint`
    /// last observed). A concurrent writer landing first surfaces as `KvError::Conflict`, mapped
    /// to `IngestError::Kv` and, via `kind()`, to the `CONFLICT` taxonomy entry.
    async fn save_checkpoint(
        &self,
        endpoint_id: &EndpointId,
        unit_id: &UnitId,
        checkpoint: &Checkpoint,
        expected_version: u64,
    ) -> Result<(), IngestError> {
        let key = Self::checkpoint_key(endpoint_id, unit_id);
        let payload = serde_json::json!({
            "value": checkpoint.value,
            "last_success_unix": checkpoint.last_success_unix,
        });
        self.kv.put(&key, payload, expected_version).await?;
        Ok(())
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub async fn discover(&self, endpoint: &Endpoint) -> Result<Vec<IngestionUnit>, IngestError> {
        let driver = self.drivers.for_endpoint(endpoint)?;
        Ok(driver.list_units(endpoint).await?)
    }

    pub async fn configure(
        &self,
        endpoint_id: &EndpointId,
        unit_id: &UnitId,
        config: UnitConfig,
    ) -> Result<(), IngestError> {
        config
            .validate_shape()
            .map_err(|e| IngestError::InvalidConfig(e.to_string()))?;
        if let Some(sink_id) = &config.sink_id {
            self.sinks
                .for_id(sink_id)
                .map_err(|e| IngestError::InvalidConfig(e.to_string()))?;
        }

        self.store
            .put_unit_config(endpoint_id, unit_id, config)
            .await?;
        self.store
            .append_event(AuditEvent::UnitConfigured {
                id: Uuid::new_v4(),
                at: Utc::now(),
                endpoint_id: endpoint_id.clone(),
                unit_id: unit_id.clone(),
            })
            .await?;
        Ok(())
    }

    pub async fn status(&self, endpoint_id: &EndpointId) -> Result<Vec<UnitStatus>, IngestError> {
        Ok(self.store.list_unit_statuses(endpoint_id).await?)
    }

    pub async fn reset_checkpoint(
        &self,
        endpoint_id: &EndpointId,
        unit_id: &UnitId,
    ) -> Result<(), IngestError> {
        let current_version = self.load_checkpoint(endpoint_id, unit_id).await?.version;
        self.kv
            .delete(&Self::checkpoint_key(endpoint_id, unit_id), current_version)
            .await?;

        let mut status = self
            .store
            .get_unit_status(endpoint_id, unit_id)
            .await?
            .unwrap_or_else(|| UnitStatus::idle(unit_id.clone()));
        status.checkpoint = None; // idempotent: no-op when already absent
        self.store
            .put_unit_status(endpoint_id, unit_id, status)
            .await?;
        self.store
            .append_event(AuditEvent::CheckpointReset {
                id: Uuid::new_v4(),
                at: Utc::now(),
                endpoint_id: endpoint_id.clone(),
                unit_id: unit_id.clone(),
            })
            .await?;
        Ok(())
    }

    pub async fn pause_run(
        &self,
        endpoint_id: &EndpointId,
        unit_id: &UnitId,
    ) -> Result<(), IngestError> {
        self.cancel_requested
            .write()
            .expect("lock")
            .insert((endpoint_id.clone(), unit_id.clone()));
        Ok(())
    }

    fn is_cancel_requested(&self, endpoint_id: &EndpointId, unit_id: &UnitId) -> bool {
        self.cancel_requested
            .read()
            .expect("lock")
            .contains(&(endpoint_id.clone(), unit_id.clone()))
    }

    /// `startRun` (§4.1). Validates preconditions, creates the run record synchronously, then
    /// drives the sync-to-sink cycle on a background task so callers (and `pauseRun`) are not
    /// blocked on a potentially long-running driver call.
    pub async fn start_run(
        self: &Arc<Self>,
        endpoint_id: &EndpointId,
        unit_id: &UnitId,
    ) -> Result<ragcore_domain::RunId, IngestError> {
        let endpoint = self
            .store
            .get_endpoint(endpoint_id)
            .await?
            .filter(Endpoint::is_active)
            .ok_or_else(|| IngestError::NotConfigured(endpoint_id.to_string()))?;

        let config = self
            .store
            .get_unit_config(endpoint_id, unit_id)
            .await?
            .filter(|c| c.enabled)
            .ok_or_else(|| IngestError::NotConfigured(unit_id.to_string()))?;

        let sink_id = config.sink_id.clone().ok_or(IngestError::MissingSink)?;
        config
            .staging_provider_id
            .clone()
            .ok_or(IngestError::MissingStagingProvider)?;

        let key = (endpoint_id.clone(), unit_id.clone());
        {
            let mut in_flight = self.in_flight.write().expect("lock");
            if in_flight.contains(&key) {
                return Err(IngestError::AlreadyRunning);
            }
            in_flight.insert(key.clone());
        }
        self.cancel_requested.write().expect("lock").remove(&key);

        if let Some(status) = self.store.get_unit_status(endpoint_id, unit_id).await? {
            if status.state == RunState::Running {
                self.in_flight.write().expect("lock").remove(&key);
                return Err(IngestError::AlreadyRunning);
            }
        }

        let run = IngestionRun::new(
            ragcore_domain::RunId::new(Uuid::new_v4().to_string()),
            endpoint_id.clone(),
            unit_id.clone(),
            config.run_mode,
        );
        let run = self.store.create_run(run).await?;

        let mut status = self
            .store
            .get_unit_status(endpoint_id, unit_id)
            .await?
            .unwrap_or_else(|| UnitStatus::idle(unit_id.clone()));
        status.state = RunState::Running;
        status.last_run_id = Some(run.id.clone());
        self.store
            .put_unit_status(endpoint_id, unit_id, status)
            .await?;

        self.store
            .append_event(AuditEvent::RunStarted {
                id: Uuid::new_v4(),
                at: Utc::now(),
                endpoint_id: endpoint_id.clone(),
                unit_id: unit_id.clone(),
                run_id: run.id.clone(),
            })
            .await?;

        let run_id = run.id.clone();
        let engine = self.clone();
        let endpoint = endpoint.clone();
        let sink_id = sink_id.clone();
        tokio::spawn(async move {
            engine.execute_run(endpoint, config, sink_id, run).await;
        });

        Ok(run_id)
    }

    async fn execute_run(
        self: Arc<Self>,
        endpoint: Endpoint,
        config: UnitConfig,
        sink_id: SinkId,
        mut run: IngestionRun,
    ) {
        let key = (endpoint.id.clone(), run.unit_id.clone());
        let outcome = self.try_execute_run(&endpoint, &config, &sink_id, &run).await;
        self.in_flight.write().expect("lock").remove(&key);
        self.cancel_requested.write().expect("lock").remove(&key);

        match outcome {
            Ok(RunOutcome::Succeeded { stats, checkpoint }) => {
                run.state = RunState::Succeeded;
                run.ended_at = Some(Utc::now());
                run.stats = stats.clone();
                let _ = self.store.update_run(run.clone()).await;

                let mut status = self
                    .store
                    .get_unit_status(&endpoint.id, &run.unit_id)
                    .await
                    .ok()
                    .flatten()
                    .unwrap_or_else(|| UnitStatus::idle(run.unit_id.clone()));
                status.state = RunState::Succeeded;
                status.last_run_at = Some(Utc::now());
                status.last_error = None;
                status.stats = stats;
                status.checkpoint = Some(checkpoint);
                let _ = self
                    .store
                    .put_unit_status(&endpoint.id, &run.unit_id, status)
                    .await;

                let _ = self
                    .store
                    .append_event(AuditEvent::RunSucceeded {
                        id: Uuid::new_v4(),
                        at: Utc::now(),
                        endpoint_id: endpoint.id.clone(),
                        unit_id: run.unit_id.clone(),
                        run_id: run.id.clone(),
                    })
                    .await;
                info!(endpoint_id = %endpoint.id, unit_id = %run.unit_id, run_id = %run.id, "run succeeded");
            }
            Ok(RunOutcome::Paused { stats }) => {
                run.state = RunState::Paused;
                run.ended_at = Some(Utc::now());
                run.stats = stats.clone();
                let _ = self.store.update_run(run.clone()).await;

                let mut status = self
                    .store
                    .get_unit_status(&endpoint.id, &run.unit_id)
                    .await
                    .ok()
                    .flatten()
                    .unwrap_or_else(|| UnitStatus::idle(run.unit_id.clone()));
                status.state = RunState::Paused;
                status.stats = stats;
                let _ = self
                    .store
                    .put_unit_status(&endpoint.id, &run.unit_id, status)
                    .await;

                let _ = self
                    .store
                    .append_event(AuditEvent::RunPaused {
                        id: Uuid::new_v4(),
                        at: Utc::now(),
                        endpoint_id: endpoint.id.clone(),
                        unit_id: run.unit_id.clone(),
                    })
                    .await;
                info!(endpoint_id = %endpoint.id, unit_id = %run.unit_id, run_id = %run.id, "run paused");
            }
            Err(e) => {
                let message = e.sanitized_message();
                run.state = RunState::Failed;
                run.ended_at = Some(Utc::now());
                run.error = Some(message.clone());
                let _ = self.store.update_run(run.clone()).await;

                let mut status = self
                    .store
                    .get_unit_status(&endpoint.id, &run.unit_id)
                    .await
                    .ok()
                    .flatten()
                    .unwrap_or_else(|| UnitStatus::idle(run.unit_id.clone()));
                status.state = RunState::Failed;
                status.last_error = Some(message.clone());
                let _ = self
                    .store
                    .put_unit_status(&endpoint.id, &run.unit_id, status)
                    .await;

                let _ = self
                    .store
                    .append_event(AuditEvent::RunFailed {
                        id: Uuid::new_v4(),
                        at: Utc::now(),
                        endpoint_id: endpoint.id.clone(),
                        unit_id: run.unit_id.clone(),
                        run_id: run.id.clone(),
                        message: message.clone(),
                    })
                    .await;
                warn!(endpoint_id = %endpoint.id, unit_id = %run.unit_id, run_id = %run.id, error = %message, "run failed");
            }
        }
    }

    async fn try_execute_run(
        &self,
        endpoint: &Endpoint,
        config: &UnitConfig,
        sink_id: &SinkId,
        run: &IngestionRun,
    ) -> Result<RunOutcome, IngestError> {
        let driver = self.drivers.for_endpoint(endpoint)?;
        let sink = self.sinks.for_id(sink_id)?;

        // The CAS version travels with the stored checkpoint regardless of run mode — a FULL run
        // still has to win the same race against a concurrent writer that an INCREMENTAL one does.
        let stored_checkpoint = self.load_checkpoint(&endpoint.id, &run.unit_id).await?;
        // FULL mode always starts from scratch; the stored checkpoint is only the resume point
        // for INCREMENTAL runs, and gets overwritten on success either way.
        let resume_value = if config.run_mode == ragcore_domain::RunMode::Full {
            Value::Null
        } else {
            stored_checkpoint.value.clone()
        };

        let endpoint_for_retry = endpoint.clone();
        let unit_id = run.unit_id.clone();
        let checkpoint_value = resume_value;
        let outcome = retry_if_transient(self.retry_policy, || {
            let driver = driver.clone();
            let endpoint = endpoint_for_retry.clone();
            let unit_id = unit_id.clone();
            let checkpoint_value = checkpoint_value.clone();
            async move {
                driver
                    .sync_unit(&endpoint, &unit_id, checkpoint_value, SYNC_LIMIT)
                    .await
                    .map_err(IngestError::from)
            }
        })
        .await?;

        let ctx = SinkCtx {
            run_id: run.id.clone(),
            endpoint_id: endpoint.id.clone(),
            unit_id: run.unit_id.clone(),
        };
        sink.begin(&ctx).await?;

        let mut stats: HashMap<String, f64> = outcome.stats.clone();
        let mut paused = false;
        for batch in &outcome.batches {
            if self.is_cancel_requested(&endpoint.id, &run.unit_id) {
                paused = true;
                break;
            }
            match sink.write_batch(batch, &ctx).await {
                Ok(write_stats) => {
                    *stats.entry("upserts".to_string()).or_insert(0.0) += write_stats.upserts as f64;
                    *stats.entry("edges".to_string()).or_insert(0.0) += write_stats.edges as f64;
                }
                Err(e) => {
                    let _ = sink.abort(&ctx, &e.to_string()).await;
                    return Err(IngestError::from(e));
                }
            }
        }

        if paused {
            // Batches already written stay committed; the checkpoint only advances once every
            // batch from this sync_unit call has landed, so the prior one is preserved.
            let _ = sink.commit(&ctx, &stats).await;
            return Ok(RunOutcome::Paused { stats });
        }

        sink.commit(&ctx, &stats).await?;

        let new_checkpoint = Checkpoint {
            value: outcome.new_checkpoint,
            version: stored_checkpoint.version + 1,
            last_success_unix: Some(Utc::now().timestamp()),
        };
        // CAS against the version this run observed at the start; a concurrent writer that landed
        // in between surfaces as `KvError::Conflict` here, propagated as `IngestError::Kv`.
        self.save_checkpoint(
            &endpoint.id,
            &run.unit_id,
            &new_checkpoint,
            stored_checkpoint.version,
        )
        .await?;

        if let Some(issues) = &outcome.errors {
            for issue in issues {
                warn!(message = %issue.message, "driver reported a non-fatal sync issue");
            }
        }

        Ok(RunOutcome::Succeeded {
            stats,
            checkpoint: new_checkpoint,
        })
    }
}

enum RunOutcome {
    Succeeded {
        stats: HashMap<String, f64>,
        checkpoint: Checkpoint,
    },
    Paused {
        stats: HashMap<String, f64>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragcore_domain::{DriverId, RunMode, ScheduleKind, UnitMode};
    use ragcore_driver::DemoDriver;
    use ragcore_kv::InMemoryKvStore;
    use ragcore_sink::GraphSink;
    use ragcore_store::{InMemoryStore, MetadataStore};
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

    fn unit_config() -> UnitConfig {
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
        }
    }

    async fn new_engine() -> (Arc<IngestionEngine>, Arc<InMemoryStore>) {
        let (engine, store, _kv) = new_engine_with_kv().await;
        (engine, store)
    }

    async fn new_engine_with_kv() -> (Arc<IngestionEngine>, Arc<InMemoryStore>, Arc<InMemoryKvStore>) {
        let store = Arc::new(InMemoryStore::new());
        let kv = Arc::new(InMemoryKvStore::new());
        let mut drivers = DriverRegistry::new();
        drivers.register(DriverId::new("demo"), Arc::new(DemoDriver::new()));
        let mut sinks = SinkRegistry::new();
        sinks.register(SinkId::new("graph"), Arc::new(GraphSink::new(store.clone())));
        let engine = Arc::new(IngestionEngine::new(
            store.clone(),
            kv.clone(),
            Arc::new(drivers),
            Arc::new(sinks),
        ));
        store.upsert_endpoint(endpoint()).await.unwrap();
        (engine, store, kv)
    }

    #[tokio::test]
    async fn start_run_without_configure_fails_not_configured() {
        let (engine, _store) = new_engine().await;
        let err = engine
            .start_run(&EndpointId::new("ep1"), &UnitId::new("projects"))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn first_successful_run_advances_checkpoint_and_populates_graph() {
        let (engine, store) = new_engine().await;
        let endpoint_id = EndpointId::new("ep1");
        let unit_id = UnitId::new("projects");
        engine.configure(&endpoint_id, &unit_id, unit_config()).await.unwrap();

        engine.start_run(&endpoint_id, &unit_id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let status = store
            .get_unit_status(&endpoint_id, &unit_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status.state, RunState::Succeeded);
        assert!(status.checkpoint.is_some());
        assert_eq!(status.checkpoint.unwrap().value, serde_json::json!({"page": 1}));
    }

    #[tokio::test]
    async fn second_run_is_a_no_op_tick_and_preserves_checkpoint() {
        let (engine, store) = new_engine().await;
        let endpoint_id = EndpointId::new("ep1");
        let unit_id = UnitId::new("projects");
        engine.configure(&endpoint_id, &unit_id, unit_config()).await.unwrap();

        engine.start_run(&endpoint_id, &unit_id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        engine.start_run(&endpoint_id, &unit_id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let status = store
            .get_unit_status(&endpoint_id, &unit_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status.state, RunState::Succeeded);
        assert_eq!(status.checkpoint.unwrap().value, serde_json::json!({"page": 2}));
    }

    #[tokio::test]
    async fn concurrent_start_while_running_is_rejected() {
        let (engine, _store) = new_engine().await;
        let endpoint_id = EndpointId::new("ep1");
        let unit_id = UnitId::new("projects");
        engine.configure(&endpoint_id, &unit_id, unit_config()).await.unwrap();

        engine.start_run(&endpoint_id, &unit_id).await.unwrap();
        let err = engine.start_run(&endpoint_id, &unit_id).await.unwrap_err();
        assert!(matches!(err, IngestError::AlreadyRunning));
    }

    #[tokio::test]
    async fn reset_checkpoint_is_idempotent() {
        let (engine, _store) = new_engine().await;
        let endpoint_id = EndpointId::new("ep1");
        let unit_id = UnitId::new("projects");
        engine.reset_checkpoint(&endpoint_id, &unit_id).await.unwrap();
        engine.reset_checkpoint(&endpoint_id, &unit_id).await.unwrap();
    }

    #[tokio::test]
    async fn start_run_without_staging_provider_fails() {
        let (engine, _store) = new_engine().await;
        let endpoint_id = EndpointId::new("ep1");
        let unit_id = UnitId::new("projects");
        let mut config = unit_config();
        config.staging_provider_id = None;
        engine.configure(&endpoint_id, &unit_id, config).await.unwrap();

        let err = engine.start_run(&endpoint_id, &unit_id).await.unwrap_err();
        assert!(matches!(err, IngestError::MissingStagingProvider));
    }

    #[tokio::test]
    async fn checkpoint_is_persisted_through_kv_store_not_just_unit_status() {
        let (engine, _store, kv) = new_engine_with_kv().await;
        let endpoint_id = EndpointId::new("ep1");
        let unit_id = UnitId::new("projects");
        engine.configure(&endpoint_id, &unit_id, unit_config()).await.unwrap();

        engine.start_run(&endpoint_id, &unit_id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let key = IngestionEngine::checkpoint_key(&endpoint_id, &unit_id);
        let stored = kv.get(&key).await.unwrap().expect("checkpoint written through KvStore");
        assert_eq!(stored.version, 1);
        assert_eq!(stored.value["value"], serde_json::json!({"page": 1}));
    }

    #[tokio::test]
    async fn a_writer_that_lands_first_forces_the_next_checkpoint_write_to_conflict() {
        let (engine, store, kv) = new_engine_with_kv().await;
        let endpoint_id = EndpointId::new("ep1");
        let unit_id = UnitId::new("projects");
        engine.configure(&endpoint_id, &unit_id, unit_config()).await.unwrap();

        // Simulate a second writer (e.g. another engine instance) advancing the checkpoint
        // between this run's read and its CAS write.
        let key = IngestionEngine::checkpoint_key(&endpoint_id, &unit_id);
        kv.put(&key, serde_json::json!({"value": {"page": 99}, "last_success_unix": null}), 0)
            .await
            .unwrap();

        engine.start_run(&endpoint_id, &unit_id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let status = store.get_unit_status(&endpoint_id, &unit_id).await.unwrap().unwrap();
        assert_eq!(status.state, RunState::Failed);
        assert!(status.last_error.as_deref().unwrap_or("").contains("conflict"));
    }
}

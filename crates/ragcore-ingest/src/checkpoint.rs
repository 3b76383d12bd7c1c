use ragcore_domain::Scope;
use ragcore_kv::{KvStore, VersionedValue};
use serde_json::Value;
use std::sync::Arc;

use crate::error::IngestError;

/// Composite key for a downstream stage's checkpoint, namespaced by tenant and an arbitrary
/// caller-chosen key (e.g. `"index_offset"`). Distinct from the per-unit checkpoint the engine
/// reads/writes through `MetadataStore`, which is keyed implicitly by `(endpointId, unitId)`.
fn checkpoint_key(scope: &Scope, key: &str) -> String {
    format!(
        "ckpt|{}|{}|{}",
        scope.org_id,
        scope.project_id.as_deref().unwrap_or(""),
        key
    )
}

/// `readCheckpoint`/`writeCheckpoint` facility (§4.1 post-ingestion hooks): any stage downstream
/// of the sink (e.g. an indexer that commits up to an offset) stores its own checkpoint under its
/// own key, through the same CAS-versioned store the engine uses for the primary one, so it obeys
/// the same flattening invariant without the engine needing to know about it.
pub struct CheckpointFacility {
    kv: Arc<dyn KvStore>,
}

impl CheckpointFacility {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub async fn read(&self, scope: &Scope, key: &str) -> Result<Option<VersionedValue>, IngestError> {
        Ok(self.kv.get(&checkpoint_key(scope, key)).await?)
    }

    pub async fn write(
        &self,
        scope: &Scope,
        key: &str,
        value: Value,
        expected_version: u64,
    ) -> Result<VersionedValue, IngestError> {
        Ok(self
            .kv
            .put(&checkpoint_key(scope, key), value, expected_version)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragcore_kv::InMemoryKvStore;
    use serde_json::json;

    #[tokio::test]
    async fn write_then_read_round_trips_by_scope_and_key() {
        let facility = CheckpointFacility::new(Arc::new(InMemoryKvStore::new()));
        let scope = Scope::org("acme");
        facility
            .write(&scope, "index_offset", json!({"offset": 10}), 0)
            .await
            .unwrap();
        let got = facility.read(&scope, "index_offset").await.unwrap().unwrap();
        assert_eq!(got.value, json!({"offset": 10}));
        assert_eq!(got.version, 1);
    }

    #[tokio::test]
    async fn distinct_keys_do_not_collide() {
        let facility = CheckpointFacility::new(Arc::new(InMemoryKvStore::new()));
        let scope = Scope::org("acme");
        facility.write(&scope, "a", json!(1), 0).await.unwrap();
        assert!(facility.read(&scope, "b").await.unwrap().is_none());
    }
}

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::KvError;
use crate::store::{KvStore, VersionedValue};

/// `Arc<RwLock<..>>`-backed KV store, the default/test-friendly C1 backend.
#[derive(Default)]
pub struct InMemoryKvStore {
    inner: RwLock<HashMap<String, VersionedValue>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<VersionedValue>, KvError> {
        let guard = self.inner.read().expect("kv lock poisoned");
        Ok(guard.get(key).cloned())
    }

    async fn put(
        &self,
        key: &str,
        value: Value,
        expected_version: u64,
    ) -> Result<VersionedValue, KvError> {
        let mut guard = self.inner.write().expect("kv lock poisoned");
        let actual = guard.get(key).map(|v| v.version).unwrap_or(0);
        if actual != expected_version {
            return Err(KvError::Conflict {
                key: key.to_string(),
                expected: expected_version,
                actual,
            });
        }
        let next = VersionedValue {
            value,
            version: actual + 1,
        };
        guard.insert(key.to_string(), next.clone());
        Ok(next)
    }

    async fn delete(&self, key: &str, expected_version: u64) -> Result<(), KvError> {
        let mut guard = self.inner.write().expect("kv lock poisoned");
        let actual = guard.get(key).map(|v| v.version).unwrap_or(0);
        if actual == 0 {
            return Ok(()); // idempotent: nothing to delete
        }
        if actual != expected_version {
            return Err(KvError::Conflict {
                key: key.to_string(),
                expected: expected_version,
                actual,
            });
        }
        guard.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = InMemoryKvStore::new();
        let v = store.put("a", json!({"x": 1}), 0).await.unwrap();
        assert_eq!(v.version, 1);
        let got = store.get("a").await.unwrap().unwrap();
        assert_eq!(got.value, json!({"x": 1}));
    }

    #[tokio::test]
    async fn put_with_stale_version_conflicts() {
        let store = InMemoryKvStore::new();
        store.put("a", json!(1), 0).await.unwrap();
        let err = store.put("a", json!(2), 0).await.unwrap_err();
        assert!(matches!(err, KvError::Conflict { .. }));
    }

    #[tokio::test]
    async fn reset_checkpoint_on_absent_key_is_idempotent() {
        let store = InMemoryKvStore::new();
        store.delete("missing", 0).await.unwrap();
    }

    #[tokio::test]
    async fn delete_with_correct_version_succeeds() {
        let store = InMemoryKvStore::new();
        let v = store.put("a", json!(1), 0).await.unwrap();
        store.delete("a", v.version).await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());
    }
}

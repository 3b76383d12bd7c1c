use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::BlobError;
use crate::store::{BlobMeta, BlobStore};

#[derive(Default)]
pub struct InMemoryBlobStore {
    inner: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), BlobError> {
        self.inner
            .write()
            .expect("blob lock poisoned")
            .insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        self.inner
            .read()
            .expect("blob lock poisoned")
            .get(key)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        self.inner.write().expect("blob lock poisoned").remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<BlobMeta>, BlobError> {
        let guard = self.inner.read().expect("blob lock poisoned");
        Ok(guard
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| BlobMeta {
                key: k.clone(),
                size: v.len() as u64,
                created_at: Utc::now(),
            })
            .collect())
    }

    async fn presign(&self, key: &str, ttl_seconds: u64) -> Result<String, BlobError> {
        if !self.inner.read().expect("blob lock poisoned").contains_key(key) {
            return Err(BlobError::NotFound(key.to_string()));
        }
        Ok(format!("memory://{key}?ttl={ttl_seconds}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = InMemoryBlobStore::new();
        store.put("run1-1.jsonl", b"hello".to_vec()).await.unwrap();
        assert_eq!(store.get("run1-1.jsonl").await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let store = InMemoryBlobStore::new();
        let err = store.get("missing").await.unwrap_err();
        assert!(matches!(err, BlobError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_filters_by_prefix() {
        let store = InMemoryBlobStore::new();
        store.put("run1-1.jsonl", vec![1]).await.unwrap();
        store.put("run2-1.jsonl", vec![1]).await.unwrap();
        let listed = store.list("run1").await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn prune_removes_old_batches() {
        let store = InMemoryBlobStore::new();
        store.put("run1-1.jsonl", vec![1]).await.unwrap(); // nanos=1 -> ancient
        let removed = store.prune_older_than("run1", 1).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.get("run1-1.jsonl").await.is_err());
    }
}

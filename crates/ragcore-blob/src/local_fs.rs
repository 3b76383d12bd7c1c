use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::BlobError;
use crate::store::{BlobMeta, BlobStore};

/// Filesystem-backed C2 store. Creates the root directory on open, mirroring the orchestration
/// tool's `RedbStore::open` "create parent dirs, open" idiom.
pub struct LocalFsBlobStore {
    root: PathBuf,
}

impl LocalFsBlobStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, BlobError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl BlobStore for LocalFsBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), BlobError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        debug!(key, "LocalFsBlobStore: put");
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(key.to_string()))
            }
            Err(e) => Err(BlobError::Io(e)),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) | Err(_) => Ok(()),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<BlobMeta>, BlobError> {
        let mut out = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(BlobError::Io(e)),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with(prefix) {
                continue;
            }
            let meta = entry.metadata().await?;
            let created_at: DateTime<Utc> = meta
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            out.push(BlobMeta {
                key: name,
                size: meta.len(),
                created_at,
            });
        }
        Ok(out)
    }

    async fn presign(&self, key: &str, ttl_seconds: u64) -> Result<String, BlobError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Err(BlobError::NotFound(key.to_string()));
        }
        Ok(format!("file://{}?ttl={ttl_seconds}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = LocalFsBlobStore::open(dir.path()).unwrap();
        store.put("run1-1.jsonl", b"abc".to_vec()).await.unwrap();
        assert_eq!(store.get("run1-1.jsonl").await.unwrap(), b"abc");
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = LocalFsBlobStore::open(dir.path()).unwrap();
            store.put("run1-1.jsonl", b"abc".to_vec()).await.unwrap();
        }
        let store = LocalFsBlobStore::open(dir.path()).unwrap();
        assert_eq!(store.get("run1-1.jsonl").await.unwrap(), b"abc");
    }

    #[tokio::test]
    async fn delete_missing_is_noop() {
        let dir = TempDir::new().unwrap();
        let store = LocalFsBlobStore::open(dir.path()).unwrap();
        store.delete("missing").await.unwrap();
    }
}

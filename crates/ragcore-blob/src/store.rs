use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::BlobError;

#[derive(Debug, Clone)]
pub struct BlobMeta {
    pub key: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

/// Opaque byte storage for staged batches and snapshots (C2). Keys follow the staging-blob
/// filename convention: `{runId}-{nanos}.jsonl` for batches, `{runId}.snapshot.json` for
/// snapshots.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), BlobError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobError>;

    async fn delete(&self, key: &str) -> Result<(), BlobError>;

    async fn list(&self, prefix: &str) -> Result<Vec<BlobMeta>, BlobError>;

    /// Returns a URL (real backends) or an opaque reference (in-memory backend) valid for
    /// `ttl_seconds`.
    async fn presign(&self, key: &str, ttl_seconds: u64) -> Result<String, BlobError>;

    /// Deletes every blob under `prefix` whose trailing numeric field (the `{nanos}` component of
    /// the batch filename convention) is older than `retention_days * 86400` seconds. Returns the
    /// number of blobs removed.
    async fn prune_older_than(&self, prefix: &str, retention_days: u32) -> Result<u64, BlobError> {
        let cutoff = Utc::now().timestamp_nanos_opt().unwrap_or(0)
            - (retention_days as i64) * 86_400 * 1_000_000_000;
        let mut removed = 0;
        for meta in self.list(prefix).await? {
            if let Some(nanos) = trailing_numeric_field(&meta.key) {
                if nanos < cutoff {
                    self.delete(&meta.key).await?;
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}

/// Extracts the trailing run of ASCII digits from a blob key, e.g. `run1-12345.jsonl` -> `12345`.
pub fn trailing_numeric_field(key: &str) -> Option<i64> {
    let stem = key.rsplit('/').next().unwrap_or(key);
    let stem = stem.split('.').next().unwrap_or(stem);
    stem.rfind('-')?;
    let digits: String = stem
        .rsplit('-')
        .next()
        .unwrap_or("")
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_trailing_nanos() {
        assert_eq!(trailing_numeric_field("run1-1700000000000000000.jsonl"), Some(1700000000000000000));
        assert_eq!(trailing_numeric_field("run1.snapshot.json"), None);
    }
}

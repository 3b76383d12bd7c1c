use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::KvError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionedValue {
    pub value: Value,
    pub version: u64,
}

/// Versioned, CAS-capable per-key storage (C1). Every write carries the version the caller last
/// observed; a mismatch is a `Conflict`, never a silent overwrite.
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<VersionedValue>, KvError>;

    /// Writes `value` under `key`. `expected_version` must equal the stored version (`0` if the
    /// key doesn't exist yet); on mismatch returns `KvError::Conflict` and does not write.
    async fn put(
        &self,
        key: &str,
        value: Value,
        expected_version: u64,
    ) -> Result<VersionedValue, KvError>;

    /// Deletes `key` if present and `expected_version` matches. Idempotent: deleting an absent
    /// key with `expected_version == 0` succeeds without error.
    async fn delete(&self, key: &str, expected_version: u64) -> Result<(), KvError>;
}

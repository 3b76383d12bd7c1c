use serde_json::Value;
use sqlx::PgPool;

use async_trait::async_trait;
use tracing::debug;

use crate::error::KvError;
use crate::store::{KvStore, VersionedValue};

const MIGRATIONS: &str = r#"
CREATE TABLE IF NOT EXISTS ragcore_kv (
    key        TEXT PRIMARY KEY,
    value      JSONB NOT NULL,
    version    BIGINT NOT NULL
);
"#;

/// Postgres-backed C1 store. CAS is implemented with `INSERT ... ON CONFLICT DO NOTHING` followed
/// by a conditional `UPDATE`, the same optimistic-lock idiom the orchestration tool's Terraform
/// HTTP-state backend uses for `lock_tf_state`.
#[derive(Clone)]
pub struct PostgresKvStore {
    pool: PgPool,
}

impl PostgresKvStore {
    pub async fn connect(url: &str) -> Result<Self, KvError> {
        let pool = PgPool::connect(url)
            .await
            .map_err(|e| KvError::Backend(e.to_string()))?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), KvError> {
        sqlx::query(MIGRATIONS)
            .execute(&self.pool)
            .await
            .map_err(|e| KvError::Backend(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl KvStore for PostgresKvStore {
    async fn get(&self, key: &str) -> Result<Option<VersionedValue>, KvError> {
        let row: Option<(Value, i64)> =
            sqlx::query_as("SELECT value, version FROM ragcore_kv WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| KvError::Backend(e.to_string()))?;
        Ok(row.map(|(value, version)| VersionedValue {
            value,
            version: version as u64,
        }))
    }

    async fn put(
        &self,
        key: &str,
        value: Value,
        expected_version: u64,
    ) -> Result<VersionedValue, KvError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| KvError::Backend(e.to_string()))?;

        let current: Option<(i64,)> =
            sqlx::query_as("SELECT version FROM ragcore_kv WHERE key = $1 FOR UPDATE")
                .bind(key)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| KvError::Backend(e.to_string()))?;
        let actual = current.map(|(v,)| v as u64).unwrap_or(0);
        if actual != expected_version {
            debug!(key, expected_version, actual, "CAS conflict on kv put");
            return Err(KvError::Conflict {
                key: key.to_string(),
                expected: expected_version,
                actual,
            });
        }

        let next_version = actual as i64 + 1;
        sqlx::query(
            "INSERT INTO ragcore_kv (key, value, version) VALUES ($1, $2, $3)
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, version = EXCLUDED.version",
        )
        .bind(key)
        .bind(&value)
        .bind(next_version)
        .execute(&mut *tx)
        .await
        .map_err(|e| KvError::Backend(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| KvError::Backend(e.to_string()))?;

        Ok(VersionedValue {
            value,
            version: next_version as u64,
        })
    }

    async fn delete(&self, key: &str, expected_version: u64) -> Result<(), KvError> {
        let current = self.get(key).await?;
        let actual = match current {
            None => return Ok(()), // idempotent
            Some(v) => v.version,
        };
        if actual != expected_version {
            return Err(KvError::Conflict {
                key: key.to_string(),
                expected: expected_version,
                actual,
            });
        }
        sqlx::query("DELETE FROM ragcore_kv WHERE key = $1 AND version = $2")
            .bind(key)
            .bind(actual as i64)
            .execute(&self.pool)
            .await
            .map_err(|e| KvError::Backend(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn connect() -> Option<PostgresKvStore> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        PostgresKvStore::connect(&url).await.ok()
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL"]
    async fn put_then_get_round_trips() {
        let Some(store) = connect().await else {
            return;
        };
        let v = store.put("kv-test-a", json!({"x": 1}), 0).await.unwrap();
        assert_eq!(v.version, 1);
        let got = store.get("kv-test-a").await.unwrap().unwrap();
        assert_eq!(got.value, json!({"x": 1}));
    }
}

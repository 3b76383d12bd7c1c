use async_trait::async_trait;
use chrono::Utc;
use ragcore_domain::{
    edge_logical_key, node_logical_key, AuditEvent, Endpoint, EndpointId, GraphEdge, GraphNode,
    IngestionRun, NodeId, RunId, UnitConfig, UnitId, UnitStatus,
};
use serde_json::Value;
use sqlx::PgPool;
use tracing::info;

use crate::error::StoreError;
use crate::filter::{Direction, EdgeFilter, NodeFilter};
use crate::graph_store::{cosine_similarity, EdgeUpsert, GraphStore, NodeUpsert};
use crate::metadata_store::MetadataStore;

const MIGRATIONS: &str = r#"
CREATE TABLE IF NOT EXISTS ragcore_endpoints (
    id           TEXT PRIMARY KEY,
    project_id   TEXT,
    display_name TEXT NOT NULL,
    deleted_at   TIMESTAMPTZ,
    data         JSONB NOT NULL
);

CREATE TABLE IF NOT EXISTS ragcore_unit_configs (
    endpoint_id TEXT NOT NULL,
    unit_id     TEXT NOT NULL,
    data        JSONB NOT NULL,
    PRIMARY KEY (endpoint_id, unit_id)
);

CREATE TABLE IF NOT EXISTS ragcore_unit_statuses (
    endpoint_id TEXT NOT NULL,
    unit_id     TEXT NOT NULL,
    data        JSONB NOT NULL,
    PRIMARY KEY (endpoint_id, unit_id)
);

CREATE TABLE IF NOT EXISTS ragcore_runs (
    id          TEXT PRIMARY KEY,
    endpoint_id TEXT NOT NULL,
    data        JSONB NOT NULL
);

CREATE TABLE IF NOT EXISTS ragcore_events (
    seq         BIGSERIAL PRIMARY KEY,
    endpoint_id TEXT,
    data        JSONB NOT NULL
);

CREATE TABLE IF NOT EXISTS ragcore_nodes (
    id          TEXT PRIMARY KEY,
    org_id      TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    logical_key TEXT NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL,
    data        JSONB NOT NULL,
    UNIQUE (org_id, logical_key)
);

CREATE TABLE IF NOT EXISTS ragcore_edges (
    id              TEXT PRIMARY KEY,
    org_id          TEXT NOT NULL,
    edge_type       TEXT NOT NULL,
    source_node_id  TEXT NOT NULL,
    target_node_id  TEXT NOT NULL,
    logical_key     TEXT NOT NULL,
    created_at      TIMESTAMPTZ NOT NULL,
    data            JSONB NOT NULL,
    UNIQUE (org_id, logical_key)
);

CREATE TABLE IF NOT EXISTS ragcore_embeddings (
    entity_id  TEXT NOT NULL,
    model_id   TEXT NOT NULL,
    org_id     TEXT NOT NULL,
    vector     JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (entity_id, model_id)
);
"#;

/// Postgres-backed C3+C4 store. Node/edge identity is enforced by a unique `(org_id,
/// logical_key)` index; upserts run inside a transaction with `FOR UPDATE` so concurrent writers
/// to the same logical entity serialize the same way `PostgresKvStore::put` does.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(url)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let store = Self { pool };
        store.migrate().await?;
        info!("metadata store migrations applied");
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(MIGRATIONS)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for PostgresStore {
    async fn get_endpoint(&self, id: &EndpointId) -> Result<Option<Endpoint>, StoreError> {
        let row: Option<(Value,)> =
            sqlx::query_as("SELECT data FROM ragcore_endpoints WHERE id = $1")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        row.map(|(v,)| serde_json::from_value(v).map_err(StoreError::Serialization))
            .transpose()
    }

    async fn list_endpoints(
        &self,
        project_id: Option<&str>,
        search: Option<&str>,
        first: usize,
    ) -> Result<Vec<Endpoint>, StoreError> {
        let rows: Vec<(Value,)> = sqlx::query_as(
            "SELECT data FROM ragcore_endpoints
             WHERE deleted_at IS NULL
               AND ($1::text IS NULL OR project_id = $1)
               AND ($2::text IS NULL OR display_name ILIKE '%' || $2 || '%')
             ORDER BY (data->>'created_at') DESC",
        )
        .bind(project_id)
        .bind(search)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        let mut out = Vec::with_capacity(rows.len());
        for (v,) in rows {
            out.push(serde_json::from_value(v).map_err(StoreError::Serialization)?);
        }
        if first > 0 {
            out.truncate(first);
        }
        Ok(out)
    }

    async fn upsert_endpoint(&self, endpoint: Endpoint) -> Result<Endpoint, StoreError> {
        let data = serde_json::to_value(&endpoint).map_err(StoreError::Serialization)?;
        sqlx::query(
            "INSERT INTO ragcore_endpoints (id, project_id, display_name, deleted_at, data)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (id) DO UPDATE SET
               project_id = EXCLUDED.project_id,
               display_name = EXCLUDED.display_name,
               deleted_at = EXCLUDED.deleted_at,
               data = EXCLUDED.data",
        )
        .bind(endpoint.id.as_str())
        .bind(&endpoint.project_id)
        .bind(&endpoint.display_name)
        .bind(endpoint.deleted_at)
        .bind(&data)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(endpoint)
    }

    async fn soft_delete_endpoint(&self, id: &EndpointId, reason: &str) -> Result<(), StoreError> {
        let mut endpoint = self
            .get_endpoint(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        endpoint.deleted_at = Some(Utc::now());
        endpoint.delete_reason = Some(reason.to_string());
        self.upsert_endpoint(endpoint).await?;
        Ok(())
    }

    async fn get_unit_config(
        &self,
        endpoint_id: &EndpointId,
        unit_id: &UnitId,
    ) -> Result<Option<UnitConfig>, StoreError> {
        let row: Option<(Value,)> = sqlx::query_as(
            "SELECT data FROM ragcore_unit_configs WHERE endpoint_id = $1 AND unit_id = $2",
        )
        .bind(endpoint_id.as_str())
        .bind(unit_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        row.map(|(v,)| serde_json::from_value(v).map_err(StoreError::Serialization))
            .transpose()
    }

    async fn put_unit_config(
        &self,
        endpoint_id: &EndpointId,
        unit_id: &UnitId,
        config: UnitConfig,
    ) -> Result<(), StoreError> {
        let data = serde_json::to_value(&config).map_err(StoreError::Serialization)?;
        sqlx::query(
            "INSERT INTO ragcore_unit_configs (endpoint_id, unit_id, data) VALUES ($1, $2, $3)
             ON CONFLICT (endpoint_id, unit_id) DO UPDATE SET data = EXCLUDED.data",
        )
        .bind(endpoint_id.as_str())
        .bind(unit_id.as_str())
        .bind(&data)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get_unit_status(
        &self,
        endpoint_id: &EndpointId,
        unit_id: &UnitId,
    ) -> Result<Option<UnitStatus>, StoreError> {
        let row: Option<(Value,)> = sqlx::query_as(
            "SELECT data FROM ragcore_unit_statuses WHERE endpoint_id = $1 AND unit_id = $2",
        )
        .bind(endpoint_id.as_str())
        .bind(unit_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        row.map(|(v,)| serde_json::from_value(v).map_err(StoreError::Serialization))
            .transpose()
    }

    async fn put_unit_status(
        &self,
        endpoint_id: &EndpointId,
        unit_id: &UnitId,
        status: UnitStatus,
    ) -> Result<(), StoreError> {
        let data = serde_json::to_value(&status).map_err(StoreError::Serialization)?;
        sqlx::query(
            "INSERT INTO ragcore_unit_statuses (endpoint_id, unit_id, data) VALUES ($1, $2, $3)
             ON CONFLICT (endpoint_id, unit_id) DO UPDATE SET data = EXCLUDED.data",
        )
        .bind(endpoint_id.as_str())
        .bind(unit_id.as_str())
        .bind(&data)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn list_unit_statuses(
        &self,
        endpoint_id: &EndpointId,
    ) -> Result<Vec<UnitStatus>, StoreError> {
        let rows: Vec<(Value,)> =
            sqlx::query_as("SELECT data FROM ragcore_unit_statuses WHERE endpoint_id = $1")
                .bind(endpoint_id.as_str())
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        rows.into_iter()
            .map(|(v,)| serde_json::from_value(v).map_err(StoreError::Serialization))
            .collect()
    }

    async fn create_run(&self, run: IngestionRun) -> Result<IngestionRun, StoreError> {
        self.update_run(run).await
    }

    async fn update_run(&self, run: IngestionRun) -> Result<IngestionRun, StoreError> {
        let data = serde_json::to_value(&run).map_err(StoreError::Serialization)?;
        sqlx::query(
            "INSERT INTO ragcore_runs (id, endpoint_id, data) VALUES ($1, $2, $3)
             ON CONFLICT (id) DO UPDATE SET data = EXCLUDED.data",
        )
        .bind(run.id.as_str())
        .bind(run.endpoint_id.as_str())
        .bind(&data)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(run)
    }

    async fn get_run(&self, id: &RunId) -> Result<Option<IngestionRun>, StoreError> {
        let row: Option<(Value,)> = sqlx::query_as("SELECT data FROM ragcore_runs WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        row.map(|(v,)| serde_json::from_value(v).map_err(StoreError::Serialization))
            .transpose()
    }

    async fn append_event(&self, event: AuditEvent) -> Result<(), StoreError> {
        let data = serde_json::to_value(&event).map_err(StoreError::Serialization)?;
        sqlx::query("INSERT INTO ragcore_events (endpoint_id, data) VALUES ($1, $2)")
            .bind(event.endpoint_id().map(|id| id.as_str()))
            .bind(&data)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn list_events(
        &self,
        endpoint_id: Option<&EndpointId>,
        limit: usize,
    ) -> Result<Vec<AuditEvent>, StoreError> {
        let rows: Vec<(Value,)> = sqlx::query_as(
            "SELECT data FROM ragcore_events
             WHERE $1::text IS NULL OR endpoint_id = $1
             ORDER BY seq DESC
             LIMIT $2",
        )
        .bind(endpoint_id.map(|id| id.as_str()))
        .bind(if limit == 0 { i64::MAX } else { limit as i64 })
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        let mut out: Vec<AuditEvent> = rows
            .into_iter()
            .map(|(v,)| serde_json::from_value(v).map_err(StoreError::Serialization))
            .collect::<Result<_, _>>()?;
        out.reverse();
        Ok(out)
    }
}

#[async_trait]
impl GraphStore for PostgresStore {
    async fn upsert_node(&self, input: NodeUpsert) -> Result<GraphNode, StoreError> {
        input
            .scope
            .validate()
            .map_err(|_| StoreError::TenantMismatch)?;
        let logical_key = node_logical_key(
            &input.entity_type,
            &input.scope.org_id,
            input.scope.project_id.as_deref(),
            input.scope.domain_id.as_deref(),
            input.scope.team_id.as_deref(),
            input.origin_endpoint_id.as_ref().map(|e| e.as_str()),
            input.origin_vendor.as_deref(),
            input.canonical_path.as_deref(),
            input.fallback_id.as_deref(),
            &serde_json::to_value(&input.external_id).unwrap_or(Value::Null),
        );

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let existing: Option<(Value,)> = sqlx::query_as(
            "SELECT data FROM ragcore_nodes WHERE org_id = $1 AND logical_key = $2 FOR UPDATE",
        )
        .bind(&input.scope.org_id)
        .bind(&logical_key)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        let now = Utc::now();
        let node = if let Some((raw,)) = existing {
            let mut merged: GraphNode =
                serde_json::from_value(raw).map_err(StoreError::Serialization)?;
            merged.version += 1;
            merged.display_name = input.display_name;
            for (k, v) in input.properties {
                merged.properties.insert(k, v);
            }
            if input.canonical_path.is_some() {
                merged.canonical_path = input.canonical_path;
            }
            if input.source_system.is_some() {
                merged.source_system = input.source_system;
            }
            if input.origin_endpoint_id.is_some() {
                merged.origin_endpoint_id = input.origin_endpoint_id;
            }
            if input.origin_vendor.is_some() {
                merged.origin_vendor = input.origin_vendor;
            }
            for (k, v) in input.provenance {
                merged.provenance.insert(k, v);
            }
            if input.phase.is_some() {
                merged.phase = input.phase;
            }
            merged.updated_at = now;
            merged
        } else {
            GraphNode {
                id: input
                    .id
                    .unwrap_or_else(|| NodeId::new(uuid::Uuid::new_v4().to_string())),
                tenant_id: input.tenant_id,
                project_id: input.project_id,
                entity_type: input.entity_type,
                display_name: input.display_name,
                canonical_path: input.canonical_path,
                source_system: input.source_system,
                spec_ref: input.spec_ref,
                properties: input.properties,
                version: 1,
                scope: input.scope,
                origin_endpoint_id: input.origin_endpoint_id,
                origin_vendor: input.origin_vendor,
                logical_key: logical_key.clone(),
                external_id: input.external_id,
                phase: input.phase,
                provenance: input.provenance,
                created_at: now,
                updated_at: now,
            }
        };

        let data = serde_json::to_value(&node).map_err(StoreError::Serialization)?;
        sqlx::query(
            "INSERT INTO ragcore_nodes (id, org_id, entity_type, logical_key, created_at, data)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (id) DO UPDATE SET
               entity_type = EXCLUDED.entity_type,
               data = EXCLUDED.data",
        )
        .bind(node.id.as_str())
        .bind(&node.scope.org_id)
        .bind(&node.entity_type)
        .bind(&node.logical_key)
        .bind(node.created_at)
        .bind(&data)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(node)
    }

    async fn get_node(&self, org_id: &str, id: &NodeId) -> Result<Option<GraphNode>, StoreError> {
        let row: Option<(Value,)> =
            sqlx::query_as("SELECT data FROM ragcore_nodes WHERE id = $1 AND org_id = $2")
                .bind(id.as_str())
                .bind(org_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        row.map(|(v,)| serde_json::from_value(v).map_err(StoreError::Serialization))
            .transpose()
    }

    async fn get_node_by_logical_key(
        &self,
        org_id: &str,
        logical_key: &str,
    ) -> Result<Option<GraphNode>, StoreError> {
        let row: Option<(Value,)> = sqlx::query_as(
            "SELECT data FROM ragcore_nodes WHERE org_id = $1 AND logical_key = $2",
        )
        .bind(org_id)
        .bind(logical_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        row.map(|(v,)| serde_json::from_value(v).map_err(StoreError::Serialization))
            .transpose()
    }

    async fn upsert_edge(&self, input: EdgeUpsert) -> Result<GraphEdge, StoreError> {
        input
            .scope
            .validate()
            .map_err(|_| StoreError::TenantMismatch)?;

        let source = self
            .get_node(&input.scope.org_id, &input.source_node_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(input.source_node_id.to_string()))?;
        let target = self
            .get_node(&input.scope.org_id, &input.target_node_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(input.target_node_id.to_string()))?;
        if source.scope.org_id != target.scope.org_id {
            return Err(StoreError::CrossScopeEdge {
                source_org: source.scope.org_id,
                target_org: target.scope.org_id,
            });
        }

        let logical_key = edge_logical_key(
            &input.edge_type,
            &input.scope.org_id,
            input.scope.project_id.as_deref(),
            input.scope.domain_id.as_deref(),
            input.scope.team_id.as_deref(),
            input.origin_endpoint_id.as_ref().map(|e| e.as_str()),
            input.origin_vendor.as_deref(),
            &source.logical_key,
            &target.logical_key,
        );

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let existing: Option<(Value,)> = sqlx::query_as(
            "SELECT data FROM ragcore_edges WHERE org_id = $1 AND logical_key = $2 FOR UPDATE",
        )
        .bind(&input.scope.org_id)
        .bind(&logical_key)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        let now = Utc::now();
        let created_at = existing
            .as_ref()
            .map(|(raw,)| {
                serde_json::from_value::<GraphEdge>(raw.clone())
                    .map(|e| e.created_at)
                    .unwrap_or(now)
            })
            .unwrap_or(now);
        let id = existing
            .as_ref()
            .and_then(|(raw,)| serde_json::from_value::<GraphEdge>(raw.clone()).ok())
            .map(|e| e.id)
            .or(input.id)
            .unwrap_or_else(|| ragcore_domain::EdgeId::new(uuid::Uuid::new_v4().to_string()));

        let edge = GraphEdge {
            id: id.clone(),
            tenant_id: input.tenant_id,
            project_id: input.project_id,
            edge_type: input.edge_type,
            source_node_id: input.source_node_id,
            target_node_id: input.target_node_id,
            source_logical_key: source.logical_key,
            target_logical_key: target.logical_key,
            scope: input.scope,
            confidence: input.confidence,
            metadata: input.metadata,
            logical_key: logical_key.clone(),
            created_at,
            updated_at: now,
        };

        let data = serde_json::to_value(&edge).map_err(StoreError::Serialization)?;
        sqlx::query(
            "INSERT INTO ragcore_edges
               (id, org_id, edge_type, source_node_id, target_node_id, logical_key, created_at, data)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (id) DO UPDATE SET data = EXCLUDED.data",
        )
        .bind(edge.id.as_str())
        .bind(&edge.scope.org_id)
        .bind(&edge.edge_type)
        .bind(edge.source_node_id.as_str())
        .bind(edge.target_node_id.as_str())
        .bind(&edge.logical_key)
        .bind(edge.created_at)
        .bind(&data)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(edge)
    }

    async fn list_nodes(&self, org_id: &str, filter: NodeFilter) -> Result<Vec<GraphNode>, StoreError> {
        let rows: Vec<(Value,)> = sqlx::query_as(
            "SELECT data FROM ragcore_nodes
             WHERE org_id = $1 AND ($2::text[] IS NULL OR entity_type = ANY($2))
             ORDER BY created_at DESC",
        )
        .bind(org_id)
        .bind(if filter.entity_types.is_empty() {
            None
        } else {
            Some(filter.entity_types.clone())
        })
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        let mut out: Vec<GraphNode> = rows
            .into_iter()
            .map(|(v,)| serde_json::from_value(v).map_err(StoreError::Serialization))
            .collect::<Result<_, _>>()?;
        if filter.limit > 0 {
            out.truncate(filter.limit);
        }
        Ok(out)
    }

    async fn list_edges(&self, org_id: &str, filter: EdgeFilter) -> Result<Vec<GraphEdge>, StoreError> {
        let rows: Vec<(Value,)> = sqlx::query_as(
            "SELECT data FROM ragcore_edges
             WHERE org_id = $1
               AND ($2::text[] IS NULL OR edge_type = ANY($2))
               AND ($3::text IS NULL OR source_node_id = $3 OR target_node_id = $3)
             ORDER BY created_at DESC",
        )
        .bind(org_id)
        .bind(if filter.edge_types.is_empty() {
            None
        } else {
            Some(filter.edge_types.clone())
        })
        .bind(filter.node_id.as_ref().map(|id| id.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        let mut out: Vec<GraphEdge> = rows
            .into_iter()
            .map(|(v,)| serde_json::from_value(v).map_err(StoreError::Serialization))
            .collect::<Result<_, _>>()?;
        if filter.limit > 0 {
            out.truncate(filter.limit);
        }
        Ok(out)
    }

    async fn neighbors(
        &self,
        org_id: &str,
        node_id: &NodeId,
        edge_types: &[String],
        direction: Direction,
        per_node_limit: usize,
    ) -> Result<Vec<(GraphEdge, NodeId)>, StoreError> {
        let filter = EdgeFilter {
            edge_types: edge_types.to_vec(),
            node_id: Some(node_id.clone()),
            limit: 0,
        };
        let edges = self.list_edges(org_id, filter).await?;
        let mut out = Vec::new();
        for edge in edges {
            let other = if &edge.source_node_id == node_id
                && matches!(direction, Direction::Outgoing | Direction::Both)
            {
                Some(edge.target_node_id.clone())
            } else if &edge.target_node_id == node_id
                && matches!(direction, Direction::Incoming | Direction::Both)
            {
                Some(edge.source_node_id.clone())
            } else {
                None
            };
            if let Some(other) = other {
                out.push((edge, other));
            }
            if per_node_limit > 0 && out.len() >= per_node_limit {
                break;
            }
        }
        Ok(out)
    }

    async fn put_embedding(
        &self,
        org_id: &str,
        entity_id: &NodeId,
        vector: Vec<f32>,
        model_id: &str,
    ) -> Result<(), StoreError> {
        if self.get_node(org_id, entity_id).await?.is_none() {
            return Err(StoreError::NotFound(entity_id.to_string()));
        }
        let vector_json = serde_json::to_value(&vector).map_err(StoreError::Serialization)?;
        sqlx::query(
            "INSERT INTO ragcore_embeddings (entity_id, model_id, org_id, vector, created_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (entity_id, model_id) DO UPDATE SET
               vector = EXCLUDED.vector, created_at = EXCLUDED.created_at",
        )
        .bind(entity_id.as_str())
        .bind(model_id)
        .bind(org_id)
        .bind(&vector_json)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn search_embeddings(
        &self,
        org_id: &str,
        query: &[f32],
        limit: usize,
        model_id: Option<&str>,
    ) -> Result<Vec<(NodeId, f32)>, StoreError> {
        let rows: Vec<(String, Value)> = sqlx::query_as(
            "SELECT entity_id, vector FROM ragcore_embeddings
             WHERE org_id = $1 AND ($2::text IS NULL OR model_id = $2)",
        )
        .bind(org_id)
        .bind(model_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        let mut scored: Vec<(NodeId, f32)> = rows
            .into_iter()
            .filter_map(|(id, v)| {
                let vec: Vec<f32> = serde_json::from_value(v).ok()?;
                Some((NodeId::new(id), cosine_similarity(query, &vec)))
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
        scored.truncate(limit);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn connect() -> Option<PostgresStore> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        PostgresStore::connect(&url).await.ok()
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL"]
    async fn upsert_node_twice_merges_by_logical_key() {
        let Some(store) = connect().await else {
            return;
        };
        let input = |name: &str| NodeUpsert {
            id: None,
            tenant_id: "org-pg-test".into(),
            project_id: None,
            entity_type: "project".into(),
            display_name: name.into(),
            canonical_path: None,
            source_system: None,
            spec_ref: None,
            properties: Default::default(),
            scope: ragcore_domain::Scope::org("org-pg-test"),
            origin_endpoint_id: None,
            origin_vendor: None,
            external_id: Default::default(),
            phase: None,
            provenance: Default::default(),
            fallback_id: None,
        };
        let n1 = store.upsert_node(input("Alpha")).await.unwrap();
        let n2 = store.upsert_node(input("Alpha Renamed")).await.unwrap();
        assert_eq!(n1.id, n2.id);
        assert_eq!(n2.version, n1.version + 1);
    }
}

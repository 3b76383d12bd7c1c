use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use ragcore_domain::{Endpoint, EndpointId, NodeId, UnitConfig, UnitId};
use ragcore_graphrag::{
    BuildContextRequest, ContextBuilderConfig, ExpandGraphRequest, ExpansionFilter,
    GenerateAnswerRequest, RagContext,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;

// ── Health ────────────────────────────────────────────────────────────────────

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn ready(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.store.list_endpoints(None, None, 1).await?;
    Ok(StatusCode::OK)
}

// ── Endpoints ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListEndpointsQuery {
    pub project_id: Option<String>,
    pub search: Option<String>,
    pub first: Option<usize>,
}

pub async fn list_endpoints(
    State(state): State<AppState>,
    Query(q): Query<ListEndpointsQuery>,
) -> Result<Json<Value>, ApiError> {
    let endpoints = state
        .store
        .list_endpoints(q.project_id.as_deref(), q.search.as_deref(), q.first.unwrap_or(100))
        .await?;
    Ok(Json(json!(endpoints)))
}

#[derive(Debug, Deserialize)]
pub struct CreateEndpointBody {
    pub id: String,
    pub source_id: String,
    pub display_name: String,
    pub driver_id: String,
    pub url: String,
    #[serde(default)]
    pub auth_policy_ref: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub domain_id: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub config: std::collections::HashMap<String, Value>,
}

pub async fn create_endpoint(
    State(state): State<AppState>,
    Json(body): Json<CreateEndpointBody>,
) -> Result<Json<Value>, ApiError> {
    let now = Utc::now();
    let endpoint = Endpoint {
        id: EndpointId::new(body.id),
        source_id: body.source_id,
        display_name: body.display_name,
        driver_id: ragcore_domain::DriverId::new(body.driver_id),
        url: body.url,
        auth_policy_ref: body.auth_policy_ref,
        project_id: body.project_id,
        domain_id: body.domain_id,
        labels: body.labels,
        config: body.config,
        detected_version: None,
        capabilities: Vec::new(),
        created_at: now,
        updated_at: now,
        deleted_at: None,
        delete_reason: None,
    };
    let saved = state.store.upsert_endpoint(endpoint).await?;
    Ok(Json(json!(saved)))
}

pub async fn get_endpoint(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let eid = EndpointId::new(&id);
    let endpoint = state
        .store
        .get_endpoint(&eid)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("endpoint '{id}' not found")))?;
    Ok(Json(json!(endpoint)))
}

#[derive(Debug, Deserialize)]
pub struct DeleteEndpointBody {
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn delete_endpoint(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<DeleteEndpointBody>,
) -> Result<StatusCode, ApiError> {
    let eid = EndpointId::new(&id);
    state
        .store
        .get_endpoint(&eid)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("endpoint '{id}' not found")))?;
    let reason = body.reason.unwrap_or_else(|| "deleted via API".to_string());
    state.store.soft_delete_endpoint(&eid, &reason).await?;
    Ok(StatusCode::OK)
}

// ── Units ─────────────────────────────────────────────────────────────────────

pub async fn list_units(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let eid = EndpointId::new(&id);
    let endpoint = state
        .store
        .get_endpoint(&eid)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("endpoint '{id}' not found")))?;

    let units = state.engine.discover(&endpoint).await?;
    let statuses = state.engine.status(&eid).await?;
    let by_unit: std::collections::HashMap<_, _> =
        statuses.into_iter().map(|s| (s.unit_id.clone(), s)).collect();

    let projected: Vec<Value> = units
        .into_iter()
        .map(|u| {
            let status = by_unit.get(&u.id).cloned();
            json!({ "unit": u, "status": status })
        })
        .collect();
    Ok(Json(json!(projected)))
}

pub async fn configure_unit(
    State(state): State<AppState>,
    Path((endpoint_id, unit_id)): Path<(String, String)>,
    Json(config): Json<UnitConfig>,
) -> Result<StatusCode, ApiError> {
    state
        .engine
        .configure(&EndpointId::new(endpoint_id), &UnitId::new(unit_id), config)
        .await?;
    Ok(StatusCode::OK)
}

pub async fn start_unit(
    State(state): State<AppState>,
    Path((endpoint_id, unit_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let run_id = state
        .engine
        .start_run(&EndpointId::new(endpoint_id), &UnitId::new(unit_id))
        .await?;
    Ok(Json(json!({ "run_id": run_id })))
}

pub async fn pause_unit(
    State(state): State<AppState>,
    Path((endpoint_id, unit_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    state
        .engine
        .pause_run(&EndpointId::new(endpoint_id), &UnitId::new(unit_id))
        .await?;
    Ok(StatusCode::OK)
}

pub async fn reset_checkpoint(
    State(state): State<AppState>,
    Path((endpoint_id, unit_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    state
        .engine
        .reset_checkpoint(&EndpointId::new(endpoint_id), &UnitId::new(unit_id))
        .await?;
    Ok(StatusCode::OK)
}

// ── Events ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub endpoint_id: Option<String>,
    pub limit: Option<usize>,
}

pub async fn list_events(
    State(state): State<AppState>,
    Query(q): Query<EventsQuery>,
) -> Result<Json<Value>, ApiError> {
    let eid = q.endpoint_id.as_deref().map(EndpointId::new);
    let events = state.store.list_events(eid.as_ref(), q.limit.unwrap_or(100)).await?;
    Ok(Json(json!(events)))
}

// ── GraphRAG ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct BuildContextBody {
    pub tenant_id: String,
    pub query: String,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub config: Option<ContextBuilderConfigBody>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ContextBuilderConfigBody {
    pub top_k: Option<i64>,
    pub score_threshold: Option<f64>,
    pub max_hops: Option<i64>,
    pub max_nodes_per_hop: Option<i64>,
    pub max_total_nodes: Option<i64>,
    pub edge_types: Option<Vec<String>>,
    pub include_communities: Option<bool>,
    pub max_communities: Option<i64>,
    pub include_content: Option<bool>,
    pub max_content_length: Option<i64>,
}

impl From<ContextBuilderConfigBody> for ContextBuilderConfig {
    fn from(b: ContextBuilderConfigBody) -> Self {
        let d = ContextBuilderConfig::default();
        Self {
            top_k: b.top_k.unwrap_or(d.top_k),
            score_threshold: b.score_threshold.unwrap_or(d.score_threshold),
            max_hops: b.max_hops.unwrap_or(d.max_hops),
            max_nodes_per_hop: b.max_nodes_per_hop.unwrap_or(d.max_nodes_per_hop),
            max_total_nodes: b.max_total_nodes.unwrap_or(d.max_total_nodes),
            edge_types: b.edge_types.unwrap_or(d.edge_types),
            include_communities: b.include_communities.unwrap_or(d.include_communities),
            max_communities: b.max_communities.unwrap_or(d.max_communities),
            include_content: b.include_content.unwrap_or(d.include_content),
            max_content_length: b.max_content_length.unwrap_or(d.max_content_length),
        }
    }
}

pub async fn graphrag_context(
    State(state): State<AppState>,
    Json(body): Json<BuildContextBody>,
) -> Result<Json<Value>, ApiError> {
    let req = BuildContextRequest {
        tenant_id: body.tenant_id,
        query: body.query,
        embedding: body.embedding,
        config: body.config.unwrap_or_default().into(),
    };
    let resp = state.graphrag.build_context(req).await?;
    Ok(Json(json!({ "context": resp.context, "wall_time_ms": resp.wall_time_ms })))
}

#[derive(Debug, Deserialize)]
pub struct ExpandGraphBody {
    pub tenant_id: String,
    pub seeds: Vec<String>,
    #[serde(default)]
    pub edge_types: Vec<String>,
    #[serde(default)]
    pub max_hops: Option<usize>,
    #[serde(default)]
    pub max_nodes_per_hop: Option<usize>,
    #[serde(default)]
    pub max_total_nodes: Option<usize>,
    #[serde(default)]
    pub node_type_filter: Vec<String>,
    #[serde(default)]
    pub edge_type_filter: Vec<String>,
}

pub async fn graphrag_expand(
    State(state): State<AppState>,
    Json(body): Json<ExpandGraphBody>,
) -> Result<Json<Value>, ApiError> {
    let filter = if body.node_type_filter.is_empty() && body.edge_type_filter.is_empty() {
        None
    } else {
        Some(ExpansionFilter {
            node_types: body.node_type_filter,
            edge_types: body.edge_type_filter,
        })
    };
    let req = ExpandGraphRequest {
        tenant_id: body.tenant_id,
        seeds: body.seeds.into_iter().map(NodeId::from).collect(),
        edge_types: body.edge_types,
        max_hops: body.max_hops,
        max_nodes_per_hop: body.max_nodes_per_hop,
        max_total_nodes: body.max_total_nodes,
        filter,
    };
    let result = state.graphrag.expand_graph(req).await?;
    Ok(Json(json!(result)))
}

#[derive(Debug, Deserialize)]
pub struct GenerateAnswerBody {
    pub tenant_id: String,
    pub query: String,
    pub context: RagContext,
    pub context_tenant_id: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default)]
    pub llm_provider_id: Option<String>,
}

fn default_max_tokens() -> usize {
    512
}

pub async fn graphrag_answer(
    State(state): State<AppState>,
    Json(body): Json<GenerateAnswerBody>,
) -> Result<Json<Value>, ApiError> {
    let tenant_id = body.tenant_id.clone();
    let req = GenerateAnswerRequest {
        tenant_id: body.tenant_id,
        query: body.query,
        context: body.context,
        context_tenant_id: body.context_tenant_id,
        max_tokens: body.max_tokens,
        llm_provider_id: body.llm_provider_id,
    };
    let resp = state.graphrag.generate_answer(req).await?;
    if resp.mock {
        warn!(%tenant_id, "graphrag answer served from deterministic mock fallback, no LLM provider configured");
    }
    Ok(Json(json!({
        "answer": resp.answer,
        "citations": resp.citations.into_iter().map(|c| json!({
            "node_id": c.node_id,
            "text": c.text,
            "start_offset": c.start_offset,
            "end_offset": c.end_offset,
        })).collect::<Vec<_>>(),
        "mock": resp.mock,
    })))
}

#[derive(Debug, Deserialize)]
pub struct CommunitiesQuery {
    pub tenant_id: String,
    pub node_ids: String,
    #[serde(default)]
    pub max_communities: Option<usize>,
}

pub async fn graphrag_communities(
    State(state): State<AppState>,
    Query(q): Query<CommunitiesQuery>,
) -> Result<Json<Value>, ApiError> {
    let node_ids: Vec<NodeId> = q
        .node_ids
        .split(',')
        .filter(|s| !s.is_empty())
        .map(|s| NodeId::from(s.to_string()))
        .collect();
    let communities = state
        .graphrag
        .get_entity_communities(&q.tenant_id, &node_ids, q.max_communities.unwrap_or(5))
        .await?;
    Ok(Json(json!(communities)))
}

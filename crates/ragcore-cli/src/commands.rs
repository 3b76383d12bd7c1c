use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use ragcore_domain::{DriverId, SinkId, UnitConfig};
use ragcore_driver::{DemoDriver, DriverRegistry, HttpDriver};
use ragcore_graphrag::{
    CommunityProvider, ConnectedComponentsProvider, ContextBuilder, GraphExpander, GraphRagService,
    HybridSearcher,
};
use ragcore_ingest::IngestionEngine;
use ragcore_kv::{InMemoryKvStore, KvStore, PostgresKvStore};
use ragcore_ner::{LlmProviderRegistry, MockLlmProvider};
use ragcore_sink::{GraphSink, SinkRegistry};
use ragcore_store::{GraphStore, InMemoryStore, MetadataStore, PostgresStore};
use uuid::Uuid;

use crate::output;

// ── Serve ─────────────────────────────────────────────────────────────────────

pub async fn serve(settings: ragcore_config::ServerSettings) -> Result<()> {
    settings.validate().map_err(InvalidConfig)?;

    let token = match &settings.bearer_token {
        Some(t) => t.clone(),
        None => {
            let path = default_token_path();
            if let Ok(existing) = std::fs::read_to_string(&path).map(|s| s.trim().to_string()) {
                if !existing.is_empty() {
                    println!("Reusing existing token from {}", path.display());
                    existing
                } else {
                    let t = generate_token();
                    write_token(&path, &t)?;
                    println!("Generated new token (written to {})", path.display());
                    t
                }
            } else {
                let t = generate_token();
                write_token(&path, &t)?;
                println!("Generated new token (written to {})", path.display());
                t
            }
        }
    };

    let store: Arc<dyn MetadataStore> = match &settings.database_url {
        Some(url) => {
            println!("Using Postgres store");
            Arc::new(PostgresStore::connect(url).await.context("Failed to connect to Postgres")?)
        }
        None => {
            println!("Using in-memory store — state will be lost on server stop");
            Arc::new(InMemoryStore::new())
        }
    };
    let graph_store: Arc<dyn GraphStore> = match &settings.database_url {
        Some(url) => Arc::new(PostgresStore::connect(url).await.context("Failed to connect to Postgres")?),
        None => Arc::new(InMemoryStore::new()),
    };
    let kv: Arc<dyn KvStore> = match &settings.database_url {
        Some(url) => Arc::new(PostgresKvStore::connect(url).await.context("Failed to connect to Postgres")?),
        None => Arc::new(InMemoryKvStore::new()),
    };

    let mut drivers = DriverRegistry::new();
    drivers.register(DriverId::new("demo"), Arc::new(DemoDriver::new()));
    drivers.register(DriverId::new("http"), Arc::new(HttpDriver::new(None)));
    let drivers = Arc::new(drivers);

    let mut sinks = SinkRegistry::new();
    sinks.register(SinkId::new("graph"), Arc::new(GraphSink::new(graph_store.clone())));
    let sinks = Arc::new(sinks);

    let engine = Arc::new(IngestionEngine::new(store.clone(), kv, drivers, sinks));

    let searcher = Arc::new(HybridSearcher::new(graph_store.clone(), "default"));
    let expander = Arc::new(GraphExpander::new(graph_store.clone()));
    let community_provider: Arc<dyn CommunityProvider> =
        Arc::new(ConnectedComponentsProvider::new(graph_store.clone()));
    let context_builder = Arc::new(ContextBuilder::new(
        graph_store.clone(),
        searcher,
        expander.clone(),
        Some(community_provider.clone()),
        256,
    ));

    // Leaving the registry empty makes `default_provider()` return `None`, which is what
    // routes `generate_answer` to its deterministic mock-answer fallback; only register a
    // provider when the operator explicitly asked for one.
    let mut llm_providers = LlmProviderRegistry::new();
    if let Some(id) = &settings.llm_provider {
        match id.as_str() {
            "mock" => {
                llm_providers.register("mock", Arc::new(MockLlmProvider::with_response(
                    "This is a mock response; configure a real LLM provider for grounded answers.",
                )));
            }
            other => {
                return Err(InvalidConfig(format!(
                    "unknown llm provider {other:?}; only \"mock\" is registered locally"
                ))
                .into())
            }
        }
    }

    // No consumer wires an `EmbeddingProviderRegistry` into the search/context path yet (query
    // embeddings are supplied by the caller in `BuildContextBody.embedding`); still validate the
    // flag so a typo fails fast at startup instead of silently doing nothing.
    if let Some(id) = &settings.embedding_provider {
        if id != "mock" {
            return Err(InvalidConfig(format!(
                "unknown embedding provider {id:?}; only \"mock\" is registered locally"
            ))
            .into());
        }
    }

    let graphrag = Arc::new(GraphRagService::new(
        context_builder,
        expander,
        Arc::new(llm_providers),
        community_provider,
    ));

    if let Some(path) = &settings.bootstrap_file {
        let seeds = ragcore_config::load_bootstrap_file(std::path::Path::new(path))
            .context("Failed to load bootstrap file")?;
        for seed in seeds {
            let endpoint_id = seed.endpoint.id.clone();
            store.upsert_endpoint(seed.endpoint).await.context("Failed to seed endpoint")?;
            for (unit_id, config) in seed.units {
                store
                    .put_unit_config(&endpoint_id, &unit_id, config)
                    .await
                    .context("Failed to seed unit configuration")?;
            }
        }
    }

    println!("Starting ragcore control-plane API server on http://{}", settings.bind_addr);
    let app = ragcore_api::build_app(store, graph_store, engine, graphrag, Arc::new(token));
    let listener = tokio::net::TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", settings.bind_addr))?;
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

// ── Endpoint ──────────────────────────────────────────────────────────────────

pub async fn endpoint_list(
    remote: Option<String>,
    token: Option<String>,
    project_id: Option<String>,
    search: Option<String>,
) -> Result<()> {
    let token = resolve_token(token)?;
    let url = server_url(remote);
    let mut req = authed_client(&token).get(format!("{}/endpoints", url.trim_end_matches('/')));
    if let Some(p) = &project_id {
        req = req.query(&[("project_id", p)]);
    }
    if let Some(s) = &search {
        req = req.query(&[("search", s)]);
    }
    let body: serde_json::Value = send_json(req, &url).await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

pub async fn endpoint_add(
    remote: Option<String>,
    token: Option<String>,
    id: String,
    driver_id: String,
    url_arg: String,
    display_name: Option<String>,
    project_id: Option<String>,
) -> Result<()> {
    let token = resolve_token(token)?;
    let url = server_url(remote);
    let display_name = display_name.unwrap_or_else(|| id.clone());
    let req_body = serde_json::json!({
        "id": id,
        "source_id": id,
        "display_name": display_name,
        "driver_id": driver_id,
        "url": url_arg,
        "auth_policy_ref": null,
        "project_id": project_id,
        "domain_id": null,
        "labels": [],
        "config": {},
    });
    let req = authed_client(&token)
        .post(format!("{}/endpoints", url.trim_end_matches('/')))
        .json(&req_body);
    let body: serde_json::Value = send_json(req, &url).await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

pub async fn endpoint_rm(
    remote: Option<String>,
    token: Option<String>,
    id: String,
    reason: String,
) -> Result<()> {
    let token = resolve_token(token)?;
    let url = server_url(remote);
    let req = authed_client(&token)
        .delete(format!("{}/endpoints/{}", url.trim_end_matches('/'), id))
        .json(&serde_json::json!({ "reason": reason }));
    send_no_content(req, &url).await?;
    println!("Removed endpoint {id}");
    Ok(())
}

// ── Unit ──────────────────────────────────────────────────────────────────────

pub async fn unit_list(remote: Option<String>, token: Option<String>, endpoint_id: String) -> Result<()> {
    let token = resolve_token(token)?;
    let url = server_url(remote);
    let req = authed_client(&token).get(format!(
        "{}/endpoints/{}/units",
        url.trim_end_matches('/'),
        endpoint_id
    ));
    let body: serde_json::Value = send_json(req, &url).await?;
    print!("{}", output::render_unit_statuses(&body));
    Ok(())
}

pub async fn unit_configure(
    remote: Option<String>,
    token: Option<String>,
    endpoint_id: String,
    unit_id: String,
    config_file: PathBuf,
) -> Result<()> {
    let token = resolve_token(token)?;
    let url = server_url(remote);
    let content = std::fs::read_to_string(&config_file)
        .with_context(|| format!("Failed to read {}", config_file.display()))?;
    let config: UnitConfig = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {} as UnitConfig", config_file.display()))?;
    let req = authed_client(&token)
        .post(format!(
            "{}/endpoints/{}/units/{}/configure",
            url.trim_end_matches('/'),
            endpoint_id,
            unit_id
        ))
        .json(&config);
    send_no_content(req, &url).await?;
    println!("Configured {endpoint_id}/{unit_id}");
    Ok(())
}

pub async fn unit_start(
    remote: Option<String>,
    token: Option<String>,
    endpoint_id: String,
    unit_id: String,
) -> Result<()> {
    let token = resolve_token(token)?;
    let url = server_url(remote);
    let req = authed_client(&token).post(format!(
        "{}/endpoints/{}/units/{}/start",
        url.trim_end_matches('/'),
        endpoint_id,
        unit_id
    ));
    let body: serde_json::Value = send_json(req, &url).await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

pub async fn unit_pause(
    remote: Option<String>,
    token: Option<String>,
    endpoint_id: String,
    unit_id: String,
) -> Result<()> {
    let token = resolve_token(token)?;
    let url = server_url(remote);
    let req = authed_client(&token).post(format!(
        "{}/endpoints/{}/units/{}/pause",
        url.trim_end_matches('/'),
        endpoint_id,
        unit_id
    ));
    send_no_content(req, &url).await?;
    println!("Pause requested for {endpoint_id}/{unit_id}");
    Ok(())
}

pub async fn unit_reset_checkpoint(
    remote: Option<String>,
    token: Option<String>,
    endpoint_id: String,
    unit_id: String,
) -> Result<()> {
    let token = resolve_token(token)?;
    let url = server_url(remote);
    let req = authed_client(&token).post(format!(
        "{}/endpoints/{}/units/{}/reset-checkpoint",
        url.trim_end_matches('/'),
        endpoint_id,
        unit_id
    ));
    send_no_content(req, &url).await?;
    println!("Checkpoint reset for {endpoint_id}/{unit_id}");
    Ok(())
}

// ── Status / Events ───────────────────────────────────────────────────────────

pub async fn status(remote: Option<String>, token: Option<String>, endpoint_id: Option<String>) -> Result<()> {
    let token = resolve_token(token)?;
    let url = server_url(remote);
    let client = authed_client(&token);

    let endpoints: serde_json::Value = send_json(
        client.get(format!("{}/endpoints", url.trim_end_matches('/'))),
        &url,
    )
    .await?;
    let Some(rows) = endpoints.as_array() else {
        println!("No endpoints.");
        return Ok(());
    };

    for ep in rows {
        let Some(ep_id) = ep.get("id").and_then(|v| v.as_str()) else { continue };
        if let Some(filter) = &endpoint_id {
            if filter != ep_id {
                continue;
            }
        }
        println!("{}:", ep.get("display_name").and_then(|v| v.as_str()).unwrap_or(ep_id));
        let units: serde_json::Value = send_json(
            client.get(format!("{}/endpoints/{}/units", url.trim_end_matches('/'), ep_id)),
            &url,
        )
        .await?;
        print!("{}", output::render_unit_statuses(&units));
    }
    Ok(())
}

pub async fn events(
    remote: Option<String>,
    token: Option<String>,
    endpoint_id: Option<String>,
    limit: usize,
) -> Result<()> {
    let token = resolve_token(token)?;
    let url = server_url(remote);
    let mut req = authed_client(&token)
        .get(format!("{}/events", url.trim_end_matches('/')))
        .query(&[("limit", limit.to_string())]);
    if let Some(id) = &endpoint_id {
        req = req.query(&[("endpoint_id", id)]);
    }
    let body: serde_json::Value = send_json(req, &url).await?;
    print!("{}", output::render_events(&body));
    Ok(())
}

// ── GraphRAG ──────────────────────────────────────────────────────────────────

pub async fn graphrag_context(
    remote: Option<String>,
    token: Option<String>,
    tenant_id: String,
    query: String,
    top_k: i64,
) -> Result<()> {
    let token = resolve_token(token)?;
    let url = server_url(remote);
    let req_body = serde_json::json!({
        "tenant_id": tenant_id,
        "query": query,
        "embedding": null,
        "config": { "top_k": top_k },
    });
    let req = authed_client(&token)
        .post(format!("{}/graphrag/context", url.trim_end_matches('/')))
        .json(&req_body);
    let body: serde_json::Value = send_json(req, &url).await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

pub async fn graphrag_expand(
    remote: Option<String>,
    token: Option<String>,
    tenant_id: String,
    seeds: Vec<String>,
    max_hops: usize,
) -> Result<()> {
    let token = resolve_token(token)?;
    let url = server_url(remote);
    let req_body = serde_json::json!({
        "tenant_id": tenant_id,
        "seeds": seeds,
        "edge_types": [],
        "max_hops": max_hops,
    });
    let req = authed_client(&token)
        .post(format!("{}/graphrag/expand", url.trim_end_matches('/')))
        .json(&req_body);
    let body: serde_json::Value = send_json(req, &url).await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

pub async fn graphrag_answer(
    remote: Option<String>,
    token: Option<String>,
    tenant_id: String,
    query: String,
    context_file: PathBuf,
    max_tokens: usize,
) -> Result<()> {
    let token = resolve_token(token)?;
    let url = server_url(remote);
    let content = std::fs::read_to_string(&context_file)
        .with_context(|| format!("Failed to read {}", context_file.display()))?;
    let context: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {} as a RagContext", context_file.display()))?;
    let req_body = serde_json::json!({
        "tenant_id": tenant_id,
        "query": query,
        "context": context,
        "context_tenant_id": tenant_id,
        "max_tokens": max_tokens,
        "llm_provider_id": null,
    });
    let req = authed_client(&token)
        .post(format!("{}/graphrag/answer", url.trim_end_matches('/')))
        .json(&req_body);
    let body: serde_json::Value = send_json(req, &url).await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

// ── Token lifecycle ───────────────────────────────────────────────────────────

fn generate_token() -> String {
    let a = Uuid::new_v4().to_string().replace('-', "");
    let b = Uuid::new_v4().to_string().replace('-', "");
    format!("{a}{b}")
}

/// Priority: explicit value (from --token / RAGCORE_TOKEN) → ~/.ragcore/token file.
fn resolve_token(explicit: Option<String>) -> Result<String> {
    if let Some(t) = explicit {
        return Ok(t);
    }
    let path = default_token_path();
    std::fs::read_to_string(&path).map(|s| s.trim().to_string()).with_context(|| {
        format!(
            "No token provided and could not read token file at {}. \
             Use --token, RAGCORE_TOKEN, or run `ragcore serve` first.",
            path.display()
        )
    })
}

fn write_token(path: &PathBuf, token: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    std::fs::write(path, token).with_context(|| format!("Failed to write token to {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

fn default_token_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
    PathBuf::from(home).join(".ragcore").join("token")
}

fn authed_client(token: &str) -> reqwest::Client {
    let mut headers = reqwest::header::HeaderMap::new();
    let bearer = format!("Bearer {token}");
    headers.insert(
        reqwest::header::AUTHORIZATION,
        reqwest::header::HeaderValue::from_str(&bearer).expect("token contains invalid header characters"),
    );
    reqwest::Client::builder().default_headers(headers).build().expect("failed to build HTTP client")
}

fn server_url(remote: Option<String>) -> String {
    remote.unwrap_or_else(|| "http://localhost:8080".into())
}

async fn send_json<T: serde::de::DeserializeOwned>(req: reqwest::RequestBuilder, url: &str) -> Result<T> {
    let resp = req.send().await.with_context(|| format!("Failed to reach server at {url}"))?;
    let resp = check_status(resp).await?;
    Ok(resp.json().await?)
}

async fn send_no_content(req: reqwest::RequestBuilder, url: &str) -> Result<()> {
    let resp = req.send().await.with_context(|| format!("Failed to reach server at {url}"))?;
    check_status(resp).await?;
    Ok(())
}

/// Maps a non-2xx response into an error carrying the status code, so `main`'s exit-code mapping
/// can distinguish authorization failures from other remote errors without re-parsing a string.
async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(RemoteError { status, body }.into())
}

#[derive(Debug)]
pub struct RemoteError {
    pub status: reqwest::StatusCode,
    pub body: String,
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "server returned {}: {}", self.status, self.body)
    }
}

impl std::error::Error for RemoteError {}

/// Marks a failure as a local configuration problem (exit code 2) rather than a remote or
/// internal failure, so `main`'s exit-code mapping can tell them apart.
#[derive(Debug)]
pub struct InvalidConfig(pub String);

impl std::fmt::Display for InvalidConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for InvalidConfig {}

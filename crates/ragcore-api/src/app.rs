use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use ragcore_graphrag::GraphRagService;
use ragcore_ingest::IngestionEngine;
use ragcore_store::{GraphStore, MetadataStore};
use tower_http::trace::TraceLayer;

use crate::auth::require_bearer_token;
use crate::handlers;
use crate::state::AppState;

pub fn build_app(
    store: Arc<dyn MetadataStore>,
    graph_store: Arc<dyn GraphStore>,
    engine: Arc<IngestionEngine>,
    graphrag: Arc<GraphRagService>,
    auth_token: Arc<String>,
) -> Router {
    let state = AppState { store, graph_store, engine, graphrag, auth_token };

    Router::new()
        // Health
        .route("/healthz", get(handlers::health))
        .route("/readyz", get(handlers::ready))
        // Endpoints
        .route("/endpoints", get(handlers::list_endpoints).post(handlers::create_endpoint))
        .route(
            "/endpoints/:id",
            get(handlers::get_endpoint).delete(handlers::delete_endpoint),
        )
        .route("/endpoints/:id/units", get(handlers::list_units))
        .route(
            "/endpoints/:endpoint_id/units/:unit_id/configure",
            post(handlers::configure_unit),
        )
        .route("/endpoints/:endpoint_id/units/:unit_id/start", post(handlers::start_unit))
        .route("/endpoints/:endpoint_id/units/:unit_id/pause", post(handlers::pause_unit))
        .route(
            "/endpoints/:endpoint_id/units/:unit_id/reset-checkpoint",
            post(handlers::reset_checkpoint),
        )
        // Events
        .route("/events", get(handlers::list_events))
        // GraphRAG
        .route("/graphrag/context", post(handlers::graphrag_context))
        .route("/graphrag/expand", post(handlers::graphrag_expand))
        .route("/graphrag/answer", post(handlers::graphrag_answer))
        .route("/graphrag/communities", get(handlers::graphrag_communities))
        // Auth middleware applies to all routes above
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer_token))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use ragcore_driver::{DemoDriver, DriverRegistry};
    use ragcore_ner::LlmProviderRegistry;
    use ragcore_sink::{GraphSink, SinkRegistry};
    use ragcore_store::InMemoryStore;
    use tower::util::ServiceExt;

    const TEST_TOKEN: &str = "test-token";

    fn test_app() -> Router {
        let store = Arc::new(InMemoryStore::new());
        let graph_store: Arc<dyn GraphStore> = store.clone();
        let metadata_store: Arc<dyn MetadataStore> = store.clone();

        let mut drivers = DriverRegistry::new();
        drivers.register(ragcore_domain::DriverId::new("demo"), Arc::new(DemoDriver::new()));
        let mut sinks = SinkRegistry::new();
        sinks.register(ragcore_domain::SinkId::new("graph"), Arc::new(GraphSink::new(store.clone())));
        let engine = Arc::new(IngestionEngine::new(
            metadata_store.clone(),
            Arc::new(ragcore_kv::InMemoryKvStore::new()),
            Arc::new(drivers),
            Arc::new(sinks),
        ));

        let searcher = Arc::new(ragcore_graphrag::HybridSearcher::new(graph_store.clone(), "default"));
        let expander = Arc::new(ragcore_graphrag::GraphExpander::new(graph_store.clone()));
        let community_provider: Arc<dyn ragcore_graphrag::CommunityProvider> =
            Arc::new(ragcore_graphrag::ConnectedComponentsProvider::new(graph_store.clone()));
        let context_builder = Arc::new(ragcore_graphrag::ContextBuilder::new(
            graph_store.clone(),
            searcher,
            expander.clone(),
            Some(community_provider.clone()),
            64,
        ));
        let graphrag = Arc::new(GraphRagService::new(
            context_builder,
            expander,
            Arc::new(LlmProviderRegistry::new()),
            community_provider,
        ));

        build_app(metadata_store, graph_store, engine, graphrag, Arc::new(TEST_TOKEN.to_string()))
    }

    fn authed(req: axum::http::request::Builder) -> axum::http::request::Builder {
        req.header("Authorization", format!("Bearer {}", TEST_TOKEN))
    }

    #[tokio::test]
    async fn unauthenticated_request_returns_401() {
        let app = test_app();
        let resp = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn wrong_token_returns_401() {
        let app = test_app();
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .header("Authorization", "Bearer wrong-token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn health_returns_200() {
        let app = test_app();
        let resp = app
            .oneshot(authed(Request::builder().uri("/healthz")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn ready_returns_200_with_empty_store() {
        let app = test_app();
        let resp = app
            .oneshot(authed(Request::builder().uri("/readyz")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn endpoints_empty_list() {
        let app = test_app();
        let resp = app
            .oneshot(authed(Request::builder().uri("/endpoints")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn endpoint_not_found_returns_404() {
        let app = test_app();
        let resp = app
            .oneshot(
                authed(Request::builder().uri("/endpoints/nonexistent"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn events_returns_200() {
        let app = test_app();
        let resp = app
            .oneshot(authed(Request::builder().uri("/events")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn graphrag_context_with_empty_query_is_bad_request() {
        let app = test_app();
        let body = serde_json::json!({ "tenant_id": "t1", "query": "" });
        let resp = app
            .oneshot(
                authed(
                    Request::builder()
                        .method(axum::http::Method::POST)
                        .uri("/graphrag/context")
                        .header("content-type", "application/json"),
                )
                .body(Body::from(body.to_string()))
                .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}

//! HTTP query service.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/search` | `{text, num_results?}` → `[{id, titulo, texto}]` |
//! | `GET`  | `/health` | status, version and document count |
//!
//! Errors are returned as `{"error": "..."}`: `400` for bad input, `500` when
//! the collection failed to load at startup or the query itself fails.

use crate::traits::VectorIndex;
use crate::{SearchHit, DEFAULT_NUM_RESULTS};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

/// Shared, read-only handler state.
///
/// `store` is `None` when the collection could not be opened at startup; the
/// service then answers every search with a server error until restarted.
#[derive(Clone)]
pub struct AppState {
    store: Option<Arc<dyn VectorIndex>>,
    startup_error: Option<String>,
}

impl AppState {
    pub fn ready(store: Arc<dyn VectorIndex>) -> Self {
        Self {
            store: Some(store),
            startup_error: None,
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            store: None,
            startup_error: Some(reason.into()),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.store.is_some()
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/search", post(handle_search))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Serves [`router`] on `bind` until the process is stopped.
pub async fn run_server(bind: &str, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(address = %listener.local_addr()?, ready = state.is_ready(), "search service listening");
    axum::serve(listener, router(state)).await
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

struct AppError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        message: message.into(),
    }
}

fn internal_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: message.into(),
    }
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    num_results: Option<usize>,
}

async fn handle_search(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Vec<SearchHit>>, AppError> {
    let store = state.store.as_ref().ok_or_else(|| {
        internal_error("the document collection was not loaded; check the server logs")
    })?;

    let request: SearchRequest = serde_json::from_slice(&body)
        .map_err(|error| bad_request(format!("invalid request body: {error}")))?;

    let text = request
        .text
        .filter(|text| !text.is_empty())
        .ok_or_else(|| bad_request("the request body needs a 'text' field"))?;

    let num_results = request.num_results.unwrap_or(DEFAULT_NUM_RESULTS);
    if num_results == 0 {
        return Err(bad_request("'num_results' must be at least 1"));
    }

    let matches = store.query(&text, num_results).await.map_err(|error| {
        error!(%error, "query failed");
        internal_error(format!("search failed: {error}"))
    })?;

    Ok(Json(matches.into_iter().map(SearchHit::from).collect()))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    documents: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let (status, documents) = match &state.store {
        Some(store) => ("ok", store.count().await.ok()),
        None => ("unavailable", None),
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        documents,
        error: state.startup_error.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::{CharacterNgramEmbedder, GoogleEmbedder};
    use crate::stores::InMemoryCollection;
    use crate::{DocumentRecord, SearchError, StoreMatch, VectorEntry};
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct FailingStore;

    #[async_trait]
    impl VectorIndex for FailingStore {
        async fn count(&self) -> Result<u64, SearchError> {
            Ok(0)
        }

        async fn add(&self, _entries: &[VectorEntry]) -> Result<(), SearchError> {
            Ok(())
        }

        async fn query(&self, _text: &str, _limit: usize) -> Result<Vec<StoreMatch>, SearchError> {
            Err(SearchError::Request("index offline".to_string()))
        }
    }

    async fn loaded_state() -> AppState {
        let collection = InMemoryCollection::new(Box::new(CharacterNgramEmbedder::default()));
        let entries: Vec<_> = [
            ("S-1", "Pregão eletrônico", "Regras do pregão eletrônico"),
            ("S-2", "Dispensa de licitação", "Hipóteses de dispensa"),
            ("S-3", "Contratos administrativos", "Aditivos contratuais"),
            ("S-4", "Aposentadoria", "Regime próprio"),
        ]
        .iter()
        .enumerate()
        .map(|(position, (id, title, body))| {
            VectorEntry::from_record(
                position as u64,
                &DocumentRecord {
                    id: id.to_string(),
                    title: title.to_string(),
                    body: body.to_string(),
                    keywords: Default::default(),
                },
            )
        })
        .collect();
        collection.add(&entries).await.unwrap();
        AppState::ready(Arc::new(collection))
    }

    fn search_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/search")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ORIGIN, "https://localhost:3000")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(state: AppState, request: Request<Body>) -> (StatusCode, Value, Response<()>) {
        let response = router(state).oneshot(request).await.unwrap();
        let (parts, body) = response.into_parts();
        let bytes = to_bytes(body, usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (parts.status, json, Response::from_parts(parts, ()))
    }

    #[tokio::test]
    async fn returns_requested_number_of_ranked_hits() {
        let (status, body, _) = send(
            loaded_state().await,
            search_request(r#"{"text": "pregão eletrônico", "num_results": 3}"#),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let hits = body.as_array().unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0]["id"], "S-1");
        assert_eq!(hits[0]["titulo"], "Pregão eletrônico");
        assert_eq!(hits[0]["texto"], "Regras do pregão eletrônico");
        for hit in hits {
            assert!(hit["id"].is_string());
            assert!(hit["titulo"].is_string());
            assert!(hit["texto"].is_string());
        }
    }

    #[tokio::test]
    async fn num_results_defaults_to_fifteen() {
        let (status, body, _) =
            send(loaded_state().await, search_request(r#"{"text": "licitação"}"#)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn missing_text_is_a_client_error() {
        for payload in [r#"{"num_results": 3}"#, r#"{"text": ""}"#, "not json", ""] {
            let (status, body, _) = send(loaded_state().await, search_request(payload)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "payload {payload:?}");
            assert!(body["error"].is_string());
        }
    }

    #[tokio::test]
    async fn invalid_num_results_is_a_client_error() {
        for payload in [
            r#"{"text": "x", "num_results": 0}"#,
            r#"{"text": "x", "num_results": -1}"#,
            r#"{"text": "x", "num_results": "três"}"#,
        ] {
            let (status, _, _) = send(loaded_state().await, search_request(payload)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "payload {payload:?}");
        }
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_request() {
        for payload in [r#"{"text": "licitação"}"#, r#"{}"#, "garbage"] {
            let state = AppState::unavailable("collection missing");
            let (status, body, _) = send(state, search_request(payload)).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert!(body["error"].is_string());
        }
    }

    #[tokio::test]
    async fn store_failure_is_surfaced() {
        let state = AppState::ready(Arc::new(FailingStore));
        let (status, body, _) = send(state, search_request(r#"{"text": "x"}"#)).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("index offline"));
    }

    #[tokio::test]
    async fn embedding_failures_do_not_expose_the_api_key() {
        let embedder = GoogleEmbedder::new("LOCAL-SECRET")
            .unwrap()
            .with_base_url("http://127.0.0.1:1");
        let state = AppState::ready(Arc::new(InMemoryCollection::new(Box::new(embedder))));

        let (status, body, _) = send(state, search_request(r#"{"text": "licitação"}"#)).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let message = body["error"].as_str().unwrap();
        assert!(message.starts_with("search failed"));
        assert!(!message.contains("LOCAL-SECRET"), "key leaked in {message:?}");
    }

    #[tokio::test]
    async fn cross_origin_requests_are_allowed() {
        let (_, _, response) = send(
            loaded_state().await,
            search_request(r#"{"text": "contratos"}"#),
        )
        .await;

        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .and_then(|value| value.to_str().ok()),
            Some("*")
        );
    }

    #[tokio::test]
    async fn health_reports_document_count() {
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let (status, body, _) = send(loaded_state().await, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["documents"], json!(4));

        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let (_, body, _) = send(AppState::unavailable("boom"), request).await;
        assert_eq!(body["status"], "unavailable");
        assert_eq!(body["error"], "boom");
    }
}

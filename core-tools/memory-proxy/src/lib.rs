//! Memory Proxy
//!
//! Forwards browser requests to the memory service so the front end never
//! talks to it cross-origin. The caller's Authorization header is passed
//! through unchanged; the proxy holds no credentials of its own.
//!
//! # Endpoints
//!
//! - GET  /api/get?user_id|agent_id[&output_format] - List memories of one owner
//! - POST /api/search - Search memories (`{query, user_id|agent_id}`)
//! - POST /api/add - Add memories (`{messages, user_id|agent_id, output_format}`)
//!
//! Upstream status and JSON body are relayed as-is when the upstream call
//! fails; a transport or decoding failure answers 500.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use sdk::{EngineError, OwnerKind};
use serde::Deserialize;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Default memory service root
pub const DEFAULT_UPSTREAM: &str = "https://api.mem0.ai";

/// State shared across handlers
#[derive(Clone)]
struct ProxyState {
    upstream: Arc<str>,
    client: reqwest::Client,
}

impl ProxyState {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.upstream, path)
    }
}

/// Query parameters of the list endpoint
#[derive(Debug, Deserialize)]
struct GetParams {
    user_id: Option<String>,
    agent_id: Option<String>,
    output_format: Option<String>,
}

/// Build the proxy router against `upstream` (e.g. "https://api.mem0.ai")
pub fn router(upstream: &str) -> Router {
    let state = ProxyState {
        upstream: Arc::from(upstream.trim_end_matches('/')),
        client: reqwest::Client::new(),
    };

    Router::new()
        .route("/api/get", get(get_handler))
        .route("/api/search", post(search_handler))
        .route("/api/add", post(add_handler))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

/// Serve the proxy on `bind` until `shutdown` resolves
pub async fn serve(
    bind: &str,
    upstream: &str,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), EngineError> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| EngineError::Network(format!("Failed to bind to {}: {}", bind, e)))?;

    let addr = listener
        .local_addr()
        .map_err(|e| EngineError::Network(format!("Failed to get local address: {}", e)))?;

    tracing::info!("Memory proxy listening on http://{} (upstream {})", addr, upstream);

    axum::serve(listener, router(upstream))
        .with_graceful_shutdown(async move {
            shutdown.await;
            tracing::info!("Memory proxy shutting down gracefully");
        })
        .await
        .map_err(|e| EngineError::Network(format!("Memory proxy error: {}", e)))
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn internal_error() -> Response {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
}

/// The caller's Authorization header, or the 401 response
fn authorization(headers: &HeaderMap) -> Result<String, Response> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            tracing::warn!("Authorization header missing");
            error_response(StatusCode::UNAUTHORIZED, "Authorization header missing")
        })
}

/// Send the upstream request and relay its outcome
async fn relay(request: reqwest::RequestBuilder) -> Response {
    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!("Upstream request failed: {}", e);
            return internal_error();
        }
    };

    let status = response.status().as_u16();
    let data: Value = match response.json().await {
        Ok(data) => data,
        Err(e) => {
            tracing::error!("Upstream returned undecodable body ({}): {}", status, e);
            return internal_error();
        }
    };

    if !(200..300).contains(&status) {
        tracing::warn!("Upstream returned {}", status);
        let code = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
        return (code, Json(data)).into_response();
    }

    (StatusCode::OK, Json(data)).into_response()
}

async fn get_handler(
    State(state): State<ProxyState>,
    headers: HeaderMap,
    Query(params): Query<GetParams>,
) -> Response {
    let auth = match authorization(&headers) {
        Ok(auth) => auth,
        Err(response) => return response,
    };

    let Some((owner, id)) =
        OwnerKind::from_ids(params.user_id.as_deref(), params.agent_id.as_deref())
    else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Either user_id or agent_id is required",
        );
    };

    let mut query = vec![(owner.id_field(), id)];
    if let Some(format) = params.output_format.as_deref() {
        query.push(("output_format", format));
    }

    tracing::debug!("Listing {} memories", owner);
    relay(
        state
            .client
            .get(state.url("/v1/memories/"))
            .header("Authorization", auth)
            .query(&query),
    )
    .await
}

async fn search_handler(
    State(state): State<ProxyState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    forward_post(&state, &headers, "/v1/memories/search/", &body).await
}

async fn add_handler(
    State(state): State<ProxyState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    forward_post(&state, &headers, "/v1/memories/", &body).await
}

/// Forward a JSON body verbatim
async fn forward_post(state: &ProxyState, headers: &HeaderMap, path: &str, body: &[u8]) -> Response {
    let auth = match authorization(headers) {
        Ok(auth) => auth,
        Err(response) => return response,
    };

    let payload: Value = match serde_json::from_slice(body) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!("Request body is not JSON: {}", e);
            return internal_error();
        }
    };

    tracing::debug!("Forwarding POST {}", path);
    relay(
        state
            .client
            .post(state.url(path))
            .header("Authorization", auth)
            .json(&payload),
    )
    .await
}

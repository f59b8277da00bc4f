//! # HTTP API
//!
//! Builds the axum router that exposes the node's HTTP interface. All
//! endpoints share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path      | Description             |
//! |--------|-----------|-------------------------|
//! | GET    | `/health` | Liveness probe          |
//! | GET    | `/status` | Node status summary     |
//! | POST   | `/rpc`    | JSON-RPC gateway        |

use axum::{
    extract::State,
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::metrics::SharedMetrics;
use crate::node::{Node, NodeStatus, RpcError};

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    pub node: Arc<Node>,
    /// Reference to Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/rpc", post(rpc_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// JSON-RPC Types
// ---------------------------------------------------------------------------

/// A JSON-RPC request envelope. Both `"1.0"` (bitcoind clients) and `"2.0"`
/// are accepted; the version is echoed back.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    pub method: String,
    /// Positional parameters. Named parameters are not supported.
    #[serde(default)]
    pub params: Option<serde_json::Value>,
    /// Request identifier. Echoed back in the response.
    #[serde(default)]
    pub id: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<String>,
    /// `null` on failure.
    pub result: serde_json::Value,
    /// `null` on success.
    pub error: Option<JsonRpcError>,
    pub id: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

impl From<RpcError> for JsonRpcError {
    fn from(e: RpcError) -> Self {
        Self {
            code: e.code,
            message: e.message,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    #[serde(flatten)]
    pub node: serde_json::Value,
    /// RFC 3339 server time.
    pub timestamp: String,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` — returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status` — chain tip, supply and mempool summary.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let status: NodeStatus = state.node.status();
    Json(StatusResponse {
        version: state.version.clone(),
        node: serde_json::to_value(status).unwrap_or_default(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `POST /rpc` — JSON-RPC gateway.
///
/// Calls run on the blocking pool since block connection holds the chain
/// write lock. Errors are reported in the envelope with HTTP 200.
async fn rpc_handler(
    State(state): State<AppState>,
    Json(req): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    let params = match req.params {
        None | Some(serde_json::Value::Null) => Vec::new(),
        Some(serde_json::Value::Array(items)) => items,
        Some(_) => {
            return Json(JsonRpcResponse {
                jsonrpc: req.jsonrpc,
                result: serde_json::Value::Null,
                error: Some(JsonRpcError {
                    code: -32602,
                    message: "Invalid params: expected a positional array".into(),
                }),
                id: req.id,
            });
        }
    };

    let timer = state.metrics.rpc_latency_seconds.start_timer();
    let node = Arc::clone(&state.node);
    let method = req.method.clone();
    let outcome = tokio::task::spawn_blocking(move || node.call(&method, &params))
        .await
        .unwrap_or_else(|e| Err(RpcError::new(-32603, format!("internal error: {e}"))));
    timer.observe_duration();

    let (result, error) = match outcome {
        Ok(value) => (value, None),
        Err(e) => {
            tracing::debug!(method = %req.method, code = e.code, error = %e.message, "rpc call failed");
            (serde_json::Value::Null, Some(e.into()))
        }
    };

    Json(JsonRpcResponse {
        jsonrpc: req.jsonrpc,
        result,
        error,
        id: req.id,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

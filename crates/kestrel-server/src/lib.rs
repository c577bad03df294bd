//! # kestrel-server
//!
//! HTTP API over a running [`AgentService`]:
//!
//! - `GET  /health`: liveness, uptime, and current time
//! - `GET  /metrics`: Prometheus text format
//! - `GET  /api/v1/plugins`: registered plugins with state and actions
//! - `GET  /api/v1/actions`: every action as the model sees it
//! - `POST /api/v1/actions/{plugin}/{action}`: invoke an action
//! - `POST /api/v1/messages`: publish a message on the bus
//! - `POST /api/v1/turn`: run one model-driven action turn

pub mod metrics;

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::future::Future;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use kestrel_core::{KestrelError, Message, SYSTEM_SOURCE, Tool};
use kestrel_runtime::{AgentService, ModelTurn, PluginStatus};

pub use metrics::Metrics;

/// Shared server state.
pub struct AppState {
    pub service: Arc<AgentService>,
    pub metrics: Metrics,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    /// Seconds since the agent service was created.
    uptime: u64,
    timestamp: DateTime<Utc>,
}

#[derive(Deserialize)]
struct PublishRequest {
    #[serde(default)]
    source: Option<String>,
    content: String,
}

#[derive(Deserialize)]
struct TurnRequest {
    prompt: String,
}

/// An error rendered as `{ "error": ... }` with a status derived from the
/// error kind.
struct ApiError(KestrelError);

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            KestrelError::ActionNotFound { .. } => StatusCode::NOT_FOUND,
            KestrelError::InvalidActionInput { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            KestrelError::ActionExecution { .. }
            | KestrelError::ExternalFetch { .. }
            | KestrelError::LlmProvider(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// Build the Axum router.
pub fn build_router(service: Arc<AgentService>) -> Router {
    let state = Arc::new(AppState {
        service,
        metrics: Metrics::new(),
    });

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/v1/plugins", get(plugins_handler))
        .route("/api/v1/actions", get(actions_handler))
        .route("/api/v1/actions/{plugin}/{action}", post(invoke_handler))
        .route("/api/v1/messages", post(publish_handler))
        .route("/api/v1/turn", post(turn_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    state.metrics.inc_http_requests();
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.service.uptime().as_secs(),
        timestamp: Utc::now(),
    })
}

async fn metrics_handler(
    State(state): State<Arc<AppState>>,
) -> (
    StatusCode,
    [(axum::http::header::HeaderName, &'static str); 1],
    String,
) {
    state.metrics.inc_http_requests();
    let body = state.metrics.render_prometheus(&state.service);
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        body,
    )
}

async fn plugins_handler(State(state): State<Arc<AppState>>) -> Json<Vec<PluginStatus>> {
    state.metrics.inc_http_requests();
    Json(state.service.plugin_status())
}

async fn actions_handler(State(state): State<Arc<AppState>>) -> Json<Vec<Tool>> {
    state.metrics.inc_http_requests();
    Json(state.service.dispatcher().tools())
}

async fn invoke_handler(
    State(state): State<Arc<AppState>>,
    Path((plugin, action)): Path<(String, String)>,
    Json(input): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    state.metrics.inc_http_requests();
    let result = state
        .service
        .invoke_action(Some(&plugin), &action, input)
        .await;
    state.metrics.record_action(result.is_err());
    result.map(Json).map_err(|e| {
        state.metrics.inc_http_errors();
        warn!(%plugin, %action, error = %e, "action invocation failed");
        ApiError(e)
    })
}

async fn publish_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PublishRequest>,
) -> (StatusCode, Json<Message>) {
    state.metrics.inc_http_requests();
    let source = req.source.as_deref().unwrap_or(SYSTEM_SOURCE);
    let message = state.service.publish(source, req.content).await;
    (StatusCode::ACCEPTED, Json(message.as_ref().clone()))
}

async fn turn_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TurnRequest>,
) -> Result<Json<ModelTurn>, ApiError> {
    state.metrics.inc_http_requests();
    state.metrics.inc_model_turns();
    state.service.run_model_turn(&req.prompt).await.map(Json).map_err(|e| {
        state.metrics.inc_http_errors();
        warn!(error = %e, "model turn failed");
        ApiError(e)
    })
}

/// Start the HTTP server and run until `shutdown` resolves.
pub async fn start_server(
    service: Arc<AgentService>,
    listen: &str,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> kestrel_core::Result<()> {
    let router = build_router(service);

    info!(listen = %listen, "starting HTTP server");

    let listener = tokio::net::TcpListener::bind(listen).await.map_err(|e| {
        KestrelError::Config(format!("failed to bind {}: {}", listen, e))
    })?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

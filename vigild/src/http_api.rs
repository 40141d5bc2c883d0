//! HTTP API for daemon liveness and session health.
//!
//! Provides:
//! - `/health` - Basic daemon health check
//! - `/sessions/health` - Latest sweep across all sessions
//! - `/sessions/attention` - Sessions flagged by the startup sweep
//! - `/sessions/{id}/health` - Health report for one session
//! - `/sessions/{id}/workflow` - Workflow stage for one session

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::json;
use vigil_common::{HealthSweep, SessionId, classify_workflow};

use crate::poller::HealthPoller;
use crate::store::StoreError;

/// Shared state for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub poller: HealthPoller,
    pub version: &'static str,
    pub started_at: Instant,
    pub pid: u32,
}

/// Create the HTTP router.
pub fn create_router(state: HttpState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/sessions/health", get(sweep_handler))
        .route("/sessions/attention", get(attention_handler))
        .route("/sessions/{id}/health", get(session_health_handler))
        .route("/sessions/{id}/workflow", get(session_workflow_handler))
        .with_state(Arc::new(state))
}

/// Handler for `/health` - Basic daemon health check.
///
/// Returns 200 OK if the daemon is running.
async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let uptime_secs = state.started_at.elapsed().as_secs();

    Json(json!({
        "status": "healthy",
        "version": state.version,
        "pid": state.pid,
        "uptime_seconds": uptime_secs,
    }))
}

/// Handler for `/sessions/health`.
///
/// Serves the poller's latest sweep while it is within the cache TTL and
/// sweeps again otherwise, so `--no-poll` still sees new sessions.
async fn sweep_handler(State(state): State<Arc<HttpState>>) -> Response {
    match state.poller.current_sweep().await {
        Ok(sweep) => Json(sweep_body(&sweep)).into_response(),
        Err(err) => store_error(err),
    }
}

/// JSON body shared by the HTTP API and `vigild check`.
pub fn sweep_body(sweep: &HealthSweep) -> serde_json::Value {
    json!({
        "summary": sweep.summary(),
        "reports": sweep.reports.values().collect::<Vec<_>>(),
        "coalesced": sweep.coalesced,
    })
}

async fn attention_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let reports = state.poller.startup_attention().await;
    Json(json!({
        "startup_sweep_done": state.poller.startup_sweep_done(),
        "count": reports.len(),
        "reports": reports,
    }))
}

async fn session_health_handler(
    State(state): State<Arc<HttpState>>,
    Path(id): Path<String>,
) -> Response {
    let session = match state.poller.store().get(&SessionId::new(id)).await {
        Ok(session) => session,
        Err(err) => return store_error(err),
    };
    let report = state.poller.service().report_for(&session).await;
    Json(report).into_response()
}

async fn session_workflow_handler(
    State(state): State<Arc<HttpState>>,
    Path(id): Path<String>,
) -> Response {
    match state.poller.store().get(&SessionId::new(id)).await {
        Ok(session) => Json(json!({
            "session_id": session.id,
            "workflow": classify_workflow(&session),
        }))
        .into_response(),
        Err(err) => store_error(err),
    }
}

fn store_error(err: StoreError) -> Response {
    let code = err.error_code();
    let status = match err {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(json!({
            "error": {
                "code": code.code_string(),
                "message": err.to_string(),
                "remediation": code.remediation(),
            }
        })),
    )
        .into_response()
}

/// Start the HTTP server.
///
/// Binding happens before this returns so address errors surface to the
/// caller; the returned handle resolves when the server stops.
pub async fn start_server(
    bind: &str,
    state: HttpState,
) -> std::io::Result<tokio::task::JoinHandle<Result<(), std::io::Error>>> {
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?;

    tracing::info!("HTTP API listening on {}", listener.local_addr()?);

    Ok(tokio::spawn(async move { axum::serve(listener, router).await }))
}

//! HTTP surface: session lifecycle routes, health, and status.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

use dockhand_core::{OrchestratorError, SessionId};
use dockhand_session::{SessionManager, ValidationRunner};

use crate::auth::Bearer;
use crate::relay::TerminalRelay;
use crate::ws;

/// Shared state behind every route.
#[derive(Clone)]
pub struct GatewayState {
    pub manager: Arc<SessionManager>,
    pub runner: Arc<ValidationRunner>,
    pub relay: TerminalRelay,
    pub started_at: Instant,
}

impl GatewayState {
    pub fn new(
        manager: Arc<SessionManager>,
        runner: Arc<ValidationRunner>,
        relay: TerminalRelay,
    ) -> Self {
        Self { manager, runner, relay, started_at: Instant::now() }
    }
}

pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/status", get(status))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id/validate", post(validate_session))
        .route("/api/sessions/:id", delete(terminate_session))
        .route("/api/ws", get(ws::ws_handler))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
struct CreateSessionRequest {
    #[serde(default)]
    step_id: Option<String>,
}

async fn create_session(
    State(state): State<GatewayState>,
    Bearer(token): Bearer,
    payload: Option<Json<CreateSessionRequest>>,
) -> Response {
    let step_id = payload.and_then(|Json(req)| req.step_id).unwrap_or_default();
    match state.manager.create(&token, &step_id).await {
        Ok(record) => Json(json!({
            "session_id": record.id,
            "message": "Sandbox session created",
        }))
        .into_response(),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Default, Deserialize)]
struct ValidateRequest {
    #[serde(default)]
    script: Option<String>,
}

async fn validate_session(
    State(state): State<GatewayState>,
    Path(id): Path<SessionId>,
    Bearer(token): Bearer,
    payload: Option<Json<ValidateRequest>>,
) -> Response {
    let script = payload.and_then(|Json(req)| req.script).unwrap_or_default();
    match state.runner.validate(&id, &token, &script).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn terminate_session(
    State(state): State<GatewayState>,
    Path(id): Path<SessionId>,
    Bearer(token): Bearer,
) -> Response {
    match state.manager.terminate(&id, &token).await {
        Ok(report) => {
            let mut body = json!({ "message": "Session terminated" });
            if let Some(warning) = report.warning {
                body["warning"] = json!(warning);
            }
            Json(body).into_response()
        }
        Err(e) => error_response(&e),
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "dockhand",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn status(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "running",
        "active_sessions": state.manager.active_sessions().await,
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    }))
}

/// Map an orchestrator error onto the wire: a status code and a `message`
/// body.
pub(crate) fn error_response(err: &OrchestratorError) -> Response {
    let status = match err {
        OrchestratorError::Unauthorized => StatusCode::UNAUTHORIZED,
        OrchestratorError::NotFound => StatusCode::NOT_FOUND,
        OrchestratorError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        OrchestratorError::ProvisioningFailed(_)
        | OrchestratorError::ExecutionFailed(_)
        | OrchestratorError::PartialFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "message": err.to_string() }))).into_response()
}

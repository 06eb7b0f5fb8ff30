//! The HTTP front-end (§6): a thin `axum` router over
//! [`crate::dispatcher::Dispatcher`] and [`crate::recovery::recover`].

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::dispatcher::Dispatcher;
use crate::error::ChaosError;
use crate::model::AttackKind;

#[derive(Clone)]
struct AppState {
    dispatcher: Arc<Dispatcher>,
}

#[derive(Serialize)]
struct UidResponse {
    uid: String,
}

impl IntoResponse for ChaosError {
    fn into_response(self) -> Response {
        let status = if self.is_bad_args() {
            StatusCode::BAD_REQUEST
        } else if self.is_non_recoverable() {
            StatusCode::CONFLICT
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, self.to_string()).into_response()
    }
}

/// Build the HTTP router (§6). Every attack route returns `{uid}` on
/// success; `DELETE /api/attack/:uid` reverses it.
pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/api/attack/process", post(attack_process))
        .route("/api/attack/network", post(attack_network))
        .route("/api/attack/stress", post(attack_stress))
        .route("/api/attack/disk", post(attack_disk))
        .route("/api/attack/{uid}", delete(recover_attack))
        .route("/api/swagger/{*path}", get(swagger_stub))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { dispatcher })
}

async fn attack_process(
    State(state): State<AppState>,
    Json(args): Json<serde_json::Value>,
) -> Result<Json<UidResponse>, ChaosError> {
    let uid = state.dispatcher.execute_attack(AttackKind::Process, args).await?;
    Ok(Json(UidResponse { uid }))
}

async fn attack_network(
    State(state): State<AppState>,
    Json(args): Json<serde_json::Value>,
) -> Result<Json<UidResponse>, ChaosError> {
    let uid = state.dispatcher.execute_attack(AttackKind::Network, args).await?;
    Ok(Json(UidResponse { uid }))
}

async fn attack_stress(
    State(state): State<AppState>,
    Json(args): Json<serde_json::Value>,
) -> Result<Json<UidResponse>, ChaosError> {
    let uid = state.dispatcher.execute_attack(AttackKind::Stress, args).await?;
    Ok(Json(UidResponse { uid }))
}

async fn attack_disk(
    State(state): State<AppState>,
    Json(args): Json<serde_json::Value>,
) -> Result<Json<UidResponse>, ChaosError> {
    let kind = match args.get("action").and_then(|v| v.as_str()) {
        Some("disk-fill") => AttackKind::DiskFill,
        _ => AttackKind::DiskPayload,
    };
    let uid = state.dispatcher.execute_attack(kind, args).await?;
    Ok(Json(UidResponse { uid }))
}

async fn recover_attack(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> Result<Json<UidResponse>, ChaosError> {
    crate::recovery::recover(&state.dispatcher, &uid).await?;
    Ok(Json(UidResponse { uid }))
}

/// Stub mount acknowledging the embedded-OpenAPI-docs contract (§1, §6):
/// full swagger UI generation is out of scope.
async fn swagger_stub() -> &'static str {
    "swagger UI generation is out of scope for this daemon"
}

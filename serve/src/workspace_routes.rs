//! Workspace routes: current, switch, recent, safe-mode.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::response::ApiError;

pub async fn current(State(state): State<Arc<AppState>>) -> Json<Value> {
    match state.workspace.current().await {
        Some(info) => Json(json!({ "path": info.path, "hash": info.hash })),
        None => Json(json!({ "path": null, "hash": null })),
    }
}

#[derive(Debug, Deserialize)]
pub struct SwitchBody {
    pub path: String,
}

pub async fn switch(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SwitchBody>,
) -> Result<Json<Value>, ApiError> {
    let info = state.workspace.switch(&body.path).await?;
    // The failure log follows lazily; rebinding here just front-loads it.
    if let Err(e) = state.core.failure_log.ensure_workspace(&info.hash).await {
        tracing::warn!(error = %e, "failure log rebind after switch failed");
    }
    state
        .hub
        .send("status", json!({ "state": "workspace_switched", "hash": info.hash }));
    Ok(Json(json!({ "path": info.path, "hash": info.hash })))
}

pub async fn recent(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "recentWorkspaces": state.workspace.recent().await }))
}

pub async fn safe_mode(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let enabled = state
        .workspace
        .refresh_safe_mode()
        .await
        .map_err(ApiError::from)?;
    Ok(Json(json!({ "safeMode": enabled })))
}

//! Model tooling routes: model listing, combo runs, context tests, and the
//! tool-subsystem restart stub.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tandem::cache::Cache;
use tandem::combo::ComboProgress;
use tandem::probe;
use tandem::registry::ModelProfile;

use crate::app::AppState;
use crate::response::ApiError;

/// How long the provider model listing stays cached.
const MODEL_CACHE_TTL: Duration = Duration::from_secs(30);

/// Known models: provider listing (cached) merged with registry profiles.
pub async fn models(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let cache_key = "served".to_string();
    let served = match state.model_cache.get(&cache_key).await {
        Some(ids) => ids,
        None => {
            let ids = match state.core.backend.list_models().await {
                Ok(ids) => ids,
                Err(e) => {
                    warn!(error = %e, "model listing failed; registry only");
                    Vec::new()
                }
            };
            let _ = state
                .model_cache
                .set(cache_key, ids.clone(), Some(MODEL_CACHE_TTL))
                .await;
            ids
        }
    };
    let profiles = state.core.registry.all().await;
    let mut models: Vec<Value> = Vec::new();
    for id in &served {
        let profile = profiles.iter().find(|p| &p.model_id == id);
        models.push(json!({
            "id": id,
            "profiled": profile.is_some(),
            "role": profile.map(|p| p.role),
            "overall": profile.map(|p| p.overall),
        }));
    }
    // Profiles for models the provider no longer serves still show up.
    for profile in &profiles {
        if !served.contains(&profile.model_id) {
            models.push(json!({
                "id": profile.model_id,
                "profiled": true,
                "served": false,
                "role": profile.role,
                "overall": profile.overall,
            }));
        }
    }
    Ok(Json(json!({ "models": models })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeBody {
    pub model_id: String,
    #[serde(default)]
    pub include_latency_sweep: bool,
}

/// Probes one model out-of-band; the finished profile replaces the model's
/// registry document and the result streams over the hub.
pub async fn probe_model(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ProbeBody>,
) -> Result<Json<Value>, ApiError> {
    if body.model_id.trim().is_empty() {
        return Err(ApiError::bad_request("missing modelId"));
    }
    let core = state.core.clone();
    let hub = state.hub.clone();
    tokio::spawn(async move {
        let prosthetic = core.prosthetics.get(&body.model_id).await;
        let options = probe::ProbeOptions {
            include_latency_sweep: body.include_latency_sweep,
            prosthetic_fragment: prosthetic.map(|p| p.text),
            ..probe::ProbeOptions::default()
        };
        let result = probe::run_profile(core.backend.as_ref(), &body.model_id, &options).await;
        hub.send(
            "status",
            json!({
                "state": "probe_completed",
                "modelId": result.model_id,
                "overall": result.overall,
                "role": result.role,
            }),
        );
        let enabled = if result.scores.tool_accuracy >= 60.0 {
            tandem::CANONICAL_TOOLS.iter().map(|t| t.name.clone()).collect()
        } else {
            Vec::new()
        };
        let profile = ModelProfile::from_probe_run(result, enabled);
        if let Err(e) = core.registry.upsert(profile).await {
            warn!(error = %e, "profile upsert failed");
        }
    });
    Ok(Json(json!({ "started": true })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComboRunBody {
    pub main_models: Vec<String>,
    pub executor_models: Vec<String>,
}

/// Starts a combo run in the background; progress streams over the hub.
pub async fn combo_run(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ComboRunBody>,
) -> Result<Json<Value>, ApiError> {
    if body.main_models.is_empty() || body.executor_models.is_empty() {
        return Err(ApiError::bad_request(
            "mainModels and executorModels must both be non-empty",
        ));
    }
    let mut active = state.combo_run.lock().await;
    if active.as_ref().is_some_and(|t| !t.is_cancelled()) {
        return Err(ApiError::conflict("a combo run is already in progress"));
    }

    let cancel = CancellationToken::new();
    *active = Some(cancel.clone());
    drop(active);

    let (tx, mut rx) = mpsc::channel::<ComboProgress>(64);
    let hub = state.hub.clone();
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let (frame_type, data) = match &event {
                ComboProgress::Progress { .. } => ("combo_test_progress", json!(event)),
                ComboProgress::Result(_) => ("combo_test_result", json!(event)),
                ComboProgress::MainExcluded { .. } => ("combo_test_main_excluded", json!(event)),
                ComboProgress::Error { .. } => ("combo_test_error", json!(event)),
                ComboProgress::Completed { .. } => ("combo_test_completed", json!(event)),
            };
            hub.send(frame_type, data);
        }
    });

    let core = state.core.clone();
    let run_state = state.clone();
    let timeout = core.router_config().await.timeout;
    tokio::spawn(async move {
        let evaluator = core.combo_evaluator(timeout.min(Duration::from_secs(60)));
        match evaluator
            .run(&body.main_models, &body.executor_models, Some(tx), cancel)
            .await
        {
            Ok(records) => info!(records = records.len(), "combo run finished"),
            Err(e) => warn!(error = %e, "combo run failed"),
        }
        run_state.combo_run.lock().await.take();
    });

    Ok(Json(json!({ "started": true })))
}

pub async fn combo_stop(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let active = state.combo_run.lock().await;
    match active.as_ref() {
        Some(token) => {
            token.cancel();
            Ok(Json(json!({ "stopped": true })))
        }
        None => Err(ApiError::not_found("no combo run in progress")),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextTestBody {
    pub main_model_id: String,
    pub executor_model_id: String,
}

/// Context-latency sweep for both sides of a pair.
pub async fn combo_context_test(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ContextTestBody>,
) -> Result<Json<Value>, ApiError> {
    let timeout = Duration::from_secs(30);
    let backend = state.core.backend.as_ref();
    let main_curve = probe::latency::sweep(backend, &body.main_model_id, timeout, None).await;
    let executor_curve =
        probe::latency::sweep(backend, &body.executor_model_id, timeout, None).await;
    Ok(Json(json!({
        "main": { "modelId": body.main_model_id, "curve": main_curve },
        "executor": { "modelId": body.executor_model_id, "curve": executor_curve },
    })))
}

/// Best main+executor pairing from the current profiles.
pub async fn pairing_recommendation(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ApiError> {
    let profiles = state.core.registry.all().await;
    match tandem::recommend_pairing(&profiles, &tandem::PairingConstraints::default()) {
        Some(rec) => Ok(Json(json!({ "recommendation": rec }))),
        None => Err(ApiError::not_found(
            "no eligible main/executor pair in the registry",
        )),
    }
}

/// Tool-subsystem restart: a boundary stub; the actual subsystem is an
/// external collaborator.
pub async fn mcp_restart(State(state): State<Arc<AppState>>) -> Json<Value> {
    state
        .hub
        .send("status", json!({ "state": "mcp_restart_requested" }));
    Json(json!({ "accepted": true }))
}

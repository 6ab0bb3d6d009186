//! Teams: saved main+executor pairings, with one active at a time.
//!
//! Activating a team rewrites the router configuration, so the next turn
//! routes through the team's pair.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::{Path as UrlPath, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tandem::router::RouterConfig;

use crate::app::AppState;
use crate::response::ApiError;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: String,
    pub name: String,
    pub main_model_id: String,
    pub executor_model_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TeamsDoc {
    version: u32,
    #[serde(default)]
    teams: Vec<Team>,
    #[serde(default)]
    active_team_id: Option<String>,
}

/// `teams.json` under the data root.
pub struct TeamStore {
    path: PathBuf,
    doc: Mutex<TeamsDoc>,
}

impl TeamStore {
    pub async fn open(data_root: impl AsRef<Path>) -> Result<Self, tandem::StoreError> {
        let path = data_root.as_ref().join("teams.json");
        let doc = tandem::persist::read_json::<TeamsDoc>(&path)
            .await?
            .unwrap_or(TeamsDoc {
                version: 1,
                ..TeamsDoc::default()
            });
        Ok(Self {
            path,
            doc: Mutex::new(doc),
        })
    }

    pub async fn list(&self) -> Vec<Team> {
        self.doc.lock().await.teams.clone()
    }

    pub async fn active(&self) -> Option<Team> {
        let doc = self.doc.lock().await;
        let id = doc.active_team_id.as_ref()?;
        doc.teams.iter().find(|t| &t.id == id).cloned()
    }

    pub async fn create(
        &self,
        name: String,
        main: String,
        executor: String,
    ) -> Result<Team, tandem::StoreError> {
        let team = Team {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            main_model_id: main,
            executor_model_id: executor,
            created_at: Utc::now(),
        };
        let mut doc = self.doc.lock().await;
        doc.teams.push(team.clone());
        self.flush(&doc).await?;
        Ok(team)
    }

    pub async fn update(
        &self,
        id: &str,
        name: Option<String>,
        main: Option<String>,
        executor: Option<String>,
    ) -> Result<Option<Team>, tandem::StoreError> {
        let mut doc = self.doc.lock().await;
        let Some(team) = doc.teams.iter_mut().find(|t| t.id == id) else {
            return Ok(None);
        };
        if let Some(name) = name {
            team.name = name;
        }
        if let Some(main) = main {
            team.main_model_id = main;
        }
        if let Some(executor) = executor {
            team.executor_model_id = executor;
        }
        let updated = team.clone();
        self.flush(&doc).await?;
        Ok(Some(updated))
    }

    pub async fn delete(&self, id: &str) -> Result<bool, tandem::StoreError> {
        let mut doc = self.doc.lock().await;
        let before = doc.teams.len();
        doc.teams.retain(|t| t.id != id);
        if doc.active_team_id.as_deref() == Some(id) {
            doc.active_team_id = None;
        }
        let removed = doc.teams.len() != before;
        if removed {
            self.flush(&doc).await?;
        }
        Ok(removed)
    }

    pub async fn activate(&self, id: &str) -> Result<Option<Team>, tandem::StoreError> {
        let mut doc = self.doc.lock().await;
        let Some(team) = doc.teams.iter().find(|t| t.id == id).cloned() else {
            return Ok(None);
        };
        doc.active_team_id = Some(team.id.clone());
        self.flush(&doc).await?;
        Ok(Some(team))
    }

    async fn flush(&self, doc: &TeamsDoc) -> Result<(), tandem::StoreError> {
        tandem::persist::write_json_atomic(&self.path, doc).await
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTeamBody {
    pub name: String,
    pub main_model_id: String,
    pub executor_model_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTeamBody {
    pub name: Option<String>,
    pub main_model_id: Option<String>,
    pub executor_model_id: Option<String>,
}

async fn refuse_in_safe_mode(state: &AppState) -> Result<(), ApiError> {
    if state.workspace.safe_mode().await {
        return Err(ApiError::conflict(
            "workspace is in safe mode (dirty checkout); mutations refused",
        ));
    }
    Ok(())
}

pub async fn list_teams(State(state): State<Arc<AppState>>) -> Json<Vec<Team>> {
    Json(state.teams.list().await)
}

pub async fn active_team(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    Ok(Json(json!({ "team": state.teams.active().await })))
}

pub async fn create_team(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateTeamBody>,
) -> Result<Json<Team>, ApiError> {
    refuse_in_safe_mode(&state).await?;
    if body.name.trim().is_empty() {
        return Err(ApiError::bad_request("team name must not be empty"));
    }
    let team = state
        .teams
        .create(body.name, body.main_model_id, body.executor_model_id)
        .await?;
    Ok(Json(team))
}

pub async fn update_team(
    State(state): State<Arc<AppState>>,
    UrlPath(id): UrlPath<String>,
    Json(body): Json<UpdateTeamBody>,
) -> Result<Json<Team>, ApiError> {
    refuse_in_safe_mode(&state).await?;
    state
        .teams
        .update(&id, body.name, body.main_model_id, body.executor_model_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("no team {id}")))
}

pub async fn delete_team(
    State(state): State<Arc<AppState>>,
    UrlPath(id): UrlPath<String>,
) -> Result<Json<Value>, ApiError> {
    refuse_in_safe_mode(&state).await?;
    if state.teams.delete(&id).await? {
        Ok(Json(json!({ "deleted": true })))
    } else {
        Err(ApiError::not_found(format!("no team {id}")))
    }
}

/// Activates a team and applies its pair to the router configuration.
pub async fn activate_team(
    State(state): State<Arc<AppState>>,
    UrlPath(id): UrlPath<String>,
) -> Result<Json<Team>, ApiError> {
    refuse_in_safe_mode(&state).await?;
    let Some(team) = state.teams.activate(&id).await? else {
        return Err(ApiError::not_found(format!("no team {id}")));
    };
    let current = state.core.router_config().await;
    state
        .core
        .set_router_config(RouterConfig {
            main_model: Some(team.main_model_id.clone()),
            executor_model: Some(team.executor_model_id.clone()),
            enable_dual: true,
            ..current
        })
        .await;
    state.hub.send(
        "status",
        json!({ "state": "team_activated", "team": team.name }),
    );
    Ok(Json(team))
}

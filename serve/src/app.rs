//! Axum app: shared state and route table.

use std::collections::HashMap;
use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use tandem::{IdeMapping, InMemoryCache, TandemCore};
use tandem_workspace::WorkspaceManager;

use crate::rag::RagClient;
use crate::teams::{self, TeamStore};
use crate::ws::Hub;
use crate::{chat, tooly, workspace_routes};

/// Everything a request handler can reach.
pub struct AppState {
    pub core: Arc<TandemCore>,
    pub workspace: Arc<WorkspaceManager>,
    pub teams: Arc<TeamStore>,
    pub hub: Hub,
    pub rag: RagClient,
    /// Cancellation token of the in-flight combo run, when one exists.
    pub combo_run: Mutex<Option<CancellationToken>>,
    /// TTL'd mapping documents, keyed by IDE name.
    pub ide_cache: InMemoryCache<String, IdeMapping>,
    /// TTL'd provider model listing.
    pub model_cache: InMemoryCache<String, Vec<String>>,
    /// Per-model session ids for the dashboard frames.
    pub sessions: Mutex<HashMap<String, String>>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/chat/completions", post(chat::chat_completions))
        .route("/v1/chat/completions", post(chat::chat_completions))
        .route("/api/workspace/current", get(workspace_routes::current))
        .route("/api/workspace/switch", post(workspace_routes::switch))
        .route("/api/workspace/recent", get(workspace_routes::recent))
        .route("/api/workspace/safe-mode", get(workspace_routes::safe_mode))
        .route("/api/tooly/models", get(tooly::models))
        .route("/api/tooly/probe", post(tooly::probe_model))
        .route("/api/tooly/pairing", get(tooly::pairing_recommendation))
        .route("/api/rag/query", post(crate::rag::rag_query))
        .route("/api/tooly/combo-test/run", post(tooly::combo_run))
        .route("/api/tooly/combo-test/stop", post(tooly::combo_stop))
        .route(
            "/api/tooly/combo-test/context-test",
            post(tooly::combo_context_test),
        )
        .route("/api/teams", get(teams::list_teams).post(teams::create_team))
        .route("/api/teams/active", get(teams::active_team))
        .route(
            "/api/teams/:id",
            put(teams::update_team).delete(teams::delete_team),
        )
        .route("/api/teams/:id/activate", post(teams::activate_team))
        .route("/api/mcp/restart", post(tooly::mcp_restart))
        .route("/ws", get(crate::ws::ws_handler))
        .with_state(state)
}

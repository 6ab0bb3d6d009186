//! HTTP + WebSocket surface for Tandem (axum).
//!
//! Routes: the OpenAI-compatible chat-completions intercept, workspace
//! management, model tooling (probing/combo runs), teams, and one WebSocket
//! endpoint fanning out `{type, data}` frames.
//!
//! **Public API**: [`build_state`], [`run_serve`], [`run_serve_on_listener`].

mod app;
mod chat;
mod rag;
mod response;
mod teams;
mod tooly;
mod workspace_routes;
mod ws;

pub use app::AppState;
pub use rag::{RagClient, RagError, RagFilter, RagQuery, RagResponse, RagResult};
pub use response::ApiError;
pub use teams::{Team, TeamStore};
pub use ws::Hub;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::info;

use tandem::TandemCore;
use tandem_workspace::WorkspaceManager;

/// Interval between `system_metrics` frames.
const METRICS_INTERVAL: Duration = Duration::from_secs(10);

/// Builds the shared state: opens the team store and wires the hub and RAG
/// client to the core.
pub async fn build_state(
    core: Arc<TandemCore>,
    workspace: Arc<WorkspaceManager>,
    rag_base_url: &str,
) -> Result<Arc<AppState>, tandem::StoreError> {
    let teams = Arc::new(TeamStore::open(core.data_root()).await?);
    Ok(Arc::new(AppState {
        core,
        workspace,
        teams,
        hub: Hub::new(),
        rag: RagClient::new(rag_base_url),
        combo_run: Mutex::new(None),
        ide_cache: tandem::InMemoryCache::new(),
        model_cache: tandem::InMemoryCache::new(),
        sessions: Mutex::new(std::collections::HashMap::new()),
    }))
}

/// Serves on an existing listener until `shutdown` resolves. Tests bind to
/// `127.0.0.1:0` and pass the listener in.
pub async fn run_serve_on_listener(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = listener.local_addr()?;
    info!("tandem listening on http://{addr}");

    let started = Instant::now();
    let metrics_state = state.clone();
    let metrics = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(METRICS_INTERVAL);
        loop {
            ticker.tick().await;
            metrics_state.hub.send(
                "system_metrics",
                json!({
                    "uptimeSeconds": started.elapsed().as_secs(),
                    "subscribers": metrics_state.hub.subscriber_count(),
                }),
            );
        }
    });

    state.hub.send("status", json!({ "state": "listening", "addr": addr.to_string() }));
    let app = app::router(state);
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;
    metrics.abort();
    info!("tandem server stopped");
    result.map_err(Into::into)
}

/// Binds `addr` and serves until `shutdown` resolves.
pub async fn run_serve(
    addr: &str,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    run_serve_on_listener(listener, state, shutdown).await
}

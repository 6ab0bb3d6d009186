//! Integration tests: the HTTP surface end to end with a scripted backend.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use tandem::provider::{ChatBackend, Reply, ScriptedBackend};
use tandem::router::RouterConfig;
use tandem::TandemCore;
use tandem_workspace::{PristineGitStatus, WorkspaceManager};

struct TestServer {
    base: String,
    ws_url: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<()>,
    _data_dir: tempfile::TempDir,
}

impl TestServer {
    async fn start(backend: ScriptedBackend, config: RouterConfig) -> Self {
        let data_dir = tempfile::tempdir().unwrap();
        let backend: Arc<dyn ChatBackend> = Arc::new(backend);
        let core = Arc::new(
            TandemCore::init(data_dir.path(), backend, "default")
                .await
                .unwrap(),
        );
        core.set_router_config(config).await;
        let workspace = Arc::new(
            WorkspaceManager::open(data_dir.path(), Arc::new(PristineGitStatus))
                .await
                .unwrap(),
        );
        let state = serve::build_state(core, workspace, "http://localhost:3002")
            .await
            .unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            serve::run_serve_on_listener(listener, state, async {
                let _ = rx.await;
            })
            .await
            .unwrap();
        });
        Self {
            base: format!("http://{addr}"),
            ws_url: format!("ws://{addr}/ws"),
            shutdown: Some(tx),
            handle,
            _data_dir: data_dir,
        }
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = self.handle.await;
    }
}

fn dual_config() -> RouterConfig {
    RouterConfig {
        main_model: Some("planner".to_string()),
        executor_model: Some("executor".to_string()),
        enable_dual: true,
        ..RouterConfig::default()
    }
}

fn dual_backend() -> ScriptedBackend {
    ScriptedBackend::with_handler(Box::new(|call| {
        if call.model == "planner" {
            Reply::content(
                r#"{"action":"call_tool","tool":"read_file","parameters":{"path":"src/index.ts"}}"#,
            )
        } else {
            Reply::tool_call("read_file", r#"{"path":"src/index.ts"}"#)
        }
    }))
}

#[tokio::test]
async fn chat_completions_routes_dual_and_returns_openai_shape() {
    let server = TestServer::start(dual_backend(), dual_config()).await;
    let client = reqwest::Client::new();

    let body = json!({
        "model": "client-model",
        "messages": [{"role": "user", "content": "Read file src/index.ts"}],
        "tools": [{"type": "function", "function": {
            "name": "read_file",
            "description": "Reads a file.",
            "parameters": {"type": "object", "properties": {"path": {"type": "string"}}}
        }}]
    });
    let resp = client
        .post(format!("{}/v1/chat/completions", server.base))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let value: Value = resp.json().await.unwrap();
    assert_eq!(
        value["choices"][0]["message"]["tool_calls"][0]["function"]["name"],
        "read_file"
    );
    assert_eq!(value["model"], "client-model");

    server.stop().await;
}

#[tokio::test]
async fn missing_model_is_rejected_with_error_body() {
    let server = TestServer::start(ScriptedBackend::with_fixed("ok"), RouterConfig::default()).await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/chat/completions", server.base))
        .json(&json!({"model": "", "messages": [{"role": "user", "content": "hi"}]}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let value: Value = resp.json().await.unwrap();
    assert!(value["error"].as_str().unwrap().contains("model"));
    server.stop().await;
}

#[tokio::test]
async fn workspace_switch_and_recent() {
    let server = TestServer::start(ScriptedBackend::with_fixed("ok"), RouterConfig::default()).await;
    let client = reqwest::Client::new();
    let ws_dir = tempfile::tempdir().unwrap();

    let resp = client
        .post(format!("{}/api/workspace/switch", server.base))
        .json(&json!({ "path": ws_dir.path() }))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let switched: Value = resp.json().await.unwrap();
    let hash = switched["hash"].as_str().unwrap().to_string();
    assert_eq!(hash.len(), 16);

    let current: Value = client
        .get(format!("{}/api/workspace/current", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(current["hash"], hash.as_str());

    let recent: Value = client
        .get(format!("{}/api/workspace/recent", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(recent["recentWorkspaces"].as_array().unwrap().len(), 1);

    let bad = client
        .post(format!("{}/api/workspace/switch", server.base))
        .json(&json!({ "path": "/definitely/not/there" }))
        .send()
        .await
        .unwrap();
    assert_eq!(bad.status(), 400);

    server.stop().await;
}

#[tokio::test]
async fn teams_crud_and_activation_rewires_routing() {
    let server = TestServer::start(ScriptedBackend::with_fixed("ok"), RouterConfig::default()).await;
    let client = reqwest::Client::new();

    let team: Value = client
        .post(format!("{}/api/teams", server.base))
        .json(&json!({"name": "pair", "mainModelId": "A", "executorModelId": "B"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = team["id"].as_str().unwrap().to_string();

    let listed: Value = client
        .get(format!("{}/api/teams", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let activated = client
        .post(format!("{}/api/teams/{id}/activate", server.base))
        .send()
        .await
        .unwrap();
    assert!(activated.status().is_success());

    let active: Value = client
        .get(format!("{}/api/teams/active", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(active["team"]["name"], "pair");

    let deleted = client
        .delete(format!("{}/api/teams/{id}", server.base))
        .send()
        .await
        .unwrap();
    assert!(deleted.status().is_success());

    let missing = client
        .put(format!("{}/api/teams/{id}", server.base))
        .json(&json!({"name": "gone"}))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);

    server.stop().await;
}

#[tokio::test]
async fn websocket_answers_pings() {
    let server = TestServer::start(ScriptedBackend::with_fixed("ok"), RouterConfig::default()).await;
    let (mut socket, _) = tokio_tungstenite::connect_async(&server.ws_url)
        .await
        .unwrap();

    socket
        .send(tokio_tungstenite::tungstenite::Message::Text(
            json!({"type": "ping", "data": {"n": 7}}).to_string(),
        ))
        .await
        .unwrap();

    // The hub may interleave status/system_metrics frames; scan for the pong.
    let mut saw_pong = false;
    for _ in 0..10 {
        let frame = tokio::time::timeout(std::time::Duration::from_secs(5), socket.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if let tokio_tungstenite::tungstenite::Message::Text(text) = frame {
            let value: Value = serde_json::from_str(&text).unwrap();
            if value["type"] == "pong" {
                assert_eq!(value["data"]["n"], 7);
                saw_pong = true;
                break;
            }
        }
    }
    assert!(saw_pong);
    server.stop().await;
}

#[tokio::test]
async fn mcp_restart_stub_accepts() {
    let server = TestServer::start(ScriptedBackend::with_fixed("ok"), RouterConfig::default()).await;
    let resp: Value = reqwest::Client::new()
        .post(format!("{}/api/mcp/restart", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resp["accepted"], true);
    server.stop().await;
}

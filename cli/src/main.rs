//! Tandem entry point: load configuration, build the core, serve.
//!
//! Initialization failures (provider client, registry) abort startup with a
//! non-zero exit status. SIGINT/SIGTERM begin a bounded graceful shutdown:
//! the listener closes, in-flight turns drain, stores are already
//! write-through, and a watchdog forces exit if draining stalls.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};

use tandem::provider::{Provider, ProviderClient};
use tandem::router::{auto_select, RouterConfig};
use tandem::{ChatBackend, TandemCore};
use tandem_workspace::{CommandGitStatus, WorkspaceManager};

/// How long in-flight turns get to drain after a shutdown signal.
const DRAIN_BUDGET: Duration = Duration::from_secs(20);

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ProviderKind {
    Local,
    Openai,
    Azure,
}

#[derive(Parser, Debug)]
#[command(name = "tandem", about = "Context-management middleware proxy for agentic LLM work")]
struct Args {
    /// Listen address.
    #[arg(long, env = "TANDEM_ADDR", default_value = "127.0.0.1:3001")]
    addr: String,

    /// Data root for profiles, failure logs, teams, and combo results.
    #[arg(long, env = "TANDEM_DATA_DIR", default_value = ".tandem")]
    data_dir: PathBuf,

    /// Upstream provider to route through.
    #[arg(long, value_enum, default_value_t = ProviderKind::Local)]
    provider: ProviderKind,

    /// Main (planning) model id; auto-selected from profiles when omitted.
    #[arg(long, env = "TANDEM_MAIN_MODEL")]
    main_model: Option<String>,

    /// Executor model id; auto-selected from profiles when omitted.
    #[arg(long, env = "TANDEM_EXECUTOR_MODEL")]
    executor_model: Option<String>,

    /// Enable the planning → execution pipeline.
    #[arg(long, env = "TANDEM_DUAL", default_value_t = false)]
    dual: bool,

    /// Per-provider-call timeout in seconds.
    #[arg(long, env = "TANDEM_TIMEOUT_SECS", default_value_t = 60)]
    timeout_secs: u64,

    /// Initial workspace path to bind mutable state to.
    #[arg(long, env = "TANDEM_WORKSPACE")]
    workspace: Option<PathBuf>,
}

fn provider_from(args: &Args) -> Provider {
    match args.provider {
        ProviderKind::Local => Provider::Local {
            base_url: std::env::var("TANDEM_LOCAL_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:1234".to_string()),
        },
        ProviderKind::Openai => Provider::OpenAiCompatible {
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com".to_string()),
            api_key_env: "OPENAI_API_KEY".to_string(),
        },
        ProviderKind::Azure => Provider::Azure {
            endpoint: std::env::var("AZURE_OPENAI_ENDPOINT").unwrap_or_default(),
            deployment: std::env::var("AZURE_OPENAI_DEPLOYMENT").unwrap_or_default(),
            api_version: std::env::var("AZURE_OPENAI_API_VERSION")
                .unwrap_or_else(|_| "2024-02-15-preview".to_string()),
            api_key_env: "AZURE_OPENAI_API_KEY".to_string(),
        },
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received; draining");

    // Watchdog: a drain that never finishes must not hold the process.
    tokio::spawn(async {
        tokio::time::sleep(DRAIN_BUDGET).await;
        error!("drain budget exceeded; forcing exit");
        std::process::exit(1);
    });
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("startup failed: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if let Err(e) = config::load_and_apply("tandem", None) {
        // Configuration files are optional; a broken one is worth a warning
        // before falling back to plain env.
        eprintln!("config load: {e}");
    }
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let provider = provider_from(&args);
    info!(provider = provider.name(), addr = %args.addr, "starting tandem");

    let client = ProviderClient::new(provider)?;
    let backend: Arc<dyn ChatBackend> = Arc::new(client);

    let workspace = Arc::new(
        WorkspaceManager::open(&args.data_dir, Arc::new(CommandGitStatus)).await?,
    );
    if let Some(path) = &args.workspace {
        workspace.switch(path).await?;
    }
    let workspace_hash = workspace
        .current()
        .await
        .map(|w| w.hash)
        .unwrap_or_else(|| "default".to_string());

    let core = Arc::new(TandemCore::init(&args.data_dir, backend, &workspace_hash).await?);

    let (main_model, executor_model) = match (args.main_model.clone(), args.executor_model.clone())
    {
        (Some(m), Some(e)) => (Some(m), Some(e)),
        (m, e) if args.dual => {
            let (auto_main, auto_executor) = auto_select(&core.registry).await;
            let main = m.or(auto_main);
            let executor = e.or(auto_executor);
            if main.is_none() || executor.is_none() {
                warn!("dual mode requested but no profiled pair available; running single-mode");
            }
            (main, executor)
        }
        (m, e) => (m, e),
    };
    core.set_router_config(RouterConfig {
        main_model,
        executor_model,
        enable_dual: args.dual,
        timeout: Duration::from_secs(args.timeout_secs),
        temperature: None,
    })
    .await;

    let rag_base_url = std::env::var("TANDEM_RAG_BASE_URL")
        .unwrap_or_else(|_| "http://localhost:3002".to_string());
    let state = serve::build_state(core, workspace, &rag_base_url).await?;

    serve::run_serve(&args.addr, state, shutdown_signal()).await?;
    info!("goodbye");
    Ok(())
}

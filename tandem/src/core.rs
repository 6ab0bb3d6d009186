//! The core handle: every mutable service constructed once at startup and
//! passed by reference to each request path.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

use crate::combo::{ComboEvaluator, ComboStore};
use crate::failure::FailureLog;
use crate::persist::StoreError;
use crate::prosthetic::ProstheticStore;
use crate::provider::{ChatBackend, ProviderError};
use crate::registry::CapabilityRegistry;
use crate::router::{IntentRouter, RouterConfig};

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("store init: {0}")]
    Store(#[from] StoreError),
    #[error("provider init: {0}")]
    Provider(#[from] ProviderError),
}

/// Owns the registry, failure log, prosthetic store, and combo results; hands
/// out per-turn routers built from the current configuration snapshot.
pub struct TandemCore {
    pub backend: Arc<dyn ChatBackend>,
    pub registry: Arc<CapabilityRegistry>,
    pub failure_log: Arc<FailureLog>,
    pub prosthetics: Arc<ProstheticStore>,
    pub combo_store: Arc<ComboStore>,
    data_root: PathBuf,
    router_config: RwLock<RouterConfig>,
}

impl TandemCore {
    /// Initializes every store under `data_root`. Any failure here aborts
    /// startup; there is no degraded mode without the registry or the log.
    pub async fn init(
        data_root: impl AsRef<Path>,
        backend: Arc<dyn ChatBackend>,
        workspace_hash: &str,
    ) -> Result<Self, CoreError> {
        let data_root = data_root.as_ref().to_path_buf();
        let registry = Arc::new(CapabilityRegistry::open(data_root.join("profiles")).await?);
        let prosthetics = Arc::new(ProstheticStore::open(&data_root).await?);
        let failure_log = Arc::new(FailureLog::open(&data_root, workspace_hash).await?);
        let combo_store = Arc::new(ComboStore::open(&data_root).await?);
        info!(data_root = %data_root.display(), "core initialized");
        Ok(Self {
            backend,
            registry,
            failure_log,
            prosthetics,
            combo_store,
            data_root,
            router_config: RwLock::new(RouterConfig::default()),
        })
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    pub async fn router_config(&self) -> RouterConfig {
        self.router_config.read().await.clone()
    }

    pub async fn set_router_config(&self, config: RouterConfig) {
        *self.router_config.write().await = config;
    }

    /// A router over the current configuration snapshot. The router itself
    /// holds no persistent state.
    pub async fn router(&self) -> IntentRouter {
        IntentRouter::new(
            self.backend.clone(),
            self.registry.clone(),
            self.prosthetics.clone(),
            self.failure_log.clone(),
            self.router_config().await,
        )
    }

    pub fn combo_evaluator(&self, timeout: Duration) -> ComboEvaluator {
        ComboEvaluator::new(
            self.backend.clone(),
            self.registry.clone(),
            self.prosthetics.clone(),
            self.failure_log.clone(),
            self.combo_store.clone(),
            timeout,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ScriptedBackend;
    use crate::router::RouterConfig;

    #[tokio::test]
    async fn init_builds_all_stores_and_routers_see_config() {
        let dir = tempfile::tempdir().unwrap();
        let backend: Arc<dyn ChatBackend> = Arc::new(ScriptedBackend::with_fixed("ok"));
        let core = TandemCore::init(dir.path(), backend, "ws1").await.unwrap();

        core.set_router_config(RouterConfig {
            main_model: Some("A".to_string()),
            executor_model: Some("B".to_string()),
            enable_dual: true,
            ..RouterConfig::default()
        })
        .await;
        let router = core.router().await;
        assert_eq!(router.config().main_model.as_deref(), Some("A"));
        assert!(router.config().enable_dual);
    }
}

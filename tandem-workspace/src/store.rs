//! `workspace.json`-backed workspace state: current path, recents, safe mode.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::info;

use crate::git::GitStatus;

/// MRU recents cap.
const MAX_RECENT: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("workspace path does not exist: {0}")]
    NotFound(PathBuf),
    #[error("workspace path is not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization: {0}")]
    Serde(#[from] serde_json::Error),
}

/// The current workspace identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceInfo {
    pub path: PathBuf,
    /// First 16 hex chars of the SHA-256 of the canonical path. Uniquely
    /// selects the mutable-state root.
    pub hash: String,
}

/// Stable hash of a workspace path.
pub fn workspace_hash(path: &Path) -> String {
    let canonical = path
        .canonicalize()
        .unwrap_or_else(|_| path.to_path_buf());
    let digest = Sha256::digest(canonical.to_string_lossy().as_bytes());
    digest
        .iter()
        .take(8)
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct WorkspaceDoc {
    version: u32,
    current_workspace: Option<PathBuf>,
    #[serde(default)]
    recent_workspaces: Vec<PathBuf>,
    #[serde(default)]
    safe_mode: bool,
}

/// Owns `workspace.json` under the data root and the safe-mode flag.
pub struct WorkspaceManager {
    config_path: PathBuf,
    state: Mutex<WorkspaceDoc>,
    git: Arc<dyn GitStatus>,
}

impl WorkspaceManager {
    /// Opens (or creates) the manager. `data_root` holds `workspace.json`.
    pub async fn open(
        data_root: impl AsRef<Path>,
        git: Arc<dyn GitStatus>,
    ) -> Result<Self, WorkspaceError> {
        let config_path = data_root.as_ref().join("workspace.json");
        let doc = match tokio::fs::read(&config_path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => WorkspaceDoc {
                version: 1,
                ..WorkspaceDoc::default()
            },
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            config_path,
            state: Mutex::new(doc),
            git,
        })
    }

    /// The current workspace, when one has been selected.
    pub async fn current(&self) -> Option<WorkspaceInfo> {
        let state = self.state.lock().await;
        state.current_workspace.as_ref().map(|p| WorkspaceInfo {
            path: p.clone(),
            hash: workspace_hash(p),
        })
    }

    /// Switches to `path`: validates existence, recomputes the hash, updates
    /// the recents, re-evaluates safe mode, persists atomically.
    pub async fn switch(&self, path: impl AsRef<Path>) -> Result<WorkspaceInfo, WorkspaceError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(WorkspaceError::NotFound(path.to_path_buf()));
        }
        if !path.is_dir() {
            return Err(WorkspaceError::NotADirectory(path.to_path_buf()));
        }
        let canonical = path.canonicalize()?;
        let dirty = self.git.is_dirty(&canonical).await;

        let mut state = self.state.lock().await;
        state.recent_workspaces.retain(|p| p != &canonical);
        state.recent_workspaces.insert(0, canonical.clone());
        state.recent_workspaces.truncate(MAX_RECENT);
        state.current_workspace = Some(canonical.clone());
        state.safe_mode = dirty;
        self.persist(&state).await?;

        let info = WorkspaceInfo {
            hash: workspace_hash(&canonical),
            path: canonical,
        };
        info!(path = %info.path.display(), hash = %info.hash, safe_mode = dirty, "workspace switched");
        Ok(info)
    }

    /// Most-recently-used workspaces, current first.
    pub async fn recent(&self) -> Vec<PathBuf> {
        self.state.lock().await.recent_workspaces.clone()
    }

    /// Whether workspace-scoped writes are currently refused.
    pub async fn safe_mode(&self) -> bool {
        self.state.lock().await.safe_mode
    }

    /// Re-checks the checkout and updates the flag (e.g. after a commit).
    pub async fn refresh_safe_mode(&self) -> Result<bool, WorkspaceError> {
        let current = {
            let state = self.state.lock().await;
            state.current_workspace.clone()
        };
        let dirty = match current {
            Some(path) => self.git.is_dirty(&path).await,
            None => false,
        };
        let mut state = self.state.lock().await;
        if state.safe_mode != dirty {
            state.safe_mode = dirty;
            self.persist(&state).await?;
        }
        Ok(dirty)
    }

    async fn persist(&self, doc: &WorkspaceDoc) -> Result<(), WorkspaceError> {
        if let Some(parent) = self.config_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.config_path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(doc)?).await?;
        tokio::fs::rename(&tmp, &self.config_path).await?;
        Ok(())
    }
}

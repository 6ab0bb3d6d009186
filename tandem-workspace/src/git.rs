//! Version-control status seam for safe mode.

use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

/// Reports whether a checkout has uncommitted changes. Injected so the
/// workspace manager never shells out in tests.
#[async_trait]
pub trait GitStatus: Send + Sync {
    async fn is_dirty(&self, path: &Path) -> bool;
}

/// Shells out to `git status --porcelain`. A path outside any repository is
/// treated as clean.
pub struct CommandGitStatus;

#[async_trait]
impl GitStatus for CommandGitStatus {
    async fn is_dirty(&self, path: &Path) -> bool {
        let output = tokio::process::Command::new("git")
            .arg("-C")
            .arg(path)
            .args(["status", "--porcelain"])
            .output()
            .await;
        match output {
            Ok(out) if out.status.success() => !out.stdout.is_empty(),
            Ok(_) | Err(_) => {
                debug!(path = %path.display(), "git status unavailable; treating as clean");
                false
            }
        }
    }
}

/// Always-clean stub for tests and non-VCS deployments.
pub struct PristineGitStatus;

#[async_trait]
impl GitStatus for PristineGitStatus {
    async fn is_dirty(&self, _path: &Path) -> bool {
        false
    }
}

//! Workspace partitioning: separate crate with its own storage.
//!
//! - **Workspace**: a filesystem path whose stable hash selects the mutable
//!   state root (failure log, settings) for everything scoped to it.
//! - **Switch**: validates the path, recomputes the hash, updates the MRU
//!   recents, persists `workspace.json` atomically; dependents pick up the
//!   new root lazily on their next read.
//! - **Safe mode**: a dirty version-control checkout (per the injected
//!   git-status seam) refuses workspace-scoped writes.

mod git;
mod store;

pub use git::{CommandGitStatus, GitStatus, PristineGitStatus};
pub use store::{workspace_hash, WorkspaceError, WorkspaceInfo, WorkspaceManager};

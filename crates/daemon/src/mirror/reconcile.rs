// Startup reconciliation: clone declared repositories that are missing from
// the repository root, delete directories that are no longer declared.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use glacier_common::repo::RepoName;
use glacier_common::types::{ActionOutcome, GitAction};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::MirrorEngine;
use crate::git::remote::redact_remote_url;
use crate::git::CommandExecutor;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("failed to create repository root `{}`: {source}", path.display())]
    CreateRoot { path: PathBuf, source: io::Error },
    #[error("failed to list repository root `{}`: {source}", path.display())]
    ListRoot { path: PathBuf, source: io::Error },
    #[error("failed to remove undeclared mirror `{}`: {source}", path.display())]
    Remove { path: PathBuf, source: io::Error },
}

/// What one reconciliation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Declared and freshly cloned.
    pub cloned: Vec<RepoName>,
    /// Declared, missing, and the clone failed. Retried on the next pass.
    pub clone_failed: Vec<RepoName>,
    /// Declared and already present.
    pub unchanged: Vec<RepoName>,
    /// Present but undeclared, deleted.
    pub removed: Vec<String>,
    /// Entries under the root that are not mirror directories.
    pub ignored: Vec<String>,
}

impl ReconcileReport {
    /// True when the pass neither cloned nor removed anything.
    pub fn is_noop(&self) -> bool {
        self.cloned.is_empty() && self.clone_failed.is_empty() && self.removed.is_empty()
    }
}

/// Directories currently under the repository root.
#[derive(Debug, Default)]
struct LocalMirrors {
    dirs: BTreeSet<String>,
    ignored: Vec<String>,
}

impl<E: CommandExecutor> MirrorEngine<E> {
    /// Bring the repository root in line with the declared repositories.
    ///
    /// Clone failures are counted and reported but never abort the pass.
    /// Failing to create or list the root, or to delete an undeclared mirror,
    /// is returned as an error.
    pub async fn reconcile(&self) -> Result<ReconcileReport, ReconcileError> {
        let _active = self.metrics.enter_cycle();

        ensure_repo_root(&self.repo_root).await?;
        let local = list_local_mirrors(&self.repo_root).await?;

        let mut report = ReconcileReport { ignored: local.ignored, ..ReconcileReport::default() };

        for repo in &self.repos {
            if local.dirs.contains(repo.name.as_str()) {
                debug!(repo = %repo.name, "mirror already present");
                report.unchanged.push(repo.name.clone());
                continue;
            }

            let remote = redact_remote_url(&repo.remote_url);
            info!(repo = %repo.name, remote = %remote, "cloning mirror");
            let outcome = self
                .instrumented(
                    &repo.name,
                    GitAction::Clone,
                    self.git.clone_mirror(&self.repo_root, &repo.remote_url, &repo.name),
                )
                .await;

            match outcome {
                ActionOutcome::Succeeded => report.cloned.push(repo.name.clone()),
                ActionOutcome::Failed => report.clone_failed.push(repo.name.clone()),
            }
        }

        for dir in &local.dirs {
            if self.is_declared(dir) {
                continue;
            }

            let path = self.repo_root.join(dir);
            tokio::fs::remove_dir_all(&path)
                .await
                .map_err(|source| ReconcileError::Remove { path: path.clone(), source })?;
            info!(repo = %dir, "removed undeclared mirror");
            report.removed.push(dir.clone());
        }

        info!(
            cloned = report.cloned.len(),
            clone_failed = report.clone_failed.len(),
            unchanged = report.unchanged.len(),
            removed = report.removed.len(),
            "reconciliation finished"
        );

        Ok(report)
    }
}

async fn ensure_repo_root(path: &Path) -> Result<(), ReconcileError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|source| ReconcileError::CreateRoot { path: path.to_path_buf(), source })
}

// Hidden entries are skipped outright. Files, symlinks, and non-UTF-8 names
// are neither treated as mirrors nor deleted.
async fn list_local_mirrors(root: &Path) -> Result<LocalMirrors, ReconcileError> {
    let list_error = |source| ReconcileError::ListRoot { path: root.to_path_buf(), source };

    let mut local = LocalMirrors::default();
    let mut entries = tokio::fs::read_dir(root).await.map_err(list_error)?;
    while let Some(entry) = entries.next_entry().await.map_err(list_error)? {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            let lossy = file_name.to_string_lossy().into_owned();
            warn!(entry = %lossy, "ignoring non UTF-8 entry in repository root");
            local.ignored.push(lossy);
            continue;
        };

        if name.starts_with('.') {
            continue;
        }

        let file_type = entry.file_type().await.map_err(list_error)?;
        if !file_type.is_dir() {
            warn!(entry = name, "ignoring non-directory entry in repository root");
            local.ignored.push(name.to_string());
            continue;
        }

        local.dirs.insert(name.to_string());
    }

    Ok(local)
}

// Mirror engine: reconciles the repository root against the declared set and
// runs scheduled maintenance over every declared mirror.
//
// Every (repository x action) git invocation goes through `instrumented`,
// which records begin/success/error metrics and converts failures into an
// `ActionOutcome` so a single bad repository never aborts a cycle.

pub mod maintenance;
pub mod reconcile;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use glacier_common::repo::RepoName;
use glacier_common::types::{ActionOutcome, GitAction, RepositoryDeclaration};
use tracing::{info, warn};

use crate::config::GlacierConfig;
use crate::git::{CommandExecutor, GitCli, GitCommandOutput, GitError, ProcessCommandExecutor};
use crate::metrics::GlacierMetrics;

pub use maintenance::{MaintenanceReport, RepoMaintenance};
pub use reconcile::{ReconcileError, ReconcileReport};

pub struct MirrorEngine<E = ProcessCommandExecutor> {
    repos: Vec<RepositoryDeclaration>,
    repo_root: PathBuf,
    git: GitCli<E>,
    metrics: Arc<GlacierMetrics>,
}

impl MirrorEngine<ProcessCommandExecutor> {
    pub fn from_config(config: &GlacierConfig, metrics: Arc<GlacierMetrics>) -> Self {
        Self::new(
            config.repos.clone(),
            config.repo_root(),
            GitCli::new(config.command_timeout()),
            metrics,
        )
    }
}

impl<E: CommandExecutor> MirrorEngine<E> {
    pub fn new(
        repos: Vec<RepositoryDeclaration>,
        repo_root: impl Into<PathBuf>,
        git: GitCli<E>,
        metrics: Arc<GlacierMetrics>,
    ) -> Self {
        Self { repos, repo_root: repo_root.into(), git, metrics }
    }

    pub fn repos(&self) -> &[RepositoryDeclaration] {
        &self.repos
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    pub fn metrics(&self) -> &Arc<GlacierMetrics> {
        &self.metrics
    }

    /// `<repo_root>/<name>`.
    pub fn mirror_path(&self, name: &RepoName) -> PathBuf {
        self.repo_root.join(name.as_str())
    }

    fn is_declared(&self, dir_name: &str) -> bool {
        self.repos.iter().any(|repo| repo.name.as_str() == dir_name)
    }

    async fn instrumented<F>(&self, repo: &RepoName, action: GitAction, run: F) -> ActionOutcome
    where
        F: Future<Output = Result<GitCommandOutput, GitError>>,
    {
        self.metrics.record_begin(repo, action);

        match run.await {
            Ok(output) => {
                log_captured(repo, action, &output.stdout, &output.stderr);
                self.metrics.record_success(repo, action);
                ActionOutcome::Succeeded
            }
            Err(error) => {
                if let Some((stdout, stderr)) = error.captured_output() {
                    log_captured(repo, action, stdout, stderr);
                }
                self.metrics.record_error(repo, action);
                warn!(repo = %repo, action = %action, error = %error, "git action failed");
                ActionOutcome::Failed
            }
        }
    }
}

// git writes progress to stderr even on success, so both streams are always logged.
fn log_captured(repo: &RepoName, action: GitAction, stdout: &str, stderr: &str) {
    let stdout = stdout.trim();
    if !stdout.is_empty() {
        info!(repo = %repo, action = %action, "{stdout}");
    }

    let stderr = stderr.trim();
    if !stderr.is_empty() {
        warn!(repo = %repo, action = %action, "{stderr}");
    }
}

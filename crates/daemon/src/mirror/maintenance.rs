use glacier_common::repo::RepoName;
use glacier_common::types::{ActionOutcome, GitAction};
use tracing::info;

use super::MirrorEngine;
use crate::git::CommandExecutor;

/// Outcome of one maintenance cycle for a single mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoMaintenance {
    pub name: RepoName,
    pub update: ActionOutcome,
    pub gc: ActionOutcome,
}

impl RepoMaintenance {
    pub fn is_success(&self) -> bool {
        self.update.is_success() && self.gc.is_success()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub repos: Vec<RepoMaintenance>,
}

impl MaintenanceReport {
    /// Number of failed actions across all mirrors.
    pub fn failures(&self) -> usize {
        self.repos
            .iter()
            .map(|repo| usize::from(!repo.update.is_success()) + usize::from(!repo.gc.is_success()))
            .sum()
    }
}

impl<E: CommandExecutor> MirrorEngine<E> {
    /// Fetch and compact every declared mirror, in declaration order.
    ///
    /// `gc` runs even when the preceding `remote update` failed. Failures are
    /// counted and logged, never returned.
    pub async fn run_maintenance(&self) -> MaintenanceReport {
        let _active = self.metrics.enter_cycle();
        let mut report = MaintenanceReport::default();

        for repo in &self.repos {
            let mirror = self.mirror_path(&repo.name);

            let update = self
                .instrumented(&repo.name, GitAction::Update, self.git.remote_update(&mirror))
                .await;
            let gc = self.instrumented(&repo.name, GitAction::Gc, self.git.gc(&mirror)).await;

            report.repos.push(RepoMaintenance { name: repo.name.clone(), update, gc });
        }

        info!(
            repos = report.repos.len(),
            failures = report.failures(),
            "maintenance cycle finished"
        );
        report
    }
}

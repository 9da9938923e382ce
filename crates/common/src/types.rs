// Core domain types shared across git-glacier crates.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::repo::RepoName;

/// A repository the configuration asks us to keep mirrored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepositoryDeclaration {
    pub name: RepoName,
    pub remote_url: String,
}

impl RepositoryDeclaration {
    pub fn new(name: RepoName, remote_url: impl Into<String>) -> Self {
        Self { name, remote_url: remote_url.into() }
    }
}

/// A git action performed against a mirror. Doubles as the `action` metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GitAction {
    /// `git clone --mirror` into the repository root.
    Clone,
    /// `git remote update` inside the mirror.
    Update,
    /// `git gc` inside the mirror.
    Gc,
}

impl GitAction {
    pub const ALL: [GitAction; 3] = [GitAction::Clone, GitAction::Update, GitAction::Gc];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Clone => "clone",
            Self::Update => "update",
            Self::Gc => "gc",
        }
    }
}

impl fmt::Display for GitAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one isolated (repository x action) invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutcome {
    Succeeded,
    Failed,
}

impl ActionOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

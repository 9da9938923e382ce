// Configuration file for the glacier daemon.
//
// Located at `<base_dir>/<config_file>`. JSON by default, TOML when the file
// extension is `.toml`. Read once at startup.

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use glacier_common::repo::RepoName;
use glacier_common::types::RepositoryDeclaration;
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use thiserror::Error;

use crate::scheduler::CronSchedule;

/// Directory under `base_dir` that holds one mirror per declared repository.
pub const REPO_DIR_NAME: &str = "repos";

pub const DEFAULT_ATOMIC_TIMEOUT_MS: u64 = 300_000;
pub const DEFAULT_METRICS_PORT: u16 = 9300;

/// Daemon configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GlacierConfig {
    /// Declared repositories in document order (name -> remote URL).
    #[serde(deserialize_with = "deserialize_repos")]
    pub repos: Vec<RepositoryDeclaration>,
    /// Cron expression driving the maintenance cycle.
    pub cron: String,
    /// Upper bound for a single git invocation, in milliseconds.
    #[serde(default = "default_atomic_timeout")]
    pub atomic_timeout: u64,
    /// Port of the `/metrics` endpoint.
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    /// Supplied on the command line, never read from the file.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

fn default_atomic_timeout() -> u64 {
    DEFAULT_ATOMIC_TIMEOUT_MS
}

fn default_metrics_port() -> u16 {
    DEFAULT_METRICS_PORT
}

impl GlacierConfig {
    /// Load `<base_dir>/<config_file>` and attach `base_dir`.
    pub fn load(
        base_dir: impl Into<PathBuf>,
        config_file: impl AsRef<Path>,
    ) -> Result<Self, ConfigError> {
        let base_dir = base_dir.into();
        let mut config = Self::load_from(&config_path(&base_dir, config_file))?;
        config.base_dir = base_dir;
        Ok(config)
    }

    /// Load and validate a specific file. `base_dir` is left empty.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        let config =
            if is_toml(path) { Self::from_toml(&contents)? } else { Self::from_json(&contents)? };
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(contents)?)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.atomic_timeout == 0 {
            return Err(ConfigError::Invalid("atomicTimeout must be greater than zero".into()));
        }

        for repo in &self.repos {
            let url = repo.remote_url.trim();
            if url.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "repository `{}` has an empty remote URL",
                    repo.name
                )));
            }
            if url.starts_with('-') {
                return Err(ConfigError::Invalid(format!(
                    "repository `{}` has a remote URL that looks like an option",
                    repo.name
                )));
            }
        }

        CronSchedule::parse(&self.cron)
            .map_err(|error| ConfigError::Invalid(error.to_string()))?;

        Ok(())
    }

    /// `<base_dir>/repos`.
    pub fn repo_root(&self) -> PathBuf {
        self.base_dir.join(REPO_DIR_NAME)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.atomic_timeout)
    }

    pub fn metrics_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.metrics_port))
    }
}

/// The config file path is resolved relative to the base directory.
pub fn config_path(base_dir: &Path, config_file: impl AsRef<Path>) -> PathBuf {
    base_dir.join(config_file)
}

fn is_toml(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
}

fn deserialize_repos<'de, D>(deserializer: D) -> Result<Vec<RepositoryDeclaration>, D::Error>
where
    D: Deserializer<'de>,
{
    struct ReposVisitor;

    impl<'de> Visitor<'de> for ReposVisitor {
        type Value = Vec<RepositoryDeclaration>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of repository name to remote URL")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut repos: Vec<RepositoryDeclaration> =
                Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((name, remote_url)) = map.next_entry::<RepoName, String>()? {
                if repos.iter().any(|repo| repo.name == name) {
                    return Err(de::Error::custom(format!("duplicate repository `{name}`")));
                }
                repos.push(RepositoryDeclaration::new(name, remote_url));
            }
            Ok(repos)
        }
    }

    deserializer.deserialize_map(ReposVisitor)
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file `{}`: {source}", path.display())]
    Io { path: PathBuf, source: std::io::Error },
    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

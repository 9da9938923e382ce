// git-glacier: keeps local mirrors of declared git repositories.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use glacier_daemon::config::{config_path, GlacierConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: git-glacier <base_dir> <config_file>";

#[derive(Parser)]
#[command(name = "git-glacier", about = "Mirror git repositories and keep them maintained")]
struct Cli {
    /// Directory holding the config file and the `repos/` mirror root.
    base_dir: PathBuf,
    /// Config file path, relative to `base_dir`. JSON, or TOML with a `.toml` extension.
    config_file: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match GlacierConfig::load(&cli.base_dir, &cli.config_file) {
        Ok(config) => config,
        Err(error) => {
            eprintln!(
                "{USAGE}. Failed to read or parse config file '{}': {error}",
                config_path(&cli.base_dir, &cli.config_file).display()
            );
            std::process::exit(-1);
        }
    };

    info!(base_dir = %cli.base_dir.display(), "configuration loaded");
    glacier_daemon::runtime::run(config).await.context("git-glacier terminated unexpectedly")
}

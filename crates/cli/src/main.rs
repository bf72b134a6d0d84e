//! stockcache entry point.
//!
//! Maintenance and inspection commands for the persistent cache. Results go
//! to stdout; logging goes to stderr.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = cli::Cli::parse();
    let mut config = stockcache_core::CacheConfig::load()?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }

    tracing::debug!(db_path = %config.db_path.display(), "loaded configuration");
    commands::run(cli.command, config).await
}

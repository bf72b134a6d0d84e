//! CLI definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use stockcache_core::EntityClass;

#[derive(Parser)]
#[command(name = "stockcache")]
#[command(author, version, about = "Maintain and query the offline stock data cache")]
pub struct Cli {
    /// SQLite store path (overrides STOCKCACHE_DB_PATH)
    #[arg(long)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Delete expired entries from the persistent store
    Sweep,
    /// Show entry counts per class
    Stats,
    /// List stored entries of one class, newest first
    Inspect {
        #[arg(value_parser = parse_class)]
        class: EntityClass,
    },
    /// Remove stored entries
    Clear {
        /// Only clear this class
        #[arg(long, value_parser = parse_class)]
        class: Option<EntityClass>,
    },
    /// Fetch through the cache and print the annotated JSON
    Fetch(FetchArgs),
}

#[derive(clap::Args)]
pub struct FetchArgs {
    #[arg(value_parser = parse_class)]
    pub class: EntityClass,

    /// Backend path to GET, relative to STOCKCACHE_API_BASE_URL
    #[arg(long)]
    pub path: String,

    /// User the data belongs to
    #[arg(long, env = "STOCKCACHE_USER_ID")]
    pub user: Option<String>,

    /// Stock or index ticker
    #[arg(long)]
    pub ticker: Option<String>,
}

fn parse_class(name: &str) -> Result<EntityClass, String> {
    EntityClass::parse(name).ok_or_else(|| {
        let known: Vec<&str> = EntityClass::ALL.iter().map(EntityClass::as_str).collect();
        format!("unknown class '{name}', expected one of: {}", known.join(", "))
    })
}

//! Command implementations.

use anyhow::{Context, Result};
use serde_json::{Value, json};
use stockcache_client::{ApiClient, ApiConfig};
use stockcache_core::{CacheConfig, CacheDb, CacheService, Connectivity, EntityClass, Fetched};

use crate::cli::{Commands, FetchArgs};

pub async fn run(command: Commands, config: CacheConfig) -> Result<()> {
    match command {
        Commands::Sweep => {
            let service = CacheService::open(config, Connectivity::default()).await?;
            let removed = service.store().sweep().await;
            print_json(&json!({ "removed": removed }))
        }
        Commands::Stats => {
            let db = CacheDb::open(&config.db_path).await?;
            let mut counts = serde_json::Map::new();
            for class in EntityClass::ALL {
                counts.insert(class.as_str().into(), Value::from(db.count_entries(Some(class)).await?));
            }
            counts.insert("total".into(), Value::from(db.count_entries(None).await?));
            print_json(&Value::Object(counts))
        }
        Commands::Inspect { class } => {
            let db = CacheDb::open(&config.db_path).await?;
            let rows: Vec<Value> = db
                .list_entries(class)
                .await?
                .into_iter()
                .map(|row| {
                    json!({
                        "key": row.entry_key,
                        "writtenAt": row.written_at.to_rfc3339(),
                        "expiresAt": row.expires_at.to_rfc3339(),
                        "bytes": row.payload_json.len(),
                    })
                })
                .collect();
            print_json(&Value::Array(rows))
        }
        Commands::Clear { class } => {
            let db = CacheDb::open(&config.db_path).await?;
            let removed = db.clear_class(class).await?;
            print_json(&json!({ "removed": removed }))
        }
        Commands::Fetch(args) => fetch(args, config).await,
    }
}

async fn fetch(args: FetchArgs, config: CacheConfig) -> Result<()> {
    let client = ApiClient::new(ApiConfig::from_cache_config(&config)?)?;
    let service = CacheService::open(config, Connectivity::default()).await?;

    let path = args.path;
    let remote = move || {
        let client = client.clone();
        let path = path.clone();
        async move { client.get_json::<Value>(&path).await }
    };

    let user = || args.user.as_deref().context("--user is required for this class");
    let ticker = || args.ticker.as_deref().context("--ticker is required for this class");

    let fetched: Fetched<Value> = match args.class {
        EntityClass::Portfolio => service.get_portfolio_with_cache(user()?, remote).await?,
        EntityClass::Analysis => service.get_analysis_with_cache(ticker()?, user()?, remote).await?,
        EntityClass::OpenTrades => service.get_open_trades_with_cache(user()?, remote).await?,
        EntityClass::MarketStatus => service.get_market_status_with_cache(remote).await?,
        EntityClass::IndexAnalysis => {
            let user_id = args.user.as_deref().unwrap_or_default();
            service.get_index_analysis_with_cache(ticker()?, user_id, remote).await?
        }
    };

    if fetched.is_offline() {
        tracing::warn!(class = %args.class, stale = fetched.is_stale(), "served from offline cache");
    }
    print_json(&fetched.annotated_json()?)
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

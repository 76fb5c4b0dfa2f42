//! Fairness Engine API Server Binary

use clap::Parser;
use fairness_engine::{
    api::ApiServer, ConfigLoader, FairnessEngine, MemoryRoundStore, OsEntropy, RoundStore,
};
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "fairness-api")]
#[command(about = "Provably-fair outcome engine HTTP API", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long)]
    config: Option<String>,

    /// Override the configured listen host
    #[arg(long)]
    host: Option<String>,

    /// Override the configured listen port
    #[arg(long)]
    port: Option<u16>,

    /// Allowed CORS origins (comma-separated, use * for all)
    #[arg(long)]
    cors_origins: Option<String>,

    /// Persist rounds in RocksDB at this path (requires the `rocksdb` feature)
    #[arg(long)]
    db_path: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.with_path(path);
    }
    let mut config = loader.load()?;

    if let Some(host) = args.host.clone() {
        config.api.host = host;
    }
    if let Some(port) = args.port {
        config.api.port = port;
    }
    if let Some(origins) = &args.cors_origins {
        config.api.allowed_origins = origins.split(',').map(|s| s.trim().to_string()).collect();
    }
    config.validate()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.api.log_filter.clone().into()),
        )
        .init();

    let store = open_store(&args)?;
    let engine = Arc::new(FairnessEngine::with_parts(config.clone(), Box::new(OsEntropy), store)?);
    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.api.host,
        port = config.api.port,
        "Starting fairness engine"
    );

    ApiServer::new(config.api, engine).run().await
}

#[cfg(feature = "rocksdb")]
fn open_store(args: &Args) -> Result<Arc<dyn RoundStore>, Box<dyn std::error::Error>> {
    match &args.db_path {
        Some(path) => {
            info!(path = %path, "Opening RocksDB round store");
            Ok(Arc::new(fairness_engine::RocksRoundStore::open(path)?))
        }
        None => Ok(Arc::new(MemoryRoundStore::new())),
    }
}

#[cfg(not(feature = "rocksdb"))]
fn open_store(args: &Args) -> Result<Arc<dyn RoundStore>, Box<dyn std::error::Error>> {
    if args.db_path.is_some() {
        return Err("--db-path requires building with the `rocksdb` feature".into());
    }
    Ok(Arc::new(MemoryRoundStore::new()))
}

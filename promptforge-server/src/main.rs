use clap::Parser;
use promptforge_core::{BlobStore, ExecutionLogRecord, ForgeConfig};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use promptforge_server::router::ForgeState;
use promptforge_server::server;
use promptforge_server::subsystems::aggregate::TraceAggregator;
use promptforge_server::subsystems::memory::{InMemoryLogSource, InMemorySummaryStore};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "promptforge.toml")]
    config: String,

    #[arg(long)]
    health: bool,

    /// Run without Postgres: logs and summaries live in process memory.
    #[arg(long)]
    memory: bool,

    /// JSON array of execution-log rows to preload in memory mode.
    #[arg(long, requires = "memory")]
    seed: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience; production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let config = match ForgeConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // RUST_LOG wins over [service] log_level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    let blobs: Arc<dyn BlobStore> =
        Arc::from(promptforge_core::create_blob_store(&config.blob).await?);
    tracing::info!(backend = blobs.name(), "Blob store ready");

    let state = if args.memory {
        memory_state(&config, blobs, args.seed.as_deref()).await?
    } else {
        let pool = match promptforge_core::db::create_pool(&config.database).await {
            Ok(p) => p,
            Err(e) => {
                eprintln!("Failed to connect to database: {}", e);
                std::process::exit(1);
            }
        };

        if args.health {
            match promptforge_core::db::health_check(&pool).await {
                Ok(v) => println!("✅ PostgreSQL connected: {}", v),
                Err(e) => {
                    println!("❌ PostgreSQL connection failed: {}", e);
                    std::process::exit(1);
                }
            }
            println!("✅ PromptForge DB health check passed");
            return Ok(());
        }

        if config.database.ensure_schema {
            promptforge_core::db::ensure_schema(&pool).await?;
        }

        let aggregator =
            TraceAggregator::from_pool(pool.clone(), blobs, config.aggregation.clone());
        ForgeState::new(Some(pool), Arc::new(aggregator), config.clone())
    };

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    if config.http.enabled {
        let http_state = state.clone();
        let http_shutdown = tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) =
                promptforge_server::http::start_http_server(http_state, http_shutdown).await
            {
                tracing::error!("HTTP server error: {}", e);
            }
        });
    }

    let socket_path = config.service.socket_path.clone();
    server::run_unix_server(&socket_path, state, tx.subscribe()).await?;

    Ok(())
}

async fn memory_state(
    config: &ForgeConfig,
    blobs: Arc<dyn BlobStore>,
    seed: Option<&str>,
) -> anyhow::Result<ForgeState> {
    let logs = match seed {
        Some(path) => {
            let raw = tokio::fs::read_to_string(path).await?;
            let rows: Vec<ExecutionLogRecord> = serde_json::from_str(&raw)?;
            tracing::info!(rows = rows.len(), path, "Seeded in-memory execution logs");
            InMemoryLogSource::with_logs(rows)
        }
        None => InMemoryLogSource::new(),
    };

    tracing::warn!("Running in memory mode: summaries are lost on exit");
    let aggregator = TraceAggregator::new(
        Arc::new(logs),
        Arc::new(InMemorySummaryStore::new()),
        blobs,
        config.aggregation.clone(),
    );
    Ok(ForgeState::new(None, Arc::new(aggregator), config.clone()))
}

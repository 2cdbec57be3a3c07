//! CallShield server entrypoint
//!
//! Wires the store, the advice dispatcher and the HTTP API together.

use callshield_server::advice::ModelClient;
use callshield_server::api::{self, AppContext};
use callshield_server::limiter::{RateLimiter, PRUNE_INTERVAL};
use callshield_server::store::LiveStore;
use callshield_server::telephony::ProviderClient;
use callshield_server::worker::AdviceDispatcher;
use callshield_server::Config;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CallShield - real-time anti-scam call coach
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to bind to (overrides CALLSHIELD_PORT)
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Database file path (overrides CALLSHIELD_DB)
    #[arg(long, value_name = "FILE")]
    db: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("callshield_server={log_level},callshield_common={log_level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("CallShield starting...");

    let mut config = Config::from_env();
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(db) = args.db {
        config.db_path = db;
    }

    info!("Initializing database...");
    let pool = callshield_common::db::init_database(&config.db_path).await?;
    info!("Database initialized at: {}", config.db_path.display());

    let events = callshield_common::events::event_channel(256);
    let store = LiveStore::new(pool, events);

    let model = ModelClient::from_settings(&config.model);
    if model.is_none() {
        warn!("MODEL_API_KEY not set; running on heuristic advice only");
    }
    let dispatcher = AdviceDispatcher::new(store.clone(), model, config.model_min_interval());

    let limiter = RateLimiter::new();
    Arc::clone(&limiter).spawn_pruner(PRUNE_INTERVAL);

    let telephony = ProviderClient::from_settings(&config.provider).map(Arc::new);
    if telephony.is_none() {
        warn!("Provider credentials not set; outbound call placement disabled");
    }

    let port = config.port;
    let ctx = AppContext {
        store,
        dispatcher,
        limiter,
        telephony,
        config: Arc::new(config),
    };

    api::server::run(ctx, port).await?;

    Ok(())
}

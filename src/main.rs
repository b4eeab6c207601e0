//! Pusher Slot Server
//!
//! Overlay and ingest server for the live-event pusher/slot economy.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use pusher_slot::{
    VERSION,
    economy::{Economy, EconomyConfig},
    ledger::{Leaderboard, LedgerStore, MemoryLedger, RedisLedger},
    network::{AuthConfig, Broadcaster, OverlayServer, ServerConfig},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("Pusher Slot Server v{}", VERSION);

    let server_config = ServerConfig::from_env().context("server configuration")?;
    let economy_config = EconomyConfig::from_env().context("economy configuration")?;
    let auth = AuthConfig::from_env();
    if !auth.is_configured() {
        warn!("No ADMIN_TOKEN or ADMIN_JWT_SECRET set; admin operations are disabled");
    }

    info!(
        "Points: {} initial, {} per spin; leaderboard top {} every {:?}",
        economy_config.points.initial,
        economy_config.points.cost_per_spin,
        economy_config.leaderboard_size,
        economy_config.leaderboard_interval,
    );

    match std::env::var("REDIS_URL").ok().filter(|url| !url.trim().is_empty()) {
        Some(url) => {
            let prefix = std::env::var("REDIS_PREFIX").unwrap_or_default();
            let store = RedisLedger::new(
                &url,
                &prefix,
                economy_config.points.initial,
                economy_config.live_defaults,
            )
            .context("invalid REDIS_URL")?;
            store.ping().await.context("Redis unreachable")?;
            info!("Ledger backend: Redis (prefix {:?})", prefix);
            run(store, server_config, economy_config, auth).await
        }
        None => {
            warn!("REDIS_URL not set; running single-node with an in-process ledger");
            let store = MemoryLedger::new(economy_config.points.initial, economy_config.live_defaults);
            run(store, server_config, economy_config, auth).await
        }
    }
}

async fn run<S: LedgerStore + Leaderboard>(
    store: S,
    server_config: ServerConfig,
    economy_config: EconomyConfig,
    auth: AuthConfig,
) -> anyhow::Result<()> {
    let economy = Economy::new(Arc::new(store), Broadcaster::default(), economy_config, auth);
    let server = Arc::new(OverlayServer::new(server_config, economy));

    let signal_server = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
            signal_server.shutdown();
        }
    });

    server.run().await.context("server failed")?;
    info!("Server stopped");
    Ok(())
}

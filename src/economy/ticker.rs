//! Periodic leaderboard snapshot.
//!
//! Runs on its own timer, independent of action traffic. Each tick is a
//! read-only `top_n` followed by a publish; a failed tick is logged and the
//! loop keeps going.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::economy::Economy;
use crate::ledger::{Leaderboard, LedgerStore};

/// Spawn the snapshot loop. It stops when `shutdown` fires or its sender is dropped.
pub fn spawn_leaderboard_ticker<S: LedgerStore + Leaderboard>(
    economy: Economy<S>,
    shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    let period = economy.config().leaderboard_interval;
    tokio::spawn(run_leaderboard_loop(economy, period, shutdown))
}

/// Publish a leaderboard snapshot every `period`.
pub async fn run_leaderboard_loop<S: LedgerStore + Leaderboard>(
    economy: Economy<S>,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(period_ms = period.as_millis() as u64, "leaderboard ticker started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match economy.publish_leaderboard().await {
                    Ok(receivers) => debug!(receivers, "leaderboard snapshot"),
                    Err(e) => warn!("leaderboard snapshot failed: {}", e),
                }
            }
            _ = shutdown.recv() => {
                info!("leaderboard ticker stopped");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::economy::EconomyConfig;
    use crate::game::action::{ActionEvent, ActionKind};
    use crate::ledger::{LiveConfig, MemoryLedger};
    use crate::network::auth::AuthConfig;
    use crate::network::broadcast::Broadcaster;
    use crate::network::protocol::OverlayEvent;
    use tokio::time::timeout;

    fn economy(period: Duration) -> Economy<MemoryLedger> {
        let config = EconomyConfig {
            leaderboard_interval: period,
            ..Default::default()
        };
        let store = Arc::new(MemoryLedger::new(2000, LiveConfig::default()));
        Economy::new(store, Broadcaster::new(64), config, AuthConfig::default())
    }

    #[tokio::test]
    async fn test_ticker_publishes_snapshots() {
        let economy = economy(Duration::from_millis(20));
        economy
            .submit_action(ActionEvent::new(ActionKind::Follow, "viewer", 0))
            .await
            .unwrap();

        let mut rx = economy.broadcaster().subscribe();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = spawn_leaderboard_ticker(economy.clone(), shutdown_rx);

        let mut snapshots = 0;
        while snapshots < 2 {
            let event = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
            if let OverlayEvent::Leaderboard(entries) = event {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].user_id, "viewer");
                snapshots += 1;
            }
        }

        shutdown_tx.send(()).unwrap();
        timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_ticker_stops_when_sender_dropped() {
        let economy = economy(Duration::from_millis(10));
        let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
        let handle = spawn_leaderboard_ticker(economy, shutdown_rx);
        drop(shutdown_tx);
        timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    }
}

//! Economy Orchestrator
//!
//! Runs each play through `Received -> MedalsComputed -> Scored ->
//! LedgerUpdated -> Broadcast`. Scoring is pure and runs before any ledger
//! mutation; any failing step aborts the rest, and nothing is broadcast for a
//! failed play.

use std::sync::Arc;

use tracing::{debug, info, instrument};
use uuid::Uuid;

pub mod config;
pub mod error;
pub mod ticker;

pub use config::{ConfigError, EconomyConfig};
pub use error::EconomyError;

use crate::game::action::{validate_user_id, ActionEvent, ActionKind, ActionRequest};
use crate::game::scoring::score_play;
use crate::ledger::{
    BonusProgress, ConfigPatch, Leaderboard, LeaderboardEntry, LedgerStore, LiveConfig,
    PlaySettlement, SettleOutcome,
};
use crate::network::auth::{authorize_admin, AuthConfig};
use crate::network::broadcast::Broadcaster;
use crate::network::protocol::{
    ActionReceipt, BalanceInfo, BonusEvent, BonusKind, OverlayEvent, PlayEvent, PlaySource,
};

/// Largest leaderboard page a client may request.
pub const MAX_LEADERBOARD_PAGE: usize = 100;

/// One play ready to be scored and settled.
#[derive(Debug, Clone)]
struct PlayRequest {
    user_id: String,
    action: Option<ActionKind>,
    medals: u64,
    source: PlaySource,
    pool_credit: u64,
    cost: Option<u64>,
}

/// The economy orchestrator.
pub struct Economy<S> {
    store: Arc<S>,
    broadcaster: Broadcaster,
    config: Arc<EconomyConfig>,
    auth: Arc<AuthConfig>,
}

impl<S> Clone for Economy<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            broadcaster: self.broadcaster.clone(),
            config: self.config.clone(),
            auth: self.auth.clone(),
        }
    }
}

impl<S: LedgerStore + Leaderboard> Economy<S> {
    /// Create an orchestrator over a store.
    pub fn new(store: Arc<S>, broadcaster: Broadcaster, config: EconomyConfig, auth: AuthConfig) -> Self {
        Self {
            store,
            broadcaster,
            config: Arc::new(config),
            auth: Arc::new(auth),
        }
    }

    /// Static tuning.
    pub fn config(&self) -> &EconomyConfig {
        &self.config
    }

    /// Event broadcaster.
    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Validate and submit a raw action.
    pub async fn submit_request(&self, request: &ActionRequest) -> Result<ActionReceipt, EconomyError> {
        let event = request.validate()?;
        self.submit_action(event).await
    }

    /// Process one audience action.
    #[instrument(skip(self, event), fields(user = %event.user_id, kind = event.kind.as_str()))]
    pub async fn submit_action(&self, event: ActionEvent) -> Result<ActionReceipt, EconomyError> {
        let medals = self.config.medals.medals_for(&event);
        let (source, pool_credit) = match event.kind {
            ActionKind::Gift => (
                PlaySource::Gift,
                self.config.jackpot.gift_credit(event.amount_minor_units),
            ),
            _ => (PlaySource::Action, self.config.jackpot.action_increment),
        };

        self.settle(PlayRequest {
            user_id: event.user_id,
            action: Some(event.kind),
            medals,
            source,
            pool_credit,
            cost: None,
        })
        .await
    }

    /// Spend points on a spin.
    #[instrument(skip(self))]
    pub async fn spin_with_points(&self, user_id: Option<&str>) -> Result<ActionReceipt, EconomyError> {
        let user_id = validate_user_id(user_id)?;
        self.settle(PlayRequest {
            user_id,
            action: None,
            medals: self.config.medals.points_spin,
            source: PlaySource::Points,
            pool_credit: self.config.jackpot.action_increment,
            cost: Some(self.config.points.cost_per_spin),
        })
        .await
    }

    async fn settle(&self, play: PlayRequest) -> Result<ActionReceipt, EconomyError> {
        let store = &*self.store;

        // Scored: pure, against a snapshot of the live state.
        let live = store.live_config().await?;
        let pool = store.jackpot_pool().await?;
        let seed = Uuid::new_v4().to_string();
        let scored = score_play(&seed, play.medals, pool, &self.config.physics, &self.config.slot);
        let score = scored.outcome.final_score;

        // LedgerUpdated: one atomic step, so a failure leaves nothing behind.
        let outcome = store
            .settle_play(&PlaySettlement {
                user_id: play.user_id.clone(),
                cost: play.cost,
                pool_credit: play.pool_credit,
                score,
                threshold: live.threshold,
                bonus_score: live.bonus_score,
            })
            .await?;
        let (balance_after, tick) = match outcome {
            SettleOutcome::Denied { balance } => {
                let cost = play.cost.unwrap_or(0);
                debug!(user = %play.user_id, balance, cost, "spin denied");
                return Err(EconomyError::InsufficientBalance { balance, cost });
            }
            SettleOutcome::Applied { balance_after, tick, .. } => (balance_after, tick),
        };

        let bonus = tick.triggered.then(|| BonusEvent {
            kind: BonusKind::Global,
            user_id: play.user_id.clone(),
            action: play.action,
            threshold: live.threshold,
            bonus_score: live.bonus_score,
            remain: tick.remain,
        });

        // Broadcast
        let event = PlayEvent {
            user_id: play.user_id,
            action: play.action,
            dropped: scored.outcome.dropped,
            fallen: scored.outcome.fallen,
            bonus: scored.outcome.bonus_flag,
            jackpot_delta: scored.outcome.jackpot_delta,
            score,
            spin: scored.spin,
            source: play.source,
        };
        let progress = BonusProgress {
            threshold: live.threshold.max(1),
            after: tick.after,
            remain: tick.remain,
        };

        debug!(
            score,
            tier = ?event.spin.tier,
            counter = tick.after,
            seed = %crate::core::rng::seed_fingerprint(&seed),
            "play settled"
        );

        self.broadcaster.publish(OverlayEvent::Play(event.clone()));
        if let Some(ref bonus) = bonus {
            info!(user = %bonus.user_id, bonus_score = bonus.bonus_score, "global bonus triggered");
            self.broadcaster.publish(OverlayEvent::Bonus(bonus.clone()));
        }
        self.broadcaster.publish(OverlayEvent::Progress(progress));

        Ok(ActionReceipt {
            medals: play.medals,
            play: event,
            progress,
            triggered: tick.triggered,
            bonus,
            balance_after,
        })
    }

    /// Pay the configured bonus to a user out of cycle. The counter is untouched.
    #[instrument(skip(self, token))]
    pub async fn force_bonus(&self, token: &str, user_id: &str) -> Result<BonusEvent, EconomyError> {
        let admin = authorize_admin(token, &self.auth)?;
        let user_id = validate_user_id(Some(user_id))?;

        let live = self.store.live_config().await?;
        self.store.add_score(&user_id, live.bonus_score).await?;
        let counter = self.store.global_counter().await?;
        let progress = BonusProgress::at(counter, live.threshold);

        let bonus = BonusEvent {
            kind: BonusKind::Forced,
            user_id,
            action: None,
            threshold: progress.threshold,
            bonus_score: live.bonus_score,
            remain: progress.remain,
        };
        info!(admin = %admin.log_label(), user = %bonus.user_id, "forced bonus paid");
        self.broadcaster.publish(OverlayEvent::Bonus(bonus.clone()));
        Ok(bonus)
    }

    /// Merge a patch into the live configuration.
    #[instrument(skip(self, token))]
    pub async fn patch_config(&self, token: &str, patch: ConfigPatch) -> Result<LiveConfig, EconomyError> {
        let admin = authorize_admin(token, &self.auth)?;
        if !patch.is_finite() {
            return Err(EconomyError::InvalidInput("fxLevel must be finite".into()));
        }
        if patch.is_empty() {
            return Ok(self.store.live_config().await?);
        }

        let updated = self.store.update_live_config(patch).await?;
        info!(admin = %admin.log_label(), ?updated, "live config updated");
        self.broadcaster.publish(OverlayEvent::Config(updated));
        Ok(updated)
    }

    /// Current live configuration.
    pub async fn live_config(&self) -> Result<LiveConfig, EconomyError> {
        Ok(self.store.live_config().await?)
    }

    /// Progress toward the next global bonus.
    pub async fn progress(&self) -> Result<BonusProgress, EconomyError> {
        let live = self.store.live_config().await?;
        let counter = self.store.global_counter().await?;
        Ok(BonusProgress::at(counter, live.threshold))
    }

    /// A user's point balance.
    pub async fn balance(&self, user_id: Option<&str>) -> Result<BalanceInfo, EconomyError> {
        let user_id = validate_user_id(user_id)?;
        let balance = self.store.points_balance(&user_id).await?;
        Ok(BalanceInfo { user_id, balance })
    }

    /// Current jackpot pool.
    pub async fn jackpot(&self) -> Result<u64, EconomyError> {
        Ok(self.store.jackpot_pool().await?)
    }

    /// Today's leaderboard, best first.
    pub async fn leaderboard(&self, limit: Option<usize>) -> Result<Vec<LeaderboardEntry>, EconomyError> {
        let n = limit
            .unwrap_or(self.config.leaderboard_size)
            .min(MAX_LEADERBOARD_PAGE);
        Ok(self.store.top_n(n).await?)
    }

    /// Publish a leaderboard snapshot. Returns the subscribers reached.
    pub async fn publish_leaderboard(&self) -> Result<usize, EconomyError> {
        let entries = self.leaderboard(None).await?;
        Ok(self.broadcaster.publish(OverlayEvent::Leaderboard(entries)))
    }

    /// Current state for a newly connected overlay.
    pub async fn snapshot(&self) -> Result<Vec<OverlayEvent>, EconomyError> {
        let live = self.store.live_config().await?;
        let counter = self.store.global_counter().await?;
        let entries = self.leaderboard(None).await?;
        Ok(vec![
            OverlayEvent::Config(live),
            OverlayEvent::Progress(BonusProgress::at(counter, live.threshold)),
            OverlayEvent::Leaderboard(entries),
        ])
    }
}

// =============================================================================
// TESTS
// =============================================================================

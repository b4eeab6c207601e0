//! Ledger Store
//!
//! The shared mutable economy: point balances, jackpot pool, global bonus
//! counter, live configuration and the daily leaderboard.
//!
//! Every balance-affecting decision is a single atomic operation on the store.
//! Callers never read a value and write it back in a second round trip.

use std::future::Future;

use chrono::{NaiveDate, Utc};
use serde::{Serialize, Deserialize};
use thiserror::Error;

pub mod config;
pub mod memory;
pub mod redis_store;

pub use config::{ConfigPatch, LiveConfig};
pub use memory::MemoryLedger;
pub use redis_store::RedisLedger;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backing store unreachable or failed.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Backing store returned a value that cannot be decoded.
    #[error("corrupt value at {key}: {reason}")]
    Corrupt {
        /// Key that held the value.
        key: String,
        /// Decode failure.
        reason: String,
    },
}

/// Result of a point consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeOutcome {
    /// Whether the cost was debited.
    pub ok: bool,
    /// Balance after the operation (unchanged when `ok` is false).
    pub balance_after: u64,
}

/// Result of a fused counter increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterTick {
    /// Counter value after the increment.
    pub after: u64,
    /// Actions left until the next bonus (0 on the triggering action).
    pub remain: u64,
    /// True when this increment completed a cycle.
    pub triggered: bool,
}

impl CounterTick {
    /// Compute the tick for a post-increment counter value.
    pub fn at(after: u64, threshold: u64) -> Self {
        let threshold = threshold.max(1);
        let position = after % threshold;
        let remain = if position == 0 { 0 } else { threshold - position };
        Self {
            after,
            remain,
            triggered: position == 0,
        }
    }
}

/// Progress toward the next global bonus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BonusProgress {
    /// Cycle length.
    pub threshold: u64,
    /// Counter value.
    pub after: u64,
    /// Actions left in the cycle.
    pub remain: u64,
}

impl BonusProgress {
    /// Progress at a counter value. A value sitting on a cycle boundary reports 0 remaining.
    pub fn at(after: u64, threshold: u64) -> Self {
        let tick = CounterTick::at(after, threshold);
        Self {
            threshold: threshold.max(1),
            after,
            remain: tick.remain,
        }
    }
}

/// One ranked leaderboard row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    /// User.
    pub user_id: String,
    /// Cumulative score for the day.
    pub score: u64,
}

/// Ledger mutations for one scored play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaySettlement {
    /// Acting user.
    pub user_id: String,
    /// Points to debit first, if the play is paid.
    pub cost: Option<u64>,
    /// Jackpot pool credit.
    pub pool_credit: u64,
    /// Score from the scoring stage.
    pub score: u64,
    /// Global bonus cycle length.
    pub threshold: u64,
    /// Extra score when this play completes a cycle.
    pub bonus_score: u64,
}

/// Result of [`LedgerStore::settle_play`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    /// The balance did not cover the cost. Nothing was applied.
    Denied {
        /// Unchanged balance.
        balance: u64,
    },
    /// Every mutation was applied.
    Applied {
        /// Balance after the debit, for paid plays.
        balance_after: Option<u64>,
        /// Counter tick for this play.
        tick: CounterTick,
        /// User's leaderboard score after the play and any bonus.
        board_score: u64,
    },
}

/// Atomic economy operations.
///
/// Implementations must make each method indivisible with respect to every
/// other call on the same key.
pub trait LedgerStore: Send + Sync + 'static {
    /// Debit `cost` if the balance covers it, initializing the balance first if absent.
    fn consume_points(
        &self,
        user_id: &str,
        cost: u64,
    ) -> impl Future<Output = Result<ConsumeOutcome, StoreError>> + Send;

    /// Credit `amount`, initializing the balance first if absent. Returns the new balance.
    fn credit_points(
        &self,
        user_id: &str,
        amount: u64,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Current balance, initializing it if absent.
    fn points_balance(&self, user_id: &str) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Increment the global counter and evaluate the threshold in the same atomic step.
    fn increment_global_counter(
        &self,
        threshold: u64,
    ) -> impl Future<Output = Result<CounterTick, StoreError>> + Send;

    /// Current global counter.
    fn global_counter(&self) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Credit the jackpot pool. Returns the new pool value.
    fn increment_jackpot_pool(&self, delta: u64) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Current jackpot pool.
    fn jackpot_pool(&self) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Current live configuration.
    fn live_config(&self) -> impl Future<Output = Result<LiveConfig, StoreError>> + Send;

    /// Merge a patch into the live configuration. Last writer wins.
    fn update_live_config(
        &self,
        patch: ConfigPatch,
    ) -> impl Future<Output = Result<LiveConfig, StoreError>> + Send;

    /// Apply a play in one atomic step: the optional debit, the pool credit,
    /// the counter tick and the leaderboard credit (plus the bonus when the
    /// tick triggers). Either all of it lands or none of it does.
    fn settle_play(
        &self,
        play: &PlaySettlement,
    ) -> impl Future<Output = Result<SettleOutcome, StoreError>> + Send;
}

/// Daily ranked score set.
///
/// Ties rank by the order in which users reached their current score (earlier
/// first). A zero delta does not move an existing entry.
pub trait Leaderboard: Send + Sync + 'static {
    /// Add `delta` to the user's score for today. Returns the new score.
    fn add_score(&self, user_id: &str, delta: u64) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Up to `n` entries for today, best first.
    fn top_n(&self, n: usize) -> impl Future<Output = Result<Vec<LeaderboardEntry>, StoreError>> + Send;
}

/// Source of the current calendar day for leaderboard keys.
pub trait DayClock: Send + Sync + 'static {
    /// Today's date.
    fn today(&self) -> NaiveDate;
}

/// UTC wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct UtcClock;

impl DayClock for UtcClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

impl<C: DayClock> DayClock for std::sync::Arc<C> {
    fn today(&self) -> NaiveDate {
        (**self).today()
    }
}

/// Leaderboard key for a date, e.g. `lb:2024-05-01`.
pub fn day_key(date: NaiveDate) -> String {
    format!("lb:{}", date.format("%Y-%m-%d"))
}

/// Sort ranked rows best first: score descending, then arrival sequence ascending.
pub fn rank_entries(mut rows: Vec<(String, u64, u64)>, n: usize) -> Vec<LeaderboardEntry> {
    rows.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    rows.into_iter()
        .take(n)
        .map(|(user_id, score, _)| LeaderboardEntry { user_id, score })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_tick() {
        assert_eq!(CounterTick::at(1, 10), CounterTick { after: 1, remain: 9, triggered: false });
        assert_eq!(CounterTick::at(9, 10), CounterTick { after: 9, remain: 1, triggered: false });
        assert_eq!(CounterTick::at(10, 10), CounterTick { after: 10, remain: 0, triggered: true });
        assert_eq!(CounterTick::at(11, 10), CounterTick { after: 11, remain: 9, triggered: false });
        // Threshold 1 triggers every time
        assert!(CounterTick::at(7, 1).triggered);
        // Threshold 0 is treated as 1
        assert!(CounterTick::at(7, 0).triggered);
    }

    #[test]
    fn test_bonus_progress() {
        assert_eq!(BonusProgress::at(0, 10), BonusProgress { threshold: 10, after: 0, remain: 0 });
        assert_eq!(BonusProgress::at(3, 10).remain, 7);
    }

    #[test]
    fn test_day_key() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert_eq!(day_key(date), "lb:2024-05-01");
    }

    #[test]
    fn test_rank_entries_tie_break() {
        let rows = vec![
            ("late".to_string(), 100, 9),
            ("top".to_string(), 300, 5),
            ("early".to_string(), 100, 2),
            ("low".to_string(), 10, 1),
        ];
        let ranked = rank_entries(rows, 3);
        let ids: Vec<_> = ranked.iter().map(|e| e.user_id.as_str()).collect();
        assert_eq!(ids, vec!["top", "early", "late"]);
    }
}

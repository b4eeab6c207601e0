//! In-Process Ledger
//!
//! Mutex-guarded implementation of the ledger and leaderboard contracts, for
//! single-node deployments and tests. Each operation holds the lock for its
//! whole read-check-write, so it is atomic with respect to every other call.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use tokio::sync::{Mutex, RwLock};

use super::{
    rank_entries, ConfigPatch, ConsumeOutcome, CounterTick, DayClock, Leaderboard,
    LeaderboardEntry, LedgerStore, LiveConfig, PlaySettlement, SettleOutcome, StoreError,
    UtcClock,
};

/// Balances, pool, counter and config.
#[derive(Debug)]
struct EconomyState {
    balances: BTreeMap<String, u64>,
    jackpot_pool: u64,
    global_counter: u64,
    config: LiveConfig,
}

/// Score and the arrival sequence at which it was reached.
#[derive(Debug, Clone, Copy)]
struct RankedScore {
    score: u64,
    seq: u64,
}

/// One day's ranked set.
#[derive(Debug, Default)]
struct DayBoard {
    scores: BTreeMap<String, RankedScore>,
    next_seq: u64,
}

impl DayBoard {
    /// Add `delta` to a user's score. A zero delta does not move an existing entry.
    fn credit(&mut self, user_id: &str, delta: u64) -> u64 {
        let seq = self.next_seq;
        match self.scores.get_mut(user_id) {
            Some(entry) => {
                if delta > 0 {
                    entry.score = entry.score.saturating_add(delta);
                    entry.seq = seq;
                    self.next_seq += 1;
                }
                entry.score
            }
            None => {
                self.scores
                    .insert(user_id.to_string(), RankedScore { score: delta, seq });
                self.next_seq += 1;
                delta
            }
        }
    }
}

/// Today's board, dropping earlier days. Rollover starts a fresh set.
fn board_for(boards: &mut BTreeMap<NaiveDate, DayBoard>, today: NaiveDate) -> &mut DayBoard {
    boards.retain(|day, _| *day >= today);
    boards.entry(today).or_default()
}

/// In-process ledger.
pub struct MemoryLedger<C: DayClock = UtcClock> {
    initial_points: u64,
    state: Mutex<EconomyState>,
    boards: RwLock<BTreeMap<NaiveDate, DayBoard>>,
    clock: C,
}

impl MemoryLedger {
    /// Create a ledger keyed by the UTC calendar day.
    pub fn new(initial_points: u64, config: LiveConfig) -> Self {
        Self::with_clock(initial_points, config, UtcClock)
    }
}

impl<C: DayClock> MemoryLedger<C> {
    /// Create a ledger with an explicit day clock.
    pub fn with_clock(initial_points: u64, config: LiveConfig, clock: C) -> Self {
        Self {
            initial_points,
            state: Mutex::new(EconomyState {
                balances: BTreeMap::new(),
                jackpot_pool: 0,
                global_counter: 0,
                config: config.clamped(),
            }),
            boards: RwLock::new(BTreeMap::new()),
            clock,
        }
    }
}

impl<C: DayClock> LedgerStore for MemoryLedger<C> {
    async fn consume_points(&self, user_id: &str, cost: u64) -> Result<ConsumeOutcome, StoreError> {
        let mut state = self.state.lock().await;
        let balance = state
            .balances
            .entry(user_id.to_string())
            .or_insert(self.initial_points);

        if *balance >= cost {
            *balance -= cost;
            Ok(ConsumeOutcome { ok: true, balance_after: *balance })
        } else {
            Ok(ConsumeOutcome { ok: false, balance_after: *balance })
        }
    }

    async fn credit_points(&self, user_id: &str, amount: u64) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let balance = state
            .balances
            .entry(user_id.to_string())
            .or_insert(self.initial_points);
        *balance = balance.saturating_add(amount);
        Ok(*balance)
    }

    async fn points_balance(&self, user_id: &str) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        Ok(*state
            .balances
            .entry(user_id.to_string())
            .or_insert(self.initial_points))
    }

    async fn increment_global_counter(&self, threshold: u64) -> Result<CounterTick, StoreError> {
        let mut state = self.state.lock().await;
        state.global_counter += 1;
        Ok(CounterTick::at(state.global_counter, threshold))
    }

    async fn global_counter(&self) -> Result<u64, StoreError> {
        Ok(self.state.lock().await.global_counter)
    }

    async fn increment_jackpot_pool(&self, delta: u64) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        state.jackpot_pool = state.jackpot_pool.saturating_add(delta);
        Ok(state.jackpot_pool)
    }

    async fn jackpot_pool(&self) -> Result<u64, StoreError> {
        Ok(self.state.lock().await.jackpot_pool)
    }

    async fn live_config(&self) -> Result<LiveConfig, StoreError> {
        Ok(self.state.lock().await.config)
    }

    async fn update_live_config(&self, patch: ConfigPatch) -> Result<LiveConfig, StoreError> {
        let mut state = self.state.lock().await;
        state.config = state.config.merged(&patch);
        Ok(state.config)
    }

    async fn settle_play(&self, play: &PlaySettlement) -> Result<SettleOutcome, StoreError> {
        // Lock order: state, then boards.
        let mut state = self.state.lock().await;
        let mut boards = self.boards.write().await;

        let balance_after = match play.cost {
            Some(cost) => {
                let balance = state
                    .balances
                    .entry(play.user_id.clone())
                    .or_insert(self.initial_points);
                if *balance < cost {
                    return Ok(SettleOutcome::Denied { balance: *balance });
                }
                *balance -= cost;
                Some(*balance)
            }
            None => None,
        };

        state.jackpot_pool = state.jackpot_pool.saturating_add(play.pool_credit);
        state.global_counter += 1;
        let tick = CounterTick::at(state.global_counter, play.threshold);

        let credit = if tick.triggered {
            play.score.saturating_add(play.bonus_score)
        } else {
            play.score
        };
        let board_score = board_for(&mut boards, self.clock.today()).credit(&play.user_id, credit);

        Ok(SettleOutcome::Applied { balance_after, tick, board_score })
    }
}

impl<C: DayClock> Leaderboard for MemoryLedger<C> {
    async fn add_score(&self, user_id: &str, delta: u64) -> Result<u64, StoreError> {
        let today = self.clock.today();
        let mut boards = self.boards.write().await;
        Ok(board_for(&mut boards, today).credit(user_id, delta))
    }

    async fn top_n(&self, n: usize) -> Result<Vec<LeaderboardEntry>, StoreError> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let today = self.clock.today();
        let boards = self.boards.read().await;
        let Some(board) = boards.get(&today) else {
            return Ok(Vec::new());
        };
        let rows = board
            .scores
            .iter()
            .map(|(user, s)| (user.clone(), s.score, s.seq))
            .collect();
        Ok(rank_entries(rows, n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::Mutex as StdMutex;
    use proptest::prelude::*;
    use rand::Rng;

    /// Clock that tests can advance.
    struct ManualClock(StdMutex<NaiveDate>);

    impl ManualClock {
        fn new(date: NaiveDate) -> Self {
            Self(StdMutex::new(date))
        }

        fn set(&self, date: NaiveDate) {
            *self.0.lock().unwrap() = date;
        }
    }

    impl DayClock for ManualClock {
        fn today(&self) -> NaiveDate {
            *self.0.lock().unwrap()
        }
    }

    fn ledger(initial: u64) -> MemoryLedger {
        MemoryLedger::new(initial, LiveConfig::default())
    }

    #[tokio::test]
    async fn test_twenty_spins_then_insufficient() {
        let ledger = ledger(2000);

        for i in 1..=20u64 {
            let r = ledger.consume_points("fresh", 100).await.unwrap();
            assert!(r.ok, "spin {i} should succeed");
            assert_eq!(r.balance_after, 2000 - i * 100);
        }

        let r = ledger.consume_points("fresh", 100).await.unwrap();
        assert_eq!(r, ConsumeOutcome { ok: false, balance_after: 0 });
        assert_eq!(ledger.points_balance("fresh").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_consume_leaves_balance() {
        let ledger = ledger(50);
        let r = ledger.consume_points("u", 100).await.unwrap();
        assert_eq!(r, ConsumeOutcome { ok: false, balance_after: 50 });
        assert_eq!(ledger.points_balance("u").await.unwrap(), 50);
    }

    #[tokio::test]
    async fn test_credit_initializes() {
        let ledger = ledger(2000);
        assert_eq!(ledger.credit_points("new", 500).await.unwrap(), 2500);
        assert_eq!(ledger.points_balance("new").await.unwrap(), 2500);
        assert_eq!(ledger.points_balance("other").await.unwrap(), 2000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_consume_never_overdraws() {
        let ledger = Arc::new(ledger(1000));
        let mut handles = Vec::new();
        for i in 0..200 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                if i % 10 == 0 {
                    ledger.credit_points("shared", 30).await.unwrap();
                    None
                } else {
                    Some(ledger.consume_points("shared", 70).await.unwrap())
                }
            }));
        }

        let mut successes = 0u64;
        for h in handles {
            if let Some(r) = h.await.unwrap() {
                if r.ok {
                    successes += 1;
                }
            }
        }

        let credits = 20 * 30;
        let final_balance = ledger.points_balance("shared").await.unwrap();
        assert!(successes * 70 <= 1000 + credits);
        assert_eq!(final_balance, 1000 + credits - successes * 70);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_counter_triggers_exactly() {
        let ledger = Arc::new(ledger(0));
        let n = 1003u64;
        let threshold = 10;

        let mut handles = Vec::new();
        for _ in 0..n {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.increment_global_counter(threshold).await.unwrap()
            }));
        }

        let mut ticks = Vec::new();
        for h in handles {
            ticks.push(h.await.unwrap());
        }

        let triggered = ticks.iter().filter(|t| t.triggered).count() as u64;
        assert_eq!(triggered, n / threshold);

        let mut afters: Vec<u64> = ticks.iter().map(|t| t.after).collect();
        afters.sort_unstable();
        assert_eq!(afters, (1..=n).collect::<Vec<_>>());

        let counter = ledger.global_counter().await.unwrap();
        assert_eq!(counter % threshold, n % threshold);
    }

    #[tokio::test]
    async fn test_jackpot_pool() {
        let ledger = ledger(0);
        assert_eq!(ledger.jackpot_pool().await.unwrap(), 0);
        assert_eq!(ledger.increment_jackpot_pool(2).await.unwrap(), 2);
        assert_eq!(ledger.increment_jackpot_pool(40).await.unwrap(), 42);
        assert_eq!(ledger.jackpot_pool().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_config_patch_merges() {
        let ledger = ledger(0);
        let updated = ledger
            .update_live_config(ConfigPatch {
                threshold: Some(-3),
                fx_level: Some(1.2),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(updated.threshold, 1);
        assert_eq!(updated.fx_level, 1.2);
        assert_eq!(updated.bonus_score, LiveConfig::default().bonus_score);
        assert_eq!(ledger.live_config().await.unwrap(), updated);
    }

    #[tokio::test]
    async fn test_leaderboard_order_and_ties() {
        let ledger = ledger(0);
        ledger.add_score("a", 100).await.unwrap();
        ledger.add_score("b", 50).await.unwrap();
        ledger.add_score("c", 100).await.unwrap();
        ledger.add_score("b", 50).await.unwrap();

        // a reached 100 first, then c, then b
        let top = ledger.top_n(10).await.unwrap();
        let ids: Vec<_> = top.iter().map(|e| e.user_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
        assert!(top.iter().all(|e| e.score == 100));

        // A zero delta keeps a's position
        ledger.add_score("a", 0).await.unwrap();
        let top = ledger.top_n(1).await.unwrap();
        assert_eq!(top[0].user_id, "a");

        assert!(ledger.top_n(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_leaderboard_rollover() {
        let day1 = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let day2 = day1.succ_opt().unwrap();
        let clock = Arc::new(ManualClock::new(day1));
        let ledger = MemoryLedger::with_clock(0, LiveConfig::default(), clock.clone());

        ledger.add_score("a", 10).await.unwrap();
        assert_eq!(ledger.top_n(5).await.unwrap().len(), 1);

        clock.set(day2);
        assert!(ledger.top_n(5).await.unwrap().is_empty());
        assert_eq!(ledger.add_score("a", 5).await.unwrap(), 5);
        assert_eq!(
            ledger.top_n(5).await.unwrap(),
            vec![LeaderboardEntry { user_id: "a".into(), score: 5 }]
        );
    }

    #[tokio::test]
    async fn test_leaderboard_matches_sum_of_adds() {
        let ledger = ledger(0);
        let mut rng = rand::thread_rng();
        let mut expected: BTreeMap<String, u64> = BTreeMap::new();

        for _ in 0..500 {
            let user = format!("user{}", rng.gen_range(0..20));
            let delta = rng.gen_range(0..1000u64);
            ledger.add_score(&user, delta).await.unwrap();
            *expected.entry(user).or_default() += delta;
        }

        let top = ledger.top_n(20).await.unwrap();
        assert_eq!(top.len(), expected.len());
        for window in top.windows(2) {
            assert!(window[0].score >= window[1].score);
        }
        for entry in &top {
            assert_eq!(expected[&entry.user_id], entry.score);
        }
    }

    fn paid_play(user: &str, cost: u64, score: u64) -> PlaySettlement {
        PlaySettlement {
            user_id: user.to_string(),
            cost: Some(cost),
            pool_credit: 1,
            score,
            threshold: 3,
            bonus_score: 500,
        }
    }

    #[tokio::test]
    async fn test_settle_play_applies_everything() {
        let ledger = ledger(250);

        let first = ledger.settle_play(&paid_play("p", 100, 40)).await.unwrap();
        assert_eq!(
            first,
            SettleOutcome::Applied {
                balance_after: Some(150),
                tick: CounterTick::at(1, 3),
                board_score: 40,
            }
        );
        ledger.settle_play(&paid_play("p", 100, 0)).await.unwrap();

        assert_eq!(ledger.points_balance("p").await.unwrap(), 50);
        assert_eq!(ledger.jackpot_pool().await.unwrap(), 2);
        assert_eq!(ledger.global_counter().await.unwrap(), 2);
        assert_eq!(ledger.top_n(5).await.unwrap()[0].score, 40);
    }

    #[tokio::test]
    async fn test_settle_play_bonus_on_trigger() {
        let ledger = ledger(0);
        let mut play = paid_play("free", 0, 10);
        play.cost = None;

        for _ in 0..2 {
            ledger.settle_play(&play).await.unwrap();
        }
        let third = ledger.settle_play(&play).await.unwrap();
        let SettleOutcome::Applied { balance_after, tick, board_score } = third else {
            panic!("unpaid play denied: {third:?}");
        };
        assert_eq!(balance_after, None);
        assert!(tick.triggered);
        assert_eq!(board_score, 30 + 500);
    }

    #[tokio::test]
    async fn test_settle_play_denied_applies_nothing() {
        let ledger = ledger(50);
        let outcome = ledger.settle_play(&paid_play("poor", 100, 999)).await.unwrap();
        assert_eq!(outcome, SettleOutcome::Denied { balance: 50 });

        assert_eq!(ledger.points_balance("poor").await.unwrap(), 50);
        assert_eq!(ledger.jackpot_pool().await.unwrap(), 0);
        assert_eq!(ledger.global_counter().await.unwrap(), 0);
        assert!(ledger.top_n(5).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_settles_stay_consistent() {
        let ledger = Arc::new(ledger(1000));
        let mut handles = Vec::new();
        for _ in 0..40 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.settle_play(&paid_play("crowd", 100, 1)).await.unwrap()
            }));
        }

        let mut applied = 0u64;
        for h in handles {
            if matches!(h.await.unwrap(), SettleOutcome::Applied { .. }) {
                applied += 1;
            }
        }

        assert_eq!(applied, 10);
        assert_eq!(ledger.points_balance("crowd").await.unwrap(), 0);
        assert_eq!(ledger.jackpot_pool().await.unwrap(), applied);
        assert_eq!(ledger.global_counter().await.unwrap(), applied);
    }

    proptest! {
        #[test]
        fn prop_consume_sequence_never_negative(
            initial in 0u64..5_000,
            ops in proptest::collection::vec((any::<bool>(), 0u64..500), 1..100),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let ledger = ledger(initial);
                let mut credited = 0u64;
                let mut consumed = 0u64;
                for (is_credit, amount) in ops {
                    if is_credit {
                        ledger.credit_points("p", amount).await.unwrap();
                        credited += amount;
                    } else {
                        let before = ledger.points_balance("p").await.unwrap();
                        let r = ledger.consume_points("p", amount).await.unwrap();
                        if r.ok {
                            consumed += amount;
                            assert_eq!(r.balance_after, before - amount);
                        } else {
                            assert_eq!(r.balance_after, before);
                        }
                    }
                }
                assert!(consumed <= initial + credited);
                assert_eq!(ledger.points_balance("p").await.unwrap(), initial + credited - consumed);
            });
        }
    }
}

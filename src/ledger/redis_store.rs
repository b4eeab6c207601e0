//! Redis Ledger
//!
//! Shared ledger for multi-node deployments. Every operation that reads and
//! then conditionally writes runs as one server-side Lua script, so Redis
//! executes it without interleaving other clients.
//!
//! Key layout (all under the configured prefix):
//!
//! ```text
//! pts:{user}          point balance
//! jp_pool             jackpot pool
//! bonus:counter       global action counter
//! cfg:live            live config (JSON)
//! lb:{date}           daily score sorted set
//! lb:{date}:seq       arrival sequence per member (hash)
//! lb:{date}:clock     arrival sequence source
//! ```
//!
//! The daily leaderboard keys expire [`LEADERBOARD_TTL_SECS`] after their last write.

use chrono::NaiveDate;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{
    day_key, rank_entries, ConfigPatch, ConsumeOutcome, CounterTick, DayClock, Leaderboard,
    LeaderboardEntry, LedgerStore, LiveConfig, PlaySettlement, SettleOutcome, StoreError,
    UtcClock,
};

/// Lifetime of a day's leaderboard keys after their last write.
pub const LEADERBOARD_TTL_SECS: u64 = 3 * 24 * 60 * 60;

const CONSUME_SCRIPT: &str = r#"
local cur = redis.call('GET', KEYS[1])
if not cur then
  cur = tonumber(ARGV[2])
  redis.call('SET', KEYS[1], cur)
else
  cur = tonumber(cur)
end
local cost = tonumber(ARGV[1])
if cur >= cost then
  return {1, redis.call('DECRBY', KEYS[1], cost)}
end
return {0, cur}
"#;

const CREDIT_SCRIPT: &str = r#"
redis.call('SET', KEYS[1], ARGV[2], 'NX')
return redis.call('INCRBY', KEYS[1], ARGV[1])
"#;

const BALANCE_SCRIPT: &str = r#"
redis.call('SET', KEYS[1], ARGV[1], 'NX')
return tonumber(redis.call('GET', KEYS[1]))
"#;

const COUNTER_SCRIPT: &str = r#"
local after = redis.call('INCR', KEYS[1])
local threshold = tonumber(ARGV[1])
local position = after % threshold
local remain = 0
if position ~= 0 then
  remain = threshold - position
end
local triggered = 0
if position == 0 then
  triggered = 1
end
return {after, remain, triggered}
"#;

const ADD_SCORE_SCRIPT: &str = r#"
local delta = tonumber(ARGV[1])
local existed = redis.call('ZSCORE', KEYS[1], ARGV[2])
local score = redis.call('ZINCRBY', KEYS[1], delta, ARGV[2])
if (not existed) or delta > 0 then
  local seq = redis.call('INCR', KEYS[3])
  redis.call('HSET', KEYS[2], ARGV[2], seq)
end
for i = 1, 3 do
  redis.call('EXPIRE', KEYS[i], ARGV[3])
end
return score
"#;

// KEYS: balance, pool, counter, board, board seq, board clock.
// ARGV: paid flag, cost, initial balance, pool credit, threshold, score,
// bonus score, user, board ttl.
// Returns {applied, balance, after, remain, triggered, board score}; the
// balance is -1 for unpaid plays.
const SETTLE_SCRIPT: &str = r#"
local balance = -1
if ARGV[1] == '1' then
  local cur = redis.call('GET', KEYS[1])
  if not cur then
    cur = tonumber(ARGV[3])
    redis.call('SET', KEYS[1], cur)
  else
    cur = tonumber(cur)
  end
  local cost = tonumber(ARGV[2])
  if cur < cost then
    return {0, cur, 0, 0, 0, 0}
  end
  balance = redis.call('DECRBY', KEYS[1], cost)
end
redis.call('INCRBY', KEYS[2], ARGV[4])
local after = redis.call('INCR', KEYS[3])
local threshold = tonumber(ARGV[5])
local position = after % threshold
local remain = 0
local triggered = 0
if position == 0 then
  triggered = 1
else
  remain = threshold - position
end
local delta = tonumber(ARGV[6])
if triggered == 1 then
  delta = delta + tonumber(ARGV[7])
end
local existed = redis.call('ZSCORE', KEYS[4], ARGV[8])
local score = redis.call('ZINCRBY', KEYS[4], delta, ARGV[8])
if (not existed) or delta > 0 then
  local seq = redis.call('INCR', KEYS[6])
  redis.call('HSET', KEYS[5], ARGV[8], seq)
end
for i = 4, 6 do
  redis.call('EXPIRE', KEYS[i], ARGV[9])
end
return {1, balance, after, remain, triggered, tonumber(score)}
"#;

// Returns flat [member, score, seq, ...] covering the top n plus every member
// tied with the n-th score; the caller orders and truncates.
const TOP_N_SCRIPT: &str = r#"
local n = tonumber(ARGV[1])
local top = redis.call('ZREVRANGE', KEYS[1], 0, n - 1, 'WITHSCORES')
local out = {}
if #top == 0 then
  return out
end
local boundary = top[#top]
local boundary_num = tonumber(boundary)
for i = 1, #top, 2 do
  if tonumber(top[i + 1]) > boundary_num then
    table.insert(out, top[i])
    table.insert(out, top[i + 1])
    table.insert(out, redis.call('HGET', KEYS[2], top[i]) or '0')
  end
end
local tied = redis.call('ZRANGEBYSCORE', KEYS[1], boundary, boundary)
for _, member in ipairs(tied) do
  table.insert(out, member)
  table.insert(out, boundary)
  table.insert(out, redis.call('HGET', KEYS[2], member) or '0')
end
return out
"#;

/// Compiled scripts.
struct Scripts {
    consume: Script,
    credit: Script,
    balance: Script,
    counter: Script,
    add_score: Script,
    settle: Script,
    top_n: Script,
}

impl Scripts {
    fn new() -> Self {
        Self {
            consume: Script::new(CONSUME_SCRIPT),
            credit: Script::new(CREDIT_SCRIPT),
            balance: Script::new(BALANCE_SCRIPT),
            counter: Script::new(COUNTER_SCRIPT),
            add_score: Script::new(ADD_SCORE_SCRIPT),
            settle: Script::new(SETTLE_SCRIPT),
            top_n: Script::new(TOP_N_SCRIPT),
        }
    }
}

/// Key builder for a prefix.
#[derive(Debug, Clone)]
pub struct RedisKeys {
    prefix: String,
}

impl RedisKeys {
    /// Keys under `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    /// Balance key for a user.
    pub fn points(&self, user_id: &str) -> String {
        format!("{}pts:{}", self.prefix, user_id)
    }

    /// Jackpot pool key.
    pub fn jackpot_pool(&self) -> String {
        format!("{}jp_pool", self.prefix)
    }

    /// Global counter key.
    pub fn global_counter(&self) -> String {
        format!("{}bonus:counter", self.prefix)
    }

    /// Live config key.
    pub fn live_config(&self) -> String {
        format!("{}cfg:live", self.prefix)
    }

    /// Sorted set, sequence hash and sequence counter keys for a day.
    pub fn leaderboard(&self, date: NaiveDate) -> (String, String, String) {
        let base = format!("{}{}", self.prefix, day_key(date));
        (base.clone(), format!("{base}:seq"), format!("{base}:clock"))
    }
}

/// Redis-backed ledger.
pub struct RedisLedger<C: DayClock = UtcClock> {
    client: redis::Client,
    connection: Mutex<Option<ConnectionManager>>,
    keys: RedisKeys,
    scripts: Scripts,
    initial_points: u64,
    default_config: LiveConfig,
    clock: C,
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

impl RedisLedger {
    /// Open a ledger against `url`. The connection is established lazily.
    pub fn new(
        url: &str,
        prefix: impl Into<String>,
        initial_points: u64,
        default_config: LiveConfig,
    ) -> Result<Self, StoreError> {
        Self::with_clock(url, prefix, initial_points, default_config, UtcClock)
    }
}

impl<C: DayClock> RedisLedger<C> {
    /// Open a ledger with an explicit day clock.
    pub fn with_clock(
        url: &str,
        prefix: impl Into<String>,
        initial_points: u64,
        default_config: LiveConfig,
        clock: C,
    ) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        Ok(Self {
            client,
            connection: Mutex::new(None),
            keys: RedisKeys::new(prefix),
            scripts: Scripts::new(),
            initial_points,
            default_config: default_config.clamped(),
            clock,
        })
    }

    /// Get a multiplexed connection, connecting on first use.
    async fn connection(&self) -> Result<ConnectionManager, StoreError> {
        let mut guard = self.connection.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }
        let conn = self.client.get_connection_manager().await.map_err(|err| {
            warn!("Redis ledger connection failed: {err}");
            StoreError::from(err)
        })?;
        debug!("Redis ledger connected");
        *guard = Some(conn.clone());
        Ok(conn)
    }

    /// Verify the backend is reachable.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

impl<C: DayClock> LedgerStore for RedisLedger<C> {
    async fn consume_points(&self, user_id: &str, cost: u64) -> Result<ConsumeOutcome, StoreError> {
        let mut conn = self.connection().await?;
        let (ok, balance): (i64, i64) = self
            .scripts
            .consume
            .key(self.keys.points(user_id))
            .arg(cost)
            .arg(self.initial_points)
            .invoke_async(&mut conn)
            .await?;
        Ok(ConsumeOutcome {
            ok: ok == 1,
            balance_after: balance.max(0) as u64,
        })
    }

    async fn credit_points(&self, user_id: &str, amount: u64) -> Result<u64, StoreError> {
        let mut conn = self.connection().await?;
        let balance: i64 = self
            .scripts
            .credit
            .key(self.keys.points(user_id))
            .arg(amount)
            .arg(self.initial_points)
            .invoke_async(&mut conn)
            .await?;
        Ok(balance.max(0) as u64)
    }

    async fn points_balance(&self, user_id: &str) -> Result<u64, StoreError> {
        let mut conn = self.connection().await?;
        let balance: i64 = self
            .scripts
            .balance
            .key(self.keys.points(user_id))
            .arg(self.initial_points)
            .invoke_async(&mut conn)
            .await?;
        Ok(balance.max(0) as u64)
    }

    async fn increment_global_counter(&self, threshold: u64) -> Result<CounterTick, StoreError> {
        let mut conn = self.connection().await?;
        let (after, remain, triggered): (u64, u64, i64) = self
            .scripts
            .counter
            .key(self.keys.global_counter())
            .arg(threshold.max(1))
            .invoke_async(&mut conn)
            .await?;
        Ok(CounterTick {
            after,
            remain,
            triggered: triggered == 1,
        })
    }

    async fn global_counter(&self) -> Result<u64, StoreError> {
        let mut conn = self.connection().await?;
        let value: Option<u64> = conn.get(self.keys.global_counter()).await?;
        Ok(value.unwrap_or(0))
    }

    async fn increment_jackpot_pool(&self, delta: u64) -> Result<u64, StoreError> {
        let mut conn = self.connection().await?;
        let value: u64 = conn.incr(self.keys.jackpot_pool(), delta).await?;
        Ok(value)
    }

    async fn jackpot_pool(&self) -> Result<u64, StoreError> {
        let mut conn = self.connection().await?;
        let value: Option<u64> = conn.get(self.keys.jackpot_pool()).await?;
        Ok(value.unwrap_or(0))
    }

    async fn live_config(&self) -> Result<LiveConfig, StoreError> {
        let mut conn = self.connection().await?;
        let key = self.keys.live_config();
        let raw: Option<String> = conn.get(&key).await?;
        match raw {
            None => Ok(self.default_config),
            Some(json) => decode_config(&key, &json),
        }
    }

    async fn update_live_config(&self, patch: ConfigPatch) -> Result<LiveConfig, StoreError> {
        let current = self.live_config().await?;
        let next = current.merged(&patch);
        let json = serde_json::to_string(&next).map_err(|err| StoreError::Corrupt {
            key: self.keys.live_config(),
            reason: err.to_string(),
        })?;
        let mut conn = self.connection().await?;
        let _: () = conn.set(self.keys.live_config(), json).await?;
        Ok(next)
    }

    async fn settle_play(&self, play: &PlaySettlement) -> Result<SettleOutcome, StoreError> {
        let (set, seq, clock) = self.keys.leaderboard(self.clock.today());
        let mut conn = self.connection().await?;
        let reply: (i64, i64, u64, u64, i64, i64) = self
            .scripts
            .settle
            .key(self.keys.points(&play.user_id))
            .key(self.keys.jackpot_pool())
            .key(self.keys.global_counter())
            .key(set)
            .key(seq)
            .key(clock)
            .arg(i64::from(play.cost.is_some()))
            .arg(play.cost.unwrap_or(0))
            .arg(self.initial_points)
            .arg(play.pool_credit)
            .arg(play.threshold.max(1))
            .arg(play.score)
            .arg(play.bonus_score)
            .arg(play.user_id.as_str())
            .arg(LEADERBOARD_TTL_SECS)
            .invoke_async(&mut conn)
            .await?;
        Ok(decode_settle(reply, play.cost.is_some()))
    }
}

impl<C: DayClock> Leaderboard for RedisLedger<C> {
    async fn add_score(&self, user_id: &str, delta: u64) -> Result<u64, StoreError> {
        let (set, seq, clock) = self.keys.leaderboard(self.clock.today());
        let mut conn = self.connection().await?;
        let score: String = self
            .scripts
            .add_score
            .key(&set)
            .key(seq)
            .key(clock)
            .arg(delta)
            .arg(user_id)
            .arg(LEADERBOARD_TTL_SECS)
            .invoke_async(&mut conn)
            .await?;
        parse_score(&set, &score)
    }

    async fn top_n(&self, n: usize) -> Result<Vec<LeaderboardEntry>, StoreError> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let (set, seq, _) = self.keys.leaderboard(self.clock.today());
        let mut conn = self.connection().await?;
        let flat: Vec<String> = self
            .scripts
            .top_n
            .key(&set)
            .key(seq)
            .arg(n)
            .invoke_async(&mut conn)
            .await?;
        decode_ranked(&set, &flat, n)
    }
}

fn decode_settle(
    (applied, balance, after, remain, triggered, board_score): (i64, i64, u64, u64, i64, i64),
    paid: bool,
) -> SettleOutcome {
    if applied == 0 {
        return SettleOutcome::Denied { balance: balance.max(0) as u64 };
    }
    SettleOutcome::Applied {
        balance_after: paid.then(|| balance.max(0) as u64),
        tick: CounterTick { after, remain, triggered: triggered == 1 },
        board_score: board_score.max(0) as u64,
    }
}

fn decode_config(key: &str, json: &str) -> Result<LiveConfig, StoreError> {
    serde_json::from_str::<LiveConfig>(json)
        .map(|config| config.clamped())
        .map_err(|err| StoreError::Corrupt {
            key: key.to_string(),
            reason: err.to_string(),
        })
}

/// Sorted-set scores come back as decimal strings (possibly "150" or "1.5e+2").
fn parse_score(key: &str, raw: &str) -> Result<u64, StoreError> {
    let value: f64 = raw.parse().map_err(|_| StoreError::Corrupt {
        key: key.to_string(),
        reason: format!("non-numeric score {raw:?}"),
    })?;
    if !value.is_finite() || value < 0.0 {
        return Err(StoreError::Corrupt {
            key: key.to_string(),
            reason: format!("invalid score {raw:?}"),
        });
    }
    Ok(value.round() as u64)
}

/// Decode `[member, score, seq, ...]` triples and rank them.
fn decode_ranked(key: &str, flat: &[String], n: usize) -> Result<Vec<LeaderboardEntry>, StoreError> {
    if flat.len() % 3 != 0 {
        return Err(StoreError::Corrupt {
            key: key.to_string(),
            reason: format!("ranked reply length {} not a multiple of 3", flat.len()),
        });
    }
    let mut rows = Vec::with_capacity(flat.len() / 3);
    for chunk in flat.chunks(3) {
        let score = parse_score(key, &chunk[1])?;
        let seq: u64 = chunk[2].parse().map_err(|_| StoreError::Corrupt {
            key: key.to_string(),
            reason: format!("non-numeric sequence {:?}", chunk[2]),
        })?;
        rows.push((chunk[0].clone(), score, seq));
    }
    Ok(rank_entries(rows, n))
}

//! Economy Tunables
//!
//! Static tuning read once at startup from the environment. Live, operator
//! mutable values live in [`crate::ledger::LiveConfig`] instead.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::game::action::MedalTable;
use crate::game::physics::PhysicsConfig;
use crate::game::slot::{SlotConfig, SlotConfigError};
use crate::ledger::LiveConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable is set but does not parse.
    #[error("invalid value for {key}: {value:?}")]
    Invalid {
        /// Variable name.
        key: String,
        /// Raw value.
        value: String,
    },

    /// Slot table is inconsistent.
    #[error("slot table: {0}")]
    Slot(#[from] SlotConfigError),

    /// A rate is negative or not finite.
    #[error("{0} must be a finite, non-negative number")]
    BadRate(&'static str),
}

/// Jackpot pool accrual.
#[derive(Debug, Clone, PartialEq)]
pub struct JackpotRates {
    /// Share of gift value credited to the pool.
    pub gift_share: f64,
    /// Fixed credit for non-gift actions and points spins.
    pub action_increment: u64,
}

impl Default for JackpotRates {
    fn default() -> Self {
        Self {
            gift_share: 0.02,
            action_increment: 1,
        }
    }
}

impl JackpotRates {
    /// Pool credit for a gift of the given value.
    pub fn gift_credit(&self, amount_minor_units: u64) -> u64 {
        (amount_minor_units as f64 * self.gift_share).floor().max(0.0) as u64
    }
}

/// Point economy.
#[derive(Debug, Clone, PartialEq)]
pub struct PointsConfig {
    /// Balance a user starts with.
    pub initial: u64,
    /// Cost of a points-paid spin.
    pub cost_per_spin: u64,
}

impl Default for PointsConfig {
    fn default() -> Self {
        Self {
            initial: 2000,
            cost_per_spin: 100,
        }
    }
}

/// All static economy tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct EconomyConfig {
    /// Drop simulation.
    pub physics: PhysicsConfig,
    /// Slot table.
    pub slot: SlotConfig,
    /// Action to medal conversion.
    pub medals: MedalTable,
    /// Jackpot accrual.
    pub jackpot: JackpotRates,
    /// Point economy.
    pub points: PointsConfig,
    /// Live config used until an operator writes one.
    pub live_defaults: LiveConfig,
    /// Entries in each leaderboard snapshot.
    pub leaderboard_size: usize,
    /// Snapshot period.
    pub leaderboard_interval: Duration,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            physics: PhysicsConfig::default(),
            slot: SlotConfig::default(),
            medals: MedalTable::default(),
            jackpot: JackpotRates::default(),
            points: PointsConfig::default(),
            live_defaults: LiveConfig::default(),
            leaderboard_size: 10,
            leaderboard_interval: Duration::from_millis(1000),
        }
    }
}

impl EconomyConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary lookup (used by tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let get = |key: &str| lookup(key);

        let physics = PhysicsConfig {
            score_per_drop: parse_or(&get, "SCORE_PER_DROP", d.physics.score_per_drop)?,
            bonus_hole_score: parse_or(&get, "BONUS_HOLE_SCORE", d.physics.bonus_hole_score)?,
            bonus_hole_chance: parse_or(&get, "BONUS_HOLE_CHANCE", d.physics.bonus_hole_chance)?,
            jackpot_chance: parse_or(&get, "JACKPOT_CHANCE", d.physics.jackpot_chance)?,
        };

        let mut slot = d.slot.clone();
        slot.p_mega = parse_or(&get, "SLOT_P_MEGA", slot.p_mega)?;
        slot.p_high = parse_or(&get, "SLOT_P_HIGH", slot.p_high)?;
        slot.p_normal = parse_or(&get, "SLOT_P_NORM", slot.p_normal)?;
        slot.miss_clover_chance = parse_or(&get, "SLOT_CLOVER_CHANCE", slot.miss_clover_chance)?;
        slot.bonus_game.miss = parse_or(&get, "SLOT_BONUS_MISS", slot.bonus_game.miss)?;
        slot.bonus_game.normal = parse_or(&get, "SLOT_BONUS_NORMAL", slot.bonus_game.normal)?;
        slot.bonus_game.high = parse_or(&get, "SLOT_BONUS_HIGH", slot.bonus_game.high)?;
        slot.bonus_game.mega = parse_or(&get, "SLOT_BONUS_MEGA", slot.bonus_game.mega)?;
        slot.validate()?;

        let medals = MedalTable {
            coins_per_100_units: parse_or(&get, "COINS_PER_100YEN", d.medals.coins_per_100_units)?,
            medals_per_100_coins: parse_or(&get, "MEDALS_PER_100_COINS", d.medals.medals_per_100_coins)?,
            comment: parse_or(&get, "MEDALS_COMMENT", d.medals.comment)?,
            like: parse_or(&get, "MEDALS_LIKE", d.medals.like)?,
            follow: parse_or(&get, "MEDALS_FOLLOW", d.medals.follow)?,
            points_spin: parse_or(&get, "MEDALS_POINTS_SPIN", d.medals.points_spin)?,
        };
        check_rate("COINS_PER_100YEN", medals.coins_per_100_units)?;
        check_rate("MEDALS_PER_100_COINS", medals.medals_per_100_coins)?;

        let jackpot = JackpotRates {
            gift_share: parse_or(&get, "JP_POOL_PCT", d.jackpot.gift_share)?,
            action_increment: parse_or(&get, "JP_POOL_ACTION_INCREMENT", d.jackpot.action_increment)?,
        };
        check_rate("JP_POOL_PCT", jackpot.gift_share)?;

        let points = PointsConfig {
            initial: parse_or(&get, "POINTS_INITIAL", d.points.initial)?,
            cost_per_spin: parse_or(&get, "POINTS_COST_PER_SPIN", d.points.cost_per_spin)?,
        };

        let live_defaults = LiveConfig {
            threshold: parse_or(&get, "GLOBAL_BONUS_THRESHOLD", d.live_defaults.threshold)?,
            bonus_score: parse_or(&get, "GLOBAL_BONUS_SCORE", d.live_defaults.bonus_score)?,
            pace_ms: parse_or(&get, "OVERLAY_PACE_MS", d.live_defaults.pace_ms)?,
            fx_level: parse_or(&get, "OVERLAY_FX_LEVEL", d.live_defaults.fx_level)?,
        }
        .clamped();

        let leaderboard_size = parse_or(&get, "LEADERBOARD_SIZE", d.leaderboard_size)?;
        let interval_ms: u64 = parse_or(
            &get,
            "LEADERBOARD_INTERVAL_MS",
            d.leaderboard_interval.as_millis() as u64,
        )?;

        Ok(Self {
            physics,
            slot,
            medals,
            jackpot,
            points,
            live_defaults,
            leaderboard_size,
            leaderboard_interval: Duration::from_millis(interval_ms.max(1)),
        })
    }
}

/// Parse `key` if set, else return `default`.
pub(crate) fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            value: raw,
        }),
    }
}

fn check_rate(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::BadRate(name))
    }
}

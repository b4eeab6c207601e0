//! Slot Spin
//!
//! Tier resolution, multipliers and decorative reels. A spin is drawn
//! independently of the drop simulation and gates its payout: a MISS zeroes
//! the action's score.

use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::core::rng::DeterministicRng;

/// Outcome tier of a spin, lowest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    /// No payout.
    Miss,
    /// Small multiplier.
    Normal,
    /// Large multiplier.
    High,
    /// Top multiplier.
    Mega,
}

impl Tier {
    /// All tiers, lowest first.
    pub const ALL: [Tier; 4] = [Tier::Miss, Tier::Normal, Tier::High, Tier::Mega];

    /// Score multiplier for the tier.
    pub fn multiplier(&self) -> f64 {
        match self {
            Tier::Miss => 0.0,
            Tier::Normal => 1.2,
            Tier::High => 2.0,
            Tier::Mega => 5.0,
        }
    }
}

/// Reel symbol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Symbol {
    /// Coin.
    #[serde(rename = "🪙")]
    Coin,
    /// Star.
    #[serde(rename = "⭐")]
    Star,
    /// Gift box.
    #[serde(rename = "🎁")]
    Gift,
    /// Fire.
    #[serde(rename = "🔥")]
    Fire,
    /// Diamond.
    #[serde(rename = "💎")]
    Diamond,
    /// Clover, the combo-extend symbol.
    #[serde(rename = "🍀")]
    Clover,
}

const LOW_SYMBOLS: [Symbol; 2] = [Symbol::Coin, Symbol::Star];
const MID_SYMBOLS: [Symbol; 2] = [Symbol::Gift, Symbol::Fire];
const NORMAL_SYMBOLS: [Symbol; 4] = [Symbol::Coin, Symbol::Star, Symbol::Gift, Symbol::Fire];
const HIGH_SYMBOLS: [Symbol; 3] = [Symbol::Gift, Symbol::Fire, Symbol::Diamond];

/// Result of one spin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpinResult {
    /// Resolved tier.
    pub tier: Tier,
    /// Score multiplier (0 iff MISS).
    pub multiplier: f64,
    /// Three reel symbols.
    pub symbols: [Symbol; 3],
    /// Entered the secondary bonus round.
    pub bonus_game: bool,
    /// Combo extended.
    pub combo_extend: bool,
}

/// Per-tier probability table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierOdds {
    /// MISS tier.
    pub miss: f64,
    /// NORMAL tier.
    pub normal: f64,
    /// HIGH tier.
    pub high: f64,
    /// MEGA tier.
    pub mega: f64,
}

impl TierOdds {
    /// Value for a tier.
    pub fn get(&self, tier: Tier) -> f64 {
        match tier {
            Tier::Miss => self.miss,
            Tier::Normal => self.normal,
            Tier::High => self.high,
            Tier::Mega => self.mega,
        }
    }
}

/// Slot tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotConfig {
    /// Probability of MEGA.
    pub p_mega: f64,
    /// Probability of HIGH.
    pub p_high: f64,
    /// Probability of NORMAL. MISS takes the remainder.
    pub p_normal: f64,
    /// Chance of a clover (combo extend) on a MISS.
    pub miss_clover_chance: f64,
    /// Chance of entering the bonus game, by tier.
    pub bonus_game: TierOdds,
}

impl Default for SlotConfig {
    fn default() -> Self {
        Self {
            p_mega: 0.02,
            p_high: 0.14,
            p_normal: 0.39,
            miss_clover_chance: 0.08,
            bonus_game: TierOdds {
                miss: 0.0,
                normal: 0.05,
                high: 0.10,
                mega: 0.30,
            },
        }
    }
}

/// Slot table errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SlotConfigError {
    /// A probability is outside [0, 1] or not finite.
    #[error("probability {name} = {value} outside [0, 1]")]
    OutOfRange {
        /// Field name.
        name: &'static str,
        /// Offending value.
        value: f64,
    },
    /// Tier probabilities add up to more than 1.
    #[error("tier probabilities sum to {0} > 1")]
    TierSumTooLarge(f64),
    /// A higher tier does not have strictly better bonus game odds than a lower tier.
    #[error("bonus game odds must increase with tier ({lower:?} >= {higher:?})")]
    BonusOddsNotMonotonic {
        /// Lower tier.
        lower: Tier,
        /// Higher tier.
        higher: Tier,
    },
}

impl SlotConfig {
    /// Check the table for consistency.
    pub fn validate(&self) -> Result<(), SlotConfigError> {
        let fields = [
            ("p_mega", self.p_mega),
            ("p_high", self.p_high),
            ("p_normal", self.p_normal),
            ("miss_clover_chance", self.miss_clover_chance),
            ("bonus_game.miss", self.bonus_game.miss),
            ("bonus_game.normal", self.bonus_game.normal),
            ("bonus_game.high", self.bonus_game.high),
            ("bonus_game.mega", self.bonus_game.mega),
        ];
        for (name, value) in fields {
            if !(0.0..=1.0).contains(&value) {
                return Err(SlotConfigError::OutOfRange { name, value });
            }
        }

        let sum = self.p_mega + self.p_high + self.p_normal;
        if sum > 1.0 + f64::EPSILON {
            return Err(SlotConfigError::TierSumTooLarge(sum));
        }

        for pair in Tier::ALL.windows(2) {
            let (lower, higher) = (pair[0], pair[1]);
            if self.bonus_game.get(lower) >= self.bonus_game.get(higher) {
                return Err(SlotConfigError::BonusOddsNotMonotonic { lower, higher });
            }
        }

        Ok(())
    }

    /// Resolve a tier from a uniform draw in [0, 1).
    pub fn tier_for(&self, r: f64) -> Tier {
        if r < self.p_mega {
            Tier::Mega
        } else if r < self.p_mega + self.p_high {
            Tier::High
        } else if r < self.p_mega + self.p_high + self.p_normal {
            Tier::Normal
        } else {
            Tier::Miss
        }
    }
}

/// Spin the reels.
pub fn spin(rng: &mut DeterministicRng, config: &SlotConfig) -> SpinResult {
    let tier = config.tier_for(rng.next_f64());

    let (symbols, combo_extend) = match tier {
        Tier::Miss => {
            let mut symbols = [pick(rng, &LOW_SYMBOLS), pick(rng, &MID_SYMBOLS), pick(rng, &LOW_SYMBOLS)];
            let extend = rng.chance(config.miss_clover_chance);
            if extend {
                symbols[rng.next_int(3) as usize] = Symbol::Clover;
            }
            (symbols, extend)
        }
        Tier::Normal => ([pick(rng, &NORMAL_SYMBOLS); 3], true),
        Tier::High => ([pick(rng, &HIGH_SYMBOLS); 3], true),
        Tier::Mega => ([Symbol::Diamond; 3], true),
    };

    let bonus_game = rng.chance(config.bonus_game.get(tier));

    SpinResult {
        tier,
        multiplier: tier.multiplier(),
        symbols,
        bonus_game,
        combo_extend,
    }
}

fn pick(rng: &mut DeterministicRng, symbols: &[Symbol]) -> Symbol {
    rng.choose(symbols).copied().unwrap_or(Symbol::Coin)
}

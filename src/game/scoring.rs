//! Score Composition
//!
//! Runs both stages from one seed and composes them multiplicatively.

use serde::{Serialize, Deserialize};

use crate::core::rng::DeterministicRng;
use crate::game::physics::{simulate_with, PhysicsConfig, PhysicsResult};
use crate::game::slot::{spin, SlotConfig, SpinResult};

/// Scored outcome of one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreOutcome {
    /// Medals dropped.
    pub dropped: u64,
    /// Medals that fell.
    pub fallen: u64,
    /// Bonus hole hit (0 or 1).
    pub bonus_flag: u8,
    /// Jackpot score contribution.
    pub jackpot_delta: u64,
    /// Score before the slot multiplier.
    pub base_score: u64,
    /// Score after the slot multiplier.
    pub final_score: u64,
}

/// A fully scored play: both stage results plus the composed outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPlay {
    /// Physics stage.
    pub physics: PhysicsResult,
    /// Slot stage.
    pub spin: SpinResult,
    /// Composition.
    pub outcome: ScoreOutcome,
}

/// `floor(max(0, base * multiplier))`, saturating at `u64::MAX`.
pub fn apply_multiplier(base_score: u64, multiplier: f64) -> u64 {
    let scaled = base_score as f64 * multiplier;
    if !scaled.is_finite() || scaled <= 0.0 {
        return 0;
    }
    scaled.floor() as u64
}

/// Compose stage results into an outcome.
pub fn compose(physics: &PhysicsResult, spin: &SpinResult) -> ScoreOutcome {
    ScoreOutcome {
        dropped: physics.dropped,
        fallen: physics.fallen,
        bonus_flag: physics.bonus_flag,
        jackpot_delta: physics.jackpot_delta,
        base_score: physics.base_score,
        final_score: apply_multiplier(physics.base_score, spin.multiplier),
    }
}

/// Score a play of `medals` from a seed.
///
/// The physics stage consumes the head of the seeded stream exactly as
/// [`crate::game::physics::simulate`] does; the spin draws after it.
pub fn score_play(
    seed: &str,
    medals: u64,
    jackpot_pool: u64,
    physics: &PhysicsConfig,
    slot: &SlotConfig,
) -> ScoredPlay {
    let mut rng = DeterministicRng::from_seed_str(seed);
    let physics = simulate_with(&mut rng, medals, jackpot_pool, physics);
    let spin = spin(&mut rng, slot);
    let outcome = compose(&physics, &spin);
    ScoredPlay { physics, spin, outcome }
}

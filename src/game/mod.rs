//! Game Logic Module
//!
//! Pure scoring. Every function here takes its randomness as an explicit
//! seed or RNG, so a play can be replayed exactly.
//!
//! ## Module Structure
//!
//! - `action`: Inbound actions, validation, medal conversion
//! - `physics`: Medal drop simulation
//! - `slot`: Slot spin and tier table
//! - `scoring`: Composition of the two stages

pub mod action;
pub mod physics;
pub mod slot;
pub mod scoring;

// Re-export key types
pub use action::{ActionEvent, ActionKind, ActionRequest, MedalTable};
pub use physics::{PhysicsConfig, PhysicsResult, simulate};
pub use slot::{SlotConfig, SpinResult, Tier, spin};
pub use scoring::{ScoreOutcome, ScoredPlay, score_play};

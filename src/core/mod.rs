//! Core primitives.
//!
//! Seeded randomness shared by the scoring stages.

pub mod rng;

// Re-export core types
pub use rng::{DeterministicRng, derive_seed};

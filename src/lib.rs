//! # Pusher Slot Server
//!
//! Live-event medal pusher and slot economy for streaming overlays.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    PUSHER SLOT SERVER                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Primitives                                │
//! │  └── rng.rs      - Seeded Xorshift128+ PRNG                  │
//! │                                                              │
//! │  game/           - Pure scoring (seeded)                     │
//! │  ├── action.rs   - Actions, validation, medal conversion     │
//! │  ├── physics.rs  - Medal drop simulation                     │
//! │  ├── slot.rs     - Slot tiers, symbols, bonus odds           │
//! │  └── scoring.rs  - Multiplier composition                    │
//! │                                                              │
//! │  ledger/         - Shared state (atomic operations only)     │
//! │  ├── config.rs   - Live config and clamping                  │
//! │  ├── memory.rs   - In-process backend                        │
//! │  └── redis_store.rs - Redis backend (Lua scripts)            │
//! │                                                              │
//! │  economy/        - Orchestration                             │
//! │  ├── mod.rs      - Per-action state machine                  │
//! │  └── ticker.rs   - Periodic leaderboard snapshot             │
//! │                                                              │
//! │  network/        - Transport                                 │
//! │  ├── server.rs   - WebSocket overlay/ingest server           │
//! │  ├── broadcast.rs- Event fan-out                             │
//! │  ├── protocol.rs - Message types                             │
//! │  └── auth.rs     - Admin credentials                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Atomicity
//!
//! Every balance-affecting step is one atomic ledger operation:
//! - A play's debit, pool credit, counter tick and score credit land together or not at all
//! - The global counter increments and evaluates its threshold in a single step
//! - Scoring runs before any mutation, so a failed play leaves no partial outcome
//!
//! Given the same seed and inputs, scoring produces **identical results**.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod ledger;
pub mod economy;
pub mod network;

// Re-export commonly used types
pub use crate::core::rng::DeterministicRng;
pub use economy::{Economy, EconomyConfig, EconomyError};
pub use ledger::{Leaderboard, LedgerStore, LiveConfig, MemoryLedger, RedisLedger, StoreError};
pub use network::{Broadcaster, OverlayEvent, OverlayServer, ServerConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

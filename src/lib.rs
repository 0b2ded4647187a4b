//! # Bingo Engine
//!
//! Real-time multiplayer bingo: many concurrent sessions, each with its own
//! cards, call sequence and single winner.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       BINGO ENGINE                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  └── rng.rs      - Seeded Xorshift128+ PRNG                  │
//! │                                                              │
//! │  game/           - Game rules (deterministic)                │
//! │  ├── card.rs     - 5x5 card generation                       │
//! │  ├── caller.rs   - 1-75 call pool                            │
//! │  ├── validator.rs- Claim integrity and pattern checks        │
//! │  ├── state.rs    - Session state and lifecycle table         │
//! │  └── events.rs   - Accepted-mutation events                  │
//! │                                                              │
//! │  network/        - Orchestration (non-deterministic)         │
//! │  ├── session.rs  - Locked session with owned timers          │
//! │  ├── registry.rs - Join/leave routing and recycling          │
//! │  ├── broadcast.rs- Snapshot + event fan-out                  │
//! │  ├── store.rs    - Result persistence                        │
//! │  ├── protocol.rs - Message types                             │
//! │  └── server.rs   - WebSocket adapter                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism
//!
//! Given a session seed, `game/` produces identical cards, call order and
//! call intervals on any platform. Wall-clock time and task scheduling only
//! enter through `network/`.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use config::{ConfigError, EngineConfig, ServerConfig, SessionConfig};
pub use core::rng::DeterministicRng;
pub use game::card::{generate_card, BingoCard};
pub use game::state::{PlayerId, SessionId, SessionState};
pub use network::registry::{RegistryError, SessionRegistry};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default seats per session.
pub const DEFAULT_CAPACITY: usize = 50;

/// Default players needed to start the countdown.
pub const DEFAULT_MIN_PLAYERS: usize = 3;

//! Game Logic Module
//!
//! Pure bingo rules. Deterministic given a session seed.
//!
//! ## Module Structure
//!
//! - `card`: Card layout and generation
//! - `caller`: Shuffled 1–75 call pool
//! - `validator`: Claim integrity and pattern checks
//! - `state`: Per-session game state and lifecycle table
//! - `events`: Events emitted for accepted mutations

pub mod card;
pub mod caller;
pub mod validator;
pub mod state;
pub mod events;

// Re-export key types
pub use card::{BingoCard, generate_card, FREE_CELL};
pub use caller::{Call, Draw, Letter, NumberCaller};
pub use validator::{validate, ClaimError, PatternKind, WinLine, WinResult};
pub use state::{GameState, Player, PlayerId, SessionError, SessionId, SessionState, Winner};
pub use events::{GameEvent, RejectReason};

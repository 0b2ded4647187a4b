//! Network Layer
//!
//! Session orchestration and transport. Timers, locks and channels live
//! here; every rule decision is delegated to `game/`.

pub mod broadcast;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod store;

pub use broadcast::{Broadcaster, Subscription};
pub use protocol::{
    ClaimResult, ClientMessage, JoinResult, ServerMessage, SessionEvent, SessionUpdate,
};
pub use registry::{RegistryError, SessionRegistry};
pub use server::{GameServer, GameServerError};
pub use session::{BingoSession, LeaveOutcome, Seat, SessionHandle};
pub use store::{GameRecord, JsonLinesStore, MemoryResultStore, ResultStore, StoreError};

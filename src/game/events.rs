//! Game Events
//!
//! Every accepted mutation of a session produces one of these. The network
//! layer wraps them with a snapshot and fans them out to listeners.

use serde::{Serialize, Deserialize};

use crate::game::caller::Call;
use crate::game::state::{PlayerId, SessionState};
use crate::game::validator::WinLine;

/// Reason a claim was turned down.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// Marks include an uncalled number or complete no line.
    InvalidClaim,
    /// The session has already finished.
    AlreadyWon,
    /// Numbers are not being called yet.
    NotActive,
    /// Claimant is not a player in this session.
    NotInSession,
}

/// Event data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GameEvent {
    /// A player took a seat.
    PlayerJoined {
        player_id: PlayerId,
        display_name: String,
    },

    /// A player left or disconnected.
    PlayerLeft {
        player_id: PlayerId,
    },

    /// Lifecycle transition.
    StateChanged {
        from: SessionState,
        to: SessionState,
    },

    /// Countdown timer armed.
    CountdownStarted {
        seconds: u64,
    },

    /// Countdown aborted because players dropped below the minimum.
    CountdownCancelled,

    /// A number was drawn.
    NumberCalled {
        call: Call,
    },

    /// A claim won the game.
    ClaimAccepted {
        player_id: PlayerId,
        line: WinLine,
    },

    /// A claim was turned down.
    ClaimRejected {
        player_id: PlayerId,
        reason: RejectReason,
    },

    /// Game over, with or without a winner.
    GameOver {
        winner: Option<PlayerId>,
    },
}

impl GameEvent {
    /// Player the event concerns, if any.
    pub fn player_id(&self) -> Option<PlayerId> {
        match self {
            GameEvent::PlayerJoined { player_id, .. }
            | GameEvent::PlayerLeft { player_id }
            | GameEvent::ClaimAccepted { player_id, .. }
            | GameEvent::ClaimRejected { player_id, .. } => Some(*player_id),
            GameEvent::GameOver { winner } => *winner,
            _ => None,
        }
    }
}

//! Protocol Messages
//!
//! Transport-agnostic request/response and broadcast shapes. The bundled
//! WebSocket adapter carries them as JSON text frames; other transports are
//! free to pick their own framing.

use serde::{Serialize, Deserialize};

use crate::game::card::BingoCard;
use crate::game::events::{GameEvent, RejectReason};
use crate::game::state::{PlayerId, SessionId, SessionState, Winner};
use crate::game::validator::{PatternKind, WinLine, WinResult};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Take a seat in any open session.
    Join(JoinRequest),

    /// Give up a seat.
    Leave(LeaveRequest),

    /// Claim a win.
    Claim(ClaimRequest),

    /// Daub a single called number.
    Mark(MarkRequest),

    /// Request a fresh snapshot (after reconnect or lag).
    SyncRequest { session_id: SessionId },

    /// Ping for latency measurement.
    Ping { timestamp: u64 },
}

/// Join request. Identity comes from the authentication collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    /// Authenticated player.
    pub player_id: PlayerId,
    /// Name shown to other players.
    pub display_name: String,
}

/// Leave request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveRequest {
    /// Session to leave.
    pub session_id: SessionId,
    /// Leaving player.
    pub player_id: PlayerId,
}

/// Claim request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRequest {
    /// Session the claim is for.
    pub session_id: SessionId,
    /// Claimant.
    pub player_id: PlayerId,
    /// Values the player believes are marked.
    pub marked_values: Vec<u8>,
}

/// Mark request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkRequest {
    /// Session.
    pub session_id: SessionId,
    /// Player daubing.
    pub player_id: PlayerId,
    /// Value to mark.
    pub value: u8,
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Seat assigned.
    Joined(JoinResult),

    /// Leave acknowledged.
    Left { session_id: SessionId },

    /// Outcome of a claim.
    ClaimResult(ClaimResult),

    /// Mark acknowledged.
    Marked { session_id: SessionId, value: u8 },

    /// Broadcast event with current state.
    Update(SessionEvent),

    /// Full state (reply to sync).
    Snapshot(SessionUpdate),

    /// Pong response.
    Pong { timestamp: u64, server_time: u64 },

    /// Error message.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown { reason: String },
}

/// Reply to a join.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinResult {
    /// Assigned session.
    pub session_id: SessionId,
    /// The player's card.
    pub card: BingoCard,
    /// State at the moment of joining.
    pub snapshot: SessionUpdate,
}

/// Reply to a claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimResult {
    /// Whether the claim won the game.
    pub accepted: bool,
    /// Winning shape, when accepted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern_kind: Option<PatternKind>,
    /// Exact winning line, when accepted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<WinLine>,
    /// Why it was turned down.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
}

impl ClaimResult {
    /// Winning claim.
    pub fn won(result: &WinResult) -> Self {
        Self {
            accepted: true,
            pattern_kind: Some(result.kind()),
            line: Some(result.line),
            reason: None,
        }
    }

    /// Rejected claim.
    pub fn rejected(reason: RejectReason) -> Self {
        Self {
            accepted: false,
            pattern_kind: None,
            line: None,
            reason: Some(reason),
        }
    }
}

/// Public view of a seated player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSummary {
    /// Player identifier.
    pub id: PlayerId,
    /// Display name.
    pub name: String,
}

/// Complete observable state of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUpdate {
    /// Session identifier.
    pub session_id: SessionId,
    /// Lifecycle state.
    pub state: SessionState,
    /// Numbers called so far, in order.
    pub call_history: Vec<u8>,
    /// Most recent call.
    pub current_number: Option<u8>,
    /// Seated players.
    pub players: Vec<PlayerSummary>,
    /// Winner, once decided.
    pub winner: Option<Winner>,
}

/// One broadcast: what changed plus the resulting state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    /// Session identifier.
    pub session_id: SessionId,
    /// Per-session sequence number, starting at 1.
    pub seq: u64,
    /// The mutation.
    pub event: GameEvent,
    /// State after the mutation.
    pub update: SessionUpdate,
}

/// Server error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed message.
    InvalidInput,
    /// Session unknown or already recycled.
    SessionNotFound,
    /// Player not seated in that session.
    NotInSession,
    /// Player already seated somewhere.
    AlreadyInSession,
    /// Operation needs an active game.
    NotActive,
    /// Mark rejected.
    InvalidMark,
    /// Server overloaded.
    ServerOverloaded,
    /// Internal error.
    InternalError,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

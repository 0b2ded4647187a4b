//! Session Game State
//!
//! The synchronous, deterministic core of one bingo session: seats, cards,
//! call history, lifecycle state and winner. Nothing here knows about
//! timers, tasks or sockets; callers serialize access (see
//! `network::session`).
//! Uses BTreeMap for deterministic iteration order.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use serde::{Serialize, Deserialize};
use thiserror::Error;
use uuid::Uuid;

use crate::core::rng::DeterministicRng;
use crate::game::caller::{Draw, NumberCaller, POOL_SIZE};
use crate::game::card::{generate_card, BingoCard, FREE_CELL};
use crate::game::events::RejectReason;
use crate::game::validator::{validate, ClaimError, WinLine, WinResult};

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Player identifier supplied by the authentication collaborator.
///
/// Implements Ord for deterministic BTreeMap ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// First four bytes in hex, for logs.
    pub fn short(&self) -> String {
        hex::encode(&self.as_bytes()[..4])
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Session identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// First four bytes in hex, for logs.
    pub fn short(&self) -> String {
        hex::encode(&self.as_bytes()[..4])
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

// =============================================================================
// LIFECYCLE
// =============================================================================

/// Session lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// Waiting for enough players.
    Lobby,
    /// Start timer running; joins still accepted.
    Countdown,
    /// Numbers are being called; claims accepted.
    Active,
    /// Game over. No joins, calls or claims.
    Finished,
    /// Released by the registry.
    Recycled,
}

impl SessionState {
    /// Transition table.
    ///
    /// `Countdown -> Lobby` is the only step back, taken when players drop
    /// below the minimum before the game starts.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Lobby, Countdown)
                | (Countdown, Lobby)
                | (Countdown, Active)
                | (Active, Finished)
                | (Lobby, Recycled)
                | (Countdown, Recycled)
                | (Finished, Recycled)
        )
    }

    /// Whether new players may take a seat.
    pub fn accepts_joins(self) -> bool {
        matches!(self, SessionState::Lobby | SessionState::Countdown)
    }

    /// Whether the game has ended.
    pub fn is_over(self) -> bool {
        matches!(self, SessionState::Finished | SessionState::Recycled)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::Lobby => "LOBBY",
            SessionState::Countdown => "COUNTDOWN",
            SessionState::Active => "ACTIVE",
            SessionState::Finished => "FINISHED",
            SessionState::Recycled => "RECYCLED",
        })
    }
}

// =============================================================================
// PLAYERS
// =============================================================================

/// A seated player.
#[derive(Clone, Debug)]
pub struct Player {
    /// Player identifier.
    pub id: PlayerId,
    /// Name shown to other players.
    pub display_name: String,
    /// Card issued at join time. Never changes.
    pub card: BingoCard,
    /// Marked values. Always contains [`FREE_CELL`].
    pub marked: BTreeSet<u8>,
}

impl Player {
    fn new(id: PlayerId, display_name: String, card: BingoCard) -> Self {
        Self {
            id,
            display_name,
            card,
            marked: BTreeSet::from([FREE_CELL]),
        }
    }
}

/// The player who won.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Winner {
    /// Player identifier.
    pub player_id: PlayerId,
    /// Display name at time of win.
    pub display_name: String,
    /// Winning line.
    pub line: WinLine,
    /// Numbers called when the claim was accepted.
    pub calls: u8,
}

// =============================================================================
// ERRORS
// =============================================================================

/// Session errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Session is at capacity.
    #[error("Session is full")]
    SessionFull,

    /// Session no longer accepts joins.
    #[error("Session not accepting players")]
    NotAvailable,

    /// Player already seated here.
    #[error("Already in session")]
    AlreadyInSession,

    /// Player not seated here.
    #[error("Player not found")]
    PlayerNotFound,

    /// Operation needs an active game.
    #[error("Game not active")]
    NotActive,

    /// Game already finished.
    #[error("Game already won")]
    AlreadyWon,

    /// Claim failed integrity or pattern check.
    #[error("Invalid claim: {0}")]
    InvalidClaim(#[from] ClaimError),

    /// Disallowed lifecycle step.
    #[error("Illegal transition {from} -> {to}")]
    IllegalTransition {
        /// Current state.
        from: SessionState,
        /// Requested state.
        to: SessionState,
    },

    /// Value is not printed on the player's card.
    #[error("Number {0} is not on this card")]
    NotOnCard(u8),

    /// Value has not been called.
    #[error("Number {0} has not been called")]
    NotCalled(u8),

    /// Internal bookkeeping broke. The session must be abandoned.
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),
}

impl SessionError {
    /// How a failed claim is reported to the claimant.
    pub fn reject_reason(&self) -> RejectReason {
        match self {
            SessionError::AlreadyWon => RejectReason::AlreadyWon,
            SessionError::NotActive => RejectReason::NotActive,
            SessionError::PlayerNotFound => RejectReason::NotInSession,
            _ => RejectReason::InvalidClaim,
        }
    }
}

// =============================================================================
// GAME STATE
// =============================================================================

/// Full state of one session.
#[derive(Clone, Debug)]
pub struct GameState {
    /// Session identifier.
    pub id: SessionId,
    state: SessionState,
    players: BTreeMap<PlayerId, Player>,
    caller: NumberCaller,
    called: BTreeSet<u8>,
    winner: Option<Winner>,
    rng: DeterministicRng,
}

impl GameState {
    /// Create a session in LOBBY from a seed.
    pub fn new(id: SessionId, seed: u64) -> Self {
        let mut rng = DeterministicRng::new(seed);
        let caller = NumberCaller::new(&mut rng);

        Self {
            id,
            state: SessionState::Lobby,
            players: BTreeMap::new(),
            caller,
            called: BTreeSet::new(),
            winner: None,
            rng,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Move to `next` if the transition table allows it. Returns the old state.
    pub fn transition(&mut self, next: SessionState) -> Result<SessionState, SessionError> {
        let from = self.state;
        if !from.can_transition_to(next) {
            return Err(SessionError::IllegalTransition { from, to: next });
        }
        self.state = next;
        Ok(from)
    }

    /// Seat a player and issue a card.
    pub fn add_player(
        &mut self,
        id: PlayerId,
        display_name: String,
        capacity: usize,
    ) -> Result<&Player, SessionError> {
        if !self.state.accepts_joins() {
            return Err(SessionError::NotAvailable);
        }
        if self.players.contains_key(&id) {
            return Err(SessionError::AlreadyInSession);
        }
        if self.players.len() >= capacity {
            return Err(SessionError::SessionFull);
        }

        let card = generate_card(&mut self.rng);
        Ok(self
            .players
            .entry(id)
            .or_insert_with(|| Player::new(id, display_name, card)))
    }

    /// Remove a player, returning their seat.
    pub fn remove_player(&mut self, id: &PlayerId) -> Option<Player> {
        self.players.remove(id)
    }

    /// Look up a player.
    pub fn player(&self, id: &PlayerId) -> Option<&Player> {
        self.players.get(id)
    }

    /// All seated players in id order.
    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    /// Seat count.
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Numbers called so far, in order.
    pub fn call_history(&self) -> &[u8] {
        self.caller.history()
    }

    /// Most recent number.
    pub fn current_number(&self) -> Option<u8> {
        self.caller.current()
    }

    /// Winner, once a claim has been accepted.
    pub fn winner(&self) -> Option<&Winner> {
        self.winner.as_ref()
    }

    /// Next interval between calls, drawn from the session RNG.
    pub fn next_interval_ms(&mut self, min_ms: u64, max_ms: u64) -> u64 {
        self.rng.next_range_u64(min_ms, max_ms)
    }

    /// Draw the next number.
    ///
    /// A duplicate from the caller is reported as an invariant violation;
    /// the caller of this method must abandon the game.
    pub fn call_next(&mut self) -> Result<Draw, SessionError> {
        if self.state != SessionState::Active {
            return Err(SessionError::NotActive);
        }

        let draw = self.caller.draw();
        if let Draw::Called(call) = draw {
            if !self.called.insert(call.number) || self.called.len() > POOL_SIZE {
                return Err(SessionError::InvariantViolation(format!(
                    "number {} drawn twice",
                    call.number
                )));
            }
        }
        Ok(draw)
    }

    /// Record a single daub on the player's card.
    pub fn mark(&mut self, id: &PlayerId, value: u8) -> Result<(), SessionError> {
        if self.state != SessionState::Active {
            return Err(SessionError::NotActive);
        }
        let player = self.players.get_mut(id).ok_or(SessionError::PlayerNotFound)?;
        if !player.card.contains(value) {
            return Err(SessionError::NotOnCard(value));
        }
        if value != FREE_CELL && !self.called.contains(&value) {
            return Err(SessionError::NotCalled(value));
        }
        player.marked.insert(value);
        Ok(())
    }

    /// Evaluate a claim.
    ///
    /// The first claim that validates moves the session to FINISHED; every
    /// claim after that, valid or not, gets [`SessionError::AlreadyWon`].
    pub fn claim(&mut self, id: &PlayerId, marked: &[u8]) -> Result<WinResult, SessionError> {
        if self.state.is_over() {
            return Err(SessionError::AlreadyWon);
        }
        if self.state != SessionState::Active {
            return Err(SessionError::NotActive);
        }

        let player = self.players.get_mut(id).ok_or(SessionError::PlayerNotFound)?;
        let result = validate(&player.card, marked, self.caller.history())?;

        player.marked = marked
            .iter()
            .copied()
            .filter(|v| player.card.contains(*v))
            .chain(std::iter::once(FREE_CELL))
            .collect();

        self.winner = Some(Winner {
            player_id: player.id,
            display_name: player.display_name.clone(),
            line: result.line,
            calls: self.caller.history().len() as u8,
        });
        self.transition(SessionState::Finished)?;
        Ok(result)
    }

    /// End an active game without a winner.
    pub fn finish_without_winner(&mut self) -> Result<(), SessionError> {
        self.transition(SessionState::Finished).map(|_| ())
    }

    /// Abandon the session after an invariant violation, from any live state.
    pub fn force_finish(&mut self) {
        self.winner = None;
        self.state = SessionState::Finished;
    }

    /// Verify call-history invariants.
    pub fn check_invariants(&self) -> Result<(), SessionError> {
        let history = self.caller.history();
        if history.len() > POOL_SIZE {
            return Err(SessionError::InvariantViolation("call history exceeds 75".into()));
        }
        let unique: BTreeSet<u8> = history.iter().copied().collect();
        if unique.len() != history.len() || unique != self.called {
            return Err(SessionError::InvariantViolation("call history not unique".into()));
        }
        Ok(())
    }
}

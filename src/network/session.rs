//! Bingo Session
//!
//! Wraps one [`GameState`] with everything that is not pure game logic:
//! lifecycle policy (minimum players, countdown, call pacing), owned timers,
//! the broadcaster and result hand-off.
//!
//! A session lives behind a [`SessionHandle`] (`Arc<Mutex<_>>`). Every
//! mutation, whether from a player request or a timer, happens with that
//! lock held, so two claims can never both win. Timers hold only a weak
//! reference plus the epoch they were armed in; a destroyed session or a
//! stale epoch makes them exit without touching state.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::game::caller::Draw;
use crate::game::events::GameEvent;
use crate::game::state::{GameState, PlayerId, SessionError, SessionId, SessionState};
use crate::network::broadcast::{Broadcaster, Subscription};
use crate::network::protocol::{
    ClaimResult, JoinResult, PlayerSummary, SessionEvent, SessionUpdate,
};
use crate::network::store::GameRecord;

/// Shared, lock-guarded session.
pub type SessionHandle = Arc<Mutex<BingoSession>>;

/// Messages from sessions to their registry.
#[derive(Debug)]
pub enum SessionNotice {
    /// Session reached FINISHED on its own (win, exhaustion, fault).
    Finished {
        /// Finished session.
        session_id: SessionId,
        /// Record to persist; `None` skips persistence.
        record: Option<GameRecord>,
    },
}

/// Returned to a player who took a seat.
#[derive(Debug)]
pub struct Seat {
    /// Card and snapshot.
    pub result: JoinResult,
    /// Events after the snapshot.
    pub events: broadcast::Receiver<SessionEvent>,
}

/// Result of removing a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaveOutcome {
    /// Players still seated.
    pub remaining: usize,
    /// State after the removal.
    pub state: SessionState,
}

/// A live bingo session.
pub struct BingoSession {
    game: GameState,
    config: SessionConfig,
    broadcaster: Broadcaster,
    countdown_timer: Option<JoinHandle<()>>,
    call_timer: Option<JoinHandle<()>>,
    /// Bumped on every transition; timers armed in an older epoch are stale.
    epoch: u64,
    created_at: Instant,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    self_ref: Weak<Mutex<BingoSession>>,
    notices: mpsc::UnboundedSender<SessionNotice>,
}

impl BingoSession {
    /// Create a session in LOBBY and return its handle.
    pub fn create(
        id: SessionId,
        seed: u64,
        config: SessionConfig,
        notices: mpsc::UnboundedSender<SessionNotice>,
    ) -> SessionHandle {
        Arc::new_cyclic(|weak| {
            Mutex::new(Self {
                game: GameState::new(id, seed),
                broadcaster: Broadcaster::new(id, config.event_buffer),
                config,
                countdown_timer: None,
                call_timer: None,
                epoch: 0,
                created_at: Instant::now(),
                started_at: None,
                finished_at: None,
                self_ref: weak.clone(),
                notices,
            })
        })
    }

    /// Session identifier.
    pub fn id(&self) -> SessionId {
        self.game.id
    }

    /// Lifecycle state.
    pub fn state(&self) -> SessionState {
        self.game.state()
    }

    /// Seated players.
    pub fn player_count(&self) -> usize {
        self.game.player_count()
    }

    /// Whether a new player could be seated right now.
    pub fn has_open_seat(&self) -> bool {
        self.state().accepts_joins() && self.player_count() < self.config.capacity
    }

    /// Whether `player_id` is seated here.
    pub fn contains(&self, player_id: &PlayerId) -> bool {
        self.game.player(player_id).is_some()
    }

    /// Time since creation.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Read-only view of the game.
    pub fn game(&self) -> &GameState {
        &self.game
    }

    /// Current observable state.
    pub fn snapshot(&self) -> SessionUpdate {
        SessionUpdate {
            session_id: self.game.id,
            state: self.game.state(),
            call_history: self.game.call_history().to_vec(),
            current_number: self.game.current_number(),
            players: self
                .game
                .players()
                .map(|p| PlayerSummary { id: p.id, name: p.display_name.clone() })
                .collect(),
            winner: self.game.winner().cloned(),
        }
    }

    /// Attach a listener.
    pub fn subscribe(&self) -> Subscription {
        self.broadcaster.subscribe(self.snapshot())
    }

    /// Completed-game record for persistence.
    pub fn result_record(&self) -> GameRecord {
        let snapshot = self.snapshot();
        GameRecord {
            session_id: snapshot.session_id,
            winner: snapshot.winner,
            players: snapshot.players,
            call_history: snapshot.call_history,
            started_at: self.started_at,
            finished_at: self.finished_at.unwrap_or_else(Utc::now),
        }
    }

    // =========================================================================
    // PLAYER OPERATIONS
    // =========================================================================

    /// Seat a player, issue a card and subscribe them.
    pub fn join(&mut self, player_id: PlayerId, display_name: String) -> Result<Seat, SessionError> {
        let card = self
            .game
            .add_player(player_id, display_name.clone(), self.config.capacity)?
            .card;

        info!(
            "Player {} joined session {} ({}/{})",
            player_id.short(),
            self.id().short(),
            self.player_count(),
            self.config.capacity
        );
        self.publish(GameEvent::PlayerJoined { player_id, display_name });

        if self.state() == SessionState::Lobby && self.player_count() >= self.config.min_players {
            self.start_countdown()?;
        }

        let subscription = self.subscribe();
        Ok(Seat {
            result: JoinResult {
                session_id: self.id(),
                card,
                snapshot: subscription.snapshot,
            },
            events: subscription.events,
        })
    }

    /// Remove a player.
    ///
    /// Dropping below the minimum during COUNTDOWN reverts to LOBBY. The last
    /// player leaving an ACTIVE game ends it with no winner and no record.
    pub fn leave(&mut self, player_id: &PlayerId) -> Result<LeaveOutcome, SessionError> {
        self.game
            .remove_player(player_id)
            .ok_or(SessionError::PlayerNotFound)?;

        info!("Player {} left session {}", player_id.short(), self.id().short());
        self.publish(GameEvent::PlayerLeft { player_id: *player_id });

        match self.state() {
            SessionState::Countdown if self.player_count() < self.config.min_players => {
                self.cancel_countdown()?;
            }
            SessionState::Active if self.player_count() == 0 => {
                info!("Session {} abandoned mid-game", self.id().short());
                self.conclude()?;
            }
            _ => {}
        }

        Ok(LeaveOutcome {
            remaining: self.player_count(),
            state: self.state(),
        })
    }

    /// Evaluate a claim. The first valid claim finishes the game.
    pub fn claim(&mut self, player_id: &PlayerId, marked: &[u8]) -> ClaimResult {
        match self.game.claim(player_id, marked) {
            Ok(win) => {
                info!(
                    "Session {} won by {} on {} {}",
                    self.id().short(),
                    player_id.short(),
                    win.kind(),
                    win.line.index
                );
                self.publish(GameEvent::ClaimAccepted { player_id: *player_id, line: win.line });
                self.publish(GameEvent::StateChanged {
                    from: SessionState::Active,
                    to: SessionState::Finished,
                });
                self.after_finish(true);
                ClaimResult::won(&win)
            }
            Err(err) => {
                let reason = err.reject_reason();
                debug!(
                    "Claim by {} in session {} rejected: {}",
                    player_id.short(),
                    self.id().short(),
                    err
                );
                self.publish(GameEvent::ClaimRejected { player_id: *player_id, reason });
                ClaimResult::rejected(reason)
            }
        }
    }

    /// Record a single daub.
    pub fn mark(&mut self, player_id: &PlayerId, value: u8) -> Result<(), SessionError> {
        self.game.mark(player_id, value)
    }

    /// Release the session: cancel timers and move to RECYCLED.
    pub fn destroy(&mut self) {
        self.cancel_timers();
        if self.state() == SessionState::Active {
            // Only reached when the registry tears down a live game.
            if let Err(e) = self.conclude() {
                warn!("Session {} finish on destroy failed: {}", self.id().short(), e);
            }
        }
        match self.transition(SessionState::Recycled) {
            Ok(()) => debug!("Session {} recycled", self.id().short()),
            Err(e) => warn!("Session {} recycle failed: {}", self.id().short(), e),
        }
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    fn publish(&mut self, event: GameEvent) {
        let update = self.snapshot();
        self.broadcaster.publish(event, update);
    }

    fn transition(&mut self, next: SessionState) -> Result<(), SessionError> {
        let from = self.game.transition(next)?;
        self.epoch += 1;
        info!("Session {} {} -> {}", self.id().short(), from, next);
        self.publish(GameEvent::StateChanged { from, to: next });
        Ok(())
    }

    fn start_countdown(&mut self) -> Result<(), SessionError> {
        self.transition(SessionState::Countdown)?;
        let delay = self.config.countdown;
        self.publish(GameEvent::CountdownStarted { seconds: delay.as_secs() });

        let epoch = self.epoch;
        let weak = self.self_ref.clone();
        self.countdown_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(handle) = weak.upgrade() else { return };
            let mut session = handle.lock().await;
            session.on_countdown_elapsed(epoch);
        }));
        Ok(())
    }

    fn cancel_countdown(&mut self) -> Result<(), SessionError> {
        if let Some(timer) = self.countdown_timer.take() {
            timer.abort();
        }
        self.transition(SessionState::Lobby)?;
        self.publish(GameEvent::CountdownCancelled);
        Ok(())
    }

    fn on_countdown_elapsed(&mut self, epoch: u64) {
        if epoch != self.epoch || self.state() != SessionState::Countdown {
            debug!("Session {} ignoring stale countdown", self.id().short());
            return;
        }
        // This task is the countdown timer; detach rather than abort it.
        self.countdown_timer = None;

        if let Err(e) = self.transition(SessionState::Active) {
            error!("Session {} failed to start: {}", self.id().short(), e);
            return;
        }
        self.started_at = Some(Utc::now());
        self.start_calling();
    }

    fn start_calling(&mut self) {
        let epoch = self.epoch;
        let weak = self.self_ref.clone();
        self.call_timer = Some(tokio::spawn(async move {
            loop {
                let delay = {
                    let Some(handle) = weak.upgrade() else { return };
                    let mut session = handle.lock().await;
                    if session.epoch != epoch {
                        return;
                    }
                    session.next_call_delay()
                };
                tokio::time::sleep(delay).await;

                let Some(handle) = weak.upgrade() else { return };
                let mut session = handle.lock().await;
                if !session.on_call_due(epoch) {
                    return;
                }
            }
        }));
    }

    fn next_call_delay(&mut self) -> Duration {
        let min = self.config.call_interval_min.as_millis() as u64;
        let max = self.config.call_interval_max.as_millis() as u64;
        Duration::from_millis(self.game.next_interval_ms(min, max))
    }

    /// Draw one number. Returns whether calling should continue.
    fn on_call_due(&mut self, epoch: u64) -> bool {
        if epoch != self.epoch || self.state() != SessionState::Active {
            debug!("Session {} ignoring stale call timer", self.id().short());
            return false;
        }

        let drawn = self
            .game
            .call_next()
            .and_then(|draw| self.game.check_invariants().map(|()| draw));
        match drawn {
            Ok(Draw::Called(call)) => {
                debug!("Session {} called {}", self.id().short(), call);
                self.publish(GameEvent::NumberCalled { call });
                true
            }
            Ok(Draw::Exhausted) => {
                info!("Session {} exhausted all numbers without a winner", self.id().short());
                self.call_timer = None;
                if let Err(e) = self.conclude() {
                    error!("Session {} failed to finish: {}", self.id().short(), e);
                    return false;
                }
                self.after_finish(true);
                false
            }
            Err(SessionError::InvariantViolation(detail)) => {
                error!("Session {} invariant violated: {}", self.id().short(), detail);
                self.call_timer = None;
                self.abandon();
                false
            }
            Err(e) => {
                warn!("Session {} call failed: {}", self.id().short(), e);
                false
            }
        }
    }

    /// ACTIVE -> FINISHED with no winner.
    fn conclude(&mut self) -> Result<(), SessionError> {
        self.cancel_timers();
        self.transition(SessionState::Finished)?;
        self.finished_at = Some(Utc::now());
        self.publish(GameEvent::GameOver { winner: None });
        Ok(())
    }

    /// Force FINISHED after an internal fault. Nothing is persisted.
    fn abandon(&mut self) {
        self.cancel_timers();
        let from = self.state();
        self.game.force_finish();
        self.epoch += 1;
        self.finished_at = Some(Utc::now());
        self.publish(GameEvent::StateChanged { from, to: SessionState::Finished });
        self.publish(GameEvent::GameOver { winner: None });
        self.after_finish(false);
    }

    /// Post-FINISHED bookkeeping shared by every ending.
    fn after_finish(&mut self, persist: bool) {
        self.cancel_timers();
        self.epoch += 1;
        if self.finished_at.is_none() {
            self.finished_at = Some(Utc::now());
        }
        if let Some(winner) = self.game.winner() {
            let winner = Some(winner.player_id);
            self.publish(GameEvent::GameOver { winner });
        }

        let record = persist.then(|| self.result_record());
        let notice = SessionNotice::Finished { session_id: self.id(), record };
        if self.notices.send(notice).is_err() {
            warn!("Session {} finished with no registry listening", self.id().short());
        }
    }

    fn cancel_timers(&mut self) {
        if let Some(timer) = self.countdown_timer.take() {
            timer.abort();
        }
        if let Some(timer) = self.call_timer.take() {
            timer.abort();
        }
    }
}

impl Drop for BingoSession {
    fn drop(&mut self) {
        self.cancel_timers();
    }
}

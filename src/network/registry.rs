//! Session Registry
//!
//! Assigns players to sessions and owns every live session. All
//! find-or-create decisions happen under one registry lock, so concurrent
//! joins can neither oversubscribe a session nor race to create the same
//! lobby. Lock order is always registry, then session; sessions report back
//! over a channel and never take the registry lock themselves.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::core::rng::derive_session_seed;
use crate::game::state::{PlayerId, SessionError, SessionId, SessionState};
use crate::network::broadcast::Subscription;
use crate::network::protocol::{ClaimResult, SessionUpdate};
use crate::network::session::{BingoSession, LeaveOutcome, Seat, SessionHandle, SessionNotice};
use crate::network::store::{GameRecord, ResultStore};

/// Registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Unknown or already recycled session.
    #[error("Session not found")]
    SessionNotFound,

    /// Player has no seat in that session.
    #[error("Player not in session")]
    PlayerNotInSession,

    /// Rejected by the session.
    #[error(transparent)]
    Session(#[from] SessionError),
}

struct RegistryInner {
    sessions: BTreeMap<SessionId, SessionHandle>,
    player_sessions: BTreeMap<PlayerId, SessionId>,
}

/// Owns all sessions.
pub struct SessionRegistry {
    inner: Mutex<RegistryInner>,
    config: SessionConfig,
    store: Arc<dyn ResultStore>,
    notices: mpsc::UnboundedSender<SessionNotice>,
    nonce: AtomicU64,
}

impl SessionRegistry {
    /// Create a registry with one open lobby and start its background task.
    pub fn start(config: SessionConfig, store: Arc<dyn ResultStore>) -> Arc<Self> {
        let (notices, rx) = mpsc::unbounded_channel();
        let registry = Arc::new(Self {
            inner: Mutex::new(RegistryInner {
                sessions: BTreeMap::new(),
                player_sessions: BTreeMap::new(),
            }),
            config,
            store,
            notices,
            nonce: AtomicU64::new(0),
        });

        // Uncontended: nothing else can see the registry yet.
        if let Ok(mut inner) = registry.inner.try_lock() {
            registry.open_session(&mut inner);
        }

        tokio::spawn(Self::run_notices(Arc::downgrade(&registry), rx));
        registry
    }

    /// Session tuning in use.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // =========================================================================
    // PLAYER OPERATIONS
    // =========================================================================

    /// Seat a player in an open session, creating one if none has room.
    pub async fn join(&self, player_id: PlayerId, display_name: String) -> Result<Seat, RegistryError> {
        let mut inner = self.inner.lock().await;

        if let Some(current) = inner.player_sessions.get(&player_id).copied() {
            if let Some(handle) = inner.sessions.get(&current) {
                if !handle.lock().await.state().is_over() {
                    return Err(SessionError::AlreadyInSession.into());
                }
            }
            // Seat in a finished game; free to move on.
            inner.player_sessions.remove(&player_id);
        }

        let mut seat = None;
        for handle in inner.sessions.values() {
            let mut session = handle.lock().await;
            if session.has_open_seat() {
                seat = Some(session.join(player_id, display_name.clone())?);
                break;
            }
        }

        let seat = match seat {
            Some(seat) => seat,
            None => {
                let handle = self.open_session(&mut inner);
                let mut session = handle.lock().await;
                session.join(player_id, display_name)?
            }
        };

        inner.player_sessions.insert(player_id, seat.result.session_id);
        Ok(seat)
    }

    /// Remove a player. An emptied session is destroyed without a result.
    pub async fn leave(
        &self,
        session_id: &SessionId,
        player_id: &PlayerId,
    ) -> Result<LeaveOutcome, RegistryError> {
        let mut inner = self.inner.lock().await;
        let handle = inner
            .sessions
            .get(session_id)
            .cloned()
            .ok_or(RegistryError::SessionNotFound)?;

        let mut session = handle.lock().await;
        let outcome = session.leave(player_id).map_err(|e| match e {
            SessionError::PlayerNotFound => RegistryError::PlayerNotInSession,
            other => other.into(),
        })?;

        if inner.player_sessions.get(player_id) == Some(session_id) {
            inner.player_sessions.remove(player_id);
        }

        if outcome.remaining == 0 {
            session.destroy();
            inner.sessions.remove(session_id);
            info!("Session {} emptied and destroyed", session_id.short());
        }
        Ok(outcome)
    }

    /// Submit a claim. The session lock is the only lock held while judging.
    pub async fn claim(
        &self,
        session_id: &SessionId,
        player_id: &PlayerId,
        marked: &[u8],
    ) -> Result<ClaimResult, RegistryError> {
        let handle = self.session(session_id).await?;
        let mut session = handle.lock().await;
        Ok(session.claim(player_id, marked))
    }

    /// Record a single daub.
    pub async fn mark(
        &self,
        session_id: &SessionId,
        player_id: &PlayerId,
        value: u8,
    ) -> Result<(), RegistryError> {
        let handle = self.session(session_id).await?;
        let mut session = handle.lock().await;
        session.mark(player_id, value).map_err(|e| match e {
            SessionError::PlayerNotFound => RegistryError::PlayerNotInSession,
            other => other.into(),
        })
    }

    /// Snapshot plus live events for a session.
    pub async fn subscribe(&self, session_id: &SessionId) -> Result<Subscription, RegistryError> {
        let handle = self.session(session_id).await?;
        let session = handle.lock().await;
        Ok(session.subscribe())
    }

    /// Current state of a session.
    pub async fn snapshot(&self, session_id: &SessionId) -> Result<SessionUpdate, RegistryError> {
        let handle = self.session(session_id).await?;
        let session = handle.lock().await;
        Ok(session.snapshot())
    }

    // =========================================================================
    // INTROSPECTION
    // =========================================================================

    /// Look up a session handle.
    pub async fn session(&self, session_id: &SessionId) -> Result<SessionHandle, RegistryError> {
        let inner = self.inner.lock().await;
        inner
            .sessions
            .get(session_id)
            .cloned()
            .ok_or(RegistryError::SessionNotFound)
    }

    /// Session a player is seated in.
    pub async fn session_of(&self, player_id: &PlayerId) -> Option<SessionId> {
        let inner = self.inner.lock().await;
        inner.player_sessions.get(player_id).copied()
    }

    /// Live sessions, any state.
    pub async fn session_count(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.sessions.len()
    }

    /// Sessions that would accept a join right now.
    pub async fn open_session_count(&self) -> usize {
        let inner = self.inner.lock().await;
        let mut open = 0;
        for handle in inner.sessions.values() {
            if handle.lock().await.has_open_seat() {
                open += 1;
            }
        }
        open
    }

    /// Destroy every session.
    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        for (_, handle) in std::mem::take(&mut inner.sessions) {
            handle.lock().await.destroy();
        }
        inner.player_sessions.clear();
        info!("Registry shut down");
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    fn open_session(&self, inner: &mut RegistryInner) -> SessionHandle {
        let id = SessionId::generate();
        let nonce = self.nonce.fetch_add(1, Ordering::Relaxed);
        let seed = derive_session_seed(id.as_bytes(), nonce);
        let handle = BingoSession::create(id, seed, self.config.clone(), self.notices.clone());

        inner.sessions.insert(id, handle.clone());
        info!("Opened session {} ({} live)", id.short(), inner.sessions.len());
        handle
    }

    async fn run_notices(registry: Weak<Self>, mut rx: mpsc::UnboundedReceiver<SessionNotice>) {
        while let Some(notice) = rx.recv().await {
            let Some(registry) = registry.upgrade() else { break };
            match notice {
                SessionNotice::Finished { session_id, record } => {
                    registry.on_finished(session_id, record);
                }
            }
        }
        debug!("Registry notice loop stopped");
    }

    fn on_finished(self: &Arc<Self>, session_id: SessionId, record: Option<GameRecord>) {
        if let Some(record) = record {
            let store = Arc::clone(&self.store);
            tokio::spawn(async move {
                if let Err(e) = store.record_result(&record).await {
                    warn!("Failed to persist result for {}: {}", record.session_id.short(), e);
                }
            });
        }

        let registry = Arc::downgrade(self);
        let cooldown = self.config.cooldown;
        tokio::spawn(async move {
            tokio::time::sleep(cooldown).await;
            if let Some(registry) = registry.upgrade() {
                registry.recycle(&session_id).await;
            }
        });
    }

    /// Release a finished session and open a replacement unless a lobby
    /// with room already exists.
    async fn recycle(&self, session_id: &SessionId) {
        let mut inner = self.inner.lock().await;

        if let Some(handle) = inner.sessions.remove(session_id) {
            let mut session = handle.lock().await;
            if session.state() != SessionState::Finished {
                warn!("Recycling session {} in state {}", session_id.short(), session.state());
            }
            session.destroy();
            inner.player_sessions.retain(|_, sid| sid != session_id);
            info!("Recycled session {} after {:?}", session_id.short(), session.age());
        }

        for handle in inner.sessions.values() {
            if handle.lock().await.has_open_seat() {
                return;
            }
        }
        self.open_session(&mut inner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::game::events::RejectReason;
    use crate::network::store::MemoryResultStore;

    fn pid(n: u8) -> PlayerId {
        PlayerId::new([n; 16])
    }

    fn test_config() -> SessionConfig {
        SessionConfig {
            capacity: 3,
            min_players: 2,
            countdown: Duration::from_secs(5),
            call_interval_min: Duration::from_secs(1),
            call_interval_max: Duration::from_secs(1),
            cooldown: Duration::from_secs(10),
            event_buffer: 256,
        }
    }

    fn start() -> (Arc<SessionRegistry>, Arc<MemoryResultStore>) {
        let store = Arc::new(MemoryResultStore::new());
        (SessionRegistry::start(test_config(), store.clone()), store)
    }

    #[tokio::test(start_paused = true)]
    async fn test_starts_with_open_lobby() {
        let (registry, _) = start();
        assert_eq!(registry.session_count().await, 1);
        assert_eq!(registry.open_session_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_fills_then_overflows() {
        let (registry, _) = start();
        let first = registry.join(pid(1), "a".into()).await.unwrap().result.session_id;
        for i in 2..=3 {
            let seat = registry.join(pid(i), format!("p{i}")).await.unwrap();
            assert_eq!(seat.result.session_id, first);
        }

        let overflow = registry.join(pid(4), "d".into()).await.unwrap().result.session_id;
        assert_ne!(overflow, first);
        assert_eq!(registry.session_count().await, 2);
        assert_eq!(registry.session_of(&pid(4)).await, Some(overflow));
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_join_rejected() {
        let (registry, _) = start();
        registry.join(pid(1), "a".into()).await.unwrap();
        let err = registry.join(pid(1), "a".into()).await.unwrap_err();
        assert!(matches!(err, RegistryError::Session(SessionError::AlreadyInSession)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_leave_last_player_destroys_session() {
        let (registry, _) = start();
        let sid = registry.join(pid(1), "a".into()).await.unwrap().result.session_id;

        let outcome = registry.leave(&sid, &pid(1)).await.unwrap();
        assert_eq!(outcome.remaining, 0);
        assert_eq!(registry.session_count().await, 0);
        assert!(registry.session_of(&pid(1)).await.is_none());
        assert!(matches!(registry.snapshot(&sid).await, Err(RegistryError::SessionNotFound)));

        // Next join opens a fresh lobby.
        let next = registry.join(pid(2), "b".into()).await.unwrap().result.session_id;
        assert_ne!(next, sid);
    }

    #[tokio::test(start_paused = true)]
    async fn test_leave_errors() {
        let (registry, _) = start();
        let sid = registry.join(pid(1), "a".into()).await.unwrap().result.session_id;

        let err = registry.leave(&sid, &pid(2)).await.unwrap_err();
        assert!(matches!(err, RegistryError::PlayerNotInSession));
        let err = registry.leave(&SessionId::new([0; 16]), &pid(1)).await.unwrap_err();
        assert!(matches!(err, RegistryError::SessionNotFound));
    }

    #[tokio::test(start_paused = true)]
    async fn test_claim_unknown_session() {
        let (registry, _) = start();
        let err = registry.claim(&SessionId::new([0; 16]), &pid(1), &[]).await.unwrap_err();
        assert!(matches!(err, RegistryError::SessionNotFound));
    }

    #[tokio::test(start_paused = true)]
    async fn test_claim_from_non_member() {
        let (registry, _) = start();
        let sid = registry.join(pid(1), "a".into()).await.unwrap().result.session_id;
        registry.join(pid(2), "b".into()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;

        let result = registry.claim(&sid, &pid(9), &[]).await.unwrap();
        assert_eq!(result, ClaimResult::rejected(RejectReason::NotInSession));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_game_is_persisted_and_replaced() {
        let (registry, store) = start();
        let sid = registry.join(pid(1), "a".into()).await.unwrap().result.session_id;
        registry.join(pid(2), "b".into()).await.unwrap();

        // Countdown 5s, then 75 calls at 1s, then the exhausting tick.
        tokio::time::sleep(Duration::from_secs(5 + 76 + 1)).await;
        assert_eq!(
            registry.snapshot(&sid).await.unwrap().state,
            SessionState::Finished
        );

        // Players in a finished game may join elsewhere right away.
        let moved = registry.join(pid(1), "a".into()).await.unwrap().result.session_id;
        assert_ne!(moved, sid);

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(matches!(registry.snapshot(&sid).await, Err(RegistryError::SessionNotFound)));
        assert!(registry.session_of(&pid(2)).await.is_none());
        assert_eq!(registry.session_of(&pid(1)).await, Some(moved));
        // The lobby pid(1) moved into still has room, so no replacement.
        assert_eq!(registry.session_count().await, 1);

        let records = store.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].session_id, sid);
        assert!(records[0].winner.is_none());
        assert_eq!(records[0].call_history.len(), 75);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recycle_opens_replacement_only_when_full() {
        let (registry, _) = start();
        let sid = registry.join(pid(1), "a".into()).await.unwrap().result.session_id;
        for i in 2..=3 {
            registry.join(pid(i), format!("p{i}")).await.unwrap();
        }
        assert_eq!(registry.open_session_count().await, 0);

        registry.recycle(&sid).await;
        assert_eq!(registry.session_count().await, 1);
        assert_eq!(registry.open_session_count().await, 1);
        assert!(registry.session_of(&pid(1)).await.is_none());

        // A second recycle of an unknown id leaves the open lobby alone.
        registry.recycle(&sid).await;
        assert_eq!(registry.session_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_destroys_sessions() {
        let (registry, _) = start();
        let seat = registry.join(pid(1), "a".into()).await.unwrap();
        let handle = registry.session(&seat.result.session_id).await.unwrap();

        registry.shutdown().await;
        assert_eq!(registry.session_count().await, 0);
        assert_eq!(handle.lock().await.state(), SessionState::Recycled);
    }
}

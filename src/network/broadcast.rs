//! Session Broadcaster
//!
//! Fans accepted mutations out to every listener of one session. New or
//! returning listeners get a full snapshot together with a receiver
//! positioned right after it, so they never replay history themselves.

use tokio::sync::broadcast;

use crate::game::events::GameEvent;
use crate::game::state::SessionId;
use crate::network::protocol::{SessionEvent, SessionUpdate};

/// A listener's view: current state plus every event after it.
#[derive(Debug)]
pub struct Subscription {
    /// State at subscription time.
    pub snapshot: SessionUpdate,
    /// Events published after the snapshot.
    pub events: broadcast::Receiver<SessionEvent>,
}

/// Per-session publisher.
#[derive(Debug)]
pub struct Broadcaster {
    session_id: SessionId,
    tx: broadcast::Sender<SessionEvent>,
    seq: u64,
}

impl Broadcaster {
    /// Create a broadcaster with the given channel depth.
    pub fn new(session_id: SessionId, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { session_id, tx, seq: 0 }
    }

    /// Publish an event. Returns how many listeners received it.
    ///
    /// Must be called while the owning session is locked so that sequence
    /// numbers and snapshots stay consistent.
    pub fn publish(&mut self, event: GameEvent, update: SessionUpdate) -> usize {
        self.seq += 1;
        let message = SessionEvent {
            session_id: self.session_id,
            seq: self.seq,
            event,
            update,
        };
        // No listeners is not an error.
        self.tx.send(message).unwrap_or(0)
    }

    /// Register a listener.
    ///
    /// `snapshot` must describe the state after the last published event.
    pub fn subscribe(&self, snapshot: SessionUpdate) -> Subscription {
        Subscription {
            snapshot,
            events: self.tx.subscribe(),
        }
    }

    /// Sequence number of the last published event.
    pub fn last_seq(&self) -> u64 {
        self.seq
    }

    /// Listeners currently attached.
    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

//! Result Persistence
//!
//! Finished games are handed to a [`ResultStore`] after the session lock is
//! released. Writes are fire-and-forget from the engine's point of view: a
//! failure is logged by the caller and never touches game state.

use std::path::PathBuf;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

use crate::game::state::{SessionId, Winner};
use crate::network::protocol::PlayerSummary;

/// Completed-game record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRecord {
    /// Session identifier.
    pub session_id: SessionId,
    /// Winner, or `None` when all 75 numbers went unclaimed.
    pub winner: Option<Winner>,
    /// Players seated at the end.
    pub players: Vec<PlayerSummary>,
    /// Full call history.
    pub call_history: Vec<u8>,
    /// When calling began.
    pub started_at: Option<DateTime<Utc>>,
    /// When the game ended.
    pub finished_at: DateTime<Utc>,
}

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Record could not be encoded.
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Persistence collaborator.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Persist one finished game.
    async fn record_result(&self, record: &GameRecord) -> Result<(), StoreError>;
}

/// Keeps records in process memory.
#[derive(Debug, Default)]
pub struct MemoryResultStore {
    records: RwLock<Vec<GameRecord>>,
}

impl MemoryResultStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far.
    pub async fn records(&self) -> Vec<GameRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn record_result(&self, record: &GameRecord) -> Result<(), StoreError> {
        self.records.write().await.push(record.clone());
        Ok(())
    }
}

/// Appends one JSON document per line to a file.
#[derive(Debug)]
pub struct JsonLinesStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonLinesStore {
    /// Store writing to `path` (created on first write).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl ResultStore for JsonLinesStore {
    async fn record_result(&self, record: &GameRecord) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::PlayerId;
    use crate::game::validator::{PatternKind, WinLine};

    fn record(winner: bool) -> GameRecord {
        GameRecord {
            session_id: SessionId::new([4; 16]),
            winner: winner.then(|| Winner {
                player_id: PlayerId::new([1; 16]),
                display_name: "Ada".into(),
                line: WinLine { kind: PatternKind::Column, index: 3 },
                calls: 31,
            }),
            players: vec![PlayerSummary { id: PlayerId::new([1; 16]), name: "Ada".into() }],
            call_history: vec![4, 8, 15, 16, 23, 42],
            started_at: None,
            finished_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryResultStore::new();
        store.record_result(&record(true)).await.unwrap();
        store.record_result(&record(false)).await.unwrap();

        let records = store.records().await;
        assert_eq!(records.len(), 2);
        assert!(records[0].winner.is_some());
        assert!(records[1].winner.is_none());
    }

    #[tokio::test]
    async fn test_json_lines_store_appends() {
        let path = std::env::temp_dir().join(format!("bingo-results-{}.jsonl", uuid::Uuid::new_v4()));
        let store = JsonLinesStore::new(path.clone());

        store.record_result(&record(true)).await.unwrap();
        store.record_result(&record(false)).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: GameRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.winner.unwrap().line.kind, PatternKind::Column);
        let second: GameRecord = serde_json::from_str(lines[1]).unwrap();
        assert!(second.winner.is_none());

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn test_json_lines_store_reports_io_failure() {
        let store = JsonLinesStore::new("/nonexistent-dir/for/sure/results.jsonl");
        let err = store.record_result(&record(false)).await.unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
    }
}

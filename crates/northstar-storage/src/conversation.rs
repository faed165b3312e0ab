//! Conversation store implementations.
//!
//! `SqliteConversationStore` persists turns in the `conversation_turns` table
//! and appends each batch inside one transaction. `MemoryConversationStore`
//! keeps everything in a map and is used for ephemeral runs and tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use tracing::debug;

use northstar_core::error::{CapabilityError, NorthstarError};
use northstar_core::types::{turns_strictly_ordered, Role, Turn};
use northstar_core::ConversationStore;

use crate::db::Database;

/// Reject a batch that is internally unordered or starts at or before `last`.
fn check_append(last: Option<DateTime<Utc>>, turns: &[Turn]) -> Result<(), CapabilityError> {
    if !turns_strictly_ordered(turns) {
        return Err(CapabilityError::Rejected(
            "turns are not strictly timestamp-ordered".to_string(),
        ));
    }
    if let (Some(last), Some(first)) = (last, turns.first()) {
        if first.timestamp <= last {
            return Err(CapabilityError::Rejected(format!(
                "turn at {} is not after stored turn at {}",
                first.timestamp.to_rfc3339(),
                last.to_rfc3339()
            )));
        }
    }
    Ok(())
}

fn storage_err(e: rusqlite::Error) -> NorthstarError {
    NorthstarError::Storage(e.to_string())
}

// =============================================================================
// SQLite
// =============================================================================

/// SQLite-backed conversation store.
#[derive(Debug, Clone)]
pub struct SqliteConversationStore {
    db: Arc<Database>,
}

impl SqliteConversationStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    fn load_turns(db: &Database, session_id: &str) -> Result<Vec<Turn>, CapabilityError> {
        let turns = db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT role, text, timestamp_us FROM conversation_turns
                     WHERE session_id = ?1 ORDER BY seq",
                )
                .map_err(storage_err)?;
            let rows = stmt
                .query_map(params![session_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                })
                .map_err(storage_err)?;

            let mut turns = Vec::new();
            for row in rows {
                let (role, text, micros) = row.map_err(storage_err)?;
                let role = Role::parse(&role).ok_or_else(|| {
                    NorthstarError::Storage(format!("unknown role in history: {}", role))
                })?;
                let timestamp = DateTime::from_timestamp_micros(micros).ok_or_else(|| {
                    NorthstarError::Storage(format!("invalid timestamp in history: {}", micros))
                })?;
                turns.push(Turn {
                    role,
                    text,
                    timestamp,
                });
            }
            Ok(turns)
        })?;
        Ok(turns)
    }

    fn append_turns(db: &Database, session_id: &str, turns: &[Turn]) -> Result<(), CapabilityError> {
        let outcome = db.with_conn(|conn| {
            let tx = conn.unchecked_transaction().map_err(storage_err)?;

            let last: Option<(i64, i64)> = tx
                .query_row(
                    "SELECT seq, timestamp_us FROM conversation_turns
                     WHERE session_id = ?1 ORDER BY seq DESC LIMIT 1",
                    params![session_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .map_err(storage_err)?;

            let last_ts = last.and_then(|(_, us)| DateTime::from_timestamp_micros(us));
            if let Err(e) = check_append(last_ts, turns) {
                return Ok(Err(e));
            }

            let mut seq = last.map(|(s, _)| s + 1).unwrap_or(0);
            for turn in turns {
                tx.execute(
                    "INSERT INTO conversation_turns (session_id, seq, role, text, timestamp_us)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        session_id,
                        seq,
                        turn.role.as_str(),
                        turn.text,
                        turn.timestamp.timestamp_micros()
                    ],
                )
                .map_err(storage_err)?;
                seq += 1;
            }

            tx.commit().map_err(storage_err)?;
            Ok(Ok(()))
        })?;
        outcome
    }
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn get(&self, session_id: &str) -> Result<Vec<Turn>, CapabilityError> {
        let db = Arc::clone(&self.db);
        let session_id = session_id.to_string();
        tokio::task::spawn_blocking(move || Self::load_turns(&db, &session_id))
            .await
            .map_err(|e| CapabilityError::Unavailable(format!("history task failed: {}", e)))?
    }

    async fn put(&self, session_id: &str, turns: &[Turn]) -> Result<(), CapabilityError> {
        if turns.is_empty() {
            return Ok(());
        }
        let db = Arc::clone(&self.db);
        let session_id = session_id.to_string();
        let turns = turns.to_vec();
        let count = turns.len();
        tokio::task::spawn_blocking(move || Self::append_turns(&db, &session_id, &turns))
            .await
            .map_err(|e| CapabilityError::Unavailable(format!("history task failed: {}", e)))??;
        debug!(turns = count, "Conversation turns persisted");
        Ok(())
    }
}

// =============================================================================
// In-memory
// =============================================================================

/// Process-local conversation store.
#[derive(Debug, Default)]
pub struct MemoryConversationStore {
    sessions: Mutex<HashMap<String, Vec<Turn>>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions with at least one stored turn.
    pub fn session_count(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn get(&self, session_id: &str) -> Result<Vec<Turn>, CapabilityError> {
        let sessions = self
            .sessions
            .lock()
            .map_err(|e| CapabilityError::Unavailable(format!("store lock poisoned: {}", e)))?;
        Ok(sessions.get(session_id).cloned().unwrap_or_default())
    }

    async fn put(&self, session_id: &str, turns: &[Turn]) -> Result<(), CapabilityError> {
        if turns.is_empty() {
            return Ok(());
        }
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|e| CapabilityError::Unavailable(format!("store lock poisoned: {}", e)))?;
        let last = sessions
            .get(session_id)
            .and_then(|t| t.last())
            .map(|t| t.timestamp);
        check_append(last, turns)?;
        sessions
            .entry(session_id.to_string())
            .or_default()
            .extend_from_slice(turns);
        Ok(())
    }
}

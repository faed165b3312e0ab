//! Schema migration system.
//!
//! Migrations are tracked in the `schema_migrations` table and applied in
//! order. Each migration is idempotent (using IF NOT EXISTS).

use rusqlite::Connection;
use tracing::info;

use northstar_core::error::NorthstarError;

/// Run all pending migrations on the given connection.
pub fn run_migrations(conn: &Connection) -> Result<(), NorthstarError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| NorthstarError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| NorthstarError::Storage(format!("Failed to get migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
    }

    Ok(())
}

/// V1: conversation turns keyed by session and per-session sequence number.
fn apply_v1(conn: &Connection) -> Result<(), NorthstarError> {
    info!("Applying migration v1: conversation_turns");

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS conversation_turns (
            session_id TEXT NOT NULL,
            seq INTEGER NOT NULL,
            role TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
            text TEXT NOT NULL,
            timestamp_us INTEGER NOT NULL,
            PRIMARY KEY (session_id, seq)
        );

        CREATE INDEX IF NOT EXISTS idx_turns_session_time
            ON conversation_turns(session_id, timestamp_us);

        INSERT OR IGNORE INTO schema_migrations (version, name) VALUES (1, 'conversation_turns');",
    )
    .map_err(|e| NorthstarError::Storage(format!("Migration v1 failed: {}", e)))?;

    Ok(())
}

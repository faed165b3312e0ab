//! NorthStar Storage crate - SQLite conversation history and record stores.
//!
//! Provides a WAL-mode SQLite database with migrations, the conversation
//! store implementations used by the session manager, and structured record
//! stores backed by a data directory or an in-memory map.

pub mod conversation;
pub mod db;
pub mod migrations;
pub mod records;

pub use conversation::{MemoryConversationStore, SqliteConversationStore};
pub use db::Database;
pub use records::{FileRecordStore, MemoryRecordStore};

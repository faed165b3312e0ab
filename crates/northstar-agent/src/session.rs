//! Session identity and conversation persistence.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use northstar_core::error::CapabilityError;
use northstar_core::types::{next_timestamp, Conversation, Turn};
use northstar_core::ConversationStore;

use crate::error::AgentError;

/// Maximum accepted length of a caller-supplied session id.
pub const MAX_SESSION_ID_CHARS: usize = 128;

pub struct SessionManager {
    store: Arc<dyn ConversationStore>,
    persist_timeout: Duration,
}

impl SessionManager {
    pub fn new(store: Arc<dyn ConversationStore>, persist_timeout_ms: u64) -> Self {
        Self {
            store,
            persist_timeout: Duration::from_millis(persist_timeout_ms),
        }
    }

    /// Use the caller's id, or mint a fresh UUID v4 when it is absent or blank.
    pub fn resolve_session_id(requested: Option<&str>) -> Result<String, AgentError> {
        let id = match requested.map(str::trim) {
            None | Some("") => return Ok(Uuid::new_v4().to_string()),
            Some(id) => id,
        };

        if id.chars().count() > MAX_SESSION_ID_CHARS {
            return Err(AgentError::MalformedRequest(format!(
                "session_id exceeds {} characters",
                MAX_SESSION_ID_CHARS
            )));
        }
        if id.chars().any(char::is_control) {
            return Err(AgentError::MalformedRequest(
                "session_id contains control characters".to_string(),
            ));
        }
        Ok(id.to_string())
    }

    /// Load a conversation. Store failures degrade to an empty history.
    pub async fn load(&self, session_id: &str) -> Conversation {
        match tokio::time::timeout(self.persist_timeout, self.store.get(session_id)).await {
            Ok(Ok(turns)) => {
                debug!(session_id, turns = turns.len(), "Conversation loaded");
                Conversation {
                    session_id: session_id.to_string(),
                    turns,
                }
            }
            Ok(Err(e)) => {
                warn!(session_id, error = %e, "Conversation load failed, continuing without history");
                Conversation::empty(session_id)
            }
            Err(_) => {
                warn!(
                    session_id,
                    error = %self.timed_out(),
                    "Conversation load failed, continuing without history"
                );
                Conversation::empty(session_id)
            }
        }
    }

    /// The user/assistant pair for this exchange, timestamped after the
    /// conversation's last turn.
    pub fn new_turns(conversation: &Conversation, user_text: &str, answer_text: &str) -> (Turn, Turn) {
        let now = truncate_to_micros(Utc::now());
        let user_ts = next_timestamp(conversation.last_timestamp(), now);
        let assistant_ts = next_timestamp(Some(user_ts), now);
        (
            Turn::user(user_text, user_ts),
            Turn::assistant(answer_text, assistant_ts),
        )
    }

    /// Append both turns in one store write. On success returns the
    /// conversation including the new pair.
    pub async fn append(
        &self,
        mut conversation: Conversation,
        user: Turn,
        assistant: Turn,
    ) -> Result<Conversation, AgentError> {
        let pair = [user, assistant];
        let session_id = conversation.session_id.clone();

        match tokio::time::timeout(self.persist_timeout, self.store.put(&session_id, &pair)).await {
            Ok(Ok(())) => {
                conversation.turns.extend(pair);
                Ok(conversation)
            }
            Ok(Err(e)) => Err(AgentError::PersistenceFailure(e.to_string())),
            Err(_) => Err(AgentError::PersistenceFailure(self.timed_out().to_string())),
        }
    }

    /// Full stored history for a session.
    pub async fn history(&self, session_id: &str) -> Result<Vec<Turn>, AgentError> {
        tokio::time::timeout(self.persist_timeout, self.store.get(session_id))
            .await
            .map_err(|_| AgentError::PersistenceFailure(self.timed_out().to_string()))?
            .map_err(|e| AgentError::PersistenceFailure(e.to_string()))
    }

    fn timed_out(&self) -> CapabilityError {
        CapabilityError::Timeout(self.persist_timeout.as_millis() as u64)
    }
}

/// Stored timestamps keep microsecond precision.
fn truncate_to_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(ts.timestamp_micros()).unwrap_or(ts)
}

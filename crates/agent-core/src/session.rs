//! Session Management
//!
//! The explicit state object for one interactive chat: conversation
//! history plus identity and bookkeeping. The REPL owns it and hands it to
//! [`Agent::run_turn`](crate::Agent::run_turn) by `&mut`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::Conversation;

/// Unique session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// History length to roll back to if a turn is abandoned
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Checkpoint(usize);

/// A complete agent session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier
    pub id: SessionId,

    /// Conversation history, system prompt first
    pub conversation: Conversation,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last activity timestamp
    pub updated_at: DateTime<Utc>,

    /// Completed turns since creation or the last reset
    turns: usize,
}

impl Session {
    /// Create a session whose history starts with `system_prompt`
    pub fn new(system_prompt: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            conversation: Conversation::with_system_prompt(system_prompt),
            created_at: now,
            updated_at: now,
            turns: 0,
        }
    }

    /// Update the activity timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Forget everything but the system prompt
    pub fn reset(&mut self) {
        self.conversation.clear_history();
        self.turns = 0;
        self.touch();
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.conversation.messages().len())
    }

    /// Discard every message added since `checkpoint`
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        self.conversation.truncate(checkpoint.0);
    }

    pub fn record_turn(&mut self) {
        self.turns += 1;
        self.touch();
    }

    pub const fn turns(&self) -> usize {
        self.turns
    }

    /// Message count
    pub fn message_count(&self) -> usize {
        self.conversation.messages().len()
    }
}

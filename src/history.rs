//! Per-session conversation history, kept in memory.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::llm::ChatMessage;

/// Append-only transcript per session id.
///
/// `max_messages` bounds how many of the most recent messages
/// [`get`](Self::get) returns; `0` returns everything. Stored history is
/// never truncated.
#[derive(Debug, Default)]
pub struct ConversationHistory {
    sessions: Mutex<HashMap<String, Vec<ChatMessage>>>,
    max_messages: usize,
}

impl ConversationHistory {
    pub fn new(max_messages: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_messages,
        }
    }

    pub fn append(&self, session_id: &str, message: ChatMessage) {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(session_id.to_string())
            .or_default()
            .push(message);
    }

    /// The session's messages, oldest first, limited to the window.
    pub fn get(&self, session_id: &str) -> Vec<ChatMessage> {
        let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(messages) = sessions.get(session_id) else {
            return Vec::new();
        };
        let skip = match self.max_messages {
            0 => 0,
            n => messages.len().saturating_sub(n),
        };
        messages[skip..].to_vec()
    }

    /// Forget a session. Returns whether it existed.
    pub fn clear(&self, session_id: &str) -> bool {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id)
            .is_some()
    }
}

//! Chat messages and the bounded message log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Most recent entries kept in a [`MessageLog`]
pub const MAX_LOG_ENTRIES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Agent,
    System,
}

/// A single chat message.
///
/// `id` is empty only while an agent message is still streaming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender: Sender,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Optimistic echo of a user submission, with a locally synthesized id
    pub fn local_user(content: impl Into<String>) -> Self {
        Self {
            id: format!("temp-{}", uuid::Uuid::new_v4()),
            sender: Sender::User,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    /// Agent message whose content is still arriving
    pub fn streaming_agent(content: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            sender: Sender::Agent,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.sender == Sender::Agent && self.id.is_empty()
    }
}

/// Fallback id for a finished agent message the server did not name
pub fn synthesize_message_id() -> String {
    format!("msg-{}", uuid::Uuid::new_v4())
}

/// Ordered conversation log holding the most recent [`MAX_LOG_ENTRIES`]
/// messages, with an explicit handle on the message being streamed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessageLog {
    entries: Vec<Message>,
    /// Index of the in-progress agent message
    streaming: Option<usize>,
}

impl MessageLog {
    pub fn entries(&self) -> &[Message] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.entries.last()
    }

    pub fn streaming(&self) -> Option<&Message> {
        self.streaming.and_then(|idx| self.entries.get(idx))
    }

    /// Put fetched history in front of whatever was appended locally since
    /// the session was activated. On a fresh session this is a replace.
    pub fn load_history(&mut self, history: Vec<Message>) {
        let offset = history.len();
        let local = std::mem::replace(&mut self.entries, history);
        self.entries.extend(local);
        self.streaming = self.streaming.map(|idx| idx + offset);
        self.enforce_bound();
    }

    pub fn push(&mut self, message: Message) {
        self.entries.push(message);
        self.enforce_bound();
    }

    /// Append streamed text to the in-progress agent message, starting one
    /// if none is open
    pub fn append_chunk(&mut self, content: &str) {
        if let Some(message) = self.streaming.and_then(|idx| self.entries.get_mut(idx)) {
            message.content.push_str(content);
            return;
        }
        self.entries.push(Message::streaming_agent(content));
        self.streaming = Some(self.entries.len() - 1);
        self.enforce_bound();
    }

    /// Give the in-progress message its id. Returns false when nothing was
    /// streaming.
    pub fn finalize_streaming(&mut self, id: String) -> bool {
        match self.streaming.take().and_then(|idx| self.entries.get_mut(idx)) {
            Some(message) => {
                message.id = id;
                true
            }
            None => false,
        }
    }

    fn enforce_bound(&mut self) {
        let excess = self.entries.len().saturating_sub(MAX_LOG_ENTRIES);
        if excess == 0 {
            return;
        }
        self.entries.drain(..excess);
        self.streaming = self.streaming.and_then(|idx| idx.checked_sub(excess));
    }
}

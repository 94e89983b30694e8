//! Wire frames exchanged over the chat channel
//!
//! Inbound: one JSON object per text frame, tagged by `type`.
//! Outbound: `{"type":"message","content":...}` only.

use serde::{Deserialize, Serialize};

/// Events streamed by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Incremental text for the in-progress agent message
    Chunk { content: String },
    /// Stream complete
    Done {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    /// Server-side failure
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

impl ServerEvent {
    /// Decode a text frame. Malformed or unknown frames are logged and yield `None`
    /// so a newer backend can never crash the client.
    pub fn parse(text: &str) -> Option<Self> {
        match serde_json::from_str(text) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::warn!(error = %e, frame_len = text.len(), "Ignoring undecodable frame");
                None
            }
        }
    }
}

/// Frames sent by the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Message { content: String },
}

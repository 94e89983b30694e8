//! Events that can occur in a conversation

use super::message::Message;
use crate::transport::ServerEvent;

/// Events that trigger state transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    // User events
    Submit { text: String },
    DismissBanner,

    // Session lifecycle
    /// The view switched sessions; drop everything from the previous one
    Reset,
    HistoryLoaded { messages: Vec<Message> },
    HistoryFailed { message: String },

    // Server frames
    Chunk { content: String },
    Done { message_id: Option<String> },
    ServerError {
        code: Option<String>,
        detail: Option<String>,
    },

    // Transport events
    SendFailed { reason: String },
    ChannelOpened,
    ChannelLost,
    ReconnectFailed,

    // Timers
    LatencyTimeout { seq: u64 },
}

impl From<ServerEvent> for Event {
    fn from(event: ServerEvent) -> Self {
        match event {
            ServerEvent::Chunk { content } => Event::Chunk { content },
            ServerEvent::Done { message_id } => Event::Done { message_id },
            ServerEvent::Error { code, detail } => Event::ServerError { code, detail },
        }
    }
}

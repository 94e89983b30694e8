//! Conversation state types

use super::message::MessageLog;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Single-flight status of the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvStatus {
    /// Ready for user input
    #[default]
    Idle,
    /// Message sent, no reply text yet
    Sending,
    /// Reply text is arriving
    Streaming,
}

impl ConvStatus {
    pub fn is_busy(self) -> bool {
        !matches!(self, ConvStatus::Idle)
    }
}

/// Conversation state owned by the runtime
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConvState {
    pub status: ConvStatus,
    pub log: MessageLog,
    pub latency_warning: bool,
    /// Sequence number of the armed latency timer
    pub armed_timer: Option<u64>,
    /// Monotonic submit counter; survives session resets so old timers never match
    pub submit_seq: u64,
    /// Inline error shown next to the input
    pub error: Option<String>,
    /// Transient notice, cleared by the UI once shown
    pub banner: Option<String>,
    pub load_error: Option<String>,
    /// The backend no longer knows this session; a new one is needed
    pub session_expired: bool,
}

impl ConvState {
    /// Whether the typing indicator should be shown
    pub fn is_typing(&self) -> bool {
        self.status == ConvStatus::Streaming
    }
}

/// Immutable configuration for a conversation
#[derive(Debug, Clone)]
pub struct ConvContext {
    /// How long to wait for the first chunk before warning about latency
    pub latency_grace: Duration,
}

pub const DEFAULT_LATENCY_GRACE: Duration = Duration::from_millis(2500);

impl Default for ConvContext {
    fn default() -> Self {
        Self {
            latency_grace: DEFAULT_LATENCY_GRACE,
        }
    }
}

//! Effects produced by state transitions

use std::time::Duration;

/// Effects to be executed after a state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Transmit the user's text over the channel
    SendFrame { text: String },

    /// Fire `Event::LatencyTimeout { seq }` after `delay`
    ArmLatencyTimer { delay: Duration, seq: u64 },

    /// Drop any pending latency timer
    DisarmLatencyTimer,
}

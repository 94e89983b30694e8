//! Session runtime
//!
//! Owns the conversation state for the active session, feeds it events from
//! the user, the transport and timers, and publishes a [`ChatView`] after
//! every change.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::{ChatHandle, ChatRuntime, ChatView, RuntimeError};
pub use traits::{HistoryError, HistorySource};

use crate::config::ChatConfig;
use crate::conversation::ConvContext;
use crate::transport::{Connector, TransportManager};

/// Spawn a transport manager and a session runtime wired to it
pub fn start<C, H>(config: &ChatConfig, connector: C, history: H) -> ChatHandle
where
    C: Connector,
    H: HistorySource + 'static,
{
    let (transport, notices) = TransportManager::spawn(connector, config.reconnect);
    let context = ConvContext {
        latency_grace: config.latency_grace,
    };
    ChatRuntime::spawn(context, transport, notices, history)
}

//! Duplex chat channel management
//!
//! A [`TransportManager`] owns at most one channel at a time, addressed by a
//! chat session id. It hides reconnection from callers and delivers decoded
//! server frames as [`TransportNotice`]s. Sockets are reached through the
//! [`Connector`] port so the manager can be driven by mocks in tests.

mod backoff;
mod frame;
pub mod link;
mod manager;
mod websocket;

pub use backoff::ReconnectPolicy;
pub use frame::{ClientFrame, ServerEvent};
pub use link::{LinkState, NoticeKind, TransportSnapshot};
pub use manager::{TransportHandle, TransportManager, TransportNotice};
pub use websocket::WsConnector;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Transport-level failures. None of these are fatal to a session.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Not connected to the chat server")]
    NotOpen,
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("Failed to send message: {0}")]
    Send(String),
    #[error("Connection error: {0}")]
    Receive(String),
    #[error("Invalid chat endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("Failed to encode frame: {0}")]
    Encode(String),
    #[error("Transport has shut down")]
    Shutdown,
}

/// Outbound half of an established channel
#[async_trait]
pub trait FrameSink: Send {
    /// Transmit one text frame
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Close the channel. Errors are swallowed; the channel is gone either way.
    async fn close(&mut self);
}

/// Inbound half of an established channel
#[async_trait]
pub trait FrameSource: Send {
    /// Next text frame. `None` once the peer has closed the channel.
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>>;
}

/// An established channel, split so reads and writes never contend
pub struct Connection {
    pub sink: Box<dyn FrameSink>,
    pub source: Box<dyn FrameSource>,
}

/// Opens channels addressed by session id
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, session_id: &str) -> Result<Connection, TransportError>;
}

#[async_trait]
impl<T: Connector + ?Sized> Connector for Arc<T> {
    async fn connect(&self, session_id: &str) -> Result<Connection, TransportError> {
        (**self).connect(session_id).await
    }
}

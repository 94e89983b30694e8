//! Mock implementations for testing
//!
//! These mocks enable driving the transport and the runtime without sockets
//! or HTTP.

use super::traits::{HistoryError, HistorySource};
use crate::conversation::Message;
use crate::transport::{Connection, Connector, FrameSink, FrameSource, TransportError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

// ============================================================================
// Mock Connector
// ============================================================================

/// Connector that hands out in-memory channels, one [`MockPeer`] per
/// successful connect
#[derive(Default)]
pub struct MockConnector {
    state: Mutex<ConnectorState>,
}

#[derive(Default)]
struct ConnectorState {
    refuse: u32,
    peers: Vec<MockPeer>,
    sessions: Vec<String>,
    attempts: Vec<Instant>,
}

#[allow(dead_code)]
impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` connect attempts
    pub fn refuse_next(&self, n: u32) {
        self.state.lock().unwrap().refuse = n;
    }

    /// Server side of the `index`th successful connection
    pub fn peer(&self, index: usize) -> MockPeer {
        self.state.lock().unwrap().peers[index].clone()
    }

    pub fn connect_count(&self) -> usize {
        self.state.lock().unwrap().attempts.len()
    }

    /// When each connect attempt happened, successful or not
    pub fn connect_times(&self) -> Vec<Instant> {
        self.state.lock().unwrap().attempts.clone()
    }

    /// Session ids of successful connections, in order
    pub fn sessions(&self) -> Vec<String> {
        self.state.lock().unwrap().sessions.clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, session_id: &str) -> Result<Connection, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.attempts.push(Instant::now());
        if state.refuse > 0 {
            state.refuse -= 1;
            return Err(TransportError::Connect("connection refused".to_string()));
        }

        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let peer = MockPeer {
            frames: frames_tx,
            sent: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
        };
        state.peers.push(peer.clone());
        state.sessions.push(session_id.to_string());

        Ok(Connection {
            sink: Box::new(MockSink {
                sent: peer.sent.clone(),
                closed: peer.closed.clone(),
            }),
            source: Box::new(MockSource { frames: frames_rx }),
        })
    }
}

enum PeerFrame {
    Text(String),
    Fail(String),
    HangUp,
}

/// Server end of a mock connection
#[derive(Clone)]
pub struct MockPeer {
    frames: mpsc::UnboundedSender<PeerFrame>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

#[allow(dead_code)]
impl MockPeer {
    /// Deliver a text frame to the client
    pub fn push_text(&self, text: &str) {
        let _ = self.frames.send(PeerFrame::Text(text.to_string()));
    }

    /// Break the connection with a read error
    pub fn fail(&self, reason: &str) {
        let _ = self.frames.send(PeerFrame::Fail(reason.to_string()));
    }

    /// Close the connection from the server side
    pub fn hang_up(&self) {
        let _ = self.frames.send(PeerFrame::HangUp);
    }

    /// Frames the client sent, oldest first
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    /// Whether the client closed its end
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct MockSink {
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl FrameSink for MockSink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Send("socket closed".to_string()));
        }
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

struct MockSource {
    frames: mpsc::UnboundedReceiver<PeerFrame>,
}

#[async_trait]
impl FrameSource for MockSource {
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        match self.frames.recv().await? {
            PeerFrame::Text(text) => Some(Ok(text)),
            PeerFrame::Fail(reason) => Some(Err(TransportError::Receive(reason))),
            PeerFrame::HangUp => None,
        }
    }
}

// ============================================================================
// Mock History
// ============================================================================

/// History source with canned per-session responses and optional delays.
/// Unknown sessions have no history.
#[derive(Default)]
pub struct MockHistory {
    responses: Mutex<HashMap<String, Result<Vec<Message>, HistoryError>>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl MockHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, session_id: &str, messages: Vec<Message>) {
        self.responses
            .lock()
            .unwrap()
            .insert(session_id.to_string(), Ok(messages));
    }

    pub fn fail(&self, session_id: &str, error: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(session_id.to_string(), Err(HistoryError::Failed(error.to_string())));
    }

    /// Answer as if the backend had forgotten the session
    pub fn forget(&self, session_id: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(session_id.to_string(), Err(HistoryError::SessionNotFound));
    }

    pub fn delay(&self, session_id: &str, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert(session_id.to_string(), delay);
    }

    /// Sessions fetched so far, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl HistorySource for MockHistory {
    async fn fetch_history(&self, session_id: &str) -> Result<Vec<Message>, HistoryError> {
        self.calls.lock().unwrap().push(session_id.to_string());
        let delay = self.delays.lock().unwrap().get(session_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

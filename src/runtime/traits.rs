//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the runtime with mock implementations.

use crate::conversation::Message;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HistoryError {
    /// The backend does not know the session
    #[error("Session not found")]
    SessionNotFound,
    #[error("{0}")]
    Failed(String),
}

/// Source of a session's stored messages
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Messages already exchanged in the session, oldest first
    async fn fetch_history(&self, session_id: &str) -> Result<Vec<Message>, HistoryError>;
}

#[async_trait]
impl<T: HistorySource + ?Sized> HistorySource for Arc<T> {
    async fn fetch_history(&self, session_id: &str) -> Result<Vec<Message>, HistoryError> {
        (**self).fetch_history(session_id).await
    }
}

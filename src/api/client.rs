//! REST client for chat sessions and their history

use super::types::{ChatMessageRecord, ChatSession, CreateSessionRequest};
use crate::conversation::Message;
use crate::runtime::{HistoryError, HistorySource};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid API address: {0}")]
    InvalidEndpoint(String),
    #[error("Request failed: {0}")]
    Network(String),
    #[error("HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("Failed to parse response: {0}")]
    Decode(String),
}

#[derive(Debug, Clone)]
pub struct ReportApi {
    client: Client,
    base: Url,
    user_id: Option<String>,
}

impl ReportApi {
    pub fn new(base: &str, user_id: Option<String>) -> Result<Self, ApiError> {
        let base = Url::parse(base).map_err(|e| ApiError::InvalidEndpoint(format!("{base}: {e}")))?;
        if !matches!(base.scheme(), "http" | "https") || base.cannot_be_a_base() {
            return Err(ApiError::InvalidEndpoint(base.to_string()));
        }
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base,
            user_id,
        })
    }

    /// Start a chat session for a report
    pub async fn create_session(&self, insight_id: &str) -> Result<ChatSession, ApiError> {
        let url = self.endpoint(&["chat", "sessions"])?;
        tracing::debug!(insight_id, "Creating chat session");

        let request = self
            .client
            .post(url)
            .json(&CreateSessionRequest { insight_id });
        let session: ChatSession = self.execute(request).await?;

        tracing::info!(
            insight_id,
            session_id = %session.session_id,
            status = ?session.status,
            "Chat session created"
        );
        Ok(session)
    }

    /// Stored messages of a session, oldest first
    pub async fn fetch_messages(&self, session_id: &str) -> Result<Vec<ChatMessageRecord>, ApiError> {
        let url = self.endpoint(&["chat", "sessions", session_id, "messages"])?;
        self.execute(self.client.get(url)).await
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::InvalidEndpoint(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ApiError> {
        let request = match &self.user_id {
            Some(user_id) => request.header("X-User-Id", user_id),
            None => request,
        };

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::Network(format!("Request timeout: {e}"))
            } else if e.is_connect() {
                ApiError::Network(format!("Connection failed: {e}"))
            } else {
                ApiError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(ApiError::Status { status, body });
        }

        serde_json::from_str(&body).map_err(|e| ApiError::Decode(format!("{e} - body: {body}")))
    }
}

#[async_trait]
impl HistorySource for ReportApi {
    async fn fetch_history(&self, session_id: &str) -> Result<Vec<Message>, HistoryError> {
        let records = self.fetch_messages(session_id).await.map_err(|e| match e {
            ApiError::Status { status, .. } if status == StatusCode::NOT_FOUND => {
                HistoryError::SessionNotFound
            }
            other => HistoryError::Failed(other.to_string()),
        })?;
        Ok(records.into_iter().map(Message::from).collect())
    }
}

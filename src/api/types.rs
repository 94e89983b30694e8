//! Wire types for the chat REST endpoints

use crate::conversation::{Message, Sender};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Lifecycle of a chat session as reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Initiated,
    Conversing,
    Completed,
    Handover,
}

/// Request body for `POST /chat/sessions`
#[derive(Debug, Serialize)]
pub struct CreateSessionRequest<'a> {
    pub insight_id: &'a str,
}

/// A chat session bound to one report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSession {
    pub session_id: String,
    pub insight_id: String,
    pub user_id: String,
    pub status: SessionStatus,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub started_at: DateTime<Utc>,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub updated_at: DateTime<Utc>,
}

/// A stored message from `GET /chat/sessions/{id}/messages`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatMessageRecord {
    pub message_id: String,
    pub session_id: String,
    pub sender: Sender,
    pub content: String,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub created_at: DateTime<Utc>,
}

impl From<ChatMessageRecord> for Message {
    fn from(record: ChatMessageRecord) -> Self {
        Message {
            id: record.message_id,
            sender: record.sender,
            content: record.content,
            created_at: record.created_at,
        }
    }
}

/// Accept RFC 3339 timestamps, and offset-less ones (read as UTC)
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamps_with_and_without_offset() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2024-05-01T12:30:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01T14:30:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01T12:30:00"), Some(expected));
        assert!(parse_timestamp("2024-05-01T12:30:00.123456").is_some());
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_session_decodes() {
        let session: ChatSession = serde_json::from_str(
            r#"{
                "session_id": "s1",
                "insight_id": "ins-42",
                "user_id": "demo-user",
                "status": "Initiated",
                "started_at": "2024-05-01T12:30:00.5",
                "updated_at": "2024-05-01T12:30:00Z"
            }"#,
        )
        .unwrap();
        assert_eq!(session.session_id, "s1");
        assert_eq!(session.status, SessionStatus::Initiated);
    }

    #[test]
    fn test_record_becomes_message() {
        let record: ChatMessageRecord = serde_json::from_str(
            r#"{
                "message_id": "m1",
                "session_id": "s1",
                "sender": "agent",
                "content": "Revenue grew 12%.",
                "created_at": "2024-05-01T12:31:00"
            }"#,
        )
        .unwrap();
        let message = Message::from(record);
        assert_eq!(message.id, "m1");
        assert_eq!(message.sender, Sender::Agent);
        assert!(!message.is_streaming());
    }

    #[test]
    fn test_unknown_status_rejected() {
        let result = serde_json::from_str::<SessionStatus>(r#""Archived""#);
        assert!(result.is_err());
    }
}

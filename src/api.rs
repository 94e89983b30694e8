//! HTTP client for the report chat backend

mod client;
mod types;

pub use client::{ApiError, ReportApi};
pub use types::{ChatMessageRecord, ChatSession, SessionStatus};

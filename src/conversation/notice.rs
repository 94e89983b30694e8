//! User-facing text for failures

/// Error codes the backend attaches to `error` frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    CostLimit,
    LlmUnavailable,
    SessionNotFound,
    ReportNotFound,
}

impl ErrorCode {
    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "cost_limit" => Some(Self::CostLimit),
            "llm_unavailable" => Some(Self::LlmUnavailable),
            "session_not_found" => Some(Self::SessionNotFound),
            "report_not_found" => Some(Self::ReportNotFound),
            _ => None,
        }
    }

    pub fn user_message(self) -> &'static str {
        match self {
            Self::CostLimit => {
                "This question is over the usage limit. Please shorten it and try again."
            }
            Self::LlmUnavailable => {
                "The assistant is temporarily unavailable. Please try again in a moment."
            }
            Self::SessionNotFound => {
                "This chat session is no longer valid. Reload the report to start a new one."
            }
            Self::ReportNotFound => "The report for this chat could not be found.",
        }
    }
}

pub const GENERIC_FAILURE: &str = "Something went wrong while answering. Please try again.";

pub const CONNECTION_LOST: &str =
    "Connection lost while waiting for a reply. Please send your question again.";

pub const RECONNECT_FAILED: &str =
    "Could not reconnect to the chat server. Type /retry to try again.";

/// Map an `error` frame to the text shown to the user: known code first,
/// then the raw detail, then a generic message
pub fn describe_server_error(code: Option<&str>, detail: Option<&str>) -> String {
    if let Some(known) = code.and_then(ErrorCode::parse) {
        return known.user_message().to_string();
    }
    match detail.map(str::trim) {
        Some(detail) if !detail.is_empty() => detail.to_string(),
        _ => GENERIC_FAILURE.to_string(),
    }
}

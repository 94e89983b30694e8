//! Client configuration from the environment

use crate::conversation::state::DEFAULT_LATENCY_GRACE;
use crate::transport::ReconnectPolicy;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";
pub const DEFAULT_WS_URL: &str = "ws://localhost:8000/api/chat/ws";

#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Base of the REST endpoints (`REPORT_CHAT_API_URL`)
    pub api_url: String,
    /// Base of the streaming channel; the session id is appended (`REPORT_CHAT_WS_URL`)
    pub ws_url: String,
    /// Sent as `X-User-Id` when set (`REPORT_CHAT_USER_ID`)
    pub user_id: Option<String>,
    /// `REPORT_CHAT_LATENCY_MS`
    pub latency_grace: Duration,
    /// Where the session map lives (`REPORT_CHAT_STATE_DIR`)
    pub state_dir: PathBuf,
    pub reconnect: ReconnectPolicy,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            user_id: None,
            latency_grace: DEFAULT_LATENCY_GRACE,
            state_dir: default_state_dir(std::env::var("HOME").ok()),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl ChatConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let latency_grace = match get("REPORT_CHAT_LATENCY_MS") {
            Some(raw) => raw.trim().parse().map(Duration::from_millis).unwrap_or_else(|_| {
                tracing::warn!(value = %raw, "Invalid REPORT_CHAT_LATENCY_MS, using default");
                DEFAULT_LATENCY_GRACE
            }),
            None => DEFAULT_LATENCY_GRACE,
        };

        Self {
            api_url: get("REPORT_CHAT_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            ws_url: get("REPORT_CHAT_WS_URL").unwrap_or_else(|| DEFAULT_WS_URL.to_string()),
            user_id: get("REPORT_CHAT_USER_ID"),
            latency_grace,
            state_dir: get("REPORT_CHAT_STATE_DIR")
                .map_or_else(|| default_state_dir(get("HOME")), PathBuf::from),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

fn default_state_dir(home: Option<String>) -> PathBuf {
    let home = home.unwrap_or_else(|| "/tmp".to_string());
    PathBuf::from(home).join(".report-chat")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> ChatConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ChatConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("HOME", "/home/analyst")]);
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.ws_url, DEFAULT_WS_URL);
        assert_eq!(config.user_id, None);
        assert_eq!(config.latency_grace, Duration::from_millis(2500));
        assert_eq!(config.state_dir, PathBuf::from("/home/analyst/.report-chat"));
        assert_eq!(config.reconnect, ReconnectPolicy::default());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("REPORT_CHAT_API_URL", "https://reports.example.com/api"),
            ("REPORT_CHAT_WS_URL", "wss://reports.example.com/api/chat/ws"),
            ("REPORT_CHAT_USER_ID", "analyst-7"),
            ("REPORT_CHAT_LATENCY_MS", " 4000 "),
            ("REPORT_CHAT_STATE_DIR", "/var/lib/report-chat"),
        ]);
        assert_eq!(config.api_url, "https://reports.example.com/api");
        assert_eq!(config.ws_url, "wss://reports.example.com/api/chat/ws");
        assert_eq!(config.user_id.as_deref(), Some("analyst-7"));
        assert_eq!(config.latency_grace, Duration::from_millis(4000));
        assert_eq!(config.state_dir, PathBuf::from("/var/lib/report-chat"));
    }

    #[test]
    fn test_blank_and_invalid_values_fall_back() {
        let config = config_from(&[
            ("REPORT_CHAT_USER_ID", "  "),
            ("REPORT_CHAT_LATENCY_MS", "soon"),
        ]);
        assert_eq!(config.user_id, None);
        assert_eq!(config.latency_grace, DEFAULT_LATENCY_GRACE);
        assert_eq!(config.state_dir, PathBuf::from("/tmp/.report-chat"));
    }
}

//! Remembers which chat session belongs to which report
//!
//! The map is a small JSON file, rewritten through a temporary file and a
//! rename so a crash never leaves it half written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs::{self, File};
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

const FILE_NAME: &str = "sessions.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Session file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("Failed to create session: {0}")]
    Create(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    sessions: BTreeMap<String, StoredSession>,
}

#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
    data: StoreFile,
}

impl SessionStore {
    /// Load the store under `state_dir`, starting empty when there is no file yet
    pub fn open(state_dir: &Path) -> Result<Self, StoreError> {
        let path = state_dir.join(FILE_NAME);
        let data = match fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => StoreFile::default(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreFile::default(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(path = %path.display(), sessions = data.sessions.len(), "Opened session store");
        Ok(Self { path, data })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, insight_id: &str) -> Option<&StoredSession> {
        self.data.sessions.get(insight_id)
    }

    pub fn insert(&mut self, insight_id: &str, session_id: &str) -> Result<(), StoreError> {
        self.data.sessions.insert(
            insight_id.to_string(),
            StoredSession {
                session_id: session_id.to_string(),
                created_at: Utc::now(),
            },
        );
        self.save()
    }

    /// Forget a report's session. Returns whether one was stored.
    pub fn remove(&mut self, insight_id: &str) -> Result<bool, StoreError> {
        if self.data.sessions.remove(insight_id).is_none() {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    /// Session id for a report, creating and remembering one when none is
    /// stored yet
    pub async fn session_for<F, Fut, E>(
        &mut self,
        insight_id: &str,
        create: F,
    ) -> Result<String, StoreError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<String, E>>,
        E: Display,
    {
        if let Some(stored) = self.get(insight_id) {
            tracing::debug!(insight_id, session_id = %stored.session_id, "Reusing stored session");
            return Ok(stored.session_id.clone());
        }

        let session_id = create(insight_id.to_string())
            .await
            .map_err(|e| StoreError::Create(e.to_string()))?;
        self.insert(insight_id, &session_id)?;
        Ok(session_id)
    }

    /// Drop the stored session for a report and create a new one. The old id
    /// stays forgotten even when creating the new one fails.
    pub async fn renew<F, Fut, E>(&mut self, insight_id: &str, create: F) -> Result<String, StoreError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<String, E>>,
        E: Display,
    {
        if self.remove(insight_id)? {
            tracing::info!(insight_id, "Discarded expired chat session");
        }
        self.session_for(insight_id, create).await
    }

    fn save(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.data)?;

        let tmp_path = self.path.with_extension("json.tmp");
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

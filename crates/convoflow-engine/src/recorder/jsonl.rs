use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use convoflow_types::{ConvoflowError, Result, SessionId, StepRecord};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use super::StepRecorder;

/// One line of a session journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JournalEntry {
    SessionStarted {
        session_id: SessionId,
        timestamp: DateTime<Utc>,
    },
    Step(StepRecord),
    SessionEnded {
        session_id: SessionId,
        timestamp: DateTime<Utc>,
    },
}

/// Appends one JSON object per line to `<dir>/<session_id>.jsonl`.
///
/// Lines are written as they happen, so a crashed run still leaves every
/// step recorded up to that point.
pub struct JsonlRecorder {
    dir: PathBuf,
    /// Sessions started by this recorder, mapped to whether they are still open.
    sessions: Mutex<HashMap<SessionId, bool>>,
}

impl JsonlRecorder {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn session_path(&self, session_id: &SessionId) -> PathBuf {
        self.dir.join(format!("{session_id}.jsonl"))
    }

    async fn append(&self, session_id: &SessionId, entry: &JournalEntry) -> Result<()> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.session_path(session_id))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    fn sessions(&self) -> Result<std::sync::MutexGuard<'_, HashMap<SessionId, bool>>> {
        self.sessions
            .lock()
            .map_err(|_| ConvoflowError::StorageError("journal lock poisoned".into()))
    }

    /// Read a journal file back.
    pub async fn read_entries(path: &Path) -> Result<Vec<JournalEntry>> {
        let content = tokio::fs::read_to_string(path).await?;
        content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(ConvoflowError::from))
            .collect()
    }
}

#[async_trait]
impl StepRecorder for JsonlRecorder {
    async fn start_session(&self) -> Result<SessionId> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let session_id = SessionId::generate();
        self.append(
            &session_id,
            &JournalEntry::SessionStarted {
                session_id: session_id.clone(),
                timestamp: Utc::now(),
            },
        )
        .await?;
        self.sessions()?.insert(session_id.clone(), true);
        tracing::debug!(session = %session_id, path = %self.session_path(&session_id).display(), "Journal opened");
        Ok(session_id)
    }

    async fn log_step(&self, step: &StepRecord) -> Result<()> {
        let is_open = self.sessions()?.get(&step.session_id).copied().unwrap_or(false);
        if !is_open {
            return Err(ConvoflowError::StorageError(format!(
                "no open session {}",
                step.session_id
            )));
        }
        self.append(&step.session_id, &JournalEntry::Step(step.clone()))
            .await
    }

    async fn end_session(&self, session_id: &SessionId) -> Result<()> {
        let was_open = self.sessions()?.get_mut(session_id).map(|open| std::mem::replace(open, false));
        match was_open {
            Some(true) => {}
            Some(false) => {
                return Err(ConvoflowError::SessionAlreadyClosed {
                    session: session_id.to_string(),
                })
            }
            None => {
                return Err(ConvoflowError::StorageError(format!(
                    "unknown session {session_id}"
                )))
            }
        }
        self.append(
            session_id,
            &JournalEntry::SessionEnded {
                session_id: session_id.clone(),
                timestamp: Utc::now(),
            },
        )
        .await
    }
}

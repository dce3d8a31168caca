//! Step recorders: durable, append-only logs of resolved steps bracketed by
//! session start/end records.

mod jsonl;
mod sqlite;

use std::sync::Mutex;

use async_trait::async_trait;
use convoflow_types::{ConvoflowError, Result, SessionId, SessionRecord, StepRecord};

pub use jsonl::{JournalEntry, JsonlRecorder};
pub use sqlite::SqliteRecorder;

#[async_trait]
pub trait StepRecorder: Send + Sync {
    /// Open a new session and return its freshly generated id.
    async fn start_session(&self) -> Result<SessionId>;

    /// Append one step. Never called for a session that has ended.
    async fn log_step(&self, step: &StepRecord) -> Result<()>;

    /// Set the session's end time. A second call for the same session fails
    /// with [`ConvoflowError::SessionAlreadyClosed`].
    async fn end_session(&self, session_id: &SessionId) -> Result<()>;
}

// ---------------------------------------------------------------------------
// NullRecorder
// ---------------------------------------------------------------------------

/// Hands out session ids and persists nothing.
pub struct NullRecorder;

#[async_trait]
impl StepRecorder for NullRecorder {
    async fn start_session(&self) -> Result<SessionId> {
        Ok(SessionId::generate())
    }

    async fn log_step(&self, _step: &StepRecord) -> Result<()> {
        Ok(())
    }

    async fn end_session(&self, _session_id: &SessionId) -> Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryRecorder
// ---------------------------------------------------------------------------

/// Keeps everything in memory. Counts every call so tests can check how
/// often each operation happened, including calls that failed.
#[derive(Default)]
pub struct MemoryRecorder {
    sessions: Mutex<Vec<SessionRecord>>,
    steps: Mutex<Vec<StepRecord>>,
    end_calls: Mutex<Vec<SessionId>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> Vec<StepRecord> {
        self.steps.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn sessions(&self) -> Vec<SessionRecord> {
        self.sessions.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Session ids passed to `end_session`, in call order.
    pub fn end_calls(&self) -> Vec<SessionId> {
        self.end_calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn poisoned() -> ConvoflowError {
        ConvoflowError::StorageError("memory recorder lock poisoned".into())
    }
}

#[async_trait]
impl StepRecorder for MemoryRecorder {
    async fn start_session(&self) -> Result<SessionId> {
        let id = SessionId::generate();
        self.sessions
            .lock()
            .map_err(|_| Self::poisoned())?
            .push(SessionRecord::open(id.clone()));
        Ok(id)
    }

    async fn log_step(&self, step: &StepRecord) -> Result<()> {
        let open = self
            .sessions
            .lock()
            .map_err(|_| Self::poisoned())?
            .iter()
            .any(|s| s.session_id == step.session_id && !s.is_closed());
        if !open {
            return Err(ConvoflowError::StorageError(format!(
                "no open session {}",
                step.session_id
            )));
        }
        self.steps
            .lock()
            .map_err(|_| Self::poisoned())?
            .push(step.clone());
        Ok(())
    }

    async fn end_session(&self, session_id: &SessionId) -> Result<()> {
        self.end_calls
            .lock()
            .map_err(|_| Self::poisoned())?
            .push(session_id.clone());
        let mut sessions = self.sessions.lock().map_err(|_| Self::poisoned())?;
        let session = sessions
            .iter_mut()
            .find(|s| &s.session_id == session_id)
            .ok_or_else(|| ConvoflowError::StorageError(format!("unknown session {session_id}")))?;
        session.close()
    }
}

//! Shared types, errors, and session records for the ConvoFlow dialogue engine.
//!
//! This crate provides the foundational types used across all other ConvoFlow crates:
//! - `ConvoflowError`: unified error taxonomy
//! - `Resolution`: what a transition resolver decided for one utterance
//! - `SessionId`: identity of one engine run
//! - `StepRecord` / `SessionRecord`: immutable rows written by step recorders

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error type for all ConvoFlow subsystems.
#[derive(Debug, thiserror::Error)]
pub enum ConvoflowError {
    // === Traversal Errors ===
    #[error("Node '{node}' not found")]
    NodeNotFound { node: String },

    #[error("Resolver returned keyword '{keyword}' which is not a transition of node '{node}'")]
    InvalidTransition { node: String, keyword: String },

    // === Parser Errors ===
    #[error("DOT parse error at line {line}, col {col}: {message}")]
    ParseError {
        line: usize,
        col: usize,
        message: String,
        source_snippet: Option<String>,
    },

    // === Flow Errors ===
    #[error("Call flow validation failed: {0}")]
    ValidationError(String),

    // === Classifier Errors ===
    #[error("Classifier {provider} returned HTTP {status}: {message}")]
    ClassifierError {
        provider: String,
        status: u16,
        message: String,
        retryable: bool,
    },

    #[error("Rate limited by {provider}, retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    #[error("Authentication failed for classifier {provider}")]
    AuthError { provider: String },

    #[error("Max retries exhausted for {operation} after {attempts} attempts")]
    RetriesExhausted { operation: String, attempts: usize },

    // === Recorder Errors ===
    #[error("Step storage error: {0}")]
    StorageError(String),

    #[error("Session {session} was already closed")]
    SessionAlreadyClosed { session: String },

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl ConvoflowError {
    /// Returns `true` if the error is transient and the operation may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ConvoflowError::RateLimited { .. }
                | ConvoflowError::ClassifierError { retryable: true, .. }
        )
    }
}

/// A convenience alias for `Result<T, ConvoflowError>`.
pub type Result<T> = std::result::Result<T, ConvoflowError>;

// ---------------------------------------------------------------------------
// Resolution: outcome of classifying one utterance
// ---------------------------------------------------------------------------

/// Marker logged in place of a keyword when a step has no resolved transition.
pub const UNRESOLVED_KEYWORD: &str = "N/A";

/// What a transition resolver decided for an utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "keyword", rename_all = "snake_case")]
pub enum Resolution {
    /// The single best-matching keyword.
    Keyword(String),
    /// The input did not confidently match any candidate.
    NoDecision,
}

impl Resolution {
    pub fn keyword(keyword: impl Into<String>) -> Self {
        Resolution::Keyword(keyword.into())
    }

    pub fn as_keyword(&self) -> Option<&str> {
        match self {
            Resolution::Keyword(k) => Some(k),
            Resolution::NoDecision => None,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// Identity of one engine run, freshly generated at session start.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One resolved step. Created once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub session_id: SessionId,
    pub node_id: String,
    pub user_input: String,
    /// The resolved keyword, or [`UNRESOLVED_KEYWORD`].
    pub keyword: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl StepRecord {
    pub fn new(
        session_id: SessionId,
        node_id: impl Into<String>,
        user_input: impl Into<String>,
        keyword: Option<&str>,
    ) -> Self {
        Self {
            session_id,
            node_id: node_id.into(),
            user_input: user_input.into(),
            keyword: keyword.unwrap_or(UNRESOLVED_KEYWORD).to_string(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.keyword != UNRESOLVED_KEYWORD
    }
}

/// The start/end bracket of one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
}

impl SessionRecord {
    pub fn open(session_id: SessionId) -> Self {
        Self {
            session_id,
            start_time: chrono::Utc::now(),
            end_time: None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.end_time.is_some()
    }

    /// Set the end timestamp. Fails if it was already set.
    pub fn close(&mut self) -> Result<()> {
        if self.end_time.is_some() {
            return Err(ConvoflowError::SessionAlreadyClosed {
                session: self.session_id.0.clone(),
            });
        }
        self.end_time = Some(chrono::Utc::now());
        Ok(())
    }
}

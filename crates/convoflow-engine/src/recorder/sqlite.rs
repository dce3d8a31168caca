use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use convoflow_types::{ConvoflowError, Result, SessionId, SessionRecord, StepRecord};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use super::StepRecorder;

/// Stores sessions and routing decisions in SQLite.
///
/// Schema (created idempotently on open):
/// - `sessions(session_id, start_time, end_time)`
/// - `routes(session_id, node_id, user_input, predicted_keyword, timestamp)`
#[derive(Clone)]
pub struct SqliteRecorder {
    pool: SqlitePool,
}

fn storage(e: sqlx::Error) -> ConvoflowError {
    ConvoflowError::StorageError(e.to_string())
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ConvoflowError::StorageError(format!("bad timestamp '{raw}': {e}")))
}

impl SqliteRecorder {
    /// Open (creating if needed) the database file at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(storage)?;
        Self::with_pool(pool).await
    }

    /// A private database that lives as long as this recorder.
    pub async fn in_memory() -> Result<Self> {
        let options: SqliteConnectOptions = "sqlite::memory:".parse().map_err(storage)?;
        // One connection that never idles out, or the database vanishes.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<std::time::Duration>)
            .max_lifetime(None::<std::time::Duration>)
            .connect_with(options)
            .await
            .map_err(storage)?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                session_id  TEXT PRIMARY KEY,
                start_time  TEXT NOT NULL,
                end_time    TEXT
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(storage)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS routes (
                id                INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id        TEXT NOT NULL REFERENCES sessions(session_id),
                node_id           TEXT NOT NULL,
                user_input        TEXT NOT NULL,
                predicted_keyword TEXT NOT NULL,
                timestamp         TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(storage)?;

        Ok(Self { pool })
    }

    /// All sessions, oldest first.
    pub async fn list_sessions(&self) -> Result<Vec<SessionRecord>> {
        let rows = sqlx::query_as::<_, (String, String, Option<String>)>(
            r#"
            SELECT session_id, start_time, end_time
            FROM sessions
            ORDER BY start_time, rowid
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        rows.into_iter()
            .map(|(id, start, end)| {
                Ok(SessionRecord {
                    session_id: SessionId(id),
                    start_time: parse_timestamp(&start)?,
                    end_time: end.as_deref().map(parse_timestamp).transpose()?,
                })
            })
            .collect()
    }

    /// Steps of one session in the order they were logged.
    pub async fn steps_for_session(&self, session_id: &SessionId) -> Result<Vec<StepRecord>> {
        let rows = sqlx::query_as::<_, (String, String, String, String)>(
            r#"
            SELECT node_id, user_input, predicted_keyword, timestamp
            FROM routes
            WHERE session_id = ?
            ORDER BY id
            "#,
        )
        .bind(session_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        rows.into_iter()
            .map(|(node_id, user_input, keyword, ts)| {
                Ok(StepRecord {
                    session_id: session_id.clone(),
                    node_id,
                    user_input,
                    keyword,
                    timestamp: parse_timestamp(&ts)?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl StepRecorder for SqliteRecorder {
    async fn start_session(&self) -> Result<SessionId> {
        let session_id = SessionId::generate();
        sqlx::query("INSERT INTO sessions (session_id, start_time) VALUES (?, ?)")
            .bind(session_id.as_str())
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(session_id)
    }

    async fn log_step(&self, step: &StepRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO routes (session_id, node_id, user_input, predicted_keyword, timestamp)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(step.session_id.as_str())
        .bind(&step.node_id)
        .bind(&step.user_input)
        .bind(&step.keyword)
        .bind(step.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn end_session(&self, session_id: &SessionId) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE sessions SET end_time = ? WHERE session_id = ? AND end_time IS NULL",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(session_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        if updated.rows_affected() > 0 {
            return Ok(());
        }

        let (count,) = sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM sessions WHERE session_id = ?")
            .bind(session_id.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;
        if count > 0 {
            Err(ConvoflowError::SessionAlreadyClosed {
                session: session_id.to_string(),
            })
        } else {
            Err(ConvoflowError::StorageError(format!("unknown session {session_id}")))
        }
    }
}

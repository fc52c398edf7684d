//! SQLite-backed session state store
//!
//! One row per learner identity with the profile and progress records
//! stored as JSON columns. WAL mode keeps concurrent readers cheap; all
//! writes go through a single connection guarded by an async mutex, so a
//! save is atomic per row and last-writer-wins under duplicate requests.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::warn;

use super::{decode_phase, decode_profile, decode_progress, StateStore};
use crate::error::StorageError;
use crate::model::SessionState;

/// SQLite-backed state store
pub struct SqliteStateStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStateStore {
    /// Open (or create) the store at the given path
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::Open {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
        }

        let conn = Connection::open(&path).map_err(|e| StorageError::Open {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| StorageError::Open {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        Self::init_schema(&conn).map_err(|e| StorageError::Open {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            r#"
            -- One row per learner identity
            CREATE TABLE IF NOT EXISTS sessions (
                user_id TEXT PRIMARY KEY,
                phase TEXT NOT NULL DEFAULT 'new',
                profile TEXT,
                progress TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_updated ON sessions(updated_at DESC);
            "#,
        )
    }

    fn decode_row(
        user_id: &str,
        phase: String,
        profile_json: Option<String>,
        progress_json: String,
    ) -> SessionState {
        let profile = profile_json.and_then(|raw| match serde_json::from_str::<Value>(&raw) {
            Ok(value) => decode_profile(&value, user_id),
            Err(e) => {
                warn!(user_id, error = %e, "stored profile record is not valid JSON, treating as absent");
                None
            }
        });

        let progress = match serde_json::from_str::<Value>(&progress_json) {
            Ok(value) => decode_progress(&value, user_id),
            Err(e) => {
                warn!(user_id, error = %e, "stored progress record is not valid JSON, starting empty");
                Default::default()
            }
        };

        SessionState {
            phase: decode_phase(&phase, user_id),
            profile,
            progress,
        }
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn load(&self, user_id: &str) -> Result<SessionState, StorageError> {
        let conn = self.conn.lock().await;

        let row = conn
            .query_row(
                "SELECT phase, profile, progress FROM sessions WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| StorageError::Read {
                user_id: user_id.to_string(),
                reason: e.to_string(),
            })?;

        Ok(match row {
            Some((phase, profile_json, progress_json)) => {
                Self::decode_row(user_id, phase, profile_json, progress_json)
            }
            None => SessionState::default(),
        })
    }

    async fn save(&self, user_id: &str, state: &SessionState) -> Result<(), StorageError> {
        let profile_json = state
            .profile
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StorageError::Write {
                user_id: user_id.to_string(),
                reason: e.to_string(),
            })?;
        let progress_json =
            serde_json::to_string(&state.progress).map_err(|e| StorageError::Write {
                user_id: user_id.to_string(),
                reason: e.to_string(),
            })?;

        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock().await;

        conn.execute(
            r#"INSERT INTO sessions (user_id, phase, profile, progress, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?5)
               ON CONFLICT(user_id) DO UPDATE SET
                   phase = excluded.phase,
                   profile = excluded.profile,
                   progress = excluded.progress,
                   updated_at = excluded.updated_at"#,
            params![
                user_id,
                state.phase.to_string(),
                profile_json,
                progress_json,
                now,
            ],
        )
        .map_err(|e| StorageError::Write {
            user_id: user_id.to_string(),
            reason: e.to_string(),
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Difficulty, Level, SessionPhase, StudentProfile};

    fn sample_state() -> SessionState {
        let mut state = SessionState {
            phase: SessionPhase::AwaitingFeedback,
            profile: Some(StudentProfile {
                level: Level::Advanced,
                goals: vec!["prepare for a job".into()],
                preferred_style: "theory first".into(),
                focus_topics: vec!["q-learning".into(), "gradients".into()],
            }),
            progress: Default::default(),
        };
        state.progress.record_result("q-learning", Difficulty::Easy, true);
        state.progress.record_result("q-learning", Difficulty::Medium, false);
        state.progress.record_result("gradients", Difficulty::Easy, true);
        state
    }

    #[tokio::test]
    async fn round_trip_is_field_exact() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStateStore::new(dir.path().join("tutor.db")).await.unwrap();

        let state = sample_state();
        store.save("alice", &state).await.unwrap();
        let loaded = store.load("alice").await.unwrap();
        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn load_of_unknown_identity_is_fresh_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStateStore::new(dir.path().join("tutor.db")).await.unwrap();

        let state = store.load("nobody").await.unwrap();
        assert_eq!(state, SessionState::default());
    }

    #[tokio::test]
    async fn save_is_last_writer_wins() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStateStore::new(dir.path().join("tutor.db")).await.unwrap();

        let first = sample_state();
        store.save("alice", &first).await.unwrap();

        let mut second = first.clone();
        second.phase = SessionPhase::Ready;
        second.progress.record_result("gradients", Difficulty::Medium, true);
        store.save("alice", &second).await.unwrap();

        assert_eq!(store.load("alice").await.unwrap(), second);
    }

    #[tokio::test]
    async fn identities_are_stored_independently() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStateStore::new(dir.path().join("tutor.db")).await.unwrap();

        store.save("x", &sample_state()).await.unwrap();
        let y = store.load("y").await.unwrap();
        assert_eq!(y, SessionState::default());
    }

    #[tokio::test]
    async fn malformed_row_degrades_instead_of_crashing() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("tutor.db");
        let store = SqliteStateStore::new(&db_path).await.unwrap();
        store.save("alice", &sample_state()).await.unwrap();

        // Corrupt the row from a second connection, as a buggy writer would
        {
            let raw = Connection::open(&db_path).unwrap();
            raw.execute(
                "UPDATE sessions SET phase = 'meditating', profile = '{\"level\": 5}', progress = 'not json' WHERE user_id = 'alice'",
                [],
            )
            .unwrap();
        }

        let state = store.load("alice").await.unwrap();
        assert_eq!(state.phase, SessionPhase::New);
        let profile = state.profile.expect("object record still yields a profile");
        assert_eq!(profile.level, Level::Beginner);
        assert_eq!(state.progress.total_attempts, 0);
    }
}

//! Session state persistence
//!
//! The [`StateStore`] trait is the only way the rest of the crate touches
//! persisted learner state. `load` never fails for "not found" (a fresh
//! empty [`SessionState`] is returned instead) and degrades field-by-field
//! when stored data is malformed: each unparseable field is replaced by
//! its documented default and logged, never raised.
//!
//! Two implementations: [`SqliteStateStore`] for durable per-identity rows
//! and [`MemoryStateStore`] for tests and ephemeral deployments.

mod sqlite;

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::warn;

use crate::error::StorageError;
use crate::model::{
    default_preferred_style, Difficulty, Level, SessionPhase, SessionState, StudentProfile,
    StudentProgress, TopicStats,
};

pub use sqlite::SqliteStateStore;

/// Storage contract for per-identity session state
///
/// Identities are independent units of mutation: a save under one key must
/// never block or become visible to loads under another key. `save` is
/// last-writer-wins.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the state for a learner identity, or a fresh empty state if
    /// none has been stored yet
    async fn load(&self, user_id: &str) -> Result<SessionState, StorageError>;

    /// Persist the state for a learner identity
    async fn save(&self, user_id: &str, state: &SessionState) -> Result<(), StorageError>;
}

/// In-memory store backed by a per-identity map
#[derive(Default)]
pub struct MemoryStateStore {
    sessions: RwLock<HashMap<String, SessionState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self, user_id: &str) -> Result<SessionState, StorageError> {
        Ok(self
            .sessions
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save(&self, user_id: &str, state: &SessionState) -> Result<(), StorageError> {
        self.sessions
            .write()
            .await
            .insert(user_id.to_string(), state.clone());
        Ok(())
    }
}

/// Decode a stored profile record, substituting defaults per field
///
/// Returns `None` only when the record as a whole is not an object, which
/// matches "no profile stored".
pub(crate) fn decode_profile(raw: &Value, user_id: &str) -> Option<StudentProfile> {
    let record = match raw.as_object() {
        Some(record) => record,
        None => {
            if !raw.is_null() {
                warn!(user_id, "stored profile record is not an object, treating as absent");
            }
            return None;
        }
    };

    let level = match record.get("level") {
        None => Level::default(),
        Some(Value::String(s)) => s.parse().unwrap_or_else(|_| {
            warn!(user_id, level = %s, "unknown stored level, defaulting to beginner");
            Level::default()
        }),
        Some(other) => {
            warn!(user_id, value = %other, "stored level has the wrong type, defaulting to beginner");
            Level::default()
        }
    };

    let preferred_style = match record.get("preferred_style") {
        None => default_preferred_style(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => {
            warn!(user_id, value = %other, "stored preferred_style has the wrong type, using default");
            default_preferred_style()
        }
    };

    Some(StudentProfile {
        level,
        goals: decode_string_list(record.get("goals"), "goals", user_id),
        preferred_style,
        focus_topics: decode_string_list(record.get("focus_topics"), "focus_topics", user_id),
    })
}

/// Decode a stored progress record, substituting defaults per field
pub(crate) fn decode_progress(raw: &Value, user_id: &str) -> StudentProgress {
    let record = match raw.as_object() {
        Some(record) => record,
        None => {
            if !raw.is_null() {
                warn!(user_id, "stored progress record is not an object, starting empty");
            }
            return StudentProgress::default();
        }
    };

    let mut topics = std::collections::BTreeMap::new();
    match record.get("topics") {
        None => {}
        Some(Value::Object(map)) => {
            for (name, stats_raw) in map {
                match stats_raw.as_object() {
                    Some(stats) => {
                        topics.insert(
                            name.clone(),
                            TopicStats {
                                attempts: decode_counter(stats.get("attempts"), "attempts", user_id),
                                correct: decode_counter(stats.get("correct"), "correct", user_id),
                            },
                        );
                    }
                    None => {
                        warn!(user_id, topic = %name, "stored topic stats are not an object, skipping");
                    }
                }
            }
        }
        Some(other) => {
            warn!(user_id, value = %other, "stored topics field has the wrong type, using empty map");
        }
    }

    let mut difficulty_history = Vec::new();
    match record.get("difficulty_history") {
        None => {}
        Some(Value::Array(entries)) => {
            for entry in entries {
                match entry.as_str().map(str::parse::<Difficulty>) {
                    Some(Ok(difficulty)) => difficulty_history.push(difficulty),
                    _ => {
                        warn!(user_id, value = %entry, "unparseable difficulty history entry, skipping");
                    }
                }
            }
        }
        Some(other) => {
            warn!(user_id, value = %other, "stored difficulty_history has the wrong type, using empty list");
        }
    }

    StudentProgress {
        total_attempts: decode_counter(record.get("total_attempts"), "total_attempts", user_id),
        total_correct: decode_counter(record.get("total_correct"), "total_correct", user_id),
        topics,
        difficulty_history,
    }
}

/// Decode a stored phase label; profiling routing keys off the profile,
/// not the phase, so a corrupted label safely falls back to `New`
pub(crate) fn decode_phase(raw: &str, user_id: &str) -> SessionPhase {
    match serde_json::from_value::<SessionPhase>(Value::String(raw.to_string())) {
        Ok(phase) => phase,
        Err(_) => {
            warn!(user_id, phase = %raw, "unknown stored session phase, defaulting to new");
            SessionPhase::default()
        }
    }
}

fn decode_counter(raw: Option<&Value>, field: &str, user_id: &str) -> u64 {
    match raw {
        None => 0,
        Some(value) => match value.as_u64() {
            Some(n) => n,
            None => {
                warn!(user_id, field, value = %value, "stored counter has the wrong type, defaulting to 0");
                0
            }
        },
    }
}

fn decode_string_list(raw: Option<&Value>, field: &str, user_id: &str) -> Vec<String> {
    match raw {
        None => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item.as_str() {
                Some(s) => Some(s.to_string()),
                None => {
                    warn!(user_id, field, value = %item, "non-string entry in stored list, skipping");
                    None
                }
            })
            .collect(),
        Some(other) => {
            warn!(user_id, field, value = %other, "stored list has the wrong type, using empty list");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn memory_store_round_trips_state() {
        let store = MemoryStateStore::new();
        let mut state = SessionState {
            phase: SessionPhase::Ready,
            profile: Some(StudentProfile {
                level: Level::Intermediate,
                goals: vec!["build a model".into(), "understand theory".into()],
                preferred_style: "hands-on".into(),
                focus_topics: vec!["rl".into()],
            }),
            progress: StudentProgress::default(),
        };
        state.progress.record_result("rl", Difficulty::Medium, true);

        store.save("alice", &state).await.unwrap();
        assert_eq!(store.load("alice").await.unwrap(), state);
    }

    #[tokio::test]
    async fn memory_store_isolates_identities() {
        let store = MemoryStateStore::new();
        let mut state_x = SessionState::default();
        state_x.progress.record_result("rl", Difficulty::Easy, true);
        store.save("x", &state_x).await.unwrap();

        let state_y = store.load("y").await.unwrap();
        assert_eq!(state_y, SessionState::default());
        assert_eq!(store.load("x").await.unwrap().progress.total_attempts, 1);
    }

    #[test]
    fn profile_decoding_degrades_per_field() {
        // wrong-typed level and goals, missing preferred_style
        let raw = json!({
            "level": 42,
            "goals": "not-a-list",
            "focus_topics": ["llms", 7, "rl"]
        });
        let profile = decode_profile(&raw, "u").unwrap();
        assert_eq!(profile.level, Level::Beginner);
        assert!(profile.goals.is_empty());
        assert_eq!(profile.preferred_style, "intuitive examples");
        assert_eq!(profile.focus_topics, vec!["llms", "rl"]);
    }

    #[test]
    fn missing_profile_record_is_absent_not_an_error() {
        assert!(decode_profile(&Value::Null, "u").is_none());
        assert!(decode_profile(&json!("garbage"), "u").is_none());
    }

    #[test]
    fn progress_decoding_degrades_per_field() {
        let raw = json!({
            "total_attempts": 3,
            "total_correct": "two",
            "topics": {
                "rl": {"attempts": 2, "correct": 1},
                "broken": "oops"
            },
            "difficulty_history": ["easy", "impossible", "hard"]
        });
        let progress = decode_progress(&raw, "u");
        assert_eq!(progress.total_attempts, 3);
        assert_eq!(progress.total_correct, 0);
        assert_eq!(progress.topics.len(), 1);
        assert_eq!(progress.topics["rl"].attempts, 2);
        assert_eq!(
            progress.difficulty_history,
            vec![Difficulty::Easy, Difficulty::Hard]
        );
    }

    #[test]
    fn unknown_phase_defaults_to_new() {
        assert_eq!(decode_phase("awaiting_feedback", "u"), SessionPhase::AwaitingFeedback);
        assert_eq!(decode_phase("meditating", "u"), SessionPhase::New);
    }
}

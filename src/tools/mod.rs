//! Tool invocation layer
//!
//! The boundary through which reasoning-service phases read and mutate
//! persisted learner state. Three tools are published with JSON-schema
//! parameters; incoming [`ToolCall`]s are validated against those shapes
//! before anything executes, so a malformed call can never touch state.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::{TutorError, ValidationError};
use crate::model::{Difficulty, Level, StudentProfile};
use crate::store::StateStore;
use crate::strategy::DifficultyStrategy;

pub const UPDATE_STUDENT_PROFILE: &str = "update_student_profile";
pub const RECORD_EXERCISE_RESULT: &str = "record_exercise_result";
pub const GET_NEXT_EXERCISE_DIFFICULTY: &str = "get_next_exercise_difficulty";

/// Tool definition published to the reasoning service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Structured tool request from a reasoning-service phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Tool execution result
#[derive(Debug, Clone, Serialize)]
pub struct ToolResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// The tools available to tutoring phases
pub fn tutor_tools() -> Vec<Tool> {
    vec![
        Tool {
            name: UPDATE_STUDENT_PROFILE.to_string(),
            description: "Update the persistent learner profile. Only the fields supplied are \
                changed; unspecified fields keep their prior value. The first-ever call creates \
                the profile, filling unsupplied fields with defaults. Idempotent under repeated \
                identical calls."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "level": {
                        "type": "string",
                        "enum": ["beginner", "intermediate", "advanced"],
                        "description": "Learner experience level"
                    },
                    "goals": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Learning goals, in priority order"
                    },
                    "preferred_style": {
                        "type": "string",
                        "description": "Preferred learning style, e.g. 'intuitive examples'"
                    },
                    "focus_topics": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Topics the learner wants to focus on"
                    }
                },
                "required": []
            }),
        },
        Tool {
            name: RECORD_EXERCISE_RESULT.to_string(),
            description: "Record the result of a single graded answer and update mastery stats. \
                Call exactly once per graded answer: a repeated call for the same answer \
                double-counts."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "topic": {
                        "type": "string",
                        "description": "The concept the question was about, e.g. 'q-learning'"
                    },
                    "difficulty": {
                        "type": "string",
                        "enum": ["easy", "medium", "hard"],
                        "description": "Difficulty of the graded question"
                    },
                    "was_correct": {
                        "type": "boolean",
                        "description": "Whether the answer was (nearly) fully correct"
                    }
                },
                "required": ["topic", "difficulty", "was_correct"]
            }),
        },
        Tool {
            name: GET_NEXT_EXERCISE_DIFFICULTY.to_string(),
            description: "Choose the next exercise difficulty for a topic from the learner's \
                recorded performance. Pure read; safe to call any number of times."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "topic": {
                        "type": "string",
                        "description": "Topic to pick a difficulty for"
                    }
                },
                "required": ["topic"]
            }),
        },
    ]
}

/// A partial profile update; `None` fields keep their prior value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileUpdate {
    pub level: Option<Level>,
    pub goals: Option<Vec<String>>,
    pub preferred_style: Option<String>,
    pub focus_topics: Option<Vec<String>>,
}

impl ProfileUpdate {
    /// Merge into an existing profile, or create one with defaults for
    /// everything not supplied
    pub fn apply(&self, current: Option<StudentProfile>) -> StudentProfile {
        let mut profile = current.unwrap_or_default();
        if let Some(level) = self.level {
            profile.level = level;
        }
        if let Some(goals) = &self.goals {
            profile.goals = goals.clone();
        }
        if let Some(style) = &self.preferred_style {
            profile.preferred_style = style.clone();
        }
        if let Some(topics) = &self.focus_topics {
            profile.focus_topics = topics.clone();
        }
        profile
    }
}

enum ValidatedCall {
    UpdateProfile(ProfileUpdate),
    RecordExerciseResult {
        topic: String,
        difficulty: Difficulty,
        was_correct: bool,
    },
    GetNextExerciseDifficulty {
        topic: String,
    },
}

fn args_object<'a>(
    tool: &str,
    call: &'a ToolCall,
) -> Result<&'a Map<String, Value>, ValidationError> {
    call.arguments
        .as_object()
        .ok_or_else(|| ValidationError::NotAnObject {
            tool: tool.to_string(),
        })
}

fn require_topic(tool: &str, args: &Map<String, Value>) -> Result<String, ValidationError> {
    let value = args
        .get("topic")
        .ok_or_else(|| ValidationError::MissingArgument {
            tool: tool.to_string(),
            argument: "topic".to_string(),
        })?;
    match value.as_str().map(str::trim) {
        Some(topic) if !topic.is_empty() => Ok(topic.to_string()),
        _ => Err(ValidationError::WrongType {
            tool: tool.to_string(),
            argument: "topic".to_string(),
            expected: "non-empty string".to_string(),
        }),
    }
}

fn optional_string(
    tool: &str,
    args: &Map<String, Value>,
    key: &str,
) -> Result<Option<String>, ValidationError> {
    match args.get(key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ValidationError::WrongType {
            tool: tool.to_string(),
            argument: key.to_string(),
            expected: "string".to_string(),
        }),
    }
}

fn optional_string_list(
    tool: &str,
    args: &Map<String, Value>,
    key: &str,
) -> Result<Option<Vec<String>>, ValidationError> {
    match args.get(key) {
        None => Ok(None),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| ValidationError::WrongType {
                        tool: tool.to_string(),
                        argument: key.to_string(),
                        expected: "array of strings".to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        Some(_) => Err(ValidationError::WrongType {
            tool: tool.to_string(),
            argument: key.to_string(),
            expected: "array of strings".to_string(),
        }),
    }
}

fn validate_call(call: &ToolCall) -> Result<ValidatedCall, ValidationError> {
    match call.name.as_str() {
        UPDATE_STUDENT_PROFILE => {
            let args = args_object(UPDATE_STUDENT_PROFILE, call)?;
            let level = optional_string(UPDATE_STUDENT_PROFILE, args, "level")?
                .map(|s| s.parse::<Level>())
                .transpose()?;
            Ok(ValidatedCall::UpdateProfile(ProfileUpdate {
                level,
                goals: optional_string_list(UPDATE_STUDENT_PROFILE, args, "goals")?,
                preferred_style: optional_string(UPDATE_STUDENT_PROFILE, args, "preferred_style")?,
                focus_topics: optional_string_list(UPDATE_STUDENT_PROFILE, args, "focus_topics")?,
            }))
        }
        RECORD_EXERCISE_RESULT => {
            let args = args_object(RECORD_EXERCISE_RESULT, call)?;
            let topic = require_topic(RECORD_EXERCISE_RESULT, args)?;
            let difficulty = match args.get("difficulty") {
                None => {
                    return Err(ValidationError::MissingArgument {
                        tool: RECORD_EXERCISE_RESULT.to_string(),
                        argument: "difficulty".to_string(),
                    })
                }
                Some(Value::String(s)) => s.parse::<Difficulty>()?,
                Some(_) => {
                    return Err(ValidationError::WrongType {
                        tool: RECORD_EXERCISE_RESULT.to_string(),
                        argument: "difficulty".to_string(),
                        expected: "string".to_string(),
                    })
                }
            };
            let was_correct = match args.get("was_correct") {
                None => {
                    return Err(ValidationError::MissingArgument {
                        tool: RECORD_EXERCISE_RESULT.to_string(),
                        argument: "was_correct".to_string(),
                    })
                }
                Some(Value::Bool(b)) => *b,
                Some(_) => {
                    return Err(ValidationError::WrongType {
                        tool: RECORD_EXERCISE_RESULT.to_string(),
                        argument: "was_correct".to_string(),
                        expected: "boolean".to_string(),
                    })
                }
            };
            Ok(ValidatedCall::RecordExerciseResult {
                topic,
                difficulty,
                was_correct,
            })
        }
        GET_NEXT_EXERCISE_DIFFICULTY => {
            let args = args_object(GET_NEXT_EXERCISE_DIFFICULTY, call)?;
            Ok(ValidatedCall::GetNextExerciseDifficulty {
                topic: require_topic(GET_NEXT_EXERCISE_DIFFICULTY, args)?,
            })
        }
        other => Err(ValidationError::UnknownTool(other.to_string())),
    }
}

/// Executes validated tool calls against the state store and strategy
///
/// Mutating tools run under a per-identity lock so a read-modify-write
/// never loses an increment to a duplicate request for the same identity;
/// different identities never contend. Idle lock entries are dropped after
/// use, so the map does not grow with every identity ever seen.
pub struct ToolExecutor {
    store: Arc<dyn StateStore>,
    strategy: Arc<dyn DifficultyStrategy>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ToolExecutor {
    pub fn new(store: Arc<dyn StateStore>, strategy: Arc<dyn DifficultyStrategy>) -> Self {
        Self {
            store,
            strategy,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn identity_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .await
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the lock entry when nobody else is holding it
    async fn evict_idle_lock(&self, user_id: &str) {
        let mut locks = self.locks.lock().await;
        if let Some(lock) = locks.get(user_id) {
            // strong count 1 means the map holds the only handle
            if Arc::strong_count(lock) == 1 {
                locks.remove(user_id);
            }
        }
    }

    /// Validate and execute one tool call for a learner identity
    ///
    /// Validation failures reject the call before any state is read or
    /// written; storage failures surface as recoverable errors.
    pub async fn execute(&self, user_id: &str, call: &ToolCall) -> Result<ToolResult, TutorError> {
        match validate_call(call)? {
            ValidatedCall::UpdateProfile(update) => {
                let profile = {
                    let lock = self.identity_lock(user_id).await;
                    let _guard = lock.lock().await;

                    let mut state = self.store.load(user_id).await?;
                    let profile = update.apply(state.profile.take());
                    state.profile = Some(profile.clone());
                    self.store.save(user_id, &state).await?;
                    profile
                };
                self.evict_idle_lock(user_id).await;

                info!(user_id, level = %profile.level, "tool(update_student_profile)");
                Ok(ToolResult {
                    success: true,
                    message: "profile updated".to_string(),
                    data: Some(json!({
                        "status": "success",
                        "profile": profile,
                    })),
                })
            }
            ValidatedCall::RecordExerciseResult {
                topic,
                difficulty,
                was_correct,
            } => {
                let (overall_accuracy, topic_accuracy, total_attempts) = {
                    let lock = self.identity_lock(user_id).await;
                    let _guard = lock.lock().await;

                    let mut state = self.store.load(user_id).await?;
                    state.progress.record_result(&topic, difficulty, was_correct);
                    self.store.save(user_id, &state).await?;
                    (
                        state.progress.overall_accuracy(),
                        state.progress.topic_accuracy(&topic),
                        state.progress.total_attempts,
                    )
                };
                self.evict_idle_lock(user_id).await;

                info!(
                    user_id,
                    topic,
                    difficulty = %difficulty,
                    was_correct,
                    overall_accuracy = format!("{overall_accuracy:.3}"),
                    topic_accuracy = format!("{topic_accuracy:.3}"),
                    "tool(record_exercise_result)"
                );
                Ok(ToolResult {
                    success: true,
                    message: format!("recorded {difficulty} result for '{topic}'"),
                    data: Some(json!({
                        "status": "success",
                        "overall_accuracy": overall_accuracy,
                        "topic_accuracy": topic_accuracy,
                        "total_attempts": total_attempts,
                    })),
                })
            }
            ValidatedCall::GetNextExerciseDifficulty { topic } => {
                // pure read, no lock needed
                let state = self.store.load(user_id).await?;
                let rec = self.strategy.choose(&topic, &state.progress);

                info!(user_id, topic, difficulty = %rec.difficulty, "tool(get_next_exercise_difficulty)");
                Ok(ToolResult {
                    success: true,
                    message: format!("recommended {} for '{topic}'", rec.difficulty),
                    data: Some(json!({
                        "status": "success",
                        "topic": topic,
                        "recommended_difficulty": rec.difficulty,
                        "reason": rec.reason,
                    })),
                })
            }
        }
    }
}

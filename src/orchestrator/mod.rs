//! Session orchestration
//!
//! A deterministic state machine decides, for every incoming learner
//! message, which tutoring phase runs and with what parameters. Free-form
//! language understanding stays outside this crate: messages arrive
//! already classified as a [`MessageClass`] tag, and the orchestrator
//! only applies the routing rules.

mod orchestrator;

use serde::{Deserialize, Serialize};

use crate::model::SessionPhase;
use crate::tools::ToolResult;

pub use orchestrator::TutorOrchestrator;

pub const ROOT_AGENT: &str = "root_tutor_agent";
pub const PROFILING_AGENT: &str = "profiling_agent";
pub const LESSON_PIPELINE_AGENT: &str = "lesson_pipeline_agent";
pub const EXPLANATION_AGENT: &str = "explanation_agent";
pub const EXERCISE_AGENT: &str = "exercise_generator_agent";
pub const FEEDBACK_AGENT: &str = "feedback_agent";

/// Pre-computed classification of an incoming learner message
///
/// Produced by the (external) reasoning layer; the orchestrator treats it
/// as ground truth and never re-derives intent from the message text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageClass {
    /// First contact from an unknown identity
    NewLearner,
    /// The learner asked to study a new or different topic
    TopicRequest { topic: String },
    /// The learner answered a previously issued exercise
    AnswerSubmission {
        /// Question label referenced by the learner, e.g. "Q1"
        question_label: Option<String>,
    },
    /// The learner explicitly said their background or goals changed
    ProfileChanged,
    /// Anything else: ambiguous or conversational continuation
    Continuation,
}

/// What one handled turn produced
#[derive(Debug)]
pub struct TurnOutcome {
    /// Which agent produced the reply
    pub agent_name: String,
    /// Text to show the learner
    pub reply: String,
    /// Session phase after the turn
    pub phase: SessionPhase,
    /// Results of the tool calls executed during the turn
    pub tool_results: Vec<ToolResult>,
}

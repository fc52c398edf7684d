//! Reasoning-service capability contract
//!
//! The generative components (explanations, exercises, feedback text) live
//! outside this crate. The orchestrator talks to them through
//! [`ReasoningService`]: each phase invocation carries conversation context
//! plus session-derived facts, and comes back as generated text optionally
//! accompanied by tool calls against the tool invocation layer.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::error::PhaseFailure;
use crate::model::{Difficulty, Level, SessionState};
use crate::tools::ToolCall;

/// The discrete workflow steps the orchestrator can invoke
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    Profiling,
    Explanation,
    ExerciseGeneration,
    Feedback,
}

impl std::fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhaseKind::Profiling => write!(f, "profiling"),
            PhaseKind::Explanation => write!(f, "explanation"),
            PhaseKind::ExerciseGeneration => write!(f, "exercise_generation"),
            PhaseKind::Feedback => write!(f, "feedback"),
        }
    }
}

/// Session-derived facts handed to a phase so the generative layer can
/// adapt depth and style without reading the store itself
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionFacts {
    pub has_profile: bool,
    pub level: Option<Level>,
    pub preferred_style: Option<String>,
    pub overall_accuracy: f64,
    pub topic_accuracy: Option<f64>,
    pub recommended_difficulty: Option<Difficulty>,
}

impl SessionFacts {
    /// Snapshot the facts a phase may rely on from the current state
    pub fn from_state(state: &SessionState, topic: Option<&str>) -> Self {
        Self {
            has_profile: state.profile.is_some(),
            level: state.profile.as_ref().map(|p| p.level),
            preferred_style: state.profile.as_ref().map(|p| p.preferred_style.clone()),
            overall_accuracy: state.progress.overall_accuracy(),
            topic_accuracy: topic.map(|t| state.progress.topic_accuracy(t)),
            recommended_difficulty: None,
        }
    }
}

/// One phase invocation
#[derive(Debug, Clone, Serialize)]
pub struct PhaseRequest {
    pub agent_name: String,
    pub invocation_id: Uuid,
    pub phase: PhaseKind,
    pub topic: Option<String>,
    /// The learner message that triggered this turn
    pub message: String,
    pub facts: SessionFacts,
}

/// What a phase hands back: generated text, optionally with tool calls
/// to be validated and executed by the tool invocation layer
#[derive(Debug, Clone, Default)]
pub struct PhaseOutput {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
}

impl PhaseOutput {
    /// "No usable content": nothing to show and nothing to execute
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.tool_calls.is_empty()
    }
}

/// Capability contract implemented by the external generative layer
#[async_trait]
pub trait ReasoningService: Send + Sync {
    async fn run_phase(&self, request: PhaseRequest) -> Result<PhaseOutput, PhaseFailure>;
}

/// Scripted reasoning service for tests
///
/// Outputs are queued per phase kind; when a queue is empty a canned
/// one-line text is returned so tests only script what they assert on.
/// Every request is recorded for ordering assertions.
#[derive(Default)]
pub struct MockReasoningService {
    outputs: std::sync::Mutex<HashMap<PhaseKind, VecDeque<Result<PhaseOutput, String>>>>,
    requests: std::sync::Mutex<Vec<PhaseRequest>>,
}

impl MockReasoningService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a scripted output for the next invocation of `phase`
    pub fn enqueue(&self, phase: PhaseKind, output: PhaseOutput) {
        self.outputs
            .lock()
            .expect("mock lock poisoned")
            .entry(phase)
            .or_default()
            .push_back(Ok(output));
    }

    /// Queue a failure for the next invocation of `phase`
    pub fn enqueue_failure(&self, phase: PhaseKind, reason: &str) {
        self.outputs
            .lock()
            .expect("mock lock poisoned")
            .entry(phase)
            .or_default()
            .push_back(Err(reason.to_string()));
    }

    /// All requests seen so far, in invocation order
    pub fn requests(&self) -> Vec<PhaseRequest> {
        self.requests.lock().expect("mock lock poisoned").clone()
    }
}

#[async_trait]
impl ReasoningService for MockReasoningService {
    async fn run_phase(&self, request: PhaseRequest) -> Result<PhaseOutput, PhaseFailure> {
        let scripted = self
            .outputs
            .lock()
            .expect("mock lock poisoned")
            .get_mut(&request.phase)
            .and_then(|queue| queue.pop_front());

        let agent = request.agent_name.clone();
        let phase = request.phase;
        self.requests
            .lock()
            .expect("mock lock poisoned")
            .push(request);

        match scripted {
            Some(Ok(output)) => Ok(output),
            Some(Err(reason)) => Err(PhaseFailure {
                agent,
                phase: phase.to_string(),
                reason,
            }),
            None => Ok(PhaseOutput {
                text: format!("mock {phase} output"),
                tool_calls: Vec::new(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SessionPhase, StudentProfile};

    #[test]
    fn facts_reflect_profile_and_progress() {
        let mut state = SessionState {
            phase: SessionPhase::Ready,
            profile: Some(StudentProfile::default()),
            progress: Default::default(),
        };
        state.progress.record_result("rl", Difficulty::Easy, true);
        state.progress.record_result("rl", Difficulty::Easy, false);

        let facts = SessionFacts::from_state(&state, Some("rl"));
        assert!(facts.has_profile);
        assert_eq!(facts.level, Some(Level::Beginner));
        assert_eq!(facts.overall_accuracy, 0.5);
        assert_eq!(facts.topic_accuracy, Some(0.5));
    }

    #[tokio::test]
    async fn mock_replays_scripted_outputs_then_falls_back() {
        let mock = MockReasoningService::new();
        mock.enqueue(
            PhaseKind::Explanation,
            PhaseOutput {
                text: "gradients point uphill".to_string(),
                tool_calls: Vec::new(),
            },
        );
        mock.enqueue_failure(PhaseKind::Explanation, "model unavailable");

        let request = |_: u32| PhaseRequest {
            agent_name: "explanation_agent".to_string(),
            invocation_id: Uuid::new_v4(),
            phase: PhaseKind::Explanation,
            topic: Some("gradients".to_string()),
            message: "teach me gradients".to_string(),
            facts: SessionFacts::default(),
        };

        let first = mock.run_phase(request(0)).await.unwrap();
        assert_eq!(first.text, "gradients point uphill");

        let second = mock.run_phase(request(1)).await;
        assert!(second.is_err());

        let third = mock.run_phase(request(2)).await.unwrap();
        assert!(third.text.contains("explanation"));

        assert_eq!(mock.requests().len(), 3);
    }
}

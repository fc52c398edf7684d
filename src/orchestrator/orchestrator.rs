//! Routing rules and the teach-cycle pipeline
//!
//! One entry point, [`TutorOrchestrator::handle_message`], applies the
//! routing rules in priority order and runs the matching phase(s). State
//! transitions are committed only after the phase that earns them
//! succeeds, so a failed phase never leaves a half-finished session.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    MessageClass, TurnOutcome, EXERCISE_AGENT, EXPLANATION_AGENT, FEEDBACK_AGENT,
    LESSON_PIPELINE_AGENT, PROFILING_AGENT, ROOT_AGENT,
};
use crate::error::{PhaseFailure, TutorError};
use crate::model::{SessionPhase, SessionState};
use crate::observability::{ObservabilitySink, PhaseEvent};
use crate::reasoning::{PhaseKind, PhaseOutput, PhaseRequest, ReasoningService, SessionFacts};
use crate::store::StateStore;
use crate::strategy::DifficultyStrategy;
use crate::tools::{ToolExecutor, ToolResult, UPDATE_STUDENT_PROFILE};

const CLARIFICATION_REPLY: &str = "I want to make sure I help with the right thing. \
    Are you asking about a new topic, answering an exercise, or something else?";

/// What one phase's tool-call batch actually did
struct ExecutedCalls {
    results: Vec<ToolResult>,
    /// Count of committed `update_student_profile` calls in the batch
    profile_updates: usize,
}

/// Decision layer of the tutoring service
///
/// Owns no conversation memory of its own; everything it needs to route a
/// message is the persisted session state plus the message classification.
pub struct TutorOrchestrator {
    store: Arc<dyn StateStore>,
    strategy: Arc<dyn DifficultyStrategy>,
    reasoning: Arc<dyn ReasoningService>,
    tools: ToolExecutor,
    sink: Arc<dyn ObservabilitySink>,
}

impl TutorOrchestrator {
    pub fn new(
        store: Arc<dyn StateStore>,
        strategy: Arc<dyn DifficultyStrategy>,
        reasoning: Arc<dyn ReasoningService>,
        sink: Arc<dyn ObservabilitySink>,
    ) -> Self {
        let tools = ToolExecutor::new(store.clone(), strategy.clone());
        Self {
            store,
            strategy,
            reasoning,
            tools,
            sink,
        }
    }

    /// Route one learner message and run the phase(s) it selects
    ///
    /// Routing priority: profiling when no profile exists, the learner
    /// says their situation changed, or a profiling interview is still
    /// open; then feedback for answers to issued exercises, then the
    /// explanation/exercise pipeline for topic requests, and a
    /// clarification reply for everything else.
    pub async fn handle_message(
        &self,
        user_id: &str,
        message: &str,
        class: MessageClass,
        cancel: CancellationToken,
    ) -> Result<TurnOutcome, TutorError> {
        let state = self.store.load(user_id).await?;
        debug!(user_id, phase = %state.phase, ?class, "routing message");

        let outcome = if state.profile.is_none()
            || state.phase == SessionPhase::Profiling
            || matches!(class, MessageClass::ProfileChanged)
        {
            self.run_profiling(user_id, message, &cancel).await?
        } else {
            match class {
                MessageClass::AnswerSubmission { question_label }
                    if question_label.is_some() || state.phase == SessionPhase::AwaitingFeedback =>
                {
                    self.run_feedback(user_id, message, &cancel).await?
                }
                MessageClass::TopicRequest { topic } => {
                    self.run_lesson(user_id, message, &topic, &cancel).await?
                }
                _ => self.clarify(&state),
            }
        };

        // Root-level completion event, after all phase effects are durable
        let state = self.store.load(user_id).await?;
        self.emit(&state, ROOT_AGENT, Uuid::new_v4());

        Ok(outcome)
    }

    /// Run one reasoning phase, racing it against cancellation
    async fn invoke(
        &self,
        agent_name: &str,
        phase: PhaseKind,
        topic: Option<&str>,
        message: &str,
        facts: SessionFacts,
        cancel: &CancellationToken,
    ) -> Result<(PhaseOutput, Uuid), TutorError> {
        let invocation_id = Uuid::new_v4();
        let request = PhaseRequest {
            agent_name: agent_name.to_string(),
            invocation_id,
            phase,
            topic: topic.map(str::to_string),
            message: message.to_string(),
            facts,
        };

        let output = tokio::select! {
            // cancellation wins over a simultaneously ready phase
            biased;
            _ = cancel.cancelled() => {
                info!(agent = agent_name, %phase, "phase cancelled before completion");
                return Err(TutorError::Cancelled);
            }
            result = self.reasoning.run_phase(request) => result?,
        };

        if output.is_empty() {
            return Err(PhaseFailure {
                agent: agent_name.to_string(),
                phase: phase.to_string(),
                reason: "empty output".to_string(),
            }
            .into());
        }

        Ok((output, invocation_id))
    }

    /// Execute a phase's tool calls in order
    ///
    /// A malformed call is logged and skipped; the remaining calls still
    /// run. Storage failures abort the batch.
    async fn execute_tool_calls(
        &self,
        user_id: &str,
        output: &PhaseOutput,
    ) -> Result<ExecutedCalls, TutorError> {
        let mut executed = ExecutedCalls {
            results: Vec::with_capacity(output.tool_calls.len()),
            profile_updates: 0,
        };
        for call in &output.tool_calls {
            match self.tools.execute(user_id, call).await {
                Ok(result) => {
                    if call.name == UPDATE_STUDENT_PROFILE {
                        executed.profile_updates += 1;
                    }
                    executed.results.push(result);
                }
                Err(TutorError::Validation(e)) => {
                    warn!(user_id, tool = %call.name, error = %e, "skipping malformed tool call");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(executed)
    }

    fn emit(&self, state: &SessionState, agent_name: &str, invocation_id: Uuid) {
        self.sink.phase_completed(&PhaseEvent {
            agent_name: agent_name.to_string(),
            invocation_id,
            overall_accuracy: state.progress.overall_accuracy(),
            has_stored_progress: state.progress.has_recorded_results(),
        });
    }

    async fn run_profiling(
        &self,
        user_id: &str,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, TutorError> {
        let state = self.store.load(user_id).await?;
        let facts = SessionFacts::from_state(&state, None);

        let (output, invocation_id) = self
            .invoke(PROFILING_AGENT, PhaseKind::Profiling, None, message, facts, cancel)
            .await?;
        let executed = self.execute_tool_calls(user_id, &output).await?;

        let mut state = self.store.load(user_id).await?;
        // A committed profile update closes the interview. Until then the
        // session stays in profiling, including when the learner is
        // re-profiling over an existing profile.
        state.phase = if executed.profile_updates > 0 {
            SessionPhase::Ready
        } else {
            SessionPhase::Profiling
        };
        self.store.save(user_id, &state).await?;
        self.emit(&state, PROFILING_AGENT, invocation_id);

        Ok(TurnOutcome {
            agent_name: PROFILING_AGENT.to_string(),
            reply: output.text,
            phase: state.phase,
            tool_results: executed.results,
        })
    }

    async fn run_feedback(
        &self,
        user_id: &str,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, TutorError> {
        let state = self.store.load(user_id).await?;
        let facts = SessionFacts::from_state(&state, None);

        let (output, invocation_id) = self
            .invoke(FEEDBACK_AGENT, PhaseKind::Feedback, None, message, facts, cancel)
            .await?;
        let tool_results = self.execute_tool_calls(user_id, &output).await?.results;

        let mut state = self.store.load(user_id).await?;
        state.phase = SessionPhase::Ready;
        self.store.save(user_id, &state).await?;
        self.emit(&state, FEEDBACK_AGENT, invocation_id);

        Ok(TurnOutcome {
            agent_name: FEEDBACK_AGENT.to_string(),
            reply: output.text,
            phase: state.phase,
            tool_results,
        })
    }

    /// The two-step teach cycle: explanation, then exercises
    ///
    /// Teaching is committed once the explanation lands; the session only
    /// moves to awaiting feedback after exercises are actually issued. If
    /// exercise generation fails the session rolls back to ready so the
    /// learner can simply re-request the topic.
    async fn run_lesson(
        &self,
        user_id: &str,
        message: &str,
        topic: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, TutorError> {
        let state = self.store.load(user_id).await?;
        let facts = SessionFacts::from_state(&state, Some(topic));

        let (explanation, explanation_id) = self
            .invoke(
                EXPLANATION_AGENT,
                PhaseKind::Explanation,
                Some(topic),
                message,
                facts,
                cancel,
            )
            .await?;
        let mut tool_results = self.execute_tool_calls(user_id, &explanation).await?.results;

        let mut state = self.store.load(user_id).await?;
        state.phase = SessionPhase::Teaching;
        self.store.save(user_id, &state).await?;
        self.emit(&state, EXPLANATION_AGENT, explanation_id);

        // The exercise phase sees the difficulty the strategy would pick
        // right now, so question generation matches recorded mastery.
        let recommendation = self.strategy.choose(topic, &state.progress);
        let mut facts = SessionFacts::from_state(&state, Some(topic));
        facts.recommended_difficulty = Some(recommendation.difficulty);

        let exercises = match self
            .invoke(
                EXERCISE_AGENT,
                PhaseKind::ExerciseGeneration,
                Some(topic),
                message,
                facts,
                cancel,
            )
            .await
        {
            Ok((output, invocation_id)) => {
                tool_results.extend(self.execute_tool_calls(user_id, &output).await?.results);
                let mut state = self.store.load(user_id).await?;
                state.phase = SessionPhase::AwaitingFeedback;
                self.store.save(user_id, &state).await?;
                self.emit(&state, EXERCISE_AGENT, invocation_id);
                output
            }
            Err(e) => {
                // No exercises were issued, so there is nothing to await
                let mut state = self.store.load(user_id).await?;
                state.phase = SessionPhase::Ready;
                self.store.save(user_id, &state).await?;
                warn!(user_id, topic, error = %e, "teach cycle failed before exercises were issued");
                return Err(e);
            }
        };

        let state = self.store.load(user_id).await?;
        Ok(TurnOutcome {
            agent_name: LESSON_PIPELINE_AGENT.to_string(),
            reply: format!("{}\n\n{}", explanation.text.trim(), exercises.text.trim()),
            phase: state.phase,
            tool_results,
        })
    }

    /// Rule of last resort: ask instead of guessing
    fn clarify(&self, state: &SessionState) -> TurnOutcome {
        TurnOutcome {
            agent_name: ROOT_AGENT.to_string(),
            reply: CLARIFICATION_REPLY.to_string(),
            phase: state.phase,
            tool_results: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Level, StudentProfile};
    use crate::observability::CollectingSink;
    use crate::reasoning::MockReasoningService;
    use crate::store::MemoryStateStore;
    use crate::strategy::AccuracyBasedStrategy;
    use crate::tools::{ToolCall, UPDATE_STUDENT_PROFILE};
    use serde_json::json;

    struct Fixture {
        orchestrator: TutorOrchestrator,
        store: Arc<MemoryStateStore>,
        reasoning: Arc<MockReasoningService>,
        sink: Arc<CollectingSink>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStateStore::new());
        let reasoning = Arc::new(MockReasoningService::new());
        let sink = Arc::new(CollectingSink::new());
        let orchestrator = TutorOrchestrator::new(
            store.clone(),
            Arc::new(AccuracyBasedStrategy),
            reasoning.clone(),
            sink.clone(),
        );
        Fixture {
            orchestrator,
            store,
            reasoning,
            sink,
        }
    }

    async fn seed_profile(store: &MemoryStateStore, user_id: &str) {
        let mut state = store.load(user_id).await.unwrap();
        state.profile = Some(StudentProfile::default());
        state.phase = SessionPhase::Ready;
        store.save(user_id, &state).await.unwrap();
    }

    #[tokio::test]
    async fn missing_profile_routes_to_profiling_even_for_topic_requests() {
        let f = fixture();
        f.reasoning.enqueue(
            PhaseKind::Profiling,
            PhaseOutput {
                text: "Before we dive in, what's your background?".to_string(),
                tool_calls: Vec::new(),
            },
        );

        let outcome = f
            .orchestrator
            .handle_message(
                "alice",
                "teach me q-learning",
                MessageClass::TopicRequest {
                    topic: "q-learning".to_string(),
                },
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.agent_name, PROFILING_AGENT);
        // no profile was stored, so the session keeps profiling
        assert_eq!(outcome.phase, SessionPhase::Profiling);
        let requests = f.reasoning.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].phase, PhaseKind::Profiling);
    }

    #[tokio::test]
    async fn profiling_tool_call_moves_session_to_ready() {
        let f = fixture();
        f.reasoning.enqueue(
            PhaseKind::Profiling,
            PhaseOutput {
                text: "Great, noted. What would you like to learn first?".to_string(),
                tool_calls: vec![ToolCall {
                    name: UPDATE_STUDENT_PROFILE.to_string(),
                    arguments: json!({"level": "beginner", "goals": ["understand rl"]}),
                }],
            },
        );

        let outcome = f
            .orchestrator
            .handle_message(
                "alice",
                "I'm new to this, I want to understand RL",
                MessageClass::NewLearner,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.phase, SessionPhase::Ready);
        assert_eq!(outcome.tool_results.len(), 1);
        let state = f.store.load("alice").await.unwrap();
        assert!(state.profile.is_some());
        assert_eq!(state.phase, SessionPhase::Ready);
    }

    #[tokio::test]
    async fn profile_changed_reenters_profiling_until_an_update_commits() {
        let f = fixture();
        seed_profile(&f.store, "alice").await;

        // interview turn: questions only, nothing committed
        f.reasoning.enqueue(
            PhaseKind::Profiling,
            PhaseOutput {
                text: "What changed about your goals?".to_string(),
                tool_calls: Vec::new(),
            },
        );
        let outcome = f
            .orchestrator
            .handle_message(
                "alice",
                "my situation changed",
                MessageClass::ProfileChanged,
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.agent_name, PROFILING_AGENT);
        assert_eq!(outcome.phase, SessionPhase::Profiling);
        assert_eq!(
            f.store.load("alice").await.unwrap().phase,
            SessionPhase::Profiling
        );

        // the open interview keeps routing to profiling until an update lands
        f.reasoning.enqueue(
            PhaseKind::Profiling,
            PhaseOutput {
                text: "Updated, thanks!".to_string(),
                tool_calls: vec![ToolCall {
                    name: UPDATE_STUDENT_PROFILE.to_string(),
                    arguments: json!({"level": "advanced"}),
                }],
            },
        );
        let outcome = f
            .orchestrator
            .handle_message(
                "alice",
                "I finished a course, I'd say advanced now",
                MessageClass::Continuation,
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.phase, SessionPhase::Ready);

        let state = f.store.load("alice").await.unwrap();
        assert_eq!(state.phase, SessionPhase::Ready);
        assert_eq!(state.profile.unwrap().level, Level::Advanced);
        assert!(f
            .reasoning
            .requests()
            .iter()
            .all(|r| r.phase == PhaseKind::Profiling));
    }

    #[tokio::test]
    async fn answer_without_label_outside_feedback_phase_asks_for_clarification() {
        let f = fixture();
        seed_profile(&f.store, "alice").await;

        let outcome = f
            .orchestrator
            .handle_message(
                "alice",
                "the answer is 42",
                MessageClass::AnswerSubmission {
                    question_label: None,
                },
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.agent_name, ROOT_AGENT);
        assert_eq!(outcome.phase, SessionPhase::Ready);
        assert!(f.reasoning.requests().is_empty());
    }

    #[tokio::test]
    async fn lesson_runs_explanation_then_exercises_and_awaits_feedback() {
        let f = fixture();
        seed_profile(&f.store, "alice").await;
        f.reasoning.enqueue(
            PhaseKind::Explanation,
            PhaseOutput {
                text: "Q-learning estimates action values.".to_string(),
                tool_calls: Vec::new(),
            },
        );
        f.reasoning.enqueue(
            PhaseKind::ExerciseGeneration,
            PhaseOutput {
                text: "Q1: What does the Q stand for?".to_string(),
                tool_calls: Vec::new(),
            },
        );

        let outcome = f
            .orchestrator
            .handle_message(
                "alice",
                "teach me q-learning",
                MessageClass::TopicRequest {
                    topic: "q-learning".to_string(),
                },
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.agent_name, LESSON_PIPELINE_AGENT);
        assert_eq!(outcome.phase, SessionPhase::AwaitingFeedback);
        assert!(outcome.reply.contains("Q-learning estimates"));
        assert!(outcome.reply.contains("Q1:"));

        let requests = f.reasoning.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].phase, PhaseKind::Explanation);
        assert_eq!(requests[1].phase, PhaseKind::ExerciseGeneration);
        // the exercise phase sees a pre-computed difficulty
        assert!(requests[1].facts.recommended_difficulty.is_some());

        let agents: Vec<_> = f.sink.events().iter().map(|e| e.agent_name.clone()).collect();
        assert_eq!(
            agents,
            vec![EXPLANATION_AGENT, EXERCISE_AGENT, ROOT_AGENT]
        );
    }

    #[tokio::test]
    async fn exercise_failure_rolls_the_session_back_to_ready() {
        let f = fixture();
        seed_profile(&f.store, "alice").await;
        f.reasoning.enqueue(
            PhaseKind::Explanation,
            PhaseOutput {
                text: "Gradients point uphill.".to_string(),
                tool_calls: Vec::new(),
            },
        );
        f.reasoning
            .enqueue_failure(PhaseKind::ExerciseGeneration, "model unavailable");

        let err = f
            .orchestrator
            .handle_message(
                "alice",
                "teach me gradients",
                MessageClass::TopicRequest {
                    topic: "gradients".to_string(),
                },
                CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, TutorError::Phase(_)));
        let state = f.store.load("alice").await.unwrap();
        assert_eq!(state.phase, SessionPhase::Ready);
    }

    #[tokio::test]
    async fn explanation_failure_leaves_state_untouched() {
        let f = fixture();
        seed_profile(&f.store, "alice").await;
        let before = f.store.load("alice").await.unwrap();
        f.reasoning
            .enqueue_failure(PhaseKind::Explanation, "model unavailable");

        let err = f
            .orchestrator
            .handle_message(
                "alice",
                "teach me gradients",
                MessageClass::TopicRequest {
                    topic: "gradients".to_string(),
                },
                CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, TutorError::Phase(_)));
        assert_eq!(f.store.load("alice").await.unwrap(), before);
        assert!(f.sink.events().is_empty());
    }

    #[tokio::test]
    async fn cancelled_turn_commits_nothing() {
        let f = fixture();
        seed_profile(&f.store, "alice").await;
        let before = f.store.load("alice").await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = f
            .orchestrator
            .handle_message(
                "alice",
                "teach me gradients",
                MessageClass::TopicRequest {
                    topic: "gradients".to_string(),
                },
                cancel,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, TutorError::Cancelled));
        assert_eq!(f.store.load("alice").await.unwrap(), before);
    }
}

//! Domain models for the tutor core
//!
//! - `StudentProfile`: stable learner attributes
//! - `TopicStats` / `StudentProgress`: per-topic and overall mastery stats
//! - `SessionState`: everything persisted for one learner identity
//!
//! These are plain value types. The only mutator is
//! [`StudentProgress::record_result`], which updates all four progress
//! fields together so the counters, the topic map, and the difficulty
//! history can never drift apart.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Learner experience level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Level::Beginner => write!(f, "beginner"),
            Level::Intermediate => write!(f, "intermediate"),
            Level::Advanced => write!(f, "advanced"),
        }
    }
}

impl FromStr for Level {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "beginner" => Ok(Level::Beginner),
            "intermediate" => Ok(Level::Intermediate),
            "advanced" => Ok(Level::Advanced),
            other => Err(ValidationError::InvalidLevel(other.to_string())),
        }
    }
}

/// Difficulty label assigned to a single exercise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "easy"),
            Difficulty::Medium => write!(f, "medium"),
            Difficulty::Hard => write!(f, "hard"),
        }
    }
}

impl FromStr for Difficulty {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(ValidationError::InvalidDifficulty(other.to_string())),
        }
    }
}

/// Stable information about the learner
///
/// Created on first profiling completion and mutated only by explicit
/// profile-update tool calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentProfile {
    #[serde(default)]
    pub level: Level,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default = "default_preferred_style")]
    pub preferred_style: String,
    #[serde(default)]
    pub focus_topics: Vec<String>,
}

pub(crate) fn default_preferred_style() -> String {
    "intuitive examples".to_string()
}

impl Default for StudentProfile {
    fn default() -> Self {
        Self {
            level: Level::default(),
            goals: Vec::new(),
            preferred_style: default_preferred_style(),
            focus_topics: Vec::new(),
        }
    }
}

/// Running statistics for a single topic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicStats {
    pub attempts: u64,
    pub correct: u64,
}

impl TopicStats {
    /// Fraction of correct answers; 0.0 when nothing has been attempted
    pub fn accuracy(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.correct as f64 / self.attempts as f64
        }
    }
}

/// Performance across topics plus the chronological difficulty history
///
/// Invariants, upheld by [`StudentProgress::record_result`]:
/// - `total_attempts` equals the sum of all topic attempts
/// - `total_correct` equals the sum of all topic corrects
/// - `difficulty_history.len()` equals `total_attempts`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudentProgress {
    #[serde(default)]
    pub total_attempts: u64,
    #[serde(default)]
    pub total_correct: u64,
    #[serde(default)]
    pub topics: BTreeMap<String, TopicStats>,
    #[serde(default)]
    pub difficulty_history: Vec<Difficulty>,
}

impl StudentProgress {
    /// Overall fraction of correct answers; 0.0 before any attempt
    pub fn overall_accuracy(&self) -> f64 {
        if self.total_attempts == 0 {
            0.0
        } else {
            self.total_correct as f64 / self.total_attempts as f64
        }
    }

    /// Accuracy for one topic; 0.0 when the topic has never been recorded
    pub fn topic_accuracy(&self, topic: &str) -> f64 {
        self.topics.get(topic).map(|s| s.accuracy()).unwrap_or(0.0)
    }

    /// Whether any result has ever been recorded
    pub fn has_recorded_results(&self) -> bool {
        self.total_attempts > 0 || !self.topics.is_empty()
    }

    /// Record one graded exercise result
    ///
    /// Creates the topic entry on first use and updates the global
    /// counters, the topic counters, and the difficulty history in one
    /// step. This is the only mutator on progress state.
    pub fn record_result(&mut self, topic: &str, difficulty: Difficulty, was_correct: bool) {
        self.total_attempts += 1;
        if was_correct {
            self.total_correct += 1;
        }

        let stats = self.topics.entry(topic.to_string()).or_default();
        stats.attempts += 1;
        if was_correct {
            stats.correct += 1;
        }

        self.difficulty_history.push(difficulty);
    }
}

/// Workflow phase of a learner session
///
/// `New` and `Profiling` are entered once per identity; a return to
/// `Profiling` only happens on an explicit profile-changed signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    New,
    Profiling,
    Ready,
    Teaching,
    AwaitingFeedback,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionPhase::New => write!(f, "new"),
            SessionPhase::Profiling => write!(f, "profiling"),
            SessionPhase::Ready => write!(f, "ready"),
            SessionPhase::Teaching => write!(f, "teaching"),
            SessionPhase::AwaitingFeedback => write!(f, "awaiting_feedback"),
        }
    }
}

/// Everything persisted for one learner identity
///
/// The profile is absent until profiling completes; progress is always
/// present, starting empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub phase: SessionPhase,
    #[serde(default)]
    pub profile: Option<StudentProfile>,
    #[serde(default)]
    pub progress: StudentProgress,
}

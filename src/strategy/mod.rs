//! Adaptive difficulty strategies
//!
//! A strategy is a pure, stateless mapping from (topic, progress) to a
//! difficulty label. Concrete policies are selected at construction time
//! and swapped behind `Arc<dyn DifficultyStrategy>`; callers never inspect
//! the concrete type.

use serde::Serialize;

use crate::model::{Difficulty, StudentProgress};

/// A chosen difficulty plus a short human-readable justification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DifficultyRecommendation {
    pub difficulty: Difficulty,
    pub reason: String,
}

/// Capability interface for adaptive difficulty selection
///
/// Exactly one operation; implementations must be stateless with respect
/// to the session (all inputs arrive through `progress`).
pub trait DifficultyStrategy: Send + Sync {
    /// Strategy name, used in logs and tool responses
    fn name(&self) -> &'static str;

    /// Choose the next exercise difficulty for a topic
    fn choose(&self, topic: &str, progress: &StudentProgress) -> DifficultyRecommendation;
}

/// Accuracy thresholds: below `easy_below` stay easy, at or above
/// `hard_at` move to hard, medium in between. Boundaries are inclusive
/// upward (0.4 is medium, 0.75 is hard).
const EASY_BELOW: f64 = 0.4;
const HARD_AT: f64 = 0.75;

/// Difficulty policy driven by per-topic accuracy
///
/// - no recorded stats, or zero attempts: easy
/// - accuracy < 0.4: easy
/// - 0.4 <= accuracy < 0.75: medium
/// - accuracy >= 0.75: hard
#[derive(Debug, Clone, Copy, Default)]
pub struct AccuracyBasedStrategy;

impl DifficultyStrategy for AccuracyBasedStrategy {
    fn name(&self) -> &'static str {
        "accuracy_based"
    }

    fn choose(&self, topic: &str, progress: &StudentProgress) -> DifficultyRecommendation {
        let stats = match progress.topics.get(topic) {
            Some(stats) if stats.attempts > 0 => *stats,
            _ => {
                return DifficultyRecommendation {
                    difficulty: Difficulty::Easy,
                    reason: format!("no recorded attempts for '{topic}' yet"),
                }
            }
        };

        let accuracy = stats.accuracy();
        let difficulty = if accuracy < EASY_BELOW {
            Difficulty::Easy
        } else if accuracy < HARD_AT {
            Difficulty::Medium
        } else {
            Difficulty::Hard
        };

        DifficultyRecommendation {
            difficulty,
            reason: format!(
                "topic accuracy {:.2} over {} attempt(s)",
                accuracy, stats.attempts
            ),
        }
    }
}

//! Tutor Core - Decision-and-state layer for an adaptive tutoring service
//!
//! Everything deterministic about the tutor lives here:
//! - Session orchestration: routing rules and the teach-cycle state machine
//! - Persistent learner model: profile, mastery stats, session phase
//! - Adaptive difficulty: accuracy-driven exercise difficulty selection
//! - Tool invocation layer: validated reads and writes of learner state
//! - Observability hook for phase completions
//!
//! Generative work (explanations, exercises, feedback text) is delegated
//! through the [`reasoning::ReasoningService`] trait; this crate never
//! talks to a model directly.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use tutor_core::config::TutorConfig;
//! use tutor_core::observability::TracingSink;
//! use tutor_core::orchestrator::{MessageClass, TutorOrchestrator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = TutorConfig::load()?;
//!     let orchestrator = TutorOrchestrator::new(
//!         config.build_store().await?,
//!         config.build_strategy()?,
//!         reasoning_service,
//!         Arc::new(TracingSink),
//!     );
//!     let outcome = orchestrator
//!         .handle_message(
//!             "alice",
//!             "teach me q-learning",
//!             MessageClass::TopicRequest { topic: "q-learning".into() },
//!             CancellationToken::new(),
//!         )
//!         .await?;
//!     println!("{}", outcome.reply);
//!     Ok(())
//! }
//! ```

// Core modules
pub mod error;
pub mod model;
pub mod store; // Must come before tools since tools depend on the store
pub mod strategy;
pub mod config;

// Decision layer
pub mod observability;
pub mod reasoning;
pub mod tools;
pub mod orchestrator;

// Re-export commonly used types for convenience
pub use config::TutorConfig;

pub use error::{PhaseFailure, StorageError, TutorError, ValidationError};

pub use model::{
    Difficulty, Level, SessionPhase, SessionState, StudentProfile, StudentProgress, TopicStats,
};

pub use orchestrator::{MessageClass, TurnOutcome, TutorOrchestrator};

pub use store::{MemoryStateStore, SqliteStateStore, StateStore};

pub use strategy::{AccuracyBasedStrategy, DifficultyRecommendation, DifficultyStrategy};

pub use tools::{Tool, ToolCall, ToolExecutor, ToolResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get the library info
pub fn info() -> String {
    format!("{} v{} - Adaptive Tutoring Core", NAME, VERSION)
}

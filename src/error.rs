//! Error taxonomy for the tutor core
//!
//! Storage and validation problems are recoverable by design: a failed
//! `save` is surfaced to the caller (retry policy is theirs), a malformed
//! tool call is rejected before any mutation, and a reasoning phase that
//! produces nothing usable leaves session state untouched.

use thiserror::Error;

/// Persisted state could not be read or written
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to open state database at '{path}': {reason}")]
    Open { path: String, reason: String },

    #[error("failed to read state for '{user_id}': {reason}")]
    Read { user_id: String, reason: String },

    #[error("failed to write state for '{user_id}': {reason}")]
    Write { user_id: String, reason: String },
}

/// A tool call or profile update carried a field of the wrong shape
///
/// Validation always happens before mutation, so the original state is
/// untouched when one of these is returned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("tool '{tool}': arguments must be a JSON object")]
    NotAnObject { tool: String },

    #[error("tool '{tool}': missing required argument '{argument}'")]
    MissingArgument { tool: String, argument: String },

    #[error("tool '{tool}': argument '{argument}' has the wrong type (expected {expected})")]
    WrongType {
        tool: String,
        argument: String,
        expected: String,
    },

    #[error("invalid difficulty label '{0}' (expected one of: easy, medium, hard)")]
    InvalidDifficulty(String),

    #[error("invalid level '{0}' (expected one of: beginner, intermediate, advanced)")]
    InvalidLevel(String),
}

/// A reasoning-service phase returned no usable output
///
/// Recoverable: the orchestrator remains ready to retry and no durable
/// state has been committed for the failed phase.
#[derive(Debug, Error, Clone)]
#[error("phase '{phase}' of '{agent}' produced no usable output: {reason}")]
pub struct PhaseFailure {
    pub agent: String,
    pub phase: String,
    pub reason: String,
}

/// Top-level error for orchestrator entry points
#[derive(Debug, Error)]
pub enum TutorError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Phase(#[from] PhaseFailure),

    #[error("the pending phase was cancelled before completion")]
    Cancelled,
}

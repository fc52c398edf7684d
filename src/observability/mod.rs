//! Observability hooks for orchestrator phases
//!
//! The orchestrator is handed an [`ObservabilitySink`] at construction and
//! notifies it after each completed phase. Events are side-effect-only:
//! sinks must never alter state or control flow. There is no module-level
//! logging singleton; everything flows through the injected sink.

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

/// Emitted after an orchestrator phase completes
#[derive(Debug, Clone, Serialize)]
pub struct PhaseEvent {
    pub agent_name: String,
    pub invocation_id: Uuid,
    pub overall_accuracy: f64,
    pub has_stored_progress: bool,
}

/// Side-effect-only notification channel for phase completions
pub trait ObservabilitySink: Send + Sync {
    fn phase_completed(&self, event: &PhaseEvent);
}

/// Default sink that logs phase completions through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ObservabilitySink for TracingSink {
    fn phase_completed(&self, event: &PhaseEvent) {
        info!(
            agent = %event.agent_name,
            invocation_id = %event.invocation_id,
            overall_accuracy = format!("{:.3}", event.overall_accuracy),
            has_stored_progress = event.has_stored_progress,
            "phase completed"
        );
    }
}

/// Sink that records every event, for tests and local inspection
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: std::sync::Mutex<Vec<PhaseEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events seen so far, oldest first
    pub fn events(&self) -> Vec<PhaseEvent> {
        self.events.lock().expect("sink lock poisoned").clone()
    }
}

impl ObservabilitySink for CollectingSink {
    fn phase_completed(&self, event: &PhaseEvent) {
        self.events
            .lock()
            .expect("sink lock poisoned")
            .push(event.clone());
    }
}

/// Install a global tracing subscriber honoring `RUST_LOG`
///
/// Intended for binaries and integration tests embedding the crate; safe
/// to call more than once.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

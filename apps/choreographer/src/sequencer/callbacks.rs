use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::models::{Phase, SequenceSnapshot};

type CompleteFn = dyn Fn() + Send + Sync;
type StepChangeFn = dyn Fn(&SequenceSnapshot) + Send + Sync;
type PhaseFn = dyn Fn(&PhaseEvent) + Send + Sync;

/// A phase boundary for the step at `index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseEvent {
    pub index: usize,
    pub cycle_count: u64,
    pub phase: Phase,
}

/// Observer hooks for a choreographer.
///
/// Callbacks run on the phase-loop task, outside the state lock, so they may
/// call back into the choreographer (e.g. `stop()` from `on_complete`). A
/// panicking callback is not caught: it ends the phase loop and is re-raised
/// by `Choreographer::wait`.
#[derive(Clone, Default)]
pub struct Callbacks {
    on_complete: Option<Arc<CompleteFn>>,
    on_step_change: Option<Arc<StepChangeFn>>,
    on_phase: Option<Arc<PhaseFn>>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fired once when a finite sequence finishes. Never fired in cyclic mode.
    pub fn on_complete(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Arc::new(f));
        self
    }

    /// Fired after every step status mutation.
    pub fn on_step_change(mut self, f: impl Fn(&SequenceSnapshot) + Send + Sync + 'static) -> Self {
        self.on_step_change = Some(Arc::new(f));
        self
    }

    /// Fired at each phase boundary (loading, success, transitioning, settled).
    pub fn on_phase(mut self, f: impl Fn(&PhaseEvent) + Send + Sync + 'static) -> Self {
        self.on_phase = Some(Arc::new(f));
        self
    }

    pub(crate) fn complete(&self) {
        if let Some(f) = &self.on_complete {
            f();
        }
    }

    pub(crate) fn step_changed(&self, snapshot: &SequenceSnapshot) {
        if let Some(f) = &self.on_step_change {
            f(snapshot);
        }
    }

    pub(crate) fn phase(&self, event: &PhaseEvent) {
        if let Some(f) = &self.on_phase {
            f(event);
        }
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_complete", &self.on_complete.is_some())
            .field("on_step_change", &self.on_step_change.is_some())
            .field("on_phase", &self.on_phase.is_some())
            .finish()
    }
}

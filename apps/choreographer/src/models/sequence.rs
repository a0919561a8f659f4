//! Sequence — the ordered, stateful collection of steps plus cycle metadata.
//!
//! All status mutation lives here as plain synchronous methods. The
//! choreographer decides *when* to call them; this module decides *what*
//! each transition does, so the rules are testable without timers.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::ChoreographerError;
use crate::models::step::{Step, StepStatus};

// ────────────────────────────────────────────────────────────────────────────
// Enums
// ────────────────────────────────────────────────────────────────────────────

/// Whether the sequence stops after the last step or wraps forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Finite,
    Cyclic,
}

/// Visual phase of the current step.
///
/// `Success` and `Transitioning` are what the render adapter needs to swap the
/// icon and slide the list; `Settled` only appears once a finite run is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Loading,
    Success,
    Transitioning,
    Settled,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Loading => "loading",
            Phase::Success => "success",
            Phase::Transitioning => "transitioning",
            Phase::Settled => "settled",
        };
        f.write_str(s)
    }
}

/// Lifecycle of the choreographer owning a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    Paused,
    Stopped,
    Completed,
}

/// Result of settling the current step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// A new step became `loading`.
    Next { index: usize, wrapped: bool },
    /// Finite mode: the last step completed. No step is loading any more.
    Finished,
    /// Nothing was loading, so nothing changed.
    Unchanged,
}

// ────────────────────────────────────────────────────────────────────────────
// Sequence
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Sequence {
    steps: Vec<Step>,
    mode: Mode,
    cycle_count: u64,
    phase: Phase,
}

impl Sequence {
    /// Builds a sequence in its initial state: first step `loading`, the rest
    /// `pending`, cycle count 0. Incoming statuses are ignored.
    pub fn new(steps: Vec<Step>, mode: Mode) -> Result<Self, ChoreographerError> {
        if steps.is_empty() {
            return Err(ChoreographerError::invalid(
                "a sequence needs at least one step",
            ));
        }

        let mut seen = HashSet::with_capacity(steps.len());
        for step in &steps {
            if !seen.insert(step.id.as_str()) {
                return Err(ChoreographerError::invalid(format!(
                    "duplicate step id '{}'",
                    step.id
                )));
            }
        }

        let mut sequence = Sequence {
            steps,
            mode,
            cycle_count: 0,
            phase: Phase::Loading,
        };
        sequence.reset();
        Ok(sequence)
    }

    /// Restores the initial state without touching ids, labels or mode.
    pub fn reset(&mut self) {
        for (i, step) in self.steps.iter_mut().enumerate() {
            step.status = if i == 0 {
                StepStatus::Loading
            } else {
                StepStatus::Pending
            };
        }
        self.cycle_count = 0;
        self.phase = Phase::Loading;
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Index of the step currently `loading`, if any.
    pub fn current_index(&self) -> Option<usize> {
        self.steps.iter().position(Step::is_loading)
    }

    pub fn is_finished(&self) -> bool {
        self.mode == Mode::Finite && self.steps.iter().all(Step::is_completed)
    }

    pub fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    /// Completes the loading step and moves to the next one.
    ///
    /// Finite: after the last step nothing else becomes loading and the phase
    /// is left at `Settled`. Cyclic: wraps to index 0, bumping `cycle_count`
    /// before the wrapped step flips to `loading`. In cyclic mode the step
    /// after the new current one is forced back to `pending` so a status left
    /// over from the previous cycle never shows up as the upcoming step.
    pub fn settle_current(&mut self) -> Advance {
        let Some(current) = self.current_index() else {
            return Advance::Unchanged;
        };
        let len = self.steps.len();

        self.steps[current].status = StepStatus::Completed;

        let next = match self.mode {
            Mode::Finite if current + 1 == len => {
                self.phase = Phase::Settled;
                return Advance::Finished;
            }
            Mode::Finite => current + 1,
            Mode::Cyclic => (current + 1) % len,
        };

        let wrapped = next == 0;
        if wrapped {
            self.cycle_count += 1;
        }
        self.steps[next].status = StepStatus::Loading;

        if self.mode == Mode::Cyclic && next + 1 < len {
            self.steps[next + 1].status = StepStatus::Pending;
        }

        self.phase = Phase::Loading;
        Advance::Next {
            index: next,
            wrapped,
        }
    }

    pub fn snapshot(&self, run_state: RunState) -> SequenceSnapshot {
        SequenceSnapshot {
            steps: self.steps.clone(),
            mode: self.mode,
            current_index: self.current_index(),
            cycle_count: self.cycle_count,
            phase: self.phase,
            run_state,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Snapshot
// ────────────────────────────────────────────────────────────────────────────

/// Immutable copy of a sequence handed to observers and the window projector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceSnapshot {
    pub steps: Vec<Step>,
    pub mode: Mode,
    /// Index of the `loading` step, `None` when nothing is loading.
    pub current_index: Option<usize>,
    pub cycle_count: u64,
    pub phase: Phase,
    pub run_state: RunState,
}

impl SequenceSnapshot {
    /// True only during the success hold of the current step.
    pub fn show_success_state(&self) -> bool {
        self.phase == Phase::Success
    }

    /// True only during the slide/exit animation window.
    pub fn is_transitioning(&self) -> bool {
        self.phase == Phase::Transitioning
    }

    pub fn statuses(&self) -> Vec<StepStatus> {
        self.steps.iter().map(|s| s.status).collect()
    }

    pub fn loading_count(&self) -> usize {
        self.steps.iter().filter(|s| s.is_loading()).count()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

//! Window Projector — picks the previous/current/next steps for a 3-slot viewport.
//!
//! Pure and deterministic: no timers, no mutation. The same snapshot always
//! yields the same window.
//!
//! # Rules
//! - A step is loading at `current_index`: it is `current`. `previous` is the step
//!   before it, or (after at least one wrap) a synthetic copy of the last step
//!   forced to `completed`. `next` is the step after it, or a synthetic copy of
//!   the first step forced to `pending`.
//! - Nothing is loading but something completed (finite terminal state): the last
//!   step is `current`, the second-to-last is `previous`, and `next` is the
//!   synthetic first-step placeholder.
//! - Nothing has started: the first step is `current`, the second is `next`.

use serde::{Deserialize, Serialize};

use crate::models::{SequenceSnapshot, Step, StepId, StepStatus};

const SYNTHETIC_PREVIOUS_SUFFIX: &str = "::wrapped-previous";
const SYNTHETIC_NEXT_SUFFIX: &str = "::wrapped-next";

/// One visible slot.
///
/// `synthetic` entries are placeholders built from a real step with a distinct
/// id; they never alias the live step with the same label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowEntry {
    pub step: Step,
    pub synthetic: bool,
}

impl WindowEntry {
    fn real(step: &Step) -> Self {
        WindowEntry {
            step: step.clone(),
            synthetic: false,
        }
    }

    fn synthetic(step: &Step, status: StepStatus, suffix: &str) -> Self {
        WindowEntry {
            step: Step {
                id: StepId::new(format!("{}{suffix}", step.id)),
                label: step.label.clone(),
                status,
            },
            synthetic: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Window {
    pub previous: Option<WindowEntry>,
    pub current: Option<WindowEntry>,
    pub next: Option<WindowEntry>,
}

impl Window {
    /// Labels in slot order, `None` for empty slots.
    pub fn labels(&self) -> [Option<&str>; 3] {
        [&self.previous, &self.current, &self.next]
            .map(|slot| slot.as_ref().map(|e| e.step.label.as_str()))
    }
}

/// Projects a snapshot onto the 3-slot window.
pub fn project(snapshot: &SequenceSnapshot) -> Window {
    project_window(&snapshot.steps, snapshot.current_index, snapshot.cycle_count)
}

/// Projection from raw parts. `current_index` is the index of the loading step,
/// or `None` when nothing is loading. An index that does not point at a loading
/// step is treated as `None`.
pub fn project_window(steps: &[Step], current_index: Option<usize>, cycle_count: u64) -> Window {
    let (Some(first), Some(last)) = (steps.first(), steps.last()) else {
        return Window::default();
    };
    let len = steps.len();

    let loading = current_index.filter(|&i| steps.get(i).is_some_and(Step::is_loading));

    if let Some(i) = loading {
        let previous = if i > 0 {
            Some(WindowEntry::real(&steps[i - 1]))
        } else if cycle_count > 0 {
            Some(WindowEntry::synthetic(
                last,
                StepStatus::Completed,
                SYNTHETIC_PREVIOUS_SUFFIX,
            ))
        } else {
            None
        };

        let next = match steps.get(i + 1) {
            Some(step) => WindowEntry::real(step),
            None => WindowEntry::synthetic(first, StepStatus::Pending, SYNTHETIC_NEXT_SUFFIX),
        };

        return Window {
            previous,
            current: Some(WindowEntry::real(&steps[i])),
            next: Some(next),
        };
    }

    if steps.iter().any(Step::is_completed) {
        return Window {
            previous: len.checked_sub(2).map(|i| WindowEntry::real(&steps[i])),
            current: Some(WindowEntry::real(last)),
            next: Some(WindowEntry::synthetic(
                first,
                StepStatus::Pending,
                SYNTHETIC_NEXT_SUFFIX,
            )),
        };
    }

    Window {
        previous: None,
        current: Some(WindowEntry::real(first)),
        next: steps.get(1).map(WindowEntry::real),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

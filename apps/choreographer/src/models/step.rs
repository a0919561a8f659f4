use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier for a step, unique within one sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(String);

impl StepId {
    pub fn new(id: impl Into<String>) -> Self {
        StepId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StepId {
    fn from(s: &str) -> Self {
        StepId::new(s)
    }
}

impl From<String> for StepId {
    fn from(s: String) -> Self {
        StepId(s)
    }
}

/// Tri-state progress of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Loading,
    Completed,
}

/// One labeled unit of progress.
///
/// Equality is by `id` only: two `Step`s with the same id are the same step
/// regardless of label or status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    /// Display text, opaque to the choreographer.
    pub label: String,
    pub status: StepStatus,
}

impl Step {
    /// A new step in the `pending` state.
    pub fn new(id: impl Into<StepId>, label: impl Into<String>) -> Self {
        Step {
            id: id.into(),
            label: label.into(),
            status: StepStatus::Pending,
        }
    }

    pub fn with_status(mut self, status: StepStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_loading(&self) -> bool {
        self.status == StepStatus::Loading
    }

    pub fn is_completed(&self) -> bool {
        self.status == StepStatus::Completed
    }
}

impl PartialEq for Step {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Step {}

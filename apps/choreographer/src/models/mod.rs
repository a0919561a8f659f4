// Data model: steps and the sequence that owns them.

pub mod sequence;
pub mod step;

pub use sequence::{Advance, Mode, Phase, RunState, Sequence, SequenceSnapshot};
pub use step::{Step, StepId, StepStatus};

//! Step choreographer for the application-coaching progress screens.
//!
//! - [`sequencer`] owns a sequence of steps and advances it on a timer
//!   (finite with a completion callback, or cyclic forever).
//! - [`window`] projects a snapshot onto the previous/current/next slots the
//!   progress UI renders.
//! - [`presets`] holds the step lists for the generation modal and the agent
//!   carousel.

pub mod config;
pub mod errors;
pub mod models;
pub mod presets;
pub mod sequencer;
pub mod window;

pub use errors::ChoreographerError;
pub use models::{Mode, Phase, RunState, SequenceSnapshot, Step, StepId, StepStatus};
pub use presets::Preset;
pub use sequencer::{Callbacks, Choreographer, PhaseEvent, Timing};
pub use window::{project, Window, WindowEntry};

// Timer-driven step choreographer.
// One spawned Tokio task per run; all status rules live in models::sequence.

pub mod callbacks;
pub mod core;
pub mod timing;

pub use callbacks::{Callbacks, PhaseEvent};
pub use self::core::Choreographer;
pub use timing::Timing;

// Pure projection of a sequence snapshot onto the visible 3-slot window.

pub mod projector;

pub use projector::{project, project_window, Window, WindowEntry};

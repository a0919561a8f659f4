use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ChoreographerError;

/// Per-phase durations for one step.
///
/// A full step takes `loading + success_hold + transition`. All three must be
/// non-zero; a zero duration is rejected rather than silently defaulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timing {
    /// Time a step spends as `loading` before the success signal.
    #[serde(rename = "loading_ms", with = "millis")]
    pub loading: Duration,
    /// Time spent showing the success icon before the slide starts.
    #[serde(rename = "success_hold_ms", with = "millis")]
    pub success_hold: Duration,
    /// Time reserved for the slide/exit animation.
    #[serde(rename = "transition_ms", with = "millis")]
    pub transition: Duration,
}

impl Timing {
    pub fn new(
        loading: Duration,
        success_hold: Duration,
        transition: Duration,
    ) -> Result<Self, ChoreographerError> {
        let timing = Timing {
            loading,
            success_hold,
            transition,
        };
        timing.validate()?;
        Ok(timing)
    }

    pub fn from_millis(
        loading_ms: u64,
        success_hold_ms: u64,
        transition_ms: u64,
    ) -> Result<Self, ChoreographerError> {
        Self::new(
            Duration::from_millis(loading_ms),
            Duration::from_millis(success_hold_ms),
            Duration::from_millis(transition_ms),
        )
    }

    pub fn validate(&self) -> Result<(), ChoreographerError> {
        for (name, value) in [
            ("loading", self.loading),
            ("success_hold", self.success_hold),
            ("transition", self.transition),
        ] {
            if value.is_zero() {
                return Err(ChoreographerError::invalid(format!(
                    "{name} duration must be positive"
                )));
            }
        }
        Ok(())
    }

    /// Wall-clock time for one step to go from `loading` to settled.
    pub fn step_total(&self) -> Duration {
        self.loading + self.success_hold + self.transition
    }
}

/// Whole milliseconds in `d`, clamped to `u64::MAX`.
pub fn saturating_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(super::saturating_millis(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

//! Built-in step lists for the two progress surfaces.
//!
//! - `LoadingModal`: runs once while a tailored résumé and cover letter are
//!   generated, then hands off to the result viewer.
//! - `AgentCarousel`: loops forever on the application-agent page while the
//!   agent is active.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ChoreographerError;
use crate::models::{Mode, Step};
use crate::sequencer::{Callbacks, Choreographer, Timing};

const LOADING_MODAL_STEPS: &[(&str, &str)] = &[
    ("parse-job", "Reading the job description"),
    ("match-profile", "Matching your experience to the role"),
    ("tailor-resume", "Tailoring your résumé"),
    ("draft-cover-letter", "Drafting your cover letter"),
    ("final-review", "Running a final quality check"),
];

const AGENT_CAROUSEL_STEPS: &[(&str, &str)] = &[
    ("scan-listings", "Scanning new job listings"),
    ("rank-matches", "Ranking matches against your profile"),
    ("prepare-answers", "Preparing screening answers"),
    ("fill-application", "Filling out the application"),
    ("submit", "Submitting and logging to your tracker"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    LoadingModal,
    AgentCarousel,
}

impl Preset {
    pub fn mode(self) -> Mode {
        match self {
            Preset::LoadingModal => Mode::Finite,
            Preset::AgentCarousel => Mode::Cyclic,
        }
    }

    pub fn steps(self) -> Vec<Step> {
        let table = match self {
            Preset::LoadingModal => LOADING_MODAL_STEPS,
            Preset::AgentCarousel => AGENT_CAROUSEL_STEPS,
        };
        table
            .iter()
            .map(|(id, label)| Step::new(*id, *label))
            .collect()
    }

    /// Default phase durations. The carousel lingers longer on each step since
    /// it never finishes.
    pub fn default_timing(self) -> Timing {
        let (loading, success_hold, transition) = match self {
            Preset::LoadingModal => (1_800, 500, 300),
            Preset::AgentCarousel => (2_500, 600, 400),
        };
        Timing {
            loading: Duration::from_millis(loading),
            success_hold: Duration::from_millis(success_hold),
            transition: Duration::from_millis(transition),
        }
    }

    /// Builds a choreographer for this preset with the given timing.
    pub fn build(
        self,
        timing: Timing,
        callbacks: Callbacks,
    ) -> Result<Choreographer, ChoreographerError> {
        Choreographer::new(self.steps(), self.mode(), timing, callbacks)
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Preset::LoadingModal => "loading_modal",
            Preset::AgentCarousel => "agent_carousel",
        })
    }
}

impl FromStr for Preset {
    type Err = ChoreographerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "loading_modal" => Ok(Preset::LoadingModal),
            "agent_carousel" => Ok(Preset::AgentCarousel),
            other => Err(ChoreographerError::invalid(format!(
                "unknown preset '{other}' (expected loading_modal or agent_carousel)"
            ))),
        }
    }
}

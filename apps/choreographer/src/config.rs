use std::time::Duration;

use anyhow::{Context, Result};

use crate::presets::Preset;
use crate::sequencer::Timing;

/// Demo configuration loaded from environment variables.
/// Every variable is optional; unset timing overrides fall back to the preset.
#[derive(Debug, Clone)]
pub struct Config {
    pub preset: Preset,
    pub timing: Timing,
    /// Cyclic runs are stopped after this many completed cycles.
    pub max_cycles: u64,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let preset = match lookup("CHOREOGRAPHER_PRESET") {
            Some(raw) => raw
                .parse::<Preset>()
                .context("CHOREOGRAPHER_PRESET must name a known preset")?,
            None => Preset::LoadingModal,
        };

        let defaults = preset.default_timing();
        let timing = Timing::new(
            duration_ms(&lookup, "CHOREOGRAPHER_LOADING_MS")?.unwrap_or(defaults.loading),
            duration_ms(&lookup, "CHOREOGRAPHER_SUCCESS_HOLD_MS")?
                .unwrap_or(defaults.success_hold),
            duration_ms(&lookup, "CHOREOGRAPHER_TRANSITION_MS")?.unwrap_or(defaults.transition),
        )
        .context("Phase durations from the environment are invalid")?;

        let max_cycles = match lookup("CHOREOGRAPHER_MAX_CYCLES") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .context("CHOREOGRAPHER_MAX_CYCLES must be a non-negative integer")?,
            None => 2,
        };

        Ok(Config {
            preset,
            timing,
            max_cycles,
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }
}

fn duration_ms(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<Duration>> {
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .with_context(|| format!("{key} must be a whole number of milliseconds"))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_nothing_is_set() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.preset, Preset::LoadingModal);
        assert_eq!(config.timing, Preset::LoadingModal.default_timing());
        assert_eq!(config.max_cycles, 2);
        assert_eq!(config.rust_log, "info");
    }

    #[test]
    fn test_overrides_apply_on_top_of_preset() {
        let config = Config::from_lookup(lookup_from(&[
            ("CHOREOGRAPHER_PRESET", "agent_carousel"),
            ("CHOREOGRAPHER_LOADING_MS", "100"),
            ("CHOREOGRAPHER_MAX_CYCLES", "5"),
        ]))
        .unwrap();

        let defaults = Preset::AgentCarousel.default_timing();
        assert_eq!(config.preset, Preset::AgentCarousel);
        assert_eq!(config.timing.loading, Duration::from_millis(100));
        assert_eq!(config.timing.success_hold, defaults.success_hold);
        assert_eq!(config.timing.transition, defaults.transition);
        assert_eq!(config.max_cycles, 5);
    }

    #[test]
    fn test_non_numeric_duration_is_an_error() {
        let err =
            Config::from_lookup(lookup_from(&[("CHOREOGRAPHER_TRANSITION_MS", "fast")])).unwrap_err();
        assert!(err
            .to_string()
            .contains("CHOREOGRAPHER_TRANSITION_MS must be a whole number"));
    }

    #[test]
    fn test_zero_duration_is_rejected() {
        let err = Config::from_lookup(lookup_from(&[("CHOREOGRAPHER_SUCCESS_HOLD_MS", "0")]))
            .unwrap_err();
        let chain = format!("{err:#}");
        assert!(chain.contains("success_hold duration must be positive"));
    }

    #[test]
    fn test_unknown_preset_is_an_error() {
        let err = Config::from_lookup(lookup_from(&[("CHOREOGRAPHER_PRESET", "toolkit")]))
            .unwrap_err();
        assert!(format!("{err:#}").contains("unknown preset 'toolkit'"));
    }
}

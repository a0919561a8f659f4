use anyhow::{Context, Result};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use choreographer::config::Config;
use choreographer::sequencer::timing::saturating_millis;
use choreographer::{project, Callbacks, Mode, RunState};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first so the log level can come from it
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting choreographer demo v{}", env!("CARGO_PKG_VERSION"));
    info!(
        preset = %config.preset,
        loading_ms = saturating_millis(config.timing.loading),
        success_hold_ms = saturating_millis(config.timing.success_hold),
        transition_ms = saturating_millis(config.timing.transition),
        "Configuration loaded"
    );

    let callbacks = Callbacks::new()
        .on_phase(|event| debug!(index = event.index, phase = %event.phase, "Phase boundary"))
        .on_complete(|| info!("All steps completed"));

    let choreo = config
        .preset
        .build(config.timing, callbacks)
        .context("Failed to build choreographer from preset")?;
    let mut updates = choreo.subscribe();
    choreo.start()?;

    let mut last_index = None;
    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();

                // Phase-only updates don't move the window.
                if snapshot.current_index != last_index || snapshot.run_state != RunState::Running {
                    last_index = snapshot.current_index;
                    let window = project(&snapshot);
                    let [previous, current, next] = window.labels();
                    let json = serde_json::to_string(&window)?;
                    info!(
                        cycle = snapshot.cycle_count,
                        previous = previous.unwrap_or("-"),
                        current = current.unwrap_or("-"),
                        next = next.unwrap_or("-"),
                        window = %json,
                        "Window"
                    );
                }

                if matches!(snapshot.run_state, RunState::Completed | RunState::Stopped) {
                    break;
                }
                if snapshot.mode == Mode::Cyclic && snapshot.cycle_count >= config.max_cycles {
                    info!(cycles = snapshot.cycle_count, "Cycle limit reached");
                    choreo.stop();
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                choreo.stop();
                break;
            }
        }
    }

    let final_state = choreo.wait().await;
    info!(state = ?final_state, "Choreographer finished");

    Ok(())
}

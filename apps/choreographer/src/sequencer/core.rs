//! Choreographer Core — timer-driven engine that advances a [`Sequence`].
//!
//! # Architecture
//! - `Choreographer` is the owner-facing handle: `start`/`pause`/`resume`/`stop`/`reset`.
//! - The phase loop is one spawned Tokio task per run. It sleeps through the
//!   three phases of the current step, then settles it and moves on.
//! - State lives behind a `std::sync::Mutex`; the lock is never held across an
//!   `.await` or while a callback runs.
//!
//! # Epochs
//! Every spawned loop captures the epoch current at spawn time. `pause`, `stop`,
//! `reset` and `Drop` bump the epoch and abort the task. Each mutation re-checks
//! the epoch under the lock, so a superseded loop can never publish a snapshot
//! or fire a callback, even if it was mid-wakeup when the abort landed.
//!
//! # Deadlines
//! Phase deadlines are chained from the previous deadline (`sleep_until`), not
//! from `Instant::now()`, so scheduling latency does not accumulate across steps.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, trace};
use uuid::Uuid;

use crate::errors::ChoreographerError;
use crate::models::{Advance, Mode, Phase, RunState, Sequence, SequenceSnapshot, Step};
use crate::sequencer::callbacks::{Callbacks, PhaseEvent};
use crate::sequencer::timing::{saturating_millis, Timing};

// ────────────────────────────────────────────────────────────────────────────
// Shared state
// ────────────────────────────────────────────────────────────────────────────

struct State {
    sequence: Sequence,
    run_state: RunState,
    epoch: u64,
    completion_fired: bool,
    task: Option<JoinHandle<()>>,
    abort: Option<AbortHandle>,
}

struct Inner {
    id: Uuid,
    timing: Timing,
    callbacks: Callbacks,
    state: Mutex<State>,
    snapshots: watch::Sender<SequenceSnapshot>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sends the current snapshot to watch subscribers. Called with the lock held
    /// so subscribers observe mutations in order.
    fn publish(&self, state: &State) -> SequenceSnapshot {
        let snapshot = state.sequence.snapshot(state.run_state);
        self.snapshots.send_replace(snapshot.clone());
        snapshot
    }

    fn is_live(state: &State, epoch: u64) -> bool {
        state.epoch == epoch && state.run_state == RunState::Running
    }

    fn still_live(&self, epoch: u64) -> bool {
        Self::is_live(&self.lock(), epoch)
    }

    fn same_epoch(&self, epoch: u64) -> bool {
        self.lock().epoch == epoch
    }

    /// Moves the current step into `phase`. Returns false when this loop is stale.
    fn enter_phase(&self, epoch: u64, phase: Phase) -> bool {
        let event = {
            let mut state = self.lock();
            if !Self::is_live(&state, epoch) {
                return false;
            }
            let Some(index) = state.sequence.current_index() else {
                return false;
            };
            state.sequence.set_phase(phase);
            self.publish(&state);
            PhaseEvent {
                index,
                cycle_count: state.sequence.cycle_count(),
                phase,
            }
        };

        trace!(choreographer = %self.id, index = event.index, %phase, "phase");
        self.callbacks.phase(&event);
        true
    }

    /// Completes the current step and advances. Returns false when the loop must end.
    fn settle(&self, epoch: u64) -> bool {
        let mut state = self.lock();
        if !Self::is_live(&state, epoch) {
            return false;
        }
        let Some(settled_index) = state.sequence.current_index() else {
            return false;
        };
        let settled_cycle = state.sequence.cycle_count();
        let advance = state.sequence.settle_current();

        match advance {
            Advance::Next { index, wrapped } => {
                let snapshot = self.publish(&state);
                drop(state);

                if wrapped {
                    debug!(
                        choreographer = %self.id,
                        cycle = snapshot.cycle_count,
                        "Sequence wrapped to first step"
                    );
                }
                trace!(choreographer = %self.id, from = settled_index, to = index, "advanced");

                // Any callback may stop or pause us; re-check before each one.
                self.callbacks.phase(&PhaseEvent {
                    index: settled_index,
                    cycle_count: settled_cycle,
                    phase: Phase::Settled,
                });
                if !self.still_live(epoch) {
                    return false;
                }
                self.callbacks.phase(&PhaseEvent {
                    index,
                    cycle_count: snapshot.cycle_count,
                    phase: Phase::Loading,
                });
                if !self.still_live(epoch) {
                    return false;
                }
                self.callbacks.step_changed(&snapshot);
                self.still_live(epoch)
            }
            Advance::Finished => {
                debug_assert!(state.sequence.is_finished());
                state.run_state = RunState::Completed;
                state.abort = None;
                let fire_complete = !state.completion_fired;
                state.completion_fired = true;
                let snapshot = self.publish(&state);
                drop(state);

                info!(
                    choreographer = %self.id,
                    steps = snapshot.steps.len(),
                    "Sequence completed"
                );

                // Completed is past stop(); only a reset() supersedes this run.
                self.callbacks.phase(&PhaseEvent {
                    index: settled_index,
                    cycle_count: settled_cycle,
                    phase: Phase::Settled,
                });
                if !self.same_epoch(epoch) {
                    return false;
                }
                self.callbacks.step_changed(&snapshot);
                if fire_complete && self.same_epoch(epoch) {
                    self.callbacks.complete();
                }
                false
            }
            Advance::Unchanged => false,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Phase loop
// ────────────────────────────────────────────────────────────────────────────

async fn run_phase_loop(inner: Arc<Inner>, epoch: u64) {
    let timing = inner.timing;
    let mut deadline = Instant::now();

    loop {
        deadline += timing.loading;
        sleep_until(deadline).await;
        if !inner.enter_phase(epoch, Phase::Success) {
            return;
        }

        deadline += timing.success_hold;
        sleep_until(deadline).await;
        if !inner.enter_phase(epoch, Phase::Transitioning) {
            return;
        }

        deadline += timing.transition;
        sleep_until(deadline).await;
        if !inner.settle(epoch) {
            return;
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Public handle
// ────────────────────────────────────────────────────────────────────────────

/// Owner-facing handle for one sequence.
///
/// Dropping the handle aborts any pending timers.
pub struct Choreographer {
    inner: Arc<Inner>,
}

impl Choreographer {
    /// Validates the configuration and builds the initial sequence. Does not
    /// schedule anything until [`start`](Self::start).
    pub fn new(
        steps: Vec<Step>,
        mode: Mode,
        timing: Timing,
        callbacks: Callbacks,
    ) -> Result<Self, ChoreographerError> {
        timing.validate()?;
        let sequence = Sequence::new(steps, mode)?;
        let (snapshots, _) = watch::channel(sequence.snapshot(RunState::Idle));
        let id = Uuid::new_v4();

        debug!(
            choreographer = %id,
            steps = sequence.steps().len(),
            ?mode,
            step_ms = saturating_millis(timing.step_total()),
            "Choreographer created"
        );

        Ok(Choreographer {
            inner: Arc::new(Inner {
                id,
                timing,
                callbacks,
                state: Mutex::new(State {
                    sequence,
                    run_state: RunState::Idle,
                    epoch: 0,
                    completion_fired: false,
                    task: None,
                    abort: None,
                }),
                snapshots,
            }),
        })
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn timing(&self) -> Timing {
        self.inner.timing
    }

    pub fn run_state(&self) -> RunState {
        self.inner.lock().run_state
    }

    pub fn snapshot(&self) -> SequenceSnapshot {
        let state = self.inner.lock();
        state.sequence.snapshot(state.run_state)
    }

    /// Watch channel that always holds the latest snapshot.
    pub fn subscribe(&self) -> watch::Receiver<SequenceSnapshot> {
        self.inner.snapshots.subscribe()
    }

    /// Begins the phase loop. No-op unless idle; on a paused choreographer this
    /// behaves like [`resume`](Self::resume).
    pub fn start(&self) -> Result<(), ChoreographerError> {
        match self.run_state() {
            RunState::Idle | RunState::Paused => self.spawn_loop("start"),
            other => {
                debug!(choreographer = %self.inner.id, state = ?other, "start ignored");
                Ok(())
            }
        }
    }

    /// Freezes progression. The current step restarts its phases on resume.
    pub fn pause(&self) {
        let mut state = self.inner.lock();
        if state.run_state != RunState::Running {
            debug!(choreographer = %self.inner.id, state = ?state.run_state, "pause ignored");
            return;
        }
        Self::cancel_task(&mut state);
        state.run_state = RunState::Paused;
        state.sequence.set_phase(Phase::Loading);
        self.inner.publish(&state);
        info!(choreographer = %self.inner.id, "Choreographer paused");
    }

    /// Re-enters the phase loop for the currently loading step.
    pub fn resume(&self) -> Result<(), ChoreographerError> {
        match self.run_state() {
            RunState::Paused => self.spawn_loop("resume"),
            other => {
                debug!(choreographer = %self.inner.id, state = ?other, "resume ignored");
                Ok(())
            }
        }
    }

    /// Clears all pending timers and freezes the sequence. Safe to call repeatedly.
    pub fn stop(&self) {
        let mut state = self.inner.lock();
        match state.run_state {
            RunState::Idle | RunState::Running | RunState::Paused => {
                Self::cancel_task(&mut state);
                state.run_state = RunState::Stopped;
                self.inner.publish(&state);
                info!(choreographer = %self.inner.id, "Choreographer stopped");
            }
            RunState::Stopped | RunState::Completed => {
                debug!(choreographer = %self.inner.id, state = ?state.run_state, "stop ignored");
            }
        }
    }

    /// Stops any running loop and restores the initial state (first step
    /// loading, cycle count 0). Call [`start`](Self::start) afterwards to run again.
    pub fn reset(&self) {
        let mut state = self.inner.lock();
        Self::cancel_task(&mut state);
        state.sequence.reset();
        state.run_state = RunState::Idle;
        state.completion_fired = false;
        self.inner.publish(&state);
        debug!(choreographer = %self.inner.id, "Choreographer reset");
    }

    /// Waits for the current phase loop to end and returns the run state at
    /// that point. A panic raised by a callback is re-raised here.
    ///
    /// Never returns for a running cyclic sequence unless it is paused or stopped.
    pub async fn wait(&self) -> RunState {
        loop {
            let task = self.inner.lock().task.take();
            let Some(task) = task else {
                return self.run_state();
            };
            if let Err(err) = task.await {
                if err.is_panic() {
                    std::panic::resume_unwind(err.into_panic());
                }
            }
        }
    }

    fn spawn_loop(&self, reason: &'static str) -> Result<(), ChoreographerError> {
        let runtime = Handle::try_current().map_err(|_| ChoreographerError::NoRuntime)?;

        let (index, event) = {
            let mut state = self.inner.lock();
            // Re-check under the lock: another caller may have won the race.
            if !matches!(state.run_state, RunState::Idle | RunState::Paused) {
                return Ok(());
            }
            Self::cancel_task(&mut state);
            let epoch = state.epoch;
            state.run_state = RunState::Running;
            state.sequence.set_phase(Phase::Loading);
            self.inner.publish(&state);

            let task = runtime.spawn(run_phase_loop(Arc::clone(&self.inner), epoch));
            state.abort = Some(task.abort_handle());
            state.task = Some(task);

            let index = state.sequence.current_index();
            let event = index.map(|index| PhaseEvent {
                index,
                cycle_count: state.sequence.cycle_count(),
                phase: Phase::Loading,
            });
            (index, event)
        };

        info!(choreographer = %self.inner.id, ?index, "Choreographer {reason}");
        if let Some(event) = event {
            self.inner.callbacks.phase(&event);
        }
        Ok(())
    }

    /// Invalidates the running loop (if any) and aborts its task.
    fn cancel_task(state: &mut State) {
        state.epoch += 1;
        if let Some(abort) = state.abort.take() {
            abort.abort();
        }
        state.task = None;
    }
}

impl Drop for Choreographer {
    fn drop(&mut self) {
        let mut state = self.inner.lock();
        Self::cancel_task(&mut state);
    }
}

impl std::fmt::Debug for Choreographer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("Choreographer")
            .field("id", &self.inner.id)
            .field("mode", &state.sequence.mode())
            .field("run_state", &state.run_state)
            .field("current_index", &state.sequence.current_index())
            .field("cycle_count", &state.sequence.cycle_count())
            .finish()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StepStatus::{self, Completed, Loading, Pending};
    use crate::window::project;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        changes: Mutex<Vec<SequenceSnapshot>>,
        phases: Mutex<Vec<PhaseEvent>>,
        completions: Mutex<u32>,
    }

    impl Recorder {
        fn callbacks(self: &Arc<Self>) -> Callbacks {
            let on_change = Arc::clone(self);
            let on_phase = Arc::clone(self);
            let on_complete = Arc::clone(self);
            Callbacks::new()
                .on_step_change(move |snap| on_change.changes.lock().unwrap().push(snap.clone()))
                .on_phase(move |event| on_phase.phases.lock().unwrap().push(*event))
                .on_complete(move || *on_complete.completions.lock().unwrap() += 1)
        }

        fn change_count(&self) -> usize {
            self.changes.lock().unwrap().len()
        }

        fn last_statuses(&self) -> Vec<StepStatus> {
            self.changes
                .lock()
                .unwrap()
                .last()
                .map(SequenceSnapshot::statuses)
                .unwrap_or_default()
        }

        fn completions(&self) -> u32 {
            *self.completions.lock().unwrap()
        }
    }

    fn make_steps(ids: &[&str]) -> Vec<Step> {
        ids.iter().map(|id| Step::new(*id, id.to_uppercase())).collect()
    }

    fn make_timing() -> Timing {
        Timing::from_millis(100, 50, 20).unwrap()
    }

    fn make(mode: Mode, ids: &[&str]) -> (Choreographer, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let choreo =
            Choreographer::new(make_steps(ids), mode, make_timing(), recorder.callbacks()).unwrap();
        (choreo, recorder)
    }

    async fn at(t0: Instant, ms: u64) {
        sleep_until(t0 + Duration::from_millis(ms)).await;
    }

    // ── construction ────────────────────────────────────────────────────────

    #[test]
    fn test_new_rejects_empty_steps() {
        let err = Choreographer::new(vec![], Mode::Finite, make_timing(), Callbacks::new())
            .unwrap_err();
        assert!(matches!(err, ChoreographerError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_new_rejects_zero_duration() {
        let timing = Timing {
            loading: Duration::ZERO,
            success_hold: Duration::from_millis(10),
            transition: Duration::from_millis(10),
        };
        let err = Choreographer::new(make_steps(&["a"]), Mode::Finite, timing, Callbacks::new())
            .unwrap_err();
        assert!(err.to_string().contains("loading duration must be positive"));
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let (choreo, _) = make(Mode::Finite, &["a"]);
        assert_eq!(choreo.start(), Err(ChoreographerError::NoRuntime));
        assert_eq!(choreo.run_state(), RunState::Idle);
    }

    #[test]
    fn test_finite_without_on_complete_is_allowed() {
        let choreo = Choreographer::new(
            make_steps(&["a", "b"]),
            Mode::Finite,
            make_timing(),
            Callbacks::new(),
        );
        assert!(choreo.is_ok());
    }

    // ── finite scenario ─────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_finite_three_step_timeline() {
        let (choreo, rec) = make(Mode::Finite, &["a", "b", "c"]);
        let t0 = Instant::now();
        choreo.start().unwrap();

        at(t0, 169).await;
        assert_eq!(rec.change_count(), 0);
        assert!(choreo.snapshot().is_transitioning());

        at(t0, 171).await;
        assert_eq!(rec.change_count(), 1);
        assert_eq!(rec.last_statuses(), vec![Completed, Loading, Pending]);

        at(t0, 341).await;
        assert_eq!(rec.change_count(), 2);
        assert_eq!(rec.last_statuses(), vec![Completed, Completed, Loading]);
        assert_eq!(rec.completions(), 0);

        at(t0, 511).await;
        assert_eq!(rec.completions(), 1);
        assert_eq!(rec.last_statuses(), vec![Completed, Completed, Completed]);
        assert_eq!(choreo.run_state(), RunState::Completed);
        assert_eq!(choreo.snapshot().phase, Phase::Settled);

        let changes_at_end = rec.change_count();
        at(t0, 10_000).await;
        assert_eq!(rec.change_count(), changes_at_end);
        assert_eq!(rec.completions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finite_phase_events_in_order() {
        let (choreo, rec) = make(Mode::Finite, &["a", "b"]);
        choreo.start().unwrap();
        assert_eq!(choreo.wait().await, RunState::Completed);

        let phases: Vec<(usize, Phase)> = rec
            .phases
            .lock()
            .unwrap()
            .iter()
            .map(|e| (e.index, e.phase))
            .collect();
        assert_eq!(
            phases,
            vec![
                (0, Phase::Loading),
                (0, Phase::Success),
                (0, Phase::Transitioning),
                (0, Phase::Settled),
                (1, Phase::Loading),
                (1, Phase::Success),
                (1, Phase::Transitioning),
                (1, Phase::Settled),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_flag_only_during_hold() {
        let (choreo, _rec) = make(Mode::Finite, &["a", "b"]);
        let t0 = Instant::now();
        choreo.start().unwrap();

        at(t0, 50).await;
        let snap = choreo.snapshot();
        assert!(!snap.show_success_state() && !snap.is_transitioning());

        at(t0, 120).await;
        assert!(choreo.snapshot().show_success_state());

        at(t0, 160).await;
        let snap = choreo.snapshot();
        assert!(snap.is_transitioning());
        assert!(!snap.show_success_state());
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_loading_invariant_in_every_change() {
        let (choreo, rec) = make(Mode::Finite, &["a", "b", "c", "d", "e"]);
        choreo.start().unwrap();
        choreo.wait().await;

        let changes = rec.changes.lock().unwrap();
        assert_eq!(changes.len(), 5);
        for snap in changes.iter().take(4) {
            assert_eq!(snap.loading_count(), 1);
        }
        assert_eq!(changes[4].loading_count(), 0);
    }

    // ── cyclic scenario ─────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_cyclic_wrap_after_three_advances() {
        let (choreo, rec) = make(Mode::Cyclic, &["a", "b", "c"]);
        let t0 = Instant::now();
        choreo.start().unwrap();

        at(t0, 341).await;
        assert_eq!(choreo.snapshot().cycle_count, 0);

        at(t0, 511).await;
        let snap = choreo.snapshot();
        assert_eq!(snap.cycle_count, 1);
        assert_eq!(snap.current_index, Some(0));
        assert_eq!(snap.statuses(), vec![Loading, Pending, Completed]);

        let window = project(&snap);
        let next = window.next.unwrap();
        assert!(!next.synthetic);
        assert_eq!(next.step.id.as_str(), "b");
        let previous = window.previous.unwrap();
        assert!(previous.synthetic);
        assert_eq!(previous.step.status, Completed);
        assert_ne!(previous.step.id.as_str(), "c");

        assert_eq!(rec.completions(), 0);
        choreo.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cyclic_cycle_count_only_increases() {
        let (choreo, rec) = make(Mode::Cyclic, &["a", "b"]);
        let t0 = Instant::now();
        choreo.start().unwrap();

        at(t0, 170 * 10 + 1).await;
        choreo.stop();

        let changes = rec.changes.lock().unwrap();
        assert_eq!(changes.len(), 10);
        let cycles: Vec<u64> = changes.iter().map(|s| s.cycle_count).collect();
        assert!(cycles.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*cycles.last().unwrap(), 5);
        assert!(changes.iter().all(|s| s.loading_count() == 1));
        assert_eq!(rec.completions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrapped_snapshot_never_has_stale_cycle() {
        let (choreo, rec) = make(Mode::Cyclic, &["a", "b", "c"]);
        let t0 = Instant::now();
        choreo.start().unwrap();
        at(t0, 170 * 7 + 1).await;
        choreo.stop();

        for snap in rec.changes.lock().unwrap().iter() {
            if snap.current_index == Some(0) {
                assert!(snap.cycle_count >= 1);
            }
        }
    }

    // ── lifecycle ───────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_double_start_does_not_duplicate_timers() {
        let (choreo, rec) = make(Mode::Finite, &["a", "b", "c"]);
        let t0 = Instant::now();
        choreo.start().unwrap();
        choreo.start().unwrap();

        at(t0, 171).await;
        choreo.start().unwrap();
        assert_eq!(rec.change_count(), 1);

        at(t0, 511).await;
        assert_eq!(rec.change_count(), 3);
        assert_eq!(rec.completions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_callbacks_after_stop() {
        let (choreo, rec) = make(Mode::Cyclic, &["a", "b", "c"]);
        let t0 = Instant::now();
        choreo.start().unwrap();

        at(t0, 200).await;
        choreo.stop();
        let changes = rec.change_count();
        let phases = rec.phases.lock().unwrap().len();

        at(t0, 60_000).await;
        assert_eq!(rec.change_count(), changes);
        assert_eq!(rec.phases.lock().unwrap().len(), phases);
        assert_eq!(choreo.run_state(), RunState::Stopped);
        assert_eq!(choreo.snapshot().current_index, Some(1));
    }

    type Slot = Arc<Mutex<Option<Arc<Choreographer>>>>;

    /// Counts callbacks that arrive after a callback has stopped the choreographer.
    #[derive(Default)]
    struct AfterStop {
        stopped: Mutex<bool>,
        phases: Mutex<u32>,
        changes: Mutex<u32>,
    }

    impl AfterStop {
        fn stop_now(&self, slot: &Slot) {
            *self.stopped.lock().unwrap() = true;
            if let Some(c) = slot.lock().unwrap().as_ref() {
                c.stop();
            }
        }

        fn is_stopped(&self) -> bool {
            *self.stopped.lock().unwrap()
        }
    }

    fn make_reentrant(callbacks: Callbacks, slot: &Slot) -> Arc<Choreographer> {
        let choreo = Arc::new(
            Choreographer::new(make_steps(&["a", "b", "c"]), Mode::Cyclic, make_timing(), callbacks)
                .unwrap(),
        );
        *slot.lock().unwrap() = Some(Arc::clone(&choreo));
        choreo
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_from_on_phase_silences_rest_of_settle() {
        let slot: Slot = Arc::default();
        let log = Arc::new(AfterStop::default());

        let (phase_log, phase_slot) = (Arc::clone(&log), Arc::clone(&slot));
        let change_log = Arc::clone(&log);
        let callbacks = Callbacks::new()
            .on_phase(move |event| {
                if phase_log.is_stopped() {
                    *phase_log.phases.lock().unwrap() += 1;
                } else if event.phase == Phase::Settled {
                    phase_log.stop_now(&phase_slot);
                }
            })
            .on_step_change(move |_| {
                if change_log.is_stopped() {
                    *change_log.changes.lock().unwrap() += 1;
                }
            });

        let choreo = make_reentrant(callbacks, &slot);
        choreo.start().unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(log.is_stopped());
        assert_eq!(*log.phases.lock().unwrap(), 0);
        assert_eq!(*log.changes.lock().unwrap(), 0);
        assert_eq!(choreo.run_state(), RunState::Stopped);
        assert_eq!(choreo.snapshot().current_index, Some(1));

        slot.lock().unwrap().take();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_from_on_step_change_silences_later_phases() {
        let slot: Slot = Arc::default();
        let log = Arc::new(AfterStop::default());

        let phase_log = Arc::clone(&log);
        let (change_log, change_slot) = (Arc::clone(&log), Arc::clone(&slot));
        let callbacks = Callbacks::new()
            .on_phase(move |_| {
                if phase_log.is_stopped() {
                    *phase_log.phases.lock().unwrap() += 1;
                }
            })
            .on_step_change(move |_| {
                if change_log.is_stopped() {
                    *change_log.changes.lock().unwrap() += 1;
                } else {
                    change_log.stop_now(&change_slot);
                }
            });

        let choreo = make_reentrant(callbacks, &slot);
        choreo.start().unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(log.is_stopped());
        assert_eq!(*log.phases.lock().unwrap(), 0);
        assert_eq!(*log.changes.lock().unwrap(), 0);
        assert_eq!(choreo.run_state(), RunState::Stopped);

        slot.lock().unwrap().take();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent_and_blocks_restart() {
        let (choreo, rec) = make(Mode::Finite, &["a", "b"]);
        choreo.start().unwrap();
        choreo.stop();
        choreo.stop();
        choreo.pause();
        choreo.resume().unwrap();
        choreo.start().unwrap();
        assert_eq!(choreo.run_state(), RunState::Stopped);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(rec.change_count(), 0);
        assert_eq!(rec.completions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_restarts_current_step_on_resume() {
        let (choreo, rec) = make(Mode::Finite, &["a", "b", "c"]);
        let t0 = Instant::now();
        choreo.start().unwrap();

        // Pause inside step b's success hold.
        at(t0, 290).await;
        assert_eq!(rec.change_count(), 1);
        choreo.pause();
        assert_eq!(choreo.run_state(), RunState::Paused);
        assert!(!choreo.snapshot().show_success_state());

        at(t0, 5_000).await;
        assert_eq!(rec.change_count(), 1);

        choreo.resume().unwrap();
        // Step b replays its full 170ms sequence from the resume point.
        at(t0, 5_169).await;
        assert_eq!(rec.change_count(), 1);
        at(t0, 5_171).await;
        assert_eq!(rec.change_count(), 2);
        assert_eq!(rec.last_statuses(), vec![Completed, Completed, Loading]);

        assert_eq!(choreo.wait().await, RunState::Completed);
        assert_eq!(rec.completions(), 1);
        assert_eq!(rec.change_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_rearms_and_completion_fires_again() {
        let (choreo, rec) = make(Mode::Finite, &["a"]);
        choreo.start().unwrap();
        assert_eq!(choreo.wait().await, RunState::Completed);
        assert_eq!(rec.completions(), 1);

        choreo.reset();
        let snap = choreo.snapshot();
        assert_eq!(snap.run_state, RunState::Idle);
        assert_eq!(snap.statuses(), vec![Loading]);

        choreo.start().unwrap();
        assert_eq!(choreo.wait().await, RunState::Completed);
        assert_eq!(rec.completions(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_pending_timers() {
        let (choreo, rec) = make(Mode::Cyclic, &["a", "b"]);
        choreo.start().unwrap();
        drop(choreo);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(rec.change_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_from_on_complete_is_harmless() {
        let slot: Arc<Mutex<Option<Arc<Choreographer>>>> = Arc::new(Mutex::new(None));
        let completions = Arc::new(Mutex::new(0u32));

        let slot_cb = Arc::clone(&slot);
        let completions_cb = Arc::clone(&completions);
        let callbacks = Callbacks::new().on_complete(move || {
            *completions_cb.lock().unwrap() += 1;
            if let Some(c) = slot_cb.lock().unwrap().as_ref() {
                c.stop();
            }
        });

        let choreo = Arc::new(
            Choreographer::new(make_steps(&["a", "b"]), Mode::Finite, make_timing(), callbacks)
                .unwrap(),
        );
        *slot.lock().unwrap() = Some(Arc::clone(&choreo));

        choreo.start().unwrap();
        assert_eq!(choreo.wait().await, RunState::Completed);
        assert_eq!(*completions.lock().unwrap(), 1);

        slot.lock().unwrap().take();
    }

    #[tokio::test(start_paused = true)]
    #[should_panic(expected = "collaborator failed")]
    async fn test_callback_panic_propagates_through_wait() {
        let callbacks = Callbacks::new().on_complete(|| panic!("collaborator failed"));
        let choreo =
            Choreographer::new(make_steps(&["a"]), Mode::Finite, make_timing(), callbacks)
                .unwrap();
        choreo.start().unwrap();
        choreo.wait().await;
    }

    // ── subscription ────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_sees_latest_snapshot() {
        let (choreo, _rec) = make(Mode::Finite, &["a", "b"]);
        let mut rx = choreo.subscribe();
        assert_eq!(rx.borrow().run_state, RunState::Idle);

        choreo.start().unwrap();
        let t0 = Instant::now();
        at(t0, 171).await;

        assert!(rx.has_changed().unwrap());
        let snap = rx.borrow_and_update().clone();
        assert_eq!(snap.current_index, Some(1));
        assert_eq!(snap.run_state, RunState::Running);
    }
}

//! Session state machine
//!
//! Inactive → Active on `start`, Active → Active on `update`, Active →
//! Inactive on `stop`. Exactly one session exists at a time; starting a new
//! one tears the old one down first.
//!
//! Three locks, always taken in this order when nested:
//!
//! 1. `lifecycle` serializes start/stop against each other.
//! 2. `injection` serializes every sink call and every publish, so the sink
//!    and the broadcaster see targets in order.
//! 3. `state` guards the session and attached run; it is only ever held
//!    briefly and never across a sink call. A run's own lock may be taken
//!    inside it, never the other way round.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use super::{reassert, SessionStatus, SpoofError};
use crate::broadcast::{BroadcastSnapshot, PositionBroadcaster};
use crate::config::Settings;
use crate::geo::Coordinate;
use crate::injection::{InjectionSink, SpoofMode};
use crate::route::{RunHandle, RunStatus};
use crate::stealth::Humanizer;
use crate::{lock, try_lock};

/// One sink per mode
#[derive(Clone)]
pub struct Sinks {
    detectable: Arc<dyn InjectionSink>,
    undetectable: Arc<dyn InjectionSink>,
}

impl Sinks {
    /// Create the sink pair
    pub fn new(detectable: Arc<dyn InjectionSink>, undetectable: Arc<dyn InjectionSink>) -> Self {
        Self {
            detectable,
            undetectable,
        }
    }

    /// Sink backing `mode`
    pub fn for_mode(&self, mode: SpoofMode) -> Arc<dyn InjectionSink> {
        match mode {
            SpoofMode::Detectable => Arc::clone(&self.detectable),
            SpoofMode::Undetectable => Arc::clone(&self.undetectable),
        }
    }
}

/// The live session
struct Session {
    generation: u64,
    mode: SpoofMode,
    target: Coordinate,
    sink: Arc<dyn InjectionSink>,
    humanizer: Humanizer,
    reassert: CancellationToken,
}

#[derive(Default)]
struct ControllerState {
    session: Option<Session>,
    run: Option<RunHandle>,
}

struct Inner {
    sinks: Sinks,
    broadcaster: Arc<dyn PositionBroadcaster>,
    runtime: Handle,
    settings: RwLock<Settings>,
    lifecycle: Mutex<()>,
    injection: Mutex<()>,
    state: Mutex<ControllerState>,
    generations: AtomicU64,
}

/// Owner of the spoofing session
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct SpoofController {
    inner: Arc<Inner>,
}

impl SpoofController {
    /// Create an inactive controller
    ///
    /// Periodic work is spawned on `runtime`.
    pub fn new(
        sinks: Sinks,
        broadcaster: Arc<dyn PositionBroadcaster>,
        settings: Settings,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                sinks,
                broadcaster,
                runtime,
                settings: RwLock::new(settings),
                lifecycle: Mutex::new(()),
                injection: Mutex::new(()),
                state: Mutex::new(ControllerState::default()),
                generations: AtomicU64::new(0),
            }),
        }
    }

    /// Current settings
    pub fn settings(&self) -> Settings {
        self.inner
            .settings
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Replace settings; sessions and runs started afterwards use them
    pub fn update_settings(&self, settings: Settings) {
        *self
            .inner
            .settings
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = settings;
    }

    /// Current session state
    pub fn status(&self) -> SessionStatus {
        let state = lock(&self.inner.state);
        match &state.session {
            Some(session) => SessionStatus::Active {
                mode: session.mode,
                target: session.target,
            },
            None => SessionStatus::Inactive,
        }
    }

    /// Whether a session is active
    pub fn is_active(&self) -> bool {
        lock(&self.inner.state).session.is_some()
    }

    /// The asserted target, if active
    pub fn target(&self) -> Option<Coordinate> {
        lock(&self.inner.state).session.as_ref().map(|s| s.target)
    }

    /// Start asserting `coordinate` through the `mode` sink
    ///
    /// Any existing session (and its route run) is torn down first, so on
    /// error the controller is always Inactive.
    pub fn start(&self, coordinate: Coordinate, mode: SpoofMode) -> Result<(), SpoofError> {
        let coordinate = coordinate.validate()?;
        let _lifecycle = lock(&self.inner.lifecycle);

        if self.teardown().is_some() {
            log::info!("Replacing active session");
        }

        let sink = self.inner.sinks.for_mode(mode);
        if !sink.is_available() {
            log::warn!("{} injection unavailable", mode);
            return Err(SpoofError::SinkUnavailable(mode));
        }

        let settings = self.settings();
        let humanizer = Humanizer::new(settings.stealth.clone());

        {
            let _injection = lock(&self.inner.injection);
            if let Err(e) = sink.start(&humanizer.humanize(&coordinate)) {
                log::error!("Failed to start {} injection: {}", mode, e);
                if let Err(stop_err) = sink.stop() {
                    log::debug!("Cleanup after failed start also failed: {}", stop_err);
                }
                return Err(e.into());
            }
            self.publish(BroadcastSnapshot::active(&coordinate));
        }

        let generation = self.inner.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let token = CancellationToken::new();

        lock(&self.inner.state).session = Some(Session {
            generation,
            mode,
            target: coordinate,
            sink,
            humanizer,
            reassert: token.clone(),
        });

        reassert::spawn(
            self.clone(),
            generation,
            token,
            settings.injection.reassert_interval(),
        );

        log::info!("Spoofing started at {} ({})", coordinate, mode);
        Ok(())
    }

    /// Replace the target and assert it immediately
    ///
    /// On a sink failure the new target is kept and will be retried by the
    /// re-assertion loop.
    pub fn update(&self, coordinate: Coordinate) -> Result<(), SpoofError> {
        let coordinate = coordinate.validate()?;

        let generation = {
            let mut state = lock(&self.inner.state);
            let session = state.session.as_mut().ok_or(SpoofError::NotActive)?;
            session.target = coordinate;
            session.generation
        };

        self.assert_current(generation, true).map(|_| ())
    }

    /// End the session
    ///
    /// Disarms the re-assertion loop, cancels any route run, disengages the
    /// sink and publishes inactive. The controller is Inactive when this
    /// returns, even if the sink reported an error while disengaging. A
    /// no-op when already Inactive.
    pub fn stop(&self) -> Result<(), SpoofError> {
        let _lifecycle = lock(&self.inner.lifecycle);

        match self.teardown() {
            Some(Err(e)) => Err(e.into()),
            Some(Ok(())) => {
                log::info!("Spoofing stopped");
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// End session `generation` if route run `run_id` is still attached to it
    ///
    /// Returns `Ok(false)` without touching anything when a newer session or
    /// run has taken over.
    pub(crate) fn stop_if_current(
        &self,
        generation: u64,
        run_id: u64,
    ) -> Result<bool, SpoofError> {
        let _lifecycle = lock(&self.inner.lifecycle);

        let owned = |state: &ControllerState| {
            state.session.as_ref().map(|s| s.generation) == Some(generation)
                && state.run.as_ref().map(RunHandle::id) == Some(run_id)
        };

        match self.teardown_if(owned) {
            Some(Err(e)) => Err(e.into()),
            Some(Ok(())) => {
                log::info!("Spoofing stopped by route run {}", run_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub(crate) fn runtime(&self) -> &Handle {
        &self.inner.runtime
    }

    /// Make `run` the session's route run, halting any previous one
    pub(crate) fn attach_run(&self, run: RunHandle) -> Result<(), SpoofError> {
        let previous = {
            let mut state = lock(&self.inner.state);
            if state.session.is_none() {
                return Err(SpoofError::NotActive);
            }
            let previous = state.run.replace(run);
            if let Some(previous) = &previous {
                previous.halt(RunStatus::Idle);
            }
            previous
        };

        if let Some(previous) = previous {
            log::info!("Route run {} superseded", previous.id());
        }
        Ok(())
    }

    /// Discard the attached run
    pub(crate) fn detach_run(&self) -> Option<RunHandle> {
        let mut state = lock(&self.inner.state);
        let run = state.run.take();
        if let Some(run) = &run {
            run.halt(RunStatus::Idle);
        }
        run
    }

    /// The attached run, if any
    pub(crate) fn current_run(&self) -> Option<RunHandle> {
        lock(&self.inner.state).run.clone()
    }

    /// Retarget the session to a position produced by route run `run_id`
    ///
    /// Only records the target; the caller pushes it with [`Self::push_current`]
    /// off the timer thread. Fails with `NotActive` if that run is no longer
    /// attached, which is how in-flight ticks learn they were cancelled.
    pub(crate) fn retarget_from_run(
        &self,
        run_id: u64,
        coordinate: Coordinate,
    ) -> Result<u64, SpoofError> {
        let mut state = lock(&self.inner.state);
        if state.run.as_ref().map(RunHandle::id) != Some(run_id) {
            return Err(SpoofError::NotActive);
        }
        let session = state.session.as_mut().ok_or(SpoofError::NotActive)?;
        session.target = coordinate;
        Ok(session.generation)
    }

    /// Push the latest target of session `generation` unless a sink call is
    /// already in flight
    ///
    /// Errors are logged, never propagated; the next tick retries.
    pub(crate) fn push_current(&self, generation: u64) {
        match self.assert_current(generation, false) {
            Ok(true) => {}
            Ok(false) => log::debug!("Injection in flight, assertion skipped"),
            Err(SpoofError::NotActive) => {
                log::debug!("Session {} ended, assertion dropped", generation)
            }
            Err(e) => log::warn!("Assertion failed, retrying next tick: {}", e),
        }
    }

    /// Push the session's current target to its sink and publish it
    ///
    /// Reads the target under the injection lock so the sink always gets the
    /// latest one. When `wait` is false and another call is in flight,
    /// returns `Ok(false)` without touching the sink.
    fn assert_current(&self, generation: u64, wait: bool) -> Result<bool, SpoofError> {
        let _injection = if wait {
            lock(&self.inner.injection)
        } else {
            match try_lock(&self.inner.injection) {
                Some(guard) => guard,
                None => return Ok(false),
            }
        };

        let (target, sink, humanizer) = {
            let state = lock(&self.inner.state);
            match &state.session {
                Some(s) if s.generation == generation => {
                    (s.target, Arc::clone(&s.sink), s.humanizer.clone())
                }
                _ => return Err(SpoofError::NotActive),
            }
        };

        sink.update(&humanizer.humanize(&target))?;
        self.publish(BroadcastSnapshot::active(&target));
        Ok(true)
    }

    /// Tear down the session and run, if any
    ///
    /// Caller holds the lifecycle lock. Returns `None` if nothing was active,
    /// otherwise the result of disengaging the sink.
    fn teardown(&self) -> Option<Result<(), crate::injection::SinkError>> {
        self.teardown_if(|_| true)
    }

    /// [`Self::teardown`], but only if `owned` accepts the state
    fn teardown_if(
        &self,
        owned: impl FnOnce(&ControllerState) -> bool,
    ) -> Option<Result<(), crate::injection::SinkError>> {
        let session = {
            let mut state = lock(&self.inner.state);
            if !owned(&state) {
                return None;
            }
            // Halted under the state lock so an in-flight tick sees the halt
            // before it sees the run gone
            if let Some(run) = state.run.take() {
                run.halt(RunStatus::Idle);
            }
            state.session.take()
        };

        let session = session?;
        session.reassert.cancel();

        // Waits for any in-flight assertion to drain
        let _injection = lock(&self.inner.injection);
        let result = session.sink.stop();
        if let Err(e) = &result {
            log::warn!("Failed to disengage {} sink: {}", session.mode, e);
        }
        self.publish(BroadcastSnapshot::inactive());

        Some(result)
    }

    fn publish(&self, snapshot: BroadcastSnapshot) {
        if let Err(e) = self.inner.broadcaster.publish(snapshot) {
            log::warn!("Failed to publish position: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::route::{Direction, RoutePath, SimulationRun};
    use crate::testing::{northbound_path, test_settings, RecordingBroadcaster, RecordingSink};

    struct Fixture {
        controller: SpoofController,
        detectable: RecordingSink,
        undetectable: RecordingSink,
        broadcaster: Arc<RecordingBroadcaster>,
    }

    fn fixture() -> Fixture {
        let detectable = RecordingSink::new();
        let undetectable = RecordingSink::new();
        let broadcaster = Arc::new(RecordingBroadcaster::new());
        let controller = SpoofController::new(
            Sinks::new(Arc::new(detectable.clone()), Arc::new(undetectable.clone())),
            broadcaster.clone(),
            test_settings(),
            Handle::current(),
        );

        Fixture {
            controller,
            detectable,
            undetectable,
            broadcaster,
        }
    }

    fn paris() -> Coordinate {
        Coordinate::new(48.8566, 2.3522)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_start_update_stop() {
        let f = fixture();

        f.controller.start(paris(), SpoofMode::Detectable).unwrap();
        assert_eq!(
            f.controller.status(),
            SessionStatus::Active {
                mode: SpoofMode::Detectable,
                target: paris()
            }
        );
        assert_eq!(f.detectable.starts(), 1);

        let next = Coordinate::new(48.8570, 2.3530);
        f.controller.update(next).unwrap();
        assert_eq!(f.controller.target(), Some(next));
        assert_eq!(f.detectable.last_coordinate(), Some(next));

        f.controller.stop().unwrap();
        assert!(!f.controller.is_active());
        assert_eq!(f.detectable.stops(), 1);
        assert_eq!(f.broadcaster.last(), Some(BroadcastSnapshot::inactive()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_update_after_stop_is_not_active() {
        let f = fixture();
        f.controller.start(paris(), SpoofMode::Detectable).unwrap();
        f.controller.stop().unwrap();

        assert!(matches!(
            f.controller.update(paris()),
            Err(SpoofError::NotActive)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_invalid_coordinate_rejected_without_side_effects() {
        let f = fixture();

        let err = f
            .controller
            .start(Coordinate::new(123.0, 2.0), SpoofMode::Detectable)
            .unwrap_err();
        assert!(matches!(err, SpoofError::InvalidCoordinate { .. }));
        assert_eq!(f.detectable.starts(), 0);
        assert!(f.broadcaster.all().is_empty());

        f.controller.start(paris(), SpoofMode::Detectable).unwrap();
        assert!(matches!(
            f.controller.update(Coordinate::new(0.0, 200.0)),
            Err(SpoofError::InvalidCoordinate { .. })
        ));
        assert_eq!(f.controller.target(), Some(paris()));
        f.controller.stop().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unavailable_mode_stays_inactive_then_fallback_succeeds() {
        let f = fixture();
        f.undetectable.set_available(false);

        let err = f
            .controller
            .start(paris(), SpoofMode::Undetectable)
            .unwrap_err();
        assert!(matches!(
            err,
            SpoofError::SinkUnavailable(SpoofMode::Undetectable)
        ));
        assert!(!f.controller.is_active());
        assert_eq!(f.undetectable.starts(), 0);
        assert_eq!(f.undetectable.updates(), 0);

        f.controller.start(paris(), SpoofMode::Detectable).unwrap();
        assert!(f.controller.is_active());
        f.controller.stop().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failed_sink_start_is_authoritative() {
        let f = fixture();
        f.detectable.fail_start(true);

        let err = f.controller.start(paris(), SpoofMode::Detectable).unwrap_err();
        assert!(matches!(err, SpoofError::Sink(_)));
        assert!(!f.controller.is_active());
        // Cleaned up so a retry starts fresh
        assert_eq!(f.detectable.stops(), 1);
        assert!(f.broadcaster.all().is_empty());

        f.detectable.fail_start(false);
        f.controller.start(paris(), SpoofMode::Detectable).unwrap();
        assert!(f.controller.is_active());
        f.controller.stop().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_mode_switch_tears_down_old_sink_first() {
        let f = fixture();

        f.controller.start(paris(), SpoofMode::Detectable).unwrap();
        f.controller.start(paris(), SpoofMode::Undetectable).unwrap();

        assert_eq!(f.detectable.stops(), 1);
        assert_eq!(f.undetectable.starts(), 1);
        assert!(f.detectable.stopped_before(&f.undetectable));
        assert_eq!(
            f.controller.status(),
            SessionStatus::Active {
                mode: SpoofMode::Undetectable,
                target: paris()
            }
        );

        // The old sink sees no more traffic
        let updates = f.detectable.updates();
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(f.detectable.updates(), updates);
        f.controller.stop().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_reassertion_loop_repeats_target() {
        let f = fixture();
        f.controller.start(paris(), SpoofMode::Detectable).unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(f.detectable.updates() >= 3, "got {}", f.detectable.updates());
        assert_eq!(f.detectable.last_coordinate(), Some(paris()));

        f.controller.stop().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_no_ticks_after_stop() {
        let f = fixture();
        f.controller.start(paris(), SpoofMode::Detectable).unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        f.controller.stop().unwrap();
        let updates = f.detectable.updates();
        let published = f.broadcaster.all().len();

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(f.detectable.updates(), updates);
        assert_eq!(f.broadcaster.all().len(), published);
        assert_eq!(f.broadcaster.last(), Some(BroadcastSnapshot::inactive()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_transient_tick_failures_keep_session() {
        let f = fixture();
        f.controller.start(paris(), SpoofMode::Detectable).unwrap();

        f.detectable.fail_update(true);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(f.controller.is_active());

        f.detectable.fail_update(false);
        let before = f.detectable.successful_updates();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(f.detectable.successful_updates() > before);

        f.controller.stop().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_slow_sink_calls_never_overlap() {
        let f = fixture();
        f.detectable.set_delay(Duration::from_millis(45));
        f.controller.start(paris(), SpoofMode::Detectable).unwrap();

        tokio::time::sleep(Duration::from_millis(250)).await;
        f.controller.stop().unwrap();

        assert_eq!(f.detectable.max_concurrent(), 1);
        // Ticks fire every 20ms but calls take 45ms, so some were dropped
        assert!(f.detectable.updates() < 12, "got {}", f.detectable.updates());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_published_state_is_consistent() {
        let f = fixture();
        f.controller.start(paris(), SpoofMode::Detectable).unwrap();
        f.controller.update(Coordinate::new(1.0, 1.0)).unwrap();
        f.controller.stop().unwrap();

        let published = f.broadcaster.all();
        assert_eq!(published.first(), Some(&BroadcastSnapshot::active(&paris())));
        assert_eq!(published.last(), Some(&BroadcastSnapshot::inactive()));
        for snapshot in &published {
            assert_eq!(snapshot.is_active(), snapshot.position().is_some());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_when_inactive_is_noop() {
        let f = fixture();
        f.controller.stop().unwrap();
        f.controller.stop().unwrap();
        assert_eq!(f.detectable.stops(), 0);
        assert!(f.broadcaster.all().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_sink_stop_failure_still_deactivates() {
        let f = fixture();
        f.controller.start(paris(), SpoofMode::Detectable).unwrap();
        f.detectable.fail_stop(true);

        assert!(matches!(f.controller.stop(), Err(SpoofError::Sink(_))));
        assert!(!f.controller.is_active());
        assert_eq!(f.broadcaster.last(), Some(BroadcastSnapshot::inactive()));
    }

    fn attached_run(controller: &SpoofController, id: u64) -> u64 {
        let path = RoutePath::new(northbound_path(paris(), 3, 10.0)).unwrap();
        let run = SimulationRun::new(id, path, 10.0, Direction::Forward, Duration::from_millis(20))
            .unwrap();
        controller.attach_run(RunHandle::new(run)).unwrap();
        controller.retarget_from_run(id, paris()).unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_stop_only_ends_its_own_session() {
        let f = fixture();
        f.controller.start(paris(), SpoofMode::Detectable).unwrap();
        let stale = attached_run(&f.controller, 1);

        f.controller.start(paris(), SpoofMode::Undetectable).unwrap();
        assert!(!f.controller.stop_if_current(stale, 1).unwrap());
        assert!(f.controller.is_active());

        let current = attached_run(&f.controller, 2);
        assert!(!f.controller.stop_if_current(current, 1).unwrap());
        assert!(f.controller.is_active());
        assert_eq!(f.undetectable.stops(), 0);

        assert!(f.controller.stop_if_current(current, 2).unwrap());
        assert!(!f.controller.is_active());
        assert_eq!(f.undetectable.stops(), 1);
        assert_eq!(f.broadcaster.last(), Some(BroadcastSnapshot::inactive()));
    }
}

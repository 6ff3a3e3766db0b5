//! Route simulator
//!
//! Drives a [`SimulationRun`] from a timer and feeds every tick's position
//! into the [`SpoofController`]. The run is attached to the controller's
//! session, so stopping or replacing the session cancels it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::run::validate_speed;
use super::{
    Direction, RouteError, RoutePath, RouteSource, RunHandle, RunSnapshot, RunStatus,
    SimulationRun,
};
use crate::geo::Coordinate;
use crate::spoof::{SpoofController, SpoofError};

/// Outcome of a drive-back request
#[derive(Debug, Clone)]
pub enum DriveBack {
    /// Already within the arrival threshold; the session was stopped directly
    AlreadyHome,
    /// A run towards the real position is under way
    Started(RunHandle),
}

/// Plays routes on top of a controller's session
pub struct RouteSimulator {
    controller: SpoofController,
    source: Arc<dyn RouteSource>,
    next_id: AtomicU64,
}

impl RouteSimulator {
    pub fn new(controller: SpoofController, source: Arc<dyn RouteSource>) -> Self {
        Self {
            controller,
            source,
            next_id: AtomicU64::new(1),
        }
    }

    /// The controller runs are attached to
    pub fn controller(&self) -> &SpoofController {
        &self.controller
    }

    /// Start playing `path`, superseding any current run
    ///
    /// The session must be active. The spoofed position moves to the first
    /// vertex in travel order straight away.
    pub fn start(
        &self,
        path: RoutePath,
        speed_mps: f64,
        direction: Direction,
    ) -> Result<RunHandle, SpoofError> {
        let settings = self.controller.settings();
        let run = SimulationRun::new(
            self.next_id(),
            path,
            speed_mps,
            direction,
            settings.route.tick_interval(),
        )?
        .with_interpolation(settings.route.interpolate_segments);

        self.launch(run)
    }

    /// Travel from the spoofed position back to `real`, then stop spoofing
    ///
    /// Within the arrival threshold no route is fetched; the session is
    /// stopped immediately. A route that cannot be fetched leaves the
    /// session as it was.
    pub fn drive_back(&self, real: Coordinate, speed_mps: f64) -> Result<DriveBack, SpoofError> {
        validate_speed(speed_mps)?;
        let real = real.validate()?;
        let current = self.controller.target().ok_or(SpoofError::NotActive)?;

        let settings = self.controller.settings();
        let threshold_m = settings.route.arrival_threshold_m;

        let remaining = current.distance_to(&real);
        if remaining < threshold_m {
            log::info!(
                "Spoofed position is {:.1} m from real position, stopping",
                remaining
            );
            self.controller.stop()?;
            return Ok(DriveBack::AlreadyHome);
        }

        let points = self
            .source
            .fetch_path(&[current, real], settings.route.travel_mode)
            .inspect_err(|e| log::warn!("Drive back route lookup failed: {}", e))?;
        if points.len() < 2 {
            return Err(RouteError::TooShort(points.len()).into());
        }
        if let Some(index) = points.iter().position(|p| !p.is_valid()) {
            return Err(RouteError::InvalidPoint(index).into());
        }

        log::info!(
            "Driving back {:.0} m over {} points",
            remaining,
            points.len()
        );

        let run = SimulationRun::new(
            self.next_id(),
            RoutePath::new(points)?,
            speed_mps,
            Direction::Forward,
            settings.route.tick_interval(),
        )?
        .with_arrival(real, threshold_m)
        .with_interpolation(settings.route.interpolate_segments);

        self.launch(run).map(DriveBack::Started)
    }

    /// Suspend ticking, keeping the cursor; false if nothing is running
    pub fn pause(&self) -> bool {
        match self.controller.current_run() {
            Some(run) if run.status() == RunStatus::Running => {
                run.halt(RunStatus::Paused);
                log::info!("Route run {} paused", run.id());
                true
            }
            _ => false,
        }
    }

    /// Resume a paused run from where it stopped; false if none is paused
    pub fn resume(&self) -> bool {
        match self.controller.current_run() {
            Some(run) if run.status() == RunStatus::Paused => {
                let resumed = spawn_ticker(&self.controller, run.clone());
                if resumed {
                    log::info!("Route run {} resumed", run.id());
                }
                resumed
            }
            _ => false,
        }
    }

    /// Cancel and discard the current run; the session is left alone
    ///
    /// The last applied position stays asserted. False if there was no run.
    pub fn stop(&self) -> bool {
        match self.controller.detach_run() {
            Some(run) => {
                log::info!("Route run {} stopped", run.id());
                true
            }
            None => false,
        }
    }

    /// Change the current run's speed (m/s)
    pub fn set_speed(&self, speed_mps: f64) -> Result<(), SpoofError> {
        validate_speed(speed_mps)?;
        let run = self.controller.current_run().ok_or(SpoofError::NotActive)?;
        run.set_speed(speed_mps)
    }

    /// Status of the current run, `Idle` if there is none
    pub fn status(&self) -> RunStatus {
        self.controller
            .current_run()
            .map_or(RunStatus::Idle, |run| run.status())
    }

    /// Snapshot of the current run
    pub fn snapshot(&self) -> Option<RunSnapshot> {
        self.controller.current_run().map(|run| run.snapshot())
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn launch(&self, run: SimulationRun) -> Result<RunHandle, SpoofError> {
        let first = run.position();
        let handle = RunHandle::new(run);
        self.controller.attach_run(handle.clone())?;

        let generation = self.controller.retarget_from_run(handle.id(), first)?;
        self.controller.push_current(generation);

        spawn_ticker(&self.controller, handle.clone());
        log::info!("Route run {} started", handle.id());
        Ok(handle)
    }
}

/// Arm the tick loop for `run`; false if the run cannot be (re)started
fn spawn_ticker(controller: &SpoofController, run: RunHandle) -> bool {
    let token = CancellationToken::new();
    if !run.arm(token.clone()) {
        return false;
    }

    let controller = controller.clone();
    let runtime = controller.runtime().clone();
    let interval = run.tick_interval();

    runtime.spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick is immediate; the starting position is already applied
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = token.cancelled() => break,

                _ = ticker.tick() => {
                    if !tick_once(&controller, &run) {
                        break;
                    }
                }
            }
        }

        log::debug!("Route run {} ticker exited", run.id());
    });

    true
}

/// Advance `run` once and hand its position to the controller
///
/// Returns false once the loop should exit.
fn tick_once(controller: &SpoofController, run: &RunHandle) -> bool {
    let Some(tick) = run.tick() else {
        return false;
    };

    let generation = match controller.retarget_from_run(run.id(), tick.position) {
        Ok(generation) => generation,
        Err(_) => {
            log::warn!("Route run {} lost its session", run.id());
            run.fail();
            return false;
        }
    };

    let controller = controller.clone();
    let stop_session = tick.stop_session;
    let run_id = run.id();
    tokio::task::spawn_blocking(move || {
        controller.push_current(generation);
        if stop_session {
            log::info!("Route run {} arrived, ending session", run_id);
            match controller.stop_if_current(generation, run_id) {
                Ok(true) => {}
                Ok(false) => log::debug!("Route run {} no longer owns the session", run_id),
                Err(e) => log::warn!("Failed to stop session on arrival: {}", e),
            }
        }
    });

    if tick.status.is_terminal() {
        log::info!("Route run {} completed", run.id());
        return false;
    }
    true
}

//! Simulation runs
//!
//! A [`SimulationRun`] is a cursor over a [`RoutePath`]. Each tick adds
//! `speed * tick_interval` meters to a residual distance and moves the
//! cursor forward one vertex at a time while the residual covers the next
//! segment. The cursor only rests on vertices; whatever is left over carries
//! into the next tick, so after a tick settles `0 <= residual < next segment`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::RoutePath;
use crate::geo::{bearing_degrees, distance_meters, interpolate, Coordinate};
use crate::lock;
use crate::spoof::SpoofError;

/// Traversal direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    /// First point to last
    Forward,
    /// Last point to first
    Backward,
    /// Back and forth between the ends forever
    Loop,
}

impl Direction {
    /// Decode the host's integer code
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Forward),
            1 => Some(Self::Backward),
            2 => Some(Self::Loop),
            _ => None,
        }
    }
}

/// Run lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    /// Not ticking (not yet started, or stopped)
    Idle,
    /// Ticking
    Running,
    /// Ticking suspended, cursor preserved
    Paused,
    /// Reached the end of the path or the arrival anchor
    Completed,
    /// The session disappeared underneath the run
    Failed,
}

impl RunStatus {
    /// Whether the run can no longer change
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Arrival condition for drive-back runs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arrival {
    /// Where the run is heading (the real position)
    pub anchor: Coordinate,
    /// Distance at which the run counts as arrived (m)
    pub threshold_m: f64,
}

/// Result of one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    /// Position to assert
    pub position: Coordinate,
    /// Status after the tick
    pub status: RunStatus,
    /// The run has arrived and the session should end
    pub stop_session: bool,
}

/// A cursor moving along a path
#[derive(Debug, Clone)]
pub struct SimulationRun {
    id: u64,
    path: RoutePath,
    speed_mps: f64,
    direction: Direction,
    tick_interval: Duration,
    cursor: usize,
    // +1 or -1; flips at the ends in Loop mode
    step: isize,
    residual_m: f64,
    status: RunStatus,
    arrival: Option<Arrival>,
    interpolate: bool,
    ticks: u64,
}

impl SimulationRun {
    /// Create an idle run
    pub fn new(
        id: u64,
        path: RoutePath,
        speed_mps: f64,
        direction: Direction,
        tick_interval: Duration,
    ) -> Result<Self, SpoofError> {
        validate_speed(speed_mps)?;

        let (cursor, step) = match direction {
            Direction::Backward => (path.len() - 1, -1),
            Direction::Forward | Direction::Loop => (0, 1),
        };

        Ok(Self {
            id,
            path,
            speed_mps,
            direction,
            tick_interval,
            cursor,
            step,
            residual_m: 0.0,
            status: RunStatus::Idle,
            arrival: None,
            interpolate: false,
            ticks: 0,
        })
    }

    /// End the session once within `threshold_m` of `anchor`
    pub fn with_arrival(mut self, anchor: Coordinate, threshold_m: f64) -> Self {
        self.arrival = Some(Arrival {
            anchor,
            threshold_m,
        });
        self
    }

    /// Report positions between vertices instead of snapping
    pub fn with_interpolation(mut self, interpolate: bool) -> Self {
        self.interpolate = interpolate;
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn path(&self) -> &RoutePath {
        &self.path
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn cursor_index(&self) -> usize {
        self.cursor
    }

    pub fn residual_m(&self) -> f64 {
        self.residual_m
    }

    pub fn speed_mps(&self) -> f64 {
        self.speed_mps
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Whether this is a drive-back run
    pub fn is_drive_back(&self) -> bool {
        self.arrival.is_some()
    }

    /// Change speed; the residual distance carries over
    pub fn set_speed(&mut self, speed_mps: f64) -> Result<(), SpoofError> {
        validate_speed(speed_mps)?;
        self.speed_mps = speed_mps;
        Ok(())
    }

    /// Cursor position as a fraction of the path's vertices
    pub fn progress(&self) -> f64 {
        self.cursor as f64 / (self.path.len() - 1) as f64
    }

    /// Advance by one tick interval
    pub fn tick(&mut self) -> Tick {
        self.advance(self.tick_interval)
    }

    /// Advance the cursor by `elapsed` of travel at the current speed
    ///
    /// Does nothing unless the run is `Running`.
    pub fn advance(&mut self, elapsed: Duration) -> Tick {
        if self.status != RunStatus::Running {
            return self.report(false);
        }

        self.ticks += 1;
        self.residual_m += self.speed_mps * elapsed.as_secs_f64();

        // Zero-length segments consume no budget; cap them so a degenerate
        // looping path cannot spin forever
        let mut free_moves = 0;

        loop {
            if self.at_terminal() {
                self.status = RunStatus::Completed;
                self.residual_m = 0.0;
                break;
            }
            if self.residual_m <= 0.0 {
                break;
            }

            let next = match self.next_index() {
                Some(next) => next,
                None => {
                    // Only Loop gets here; bounce off the end
                    self.step = -self.step;
                    continue;
                }
            };

            let segment = self.path.segment_distance(self.cursor, next);
            if segment > self.residual_m {
                break;
            }

            if segment == 0.0 {
                free_moves += 1;
                if free_moves > self.path.len() {
                    break;
                }
            }

            self.residual_m -= segment;
            self.cursor = next;
        }

        let arrived = match self.arrival {
            Some(arrival) => {
                let arrived = distance_meters(&self.position(), &arrival.anchor)
                    < arrival.threshold_m
                    || self.status == RunStatus::Completed;
                if arrived {
                    self.status = RunStatus::Completed;
                    self.residual_m = 0.0;
                }
                arrived
            }
            None => false,
        };

        self.report(arrived)
    }

    /// Position the run currently asserts
    pub fn position(&self) -> Coordinate {
        let here = self.path[self.cursor];

        if !self.interpolate || self.status.is_terminal() || self.residual_m <= 0.0 {
            return here;
        }

        match self.peek_next() {
            Some(next) => {
                let segment = self.path.segment_distance(self.cursor, next);
                if segment > 0.0 {
                    interpolate(&here, &self.path[next], self.residual_m / segment)
                } else {
                    here
                }
            }
            None => here,
        }
    }

    /// Heading of the segment being travelled, for marker orientation
    pub fn heading_degrees(&self) -> Option<f64> {
        let (from, to) = match self.peek_next() {
            Some(next) => (self.cursor, next),
            // At a terminal vertex: keep the heading of the last segment
            None => {
                let previous = self.cursor.checked_add_signed(-self.step)?;
                (previous, self.cursor)
            }
        };

        let (a, b) = (self.path.get(from)?, self.path.get(to)?);
        (a != b).then(|| bearing_degrees(a, b))
    }

    /// Observable summary
    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            id: self.id,
            status: self.status,
            cursor_index: self.cursor,
            path_len: self.path.len(),
            progress: self.progress(),
            residual_m: self.residual_m,
            speed_mps: self.speed_mps,
            direction: self.direction,
            drive_back: self.is_drive_back(),
            heading_deg: self.heading_degrees(),
            position: self.position(),
        }
    }

    pub(crate) fn set_status(&mut self, status: RunStatus) {
        self.status = status;
    }

    fn report(&self, stop_session: bool) -> Tick {
        Tick {
            position: self.position(),
            status: self.status,
            stop_session,
        }
    }

    fn next_index(&self) -> Option<usize> {
        self.cursor
            .checked_add_signed(self.step)
            .filter(|next| *next < self.path.len())
    }

    /// Next vertex in travel order, looking past a Loop bounce
    fn peek_next(&self) -> Option<usize> {
        self.next_index().or_else(|| match self.direction {
            Direction::Loop => self.cursor.checked_add_signed(-self.step),
            Direction::Forward | Direction::Backward => None,
        })
    }

    fn at_terminal(&self) -> bool {
        match self.direction {
            Direction::Forward => self.cursor == self.path.len() - 1,
            Direction::Backward => self.cursor == 0,
            Direction::Loop => false,
        }
    }
}

pub(crate) fn validate_speed(speed_mps: f64) -> Result<(), SpoofError> {
    if speed_mps.is_finite() && speed_mps > 0.0 {
        Ok(())
    } else {
        Err(SpoofError::InvalidSpeed(speed_mps))
    }
}

/// Serializable view of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunSnapshot {
    pub id: u64,
    pub status: RunStatus,
    pub cursor_index: usize,
    pub path_len: usize,
    pub progress: f64,
    pub residual_m: f64,
    pub speed_mps: f64,
    pub direction: Direction,
    pub drive_back: bool,
    pub heading_deg: Option<f64>,
    pub position: Coordinate,
}

#[derive(Debug)]
struct RunCell {
    run: SimulationRun,
    ticker: Option<CancellationToken>,
}

/// Shared handle to a run
///
/// The controller holds one while the run is attached to its session;
/// callers get one to watch progress, which stays readable after the run
/// is detached.
#[derive(Debug, Clone)]
pub struct RunHandle {
    id: u64,
    cell: Arc<Mutex<RunCell>>,
}

impl RunHandle {
    pub(crate) fn new(run: SimulationRun) -> Self {
        Self {
            id: run.id(),
            cell: Arc::new(Mutex::new(RunCell { run, ticker: None })),
        }
    }

    /// Run id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current status
    pub fn status(&self) -> RunStatus {
        lock(&self.cell).run.status()
    }

    /// Current snapshot
    pub fn snapshot(&self) -> RunSnapshot {
        lock(&self.cell).run.snapshot()
    }

    /// Mark running and install `ticker`; false if the run cannot resume
    pub(crate) fn arm(&self, ticker: CancellationToken) -> bool {
        let mut cell = lock(&self.cell);
        match cell.run.status() {
            RunStatus::Idle | RunStatus::Paused => {
                cell.run.set_status(RunStatus::Running);
                cell.ticker = Some(ticker);
                true
            }
            _ => false,
        }
    }

    /// Cancel the ticker and move to `status` unless already terminal
    pub(crate) fn halt(&self, status: RunStatus) {
        let mut cell = lock(&self.cell);
        if let Some(ticker) = cell.ticker.take() {
            ticker.cancel();
        }
        if !cell.run.status().is_terminal() {
            cell.run.set_status(status);
        }
    }

    /// Mark failed if still running
    pub(crate) fn fail(&self) {
        let mut cell = lock(&self.cell);
        if cell.run.status() == RunStatus::Running {
            cell.run.set_status(RunStatus::Failed);
        }
        if let Some(ticker) = cell.ticker.take() {
            ticker.cancel();
        }
    }

    pub(crate) fn set_speed(&self, speed_mps: f64) -> Result<(), SpoofError> {
        lock(&self.cell).run.set_speed(speed_mps)
    }

    /// Advance one tick; `None` if not running
    pub(crate) fn tick(&self) -> Option<Tick> {
        let mut cell = lock(&self.cell);
        if cell.run.status() != RunStatus::Running {
            return None;
        }
        let tick = cell.run.tick();
        if tick.status.is_terminal() {
            cell.ticker = None;
        }
        Some(tick)
    }

    pub(crate) fn tick_interval(&self) -> Duration {
        lock(&self.cell).run.tick_interval()
    }
}

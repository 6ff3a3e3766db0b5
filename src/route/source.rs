//! Route sources
//!
//! Turning two endpoints into a road-following polyline is the job of an
//! external routing provider. The core only needs an ordered list of at
//! least two points back.

use serde::{Deserialize, Serialize};

use crate::geo::{distance_meters, interpolate, Coordinate};

/// How the route should be travelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TravelMode {
    Driving,
    Walking,
}

/// Route lookup failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum RouteError {
    #[error("Routing provider failed: {0}")]
    Provider(String),
    #[error("Route has {0} point(s), need at least 2")]
    TooShort(usize),
    #[error("Route point {0} is out of range")]
    InvalidPoint(usize),
    #[error("Malformed encoded polyline at byte {0}")]
    InvalidPolyline(usize),
}

/// Supplies a path through the given waypoints
pub trait RouteSource: Send + Sync {
    /// Fetch an ordered polyline through `waypoints` (at least 2)
    ///
    /// May block on network I/O.
    fn fetch_path(
        &self,
        waypoints: &[Coordinate],
        mode: TravelMode,
    ) -> Result<Vec<Coordinate>, RouteError>;
}

/// Straight great-circle legs between waypoints, densified
///
/// For hosts without a routing backend. Ignores the travel mode.
pub struct StraightLineSource {
    step_m: f64,
}

impl StraightLineSource {
    /// Default spacing between generated points (m)
    pub const DEFAULT_STEP_M: f64 = 25.0;

    /// Create a source with the default spacing
    pub fn new() -> Self {
        Self {
            step_m: Self::DEFAULT_STEP_M,
        }
    }

    /// Use a custom spacing between points
    pub fn with_step(mut self, step_m: f64) -> Self {
        if step_m.is_finite() && step_m > 0.0 {
            self.step_m = step_m;
        }
        self
    }
}

impl Default for StraightLineSource {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteSource for StraightLineSource {
    fn fetch_path(
        &self,
        waypoints: &[Coordinate],
        _mode: TravelMode,
    ) -> Result<Vec<Coordinate>, RouteError> {
        if waypoints.len() < 2 {
            return Err(RouteError::TooShort(waypoints.len()));
        }

        let mut points = Vec::new();
        for leg in waypoints.windows(2) {
            let (a, b) = (&leg[0], &leg[1]);
            let steps = (distance_meters(a, b) / self.step_m).ceil().max(1.0) as usize;
            points.extend((0..steps).map(|i| interpolate(a, b, i as f64 / steps as f64)));
        }
        if let Some(last) = waypoints.last() {
            points.push(*last);
        }

        Ok(points)
    }
}

//! Spoofing session lifecycle
//!
//! [`SpoofController`] owns the single spoofing session: which sink is
//! engaged, which coordinate is asserted, and the loop that keeps asserting
//! it. Route playback rides on top of a session and never outlives it.

pub mod controller;
mod reassert;

use serde::Serialize;

use crate::geo::Coordinate;
use crate::injection::{SinkError, SpoofMode};
use crate::route::RouteError;

pub use controller::{SpoofController, Sinks};

/// Observable session state
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "state")]
pub enum SessionStatus {
    /// Nothing is being asserted
    Inactive,
    /// `target` is being asserted through a `mode` sink
    Active { mode: SpoofMode, target: Coordinate },
}

impl SessionStatus {
    /// Whether a session is active
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }
}

/// Errors surfaced by session and route operations
#[derive(Debug, thiserror::Error)]
pub enum SpoofError {
    #[error("Invalid coordinate ({latitude}, {longitude})")]
    InvalidCoordinate { latitude: f64, longitude: f64 },
    #[error("Invalid speed: {0} m/s")]
    InvalidSpeed(f64),
    #[error("Route needs at least 2 points, got {0}")]
    PathTooShort(usize),
    #[error("No spoofing session is active")]
    NotActive,
    #[error("{0} injection is not available on this device")]
    SinkUnavailable(SpoofMode),
    #[error("Injection failed: {0}")]
    Sink(#[from] SinkError),
    #[error("Route unavailable: {0}")]
    RouteUnavailable(#[from] RouteError),
}

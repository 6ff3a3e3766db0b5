//! Route playback
//!
//! Moves the spoofed position along a polyline at a fixed speed so that a
//! change of location looks like travel rather than a jump. The special
//! "drive back" mode heads for the device's real position and ends the
//! spoofing session on arrival.

pub mod path;
pub mod polyline;
pub mod run;
pub mod simulator;
pub mod source;

pub use path::RoutePath;
pub use run::{Direction, RunHandle, RunSnapshot, RunStatus, SimulationRun};
pub use simulator::{DriveBack, RouteSimulator};
pub use source::{RouteError, RouteSource, StraightLineSource, TravelMode};

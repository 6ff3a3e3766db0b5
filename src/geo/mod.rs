//! Geographic primitives
//!
//! Coordinates and the great-circle math used to step along routes.

pub mod coordinate;
pub mod great_circle;

pub use coordinate::{Coordinate, DEFAULT_ACCURACY_M};
pub use great_circle::{bearing_degrees, distance_meters, interpolate, EARTH_RADIUS_M};

//! Coordinate value type

use serde::{Deserialize, Serialize};

/// Accuracy reported for fixes when the caller does not supply one
pub const DEFAULT_ACCURACY_M: f64 = 5.0;

/// A geographic position with a reported horizontal accuracy
///
/// Construction is unchecked so that values can be carried around freely;
/// anything that is about to be asserted goes through [`Coordinate::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees, [-90, 90]
    pub latitude: f64,
    /// Longitude in degrees, [-180, 180]
    pub longitude: f64,
    /// Horizontal accuracy radius in meters, > 0
    pub accuracy_m: f64,
}

impl Coordinate {
    /// Create a coordinate with the default accuracy
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self::with_accuracy(latitude, longitude, DEFAULT_ACCURACY_M)
    }

    /// Create a coordinate with an explicit accuracy
    pub fn with_accuracy(latitude: f64, longitude: f64, accuracy_m: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy_m,
        }
    }

    /// Check that latitude, longitude and accuracy are all in range
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
            && self.accuracy_m.is_finite()
            && self.accuracy_m > 0.0
    }

    /// Return self if valid, otherwise an `InvalidCoordinate` error
    pub fn validate(self) -> Result<Self, crate::spoof::SpoofError> {
        if self.is_valid() {
            Ok(self)
        } else {
            Err(crate::spoof::SpoofError::InvalidCoordinate {
                latitude: self.latitude,
                longitude: self.longitude,
            })
        }
    }

    /// Same position, different accuracy
    pub fn at_accuracy(self, accuracy_m: f64) -> Self {
        Self { accuracy_m, ..self }
    }

    /// Great-circle distance to another coordinate in meters
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        super::great_circle::distance_meters(self, other)
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({:.6}, {:.6}) ±{:.1}m",
            self.latitude, self.longitude, self.accuracy_m
        )
    }
}

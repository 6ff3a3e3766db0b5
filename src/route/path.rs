//! Route paths

use serde::Serialize;

use super::polyline;
use crate::geo::{distance_meters, Coordinate};
use crate::spoof::SpoofError;

/// An ordered polyline of at least two valid coordinates
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutePath {
    points: Vec<Coordinate>,
}

impl RoutePath {
    /// Validate and wrap a list of points
    pub fn new(points: Vec<Coordinate>) -> Result<Self, SpoofError> {
        if points.len() < 2 {
            return Err(SpoofError::PathTooShort(points.len()));
        }
        if let Some(bad) = points.iter().find(|p| !p.is_valid()) {
            return Err(SpoofError::InvalidCoordinate {
                latitude: bad.latitude,
                longitude: bad.longitude,
            });
        }

        Ok(Self { points })
    }

    /// Decode a path from an encoded polyline
    pub fn from_encoded_polyline(encoded: &str) -> Result<Self, SpoofError> {
        let points = polyline::decode(encoded)?;
        Self::new(points)
    }

    /// Number of points
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always false; a path has at least two points
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Point at `index`
    pub fn get(&self, index: usize) -> Option<&Coordinate> {
        self.points.get(index)
    }

    /// First point
    pub fn start(&self) -> &Coordinate {
        &self.points[0]
    }

    /// Last point
    pub fn end(&self) -> &Coordinate {
        &self.points[self.points.len() - 1]
    }

    /// All points in order
    pub fn points(&self) -> &[Coordinate] {
        &self.points
    }

    /// Distance between two points of the path (m)
    pub fn segment_distance(&self, from: usize, to: usize) -> f64 {
        distance_meters(&self.points[from], &self.points[to])
    }

    /// Sum of all segment lengths (m)
    pub fn total_distance(&self) -> f64 {
        self.points
            .windows(2)
            .map(|pair| distance_meters(&pair[0], &pair[1]))
            .sum()
    }
}

impl std::ops::Index<usize> for RoutePath {
    type Output = Coordinate;

    fn index(&self, index: usize) -> &Coordinate {
        &self.points[index]
    }
}

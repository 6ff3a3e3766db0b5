//! Great-circle geometry
//!
//! Haversine distance and initial bearing on a spherical Earth. Accurate to
//! well under a meter for the segment lengths routes are made of.

use super::Coordinate;

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Distance between two coordinates in meters
///
/// Symmetric and never negative. Returns 0 for identical points.
pub fn distance_meters(a: &Coordinate, b: &Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lon = (b.longitude - a.longitude).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    // Rounding can push h a hair above 1 for antipodal points
    let c = 2.0 * h.clamp(0.0, 1.0).sqrt().asin();

    EARTH_RADIUS_M * c
}

/// Initial bearing from `a` towards `b` in degrees, normalized to [0, 360)
pub fn bearing_degrees(a: &Coordinate, b: &Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let delta_lon = (b.longitude - a.longitude).to_radians();

    let y = delta_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * delta_lon.cos();

    let bearing = y.atan2(x).to_degrees();
    (bearing + 360.0) % 360.0
}

/// Linear interpolation between two coordinates
///
/// `fraction` is clamped to [0, 1]. Good enough for route segments, which
/// are short relative to the Earth's curvature. Accuracy is taken from `a`.
pub fn interpolate(a: &Coordinate, b: &Coordinate, fraction: f64) -> Coordinate {
    let t = fraction.clamp(0.0, 1.0);
    Coordinate::with_accuracy(
        a.latitude + (b.latitude - a.latitude) * t,
        a.longitude + (b.longitude - a.longitude) * t,
        a.accuracy_m,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_identity() {
        let paris = Coordinate::new(48.8566, 2.3522);
        assert_eq!(distance_meters(&paris, &paris), 0.0);
    }

    #[test]
    fn test_distance_symmetric() {
        let points = [
            Coordinate::new(48.8566, 2.3522),
            Coordinate::new(51.5074, -0.1278),
            Coordinate::new(-33.8688, 151.2093),
            Coordinate::new(0.0, 0.0),
        ];

        for a in &points {
            for b in &points {
                let ab = distance_meters(a, b);
                let ba = distance_meters(b, a);
                assert!(ab >= 0.0);
                assert!((ab - ba).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_distance_known_value() {
        // Paris to London is about 343.5 km
        let paris = Coordinate::new(48.8566, 2.3522);
        let london = Coordinate::new(51.5074, -0.1278);
        let d = distance_meters(&paris, &london);
        assert!((d - 343_500.0).abs() < 1_000.0, "got {d}");

        // One degree of latitude is about 111.19 km on this sphere
        let d = distance_meters(&Coordinate::new(0.0, 0.0), &Coordinate::new(1.0, 0.0));
        assert!((d - 111_195.0).abs() < 10.0, "got {d}");
    }

    #[test]
    fn test_bearing_cardinal() {
        let origin = Coordinate::new(0.0, 0.0);
        assert!((bearing_degrees(&origin, &Coordinate::new(1.0, 0.0)) - 0.0).abs() < 1e-6);
        assert!((bearing_degrees(&origin, &Coordinate::new(0.0, 1.0)) - 90.0).abs() < 1e-6);
        assert!((bearing_degrees(&origin, &Coordinate::new(-1.0, 0.0)) - 180.0).abs() < 1e-6);
        assert!((bearing_degrees(&origin, &Coordinate::new(0.0, -1.0)) - 270.0).abs() < 1e-6);
    }

    #[test]
    fn test_interpolate_midpoint() {
        let a = Coordinate::new(10.0, 20.0);
        let b = Coordinate::new(12.0, 24.0);
        let mid = interpolate(&a, &b, 0.5);
        assert!((mid.latitude - 11.0).abs() < 1e-12);
        assert!((mid.longitude - 22.0).abs() < 1e-12);

        assert_eq!(interpolate(&a, &b, -1.0), a);
        assert_eq!(interpolate(&a, &b, 2.0).latitude, b.latitude);
    }
}

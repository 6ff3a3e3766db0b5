//! Encoded polyline decoding
//!
//! Routing providers commonly return paths in the 1e5-precision encoded
//! polyline format: each value is a zig-zag encoded delta from the previous
//! one, split into 5-bit chunks offset by 63.

use super::RouteError;
use crate::geo::Coordinate;

const PRECISION: f64 = 1e5;

/// Decode an encoded polyline into coordinates
pub fn decode(encoded: &str) -> Result<Vec<Coordinate>, RouteError> {
    let bytes = encoded.as_bytes();
    let mut index = 0;
    let mut latitude: i64 = 0;
    let mut longitude: i64 = 0;
    let mut points = Vec::new();

    while index < bytes.len() {
        latitude += next_value(bytes, &mut index)?;
        longitude += next_value(bytes, &mut index)?;
        points.push(Coordinate::new(
            latitude as f64 / PRECISION,
            longitude as f64 / PRECISION,
        ));
    }

    Ok(points)
}

/// Read one zig-zag encoded value starting at `index`
fn next_value(bytes: &[u8], index: &mut usize) -> Result<i64, RouteError> {
    let mut result: i64 = 0;
    let mut shift = 0;

    loop {
        let byte = *bytes.get(*index).ok_or(RouteError::InvalidPolyline(*index))?;
        if !(63..127).contains(&byte) || shift > 60 {
            return Err(RouteError::InvalidPolyline(*index));
        }
        *index += 1;

        let chunk = (byte - 63) as i64;
        result |= (chunk & 0x1f) << shift;
        shift += 5;

        if chunk < 0x20 {
            break;
        }
    }

    Ok(if result & 1 != 0 {
        !(result >> 1)
    } else {
        result >> 1
    })
}

//! Geodetic frame transforms (WGS-84 <-> GCJ-02)
//!
//! GCJ-02 is an obfuscated offset of WGS-84 used by Chinese map services.
//! The forward offset is an empirical series; the inverse subtracts the same
//! offset evaluated at the *input* position, so `from_alt(to_alt(p))` only
//! approximates `p`. Residual error is below [`ROUND_TRIP_TOLERANCE_DEG`]
//! anywhere in the service region.
//!
//! Outside the service region the two frames coincide and both directions
//! are the identity.

use super::types::Point;
use std::f64::consts::PI;

/// Semi-major axis of the Krasovsky 1940 ellipsoid (metres)
const AXIS: f64 = 6_378_245.0;
/// First eccentricity squared
const ECCENTRICITY_SQ: f64 = 0.006_693_421_622_965_943;

// Service region bounding box (degrees)
const MIN_LNG: f64 = 72.004;
const MAX_LNG: f64 = 137.8347;
const MIN_LAT: f64 = 0.8293;
const MAX_LAT: f64 = 55.8271;

/// Worst-case `from_alt(to_alt(p))` residual per axis, in degrees (≈6 m)
pub const ROUND_TRIP_TOLERANCE_DEG: f64 = 6e-5;

/// A pair of reference frames with a forward and an approximate inverse map
pub trait FrameTransform: Send + Sync {
    /// Native frame -> alternate frame
    fn to_alt(&self, point: &Point) -> Point;

    /// Alternate frame -> native frame
    fn from_alt(&self, point: &Point) -> Point;

    fn path_to_alt(&self, path: &[Point]) -> Vec<Point> {
        path.iter().map(|p| self.to_alt(p)).collect()
    }

    fn path_from_alt(&self, path: &[Point]) -> Vec<Point> {
        path.iter().map(|p| self.from_alt(p)).collect()
    }
}

/// WGS-84 (native) <-> GCJ-02 (alternate)
#[derive(Debug, Clone, Copy, Default)]
pub struct Gcj02;

impl FrameTransform for Gcj02 {
    fn to_alt(&self, point: &Point) -> Point {
        if out_of_region(point.x, point.y) {
            return *point;
        }
        let (d_lng, d_lat) = offset(point.x, point.y);
        point.with_position(point.x + d_lng, point.y + d_lat)
    }

    fn from_alt(&self, point: &Point) -> Point {
        if out_of_region(point.x, point.y) {
            return *point;
        }
        let (d_lng, d_lat) = offset(point.x, point.y);
        point.with_position(point.x - d_lng, point.y - d_lat)
    }
}

#[inline]
pub fn out_of_region(lng: f64, lat: f64) -> bool {
    !(MIN_LNG..=MAX_LNG).contains(&lng) || !(MIN_LAT..=MAX_LAT).contains(&lat)
}

fn series_lat(x: f64, y: f64) -> f64 {
    let mut ret = -100.0 + 2.0 * x + 3.0 * y + 0.2 * y * y + 0.1 * x * y + 0.2 * x.abs().sqrt();
    ret += (20.0 * (6.0 * x * PI).sin() + 20.0 * (2.0 * x * PI).sin()) * 2.0 / 3.0;
    ret += (20.0 * (y * PI).sin() + 40.0 * (y / 3.0 * PI).sin()) * 2.0 / 3.0;
    ret += (160.0 * (y / 12.0 * PI).sin() + 320.0 * (y * PI / 30.0).sin()) * 2.0 / 3.0;
    ret
}

fn series_lng(x: f64, y: f64) -> f64 {
    let mut ret = 300.0 + x + 2.0 * y + 0.1 * x * x + 0.1 * x * y + 0.1 * x.abs().sqrt();
    ret += (20.0 * (6.0 * x * PI).sin() + 20.0 * (2.0 * x * PI).sin()) * 2.0 / 3.0;
    ret += (20.0 * (x * PI).sin() + 40.0 * (x / 3.0 * PI).sin()) * 2.0 / 3.0;
    ret += (150.0 * (x / 12.0 * PI).sin() + 300.0 * (x / 30.0 * PI).sin()) * 2.0 / 3.0;
    ret
}

/// Forward offset (Δlng, Δlat) in degrees at the given position
fn offset(lng: f64, lat: f64) -> (f64, f64) {
    let d_lat = series_lat(lng - 105.0, lat - 35.0);
    let d_lng = series_lng(lng - 105.0, lat - 35.0);

    let rad_lat = lat / 180.0 * PI;
    let sin_lat = rad_lat.sin();
    let magic = 1.0 - ECCENTRICITY_SQ * sin_lat * sin_lat;
    let sqrt_magic = magic.sqrt();

    let adj_lat = (d_lat * 180.0) / ((AXIS * (1.0 - ECCENTRICITY_SQ)) / (magic * sqrt_magic) * PI);
    let adj_lng = (d_lng * 180.0) / (AXIS / sqrt_magic * rad_lat.cos() * PI);
    (adj_lng, adj_lat)
}

//! Time-interval decimation
//!
//! Keeps a point only when at least `interval_secs` have passed since the
//! last kept point. First and last points always survive.

use crate::domain::types::Point;

/// Drop points closer in time than `interval_secs` to the last kept point.
///
/// Interior points without a timestamp cannot be spaced and are dropped. If
/// the clock has not started yet (first point untimed), the next timed point
/// is kept and starts it.
pub fn decimate(points: &[Point], interval_secs: i64) -> Vec<Point> {
    if interval_secs <= 0 || points.len() <= 1 {
        return points.to_vec();
    }

    let last_idx = points.len() - 1;
    let mut kept = Vec::with_capacity(points.len());
    kept.push(points[0]);
    let mut clock = points[0].timestamp;

    for point in &points[1..last_idx] {
        let Some(ts) = point.timestamp else {
            continue;
        };
        if let Some(last) = clock {
            if ts.saturating_sub(last) < interval_secs {
                continue;
            }
        }
        kept.push(*point);
        clock = Some(ts);
    }

    kept.push(points[last_idx]);
    kept
}

//! Douglas-Peucker polyline simplification
//!
//! Distances are planar Euclidean on raw degrees with no geodesic
//! correction. The tolerance is in degrees as well (0.0001° ≈ 10 m).
//!
//! Output is always a subsequence of the input that keeps the first and last
//! points.

use crate::domain::types::Point;

/// Simplify a polyline.
///
/// With `high_quality == false` a radial pre-pass first removes points within
/// `tolerance` of their kept predecessor, which cuts the work on very dense
/// traces at some cost in fidelity.
pub fn simplify(points: &[Point], tolerance: f64, high_quality: bool) -> Vec<Point> {
    if points.len() <= 2 {
        return points.to_vec();
    }

    let sq_tolerance = tolerance * tolerance;

    if high_quality {
        douglas_peucker(points, sq_tolerance)
    } else {
        let filtered = radial_filter(points, sq_tolerance);
        douglas_peucker(&filtered, sq_tolerance)
    }
}

/// Keep a point only if it is farther than the tolerance from the last kept one
fn radial_filter(points: &[Point], sq_tolerance: f64) -> Vec<Point> {
    let last_idx = points.len() - 1;
    let mut kept = Vec::with_capacity(points.len());
    let mut prev_idx = 0;
    kept.push(points[0]);

    for (i, point) in points.iter().enumerate().skip(1) {
        if point.distance_sq(&points[prev_idx]) > sq_tolerance {
            kept.push(*point);
            prev_idx = i;
        }
    }

    if prev_idx != last_idx {
        kept.push(points[last_idx]);
    }
    kept
}

fn douglas_peucker(points: &[Point], sq_tolerance: f64) -> Vec<Point> {
    let n = points.len();
    if n <= 2 {
        return points.to_vec();
    }

    let mut keep = vec![false; n];
    keep[0] = true;
    keep[n - 1] = true;

    // Explicit work stack instead of recursion; order of visits does not
    // affect which points are marked.
    let mut stack = vec![(0usize, n - 1)];
    while let Some((first, last)) = stack.pop() {
        if let Some(index) = farthest_beyond(points, first, last, sq_tolerance) {
            keep[index] = true;
            if index - first > 1 {
                stack.push((first, index));
            }
            if last - index > 1 {
                stack.push((index, last));
            }
        }
    }

    points.iter().zip(keep).filter_map(|(p, k)| k.then_some(*p)).collect()
}

/// Interior point with the largest distance to chord `first..last`, if that
/// distance exceeds the tolerance. Ties keep the earliest index.
fn farthest_beyond(points: &[Point], first: usize, last: usize, sq_tolerance: f64) -> Option<usize> {
    let mut max_sq = sq_tolerance;
    let mut index = None;
    for i in (first + 1)..last {
        let d = sq_segment_distance(&points[i], &points[first], &points[last]);
        if d > max_sq {
            max_sq = d;
            index = Some(i);
        }
    }
    index
}

/// Squared distance from `p` to segment `a..b` (projection clamped to the ends)
fn sq_segment_distance(p: &Point, a: &Point, b: &Point) -> f64 {
    let (mut x, mut y) = (a.x, a.y);
    let dx = b.x - x;
    let dy = b.y - y;

    if dx != 0.0 || dy != 0.0 {
        let t = ((p.x - x) * dx + (p.y - y) * dy) / (dx * dx + dy * dy);
        if t > 1.0 {
            x = b.x;
            y = b.y;
        } else if t > 0.0 {
            x += dx * t;
            y += dy * t;
        }
    }

    let dx = p.x - x;
    let dy = p.y - y;
    dx * dx + dy * dy
}

//! Decimation followed by simplification, with stage statistics

use crate::domain::stats::TrajectoryStats;
use crate::domain::types::Point;
use crate::infra::config::Config;
use crate::services::decimator::decimate;
use crate::services::simplifier::simplify;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReductionOptions {
    /// Minimum spacing between kept points (0 disables decimation)
    pub interval_secs: i64,
    /// Douglas-Peucker tolerance in degrees
    pub tolerance: f64,
    pub high_quality: bool,
}

impl Default for ReductionOptions {
    fn default() -> Self {
        Self { interval_secs: 0, tolerance: 0.0001, high_quality: true }
    }
}

impl From<&Config> for ReductionOptions {
    fn from(config: &Config) -> Self {
        Self {
            interval_secs: config.interval_secs(),
            tolerance: config.tolerance(),
            high_quality: config.high_quality(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Reduction {
    pub points: Vec<Point>,
    pub stats: TrajectoryStats,
}

pub fn reduce(points: &[Point], options: &ReductionOptions, file_size: u64) -> Reduction {
    let (decimated, time_filtered_count) = if options.interval_secs > 0 {
        let d = decimate(points, options.interval_secs);
        let count = d.len();
        (d, Some(count))
    } else {
        (points.to_vec(), None)
    };

    let simplified = simplify(&decimated, options.tolerance, options.high_quality);

    let stats = TrajectoryStats::calculate(
        points.len(),
        simplified.len(),
        file_size,
        time_filtered_count,
        Some(simplified.len()),
    );

    info!(
        original = %stats.original_count,
        time_filtered = ?stats.time_filtered_count,
        simplified = %simplified.len(),
        compression_ratio = %stats.compression_ratio,
        "trajectory_reduced"
    );

    Reduction { points: simplified, stats }
}

//! Point-count statistics across the reduction stages

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryStats {
    pub original_count: usize,
    /// Count after time-interval decimation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_filtered_count: Option<usize>,
    /// Count after Douglas-Peucker simplification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rdp_simplified_count: Option<usize>,
    /// Count after map matching
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_matched_count: Option<usize>,
    pub final_count: usize,
    /// Percentage of points removed, two decimals
    pub compression_ratio: f64,
    /// Size of the source file in bytes
    pub file_size: u64,
}

impl TrajectoryStats {
    pub fn calculate(
        original_count: usize,
        final_count: usize,
        file_size: u64,
        time_filtered_count: Option<usize>,
        rdp_simplified_count: Option<usize>,
    ) -> Self {
        Self {
            original_count,
            time_filtered_count,
            rdp_simplified_count,
            map_matched_count: None,
            final_count,
            compression_ratio: compression_ratio(original_count, final_count),
            file_size,
        }
    }

    /// Record a map matched trajectory as the final output
    pub fn with_map_matched(mut self, count: usize) -> Self {
        self.map_matched_count = Some(count);
        self.final_count = count;
        self.compression_ratio = compression_ratio(self.original_count, count);
        self
    }
}

fn compression_ratio(original: usize, fin: usize) -> f64 {
    if original == 0 {
        return 0.0;
    }
    let ratio = (1.0 - fin as f64 / original as f64) * 100.0;
    (ratio * 100.0).round() / 100.0
}

/// Human-readable byte size, e.g. `1.5 KB`
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let index = ((bytes as f64).ln() / 1024f64.ln()).floor() as usize;
    let index = index.min(UNITS.len() - 1);
    let size = bytes as f64 / 1024f64.powi(index as i32);
    format!("{:.1} {}", size, UNITS[index])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_ratio_rounding() {
        let stats = TrajectoryStats::calculate(3, 1, 0, None, Some(1));
        assert_eq!(stats.compression_ratio, 66.67);
        assert_eq!(stats.final_count, 1);
    }

    #[test]
    fn test_empty_original() {
        let stats = TrajectoryStats::calculate(0, 0, 0, None, None);
        assert_eq!(stats.compression_ratio, 0.0);
    }

    #[test]
    fn test_with_map_matched_updates_final() {
        let stats = TrajectoryStats::calculate(100, 20, 2048, Some(50), Some(20)).with_map_matched(40);
        assert_eq!(stats.map_matched_count, Some(40));
        assert_eq!(stats.final_count, 40);
        assert_eq!(stats.compression_ratio, 60.0);
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(512), "512.0 B");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5.0 MB");
    }
}

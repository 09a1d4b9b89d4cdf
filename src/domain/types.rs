//! Shared types for trajectory reduction and map matching

use serde::{Deserialize, Serialize};

/// Coordinate equality tolerance in degrees
pub const COORD_EPSILON: f64 = 1e-9;

/// A single trajectory sample
///
/// `x`/`y` are longitude/latitude in degrees. `timestamp` is Unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl Point {
    #[inline]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, speed: None, heading: None, timestamp: None }
    }

    #[inline]
    pub fn at(x: f64, y: f64, timestamp: i64) -> Self {
        Self { x, y, speed: None, heading: None, timestamp: Some(timestamp) }
    }

    /// Same point with the position replaced, keeping speed/heading/timestamp
    #[inline]
    pub fn with_position(self, x: f64, y: f64) -> Self {
        Self { x, y, ..self }
    }

    /// True if both coordinates are within `epsilon` degrees of `other`
    #[inline]
    pub fn coincides_with(&self, other: &Point, epsilon: f64) -> bool {
        (self.x - other.x).abs() <= epsilon && (self.y - other.y).abs() <= epsilon
    }

    /// Squared planar distance in degrees²
    #[inline]
    pub fn distance_sq(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

impl From<[f64; 2]> for Point {
    fn from([x, y]: [f64; 2]) -> Self {
        Point::new(x, y)
    }
}

/// Classification of a stitched run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    /// Snapped to the road network with trusted confidence
    Matched,
    /// Low confidence or provider failure; original coordinates
    Raw,
}

impl SegmentKind {
    pub fn as_str(&self) -> &str {
        match self {
            SegmentKind::Matched => "matched",
            SegmentKind::Raw => "raw",
        }
    }
}

/// Ordered run of points sharing one classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub kind: SegmentKind,
    pub points: Vec<Point>,
}

impl Segment {
    pub fn matched(points: Vec<Point>) -> Self {
        Self { kind: SegmentKind::Matched, points }
    }

    pub fn raw(points: Vec<Point>) -> Self {
        Self { kind: SegmentKind::Raw, points }
    }

    /// Fail-open result for a chunk: the input wrapped as one raw run
    pub fn passthrough(coords: &[Point]) -> Vec<Segment> {
        vec![Segment::raw(coords.to_vec())]
    }

    pub fn is_matched(&self) -> bool {
        self.kind == SegmentKind::Matched
    }
}

/// Per-call map matching parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchParams {
    /// Minimum provider confidence in [0, 1] for a matched run to be trusted
    pub confidence_threshold: f64,
    /// Search radius in metres per input point
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
}

impl Default for MatchParams {
    fn default() -> Self {
        Self { confidence_threshold: 0.5, radius: None }
    }
}

/// Segments of a stitched result, bucketed and in arrival order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchedSegments {
    pub matched: Vec<Vec<Point>>,
    pub raw: Vec<Vec<Point>>,
    pub ordered: Vec<Segment>,
}

/// Final product of a map matching run
///
/// `trajectory` is the concatenation of `segments.ordered[*].points` with no
/// two consecutive points coinciding within [`COORD_EPSILON`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub trajectory: Vec<Point>,
    pub segments: MatchedSegments,
}

impl MatchOutcome {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.trajectory.is_empty()
    }

    /// Number of trajectory points that came from matched runs
    pub fn matched_point_count(&self) -> usize {
        self.segments.matched.iter().map(Vec::len).sum()
    }

    /// Number of trajectory points that came from raw runs
    pub fn raw_point_count(&self) -> usize {
        self.segments.raw.iter().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coincides_within_epsilon() {
        let a = Point::new(116.0, 39.0);
        let b = Point::new(116.0 + 5e-10, 39.0 - 5e-10);
        let c = Point::new(116.0 + 2e-9, 39.0);
        assert!(a.coincides_with(&b, COORD_EPSILON));
        assert!(!a.coincides_with(&c, COORD_EPSILON));
    }

    #[test]
    fn test_with_position_keeps_attributes() {
        let mut p = Point::at(1.0, 2.0, 42);
        p.speed = Some(12.5);
        let moved = p.with_position(3.0, 4.0);
        assert_eq!(moved.x, 3.0);
        assert_eq!(moved.timestamp, Some(42));
        assert_eq!(moved.speed, Some(12.5));
    }

    #[test]
    fn test_point_json_omits_missing_fields() {
        let json = serde_json::to_string(&Point::new(1.0, 2.0)).unwrap();
        assert_eq!(json, r#"{"x":1.0,"y":2.0}"#);

        let parsed: Point = serde_json::from_str(r#"{"x":1.5,"y":2.5,"timestamp":10}"#).unwrap();
        assert_eq!(parsed.timestamp, Some(10));
        assert_eq!(parsed.speed, None);
    }

    #[test]
    fn test_segment_kind_serializes_lowercase() {
        let seg = Segment::matched(vec![Point::new(0.0, 0.0)]);
        let json = serde_json::to_value(&seg).unwrap();
        assert_eq!(json["kind"], "matched");
        assert_eq!(SegmentKind::Raw.as_str(), "raw");
    }

    #[test]
    fn test_passthrough_wraps_input() {
        let coords = vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)];
        let segs = Segment::passthrough(&coords);
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].kind, SegmentKind::Raw);
        assert_eq!(segs[0].points, coords);
    }

    #[test]
    fn test_outcome_point_counts() {
        let outcome = MatchOutcome {
            trajectory: vec![],
            segments: MatchedSegments {
                matched: vec![vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0)]],
                raw: vec![vec![Point::new(2.0, 0.0)]],
                ordered: vec![],
            },
        };
        assert_eq!(outcome.matched_point_count(), 2);
        assert_eq!(outcome.raw_point_count(), 1);
    }
}

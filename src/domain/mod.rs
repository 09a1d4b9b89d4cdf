//! Domain models - trajectory types, frame transforms and statistics
//!
//! - `types` - `Point`, `Segment`, `MatchOutcome` and match parameters
//! - `frame` - WGS-84 <-> GCJ-02 approximate transform
//! - `stats` - point-count statistics across reduction stages

pub mod frame;
pub mod stats;
pub mod types;

pub use frame::{FrameTransform, Gcj02};
pub use stats::TrajectoryStats;
pub use types::{MatchOutcome, MatchParams, MatchedSegments, Point, Segment, SegmentKind};

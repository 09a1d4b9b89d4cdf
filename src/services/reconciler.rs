//! Stitches per-chunk provider output into one continuous path
//!
//! A single `last_emitted` point is carried across the whole run (never reset
//! per chunk). Any point coinciding with it is dropped, which removes the
//! duplicate points at chunk-overlap seams wherever the provider-side run
//! boundaries happen to fall.

use crate::domain::types::{MatchOutcome, Point, Segment, SegmentKind, COORD_EPSILON};
use tracing::debug;

/// Accumulator threaded through the fold over chunk results
#[derive(Debug, Default)]
pub struct Reconciler {
    last_emitted: Option<Point>,
    outcome: MatchOutcome,
    dropped: usize,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one segment, returning the number of points kept
    pub fn push_segment(&mut self, segment: Segment) -> usize {
        let Segment { kind, points } = segment;
        let before = points.len();

        let mut kept: Vec<Point> = Vec::with_capacity(points.len());
        let mut last = self.last_emitted;
        for point in points {
            if last.is_some_and(|l| l.coincides_with(&point, COORD_EPSILON)) {
                continue;
            }
            last = Some(point);
            kept.push(point);
        }

        self.dropped += before - kept.len();
        if kept.is_empty() {
            return 0;
        }

        self.last_emitted = last;
        self.outcome.trajectory.extend_from_slice(&kept);
        match kind {
            SegmentKind::Matched => self.outcome.segments.matched.push(kept.clone()),
            SegmentKind::Raw => self.outcome.segments.raw.push(kept.clone()),
        }
        let count = kept.len();
        self.outcome.segments.ordered.push(Segment { kind, points: kept });
        count
    }

    /// Append all segments of one chunk in arrival order
    pub fn push_chunk(&mut self, segments: Vec<Segment>) {
        for segment in segments {
            self.push_segment(segment);
        }
    }

    pub fn last_emitted(&self) -> Option<&Point> {
        self.last_emitted.as_ref()
    }

    /// Points dropped so far as duplicates of their predecessor
    pub fn dropped_points(&self) -> usize {
        self.dropped
    }

    pub fn finish(self) -> MatchOutcome {
        debug!(
            points = %self.outcome.trajectory.len(),
            segments = %self.outcome.segments.ordered.len(),
            dropped = %self.dropped,
            "reconcile_finished"
        );
        self.outcome
    }
}

/// Merge chunk results, given in chunk order, into one outcome
pub fn reconcile(chunk_results: Vec<Vec<Segment>>) -> MatchOutcome {
    chunk_results
        .into_iter()
        .fold(Reconciler::new(), |mut acc, segments| {
            acc.push_chunk(segments);
            acc
        })
        .finish()
}

//! Chunked map matching driver
//!
//! Splits a trajectory into provider-sized overlapping chunks, calls the
//! provider once per chunk strictly in order with a fixed pause between
//! calls, and folds the chunk results into one reconciled outcome.
//!
//! A run holds a [`MatchTicket`]. The ticket is checked after every
//! suspension point; once a newer run supersedes it, the run stops issuing
//! calls and its result is discarded.

use crate::domain::types::{MatchOutcome, MatchParams, Point};
use crate::infra::config::Config;
use crate::infra::metrics::MatchMetrics;
use crate::io::provider::MatchProvider;
use crate::services::cancellation::{MatchGeneration, MatchTicket};
use crate::services::chunk_planner::plan_chunks;
use crate::services::reconciler::Reconciler;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Chunks completed so far out of the planned total
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MatchProgress {
    pub current: usize,
    pub total: usize,
}

pub struct MatchEngine {
    provider: Arc<dyn MatchProvider>,
    chunk_size: usize,
    overlap: usize,
    inter_chunk_delay: Duration,
    metrics: Arc<MatchMetrics>,
    generation: MatchGeneration,
}

impl MatchEngine {
    pub fn new(provider: Arc<dyn MatchProvider>) -> Self {
        Self {
            provider,
            chunk_size: 100,
            overlap: 3,
            inter_chunk_delay: Duration::from_millis(250),
            metrics: Arc::new(MatchMetrics::new()),
            generation: MatchGeneration::new(),
        }
    }

    pub fn from_config(provider: Arc<dyn MatchProvider>, config: &Config) -> Self {
        Self::new(provider)
            .with_chunking(config.chunk_size(), config.chunk_overlap())
            .with_inter_chunk_delay(config.inter_chunk_delay())
    }

    pub fn with_chunking(mut self, chunk_size: usize, overlap: usize) -> Self {
        self.chunk_size = chunk_size;
        self.overlap = overlap;
        self
    }

    pub fn with_inter_chunk_delay(mut self, delay: Duration) -> Self {
        self.inter_chunk_delay = delay;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MatchMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<MatchMetrics> {
        &self.metrics
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Effective chunk size: configured size capped by the provider limit
    pub fn chunk_size(&self) -> usize {
        match self.provider.max_chunk_size() {
            Some(limit) => self.chunk_size.min(limit),
            None => self.chunk_size,
        }
    }

    /// Start a new run, superseding any run still in progress
    pub fn begin(&self) -> MatchTicket {
        self.generation.issue()
    }

    /// Supersede every outstanding run
    pub fn cancel_all(&self) {
        self.generation.invalidate();
    }

    /// Handle for superseding runs from another task
    pub fn generation(&self) -> MatchGeneration {
        self.generation.clone()
    }

    /// Match a whole trajectory.
    ///
    /// Returns `None` if `ticket` was superseded before the run finished.
    /// Provider failures never surface here: failed chunks come back as raw
    /// passthrough. Progress is reported as `(0, total)` before the first
    /// call and `(i + 1, total)` as chunk `i` is dispatched.
    pub async fn match_trajectory(
        &self,
        points: &[Point],
        params: &MatchParams,
        ticket: &MatchTicket,
        progress: Option<&watch::Sender<MatchProgress>>,
    ) -> Option<MatchOutcome> {
        if points.is_empty() {
            return Some(MatchOutcome::empty());
        }

        let run_id = Uuid::now_v7();
        let plan = plan_chunks(points, self.chunk_size(), self.overlap);
        let total = plan.len();
        let report = |current: usize| {
            if let Some(tx) = progress {
                let _ = tx.send(MatchProgress { current, total });
            }
        };

        info!(
            run_id = %run_id,
            provider = %self.provider.name(),
            points = %points.len(),
            chunks = %total,
            "match_run_started"
        );
        report(0);

        let mut reconciler = Reconciler::new();
        for (i, chunk) in plan.iter().enumerate() {
            if i > 0 && !self.inter_chunk_delay.is_zero() {
                tokio::time::sleep(self.inter_chunk_delay).await;
            }
            if !ticket.is_current() {
                return self.superseded(run_id, i, total);
            }

            report(i + 1);
            let started = Instant::now();
            let segments = self.provider.match_chunk(chunk, params, ticket).await;
            self.metrics.record_provider_call(started.elapsed().as_micros() as u64);

            if !ticket.is_current() {
                return self.superseded(run_id, i + 1, total);
            }

            debug!(
                run_id = %run_id,
                chunk = %i,
                points = %chunk.len(),
                segments = %segments.len(),
                "match_chunk_done"
            );
            for segment in &segments {
                self.metrics.record_segment(segment.is_matched());
            }
            reconciler.push_chunk(segments);
        }

        self.metrics.record_seam_drop(reconciler.dropped_points());
        let outcome = reconciler.finish();

        info!(
            run_id = %run_id,
            points = %outcome.trajectory.len(),
            matched_points = %outcome.matched_point_count(),
            raw_points = %outcome.raw_point_count(),
            segments = %outcome.segments.ordered.len(),
            "match_run_finished"
        );
        Some(outcome)
    }

    fn superseded(&self, run_id: Uuid, completed: usize, total: usize) -> Option<MatchOutcome> {
        warn!(run_id = %run_id, completed = %completed, total = %total, "match_run_superseded");
        self.metrics.record_superseded();
        None
    }
}

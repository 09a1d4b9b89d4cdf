//! Lock-free match metrics
//!
//! Uses atomics so providers and the engine can record without a mutex.
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are statistical
//! counters only and must not drive logic decisions.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

#[derive(Debug, Default)]
pub struct MatchMetrics {
    provider_calls: AtomicU64,
    provider_fallbacks: AtomicU64,
    provider_retries: AtomicU64,
    matched_segments: AtomicU64,
    raw_segments: AtomicU64,
    seam_points_dropped: AtomicU64,
    superseded_runs: AtomicU64,
    max_call_latency_us: AtomicU64,
}

/// Point-in-time copy of [`MatchMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSummary {
    pub provider_calls: u64,
    pub provider_fallbacks: u64,
    pub provider_retries: u64,
    pub matched_segments: u64,
    pub raw_segments: u64,
    pub seam_points_dropped: u64,
    pub superseded_runs: u64,
    pub max_call_latency_us: u64,
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

impl MatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_provider_call(&self, latency_us: u64) {
        self.provider_calls.fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.max_call_latency_us, latency_us);
    }

    #[inline]
    pub fn record_fallback(&self) {
        self.provider_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_retry(&self) {
        self.provider_retries.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_segment(&self, matched: bool) {
        if matched {
            self.matched_segments.fetch_add(1, Ordering::Relaxed);
        } else {
            self.raw_segments.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_seam_drop(&self, count: usize) {
        self.seam_points_dropped.fetch_add(count as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_superseded(&self) {
        self.superseded_runs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            provider_calls: self.provider_calls.load(Ordering::Relaxed),
            provider_fallbacks: self.provider_fallbacks.load(Ordering::Relaxed),
            provider_retries: self.provider_retries.load(Ordering::Relaxed),
            matched_segments: self.matched_segments.load(Ordering::Relaxed),
            raw_segments: self.raw_segments.load(Ordering::Relaxed),
            seam_points_dropped: self.seam_points_dropped.load(Ordering::Relaxed),
            superseded_runs: self.superseded_runs.load(Ordering::Relaxed),
            max_call_latency_us: self.max_call_latency_us.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            provider_calls = %self.provider_calls,
            provider_fallbacks = %self.provider_fallbacks,
            provider_retries = %self.provider_retries,
            matched_segments = %self.matched_segments,
            raw_segments = %self.raw_segments,
            seam_points_dropped = %self.seam_points_dropped,
            superseded_runs = %self.superseded_runs,
            max_call_latency_us = %self.max_call_latency_us,
            "match_metrics"
        );
    }
}

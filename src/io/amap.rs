//! AMap-style whole-path road snapping adapter
//!
//! The service works in GCJ-02 and snaps the whole posted path in one call,
//! returning a single path with no per-point confidence. Input is shifted
//! into GCJ-02, posted with per-point speed, bearing and time, and the
//! snapped result is shifted back to WGS-84 as one matched segment.

use crate::domain::frame::{FrameTransform, Gcj02};
use crate::domain::types::{MatchParams, Point, Segment};
use crate::infra::config::Config;
use crate::infra::error::{Error, Result};
use crate::infra::metrics::MatchMetrics;
use crate::io::http::{send_with_retry, RetryPolicy};
use crate::io::provider::{fail_open, MatchProvider};
use crate::services::cancellation::MatchTicket;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const PROVIDER: &str = "amap";

/// Speed bounds (km/h) accepted for posted points
const MIN_SPEED_KMH: f64 = 5.0;
const MAX_SPEED_KMH: f64 = 30.0;

/// One posted sample: GCJ-02 position, speed (km/h), bearing (deg), epoch ms
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RoadPoint {
    pub x: f64,
    pub y: f64,
    pub sp: u32,
    pub ag: f64,
    pub tm: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraspRoadResponse {
    #[serde(default)]
    pub errcode: i64,
    #[serde(default)]
    pub errmsg: Option<String>,
    #[serde(default)]
    pub data: Option<GraspRoadData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraspRoadData {
    #[serde(default)]
    pub points: Option<Vec<SnappedPoint>>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SnappedPoint {
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Initial great-circle bearing from `from` to `to`, in [0, 360)
pub fn initial_bearing(from: &Point, to: &Point) -> f64 {
    let (lng1, lat1) = (from.x.to_radians(), from.y.to_radians());
    let (lng2, lat2) = (to.x.to_radians(), to.y.to_radians());
    let y = (lng2 - lng1).sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * (lng2 - lng1).cos();
    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

/// Build the request body for a GCJ-02 path.
///
/// Each point's bearing runs from its predecessor to its successor (itself
/// at the ends). Recorded timestamps are used when present; otherwise
/// points are spaced one second apart from `base_ms`.
pub fn build_road_points(path: &[Point], default_speed_kmh: f64, base_ms: i64) -> Vec<RoadPoint> {
    path.iter()
        .enumerate()
        .map(|(i, point)| {
            let prev = if i > 0 { &path[i - 1] } else { point };
            let next = path.get(i + 1).unwrap_or(point);
            let speed = point.speed.unwrap_or(default_speed_kmh);
            RoadPoint {
                x: round_to(point.x, 6),
                y: round_to(point.y, 6),
                sp: speed.clamp(MIN_SPEED_KMH, MAX_SPEED_KMH).round() as u32,
                ag: round_to(initial_bearing(prev, next), 2),
                tm: point.timestamp.map_or_else(
                    || base_ms.saturating_add(i as i64 * 1000),
                    |ts| ts.saturating_mul(1000),
                ),
            }
        })
        .collect()
}

/// Snapped positions, filling missing axes from the posted point at the
/// same index (or the last posted point)
pub fn snapped_path(snapped: &[SnappedPoint], posted: &[Point]) -> Vec<Point> {
    snapped
        .iter()
        .enumerate()
        .filter_map(|(i, s)| {
            let fallback = posted.get(i).or_else(|| posted.last());
            let x = s.x.or(fallback.map(|p| p.x))?;
            let y = s.y.or(fallback.map(|p| p.y))?;
            Some(Point::new(x, y))
        })
        .collect()
}

pub struct AmapMatcher {
    client: Client,
    base_url: String,
    key: String,
    default_speed_kmh: f64,
    frame: Gcj02,
    retry: RetryPolicy,
    metrics: Option<Arc<MatchMetrics>>,
}

impl AmapMatcher {
    pub fn new(key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(Error::MissingCredential { provider: PROVIDER });
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: "https://restapi.amap.com/v4/grasproad/driving".to_string(),
            key,
            default_speed_kmh: 20.0,
            frame: Gcj02,
            retry: RetryPolicy::default(),
            metrics: None,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let key = config.amap_key().ok_or(Error::MissingCredential { provider: PROVIDER })?;
        Ok(Self::new(key, config.amap_timeout())?
            .with_base_url(config.amap_base_url())
            .with_default_speed(config.amap_default_speed_kmh())
            .with_retry(RetryPolicy::with_max_retries(config.max_retries())))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_default_speed(mut self, speed_kmh: f64) -> Self {
        self.default_speed_kmh = speed_kmh;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MatchMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    async fn try_match(&self, coords: &[Point], ticket: &MatchTicket) -> Result<Vec<Segment>> {
        let gcj_path = self.frame.path_to_alt(coords);
        let body = build_road_points(
            &gcj_path,
            self.default_speed_kmh,
            chrono::Utc::now().timestamp_millis(),
        );

        let response = send_with_retry(
            &self.client,
            |c| c.post(&self.base_url).query(&[("key", self.key.as_str())]).json(&body),
            &self.retry,
            ticket,
            PROVIDER,
            self.metrics.as_deref(),
        )
        .await?;
        let text = response.text().await.map_err(|e| Error::Http(e.without_url()))?;
        let parsed: GraspRoadResponse = serde_json::from_str(&text)?;

        if parsed.errcode != 0 {
            return Err(Error::provider(
                PROVIDER,
                format!("errcode {}: {}", parsed.errcode, parsed.errmsg.unwrap_or_default()),
            ));
        }
        let snapped = parsed.data.and_then(|d| d.points).unwrap_or_default();
        let path = snapped_path(&snapped, &gcj_path);
        if path.is_empty() {
            return Err(Error::provider(PROVIDER, "response has no points"));
        }

        debug!(posted = %coords.len(), snapped = %path.len(), "amap_path_snapped");
        Ok(vec![Segment::matched(self.frame.path_from_alt(&path))])
    }
}

#[async_trait]
impl MatchProvider for AmapMatcher {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    /// The search radius is not supported by this service and is ignored
    async fn match_chunk(
        &self,
        coords: &[Point],
        _params: &MatchParams,
        ticket: &MatchTicket,
    ) -> Vec<Segment> {
        if coords.is_empty() {
            return Vec::new();
        }
        let result = self.try_match(coords, ticket).await;
        fail_open(PROVIDER, coords, result, self.metrics.as_deref())
    }
}

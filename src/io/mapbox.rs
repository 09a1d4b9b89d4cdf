//! Mapbox-style map matching adapter
//!
//! The service returns one or more matchings plus a tracepoint per input
//! coordinate naming the matching it was snapped into (or null). Runs of
//! input points are classified by their tracepoint's matching index; a run is
//! replaced by its matching's geometry only if the matching is confident and
//! has not already been emitted.

use crate::domain::types::{MatchParams, Point, Segment};
use crate::infra::config::Config;
use crate::infra::error::{Error, Result};
use crate::infra::metrics::MatchMetrics;
use crate::io::http::{send_with_retry, RetryPolicy};
use crate::io::provider::{fail_open, MatchProvider};
use crate::services::cancellation::MatchTicket;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Service limit on coordinates per request
pub const MAPBOX_MAX_COORDINATES: usize = 100;

const PROVIDER: &str = "mapbox";

#[derive(Debug, Clone, Deserialize)]
pub struct MatchingResponse {
    pub code: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub matchings: Option<Vec<Matching>>,
    #[serde(default)]
    pub tracepoints: Option<Vec<Option<Tracepoint>>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Matching {
    #[serde(default)]
    pub confidence: f64,
    pub geometry: Geometry,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Geometry {
    #[serde(default)]
    pub coordinates: Vec<[f64; 2]>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tracepoint {
    #[serde(default)]
    pub matchings_index: Option<usize>,
}

/// Consecutive input points sharing a matching index (or none)
enum Run {
    Unmatched(Vec<Point>),
    Matching { index: usize, points: Vec<Point> },
}

impl Run {
    fn start(index: Option<usize>, point: Point) -> Self {
        match index {
            Some(index) => Run::Matching { index, points: vec![point] },
            None => Run::Unmatched(vec![point]),
        }
    }

    fn accepts(&self, index: Option<usize>) -> bool {
        match (self, index) {
            (Run::Unmatched(_), None) => true,
            (Run::Matching { index: current, .. }, Some(idx)) => *current == idx,
            _ => false,
        }
    }

    fn push(&mut self, point: Point) {
        match self {
            Run::Unmatched(points) | Run::Matching { points, .. } => points.push(point),
        }
    }
}

/// Classify a chunk from its tracepoints.
///
/// Each maximal run of equal matching index becomes one segment. A run
/// becomes `Matched` with the matching's full geometry when the matching's
/// confidence is at least `threshold`, its geometry is non-empty, and no
/// earlier run already emitted it. Every other run is `Raw` with the
/// original points.
pub fn classify_tracepoints(
    coords: &[Point],
    response: &MatchingResponse,
    threshold: f64,
) -> Vec<Segment> {
    let tracepoints = response.tracepoints.as_deref().unwrap_or_default();
    let matchings = response.matchings.as_deref().unwrap_or_default();

    let mut runs: Vec<Run> = Vec::new();
    for (i, point) in coords.iter().enumerate() {
        let index = tracepoints.get(i).and_then(Option::as_ref).and_then(|tp| tp.matchings_index);
        match runs.last_mut() {
            Some(run) if run.accepts(index) => run.push(*point),
            _ => runs.push(Run::start(index, *point)),
        }
    }

    let mut emitted = HashSet::new();
    runs.into_iter()
        .map(|run| match run {
            Run::Unmatched(points) => Segment::raw(points),
            Run::Matching { index, points } => {
                let trusted = matchings.get(index).filter(|m| {
                    m.confidence >= threshold && !m.geometry.coordinates.is_empty()
                });
                match trusted {
                    Some(m) if emitted.insert(index) => Segment::matched(
                        m.geometry.coordinates.iter().map(|&c| Point::from(c)).collect(),
                    ),
                    _ => Segment::raw(points),
                }
            }
        })
        .collect()
}

pub struct MapboxMatcher {
    client: Client,
    base_url: String,
    profile: String,
    access_token: String,
    retry: RetryPolicy,
    metrics: Option<Arc<MatchMetrics>>,
}

impl MapboxMatcher {
    pub fn new(access_token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let access_token = access_token.into();
        if access_token.trim().is_empty() {
            return Err(Error::MissingCredential { provider: PROVIDER });
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: "https://api.mapbox.com/matching/v5".to_string(),
            profile: "mapbox/driving".to_string(),
            access_token,
            retry: RetryPolicy::default(),
            metrics: None,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let token =
            config.mapbox_access_token().ok_or(Error::MissingCredential { provider: PROVIDER })?;
        Ok(Self::new(token, config.mapbox_timeout())?
            .with_base_url(config.mapbox_base_url())
            .with_profile(config.mapbox_profile())
            .with_retry(RetryPolicy::with_max_retries(config.max_retries())))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = profile.into();
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

    /// Request URL without credentials: `{base}/{profile}/{lng,lat;...}`
    fn request_url(&self, coords: &[Point]) -> String {
        let path: Vec<String> = coords.iter().map(|p| format!("{},{}", p.x, p.y)).collect();
        format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.profile.trim_matches('/'),
            path.join(";")
        )
    }

    fn query(&self, coords: &[Point], params: &MatchParams) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("access_token", self.access_token.clone()),
            ("geometries", "geojson".to_string()),
            ("overview", "full".to_string()),
        ];
        if let Some(radius) = params.radius.filter(|r| *r > 0.0) {
            let radiuses = vec![radius.to_string(); coords.len()];
            query.push(("radiuses", radiuses.join(";")));
        }
        query
    }

    async fn try_match(
        &self,
        coords: &[Point],
        params: &MatchParams,
        ticket: &MatchTicket,
    ) -> Result<Vec<Segment>> {
        let url = self.request_url(coords);
        let query = self.query(coords, params);

        let response = send_with_retry(
            &self.client,
            |c| c.get(&url).query(&query),
            &self.retry,
            ticket,
            PROVIDER,
            self.metrics.as_deref(),
        )
        .await?;
        let body = response.text().await.map_err(|e| Error::Http(e.without_url()))?;
        let body: MatchingResponse = serde_json::from_str(&body)?;

        if body.code != "Ok" {
            return Err(Error::provider(
                PROVIDER,
                format!("code {}: {}", body.code, body.message.unwrap_or_default()),
            ));
        }
        if body.matchings.as_ref().map_or(true, Vec::is_empty) {
            return Err(Error::provider(PROVIDER, "response has no matchings"));
        }

        let segments = classify_tracepoints(coords, &body, params.confidence_threshold);
        debug!(
            points = %coords.len(),
            segments = %segments.len(),
            matched = %segments.iter().filter(|s| s.is_matched()).count(),
            "mapbox_chunk_classified"
        );
        Ok(segments)
    }
}

#[async_trait]
impl MatchProvider for MapboxMatcher {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn max_chunk_size(&self) -> Option<usize> {
        Some(MAPBOX_MAX_COORDINATES)
    }

    async fn match_chunk(
        &self,
        coords: &[Point],
        params: &MatchParams,
        ticket: &MatchTicket,
    ) -> Vec<Segment> {
        if coords.is_empty() {
            return Vec::new();
        }
        let result = self.try_match(coords, params, ticket).await;
        fail_open(PROVIDER, coords, result, self.metrics.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::SegmentKind;
    use crate::io::mock_service::{FailMode, MockBehavior, MockMatcher};

    fn coords(n: usize) -> Vec<Point> {
        (0..n).map(|i| Point::new(116.0 + i as f64 * 0.001, 39.9)).collect()
    }

    fn response(json: &str) -> MatchingResponse {
        serde_json::from_str(json).unwrap()
    }

    fn matcher(server: &MockMatcher) -> MapboxMatcher {
        MapboxMatcher::new("test-token", Duration::from_secs(5))
            .unwrap()
            .with_base_url(server.mapbox_url())
            .with_retry(RetryPolicy { max_retries: 1, base_delay: Duration::from_millis(1) })
    }

    #[test]
    fn test_classify_mixed_runs() {
        let pts = coords(5);
        let resp = response(
            r#"{
                "code": "Ok",
                "matchings": [{"confidence": 0.9, "geometry": {"coordinates": [[1.0, 1.0], [2.0, 2.0]]}}],
                "tracepoints": [null, {"matchings_index": 0}, {"matchings_index": 0}, null, null]
            }"#,
        );

        let segs = classify_tracepoints(&pts, &resp, 0.5);

        assert_eq!(segs.len(), 3);
        assert_eq!(segs[0], Segment::raw(vec![pts[0]]));
        assert_eq!(segs[1], Segment::matched(vec![Point::new(1.0, 1.0), Point::new(2.0, 2.0)]));
        assert_eq!(segs[2], Segment::raw(vec![pts[3], pts[4]]));
    }

    #[test]
    fn test_low_confidence_is_raw() {
        let pts = coords(3);
        let resp = response(
            r#"{
                "code": "Ok",
                "matchings": [{"confidence": 0.2, "geometry": {"coordinates": [[1.0, 1.0], [2.0, 2.0]]}}],
                "tracepoints": [{"matchings_index": 0}, {"matchings_index": 0}, {"matchings_index": 0}]
            }"#,
        );

        let segs = classify_tracepoints(&pts, &resp, 0.5);
        assert_eq!(segs, vec![Segment::raw(pts)]);
    }

    #[test]
    fn test_repeated_matching_index_emitted_once() {
        let pts = coords(4);
        let resp = response(
            r#"{
                "code": "Ok",
                "matchings": [{"confidence": 0.9, "geometry": {"coordinates": [[1.0, 1.0], [2.0, 2.0]]}}],
                "tracepoints": [{"matchings_index": 0}, null, {"matchings_index": 0}, {"matchings_index": 0}]
            }"#,
        );

        let segs = classify_tracepoints(&pts, &resp, 0.5);
        let kinds: Vec<SegmentKind> = segs.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![SegmentKind::Matched, SegmentKind::Raw, SegmentKind::Raw]);
        assert_eq!(segs[2].points, vec![pts[2], pts[3]]);
    }

    #[test]
    fn test_missing_or_out_of_range_matching_is_raw() {
        let pts = coords(3);
        let resp = response(
            r#"{
                "code": "Ok",
                "matchings": [
                    {"confidence": 0.9, "geometry": {"coordinates": []}}
                ],
                "tracepoints": [{"matchings_index": 0}, {"matchings_index": 3}]
            }"#,
        );

        let segs = classify_tracepoints(&pts, &resp, 0.5);
        // Short tracepoint list: the third point has no tracepoint
        assert_eq!(
            segs,
            vec![
                Segment::raw(vec![pts[0]]),
                Segment::raw(vec![pts[1]]),
                Segment::raw(vec![pts[2]]),
            ]
        );
    }

    #[test]
    fn test_request_url_and_query() {
        let m = MapboxMatcher::new("secret", Duration::from_secs(1))
            .unwrap()
            .with_base_url("http://host/matching/v5/");
        let pts = vec![Point::new(116.5, 39.25), Point::new(116.75, 39.5)];

        assert_eq!(
            m.request_url(&pts),
            "http://host/matching/v5/mapbox/driving/116.5,39.25;116.75,39.5"
        );
        assert!(!m.request_url(&pts).contains("secret"));

        let params = MatchParams { confidence_threshold: 0.5, radius: Some(25.0) };
        let query = m.query(&pts, &params);
        assert!(query.contains(&("radiuses", "25;25".to_string())));
        assert!(query.contains(&("geometries", "geojson".to_string())));

        let query = m.query(&pts, &MatchParams::default());
        assert!(!query.iter().any(|(k, _)| *k == "radiuses"));
    }

    #[test]
    fn test_blank_token_rejected() {
        let err = MapboxMatcher::new("  ", Duration::from_secs(1)).err().unwrap();
        assert!(matches!(err, Error::MissingCredential { provider: "mapbox" }));
    }

    #[tokio::test]
    async fn test_match_chunk_against_mock() {
        let server = MockMatcher::start(0, MockBehavior::default()).await.unwrap();
        let pts = coords(10);

        let segs = matcher(&server)
            .match_chunk(&pts, &MatchParams::default(), &MatchTicket::detached())
            .await;

        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].kind, SegmentKind::Matched);
        assert_eq!(segs[0].points.len(), pts.len());
        for (snapped, input) in segs[0].points.iter().zip(&pts) {
            assert!(snapped.coincides_with(input, 1e-12));
        }
    }

    #[tokio::test]
    async fn test_no_match_falls_back_to_raw() {
        let behavior = MockBehavior { no_match: true, ..Default::default() };
        let server = MockMatcher::start(0, behavior).await.unwrap();
        let metrics = Arc::new(MatchMetrics::new());
        let pts = coords(5);

        let segs = matcher(&server)
            .with_metrics(metrics.clone())
            .match_chunk(&pts, &MatchParams::default(), &MatchTicket::detached())
            .await;

        assert_eq!(segs, Segment::passthrough(&pts));
        assert_eq!(metrics.summary().provider_fallbacks, 1);
    }

    #[tokio::test]
    async fn test_http_failure_falls_back_to_raw() {
        let behavior = MockBehavior { fail: FailMode::Always(500), ..Default::default() };
        let server = MockMatcher::start(0, behavior).await.unwrap();
        let pts = coords(5);

        let segs = matcher(&server)
            .match_chunk(&pts, &MatchParams::default(), &MatchTicket::detached())
            .await;

        assert_eq!(segs, Segment::passthrough(&pts));
        assert_eq!(server.request_count(), 2);
    }

    #[tokio::test]
    async fn test_empty_chunk_makes_no_request() {
        let server = MockMatcher::start(0, MockBehavior::default()).await.unwrap();
        let segs = matcher(&server)
            .match_chunk(&[], &MatchParams::default(), &MatchTicket::detached())
            .await;
        assert!(segs.is_empty());
        assert_eq!(server.request_count(), 0);
    }
}

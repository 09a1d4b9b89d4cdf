//! Map matching provider abstraction
//!
//! Adapters convert one chunk of WGS-84 points into classified segments and
//! never fail: any transport or service error degrades to a raw passthrough
//! of the chunk so the caller always receives a complete path.

use crate::domain::types::{MatchParams, Point, Segment};
use crate::infra::config::{Config, ProviderKind};
use crate::infra::error::Result;
use crate::infra::metrics::MatchMetrics;
use crate::io::amap::AmapMatcher;
use crate::io::mapbox::MapboxMatcher;
use crate::services::cancellation::MatchTicket;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

#[async_trait]
pub trait MatchProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Largest number of points the service accepts per call
    fn max_chunk_size(&self) -> Option<usize> {
        None
    }

    /// Match one chunk. Output segments are non-empty and in input order;
    /// an empty `coords` yields no segments. Retries stop once `ticket` is
    /// superseded and the chunk degrades to a raw passthrough.
    async fn match_chunk(
        &self,
        coords: &[Point],
        params: &MatchParams,
        ticket: &MatchTicket,
    ) -> Vec<Segment>;
}

/// Resolve an adapter result, degrading errors and empty answers to a raw passthrough
pub(crate) fn fail_open(
    provider: &'static str,
    coords: &[Point],
    result: Result<Vec<Segment>>,
    metrics: Option<&MatchMetrics>,
) -> Vec<Segment> {
    let reason = match result {
        Ok(mut segments) => {
            segments.retain(|s| !s.points.is_empty());
            if !segments.is_empty() {
                return segments;
            }
            "empty result".to_string()
        }
        Err(e) => e.to_string(),
    };

    warn!(provider = %provider, points = %coords.len(), reason = %reason, "provider_fallback_raw");
    if let Some(m) = metrics {
        m.record_fallback();
    }
    Segment::passthrough(coords)
}

/// Build the adapter selected by `config`.
///
/// Fails with a configuration error when the provider's credential is
/// missing; no network I/O happens here.
pub fn build_provider(
    config: &Config,
    metrics: Option<Arc<MatchMetrics>>,
) -> Result<Arc<dyn MatchProvider>> {
    let provider: Arc<dyn MatchProvider> = match config.provider() {
        ProviderKind::Mapbox => {
            let matcher = MapboxMatcher::from_config(config)?;
            Arc::new(match metrics {
                Some(m) => matcher.with_metrics(m),
                None => matcher,
            })
        }
        ProviderKind::Amap => {
            let matcher = AmapMatcher::from_config(config)?;
            Arc::new(match metrics {
                Some(m) => matcher.with_metrics(m),
                None => matcher,
            })
        }
    };
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::SegmentKind;
    use crate::infra::error::Error;

    fn coords() -> Vec<Point> {
        vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)]
    }

    #[test]
    fn test_fail_open_passes_segments_through() {
        let segs = vec![Segment::matched(coords()), Segment::raw(vec![])];
        let out = fail_open("test", &coords(), Ok(segs), None);
        assert_eq!(out, vec![Segment::matched(coords())]);
    }

    #[test]
    fn test_fail_open_on_error() {
        let metrics = MatchMetrics::new();
        let out =
            fail_open("test", &coords(), Err(Error::provider("test", "boom")), Some(&metrics));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, SegmentKind::Raw);
        assert_eq!(out[0].points, coords());
        assert_eq!(metrics.summary().provider_fallbacks, 1);
    }

    #[test]
    fn test_fail_open_on_empty_result() {
        let out = fail_open("test", &coords(), Ok(vec![]), None);
        assert_eq!(out, Segment::passthrough(&coords()));
    }

    #[test]
    fn test_build_provider_requires_credential() {
        let config = Config::default().with_provider(ProviderKind::Mapbox);
        let err = build_provider(&config, None).err().unwrap();
        assert!(matches!(err, Error::MissingCredential { provider: "mapbox" }));

        let config = Config::default().with_provider(ProviderKind::Amap);
        let err = build_provider(&config, None).err().unwrap();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_build_provider_selects_adapter() {
        let config = Config::default()
            .with_provider(ProviderKind::Amap)
            .with_credential_overrides(None, Some("key".into()));
        let provider = build_provider(&config, Some(Arc::new(MatchMetrics::new()))).unwrap();
        assert_eq!(provider.name(), "amap");
        assert_eq!(provider.max_chunk_size(), None);

        let config = Config::default().with_credential_overrides(Some("tok".into()), None);
        let provider = build_provider(&config, None).unwrap();
        assert_eq!(provider.name(), "mapbox");
        assert_eq!(provider.max_chunk_size(), Some(100));
    }
}

//! Local stand-in for both map matching services
//!
//! Serves the Mapbox-style `GET /matching/v5/{profile}/{coords}` route and the
//! AMap-style `POST /v4/grasproad/driving` route. Both echo the input path
//! back as the snapped geometry. Failures can be injected per request number.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info};

pub const MAPBOX_ROUTE: &str = "/matching/v5";
pub const AMAP_ROUTE: &str = "/v4/grasproad/driving";

/// AMap error code for a path the service could not snap
const AMAP_NO_MATCH_ERRCODE: i64 = 30001;

#[derive(Debug, Clone, Default, PartialEq)]
pub enum FailMode {
    #[default]
    Never,
    /// Every request fails with this status
    Always(u16),
    /// These 1-based request numbers fail with 503
    On(Vec<u64>),
}

impl FailMode {
    fn status_for(&self, request: u64) -> Option<StatusCode> {
        match self {
            FailMode::Never => None,
            FailMode::Always(code) => {
                Some(StatusCode::from_u16(*code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR))
            }
            FailMode::On(requests) if requests.contains(&request) => {
                Some(StatusCode::SERVICE_UNAVAILABLE)
            }
            FailMode::On(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MockBehavior {
    /// Confidence reported for every Mapbox matching
    pub confidence: f64,
    pub fail: FailMode,
    /// Answer `NoMatch` / a non-zero errcode instead of a geometry
    pub no_match: bool,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self { confidence: 0.9, fail: FailMode::Never, no_match: false }
    }
}

struct MockState {
    behavior: MockBehavior,
    requests: AtomicU64,
}

/// Running mock server; shuts down when dropped
pub struct MockMatcher {
    addr: SocketAddr,
    state: Arc<MockState>,
    shutdown: watch::Sender<bool>,
}

impl MockMatcher {
    /// Bind on 127.0.0.1 (`port` 0 picks a free port) and start serving
    pub async fn start(port: u16, behavior: MockBehavior) -> std::io::Result<Self> {
        Self::start_on(SocketAddr::from(([127, 0, 0, 1], port)), behavior).await
    }

    pub async fn start_on(addr: SocketAddr, behavior: MockBehavior) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        let state = Arc::new(MockState { behavior, requests: AtomicU64::new(0) });
        let (shutdown, rx) = watch::channel(false);

        info!(addr = %addr, "mock_matcher_started");
        tokio::spawn(serve(listener, state.clone(), rx));

        Ok(Self { addr, state, shutdown })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Base URL for the Mapbox adapter (profile is appended by the client)
    pub fn mapbox_url(&self) -> String {
        format!("{}{}", self.base_url(), MAPBOX_ROUTE)
    }

    pub fn amap_url(&self) -> String {
        format!("{}{}", self.base_url(), AMAP_ROUTE)
    }

    pub fn request_count(&self) -> u64 {
        self.state.requests.load(Ordering::SeqCst)
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

impl Drop for MockMatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn serve(listener: TcpListener, state: Arc<MockState>, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let state = state.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let state = state.clone();
                                async move { handle_request(req, state).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "mock_matcher_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "mock_matcher_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("mock_matcher_shutdown");
                    return;
                }
            }
        }
    }
}

async fn handle_request(
    req: Request<Incoming>,
    state: Arc<MockState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let request = state.requests.fetch_add(1, Ordering::SeqCst) + 1;
    let path = req.uri().path().to_string();
    debug!(request = %request, method = %req.method(), path = %path, "mock_matcher_request");

    if let Some(status) = state.behavior.fail.status_for(request) {
        return Ok(json_response(status, json!({ "message": "injected failure" })));
    }

    let response = match (req.method(), path.as_str()) {
        (&Method::GET, "/health") => json_response(StatusCode::OK, json!({ "status": "ok" })),
        (&Method::GET, p) if p.starts_with(MAPBOX_ROUTE) => mapbox_response(p, &state.behavior),
        (&Method::POST, AMAP_ROUTE) => match req.into_body().collect().await {
            Ok(body) => amap_response(&body.to_bytes(), &state.behavior),
            Err(e) => json_response(StatusCode::BAD_REQUEST, json!({ "message": e.to_string() })),
        },
        _ => json_response(StatusCode::NOT_FOUND, json!({ "message": "Not Found" })),
    };
    Ok(response)
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(Bytes::from(body.to_string())));
    *resp.status_mut() = status;
    resp.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    resp
}

/// Parse the `lng,lat;lng,lat` path segment
fn parse_coordinates(segment: &str) -> Option<Vec<[f64; 2]>> {
    segment
        .split(';')
        .map(|pair| {
            let (lng, lat) = pair.split_once(',')?;
            Some([lng.parse().ok()?, lat.parse().ok()?])
        })
        .collect()
}

fn mapbox_response(path: &str, behavior: &MockBehavior) -> Response<Full<Bytes>> {
    let segment = path.rsplit('/').next().unwrap_or_default();
    let Some(coords) = parse_coordinates(segment).filter(|c| c.len() >= 2) else {
        return json_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "code": "InvalidInput", "message": "Expected at least two coordinates" }),
        );
    };

    if behavior.no_match {
        return json_response(
            StatusCode::OK,
            json!({ "code": "NoMatch", "message": "Could not match the trace." }),
        );
    }

    let tracepoints: Vec<serde_json::Value> = coords
        .iter()
        .enumerate()
        .map(|(i, c)| json!({ "matchings_index": 0, "waypoint_index": i, "location": c }))
        .collect();

    json_response(
        StatusCode::OK,
        json!({
            "code": "Ok",
            "matchings": [{
                "confidence": behavior.confidence,
                "geometry": { "type": "LineString", "coordinates": coords },
            }],
            "tracepoints": tracepoints,
        }),
    )
}

#[derive(Deserialize)]
struct PostedPoint {
    x: f64,
    y: f64,
}

fn amap_response(body: &[u8], behavior: &MockBehavior) -> Response<Full<Bytes>> {
    let points: Vec<PostedPoint> = match serde_json::from_slice(body) {
        Ok(points) => points,
        Err(e) => {
            return json_response(
                StatusCode::OK,
                json!({ "errcode": 30000, "errmsg": format!("INVALID_PARAMS: {}", e) }),
            )
        }
    };

    if behavior.no_match {
        return json_response(
            StatusCode::OK,
            json!({ "errcode": AMAP_NO_MATCH_ERRCODE, "errmsg": "ENGINE_RESPONSE_DATA_ERROR" }),
        );
    }

    let snapped: Vec<serde_json::Value> =
        points.iter().map(|p| json!({ "x": p.x, "y": p.y })).collect();
    json_response(
        StatusCode::OK,
        json!({ "errcode": 0, "errmsg": "OK", "data": { "distance": 0, "points": snapped } }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_coordinates() {
        assert_eq!(
            parse_coordinates("116.4,39.9;116.5,39.95"),
            Some(vec![[116.4, 39.9], [116.5, 39.95]])
        );
        assert_eq!(parse_coordinates("116.4;39.9"), None);
        assert_eq!(parse_coordinates("a,b"), None);
    }

    #[test]
    fn test_fail_mode() {
        assert_eq!(FailMode::Never.status_for(1), None);
        assert_eq!(FailMode::Always(429).status_for(7), Some(StatusCode::TOO_MANY_REQUESTS));
        let on = FailMode::On(vec![2]);
        assert_eq!(on.status_for(1), None);
        assert_eq!(on.status_for(2), Some(StatusCode::SERVICE_UNAVAILABLE));
    }

    #[tokio::test]
    async fn test_serves_mapbox_echo() {
        let server = MockMatcher::start(0, MockBehavior::default()).await.unwrap();
        let url = format!("{}/mapbox/driving/1.5,2.5;3.5,4.5", server.mapbox_url());

        let body: serde_json::Value =
            reqwest::get(&url).await.unwrap().json().await.unwrap();

        assert_eq!(body["code"], "Ok");
        assert_eq!(body["matchings"][0]["geometry"]["coordinates"][1][0], 3.5);
        assert_eq!(body["tracepoints"].as_array().unwrap().len(), 2);
        assert_eq!(server.request_count(), 1);
    }

    #[tokio::test]
    async fn test_serves_amap_echo() {
        let server = MockMatcher::start(0, MockBehavior::default()).await.unwrap();
        let body: serde_json::Value = reqwest::Client::new()
            .post(server.amap_url())
            .json(&json!([{ "x": 116.1, "y": 39.1, "sp": 30, "ag": 0, "tm": 0 }]))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["errcode"], 0);
        assert_eq!(body["data"]["points"][0]["x"], 116.1);
    }
}

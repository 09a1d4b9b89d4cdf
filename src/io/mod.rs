//! IO modules - map matching services
//!
//! - `provider` - provider trait, fail-open handling and adapter selection
//! - `mapbox` - tracepoint-indexed matching adapter
//! - `amap` - whole-path GCJ-02 snapping adapter
//! - `http` - request retry with backoff
//! - `mock_service` - local HTTP stand-in for both services

pub mod amap;
pub mod http;
pub mod mapbox;
pub mod mock_service;
pub mod provider;

// Re-export commonly used types
pub use amap::AmapMatcher;
pub use http::RetryPolicy;
pub use mapbox::MapboxMatcher;
pub use mock_service::{FailMode, MockBehavior, MockMatcher};
pub use provider::{build_provider, MatchProvider};

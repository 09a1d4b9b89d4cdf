//! Infrastructure - configuration, errors and metrics
//!
//! - `config` - Application configuration (TOML loading, defaults, env credentials)
//! - `error` - Crate error type and `Result` alias
//! - `metrics` - Lock-free match counters

pub mod config;
pub mod error;
pub mod metrics;

pub use config::{Config, ProviderKind};
pub use error::{Error, Result};
pub use metrics::{MatchMetrics, MetricsSummary};

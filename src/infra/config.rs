//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml
//!
//! Provider credentials may be overridden by MAPBOX_ACCESS_TOKEN and AMAP_KEY.

use crate::domain::types::MatchParams;
use crate::infra::error::{Error, Result};
use crate::io::mapbox::MAPBOX_MAX_COORDINATES;
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const MAPBOX_TOKEN_ENV: &str = "MAPBOX_ACCESS_TOKEN";
pub const AMAP_KEY_ENV: &str = "AMAP_KEY";
pub const CONFIG_FILE_ENV: &str = "CONFIG_FILE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Tracepoint-indexed road snapping
    Mapbox,
    /// Whole-path snapping in GCJ-02
    Amap,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Mapbox => "mapbox",
            ProviderKind::Amap => "amap",
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mapbox" => Ok(ProviderKind::Mapbox),
            "amap" => Ok(ProviderKind::Amap),
            other => Err(Error::Configuration(format!("unknown provider '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ReductionConfig {
    /// Minimum spacing between kept points (0 disables decimation)
    #[serde(default)]
    pub interval_secs: i64,
    /// Douglas-Peucker tolerance in degrees
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Skip the radial pre-filter
    #[serde(default = "default_high_quality")]
    pub high_quality: bool,
}

fn default_tolerance() -> f64 {
    0.0001 // ≈10 m
}

fn default_high_quality() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchingConfig {
    #[serde(default = "default_provider")]
    pub provider: ProviderKind,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// Per-point search radius in metres
    #[serde(default)]
    pub radius: Option<f64>,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_inter_chunk_delay_ms")]
    pub inter_chunk_delay_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            confidence_threshold: default_confidence_threshold(),
            radius: None,
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            inter_chunk_delay_ms: default_inter_chunk_delay_ms(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_provider() -> ProviderKind {
    ProviderKind::Mapbox
}

fn default_confidence_threshold() -> f64 {
    0.5
}

fn default_chunk_size() -> usize {
    100 // Mapbox matching accepts at most 100 coordinates per request
}

fn default_chunk_overlap() -> usize {
    3
}

fn default_inter_chunk_delay_ms() -> u64 {
    250
}

fn default_max_retries() -> u32 {
    2
}

#[derive(Debug, Clone, Deserialize)]
pub struct MapboxConfig {
    #[serde(default = "default_mapbox_base_url")]
    pub base_url: String,
    #[serde(default = "default_mapbox_profile")]
    pub profile: String,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for MapboxConfig {
    fn default() -> Self {
        Self {
            base_url: default_mapbox_base_url(),
            profile: default_mapbox_profile(),
            access_token: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_mapbox_base_url() -> String {
    "https://api.mapbox.com/matching/v5".to_string()
}

fn default_mapbox_profile() -> String {
    "mapbox/driving".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct AmapConfig {
    #[serde(default = "default_amap_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Speed sent for points without a recorded speed (km/h)
    #[serde(default = "default_speed_kmh")]
    pub default_speed_kmh: f64,
}

impl Default for AmapConfig {
    fn default() -> Self {
        Self {
            base_url: default_amap_base_url(),
            key: None,
            timeout_ms: default_timeout_ms(),
            default_speed_kmh: default_speed_kmh(),
        }
    }
}

fn default_amap_base_url() -> String {
    "https://restapi.amap.com/v4/grasproad/driving".to_string()
}

fn default_speed_kmh() -> f64 {
    20.0
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub reduction: ReductionConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub mapbox: MapboxConfig,
    #[serde(default)]
    pub amap: AmapConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    interval_secs: i64,
    tolerance: f64,
    high_quality: bool,
    provider: ProviderKind,
    confidence_threshold: f64,
    radius: Option<f64>,
    chunk_size: usize,
    chunk_overlap: usize,
    inter_chunk_delay_ms: u64,
    max_retries: u32,
    mapbox_base_url: String,
    mapbox_profile: String,
    mapbox_access_token: Option<String>,
    mapbox_timeout_ms: u64,
    amap_base_url: String,
    amap_key: Option<String>,
    amap_timeout_ms: u64,
    amap_default_speed_kmh: f64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        let TomlConfig { reduction, matching, mapbox, amap } = toml_config;
        Self {
            interval_secs: reduction.interval_secs,
            tolerance: reduction.tolerance,
            high_quality: reduction.high_quality,
            provider: matching.provider,
            confidence_threshold: matching.confidence_threshold,
            radius: matching.radius,
            chunk_size: matching.chunk_size,
            chunk_overlap: matching.chunk_overlap,
            inter_chunk_delay_ms: matching.inter_chunk_delay_ms,
            max_retries: matching.max_retries,
            mapbox_base_url: mapbox.base_url,
            mapbox_profile: mapbox.profile,
            mapbox_access_token: non_empty(mapbox.access_token),
            mapbox_timeout_ms: mapbox.timeout_ms,
            amap_base_url: amap.base_url,
            amap_key: non_empty(amap.key),
            amap_timeout_ms: amap.timeout_ms,
            amap_default_speed_kmh: amap.default_speed_kmh,
            config_file,
        }
    }

    /// Config file used when none is given: CONFIG_FILE, else config/dev.toml
    pub fn default_config_path() -> String {
        env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| "config/dev.toml".to_string())
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load(path: Option<&str>) -> Self {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load_from_path(Self::default_config_path()),
        }
    }

    /// Load from an explicit path, falling back to defaults on any error
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %format!("{:#}", e), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    /// Apply credentials from MAPBOX_ACCESS_TOKEN / AMAP_KEY
    pub fn with_env_credentials(self) -> Self {
        self.with_credential_overrides(env::var(MAPBOX_TOKEN_ENV).ok(), env::var(AMAP_KEY_ENV).ok())
    }

    /// Non-empty overrides replace the file values
    pub fn with_credential_overrides(
        mut self,
        mapbox_token: Option<String>,
        amap_key: Option<String>,
    ) -> Self {
        if let Some(token) = non_empty(mapbox_token) {
            self.mapbox_access_token = Some(token);
        }
        if let Some(key) = non_empty(amap_key) {
            self.amap_key = Some(key);
        }
        self
    }

    /// Check value ranges; credentials are checked when a provider is built
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(Error::Configuration(format!(
                "confidence_threshold {} outside [0, 1]",
                self.confidence_threshold
            )));
        }
        if self.chunk_size < 2 {
            return Err(Error::Configuration(format!(
                "chunk_size {} must be at least 2",
                self.chunk_size
            )));
        }
        let chunk_size = self.effective_chunk_size();
        if self.chunk_overlap >= chunk_size {
            return Err(Error::Configuration(format!(
                "chunk_overlap {} must be smaller than the {} chunk size {}",
                self.chunk_overlap,
                self.provider.as_str(),
                chunk_size
            )));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(Error::Configuration(format!("tolerance {} is invalid", self.tolerance)));
        }
        Ok(())
    }

    /// Configured chunk size capped by the selected provider's request limit
    pub fn effective_chunk_size(&self) -> usize {
        match self.provider {
            ProviderKind::Mapbox => self.chunk_size.min(MAPBOX_MAX_COORDINATES),
            ProviderKind::Amap => self.chunk_size,
        }
    }

    pub fn match_params(&self) -> MatchParams {
        MatchParams {
            confidence_threshold: self.confidence_threshold,
            radius: self.radius.filter(|r| *r > 0.0),
        }
    }

    pub fn interval_secs(&self) -> i64 {
        self.interval_secs
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn high_quality(&self) -> bool {
        self.high_quality
    }

    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    pub fn confidence_threshold(&self) -> f64 {
        self.confidence_threshold
    }

    pub fn radius(&self) -> Option<f64> {
        self.radius
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    pub fn inter_chunk_delay(&self) -> Duration {
        Duration::from_millis(self.inter_chunk_delay_ms)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn mapbox_base_url(&self) -> &str {
        &self.mapbox_base_url
    }

    pub fn mapbox_profile(&self) -> &str {
        &self.mapbox_profile
    }

    pub fn mapbox_access_token(&self) -> Option<&str> {
        self.mapbox_access_token.as_deref()
    }

    pub fn mapbox_timeout(&self) -> Duration {
        Duration::from_millis(self.mapbox_timeout_ms)
    }

    pub fn amap_base_url(&self) -> &str {
        &self.amap_base_url
    }

    pub fn amap_key(&self) -> Option<&str> {
        self.amap_key.as_deref()
    }

    pub fn amap_timeout(&self) -> Duration {
        Duration::from_millis(self.amap_timeout_ms)
    }

    pub fn amap_default_speed_kmh(&self) -> f64 {
        self.amap_default_speed_kmh
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    // Builders for CLI overrides and tests

    pub fn with_provider(mut self, provider: ProviderKind) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_interval_secs(mut self, interval_secs: i64) -> Self {
        self.interval_secs = interval_secs;
        self
    }

    pub fn with_inter_chunk_delay_ms(mut self, ms: u64) -> Self {
        self.inter_chunk_delay_ms = ms;
        self
    }

    pub fn with_mapbox_base_url(mut self, url: impl Into<String>) -> Self {
        self.mapbox_base_url = url.into();
        self
    }

    pub fn with_amap_base_url(mut self, url: impl Into<String>) -> Self {
        self.amap_base_url = url.into();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.tolerance(), 0.0001);
        assert!(config.high_quality());
        assert_eq!(config.interval_secs(), 0);
        assert_eq!(config.provider(), ProviderKind::Mapbox);
        assert_eq!(config.confidence_threshold(), 0.5);
        assert_eq!(config.chunk_size(), 100);
        assert_eq!(config.chunk_overlap(), 3);
        assert_eq!(config.inter_chunk_delay(), Duration::from_millis(250));
        assert_eq!(config.mapbox_profile(), "mapbox/driving");
        assert!(config.mapbox_access_token().is_none());
        assert!(config.amap_key().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_explicit_path_falls_back_to_defaults() {
        let config = Config::load(Some("/nonexistent/trajmatch.toml"));
        assert_eq!(config.config_file(), "default");
        assert_eq!(config.chunk_size(), 100);
    }

    #[test]
    fn test_provider_from_str() {
        assert_eq!("mapbox".parse::<ProviderKind>().unwrap(), ProviderKind::Mapbox);
        assert_eq!("AMap".parse::<ProviderKind>().unwrap(), ProviderKind::Amap);
        assert!("google".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_credential_overrides() {
        let config = Config::default()
            .with_credential_overrides(Some("pk.test".to_string()), Some("  ".to_string()));
        assert_eq!(config.mapbox_access_token(), Some("pk.test"));
        // Blank values never override
        assert!(config.amap_key().is_none());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.confidence_threshold = 1.5;
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));

        let mut config = Config::default();
        config.chunk_overlap = 100;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.chunk_size = 1;
        config.chunk_overlap = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overlap_checked_against_provider_limit() {
        let mut config = Config::default().with_provider(ProviderKind::Mapbox);
        config.chunk_size = 500;
        config.chunk_overlap = 150;
        assert_eq!(config.effective_chunk_size(), 100);
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));

        config.chunk_overlap = 99;
        assert!(config.validate().is_ok());

        let mut config = config.with_provider(ProviderKind::Amap);
        config.chunk_overlap = 150;
        assert_eq!(config.effective_chunk_size(), 500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_match_params_drops_non_positive_radius() {
        let mut config = Config::default();
        config.radius = Some(0.0);
        assert_eq!(config.match_params().radius, None);
        config.radius = Some(25.0);
        assert_eq!(config.match_params().radius, Some(25.0));
    }
}

//! Error types for trajectory matching

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid or inconsistent configuration value
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Provider selected without its credential
    #[error("Missing credential for provider {provider}")]
    MissingCredential { provider: &'static str },

    /// Provider answered but the answer is unusable
    #[error("Provider {provider} failed: {message}")]
    Provider { provider: &'static str, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn provider(provider: &'static str, message: impl Into<String>) -> Self {
        Error::Provider { provider, message: message.into() }
    }

    /// True for errors raised before any I/O
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_) | Error::MissingCredential { .. })
    }
}

//! Error types for cfsync
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for cfsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for cfsync
#[derive(Error, Debug)]
pub enum Error {
    /// IP detection errors
    #[error("IP detection error: {0}")]
    IpDetection(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors (transport level, no response)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Rate limiting errors
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Resource not found at the provider
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The provider returned data that cannot be trusted (e.g. a record
    /// whose content is not an IP address of the expected family)
    #[error("Invalid data from provider: {0}")]
    InvalidRecord(String),

    /// No zone owns the domain
    #[error("No zone found for {0}")]
    ZoneNotFound(String),

    /// More than one zone claims the same name
    #[error("Found {count} zones named {zone_name}")]
    AmbiguousZone {
        /// The zone name that matched several zones
        zone_name: String,
        /// How many usable zones matched
        count: usize,
    },

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an IP detection error
    pub fn ip_detection(msg: impl Into<String>) -> Self {
        Self::IpDetection(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create an invalid provider data error
    pub fn invalid_record(msg: impl Into<String>) -> Self {
        Self::InvalidRecord(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Whether the error points at provider-side or account-configuration
    /// anomalies rather than a failed call
    pub fn is_data_integrity(&self) -> bool {
        matches!(self, Self::InvalidRecord(_) | Self::AmbiguousZone { .. })
    }
}

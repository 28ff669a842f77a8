use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Network error types
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NetworkError {
    /// Connection refused
    #[error("Connection refused")]
    ConnectionRefused,

    /// Connection reset
    #[error("Connection reset")]
    ConnectionReset,

    /// Connection timed out
    #[error("Connection timed out")]
    ConnectionTimeout,

    /// DNS resolution error
    #[error("DNS resolution error: {0}")]
    DnsError(String),

    /// SSL/TLS error
    #[error("SSL/TLS error: {0}")]
    SslError(String),

    /// Proxy error
    #[error("Proxy error: {0}")]
    ProxyError(String),

    /// Too many redirects
    #[error("Too many redirects")]
    TooManyRedirects,

    /// Request timeout
    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    /// Headless browser failure
    #[error("Browser error: {0}")]
    Browser(String),

    /// Other network error
    #[error("Network error: {0}")]
    Other(String),
}

impl NetworkError {
    /// Check if another attempt at the same request may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            NetworkError::ConnectionRefused => true,
            NetworkError::ConnectionReset => true,
            NetworkError::ConnectionTimeout => true,
            NetworkError::DnsError(_) => true,
            NetworkError::ProxyError(_) => true,
            NetworkError::Timeout(_) => true,
            NetworkError::Browser(_) => true,
            NetworkError::Other(_) => true,
            NetworkError::SslError(_) => false,
            NetworkError::TooManyRedirects => false,
        }
    }

    /// Whether the failure is attributable to the proxy in use
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            NetworkError::ConnectionRefused
                | NetworkError::ConnectionReset
                | NetworkError::ConnectionTimeout
                | NetworkError::ProxyError(_)
                | NetworkError::Timeout(_)
        )
    }
}

/// Error types for the harvest crawler
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// A URL could not be parsed or is not crawlable
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// The offending input
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// A fetch failed at the transport level
    #[error("Fetch error for {url}: {cause}")]
    Fetch {
        /// The URL being fetched
        url: String,
        /// The underlying network failure
        cause: NetworkError,
    },

    /// An extractor failed on a page
    #[error("Extraction error in '{extractor}' for {url}: {message}")]
    Extraction {
        /// Extractor name
        extractor: String,
        /// Page URL
        url: String,
        /// Error message
        message: String,
    },

    /// The frontier broke its at-most-once guarantee
    #[error("Frontier corruption: {0}")]
    FrontierCorruption(String),

    /// Error in middleware
    #[error("Middleware error: {0}")]
    Middleware(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serde error
    #[error("Serialization error: {0}")]
    SerdeError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a new invalid URL error
    pub fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Create a new fetch error
    pub fn fetch(url: impl Into<String>, cause: NetworkError) -> Self {
        Self::Fetch {
            url: url.into(),
            cause,
        }
    }

    /// Create a new extraction error
    pub fn extraction(
        extractor: impl Into<String>,
        url: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Extraction {
            extractor: extractor.into(),
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a new middleware error
    pub fn middleware(message: impl Into<String>) -> Self {
        Self::Middleware(message.into())
    }

    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a new generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Fetch { cause, .. } => cause.is_retryable(),
            _ => false,
        }
    }

    /// Check if this error must stop the crawl
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FrontierCorruption(_))
    }

    /// The network failure behind a fetch error, if any
    pub fn network_cause(&self) -> Option<&NetworkError> {
        match self {
            Self::Fetch { cause, .. } => Some(cause),
            _ => None,
        }
    }
}

/// Result type for harvest operations
pub type Result<T> = std::result::Result<T, Error>;

// Implement From for std::io::Error
impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::IoError(error.to_string())
    }
}

// Implement From for serde_json::Error
impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::SerdeError(error.to_string())
    }
}

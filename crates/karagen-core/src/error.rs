//! Error handling for the karagen library.
//!
//! This module defines the main error type `Error` used throughout the library,
//! along with a convenient `Result` type alias. It uses `thiserror` for easy
//! error handling and implements conversions from common error types.
//!
//! # Examples
//!
//! ```
//! use karagen_core::error::{Error, Result};
//!
//! fn might_fail() -> Result<()> {
//!     Err(Error::diff("no added endpoints section"))
//! }
//!
//! assert!(might_fail().is_err());
//! ```

use thiserror::Error;

/// Result type for karagen operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for karagen operations
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Prompt template error
    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    /// Transport-level HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// OpenAPI document error
    #[error("OpenAPI error: {0}")]
    OpenApi(String),

    /// Diff document error
    #[error("Diff error: {0}")]
    Diff(String),

    /// The completion provider answered with an error or an unusable body
    #[error("Provider error: {0}")]
    Provider(String),

    /// The completion provider answered with a non-success HTTP status
    #[error("Provider error: {message}")]
    Status { status: u16, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Required API credential is not set
    #[error("environment variable {0} is not set")]
    MissingCredential(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new OpenAPI error
    pub fn openapi<S: Into<String>>(msg: S) -> Self {
        Self::OpenApi(msg.into())
    }

    /// Create a new diff error
    pub fn diff<S: Into<String>>(msg: S) -> Self {
        Self::Diff(msg.into())
    }

    /// Create a new provider error
    pub fn provider<S: Into<String>>(msg: S) -> Self {
        Self::Provider(msg.into())
    }

    /// Whether repeating the request could succeed.
    /// Client errors other than 408 and 429 are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => !(400..500).contains(status) || matches!(status, 408 | 429),
            _ => true,
        }
    }
}

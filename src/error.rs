//! Unified error handling for the newsvault crate
//!
//! This module consolidates the domain-specific errors into a single `Error`
//! enum and classifies them along the pipeline's failure taxonomy:
//!
//! - transient network failures (feeds, scrapes, redirects, uploads)
//! - capture subprocess failures
//! - file system failures
//! - fatal configuration or catalog failures
//!
//! Nothing below the daily run loop treats an error as process-terminating;
//! [`ArchiverErrorTrait::is_recoverable`] only decides whether retrying inside
//! the current cycle is worthwhile.

use std::io;
use thiserror::Error;

pub use crate::utils::error::{CaptureError, CatalogError, FetchError, StateError, UploadError};

/// Common trait for all newsvault error types
pub trait ArchiverErrorTrait: std::error::Error {
    /// Check if this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Network-related errors (HTTP, timeout, remote store)
    Network,
    /// Parsing and data extraction errors
    Parsing,
    /// File system and state errors
    Storage,
    /// Capture engine subprocess errors
    Subprocess,
    /// Configuration and catalog errors
    Config,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Short lowercase label used in log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Parsing => "parsing",
            Self::Storage => "storage",
            Self::Subprocess => "subprocess",
            Self::Config => "config",
            Self::Other => "other",
        }
    }
}

/// Unified error type for the newsvault crate
#[derive(Error, Debug)]
pub enum Error {
    /// Fetch-specific errors
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Catalog loading errors
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Capture engine and relocation errors
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    /// Remote store errors
    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    /// Run-state persistence errors
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ArchiverErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_recoverable(),
            Self::Upload(e) => e.is_recoverable(),
            Self::Catalog(_) => false,
            Self::Capture(_) => false, // never retried within the same cycle
            Self::State(_) => false,
            Self::Io(_) => true,
            Self::Json(_) => false,
            Self::Http(_) => true,
            Self::Config(_) => false,
            Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Fetch(FetchError::Feed(_)) => ErrorCategory::Parsing,
            Self::Fetch(_) | Self::Upload(_) | Self::Http(_) => ErrorCategory::Network,
            Self::Catalog(_) | Self::Config(_) => ErrorCategory::Config,
            Self::Capture(CaptureError::Io { .. }) => ErrorCategory::Storage,
            Self::Capture(_) => ErrorCategory::Subprocess,
            Self::State(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Json(_) => ErrorCategory::Parsing,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

// Conversion from anyhow::Error
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: err.to_string(),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

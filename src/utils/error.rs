//! Error types for the newsvault pipeline
//!
//! This module defines the domain-specific error types used by discovery,
//! capture, upload and the catalog loader.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during HTTP fetching operations
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status code
    #[error("Server error: {0}")]
    ServerError(u16),

    /// Request timeout
    #[error("Request timeout")]
    Timeout,

    /// Maximum retry attempts exceeded
    #[error("Maximum retry attempts exceeded")]
    MaxRetriesExceeded,

    /// Feed body could not be parsed
    #[error("Feed parse error: {0}")]
    Feed(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Every fetch failure is transient from the pipeline's point of view;
    /// the next daily cycle retries naturally.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::InvalidUrl(_))
    }
}

/// Errors raised while loading or rewriting the outlet catalog
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Catalog file could not be read or written
    #[error("Catalog I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Catalog is not valid JSON
    #[error("Catalog JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Catalog JSON does not follow the region -> category -> [outlet] shape
    #[error("Malformed catalog: {0}")]
    Shape(String),
}

/// Errors raised by the capture dispatcher and artifact relocator
#[derive(Error, Debug)]
pub enum CaptureError {
    /// Scratch or collection file system operation failed
    #[error("Capture I/O error during '{operation}': {source}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// Capture engine process could not be started
    #[error("Failed to launch capture engine '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Capture engine exited unsuccessfully
    #[error("Capture engine exited with status {0}")]
    ExitStatus(String),

    /// Batch has no seeds to capture
    #[error("Batch '{0}' has no seed URLs")]
    EmptyBatch(String),
}

impl CaptureError {
    /// Wrap an I/O error with the operation that produced it
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }
}

/// Errors raised when talking to the remote archive store
#[derive(Error, Debug)]
pub enum UploadError {
    /// HTTP transport error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote store rejected the request
    #[error("Remote store returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// Local artifact could not be read
    #[error("Artifact I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Credentials are required for write operations
    #[error("Remote store credentials are not configured")]
    MissingCredentials,

    /// Remote listing could not be decoded
    #[error("Unexpected remote response: {0}")]
    Decode(String),
}

impl UploadError {
    /// Remote 4xx answers (other than throttling) will not heal by retrying
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Io { .. } | Self::MissingCredentials | Self::Decode(_) => false,
        }
    }
}

/// Errors raised by the run-state store
#[derive(Error, Debug)]
pub enum StateError {
    /// State file could not be read or written
    #[error("Run state I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// State file is corrupt
    #[error("Run state is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

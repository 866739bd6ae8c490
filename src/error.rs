//! Error types for tablepull
//!
//! This module provides error handling for the library, including:
//! - The crate-wide [`Error`] type and [`Result`] alias
//! - Per-request fetch failures with their fatality classification
//! - Structured context (page index, path, upstream reason)

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for tablepull operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for tablepull
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "base_url")
        key: Option<String>,
    },

    /// A page fetch failed
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// An output file could not be written
    #[error("failed to persist {path}: {reason}")]
    Persistence {
        /// The output path that could not be written
        path: PathBuf,
        /// The reason the write failed
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure of a single page request.
///
/// The retry budget is zero: every variant describes the outcome of exactly
/// one request attempt, already classified for the driver. Only
/// [`FetchError::Timeout`] is ambiguous — the others halt the run.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request exceeded its configured timeout.
    ///
    /// Ambiguous by design: the upstream may or may not hold more data, so
    /// the driver applies the configured timeout policy instead of treating
    /// this as fatal.
    #[error("page {page} request timed out")]
    Timeout {
        /// 1-based index of the page that timed out
        page: u32,
    },

    /// Connection-level failure (refused, DNS, TLS, reset)
    #[error("page {page} transport failure: {reason}")]
    Transport {
        /// 1-based index of the page that failed
        page: u32,
        /// The underlying transport error
        reason: String,
    },

    /// The server answered with a non-success status code
    #[error("page {page} returned HTTP status {status}")]
    Status {
        /// 1-based index of the page that failed
        page: u32,
        /// The HTTP status code received
        status: u16,
    },

    /// The body was not valid JSON, or no record array could be located
    /// under any recognized response shape
    #[error("page {page} malformed response: {reason}")]
    MalformedResponse {
        /// 1-based index of the page that failed
        page: u32,
        /// What made the response unusable
        reason: String,
    },
}

impl FetchError {
    /// Whether this failure halts the run.
    ///
    /// Timeouts are the one non-fatal case; the driver decides whether to
    /// continue past them.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, FetchError::Timeout { .. })
    }
}

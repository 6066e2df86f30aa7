//! Scanner Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// A scanner error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for scanner operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Location has no scheme or cannot be parsed (configuration error)
    #[display("malformed location: {_0}")]
    MalformedLocation(#[error(not(source))] String),
    /// Encoding the raw location did not produce a valid identifier
    #[display("failed to encode location: {_0}")]
    Encoding(#[error(not(source))] String),
    /// Directory being scanned does not exist
    #[display("not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// Access denied while listing
    #[display("permission denied: {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    /// Location resolves to something that can't be scanned (e.g. a file)
    #[display("invalid path: {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// Network-related error (unreachable endpoint, timeout, bad status)
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// Backend-specific error
    #[display("backend error: {_0}")]
    BackendError(#[error(not(source))] String),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    ///
    /// Configuration errors never will; everything a scan pass can hit
    /// (including a directory that is temporarily missing) might.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::MalformedLocation(_) | Self::Encoding(_))
    }
}

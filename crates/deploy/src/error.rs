//! Deploy Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Scanner errors raised while resolving
//! locations are kept as the child frame.

use derive_more::{Display, Error};

/// A deploy error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for worker and manager operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A configured location could not be parsed
    #[display("invalid location: {_0}")]
    InvalidLocation(#[error(not(source))] String),
    /// No registered backend accepts the location
    #[display("no scanner backend accepts location: {_0}")]
    UnsupportedLocation(#[error(not(source))] String),
    /// Polling interval must be greater than zero
    #[display("polling interval must be greater than zero")]
    InvalidInterval,
    /// Not called from within a Tokio runtime
    #[display("no Tokio runtime available to run scanner workers")]
    Runtime,
    /// Default deployment directory could not be created
    #[display("could not prepare the default deployment location")]
    DefaultLocation,
    /// Default scanner backends could not be constructed
    #[display("could not create the default scanner backends")]
    Backend,
    /// Start called on a manager that is already running
    #[display("scanner manager already started")]
    AlreadyStarted,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    ///
    /// Everything here is a configuration or lifecycle mistake, except
    /// environment failures (directory creation, HTTP client setup).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DefaultLocation | Self::Backend)
    }
}

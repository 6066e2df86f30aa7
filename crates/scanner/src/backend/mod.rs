//! Scanner backend trait and implementations.
//!
//! This module defines the `ScannerBackend` trait, which provides a unified
//! interface for enumerating deployment archives across different kinds of
//! location (local directories, HTTP index pages, etc.).

mod file;
mod http;
#[cfg(feature = "mock")]
mod mock;

pub use self::file::FileBackend;
pub use self::http::HttpBackend;
#[cfg(feature = "mock")]
pub use self::mock::MockBackend;
use crate::archive::{ArchiveEntry, ArchiveEvent, ScanState};
use crate::error::Result;
use crate::filter::NameFilter;
use crate::location::Location;
use async_trait::async_trait;
use std::time::Duration;

/// Unified interface for scanner backends.
///
/// A backend knows how to enumerate archives at one class of location. The
/// manager asks every configured backend, in registration order, whether it
/// [`accepts`](Self::accepts) a location; the first one that does is bound to
/// that location's worker.
///
/// Backends are shared between workers and must not keep per-location state;
/// the state of previous passes is passed in by the caller.
///
/// # Examples
///
/// ```no_run
/// use gantry_scanner::backend::{FileBackend, ScannerBackend};
/// use gantry_scanner::archive::ScanState;
/// use gantry_scanner::filter::SuffixFilter;
/// use gantry_scanner::location::Location;
/// # use gantry_scanner::error::Result;
///
/// # async fn example() -> Result<()> {
/// let backend = FileBackend::default();
/// let location = Location::parse("file:///opt/deploy", true)?;
/// assert!(backend.accepts(&location));
///
/// let (events, state) = backend.scan(&location, &SuffixFilter::default(), &ScanState::default()).await?;
/// for event in &events {
///     println!("{} {}", event.kind, event.entry.name);
/// }
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait ScannerBackend: Send + Sync {
    /// Name of the backend, used for logging only.
    fn name(&self) -> &str;

    /// Whether this backend can scan the location. Must be side-effect-free;
    /// usually a scheme check.
    fn accepts(&self, location: &Location) -> bool;

    /// Polling interval used when the location carries no frequency hint.
    fn default_interval(&self) -> Duration;

    /// Enumerate the archives currently at the location that pass `filter`.
    async fn list(&self, location: &Location, filter: &dyn NameFilter) -> Result<Vec<ArchiveEntry>>;

    /// Run one scan pass: list, then diff against `previous`.
    ///
    /// Default implementation of this method is to call
    /// [`list()`](Self::list) and hand the result to [`ScanState::diff`]. On
    /// error `previous` is untouched and the caller should keep it; the pass
    /// counts as having produced no events.
    async fn scan(
        &self,
        location: &Location,
        filter: &dyn NameFilter,
        previous: &ScanState,
    ) -> Result<(Vec<ArchiveEvent>, ScanState)> {
        let entries = self.list(location, filter).await?;
        Ok(previous.diff(entries))
    }
}

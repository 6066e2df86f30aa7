//! In-memory scanner backend for testing.

use crate::archive::{ArchiveEntry, Fingerprint};
use crate::error::{ErrorKind, Result};
use crate::filter::NameFilter;
use crate::location::Location;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::ScannerBackend;

/// In-memory scanner backend for testing.
///
/// Archives are kept in a map of name to revision behind a [`RwLock`]; bumping
/// a revision with [`put`](Self::put) changes the archive's fingerprint, so
/// the next pass reports it as updated. Listings can be made to fail on demand
/// with [`fail_next`](Self::fail_next).
///
/// # Examples
///
/// ```
/// use gantry_scanner::backend::{MockBackend, ScannerBackend};
/// use gantry_scanner::filter::SuffixFilter;
/// use gantry_scanner::location::Location;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_archives(["app.gar", "notes.txt"]);
/// let location = Location::parse("mock://host/apps/", true)?;
///
/// let entries = backend.list(&location, &SuffixFilter::default()).await?;
/// assert_eq!(entries.len(), 1);
/// assert_eq!(entries[0].name, "app.gar");
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    scheme: String,
    interval: Duration,
    delay: Option<Duration>,
    archives: RwLock<BTreeMap<String, u64>>,
    failures: AtomicUsize,
    passes: AtomicUsize,
}

impl MockBackend {
    /// Create a mock backend pre-populated with archives at revision 1.
    pub fn with_archives(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: "mock".to_string(),
            scheme: "mock".to_string(),
            interval: Duration::from_millis(50),
            delay: None,
            archives: RwLock::new(names.into_iter().map(|name| (name.into(), 1)).collect()),
            failures: AtomicUsize::new(0),
            passes: AtomicUsize::new(0),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Scheme this backend accepts. Defaults to `mock`.
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into().to_ascii_lowercase();
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sleep for `delay` at the start of every listing.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Add an archive, or bump its revision if it already exists.
    pub async fn put(&self, name: impl Into<String>) {
        *self.archives.write().await.entry(name.into()).or_insert(0) += 1;
    }

    pub async fn remove(&self, name: &str) {
        self.archives.write().await.remove(name);
    }

    /// Make the next `count` listings fail with a backend error.
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Number of listings attempted so far, failed ones included.
    pub fn pass_count(&self) -> usize {
        self.passes.load(Ordering::SeqCst)
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        let names: [&str; 0] = [];
        Self::with_archives(names)
    }
}

#[async_trait]
impl ScannerBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn accepts(&self, location: &Location) -> bool {
        location.scheme().eq_ignore_ascii_case(&self.scheme)
    }

    fn default_interval(&self) -> Duration {
        self.interval
    }

    async fn list(&self, location: &Location, filter: &dyn NameFilter) -> Result<Vec<ArchiveEntry>> {
        self.passes.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let failing = self.failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            exn::bail!(ErrorKind::BackendError(format!("{}: injected failure", self.name)));
        }

        let dir = location.url().path();
        let guard = self.archives.read().await;
        let mut entries = Vec::with_capacity(guard.len());
        for (name, revision) in guard.iter().filter(|(name, _)| filter.accept(dir, name)) {
            let locator = location
                .url()
                .join(name)
                .map_err(|e| ErrorKind::BackendError(format!("{name}: {e}")))?;
            let fingerprint = Fingerprint::File {
                size: *revision,
                modified: OffsetDateTime::UNIX_EPOCH + Duration::from_secs(*revision),
            };
            entries.push(ArchiveEntry::new(name.clone(), fingerprint, locator));
        }
        Ok(entries)
    }
}

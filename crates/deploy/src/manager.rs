//! Scanner manager: one worker per configured location.

use crate::error::{ErrorKind, Result};
use crate::listener::ListenerHandle;
use crate::tracker::FirstPassTracker;
use crate::worker::{ScannerWorker, WorkerStatus};
use exn::{OptionExt, ResultExt};
use gantry_scanner::BackendHandle;
use gantry_scanner::backend::{FileBackend, HttpBackend};
use gantry_scanner::filter::{FilterHandle, SuffixFilter};
use gantry_scanner::location::{Location, LocationEncoder, PercentEncoder, default_location, redact};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// Point-in-time view of one live worker.
#[derive(Debug, Clone)]
pub struct WorkerSnapshot {
    pub location: Arc<Location>,
    pub backend: String,
    pub interval: Duration,
    pub status: WorkerStatus,
    pub first_pass_done: bool,
}

#[derive(Default)]
struct Live {
    workers: Vec<ScannerWorker>,
    locations: Vec<Arc<Location>>,
}

/// Binds locations to backends and runs a [`ScannerWorker`] for each.
///
/// # Examples
///
/// ```no_run
/// use gantry_deploy::listener::TracingListener;
/// use gantry_deploy::manager::ScannerManager;
/// use std::sync::Arc;
///
/// # async fn example() -> gantry_deploy::error::Result<()> {
/// let manager = ScannerManager::new(Arc::new(TracingListener)).with_work_dir("/var/lib/gantry");
/// manager.start(&["file:///opt/deploy", "https://repo.example.com/apps/"], Vec::new(), true).await?;
/// manager.wait_first_pass_settled().await;
/// manager.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct ScannerManager {
    listener: ListenerHandle,
    filter: FilterHandle,
    work_dir: PathBuf,
    encoder: Option<Arc<dyn LocationEncoder>>,
    tracker: Arc<FirstPassTracker>,
    live: Mutex<Live>,
    worker_count: AtomicUsize,
}

impl ScannerManager {
    pub fn new(listener: ListenerHandle) -> Self {
        Self {
            listener,
            filter: Arc::new(SuffixFilter::default()),
            work_dir: PathBuf::from("."),
            encoder: None,
            tracker: Arc::new(FirstPassTracker::new()),
            live: Mutex::new(Live::default()),
            worker_count: AtomicUsize::new(0),
        }
    }

    /// Filter deciding which entries are archives. Defaults to `.gar` files.
    pub fn with_filter(mut self, filter: FilterHandle) -> Self {
        self.filter = filter;
        self
    }

    /// Directory under which the default location is created when no
    /// locations are configured.
    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    /// Encoder used when encoding is enabled. Defaults to [`PercentEncoder`].
    pub fn with_encoder(mut self, encoder: Arc<dyn LocationEncoder>) -> Self {
        self.encoder = Some(encoder);
        self
    }

    /// Resolve every location and start one worker per location.
    ///
    /// An empty `backends` list means file then HTTP. An empty `locations`
    /// list means a single `deployment/file` directory under the work dir.
    /// Nothing is started unless every location resolves; if a worker fails
    /// to start, those already started are stopped before the error returns.
    pub async fn start<S: AsRef<str>>(&self, locations: &[S], backends: Vec<BackendHandle>, encode: bool) -> Result<()> {
        let mut live = self.live.lock().await;
        if !live.workers.is_empty() {
            exn::bail!(ErrorKind::AlreadyStarted);
        }
        let backends = match backends.is_empty() {
            true => default_backends()?,
            false => backends,
        };

        let mut resolved: Vec<Arc<Location>> = Vec::with_capacity(locations.len().max(1));
        for raw in locations {
            let raw = raw.as_ref();
            let location = self
                .parse(raw, encode)
                .or_raise(|| ErrorKind::InvalidLocation(redact(raw)))?;
            if resolved.iter().any(|known| **known == location) {
                tracing::warn!(location = %location, "Ignoring duplicate deployment location");
                continue;
            }
            resolved.push(Arc::new(location));
        }
        if resolved.is_empty() {
            let location = default_location(&self.work_dir).or_raise(|| ErrorKind::DefaultLocation)?;
            tracing::info!(location = %location, "No deployment locations configured; using default");
            resolved.push(Arc::new(location));
        }

        let mut workers = Vec::with_capacity(resolved.len());
        for location in &resolved {
            let backend = resolve_backend(&backends, location)
                .ok_or_raise(|| ErrorKind::UnsupportedLocation(location.to_string()))?;
            let interval = location.frequency().resolve(backend.default_interval());
            tracing::debug!(
                location = %location,
                backend = backend.name(),
                interval_ms = interval.as_millis() as u64,
                encode,
                "Resolved deployment location"
            );
            workers.push(ScannerWorker::new(
                Arc::clone(location),
                Arc::clone(backend),
                interval,
                Arc::clone(&self.filter),
                Arc::clone(&self.listener),
                Arc::clone(&self.tracker),
            )?);
        }

        self.tracker.reset();
        if let Err(err) = workers.iter_mut().try_for_each(ScannerWorker::start) {
            for worker in &mut workers {
                worker.cancel();
            }
            for worker in &mut workers {
                worker.join().await;
            }
            return Err(err);
        }

        tracing::info!(workers = workers.len(), "Started deployment scanners");
        self.worker_count.store(workers.len(), Ordering::Release);
        live.workers = workers;
        live.locations = resolved;
        Ok(())
    }

    /// Cancel every worker, then wait for all of them. Calling this on a
    /// manager that is not running does nothing.
    pub async fn stop(&self) {
        let mut live = self.live.lock().await;
        if live.workers.is_empty() {
            return;
        }
        for worker in &mut live.workers {
            worker.cancel();
        }
        for worker in &mut live.workers {
            worker.join().await;
        }
        let stopped = live.workers.len();
        live.workers.clear();
        live.locations.clear();
        self.worker_count.store(0, Ordering::Release);
        tracing::info!(workers = stopped, "Stopped deployment scanners");
    }

    /// Whether `completed` first passes cover every live worker.
    pub fn is_first_pass_settled(&self, completed: usize) -> bool {
        completed >= self.worker_count()
    }

    /// Number of workers that have finished their first pass since the last
    /// [`start`](Self::start).
    pub fn first_pass_count(&self) -> usize {
        self.tracker.count()
    }

    /// Wait until every live worker has finished its first pass. Returns
    /// immediately when nothing is running.
    pub async fn wait_first_pass_settled(&self) {
        self.tracker.wait_for(self.worker_count()).await;
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count.load(Ordering::Acquire)
    }

    /// Resolved locations, in configuration order.
    pub async fn locations(&self) -> Vec<Arc<Location>> {
        self.live.lock().await.locations.clone()
    }

    pub async fn snapshot(&self) -> Vec<WorkerSnapshot> {
        self.live
            .lock()
            .await
            .workers
            .iter()
            .map(|worker| WorkerSnapshot {
                location: Arc::clone(worker.location()),
                backend: worker.backend_name().to_string(),
                interval: worker.interval(),
                status: worker.status(),
                first_pass_done: worker.is_first_pass_done(),
            })
            .collect()
    }

    fn parse(&self, raw: &str, encode: bool) -> gantry_scanner::error::Result<Location> {
        if !encode {
            return Location::parse_with(raw, None);
        }
        let encoder: &dyn LocationEncoder = match &self.encoder {
            Some(encoder) => encoder.as_ref(),
            None => &PercentEncoder,
        };
        Location::parse_with(raw, Some(encoder))
    }
}

/// First backend, in registration order, that accepts the location.
pub fn resolve_backend<'a>(backends: &'a [BackendHandle], location: &Location) -> Option<&'a BackendHandle> {
    backends.iter().find(|backend| backend.accepts(location))
}

/// File backend first, then HTTP.
pub fn default_backends() -> Result<Vec<BackendHandle>> {
    let http = HttpBackend::new("http").or_raise(|| ErrorKind::Backend)?;
    Ok(vec![Arc::new(FileBackend::default()), Arc::new(http)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::DeploymentListener;
    use gantry_scanner::archive::{ArchiveEvent, ArchiveEventKind};
    use gantry_scanner::backend::MockBackend;
    use rstest::rstest;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct Recorder {
        events: StdMutex<Vec<(ArchiveEventKind, String)>>,
    }
    impl Recorder {
        fn events(&self) -> Vec<(ArchiveEventKind, String)> {
            self.events.lock().unwrap().clone()
        }
    }
    impl DeploymentListener for Recorder {
        fn on_event(&self, _location: &Location, event: &ArchiveEvent) {
            self.events.lock().unwrap().push((event.kind, event.entry.name.clone()));
        }
    }

    fn handle(backend: &Arc<MockBackend>) -> BackendHandle {
        backend.clone()
    }

    fn mock(name: &str) -> Arc<MockBackend> {
        Arc::new(MockBackend::with_archives(["app.gar"]).with_name(name).with_interval(Duration::from_millis(20)))
    }

    async fn eventually(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_start_then_stop_leaves_no_workers() {
        let manager = ScannerManager::new(Arc::new(Recorder::default()));
        manager
            .start(&["mock://host/a/", "mock://host/b/"], vec![handle(&mock("mock"))], true)
            .await
            .unwrap();
        assert_eq!(manager.worker_count(), 2);
        assert_eq!(manager.locations().await.len(), 2);

        tokio::time::timeout(Duration::from_secs(5), manager.stop()).await.unwrap();
        assert_eq!(manager.worker_count(), 0);
        assert!(manager.locations().await.is_empty());
        assert!(manager.snapshot().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_twice_is_noop() {
        let manager = ScannerManager::new(Arc::new(Recorder::default()));
        manager.stop().await;
        manager.start(&["mock://host/a/"], vec![handle(&mock("mock"))], true).await.unwrap();
        manager.stop().await;
        manager.stop().await;
        assert_eq!(manager.worker_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unsupported_location_starts_nothing() {
        let backend = mock("mock");
        let manager = ScannerManager::new(Arc::new(Recorder::default()));
        let err = manager
            .start(&["mock://host/a/", "bogus://host/path"], vec![handle(&backend)], true)
            .await
            .unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnsupportedLocation(loc) if loc == "bogus://host/path"));
        assert_eq!(manager.worker_count(), 0);
        assert!(manager.locations().await.is_empty());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(backend.pass_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_location() {
        let manager = ScannerManager::new(Arc::new(Recorder::default()));
        let err = manager.start(&["no-scheme-here"], vec![handle(&mock("mock"))], true).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidLocation(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_earliest_registered_backend_wins() {
        let manager = ScannerManager::new(Arc::new(Recorder::default()));
        manager
            .start(&["mock://host/a/"], vec![handle(&mock("first")), handle(&mock("second"))], true)
            .await
            .unwrap();
        let snapshot = manager.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].backend, "first");
        manager.stop().await;
    }

    #[rstest]
    #[case("mock://;freq=5000@host/a/", Duration::from_millis(5000))]
    #[case("mock://;freq=notanumber@host/a/", Duration::from_millis(20))]
    #[case("mock://;freq=0@host/a/", Duration::from_millis(20))]
    #[case("mock://host/a/", Duration::from_millis(20))]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_interval_from_frequency_hint(#[case] raw: &str, #[case] expected: Duration) {
        let manager = ScannerManager::new(Arc::new(Recorder::default()));
        manager.start(&[raw], vec![handle(&mock("mock"))], true).await.unwrap();
        assert_eq!(manager.snapshot().await[0].interval, expected);
        manager.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_duplicate_locations_are_dropped() {
        let manager = ScannerManager::new(Arc::new(Recorder::default()));
        manager
            .start(&["mock://host/a/", "mock://;freq=100@host/a/"], vec![handle(&mock("mock"))], true)
            .await
            .unwrap();
        assert_eq!(manager.worker_count(), 1);
        manager.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_already_started() {
        let manager = ScannerManager::new(Arc::new(Recorder::default()));
        manager.start(&["mock://host/a/"], vec![handle(&mock("mock"))], true).await.unwrap();
        let err = manager.start(&["mock://host/b/"], vec![handle(&mock("mock"))], true).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::AlreadyStarted));
        assert_eq!(manager.worker_count(), 1);
        manager.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_wait_first_pass_settled() {
        let slow = Arc::new(
            MockBackend::with_archives(["app.gar"])
                .with_delay(Duration::from_millis(50))
                .with_interval(Duration::from_millis(20)),
        );
        let manager = ScannerManager::new(Arc::new(Recorder::default()));
        manager
            .start(&["mock://host/a/", "mock://host/b/", "mock://host/c/"], vec![handle(&slow)], true)
            .await
            .unwrap();
        assert!(!manager.is_first_pass_settled(2));
        assert!(manager.is_first_pass_settled(3));

        tokio::time::timeout(Duration::from_secs(5), manager.wait_first_pass_settled()).await.unwrap();
        assert!(manager.first_pass_count() >= 3);
        assert!(manager.snapshot().await.iter().all(|worker| worker.first_pass_done));
        manager.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failing_backend_keeps_worker_running() {
        let backend = mock("mock");
        backend.fail_next(3);
        let recorder = Arc::new(Recorder::default());
        let manager = ScannerManager::new(recorder.clone());
        manager.start(&["mock://host/a/"], vec![handle(&backend)], true).await.unwrap();
        manager.wait_first_pass_settled().await;

        eventually(|| !recorder.events().is_empty()).await;
        assert_eq!(recorder.events(), [(ArchiveEventKind::Found, "app.gar".to_string())]);
        assert_eq!(manager.snapshot().await[0].status, WorkerStatus::Running);
        manager.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_filesystem_found_then_removed() {
        let dir = tempfile::tempdir().unwrap();
        let location = Location::from_directory(dir.path()).unwrap().to_string();
        let recorder = Arc::new(Recorder::default());
        let manager = ScannerManager::new(recorder.clone());
        let backend: BackendHandle = Arc::new(FileBackend::default().with_interval(Duration::from_millis(20)));
        manager.start(&[location], vec![backend], false).await.unwrap();
        manager.wait_first_pass_settled().await;
        assert!(recorder.events().is_empty());

        let archive = dir.path().join("app.gar");
        tokio::fs::write(&archive, b"payload").await.unwrap();
        eventually(|| recorder.events().len() == 1).await;
        tokio::fs::remove_file(&archive).await.unwrap();
        eventually(|| recorder.events().len() == 2).await;
        manager.stop().await;

        assert_eq!(
            recorder.events(),
            [
                (ArchiveEventKind::Found, "app.gar".to_string()),
                (ArchiveEventKind::Removed, "app.gar".to_string()),
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_empty_locations_use_default_directory() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ScannerManager::new(Arc::new(Recorder::default())).with_work_dir(dir.path());
        manager.start::<&str>(&[], Vec::new(), true).await.unwrap();

        let locations = manager.locations().await;
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].scheme(), "file");
        let path = locations[0].to_file_path().unwrap();
        assert!(path.ends_with("deployment/file"));
        assert!(path.is_dir());
        assert_eq!(manager.snapshot().await[0].backend, "file");
        manager.stop().await;
    }

    #[test]
    fn test_resolve_backend() {
        let backends: Vec<BackendHandle> = default_backends().unwrap();
        let file = Location::parse("file:///opt/deploy", true).unwrap();
        let http = Location::parse("https://example.com/apps/", true).unwrap();
        let bogus = Location::parse("bogus://host/path", true).unwrap();
        assert_eq!(resolve_backend(&backends, &file).unwrap().name(), "file");
        assert_eq!(resolve_backend(&backends, &http).unwrap().name(), "http");
        assert!(resolve_backend(&backends, &bogus).is_none());
    }
}

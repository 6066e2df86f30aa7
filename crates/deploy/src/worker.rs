//! Polling worker bound to a single location.

use crate::error::{ErrorKind, Result};
use crate::listener::ListenerHandle;
use crate::tracker::FirstPassTracker;
use derive_more::Display;
use gantry_scanner::BackendHandle;
use gantry_scanner::archive::ScanState;
use gantry_scanner::filter::FilterHandle;
use gantry_scanner::location::Location;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    #[display("created")]
    Created,
    #[display("running")]
    Running,
    #[display("stopping")]
    Stopping,
    #[display("stopped")]
    Stopped,
}

/// Periodically scans one location and forwards the changes to a listener.
///
/// Status only moves forward: `Created → Running → Stopping → Stopped`. A
/// worker that was never started goes straight from `Created` to `Stopped`
/// when joined.
pub struct ScannerWorker {
    location: Arc<Location>,
    backend: BackendHandle,
    interval: Duration,
    filter: FilterHandle,
    listener: ListenerHandle,
    tracker: Arc<FirstPassTracker>,
    first_pass_done: Arc<AtomicBool>,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
    status: WorkerStatus,
}

impl ScannerWorker {
    pub fn new(
        location: Arc<Location>,
        backend: BackendHandle,
        interval: Duration,
        filter: FilterHandle,
        listener: ListenerHandle,
        tracker: Arc<FirstPassTracker>,
    ) -> Result<Self> {
        if interval.is_zero() {
            exn::bail!(ErrorKind::InvalidInterval);
        }
        Ok(Self {
            location,
            backend,
            interval,
            filter,
            listener,
            tracker,
            first_pass_done: Arc::new(AtomicBool::new(false)),
            token: CancellationToken::new(),
            handle: None,
            status: WorkerStatus::Created,
        })
    }

    /// Spawn the polling task on the current Tokio runtime. The first pass
    /// runs immediately. Starting a worker that is not `Created` does nothing.
    pub fn start(&mut self) -> Result<()> {
        if self.status != WorkerStatus::Created {
            return Ok(());
        }
        let runtime = Handle::try_current().map_err(|_| ErrorKind::Runtime)?;
        let task = PollTask {
            location: Arc::clone(&self.location),
            backend: Arc::clone(&self.backend),
            interval: self.interval,
            filter: Arc::clone(&self.filter),
            listener: Arc::clone(&self.listener),
            tracker: Arc::clone(&self.tracker),
            first_pass_done: Arc::clone(&self.first_pass_done),
            token: self.token.clone(),
        };
        self.handle = Some(runtime.spawn(task.run()));
        self.status = WorkerStatus::Running;
        tracing::debug!(
            location = %self.location,
            backend = self.backend.name(),
            interval_ms = self.interval.as_millis() as u64,
            "scanner worker started"
        );
        Ok(())
    }

    /// Ask the polling task to stop. A pass already in flight is allowed to
    /// finish; no new pass starts afterwards.
    pub fn cancel(&mut self) {
        self.token.cancel();
        if self.status == WorkerStatus::Running {
            self.status = WorkerStatus::Stopping;
        }
    }

    /// Cancel (if not already) and wait for the polling task to exit.
    pub async fn join(&mut self) {
        self.cancel();
        if let Some(handle) = self.handle.take()
            && let Err(err) = handle.await
        {
            tracing::error!(location = %self.location, error = %err, "scanner worker task failed");
        }
        self.status = WorkerStatus::Stopped;
    }

    pub fn status(&self) -> WorkerStatus {
        self.status
    }

    pub fn is_first_pass_done(&self) -> bool {
        self.first_pass_done.load(Ordering::Acquire)
    }

    pub fn location(&self) -> &Arc<Location> {
        &self.location
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}
impl Drop for ScannerWorker {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Everything the spawned task needs; owns the scan state between passes.
struct PollTask {
    location: Arc<Location>,
    backend: BackendHandle,
    interval: Duration,
    filter: FilterHandle,
    listener: ListenerHandle,
    tracker: Arc<FirstPassTracker>,
    first_pass_done: Arc<AtomicBool>,
    token: CancellationToken,
}

impl PollTask {
    async fn run(self) {
        let mut state = ScanState::default();
        loop {
            match self.backend.scan(&self.location, self.filter.as_ref(), &state).await {
                Ok((events, next)) => {
                    for event in &events {
                        self.listener.on_event(&self.location, event);
                    }
                    state = next;
                },
                Err(err) => {
                    // Previous state is kept so nothing is reported as removed.
                    tracing::warn!(
                        location = %self.location,
                        backend = self.backend.name(),
                        retryable = err.is_retryable(),
                        error = ?err,
                        "scan pass failed"
                    );
                },
            }
            if !self.first_pass_done.swap(true, Ordering::AcqRel) {
                self.tracker.complete();
                self.listener.on_first_pass(&self.location);
            }
            tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {},
            }
        }
        tracing::debug!(location = %self.location, "scanner worker stopped");
    }
}

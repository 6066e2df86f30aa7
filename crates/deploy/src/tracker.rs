use tokio::sync::watch;

/// Counts workers that have finished their first scan pass.
///
/// Shared by a manager and all of its workers. Waiters are woken on every
/// completion and re-check their own threshold.
#[derive(Debug)]
pub struct FirstPassTracker {
    completed: watch::Sender<usize>,
}

impl FirstPassTracker {
    pub fn new() -> Self {
        let (completed, _) = watch::channel(0);
        Self { completed }
    }

    /// Record one more worker whose first pass is done.
    pub fn complete(&self) {
        self.completed.send_modify(|count| *count += 1);
    }

    pub fn count(&self) -> usize {
        *self.completed.borrow()
    }

    pub fn reset(&self) {
        self.completed.send_replace(0);
    }

    /// Wait until at least `expected` completions have been recorded.
    pub async fn wait_for(&self, expected: usize) {
        let mut receiver = self.completed.subscribe();
        // The sender lives in `self`, so the channel cannot close while waiting.
        let _ = receiver.wait_for(|count| *count >= expected).await;
    }
}
impl Default for FirstPassTracker {
    fn default() -> Self {
        Self::new()
    }
}

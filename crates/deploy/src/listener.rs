//! Downstream notification of scan results.

use gantry_scanner::archive::ArchiveEvent;
use gantry_scanner::location::Location;
use std::sync::Arc;

pub type ListenerHandle = Arc<dyn DeploymentListener>;

/// Receives archive events from every worker.
///
/// Calls for one location arrive in pass order, each pass's events in the
/// order the backend produced them. There is no ordering across locations and
/// calls may come from any runtime thread, so implementations must not block
/// for long.
pub trait DeploymentListener: Send + Sync {
    fn on_event(&self, location: &Location, event: &ArchiveEvent);

    /// Called once per location, after its first pass (successful or not).
    fn on_first_pass(&self, _location: &Location) {}
}

/// Listener that only logs what it sees.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingListener;

impl DeploymentListener for TracingListener {
    fn on_event(&self, location: &Location, event: &ArchiveEvent) {
        tracing::info!(
            location = %location,
            archive = %event.entry.name,
            locator = %event.entry.locator,
            "archive {}",
            event.kind
        );
    }

    fn on_first_pass(&self, location: &Location) {
        tracing::debug!(location = %location, "first scan pass finished");
    }
}

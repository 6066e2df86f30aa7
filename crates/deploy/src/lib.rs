//! Runs deployment scanners.
//!
//! A [`ScannerManager`] resolves each configured location to a backend and
//! owns one [`ScannerWorker`] per location. Workers poll their backend and
//! report archive changes to a [`DeploymentListener`].

pub mod error;
pub mod listener;
pub mod manager;
mod tracker;
pub mod worker;

pub use crate::listener::{DeploymentListener, ListenerHandle, TracingListener};
pub use crate::manager::ScannerManager;
pub use crate::tracker::FirstPassTracker;
pub use crate::worker::{ScannerWorker, WorkerStatus};

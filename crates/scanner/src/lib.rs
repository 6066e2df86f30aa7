//! Deployment locations and the backends that scan them for archives.
//!
//! A [`Location`](location::Location) is parsed from user configuration, bound
//! to the first [`ScannerBackend`] that accepts it, and polled pass by pass;
//! each pass is diffed against the previous one into
//! [`ArchiveEvent`](archive::ArchiveEvent)s.

pub mod archive;
pub mod backend;
pub mod error;
pub mod filter;
pub mod location;

pub use crate::backend::ScannerBackend;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn ScannerBackend + Send + Sync>;

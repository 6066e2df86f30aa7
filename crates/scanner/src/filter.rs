//! Archive name filters.

use std::sync::Arc;

/// Archive suffix used when none is configured.
pub const DEFAULT_ARCHIVE_SUFFIX: &str = ".gar";

pub type FilterHandle = Arc<dyn NameFilter>;

/// Decides which directory entries (or links) count as deployment archives.
///
/// `dir` is the containing directory (or URL path) and `name` the entry's
/// final path segment.
pub trait NameFilter: Send + Sync {
    fn accept(&self, dir: &str, name: &str) -> bool;
}

impl<F> NameFilter for F
where
    F: Fn(&str, &str) -> bool + Send + Sync,
{
    fn accept(&self, dir: &str, name: &str) -> bool {
        self(dir, name)
    }
}

/// Case-insensitive suffix match, e.g. `.gar` matches `App.GAR`.
#[derive(Debug, Clone)]
pub struct SuffixFilter {
    suffix: String,
}
impl SuffixFilter {
    pub fn new(suffix: impl AsRef<str>) -> Self {
        Self {
            suffix: suffix.as_ref().to_lowercase(),
        }
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }
}
impl Default for SuffixFilter {
    fn default() -> Self {
        Self::new(DEFAULT_ARCHIVE_SUFFIX)
    }
}

impl NameFilter for SuffixFilter {
    fn accept(&self, _dir: &str, name: &str) -> bool {
        name.to_lowercase().ends_with(&self.suffix)
    }
}

//! Local filesystem scanner backend.
//!
//! Walks a directory tree via `tokio::fs`. Regular files accepted by the name
//! filter are archives; so are accepted *directories*, which are treated as
//! exploded archives and fingerprinted as a whole rather than descended into.

use crate::archive::{ArchiveEntry, Fingerprint};
use crate::backend::ScannerBackend;
use crate::error::{ErrorKind, Result};
use crate::filter::NameFilter;
use crate::location::Location;
use async_trait::async_trait;
use std::fs::Metadata;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::fs::{self, DirEntry};
use url::Url;

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(5_000);

enum WalkEntry {
    Archive(ArchiveEntry),
    Descend(PathBuf),
    Skip,
}

/// Local filesystem scanner backend.
///
/// Accepts `file:` locations pointing at a directory. Archive names are
/// paths relative to that directory, `/`-separated; fingerprints are size
/// plus modification time.
///
/// # Examples
///
/// ```
/// use gantry_scanner::backend::{FileBackend, ScannerBackend};
/// use std::time::Duration;
///
/// let backend = FileBackend::default().with_interval(Duration::from_secs(1));
/// assert_eq!(backend.default_interval(), Duration::from_secs(1));
/// ```
#[derive(Clone, Debug)]
pub struct FileBackend {
    name: String,
    interval: Duration,
}
impl FileBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            interval: DEFAULT_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }

    fn modified(metadata: &Metadata) -> Result<OffsetDateTime> {
        Ok(metadata.modified().map_err(ErrorKind::Io)?.into())
    }

    /// `/`-separated path of `path` relative to the scanned root.
    fn entry_name(root: &Path, path: &Path) -> String {
        path.strip_prefix(root)
            .unwrap_or(path)
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Total size and newest modification time of everything below `dir`
    /// (including `dir` itself, so deletions inside it are noticed).
    async fn exploded_fingerprint(dir: &Path, metadata: &Metadata) -> Result<Fingerprint> {
        let (size, modified) = Self::tree_totals(dir, vec![dir.to_path_buf()], Self::modified(metadata)?).await?;
        Ok(Fingerprint::File { size, modified })
    }

    /// Walk `pending` below `root`, summing file sizes and keeping the newest
    /// modification time. Anything under `root` that vanishes mid-walk (an
    /// archive being redeployed) is skipped; `root` itself must exist.
    async fn tree_totals(
        root: &Path,
        mut pending: Vec<PathBuf>,
        mut modified: OffsetDateTime,
    ) -> Result<(u64, OffsetDateTime)> {
        let mut size = 0;
        while let Some(current) = pending.pop() {
            let mut entries = match fs::read_dir(&current).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound && current != root => continue,
                Err(err) => exn::bail!(Self::map_io_error(err, &current)),
            };
            while let Some(entry) = entries.next_entry().await.map_err(|e| Self::map_io_error(e, &current))? {
                let path = entry.path();
                let metadata = match entry.metadata().await {
                    Ok(metadata) => metadata,
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(err) => exn::bail!(Self::map_io_error(err, &path)),
                };
                modified = modified.max(Self::modified(&metadata)?);
                if metadata.is_dir() {
                    pending.push(path);
                } else {
                    size += metadata.len();
                }
            }
        }
        Ok((size, modified))
    }

    async fn process_entry(&self, root: &Path, entry: DirEntry, filter: &dyn NameFilter) -> Result<WalkEntry> {
        let path = entry.path();
        let file_type = entry.file_type().await.map_err(|e| Self::map_io_error(e, &path))?;
        let metadata = match file_type.is_symlink() {
            // Links to files count, but are never descended through.
            true => match fs::metadata(&path).await {
                Ok(metadata) if metadata.is_file() => metadata,
                _ => return Ok(WalkEntry::Skip),
            },
            false => entry.metadata().await.map_err(|e| Self::map_io_error(e, &path))?,
        };
        let dir = path.parent().map(|p| p.to_string_lossy().into_owned()).unwrap_or_default();
        let accepted = filter.accept(&dir, &entry.file_name().to_string_lossy());
        let name = Self::entry_name(root, &path);
        if metadata.is_dir() {
            if !accepted {
                return Ok(WalkEntry::Descend(path));
            }
            let fingerprint = Self::exploded_fingerprint(&path, &metadata).await?;
            let locator = Url::from_directory_path(&path).map_err(|()| ErrorKind::InvalidPath(path.clone()))?;
            return Ok(WalkEntry::Archive(ArchiveEntry::new(name, fingerprint, locator)));
        }
        if metadata.is_file() && accepted {
            let fingerprint = Fingerprint::File {
                size: metadata.len(),
                modified: Self::modified(&metadata)?,
            };
            let locator = Url::from_file_path(&path).map_err(|()| ErrorKind::InvalidPath(path.clone()))?;
            return Ok(WalkEntry::Archive(ArchiveEntry::new(name, fingerprint, locator)));
        }
        Ok(WalkEntry::Skip)
    }
}
impl Default for FileBackend {
    fn default() -> Self {
        Self::new("file")
    }
}

#[async_trait]
impl ScannerBackend for FileBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn accepts(&self, location: &Location) -> bool {
        location.scheme().eq_ignore_ascii_case("file")
    }

    fn default_interval(&self) -> Duration {
        self.interval
    }

    // Anything vanishing mid-walk is skipped; every other failure fails the
    // whole pass. Skipping an unreadable entry would report it as removed.
    async fn list(&self, location: &Location, filter: &dyn NameFilter) -> Result<Vec<ArchiveEntry>> {
        let root = location.to_file_path()?;
        let metadata = fs::metadata(&root).await.map_err(|e| Self::map_io_error(e, &root))?;
        if !metadata.is_dir() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }

        let mut archives = Vec::new();
        let mut stack = vec![root.clone()];
        'dirs: while let Some(current) = stack.pop() {
            let mut entries = match fs::read_dir(&current).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound && current != root => continue 'dirs,
                Err(err) => exn::bail!(Self::map_io_error(err, &current)),
            };
            'entries: loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break 'entries,
                    Err(err) => exn::bail!(Self::map_io_error(err, &current)),
                };
                match self.process_entry(&root, entry, filter).await {
                    Ok(WalkEntry::Archive(archive)) => archives.push(archive),
                    Ok(WalkEntry::Descend(dir)) => stack.push(dir),
                    Ok(WalkEntry::Skip) => {},
                    Err(err) if matches!(&*err, ErrorKind::NotFound(_)) => {},
                    Err(err) => return Err(err),
                }
            }
        }
        archives.sort_by(|a, b| a.name.cmp(&b.name));
        tracing::trace!(backend = self.name(), location = %location, archives = archives.len(), "Listed directory");
        Ok(archives)
    }
}

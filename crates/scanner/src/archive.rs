//! Archive models.
//!
//! These types describe what a backend saw during one scan pass and how it
//! differs from the pass before.

use derive_more::Display;
use std::collections::BTreeMap;
use time::OffsetDateTime;
use url::Url;

/// Change-detection metadata for one archive.
///
/// Two entries with the same name are "unchanged" exactly when their
/// fingerprints compare equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fingerprint {
    /// Local file or exploded archive directory.
    File { size: u64, modified: OffsetDateTime },
    /// Remote archive, described by its response headers.
    Http {
        etag: Option<String>,
        last_modified: Option<String>,
        length: Option<u64>,
    },
}

/// One archive discovered during a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Archive identity, unique within one location
    pub name: String,
    pub fingerprint: Fingerprint,
    /// Where the payload can be fetched from
    pub locator: Url,
}
impl ArchiveEntry {
    pub fn new(name: impl Into<String>, fingerprint: Fingerprint, locator: Url) -> Self {
        Self {
            name: name.into(),
            fingerprint,
            locator,
        }
    }
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveEventKind {
    #[display("found")]
    Found,
    #[display("updated")]
    Updated,
    #[display("removed")]
    Removed,
}

/// Notification about a single archive produced by a scan pass.
///
/// For [`Removed`](ArchiveEventKind::Removed) events the entry is the last one
/// seen before the archive disappeared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEvent {
    pub kind: ArchiveEventKind,
    pub entry: ArchiveEntry,
}
impl ArchiveEvent {
    pub fn found(entry: ArchiveEntry) -> Self {
        Self { kind: ArchiveEventKind::Found, entry }
    }

    pub fn updated(entry: ArchiveEntry) -> Self {
        Self { kind: ArchiveEventKind::Updated, entry }
    }

    pub fn removed(entry: ArchiveEntry) -> Self {
        Self { kind: ArchiveEventKind::Removed, entry }
    }
}

/// Archives known after a scan pass, keyed by name.
///
/// Owned by exactly one worker; never shared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanState {
    entries: BTreeMap<String, ArchiveEntry>,
}

impl ScanState {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ArchiveEntry> {
        self.entries.get(name)
    }

    pub fn entries(&self) -> impl Iterator<Item = &ArchiveEntry> {
        self.entries.values()
    }

    /// Compare a fresh listing against this state.
    ///
    /// Returns the events (in name order: additions and updates first, then
    /// removals) together with the state for the next pass. `self` is left
    /// untouched, so a caller can simply keep it when a listing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use gantry_scanner::archive::{ArchiveEntry, ArchiveEventKind, Fingerprint, ScanState};
    /// use url::Url;
    ///
    /// let fingerprint = Fingerprint::Http { etag: Some("\"v1\"".into()), last_modified: None, length: None };
    /// let locator = Url::parse("http://example.com/app.gar").unwrap();
    /// let entry = ArchiveEntry::new("app.gar", fingerprint, locator);
    ///
    /// let (events, state) = ScanState::default().diff([entry.clone()]);
    /// assert_eq!(events[0].kind, ArchiveEventKind::Found);
    /// let (events, _) = state.diff([entry]);
    /// assert!(events.is_empty());
    /// ```
    pub fn diff(&self, entries: impl IntoIterator<Item = ArchiveEntry>) -> (Vec<ArchiveEvent>, ScanState) {
        let current: BTreeMap<String, ArchiveEntry> =
            entries.into_iter().map(|entry| (entry.name.clone(), entry)).collect();
        let mut events = Vec::new();
        for (name, entry) in &current {
            match self.entries.get(name) {
                None => events.push(ArchiveEvent::found(entry.clone())),
                Some(previous) if previous.fingerprint != entry.fingerprint => {
                    events.push(ArchiveEvent::updated(entry.clone()))
                },
                Some(_) => {},
            }
        }
        events.extend(
            self.entries
                .iter()
                .filter(|(name, _)| !current.contains_key(*name))
                .map(|(_, previous)| ArchiveEvent::removed(previous.clone())),
        );
        (events, ScanState { entries: current })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, size: u64) -> ArchiveEntry {
        let fingerprint = Fingerprint::File {
            size,
            modified: OffsetDateTime::UNIX_EPOCH,
        };
        let locator = Url::parse("file:///deploy/").unwrap().join(name).unwrap();
        ArchiveEntry::new(name, fingerprint, locator)
    }

    fn kinds(events: &[ArchiveEvent]) -> Vec<(ArchiveEventKind, &str)> {
        events.iter().map(|e| (e.kind, e.entry.name.as_str())).collect()
    }

    #[test]
    fn test_first_pass_finds_everything() {
        let (events, state) = ScanState::default().diff([entry("b.gar", 1), entry("a.gar", 1)]);
        assert_eq!(kinds(&events), [(ArchiveEventKind::Found, "a.gar"), (ArchiveEventKind::Found, "b.gar")]);
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn test_unchanged_listing_is_quiet() {
        let (_, state) = ScanState::default().diff([entry("a.gar", 1), entry("b.gar", 2)]);
        let (events, next) = state.diff([entry("a.gar", 1), entry("b.gar", 2)]);
        assert!(events.is_empty());
        assert_eq!(next, state);
    }

    #[test]
    fn test_classifies_updates_and_removals() {
        let (_, state) = ScanState::default().diff([entry("a.gar", 1), entry("b.gar", 2), entry("c.gar", 3)]);
        let (events, next) = state.diff([entry("a.gar", 1), entry("b.gar", 20), entry("d.gar", 4)]);
        assert_eq!(
            kinds(&events),
            [
                (ArchiveEventKind::Updated, "b.gar"),
                (ArchiveEventKind::Found, "d.gar"),
                (ArchiveEventKind::Removed, "c.gar"),
            ]
        );
        assert!(next.get("c.gar").is_none());
        assert_eq!(next.len(), 3);
    }

    #[test]
    fn test_removed_event_carries_last_known_entry() {
        let (_, state) = ScanState::default().diff([entry("a.gar", 7)]);
        let (events, next) = state.diff([]);
        assert_eq!(events, [ArchiveEvent::removed(entry("a.gar", 7))]);
        assert!(next.is_empty());
    }

    #[test]
    fn test_diff_does_not_modify_previous_state() {
        let (_, state) = ScanState::default().diff([entry("a.gar", 1)]);
        let snapshot = state.clone();
        let _ = state.diff([entry("b.gar", 1)]);
        assert_eq!(state, snapshot);
    }
}

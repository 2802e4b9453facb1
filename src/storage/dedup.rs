//! Dedup index for one harvest run

use std::collections::HashSet;

/// How a record's URL relates to what is already known
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// First sighting for this query
    New,
    /// Persisted for this query by an earlier run
    KnownFromStore,
    /// Already admitted earlier in this run
    DuplicateInRun,
}

/// URLs already persisted for a query plus those seen in the current run
///
/// Loaded once per run. A record is persisted only when its admission is
/// not `DuplicateInRun`; only `New` records count as unique.
#[derive(Debug, Clone, Default)]
pub struct DedupIndex {
    stored: HashSet<String>,
    seen: HashSet<String>,
}

impl DedupIndex {
    pub fn new(stored: HashSet<String>) -> Self {
        Self {
            stored,
            seen: HashSet::new(),
        }
    }

    /// Classifies the URL and marks it as seen
    pub fn admit(&mut self, url: &str) -> Admission {
        if !self.seen.insert(url.to_string()) {
            Admission::DuplicateInRun
        } else if self.stored.contains(url) {
            Admission::KnownFromStore
        } else {
            Admission::New
        }
    }

    pub fn stored_len(&self) -> usize {
        self.stored.len()
    }

    pub fn seen_len(&self) -> usize {
        self.seen.len()
    }
}

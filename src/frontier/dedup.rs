use crate::url::Fingerprint;
use std::collections::HashSet;

/// Set of resolved task fingerprints
///
/// A fingerprint lands here once its task is fetched, redirected, abandoned or failed.
/// Rediscovering it is then a no-op.
#[derive(Debug, Default, Clone)]
pub struct DedupIndex {
    seen: HashSet<Fingerprint>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, fp: &Fingerprint) -> bool {
        self.seen.contains(fp)
    }

    /// Records a fingerprint, returning false if it was already present
    pub fn mark_seen(&mut self, fp: Fingerprint) -> bool {
        self.seen.insert(fp)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Sorted copy of every fingerprint, for checkpoints
    pub fn snapshot(&self) -> Vec<Fingerprint> {
        let mut all: Vec<Fingerprint> = self.seen.iter().cloned().collect();
        all.sort();
        all
    }

    pub fn restore(fingerprints: impl IntoIterator<Item = Fingerprint>) -> Self {
        Self {
            seen: fingerprints.into_iter().collect(),
        }
    }
}

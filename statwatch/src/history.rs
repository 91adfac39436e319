//! Bounded per-cache history series.

use std::collections::btree_map;
use std::collections::{BTreeMap, VecDeque};
use std::num::NonZeroUsize;

use statwatch_types::CacheName;

/// Maximum number of entries a cache's history may hold. Always at least one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HistoryLimit(NonZeroUsize);

impl HistoryLimit {
    /// The smallest limit; used when a configured count is below one.
    pub const MIN: HistoryLimit = HistoryLimit(NonZeroUsize::MIN);

    /// A limit from a configured history count, or `None` if it is below one.
    pub fn new(count: i64) -> Option<Self> {
        usize::try_from(count)
            .ok()
            .and_then(NonZeroUsize::new)
            .map(HistoryLimit)
    }

    pub fn get(self) -> usize {
        self.0.get()
    }
}

/// Ordered entries for one cache, oldest first, newest last.
#[derive(Debug, Clone, PartialEq)]
pub struct HistorySeries<T> {
    entries: VecDeque<T>,
}

impl<T> Default for HistorySeries<T> {
    fn default() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }
}

impl<T> HistorySeries<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `item`, then drop the oldest entries until at most `limit` remain.
    pub fn push(&mut self, item: T, limit: HistoryLimit) {
        self.entries.push_back(item);
        self.prune(limit);
    }

    /// Drop the oldest entries until at most `limit` remain.
    pub fn prune(&mut self, limit: HistoryLimit) {
        let excess = self.entries.len().saturating_sub(limit.get());
        self.entries.drain(..excess);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The most recently appended entry.
    pub fn latest(&self) -> Option<&T> {
        self.entries.back()
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.entries.iter()
    }
}

/// History series for every cache that has reported.
#[derive(Debug, Clone, PartialEq)]
pub struct History<T> {
    caches: BTreeMap<CacheName, HistorySeries<T>>,
}

impl<T> Default for History<T> {
    fn default() -> Self {
        Self {
            caches: BTreeMap::new(),
        }
    }
}

impl<T> History<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry to a cache's series, bounded by `limit`.
    pub fn add(&mut self, cache: &CacheName, item: T, limit: HistoryLimit) {
        self.caches
            .entry(cache.clone())
            .or_default()
            .push(item, limit);
    }

    /// The series for one cache.
    pub fn get(&self, cache: &str) -> Option<&HistorySeries<T>> {
        self.caches.get(cache)
    }

    /// Number of caches with a series.
    pub fn len(&self) -> usize {
        self.caches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, CacheName, HistorySeries<T>> {
        self.caches.iter()
    }
}

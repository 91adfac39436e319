//! Read handle for the stores published by the stat history manager.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use statwatch_types::{CacheName, DsStats, LastStats};

use crate::aggregate::PrecomputedByCache;
use crate::durations::PollDurations;
use crate::error::ErrorCounter;
use crate::history::History;
use crate::result::{ResultInfo, StatResult};
use crate::snapshot::SnapshotStore;
use crate::unpolled::UnpolledCaches;

/// Full results per cache, bounded by the cache's history count.
pub type ResultHistory = History<Arc<StatResult>>;

/// Derived per-result data per cache, bounded like [`ResultHistory`].
pub type ResultInfoHistory = History<ResultInfo>;

/// Latest interface capacity per cache, from error-free results.
pub type CacheKbpses = BTreeMap<CacheName, u64>;

/// Latest result of every cache, errored or not.
pub type LastResults = BTreeMap<CacheName, Arc<StatResult>>;

/// Every store the batch processor writes.
#[derive(Debug, Default)]
pub(crate) struct Stores {
    pub(crate) result_history: SnapshotStore<ResultHistory>,
    pub(crate) info_history: SnapshotStore<ResultInfoHistory>,
    pub(crate) max_kbps: SnapshotStore<CacheKbpses>,
    pub(crate) precomputed: SnapshotStore<PrecomputedByCache>,
    pub(crate) last_results: SnapshotStore<LastResults>,
    pub(crate) durations: SnapshotStore<PollDurations>,
    pub(crate) unpolled: UnpolledCaches,
    pub(crate) ds_stats: SnapshotStore<DsStats>,
    pub(crate) last_stats: SnapshotStore<LastStats>,
}

/// Read-only access to everything the stat history manager publishes.
///
/// Cheap to clone and safe to use from any number of threads or tasks.
/// Each accessor returns the latest published snapshot; holding on to it
/// never blocks the writer.
///
/// # Example
///
/// ```rust
/// use statwatch::StatHistoryManager;
///
/// let manager = StatHistoryManager::builder().build();
/// let history = manager.history();
///
/// assert!(history.result_history().is_empty());
/// assert_eq!(history.error_count(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct StatHistory {
    pub(crate) stores: Arc<Stores>,
    pub(crate) errors: ErrorCounter,
}

impl StatHistory {
    pub(crate) fn new(errors: ErrorCounter) -> Self {
        Self {
            stores: Arc::new(Stores::default()),
            errors,
        }
    }

    /// Bounded full-result history per cache.
    pub fn result_history(&self) -> Arc<ResultHistory> {
        self.stores.result_history.get()
    }

    /// Bounded derived-stat history per cache.
    pub fn result_info_history(&self) -> Arc<ResultInfoHistory> {
        self.stores.info_history.get()
    }

    /// Latest interface capacity per cache, in kbps.
    pub fn max_kbps(&self) -> Arc<CacheKbpses> {
        self.stores.max_kbps.get()
    }

    /// Latest good derived data per cache, with missing counters carried
    /// forward from the previous good result.
    pub fn precomputed(&self) -> Arc<PrecomputedByCache> {
        self.stores.precomputed.get()
    }

    /// The latest result of every cache.
    pub fn last_results(&self) -> Arc<LastResults> {
        self.stores.last_results.get()
    }

    /// Time between the two most recent processed polls of each cache.
    pub fn poll_durations(&self) -> Arc<PollDurations> {
        self.stores.durations.get()
    }

    /// Eligible caches that have not reported yet.
    pub fn unpolled_caches(&self) -> Arc<BTreeSet<CacheName>> {
        self.stores.unpolled.get()
    }

    /// The latest delivery-service aggregate.
    pub fn ds_stats(&self) -> Arc<DsStats> {
        self.stores.ds_stats.get()
    }

    /// Counter state from the latest successful aggregation.
    pub fn last_stats(&self) -> Arc<LastStats> {
        self.stores.last_stats.get()
    }

    /// Number of failed aggregations so far.
    pub fn error_count(&self) -> u64 {
        self.errors.get()
    }
}

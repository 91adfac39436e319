//! Tracking of caches expected to report stats that have not yet done so.

use std::collections::BTreeSet;
use std::sync::Arc;

use statwatch_types::{CacheName, CrStates, LastStats, MonitorConfig};
use tracing::debug;

use crate::result::StatResult;
use crate::snapshot::SnapshotStore;

/// Caches known to the local health state that are eligible for stat polling.
///
/// A cache is eligible when it is in the monitor config and its status is
/// neither ONLINE nor OFFLINE.
pub fn polled_caches(local_states: &CrStates, config: &MonitorConfig) -> BTreeSet<CacheName> {
    local_states
        .caches
        .keys()
        .filter(|cache| config.status(cache).is_some_and(|status| status.is_polled()))
        .cloned()
        .collect()
}

/// The published set of eligible caches that have not reported yet.
#[derive(Debug, Clone, Default)]
pub struct UnpolledCaches {
    store: SnapshotStore<BTreeSet<CacheName>>,
}

impl UnpolledCaches {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current set of unpolled caches.
    pub fn get(&self) -> Arc<BTreeSet<CacheName>> {
        self.store.get()
    }

    /// Replace the set, typically with [`polled_caches`] after a topology change.
    pub(crate) fn set_new_caches(&self, caches: BTreeSet<CacheName>) {
        debug!(count = caches.len(), "unpolled caches reset");
        self.store.set(caches);
    }

    /// Remove every unpolled cache that has a result in `results` and has
    /// been folded into `last_stats`.
    pub(crate) fn set_polled<'a, I>(&self, results: I, last_stats: &LastStats)
    where
        I: IntoIterator<Item = &'a StatResult>,
    {
        let current = self.store.get();
        if current.is_empty() {
            return;
        }

        let reported: BTreeSet<&CacheName> = results
            .into_iter()
            .map(|r| &r.id)
            .filter(|id| current.contains(*id))
            .collect();
        let polled: Vec<&CacheName> = reported
            .into_iter()
            .filter(|id| {
                let aggregated = last_stats.contains_cache(id.as_str());
                if !aggregated {
                    debug!(cache = %id, "cache reported but is not in last stats yet");
                }
                aggregated
            })
            .collect();
        if polled.is_empty() {
            return;
        }

        let mut next = BTreeSet::clone(&current);
        for cache in polled {
            next.remove(cache);
        }
        debug!(remaining = next.len(), "caches polled");
        self.store.set(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use statwatch_types::{CacheStatus, IsAvailable, LastCacheStats, TrafficServer};

    fn fixture() -> (CrStates, MonitorConfig) {
        let mut local = CrStates::default();
        let mut config = MonitorConfig::default();
        for (name, status) in [
            ("online", CacheStatus::Online),
            ("offline", CacheStatus::Offline),
            ("reported", CacheStatus::Reported),
            ("down", CacheStatus::AdminDown),
        ] {
            local
                .caches
                .insert(CacheName::from(name), IsAvailable { is_available: true });
            config
                .servers
                .insert(CacheName::from(name), TrafficServer::new("EDGE", status));
        }
        local
            .caches
            .insert(CacheName::from("unconfigured"), IsAvailable::default());
        (local, config)
    }

    fn last_stats(caches: &[&str]) -> LastStats {
        let mut last = LastStats::default();
        for name in caches {
            last.caches
                .insert(CacheName::from(*name), LastCacheStats::default());
        }
        last
    }

    #[test]
    fn online_offline_and_unconfigured_caches_are_not_polled() {
        let (local, config) = fixture();
        let caches = polled_caches(&local, &config);
        let names: Vec<&str> = caches.iter().map(|c| c.as_str()).collect();
        assert_eq!(names, vec!["down", "reported"]);
    }

    #[test]
    fn set_polled_removes_reported_and_aggregated_caches() {
        let (local, config) = fixture();
        let unpolled = UnpolledCaches::new();
        unpolled.set_new_caches(polled_caches(&local, &config));

        let results = [StatResult::new("reported", 1)];
        unpolled.set_polled(&results, &last_stats(&["reported"]));

        let remaining = unpolled.get();
        assert!(!remaining.contains("reported"));
        assert!(remaining.contains("down"));
        assert_eq!(remaining.len(), 1);
    }

    #[test]
    fn set_polled_requires_cache_in_last_stats() {
        let (local, config) = fixture();
        let unpolled = UnpolledCaches::new();
        unpolled.set_new_caches(polled_caches(&local, &config));
        let before = unpolled.get();

        let results = [StatResult::new("reported", 1)];
        unpolled.set_polled(&results, &last_stats(&[]));

        // Nothing removed, nothing republished.
        assert!(Arc::ptr_eq(&before, &unpolled.get()));
    }

    #[test]
    fn results_for_ineligible_caches_change_nothing() {
        let (local, config) = fixture();
        let unpolled = UnpolledCaches::new();
        unpolled.set_new_caches(polled_caches(&local, &config));

        let results = [StatResult::new("online", 1)];
        unpolled.set_polled(&results, &last_stats(&["online"]));

        assert!(!unpolled.get().contains("online"));
        assert_eq!(unpolled.get().len(), 2);
    }
}

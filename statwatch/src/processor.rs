//! The single-writer step that folds a batch of results into every store.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use statwatch_types::{CacheName, CrStates, MonitorConfig};
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::aggregate::{Aggregator, PrecomputedByCache};
use crate::durations::PollDurationTracker;
use crate::history::HistoryLimit;
use crate::reader::{CacheKbpses, LastResults, ResultHistory, ResultInfoHistory, StatHistory};
use crate::result::{PollFinished, PollResult, ResultInfo, StatResult};
use crate::snapshot::SnapshotStore;
use crate::unpolled::polled_caches;
use crate::vitals::VitalsCalculator;

/// Folds batches of poll results into the published stores.
///
/// Owns the write side of every store in its [`StatHistory`]. It is not
/// `Clone` and `process` takes `&mut self`, so at most one batch is ever
/// being folded.
pub(crate) struct BatchProcessor {
    history: StatHistory,
    monitor_config: SnapshotStore<MonitorConfig>,
    combined_states: SnapshotStore<CrStates>,
    vitals: Arc<dyn VitalsCalculator>,
    aggregator: Arc<dyn Aggregator>,
    // Carry-forward baseline: latest error-free derived data per cache.
    precomputed: PrecomputedByCache,
    last_results: LastResults,
    durations: PollDurationTracker,
}

/// The configured history bound for a cache, clamped to at least one.
fn history_limit(config: &MonitorConfig, cache: &CacheName) -> HistoryLimit {
    let count = config.history_count(cache);
    HistoryLimit::new(count).unwrap_or_else(|| {
        warn!(cache = %cache, count, "history count below 1, using 1");
        HistoryLimit::MIN
    })
}

impl BatchProcessor {
    pub(crate) fn new(
        history: StatHistory,
        monitor_config: SnapshotStore<MonitorConfig>,
        combined_states: SnapshotStore<CrStates>,
        vitals: Arc<dyn VitalsCalculator>,
        aggregator: Arc<dyn Aggregator>,
    ) -> Self {
        Self {
            history,
            monitor_config,
            combined_states,
            vitals,
            aggregator,
            precomputed: BTreeMap::new(),
            last_results: BTreeMap::new(),
            durations: PollDurationTracker::default(),
        }
    }

    pub(crate) fn history(&self) -> &StatHistory {
        &self.history
    }

    /// Reset the unpolled set from the current local states and config.
    ///
    /// Caches that have left the config are dropped from the carry-forward
    /// baseline and the last-result cache first.
    pub(crate) fn recompute_unpolled(&mut self, local_states: &CrStates) {
        let config = self.monitor_config.get();
        self.forget_removed_caches(&config);
        self.history
            .stores
            .unpolled
            .set_new_caches(polled_caches(local_states, &config));
    }

    fn forget_removed_caches(&mut self, config: &MonitorConfig) {
        let known = |cache: &CacheName| config.servers.contains_key(cache);
        let before = self.precomputed.len() + self.last_results.len();
        self.precomputed.retain(|cache, _| known(cache));
        self.last_results.retain(|cache, _| known(cache));
        self.durations.retain(known);

        let removed = before - (self.precomputed.len() + self.last_results.len());
        if removed > 0 {
            debug!(removed, "dropped state of caches no longer in the monitor config");
            let stores = &self.history.stores;
            stores.precomputed.set(self.precomputed.clone());
            stores.last_results.set(self.last_results.clone());
        }
    }

    /// Fold `batch` into every store, then signal each result's poller.
    ///
    /// The fold works on copies; retained state is only replaced when the
    /// stores are published, so a panic mid-fold leaves both untouched.
    /// An empty batch changes nothing.
    pub(crate) fn process(&mut self, batch: Vec<PollResult>) {
        if batch.is_empty() {
            return;
        }

        let config = self.monitor_config.get();
        let stores = Arc::clone(&self.history.stores);

        let mut result_history = ResultHistory::clone(&stores.result_history.get());
        let mut info_history = ResultInfoHistory::clone(&stores.info_history.get());
        let mut max_kbps = CacheKbpses::clone(&stores.max_kbps.get());
        let mut precomputed = self.precomputed.clone();
        let mut last_results = self.last_results.clone();
        let mut processed: Vec<(Arc<StatResult>, PollFinished)> = Vec::with_capacity(batch.len());

        for PollResult {
            mut result,
            finished,
        } in batch
        {
            let limit = history_limit(&config, &result.id);

            if let Some(previous) = last_results.get(&result.id) {
                self.vitals.compute(&mut result, previous, &config);
            }

            info_history.add(&result.id, ResultInfo::from(&result), limit);
            let mut latest = Arc::new(result);
            result_history.add(&latest.id, Arc::clone(&latest), limit);

            // Errored results never touch the max or the carry-forward baseline.
            if latest.is_ok() {
                max_kbps.insert(latest.id.clone(), latest.precomputed.max_kbps);
                if latest.precomputed.is_missing_out_bytes() {
                    let carried = precomputed
                        .get(&latest.id)
                        .map_or(0, |baseline| baseline.out_bytes);
                    if carried != 0 {
                        Arc::make_mut(&mut latest).precomputed.out_bytes = carried;
                    }
                }
                precomputed.insert(latest.id.clone(), latest.precomputed.clone());
            }

            last_results.insert(latest.id.clone(), Arc::clone(&latest));
            processed.push((latest, finished));
        }

        stores.result_history.set(result_history);
        stores.info_history.set(info_history);
        stores.max_kbps.set(max_kbps);
        stores.precomputed.set(precomputed.clone());
        stores.last_results.set(last_results.clone());
        self.precomputed = precomputed;
        self.last_results = last_results;

        self.aggregate(&config, &processed);

        let end = Instant::now();
        let mut tracker = self.durations.clone();
        stores.durations.update(|durations| {
            for (result, _) in &processed {
                tracker.finish(durations, &result.id, end);
            }
        });
        self.durations = tracker;

        stores.unpolled.set_polled(
            processed.iter().map(|(result, _)| result.as_ref()),
            &stores.last_stats.get(),
        );

        for (result, finished) in processed {
            if !finished.signal(result.poll_id) {
                debug!(cache = %result.id, poll_id = result.poll_id, "poller gone before completion");
            }
        }
    }

    /// Recompute delivery-service stats; on failure keep the previous ones.
    fn aggregate(&self, config: &MonitorConfig, processed: &[(Arc<StatResult>, PollFinished)]) {
        let stores = &self.history.stores;
        let combined = self.combined_states.get();
        let previous = stores.last_stats.get();

        for (result, _) in processed {
            debug!(poll_id = result.poll_id, cache = %result.id, "aggregate start");
        }

        let outcome = self.aggregator.aggregate(
            &self.precomputed,
            config,
            &combined,
            &previous,
            SystemTime::now(),
        );

        for (result, _) in processed {
            debug!(poll_id = result.poll_id, cache = %result.id, "aggregate end");
        }

        match outcome {
            Ok((ds_stats, last_stats)) => {
                stores.ds_stats.set(ds_stats);
                stores.last_stats.set(last_stats);
            }
            Err(err) => {
                self.history.errors.inc();
                error!(error = %err, "aggregating delivery service stats");
            }
        }
    }
}

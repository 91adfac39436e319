//! Time between successive processed polls of each cache.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use statwatch_types::CacheName;
use tokio::time::Instant;

/// Most recent interval between two processed polls, per cache.
pub type PollDurations = BTreeMap<CacheName, Duration>;

/// Remembers when each cache's last result finished processing.
#[derive(Debug, Clone, Default)]
pub(crate) struct PollDurationTracker {
    last_end: HashMap<CacheName, Instant>,
}

impl PollDurationTracker {
    /// Record that `cache` finished processing at `end`, storing the interval
    /// since its previous completion into `durations`.
    pub(crate) fn finish(&mut self, durations: &mut PollDurations, cache: &CacheName, end: Instant) {
        if let Some(previous) = self.last_end.insert(cache.clone(), end) {
            durations.insert(cache.clone(), end.saturating_duration_since(previous));
        }
    }

    /// Forget every cache for which `keep` returns false.
    pub(crate) fn retain(&mut self, mut keep: impl FnMut(&CacheName) -> bool) {
        self.last_end.retain(|cache, _| keep(cache));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_completion_records_no_duration() {
        let mut tracker = PollDurationTracker::default();
        let mut durations = PollDurations::new();
        tracker.finish(&mut durations, &CacheName::from("edge1"), Instant::now());
        assert!(durations.is_empty());
    }

    #[test]
    fn keeps_only_the_latest_interval() {
        let mut tracker = PollDurationTracker::default();
        let mut durations = PollDurations::new();
        let edge1 = CacheName::from("edge1");
        let t0 = Instant::now();

        tracker.finish(&mut durations, &edge1, t0);
        tracker.finish(&mut durations, &edge1, t0 + Duration::from_millis(300));
        assert_eq!(durations["edge1"], Duration::from_millis(300));

        tracker.finish(&mut durations, &edge1, t0 + Duration::from_millis(400));
        assert_eq!(durations["edge1"], Duration::from_millis(100));
    }

    #[test]
    fn forgotten_cache_starts_over() {
        let mut tracker = PollDurationTracker::default();
        let mut durations = PollDurations::new();
        let edge1 = CacheName::from("edge1");
        let t0 = Instant::now();

        tracker.finish(&mut durations, &edge1, t0);
        tracker.retain(|cache| cache.as_str() != "edge1");
        tracker.finish(&mut durations, &edge1, t0 + Duration::from_millis(300));
        assert!(durations.is_empty());
    }
}

//! Periodic summary of the published stat stores.

use std::time::Duration;

use statwatch::{EventLog, StatHistory};
use tracing::{debug, info};

use crate::duration::format_duration;

/// A point-in-time summary of what the stat history manager has published.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    /// Caches with at least one result in history.
    pub caches: usize,
    pub unpolled: usize,
    pub errored: usize,
    pub aggregation_errors: u64,
    pub delivery_services: usize,
    pub total_kbps: f64,
    pub slowest_poll: Option<Duration>,
    pub events: usize,
}

impl Summary {
    pub fn collect(history: &StatHistory, events: &EventLog) -> Self {
        let last_results = history.last_results();
        let ds_stats = history.ds_stats();
        Self {
            caches: history.result_history().len(),
            unpolled: history.unpolled_caches().len(),
            errored: last_results.values().filter(|r| !r.is_ok()).count(),
            aggregation_errors: history.error_count(),
            delivery_services: ds_stats.delivery_services.len(),
            total_kbps: ds_stats.total_kbps(),
            slowest_poll: history.poll_durations().values().max().copied(),
            events: events.len(),
        }
    }
}

/// Log one summary line.
pub fn report(history: &StatHistory, events: &EventLog) {
    let summary = Summary::collect(history, events);
    let slowest_poll = summary
        .slowest_poll
        .map(format_duration)
        .unwrap_or_else(|| "-".to_string());
    info!(
        caches = summary.caches,
        unpolled = summary.unpolled,
        errored = summary.errored,
        aggregation_errors = summary.aggregation_errors,
        delivery_services = summary.delivery_services,
        total_kbps = summary.total_kbps,
        slowest_poll = %slowest_poll,
        events = summary.events,
        "stat summary"
    );
    for (ds, stat) in &history.ds_stats().delivery_services {
        debug!(
            delivery_service = %ds,
            kbps = stat.kbps,
            caches_reporting = stat.caches_reporting,
            caches_available = stat.caches_available,
            "delivery service"
        );
    }
}

/// Log a summary every `interval`, forever.
pub async fn run(history: StatHistory, events: EventLog, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately; skip the empty startup report.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        report(&history, &events);
    }
}

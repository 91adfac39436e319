//! Poll report feed.
//!
//! Receives newline-delimited JSON poll reports over TCP (or any async
//! reader) and hands them to the stat history manager, one cache at a time:
//! a report for a cache is not forwarded until the manager has signalled
//! completion of that cache's previous report. Reports for caches missing
//! from the current monitor config are dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use statwatch::{
    CacheName, DeliveryServiceName, MonitorConfig, PollResult, PrecomputedData, RawStats,
    SnapshotStore, StatResult,
};
use tokio::io::{self, AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// Raw stat holding the cache's total bytes sent.
pub const BYTES_OUT_STAT: &str = "bytes_out";

/// Raw stat holding the cache's interface capacity in kbps.
pub const MAX_KBPS_STAT: &str = "max_kbps";

const DS_STAT_PREFIX: &str = "ds.";
const DS_STAT_SUFFIX: &str = ".bytes_out";

/// One poll of one cache, as sent over the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollReport {
    pub cache: CacheName,
    #[serde(default)]
    pub stats: RawStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Derive the per-poll numbers the aggregator needs from raw stats.
///
/// Missing or non-numeric counters become zero.
pub fn precompute(stats: &RawStats) -> PrecomputedData {
    let counter = |name: &str| stats.get(name).and_then(|v| v.as_u64()).unwrap_or(0);

    let delivery_services = stats
        .iter()
        .filter_map(|(key, value)| {
            let ds = key
                .strip_prefix(DS_STAT_PREFIX)?
                .strip_suffix(DS_STAT_SUFFIX)?;
            if ds.is_empty() {
                return None;
            }
            Some((DeliveryServiceName::from(ds), value.as_u64().unwrap_or(0)))
        })
        .collect();

    PrecomputedData {
        out_bytes: counter(BYTES_OUT_STAT),
        max_kbps: counter(MAX_KBPS_STAT),
        delivery_services,
    }
}

impl PollReport {
    /// Turn the report into a stat result stamped with the current time.
    pub fn into_result(self, poll_id: u64) -> StatResult {
        let mut result = StatResult::new(self.cache, poll_id);
        result.time = SystemTime::now();
        result.precomputed = precompute(&self.stats);
        result.stats = self.stats;
        result.error = self.error;
        result
    }
}

/// Routes reports to one poller task per cache.
///
/// # Example
///
/// ```
/// use std::io::Cursor;
/// use statwatch::{CacheStatus, MonitorConfig, SnapshotStore, TrafficServer};
/// use statwatchd::Feed;
/// use tokio::sync::mpsc;
///
/// # tokio_test::block_on(async {
/// let mut config = MonitorConfig::default();
/// config
///     .servers
///     .insert("edge1".into(), TrafficServer::new("EDGE", CacheStatus::Reported));
///
/// let (tx, mut results) = mpsc::channel(16);
/// let feed = Feed::new(tx, 4, SnapshotStore::new(config));
///
/// let data = b"{\"cache\":\"edge1\",\"stats\":{\"bytes_out\":1024}}\n";
/// feed.read_reports(Cursor::new(data.to_vec()), "example").await.unwrap();
///
/// let poll = results.recv().await.unwrap();
/// assert_eq!(poll.result.precomputed.out_bytes, 1024);
/// # });
/// ```
#[derive(Debug)]
pub struct Feed {
    results: mpsc::Sender<PollResult>,
    monitor_config: SnapshotStore<MonitorConfig>,
    pollers: Mutex<Pollers>,
    next_poll_id: Arc<AtomicU64>,
    queue_depth: usize,
}

/// Poller queues, pruned whenever a new monitor config is seen.
#[derive(Debug)]
struct Pollers {
    config: Arc<MonitorConfig>,
    queues: HashMap<CacheName, mpsc::Sender<PollReport>>,
}

/// Outcome of [`Feed::dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Queued behind the cache's in-flight poll.
    Queued,
    /// The cache is not in the current monitor config.
    Unknown,
    /// The stat history manager is gone.
    Closed,
}

impl Feed {
    /// Create a feed forwarding to the manager's results channel.
    ///
    /// `queue_depth` bounds how many reports wait per cache. Only caches in
    /// `monitor_config` get a poller.
    pub fn new(
        results: mpsc::Sender<PollResult>,
        queue_depth: usize,
        monitor_config: SnapshotStore<MonitorConfig>,
    ) -> Self {
        let pollers = Pollers {
            config: monitor_config.get(),
            queues: HashMap::new(),
        };
        Self {
            results,
            monitor_config,
            pollers: Mutex::new(pollers),
            next_poll_id: Arc::new(AtomicU64::new(1)),
            queue_depth: queue_depth.max(1),
        }
    }

    /// Queue a report behind any in-flight poll of the same cache.
    pub async fn dispatch(&self, report: PollReport) -> Dispatch {
        let poller = {
            let mut pollers = self.pollers.lock();
            let config = self.monitor_config.get();
            if !Arc::ptr_eq(&pollers.config, &config) {
                // Dropping a queue stops its poller once the queue drains.
                pollers
                    .queues
                    .retain(|cache, _| config.servers.contains_key(cache));
                pollers.config = config;
            }
            if !pollers.config.servers.contains_key(&report.cache) {
                return Dispatch::Unknown;
            }
            pollers
                .queues
                .entry(report.cache.clone())
                .or_insert_with(|| self.spawn_poller(&report.cache))
                .clone()
        };
        match poller.send(report).await {
            Ok(()) => Dispatch::Queued,
            Err(_) => Dispatch::Closed,
        }
    }

    fn spawn_poller(&self, cache: &CacheName) -> mpsc::Sender<PollReport> {
        let (tx, mut rx) = mpsc::channel::<PollReport>(self.queue_depth);
        let results = self.results.clone();
        let next_poll_id = Arc::clone(&self.next_poll_id);
        let cache = cache.clone();
        debug!(cache = %cache, "starting poller");

        tokio::spawn(async move {
            while let Some(report) = rx.recv().await {
                let poll_id = next_poll_id.fetch_add(1, Ordering::Relaxed);
                let (poll, done) = PollResult::new(report.into_result(poll_id));
                if results.send(poll).await.is_err() {
                    break;
                }
                // A dropped handle means the batch was discarded; move on.
                match done.await {
                    Ok(id) => trace!(cache = %cache, poll_id = id, "poll finished"),
                    Err(_) => debug!(cache = %cache, poll_id, "poll dropped by manager"),
                }
            }
            debug!(cache = %cache, "poller stopped");
        });
        tx
    }

    /// Read newline-delimited reports from `reader` until EOF.
    ///
    /// Malformed lines are logged and skipped. Returns the number of
    /// reports accepted.
    pub async fn read_reports<R>(&self, reader: R, peer: &str) -> io::Result<usize>
    where
        R: AsyncRead + Unpin,
    {
        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        let mut accepted = 0;

        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                break;
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<PollReport>(trimmed) {
                Ok(report) => {
                    let cache = report.cache.clone();
                    match self.dispatch(report).await {
                        Dispatch::Queued => accepted += 1,
                        Dispatch::Unknown => {
                            debug!(peer, cache = %cache, "ignoring report for unconfigured cache")
                        }
                        Dispatch::Closed => {
                            warn!(peer, "stat history manager gone, dropping connection");
                            break;
                        }
                    }
                }
                Err(e) => warn!(peer, error = %e, "skipping malformed poll report"),
            }
        }
        Ok(accepted)
    }
}

/// Accept connections and read reports from each until the listener fails.
pub async fn serve(listener: TcpListener, feed: Arc<Feed>) -> io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        info!(%peer, "feed connection opened");
        let feed = Arc::clone(&feed);
        tokio::spawn(async move {
            let peer = peer.to_string();
            match feed.read_reports(stream, &peer).await {
                Ok(count) => info!(peer = %peer, reports = count, "feed connection closed"),
                Err(e) => warn!(peer = %peer, error = %e, "feed connection failed"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use statwatch::{CacheStatus, StatValue, TrafficServer};
    use std::io::Cursor;
    use std::time::Duration;

    fn monitor_config(caches: &[&str]) -> MonitorConfig {
        let mut config = MonitorConfig::default();
        for cache in caches {
            config.servers.insert(
                CacheName::from(*cache),
                TrafficServer::new("EDGE", CacheStatus::Reported),
            );
        }
        config
    }

    fn feed(results: mpsc::Sender<PollResult>) -> Feed {
        Feed::new(results, 4, SnapshotStore::new(monitor_config(&["edge1", "edge2"])))
    }

    fn line(cache: &str, bytes_out: u64) -> String {
        format!(r#"{{"cache":"{cache}","stats":{{"bytes_out":{bytes_out},"max_kbps":10000,"ds.video.bytes_out":{bytes_out}}}}}"#)
    }

    #[test]
    fn precompute_reads_counters_and_delivery_services() {
        let mut stats = RawStats::new();
        stats.insert("bytes_out".into(), StatValue::from(5_000u64));
        stats.insert("max_kbps".into(), StatValue::from(10_000u64));
        stats.insert("ds.video.bytes_out".into(), StatValue::from(3_000u64));
        stats.insert("ds.images.bytes_out".into(), StatValue::from(2_000u64));
        stats.insert("ds..bytes_out".into(), StatValue::from(1u64));
        stats.insert("load_avg".into(), StatValue::from(0.5));

        let data = precompute(&stats);
        assert_eq!(data.out_bytes, 5_000);
        assert_eq!(data.max_kbps, 10_000);
        assert_eq!(data.delivery_services.len(), 2);
        assert_eq!(data.delivery_services[&DeliveryServiceName::from("video")], 3_000);
    }

    #[test]
    fn precompute_defaults_missing_counters_to_zero() {
        let mut stats = RawStats::new();
        stats.insert("bytes_out".into(), StatValue::from("n/a"));
        let data = precompute(&stats);
        assert_eq!(data.out_bytes, 0);
        assert!(data.is_missing_out_bytes());
    }

    #[test]
    fn report_parses_with_optional_fields() {
        let report: PollReport = serde_json::from_str(r#"{"cache":"edge1"}"#).unwrap();
        assert_eq!(report.cache.as_str(), "edge1");
        assert!(report.stats.is_empty());
        assert!(report.error.is_none());

        let result = report.into_result(9);
        assert_eq!(result.poll_id, 9);
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn second_report_waits_for_completion() {
        let (results_tx, mut results) = mpsc::channel(8);
        let feed = feed(results_tx);

        let data = format!("{}\n{}\n", line("edge1", 100), line("edge1", 200));
        let accepted = feed.read_reports(Cursor::new(data), "test").await.unwrap();
        assert_eq!(accepted, 2);

        let first = results.recv().await.unwrap();
        assert_eq!(first.result.precomputed.out_bytes, 100);
        let early = tokio::time::timeout(Duration::from_millis(50), results.recv()).await;
        assert!(early.is_err(), "second report forwarded before completion");

        first.finished.signal(first.result.poll_id);
        let second = results.recv().await.unwrap();
        assert_eq!(second.result.precomputed.out_bytes, 200);
        assert!(second.result.poll_id > first.result.poll_id);
    }

    #[tokio::test]
    async fn caches_are_polled_independently() {
        let (results_tx, mut results) = mpsc::channel(8);
        let feed = feed(results_tx);

        let data = format!("{}\n{}\n", line("edge1", 1), line("edge2", 2));
        feed.read_reports(Cursor::new(data), "test").await.unwrap();

        let a = results.recv().await.unwrap();
        let b = results.recv().await.unwrap();
        let mut caches = vec![a.result.id.to_string(), b.result.id.to_string()];
        caches.sort();
        assert_eq!(caches, vec!["edge1", "edge2"]);
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped() {
        let (results_tx, mut results) = mpsc::channel(8);
        let feed = feed(results_tx);

        let data = format!("not json\n\n{}\n", line("edge1", 7));
        let accepted = feed.read_reports(Cursor::new(data), "test").await.unwrap();
        assert_eq!(accepted, 1);
        assert_eq!(results.recv().await.unwrap().result.id.as_str(), "edge1");
    }

    #[tokio::test]
    async fn dropped_completion_releases_the_next_report() {
        let (results_tx, mut results) = mpsc::channel(8);
        let feed = feed(results_tx);

        let data = format!("{}\n{}\n", line("edge1", 1), line("edge1", 2));
        feed.read_reports(Cursor::new(data), "test").await.unwrap();

        drop(results.recv().await.unwrap());
        let next = results.recv().await.unwrap();
        assert_eq!(next.result.precomputed.out_bytes, 2);
    }

    #[tokio::test]
    async fn reports_for_unconfigured_caches_are_ignored() {
        let (results_tx, mut results) = mpsc::channel(8);
        let config = SnapshotStore::new(monitor_config(&["edge1", "edge2"]));
        let feed = Feed::new(results_tx, 4, config.clone());

        let data = format!("{}\n{}\n", line("stranger", 1), line("edge1", 2));
        let accepted = feed.read_reports(Cursor::new(data), "test").await.unwrap();
        assert_eq!(accepted, 1);
        assert_eq!(results.recv().await.unwrap().result.id.as_str(), "edge1");
        assert_eq!(feed.pollers.lock().queues.len(), 1);

        // edge1 leaves the topology; its poller goes with it.
        config.set(monitor_config(&["edge2"]));
        let gone: PollReport = serde_json::from_str(&line("edge1", 3)).unwrap();
        assert_eq!(feed.dispatch(gone).await, Dispatch::Unknown);
        let kept: PollReport = serde_json::from_str(&line("edge2", 4)).unwrap();
        assert_eq!(feed.dispatch(kept).await, Dispatch::Queued);

        let pollers = feed.pollers.lock();
        let caches: Vec<&str> = pollers.queues.keys().map(|c| c.as_str()).collect();
        assert_eq!(caches, vec!["edge2"]);
    }
}

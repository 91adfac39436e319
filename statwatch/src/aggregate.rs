//! Delivery-service aggregation.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use statwatch_types::{
    CacheName, CrStates, DsStat, DsStats, LastCacheStats, LastDsStats, LastStats, MonitorConfig,
    PrecomputedData,
};

use tracing::debug;

use crate::error::AggregateError;

/// Latest good derived data per cache.
pub type PrecomputedByCache = BTreeMap<CacheName, PrecomputedData>;

/// Computes delivery-service aggregates from the latest derived data of
/// every cache.
///
/// Returns the new aggregate together with the counter state the next call
/// will receive as `previous`. On error, the caller keeps its previously
/// published aggregate and counter state.
pub trait Aggregator: Send + Sync {
    fn aggregate(
        &self,
        precomputed: &PrecomputedByCache,
        config: &MonitorConfig,
        combined: &CrStates,
        previous: &LastStats,
        now: SystemTime,
    ) -> Result<(DsStats, LastStats), AggregateError>;
}

impl<F> Aggregator for F
where
    F: Fn(
            &PrecomputedByCache,
            &MonitorConfig,
            &CrStates,
            &LastStats,
            SystemTime,
        ) -> Result<(DsStats, LastStats), AggregateError>
        + Send
        + Sync,
{
    fn aggregate(
        &self,
        precomputed: &PrecomputedByCache,
        config: &MonitorConfig,
        combined: &CrStates,
        previous: &LastStats,
        now: SystemTime,
    ) -> Result<(DsStats, LastStats), AggregateError> {
        self(precomputed, config, combined, previous, now)
    }
}

/// Sums out bytes per delivery service and derives bandwidth from the
/// change in counters since the previous aggregate.
///
/// A cache only contributes to the delivery services it is assigned to in
/// the monitor config. Caches missing from the config are skipped and
/// dropped from the counter state.
#[derive(Debug, Clone, Copy, Default)]
pub struct BandwidthAggregator;

fn unix_ms(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Kilobits per second between two byte counter readings.
fn kbps(prev_bytes: u64, prev_ms: u64, bytes: u64, now_ms: u64) -> f64 {
    if now_ms <= prev_ms {
        return 0.0;
    }
    let bits = bytes.saturating_sub(prev_bytes) as f64 * 8.0;
    bits / (now_ms - prev_ms) as f64
}

impl Aggregator for BandwidthAggregator {
    fn aggregate(
        &self,
        precomputed: &PrecomputedByCache,
        config: &MonitorConfig,
        combined: &CrStates,
        previous: &LastStats,
        now: SystemTime,
    ) -> Result<(DsStats, LastStats), AggregateError> {
        let now_ms = unix_ms(now);
        let mut last = previous.clone();
        last.caches.retain(|cache, _| config.servers.contains_key(cache));
        let mut totals: BTreeMap<_, DsStat> = BTreeMap::new();

        for (cache, data) in precomputed {
            let Some(server) = config.servers.get(cache) else {
                debug!(cache = %cache, "skipping cache missing from monitor config");
                continue;
            };

            match previous.caches.get(cache) {
                // No new counter value; keep the last rate.
                Some(prev) if prev.out_bytes == data.out_bytes => {}
                Some(prev) => {
                    let rate = kbps(prev.out_bytes, prev.timestamp_ms, data.out_bytes, now_ms);
                    last.caches.insert(
                        cache.clone(),
                        LastCacheStats {
                            out_bytes: data.out_bytes,
                            kbps: rate,
                            timestamp_ms: now_ms,
                        },
                    );
                }
                None => {
                    last.caches.insert(
                        cache.clone(),
                        LastCacheStats {
                            out_bytes: data.out_bytes,
                            kbps: 0.0,
                            timestamp_ms: now_ms,
                        },
                    );
                }
            }

            let available = combined.is_available(cache);
            for (ds, bytes) in &data.delivery_services {
                if !server.delivery_services.contains(ds) {
                    continue;
                }
                let total = totals.entry(ds.clone()).or_default();
                total.out_bytes += bytes;
                total.caches_reporting += 1;
                if available {
                    total.caches_available += 1;
                }
            }
        }

        for (ds, total) in totals.iter_mut() {
            total.is_available = total.caches_available > 0;
            total.kbps = match previous.delivery_services.get(ds) {
                Some(prev) => kbps(prev.out_bytes, prev.timestamp_ms, total.out_bytes, now_ms),
                None => 0.0,
            };
            last.delivery_services.insert(
                ds.clone(),
                LastDsStats {
                    out_bytes: total.out_bytes,
                    kbps: total.kbps,
                    timestamp_ms: now_ms,
                },
            );
        }

        let stats = DsStats {
            timestamp_ms: now_ms,
            delivery_services: totals,
        };
        Ok((stats, last))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use statwatch_types::{CacheStatus, DeliveryServiceName, IsAvailable, TrafficServer};
    use std::time::Duration;

    fn config() -> MonitorConfig {
        let mut config = MonitorConfig::default();
        for name in ["edge1", "edge2"] {
            config.servers.insert(
                CacheName::from(name),
                TrafficServer::new("EDGE", CacheStatus::Reported).with_delivery_service("video"),
            );
        }
        config
    }

    fn data(out_bytes: u64, video: u64) -> PrecomputedData {
        let mut data = PrecomputedData {
            out_bytes,
            ..Default::default()
        };
        data.delivery_services
            .insert(DeliveryServiceName::from("video"), video);
        data
    }

    fn combined(available: &[&str]) -> CrStates {
        let mut states = CrStates::default();
        for name in available {
            states
                .caches
                .insert(CacheName::from(*name), IsAvailable { is_available: true });
        }
        states
    }

    #[test]
    fn first_aggregate_sums_bytes_with_zero_rate() {
        let mut precomputed = PrecomputedByCache::new();
        precomputed.insert(CacheName::from("edge1"), data(1_000, 600));
        precomputed.insert(CacheName::from("edge2"), data(2_000, 400));

        let (stats, last) = BandwidthAggregator
            .aggregate(
                &precomputed,
                &config(),
                &combined(&["edge1"]),
                &LastStats::default(),
                UNIX_EPOCH + Duration::from_secs(100),
            )
            .unwrap();

        let video = stats.get("video").unwrap();
        assert_eq!(video.out_bytes, 1_000);
        assert_eq!(video.kbps, 0.0);
        assert_eq!(video.caches_reporting, 2);
        assert_eq!(video.caches_available, 1);
        assert!(video.is_available);
        assert!(last.contains_cache("edge1"));
        assert!(last.contains_cache("edge2"));
        assert_eq!(stats.timestamp_ms, 100_000);
    }

    #[test]
    fn rates_follow_counter_deltas() {
        let t0 = UNIX_EPOCH + Duration::from_secs(100);
        let t1 = t0 + Duration::from_secs(1);

        let mut precomputed = PrecomputedByCache::new();
        precomputed.insert(CacheName::from("edge1"), data(1_000, 1_000));
        let (_, last) = BandwidthAggregator
            .aggregate(&precomputed, &config(), &combined(&[]), &LastStats::default(), t0)
            .unwrap();

        precomputed.insert(CacheName::from("edge1"), data(126_000, 126_000));
        let (stats, last) = BandwidthAggregator
            .aggregate(&precomputed, &config(), &combined(&[]), &last, t1)
            .unwrap();

        assert_eq!(stats.get("video").unwrap().kbps, 1_000.0);
        assert_eq!(last.caches["edge1"].kbps, 1_000.0);
        assert!(!stats.get("video").unwrap().is_available);
    }

    #[test]
    fn unchanged_counter_keeps_previous_cache_entry() {
        let t0 = UNIX_EPOCH + Duration::from_secs(100);
        let mut precomputed = PrecomputedByCache::new();
        precomputed.insert(CacheName::from("edge1"), data(1_000, 0));

        let (_, first) = BandwidthAggregator
            .aggregate(&precomputed, &config(), &combined(&[]), &LastStats::default(), t0)
            .unwrap();
        let (_, second) = BandwidthAggregator
            .aggregate(
                &precomputed,
                &config(),
                &combined(&[]),
                &first,
                t0 + Duration::from_secs(5),
            )
            .unwrap();

        assert_eq!(first.caches["edge1"], second.caches["edge1"]);
    }

    #[test]
    fn unassigned_delivery_services_are_ignored() {
        let mut precomputed = PrecomputedByCache::new();
        let mut d = data(10, 10);
        d.delivery_services
            .insert(DeliveryServiceName::from("images"), 99);
        precomputed.insert(CacheName::from("edge1"), d);

        let (stats, _) = BandwidthAggregator
            .aggregate(
                &precomputed,
                &config(),
                &combined(&[]),
                &LastStats::default(),
                SystemTime::now(),
            )
            .unwrap();
        assert!(stats.get("images").is_none());
    }

    #[test]
    fn unconfigured_cache_is_skipped() {
        let mut precomputed = PrecomputedByCache::new();
        precomputed.insert(CacheName::from("edge1"), data(10, 10));
        precomputed.insert(CacheName::from("stranger"), data(1, 1));
        let mut previous = LastStats::default();
        previous
            .caches
            .insert(CacheName::from("retired"), LastCacheStats::default());

        let (stats, last) = BandwidthAggregator
            .aggregate(
                &precomputed,
                &config(),
                &combined(&[]),
                &previous,
                SystemTime::now(),
            )
            .unwrap();
        assert_eq!(stats.get("video").unwrap().caches_reporting, 1);
        assert!(last.contains_cache("edge1"));
        assert!(!last.contains_cache("stranger"));
        assert!(!last.contains_cache("retired"));
    }
}

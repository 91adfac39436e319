//! Delivery-service aggregates and the per-cache state they are computed against.

use alloc::collections::BTreeMap;

use crate::{CacheName, DeliveryServiceName};

/// Aggregate statistics for one delivery service.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub struct DsStat {
    /// Sum of the reporting caches' byte counters for this service.
    #[cfg_attr(feature = "minicbor", n(0))]
    pub out_bytes: u64,

    /// Bandwidth since the previous aggregate, in kilobits per second.
    #[cfg_attr(feature = "minicbor", n(1))]
    pub kbps: f64,

    /// Caches that reported bytes for this service.
    #[cfg_attr(feature = "minicbor", n(2))]
    pub caches_reporting: u64,

    /// Reporting caches that are currently marked available.
    #[cfg_attr(feature = "minicbor", n(3))]
    pub caches_available: u64,

    #[cfg_attr(feature = "minicbor", n(4))]
    pub is_available: bool,
}

/// The delivery-service aggregate published after each batch.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub struct DsStats {
    /// Unix timestamp in milliseconds when the aggregate was computed.
    #[cfg_attr(feature = "minicbor", n(0))]
    pub timestamp_ms: u64,

    #[cfg_attr(feature = "minicbor", n(1))]
    pub delivery_services: BTreeMap<DeliveryServiceName, DsStat>,
}

impl DsStats {
    /// Statistics for one delivery service.
    pub fn get(&self, ds: &str) -> Option<&DsStat> {
        self.delivery_services.get(ds)
    }

    /// Total bandwidth across all delivery services.
    pub fn total_kbps(&self) -> f64 {
        self.delivery_services.values().map(|d| d.kbps).sum()
    }
}

/// Last counter values seen for a cache, used to turn counters into rates.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub struct LastCacheStats {
    #[cfg_attr(feature = "minicbor", n(0))]
    pub out_bytes: u64,
    #[cfg_attr(feature = "minicbor", n(1))]
    pub kbps: f64,
    #[cfg_attr(feature = "minicbor", n(2))]
    pub timestamp_ms: u64,
}

/// Last counter values seen for a delivery service.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub struct LastDsStats {
    #[cfg_attr(feature = "minicbor", n(0))]
    pub out_bytes: u64,
    #[cfg_attr(feature = "minicbor", n(1))]
    pub kbps: f64,
    #[cfg_attr(feature = "minicbor", n(2))]
    pub timestamp_ms: u64,
}

/// Counter state carried from one aggregate to the next.
///
/// The set of caches present here is also the authoritative set of caches
/// that have been folded into an aggregate at least once.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub struct LastStats {
    #[cfg_attr(feature = "minicbor", n(0))]
    pub caches: BTreeMap<CacheName, LastCacheStats>,
    #[cfg_attr(feature = "minicbor", n(1))]
    pub delivery_services: BTreeMap<DeliveryServiceName, LastDsStats>,
}

impl LastStats {
    /// Whether the cache has been folded into an aggregate.
    pub fn contains_cache(&self, cache: &str) -> bool {
        self.caches.contains_key(cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_kbps_sums_services() {
        let mut stats = DsStats::default();
        stats.delivery_services.insert(
            DeliveryServiceName::from("video"),
            DsStat {
                kbps: 1500.0,
                ..Default::default()
            },
        );
        stats.delivery_services.insert(
            DeliveryServiceName::from("images"),
            DsStat {
                kbps: 500.0,
                ..Default::default()
            },
        );
        assert_eq!(stats.total_kbps(), 2000.0);
        assert_eq!(stats.get("video").map(|d| d.kbps), Some(1500.0));
        assert!(stats.get("audio").is_none());
    }

    #[test]
    fn last_stats_cache_membership() {
        let mut last = LastStats::default();
        last.caches
            .insert(CacheName::from("edge1"), LastCacheStats::default());
        assert!(last.contains_cache("edge1"));
        assert!(!last.contains_cache("edge2"));
    }
}

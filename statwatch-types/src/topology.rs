//! Topology and health-state records supplied by the surrounding monitor.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::string::String;

use crate::{CacheName, CacheStatus, DeliveryServiceName};

/// Per-profile monitoring parameters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Profile {
    /// Maximum number of stat results kept per cache.
    ///
    /// Values below one are treated as one by the history stores.
    #[cfg_attr(feature = "serde", serde(default))]
    pub history_count: i64,
}

/// A cache as described by the topology.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrafficServer {
    pub profile: String,
    pub status: CacheStatus,
    #[cfg_attr(feature = "serde", serde(default))]
    pub host_name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub delivery_services: BTreeSet<DeliveryServiceName>,
}

impl TrafficServer {
    /// Create a server entry with the given profile and status.
    pub fn new(profile: &str, status: CacheStatus) -> Self {
        Self {
            profile: profile.into(),
            status,
            ..Default::default()
        }
    }

    /// Add a delivery service assignment.
    pub fn with_delivery_service(mut self, ds: &str) -> Self {
        self.delivery_services.insert(DeliveryServiceName::from(ds));
        self
    }
}

/// The monitoring configuration: every known cache and its profile.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MonitorConfig {
    #[cfg_attr(feature = "serde", serde(default))]
    pub servers: BTreeMap<CacheName, TrafficServer>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub profiles: BTreeMap<String, Profile>,
}

impl MonitorConfig {
    /// The configured history count for a cache, or 0 if the cache or its
    /// profile is unknown.
    pub fn history_count(&self, cache: &CacheName) -> i64 {
        self.servers
            .get(cache)
            .and_then(|server| self.profiles.get(&server.profile))
            .map_or(0, |profile| profile.history_count)
    }

    /// The configured status of a cache, if the cache is known.
    pub fn status(&self, cache: &CacheName) -> Option<CacheStatus> {
        self.servers.get(cache).map(|server| server.status)
    }
}

/// Availability of a single cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IsAvailable {
    pub is_available: bool,
}

/// Health states of all caches, either as computed locally or combined with peers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CrStates {
    #[cfg_attr(feature = "serde", serde(default))]
    pub caches: BTreeMap<CacheName, IsAvailable>,
}

impl CrStates {
    /// Whether the cache is known and marked available.
    pub fn is_available(&self, cache: &CacheName) -> bool {
        self.caches.get(cache).is_some_and(|s| s.is_available)
    }
}

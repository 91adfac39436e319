//! Identifiers for caches and delivery services, and the configured cache status.

use alloc::string::String;
use core::borrow::Borrow;
use core::fmt;

/// Name of an edge or mid-tier cache being monitored.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
#[cfg_attr(feature = "minicbor", cbor(transparent))]
pub struct CacheName(#[cfg_attr(feature = "minicbor", n(0))] pub String);

/// Name of a delivery service, the logical content offering served by many caches.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
#[cfg_attr(feature = "minicbor", cbor(transparent))]
pub struct DeliveryServiceName(#[cfg_attr(feature = "minicbor", n(0))] pub String);

macro_rules! impl_name {
    ($name:ident) => {
        impl $name {
            /// Borrow the name as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.into())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

impl_name!(CacheName);
impl_name!(DeliveryServiceName);

/// Administrative status of a cache in the topology.
///
/// Only `Reported` and `AdminDown` caches are stat-polled; `Online` caches
/// are always considered available and `Offline` caches are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
#[cfg_attr(feature = "minicbor", cbor(index_only))]
pub enum CacheStatus {
    #[cfg_attr(feature = "minicbor", n(0))]
    Online,
    #[cfg_attr(feature = "minicbor", n(1))]
    Offline,
    #[default]
    #[cfg_attr(feature = "minicbor", n(2))]
    Reported,
    #[cfg_attr(feature = "minicbor", n(3))]
    AdminDown,
}

impl CacheStatus {
    /// Whether caches with this status are expected to report stats.
    pub fn is_polled(self) -> bool {
        !matches!(self, CacheStatus::Online | CacheStatus::Offline)
    }
}

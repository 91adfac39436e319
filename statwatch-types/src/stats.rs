//! Raw stat values and the data derived from them per poll.

use alloc::collections::BTreeMap;
use alloc::string::String;

use crate::DeliveryServiceName;

/// A single raw statistic reported by a cache.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub enum StatValue {
    #[cfg_attr(feature = "minicbor", n(0))]
    Number(#[cfg_attr(feature = "minicbor", n(0))] f64),
    #[cfg_attr(feature = "minicbor", n(1))]
    Text(#[cfg_attr(feature = "minicbor", n(0))] String),
}

impl StatValue {
    /// The numeric value, if this stat is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StatValue::Number(n) => Some(*n),
            StatValue::Text(_) => None,
        }
    }

    /// The numeric value truncated to an unsigned integer.
    ///
    /// Negative and non-finite numbers yield `None`.
    pub fn as_u64(&self) -> Option<u64> {
        self.as_f64()
            .filter(|n| n.is_finite() && *n >= 0.0)
            .map(|n| n as u64)
    }
}

impl From<f64> for StatValue {
    fn from(n: f64) -> Self {
        StatValue::Number(n)
    }
}

impl From<u64> for StatValue {
    fn from(n: u64) -> Self {
        StatValue::Number(n as f64)
    }
}

impl From<&str> for StatValue {
    fn from(s: &str) -> Self {
        StatValue::Text(s.into())
    }
}

/// Raw poll payload: stat name to value.
pub type RawStats = BTreeMap<String, StatValue>;

/// Numbers derived from a raw poll at poll time.
///
/// An `out_bytes` of zero is a sentinel meaning "could not be computed this
/// round", not a true zero.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub struct PrecomputedData {
    /// Total bytes sent by the cache, as a monotonically increasing counter.
    #[cfg_attr(feature = "minicbor", n(0))]
    pub out_bytes: u64,

    /// Interface capacity in kilobits per second.
    #[cfg_attr(feature = "minicbor", n(1))]
    pub max_kbps: u64,

    /// Bytes sent per delivery service, as monotonically increasing counters.
    #[cfg_attr(feature = "serde", serde(default))]
    #[cfg_attr(feature = "minicbor", n(2))]
    pub delivery_services: BTreeMap<DeliveryServiceName, u64>,
}

impl PrecomputedData {
    /// Whether the primary counter could not be computed this round.
    pub fn is_missing_out_bytes(&self) -> bool {
        self.out_bytes == 0
    }
}

/// Health vitals derived by diffing two consecutive polls of the same cache.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub struct Vitals {
    #[cfg_attr(feature = "minicbor", n(0))]
    pub load_avg: f64,
    #[cfg_attr(feature = "minicbor", n(1))]
    pub bytes_out: u64,
    #[cfg_attr(feature = "minicbor", n(2))]
    pub kbps_out: u64,
    #[cfg_attr(feature = "minicbor", n(3))]
    pub max_kbps_out: u64,
}

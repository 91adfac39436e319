//! # statwatch-types
//!
//! Record types shared by the statwatch ingestion core and anything that
//! feeds or reads it: cache and delivery-service names, raw stat values,
//! the per-poll derived data, delivery-service aggregates, topology/config
//! records and availability events.
//!
//! ## Features
//!
//! - `std` (default): Standard library support
//! - `serde`: JSON/TOML/etc. serialization via serde
//! - `minicbor`: Compact binary serialization via CBOR
//! - `all`: Enable all serialization formats
//!
//! ## Example
//!
//! ```rust
//! use statwatch_types::{CacheName, CacheStatus, MonitorConfig, Profile, TrafficServer};
//!
//! let mut config = MonitorConfig::default();
//! config.profiles.insert("EDGE".to_string(), Profile { history_count: 30 });
//! config.servers.insert(
//!     CacheName::from("edge1"),
//!     TrafficServer::new("EDGE", CacheStatus::Reported),
//! );
//!
//! assert_eq!(config.history_count(&CacheName::from("edge1")), 30);
//! assert_eq!(config.history_count(&CacheName::from("unknown")), 0);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod aggregate;
mod event;
mod names;
mod stats;
mod topology;

pub use aggregate::*;
pub use event::*;
pub use names::*;
pub use stats::*;
pub use topology::*;

//! # statwatch
//!
//! Statistics ingestion core for a CDN cache monitor.
//!
//! Pollers hand completed polls to the [`StatHistoryManager`], which batches
//! them and folds each batch into a set of copy-on-write snapshot stores:
//! bounded per-cache histories, the latest result and capacity of every
//! cache, poll durations, the caches that have not reported yet, and the
//! delivery-service aggregate. Readers get a [`StatHistory`] handle and see
//! either the old or the new version of each store, never a partial one.
//!
//! ## Quick Start
//!
//! ```rust
//! use statwatch::{PollResult, StatHistoryManager, StatResult};
//!
//! let mut manager = StatHistoryManager::builder().build();
//! let history = manager.history();
//!
//! let (poll, mut done) = PollResult::new(StatResult::new("edge1", 1));
//! manager.process(vec![poll]);
//!
//! assert_eq!(done.try_recv().unwrap(), 1);
//! assert_eq!(history.last_results()["edge1"].poll_id, 1);
//! ```
//!
//! ## Features
//!
//! - **Single writer**: one task mutates, any number of readers
//! - **Backpressure**: pollers wait on a per-result completion handle
//! - **Pluggable math**: vitals and aggregation are traits with defaults
//! - **Panic isolation**: a failing batch is logged and dropped

mod aggregate;
mod durations;
mod error;
mod events;
mod history;
mod manager;
mod processor;
mod reader;
mod result;
mod snapshot;
mod unpolled;
mod vitals;

pub use aggregate::{Aggregator, BandwidthAggregator, PrecomputedByCache};
pub use durations::PollDurations;
pub use error::{AggregateError, ErrorCounter, ManagerError};
pub use events::{EventLog, DEFAULT_MAX_EVENTS};
pub use history::{History, HistoryLimit, HistorySeries};
pub use manager::{StatHistoryManager, StatHistoryManagerBuilder, StatInputs, DEFAULT_FLUSH_INTERVAL};
pub use reader::{CacheKbpses, LastResults, ResultHistory, ResultInfoHistory, StatHistory};
pub use result::{PollDone, PollFinished, PollId, PollResult, ResultInfo, StatResult};
pub use snapshot::SnapshotStore;
pub use unpolled::{polled_caches, UnpolledCaches};
pub use vitals::{ByteCounterVitals, NoVitals, VitalsCalculator, LOAD_AVG_STAT};

// Re-export types for convenience
pub use statwatch_types::{
    CacheName, CacheStatus, CrStates, DeliveryServiceName, DsStat, DsStats, Event, IsAvailable,
    LastCacheStats, LastDsStats, LastStats, MonitorConfig, PrecomputedData, Profile, RawStats,
    StatValue, TrafficServer, Vitals,
};

//! Error types and the shared error counter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;

/// Errors returned by a delivery-service [`Aggregator`](crate::Aggregator).
#[derive(Debug, Error)]
pub enum AggregateError {
    /// The aggregate could not be computed.
    #[error("aggregation failed: {0}")]
    Failed(String),
}

/// Errors ending the stat history manager task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManagerError {
    /// The topology-ready signal was dropped before it fired.
    #[error("topology ready signal dropped before the stat history manager started")]
    NotReady,
}

/// A counter shared between components that tallies non-fatal errors.
///
/// Clones share the same count.
#[derive(Debug, Clone, Default)]
pub struct ErrorCounter(Arc<AtomicU64>);

impl ErrorCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

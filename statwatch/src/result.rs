//! Poll results and their completion handles.

use std::fmt;
use std::time::SystemTime;

use statwatch_types::{CacheName, PrecomputedData, RawStats, Vitals};
use tokio::sync::oneshot;

/// Correlation id assigned to each poll by the poller.
pub type PollId = u64;

/// One stat poll of one cache.
#[derive(Debug, Clone, PartialEq)]
pub struct StatResult {
    pub id: CacheName,
    pub poll_id: PollId,
    /// When the poll response was received.
    pub time: SystemTime,
    /// Raw stats as reported by the cache.
    pub stats: RawStats,
    /// Set if the poll failed. Errored results are still recorded in history.
    pub error: Option<String>,
    pub precomputed: PrecomputedData,
    /// Filled in by the vitals calculator when a previous result exists.
    pub vitals: Vitals,
}

impl StatResult {
    /// A successful result with no stats and default derived data.
    pub fn new(id: impl Into<CacheName>, poll_id: PollId) -> Self {
        Self {
            id: id.into(),
            poll_id,
            time: SystemTime::now(),
            stats: RawStats::new(),
            error: None,
            precomputed: PrecomputedData::default(),
            vitals: Vitals::default(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// The derived view of a result kept in the stat history.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultInfo {
    pub poll_id: PollId,
    pub time: SystemTime,
    pub error: Option<String>,
    pub vitals: Vitals,
    pub precomputed: PrecomputedData,
}

impl From<&StatResult> for ResultInfo {
    fn from(result: &StatResult) -> Self {
        Self {
            poll_id: result.poll_id,
            time: result.time,
            error: result.error.clone(),
            vitals: result.vitals,
            precomputed: result.precomputed.clone(),
        }
    }
}

/// Receiving end of a completion handle, held by the poller.
pub type PollDone = oneshot::Receiver<PollId>;

/// Signals a poller that its result has been folded into history.
///
/// The poller must not poll the same cache again until it receives the
/// signal (or sees the channel close).
pub struct PollFinished {
    tx: oneshot::Sender<PollId>,
}

impl PollFinished {
    /// Create a completion handle and the receiver the poller waits on.
    pub fn channel() -> (Self, PollDone) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Notify the poller. Returns `false` if the poller is no longer listening.
    pub fn signal(self, poll_id: PollId) -> bool {
        self.tx.send(poll_id).is_ok()
    }
}

impl fmt::Debug for PollFinished {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollFinished")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

/// A result as it travels from a poller to the stat history manager.
#[derive(Debug)]
pub struct PollResult {
    pub result: StatResult,
    pub finished: PollFinished,
}

impl PollResult {
    /// Wrap a result with a fresh completion handle.
    pub fn new(result: StatResult) -> (Self, PollDone) {
        let (finished, done) = PollFinished::channel();
        (Self { result, finished }, done)
    }
}

//! The stat history manager: batches incoming poll results and folds them
//! into the published stores.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use statwatch_types::{CrStates, MonitorConfig};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tracing::{debug, error, info, warn};

use crate::aggregate::{Aggregator, BandwidthAggregator};
use crate::error::{ErrorCounter, ManagerError};
use crate::processor::BatchProcessor;
use crate::reader::StatHistory;
use crate::result::PollResult;
use crate::snapshot::SnapshotStore;
use crate::vitals::{ByteCounterVitals, VitalsCalculator};

/// Default upper bound on how long queued results wait before a flush.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(200);

/// Channels and stores the manager consumes once started.
#[derive(Debug)]
pub struct StatInputs {
    /// Poll results, one per completed poll.
    pub results: mpsc::Receiver<PollResult>,
    /// Fires once the first monitor config has been loaded. Dropping the
    /// sender stops the manager with [`ManagerError::NotReady`].
    pub ready: oneshot::Receiver<()>,
    /// Fires when the set of known caches may have changed.
    pub caches_changed: mpsc::Receiver<()>,
    /// Local health states used to compute the eligible cache set.
    pub local_states: SnapshotStore<CrStates>,
}

/// What the batcher does next while a batch is open.
#[derive(Debug)]
pub(crate) enum Step {
    CachesChanged,
    Overdue,
    Result(PollResult),
    Drained,
}

/// Pick the next step, in priority order: a topology change, an expired
/// flush timer, a queued result, and otherwise "nothing queued".
///
/// Never waits: if none of the first three is ready, returns
/// [`Step::Drained`].
pub(crate) async fn next_step(
    results: &mut mpsc::Receiver<PollResult>,
    caches_changed: &mut mpsc::Receiver<()>,
    flush_timer: Pin<&mut Sleep>,
) -> Step {
    tokio::select! {
        biased;
        Some(()) = caches_changed.recv() => Step::CachesChanged,
        () = flush_timer => Step::Overdue,
        Some(result) = results.recv() => Step::Result(result),
        () = std::future::ready(()) => Step::Drained,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Owns the single writer for every stat store.
///
/// Build one with [`StatHistoryManager::builder`], hand out
/// [`StatHistory`] read handles, then either drive it with
/// [`start`](Self::start) or feed batches directly with
/// [`process`](Self::process).
///
/// # Example
///
/// ```rust,no_run
/// use statwatch::{PollResult, StatHistoryManager, StatInputs, StatResult};
/// use statwatch::SnapshotStore;
/// use tokio::sync::{mpsc, oneshot};
///
/// #[tokio::main]
/// async fn main() {
///     let (results_tx, results) = mpsc::channel(1024);
///     let (ready_tx, ready) = oneshot::channel();
///     let (_changed_tx, caches_changed) = mpsc::channel(1);
///
///     let manager = StatHistoryManager::builder().build();
///     let (history, task) = manager.start(StatInputs {
///         results,
///         ready,
///         caches_changed,
///         local_states: SnapshotStore::default(),
///     });
///     ready_tx.send(()).unwrap();
///
///     let (result, done) = PollResult::new(StatResult::new("edge1", 1));
///     results_tx.send(result).await.unwrap();
///     done.await.unwrap();
///
///     assert!(history.last_results().contains_key("edge1"));
///     drop(results_tx);
///     task.await.unwrap().unwrap();
/// }
/// ```
pub struct StatHistoryManager {
    processor: BatchProcessor,
    flush_interval: Duration,
}

impl StatHistoryManager {
    /// Create a builder for configuring the manager.
    pub fn builder() -> StatHistoryManagerBuilder {
        StatHistoryManagerBuilder::new()
    }

    /// A read handle onto the stores this manager writes.
    pub fn history(&self) -> StatHistory {
        self.processor.history().clone()
    }

    /// How long queued results may wait before a forced flush.
    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }

    /// Fold one batch synchronously, bypassing the batcher.
    ///
    /// A panic while processing is caught and logged; the batch is dropped
    /// and the manager stays usable.
    pub fn process(&mut self, batch: Vec<PollResult>) {
        let count = batch.len();
        let processor = &mut self.processor;
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| processor.process(batch))) {
            error!(
                results = count,
                panic = panic_message(payload.as_ref()),
                "batch processing panicked, batch dropped"
            );
        }
    }

    /// Spawn the batcher on the current tokio runtime.
    pub fn start(
        self,
        inputs: StatInputs,
    ) -> (StatHistory, JoinHandle<Result<(), ManagerError>>) {
        let history = self.history();
        let task = tokio::spawn(self.run(inputs));
        (history, task)
    }

    /// Run the batcher until the results channel closes.
    ///
    /// Waits for `ready` before consuming anything. Results that arrive
    /// while a batch is open join it until either the queue is momentarily
    /// empty or the flush interval has elapsed since the batch opened.
    pub async fn run(mut self, inputs: StatInputs) -> Result<(), ManagerError> {
        let StatInputs {
            mut results,
            ready,
            mut caches_changed,
            local_states,
        } = inputs;

        if ready.await.is_err() {
            error!("monitor config never became ready, stat history manager not started");
            return Err(ManagerError::NotReady);
        }
        self.processor.recompute_unpolled(&local_states.get());
        info!(flush_interval = ?self.flush_interval, "stat history manager started");

        loop {
            let first = tokio::select! {
                biased;
                Some(()) = caches_changed.recv() => {
                    self.processor.recompute_unpolled(&local_states.get());
                    continue;
                }
                result = results.recv() => match result {
                    Some(result) => result,
                    None => break,
                },
            };

            let mut batch = vec![first];
            let flush_timer = tokio::time::sleep(self.flush_interval);
            tokio::pin!(flush_timer);

            loop {
                match next_step(&mut results, &mut caches_changed, flush_timer.as_mut()).await {
                    Step::CachesChanged => {
                        self.processor.recompute_unpolled(&local_states.get());
                    }
                    Step::Overdue => {
                        warn!(
                            queued = batch.len(),
                            "flushing queued results, poll results are arriving faster than they are processed"
                        );
                        break;
                    }
                    Step::Result(result) => batch.push(result),
                    Step::Drained => break,
                }
            }

            debug!(results = batch.len(), "processing batch");
            self.process(batch);
        }

        info!("poll result stream closed, stat history manager stopped");
        Ok(())
    }
}

impl fmt::Debug for StatHistoryManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatHistoryManager")
            .field("flush_interval", &self.flush_interval)
            .finish_non_exhaustive()
    }
}

/// Builder for [`StatHistoryManager`].
#[derive(Default)]
pub struct StatHistoryManagerBuilder {
    flush_interval: Option<Duration>,
    vitals: Option<Arc<dyn VitalsCalculator>>,
    aggregator: Option<Arc<dyn Aggregator>>,
    errors: Option<ErrorCounter>,
    monitor_config: Option<SnapshotStore<MonitorConfig>>,
    combined_states: Option<SnapshotStore<CrStates>>,
}

impl StatHistoryManagerBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the longest time queued results may wait before a flush.
    ///
    /// Defaults to [`DEFAULT_FLUSH_INTERVAL`].
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = Some(interval);
        self
    }

    /// Set the vitals calculator. Defaults to [`ByteCounterVitals`].
    pub fn vitals(mut self, vitals: impl VitalsCalculator + 'static) -> Self {
        self.vitals = Some(Arc::new(vitals));
        self
    }

    /// Set the delivery-service aggregator. Defaults to [`BandwidthAggregator`].
    pub fn aggregator(mut self, aggregator: impl Aggregator + 'static) -> Self {
        self.aggregator = Some(Arc::new(aggregator));
        self
    }

    /// Share an error counter with other components.
    pub fn error_count(mut self, errors: ErrorCounter) -> Self {
        self.errors = Some(errors);
        self
    }

    /// The store the manager reads the monitor config from.
    pub fn monitor_config(mut self, store: SnapshotStore<MonitorConfig>) -> Self {
        self.monitor_config = Some(store);
        self
    }

    /// The store the manager reads combined availability from.
    pub fn combined_states(mut self, store: SnapshotStore<CrStates>) -> Self {
        self.combined_states = Some(store);
        self
    }

    /// Build the manager.
    pub fn build(self) -> StatHistoryManager {
        let history = StatHistory::new(self.errors.unwrap_or_default());
        let processor = BatchProcessor::new(
            history,
            self.monitor_config.unwrap_or_default(),
            self.combined_states.unwrap_or_default(),
            self.vitals.unwrap_or_else(|| Arc::new(ByteCounterVitals)),
            self.aggregator
                .unwrap_or_else(|| Arc::new(BandwidthAggregator)),
        );
        StatHistoryManager {
            processor,
            flush_interval: self.flush_interval.unwrap_or(DEFAULT_FLUSH_INTERVAL),
        }
    }
}

impl fmt::Debug for StatHistoryManagerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatHistoryManagerBuilder")
            .field("flush_interval", &self.flush_interval)
            .field("custom_vitals", &self.vitals.is_some())
            .field("custom_aggregator", &self.aggregator.is_some())
            .finish_non_exhaustive()
    }
}

//! Bounded log of availability change events.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use statwatch_types::Event;

/// Default number of events kept.
pub const DEFAULT_MAX_EVENTS: usize = 200;

#[derive(Debug, Default)]
struct EventLogInner {
    events: VecDeque<Event>,
    next_index: u64,
}

/// A shared, bounded, append-only event feed.
///
/// Every added event gets an index one greater than the previous one.
/// Once full, the oldest event is dropped. Clones share the same log.
#[derive(Debug, Clone)]
pub struct EventLog {
    inner: Arc<Mutex<EventLogInner>>,
    max_events: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_EVENTS)
    }
}

impl EventLog {
    /// Create a log keeping at most `max_events` events (at least one).
    pub fn new(max_events: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(EventLogInner::default())),
            max_events: max_events.max(1),
        }
    }

    /// Append an event stamped with the current time and return it.
    ///
    /// The `index` and `time` fields of `event` are overwritten.
    pub fn add(&self, mut event: Event) -> Event {
        event.time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        let mut inner = self.inner.lock();
        event.index = inner.next_index;
        inner.next_index += 1;
        inner.events.push_front(event.clone());
        inner.events.truncate(self.max_events);
        event
    }

    /// All retained events, newest first.
    pub fn get(&self) -> Vec<Event> {
        self.inner.lock().events.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().events.is_empty()
    }
}

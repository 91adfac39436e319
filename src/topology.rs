//! Topology file watcher.
//!
//! Polls a JSON topology file for changes, publishes the monitor config and
//! cache health states to the stores the stat history manager reads, and
//! raises the startup and topology-changed signals.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::Deserialize;
use statwatch::{
    CacheName, CrStates, Event, EventLog, IsAvailable, MonitorConfig, Profile, SnapshotStore,
    TrafficServer,
};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// The on-disk topology document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Topology {
    pub profiles: BTreeMap<String, Profile>,
    pub servers: BTreeMap<CacheName, TrafficServer>,
    /// Health of each cache as seen by this monitor.
    pub states: BTreeMap<CacheName, IsAvailable>,
}

impl Topology {
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            servers: self.servers.clone(),
            profiles: self.profiles.clone(),
        }
    }

    pub fn states(&self) -> CrStates {
        CrStates {
            caches: self.states.clone(),
        }
    }
}

/// Stores written by the watcher and read by the stat history manager.
#[derive(Debug, Clone, Default)]
pub struct TopologyStores {
    pub monitor_config: SnapshotStore<MonitorConfig>,
    pub local_states: SnapshotStore<CrStates>,
    /// Availability combined across monitors. Without peers this mirrors
    /// the local states.
    pub combined_states: SnapshotStore<CrStates>,
}

/// Watches a topology file and publishes each new version.
///
/// The watcher tracks the file's modification time and only re-reads it
/// when the file has been updated.
#[derive(Debug)]
pub struct TopologyWatcher {
    path: PathBuf,
    stores: TopologyStores,
    events: EventLog,
    last_modified: Option<SystemTime>,
    last_error: Option<String>,
}

impl TopologyWatcher {
    pub fn new<P: AsRef<Path>>(path: P, stores: TopologyStores, events: EventLog) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            stores,
            events,
            last_modified: None,
            last_error: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The last read or parse error, cleared by a successful load.
    pub fn error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn modified_time(&self) -> Option<SystemTime> {
        fs::metadata(&self.path).ok()?.modified().ok()
    }

    fn read_file(&mut self) -> Option<Topology> {
        match fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(topology) => {
                    self.last_error = None;
                    Some(topology)
                }
                Err(e) => {
                    self.set_error(format!("Parse error: {}", e));
                    None
                }
            },
            Err(e) => {
                self.set_error(format!("Read error: {}", e));
                None
            }
        }
    }

    fn set_error(&mut self, error: String) {
        if self.last_error.as_deref() != Some(error.as_str()) {
            warn!(path = %self.path.display(), error = %error, "topology not loaded");
        }
        self.last_error = Some(error);
    }

    /// Read the file if it changed since the last successful load.
    pub fn poll(&mut self) -> Option<Topology> {
        let current_modified = self.modified_time();

        let file_changed = match (&self.last_modified, &current_modified) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(last), Some(current)) => current > last,
        };
        if !file_changed {
            return None;
        }

        let topology = self.read_file()?;
        self.last_modified = current_modified;
        Some(topology)
    }

    /// Publish a topology and log an event for every cache whose
    /// availability changed since the previous version.
    pub fn apply(&self, topology: &Topology) {
        let config = topology.monitor_config();
        let states = topology.states();
        let previous = self.stores.combined_states.get();

        for (cache, state) in &states.caches {
            let Some(before) = previous.caches.get(cache) else {
                continue;
            };
            if before.is_available == state.is_available {
                continue;
            }
            let server = config.servers.get(cache);
            let status = server.map(|s| s.status).unwrap_or_default();
            let event = self.events.add(Event {
                index: 0,
                time: 0,
                description: format!(
                    "{status:?} - {}",
                    if state.is_available { "available" } else { "unavailable" }
                ),
                name: cache.to_string(),
                hostname: server.map(|s| s.host_name.clone()).unwrap_or_default(),
                event_type: server.map(|s| s.profile.clone()).unwrap_or_default(),
                is_available: state.is_available,
            });
            info!(cache = %cache, available = event.is_available, index = event.index, "availability changed");
        }

        info!(
            caches = config.servers.len(),
            profiles = config.profiles.len(),
            "topology published"
        );
        self.stores.monitor_config.set(config);
        self.stores.local_states.set(states.clone());
        self.stores.combined_states.set(states);
    }

    /// Poll every `interval` until the change signal's receiver is gone.
    ///
    /// The first successful load fires `ready`; later loads send a
    /// coalesced, non-blocking change signal.
    pub async fn run(
        mut self,
        interval: Duration,
        ready: oneshot::Sender<()>,
        changed: mpsc::Sender<()>,
    ) {
        let mut ready = Some(ready);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let Some(topology) = self.poll() else {
                continue;
            };
            self.apply(&topology);

            if let Some(ready) = ready.take() {
                if ready.send(()).is_err() {
                    debug!("stat history manager gone before topology became ready");
                }
                continue;
            }
            match changed.try_send(()) {
                Ok(()) => debug!("topology change signalled"),
                Err(TrySendError::Full(())) => debug!("topology change already pending"),
                Err(TrySendError::Closed(())) => break,
            }
        }
        info!("topology watcher stopped");
    }
}

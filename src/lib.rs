//! # statwatchd
//!
//! A daemon around the [`statwatch`] ingestion core.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                          statwatchd                           │
//! │  ┌──────────┐  PollResult  ┌────────────────────┐             │
//! │  │   feed   │─────────────▶│ StatHistoryManager │──▶ stores   │
//! │  │  (TCP)   │◀─────────────│  (single writer)   │      │      │
//! │  └──────────┘  completion  └─────────▲──────────┘      │      │
//! │                                      │ ready/changed   ▼      │
//! │  ┌──────────┐  config, states        │          ┌──────────┐  │
//! │  │ topology │────────────────────────┘          │ reporter │  │
//! │  │ watcher  │                                   └──────────┘  │
//! │  └──────────┘                                                 │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`feed`]**: newline-delimited JSON poll reports, one poller task per cache
//! - **[`topology`]**: polls the topology file and publishes config and health states
//! - **[`reporter`]**: periodic summary log line
//! - **[`settings`]**: file and environment configuration
//!
//! ## Usage
//!
//! ```bash
//! statwatchd --config statwatch.toml
//!
//! # Send a poll report
//! echo '{"cache":"edge1","stats":{"bytes_out":1024}}' | nc localhost 6789
//! ```

pub mod duration;
pub mod feed;
pub mod reporter;
pub mod settings;
pub mod topology;

use std::sync::Arc;

use anyhow::{Context, Result};
use statwatch::{EventLog, StatHistoryManager, StatInputs};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tracing::info;

pub use feed::{precompute, Dispatch, Feed, PollReport};
pub use reporter::Summary;
pub use settings::Settings;
pub use topology::{Topology, TopologyStores, TopologyWatcher};

/// Run the daemon until ctrl-c, the feed listener failing, or the manager
/// stopping.
pub async fn run(settings: Settings) -> Result<()> {
    let stores = TopologyStores::default();
    let monitor_config = stores.monitor_config.clone();
    let events = EventLog::new(settings.events.max_events);

    let manager = StatHistoryManager::builder()
        .flush_interval(settings.stats.flush_interval)
        .monitor_config(stores.monitor_config.clone())
        .combined_states(stores.combined_states.clone())
        .build();

    let (results_tx, results) = mpsc::channel(settings.stats.result_buffer.max(1));
    let (ready_tx, ready) = oneshot::channel();
    let (changed_tx, caches_changed) = mpsc::channel(1);

    let (history, mut manager_task) = manager.start(StatInputs {
        results,
        ready,
        caches_changed,
        local_states: stores.local_states.clone(),
    });

    let watcher = TopologyWatcher::new(&settings.topology.path, stores, events.clone());
    let watcher_task = tokio::spawn(watcher.run(
        settings.topology.reload_interval,
        ready_tx,
        changed_tx,
    ));
    let reporter_task = tokio::spawn(reporter::run(
        history.clone(),
        events.clone(),
        settings.report.interval,
    ));

    let listener = TcpListener::bind(&settings.feed.listen)
        .await
        .with_context(|| format!("binding feed listener on {}", settings.feed.listen))?;
    info!(listen = %settings.feed.listen, "accepting poll reports");
    let feed = Arc::new(Feed::new(
        results_tx,
        settings.feed.queue_depth,
        monitor_config,
    ));

    let outcome = tokio::select! {
        res = feed::serve(listener, feed) => res.context("feed listener failed"),
        res = &mut manager_task => match res {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e).context("stat history manager stopped"),
            Err(e) => Err(e).context("stat history manager task failed"),
        },
        res = tokio::signal::ctrl_c() => {
            info!("shutting down");
            res.context("waiting for ctrl-c")
        }
    };

    watcher_task.abort();
    reporter_task.abort();
    reporter::report(&history, &events);
    outcome
}

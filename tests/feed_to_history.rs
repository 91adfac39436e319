use std::io::{Cursor, Write};
use std::time::Duration;

use statwatch::{EventLog, StatHistory, StatHistoryManager, StatInputs};
use statwatchd::{Feed, TopologyStores, TopologyWatcher};
use tempfile::NamedTempFile;
use tokio::sync::{mpsc, oneshot};

const TOPOLOGY: &str = r#"{
    "profiles": { "EDGE": { "history_count": 3 } },
    "servers": {
        "edge1": { "profile": "EDGE", "status": "REPORTED", "delivery_services": ["video"] },
        "edge2": { "profile": "EDGE", "status": "REPORTED", "delivery_services": ["video"] },
        "edge3": { "profile": "EDGE", "status": "ONLINE" }
    },
    "states": {
        "edge1": { "is_available": true },
        "edge2": { "is_available": false },
        "edge3": { "is_available": true }
    }
}"#;

fn report(cache: &str, bytes: u64) -> String {
    format!(
        r#"{{"cache":"{cache}","stats":{{"bytes_out":{bytes},"max_kbps":40000,"ds.video.bytes_out":{bytes}}}}}"#
    )
}

async fn wait_for(history: &StatHistory, what: &str, done: impl Fn(&StatHistory) -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !done(history) {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn reports_flow_from_feed_into_history() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", TOPOLOGY).unwrap();

    let stores = TopologyStores::default();
    let monitor_config = stores.monitor_config.clone();
    let manager = StatHistoryManager::builder()
        .flush_interval(Duration::from_millis(20))
        .monitor_config(stores.monitor_config.clone())
        .combined_states(stores.combined_states.clone())
        .build();

    let (results_tx, results) = mpsc::channel(64);
    let (ready_tx, ready) = oneshot::channel();
    let (changed_tx, caches_changed) = mpsc::channel(1);
    let (history, task) = manager.start(StatInputs {
        results,
        ready,
        caches_changed,
        local_states: stores.local_states.clone(),
    });

    let watcher = TopologyWatcher::new(file.path(), stores, EventLog::default());
    let watcher_task = tokio::spawn(watcher.run(Duration::from_millis(10), ready_tx, changed_tx));

    // Only caches that are neither ONLINE nor OFFLINE are expected to report.
    wait_for(&history, "unpolled caches", |h| h.unpolled_caches().len() == 2).await;
    assert!(!history.unpolled_caches().contains("edge3"));

    let feed = Feed::new(results_tx, 8, monitor_config);
    let mut lines = String::new();
    for i in 1..=5u64 {
        lines.push_str(&report("edge1", i * 1_000));
        lines.push('\n');
        lines.push_str(&report("edge2", i * 2_000));
        lines.push('\n');
    }
    let accepted = feed.read_reports(Cursor::new(lines), "test").await.unwrap();
    assert_eq!(accepted, 10);

    wait_for(&history, "all reports", |h| {
        h.last_results()
            .get("edge1")
            .is_some_and(|r| r.precomputed.out_bytes == 5_000)
            && h.last_results()
                .get("edge2")
                .is_some_and(|r| r.precomputed.out_bytes == 10_000)
    })
    .await;

    let results = history.result_history();
    assert_eq!(results.get("edge1").unwrap().len(), 3);
    assert_eq!(results.get("edge2").unwrap().len(), 3);
    assert_eq!(history.max_kbps()["edge1"], 40_000);
    assert!(history.unpolled_caches().is_empty());

    let video = history.ds_stats().get("video").cloned().unwrap();
    assert_eq!(video.out_bytes, 15_000);
    assert_eq!(video.caches_reporting, 2);
    assert_eq!(video.caches_available, 1);
    assert_eq!(history.error_count(), 0);

    drop(feed);
    watcher_task.abort();
    assert_eq!(task.await.unwrap(), Ok(()));
}

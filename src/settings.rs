//! Daemon settings.
//!
//! Loaded from an optional TOML (or JSON/YAML) file, then overridden by
//! `STATWATCH_`-prefixed environment variables, e.g.
//! `STATWATCH_FEED__LISTEN=0.0.0.0:6789`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use statwatch::{DEFAULT_FLUSH_INTERVAL, DEFAULT_MAX_EVENTS};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub stats: StatsSettings,
    pub feed: FeedSettings,
    pub topology: TopologySettings,
    pub report: ReportSettings,
    pub events: EventSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StatsSettings {
    /// Longest time queued results wait before a flush.
    #[serde(deserialize_with = "crate::duration::deserialize")]
    pub flush_interval: Duration,
    /// Capacity of the channel between pollers and the manager.
    pub result_buffer: usize,
}

impl Default for StatsSettings {
    fn default() -> Self {
        Self {
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            result_buffer: 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedSettings {
    /// Address the poll report feed listens on.
    pub listen: String,
    /// Reports queued per cache while its previous poll is in flight.
    pub queue_depth: usize,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:6789".to_string(),
            queue_depth: 16,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TopologySettings {
    pub path: PathBuf,
    #[serde(deserialize_with = "crate::duration::deserialize")]
    pub reload_interval: Duration,
}

impl Default for TopologySettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("topology.json"),
            reload_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    #[serde(deserialize_with = "crate::duration::deserialize")]
    pub interval: Duration,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EventSettings {
    pub max_events: usize,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            max_events: DEFAULT_MAX_EVENTS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from `path` (if given) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        builder
            .add_source(
                Environment::with_prefix("STATWATCH")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("reading settings")?
            .try_deserialize()
            .context("invalid settings")
    }
}

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::Parser;
use statwatchd::Settings;
use tracing::Level;

#[derive(Parser, Debug)]
#[command(name = "statwatchd")]
#[command(about = "Batches CDN cache poll results into queryable stat history")]
struct Args {
    /// Path to a settings file (TOML, JSON or YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the settings file
    #[arg(short, long)]
    log_level: Option<String>,

    /// Address to accept poll reports on; overrides the settings file
    #[arg(long)]
    listen: Option<String>,

    /// Topology file to watch; overrides the settings file
    #[arg(short, long)]
    topology: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(level) = args.log_level {
        settings.log.level = level;
    }
    if let Some(listen) = args.listen {
        settings.feed.listen = listen;
    }
    if let Some(topology) = args.topology {
        settings.topology.path = topology;
    }

    let level: Level = settings
        .log
        .level
        .parse()
        .map_err(|e| anyhow!("invalid log level {:?}: {}", settings.log.level, e))?;
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    statwatchd::run(settings).await
}

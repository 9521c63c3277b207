//! One full rotation over the configured sources, printing what would be sent.
//! Stores are in-memory, so nothing under `state_dir` is touched.
//!
//! `cargo run --bin dry_run -- [subscriber-id ...]`

use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use job_radar::app::source_entries;
use job_radar::notify::LogTransport;
use job_radar::store::{DedupStore, SubscriberId, SubscriberRegistry};
use job_radar::{Radar, RadarConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("job_radar=info,warn"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(true).try_init();

    let cfg = RadarConfig::load_default()?;
    let mut subscribers: Vec<SubscriberId> = std::env::args().skip(1).map(SubscriberId::new).collect();
    if subscribers.is_empty() {
        subscribers.push(SubscriberId::new("dry-run"));
    }

    let radar = Radar::assemble(
        &cfg,
        source_entries(&cfg)?,
        Arc::new(DedupStore::in_memory()),
        Arc::new(SubscriberRegistry::in_memory(subscribers)),
        Arc::new(LogTransport),
    )?;

    for _ in 0..radar.engine.source_count() {
        let report = radar.engine.tick().await;
        println!("{}", serde_json::to_string(&report)?);
    }

    println!("dry-run done");
    Ok(())
}

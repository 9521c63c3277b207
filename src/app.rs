// src/app.rs
//! Startup wiring: the source table is resolved once from configuration.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::{self, AppState};
use crate::config::RadarConfig;
use crate::engine::{Engine, SourceEntry};
use crate::ingest::providers::{build_fetcher, http_client};
use crate::ingest::scheduler::spawn_scheduler;
use crate::notify::{Fanout, Transport};
use crate::store::{DedupStore, SubscriberRegistry, DEDUP_FILE, SUBSCRIBERS_FILE};

pub struct Radar {
    pub engine: Arc<Engine>,
    pub registry: Arc<SubscriberRegistry>,
    period: Duration,
}

/// One `SourceEntry` per configured source, all sharing one HTTP client.
pub fn source_entries(cfg: &RadarConfig) -> Result<Vec<SourceEntry>> {
    let client = http_client()?;
    Ok(cfg
        .sources
        .iter()
        .map(|s| {
            SourceEntry::new(s.id.as_str(), build_fetcher(s.kind, &s.url, client.clone()), s.undated_policy())
                .with_timeout(s.timeout())
        })
        .collect())
}

impl Radar {
    /// Build from configuration with stores persisted under `state_dir`.
    pub async fn from_config(cfg: &RadarConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let dedup = Arc::new(DedupStore::open(cfg.state_dir.join(DEDUP_FILE)).await);
        let registry = Arc::new(SubscriberRegistry::open(cfg.state_dir.join(SUBSCRIBERS_FILE)).await);
        Self::assemble(cfg, source_entries(cfg)?, dedup, registry, transport)
    }

    pub fn assemble(
        cfg: &RadarConfig,
        sources: Vec<SourceEntry>,
        dedup: Arc<DedupStore>,
        registry: Arc<SubscriberRegistry>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let fanout = Fanout::new(transport).with_config(cfg.fanout_config());
        let engine = Engine::new(sources, dedup, registry.clone(), fanout)?
            .with_recency(cfg.recency_classifier())
            .with_roles(cfg.role_matcher()?)
            .with_retention(cfg.retention_policy());

        Ok(Self {
            engine: Arc::new(engine),
            registry,
            period: cfg.rotation_period(),
        })
    }

    pub fn router(&self) -> Router {
        api::router(AppState {
            engine: self.engine.clone(),
            registry: self.registry.clone(),
        })
    }

    pub fn spawn_scheduler(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        spawn_scheduler(self.engine.clone(), self.period, shutdown)
    }
}

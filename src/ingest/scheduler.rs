// src/ingest/scheduler.rs
//! Round-robin source rotation and the periodic tick loop.
//!
//! One tick checks exactly one source, ticks never overlap, and a failing
//! (or panicking) tick does not stop the loop.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use metrics::gauge;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::engine::Engine;
use crate::ingest::types::SourceId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceCursor {
    pub source: SourceId,
    pub last_checked_at: Option<DateTime<Utc>>,
}

/// Fixed cyclic order over the configured sources.
#[derive(Debug, Clone)]
pub struct SourceRotator {
    cursors: Vec<SourceCursor>,
    next: usize,
}

impl SourceRotator {
    /// The source list is static configuration: empty or duplicate ids are rejected here.
    pub fn new(sources: Vec<SourceId>) -> Result<Self> {
        if sources.is_empty() {
            bail!("at least one source must be configured");
        }
        let mut seen = HashSet::new();
        for s in &sources {
            if !seen.insert(s) {
                bail!("duplicate source id '{s}'");
            }
        }
        Ok(Self {
            cursors: sources
                .into_iter()
                .map(|source| SourceCursor {
                    source,
                    last_checked_at: None,
                })
                .collect(),
            next: 0,
        })
    }

    /// Index of the source whose turn it is; advances (and wraps) the cursor.
    pub fn next_index(&mut self) -> usize {
        let idx = self.next;
        self.next = (self.next + 1) % self.cursors.len();
        idx
    }

    pub fn next_source(&mut self) -> SourceId {
        let idx = self.next_index();
        self.cursors[idx].source.clone()
    }

    pub fn mark_checked(&mut self, idx: usize, at: DateTime<Utc>) {
        if let Some(c) = self.cursors.get_mut(idx) {
            c.last_checked_at = Some(at);
        }
    }

    pub fn cursors(&self) -> &[SourceCursor] {
        &self.cursors
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }
}

/// Spawn the rotation loop: one `engine.tick()` per `period`.
///
/// Cancellation is observed between ticks only, so an in-flight tick always
/// completes; the dedup store is flushed once more on the way out.
pub fn spawn_scheduler(engine: Arc<Engine>, period: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(target: "ingest", period_secs = period.as_secs(), sources = engine.source_count(), "scheduler started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let eng = engine.clone();
            match tokio::spawn(async move { eng.tick().await }).await {
                Ok(report) => {
                    gauge!("radar_last_tick_ts").set(Utc::now().timestamp() as f64);
                    tracing::info!(
                        target: "ingest",
                        source = %report.source,
                        fetched = report.fetched,
                        admitted = report.admitted,
                        duplicates = report.duplicates,
                        sent = report.delivery.messages_sent,
                        failed = report.error.is_some(),
                        "rotation tick"
                    );
                }
                Err(e) => {
                    tracing::error!(target: "ingest", error = %e, "rotation tick aborted");
                }
            }
        }

        if let Err(e) = engine.dedup().flush().await {
            tracing::error!(target: "store", error = %e, "final dedup flush failed");
        }
        tracing::info!(target: "ingest", "scheduler stopped");
    })
}

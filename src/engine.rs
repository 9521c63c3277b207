//! # Aggregation Engine
//! One tick = one source: fetch → screen → dedup gate → fan-out → prune.
//!
//! The dedup store is the only place that decides whether a posting is new;
//! everything after `admit` only sees postings that passed it exactly once.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use serde::Serialize;

use crate::error::FetchError;
use crate::ingest::recency::{RecencyClassifier, UndatedPolicy};
use crate::ingest::roles::RoleMatcher;
use crate::ingest::scheduler::{SourceCursor, SourceRotator};
use crate::ingest::types::{Fetcher, Posting, SourceId};
use crate::ingest::{ensure_metrics_described, screen};
use crate::notify::{DeliveryReport, Fanout};
use crate::store::{DedupStore, RetentionPolicy, SubscriberDirectory};

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(20);

/// A configured source and how to read it.
#[derive(Clone)]
pub struct SourceEntry {
    pub id: SourceId,
    pub fetcher: Arc<dyn Fetcher>,
    pub undated: UndatedPolicy,
    pub timeout: Duration,
}

impl SourceEntry {
    pub fn new(id: impl Into<SourceId>, fetcher: Arc<dyn Fetcher>, undated: UndatedPolicy) -> Self {
        Self {
            id: id.into(),
            fetcher,
            undated,
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "source", rename_all = "snake_case")]
pub enum RotatorState {
    Idle,
    Checking(SourceId),
}

/// What happened during one tick.
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub source: SourceId,
    pub fetched: usize,
    pub malformed: usize,
    pub stale: usize,
    pub off_role: usize,
    pub duplicates: usize,
    pub admitted: usize,
    pub delivery: DeliveryReport,
    pub dedup_pruned: usize,
    /// Set when the fetch failed or timed out; the tick then admits nothing.
    pub error: Option<String>,
}

impl TickReport {
    fn empty(source: SourceId) -> Self {
        Self {
            source,
            fetched: 0,
            malformed: 0,
            stale: 0,
            off_role: 0,
            duplicates: 0,
            admitted: 0,
            delivery: DeliveryReport::default(),
            dedup_pruned: 0,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub state: RotatorState,
    pub sources: Vec<SourceCursor>,
    pub dedup_records: usize,
    pub subscribers: usize,
    pub recency_window_days: i64,
    pub role_keywords: usize,
}

struct Rotation {
    rotator: SourceRotator,
    state: RotatorState,
}

pub struct Engine {
    sources: Vec<SourceEntry>,
    rotation: Mutex<Rotation>,
    recency: RecencyClassifier,
    roles: RoleMatcher,
    retention: RetentionPolicy,
    dedup: Arc<DedupStore>,
    directory: Arc<dyn SubscriberDirectory>,
    fanout: Fanout,
    tick_lock: tokio::sync::Mutex<()>,
}

impl Engine {
    pub fn new(
        sources: Vec<SourceEntry>,
        dedup: Arc<DedupStore>,
        directory: Arc<dyn SubscriberDirectory>,
        fanout: Fanout,
    ) -> Result<Self> {
        ensure_metrics_described();
        let rotator = SourceRotator::new(sources.iter().map(|s| s.id.clone()).collect())?;
        Ok(Self {
            sources,
            rotation: Mutex::new(Rotation {
                rotator,
                state: RotatorState::Idle,
            }),
            recency: RecencyClassifier::default(),
            roles: RoleMatcher::default(),
            retention: RetentionPolicy::default(),
            dedup,
            directory,
            fanout,
            tick_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn with_recency(mut self, recency: RecencyClassifier) -> Self {
        self.recency = recency;
        self
    }

    pub fn with_roles(mut self, roles: RoleMatcher) -> Self {
        self.roles = roles;
        self
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    pub fn dedup(&self) -> &Arc<DedupStore> {
        &self.dedup
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn status(&self) -> EngineStatus {
        let (state, sources) = {
            let r = self.rotation.lock().unwrap_or_else(PoisonError::into_inner);
            (r.state.clone(), r.rotator.cursors().to_vec())
        };
        EngineStatus {
            state,
            sources,
            dedup_records: self.dedup.len(),
            subscribers: self.directory.list().len(),
            recency_window_days: self.recency.window().num_days(),
            role_keywords: self.roles.keywords().len(),
        }
    }

    /// Check the next source in rotation. Concurrent callers queue up; at
    /// most one tick runs at a time.
    pub async fn tick(&self) -> TickReport {
        let _serial = self.tick_lock.lock().await;

        let idx = {
            let mut r = self.rotation.lock().unwrap_or_else(PoisonError::into_inner);
            let idx = r.rotator.next_index();
            r.state = RotatorState::Checking(self.sources[idx].id.clone());
            idx
        };
        let _idle = BackToIdle(self);

        let report = self.check_source(&self.sources[idx], Utc::now()).await;

        self.rotation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .rotator
            .mark_checked(idx, Utc::now());
        report
    }

    async fn check_source(&self, entry: &SourceEntry, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::empty(entry.id.clone());

        let raw = match tokio::time::timeout(entry.timeout, entry.fetcher.fetch(&entry.id)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => return self.source_failed(report, entry, e),
            Err(_) => return self.source_failed(report, entry, FetchError::Timeout(entry.timeout)),
        };
        report.fetched = raw.len();
        counter!("radar_postings_fetched_total", "source" => entry.id.to_string()).increment(raw.len() as u64);

        let screened = screen(&entry.id, raw, &self.recency, entry.undated, &self.roles, now);
        report.malformed = screened.malformed;
        report.stale = screened.stale;
        report.off_role = screened.off_role;
        counter!("radar_postings_stale_total").increment(screened.stale as u64);
        counter!("radar_postings_off_role_total").increment(screened.off_role as u64);

        let mut admitted: Vec<Posting> = Vec::with_capacity(screened.kept.len());
        for p in screened.kept {
            if self.dedup.admit_at(&p.identity_key, now) {
                tracing::debug!(target: "ingest", source = %entry.id, posting = %p.short_id(), "admitted");
                admitted.push(p);
            } else {
                report.duplicates += 1;
            }
        }
        report.admitted = admitted.len();
        counter!("radar_postings_duplicate_total").increment(report.duplicates as u64);
        counter!("radar_postings_admitted_total").increment(admitted.len() as u64);

        if !admitted.is_empty() {
            // Persist before sending: a crash mid-delivery must not resend on restart.
            if let Err(e) = self.dedup.flush().await {
                tracing::error!(target: "store", error = %e, "dedup flush failed");
            }
            let snapshot = self.directory.list();
            report.delivery = self.fanout.deliver(&admitted, &snapshot, &*self.directory).await;
        }

        report.dedup_pruned = self.dedup.prune_keeping_fresh(self.retention, now, self.recency.window());
        if report.dedup_pruned > 0 {
            if let Err(e) = self.dedup.flush().await {
                tracing::error!(target: "store", error = %e, "dedup flush after prune failed");
            }
        }
        gauge!("radar_dedup_records").set(self.dedup.len() as f64);

        tracing::debug!(
            target: "ingest",
            source = %entry.id,
            fetcher = entry.fetcher.name(),
            fetched = report.fetched,
            stale = report.stale,
            off_role = report.off_role,
            duplicates = report.duplicates,
            admitted = report.admitted,
            "source checked"
        );
        report
    }

    fn source_failed(&self, mut report: TickReport, entry: &SourceEntry, e: FetchError) -> TickReport {
        tracing::warn!(target: "ingest", source = %entry.id, fetcher = entry.fetcher.name(), error = %e, "source check failed");
        counter!("radar_source_errors_total", "source" => entry.id.to_string()).increment(1);
        report.error = Some(e.to_string());
        report
    }
}

/// Resets the rotator state even if the tick unwinds.
struct BackToIdle<'a>(&'a Engine);

impl Drop for BackToIdle<'_> {
    fn drop(&mut self) {
        self.0
            .rotation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state = RotatorState::Idle;
    }
}

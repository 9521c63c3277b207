// src/store/dedup.rs
//! Durable set of posting identities already admitted for delivery.
//!
//! `admit` is the single gate in front of the fan-out: a key passes it at
//! most once for as long as its record is retained.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::store::persist::{load_json_or_default, write_json_atomic};

pub const DEFAULT_MAX_RECORDS: usize = 5_000;
pub const DEFAULT_RETENTION_DAYS: i64 = 30;
/// Upper bound accepted from configuration.
pub const MAX_RETENTION_DAYS: i64 = 73_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupRecord {
    pub identity_key: String,
    pub first_seen_at: DateTime<Utc>,
}

/// How much history to keep. Both limits apply; the tighter one wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_records: usize,
    pub retention: ChronoDuration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_records: DEFAULT_MAX_RECORDS,
            retention: ChronoDuration::days(DEFAULT_RETENTION_DAYS),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DedupFile {
    records: Vec<DedupRecord>,
}

#[derive(Debug)]
pub struct DedupStore {
    records: Mutex<HashMap<String, DateTime<Utc>>>,
    path: Option<PathBuf>,
    // serializes flushes so an older snapshot never overwrites a newer one
    flush_lock: tokio::sync::Mutex<()>,
}

impl DedupStore {
    /// Volatile store, for tests and dry runs.
    pub fn in_memory() -> Self {
        Self::with_records(HashMap::new(), None)
    }

    /// Load from `path`; missing or corrupt files start an empty store.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file: DedupFile = load_json_or_default(&path).await;
        let records = file
            .records
            .into_iter()
            .map(|r| (r.identity_key, r.first_seen_at))
            .collect::<HashMap<_, _>>();
        tracing::info!(target: "store", path = %path.display(), records = records.len(), "dedup store loaded");
        Self::with_records(records, Some(path))
    }

    fn with_records(records: HashMap<String, DateTime<Utc>>, path: Option<PathBuf>) -> Self {
        Self {
            records: Mutex::new(records),
            path,
            flush_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, DateTime<Utc>>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Atomic check-and-insert. `true` iff the key was new (and is now recorded).
    pub fn admit(&self, identity_key: &str) -> bool {
        self.admit_at(identity_key, Utc::now())
    }

    pub fn admit_at(&self, identity_key: &str, now: DateTime<Utc>) -> bool {
        let mut records = self.lock();
        if records.contains_key(identity_key) {
            return false;
        }
        records.insert(identity_key.to_string(), now);
        true
    }

    pub fn contains(&self, identity_key: &str) -> bool {
        self.lock().contains_key(identity_key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot, oldest first.
    pub fn records(&self) -> Vec<DedupRecord> {
        let mut out: Vec<DedupRecord> = self
            .lock()
            .iter()
            .map(|(k, ts)| DedupRecord {
                identity_key: k.clone(),
                first_seen_at: *ts,
            })
            .collect();
        out.sort_by(|a, b| {
            a.first_seen_at
                .cmp(&b.first_seen_at)
                .then_with(|| a.identity_key.cmp(&b.identity_key))
        });
        out
    }

    pub fn prune(&self, policy: RetentionPolicy) -> usize {
        self.prune_at(policy, Utc::now())
    }

    /// Drop records older than the retention period, then the oldest ones
    /// beyond `max_records`. Returns how many were removed.
    pub fn prune_at(&self, policy: RetentionPolicy, now: DateTime<Utc>) -> usize {
        self.prune_keeping_fresh(policy, now, ChronoDuration::zero())
    }

    /// Like [`prune_at`](Self::prune_at), but the size cap never evicts a
    /// record first seen within `fresh` of `now` (records admitted at `now`
    /// included). Such a posting can still pass the recency screen, so losing
    /// its record would let it through the gate again. The store may stay
    /// above `max_records` until those records age out.
    pub fn prune_keeping_fresh(&self, policy: RetentionPolicy, now: DateTime<Utc>, fresh: ChronoDuration) -> usize {
        let mut records = self.lock();
        let before = records.len();

        // An out-of-range horizon means nothing is old enough to drop.
        if let Some(horizon) = now.checked_sub_signed(policy.retention) {
            records.retain(|_, first_seen| *first_seen >= horizon);
        }

        if records.len() > policy.max_records {
            let keep_since = now.checked_sub_signed(fresh.max(ChronoDuration::zero()));
            let mut evictable: Vec<(DateTime<Utc>, String)> = records
                .iter()
                .filter(|(_, ts)| keep_since.is_some_and(|since| **ts < since))
                .map(|(k, ts)| (*ts, k.clone()))
                .collect();
            evictable.sort();
            let excess = records.len() - policy.max_records;
            for (_, key) in evictable.into_iter().take(excess) {
                records.remove(&key);
            }
        }

        before - records.len()
    }

    /// Persist the current set. No-op for in-memory stores.
    pub async fn flush(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let _guard = self.flush_lock.lock().await;
        let file = DedupFile {
            records: self.records(),
        };
        write_json_atomic(path, &file).await?;
        tracing::debug!(target: "store", records = file.records.len(), "dedup store flushed");
        Ok(())
    }
}

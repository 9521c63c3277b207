// src/store/subscribers.rs
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::store::persist::{load_json_or_default, write_json_atomic};

/// Opaque chat identifier (numeric chat id or `@channel` name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(String);

impl SubscriberId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubscriberId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<i64> for SubscriberId {
    fn from(chat_id: i64) -> Self {
        Self(chat_id.to_string())
    }
}

/// What the engine may do with subscribers: read a snapshot and prune.
/// Adding subscribers belongs to the command front end.
#[async_trait::async_trait]
pub trait SubscriberDirectory: Send + Sync {
    fn list(&self) -> Vec<SubscriberId>;

    /// Remove and persist. Returns whether the subscriber was present.
    async fn remove(&self, id: &SubscriberId) -> bool;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SubscribersFile {
    subscribers: Vec<SubscriberId>,
}

#[derive(Debug)]
pub struct SubscriberRegistry {
    inner: RwLock<BTreeSet<SubscriberId>>,
    path: Option<PathBuf>,
    flush_lock: tokio::sync::Mutex<()>,
}

impl SubscriberRegistry {
    pub fn in_memory<I: IntoIterator<Item = SubscriberId>>(initial: I) -> Self {
        Self::with_set(initial.into_iter().collect(), None)
    }

    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file: SubscribersFile = load_json_or_default(&path).await;
        let set: BTreeSet<SubscriberId> = file.subscribers.into_iter().collect();
        tracing::info!(target: "store", path = %path.display(), subscribers = set.len(), "subscriber registry loaded");
        Self::with_set(set, Some(path))
    }

    fn with_set(set: BTreeSet<SubscriberId>, path: Option<PathBuf>) -> Self {
        Self {
            inner: RwLock::new(set),
            path,
            flush_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Front-end operation. Returns `false` if already subscribed.
    pub fn add(&self, id: SubscriberId) -> bool {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id)
    }

    /// Remove without persisting. Returns whether it was present.
    pub fn discard(&self, id: &SubscriberId) -> bool {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    pub fn contains(&self, id: &SubscriberId) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }

    pub fn snapshot(&self) -> Vec<SubscriberId> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub async fn flush(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let _guard = self.flush_lock.lock().await;
        let file = SubscribersFile {
            subscribers: self.snapshot(),
        };
        write_json_atomic(path, &file).await
    }
}

#[async_trait::async_trait]
impl SubscriberDirectory for SubscriberRegistry {
    fn list(&self) -> Vec<SubscriberId> {
        self.snapshot()
    }

    async fn remove(&self, id: &SubscriberId) -> bool {
        let removed = self.discard(id);
        if removed {
            if let Err(e) = self.flush().await {
                tracing::warn!(target: "store", subscriber = %id, error = %e, "persisting registry after removal failed");
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_remove_snapshot() {
        let r = SubscriberRegistry::in_memory([SubscriberId::from(1_i64)]);
        assert!(r.add("@jobs".into()));
        assert!(!r.add("@jobs".into()));
        assert_eq!(r.len(), 2);
        assert!(r.discard(&SubscriberId::from(1_i64)));
        assert_eq!(r.snapshot(), vec![SubscriberId::from("@jobs")]);
    }

    #[tokio::test]
    async fn removal_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subscribers.json");

        let r = SubscriberRegistry::open(&path).await;
        r.add("100".into());
        r.add("200".into());
        r.flush().await.unwrap();

        assert!(SubscriberDirectory::remove(&r, &"100".into()).await);
        assert!(!SubscriberDirectory::remove(&r, &"100".into()).await);

        let reopened = SubscriberRegistry::open(&path).await;
        assert_eq!(reopened.list(), vec![SubscriberId::from("200")]);
    }
}

// src/store/mod.rs
//! Shared mutable state: the dedup store and the subscriber registry.
//! Each owns its own lock and its own state file.

pub mod dedup;
mod persist;
pub mod subscribers;

pub use dedup::{DedupRecord, DedupStore, RetentionPolicy};
pub use subscribers::{SubscriberDirectory, SubscriberId, SubscriberRegistry};

pub const DEDUP_FILE: &str = "seen_postings.json";
pub const SUBSCRIBERS_FILE: &str = "subscribers.json";

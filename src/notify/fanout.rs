// src/notify/fanout.rs
//! Delivery fan-out: batch new postings, send them to every subscriber in the
//! snapshot, pace sends, prune subscribers that are gone for good.
//!
//! Subscribers are served one after another through a single pacer, so the
//! inter-message delay bounds the aggregate send rate. A failure for one
//! subscriber only affects that subscriber:
//! - permanent: remaining batches for them are skipped and they are pruned
//! - transient: that one batch is lost (the postings are already admitted)

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde::Serialize;
use tokio::time::Instant;

use crate::error::DeliveryError;
use crate::ingest::types::Posting;
use crate::notify::{format_batches, Transport};
use crate::store::{SubscriberDirectory, SubscriberId};

pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_INTER_MESSAGE_DELAY: Duration = Duration::from_millis(1_100);
pub const DEFAULT_MAX_RETRY_AFTER: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanoutConfig {
    pub batch_size: usize,
    pub inter_message_delay: Duration,
    /// Ceiling on a rate-limit backoff requested by the transport.
    pub max_retry_after: Duration,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            inter_message_delay: DEFAULT_INTER_MESSAGE_DELAY,
            max_retry_after: DEFAULT_MAX_RETRY_AFTER,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub messages_sent: usize,
    pub transient_failures: usize,
    pub pruned: Vec<SubscriberId>,
}

/// Minimum spacing between consecutive sends, stretched when the transport
/// reports a rate limit (up to `max_backoff`).
struct Pacer {
    delay: Duration,
    max_backoff: Duration,
    next_at: Option<Instant>,
}

impl Pacer {
    fn new(delay: Duration, max_backoff: Duration) -> Self {
        Self {
            delay,
            max_backoff,
            next_at: None,
        }
    }

    async fn wait(&self) {
        if let Some(at) = self.next_at {
            tokio::time::sleep_until(at).await;
        }
    }

    fn mark_sent(&mut self, backoff: Option<Duration>) {
        let gap = backoff.map_or(self.delay, |b| b.min(self.max_backoff).max(self.delay));
        self.next_at = Some(Instant::now() + gap);
    }
}

#[derive(Clone)]
pub struct Fanout {
    transport: Arc<dyn Transport>,
    cfg: FanoutConfig,
}

impl Fanout {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            cfg: FanoutConfig::default(),
        }
    }

    pub fn with_config(mut self, cfg: FanoutConfig) -> Self {
        self.cfg = cfg;
        self
    }

    pub fn config(&self) -> FanoutConfig {
        self.cfg
    }

    /// Deliver `postings` (in order) to every subscriber in `subscribers`.
    ///
    /// Each posting reaches each subscriber at most once per call; batches keep
    /// arrival order. Permanently failing subscribers are removed via `directory`.
    pub async fn deliver(
        &self,
        postings: &[Posting],
        subscribers: &[SubscriberId],
        directory: &dyn SubscriberDirectory,
    ) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        let mut seen_keys = HashSet::new();
        let unique: Vec<Posting> = postings
            .iter()
            .filter(|p| seen_keys.insert(p.identity_key.as_str()))
            .cloned()
            .collect();
        if unique.is_empty() || subscribers.is_empty() {
            return report;
        }

        let messages = format_batches(&unique, self.cfg.batch_size);
        let parts = messages.len();

        let mut pacer = Pacer::new(self.cfg.inter_message_delay, self.cfg.max_retry_after);
        let mut served = HashSet::new();

        for subscriber in subscribers {
            if !served.insert(subscriber) {
                continue;
            }

            for (i, text) in messages.iter().enumerate() {
                pacer.wait().await;
                let result = self.transport.send(subscriber, text).await;
                let backoff = result.as_ref().err().and_then(DeliveryError::retry_after);
                if let Some(requested) = backoff.filter(|b| *b > self.cfg.max_retry_after) {
                    tracing::warn!(
                        target: "delivery",
                        subscriber = %subscriber,
                        requested_secs = requested.as_secs(),
                        capped_secs = self.cfg.max_retry_after.as_secs(),
                        "rate-limit backoff capped"
                    );
                }
                pacer.mark_sent(backoff);

                match result {
                    Ok(()) => {
                        report.messages_sent += 1;
                        counter!("radar_messages_sent_total").increment(1);
                    }
                    Err(DeliveryError::Permanent(reason)) => {
                        tracing::warn!(
                            target: "delivery",
                            subscriber = %subscriber,
                            transport = self.transport.name(),
                            %reason,
                            "subscriber unreachable, pruning"
                        );
                        if directory.remove(subscriber).await {
                            counter!("radar_subscribers_pruned_total").increment(1);
                            report.pruned.push(subscriber.clone());
                        }
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(
                            target: "delivery",
                            subscriber = %subscriber,
                            transport = self.transport.name(),
                            batch = i + 1,
                            batches = parts,
                            error = %e,
                            "batch not delivered"
                        );
                        counter!("radar_delivery_transient_total").increment(1);
                        report.transient_failures += 1;
                    }
                }
            }
        }

        tracing::info!(
            target: "delivery",
            postings = unique.len(),
            batches = parts,
            subscribers = served.len(),
            sent = report.messages_sent,
            transient = report.transient_failures,
            pruned = report.pruned.len(),
            "fan-out finished"
        );
        report
    }
}

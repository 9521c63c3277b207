// src/error.rs
//! Error taxonomy for the engine.
//!
//! None of these are fatal: fetch errors cost one tick, delivery errors are
//! classified into prune/ignore, store errors are logged and retried on the
//! next flush. Startup configuration errors go through `anyhow` instead.

use std::time::Duration;

use thiserror::Error;

/// One source check failed (network, upstream status, body parsing, timeout).
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned status {0}")]
    Status(u16),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),
}

impl FetchError {
    pub fn parse(message: impl std::fmt::Display) -> Self {
        Self::Parse(message.to_string())
    }
}

/// A single `send` to one subscriber failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// Subscriber is unreachable for good (blocked the bot, chat deleted).
    #[error("permanent delivery failure: {0}")]
    Permanent(String),

    /// Network trouble, timeouts, rate limiting. The batch is lost, the subscriber stays.
    #[error("transient delivery failure: {reason}")]
    Transient {
        reason: String,
        retry_after: Option<Duration>,
    },
}

impl DeliveryError {
    pub fn permanent(reason: impl Into<String>) -> Self {
        Self::Permanent(reason.into())
    }

    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient {
            reason: reason.into(),
            retry_after: None,
        }
    }

    pub fn rate_limited(reason: impl Into<String>, retry_after: Duration) -> Self {
        Self::Transient {
            reason: reason.into(),
            retry_after: Some(retry_after),
        }
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }

    /// How long the transport asked us to back off, if it did.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Transient { retry_after, .. } => *retry_after,
            Self::Permanent(_) => None,
        }
    }
}

/// Persisting a store to disk failed.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// src/ingest/types.rs
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::FetchError;
use crate::ingest::normalize::{clean_text, identity_key, sanitize_for_delivery};

/// Identifier of a configured job source, e.g. "alpha" or "remotive".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A candidate posting exactly as a fetcher saw it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPosting {
    pub title: String,
    pub url: String,
    pub date_text: Option<String>, // "3 days ago", "2025-04-10", ...
    pub company: Option<String>,
    pub location: Option<String>,
}

impl RawPosting {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_date(mut self, text: impl Into<String>) -> Self {
        self.date_text = Some(text.into());
        self
    }

    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// A normalized posting, alive for one tick. Only `identity_key` is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub title: String,
    pub display_title: String,
    pub url: String,
    pub source_id: SourceId,
    pub posted_date_text: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub identity_key: String,
}

impl Posting {
    pub fn from_raw(source: &SourceId, raw: RawPosting) -> Self {
        let display_title = sanitize_for_delivery(&clean_text(&raw.title));
        let url = raw.url.trim().to_string();
        let identity_key = identity_key(&raw.title, &url);
        let optional = |v: Option<String>| {
            v.map(|s| sanitize_for_delivery(&clean_text(&s)))
                .filter(|s| !s.is_empty())
        };

        Self {
            display_title,
            identity_key,
            posted_date_text: raw
                .date_text
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            company: optional(raw.company),
            location: optional(raw.location),
            source_id: source.clone(),
            title: raw.title,
            url,
        }
    }

    /// Short stable id for logs, so raw titles never end up in log lines.
    pub fn short_id(&self) -> String {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(self.identity_key.as_bytes());
        let mut out = String::with_capacity(12);
        for b in digest.iter().take(6) {
            use std::fmt::Write as _;
            let _ = write!(&mut out, "{:02x}", b);
        }
        out
    }
}

/// Capability to pull raw postings for one source.
///
/// Implementations are registered per source at startup; the engine wraps
/// every call in a timeout, so fetchers need not enforce one themselves.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, source: &SourceId) -> Result<Vec<RawPosting>, FetchError>;
    fn name(&self) -> &'static str;
}

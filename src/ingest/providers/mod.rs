// src/ingest/providers/mod.rs
//! Concrete fetchers, selected once at startup by `SourceKind`.

pub mod json_feed;
pub mod rss;

use std::sync::Arc;

use metrics::histogram;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::FetchError;
use crate::ingest::types::Fetcher;

pub use json_feed::JsonFeedFetcher;
pub use rss::RssFetcher;

const USER_AGENT: &str = concat!("job-radar/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// RSS 2.0 job feed.
    Rss,
    /// Hosted job API returning JSON.
    Json,
}

/// One HTTP client shared by every fetcher (connection pooling).
pub fn http_client() -> anyhow::Result<Client> {
    Ok(Client::builder().user_agent(USER_AGENT).build()?)
}

pub fn build_fetcher(kind: SourceKind, url: &str, client: Client) -> Arc<dyn Fetcher> {
    match kind {
        SourceKind::Rss => Arc::new(RssFetcher::from_url(url, client)),
        SourceKind::Json => Arc::new(JsonFeedFetcher::from_url(url, client)),
    }
}

/// GET `url` and return the body, mapping non-2xx to `FetchError::Status`.
pub(crate) async fn fetch_body(client: &Client, url: &str) -> Result<String, FetchError> {
    let t0 = std::time::Instant::now();
    let rsp = client.get(url).send().await?;
    let status = rsp.status();
    if !status.is_success() {
        return Err(FetchError::Status(status.as_u16()));
    }
    let body = rsp.text().await?;
    histogram!("radar_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    Ok(body)
}

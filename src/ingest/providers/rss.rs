// src/ingest/providers/rss.rs
use async_trait::async_trait;
use quick_xml::de::from_str;
use reqwest::Client;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

use crate::error::FetchError;
use crate::ingest::providers::fetch_body;
use crate::ingest::types::{Fetcher, RawPosting, SourceId};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    company: Option<String>,
    location: Option<String>,
}

/// RFC 2822 `pubDate` to an ISO calendar date; other text passes through as is.
fn pub_date_text(raw: &str) -> String {
    OffsetDateTime::parse(raw.trim(), &Rfc2822)
        .map(|dt| dt.to_offset(UtcOffset::UTC).date().to_string())
        .unwrap_or_else(|_| raw.trim().to_string())
}

/// Job feed in RSS 2.0 format.
pub struct RssFetcher {
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: Client },
}

impl RssFetcher {
    pub fn from_fixture(s: &str) -> Self {
        Self {
            mode: Mode::Fixture(s.to_string()),
        }
    }

    pub fn from_url(url: impl Into<String>, client: Client) -> Self {
        Self {
            mode: Mode::Http {
                url: url.into(),
                client,
            },
        }
    }

    pub fn parse_items_from_str(s: &str) -> Result<Vec<RawPosting>, FetchError> {
        let xml_clean = scrub_html_entities_for_xml(s);
        let rss: Rss = from_str(&xml_clean).map_err(|e| FetchError::parse(format!("rss xml: {e}")))?;

        let mut out = Vec::with_capacity(rss.channel.item.len());
        for it in rss.channel.item {
            let (Some(title), Some(link)) = (it.title, it.link) else {
                continue;
            };
            if title.trim().is_empty() || link.trim().is_empty() {
                continue;
            }
            out.push(RawPosting {
                title,
                url: link.trim().to_string(),
                date_text: it.pub_date.as_deref().map(pub_date_text),
                company: it.company,
                location: it.location,
            });
        }
        Ok(out)
    }
}

#[async_trait]
impl Fetcher for RssFetcher {
    async fn fetch(&self, _source: &SourceId) -> Result<Vec<RawPosting>, FetchError> {
        match &self.mode {
            Mode::Fixture(s) => Self::parse_items_from_str(s),
            Mode::Http { url, client } => {
                let body = fetch_body(client, url).await?;
                Self::parse_items_from_str(&body)
            }
        }
    }

    fn name(&self) -> &'static str {
        "rss"
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

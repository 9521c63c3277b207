// src/ingest/providers/json_feed.rs
//! Hosted job-search API returning JSON.
//!
//! Accepts a bare array of jobs or an object wrapping it under `jobs`,
//! `results` or `data`, with the common field spellings of public job APIs.

use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use serde_json::{Map, Value};

use crate::error::FetchError;
use crate::ingest::providers::fetch_body;
use crate::ingest::types::{Fetcher, RawPosting, SourceId};

const LIST_KEYS: &[&str] = &["jobs", "results", "data"];
const URL_KEYS: &[&str] = &["url", "link", "job_url", "apply_url"];
const DATE_KEYS: &[&str] = &[
    "date",
    "created_at",
    "publication_date",
    "posted",
    "posted_at",
    "date_posted",
];
const COMPANY_KEYS: &[&str] = &["company", "company_name"];
const LOCATION_KEYS: &[&str] = &["location", "candidate_required_location"];

/// The job list: the body itself, or the first array under a known key.
fn job_list(body: Value) -> Option<Vec<Value>> {
    match body {
        Value::Array(jobs) => Some(jobs),
        Value::Object(mut obj) => LIST_KEYS.iter().find_map(|k| match obj.remove(*k) {
            Some(Value::Array(jobs)) => Some(jobs),
            _ => None,
        }),
        _ => None,
    }
}

/// First of `keys` present with a non-null value. APIs often send several
/// spellings of one field at once.
fn first_of<'a>(job: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| job.get(*k).filter(|v| !v.is_null()))
}

fn first_str(job: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| job.get(*k).and_then(Value::as_str))
        .map(str::to_string)
}

/// `None` for anything that is not a job with a title and a url.
fn job_posting(job: &Value) -> Option<RawPosting> {
    let job = job.as_object()?;
    let title = first_str(job, &["title"]).filter(|t| !t.trim().is_empty())?;
    let url = first_str(job, URL_KEYS)
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())?;
    Some(RawPosting {
        title,
        url,
        date_text: first_of(job, DATE_KEYS).and_then(date_text),
        company: first_str(job, COMPANY_KEYS),
        location: first_str(job, LOCATION_KEYS),
    })
}

/// Strings pass through; unix timestamps (seconds or millis) become ISO dates.
fn date_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => {
            let ts = n.as_i64()?;
            let secs = if ts > 100_000_000_000 { ts / 1_000 } else { ts };
            DateTime::from_timestamp(secs, 0).map(|dt| dt.format("%Y-%m-%d").to_string())
        }
        _ => None,
    }
}

pub struct JsonFeedFetcher {
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: Client },
}

impl JsonFeedFetcher {
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

    /// Parse a feed body. Individual jobs that are malformed are skipped; a
    /// body with no job list at all is a parse error.
    pub fn parse_items_from_str(s: &str) -> Result<Vec<RawPosting>, FetchError> {
        let body: Value = serde_json::from_str(s).map_err(|e| FetchError::parse(format!("job feed json: {e}")))?;
        let jobs = job_list(body).ok_or_else(|| FetchError::parse("job feed json: no job list in body"))?;

        let total = jobs.len();
        let items: Vec<RawPosting> = jobs.iter().filter_map(job_posting).collect();
        if items.len() < total {
            tracing::debug!(target: "ingest", skipped = total - items.len(), "json feed jobs without title or url");
        }
        Ok(items)
    }
}

#[async_trait]
impl Fetcher for JsonFeedFetcher {
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
        "json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_array_with_aliases() {
        let s = r#"[
            {"title": "Junior Developer", "url": "https://x/1", "created_at": "3 days ago",
             "company": "Acme", "location": "India"},
            {"title": "Data Analyst", "link": "https://x/2", "publication_date": "2025-04-10T08:00:00"},
            {"title": "", "url": "https://x/3"},
            {"title": "No url"}
        ]"#;
        let items = JsonFeedFetcher::parse_items_from_str(s).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].date_text.as_deref(), Some("3 days ago"));
        assert_eq!(items[0].company.as_deref(), Some("Acme"));
        assert_eq!(items[1].url, "https://x/2");
        assert_eq!(items[1].date_text.as_deref(), Some("2025-04-10T08:00:00"));
    }

    #[test]
    fn wrapped_object_and_numeric_dates() {
        let s = r#"{"results": [
            {"title": "Security Engineer", "job_url": "https://x/9", "posted_at": 1744272000},
            {"title": "Tester", "url": "https://x/10", "date": 1744272000000}
        ]}"#;
        let items = JsonFeedFetcher::parse_items_from_str(s).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].date_text.as_deref(), Some("2025-04-10"));
        assert_eq!(items[1].date_text.as_deref(), Some("2025-04-10"));
    }

    #[test]
    fn repeated_field_spellings_take_the_first() {
        let s = r#"{"data": [
            {"title": "Junior Dev", "url": "https://x/1", "apply_url": "https://x/1/apply",
             "created_at": "2025-04-15", "publication_date": "2025-04-01",
             "company": null, "company_name": "Acme"},
            {"title": 42, "url": "https://x/2"},
            "not a job",
            {"title": "QA Intern", "link": "https://x/3", "date": null, "posted_at": 1744272000}
        ]}"#;
        let items = JsonFeedFetcher::parse_items_from_str(s).unwrap();
        assert_eq!(items.len(), 2, "malformed jobs are skipped, the feed survives");
        assert_eq!(items[0].url, "https://x/1");
        assert_eq!(items[0].date_text.as_deref(), Some("2025-04-15"));
        assert_eq!(items[0].company.as_deref(), Some("Acme"));
        assert_eq!(items[1].url, "https://x/3");
        assert_eq!(items[1].date_text.as_deref(), Some("2025-04-10"));
    }

    #[test]
    fn not_a_feed_is_parse_error() {
        let err = JsonFeedFetcher::parse_items_from_str(r#"{"error": "rate limited"}"#).unwrap_err();
        assert!(matches!(err, FetchError::Parse(_)));

        assert!(matches!(
            JsonFeedFetcher::parse_items_from_str(r#"{"jobs": "none"}"#),
            Err(FetchError::Parse(_))
        ));
        assert!(matches!(
            JsonFeedFetcher::parse_items_from_str("<html>"),
            Err(FetchError::Parse(_))
        ));
    }
}

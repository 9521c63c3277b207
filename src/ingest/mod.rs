// src/ingest/mod.rs
pub mod normalize;
pub mod providers;
pub mod recency;
pub mod roles;
pub mod scheduler;
pub mod types;

use chrono::{DateTime, Utc};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;

use crate::ingest::recency::{RecencyClassifier, UndatedPolicy};
use crate::ingest::roles::RoleMatcher;
use crate::ingest::types::{Posting, RawPosting, SourceId};

pub use normalize::{clean_text, identity_key, normalize_title, sanitize_for_delivery};

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("radar_postings_fetched_total", "Raw postings returned by fetchers.");
        describe_counter!("radar_postings_stale_total", "Postings rejected as outside the recency window.");
        describe_counter!("radar_postings_off_role_total", "Postings rejected by the role matcher.");
        describe_counter!("radar_postings_duplicate_total", "Postings already seen by the dedup store.");
        describe_counter!("radar_postings_admitted_total", "Postings admitted for delivery.");
        describe_counter!("radar_source_errors_total", "Source checks that failed or timed out.");
        describe_counter!("radar_messages_sent_total", "Messages delivered to subscribers.");
        describe_counter!("radar_delivery_transient_total", "Batches lost to transient delivery failures.");
        describe_counter!("radar_subscribers_pruned_total", "Subscribers removed after permanent failures.");
        describe_gauge!("radar_dedup_records", "Records currently held by the dedup store.");
        describe_gauge!("radar_last_tick_ts", "Unix ts of the last rotation tick.");
        describe_histogram!("radar_fetch_ms", "Source fetch time in milliseconds.");
    });
}

/// Outcome of screening one fetch: postings that passed, in fetch order, and
/// how many were dropped at each filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Screened {
    pub kept: Vec<Posting>,
    pub malformed: usize,
    pub stale: usize,
    pub off_role: usize,
}

/// Normalize raw postings, then apply the recency and role filters.
pub fn screen(
    source: &SourceId,
    raw: Vec<RawPosting>,
    recency: &RecencyClassifier,
    undated: UndatedPolicy,
    roles: &RoleMatcher,
    now: DateTime<Utc>,
) -> Screened {
    let mut out = Screened {
        kept: Vec::with_capacity(raw.len()),
        ..Screened::default()
    };

    for r in raw {
        let p = Posting::from_raw(source, r);
        if p.display_title.is_empty() || p.url.is_empty() {
            out.malformed += 1;
            continue;
        }
        if !recency.is_fresh(p.posted_date_text.as_deref(), undated, now) {
            out.stale += 1;
            continue;
        }
        if !roles.matches(&p.display_title) {
            out.off_role += 1;
            continue;
        }
        out.kept.push(p);
    }
    out
}

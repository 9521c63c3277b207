// src/notify/mod.rs
pub mod fanout;
pub mod telegram;

use crate::error::DeliveryError;
use crate::ingest::types::Posting;
use crate::store::SubscriberId;

pub use fanout::{DeliveryReport, Fanout, FanoutConfig};

/// Sends one formatted message to one subscriber.
///
/// Implementations classify failures: `Permanent` means the subscriber can
/// never be reached again, everything else is `Transient`.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, to: &SubscriberId, text: &str) -> Result<(), DeliveryError>;
    fn name(&self) -> &'static str;
}

/// Transport that only logs, for dry runs.
#[derive(Debug, Default, Clone)]
pub struct LogTransport;

#[async_trait::async_trait]
impl Transport for LogTransport {
    async fn send(&self, to: &SubscriberId, text: &str) -> Result<(), DeliveryError> {
        tracing::info!(target: "delivery", subscriber = %to, chars = text.chars().count(), "dry-run message\n{text}");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Longest message the chat API accepts, in UTF-16 code units.
pub const MAX_MESSAGE_LEN: usize = 4096;

/// Longest rendered link. Title, company and location are already capped at
/// normalization, so one posting always fits in a message.
const URL_DISPLAY_MAX: usize = 1_000;

/// Room kept for the header, including the widest plausible part counter.
const HEADER_RESERVE: usize = 64;

const HEADER: &str = "🆕 <b>New job postings</b>";

/// Message length as the chat API counts it.
pub fn message_len(text: &str) -> usize {
    text.encode_utf16().count()
}

/// Render one batch as a chat message (HTML parse mode).
/// `part` is 1-based; the counter is shown only for multi-part deliveries.
pub fn format_batch(postings: &[Posting], part: usize, parts: usize) -> String {
    let mut out = header(part, parts);
    for p in postings {
        out.push_str(&render_posting(p));
    }
    out
}

/// Split `postings` into messages of at most `batch_size` postings each, and
/// never longer than [`MAX_MESSAGE_LEN`]. Order is kept.
pub fn format_batches(postings: &[Posting], batch_size: usize) -> Vec<String> {
    let batch_size = batch_size.max(1);
    let budget = MAX_MESSAGE_LEN - HEADER_RESERVE;

    let mut groups: Vec<Vec<String>> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_len = 0;
    for p in postings {
        let block = render_posting(p);
        let len = message_len(&block);
        if !current.is_empty() && (current.len() == batch_size || current_len + len > budget) {
            groups.push(std::mem::take(&mut current));
            current_len = 0;
        }
        current_len += len;
        current.push(block);
    }
    if !current.is_empty() {
        groups.push(current);
    }

    let parts = groups.len();
    groups
        .into_iter()
        .enumerate()
        .map(|(i, blocks)| {
            let mut out = header(i + 1, parts);
            out.extend(blocks);
            out
        })
        .collect()
}

fn header(part: usize, parts: usize) -> String {
    let mut out = String::from(HEADER);
    if parts > 1 {
        out.push_str(&format!(" ({part}/{parts})"));
    }
    out
}

fn render_posting(p: &Posting) -> String {
    let mut out = String::from("\n\n📌 <b>");
    out.push_str(&p.display_title);
    out.push_str("</b>");
    if let Some(company) = &p.company {
        out.push_str("\n🏢 ");
        out.push_str(company);
    }
    if let Some(location) = &p.location {
        out.push_str("\n📍 ");
        out.push_str(location);
    }
    out.push_str("\n🔗 ");
    out.push_str(&escape_url(&p.url, URL_DISPLAY_MAX));
    out
}

/// HTML-escape `url`, cutting it short with an ellipsis once the escaped form
/// would exceed `max` code units. Entities are never split.
fn escape_url(url: &str, max: usize) -> String {
    let escaped = html_escape::encode_text(url);
    if message_len(&escaped) <= max {
        return escaped.into_owned();
    }
    let mut out = String::new();
    let mut len = 0;
    let mut buf = [0u8; 4];
    for c in url.chars() {
        let piece = html_escape::encode_text(c.encode_utf8(&mut buf));
        let piece_len = message_len(&piece);
        if len + piece_len + 1 > max {
            break;
        }
        len += piece_len;
        out.push_str(&piece);
    }
    out.push('…');
    out
}

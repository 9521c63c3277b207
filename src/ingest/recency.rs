// src/ingest/recency.rs
//! Recency classification of free-form posting dates.
//!
//! Parsing precedence (first match wins):
//! 1. relative phrases: "today", "yesterday", "N minutes|hours|days|weeks|months ago"
//! 2. numeric dates: ISO `2025-04-10` first, then day-first `10/04/2025`, `10.04.2025`,
//!    `10-04-2025`, then month-first `04/25/2025` when day-first is not a valid date
//! 3. month-name dates: "April 10, 2025", "Apr 10", "10 April 2025", "Wed, 02 Oct 2025"
//! 4. anything else is unparsable
//!
//! Absent and unparsable dates are resolved by the per-source [`UndatedPolicy`].

use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const DEFAULT_WINDOW_DAYS: i64 = 7;

// ages beyond this are "very old" anyway; keeps Duration math away from overflow
pub const MAX_AGE_DAYS: i64 = 36_500;

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// What to do with a posting whose date is missing or unreadable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndatedPolicy {
    /// Source only ever lists recent results upstream.
    AssumeFresh,
    /// No upstream guarantee: reject.
    AssumeStale,
}

impl UndatedPolicy {
    pub fn from_trust_flag(trust_absent_date: bool) -> Self {
        if trust_absent_date {
            Self::AssumeFresh
        } else {
            Self::AssumeStale
        }
    }

    fn is_fresh(self) -> bool {
        matches!(self, Self::AssumeFresh)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RecencyClassifier {
    window: ChronoDuration,
}

impl Default for RecencyClassifier {
    fn default() -> Self {
        Self::from_days(DEFAULT_WINDOW_DAYS)
    }
}

impl RecencyClassifier {
    pub fn new(window: ChronoDuration) -> Self {
        Self { window }
    }

    pub fn from_days(days: i64) -> Self {
        Self::new(ChronoDuration::days(days.clamp(0, MAX_AGE_DAYS)))
    }

    pub fn window(&self) -> ChronoDuration {
        self.window
    }

    /// Fresh iff the parsed age is within the window (inclusive).
    /// Enlarging the window never turns a fresh posting stale.
    pub fn is_fresh(&self, date_text: Option<&str>, policy: UndatedPolicy, now: DateTime<Utc>) -> bool {
        let Some(text) = date_text.map(str::trim).filter(|t| !t.is_empty()) else {
            tracing::debug!(target: "ingest", ?policy, "no date text, applying source policy");
            return policy.is_fresh();
        };

        match parse_age(text, now) {
            Some(age) => age <= self.window,
            None => {
                tracing::debug!(target: "ingest", date_text = text, ?policy, "unparsable date, applying source policy");
                policy.is_fresh()
            }
        }
    }
}

/// Age of a posting given its date text, or `None` when nothing recognizable is in it.
/// Dates in the future count as age zero.
pub fn parse_age(text: &str, now: DateTime<Utc>) -> Option<ChronoDuration> {
    let t = text.trim().to_lowercase();
    if t.is_empty() {
        return None;
    }

    if let Some(age) = parse_relative(&t) {
        return Some(age);
    }

    let date = parse_numeric_date(&t).or_else(|| parse_month_name_date(&t, now.date_naive()))?;
    let days = (now.date_naive() - date).num_days().clamp(0, MAX_AGE_DAYS);
    Some(ChronoDuration::days(days))
}

fn parse_relative(t: &str) -> Option<ChronoDuration> {
    if ["just now", "just posted", "moments ago", "today"]
        .iter()
        .any(|p| t.contains(p))
    {
        return Some(ChronoDuration::zero());
    }
    if t.contains("yesterday") {
        return Some(ChronoDuration::days(1));
    }

    static RE_AGO: OnceCell<Regex> = OnceCell::new();
    let re = RE_AGO.get_or_init(|| {
        Regex::new(
            r"\b(\d+|an?|one)\+?\s*(months?|mos?|weeks?|wks?|w|days?|d|hours?|hrs?|h|minutes?|mins?|m)\s+ago\b",
        )
        .unwrap()
    });
    let caps = re.captures(t)?;
    let n: i64 = match &caps[1] {
        "a" | "an" | "one" => 1,
        digits => digits.parse::<i64>().ok()?.min(MAX_AGE_DAYS * 24 * 60),
    };

    let unit = &caps[2];
    let age = if unit.starts_with("mo") {
        ChronoDuration::days((n * 30).min(MAX_AGE_DAYS))
    } else if unit.starts_with('w') {
        ChronoDuration::days((n * 7).min(MAX_AGE_DAYS))
    } else if unit.starts_with('d') {
        ChronoDuration::days(n.min(MAX_AGE_DAYS))
    } else if unit.starts_with('h') {
        ChronoDuration::hours(n.min(MAX_AGE_DAYS * 24))
    } else {
        ChronoDuration::minutes(n)
    };
    Some(age)
}

fn parse_numeric_date(t: &str) -> Option<NaiveDate> {
    static RE_ISO: OnceCell<Regex> = OnceCell::new();
    static RE_DMY: OnceCell<Regex> = OnceCell::new();

    let iso = RE_ISO.get_or_init(|| Regex::new(r"\b(\d{4})[-/.](\d{1,2})[-/.](\d{1,2})").unwrap());
    if let Some(c) = iso.captures(t) {
        if let Some(d) = ymd(&c[1], &c[2], &c[3]) {
            return Some(d);
        }
    }

    let dmy = RE_DMY.get_or_init(|| Regex::new(r"\b(\d{1,2})[-/.](\d{1,2})[-/.](\d{4})\b").unwrap());
    let c = dmy.captures(t)?;
    ymd(&c[3], &c[2], &c[1]).or_else(|| ymd(&c[3], &c[1], &c[2]))
}

fn parse_month_name_date(t: &str, today: NaiveDate) -> Option<NaiveDate> {
    static RE_MDY: OnceCell<Regex> = OnceCell::new();
    static RE_DMY: OnceCell<Regex> = OnceCell::new();

    let mdy = RE_MDY.get_or_init(|| {
        Regex::new(r"\b([a-z]{3,9})\.?\s+(\d{1,2})(?:st|nd|rd|th)?\b,?(?:\s*(\d{4})\b)?").unwrap()
    });
    for c in mdy.captures_iter(t) {
        let year = c.get(3).map(|m| m.as_str());
        if let Some(d) = month_day(&c[1], &c[2], year, today) {
            return Some(d);
        }
    }

    let dmy = RE_DMY.get_or_init(|| {
        Regex::new(r"\b(\d{1,2})(?:st|nd|rd|th)?\s+([a-z]{3,9})\b\.?,?(?:\s*(\d{4})\b)?").unwrap()
    });
    for c in dmy.captures_iter(t) {
        let year = c.get(3).map(|m| m.as_str());
        if let Some(d) = month_day(&c[2], &c[1], year, today) {
            return Some(d);
        }
    }
    None
}

fn month_index(word: &str) -> Option<u32> {
    if word.len() < 3 {
        return None;
    }
    MONTHS
        .iter()
        .position(|m| m.starts_with(word))
        .map(|i| i as u32 + 1)
}

fn month_day(month: &str, day: &str, year: Option<&str>, today: NaiveDate) -> Option<NaiveDate> {
    let m = month_index(month)?;
    let d: u32 = day.parse().ok()?;
    match year {
        Some(y) => NaiveDate::from_ymd_opt(y.parse().ok()?, m, d),
        None => {
            // no year: the most recent such date that is not in the future
            let this_year = NaiveDate::from_ymd_opt(today.year(), m, d);
            match this_year {
                Some(date) if date <= today => Some(date),
                _ => NaiveDate::from_ymd_opt(today.year() - 1, m, d),
            }
        }
    }
}

fn ymd(y: &str, m: &str, d: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(y.parse().ok()?, m.parse().ok()?, d.parse().ok()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 17, 12, 0, 0).unwrap()
    }

    fn days(n: i64) -> Option<ChronoDuration> {
        Some(ChronoDuration::days(n))
    }

    #[test]
    fn relative_phrases() {
        assert_eq!(parse_age("Today", now()), days(0));
        assert_eq!(parse_age("Posted just now", now()), days(0));
        assert_eq!(parse_age("yesterday", now()), days(1));
        assert_eq!(parse_age("3 days ago", now()), days(3));
        assert_eq!(parse_age("Posted 1 day ago", now()), days(1));
        assert_eq!(parse_age("an hour ago", now()), Some(ChronoDuration::hours(1)));
        assert_eq!(parse_age("45 minutes ago", now()), Some(ChronoDuration::minutes(45)));
        assert_eq!(parse_age("2 weeks ago", now()), days(14));
        assert_eq!(parse_age("30+ days ago", now()), days(30));
        assert_eq!(parse_age("5h ago", now()), Some(ChronoDuration::hours(5)));
        assert_eq!(parse_age("2 months ago", now()), days(60));
    }

    #[test]
    fn numeric_dates() {
        assert_eq!(parse_age("2025-04-10", now()), days(7));
        assert_eq!(parse_age("2025-04-10T08:30:00Z", now()), days(7));
        assert_eq!(parse_age("10/04/2025", now()), days(7)); // day-first
        assert_eq!(parse_age("10.04.2025", now()), days(7));
        assert_eq!(parse_age("04/15/2025", now()), days(2)); // month-first fallback
        assert_eq!(parse_age("2025-02-30", now()), None);
    }

    #[test]
    fn month_name_dates() {
        assert_eq!(parse_age("April 10, 2025", now()), days(7));
        assert_eq!(parse_age("Posted on Apr 10 2025", now()), days(7));
        assert_eq!(parse_age("10 April 2025", now()), days(7));
        assert_eq!(parse_age("Wed, 16 Apr 2025 10:00:00 GMT", now()), days(1));
        assert_eq!(parse_age("Apr 16", now()), days(1));
        // no year and later than today: previous year
        assert_eq!(parse_age("Dec 17", now()), days(121));
    }

    #[test]
    fn unparsable_text() {
        assert_eq!(parse_age("recently", now()), None);
        assert_eq!(parse_age("soon", now()), None);
        assert_eq!(parse_age("", now()), None);
    }

    #[test]
    fn future_dates_are_age_zero() {
        assert_eq!(parse_age("2025-05-01", now()), days(0));
    }

    #[test]
    fn window_boundary_is_inclusive() {
        let text = Some("5 days ago");
        let strict = UndatedPolicy::AssumeStale;
        assert!(RecencyClassifier::from_days(5).is_fresh(text, strict, now()));
        assert!(!RecencyClassifier::from_days(4).is_fresh(text, strict, now()));
        assert!(RecencyClassifier::from_days(6).is_fresh(text, strict, now()));
    }

    #[test]
    fn undated_policy_is_explicit() {
        let c = RecencyClassifier::default();
        assert!(c.is_fresh(None, UndatedPolicy::AssumeFresh, now()));
        assert!(!c.is_fresh(None, UndatedPolicy::AssumeStale, now()));
        assert!(c.is_fresh(Some("  "), UndatedPolicy::AssumeFresh, now()));
        assert!(!c.is_fresh(Some("whenever"), UndatedPolicy::AssumeStale, now()));
        assert!(c.is_fresh(Some("whenever"), UndatedPolicy::AssumeFresh, now()));
    }

    #[test]
    fn trust_flag_maps_to_policy() {
        assert_eq!(UndatedPolicy::from_trust_flag(true), UndatedPolicy::AssumeFresh);
        assert_eq!(UndatedPolicy::from_trust_flag(false), UndatedPolicy::AssumeStale);
    }
}

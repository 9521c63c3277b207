// src/ingest/roles.rs
//! Keyword-based role matching.
//!
//! Plain case-insensitive substring test, no stemming or fuzziness: some
//! relevant postings will be missed and the odd irrelevant one let through.

use std::collections::BTreeSet;

/// Entry-level / developer / analyst / tester / security / design roles.
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "junior",
    "entry level",
    "entry-level",
    "fresher",
    "graduate",
    "intern",
    "trainee",
    "developer",
    "engineer",
    "programmer",
    "analyst",
    "tester",
    "qa",
    "security",
    "designer",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleMatcher {
    keywords: Vec<String>,
}

impl Default for RoleMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_KEYWORDS.iter().copied())
    }
}

impl RoleMatcher {
    /// Keywords are trimmed, lowercased and de-duplicated; blanks are dropped.
    /// An empty set admits every title.
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set: BTreeSet<String> = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self {
            keywords: set.into_iter().collect(),
        }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn matches(&self, title: &str) -> bool {
        if self.keywords.is_empty() {
            return true;
        }
        let t = title.to_lowercase();
        self.keywords.iter().any(|k| t.contains(k.as_str()))
    }
}

// src/ingest/normalize.rs
//! Title canonicalization, identity keys and delivery-safe display text.

use once_cell::sync::OnceCell;
use regex::Regex;

/// Characters with structural meaning in chat message markup (Markdown or HTML).
const MARKUP_CHARS: [char; 8] = ['*', '_', '`', '[', ']', '<', '>', '&'];

const DISPLAY_MAX_CHARS: usize = 200;

fn re_ws() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// Decode entities, strip tags, fold fancy quotes and whitespace, cap length.
/// Used on scraped text before anything else looks at it.
pub fn clean_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    out = re_ws().replace_all(&out, " ").trim().to_string();

    if out.chars().count() > DISPLAY_MAX_CHARS {
        out = out.chars().take(DISPLAY_MAX_CHARS).collect();
    }
    out
}

/// Lowercase, drop punctuation, collapse whitespace runs to one space.
///
/// Titles that differ only in case, spacing or punctuation normalize identically.
pub fn normalize_title(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;
    for ch in raw.chars() {
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
        } else if ch.is_alphanumeric() {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            out.extend(ch.to_lowercase());
        }
        // punctuation and symbols are dropped without breaking the word
    }
    out
}

/// Identity of a posting across sources and polling cycles.
///
/// The URL is used verbatim: links that differ only in tracking parameters
/// count as different postings.
pub fn identity_key(title: &str, url: &str) -> String {
    format!("{}|{}", normalize_title(title), url)
}

/// Remove markup-significant characters so a title cannot break message
/// formatting. Idempotent.
pub fn sanitize_for_delivery(title: &str) -> String {
    let stripped: String = title.chars().filter(|c| !MARKUP_CHARS.contains(c)).collect();
    re_ws().replace_all(&stripped, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_text_strips_html_and_unescapes() {
        let s = "<p>Junior&nbsp;<b>Developer</b> &ldquo;remote&rdquo;</p>";
        assert_eq!(clean_text(s), r#"Junior Developer "remote""#);
    }

    #[test]
    fn clean_text_caps_length() {
        let s = "x".repeat(1_000);
        assert_eq!(clean_text(&s).chars().count(), DISPLAY_MAX_CHARS);
    }

    #[test]
    fn normalize_title_folds_case_space_punct() {
        assert_eq!(normalize_title(" Junior   Dev "), "junior dev");
        assert_eq!(normalize_title("Junior Dev!"), "junior dev");
        assert_eq!(normalize_title("JUNIOR, DEV."), "junior dev");
        assert_eq!(normalize_title("Full-Stack\tEngineer (Remote)"), "fullstack engineer remote");
        assert_eq!(normalize_title("   "), "");
    }

    #[test]
    fn identity_key_ignores_title_formatting_only() {
        let u = "https://x/1";
        assert_eq!(identity_key("Junior Dev", u), identity_key(" junior   dev ", u));
        assert_ne!(identity_key("Junior Dev", u), identity_key("Junior Dev", "https://x/1?ref=a"));
    }

    #[test]
    fn sanitize_removes_markup_and_is_idempotent() {
        let once = sanitize_for_delivery("*Senior* [Rust] _dev_ <script> & `x`");
        assert_eq!(once, "Senior Rust dev script x");
        assert_eq!(sanitize_for_delivery(&once), once);
    }
}

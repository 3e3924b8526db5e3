//! Utility functions for dates, text cleanup, URLs and file system checks.
//!
//! This module provides helpers used throughout the crate:
//! - Date parsing and UTC normalization for `date_published`/`date_modified`
//! - Text cleanup (tag stripping, entity decoding, whitespace collapsing)
//! - URL resolution against an article base
//! - String truncation and slugification for logging and file names
//! - File system validation for output directories

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fs as stdfs;
use tokio::fs;
use tracing::{info, instrument};
use url::Url;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Parse a timestamp in any of the shapes publishers emit and normalize to UTC.
///
/// Accepted inputs, tried in order:
/// - RFC 3339 with offset (`2024-01-01T10:00:00-05:00`, `...Z`)
/// - RFC 2822 (`Mon, 01 Jan 2024 00:00:00 GMT`)
/// - offset without colon (`2024-01-01T10:00:00+0000`)
/// - naive date-times, taken as UTC (`2024-01-01T00:00:00`, `2024-01-01 00:00:00`)
/// - bare dates, taken as UTC midnight
///
/// Naive values are interpreted as UTC because WordPress `*_gmt` fields are
/// published without an offset.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%z", "%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Strip tags, decode HTML entities and collapse whitespace.
///
/// ```ignore
/// assert_eq!(clean_text("<p>Tom &amp; Jerry&#8217;s</p>\n"), "Tom & Jerry’s");
/// ```
pub fn clean_text(html: &str) -> String {
    let stripped = TAG_RE.replace_all(html, " ");
    let decoded = html_escape::decode_html_entities(&stripped);
    WS_RE.replace_all(decoded.trim(), " ").into_owned()
}

/// Resolve `href` against `base`, leaving it untouched when it cannot be joined.
///
/// Protocol-relative (`//cdn.example.com/x.jpg`) and relative URLs become
/// absolute; `data:`, `mailto:` and fragment-only links are kept as-is.
pub fn absolutize(base: &Url, href: &str) -> String {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("data:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("javascript:")
    {
        return href.to_string();
    }
    match base.join(href) {
        Ok(u) => u.to_string(),
        Err(_) => href.to_string(),
    }
}

/// Pick the widest candidate from a `srcset` attribute.
///
/// Candidates without a width descriptor rank below any described one.
pub fn largest_from_srcset(srcset: &str) -> Option<String> {
    srcset
        .split(',')
        .filter_map(|candidate| {
            let mut parts = candidate.split_whitespace();
            let url = parts.next()?;
            let width = parts
                .next()
                .and_then(|d| d.trim_end_matches(['w', 'x']).parse::<f64>().ok())
                .unwrap_or(0.0);
            Some((url.to_string(), width))
        })
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(url, _)| url)
}

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to `max` bytes (on a char boundary) with an
/// ellipsis and byte count indicator appended.
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Convert a title to a file-name friendly slug.
///
/// Lowercases, drops punctuation and joins words with single hyphens.
///
/// ```ignore
/// assert_eq!(slugify_title("Hello World"), "hello-world");
/// assert_eq!(slugify_title("Test-Article!"), "test-article");
/// ```
pub fn slugify_title(title: &str) -> String {
    title
        .to_lowercase()
        .replace(|c: char| !c.is_alphanumeric() && c != ' ' && c != '-', "")
        .split([' ', '-'])
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if it doesn't exist, then creates and immediately
/// deletes a probe file.
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let probe_path = format!("{}/..__probe_write__", path.trim_end_matches('/'));
    stdfs::File::create(&probe_path)?;
    let _ = stdfs::remove_file(&probe_path);
    info!("Output directory is writable");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_naive_is_utc() {
        let dt = parse_date("2024-01-01T00:00:00").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_parse_date_converts_offsets_to_utc() {
        let dt = parse_date("2024-03-10T08:30:00-05:00").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-03-10T13:30:00+00:00");

        let compact = parse_date("2024-03-10T08:30:00+0200").unwrap();
        assert_eq!(compact.to_rfc3339(), "2024-03-10T06:30:00+00:00");

        let rfc2822 = parse_date("Sun, 10 Mar 2024 08:30:00 GMT").unwrap();
        assert_eq!(rfc2822.to_rfc3339(), "2024-03-10T08:30:00+00:00");
    }

    #[test]
    fn test_parse_date_round_trips() {
        for raw in [
            "2024-01-01T00:00:00+00:00",
            "2023-12-31T23:59:59+00:00",
            "2024-06-15T12:00:00+00:00",
        ] {
            let dt = parse_date(raw).unwrap();
            assert_eq!(parse_date(&dt.to_rfc3339()).unwrap(), dt);
            assert_eq!(dt.to_rfc3339(), raw);
        }
    }

    #[test]
    fn test_parse_date_rejects_garbage() {
        assert!(parse_date("").is_none());
        assert!(parse_date("yesterday").is_none());
        assert_eq!(
            parse_date("2024-02-29").unwrap().to_rfc3339(),
            "2024-02-29T00:00:00+00:00"
        );
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("<p>Tom &amp; Jerry&#8217;s</p>\n"), "Tom & Jerry\u{2019}s");
        assert_eq!(clean_text("  a \n\t b  "), "a b");
    }

    #[test]
    fn test_absolutize() {
        let base = Url::parse("https://example.com/2024/01/post/").unwrap();
        assert_eq!(absolutize(&base, "/img/a.jpg"), "https://example.com/img/a.jpg");
        assert_eq!(absolutize(&base, "b.jpg"), "https://example.com/2024/01/post/b.jpg");
        assert_eq!(absolutize(&base, "//cdn.test/c.jpg"), "https://cdn.test/c.jpg");
        assert_eq!(absolutize(&base, "#top"), "#top");
        assert_eq!(absolutize(&base, "mailto:a@b.c"), "mailto:a@b.c");
    }

    #[test]
    fn test_largest_from_srcset() {
        let srcset = "a-300.jpg 300w, a-1024.jpg 1024w, a-768.jpg 768w";
        assert_eq!(largest_from_srcset(srcset).as_deref(), Some("a-1024.jpg"));
        assert_eq!(largest_from_srcset("").as_deref(), None);
    }

    #[test]
    fn test_truncate_for_log() {
        assert_eq!(truncate_for_log("Hello, world!", 100), "Hello, world!");
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
        // never splits a multi-byte char
        assert_eq!(truncate_for_log("éé", 1), "…(+4 bytes)");
    }

    #[test]
    fn test_slugify_title() {
        assert_eq!(slugify_title("Hello World"), "hello-world");
        assert_eq!(slugify_title("Test-Article!"), "test-article");
        assert_eq!(slugify_title("Multiple   Spaces"), "multiple-spaces");
        assert_eq!(slugify_title("Special@#$Characters"), "specialcharacters");
    }

    #[tokio::test]
    async fn test_ensure_writable_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        ensure_writable_dir(nested.to_str().unwrap()).await.unwrap();
        assert!(nested.is_dir());
    }
}

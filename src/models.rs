//! Data models for normalized feed items and feeds.
//!
//! This module defines the output contract every handler produces:
//! - [`Item`]: one normalized article
//! - [`Author`]: a named byline entry
//! - [`Attachment`]: an audio or video enclosure
//! - [`Feed`]: a titled, sorted list of items
//!
//! Field names follow the JSON Feed shape, with private extensions prefixed
//! by an underscore (`_timestamp`, `_image`, ...).

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A named author.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Author {
    pub name: String,
}

impl Author {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// An audio or video enclosure.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Attachment {
    pub url: String,
    pub mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// A normalized article.
///
/// `id`, `url`, `title` and `content_html` are required; see
/// [`Item::is_complete`]. Everything else is omitted from the JSON when unset.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Item {
    pub id: String,
    pub url: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_published: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_modified: Option<String>,
    /// Publish time as epoch seconds, used only for sorting.
    #[serde(rename = "_timestamp", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<Author>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<Author>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub content_html: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Lede image actually rendered at the top of `content_html`.
    #[serde(rename = "_image", skip_serializing_if = "Option::is_none")]
    pub lede_image: Option<String>,
    #[serde(rename = "_audio", skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    #[serde(rename = "_video", skip_serializing_if = "Option::is_none")]
    pub video: Option<String>,
    #[serde(rename = "_gallery", default, skip_serializing_if = "Vec::is_empty")]
    pub gallery: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl Item {
    /// Whether every required field is present.
    pub fn is_complete(&self) -> bool {
        !self.id.trim().is_empty()
            && !self.url.trim().is_empty()
            && !self.title.trim().is_empty()
            && !self.content_html.trim().is_empty()
    }

    /// Name of the first required field that is empty, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        [
            ("id", &self.id),
            ("url", &self.url),
            ("title", &self.title),
            ("content_html", &self.content_html),
        ]
        .into_iter()
        .find(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| k)
    }

    /// Set `date_published` and the derived `_timestamp`.
    pub fn set_published(&mut self, dt: DateTime<Utc>) {
        self.date_published = Some(dt.to_rfc3339());
        self.timestamp = Some(dt.timestamp() as f64 + f64::from(dt.timestamp_subsec_millis()) / 1000.0);
    }

    /// Set `authors` and the combined `author` display name.
    pub fn set_authors<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.authors = names
            .into_iter()
            .map(|n| n.as_ref().trim().to_string())
            .filter(|n| !n.is_empty())
            .unique()
            .map(Author::new)
            .collect();
        self.author = combine_author_names(&self.authors).map(Author::new);
    }
}

/// Join author names for display: `A`, `A and B`, `A, B and C`.
pub fn combine_author_names(authors: &[Author]) -> Option<String> {
    match authors {
        [] => None,
        [only] => Some(only.name.clone()),
        [init @ .., last] => Some(format!(
            "{} and {}",
            init.iter().map(|a| a.name.as_str()).join(", "),
            last.name
        )),
    }
}

/// Deduplicate tags case-insensitively, keeping the first spelling seen.
///
/// Whitespace is trimmed and empty tags are dropped.
pub fn dedupe_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|t| t.as_ref().trim().to_string())
        .filter(|t| !t.is_empty())
        .unique_by(|t| t.to_lowercase())
        .collect()
}

/// A titled list of items, newest first.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Feed {
    pub title: String,
    pub items: Vec<Item>,
}

impl Feed {
    /// Sort `items` by `_timestamp` descending and keep at most `max`.
    ///
    /// Items without a timestamp sort after every dated item; ties keep their
    /// input order.
    pub fn new(title: impl Into<String>, mut items: Vec<Item>, max: Option<usize>) -> Self {
        items.sort_by(|a, b| match (a.timestamp, b.timestamp) {
            (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
        if let Some(max) = max {
            items.truncate(max);
        }
        Self {
            title: title.into(),
            items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn item_at(id: &str, ts: Option<f64>) -> Item {
        Item {
            id: id.to_string(),
            url: format!("https://example.com/{id}"),
            title: id.to_string(),
            content_html: "<p>x</p>".to_string(),
            timestamp: ts,
            ..Item::default()
        }
    }

    #[test]
    fn test_item_serialization_omits_empty_fields() {
        let mut item = item_at("1", None);
        item.set_published(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let json = serde_json::to_value(&item).unwrap();

        assert_eq!(json["date_published"], "2024-01-01T00:00:00+00:00");
        assert_eq!(json["_timestamp"], 1704067200.0);
        assert!(json.get("tags").is_none());
        assert!(json.get("summary").is_none());
        assert!(json.get("_gallery").is_none());
    }

    #[test]
    fn test_is_complete() {
        let item = item_at("1", None);
        assert!(item.is_complete());
        assert_eq!(item.missing_field(), None);

        let mut missing = item.clone();
        missing.title = "  ".to_string();
        assert!(!missing.is_complete());
        assert_eq!(missing.missing_field(), Some("title"));
    }

    #[test]
    fn test_set_authors_combines_names() {
        let mut item = Item::default();
        item.set_authors(["Ann", "Bob", " Ann ", "", "Cat"]);
        assert_eq!(item.authors.len(), 3);
        assert_eq!(item.author.unwrap().name, "Ann, Bob and Cat");

        let mut pair = Item::default();
        pair.set_authors(["Ann", "Bob"]);
        assert_eq!(pair.author.unwrap().name, "Ann and Bob");

        let mut none = Item::default();
        none.set_authors(Vec::<String>::new());
        assert!(none.author.is_none());
    }

    #[test]
    fn test_dedupe_tags_keeps_first_spelling() {
        let tags = dedupe_tags(["Rust", "rust", " News ", "RUST", "", "news", "Tech"]);
        assert_eq!(tags, vec!["Rust", "News", "Tech"]);
    }

    #[test]
    fn test_feed_sorts_and_truncates() {
        let items = vec![
            item_at("old", Some(10.0)),
            item_at("undated", None),
            item_at("new", Some(30.0)),
            item_at("mid", Some(20.0)),
        ];
        let feed = Feed::new("Example", items, Some(3));
        let ids: Vec<_> = feed.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
    }

    proptest! {
        #[test]
        fn prop_feed_is_sorted_descending(
            stamps in proptest::collection::vec(proptest::option::of(0u32..2_000_000_000u32), 0..40),
            max in proptest::option::of(0usize..50),
        ) {
            let items: Vec<Item> = stamps
                .iter()
                .enumerate()
                .map(|(i, ts)| item_at(&i.to_string(), ts.map(f64::from)))
                .collect();
            let total = items.len();
            let feed = Feed::new("t", items, max);

            prop_assert_eq!(feed.items.len(), max.map_or(total, |m| m.min(total)));
            for pair in feed.items.windows(2) {
                match (pair[0].timestamp, pair[1].timestamp) {
                    (Some(a), Some(b)) => prop_assert!(a >= b),
                    (None, Some(_)) => prop_assert!(false, "undated item before dated item"),
                    _ => {}
                }
            }
        }

        #[test]
        fn prop_dedupe_tags_is_case_insensitive(tags in proptest::collection::vec("[a-zA-Z]{1,4}", 0..30)) {
            let deduped = dedupe_tags(&tags);
            let lowered: Vec<String> = deduped.iter().map(|t| t.to_lowercase()).collect();
            let unique: std::collections::HashSet<&String> = lowered.iter().collect();
            prop_assert_eq!(unique.len(), deduped.len());

            // first-seen order is preserved
            let mut expected: Vec<String> = Vec::new();
            for t in &tags {
                if !expected.iter().any(|e| e.eq_ignore_ascii_case(t)) {
                    expected.push(t.clone());
                }
            }
            prop_assert_eq!(deduped, expected);
        }
    }
}

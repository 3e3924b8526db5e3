//! Metadata assembly from WordPress post JSON and page markup.
//!
//! Every field is resolved through the same fixed fallback chain:
//!
//! 1. native WP post fields (`title.rendered`, `date_gmt`, `_embedded`, ...)
//! 2. the Yoast / AIOSEO schema graph (REST `*_head_json` or page script)
//! 3. Open Graph and `<meta>` tags (REST `yoast_head_json` or page head)
//! 4. any other JSON-LD on the page
//!
//! The first source carrying a non-empty value wins. Sources are never
//! cross-checked against each other.

use crate::models::dedupe_tags;
use crate::utils::{clean_text, parse_date};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

static LD_JSON: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).unwrap());
static META: Lazy<Selector> = Lazy::new(|| Selector::parse("meta[content]").unwrap());
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());

const ARTICLE_TYPES: &[&str] = &[
    "Article",
    "NewsArticle",
    "BlogPosting",
    "ReportageNewsArticle",
    "AnalysisNewsArticle",
    "OpinionNewsArticle",
    "ReviewNewsArticle",
    "Review",
    "TechArticle",
    "ScholarlyArticle",
];

/// Metadata resolved for one post.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Metadata {
    pub title: Option<String>,
    pub date_published: Option<DateTime<Utc>>,
    pub date_modified: Option<DateTime<Utc>>,
    pub authors: Vec<String>,
    pub tags: Vec<String>,
    pub summary: Option<String>,
    pub image: Option<String>,
    pub image_caption: Option<String>,
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == s.len() {
        Some(s)
    } else {
        Some(trimmed.to_string())
    }
}

fn str_at<'v>(value: &'v Value, pointer: &str) -> Option<&'v str> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

/// Whether a JSON-LD node's `@type` (string or array) is one of `types`.
fn has_type(node: &Value, types: &[&str]) -> bool {
    match node.get("@type") {
        Some(Value::String(t)) => types.contains(&t.as_str()),
        Some(Value::Array(ts)) => ts
            .iter()
            .filter_map(Value::as_str)
            .any(|t| types.contains(&t)),
        _ => false,
    }
}

/// A flat list of JSON-LD nodes with `@id` resolution.
#[derive(Debug, Default, Clone)]
pub struct NodeSet {
    nodes: Vec<Value>,
}

impl NodeSet {
    /// Add a parsed JSON-LD document, flattening arrays and `@graph`.
    pub fn push(&mut self, value: Value) {
        match value {
            Value::Array(items) => items.into_iter().for_each(|v| self.push(v)),
            Value::Object(mut map) => {
                if let Some(graph) = map.remove("@graph") {
                    self.push(graph);
                }
                if map.contains_key("@type") {
                    self.nodes.push(Value::Object(map));
                }
            }
            _ => {}
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn by_id(&self, id: &str) -> Option<&Value> {
        self.nodes
            .iter()
            .find(|n| n.get("@id").and_then(Value::as_str) == Some(id))
    }

    /// Follow an `{"@id": ...}` reference to the full node, if it is one.
    fn resolve<'a>(&'a self, value: &'a Value) -> &'a Value {
        match value.get("@id").and_then(Value::as_str) {
            Some(id) if value.as_object().is_some_and(|m| m.len() == 1) => {
                self.by_id(id).unwrap_or(value)
            }
            _ => value,
        }
    }

    /// The article node, falling back to the web page node.
    fn article(&self) -> Option<&Value> {
        self.nodes
            .iter()
            .find(|n| has_type(n, ARTICLE_TYPES))
            .or_else(|| self.nodes.iter().find(|n| has_type(n, &["WebPage"])))
    }

    fn title(&self) -> Option<String> {
        let node = self.article()?;
        node.get("headline")
            .or_else(|| node.get("name"))
            .and_then(Value::as_str)
            .map(clean_text)
            .and_then(non_empty)
    }

    fn date(&self, key: &str) -> Option<DateTime<Utc>> {
        self.nodes
            .iter()
            .filter(|n| has_type(n, ARTICLE_TYPES) || has_type(n, &["WebPage"]))
            .find_map(|n| n.get(key).and_then(Value::as_str).and_then(parse_date))
    }

    fn authors(&self) -> Vec<String> {
        let Some(author) = self.article().and_then(|a| a.get("author")) else {
            return Vec::new();
        };
        let list: Vec<&Value> = match author {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        list.into_iter()
            .filter_map(|a| match self.resolve(a) {
                Value::String(name) => Some(name.clone()),
                node => node.get("name").and_then(Value::as_str).map(str::to_string),
            })
            .map(|n| clean_text(&n))
            .filter(|n| !n.is_empty())
            .collect()
    }

    fn tags(&self) -> Vec<String> {
        let Some(node) = self.article() else {
            return Vec::new();
        };
        let mut tags = Vec::new();
        for key in ["keywords", "articleSection"] {
            match node.get(key) {
                Some(Value::String(s)) => tags.extend(s.split(',').map(clean_text)),
                Some(Value::Array(items)) => {
                    tags.extend(items.iter().filter_map(Value::as_str).map(clean_text))
                }
                _ => {}
            }
        }
        dedupe_tags(tags)
    }

    fn summary(&self) -> Option<String> {
        self.article()?
            .get("description")
            .and_then(Value::as_str)
            .map(clean_text)
            .and_then(non_empty)
    }

    fn image(&self) -> Option<String> {
        let node = self.article()?;
        let image = node
            .get("image")
            .or_else(|| node.get("primaryImageOfPage"))
            .or_else(|| node.get("thumbnailUrl"))?;
        let image = match image {
            Value::Array(items) => items.first()?,
            other => other,
        };
        match self.resolve(image) {
            Value::String(url) => non_empty(url.clone()),
            obj => obj
                .get("url")
                .or_else(|| obj.get("contentUrl"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .and_then(non_empty),
        }
    }
}

/// `<meta>` / Open Graph values keyed by lowercased `property` or `name`.
#[derive(Debug, Default, Clone)]
pub struct MetaTags {
    values: HashMap<String, Vec<String>>,
}

impl MetaTags {
    pub fn insert(&mut self, key: &str, value: &str) {
        let value = value.trim();
        if value.is_empty() {
            return;
        }
        self.values
            .entry(key.to_lowercase())
            .or_default()
            .push(value.to_string());
    }

    pub fn first(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    pub fn all(&self, key: &str) -> &[String] {
        self.values.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// Open Graph fields Yoast mirrors into the REST response.
    fn from_yoast_head(head: &Value) -> Self {
        let mut meta = Self::default();
        for (field, key) in [
            ("og_title", "og:title"),
            ("og_description", "og:description"),
            ("description", "description"),
            ("article_published_time", "article:published_time"),
            ("article_modified_time", "article:modified_time"),
            ("author", "author"),
        ] {
            if let Some(v) = head.get(field).and_then(Value::as_str) {
                meta.insert(key, v);
            }
        }
        if let Some(url) = str_at(head, "/og_image/0/url") {
            meta.insert("og:image", url);
        }
        meta
    }

    fn merge(&mut self, other: MetaTags) {
        for (k, vs) in other.values {
            self.values.entry(k).or_default().extend(vs);
        }
    }
}

/// Metadata that lives in the rendered page rather than the REST response.
#[derive(Debug, Default, Clone)]
pub struct PageData {
    pub schema: NodeSet,
    pub json_ld: NodeSet,
    pub meta: MetaTags,
    pub title: Option<String>,
}

impl PageData {
    /// Collect schema graph, JSON-LD, meta tags and `<title>` from a page.
    pub fn parse(html: &str) -> Self {
        let document = Html::parse_document(html);
        let mut page = PageData::default();

        for script in document.select(&LD_JSON) {
            let raw: String = script.text().collect();
            let raw = raw
                .trim()
                .trim_start_matches("<![CDATA[")
                .trim_end_matches("]]>")
                .trim();
            let Ok(value) = serde_json::from_str::<Value>(raw) else {
                debug!("Skipping unparseable JSON-LD script");
                continue;
            };
            let is_seo_graph = script
                .value()
                .classes()
                .any(|c| c == "yoast-schema-graph" || c == "aioseo-schema");
            if is_seo_graph {
                page.schema.push(value);
            } else {
                page.json_ld.push(value);
            }
        }

        for meta in document.select(&META) {
            let v = meta.value();
            let key = v.attr("property").or_else(|| v.attr("name"));
            if let (Some(key), Some(content)) = (key, v.attr("content")) {
                page.meta.insert(key, content);
            }
        }

        page.title = document
            .select(&TITLE)
            .next()
            .map(|t| clean_text(&t.inner_html()))
            .and_then(non_empty);
        page
    }
}

/// All metadata sources for one post, in precedence order.
#[derive(Debug, Default)]
pub struct Sources<'a> {
    post: Option<&'a Value>,
    schema: NodeSet,
    meta: MetaTags,
    json_ld: NodeSet,
    page_title: Option<String>,
}

impl<'a> Sources<'a> {
    pub fn new(post: Option<&'a Value>, page: Option<PageData>) -> Self {
        let mut schema = NodeSet::default();
        let mut meta = MetaTags::default();
        if let Some(post) = post {
            for key in ["yoast_head_json", "aioseo_head_json"] {
                if let Some(graph) = post.pointer(&format!("/{key}/schema")) {
                    schema.push(graph.clone());
                }
            }
            if let Some(head) = post.get("yoast_head_json") {
                meta.merge(MetaTags::from_yoast_head(head));
            }
        }
        let mut json_ld = NodeSet::default();
        let mut page_title = None;
        if let Some(page) = page {
            if schema.is_empty() {
                schema = page.schema;
            }
            meta.merge(page.meta);
            json_ld = page.json_ld;
            page_title = page.title;
        }
        Self {
            post,
            schema,
            meta,
            json_ld,
            page_title,
        }
    }

    pub fn assemble(&self) -> Metadata {
        let (image, image_caption) = self.image();
        Metadata {
            title: self.title(),
            date_published: self.date_published(),
            date_modified: self.date_modified(),
            authors: self.authors(),
            tags: self.tags(),
            summary: self.summary(),
            image,
            image_caption,
        }
    }

    fn post_str(&self, pointer: &str) -> Option<&'a str> {
        self.post.and_then(|p| str_at(p, pointer))
    }

    fn title(&self) -> Option<String> {
        self.post_str("/title/rendered")
            .or_else(|| self.post_str("/title"))
            .map(clean_text)
            .and_then(non_empty)
            .or_else(|| self.schema.title())
            .or_else(|| self.meta.first("og:title").map(clean_text).and_then(non_empty))
            .or_else(|| self.json_ld.title())
            .or_else(|| self.page_title.clone())
    }

    fn date_published(&self) -> Option<DateTime<Utc>> {
        self.post_str("/date_gmt")
            .and_then(parse_date)
            .or_else(|| self.schema.date("datePublished"))
            .or_else(|| self.meta.first("article:published_time").and_then(parse_date))
            .or_else(|| self.json_ld.date("datePublished"))
            .or_else(|| self.post_str("/date").and_then(parse_date))
    }

    fn date_modified(&self) -> Option<DateTime<Utc>> {
        self.post_str("/modified_gmt")
            .and_then(parse_date)
            .or_else(|| self.schema.date("dateModified"))
            .or_else(|| self.meta.first("article:modified_time").and_then(parse_date))
            .or_else(|| self.json_ld.date("dateModified"))
            .or_else(|| self.post_str("/modified").and_then(parse_date))
    }

    fn post_authors(&self) -> Vec<String> {
        let Some(post) = self.post else {
            return Vec::new();
        };
        let embedded = post
            .pointer("/_embedded/author")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|a| a.get("name").and_then(Value::as_str));
        let coauthors = post
            .get("coauthors")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|a| a.get("display_name").and_then(Value::as_str));
        embedded
            .chain(coauthors)
            .map(clean_text)
            .filter(|n| !n.is_empty())
            .collect()
    }

    fn authors(&self) -> Vec<String> {
        let from_post = self.post_authors();
        if !from_post.is_empty() {
            return from_post;
        }
        let from_schema = self.schema.authors();
        if !from_schema.is_empty() {
            return from_schema;
        }
        let from_meta: Vec<String> = self
            .meta
            .all("author")
            .iter()
            .map(|a| clean_text(a))
            .filter(|a| !a.is_empty() && !a.starts_with("http"))
            .collect();
        if !from_meta.is_empty() {
            return from_meta;
        }
        self.json_ld.authors()
    }

    fn post_tags(&self) -> Vec<String> {
        let Some(terms) = self
            .post
            .and_then(|p| p.pointer("/_embedded/wp:term"))
            .and_then(Value::as_array)
        else {
            return Vec::new();
        };
        let names = terms
            .iter()
            .filter_map(Value::as_array)
            .flatten()
            .filter(|t| {
                matches!(
                    t.get("taxonomy").and_then(Value::as_str),
                    Some("category" | "post_tag") | None
                )
            })
            .filter_map(|t| t.get("name").and_then(Value::as_str))
            .map(clean_text)
            .filter(|t| !t.eq_ignore_ascii_case("uncategorized"));
        dedupe_tags(names)
    }

    fn tags(&self) -> Vec<String> {
        let from_post = self.post_tags();
        if !from_post.is_empty() {
            return from_post;
        }
        let from_schema = self.schema.tags();
        if !from_schema.is_empty() {
            return from_schema;
        }
        let from_meta = dedupe_tags(self.meta.all("article:tag"));
        if !from_meta.is_empty() {
            return from_meta;
        }
        self.json_ld.tags()
    }

    fn summary(&self) -> Option<String> {
        self.post_str("/excerpt/rendered")
            .map(clean_excerpt)
            .and_then(non_empty)
            .or_else(|| self.schema.summary())
            .or_else(|| {
                self.meta
                    .first("og:description")
                    .or_else(|| self.meta.first("description"))
                    .map(clean_text)
                    .and_then(non_empty)
            })
            .or_else(|| self.json_ld.summary())
    }

    fn image(&self) -> (Option<String>, Option<String>) {
        let media = self
            .post
            .and_then(|p| p.pointer("/_embedded/wp:featuredmedia/0"))
            .filter(|m| m.get("source_url").is_some());
        if let Some(media) = media {
            let url = str_at(media, "/source_url").map(str::to_string);
            let caption = str_at(media, "/caption/rendered")
                .map(clean_text)
                .and_then(non_empty);
            if url.is_some() {
                return (url, caption);
            }
        }
        let url = self
            .post_str("/jetpack_featured_media_url")
            .map(str::to_string)
            .or_else(|| self.schema.image())
            .or_else(|| self.meta.first("og:image").map(str::to_string))
            .or_else(|| self.json_ld.image());
        (url, None)
    }
}

/// Excerpt text without the trailing "read more" boilerplate WP appends.
fn clean_excerpt(html: &str) -> String {
    let text = clean_text(html);
    let text = match text.find(" Continue reading") {
        Some(i) => &text[..i],
        None => text.as_str(),
    };
    text.trim_end_matches("[…]")
        .trim_end_matches("[&hellip;]")
        .trim_end_matches("[...]")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn post_fixture() -> Value {
        json!({
            "id": 42,
            "date": "2024-01-01T05:00:00",
            "date_gmt": "2024-01-01T00:00:00",
            "modified_gmt": "2024-01-02T12:30:00",
            "title": {"rendered": "Tom &amp; Jerry&#8217;s Day"},
            "excerpt": {"rendered": "<p>A short summary [&hellip;]</p>\n"},
            "_embedded": {
                "author": [{"name": "Ann Writer"}, {"code": "rest_user_invalid_id"}],
                "wp:term": [
                    [{"name": "News", "taxonomy": "category"}, {"name": "Uncategorized", "taxonomy": "category"}],
                    [{"name": "Cats", "taxonomy": "post_tag"}, {"name": "news", "taxonomy": "post_tag"}],
                    [{"name": "Ignored", "taxonomy": "region"}]
                ],
                "wp:featuredmedia": [{
                    "source_url": "https://example.com/lede.jpg",
                    "caption": {"rendered": "<p>Photo: Someone</p>"}
                }]
            }
        })
    }

    #[test]
    fn test_post_fields_win() {
        let post = post_fixture();
        let meta = Sources::new(Some(&post), None).assemble();
        assert_eq!(meta.title.as_deref(), Some("Tom & Jerry\u{2019}s Day"));
        assert_eq!(
            meta.date_published.unwrap().to_rfc3339(),
            "2024-01-01T00:00:00+00:00"
        );
        assert_eq!(
            meta.date_modified.unwrap().to_rfc3339(),
            "2024-01-02T12:30:00+00:00"
        );
        assert_eq!(meta.authors, vec!["Ann Writer"]);
        assert_eq!(meta.tags, vec!["News", "Cats"]);
        assert_eq!(meta.summary.as_deref(), Some("A short summary"));
        assert_eq!(meta.image.as_deref(), Some("https://example.com/lede.jpg"));
        assert_eq!(meta.image_caption.as_deref(), Some("Photo: Someone"));
    }

    #[test]
    fn test_yoast_head_fills_missing_post_fields() {
        let post = json!({
            "id": 7,
            "title": {"rendered": "Example"},
            "yoast_head_json": {
                "og_description": "From OG",
                "og_image": [{"url": "https://example.com/og.jpg"}],
                "author": "Meta Author",
                "schema": {"@context": "https://schema.org", "@graph": [
                    {"@type": "NewsArticle", "@id": "#article",
                     "datePublished": "2024-05-01T10:00:00-04:00",
                     "author": {"@id": "#person"},
                     "keywords": ["Alpha", "beta", "ALPHA"]},
                    {"@type": "Person", "@id": "#person", "name": "Graph Person"}
                ]}
            }
        });
        let meta = Sources::new(Some(&post), None).assemble();
        assert_eq!(
            meta.date_published.unwrap().to_rfc3339(),
            "2024-05-01T14:00:00+00:00"
        );
        assert_eq!(meta.authors, vec!["Graph Person"]);
        assert_eq!(meta.tags, vec!["Alpha", "beta"]);
        assert_eq!(meta.summary.as_deref(), Some("From OG"));
        assert_eq!(meta.image.as_deref(), Some("https://example.com/og.jpg"));
    }

    #[test]
    fn test_page_sources_without_post() {
        let html = r#"<html><head>
            <title>Page Title | Site</title>
            <meta property="og:title" content="OG Title">
            <meta property="article:published_time" content="2024-02-02T08:00:00+00:00">
            <meta property="article:tag" content="One">
            <meta property="article:tag" content="one">
            <meta name="author" content="Meta Writer">
            <script type="application/ld+json">{"@context":"https://schema.org","@type":"NewsArticle","headline":"LD Title","image":["https://example.com/ld.jpg"],"description":"LD summary"}</script>
            </head><body></body></html>"#;
        let meta = Sources::new(None, Some(PageData::parse(html))).assemble();
        assert_eq!(meta.title.as_deref(), Some("OG Title"));
        assert_eq!(
            meta.date_published.unwrap().to_rfc3339(),
            "2024-02-02T08:00:00+00:00"
        );
        assert_eq!(meta.tags, vec!["One"]);
        assert_eq!(meta.authors, vec!["Meta Writer"]);
        assert_eq!(meta.summary.as_deref(), Some("LD summary"));
        assert_eq!(meta.image.as_deref(), Some("https://example.com/ld.jpg"));
    }

    #[test]
    fn test_page_schema_graph_is_recognized() {
        let html = r##"<html><head><script type="application/ld+json" class="yoast-schema-graph">{"@context":"https://schema.org","@graph":[{"@type":["Article"],"headline":"Graph Headline","image":{"@id":"#img"}},{"@type":"ImageObject","@id":"#img","url":"https://example.com/g.jpg"}]}</script></head></html>"##;
        let page = PageData::parse(html);
        assert!(!page.schema.is_empty());
        assert!(page.json_ld.is_empty());
        let meta = Sources::new(None, Some(page)).assemble();
        assert_eq!(meta.title.as_deref(), Some("Graph Headline"));
        assert_eq!(meta.image.as_deref(), Some("https://example.com/g.jpg"));
    }

    #[test]
    fn test_clean_excerpt() {
        assert_eq!(
            clean_excerpt("<p>Lead text&hellip; Continue reading <a href=\"#\">Post</a></p>"),
            "Lead text\u{2026}"
        );
        assert_eq!(clean_excerpt("<p>Plain [&hellip;]</p>"), "Plain");
    }
}

//! Finds the WP REST post object behind an article URL.

use crate::config::SiteConfig;
use crate::fetch::{FetchAsync, get_json};
use crate::utils::absolutize;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use std::fmt;
use tracing::{debug, info, instrument, warn};
use url::Url;

static TRAILING_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[-_])(\d{5,})(?:\.html?)?$").unwrap());
static POSTID_CLASS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^postid-(\d+)$").unwrap());
static POST_CLASS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^post-(\d+)$").unwrap());
static SCRIPT_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"["'](?:post_id|postId|postID)["']\s*:\s*["']?(\d+)"#).unwrap());

static REST_LINK: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"link[rel="alternate"][type="application/json"][href]"#).unwrap()
});
static SHORTLINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"link[rel="shortlink"][href]"#).unwrap());
static ARTICLE_ID: Lazy<Selector> = Lazy::new(|| Selector::parse(r#"article[id^="post-"]"#).unwrap());
static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").unwrap());
static CLASSED: Lazy<Selector> = Lazy::new(|| Selector::parse("[class]").unwrap());
static INLINE_SCRIPT: Lazy<Selector> = Lazy::new(|| Selector::parse("script:not([src])").unwrap());

/// How a post was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    UrlId,
    Slug,
    RestLink,
    Shortlink,
    DomPattern,
    PageData,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Strategy::UrlId => "url_id",
            Strategy::Slug => "slug",
            Strategy::RestLink => "rest_link",
            Strategy::Shortlink => "shortlink",
            Strategy::DomPattern => "dom_pattern",
            Strategy::PageData => "page_data",
        };
        f.write_str(s)
    }
}

/// A located post plus the rendered page, when it had to be fetched.
#[derive(Debug, Clone)]
pub struct Located {
    pub post: Value,
    pub page_html: Option<String>,
    pub strategy: Strategy,
}

/// A lead found while scanning the rendered page.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PageHint {
    Rest(String),
    Id(String, Strategy),
}

/// Numeric post id carried by the article URL itself.
pub fn id_from_url(url: &Url, site: &SiteConfig) -> Option<String> {
    if let Some(re) = site.id_regex()
        && let Some(caps) = re.captures(url.as_str())
    {
        let id = caps.get(1).or_else(|| caps.get(0))?.as_str();
        if !id.is_empty() {
            return Some(id.to_string());
        }
    }
    let from_query = url
        .query_pairs()
        .find(|(k, v)| (k == "p" || k == "post") && v.chars().all(|c| c.is_ascii_digit()))
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty());
    if from_query.is_some() {
        return from_query;
    }
    let last = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    TRAILING_ID_RE
        .captures(last)
        .map(|caps| caps[1].to_string())
}

/// Last path segment that is not purely numeric, without `.html`.
pub fn slug_from_url(url: &Url) -> Option<String> {
    url.path_segments()?
        .filter(|s| !s.is_empty() && !s.chars().all(|c| c.is_ascii_digit()))
        .last()
        .map(|s| {
            s.trim_end_matches(".html")
                .trim_end_matches(".htm")
                .to_string()
        })
        .filter(|s| !s.is_empty())
}

fn with_embed(endpoint: &str, embed: bool) -> String {
    if !embed || endpoint.contains("_embed") {
        endpoint.to_string()
    } else if endpoint.contains('?') {
        format!("{endpoint}&_embed")
    } else {
        format!("{endpoint}?_embed")
    }
}

/// Extract every REST lead from the page, in strategy order, deduplicated.
fn scan_page(html: &str, page_url: &Url) -> Vec<PageHint> {
    let document = Html::parse_document(html);
    let mut hints = Vec::new();

    for link in document.select(&REST_LINK) {
        if let Some(href) = link.value().attr("href")
            && href.contains("/wp-json/")
        {
            hints.push(PageHint::Rest(absolutize(page_url, href)));
        }
    }

    for link in document.select(&SHORTLINK) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        if let Ok(short) = page_url.join(href)
            && let Some((_, id)) = short
                .query_pairs()
                .find(|(k, v)| k == "p" && is_post_id(v))
        {
            hints.push(PageHint::Id(id.into_owned(), Strategy::Shortlink));
        }
    }

    for article in document.select(&ARTICLE_ID) {
        if let Some(id) = article
            .value()
            .id()
            .and_then(|id| id.strip_prefix("post-"))
            .filter(|id| is_post_id(id))
        {
            hints.push(PageHint::Id(id.to_string(), Strategy::DomPattern));
        }
    }
    for body in document.select(&BODY) {
        for class in body.value().classes() {
            if let Some(caps) = POSTID_CLASS_RE.captures(class) {
                hints.push(PageHint::Id(caps[1].to_string(), Strategy::DomPattern));
            }
        }
    }
    for el in document.select(&CLASSED) {
        for class in el.value().classes() {
            if let Some(caps) = POST_CLASS_RE.captures(class) {
                hints.push(PageHint::Id(caps[1].to_string(), Strategy::DomPattern));
            }
        }
    }

    for script in document.select(&INLINE_SCRIPT) {
        let text: String = script.text().collect();
        for caps in SCRIPT_ID_RE.captures_iter(&text) {
            hints.push(PageHint::Id(caps[1].to_string(), Strategy::PageData));
        }
    }

    hints
        .into_iter()
        .unique_by(|h| match h {
            PageHint::Rest(u) => u.clone(),
            PageHint::Id(id, _) => id.clone(),
        })
        .collect()
}

fn is_post_id(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

/// The first post object in a REST response (single object or list).
fn first_post(value: Value) -> Option<Value> {
    match value {
        Value::Array(items) => items.into_iter().find(|p| p.is_object()),
        obj @ Value::Object(_) if obj.get("id").is_some() => Some(obj),
        _ => None,
    }
}

async fn fetch_post<F: FetchAsync>(fetcher: &F, endpoint: &str, site: &SiteConfig) -> Option<Value> {
    let endpoint = with_embed(endpoint, site.embed);
    match get_json(fetcher, &endpoint, &site.headers).await {
        Ok(value) => {
            let post = first_post(value);
            if post.is_none() {
                debug!(%endpoint, "Response held no post object");
            }
            post
        }
        Err(e) => {
            warn!(%endpoint, error = %e, "Post lookup failed");
            None
        }
    }
}

/// Resolve `url` to its WP post, trying each strategy in turn.
///
/// Returns `None` once every strategy is exhausted.
#[instrument(level = "info", skip_all, fields(%url))]
pub async fn locate_post<F: FetchAsync>(fetcher: &F, url: &Url, site: &SiteConfig) -> Option<Located> {
    let posts = site.posts_endpoint(url)?;

    if let Some(id) = id_from_url(url, site) {
        debug!(%id, "Trying id from URL");
        if let Some(post) = fetch_post(fetcher, &format!("{posts}/{id}"), site).await {
            info!(strategy = %Strategy::UrlId, "Located post");
            return Some(Located {
                post,
                page_html: None,
                strategy: Strategy::UrlId,
            });
        }
    }

    if let Some(slug) = slug_from_url(url) {
        let endpoint = format!("{posts}?slug={}", urlencoding::encode(&slug));
        if let Some(post) = fetch_post(fetcher, &endpoint, site).await {
            info!(strategy = %Strategy::Slug, "Located post");
            return Some(Located {
                post,
                page_html: None,
                strategy: Strategy::Slug,
            });
        }
    }

    let page_html = match fetcher.get_text(url.as_str(), &site.headers).await {
        Ok(html) => html,
        Err(e) => {
            warn!(error = %e, "Article page fetch failed");
            return None;
        }
    };

    for hint in scan_page(&page_html, url) {
        let (endpoint, strategy) = match hint {
            PageHint::Rest(link) => (link, Strategy::RestLink),
            PageHint::Id(id, strategy) => (format!("{posts}/{id}"), strategy),
        };
        if let Some(post) = fetch_post(fetcher, &endpoint, site).await {
            info!(%strategy, "Located post");
            return Some(Located {
                post,
                page_html: Some(page_html),
                strategy,
            });
        }
    }

    warn!("No strategy located a post");
    None
}

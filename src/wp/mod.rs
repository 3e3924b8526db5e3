//! Generic WordPress (`wp/v2/posts`) feed handler.
//!
//! [`get_content`] resolves one article URL to an [`Item`]; [`get_feed`]
//! lists a site's latest posts as a [`Feed`]. Both run the same pipeline:
//! locate the post, assemble metadata, format the body, assemble the item.

pub mod blocks;
pub mod format;
pub mod locate;
pub mod metadata;

use crate::config::{Args, SiteConfig};
use crate::error::HandlerError;
use crate::fetch::{FetchAsync, get_json};
use crate::models::{Feed, Item};
use crate::render;
use crate::utils::{clean_text, truncate_for_log};
use chrono::{Duration, Utc};
use format::ContentFormatter;
use futures::stream::{self, StreamExt};
use html_escape::encode_text;
use metadata::{Metadata, PageData, Sources};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use url::Url;

const DEFAULT_FEED_SIZE: usize = 10;

static SIZE_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:-\d+x\d+|-scaled)?\.[A-Za-z0-9]+$").unwrap());

/// Fetch and normalize a single article.
///
/// Returns `None` when the post cannot be located or the assembled item is
/// missing a required field.
#[instrument(level = "info", skip(fetcher, args, site), fields(%url))]
pub async fn get_content<F: FetchAsync>(
    fetcher: &F,
    url: &str,
    args: &Args,
    site: &SiteConfig,
) -> Option<Item> {
    let article = match parse_url(url) {
        Ok(u) => u,
        Err(e) => {
            warn!(error = %e, "Skipping article");
            return None;
        }
    };
    let located = locate::locate_post(fetcher, &article, site).await?;
    let mut post = located.post;
    fill_featured_media(fetcher, &article, &mut post, site).await;
    let page = located.page_html.as_deref().map(PageData::parse);
    match build_item(&post, page, &article, args, site) {
        Ok(item) => Some(item),
        Err(e) => {
            warn!(error = %e, "Dropping incomplete item");
            None
        }
    }
}

/// List the site's latest posts.
///
/// Every listed post becomes an item directly from the listing; posts are
/// never fetched a second time.
#[instrument(level = "info", skip(fetcher, args, site), fields(%url))]
pub async fn get_feed<F: FetchAsync>(
    fetcher: &F,
    url: &str,
    args: &Args,
    site: &SiteConfig,
) -> Option<Feed> {
    let base = match parse_url(url) {
        Ok(u) => u,
        Err(e) => {
            warn!(error = %e, "Skipping feed");
            return None;
        }
    };
    let posts_endpoint = site.posts_endpoint(&base)?;
    let per_page = args.max.unwrap_or(DEFAULT_FEED_SIZE).clamp(1, 100);
    let mut endpoint = format!("{posts_endpoint}?per_page={per_page}");
    if site.embed {
        endpoint.push_str("&_embed");
    }

    let posts = match fetch_listing(fetcher, &endpoint, site).await {
        Ok(posts) => posts,
        Err(e) => {
            warn!(error = %e, "Posts listing failed");
            return None;
        }
    };
    info!(count = posts.len(), "Fetched posts listing");

    let cutoff = args
        .age
        .and_then(|hours| i64::try_from(hours).ok())
        .map(|hours| (Utc::now() - Duration::hours(hours)).timestamp() as f64);

    let base_ref = &base;
    let items: Vec<Item> = stream::iter(posts)
        .then(move |mut post| async move {
            let link = post
                .get("link")
                .and_then(Value::as_str)
                .and_then(|l| Url::parse(l).ok())
                .unwrap_or_else(|| base_ref.clone());
            fill_featured_media(fetcher, &link, &mut post, site).await;
            match build_item(&post, None, &link, args, site) {
                Ok(item) => Some(item),
                Err(e) => {
                    warn!(error = %e, "Dropping incomplete item");
                    None
                }
            }
        })
        .filter_map(|item| async move { item })
        .filter(|item| {
            let fresh = match (cutoff, item.timestamp) {
                (Some(cutoff), Some(ts)) => ts >= cutoff,
                _ => true,
            };
            if !fresh {
                debug!(id = %item.id, "Dropping item older than age limit");
            }
            async move { fresh }
        })
        .collect()
        .await;

    let title = feed_title(fetcher, &base, site).await;
    let feed = Feed::new(title, items, args.max);
    info!(items = feed.items.len(), title = %feed.title, "Built feed");
    Some(feed)
}

fn parse_url(raw: &str) -> Result<Url, HandlerError> {
    Url::parse(raw.trim()).map_err(|e| HandlerError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })
}

/// Posts listing as returned by the REST API. An empty listing is valid.
async fn fetch_listing<F: FetchAsync>(
    fetcher: &F,
    endpoint: &str,
    site: &SiteConfig,
) -> Result<Vec<Value>, HandlerError> {
    let body = fetcher.get_text(endpoint, &site.headers).await?;
    let value: Value = serde_json::from_str(body.trim()).map_err(|source| HandlerError::Parse {
        context: endpoint.to_string(),
        source,
    })?;
    match value {
        Value::Array(posts) => Ok(posts),
        Value::Null => Ok(Vec::new()),
        other => {
            debug!(body = %truncate_for_log(&other.to_string(), 200), "Posts listing is not an array");
            Err(HandlerError::Empty {
                url: endpoint.to_string(),
            })
        }
    }
}

async fn feed_title<F: FetchAsync>(fetcher: &F, base: &Url, site: &SiteConfig) -> String {
    if let Some(title) = site.feed_title.as_deref().filter(|t| !t.trim().is_empty()) {
        return title.to_string();
    }
    if let Some(root) = site.wpjson_base(base) {
        match get_json(fetcher, &root, &site.headers).await {
            Ok(value) => {
                if let Some(name) = value
                    .get("name")
                    .and_then(Value::as_str)
                    .map(clean_text)
                    .filter(|n| !n.is_empty())
                {
                    return name;
                }
            }
            Err(e) => debug!(error = %e, "WP JSON root unavailable for feed title"),
        }
    }
    base.host_str().unwrap_or_default().to_string()
}

/// Pull the featured media object when the post only carries its id.
async fn fill_featured_media<F: FetchAsync>(
    fetcher: &F,
    article: &Url,
    post: &mut Value,
    site: &SiteConfig,
) {
    if post.pointer("/_embedded/wp:featuredmedia/0/source_url").is_some() {
        return;
    }
    let Some(media_id) = post
        .get("featured_media")
        .and_then(Value::as_u64)
        .filter(|id| *id > 0)
    else {
        return;
    };
    let Some(root) = site.wpjson_base(article) else {
        return;
    };
    let endpoint = format!("{root}/wp/v2/media/{media_id}");
    match get_json(fetcher, &endpoint, &site.headers).await {
        Ok(media) => {
            if let Some(obj) = post.as_object_mut() {
                let embedded = obj
                    .entry("_embedded")
                    .or_insert_with(|| Value::Object(Default::default()));
                if let Some(embedded) = embedded.as_object_mut() {
                    embedded.insert("wp:featuredmedia".to_string(), Value::Array(vec![media]));
                }
            }
        }
        Err(e) => debug!(%endpoint, error = %e, "Featured media lookup failed"),
    }
}

/// Id as the site reports it; numeric ids are rendered without quotes.
fn post_id(post: &Value) -> Option<String> {
    match post.get("id")? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

fn post_blocks<'p>(post: &'p Value) -> Option<&'p Vec<Value>> {
    ["/blocks", "/content/blocks", "/block_data"]
        .iter()
        .find_map(|p| post.pointer(p).and_then(Value::as_array))
        .filter(|blocks| !blocks.is_empty())
}

fn format_body(f: &mut ContentFormatter, post: &Value, site: &SiteConfig) -> String {
    if site.use_blocks
        && let Some(blocks) = post_blocks(post)
    {
        let html = blocks::format_blocks(f, blocks);
        if !html.trim().is_empty() {
            return html;
        }
        debug!("Block list rendered empty, using content.rendered");
    }
    post.pointer("/content/rendered")
        .and_then(Value::as_str)
        .map(|html| f.format_html(html))
        .unwrap_or_default()
}

/// Subtitle text at the configured JSON pointer (`rendered` objects allowed).
fn subtitle(post: &Value, site: &SiteConfig) -> Option<String> {
    let field = site.subtitle_field.as_deref()?;
    let pointer = if field.starts_with('/') {
        field.to_string()
    } else {
        format!("/{}", field.replace('.', "/"))
    };
    let value = post.pointer(&pointer)?;
    let raw = value
        .as_str()
        .or_else(|| value.get("rendered").and_then(Value::as_str))?;
    Some(clean_text(raw)).filter(|s| !s.is_empty())
}

/// Whether `body` already shows `image`, ignoring WP size variants.
fn body_has_image(body: &str, image: &str) -> bool {
    if body.contains(image) {
        return true;
    }
    let file = image
        .split(['?', '#'])
        .next()
        .and_then(|p| p.rsplit('/').next())
        .unwrap_or_default();
    let stem = SIZE_SUFFIX_RE.replace(file, "");
    !stem.is_empty() && body.contains(stem.as_ref())
}

/// Output assembler: metadata plus formatted body into a checked [`Item`].
fn build_item(
    post: &Value,
    page: Option<PageData>,
    article: &Url,
    args: &Args,
    site: &SiteConfig,
) -> Result<Item, HandlerError> {
    let meta: Metadata = Sources::new(Some(post), page).assemble();
    let link = post
        .get("link")
        .and_then(Value::as_str)
        .filter(|l| !l.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| article.to_string());

    let mut formatter = ContentFormatter::new(article.clone(), site);
    let image = meta.image.as_deref().map(|src| formatter.resolve(src));

    let mut item = Item {
        id: post_id(post).unwrap_or_default(),
        url: link,
        title: meta.title.clone().unwrap_or_default(),
        date_modified: meta.date_modified.map(|d| d.to_rfc3339()),
        tags: meta.tags.clone(),
        summary: meta.summary.clone(),
        image: image.clone(),
        ..Item::default()
    };
    if let Some(published) = meta.date_published {
        item.set_published(published);
    }
    item.set_authors(&meta.authors);

    if args.embed {
        item.content_html = render::embed_card(
            &item.url,
            &item.title,
            image.as_deref(),
            item.summary.as_deref(),
            item.author.as_ref().map(|a| a.name.as_str()),
        );
    } else {
        let body = format_body(&mut formatter, post, site);
        let mut content = String::new();
        if !body.trim().is_empty() {
            if let Some(src) = image.as_deref()
                && !site.skip_lede_image
                && !body_has_image(&body, src)
            {
                let caption = meta.image_caption.as_deref().map(encode_text);
                content.push_str(&render::add_image(src, caption.as_deref(), None));
                item.lede_image = Some(src.to_string());
            }
            if let Some(sub) = subtitle(post, site) {
                content.push_str(&format!("<p><em>{}</em></p>", encode_text(&sub)));
            }
            content.push_str(&body);
        }
        item.content_html = content;

        let media = formatter.media;
        item.gallery = media.gallery;
        item.audio = media.audio;
        item.video = media.video;
        item.attachments = media.attachments;
    }

    if let Some(field) = item.missing_field() {
        return Err(HandlerError::MissingField {
            field,
            url: item.url,
        });
    }
    Ok(item)
}

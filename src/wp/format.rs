//! HTML content block formatter.
//!
//! [`ContentFormatter`] walks a parsed post body and re-serializes it,
//! dispatching each element through an ordered table of
//! `(name, predicate, renderer)` rules. The first matching rule decides what
//! happens to the element; elements no rule claims are written back as they
//! were, with `src`/`href` made absolute.
//!
//! New publisher widgets are supported by appending a rule to [`RULES`].

use crate::config::SiteConfig;
use crate::models::Attachment;
use crate::render;
use crate::utils::{absolutize, clean_text, largest_from_srcset};
use html_escape::{encode_double_quoted_attribute, encode_text};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::fmt::Write as _;
use tracing::{debug, instrument, warn};
use url::Url;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

const DROPPED_ATTRS: &[&str] = &["srcset", "sizes", "loading", "decoding", "fetchpriority"];

static IMG: Lazy<Selector> = Lazy::new(|| Selector::parse("img").unwrap());
static FIGCAPTION: Lazy<Selector> =
    Lazy::new(|| Selector::parse("figcaption, .wp-caption-text, .gallery-caption").unwrap());
static IFRAME: Lazy<Selector> = Lazy::new(|| Selector::parse("iframe").unwrap());
static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static VIDEO: Lazy<Selector> = Lazy::new(|| Selector::parse("video").unwrap());
static AUDIO: Lazy<Selector> = Lazy::new(|| Selector::parse("audio").unwrap());
static SOURCE: Lazy<Selector> = Lazy::new(|| Selector::parse("source[src]").unwrap());
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());
static CITE: Lazy<Selector> = Lazy::new(|| Selector::parse("cite, footer").unwrap());
static TABLE_ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").unwrap());
static TABLE: Lazy<Selector> = Lazy::new(|| Selector::parse("table").unwrap());
static TABLE_CAPTION: Lazy<Selector> =
    Lazy::new(|| Selector::parse("figcaption, caption").unwrap());
static EMBED_WRAPPER: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".wp-block-embed__wrapper").unwrap());
static REVIEW_TITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".review-title, .lets-review-title, h2, h3").unwrap());
static REVIEW_SCORE: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".review-total-box, .review-score, .lets-review-score, [data-score]").unwrap()
});
static REVIEW_SUMMARY: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".review-desc, .review-summary, .lets-review-conclusion").unwrap());
static PROS: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".review-pros li, .pros li, .wp-block-pros li, .pros-list li").unwrap()
});
static CONS: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".review-cons li, .cons li, .wp-block-cons li, .cons-list li").unwrap()
});

static RATING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*(?:out of|/|of)\s*(\d+)").unwrap());
static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?").unwrap());
static IMAGE_EXT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.(?:jpe?g|png|gif|webp|avif)(?:\?|$)").unwrap());

/// Audio, video and gallery media found while formatting.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Media {
    pub gallery: Vec<String>,
    pub audio: Option<String>,
    pub video: Option<String>,
    pub attachments: Vec<Attachment>,
}

/// What a renderer decided to do with an element.
#[derive(Debug, PartialEq)]
pub enum Rendered {
    /// Replace the element with this HTML.
    Html(String),
    /// Drop the element and its subtree.
    Skip,
    /// Emit only the element's children.
    Unwrap,
    /// Serialize the element unchanged.
    Default,
}

type Predicate = fn(&ElementRef<'_>) -> bool;
type Renderer = fn(&mut ContentFormatter, ElementRef<'_>) -> Rendered;

struct Rule {
    name: &'static str,
    matches: Predicate,
    render: Renderer,
}

/// Ordered rule table. The first rule whose predicate matches wins.
static RULES: &[Rule] = &[
    Rule { name: "strip", matches: is_stripped_tag, render: skip },
    Rule { name: "widget", matches: is_widget, render: skip },
    Rule { name: "layout", matches: is_layout_wrapper, render: unwrap },
    Rule { name: "spacer", matches: is_spacer, render: skip },
    Rule { name: "separator", matches: is_separator, render: render_separator },
    Rule { name: "gallery", matches: is_gallery, render: render_gallery },
    Rule { name: "embed", matches: is_wp_embed, render: render_wp_embed },
    Rule { name: "social", matches: is_social_blockquote, render: render_social_blockquote },
    Rule { name: "iframe", matches: is_iframe, render: render_iframe },
    Rule { name: "video", matches: is_video, render: render_video },
    Rule { name: "audio", matches: is_audio, render: render_audio },
    Rule { name: "pullquote", matches: is_pullquote, render: render_pullquote },
    Rule { name: "quote", matches: is_wp_quote, render: render_quote },
    Rule { name: "review", matches: is_review_box, render: render_review },
    Rule { name: "pros_cons", matches: is_pros_cons, render: render_pros_cons },
    Rule { name: "stars", matches: is_star_rating, render: render_stars },
    Rule { name: "table", matches: is_table, render: render_table },
    Rule { name: "code", matches: is_code_block, render: render_code },
    Rule { name: "button", matches: is_button, render: render_button },
    Rule { name: "figure", matches: is_image_figure, render: render_image_figure },
    Rule { name: "img", matches: is_img, render: render_img },
];

/// Re-serializes post HTML into portable markup.
pub struct ContentFormatter {
    base: Url,
    decompose: Vec<Selector>,
    unwrap: Vec<Selector>,
    rename: Vec<(Selector, String)>,
    rewrites: Vec<(Regex, String)>,
    rename_blocks: HashMap<String, String>,
    pub media: Media,
}

fn parse_selectors(site_key: &str, selectors: &[String]) -> Vec<Selector> {
    selectors
        .iter()
        .filter_map(|css| match Selector::parse(css) {
            Ok(sel) => Some(sel),
            Err(e) => {
                warn!(key = site_key, selector = %css, error = %e, "Ignoring invalid selector");
                None
            }
        })
        .collect()
}

impl ContentFormatter {
    pub fn new(base: Url, site: &SiteConfig) -> Self {
        let rename = site
            .rename
            .iter()
            .filter_map(|r| match Selector::parse(&r.selector) {
                Ok(sel) => Some((sel, r.tag.clone())),
                Err(e) => {
                    warn!(selector = %r.selector, error = %e, "Ignoring invalid rename selector");
                    None
                }
            })
            .collect();
        Self {
            base,
            decompose: parse_selectors("decompose", &site.decompose),
            unwrap: parse_selectors("unwrap", &site.unwrap),
            rename,
            rewrites: site.compiled_rewrites(),
            rename_blocks: site.rename_blocks.clone(),
            media: Media::default(),
        }
    }

    /// Block name after applying the site's block renames.
    pub(crate) fn block_name<'n>(&'n self, name: &'n str) -> &'n str {
        self.rename_blocks
            .get(name)
            .map(String::as_str)
            .unwrap_or(name)
    }

    /// Format an HTML fragment.
    #[instrument(level = "debug", skip_all, fields(bytes = html.len()))]
    pub fn format_html(&mut self, html: &str) -> String {
        let fragment = Html::parse_fragment(html);
        let mut out = String::with_capacity(html.len());
        self.write_children(fragment.root_element(), &mut out);
        out
    }

    /// Make a URL absolute and apply the site's rewrite templates.
    pub fn resolve(&self, href: &str) -> String {
        let mut url = absolutize(&self.base, href);
        for (re, replace) in &self.rewrites {
            url = re.replace_all(&url, replace.as_str()).into_owned();
        }
        url
    }

    fn format_inner(&mut self, el: ElementRef<'_>) -> String {
        let mut out = String::new();
        self.write_children(el, &mut out);
        out
    }

    fn write_children(&mut self, el: ElementRef<'_>, out: &mut String) {
        for child in el.children() {
            match child.value() {
                Node::Text(text) => out.push_str(&encode_text(&**text)),
                Node::Element(_) => {
                    if let Some(child_el) = ElementRef::wrap(child) {
                        self.write_element(child_el, out);
                    }
                }
                _ => {}
            }
        }
    }

    fn write_element(&mut self, el: ElementRef<'_>, out: &mut String) {
        if self.decompose.iter().any(|s| s.matches(&el)) {
            debug!(tag = el.value().name(), "Decomposed element");
            return;
        }
        if self.unwrap.iter().any(|s| s.matches(&el)) {
            self.write_children(el, out);
            return;
        }
        let renamed = self
            .rename
            .iter()
            .find(|(s, _)| s.matches(&el))
            .map(|(_, tag)| tag.clone());

        if renamed.is_none() {
            for rule in RULES {
                if !(rule.matches)(&el) {
                    continue;
                }
                debug!(rule = rule.name, tag = el.value().name(), "Matched rule");
                match (rule.render)(self, el) {
                    Rendered::Html(html) => {
                        out.push_str(&html);
                        return;
                    }
                    Rendered::Skip => return,
                    Rendered::Unwrap => {
                        self.write_children(el, out);
                        return;
                    }
                    Rendered::Default => break,
                }
            }
        }
        self.write_default(el, renamed.as_deref(), out);
    }

    fn write_default(&mut self, el: ElementRef<'_>, tag: Option<&str>, out: &mut String) {
        let name = tag.unwrap_or(el.value().name());
        out.push('<');
        out.push_str(name);
        for (key, value) in el.value().attrs() {
            if DROPPED_ATTRS.contains(&key) || key.starts_with("data-") || key.starts_with("on") {
                continue;
            }
            let value = match key {
                "href" | "src" | "poster" => self.resolve(value),
                _ => value.to_string(),
            };
            let _ = write!(out, " {}=\"{}\"", key, encode_double_quoted_attribute(&value));
        }
        out.push('>');
        if VOID_ELEMENTS.contains(&name) {
            return;
        }
        self.write_children(el, out);
        let _ = write!(out, "</{name}>");
    }
}

fn has_class(el: &ElementRef<'_>, class: &str) -> bool {
    el.value().classes().any(|c| c == class)
}

fn has_any_class(el: &ElementRef<'_>, classes: &[&str]) -> bool {
    el.value().classes().any(|c| classes.contains(&c))
}

fn is_tag(el: &ElementRef<'_>, name: &str) -> bool {
    el.value().name() == name
}

/// First image URL on an `img`, preferring lazy-load attributes over
/// placeholder `src` values.
fn image_src(img: &ElementRef<'_>) -> Option<String> {
    let v = img.value();
    for key in ["data-lazy-src", "data-src", "data-orig-file"] {
        if let Some(src) = v.attr(key).filter(|s| !s.trim().is_empty()) {
            return Some(src.to_string());
        }
    }
    if let Some(best) = v
        .attr("data-srcset")
        .or_else(|| v.attr("srcset"))
        .and_then(largest_from_srcset)
    {
        return Some(best);
    }
    v.attr("src")
        .filter(|s| !s.trim().is_empty() && !s.starts_with("data:"))
        .map(str::to_string)
}

fn parent_link(el: &ElementRef<'_>) -> Option<String> {
    el.parent()
        .and_then(ElementRef::wrap)
        .filter(|p| is_tag(p, "a"))
        .and_then(|p| p.value().attr("href"))
        .map(str::to_string)
}

pub(crate) fn mime_for(url: &str, kind: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_lowercase();
    let ext = path.rsplit('.').next().unwrap_or("");
    match ext {
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "m3u8" => "application/x-mpegURL",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "ogg" | "oga" => "audio/ogg",
        "wav" => "audio/wav",
        _ if kind == "video" => "video/mp4",
        _ => "audio/mpeg",
    }
    .to_string()
}

fn skip(_: &mut ContentFormatter, _: ElementRef<'_>) -> Rendered {
    Rendered::Skip
}

fn unwrap(_: &mut ContentFormatter, _: ElementRef<'_>) -> Rendered {
    Rendered::Unwrap
}

fn is_stripped_tag(el: &ElementRef<'_>) -> bool {
    matches!(
        el.value().name(),
        "script" | "style" | "noscript" | "form" | "button" | "template" | "link" | "meta" | "input"
    )
}

fn is_widget(el: &ElementRef<'_>) -> bool {
    has_any_class(
        el,
        &[
            "sharedaddy",
            "jp-relatedposts",
            "addtoany_share_save_container",
            "social-share",
            "share-buttons",
            "related-posts",
            "newsletter-signup",
            "adsbygoogle",
            "ad",
            "advert",
            "advertisement",
            "wp-block-post-comments",
        ],
    )
}

fn is_layout_wrapper(el: &ElementRef<'_>) -> bool {
    has_any_class(
        el,
        &[
            "wp-block-columns",
            "wp-block-column",
            "wp-block-group",
            "wp-block-group__inner-container",
            "wp-block-cover__inner-container",
            "wp-block-buttons",
        ],
    )
}

fn is_spacer(el: &ElementRef<'_>) -> bool {
    has_class(el, "wp-block-spacer")
}

fn is_separator(el: &ElementRef<'_>) -> bool {
    is_tag(el, "hr") && has_class(el, "wp-block-separator")
}

fn render_separator(_: &mut ContentFormatter, _: ElementRef<'_>) -> Rendered {
    Rendered::Html("<hr/>".to_string())
}

fn is_gallery(el: &ElementRef<'_>) -> bool {
    has_any_class(
        el,
        &["wp-block-gallery", "gallery", "tiled-gallery", "blocks-gallery-grid"],
    )
}

/// Closest gallery item wrapping `img`, stopping at the gallery element.
fn gallery_item<'a>(img: &ElementRef<'a>, gallery: &ElementRef<'a>) -> Option<ElementRef<'a>> {
    img.ancestors()
        .take_while(|n| n.id() != gallery.id())
        .filter_map(ElementRef::wrap)
        .find(|a| {
            matches!(a.value().name(), "figure" | "li" | "dl")
                || has_any_class(a, &["gallery-item", "tiled-gallery-item"])
        })
}

fn render_gallery(f: &mut ContentFormatter, el: ElementRef<'_>) -> Rendered {
    let mut images = Vec::new();
    for img in el.select(&IMG) {
        let Some(src) = image_src(&img) else {
            continue;
        };
        let thumb = f.resolve(&src);
        let full = parent_link(&img)
            .filter(|href| IMAGE_EXT_RE.is_match(href))
            .map(|href| f.resolve(&href))
            .unwrap_or_else(|| thumb.clone());
        let caption = gallery_item(&img, &el)
            .and_then(|item| item.select(&FIGCAPTION).next())
            .map(|c| f.format_inner(c).trim().to_string())
            .filter(|c| !c.is_empty());
        f.media.gallery.push(full.clone());
        images.push((thumb, full, caption));
    }
    if images.is_empty() {
        warn!("Gallery without images; skipping");
        return Rendered::Skip;
    }
    let caption = el
        .children()
        .filter_map(ElementRef::wrap)
        .find(|c| is_tag(c, "figcaption"))
        .map(|c| f.format_inner(c));
    Rendered::Html(render::add_gallery(&images, caption.as_deref()))
}

fn is_wp_embed(el: &ElementRef<'_>) -> bool {
    has_class(el, "wp-block-embed")
}

fn render_wp_embed(f: &mut ContentFormatter, el: ElementRef<'_>) -> Rendered {
    let from_wrapper = el
        .select(&EMBED_WRAPPER)
        .next()
        .map(|w| w.text().collect::<String>().trim().to_string())
        .filter(|t| t.starts_with("http"));
    let url = from_wrapper
        .or_else(|| {
            el.select(&IFRAME).next().and_then(|i| {
                i.value()
                    .attr("src")
                    .or_else(|| i.value().attr("data-src"))
                    .map(str::to_string)
            })
        })
        .or_else(|| {
            el.select(&LINK)
                .last()
                .and_then(|a| a.value().attr("href").map(str::to_string))
        });
    match url {
        Some(url) => Rendered::Html(render::add_embed(&f.resolve(&url))),
        None => {
            warn!("Embed block without a URL; skipping");
            Rendered::Skip
        }
    }
}

fn is_social_blockquote(el: &ElementRef<'_>) -> bool {
    is_tag(el, "blockquote")
        && has_any_class(
            el,
            &["twitter-tweet", "twitter-video", "instagram-media", "tiktok-embed", "bluesky-embed"],
        )
}

fn render_social_blockquote(f: &mut ContentFormatter, el: ElementRef<'_>) -> Rendered {
    let v = el.value();
    let url = v
        .attr("data-instgrm-permalink")
        .or_else(|| v.attr("cite"))
        .map(str::to_string)
        .or_else(|| {
            el.select(&LINK)
                .last()
                .and_then(|a| a.value().attr("href").map(str::to_string))
        });
    match url {
        Some(url) => Rendered::Html(render::add_embed(&f.resolve(&url))),
        None => {
            warn!(class = v.attr("class").unwrap_or(""), "Social embed without a link; skipping");
            Rendered::Skip
        }
    }
}

fn is_iframe(el: &ElementRef<'_>) -> bool {
    is_tag(el, "iframe")
}

fn render_iframe(f: &mut ContentFormatter, el: ElementRef<'_>) -> Rendered {
    let src = el
        .value()
        .attr("src")
        .or_else(|| el.value().attr("data-src"))
        .filter(|s| !s.trim().is_empty() && *s != "about:blank");
    match src {
        Some(src) => Rendered::Html(render::add_embed(&f.resolve(src))),
        None => {
            warn!("iframe without src; skipping");
            Rendered::Skip
        }
    }
}

fn is_video(el: &ElementRef<'_>) -> bool {
    is_tag(el, "video") || has_class(el, "wp-block-video")
}

fn render_video(f: &mut ContentFormatter, el: ElementRef<'_>) -> Rendered {
    let video = if is_tag(&el, "video") {
        Some(el)
    } else {
        el.select(&VIDEO).next()
    };
    let Some(video) = video else {
        warn!("Video block without a video element; skipping");
        return Rendered::Skip;
    };
    let src = video
        .value()
        .attr("src")
        .map(str::to_string)
        .or_else(|| {
            video
                .select(&SOURCE)
                .next()
                .and_then(|s| s.value().attr("src").map(str::to_string))
        });
    let Some(src) = src.map(|s| f.resolve(&s)) else {
        warn!("Video without a source; skipping");
        return Rendered::Skip;
    };
    let poster = video.value().attr("poster").map(|p| f.resolve(p));
    let caption = el.select(&FIGCAPTION).next().map(|c| f.format_inner(c));

    if f.media.video.is_none() {
        f.media.video = Some(src.clone());
    }
    f.media.attachments.push(Attachment {
        mime_type: mime_for(&src, "video"),
        url: src.clone(),
        title: caption.as_deref().map(clean_text).filter(|c| !c.is_empty()),
    });
    Rendered::Html(render::add_video(&src, poster.as_deref(), caption.as_deref()))
}

fn is_audio(el: &ElementRef<'_>) -> bool {
    is_tag(el, "audio") || has_class(el, "wp-block-audio")
}

fn render_audio(f: &mut ContentFormatter, el: ElementRef<'_>) -> Rendered {
    let audio = if is_tag(&el, "audio") {
        Some(el)
    } else {
        el.select(&AUDIO).next()
    };
    let src = audio.and_then(|a| {
        a.value().attr("src").map(str::to_string).or_else(|| {
            a.select(&SOURCE)
                .next()
                .and_then(|s| s.value().attr("src").map(str::to_string))
        })
    });
    let Some(src) = src.map(|s| f.resolve(&s)) else {
        warn!("Audio block without a source; skipping");
        return Rendered::Skip;
    };
    let title = el
        .select(&FIGCAPTION)
        .next()
        .map(|c| clean_text(&c.inner_html()))
        .filter(|c| !c.is_empty());

    if f.media.audio.is_none() {
        f.media.audio = Some(src.clone());
    }
    f.media.attachments.push(Attachment {
        mime_type: mime_for(&src, "audio"),
        url: src.clone(),
        title: title.clone(),
    });
    Rendered::Html(render::add_audio(&src, title.as_deref()))
}

fn is_pullquote(el: &ElementRef<'_>) -> bool {
    has_any_class(
        el,
        &["wp-block-pullquote", "pullquote", "pull-quote", "td_pull_quote", "article-pullquote"],
    )
}

fn render_pullquote(_: &mut ContentFormatter, el: ElementRef<'_>) -> Rendered {
    let cite = el
        .select(&CITE)
        .next()
        .map(|c| clean_text(&c.inner_html()))
        .filter(|c| !c.is_empty());
    let mut lines: Vec<String> = el
        .select(&PARAGRAPH)
        .map(|p| clean_text(&p.inner_html()))
        .filter(|p| !p.is_empty())
        .collect();
    if lines.is_empty() {
        let all = clean_text(&el.inner_html());
        let quote = match &cite {
            Some(c) => all.trim_end_matches(c.as_str()).trim().to_string(),
            None => all,
        };
        if !quote.is_empty() {
            lines.push(quote);
        }
    }
    if lines.is_empty() {
        warn!("Empty pull quote; skipping");
        return Rendered::Skip;
    }
    let quote = lines.iter().map(|l| encode_text(l)).join("<br/><br/>");
    let cite = cite.map(|c| encode_text(&c).into_owned());
    Rendered::Html(render::add_pullquote(&quote, cite.as_deref()))
}

fn is_wp_quote(el: &ElementRef<'_>) -> bool {
    is_tag(el, "blockquote") && has_class(el, "wp-block-quote")
}

fn render_quote(f: &mut ContentFormatter, el: ElementRef<'_>) -> Rendered {
    let inner = f.format_inner(el);
    Rendered::Html(render::add_blockquote(inner.trim()))
}

fn is_review_box(el: &ElementRef<'_>) -> bool {
    has_any_class(
        el,
        &["wp-review-box", "review-box", "lets-review-block", "wp-block-review", "review-summary-box"],
    )
}

fn parse_score(text: &str) -> Option<(f64, u32)> {
    if let Some(caps) = RATING_RE.captures(text) {
        let score = caps[1].parse::<f64>().ok()?;
        let max = caps[2].parse::<u32>().ok()?;
        return Some((score, max));
    }
    let score = NUMBER_RE.find(text)?.as_str().parse::<f64>().ok()?;
    let max = if score <= 5.0 {
        5
    } else if score <= 10.0 {
        10
    } else {
        100
    };
    Some((score, max))
}

fn list_entries(el: &ElementRef<'_>, sel: &Selector) -> Vec<String> {
    el.select(sel)
        .map(|li| clean_text(&li.inner_html()))
        .filter(|t| !t.is_empty())
        .map(|t| encode_text(&t).into_owned())
        .collect()
}

fn score_html(score: f64, max: u32) -> String {
    if max <= 10 {
        render::add_stars(score, max)
    } else {
        format!("<b>{score}/{max}</b>")
    }
}

fn render_review(_: &mut ContentFormatter, el: ElementRef<'_>) -> Rendered {
    let title = el
        .select(&REVIEW_TITLE)
        .next()
        .map(|t| clean_text(&t.inner_html()))
        .filter(|t| !t.is_empty());
    let score = el.select(&REVIEW_SCORE).next().and_then(|s| {
        s.value()
            .attr("data-score")
            .map(str::to_string)
            .or_else(|| Some(clean_text(&s.inner_html())))
            .and_then(|t| parse_score(&t))
    });
    let summary = el
        .select(&REVIEW_SUMMARY)
        .next()
        .map(|s| clean_text(&s.inner_html()))
        .filter(|s| !s.is_empty());
    let pros = list_entries(&el, &PROS);
    let cons = list_entries(&el, &CONS);

    if title.is_none() && score.is_none() && summary.is_none() && pros.is_empty() && cons.is_empty() {
        warn!("Review box with no recognizable fields; skipping");
        return Rendered::Skip;
    }

    let mut html = String::from(
        r#"<div style="margin:1em 0; padding:1em; border:1px solid #ccc; border-radius:10px;">"#,
    );
    if let Some(title) = title {
        let _ = write!(html, "<h3>{}</h3>", encode_text(&title));
    }
    if let Some((score, max)) = score {
        let _ = write!(html, "<div>{}</div>", score_html(score, max));
    }
    if let Some(summary) = summary {
        let _ = write!(html, "<p>{}</p>", encode_text(&summary));
    }
    if !pros.is_empty() || !cons.is_empty() {
        html.push_str(&render::add_pros_cons(&pros, &cons));
    }
    html.push_str("</div>");
    Rendered::Html(html)
}

fn is_pros_cons(el: &ElementRef<'_>) -> bool {
    has_any_class(el, &["pros-cons", "pros-and-cons", "wp-block-pros-and-cons", "pros-cons-box"])
}

fn render_pros_cons(_: &mut ContentFormatter, el: ElementRef<'_>) -> Rendered {
    let pros = list_entries(&el, &PROS);
    let cons = list_entries(&el, &CONS);
    if pros.is_empty() && cons.is_empty() {
        warn!("Pros/cons box without entries; skipping");
        return Rendered::Skip;
    }
    Rendered::Html(render::add_pros_cons(&pros, &cons))
}

fn is_star_rating(el: &ElementRef<'_>) -> bool {
    has_any_class(el, &["star-rating", "wp-block-rating", "rating-stars"])
}

fn render_stars(_: &mut ContentFormatter, el: ElementRef<'_>) -> Rendered {
    let v = el.value();
    let text = v
        .attr("data-rating")
        .or_else(|| v.attr("aria-label"))
        .or_else(|| v.attr("title"))
        .map(str::to_string)
        .unwrap_or_else(|| clean_text(&el.inner_html()));
    match parse_score(&text) {
        Some((score, max)) => Rendered::Html(format!("<p>{}</p>", score_html(score, max))),
        None => {
            warn!(%text, "Unparseable star rating; skipping");
            Rendered::Skip
        }
    }
}

fn is_table(el: &ElementRef<'_>) -> bool {
    is_tag(el, "table") || has_class(el, "wp-block-table")
}

fn render_table(f: &mut ContentFormatter, el: ElementRef<'_>) -> Rendered {
    let table = if is_tag(&el, "table") {
        Some(el)
    } else {
        el.select(&TABLE).next()
    };
    let Some(table) = table else {
        warn!("Table block without a table; skipping");
        return Rendered::Skip;
    };
    let mut rows = String::new();
    for tr in table.select(&TABLE_ROW) {
        rows.push_str("<tr>");
        for cell in tr.children().filter_map(ElementRef::wrap) {
            let tag = match cell.value().name() {
                "th" => "th",
                "td" => "td",
                _ => continue,
            };
            let span = ["colspan", "rowspan"]
                .iter()
                .filter_map(|k| cell.value().attr(k).map(|v| format!(r#" {k}="{}""#, encode_double_quoted_attribute(v))))
                .join("");
            let inner = f.format_inner(cell);
            let _ = write!(
                rows,
                r#"<{tag}{span} style="border:1px solid #ccc; padding:4px;">{}</{tag}>"#,
                inner.trim()
            );
        }
        rows.push_str("</tr>");
    }
    if rows.is_empty() {
        warn!("Table without rows; skipping");
        return Rendered::Skip;
    }
    let caption = el
        .select(&TABLE_CAPTION)
        .next()
        .map(|c| f.format_inner(c))
        .filter(|c| !c.trim().is_empty())
        .map(|c| format!("<div><small>{}</small></div>", c.trim()))
        .unwrap_or_default();
    Rendered::Html(format!(
        r#"<table style="width:100%; border-collapse:collapse;">{rows}</table>{caption}"#
    ))
}

fn is_code_block(el: &ElementRef<'_>) -> bool {
    is_tag(el, "pre") && has_any_class(el, &["wp-block-code", "wp-block-preformatted"])
}

fn render_code(_: &mut ContentFormatter, el: ElementRef<'_>) -> Rendered {
    let code: String = el.text().collect();
    Rendered::Html(format!(
        r#"<pre style="margin-left:2em; padding:0.5em; white-space:pre-wrap; background:#f2f2f2;">{}</pre>"#,
        encode_text(&code)
    ))
}

fn is_button(el: &ElementRef<'_>) -> bool {
    has_class(el, "wp-block-button")
}

fn render_button(f: &mut ContentFormatter, el: ElementRef<'_>) -> Rendered {
    let Some(link) = el.select(&LINK).next() else {
        return Rendered::Skip;
    };
    let href = f.resolve(link.value().attr("href").unwrap_or_default());
    let label = clean_text(&link.inner_html());
    Rendered::Html(format!(
        r#"<p><a href="{}"><b>{}</b></a></p>"#,
        encode_double_quoted_attribute(&href),
        encode_text(&label)
    ))
}

fn is_image_figure(el: &ElementRef<'_>) -> bool {
    (is_tag(el, "figure") || has_class(el, "wp-caption")) && el.select(&IMG).next().is_some()
}

fn render_image_figure(f: &mut ContentFormatter, el: ElementRef<'_>) -> Rendered {
    let Some(img) = el.select(&IMG).next() else {
        return Rendered::Default;
    };
    let Some(src) = image_src(&img) else {
        warn!("Image figure without a usable source; skipping");
        return Rendered::Skip;
    };
    let src = f.resolve(&src);
    let link = parent_link(&img).map(|href| f.resolve(&href));
    let caption = el
        .select(&FIGCAPTION)
        .next()
        .map(|c| f.format_inner(c))
        .filter(|c| !c.trim().is_empty());
    Rendered::Html(render::add_image(&src, caption.as_deref(), link.as_deref()))
}

fn is_img(el: &ElementRef<'_>) -> bool {
    is_tag(el, "img")
}

fn render_img(f: &mut ContentFormatter, el: ElementRef<'_>) -> Rendered {
    let v = el.value();
    if has_class(&el, "emoji") || has_class(&el, "wp-smiley") {
        return Rendered::Html(encode_text(v.attr("alt").unwrap_or_default()).into_owned());
    }
    if v.attr("width") == Some("1") || v.attr("height") == Some("1") {
        debug!("Dropping tracking pixel");
        return Rendered::Skip;
    }
    let Some(src) = image_src(&el) else {
        warn!("img without a usable source; skipping");
        return Rendered::Skip;
    };
    let src = f.resolve(&src);
    let alt = v
        .attr("alt")
        .map(|a| format!(r#" alt="{}""#, encode_double_quoted_attribute(a)))
        .unwrap_or_default();
    Rendered::Html(format!(
        r#"<img src="{}"{alt} loading="lazy" style="max-width:100%; height:auto;"/>"#,
        encode_double_quoted_attribute(&src)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RenameRule, UrlRewrite};

    fn formatter() -> ContentFormatter {
        ContentFormatter::new(
            Url::parse("https://example.com/2024/01/post/").unwrap(),
            &SiteConfig::default(),
        )
    }

    #[test]
    fn test_bare_paragraph_is_unchanged() {
        let mut f = formatter();
        assert_eq!(f.format_html("<p>Hello</p>"), "<p>Hello</p>");
        assert_eq!(
            f.format_html("<p>Tom &amp; Jerry <em>&lt;3</em></p>\n<h2>Next</h2>"),
            "<p>Tom &amp; Jerry <em>&lt;3</em></p>\n<h2>Next</h2>"
        );
    }

    #[test]
    fn test_comments_and_scripts_are_removed() {
        let mut f = formatter();
        let html = "<!-- wp:paragraph --><p>A</p><!-- /wp:paragraph --><script>alert(1)</script><style>p{}</style>";
        assert_eq!(f.format_html(html), "<p>A</p>");
    }

    #[test]
    fn test_links_become_absolute_and_lazy_attrs_drop() {
        let mut f = formatter();
        let html = r#"<p><a href="/about">About</a></p><p><span data-id="7">x</span></p>"#;
        assert_eq!(
            f.format_html(html),
            r#"<p><a href="https://example.com/about">About</a></p><p><span>x</span></p>"#
        );
    }

    #[test]
    fn test_unknown_class_passes_through() {
        let mut f = formatter();
        let html = r#"<div class="totally-new-widget"><p>Kept</p></div>"#;
        assert_eq!(f.format_html(html), html);
    }

    #[test]
    fn test_site_decompose_unwrap_rename() {
        let site = SiteConfig {
            decompose: vec![".promo".to_string()],
            unwrap: vec!["div.inner".to_string()],
            rename: vec![RenameRule {
                selector: "p.subhead".to_string(),
                tag: "h3".to_string(),
            }],
            ..SiteConfig::default()
        };
        let mut f = ContentFormatter::new(Url::parse("https://example.com/").unwrap(), &site);
        let html = r#"<div class="promo"><p>Buy</p></div><div class="inner"><p>Body</p></div><p class="subhead">Sub</p>"#;
        assert_eq!(
            f.format_html(html),
            r#"<p>Body</p><h3 class="subhead">Sub</h3>"#
        );
    }

    #[test]
    fn test_url_rewrites_apply_to_emitted_urls() {
        let site = SiteConfig {
            url_rewrites: vec![UrlRewrite {
                pattern: r"-\d+x\d+(\.jpg)".to_string(),
                replace: "$1".to_string(),
            }],
            ..SiteConfig::default()
        };
        let mut f = ContentFormatter::new(Url::parse("https://example.com/").unwrap(), &site);
        let out = f.format_html(r#"<img src="/uploads/pic-300x200.jpg">"#);
        assert!(out.contains(r#"src="https://example.com/uploads/pic.jpg""#), "{out}");
    }

    #[test]
    fn test_image_figure_with_caption() {
        let mut f = formatter();
        let html = r#"<figure class="wp-block-image size-large"><img src="data:image/gif;base64,R0l" data-src="/wp-content/uploads/a.jpg" alt=""><figcaption class="wp-element-caption">A <em>cat</em></figcaption></figure>"#;
        let out = f.format_html(html);
        assert_eq!(
            out,
            render::add_image(
                "https://example.com/wp-content/uploads/a.jpg",
                Some("A <em>cat</em>"),
                None
            )
        );
    }

    #[test]
    fn test_classic_caption_uses_srcset() {
        let mut f = formatter();
        let html = r#"<div class="wp-caption"><img src="/a-300.jpg" srcset="/a-300.jpg 300w, /a-1024.jpg 1024w"><p class="wp-caption-text">Credit</p></div>"#;
        let out = f.format_html(html);
        assert!(out.contains(r#"src="https://example.com/a-1024.jpg""#), "{out}");
        assert!(out.contains("<small>Credit</small>"));
    }

    #[test]
    fn test_gallery_collects_images() {
        let mut f = formatter();
        let html = r#"<figure class="wp-block-gallery"><figure class="wp-block-image"><a href="/full1.jpg"><img src="/t1.jpg"></a><figcaption>One</figcaption></figure><figure class="wp-block-image"><img src="/t2.jpg"></figure><figcaption class="blocks-gallery-caption">Trip</figcaption></figure>"#;
        let out = f.format_html(html);
        assert_eq!(
            f.media.gallery,
            vec![
                "https://example.com/full1.jpg".to_string(),
                "https://example.com/t2.jpg".to_string()
            ]
        );
        assert!(out.contains("<small>One</small>"));
        assert!(out.contains("<small>Trip</small>"));
    }

    #[test]
    fn test_gallery_captions_stay_escaped() {
        let mut f = formatter();
        let html = r#"<figure class="wp-block-gallery"><figure class="wp-block-image"><img src="/t1.jpg"><figcaption>a &lt;img src=x onerror=alert(1)&gt; b</figcaption></figure></figure>"#;
        let out = f.format_html(html);
        assert!(out.contains("<small>a &lt;img src=x onerror=alert(1)&gt; b</small>"));
        assert!(!out.contains("<img src=x"));
    }

    #[test]
    fn test_youtube_embed_block() {
        let mut f = formatter();
        let html = r#"<figure class="wp-block-embed is-type-video wp-block-embed-youtube"><div class="wp-block-embed__wrapper">
https://www.youtube.com/watch?v=dQw4w9WgXcQ
</div></figure>"#;
        let out = f.format_html(html);
        assert_eq!(out, render::add_embed("https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
    }

    #[test]
    fn test_tweet_blockquote() {
        let mut f = formatter();
        let html = r#"<blockquote class="twitter-tweet"><p>Hi</p>&mdash; User <a href="https://twitter.com/user/status/123">Jan 1</a></blockquote>"#;
        let out = f.format_html(html);
        assert!(out.contains("https://twitter.com/user/status/123"));
        assert!(out.contains("View post on X"));
    }

    #[test]
    fn test_video_and_audio_are_recorded() {
        let mut f = formatter();
        let html = r#"<figure class="wp-block-video"><video controls poster="/p.jpg" src="/v.mp4"></video><figcaption>Clip</figcaption></figure><figure class="wp-block-audio"><audio src="/a.mp3"></audio><figcaption>Episode 1</figcaption></figure>"#;
        let out = f.format_html(html);
        assert_eq!(f.media.video.as_deref(), Some("https://example.com/v.mp4"));
        assert_eq!(f.media.audio.as_deref(), Some("https://example.com/a.mp3"));
        assert_eq!(f.media.attachments.len(), 2);
        assert_eq!(f.media.attachments[0].mime_type, "video/mp4");
        assert_eq!(f.media.attachments[1].mime_type, "audio/mpeg");
        assert!(out.contains("Episode 1"));
    }

    #[test]
    fn test_pullquote() {
        let mut f = formatter();
        let html = r#"<figure class="wp-block-pullquote"><blockquote><p>Be bold.</p><cite>Someone</cite></blockquote></figure>"#;
        assert_eq!(f.format_html(html), render::add_pullquote("Be bold.", Some("Someone")));
    }

    #[test]
    fn test_wp_quote_formats_children() {
        let mut f = formatter();
        let html = r#"<blockquote class="wp-block-quote"><p>Said <a href="/x">this</a></p></blockquote>"#;
        assert_eq!(
            f.format_html(html),
            render::add_blockquote(r#"<p>Said <a href="https://example.com/x">this</a></p>"#)
        );
    }

    #[test]
    fn test_table_normalization() {
        let mut f = formatter();
        let html = r#"<figure class="wp-block-table"><table><thead><tr><th>A</th></tr></thead><tbody><tr><td colspan="2">1</td></tr></tbody></table><figcaption>Data</figcaption></figure>"#;
        let out = f.format_html(html);
        assert!(out.starts_with(r#"<table style="width:100%; border-collapse:collapse;"><tr><th style="#));
        assert!(out.contains(r#"<td colspan="2" style="border:1px solid #ccc; padding:4px;">1</td>"#));
        assert!(out.ends_with("<div><small>Data</small></div>"));
    }

    #[test]
    fn test_review_box() {
        let mut f = formatter();
        let html = r#"<div class="wp-review-box"><div class="review-title">Widget Pro</div><div class="review-total-box">8.5</div><div class="review-desc">Solid.</div><ul class="review-pros"><li>Fast</li></ul><ul class="review-cons"><li>Pricey</li></ul></div>"#;
        let out = f.format_html(html);
        assert!(out.contains("<h3>Widget Pro</h3>"));
        assert!(out.contains("<b>8.5/10</b>"));
        assert!(out.contains("<p>Solid.</p>"));
        assert!(out.contains("<li>Fast</li>"));
        assert!(out.contains("<li>Pricey</li>"));
    }

    #[test]
    fn test_star_rating_from_label() {
        let mut f = formatter();
        let out = f.format_html(r#"<div class="star-rating" aria-label="Rated 4 out of 5"></div>"#);
        assert!(out.contains("<b>4/5</b>"), "{out}");

        let bad = f.format_html(r#"<div class="star-rating">great</div><p>after</p>"#);
        assert_eq!(bad, "<p>after</p>");
    }

    #[test]
    fn test_layout_wrappers_unwrap() {
        let mut f = formatter();
        let html = r#"<div class="wp-block-columns"><div class="wp-block-column"><p>L</p></div><div class="wp-block-column"><p>R</p></div></div>"#;
        assert_eq!(f.format_html(html), "<p>L</p><p>R</p>");
    }

    #[test]
    fn test_separator_spacer_and_widgets() {
        let mut f = formatter();
        let html = r#"<hr class="wp-block-separator"><div class="wp-block-spacer" style="height:20px"></div><div class="sharedaddy"><a href="/share">Share</a></div>"#;
        assert_eq!(f.format_html(html), "<hr/>");
    }

    #[test]
    fn test_emoji_and_tracking_pixels() {
        let mut f = formatter();
        let html = r#"<p>Hi <img class="emoji" alt="😀" src="/e.svg"><img src="/px.gif" width="1" height="1"></p>"#;
        assert_eq!(f.format_html(html), "<p>Hi 😀</p>");
    }
}

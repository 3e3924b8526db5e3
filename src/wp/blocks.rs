//! Block-editor (Gutenberg) JSON block formatter.
//!
//! Some sites expose the parsed block tree next to `content.rendered`, either
//! in core's `parse_blocks()` shape (`blockName`, `attrs`, `innerHTML`,
//! `innerContent`, `innerBlocks`) or the block data API shape (`name`,
//! `attributes`, `innerBlocks`). Both are read through [`Block`] and
//! dispatched by name through a string-keyed table.

use super::format::{ContentFormatter, mime_for};
use crate::models::Attachment;
use crate::render;
use crate::utils::clean_text;
use html_escape::encode_text;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

type BlockRenderer = fn(&mut ContentFormatter, &Block<'_>) -> Option<String>;

/// Block name → renderer. Names missing here are logged and skipped.
static BLOCK_RENDERERS: Lazy<HashMap<&'static str, BlockRenderer>> = Lazy::new(|| {
    let mut table: HashMap<&'static str, BlockRenderer> = HashMap::new();
    for name in [
        "core/paragraph",
        "core/heading",
        "core/list",
        "core/list-item",
        "core/quote",
        "core/pullquote",
        "core/table",
        "core/preformatted",
        "core/code",
        "core/verse",
        "core/html",
        "core/freeform",
        "core/media-text",
    ] {
        table.insert(name, render_markup);
    }
    for name in ["core/group", "core/columns", "core/column", "core/cover", "core/buttons"] {
        table.insert(name, render_container);
    }
    for name in ["core/spacer", "core/more", "core/nextpage", "core/shortcode"] {
        table.insert(name, render_nothing);
    }
    table.insert("core/separator", render_separator);
    table.insert("core/image", render_image);
    table.insert("core/gallery", render_gallery);
    table.insert("core/embed", render_embed);
    table.insert("core/video", render_video);
    table.insert("core/audio", render_audio);
    table.insert("core/button", render_markup);
    table
});

/// A view over one JSON block in either supported shape.
#[derive(Debug)]
pub struct Block<'v> {
    pub name: Option<&'v str>,
    pub attrs: &'v Value,
    pub html: Option<&'v str>,
    inner_content: Option<&'v Vec<Value>>,
    pub inner: Vec<Block<'v>>,
}

static NULL: Value = Value::Null;

impl<'v> Block<'v> {
    pub fn from_value(value: &'v Value) -> Self {
        let inner = value
            .get("innerBlocks")
            .and_then(Value::as_array)
            .map(|blocks| blocks.iter().map(Block::from_value).collect())
            .unwrap_or_default();
        Self {
            name: value
                .get("blockName")
                .or_else(|| value.get("name"))
                .and_then(Value::as_str),
            attrs: value
                .get("attrs")
                .or_else(|| value.get("attributes"))
                .unwrap_or(&NULL),
            html: value
                .get("innerHTML")
                .or_else(|| value.get("rendered"))
                .and_then(Value::as_str),
            inner_content: value.get("innerContent").and_then(Value::as_array),
            inner,
        }
    }

    fn attr_str(&self, key: &str) -> Option<&'v str> {
        self.attrs
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// Saved markup with inner blocks serialized back into their slots.
    ///
    /// `innerContent` interleaves markup strings with `null` placeholders,
    /// one per inner block, in order.
    fn markup(&self) -> Option<String> {
        if let Some(parts) = self.inner_content {
            let mut inner = self.inner.iter();
            let mut out = String::new();
            for part in parts {
                match part {
                    Value::String(s) => out.push_str(s),
                    Value::Null => {
                        if let Some(block) = inner.next() {
                            if let Some(html) = block.markup() {
                                out.push_str(&html);
                            }
                        }
                    }
                    _ => {}
                }
            }
            return Some(out);
        }
        if let Some(html) = self.html.filter(|h| !h.trim().is_empty()) {
            return Some(html.to_string());
        }
        self.markup_from_attrs()
    }

    /// Reconstruct markup for the data-API shape, which carries content in
    /// attributes instead of saved HTML.
    fn markup_from_attrs(&self) -> Option<String> {
        let content = self.attr_str("content").or_else(|| self.attr_str("value"));
        let inner = || self.inner.iter().filter_map(Block::markup).collect::<String>();
        match self.name? {
            "core/paragraph" => content.map(|c| format!("<p>{c}</p>")),
            "core/heading" => {
                let level = self
                    .attrs
                    .get("level")
                    .and_then(Value::as_u64)
                    .filter(|l| (1..=6).contains(l))
                    .unwrap_or(2);
                content.map(|c| format!("<h{level}>{c}</h{level}>"))
            }
            "core/list" => {
                let tag = if self.attrs.get("ordered").and_then(Value::as_bool) == Some(true) {
                    "ol"
                } else {
                    "ul"
                };
                let items = match self.attr_str("values") {
                    Some(values) => values.to_string(),
                    None => inner(),
                };
                Some(format!("<{tag}>{items}</{tag}>"))
            }
            "core/list-item" => content.map(|c| format!("<li>{c}</li>")),
            "core/quote" => Some(format!(
                r#"<blockquote class="wp-block-quote">{}{}</blockquote>"#,
                inner(),
                self.attr_str("citation")
                    .map(|c| format!("<cite>{c}</cite>"))
                    .unwrap_or_default()
            )),
            "core/pullquote" => content.map(|c| {
                format!(
                    r#"<figure class="wp-block-pullquote"><blockquote><p>{c}</p>{}</blockquote></figure>"#,
                    self.attr_str("citation")
                        .map(|cite| format!("<cite>{cite}</cite>"))
                        .unwrap_or_default()
                )
            }),
            "core/preformatted" | "core/code" | "core/verse" => {
                content.map(|c| format!(r#"<pre class="wp-block-code">{c}</pre>"#))
            }
            _ => {
                let html = inner();
                (!html.is_empty()).then_some(html)
            }
        }
    }
}

/// Format a list of JSON blocks into HTML.
pub fn format_blocks(f: &mut ContentFormatter, blocks: &[Value]) -> String {
    blocks
        .iter()
        .map(Block::from_value)
        .filter_map(|b| format_block(f, &b))
        .collect::<Vec<_>>()
        .join("")
}

fn format_block(f: &mut ContentFormatter, block: &Block<'_>) -> Option<String> {
    let Some(raw_name) = block.name else {
        // core emits unnamed blocks for the whitespace between blocks
        let html = block.html.filter(|h| !h.trim().is_empty())?;
        return Some(f.format_html(html));
    };
    let name = f.block_name(raw_name).to_string();
    let name = if name.starts_with("core-embed/") {
        "core/embed".to_string()
    } else {
        name
    };
    match BLOCK_RENDERERS.get(name.as_str()) {
        Some(render) => {
            debug!(block = %name, "Rendering block");
            let html = render(f, block);
            if html.is_none() {
                warn!(block = %name, "Block produced no content; skipping");
            }
            html
        }
        None => {
            warn!(block = %name, "Unhandled block type; skipping");
            None
        }
    }
}

fn render_markup(f: &mut ContentFormatter, block: &Block<'_>) -> Option<String> {
    let html = block.markup()?;
    let out = f.format_html(&html);
    (!out.trim().is_empty()).then_some(out)
}

fn render_container(f: &mut ContentFormatter, block: &Block<'_>) -> Option<String> {
    let html: String = block
        .inner
        .iter()
        .filter_map(|b| format_block(f, b))
        .collect();
    (!html.is_empty()).then_some(html)
}

fn render_nothing(_: &mut ContentFormatter, _: &Block<'_>) -> Option<String> {
    Some(String::new())
}

fn render_separator(_: &mut ContentFormatter, _: &Block<'_>) -> Option<String> {
    Some("<hr/>".to_string())
}

fn render_image(f: &mut ContentFormatter, block: &Block<'_>) -> Option<String> {
    match block.attr_str("url") {
        Some(url) => {
            let src = f.resolve(url);
            let link = block.attr_str("href").map(|h| f.resolve(h));
            let caption = block.attr_str("caption").map(|c| f.format_html(c));
            Some(render::add_image(&src, caption.as_deref(), link.as_deref()))
        }
        None => render_markup(f, block),
    }
}

fn render_gallery(f: &mut ContentFormatter, block: &Block<'_>) -> Option<String> {
    let mut images = Vec::new();
    if !block.inner.is_empty() {
        for img in &block.inner {
            if let Some(url) = img.attr_str("url") {
                let thumb = f.resolve(url);
                let full = img
                    .attr_str("fullUrl")
                    .map(|u| f.resolve(u))
                    .unwrap_or_else(|| thumb.clone());
                let caption = img.attr_str("caption").map(|c| f.format_html(c));
                images.push((thumb, full, caption));
            }
        }
    } else if let Some(list) = block.attrs.get("images").and_then(Value::as_array) {
        for img in list {
            let Some(url) = img.get("url").and_then(Value::as_str) else {
                continue;
            };
            let thumb = f.resolve(url);
            let full = img
                .get("fullUrl")
                .and_then(Value::as_str)
                .map(|u| f.resolve(u))
                .unwrap_or_else(|| thumb.clone());
            let caption = img
                .get("caption")
                .and_then(Value::as_str)
                .filter(|c| !c.is_empty())
                .map(|c| f.format_html(c));
            images.push((thumb, full, caption));
        }
    }
    if images.is_empty() {
        return render_markup(f, block);
    }
    f.media
        .gallery
        .extend(images.iter().map(|(_, full, _)| full.clone()));
    let caption = block.attr_str("caption").map(|c| f.format_html(c));
    Some(render::add_gallery(&images, caption.as_deref()))
}

fn render_embed(f: &mut ContentFormatter, block: &Block<'_>) -> Option<String> {
    match block.attr_str("url") {
        Some(url) => Some(render::add_embed(&f.resolve(url))),
        None => render_markup(f, block),
    }
}

fn render_video(f: &mut ContentFormatter, block: &Block<'_>) -> Option<String> {
    let Some(src) = block.attr_str("src") else {
        return render_markup(f, block);
    };
    let src = f.resolve(src);
    let poster = block.attr_str("poster").map(|p| f.resolve(p));
    if f.media.video.is_none() {
        f.media.video = Some(src.clone());
    }
    let title = block.attr_str("caption").map(clean_text).filter(|c| !c.is_empty());
    f.media.attachments.push(Attachment {
        mime_type: mime_for(&src, "video"),
        url: src.clone(),
        title: title.clone(),
    });
    let caption = title.map(|c| encode_text(&c).into_owned());
    Some(render::add_video(&src, poster.as_deref(), caption.as_deref()))
}

fn render_audio(f: &mut ContentFormatter, block: &Block<'_>) -> Option<String> {
    let Some(src) = block.attr_str("src") else {
        return render_markup(f, block);
    };
    let src = f.resolve(src);
    if f.media.audio.is_none() {
        f.media.audio = Some(src.clone());
    }
    let title = block.attr_str("caption").map(clean_text).filter(|c| !c.is_empty());
    f.media.attachments.push(Attachment {
        mime_type: mime_for(&src, "audio"),
        url: src.clone(),
        title: title.clone(),
    });
    Some(render::add_audio(&src, title.as_deref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteConfig;
    use serde_json::json;
    use url::Url;

    fn formatter(site: &SiteConfig) -> ContentFormatter {
        ContentFormatter::new(Url::parse("https://example.com/").unwrap(), site)
    }

    #[test]
    fn test_core_parse_blocks_shape() {
        let blocks = json!([
            {"blockName": "core/paragraph", "attrs": {}, "innerBlocks": [],
             "innerHTML": "<p>Hello</p>", "innerContent": ["<p>Hello</p>"]},
            {"blockName": null, "attrs": {}, "innerBlocks": [], "innerHTML": "\n\n", "innerContent": ["\n\n"]},
            {"blockName": "core/list", "attrs": {}, "innerHTML": "<ul></ul>",
             "innerContent": ["<ul>", null, null, "</ul>"],
             "innerBlocks": [
                {"blockName": "core/list-item", "attrs": {}, "innerBlocks": [], "innerHTML": "<li>One</li>", "innerContent": ["<li>One</li>"]},
                {"blockName": "core/list-item", "attrs": {}, "innerBlocks": [], "innerHTML": "<li>Two</li>", "innerContent": ["<li>Two</li>"]}
             ]}
        ]);
        let mut f = formatter(&SiteConfig::default());
        let html = format_blocks(&mut f, blocks.as_array().unwrap());
        assert_eq!(html, "<p>Hello</p><ul><li>One</li><li>Two</li></ul>");
    }

    #[test]
    fn test_data_api_shape() {
        let blocks = json!([
            {"name": "core/heading", "attributes": {"content": "Intro", "level": 3}},
            {"name": "core/paragraph", "attributes": {"content": "Body <a href=\"/x\">link</a>"}},
            {"name": "core/image", "attributes": {"url": "/img.jpg", "caption": "Cap"}},
            {"name": "core/list", "attributes": {"ordered": true}, "innerBlocks": [
                {"name": "core/list-item", "attributes": {"content": "A"}}
            ]}
        ]);
        let mut f = formatter(&SiteConfig::default());
        let html = format_blocks(&mut f, blocks.as_array().unwrap());
        assert!(html.starts_with(r#"<h3>Intro</h3><p>Body <a href="https://example.com/x">link</a></p>"#), "{html}");
        assert!(html.contains(&render::add_image("https://example.com/img.jpg", Some("Cap"), None)));
        assert!(html.ends_with("<ol><li>A</li></ol>"));
    }

    #[test]
    fn test_unknown_block_is_skipped_without_affecting_neighbours() {
        let blocks = json!([
            {"blockName": "core/paragraph", "innerHTML": "<p>Before</p>"},
            {"blockName": "acme/price-widget", "attrs": {"price": 9}, "innerHTML": "<div>$9</div>"},
            {"blockName": "core/paragraph", "innerHTML": "<p>After</p>"}
        ]);
        let mut f = formatter(&SiteConfig::default());
        let html = format_blocks(&mut f, blocks.as_array().unwrap());
        assert_eq!(html, "<p>Before</p><p>After</p>");
    }

    #[test]
    fn test_rename_blocks_maps_custom_names() {
        let mut site = SiteConfig::default();
        site.rename_blocks
            .insert("acme/text".to_string(), "core/paragraph".to_string());
        let blocks = json!([{"blockName": "acme/text", "innerHTML": "<p>Mapped</p>"}]);
        let mut f = formatter(&site);
        assert_eq!(format_blocks(&mut f, blocks.as_array().unwrap()), "<p>Mapped</p>");
    }

    #[test]
    fn test_media_blocks() {
        let blocks = json!([
            {"blockName": "core-embed/youtube", "attrs": {"url": "https://youtu.be/dQw4w9WgXcQ"}},
            {"blockName": "core/gallery", "attrs": {"images": [
                {"url": "/a.jpg", "fullUrl": "/a-full.jpg", "caption": ""},
                {"url": "/b.jpg"}
            ]}},
            {"blockName": "core/video", "attrs": {"src": "/v.mp4"}},
            {"blockName": "core/group", "innerBlocks": [
                {"blockName": "core/audio", "attrs": {"src": "/a.mp3", "caption": "Ep"}}
            ]}
        ]);
        let mut f = formatter(&SiteConfig::default());
        let html = format_blocks(&mut f, blocks.as_array().unwrap());
        assert!(html.contains("Watch on YouTube"));
        assert_eq!(
            f.media.gallery,
            vec!["https://example.com/a-full.jpg", "https://example.com/b.jpg"]
        );
        assert_eq!(f.media.video.as_deref(), Some("https://example.com/v.mp4"));
        assert_eq!(f.media.audio.as_deref(), Some("https://example.com/a.mp3"));
    }

    #[test]
    fn test_media_blocks_report_attachments_like_html() {
        let blocks = json!([
            {"blockName": "core/video", "attrs": {"src": "/v.mp4", "caption": "Clip"}},
            {"blockName": "core/audio", "attrs": {"src": "/a.mp3"}}
        ]);
        let mut from_blocks = formatter(&SiteConfig::default());
        format_blocks(&mut from_blocks, blocks.as_array().unwrap());
        assert_eq!(
            from_blocks.media.attachments,
            vec![
                Attachment {
                    url: "https://example.com/v.mp4".to_string(),
                    mime_type: "video/mp4".to_string(),
                    title: Some("Clip".to_string()),
                },
                Attachment {
                    url: "https://example.com/a.mp3".to_string(),
                    mime_type: "audio/mpeg".to_string(),
                    title: None,
                },
            ]
        );

        let mut from_html = formatter(&SiteConfig::default());
        from_html.format_html(
            r#"<figure class="wp-block-video"><video src="/v.mp4"></video><figcaption>Clip</figcaption></figure>"#,
        );
        assert_eq!(from_html.media.attachments[0], from_blocks.media.attachments[0]);
    }

    #[test]
    fn test_block_captions_are_escaped() {
        let blocks = json!([
            {"name": "core/image", "attributes": {"url": "/i.jpg", "caption": "a &lt;img src=x onerror=alert(1)&gt; b"}},
            {"name": "core/gallery", "attributes": {"images": [
                {"url": "/g.jpg", "caption": "c &lt;script&gt;x&lt;/script&gt;"}
            ]}}
        ]);
        let mut f = formatter(&SiteConfig::default());
        let html = format_blocks(&mut f, blocks.as_array().unwrap());
        assert!(!html.contains("<img src=x"), "{html}");
        assert!(!html.contains("<script>"), "{html}");
        assert!(html.contains("a &lt;img src=x onerror=alert(1)&gt; b"), "{html}");
    }
}

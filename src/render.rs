//! Presentation helpers that emit fixed, self-contained HTML snippets.
//!
//! Every renderer in the content formatter bottoms out here so that images,
//! embeds and callouts look the same no matter which publisher they came
//! from. All markup is inline-styled; no external CSS is assumed.

use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static YOUTUBE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:youtube(?:-nocookie)?\.com/(?:embed/|shorts/|live/|watch\?(?:.*&)?v=|v/)|youtu\.be/)([A-Za-z0-9_-]{11})")
        .unwrap()
});
static VIMEO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"vimeo\.com/(?:video/)?(\d+)").unwrap());

fn attr(s: &str) -> String {
    html_escape::encode_double_quoted_attribute(s).into_owned()
}

fn text(s: &str) -> String {
    html_escape::encode_text(s).into_owned()
}

/// A captioned figure with an optional click-through link.
///
/// `caption` is trusted HTML (it usually comes from the publisher's own
/// `figcaption`).
pub fn add_image(src: &str, caption: Option<&str>, link: Option<&str>) -> String {
    let img = format!(
        r#"<img src="{}" loading="lazy" style="display:block; margin-left:auto; margin-right:auto; width:100%;"/>"#,
        attr(src)
    );
    let img = match link {
        Some(href) => format!(r#"<a href="{}">{img}</a>"#, attr(href)),
        None => img,
    };
    let caption = caption
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(|c| format!("<figcaption><small>{c}</small></figcaption>"))
        .unwrap_or_default();
    format!(r#"<figure style="margin:0; padding:0;">{img}{caption}</figure>"#)
}

/// A two-column thumbnail grid. Each entry is `(thumbnail, full size, caption)`.
pub fn add_gallery(images: &[(String, String, Option<String>)], caption: Option<&str>) -> String {
    let cells = images
        .iter()
        .map(|(thumb, full, cap)| {
            let cap = cap
                .as_deref()
                .filter(|c| !c.is_empty())
                .map(|c| format!("<div><small>{c}</small></div>"))
                .unwrap_or_default();
            format!(
                r#"<div style="flex:1; min-width:360px;"><a href="{}"><img src="{}" loading="lazy" style="width:100%;"/></a>{cap}</div>"#,
                attr(full),
                attr(thumb)
            )
        })
        .join("");
    let caption = caption
        .filter(|c| !c.trim().is_empty())
        .map(|c| format!("<div><small>{c}</small></div>"))
        .unwrap_or_default();
    format!(
        r#"<div style="display:flex; flex-wrap:wrap; gap:16px 8px;">{cells}</div>{caption}"#
    )
}

/// YouTube video id from any of the usual URL shapes.
pub fn youtube_id(url: &str) -> Option<&str> {
    YOUTUBE_RE
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Render an embedded third-party URL as a portable card.
///
/// YouTube and Vimeo become a linked thumbnail; social posts and anything
/// else become a quoted link to the original.
pub fn add_embed(url: &str) -> String {
    if let Some(id) = youtube_id(url) {
        let thumb = format!("https://i.ytimg.com/vi/{id}/hqdefault.jpg");
        let watch = format!("https://www.youtube.com/watch?v={id}");
        let caption = format!(r#"<a href="{}">Watch on YouTube</a>"#, attr(&watch));
        return add_image(&thumb, Some(caption.as_str()), Some(watch.as_str()));
    }
    if let Some(caps) = VIMEO_RE.captures(url) {
        let watch = format!("https://vimeo.com/{}", &caps[1]);
        return format!(
            r#"<blockquote style="border-left:3px solid #ccc; margin:1.5em 10px; padding:0.5em 10px;"><b>Video: <a href="{0}">{0}</a></b></blockquote>"#,
            attr(&watch)
        );
    }
    let host = Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
        .unwrap_or_else(|| url.to_string());
    let label = match host.as_str() {
        "twitter.com" | "x.com" => "View post on X",
        "instagram.com" => "View on Instagram",
        "tiktok.com" => "View on TikTok",
        "facebook.com" => "View on Facebook",
        "open.spotify.com" => "Listen on Spotify",
        _ => "",
    };
    let label = if label.is_empty() {
        format!("Embedded content from {}", text(&host))
    } else {
        label.to_string()
    };
    format!(
        r#"<blockquote style="border-left:3px solid #ccc; margin:1.5em 10px; padding:0.5em 10px;"><b><a href="{}">{label}</a></b></blockquote>"#,
        attr(url)
    )
}

/// A video as its poster image linked to the source, or a plain link.
pub fn add_video(src: &str, poster: Option<&str>, caption: Option<&str>) -> String {
    match poster {
        Some(poster) => {
            let caption = match caption.filter(|c| !c.trim().is_empty()) {
                Some(c) => format!(r#"<a href="{}">Watch video</a>: {c}"#, attr(src)),
                None => format!(r#"<a href="{}">Watch video</a>"#, attr(src)),
            };
            add_image(poster, Some(caption.as_str()), Some(src))
        }
        None => {
            let caption = caption
                .filter(|c| !c.trim().is_empty())
                .map(|c| format!(": {c}"))
                .unwrap_or_default();
            format!(r#"<p><b><a href="{}">Watch video</a></b>{caption}</p>"#, attr(src))
        }
    }
}

/// An audio link with an optional title.
pub fn add_audio(src: &str, title: Option<&str>) -> String {
    let title = title
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or("Listen");
    format!(
        r#"<div style="display:flex; align-items:center; gap:8px;"><span style="font-size:2em;">&#9658;</span><a href="{}"><b>{}</b></a></div>"#,
        attr(src),
        text(title)
    )
}

/// A visually emphasized quoted excerpt. `quote` is trusted HTML.
pub fn add_pullquote(quote: &str, author: Option<&str>) -> String {
    let cite = author
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(|a| format!(r#"<div style="margin-top:0.5em;">&mdash; {a}</div>"#))
        .unwrap_or_default();
    format!(
        r#"<div style="margin:1em 0; padding:0 1em; border-left:4px solid #4b9cd3;"><div style="font-size:1.2em; font-style:italic;">{quote}</div>{cite}</div>"#
    )
}

/// An indented block quote. `inner` is trusted HTML.
pub fn add_blockquote(inner: &str) -> String {
    format!(
        r#"<blockquote style="border-left:3px solid #ccc; margin:1.5em 10px; padding:0.5em 10px;">{inner}</blockquote>"#
    )
}

/// Filled/empty star glyphs for a rating out of `max`.
///
/// Fractional ratings round to the nearest half star.
pub fn add_stars(rating: f64, max: u32) -> String {
    let max = max.max(1);
    let rating = rating.clamp(0.0, f64::from(max));
    let halves = (rating * 2.0).round() as u32;
    let full = halves / 2;
    let half = halves % 2;
    let empty = max - full - half;
    format!(
        r#"<span style="font-size:1.2em; color:gold;">{}{}{}</span> <b>{}/{}</b>"#,
        "&#9733;".repeat(full as usize),
        "&#11242;".repeat(half as usize),
        "&#9734;".repeat(empty as usize),
        format_rating(rating),
        max
    )
}

fn format_rating(rating: f64) -> String {
    if rating.fract() == 0.0 {
        format!("{rating:.0}")
    } else {
        format!("{rating:.1}")
    }
}

/// Side-by-side pros and cons lists. Entries are trusted HTML.
pub fn add_pros_cons(pros: &[String], cons: &[String]) -> String {
    let list = |heading: &str, color: &str, entries: &[String]| {
        if entries.is_empty() {
            return String::new();
        }
        format!(
            r#"<div style="flex:1; min-width:240px;"><div style="font-weight:bold; color:{color};">{heading}</div><ul>{}</ul></div>"#,
            entries.iter().map(|e| format!("<li>{e}</li>")).join("")
        )
    };
    format!(
        r#"<div style="display:flex; flex-wrap:wrap; gap:1em; margin:1em 0;">{}{}</div>"#,
        list("Pros", "green", pros),
        list("Cons", "red", cons)
    )
}

/// A compact summary card: lede image, linked title and summary.
pub fn embed_card(
    url: &str,
    title: &str,
    image: Option<&str>,
    summary: Option<&str>,
    byline: Option<&str>,
) -> String {
    let host = Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default();
    let image = image
        .map(|src| format!(r#"<a href="{}"><img src="{}" style="width:100%;"/></a>"#, attr(url), attr(src)))
        .unwrap_or_default();
    let byline = byline
        .filter(|b| !b.is_empty())
        .map(|b| format!("<div><small>By {}</small></div>", text(b)))
        .unwrap_or_default();
    let summary = summary
        .filter(|s| !s.is_empty())
        .map(|s| format!("<p>{}</p>", text(s)))
        .unwrap_or_default();
    format!(
        r#"<div style="width:100%; border:1px solid #ccc; border-radius:10px; overflow:hidden;">{image}<div style="margin:8px 8px 0 8px;"><div style="font-size:0.8em;">{}</div><div style="font-weight:bold;"><a href="{}">{}</a></div>{byline}{summary}</div></div>"#,
        text(&host),
        attr(url),
        text(title)
    )
}

//! JSON output for items and feeds.
//!
//! Items are filed by publish date, feeds by the day they were built:
//! ```text
//! output_dir/
//! └── 2024-01-01/
//!     ├── hello-world.json
//!     └── example-site.json
//! ```

use crate::models::{Feed, Item};
use crate::utils::{parse_date, slugify_title};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::error::Error;
use std::path::PathBuf;
use tokio::fs;
use tracing::{error, info, instrument};

/// Pretty-print any output to stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn item_date(item: &Item) -> NaiveDate {
    item.date_published
        .as_deref()
        .and_then(parse_date)
        .map(|dt| dt.date_naive())
        .unwrap_or_else(|| Utc::now().date_naive())
}

fn file_stem(title: &str, fallback: &str) -> String {
    let slug = slugify_title(title);
    if slug.is_empty() {
        slugify_title(fallback)
    } else {
        slug
    }
}

async fn write_dated<T: Serialize>(
    value: &T,
    output_dir: &str,
    date: NaiveDate,
    stem: &str,
) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(value)?;
    let dir = PathBuf::from(output_dir).join(date.to_string());

    info!(dir = %dir.display(), "Ensuring JSON directory exists");
    if let Err(e) = fs::create_dir_all(&dir).await {
        error!(dir = %dir.display(), error = %e, "Failed to create JSON dir");
        return Err(e.into());
    }

    let path = dir.join(format!("{stem}.json"));
    fs::write(&path, json).await?;
    info!(path = %path.display(), "Wrote JSON file");
    Ok(path)
}

/// Write an item to `{output_dir}/{publish date}/{slug}.json`.
///
/// Items without a publish date are filed under today's date.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir, id = %item.id))]
pub async fn write_item(item: &Item, output_dir: &str) -> Result<PathBuf, Box<dyn Error>> {
    let stem = file_stem(&item.title, &item.id);
    write_dated(item, output_dir, item_date(item), &stem).await
}

/// Write a feed to `{output_dir}/{today}/{slug of title}.json`.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir, title = %feed.title))]
pub async fn write_feed(feed: &Feed, output_dir: &str) -> Result<PathBuf, Box<dyn Error>> {
    let stem = file_stem(&feed.title, "feed");
    write_dated(feed, output_dir, Utc::now().date_naive(), &stem).await
}

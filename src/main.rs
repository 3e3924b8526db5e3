//! # wp-feed
//!
//! Command-line front end for the WordPress feed handler.
//!
//! ## Usage
//!
//! ```sh
//! wp-feed content https://example.com/2024/01/hello-world/
//! wp-feed --output-dir ./out feed https://example.com/ --max 5
//! ```
//!
//! Results are printed as pretty JSON, or written under `--output-dir` in a
//! dated directory. Log verbosity follows `RUST_LOG` (default `info`).

use clap::Parser;
use std::error::Error;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};
use url::Url;
use wp_feed_handlers::fetch::DEFAULT_USER_AGENT;
use wp_feed_handlers::outputs::json;
use wp_feed_handlers::utils::ensure_writable_dir;
use wp_feed_handlers::{Args, ReqwestFetcher, RetryFetch, SitesFile, get_content, get_feed};

mod cli;

use cli::{Cli, Command};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    let cli = Cli::parse();
    debug!(?cli, "Parsed CLI arguments");

    // Early check: ensure output dir is writable
    if let Some(dir) = cli.output_dir.as_deref()
        && let Err(e) = ensure_writable_dir(dir).await
    {
        error!(path = %dir, error = %e, "Output directory is not writable");
        return Err(e);
    }

    let sites = match cli.sites.as_deref() {
        Some(path) => SitesFile::load(path)?,
        None => SitesFile::default(),
    };

    let user_agent = cli.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT);
    let fetcher = RetryFetch::new(
        ReqwestFetcher::new(user_agent, Duration::from_secs(cli.timeout))?,
        cli.retries,
        Duration::from_millis(500),
    );

    match &cli.command {
        Command::Content { url, embed } => {
            let site = sites.lookup(&Url::parse(url)?);
            let args = Args {
                embed: *embed,
                ..Args::default()
            };
            let Some(item) = get_content(&fetcher, url, &args, &site).await else {
                warn!(%url, "No item produced");
                return Err(format!("could not normalize {url}").into());
            };
            match cli.output_dir.as_deref() {
                Some(dir) => {
                    let path = json::write_item(&item, dir).await?;
                    info!(path = %path.display(), "Item written");
                }
                None => json::print_json(&item)?,
            }
        }
        Command::Feed { url, max, age } => {
            let site = sites.lookup(&Url::parse(url)?);
            let args = Args {
                max: *max,
                age: *age,
                ..Args::default()
            };
            let Some(feed) = get_feed(&fetcher, url, &args, &site).await else {
                warn!(%url, "No feed produced");
                return Err(format!("could not list posts for {url}").into());
            };
            match cli.output_dir.as_deref() {
                Some(dir) => {
                    let path = json::write_feed(&feed, dir).await?;
                    info!(path = %path.display(), items = feed.items.len(), "Feed written");
                }
                None => json::print_json(&feed)?,
            }
        }
    }

    let elapsed = start_time.elapsed();
    info!(?elapsed, "Execution complete");
    Ok(())
}

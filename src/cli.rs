//! Command-line interface definitions for `wp-feed`.
//!
//! All options can be provided via command-line flags or environment variables.

use clap::{Parser, Subcommand};

/// Command-line arguments for the `wp-feed` binary.
///
/// # Examples
///
/// ```sh
/// # Print one article as JSON
/// wp-feed content https://example.com/2024/01/hello-world/
///
/// # Latest 5 posts from the last day, written under ./out
/// wp-feed --output-dir ./out feed https://example.com/ --max 5 --age 24
///
/// # Per-site overrides
/// SITES_FILE=sites.yaml wp-feed content https://www.example.com/?p=123
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// YAML or JSON file mapping domains to site configuration
    #[arg(short, long, env = "SITES_FILE")]
    pub sites: Option<String>,

    /// Write results under this directory instead of printing them
    #[arg(short, long)]
    pub output_dir: Option<String>,

    /// User-Agent sent with every request
    #[arg(long, env = "WP_FEED_USER_AGENT")]
    pub user_agent: Option<String>,

    /// Retries for transient HTTP failures
    #[arg(long, env = "WP_FEED_RETRIES", default_value_t = 3)]
    pub retries: usize,

    /// Per-request timeout in seconds
    #[arg(long, env = "WP_FEED_TIMEOUT", default_value_t = 20)]
    pub timeout: u64,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Normalize a single article
    Content {
        url: String,
        /// Emit a compact embed card instead of the full body
        #[arg(long)]
        embed: bool,
    },
    /// Normalize a site's latest posts
    Feed {
        url: String,
        /// Maximum number of items
        #[arg(long)]
        max: Option<usize>,
        /// Drop items older than this many hours
        #[arg(long)]
        age: Option<u64>,
    },
}

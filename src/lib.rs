//! # wp_feed_handlers
//!
//! Normalizes WordPress articles and post listings into portable feed items.
//!
//! Any site that exposes the `wp/v2/posts` REST API can be handled with a
//! [`SiteConfig`] describing its quirks (custom JSON root, id patterns,
//! selectors to drop, URL rewrites). The handler:
//!
//! 1. **Locates** the REST post behind an article URL (id, slug, page scan)
//! 2. **Assembles metadata** from the post, schema graph, meta tags and JSON-LD
//! 3. **Formats** the body through a table of renderers into portable HTML
//! 4. **Assembles** a checked [`Item`], or a sorted [`Feed`] of them
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use std::time::Duration;
//! use wp_feed_handlers::{Args, ReqwestFetcher, SiteConfig, get_content};
//!
//! let fetcher = ReqwestFetcher::new("my-agent/1.0", Duration::from_secs(20))?;
//! let item = get_content(&fetcher, "https://example.com/2024/01/hello/", &Args::default(), &SiteConfig::default()).await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod fetch;
pub mod models;
pub mod outputs;
pub mod render;
pub mod utils;
pub mod wp;

pub use config::{Args, SiteConfig, SitesFile};
pub use error::{ConfigError, FetchError, HandlerError};
pub use fetch::{FetchAsync, ReqwestFetcher, RetryFetch};
pub use models::{Attachment, Author, Feed, Item};
pub use wp::{get_content, get_feed};

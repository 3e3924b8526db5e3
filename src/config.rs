//! Per-publisher site configuration and per-call handler arguments.
//!
//! A [`SiteConfig`] is the `site_json` object handed to every handler: where
//! the WordPress REST API lives, how to find the post id, and which content
//! rewrites to apply. A [`SitesFile`] maps domains to site configs and is
//! loaded once at startup from YAML or JSON.
//!
//! ```yaml
//! example.com:
//!   posts_path: /wp/v2/posts
//!   decompose: [".newsletter-signup"]
//!   rename:
//!     - { selector: "p.subhead", tag: "h3" }
//! ```

use crate::error::ConfigError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Default REST route for posts relative to the WP JSON root.
pub const DEFAULT_POSTS_PATH: &str = "/wp/v2/posts";

/// Retag every element matching `selector` as `tag`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RenameRule {
    pub selector: String,
    pub tag: String,
}

/// Regex rewrite applied to every emitted `src`/`href`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct UrlRewrite {
    pub pattern: String,
    pub replace: String,
}

/// Configuration for one publisher.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SiteConfig {
    /// WP JSON root. Absolute, or a path joined to the article's host.
    pub wpjson_path: Option<String>,
    /// Posts route appended to the WP JSON root.
    pub posts_path: String,
    /// Regex with one capture group holding the post id in article URLs.
    pub id_pattern: Option<String>,
    /// Ask the REST API to embed authors, terms and featured media.
    pub embed: bool,
    /// Prefer the `blocks` array over `content.rendered` when present.
    pub use_blocks: bool,
    pub feed_title: Option<String>,
    /// JSON pointer into the post for a subtitle, e.g. `/acf/subtitle`.
    pub subtitle_field: Option<String>,
    pub skip_lede_image: bool,
    /// Extra request headers sent with every fetch for this site.
    pub headers: HashMap<String, String>,
    /// Selectors removed from the content entirely.
    pub decompose: Vec<String>,
    /// Selectors replaced by their children.
    pub unwrap: Vec<String>,
    pub rename: Vec<RenameRule>,
    /// Site-specific block names mapped onto known block names.
    pub rename_blocks: HashMap<String, String>,
    pub url_rewrites: Vec<UrlRewrite>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            wpjson_path: None,
            posts_path: DEFAULT_POSTS_PATH.to_string(),
            id_pattern: None,
            embed: true,
            use_blocks: false,
            feed_title: None,
            subtitle_field: None,
            skip_lede_image: false,
            headers: HashMap::new(),
            decompose: Vec::new(),
            unwrap: Vec::new(),
            rename: Vec::new(),
            rename_blocks: HashMap::new(),
            url_rewrites: Vec::new(),
        }
    }
}

impl SiteConfig {
    /// Resolve the WP JSON root for an article URL.
    ///
    /// Without a configured path this is `{scheme}://{host}/wp-json`.
    pub fn wpjson_base(&self, article: &Url) -> Option<String> {
        let root = match self.wpjson_path.as_deref() {
            Some(p) if p.starts_with("http://") || p.starts_with("https://") => p.to_string(),
            Some(p) if p.starts_with('/') => article.join(p).ok()?.to_string(),
            // paths are rooted at the host, never at the article's directory
            Some(p) => article.join(&format!("/{p}")).ok()?.to_string(),
            None => article.join("/wp-json").ok()?.to_string(),
        };
        Some(root.trim_end_matches('/').to_string())
    }

    /// Full posts endpoint, e.g. `https://example.com/wp-json/wp/v2/posts`.
    pub fn posts_endpoint(&self, article: &Url) -> Option<String> {
        let base = self.wpjson_base(article)?;
        let path = self.posts_path.trim_end_matches('/');
        if path.starts_with('/') {
            Some(format!("{base}{path}"))
        } else {
            Some(format!("{base}/{path}"))
        }
    }

    /// Compiled `id_pattern`, if set and valid.
    pub fn id_regex(&self) -> Option<Regex> {
        let pattern = self.id_pattern.as_deref()?;
        match Regex::new(pattern) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!(%pattern, error = %e, "Ignoring invalid id_pattern");
                None
            }
        }
    }

    /// Compiled URL rewrites; invalid patterns are skipped with a warning.
    pub fn compiled_rewrites(&self) -> Vec<(Regex, String)> {
        self.url_rewrites
            .iter()
            .filter_map(|rw| match Regex::new(&rw.pattern) {
                Ok(re) => Some((re, rw.replace.clone())),
                Err(e) => {
                    warn!(pattern = %rw.pattern, error = %e, "Ignoring invalid url rewrite");
                    None
                }
            })
            .collect()
    }

    fn validate(&self, domain: &str) -> Result<(), ConfigError> {
        let patterns = self
            .id_pattern
            .iter()
            .chain(self.url_rewrites.iter().map(|rw| &rw.pattern));
        for pattern in patterns {
            Regex::new(pattern).map_err(|source| ConfigError::Pattern {
                domain: domain.to_string(),
                pattern: pattern.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

/// Per-call handler arguments.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Args {
    /// Maximum number of feed items.
    pub max: Option<usize>,
    /// Produce a compact embed card instead of the full article body.
    pub embed: bool,
    /// Drop feed items older than this many hours.
    pub age: Option<u64>,
}

/// Domain → [`SiteConfig`] map.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(transparent)]
pub struct SitesFile {
    sites: HashMap<String, SiteConfig>,
}

impl SitesFile {
    /// Load a sites file. `.json` files are parsed as JSON, anything else as YAML.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;

        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let sites: SitesFile = if is_json {
            serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
                path: display.clone(),
                source,
            })?
        } else {
            serde_yaml::from_str(&raw).map_err(|source| ConfigError::Yaml {
                path: display.clone(),
                source,
            })?
        };

        for (domain, site) in &sites.sites {
            site.validate(domain)?;
        }
        info!(count = sites.sites.len(), "Loaded site configurations");
        Ok(sites)
    }

    pub fn insert(&mut self, domain: impl Into<String>, site: SiteConfig) {
        self.sites.insert(domain.into(), site);
    }

    /// Find the config for a URL's host.
    ///
    /// A leading `www.` is ignored and parent domains are tried in turn, so
    /// `news.example.com` falls back to `example.com`. Unknown hosts get the
    /// default config.
    pub fn lookup(&self, url: &Url) -> SiteConfig {
        let Some(host) = url.host_str() else {
            return SiteConfig::default();
        };
        let mut candidate = host.strip_prefix("www.").unwrap_or(host);
        loop {
            if let Some(site) = self.sites.get(candidate) {
                debug!(domain = candidate, "Matched site configuration");
                return site.clone();
            }
            match candidate.split_once('.') {
                Some((_, parent)) if parent.contains('.') => candidate = parent,
                _ => break,
            }
        }
        debug!(host, "No site configuration; using defaults");
        SiteConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_endpoints() {
        let site = SiteConfig::default();
        let url = Url::parse("https://www.example.com/2024/01/01/hello/").unwrap();
        assert_eq!(
            site.wpjson_base(&url).as_deref(),
            Some("https://www.example.com/wp-json")
        );
        assert_eq!(
            site.posts_endpoint(&url).as_deref(),
            Some("https://www.example.com/wp-json/wp/v2/posts")
        );
    }

    #[test]
    fn test_custom_wpjson_path() {
        let site = SiteConfig {
            wpjson_path: Some("https://api.example.net/wp-json/".to_string()),
            posts_path: "/wp/v2/articles".to_string(),
            ..SiteConfig::default()
        };
        let url = Url::parse("https://example.com/story").unwrap();
        assert_eq!(
            site.posts_endpoint(&url).as_deref(),
            Some("https://api.example.net/wp-json/wp/v2/articles")
        );

        let relative = SiteConfig {
            wpjson_path: Some("/blog/wp-json".to_string()),
            ..SiteConfig::default()
        };
        assert_eq!(
            relative.wpjson_base(&url).as_deref(),
            Some("https://example.com/blog/wp-json")
        );
    }

    #[test]
    fn test_unrooted_wpjson_path_joins_at_host() {
        let site = SiteConfig {
            wpjson_path: Some("wp-json".to_string()),
            ..SiteConfig::default()
        };
        let url = Url::parse("https://example.com/2024/01/hello/").unwrap();
        assert_eq!(site.wpjson_base(&url).as_deref(), Some("https://example.com/wp-json"));
        assert_eq!(
            site.posts_endpoint(&url).as_deref(),
            Some("https://example.com/wp-json/wp/v2/posts")
        );
    }

    #[test]
    fn test_lookup_falls_back_to_parent_domain() {
        let mut sites = SitesFile::default();
        sites.insert(
            "example.com",
            SiteConfig {
                feed_title: Some("Example".to_string()),
                ..SiteConfig::default()
            },
        );

        let sub = Url::parse("https://news.example.com/a").unwrap();
        assert_eq!(sites.lookup(&sub).feed_title.as_deref(), Some("Example"));

        let www = Url::parse("https://www.example.com/a").unwrap();
        assert_eq!(sites.lookup(&www).feed_title.as_deref(), Some("Example"));

        let other = Url::parse("https://other.org/a").unwrap();
        assert_eq!(sites.lookup(&other), SiteConfig::default());
    }

    #[test]
    fn test_load_yaml_and_json() {
        let dir = tempfile::tempdir().unwrap();

        let yaml_path = dir.path().join("sites.yaml");
        let mut f = std::fs::File::create(&yaml_path).unwrap();
        writeln!(
            f,
            "example.com:\n  use_blocks: true\n  decompose: ['.ad']\n  rename:\n    - {{ selector: 'p.subhead', tag: 'h3' }}"
        )
        .unwrap();
        let sites = SitesFile::load(&yaml_path).unwrap();
        let site = sites.lookup(&Url::parse("https://example.com/x").unwrap());
        assert!(site.use_blocks);
        assert!(site.embed);
        assert_eq!(site.decompose, vec![".ad".to_string()]);
        assert_eq!(site.rename[0].tag, "h3");

        let json_path = dir.path().join("sites.json");
        std::fs::write(&json_path, r#"{"example.org": {"posts_path": "/wp/v2/news"}}"#).unwrap();
        let sites = SitesFile::load(&json_path).unwrap();
        let site = sites.lookup(&Url::parse("https://example.org/x").unwrap());
        assert_eq!(site.posts_path, "/wp/v2/news");
    }

    #[test]
    fn test_load_rejects_bad_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sites.json");
        std::fs::write(&path, r#"{"example.org": {"id_pattern": "(unclosed"}}"#).unwrap();
        let err = SitesFile::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Pattern { .. }));
    }
}

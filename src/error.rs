//! Error types for fetching, configuration loading, and post normalization.
//!
//! Public handler operations never surface these to their callers: they log
//! the error and return `None`. The types exist so the internals can use `?`
//! and so log lines carry a precise cause.

use thiserror::Error;

/// A failure while retrieving a URL.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },
}

impl FetchError {
    /// Whether a retry could plausibly succeed.
    ///
    /// Transport failures, rate limiting and server errors are transient;
    /// every other status is treated as a permanent answer.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::InvalidHeader { .. } => false,
        }
    }
}

/// A failure while turning a publisher page into an item.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("JSON parse failed for {context}: {source}")]
    Parse {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("empty or missing JSON at {url}")]
    Empty { url: String },

    #[error("invalid URL \"{url}\": {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("item for {url} is missing required field {field}")]
    MissingField { field: &'static str, url: String },
}

/// A failure while loading a sites configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid YAML in {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid pattern {pattern:?} for {domain}: {source}")]
    Pattern {
        domain: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

//! Error types shared by the loader, the icon registrar and configuration.

use thiserror::Error;

/// Why a script or stylesheet request did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// The URL could not be resolved against the page location.
    #[error("invalid resource url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The element fired its error event.
    #[error("failed to load {url}: {reason}")]
    Failed { url: String, reason: String },

    /// The loader was dropped before the resource settled.
    #[error("loader dropped before {url} settled")]
    Abandoned { url: String },
}

/// Failure to fetch an icon-pack payload from one candidate URL.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },

    #[error("{url} is not reachable: {reason}")]
    Unavailable { url: String, reason: String },
}

/// Errors raised while reading a page configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yml::Error,
    },

    #[error("invalid page location {0:?}")]
    Location(String),
}

//! Error types for the fallible edges of the pipeline.
//!
//! Only feed fetching and configuration loading surface typed errors. Link
//! resolution and summarization degrade softly and never return one.

use crate::cancel::Cancelled;
use reqwest::StatusCode;
use thiserror::Error;

/// Failure of a single search query or static feed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("feed endpoint returned status {0}")]
    Status(StatusCode),

    #[error("malformed feed xml: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// Failure to load or validate the YAML configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

//! Destination URL parsing for storage backends.

use object_store::path::Path;
use regex::Regex;
use std::sync::LazyLock;

use crate::error::{InvalidUrlSnafu, StorageError};

static S3_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[sS]3[aA]?://(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$").unwrap()
});
static GCS_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[gG][sS]://(?P<bucket>[a-z0-9\-\._]+)(/(?P<key>.+))?$").unwrap()
});
static FILE_URI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^file://(?P<path>.*)$").unwrap());
static FILE_PATH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^/(?P<path>.*)$").unwrap());

/// S3 destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Config {
    pub bucket: String,
    pub key: Option<Path>,
}

/// GCS destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcsConfig {
    pub bucket: String,
    pub key: Option<Path>,
}

/// Local filesystem destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalConfig {
    pub path: String,
}

/// Backend configuration parsed from a destination URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    S3(S3Config),
    Gcs(GcsConfig),
    Local(LocalConfig),
}

impl BackendConfig {
    /// Parse a destination URL into a backend configuration.
    ///
    /// Supported forms: `s3://bucket/prefix`, `gs://bucket/prefix`,
    /// `file:///path`, and bare absolute paths.
    pub fn parse_url(url: &str) -> Result<Self, StorageError> {
        if let Some(captures) = S3_URL.captures(url) {
            return Ok(BackendConfig::S3(S3Config {
                bucket: captures["bucket"].to_string(),
                key: captures.name("key").map(|key| key.as_str().into()),
            }));
        }
        if let Some(captures) = GCS_URL.captures(url) {
            return Ok(BackendConfig::Gcs(GcsConfig {
                bucket: captures["bucket"].to_string(),
                key: captures.name("key").map(|key| key.as_str().into()),
            }));
        }
        if let Some(captures) = FILE_URI.captures(url) {
            return Ok(BackendConfig::Local(LocalConfig {
                path: format!("/{}", captures["path"].trim_start_matches('/')),
            }));
        }
        if FILE_PATH.is_match(url) {
            return Ok(BackendConfig::Local(LocalConfig {
                path: url.to_string(),
            }));
        }

        InvalidUrlSnafu { url }.fail()
    }

    /// The key prefix embedded in the URL, if any.
    pub fn key(&self) -> Option<&Path> {
        match self {
            BackendConfig::S3(config) => config.key.as_ref(),
            BackendConfig::Gcs(config) => config.key.as_ref(),
            BackendConfig::Local(_) => None,
        }
    }
}

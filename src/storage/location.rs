use crate::{Error, ErrorContext, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static S3_SCHEME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^s3://([^/]+)/(.+)$").expect("valid regex"));
static PATH_STYLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://s3[.-]([a-z0-9-]+\.)?amazonaws\.com/([^/]+)/(.+)$").expect("valid regex")
});
static VIRTUAL_HOSTED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://([^./]+)\.s3[.-]([a-z0-9-]+\.)?amazonaws\.com/(.+)$").expect("valid regex")
});

/// A (bucket, key) pair in an object store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Parse `s3://bucket/key` or a path-style / virtual-hosted HTTPS object URL.
    pub fn parse(uri: &str) -> Result<Self> {
        let uri = uri.trim();
        if let Some(c) = S3_SCHEME.captures(uri) {
            return Ok(Self::new(&c[1], &c[2]));
        }
        if let Some(c) = PATH_STYLE.captures(uri) {
            return Ok(Self::new(&c[2], &c[3]));
        }
        if let Some(c) = VIRTUAL_HOSTED.captures(uri) {
            return Ok(Self::new(&c[1], &c[3]));
        }
        Err(Error::configuration_with_context(
            format!("Invalid object URI format: {}", uri),
            ErrorContext::new()
                .with_details("expected s3://bucket/key or an https S3 object URL")
                .with_source("storage"),
        ))
    }

    /// Sibling object in the same bucket.
    pub fn with_key(&self, key: impl Into<String>) -> Self {
        Self::new(self.bucket.clone(), key)
    }

    pub fn uri(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

impl std::str::FromStr for ObjectLocation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

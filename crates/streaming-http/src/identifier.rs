use std::fmt;
use std::str::FromStr;

use sha2::{Digest as _, Sha256};

use crate::errors::StreamingError;
use crate::request::RequestSpec;

/// Hex characters kept from a content digest.
const DIGEST_ID_LEN: usize = 32;

/// Opaque identifier correlating one streaming request with its events.
///
/// Serialized as a bare string; on the wire it travels as `hash_id`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl RequestId {
    /// Creates an identifier from any string-like value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` when the identifier is empty or only whitespace.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl AsRef<str> for RequestId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// How the correlator allocates identifiers for requests that do not carry one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdStrategy {
    /// Random UUID v4 per request. Concurrent identical requests never collide.
    #[default]
    Random,
    /// Digest of method, url and body. Identical concurrent requests share an
    /// identifier, so the later one preempts the earlier.
    ContentHash,
    /// Digest of the request content plus the current wall-clock time.
    #[serde(rename = "content-hash-timestamp")]
    ContentHashWithTimestamp,
}

impl IdStrategy {
    /// Allocates an identifier for `spec`.
    pub fn allocate(&self, spec: &RequestSpec) -> RequestId {
        match self {
            Self::Random => RequestId(uuid::Uuid::new_v4().simple().to_string()),
            Self::ContentHash => RequestId(content_digest(spec, None)),
            Self::ContentHashWithTimestamp => {
                let nanos = chrono::Utc::now()
                    .timestamp_nanos_opt()
                    .unwrap_or_default();
                RequestId(content_digest(spec, Some(nanos)))
            }
        }
    }

    /// Returns the config name of this strategy.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::ContentHash => "content-hash",
            Self::ContentHashWithTimestamp => "content-hash-timestamp",
        }
    }
}

impl FromStr for IdStrategy {
    type Err = StreamingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "random" | "uuid" => Ok(Self::Random),
            "content-hash" | "content_hash" | "hash" => Ok(Self::ContentHash),
            "content-hash-timestamp" | "content_hash_timestamp" | "hash-timestamp" => {
                Ok(Self::ContentHashWithTimestamp)
            }
            other => Err(StreamingError::Config(format!(
                "unknown id strategy: {other}"
            ))),
        }
    }
}

impl fmt::Display for IdStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn content_digest(spec: &RequestSpec, salt: Option<i64>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(spec.method.to_ascii_uppercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(spec.url.as_bytes());
    hasher.update(b"\n");
    if let Some(body) = &spec.body {
        hasher.update(body.to_string().as_bytes());
    }
    if let Some(salt) = salt {
        hasher.update(b"\n");
        hasher.update(salt.to_le_bytes());
    }
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(DIGEST_ID_LEN);
    digest
}

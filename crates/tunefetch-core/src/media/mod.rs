//! # Media Cache
//!
//! Disk-backed, single-flight media downloads with TTL eviction and
//! byte-range serving.
//!
//! Per key the cache moves through `Absent -> Downloading -> Cached -> Absent`.
//! Downloads land in a `.part` file that is renamed into place only after the
//! transfer completed, so a reader never observes a partial file.

mod cache;
mod range;

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use serde::Serialize;

use crate::domain::{MediaId, UtcDateTime};
use crate::error::ServiceError;

pub use cache::{InitReport, MediaCache};
pub use range::{ByteRange, ContentRange};

pub type MediaFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ServiceError>> + Send + 'a>>;

/// Where the bytes for one media id can be downloaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSource {
    pub url: String,
    pub content_length: Option<u64>,
    /// Signed origin URLs stop working after this instant.
    pub expires_at: Option<UtcDateTime>,
}

impl MediaSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            content_length: None,
            expires_at: None,
        }
    }

    pub fn with_content_length(mut self, length: u64) -> Self {
        self.content_length = Some(length);
        self
    }

    pub fn with_expiry(mut self, expires_at: UtcDateTime) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn is_expired(&self, now: UtcDateTime) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

/// Resolves a media id to a downloadable source.
pub trait MediaOrigin: Send + Sync {
    fn resolve<'a>(&'a self, id: &'a MediaId) -> MediaFuture<'a, MediaSource>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaCacheConfig {
    pub directory: PathBuf,
    pub ttl: Duration,
    pub download_timeout: Duration,
}

impl Default for MediaCacheConfig {
    fn default() -> Self {
        Self {
            directory: std::env::temp_dir().join("tunefetch-media"),
            ttl: Duration::from_secs(30 * 60),
            download_timeout: Duration::from_secs(120),
        }
    }
}

impl MediaCacheConfig {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }
}

/// Observable state of one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MediaState {
    Absent,
    Downloading,
    Cached {
        size_bytes: u64,
        created_at: UtcDateTime,
        expires_at: UtcDateTime,
    },
}

/// Bytes served for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaBody {
    pub bytes: Vec<u8>,
    /// Length of the whole cached file.
    pub total: u64,
    /// Present for partial-content answers.
    pub content_range: Option<ContentRange>,
}

impl MediaBody {
    pub const fn status(&self) -> u16 {
        if self.content_range.is_some() {
            206
        } else {
            200
        }
    }

    pub fn content_range_header(&self) -> Option<String> {
        self.content_range.map(|range| range.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_without_expiry_never_expires() {
        let source = MediaSource::new("https://cdn.test/a.mp4");
        assert!(!source.is_expired(UtcDateTime::now()));
    }

    #[test]
    fn source_past_expiry_is_expired() {
        let expired = UtcDateTime::from_unix_seconds(1_000).expect("valid");
        let source = MediaSource::new("https://cdn.test/a.mp4").with_expiry(expired);
        assert!(source.is_expired(UtcDateTime::now()));
    }

    #[test]
    fn cached_state_serializes_with_tag() {
        let at = UtcDateTime::parse("2024-01-01T00:00:00Z").expect("valid");
        let json = serde_json::to_value(MediaState::Cached {
            size_bytes: 10,
            created_at: at,
            expires_at: at,
        })
        .expect("serializes");

        assert_eq!(json["state"], "cached");
        assert_eq!(json["size_bytes"], 10);
    }
}

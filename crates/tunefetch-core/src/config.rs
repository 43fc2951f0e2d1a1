use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::adapters::saavn::{DEFAULT_API_ENDPOINTS, DEFAULT_MIRRORS};
use crate::error::ValidationError;
use crate::media::MediaCacheConfig;
use crate::orchestrator::EndpointSet;
use crate::retry::RetryPolicy;

/// Service-wide settings.
///
/// # Environment Variables
///
/// | Setting | Env Var | Default |
/// |---------|---------|---------|
/// | Metadata TTL | `TUNEFETCH_METADATA_TTL_SECS` | 600 |
/// | Media TTL | `TUNEFETCH_MEDIA_TTL_SECS` | 1800 |
/// | Media directory | `TUNEFETCH_MEDIA_DIR` | `$TMPDIR/tunefetch-media` |
/// | Mirror APIs | `TUNEFETCH_MIRRORS` (comma separated) | `https://saavn.dev/api` |
/// | First attempt timeout | `TUNEFETCH_BASE_TIMEOUT_MS` | 3000 |
/// | Requests per minute per endpoint | `TUNEFETCH_UPSTREAM_QUOTA` | unlimited |
///
/// # Example
///
/// ```rust,ignore
/// use tunefetch_core::ServiceConfig;
///
/// let config = ServiceConfig::from_env()?
///     .with_metadata_ttl(Duration::from_secs(60));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub metadata_ttl: Duration,
    pub mirrors: Vec<String>,
    pub api_endpoints: Vec<String>,
    pub retry: RetryPolicy,
    pub upstream_quota: Option<u32>,
    pub enrichment_timeout: Duration,
    pub media: MediaCacheConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            metadata_ttl: Duration::from_secs(10 * 60),
            mirrors: DEFAULT_MIRRORS.iter().map(|url| (*url).to_owned()).collect(),
            api_endpoints: DEFAULT_API_ENDPOINTS
                .iter()
                .map(|url| (*url).to_owned())
                .collect(),
            retry: RetryPolicy::default(),
            upstream_quota: None,
            enrichment_timeout: Duration::from_secs(8),
            media: MediaCacheConfig::default(),
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ValidationError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Missing or blank keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &'static str| {
            lookup(key)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
                .map(|value| (key, value))
        };
        let mut config = Self::default();

        if let Some((key, value)) = read("TUNEFETCH_METADATA_TTL_SECS") {
            config.metadata_ttl = Duration::from_secs(parse_number(key, &value)?);
        }
        if let Some((key, value)) = read("TUNEFETCH_MEDIA_TTL_SECS") {
            config.media.ttl = Duration::from_secs(parse_number(key, &value)?);
        }
        if let Some((_, value)) = read("TUNEFETCH_MEDIA_DIR") {
            config.media.directory = PathBuf::from(value);
        }
        if let Some((key, value)) = read("TUNEFETCH_MIRRORS") {
            let mirrors: Vec<String> = value
                .split(',')
                .map(str::trim)
                .filter(|mirror| !mirror.is_empty())
                .map(str::to_owned)
                .collect();
            EndpointSet::parse_all(mirrors.iter().map(String::as_str)).map_err(|_| {
                ValidationError::InvalidConfig {
                    key,
                    value: value.clone(),
                }
            })?;
            config.mirrors = mirrors;
        }
        if let Some((key, value)) = read("TUNEFETCH_BASE_TIMEOUT_MS") {
            let millis = parse_number(key, &value)?;
            if millis == 0 {
                return Err(ValidationError::InvalidConfig { key, value });
            }
            config.retry = config.retry.with_base_timeout(Duration::from_millis(millis));
        }
        if let Some((key, value)) = read("TUNEFETCH_UPSTREAM_QUOTA") {
            let quota = u32::try_from(parse_number(key, &value)?)
                .ok()
                .filter(|quota| *quota > 0)
                .ok_or(ValidationError::InvalidConfig { key, value })?;
            config.upstream_quota = Some(quota);
        }

        Ok(config)
    }

    pub fn with_metadata_ttl(mut self, ttl: Duration) -> Self {
        self.metadata_ttl = ttl;
        self
    }

    pub fn with_mirrors(mut self, mirrors: Vec<String>) -> Self {
        self.mirrors = mirrors;
        self
    }

    pub fn with_api_endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.api_endpoints = endpoints;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_upstream_quota(mut self, quota: Option<u32>) -> Self {
        self.upstream_quota = quota;
        self
    }

    pub fn with_media(mut self, media: MediaCacheConfig) -> Self {
        self.media = media;
        self
    }

    pub fn mirror_set(&self) -> Result<EndpointSet, ValidationError> {
        EndpointSet::parse_all(self.mirrors.iter().map(String::as_str))
    }

    pub fn api_endpoint_set(&self) -> Result<EndpointSet, ValidationError> {
        EndpointSet::parse_all(self.api_endpoints.iter().map(String::as_str))
    }
}

fn parse_number(key: &'static str, value: &str) -> Result<u64, ValidationError> {
    value
        .parse::<u64>()
        .map_err(|_| ValidationError::InvalidConfig {
            key,
            value: value.to_owned(),
        })
}

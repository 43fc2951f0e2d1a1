use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::orchestrator::AttemptRecord;

/// Validation errors for identifiers, byte ranges and configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("identifier cannot be empty")]
    EmptyIdentifier,
    #[error("identifier length {len} exceeds max {max}")]
    IdentifierTooLong { len: usize, max: usize },
    #[error("identifier contains invalid character '{ch}' at index {index}")]
    IdentifierInvalidChar { ch: char, index: usize },

    #[error("search query cannot be empty")]
    EmptyQuery,
    #[error("limit must be greater than zero")]
    ZeroLimit,

    #[error("endpoint list must contain at least one endpoint")]
    EmptyEndpointList,
    #[error("endpoint '{value}' is not an absolute http(s) address")]
    InvalidEndpoint { value: String },

    #[error("malformed range header '{value}', expected bytes=START-END")]
    MalformedRange { value: String },
    #[error("range end {end} is before start {start}")]
    InvertedRange { start: u64, end: u64 },

    #[error("timestamp '{value}' is not a valid UTC instant")]
    InvalidTimestamp { value: String },

    #[error("invalid value '{value}' for configuration key '{key}'")]
    InvalidConfig { key: &'static str, value: String },
}

/// Error taxonomy surfaced to the API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceErrorKind {
    /// Every endpoint candidate was exhausted without a structurally valid response.
    UpstreamUnavailable,
    /// Missing or malformed identifier/query from the caller.
    InvalidInput,
    /// A structurally valid upstream response reported absence.
    NotFound,
    /// Media origin resolution or transfer failed.
    DownloadFailed,
    /// Requested byte range starts beyond the content length.
    RangeUnsatisfiable,
}

impl ServiceErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::InvalidInput => "invalid_input",
            Self::NotFound => "not_found",
            Self::DownloadFailed => "download_failed",
            Self::RangeUnsatisfiable => "range_unsatisfiable",
        }
    }

    /// HTTP status an API layer should answer with.
    pub const fn http_status(self) -> u16 {
        match self {
            Self::UpstreamUnavailable => 502,
            Self::InvalidInput => 400,
            Self::NotFound => 404,
            Self::DownloadFailed => 502,
            Self::RangeUnsatisfiable => 416,
        }
    }
}

impl Display for ServiceErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error returned by the orchestrator, catalog and media cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceError {
    kind: ServiceErrorKind,
    message: String,
    attempts: Vec<AttemptRecord>,
}

impl ServiceError {
    pub fn upstream_unavailable(message: impl Into<String>, attempts: Vec<AttemptRecord>) -> Self {
        Self {
            kind: ServiceErrorKind::UpstreamUnavailable,
            message: message.into(),
            attempts,
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::InvalidInput, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::NotFound, message)
    }

    pub fn download_failed(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::DownloadFailed, message)
    }

    pub fn range_unsatisfiable(start: u64, total: u64) -> Self {
        Self::new(
            ServiceErrorKind::RangeUnsatisfiable,
            format!("range start {start} is beyond content length {total}"),
        )
    }

    fn new(kind: ServiceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            attempts: Vec::new(),
        }
    }

    pub const fn kind(&self) -> ServiceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Per-endpoint attempt trail, populated for `UpstreamUnavailable`.
    pub fn attempts(&self) -> &[AttemptRecord] {
        &self.attempts
    }

    /// Whether the same logical request may succeed if issued again later.
    pub const fn retryable(&self) -> bool {
        matches!(
            self.kind,
            ServiceErrorKind::UpstreamUnavailable | ServiceErrorKind::DownloadFailed
        )
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            ServiceErrorKind::UpstreamUnavailable => "service.upstream_unavailable",
            ServiceErrorKind::InvalidInput => "service.invalid_input",
            ServiceErrorKind::NotFound => "service.not_found",
            ServiceErrorKind::DownloadFailed => "service.download_failed",
            ServiceErrorKind::RangeUnsatisfiable => "service.range_unsatisfiable",
        }
    }

    pub fn to_payload(&self) -> ErrorPayload {
        ErrorPayload {
            kind: self.kind,
            message: self.message.clone(),
            attempts: self
                .attempts
                .iter()
                .map(|attempt| attempt.to_string())
                .collect(),
        }
    }
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for ServiceError {}

impl From<ValidationError> for ServiceError {
    fn from(value: ValidationError) -> Self {
        Self::invalid_input(value.to_string())
    }
}

/// Serializable error body for the API boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub kind: ServiceErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<String>,
}

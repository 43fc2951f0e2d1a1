use std::fmt::{Display, Formatter};

use serde::{Serialize, Serializer};
use tunefetch_core::UtcDateTime;
use uuid::Uuid;

/// Request identifier (UUID v4) for correlating output with logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl Serialize for RequestId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// Provenance of one command's answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Metadata {
    pub request_id: RequestId,
    pub generated_at: UtcDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_endpoint: Option<String>,
    pub latency_ms: u64,
    pub cache_hit: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Metadata {
    pub fn new(source_endpoint: Option<String>, latency_ms: u64, cache_hit: bool) -> Self {
        Self {
            request_id: RequestId::new_v4(),
            generated_at: UtcDateTime::now(),
            source_endpoint,
            latency_ms,
            cache_hit,
            warnings: Vec::new(),
        }
    }

    pub fn push_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }
}

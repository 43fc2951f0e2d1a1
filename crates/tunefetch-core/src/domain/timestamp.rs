use std::fmt::{Display, Formatter};
use std::time::{Duration, SystemTime};

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};

use crate::ValidationError;

/// UTC wall-clock timestamp used for cache bookkeeping and response metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UtcDateTime(OffsetDateTime);

impl UtcDateTime {
    pub fn now() -> Self {
        Self(OffsetDateTime::now_utc())
    }

    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let parsed = OffsetDateTime::parse(input, &Rfc3339).map_err(|_| {
            ValidationError::InvalidTimestamp {
                value: input.to_owned(),
            }
        })?;
        if parsed.offset() != UtcOffset::UTC {
            return Err(ValidationError::InvalidTimestamp {
                value: input.to_owned(),
            });
        }
        Ok(Self(parsed))
    }

    /// Upstream media links carry their expiry as unix seconds.
    pub fn from_unix_seconds(seconds: i64) -> Result<Self, ValidationError> {
        OffsetDateTime::from_unix_timestamp(seconds)
            .map(Self)
            .map_err(|_| ValidationError::InvalidTimestamp {
                value: seconds.to_string(),
            })
    }

    pub fn into_inner(self) -> OffsetDateTime {
        self.0
    }

    pub fn saturating_add(self, duration: Duration) -> Self {
        let delta = time::Duration::try_from(duration).unwrap_or(time::Duration::MAX);
        Self(self.0.saturating_add(delta))
    }

    pub fn format_rfc3339(self) -> String {
        self.0
            .format(&Rfc3339)
            .unwrap_or_else(|_| self.0.unix_timestamp().to_string())
    }
}

impl From<SystemTime> for UtcDateTime {
    fn from(value: SystemTime) -> Self {
        Self(OffsetDateTime::from(value))
    }
}

impl Display for UtcDateTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format_rfc3339())
    }
}

impl Serialize for UtcDateTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.format_rfc3339())
    }
}

impl<'de> Deserialize<'de> for UtcDateTime {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_utc_timestamp() {
        let parsed = UtcDateTime::parse("2024-01-01T00:00:00Z").expect("must parse");
        assert_eq!(parsed.format_rfc3339(), "2024-01-01T00:00:00Z");
    }

    #[test]
    fn rejects_offset_timestamp() {
        let err = UtcDateTime::parse("2024-01-01T01:00:00+01:00").expect_err("must fail");
        assert!(matches!(err, ValidationError::InvalidTimestamp { .. }));
    }

    #[test]
    fn converts_unix_expiry_and_adds_ttl() {
        let expiry = UtcDateTime::from_unix_seconds(1_704_067_200).expect("valid");
        assert_eq!(expiry.format_rfc3339(), "2024-01-01T00:00:00Z");
        assert_eq!(
            expiry.saturating_add(Duration::from_secs(3_600)).format_rfc3339(),
            "2024-01-01T01:00:00Z"
        );
    }

    #[test]
    fn converts_file_times() {
        let modified = SystemTime::UNIX_EPOCH + Duration::from_secs(1_704_067_200);
        assert_eq!(
            UtcDateTime::from(modified).format_rfc3339(),
            "2024-01-01T00:00:00Z"
        );
    }
}

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

const MAX_ID_LEN: usize = 64;

fn normalize_identifier(input: &str) -> Result<String, ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyIdentifier);
    }

    let len = trimmed.chars().count();
    if len > MAX_ID_LEN {
        return Err(ValidationError::IdentifierTooLong {
            len,
            max: MAX_ID_LEN,
        });
    }

    for (index, ch) in trimmed.chars().enumerate() {
        let valid = ch.is_ascii_alphanumeric() || ch == '-' || ch == '_';
        if !valid {
            return Err(ValidationError::IdentifierInvalidChar { ch, index });
        }
    }

    Ok(trimmed.to_owned())
}

/// Upstream song identifier (opaque, case-sensitive).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SongId(String);

impl SongId {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        normalize_identifier(input).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SongId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for SongId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SongId> for String {
    fn from(value: SongId) -> Self {
        value.0
    }
}

/// Media cache key. Its characters are safe to use as a file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MediaId(String);

impl MediaId {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        normalize_identifier(input).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for MediaId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for MediaId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<MediaId> for String {
    fn from(value: MediaId) -> Self {
        value.0
    }
}

impl From<SongId> for MediaId {
    fn from(value: SongId) -> Self {
        Self(value.0)
    }
}

impl From<&MediaId> for SongId {
    fn from(value: &MediaId) -> Self {
        Self(value.0.clone())
    }
}

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::error::{ServiceError, ValidationError};

/// A single `Range: bytes=...` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// `bytes=start-` or `bytes=start-end`.
    From { start: u64, end: Option<u64> },
    /// `bytes=-n`: the last `n` bytes.
    Suffix(u64),
}

impl ByteRange {
    pub fn parse(header: &str) -> Result<Self, ValidationError> {
        let malformed = || ValidationError::MalformedRange {
            value: header.to_owned(),
        };

        let trimmed = header.trim();
        let ranges = trimmed
            .get(..6)
            .filter(|unit| unit.eq_ignore_ascii_case("bytes="))
            .map(|_| trimmed[6..].trim())
            .ok_or_else(malformed)?;
        if ranges.contains(',') {
            return Err(malformed());
        }

        let (start, end) = ranges.split_once('-').ok_or_else(malformed)?;
        let parse = |raw: &str| raw.trim().parse::<u64>().map_err(|_| malformed());

        match (start.trim().is_empty(), end.trim().is_empty()) {
            (true, true) => Err(malformed()),
            (true, false) => Ok(Self::Suffix(parse(end)?)),
            (false, true) => Ok(Self::From {
                start: parse(start)?,
                end: None,
            }),
            (false, false) => {
                let start = parse(start)?;
                let end = parse(end)?;
                if end < start {
                    return Err(ValidationError::InvertedRange { start, end });
                }
                Ok(Self::From {
                    start,
                    end: Some(end),
                })
            }
        }
    }

    /// Resolve against a file of `total` bytes, clamping the end to `total - 1`.
    pub fn resolve(self, total: u64) -> Result<ContentRange, ServiceError> {
        let (start, end) = match self {
            Self::From { start, end } => (start, end.unwrap_or(u64::MAX)),
            Self::Suffix(0) => return Err(ServiceError::range_unsatisfiable(total, total)),
            Self::Suffix(len) => (total.saturating_sub(len), u64::MAX),
        };

        if start >= total {
            return Err(ServiceError::range_unsatisfiable(start, total));
        }

        Ok(ContentRange {
            start,
            end: end.min(total - 1),
            total,
        })
    }
}

impl FromStr for ByteRange {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Satisfiable inclusive byte range of a file with known length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: u64,
    pub end: u64,
    pub total: u64,
}

impl ContentRange {
    pub const fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub const fn is_empty(&self) -> bool {
        false
    }
}

impl Display for ContentRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "bytes {}-{}/{}", self.start, self.end, self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ServiceErrorKind;

    #[test]
    fn parses_closed_open_and_suffix_ranges() {
        assert_eq!(
            ByteRange::parse("bytes=200-299"),
            Ok(ByteRange::From {
                start: 200,
                end: Some(299)
            })
        );
        assert_eq!(
            ByteRange::parse("Bytes=10-"),
            Ok(ByteRange::From {
                start: 10,
                end: None
            })
        );
        assert_eq!(ByteRange::parse("bytes=-50"), Ok(ByteRange::Suffix(50)));
    }

    #[test]
    fn rejects_malformed_and_inverted_ranges() {
        assert!(matches!(
            ByteRange::parse("200-299"),
            Err(ValidationError::MalformedRange { .. })
        ));
        assert!(matches!(
            ByteRange::parse("bytes=0-1,5-6"),
            Err(ValidationError::MalformedRange { .. })
        ));
        assert!(matches!(
            ByteRange::parse("bytes=a-b"),
            Err(ValidationError::MalformedRange { .. })
        ));
        assert_eq!(
            ByteRange::parse("bytes=9-3"),
            Err(ValidationError::InvertedRange { start: 9, end: 3 })
        );
    }

    #[test]
    fn resolves_and_formats_content_range() {
        let range = ByteRange::parse("bytes=200-299")
            .map(|r| r.resolve(1000))
            .expect("parses")
            .expect("satisfiable");

        assert_eq!(range.len(), 100);
        assert_eq!(range.to_string(), "bytes 200-299/1000");
    }

    #[test]
    fn open_end_and_overlong_end_clamp_to_last_byte() {
        let open = ByteRange::From {
            start: 900,
            end: None,
        };
        let overlong = ByteRange::From {
            start: 0,
            end: Some(5_000),
        };

        assert_eq!(open.resolve(1000).map(|r| r.end), Ok(999));
        assert_eq!(overlong.resolve(1000).map(|r| r.len()), Ok(1000));
        assert_eq!(ByteRange::Suffix(100).resolve(1000).map(|r| r.start), Ok(900));
    }

    #[test]
    fn start_beyond_length_is_unsatisfiable() {
        let error = ByteRange::From {
            start: 1000,
            end: None,
        }
        .resolve(1000)
        .expect_err("unsatisfiable");

        assert_eq!(error.kind(), ServiceErrorKind::RangeUnsatisfiable);
    }
}

//! `Range: bytes=start-end` parsing and resolution against a content length.

use crate::errors::StoreError;

/// A requested byte interval; `end` is inclusive and open-ended when absent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl ByteRange {
    pub fn new(start: u64, end: Option<u64>) -> Self {
        Self { start, end }
    }

    /// Resolve against a content length, returning the inclusive `(start, end)` to serve.
    ///
    /// `end` past the content is clamped to `length - 1`. A start at or beyond the end of
    /// the content, or a start after the end, cannot be satisfied.
    pub fn resolve(&self, length: u64) -> Result<(u64, u64), StoreError> {
        let unsatisfiable = || StoreError::RangeNotSatisfiable {
            start: self.start,
            end: self.end.unwrap_or(length.saturating_sub(1)),
            length,
        };

        if length == 0 || self.start >= length {
            return Err(unsatisfiable());
        }
        let end = self.end.map_or(length - 1, |e| e.min(length - 1));
        if self.start > end {
            return Err(unsatisfiable());
        }
        Ok((self.start, end))
    }
}

/// Why a Range header could not be parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedRange(pub String);

impl std::fmt::Display for MalformedRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Malformed Range header: {}", self.0)
    }
}

/// Parse a `Range` header value of the form `bytes=start-` or `bytes=start-end`
///
/// Only a single range with an explicit start is accepted.
pub fn parse_range_header(value: &str) -> Result<ByteRange, MalformedRange> {
    let set = value
        .trim()
        .strip_prefix("bytes=")
        .ok_or_else(|| MalformedRange(format!("unsupported unit in '{}'", value)))?;

    if set.contains(',') {
        return Err(MalformedRange("multiple ranges are not supported".to_string()));
    }

    let (start_str, end_str) = set
        .split_once('-')
        .ok_or_else(|| MalformedRange(format!("missing '-' in '{}'", set)))?;

    let start_str = start_str.trim();
    if start_str.is_empty() {
        return Err(MalformedRange("range start is required".to_string()));
    }
    let start: u64 = start_str
        .parse()
        .map_err(|_| MalformedRange(format!("invalid range start '{}'", start_str)))?;

    let end_str = end_str.trim();
    let end = if end_str.is_empty() {
        None
    } else {
        Some(
            end_str
                .parse::<u64>()
                .map_err(|_| MalformedRange(format!("invalid range end '{}'", end_str)))?,
        )
    };

    Ok(ByteRange { start, end })
}

//! Single byte-range requests (`Range: bytes=...`).

use crate::{FilesError, FilesResult};

/// A requested byte range, before it is checked against a file size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// `start-end`, both inclusive.
    Bounded { start: u64, end: u64 },
    /// `start-`, through to the end of the file.
    From { start: u64 },
    /// `-len`, the last `len` bytes.
    Suffix { len: u64 },
}

/// A range validated against a concrete file size. `end` is inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SatisfiedRange {
    pub start: u64,
    pub end: u64,
}

impl SatisfiedRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Renders the `Content-Range` value for a file of `size` bytes.
    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, size)
    }
}

impl ByteRange {
    /// Parses a `Range` header value.
    ///
    /// Only a single range in `bytes` units is understood. Anything else (other units,
    /// multiple ranges, garbage) yields `None`, and the caller serves the full content as
    /// HTTP permits for unrecognised range headers.
    pub fn parse_header(value: &str) -> Option<Self> {
        let spec = value.trim().strip_prefix("bytes=")?.trim();
        if spec.contains(',') {
            return None;
        }

        let (start, end) = spec.split_once('-')?;
        let (start, end) = (start.trim(), end.trim());

        match (start.is_empty(), end.is_empty()) {
            (false, false) => Some(ByteRange::Bounded {
                start: start.parse().ok()?,
                end: end.parse().ok()?,
            }),
            (false, true) => Some(ByteRange::From {
                start: start.parse().ok()?,
            }),
            (true, false) => Some(ByteRange::Suffix {
                len: end.parse().ok()?,
            }),
            (true, true) => None,
        }
    }

    /// Checks this range against a file of `size` bytes.
    ///
    /// A bounded range must lie entirely within the file. A suffix longer than the file
    /// selects the whole file.
    ///
    /// # Errors
    ///
    /// Returns [`FilesError::RangeNotSatisfiable`] if the range starts at or beyond the end
    /// of the file, ends beyond it, is inverted, or is an empty suffix.
    pub fn resolve(&self, size: u64) -> FilesResult<SatisfiedRange> {
        let unsatisfiable = || FilesError::RangeNotSatisfiable { size };

        match *self {
            ByteRange::Bounded { start, end } => {
                if start > end || start >= size || end >= size {
                    return Err(unsatisfiable());
                }
                Ok(SatisfiedRange { start, end })
            }
            ByteRange::From { start } => {
                if start >= size {
                    return Err(unsatisfiable());
                }
                Ok(SatisfiedRange {
                    start,
                    end: size - 1,
                })
            }
            ByteRange::Suffix { len } => {
                if len == 0 || size == 0 {
                    return Err(unsatisfiable());
                }
                Ok(SatisfiedRange {
                    start: size.saturating_sub(len),
                    end: size - 1,
                })
            }
        }
    }
}

//! Boundary splitting over a fully buffered body.

use crate::error::AppError;
use log::trace;
use std::ops::Range;

/// Locates the boundary in a body and hands out the raw parts between
/// successive boundary occurrences.
#[derive(Debug, Clone, Copy)]
pub struct BoundarySplitter<'a> {
    body: &'a [u8],
    boundary: &'a [u8],
    /// Offset of the first byte after the opening boundary line
    start: usize,
}

impl<'a> BoundarySplitter<'a> {
    pub fn new(body: &'a [u8], boundary: &'a [u8]) -> Result<Self, AppError> {
        if boundary.is_empty() {
            return Err(AppError::bad_request("content-type: boundary is required"));
        }
        if body.is_empty() {
            return Err(AppError::malformed_body("empty body"));
        }

        let first = find_bytes(body, boundary, 0)
            .ok_or_else(|| AppError::malformed_body("boundary not found in body"))?;
        let after = first + boundary.len();

        // `--boundary--` as the very first delimiter means a form without parts.
        // Otherwise skip the CRLF that ends the boundary line.
        let start = if body[after..].starts_with(b"--") {
            after
        } else {
            (after + 2).min(body.len())
        };
        trace!("First boundary at offset {first}, parts start at {start}");

        Ok(Self {
            body,
            boundary,
            start,
        })
    }

    /// Iterate the raw parts. Each call starts from the beginning again.
    pub fn parts(&self) -> RawParts<'a> {
        RawParts {
            body: self.body,
            boundary: self.boundary,
            next: Some(self.start),
            index: 0,
        }
    }
}

/// One segment between two boundary occurrences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawPart<'a> {
    /// Position of the part in the body, starting at 0
    pub index: usize,
    /// Absolute offset of `bytes` within the body
    pub offset: usize,
    pub bytes: &'a [u8],
}

impl RawPart<'_> {
    /// The segment after the close delimiter (`--boundary--`). It carries no
    /// form data and ends the sequence for callers.
    pub fn is_closing(&self) -> bool {
        self.bytes.is_empty() || self.bytes.starts_with(b"--")
    }

    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.bytes.len()
    }
}

/// Lazy iterator over [`RawPart`]s; the final item is the closing segment.
#[derive(Debug, Clone)]
pub struct RawParts<'a> {
    body: &'a [u8],
    boundary: &'a [u8],
    next: Option<usize>,
    index: usize,
}

impl<'a> Iterator for RawParts<'a> {
    type Item = RawPart<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.next?;
        let (end, next) = match find_bytes(self.body, self.boundary, start) {
            Some(pos) => (pos, Some(pos + self.boundary.len())),
            None => (self.body.len(), None),
        };
        self.next = next;

        let part = RawPart {
            index: self.index,
            offset: start,
            bytes: &self.body[start..end],
        };
        self.index += 1;
        trace!("Raw part {} spans {:?}", part.index, part.range());
        Some(part)
    }
}

/// Binary pattern search starting at `from`.
pub(crate) fn find_bytes(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from > haystack.len() || haystack.len() - from < needle.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}

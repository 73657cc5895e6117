//! Header/body separation for a single raw part.

use super::header::PartHeader;
use super::splitter::{RawPart, find_bytes};
use crate::error::AppError;
use log::trace;
use std::ops::Range;

/// A raw part split into its parsed header and its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledPart<'a> {
    pub index: usize,
    pub header: PartHeader,
    pub body: &'a [u8],
    /// Absolute range of `body` within the request buffer
    pub body_range: Range<usize>,
}

/// Splits `part` at its first blank line and parses the header text.
///
/// The payload runs up to the last line break of the part, which belongs to
/// the delimiter line of the following boundary and is not part of the data.
pub fn assemble<'a>(part: &RawPart<'a>) -> Result<AssembledPart<'a>, AppError> {
    let bytes = part.bytes;

    let (header_end, body_start) = header_terminator(bytes).ok_or_else(|| {
        AppError::malformed_part(format!(
            "part {} has no blank line after its headers",
            part.index
        ))
    })?;

    let body_end = body_end(bytes, body_start).ok_or_else(|| {
        AppError::malformed_part(format!(
            "part {} is not terminated by a line break",
            part.index
        ))
    })?;

    let header = PartHeader::parse(&bytes[..header_end]);
    let body = &bytes[body_start..body_end];
    let body_range = part.offset + body_start..part.offset + body_end;
    trace!(
        "Part {}: header {} bytes, body {:?}",
        part.index, header_end, body_range
    );

    Ok(AssembledPart {
        index: part.index,
        header,
        body,
        body_range,
    })
}

/// Returns `(header_end, body_start)` for the first blank line.
fn header_terminator(bytes: &[u8]) -> Option<(usize, usize)> {
    let crlf = find_bytes(bytes, b"\r\n\r\n", 0).map(|pos| (pos, pos + 4));
    let lf = find_bytes(bytes, b"\n\n", 0).map(|pos| (pos, pos + 2));
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(if b.0 < a.0 { b } else { a }),
        (a, b) => a.or(b),
    }
}

fn body_end(bytes: &[u8], body_start: usize) -> Option<usize> {
    let newline = bytes[body_start..].iter().rposition(|&b| b == b'\n')? + body_start;
    if newline > body_start && bytes[newline - 1] == b'\r' {
        Some(newline - 1)
    } else {
        Some(newline)
    }
}

//! Part header extraction.
//!
//! Recognizes the one header shape browsers send for form-data parts:
//!
//! ```text
//! Content-Disposition: form-data; name="<NAME>"[; filename="<FILENAME>"]
//! [Content-Type: <TYPE>]
//! ```
//!
//! The accepted character classes are deliberately narrow: `NAME` is
//! `[A-Za-z0-9]+`, `FILENAME` is `[A-Za-z0-9. _-]+` and `TYPE` is the longest
//! leading run of `[a-z/]`. Anything else is not an error; the header simply
//! comes back unrecognized and the caller decides what to do with the part.

use super::splitter::find_bytes;

/// File metadata carried by a file part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub filename: String,
    pub content_type: Option<String>,
}

/// Metadata extracted from one part's header block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartHeader {
    /// Form field name
    pub name: Option<String>,
    /// Present only for file uploads
    pub file: Option<FileMeta>,
}

const DISPOSITION_PREFIX: &[u8] = b"Content-Disposition: form-data; name=\"";
const FILENAME_PREFIX: &[u8] = b"; filename=\"";
const CONTENT_TYPE_PREFIX: &[u8] = b"Content-Type: ";

impl PartHeader {
    /// Parse the header text of a single part.
    ///
    /// Every occurrence of the disposition prefix is tried from left to
    /// right; the first one carrying a valid field name decides the result.
    pub fn parse(header: &[u8]) -> Self {
        let mut from = 0;
        while let Some(pos) = find_bytes(header, DISPOSITION_PREFIX, from) {
            let mut tokens = Tokens::new(header, pos + DISPOSITION_PREFIX.len());
            if let Some(parsed) = parse_disposition(&mut tokens) {
                return parsed;
            }
            from = pos + 1;
        }
        Self::default()
    }
}

/// Parses what follows `name="`. `None` means this occurrence does not match
/// and the caller should keep searching.
fn parse_disposition(tokens: &mut Tokens<'_>) -> Option<PartHeader> {
    let name = tokens.take_while(is_name_byte);
    if name.is_empty() || !tokens.eat(b"\"") {
        return None;
    }
    let name = ascii_string(name);

    if !tokens.eat(FILENAME_PREFIX) {
        return Some(PartHeader {
            name: Some(name),
            file: None,
        });
    }

    // A filename parameter we cannot read makes the whole part unusable:
    // it must not be stored as a file nor mistaken for a plain field.
    let filename = tokens.take_while(is_filename_byte);
    if filename.is_empty() || !tokens.eat(b"\"") || !tokens.eat_line_end() {
        return Some(PartHeader::default());
    }
    let filename = ascii_string(filename);

    let content_type = if tokens.eat(CONTENT_TYPE_PREFIX) {
        let value = tokens.take_while(is_content_type_byte);
        (!value.is_empty()).then(|| ascii_string(value))
    } else {
        None
    };

    Some(PartHeader {
        name: Some(name),
        file: Some(FileMeta {
            filename,
            content_type,
        }),
    })
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric()
}

fn is_filename_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'.' | b' ' | b'_' | b'-')
}

fn is_content_type_byte(b: u8) -> bool {
    b.is_ascii_lowercase() || b == b'/'
}

// Only called on runs that passed one of the ASCII class checks above.
fn ascii_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Cursor over the header bytes.
struct Tokens<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Tokens<'a> {
    fn new(input: &'a [u8], pos: usize) -> Self {
        Self { input, pos }
    }

    fn rest(&self) -> &'a [u8] {
        &self.input[self.pos.min(self.input.len())..]
    }

    fn eat(&mut self, literal: &[u8]) -> bool {
        if self.rest().starts_with(literal) {
            self.pos += literal.len();
            true
        } else {
            false
        }
    }

    fn take_while(&mut self, accept: fn(u8) -> bool) -> &'a [u8] {
        let rest = self.rest();
        let len = rest.iter().take_while(|&&b| accept(b)).count();
        self.pos += len;
        &rest[..len]
    }

    /// `\r\n`, `\n`, or the end of the header text (the blank line that
    /// closes the header block has already been cut off).
    fn eat_line_end(&mut self) -> bool {
        self.eat(b"\r\n") || self.eat(b"\n") || self.rest().is_empty()
    }
}

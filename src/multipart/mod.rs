// SPDX-License-Identifier: MIT

//! multipart/form-data body parser.
//!
//! The request body is buffered in full and parsed in three steps:
//!
//! 1. [`splitter::BoundarySplitter`] cuts the buffer at every occurrence of
//!    the boundary token.
//! 2. [`assembler::assemble`] separates each raw part into its header block
//!    and payload and runs [`header::PartHeader::parse`] on the header.
//! 3. [`MultipartParser::parse`] routes file parts to storage and collects
//!    plain fields into a [`ParsedBody`].
//!
//! Every part is assembled before the first byte is written, so a malformed
//! body never leaves files behind. Files of one request are then written
//! concurrently through a [`WriteGroup`].
//!
//! # Example
//! ```rust,no_run
//! use formdrop::multipart::MultipartParser;
//! use formdrop::storage::FsStorage;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let body = b"--xYz\r\n\
//! Content-Disposition: form-data; name=\"title\"\r\n\r\n\
//! Hello\r\n\
//! --xYz--\r\n"
//!     .to_vec();
//! let parser = MultipartParser::new(Arc::new(FsStorage::new()), "storage");
//! let parsed = parser.parse(body, "xYz")?;
//! assert_eq!(parsed.field_text("title").as_deref(), Some("Hello"));
//! # Ok(())
//! # }
//! ```

pub mod assembler;
pub mod header;
pub mod splitter;

use crate::error::AppError;
use crate::storage::{StorageWriter, WriteGroup, WriteJob, resolve_storage_path};
use assembler::assemble;
use header::PartHeader;
use log::{debug, info, warn};
use serde::Serialize;
use splitter::BoundarySplitter;
use std::borrow::Cow;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default cap on a whole request body (64MB)
pub const DEFAULT_MAX_BODY_SIZE: u64 = 64 * 1024 * 1024;
/// Default time allowed for all writes of one request
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

const MULTIPART_FORM_DATA: &str = "multipart/form-data";
const BOUNDARY_PARAM: &str = "boundary=";

/// A file part that was written to storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub field_name: String,
    pub filename: String,
    pub content_type: Option<String>,
    pub storage_path: PathBuf,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// The part header carried no usable `Content-Disposition`
    UnrecognizedHeader,
}

/// A part that was skipped instead of failing the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseWarning {
    pub part_index: usize,
    pub kind: WarningKind,
}

/// Everything extracted from one request body.
#[derive(Debug, Clone, Default)]
pub struct ParsedBody {
    /// Plain form fields; a repeated name keeps the last value
    pub fields: HashMap<String, Vec<u8>>,
    /// Stored files in the order their parts appeared
    pub files: Vec<UploadedFile>,
    pub warnings: Vec<ParseWarning>,
}

impl ParsedBody {
    /// Field value decoded as UTF-8, invalid sequences replaced.
    pub fn field_text(&self, name: &str) -> Option<Cow<'_, str>> {
        self.fields
            .get(name)
            .map(|value| String::from_utf8_lossy(value))
    }

    /// Field names in sorted order.
    pub fn field_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.fields.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Parses buffered multipart bodies and persists their files.
pub struct MultipartParser {
    storage: Arc<dyn StorageWriter>,
    storage_root: PathBuf,
    max_body_size: u64,
    write_timeout: Duration,
}

impl MultipartParser {
    pub fn new(storage: Arc<dyn StorageWriter>, storage_root: impl Into<PathBuf>) -> Self {
        Self {
            storage,
            storage_root: storage_root.into(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    pub fn with_max_body_size(mut self, max_body_size: u64) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    /// Parse `body` delimited by `boundary`, store its files and collect its
    /// fields.
    ///
    /// Structural problems (missing boundary, a part without a blank line or
    /// without a trailing line break, an unsafe filename) fail the whole
    /// request before anything is written. Parts whose header cannot be
    /// recognized are skipped and reported in [`ParsedBody::warnings`].
    /// When two file parts resolve to the same path only the later one is
    /// written, though both are listed in [`ParsedBody::files`].
    pub fn parse(
        &self,
        body: impl Into<Arc<Vec<u8>>>,
        boundary: &str,
    ) -> Result<ParsedBody, AppError> {
        let buffer: Arc<Vec<u8>> = body.into();
        if buffer.len() as u64 > self.max_body_size {
            warn!(
                "Rejecting multipart body of {} bytes (limit {})",
                buffer.len(),
                self.max_body_size
            );
            return Err(AppError::payload_too_large(self.max_body_size));
        }

        let splitter = BoundarySplitter::new(&buffer, boundary.as_bytes())?;
        let mut parsed = ParsedBody::default();
        let mut jobs: Vec<WriteJob> = Vec::new();

        for raw in splitter.parts() {
            if raw.is_closing() {
                break;
            }
            let part = assemble(&raw)?;

            match part.header {
                PartHeader {
                    name: Some(field_name),
                    file: Some(file),
                } => {
                    let storage_path = resolve_storage_path(&self.storage_root, &file.filename)?;
                    debug!(
                        "Part {}: file {:?} for field '{field_name}', {} bytes",
                        part.index,
                        file.filename,
                        part.body.len()
                    );
                    let job = WriteJob {
                        path: storage_path.clone(),
                        range: part.body_range.clone(),
                    };
                    // One writer per path; the later part replaces the earlier one
                    match jobs.iter_mut().find(|queued| queued.path == job.path) {
                        Some(queued) => {
                            debug!(
                                "Part {}: replaces an earlier part for {:?}",
                                part.index, job.path
                            );
                            *queued = job;
                        }
                        None => jobs.push(job),
                    }
                    parsed.files.push(UploadedFile {
                        field_name,
                        filename: file.filename,
                        content_type: file.content_type,
                        storage_path,
                        size: part.body.len() as u64,
                    });
                }
                PartHeader {
                    name: Some(field_name),
                    file: None,
                } => {
                    debug!("Part {}: field '{field_name}'", part.index);
                    if parsed
                        .fields
                        .insert(field_name.clone(), part.body.to_vec())
                        .is_some()
                    {
                        debug!("Field '{field_name}' repeated, keeping the later value");
                    }
                }
                _ => {
                    warn!("Part {}: unrecognized header, skipping", part.index);
                    parsed.warnings.push(ParseWarning {
                        part_index: part.index,
                        kind: WarningKind::UnrecognizedHeader,
                    });
                }
            }
        }

        let total_bytes: u64 = parsed.files.iter().map(|f| f.size).sum();
        WriteGroup::new(Arc::clone(&self.storage), self.write_timeout)
            .run(Arc::clone(&buffer), jobs)?;

        if !parsed.files.is_empty() {
            info!(
                "Stored {} file(s), {} bytes, under {:?}",
                parsed.files.len(),
                total_bytes,
                self.storage_root
            );
        }
        Ok(parsed)
    }

    /// Extract the boundary token from a `Content-Type` header value.
    ///
    /// The media type must be `multipart/form-data` and its first parameter
    /// must be `boundary=<token>`. Surrounding whitespace and double quotes
    /// around the token are dropped.
    pub fn extract_boundary(content_type: &str) -> Result<String, AppError> {
        let mut params = content_type.split(';');
        let media_type = params.next().unwrap_or_default().trim();
        if !media_type.eq_ignore_ascii_case(MULTIPART_FORM_DATA) {
            return Err(AppError::bad_request(
                "content-type should be multipart/form-data",
            ));
        }

        params
            .next()
            .map(str::trim)
            .and_then(|param| param.strip_prefix(BOUNDARY_PARAM))
            .map(|token| token.trim().trim_matches('"'))
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .ok_or_else(|| AppError::bad_request("content-type: boundary is required"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::CancelToken;
    use std::io;
    use std::path::Path;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStorage {
        files: Mutex<HashMap<PathBuf, Vec<u8>>>,
    }

    impl StorageWriter for MemoryStorage {
        fn write(&self, path: &Path, data: &[u8], _cancel: &CancelToken) -> io::Result<()> {
            self.files
                .lock()
                .unwrap()
                .insert(path.to_path_buf(), data.to_vec());
            Ok(())
        }
    }

    fn parser(storage: &Arc<MemoryStorage>) -> MultipartParser {
        MultipartParser::new(storage.clone(), "storage")
    }

    const TWO_PARTS: &[u8] = b"--xYz\r\n\
Content-Disposition: form-data; name=\"title\"\r\n\
\r\n\
Hello\r\n\
--xYz\r\n\
Content-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\n\
Content-Type: text/plain\r\n\
\r\n\
contents\r\n\
--xYz--\r\n";

    #[test]
    fn test_field_and_file() {
        let storage = Arc::new(MemoryStorage::default());
        let parsed = parser(&storage).parse(TWO_PARTS.to_vec(), "xYz").unwrap();

        assert_eq!(parsed.field_text("title").as_deref(), Some("Hello"));
        assert_eq!(
            parsed.files,
            vec![UploadedFile {
                field_name: "file".to_string(),
                filename: "a.txt".to_string(),
                content_type: Some("text/plain".to_string()),
                storage_path: PathBuf::from("storage").join("a.txt"),
                size: 8,
            }]
        );
        assert!(parsed.warnings.is_empty());

        let files = storage.files.lock().unwrap();
        assert_eq!(
            files.get(&PathBuf::from("storage").join("a.txt")),
            Some(&b"contents".to_vec())
        );
    }

    #[test]
    fn test_repeated_field_keeps_last_value() {
        let body = b"--b\r\n\
Content-Disposition: form-data; name=\"tag\"\r\n\r\nfirst\r\n\
--b\r\n\
Content-Disposition: form-data; name=\"tag\"\r\n\r\nsecond\r\n\
--b--\r\n";
        let storage = Arc::new(MemoryStorage::default());
        let parsed = parser(&storage).parse(body.to_vec(), "b").unwrap();
        assert_eq!(parsed.fields.len(), 1);
        assert_eq!(parsed.field_text("tag").as_deref(), Some("second"));
    }

    #[test]
    fn test_unrecognized_part_becomes_warning() {
        let body = b"--b\r\n\
X-Custom: nothing useful\r\n\r\nignored\r\n\
--b\r\n\
Content-Disposition: form-data; name=\"kept\"\r\n\r\nyes\r\n\
--b--\r\n";
        let storage = Arc::new(MemoryStorage::default());
        let parsed = parser(&storage).parse(body.to_vec(), "b").unwrap();
        assert_eq!(
            parsed.warnings,
            vec![ParseWarning {
                part_index: 0,
                kind: WarningKind::UnrecognizedHeader,
            }]
        );
        assert_eq!(parsed.field_names(), vec!["kept"]);
    }

    #[test]
    fn test_empty_form() {
        let storage = Arc::new(MemoryStorage::default());
        let parsed = parser(&storage).parse(b"--b--\r\n".to_vec(), "b").unwrap();
        assert!(parsed.fields.is_empty());
        assert!(parsed.files.is_empty());
    }

    #[test]
    fn test_body_over_limit() {
        let storage = Arc::new(MemoryStorage::default());
        let err = parser(&storage)
            .with_max_body_size(10)
            .parse(TWO_PARTS.to_vec(), "xYz")
            .unwrap_err();
        assert!(matches!(err, AppError::PayloadTooLarge(10)));
    }

    #[test]
    fn test_malformed_part_writes_nothing() {
        let body = b"--b\r\n\
Content-Disposition: form-data; name=\"f\"; filename=\"ok.txt\"\r\n\r\nfine\r\n\
--b\r\n\
Content-Disposition: form-data; name=\"oops\"\r\nno empty line\r\n\
--b--\r\n";
        let storage = Arc::new(MemoryStorage::default());
        let err = parser(&storage).parse(body.to_vec(), "b").unwrap_err();
        assert!(matches!(err, AppError::MalformedPart(_)));
        assert!(storage.files.lock().unwrap().is_empty());
    }

    #[test]
    fn test_dot_only_filename_is_rejected() {
        let body = b"--b\r\n\
Content-Disposition: form-data; name=\"f\"; filename=\"..\"\r\n\r\nx\r\n\
--b--\r\n";
        let storage = Arc::new(MemoryStorage::default());
        let err = parser(&storage).parse(body.to_vec(), "b").unwrap_err();
        assert!(matches!(err, AppError::InvalidFilename(_)));
        assert!(storage.files.lock().unwrap().is_empty());
    }

    #[test]
    fn test_extract_boundary() {
        let cases = [
            ("multipart/form-data; boundary=xYz", "xYz"),
            (
                "multipart/form-data; boundary=----WebKitFormBoundary7MA4YWxkTrZu0gW",
                "----WebKitFormBoundary7MA4YWxkTrZu0gW",
            ),
            ("multipart/form-data;boundary=\"quoted\"", "quoted"),
            ("Multipart/Form-Data; boundary=abc ", "abc"),
        ];
        for (header, expected) in cases {
            assert_eq!(MultipartParser::extract_boundary(header).unwrap(), expected);
        }
    }

    #[test]
    fn test_extract_boundary_errors() {
        for header in ["application/json", "", "multipart/mixed; boundary=x"] {
            let err = MultipartParser::extract_boundary(header).unwrap_err();
            assert_eq!(
                err.client_message(),
                "content-type should be multipart/form-data"
            );
        }
        for header in [
            "multipart/form-data",
            "multipart/form-data; charset=utf-8; boundary=x",
            "multipart/form-data; boundary=",
            "multipart/form-data; boundary=\"\"",
        ] {
            let err = MultipartParser::extract_boundary(header).unwrap_err();
            assert_eq!(err.client_message(), "content-type: boundary is required");
        }
    }
}

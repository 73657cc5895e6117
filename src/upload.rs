//! Upload endpoint.
//!
//! Validates the request's `Content-Type`, hands the buffered body to the
//! [`MultipartParser`] and renders the outcome as JSON:
//!
//! ```json
//! {
//!   "message": "file uploaded",
//!   "files": [{"fieldName": "file", "filename": "a.txt", "contentType": "text/plain",
//!              "storagePath": "storage/a.txt", "size": 8}],
//!   "fields": ["title"],
//!   "warnings": []
//! }
//! ```

use crate::config::Config;
use crate::error::AppError;
use crate::http::{Request, Response};
use crate::multipart::{MultipartParser, ParseWarning, ParsedBody, UploadedFile};
use crate::storage::{FsStorage, ensure_storage_dir};
use log::{debug, info};
use serde::Serialize;
use std::sync::Arc;

const UPLOAD_OK_MESSAGE: &str = "file uploaded";

#[derive(Debug, Serialize)]
struct UploadResponse<'a> {
    message: &'static str,
    files: &'a [UploadedFile],
    fields: Vec<&'a str>,
    warnings: &'a [ParseWarning],
}

pub struct UploadHandler {
    parser: MultipartParser,
}

impl UploadHandler {
    /// Handler writing to the configured storage directory, created if missing.
    pub fn new(config: &Config) -> Result<Self, AppError> {
        ensure_storage_dir(&config.storage_dir)?;
        let parser = MultipartParser::new(Arc::new(FsStorage::new()), &config.storage_dir)
            .with_max_body_size(config.max_body_size)
            .with_write_timeout(config.write_timeout);
        Ok(Self::with_parser(parser))
    }

    pub fn with_parser(parser: MultipartParser) -> Self {
        Self { parser }
    }

    pub fn handle_upload(&self, request: Request) -> Result<Response, AppError> {
        let content_type = request
            .header("content-type")
            .ok_or_else(|| AppError::bad_request("content-type should be multipart/form-data"))?;
        let boundary = MultipartParser::extract_boundary(content_type)?;
        debug!("Upload with boundary {boundary:?}");

        let body = request.body.unwrap_or_default();
        let body_len = body.len();
        let parsed = self.parser.parse(body, &boundary)?;

        info!(
            "Upload processed: {} bytes, {} file(s), {} field(s), {} skipped part(s)",
            body_len,
            parsed.files.len(),
            parsed.fields.len(),
            parsed.warnings.len()
        );
        Self::generate_json_response(&parsed)
    }

    fn generate_json_response(parsed: &ParsedBody) -> Result<Response, AppError> {
        let body = UploadResponse {
            message: UPLOAD_OK_MESSAGE,
            files: &parsed.files,
            fields: parsed.field_names(),
            warnings: &parsed.warnings,
        };
        Response::json(200, "OK", &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    fn upload_request(content_type: Option<&str>, body: &[u8]) -> Request {
        let mut headers = HashMap::new();
        if let Some(value) = content_type {
            headers.insert("content-type".to_string(), value.to_string());
        }
        Request {
            method: "POST".to_string(),
            path: "/upload".to_string(),
            headers,
            body: Some(body.to_vec()),
        }
    }

    fn handler(dir: &TempDir) -> UploadHandler {
        let config = Config {
            storage_dir: dir.path().join("storage"),
            ..Config::default()
        };
        UploadHandler::new(&config).unwrap()
    }

    #[test]
    fn test_upload_writes_file_and_reports_fields() {
        let dir = TempDir::new().unwrap();
        let body = b"--xYz\r\n\
Content-Disposition: form-data; name=\"title\"\r\n\r\nHello\r\n\
--xYz\r\n\
Content-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\n\
Content-Type: text/plain\r\n\r\ncontents\r\n\
--xYz--\r\n";

        let response = handler(&dir)
            .handle_upload(upload_request(
                Some("multipart/form-data; boundary=xYz"),
                body,
            ))
            .unwrap();
        assert_eq!(response.status_code, 200);

        let json: serde_json::Value = serde_json::from_slice(response.body_bytes()).unwrap();
        assert_eq!(json["message"], "file uploaded");
        assert_eq!(json["fields"], serde_json::json!(["title"]));
        assert_eq!(json["files"][0]["filename"], "a.txt");
        assert_eq!(json["files"][0]["fieldName"], "file");
        assert_eq!(json["files"][0]["contentType"], "text/plain");
        assert_eq!(json["files"][0]["size"], 8);

        let stored = fs::read(dir.path().join("storage").join("a.txt")).unwrap();
        assert_eq!(stored, b"contents");
    }

    #[test]
    fn test_content_type_errors() {
        let dir = TempDir::new().unwrap();
        let handler = handler(&dir);

        let err = handler
            .handle_upload(upload_request(None, b""))
            .unwrap_err();
        assert_eq!(
            err.client_message(),
            "content-type should be multipart/form-data"
        );

        let err = handler
            .handle_upload(upload_request(Some("text/plain"), b"x"))
            .unwrap_err();
        assert_eq!(
            err.client_message(),
            "content-type should be multipart/form-data"
        );

        let err = handler
            .handle_upload(upload_request(Some("multipart/form-data; charset=utf-8"), b"x"))
            .unwrap_err();
        assert_eq!(err.client_message(), "content-type: boundary is required");
    }

    #[test]
    fn test_empty_body_is_malformed() {
        let dir = TempDir::new().unwrap();
        let err = handler(&dir)
            .handle_upload(upload_request(Some("multipart/form-data; boundary=x"), b""))
            .unwrap_err();
        assert!(matches!(err, AppError::MalformedBody(_)));
    }
}

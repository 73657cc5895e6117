// SPDX-License-Identifier: MIT

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug)]
pub enum AppError {
    Io(std::io::Error),
    AddrParse(std::net::AddrParseError),
    /// Client supplied an unusable request; the message is sent back verbatim.
    BadRequest(String),
    NotFound,
    InternalServerError(String),
    // Multipart errors
    MalformedBody(String),   // Boundary missing or body unusable
    MalformedPart(String),   // A part without a header/body separator
    PayloadTooLarge(u64),    // Contains the maximum allowed size
    InvalidFilename(String), // Contains the rejected filename
    // Storage errors
    Storage {
        path: PathBuf,
        source: std::io::Error,
    },
    StorageTimeout(Duration), // Contains the configured write timeout
    InvalidConfiguration(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Io(err) => write!(f, "IO error: {err}"),
            AppError::AddrParse(err) => write!(f, "Address parse error: {err}"),
            AppError::BadRequest(msg) => write!(f, "Bad request: {msg}"),
            AppError::NotFound => write!(f, "Not Found"),
            AppError::InternalServerError(msg) => write!(f, "Internal server error: {msg}"),
            AppError::MalformedBody(detail) => write!(f, "Malformed multipart body: {detail}"),
            AppError::MalformedPart(detail) => write!(f, "Malformed multipart part: {detail}"),
            AppError::PayloadTooLarge(max_size) => {
                write!(
                    f,
                    "Upload payload too large. Maximum allowed size: {max_size} bytes"
                )
            }
            AppError::InvalidFilename(filename) => {
                write!(
                    f,
                    "Invalid filename '{filename}': contains illegal characters or path traversal"
                )
            }
            AppError::Storage { path, source } => {
                write!(f, "Failed to store {}: {source}", path.display())
            }
            AppError::StorageTimeout(timeout) => {
                write!(
                    f,
                    "Storage writes did not finish within {} seconds",
                    timeout.as_secs()
                )
            }
            AppError::InvalidConfiguration(msg) => write!(f, "Invalid configuration: {msg}"),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err)
    }
}

impl From<std::net::AddrParseError> for AppError {
    fn from(err: std::net::AddrParseError) -> Self {
        AppError::AddrParse(err)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Io(err) => Some(err),
            AppError::AddrParse(err) => Some(err),
            AppError::Storage { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl AppError {
    /// Creates a BadRequest error with a client-facing message
    pub fn bad_request<S: Into<String>>(message: S) -> Self {
        AppError::BadRequest(message.into())
    }

    /// Creates a MalformedBody error
    pub fn malformed_body<S: Into<String>>(detail: S) -> Self {
        AppError::MalformedBody(detail.into())
    }

    /// Creates a MalformedPart error
    pub fn malformed_part<S: Into<String>>(detail: S) -> Self {
        AppError::MalformedPart(detail.into())
    }

    /// Creates a PayloadTooLarge error with the maximum allowed size
    pub fn payload_too_large(max_size: u64) -> Self {
        AppError::PayloadTooLarge(max_size)
    }

    /// Creates an InvalidFilename error
    pub fn invalid_filename<S: Into<String>>(filename: S) -> Self {
        AppError::InvalidFilename(filename.into())
    }

    /// Wraps a failed write of `path`
    pub fn storage<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        AppError::Storage {
            path: path.into(),
            source,
        }
    }

    /// HTTP status code and reason phrase used when this error reaches a client.
    pub fn status(&self) -> (u16, &'static str) {
        match self {
            AppError::BadRequest(_)
            | AppError::MalformedBody(_)
            | AppError::MalformedPart(_)
            | AppError::InvalidFilename(_) => (400, "Bad Request"),
            AppError::NotFound => (404, "Not Found"),
            AppError::PayloadTooLarge(_) => (413, "Payload Too Large"),
            AppError::StorageTimeout(_) => (504, "Gateway Timeout"),
            _ => (500, "Internal Server Error"),
        }
    }

    /// Stable machine-readable code sent next to the message.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "bad_request",
            AppError::NotFound => "not_found",
            AppError::MalformedBody(_) => "malformed_body",
            AppError::MalformedPart(_) => "malformed_part",
            AppError::PayloadTooLarge(_) => "payload_too_large",
            AppError::InvalidFilename(_) => "invalid_filename",
            AppError::Storage { .. } => "storage_error",
            AppError::StorageTimeout(_) => "storage_timeout",
            AppError::Io(_)
            | AppError::AddrParse(_)
            | AppError::InternalServerError(_)
            | AppError::InvalidConfiguration(_) => "internal_error",
        }
    }

    /// Message rendered into the JSON response body.
    ///
    /// Internal details (paths, OS errors) stay in the logs.
    pub fn client_message(&self) -> String {
        match self {
            AppError::BadRequest(msg) => msg.clone(),
            AppError::NotFound => "not found".to_string(),
            AppError::MalformedBody(detail) => format!("malformed multipart body: {detail}"),
            AppError::MalformedPart(detail) => format!("malformed multipart part: {detail}"),
            AppError::PayloadTooLarge(max) => {
                format!("request body exceeds the maximum of {max} bytes")
            }
            AppError::InvalidFilename(name) => format!("invalid filename: {name}"),
            AppError::Storage { .. } => "failed to store uploaded file".to_string(),
            AppError::StorageTimeout(_) => "timed out storing uploaded files".to_string(),
            _ => "internal server error".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let errors = [
            AppError::payload_too_large(1024),
            AppError::invalid_filename(".."),
            AppError::malformed_body("boundary not found"),
            AppError::malformed_part("missing header terminator"),
            AppError::StorageTimeout(Duration::from_secs(30)),
        ];

        let expected = [
            "Upload payload too large. Maximum allowed size: 1024 bytes",
            "Invalid filename '..': contains illegal characters or path traversal",
            "Malformed multipart body: boundary not found",
            "Malformed multipart part: missing header terminator",
            "Storage writes did not finish within 30 seconds",
        ];

        for (error, expected_msg) in errors.iter().zip(expected.iter()) {
            assert_eq!(error.to_string(), *expected_msg);
        }
    }

    #[test]
    fn test_status_and_code_mapping() {
        let cases = [
            (AppError::bad_request("x"), 400, "bad_request"),
            (AppError::malformed_body("x"), 400, "malformed_body"),
            (AppError::malformed_part("x"), 400, "malformed_part"),
            (AppError::invalid_filename("x"), 400, "invalid_filename"),
            (AppError::NotFound, 404, "not_found"),
            (AppError::payload_too_large(1), 413, "payload_too_large"),
            (
                AppError::storage("storage/a.txt", std::io::Error::other("disk")),
                500,
                "storage_error",
            ),
            (
                AppError::StorageTimeout(Duration::from_secs(1)),
                504,
                "storage_timeout",
            ),
            (
                AppError::InternalServerError("x".into()),
                500,
                "internal_error",
            ),
        ];

        for (error, status, code) in cases {
            assert_eq!(error.status().0, status, "status for {error}");
            assert_eq!(error.code(), code, "code for {error}");
        }
    }

    #[test]
    fn test_client_message_keeps_bad_request_text() {
        let error = AppError::bad_request("content-type: boundary is required");
        assert_eq!(error.client_message(), "content-type: boundary is required");
        assert_eq!(AppError::NotFound.client_message(), "not found");

        // Storage paths are not leaked to clients
        let error = AppError::storage("/srv/storage/a.txt", std::io::Error::other("disk"));
        assert!(!error.client_message().contains("/srv"));
    }

    #[test]
    fn test_error_source() {
        use std::error::Error;
        let error = AppError::storage("a.txt", std::io::Error::other("disk"));
        assert!(error.source().is_some());
        assert!(AppError::NotFound.source().is_none());
    }
}

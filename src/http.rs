//! Handles HTTP request parsing and response generation.

use crate::error::AppError;
use crate::multipart::splitter::find_bytes;
use crate::router::Router;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::io::prelude::*;
use std::net::TcpStream;
use std::time::Duration;

/// Maximum size for request headers (8KB) to prevent header buffer overflow
const MAX_HEADERS_SIZE: usize = 8 * 1024;

/// Body bytes read from the socket per call
const BODY_CHUNK_SIZE: usize = 8192;

const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Represents a parsed incoming HTTP request.
#[derive(Debug)]
pub struct Request {
    pub method: String,
    pub path: String,
    /// Header names are lowercased
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
}

/// Represents an outgoing HTTP response.
#[derive(Debug)]
pub struct Response {
    pub status_code: u16,
    pub status_text: String,
    pub headers: HashMap<String, String>,
    pub body: ResponseBody,
}

#[derive(Debug)]
pub enum ResponseBody {
    Text(String),
    Binary(Vec<u8>),
}

impl Request {
    /// Read one request from the connection, refusing bodies larger than
    /// `max_body_size` before buffering them.
    pub fn from_stream(stream: &mut TcpStream, max_body_size: u64) -> Result<Self, AppError> {
        stream.set_read_timeout(Some(READ_TIMEOUT))?;
        Self::read_from(stream, max_body_size)
    }

    /// Parse a request from any byte source.
    pub fn read_from<R: Read>(reader: &mut R, max_body_size: u64) -> Result<Self, AppError> {
        let (headers_data, remaining_bytes) = Self::read_headers_with_remaining(reader)?;

        let mut lines = headers_data.lines();
        let request_line = lines
            .next()
            .ok_or_else(|| AppError::bad_request("empty request"))?;
        let parts: Vec<&str> = request_line.split_whitespace().collect();
        if parts.len() != 3 {
            return Err(AppError::bad_request("malformed request line"));
        }

        let method = parts[0].to_uppercase();
        let path = Self::decode_url(parts[1]);
        if !parts[2].starts_with("HTTP/1.") {
            return Err(AppError::bad_request("unsupported HTTP version"));
        }

        let mut headers: HashMap<String, String> = HashMap::new();
        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                break;
            }
            if let Some((key, value)) = line.split_once(':') {
                let key = key.trim().to_lowercase();
                let value = value.trim().to_string();
                match headers.get_mut(&key) {
                    Some(existing) => {
                        existing.push_str(", ");
                        existing.push_str(&value);
                    }
                    None => {
                        headers.insert(key, value);
                    }
                }
            }
        }

        let body = Self::read_request_body(reader, &headers, remaining_bytes, max_body_size)?;

        debug!(
            "Parsed request: {} {} (headers: {}, body_size: {})",
            method,
            path,
            headers.len(),
            body.as_ref().map(|b| b.len()).unwrap_or(0)
        );

        Ok(Request {
            method,
            path,
            headers,
            body,
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Read the header block and return whatever body bytes came with it
    fn read_headers_with_remaining<R: Read>(
        reader: &mut R,
    ) -> Result<(String, Vec<u8>), AppError> {
        let mut buffer = vec![0; MAX_HEADERS_SIZE];
        let mut total_read = 0;

        loop {
            let bytes_read = reader.read(&mut buffer[total_read..])?;
            if bytes_read == 0 {
                if total_read == 0 {
                    return Err(AppError::bad_request("empty request"));
                }
                break;
            }
            total_read += bytes_read;

            let received = &buffer[..total_read];
            let separator = find_bytes(received, b"\r\n\r\n", 0)
                .map(|pos| (pos, pos + 4))
                .or_else(|| find_bytes(received, b"\n\n", 0).map(|pos| (pos, pos + 2)));
            if let Some((headers_end, body_start)) = separator {
                let headers_data = std::str::from_utf8(&received[..headers_end])
                    .map_err(|_| AppError::bad_request("request headers are not valid UTF-8"))?;
                return Ok((headers_data.to_string(), received[body_start..].to_vec()));
            }

            if total_read >= buffer.len() {
                return Err(AppError::bad_request("request headers too large"));
            }
        }

        // Connection closed without a blank line; treat everything as headers
        match std::str::from_utf8(&buffer[..total_read]) {
            Ok(data) => Ok((data.to_string(), Vec::new())),
            Err(_) => Err(AppError::bad_request("request headers are not valid UTF-8")),
        }
    }

    /// Read request body based on Content-Length
    fn read_request_body<R: Read>(
        reader: &mut R,
        headers: &HashMap<String, String>,
        remaining_bytes: Vec<u8>,
        max_body_size: u64,
    ) -> Result<Option<Vec<u8>>, AppError> {
        let content_length = match headers.get("content-length") {
            Some(length_str) => length_str
                .parse::<u64>()
                .map_err(|_| AppError::bad_request("invalid content-length"))?,
            None => {
                let chunked = headers
                    .get("transfer-encoding")
                    .is_some_and(|encoding| encoding.to_lowercase().contains("chunked"));
                if chunked {
                    warn!("Chunked transfer encoding is not supported");
                    return Err(AppError::bad_request(
                        "chunked transfer encoding is not supported",
                    ));
                }
                return Ok(None);
            }
        };

        if content_length == 0 {
            return Ok(Some(Vec::new()));
        }
        if content_length > max_body_size {
            warn!("Refusing body of {content_length} bytes (limit {max_body_size})");
            return Err(AppError::payload_too_large(max_body_size));
        }

        let content_length = usize::try_from(content_length)
            .map_err(|_| AppError::payload_too_large(max_body_size))?;
        let mut body = Vec::with_capacity(content_length);
        let from_headers = remaining_bytes.len().min(content_length);
        body.extend_from_slice(&remaining_bytes[..from_headers]);

        let mut buffer = vec![0; BODY_CHUNK_SIZE];
        while body.len() < content_length {
            let to_read = (content_length - body.len()).min(BODY_CHUNK_SIZE);
            match reader.read(&mut buffer[..to_read]) {
                Ok(0) => {
                    return Err(AppError::bad_request(
                        "request body shorter than content-length",
                    ));
                }
                Ok(n) => body.extend_from_slice(&buffer[..n]),
                Err(e) => {
                    if e.kind() == std::io::ErrorKind::TimedOut
                        || e.kind() == std::io::ErrorKind::WouldBlock
                    {
                        warn!("Request body read timeout");
                    }
                    return Err(AppError::Io(e));
                }
            }
        }

        debug!("Read request body: {} bytes", body.len());
        Ok(Some(body))
    }

    /// Percent-decode a request path; invalid escapes are kept as-is
    fn decode_url(path: &str) -> String {
        let bytes = path.as_bytes();
        let mut decoded = Vec::with_capacity(bytes.len());
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'%' && i + 2 < bytes.len() {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    decoded.push(byte);
                    i += 3;
                    continue;
                }
            }
            decoded.push(bytes[i]);
            i += 1;
        }
        String::from_utf8_lossy(&decoded).into_owned()
    }
}

impl Response {
    pub fn new(status_code: u16, status_text: &str) -> Self {
        Self {
            status_code,
            status_text: status_text.to_string(),
            headers: HashMap::new(),
            body: ResponseBody::Text(String::new()),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    /// JSON response serialized from `value`
    pub fn json<T: Serialize>(
        status_code: u16,
        status_text: &str,
        value: &T,
    ) -> Result<Self, AppError> {
        let body = serde_json::to_string(value)
            .map_err(|e| AppError::InternalServerError(format!("JSON encoding failed: {e}")))?;
        Ok(Self::new(status_code, status_text)
            .with_header("Content-Type", "application/json; charset=utf-8")
            .with_header("Cache-Control", "no-cache")
            .with_body(ResponseBody::Text(body)))
    }

    pub fn html(body: Vec<u8>) -> Self {
        Self::new(200, "OK")
            .with_header("Content-Type", "text/html; charset=utf-8")
            .with_body(ResponseBody::Binary(body))
    }

    /// JSON error body carrying the client message and a stable code.
    pub fn from_error(error: &AppError) -> Self {
        let (status_code, status_text) = error.status();
        let body = serde_json::json!({
            "message": error.client_message(),
            "code": error.code(),
        });
        Self::new(status_code, status_text)
            .with_header("Content-Type", "application/json; charset=utf-8")
            .with_header("Cache-Control", "no-cache")
            .with_body(ResponseBody::Text(body.to_string()))
    }

    fn with_body(mut self, body: ResponseBody) -> Self {
        self.body = body;
        self
    }

    pub fn body_bytes(&self) -> &[u8] {
        match &self.body {
            ResponseBody::Text(text) => text.as_bytes(),
            ResponseBody::Binary(bytes) => bytes,
        }
    }
}

/// Top-level function to handle a client connection.
pub fn handle_client(mut stream: TcpStream, router: &Router, max_body_size: u64) {
    let log_prefix = match stream.peer_addr() {
        Ok(addr) => format!("[{addr}]"),
        Err(_) => "[unknown]".to_string(),
    };

    let request = match Request::from_stream(&mut stream, max_body_size) {
        Ok(req) => req,
        Err(e) => {
            warn!("{log_prefix} Failed to parse request: {e}");
            send_error_response(&mut stream, e, &log_prefix);
            return;
        }
    };

    let request_line = format!("{} {}", request.method, request.path);
    let result = router
        .route(request)
        .unwrap_or(Err(AppError::NotFound));

    match result {
        Ok(response) => {
            if let Err(e) = send_response(&mut stream, response, &log_prefix, &request_line) {
                error!("{log_prefix} Failed to send response: {e}");
            }
        }
        Err(e) => {
            if e.status().0 >= 500 {
                error!("{log_prefix} {request_line} failed: {e}");
            } else {
                warn!("{log_prefix} {request_line} rejected: {e}");
            }
            send_error_response(&mut stream, e, &log_prefix);
        }
    }
}

/// Sends a fully formed `Response` to the client.
pub fn send_response<W: Write>(
    stream: &mut W,
    response: Response,
    log_prefix: &str,
    request_line: &str,
) -> Result<u64, std::io::Error> {
    info!(
        "{} {} {} {}",
        log_prefix, request_line, response.status_code, response.status_text
    );

    let body = response.body_bytes();
    let mut head = format!(
        "HTTP/1.1 {} {}\r\n",
        response.status_code, response.status_text
    );
    head.push_str(concat!("Server: formdrop/", env!("CARGO_PKG_VERSION"), "\r\n"));
    head.push_str("Connection: close\r\n");
    for (key, value) in &response.headers {
        head.push_str(&format!("{key}: {value}\r\n"));
    }
    head.push_str(&format!("Content-Length: {}\r\n\r\n", body.len()));

    stream.write_all(head.as_bytes())?;
    stream.write_all(body)?;
    stream.flush()?;
    Ok(body.len() as u64)
}

/// Sends the JSON rendering of `error`.
pub fn send_error_response<W: Write>(stream: &mut W, error: AppError, log_prefix: &str) {
    let response = Response::from_error(&error);
    if let Err(e) = send_response(stream, response, log_prefix, "-") {
        error!("{log_prefix} Failed to send error response: {e}");
    }
}

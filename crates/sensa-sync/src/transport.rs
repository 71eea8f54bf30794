//! # Upload Transport
//!
//! Authenticated HTTP POST of one batch payload to the collector.
//!
//! ## Request Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Upload Request                                     │
//! │                                                                         │
//! │  open(url, token)                                                      │
//! │     │  parse URL, http/https only ──────────────► MalformedUrl          │
//! │     ▼                                                                   │
//! │  post(connection, payload, compress)                                   │
//! │     │  serde_json::to_vec ─┐                                           │
//! │     │  gzip (optional) ────┴─ failure ──────────► RequestParsing        │
//! │     │                                                                   │
//! │     │  Content-Type: application/json; charset=UTF-8                   │
//! │     │  Authorization: <token>                                          │
//! │     │  Content-Encoding: gzip                                          │
//! │     ▼                                                                   │
//! │  send ── DNS / TCP connect failure ─────────────► ServerUnavailable     │
//! │     │  ── timeout / reset ──────────────────────► NetworkUnavailable    │
//! │     ▼                                                                   │
//! │  read body (a failed read is treated as an empty body)                 │
//! │     ▼                                                                   │
//! │  interpret_response(status, body)                                      │
//! │     401 ──────────────────────────────────────► Unauthorized           │
//! │     2xx ──────────────────────────────────────► Ok(UploadResponse)     │
//! │     other + {errorName, errorMessage}  ───────► DataTransmission       │
//! │     other + {exception|error, message} ───────► DataTransmission       │
//! │     other + anything else ────────────────────► ResponseParsing        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::header::{AUTHORIZATION, CONTENT_ENCODING, CONTENT_TYPE};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::config::parse_http_url;
use crate::error::{SyncError, SyncResult};
use crate::payload::UploadPayload;

/// Content type of every upload.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";

/// Path of the upload endpoint relative to the collector base URL.
pub const MEASUREMENTS_PATH: &str = "measurements/";

/// Appends `path` to `base`, keeping every segment of `base`.
///
/// `Url::join` would drop the last segment of a base without a trailing slash.
pub fn endpoint(base: &Url, path: &str) -> SyncResult<Url> {
    let joined = format!("{}/{}", base.as_str().trim_end_matches('/'), path.trim_start_matches('/'));
    parse_http_url(&joined)
}

// =============================================================================
// Connection and Response
// =============================================================================

/// A validated target plus the credentials to present there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    url: Url,
    token: String,
}

impl Connection {
    /// Validates `url` and pairs it with `token`.
    pub fn new(url: &str, token: &str) -> SyncResult<Self> {
        Ok(Connection {
            url: parse_http_url(url)?,
            token: token.to_string(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

/// A successful (2xx) collector reply.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadResponse {
    pub status: u16,
    /// Parsed JSON body, if there was one.
    pub body: Option<Value>,
}

// =============================================================================
// Uploader Trait
// =============================================================================

/// Sends batch payloads to the collector.
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Validates the target and prepares a connection. No I/O happens here.
    fn open(&self, url: &str, token: &str) -> SyncResult<Connection> {
        Connection::new(url, token)
    }

    /// Sends one payload. `Ok` only for a 2xx reply.
    async fn post(
        &self,
        connection: &Connection,
        payload: &UploadPayload,
        compress: bool,
    ) -> SyncResult<UploadResponse>;
}

// =============================================================================
// HTTP Implementation
// =============================================================================

/// [`Uploader`] over reqwest.
#[derive(Debug, Clone)]
pub struct HttpUploader {
    client: reqwest::Client,
}

impl HttpUploader {
    /// Creates an uploader whose TCP connect phase is bounded by `connect_timeout`.
    pub fn new(connect_timeout: Duration) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| SyncError::Internal(format!("HTTP client setup failed: {e}")))?;
        Ok(HttpUploader { client })
    }

    /// Wraps an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        HttpUploader { client }
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    async fn post(
        &self,
        connection: &Connection,
        payload: &UploadPayload,
        compress: bool,
    ) -> SyncResult<UploadResponse> {
        let json = serde_json::to_vec(payload)?;
        let raw_len = json.len();
        let body = if compress { gzip(&json)? } else { json };

        debug!(
            url = %connection.url,
            measurement_id = payload.id,
            points = payload.point_count(),
            raw_bytes = raw_len,
            sent_bytes = body.len(),
            "Posting batch"
        );

        let mut request = self
            .client
            .post(connection.url.clone())
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .header(AUTHORIZATION, connection.token.as_str())
            .body(body);
        if compress {
            request = request.header(CONTENT_ENCODING, "gzip");
        }

        let response = request.send().await?;
        let status = response.status().as_u16();

        // The status decides the outcome; a body that breaks off counts as empty.
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes.to_vec(),
            Err(e) => {
                warn!(status, error = %e, "Collector reply body unreadable");
                Vec::new()
            }
        };

        debug!(status, body_bytes = bytes.len(), "Collector replied");
        interpret_response(status, &bytes)
    }
}

/// Gzip-compresses `data`.
pub fn gzip(data: &[u8]) -> SyncResult<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 4), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| SyncError::RequestParsing(format!("gzip failed: {e}")))?;
    encoder
        .finish()
        .map_err(|e| SyncError::RequestParsing(format!("gzip failed: {e}")))
}

// =============================================================================
// Response Interpretation
// =============================================================================

/// Classifies a collector reply.
///
/// `401` wins over any body. A `2xx` is success even with an empty or
/// unparsable body.
pub fn interpret_response(status: u16, body: &[u8]) -> SyncResult<UploadResponse> {
    if status == 401 {
        let detail = structured_error(body)
            .map(|(_, message)| message)
            .unwrap_or_else(|| "collector rejected the token".to_string());
        return Err(SyncError::Unauthorized(detail));
    }

    if (200..300).contains(&status) {
        return Ok(UploadResponse {
            status,
            body: serde_json::from_slice(body).ok(),
        });
    }

    match structured_error(body) {
        Some((name, message)) => Err(SyncError::DataTransmission {
            status,
            name,
            message,
        }),
        None => Err(SyncError::ResponseParsing(format!(
            "HTTP {status} with {} unrecognized body bytes",
            body.len()
        ))),
    }
}

/// Extracts `(name, message)` from either error shape the collector uses.
pub(crate) fn structured_error(body: &[u8]) -> Option<(String, String)> {
    let value: Value = serde_json::from_slice(body).ok()?;
    let obj = value.as_object()?;
    let text = |key: &str| obj.get(key).and_then(Value::as_str).map(str::to_string);

    if let (Some(name), Some(message)) = (text("errorName"), text("errorMessage")) {
        return Some((name, message));
    }
    let name = text("exception").or_else(|| text("error"))?;
    let message = text("message")?;
    Some((name, message))
}

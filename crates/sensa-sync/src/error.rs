//! # Sync Error Types
//!
//! Error taxonomy for upload runs and the stable numeric codes handed to
//! listeners.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Transport     │  │     Collector           │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  ServerUnavail. │  │  Unauthorized     (6)   │ │
//! │  │  MissingDeviceId│  │  NetworkUnavail.│  │  DataTransmission (5)   │ │
//! │  │  MalformedUrl   │  │  RequestParsing │  │  ResponseParsing  (4)   │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │    Store        │  │     Engine      │                              │
//! │  │                 │  │                 │                              │
//! │  │  Database (8)   │  │  SyncInProgress │                              │
//! │  │                 │  │  Internal  (11) │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! │                                                                         │
//! │  transmit-error  ◄── Configuration, Transport, Collector                │
//! │  read-error      ◄── Store, Internal                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

// =============================================================================
// Error Codes
// =============================================================================

/// Stable numeric code reported with every error signal.
///
/// The numbers are part of the listener contract and never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ServerUnavailable,
    MalformedUrl,
    RequestParsing,
    ResponseParsing,
    DataTransmission,
    Unauthorized,
    NetworkUnavailable,
    Database,
    Config,
    SyncInProgress,
    Internal,
}

impl ErrorCode {
    pub const fn as_u16(self) -> u16 {
        match self {
            ErrorCode::ServerUnavailable => 1,
            ErrorCode::MalformedUrl => 2,
            ErrorCode::RequestParsing => 3,
            ErrorCode::ResponseParsing => 4,
            ErrorCode::DataTransmission => 5,
            ErrorCode::Unauthorized => 6,
            ErrorCode::NetworkUnavailable => 7,
            ErrorCode::Database => 8,
            ErrorCode::Config => 9,
            ErrorCode::SyncInProgress => 10,
            ErrorCode::Internal => 11,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

// =============================================================================
// SyncError
// =============================================================================

/// Sync error type covering every way an upload run can fail.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Missing device ID (required for upload).
    #[error("Device ID not configured. Run `init-config` first.")]
    MissingDeviceId,

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    /// Collector URL can't be parsed or isn't http(s).
    #[error("Malformed collector URL: {0}")]
    MalformedUrl(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// The collector could not be reached (DNS, refused connection, 5xx on login).
    #[error("Collector unavailable: {0}")]
    ServerUnavailable(String),

    /// Request failed after the connection was established (timeout, reset).
    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    /// Payload could not be serialized or compressed.
    #[error("Failed to build request: {0}")]
    RequestParsing(String),

    // =========================================================================
    // Collector Errors
    // =========================================================================
    /// Collector rejected the credentials or token (HTTP 401 or failed login).
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Collector answered with a structured error.
    #[error("Collector rejected upload ({status} {name}): {message}")]
    DataTransmission {
        status: u16,
        name: String,
        message: String,
    },

    /// Collector answered with something that isn't a recognized reply.
    #[error("Unreadable collector response: {0}")]
    ResponseParsing(String),

    // =========================================================================
    // Store Errors
    // =========================================================================
    /// Point store read or write failed.
    #[error("Database error: {0}")]
    Database(String),

    // =========================================================================
    // Engine Errors
    // =========================================================================
    /// Another run is already active.
    #[error("A sync run is already in progress")]
    SyncInProgress,

    /// Codec or planner failure. Indicates a bug, not bad luck.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Creates a DataTransmission error.
    pub fn transmission(status: u16, name: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::DataTransmission {
            status,
            name: name.into(),
            message: message.into(),
        }
    }

    /// The stable code reported to listeners.
    pub fn code(&self) -> ErrorCode {
        match self {
            SyncError::InvalidConfig(_)
            | SyncError::MissingDeviceId
            | SyncError::ConfigLoadFailed(_)
            | SyncError::ConfigSaveFailed(_) => ErrorCode::Config,
            SyncError::MalformedUrl(_) => ErrorCode::MalformedUrl,
            SyncError::ServerUnavailable(_) => ErrorCode::ServerUnavailable,
            SyncError::NetworkUnavailable(_) => ErrorCode::NetworkUnavailable,
            SyncError::RequestParsing(_) => ErrorCode::RequestParsing,
            SyncError::Unauthorized(_) => ErrorCode::Unauthorized,
            SyncError::DataTransmission { .. } => ErrorCode::DataTransmission,
            SyncError::ResponseParsing(_) => ErrorCode::ResponseParsing,
            SyncError::Database(_) => ErrorCode::Database,
            SyncError::SyncInProgress => ErrorCode::SyncInProgress,
            SyncError::Internal(_) => ErrorCode::Internal,
        }
    }
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<sensa_db::DbError> for SyncError {
    fn from(err: sensa_db::DbError) -> Self {
        SyncError::Database(err.to_string())
    }
}

impl From<sensa_core::CoreError> for SyncError {
    fn from(err: sensa_core::CoreError) -> Self {
        SyncError::Internal(err.to_string())
    }
}

/// ## Error Mapping
/// ```text
/// connect failure (DNS, refused)   → ServerUnavailable
/// builder failure (bad URL)        → MalformedUrl
/// body decode failure              → ResponseParsing
/// timeout, reset, anything else    → NetworkUnavailable
/// ```
impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            SyncError::ServerUnavailable(err.to_string())
        } else if err.is_builder() {
            SyncError::MalformedUrl(err.to_string())
        } else if err.is_decode() {
            SyncError::ResponseParsing(err.to_string())
        } else {
            SyncError::NetworkUnavailable(err.to_string())
        }
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::MalformedUrl(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::RequestParsing(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

/// Collector statuses that will fail the same way on every retry.
const PERMANENT_STATUSES: [u16; 4] = [400, 403, 413, 422];

impl SyncError {
    /// Returns true if a later run may succeed with the same data.
    ///
    /// ## Non-Retryable Errors
    /// - Configuration errors and malformed URLs
    /// - Request building failures and internal bugs
    /// - Collector rejections with status 400, 403, 413 or 422
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::ServerUnavailable(_)
            | SyncError::NetworkUnavailable(_)
            | SyncError::ResponseParsing(_)
            | SyncError::Unauthorized(_)
            | SyncError::Database(_)
            | SyncError::SyncInProgress => true,
            SyncError::DataTransmission { status, .. } => !PERMANENT_STATUSES.contains(status),
            SyncError::InvalidConfig(_)
            | SyncError::MissingDeviceId
            | SyncError::ConfigLoadFailed(_)
            | SyncError::ConfigSaveFailed(_)
            | SyncError::MalformedUrl(_)
            | SyncError::RequestParsing(_)
            | SyncError::Internal(_) => false,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::MissingDeviceId
                | SyncError::MalformedUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }

    /// Returns true for failures on the local side (store or codec).
    ///
    /// These are reported as read errors, everything else as transmit errors.
    pub fn is_local(&self) -> bool {
        matches!(self, SyncError::Database(_) | SyncError::Internal(_))
    }

    /// Returns true if the cached token must be dropped.
    pub fn invalidates_token(&self) -> bool {
        matches!(self, SyncError::Unauthorized(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        let cases = [
            (SyncError::ServerUnavailable("x".into()), 1),
            (SyncError::MalformedUrl("x".into()), 2),
            (SyncError::RequestParsing("x".into()), 3),
            (SyncError::ResponseParsing("x".into()), 4),
            (SyncError::transmission(500, "Boom", "x"), 5),
            (SyncError::Unauthorized("x".into()), 6),
            (SyncError::NetworkUnavailable("x".into()), 7),
            (SyncError::Database("x".into()), 8),
            (SyncError::InvalidConfig("x".into()), 9),
            (SyncError::MissingDeviceId, 9),
            (SyncError::SyncInProgress, 10),
            (SyncError::Internal("x".into()), 11),
        ];
        for (err, code) in cases {
            assert_eq!(err.code().as_u16(), code, "{err}");
        }
    }

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::ServerUnavailable("down".into()).is_retryable());
        assert!(SyncError::NetworkUnavailable("timeout".into()).is_retryable());
        assert!(SyncError::Unauthorized("expired".into()).is_retryable());
        assert!(SyncError::Database("locked".into()).is_retryable());
        assert!(SyncError::transmission(500, "InternalServerError", "oops").is_retryable());
        assert!(SyncError::transmission(503, "Maintenance", "later").is_retryable());

        assert!(!SyncError::transmission(400, "BadRequest", "nope").is_retryable());
        assert!(!SyncError::transmission(413, "PayloadTooLarge", "nope").is_retryable());
        assert!(!SyncError::transmission(422, "Unprocessable", "nope").is_retryable());
        assert!(!SyncError::MalformedUrl("ftp://x".into()).is_retryable());
        assert!(!SyncError::Internal("bug".into()).is_retryable());
        assert!(!SyncError::RequestParsing("bug".into()).is_retryable());
    }

    #[test]
    fn test_local_vs_remote() {
        assert!(SyncError::Database("x".into()).is_local());
        assert!(SyncError::Internal("x".into()).is_local());
        assert!(!SyncError::Unauthorized("x".into()).is_local());
        assert!(SyncError::Unauthorized("x".into()).invalidates_token());
        assert!(SyncError::MalformedUrl("x".into()).is_config_error());
    }

    #[test]
    fn test_conversions() {
        let err: SyncError = url::Url::parse("not a url").unwrap_err().into();
        assert_eq!(err.code(), ErrorCode::MalformedUrl);

        let err: SyncError = sensa_db::DbError::PoolExhausted.into();
        assert_eq!(err.code(), ErrorCode::Database);

        let err: SyncError = sensa_core::CoreError::UnknownKind("gyro".into()).into();
        assert_eq!(err.code(), ErrorCode::Internal);
    }

    #[test]
    fn test_error_display() {
        let err = SyncError::transmission(409, "DuplicateMeasurement", "already stored");
        let msg = err.to_string();
        assert!(msg.contains("409"));
        assert!(msg.contains("DuplicateMeasurement"));
        assert!(msg.contains("already stored"));
    }
}

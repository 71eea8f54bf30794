//! # Error Types
//!
//! Domain-specific error types for sensa-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  sensa-core errors (this file)                                         │
//! │  └── CoreError        - Codec, planner and status-rule failures        │
//! │                                                                         │
//! │  sensa-db errors (separate crate)                                      │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  sensa-sync errors (separate crate)                                    │
//! │  └── SyncError        - What listeners see (with a stable code)        │
//! │                                                                         │
//! │  Flow: CoreError → DbError / SyncError → ErrorCode → Listener          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::kind::PointKind;
use crate::types::MeasurementStatus;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Core domain errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// A wire record is missing a field or carries the wrong JSON type.
    ///
    /// ## When This Occurs
    /// - Decoding a record produced by a different client version
    /// - A non-finite double was encoded (JSON has no NaN, it becomes null)
    #[error("Malformed {kind} record: field '{field}' missing or not a number")]
    MalformedRecord { kind: PointKind, field: String },

    /// A batch limit of zero would never advance the planner.
    #[error("Batch limit for {0} must be greater than 0")]
    InvalidBatchLimit(PointKind),

    /// Measurement status may only move forward.
    ///
    /// ## Lifecycle
    /// ```text
    /// OPEN ──► FINISHED ──► SYNCED
    ///   (never backwards, never skipping back to OPEN)
    /// ```
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidStatusTransition {
        from: MeasurementStatus,
        to: MeasurementStatus,
    },

    /// Unknown status label read from storage or config.
    #[error("Unknown measurement status: '{0}'")]
    UnknownStatus(String),

    /// Unknown point kind label.
    #[error("Unknown point kind: '{0}'")]
    UnknownKind(String),
}

impl CoreError {
    /// Creates a MalformedRecord error.
    pub fn malformed(kind: PointKind, field: impl Into<String>) -> Self {
        CoreError::MalformedRecord {
            kind,
            field: field.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::malformed(PointKind::Rotation, "rX");
        assert!(err.to_string().contains("rotation"));
        assert!(err.to_string().contains("rX"));

        let err = CoreError::InvalidStatusTransition {
            from: MeasurementStatus::Synced,
            to: MeasurementStatus::Finished,
        };
        assert_eq!(err.to_string(), "Invalid status transition: SYNCED -> FINISHED");
    }
}

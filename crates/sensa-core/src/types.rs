//! # Domain Types
//!
//! Core domain types used throughout Sensa.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  Measurement    │   │   DataPoint     │   │  StoredPoint    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (u64)       │   │  Location       │   │  row_id (i64)   │       │
//! │  │  vehicle        │   │  Acceleration   │   │  point          │       │
//! │  │  status         │   │  Rotation       │   │                 │       │
//! │  └─────────────────┘   │  Direction      │   └─────────────────┘       │
//! │                        └─────────────────┘                              │
//! │  ┌──────────────────┐  ┌─────────────────┐   ┌─────────────────┐       │
//! │  │MeasurementStatus │  │    PointKey     │   │  SyncedRange    │       │
//! │  │  ─────────────── │  │  ─────────────  │   │  ─────────────  │       │
//! │  │  Open            │  │  timestamp      │   │  kind           │       │
//! │  │  Finished        │  │  row_id         │   │  first / last   │       │
//! │  │  Synced          │  └─────────────────┘   └─────────────────┘       │
//! │  └──────────────────┘                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Point Ordering
//! Timestamps are non-decreasing within a measurement but NOT unique. Every
//! ordering in Sensa is `(timestamp ASC, row_id ASC)`, and [`PointKey`]
//! captures exactly that pair.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::kind::PointKind;

/// Locally unique, monotonically assigned measurement identifier.
pub type MeasurementId = u64;

// =============================================================================
// Measurement Status
// =============================================================================

/// Lifecycle of a measurement.
///
/// ```text
/// ┌────────┐  finish   ┌──────────┐  all batches acked  ┌────────┐
/// │  OPEN  │ ────────► │ FINISHED │ ──────────────────► │ SYNCED │
/// └────────┘           └──────────┘                     └────────┘
/// ```
///
/// Only `Finished` measurements are eligible for upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MeasurementStatus {
    /// Still recording.
    Open,
    /// Recording complete, waiting for upload.
    Finished,
    /// Every point acknowledged by the collector.
    Synced,
}

impl MeasurementStatus {
    /// Position in the lifecycle; each transition increases it by exactly one.
    #[inline]
    pub const fn rank(self) -> u8 {
        match self {
            MeasurementStatus::Open => 0,
            MeasurementStatus::Finished => 1,
            MeasurementStatus::Synced => 2,
        }
    }

    /// Returns true if `next` is the status directly after `self`.
    #[inline]
    pub const fn can_advance_to(self, next: MeasurementStatus) -> bool {
        next.rank() == self.rank() + 1
    }

    /// Checks a transition, returning the target status when legal.
    pub fn advance_to(self, next: MeasurementStatus) -> Result<MeasurementStatus, CoreError> {
        if self.can_advance_to(next) {
            Ok(next)
        } else {
            Err(CoreError::InvalidStatusTransition { from: self, to: next })
        }
    }

    /// Database / wire label.
    pub const fn as_str(self) -> &'static str {
        match self {
            MeasurementStatus::Open => "OPEN",
            MeasurementStatus::Finished => "FINISHED",
            MeasurementStatus::Synced => "SYNCED",
        }
    }
}

impl fmt::Display for MeasurementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MeasurementStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(MeasurementStatus::Open),
            "FINISHED" => Ok(MeasurementStatus::Finished),
            "SYNCED" => Ok(MeasurementStatus::Synced),
            other => Err(CoreError::UnknownStatus(other.to_string())),
        }
    }
}

// =============================================================================
// Measurement
// =============================================================================

/// A recording session on the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measurement {
    pub id: MeasurementId,
    /// Transport mode label ("CAR", "BICYCLE", ...). Sent as-is.
    pub vehicle: String,
    pub status: MeasurementStatus,
}

impl Measurement {
    /// Returns true if this measurement should be picked up by a sync run.
    #[inline]
    pub fn is_eligible(&self) -> bool {
        self.status == MeasurementStatus::Finished
    }
}

// =============================================================================
// Data Points
// =============================================================================

/// A single GPS fix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    /// Capture time, milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub lat: f64,
    pub lon: f64,
    /// Meters per second.
    pub speed: f64,
    /// Horizontal accuracy in meters.
    pub accuracy: f64,
    /// Kept locally, not part of the upload contract.
    pub altitude: Option<f64>,
    /// Kept locally, not part of the upload contract.
    pub vertical_accuracy: Option<f64>,
}

/// A three-axis inertial sample (accelerometer, gyroscope or magnetometer).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point3D {
    /// Capture time, milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3D {
    pub const fn new(timestamp: i64, x: f64, y: f64, z: f64) -> Self {
        Point3D { timestamp, x, y, z }
    }
}

/// One captured sample of any kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataPoint {
    Location(GeoLocation),
    Acceleration(Point3D),
    Rotation(Point3D),
    Direction(Point3D),
}

impl DataPoint {
    /// The kind tag of this point.
    pub const fn kind(&self) -> PointKind {
        match self {
            DataPoint::Location(_) => PointKind::Location,
            DataPoint::Acceleration(_) => PointKind::Acceleration,
            DataPoint::Rotation(_) => PointKind::Rotation,
            DataPoint::Direction(_) => PointKind::Direction,
        }
    }

    /// Capture timestamp in milliseconds.
    pub const fn timestamp(&self) -> i64 {
        match self {
            DataPoint::Location(l) => l.timestamp,
            DataPoint::Acceleration(p) | DataPoint::Rotation(p) | DataPoint::Direction(p) => {
                p.timestamp
            }
        }
    }

    /// Wraps an inertial sample in the variant for `kind`.
    ///
    /// Returns `None` for [`PointKind::Location`], which is not three-axis.
    pub const fn inertial(kind: PointKind, p: Point3D) -> Option<DataPoint> {
        match kind {
            PointKind::Location => None,
            PointKind::Acceleration => Some(DataPoint::Acceleration(p)),
            PointKind::Rotation => Some(DataPoint::Rotation(p)),
            PointKind::Direction => Some(DataPoint::Direction(p)),
        }
    }
}

/// A point as read back from the store, carrying its row id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoredPoint {
    /// Store row id. Tie-breaker for equal timestamps.
    pub row_id: i64,
    pub point: DataPoint,
}

impl StoredPoint {
    /// The `(timestamp, row_id)` ordering key of this point.
    #[inline]
    pub const fn key(&self) -> PointKey {
        PointKey {
            timestamp: self.point.timestamp(),
            row_id: self.row_id,
        }
    }
}

// =============================================================================
// Sync Ranges
// =============================================================================

/// Total ordering key of a stored point within one kind of one measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PointKey {
    pub timestamp: i64,
    pub row_id: i64,
}

/// Inclusive `(timestamp, row_id)` range of one kind, as transmitted in one batch.
///
/// Marking by range rather than by timestamp alone keeps points that share
/// the boundary timestamp but fell into the next window unsynced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncedRange {
    pub kind: PointKind,
    pub first: PointKey,
    pub last: PointKey,
}

impl SyncedRange {
    /// Builds the covering range of a non-empty, ordered window.
    ///
    /// Returns `None` when `points` is empty.
    pub fn covering(kind: PointKind, points: &[StoredPoint]) -> Option<SyncedRange> {
        let first = points.first()?.key();
        let last = points.last()?.key();
        Some(SyncedRange { kind, first, last })
    }

    /// Returns true if `key` lies inside this range.
    pub fn contains(&self, key: PointKey) -> bool {
        self.first <= key && key <= self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_forward_only() {
        use MeasurementStatus::*;

        assert!(Open.can_advance_to(Finished));
        assert!(Finished.can_advance_to(Synced));
        assert!(!Open.can_advance_to(Synced));
        assert!(!Open.can_advance_to(Open));

        assert!(!Finished.can_advance_to(Open));
        assert!(!Synced.can_advance_to(Finished));
        assert!(!Synced.can_advance_to(Synced));

        assert_eq!(Finished.advance_to(Synced), Ok(Synced));
        assert!(Synced.advance_to(Open).is_err());
        assert_eq!(
            Open.advance_to(Synced),
            Err(CoreError::InvalidStatusTransition { from: Open, to: Synced })
        );
    }

    #[test]
    fn test_status_labels() {
        for status in [
            MeasurementStatus::Open,
            MeasurementStatus::Finished,
            MeasurementStatus::Synced,
        ] {
            assert_eq!(status.as_str().parse::<MeasurementStatus>(), Ok(status));
        }
        assert!("DONE".parse::<MeasurementStatus>().is_err());

        let json = serde_json::to_string(&MeasurementStatus::Finished).unwrap();
        assert_eq!(json, "\"FINISHED\"");
    }

    #[test]
    fn test_covering_range_uses_row_id_tie_break() {
        let pts = [
            StoredPoint {
                row_id: 7,
                point: DataPoint::Rotation(Point3D::new(100, 0.0, 0.0, 0.0)),
            },
            StoredPoint {
                row_id: 9,
                point: DataPoint::Rotation(Point3D::new(100, 0.0, 0.0, 0.0)),
            },
        ];
        let range = SyncedRange::covering(PointKind::Rotation, &pts).unwrap();

        assert!(range.contains(PointKey { timestamp: 100, row_id: 8 }));
        // Same timestamp, later row: belongs to the next window.
        assert!(!range.contains(PointKey { timestamp: 100, row_id: 10 }));
        assert!(SyncedRange::covering(PointKind::Rotation, &[]).is_none());
    }

    #[test]
    fn test_data_point_accessors() {
        let p = DataPoint::inertial(PointKind::Direction, Point3D::new(42, 1.0, 2.0, 3.0)).unwrap();
        assert_eq!(p.kind(), PointKind::Direction);
        assert_eq!(p.timestamp(), 42);
        assert!(DataPoint::inertial(PointKind::Location, Point3D::new(0, 0.0, 0.0, 0.0)).is_none());
    }
}

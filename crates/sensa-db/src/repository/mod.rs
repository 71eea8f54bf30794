//! # Repository Module
//!
//! Database repository implementations for Sensa.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  SyncEngine (through the MeasurementStore trait)                       │
//! │       │                                                                 │
//! │       │  db.points().load_unsynced(id, PointKind::Rotation, 0, 2000)   │
//! │       ▼                                                                 │
//! │  PointRepository                                                       │
//! │  ├── count_unsynced(&self, id, kind)                                   │
//! │  ├── load_unsynced(&self, id, kind, offset, limit)                     │
//! │  ├── mark_synced(&self, id, ranges)      ← one transaction             │
//! │  └── delete_synced(&self, id, kind)                                    │
//! │       │                                                                 │
//! │       │  SQL Query (table chosen by PointKind::table)                  │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`MeasurementRepository`](measurement::MeasurementRepository) - Lifecycle and listing
//! - [`PointRepository`](point::PointRepository) - Per-kind point storage and sync marks

pub mod measurement;
pub mod point;

use crate::error::{DbError, DbResult};

/// SQLite integers are signed; ids and offsets cross the boundary here.
pub(crate) fn to_sql_int(value: u64) -> DbResult<i64> {
    i64::try_from(value).map_err(|_| DbError::InvalidInput(format!("{value} exceeds SQLite integer range")))
}

/// Counts and row ids read back from SQLite are never negative.
pub(crate) fn from_sql_int(value: i64) -> DbResult<u64> {
    u64::try_from(value).map_err(|_| DbError::Internal(format!("unexpected negative integer {value}")))
}

//! # Measurement Store Seam
//!
//! The engine never touches SQL. It reads and marks points through
//! [`MeasurementStore`], which [`sensa_db::Database`] implements and tests
//! wrap to inject faults.

use async_trait::async_trait;

use sensa_core::{Measurement, MeasurementId, MeasurementStatus, PointKind, StoredPoint, SyncedRange};
use sensa_db::Database;

use crate::error::SyncResult;

/// Point and measurement access needed by a sync run.
///
/// Counts and loads only ever see points that are not yet synced.
#[async_trait]
pub trait MeasurementStore: Send + Sync {
    /// Measurements in `status`, ordered by id.
    async fn list_measurements(&self, status: MeasurementStatus) -> SyncResult<Vec<Measurement>>;

    /// Number of unsynced points of `kind`.
    async fn count_points(&self, measurement_id: MeasurementId, kind: PointKind) -> SyncResult<u64>;

    /// Unsynced points of `kind` in `[offset, offset + limit)`, ordered by `(timestamp, row id)`.
    async fn load_points(
        &self,
        measurement_id: MeasurementId,
        kind: PointKind,
        offset: u64,
        limit: u64,
    ) -> SyncResult<Vec<StoredPoint>>;

    /// Marks every point in `ranges` synced in one atomic step. Returns the number marked.
    async fn mark_synced(&self, measurement_id: MeasurementId, ranges: &[SyncedRange]) -> SyncResult<u64>;

    /// Moves a measurement forward in its lifecycle.
    async fn advance_status(&self, measurement_id: MeasurementId, status: MeasurementStatus) -> SyncResult<()>;

    /// Removes already-synced points of `kind`. Returns the number removed.
    async fn delete_synced_points(&self, measurement_id: MeasurementId, kind: PointKind) -> SyncResult<u64>;
}

#[async_trait]
impl MeasurementStore for Database {
    async fn list_measurements(&self, status: MeasurementStatus) -> SyncResult<Vec<Measurement>> {
        Ok(self.measurements().list_by_status(status).await?)
    }

    async fn count_points(&self, measurement_id: MeasurementId, kind: PointKind) -> SyncResult<u64> {
        Ok(self.points().count_unsynced(measurement_id, kind).await?)
    }

    async fn load_points(
        &self,
        measurement_id: MeasurementId,
        kind: PointKind,
        offset: u64,
        limit: u64,
    ) -> SyncResult<Vec<StoredPoint>> {
        Ok(self.points().load_unsynced(measurement_id, kind, offset, limit).await?)
    }

    async fn mark_synced(&self, measurement_id: MeasurementId, ranges: &[SyncedRange]) -> SyncResult<u64> {
        Ok(self.points().mark_synced(measurement_id, ranges).await?)
    }

    async fn advance_status(&self, measurement_id: MeasurementId, status: MeasurementStatus) -> SyncResult<()> {
        Ok(self.measurements().advance_status(measurement_id, status).await?)
    }

    async fn delete_synced_points(&self, measurement_id: MeasurementId, kind: PointKind) -> SyncResult<u64> {
        Ok(self.points().delete_synced(measurement_id, kind).await?)
    }
}

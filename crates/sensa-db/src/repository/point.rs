//! # Point Repository
//!
//! Per-kind storage of captured samples and their sync flags.
//!
//! ## Sync Marking
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Window → Range → Mark                                │
//! │                                                                         │
//! │  load_unsynced(m, Rotation, 0, 2000)                                   │
//! │       │   ORDER BY timestamp, id  (unsynced rows only)                 │
//! │       ▼                                                                 │
//! │  [ (100,#7) (100,#9) ... (5123,#2011) ]                                │
//! │       │                                                                 │
//! │       │  upload acknowledged                                           │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   SINGLE TRANSACTION                            │   │
//! │  │                                                                 │   │
//! │  │  UPDATE rotations SET is_synced = 1                            │   │
//! │  │  WHERE measurement_fk = m                                      │   │
//! │  │    AND (timestamp, id) BETWEEN (100,#7) AND (5123,#2011)       │   │
//! │  │  ... one UPDATE per kind in the batch                          │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT ← every kind of the batch is marked, or none is                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Marked rows drop out of every later `count_unsynced` / `load_unsynced`,
//! so a point acknowledged once is never loaded for upload again.

use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::debug;

use sensa_core::{
    DataPoint, GeoLocation, MeasurementId, PerKind, Point3D, PointKind, StoredPoint, SyncedRange,
};

use super::{from_sql_int, to_sql_int};
use crate::error::{DbError, DbResult};

// =============================================================================
// Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct LocationRow {
    id: i64,
    timestamp: i64,
    lat: f64,
    lon: f64,
    speed: f64,
    accuracy: f64,
    altitude: Option<f64>,
    vertical_accuracy: Option<f64>,
}

impl From<LocationRow> for StoredPoint {
    fn from(row: LocationRow) -> Self {
        StoredPoint {
            row_id: row.id,
            point: DataPoint::Location(GeoLocation {
                timestamp: row.timestamp,
                lat: row.lat,
                lon: row.lon,
                speed: row.speed,
                accuracy: row.accuracy,
                altitude: row.altitude,
                vertical_accuracy: row.vertical_accuracy,
            }),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SensorRow {
    id: i64,
    timestamp: i64,
    x: f64,
    y: f64,
    z: f64,
}

fn sensor_point(kind: PointKind, row: SensorRow) -> DbResult<StoredPoint> {
    let point = DataPoint::inertial(kind, Point3D::new(row.timestamp, row.x, row.y, row.z))
        .ok_or_else(|| DbError::InvalidInput(format!("{kind} is not a three-axis kind")))?;
    Ok(StoredPoint {
        row_id: row.id,
        point,
    })
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for point rows across all four kind tables.
#[derive(Debug, Clone)]
pub struct PointRepository {
    pool: SqlitePool,
}

impl PointRepository {
    /// Creates a new PointRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PointRepository { pool }
    }

    // -------------------------------------------------------------------------
    // Writes (recorder side)
    // -------------------------------------------------------------------------

    /// Appends GPS fixes to a measurement in one transaction.
    pub async fn insert_locations(
        &self,
        measurement_id: MeasurementId,
        fixes: &[GeoLocation],
    ) -> DbResult<u64> {
        let mid = to_sql_int(measurement_id)?;
        let mut tx = self.pool.begin().await?;

        for fix in fixes {
            sqlx::query(
                r#"
                INSERT INTO locations (
                    measurement_fk, timestamp, lat, lon, speed, accuracy,
                    altitude, vertical_accuracy, is_synced
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0)
                "#,
            )
            .bind(mid)
            .bind(fix.timestamp)
            .bind(fix.lat)
            .bind(fix.lon)
            .bind(fix.speed)
            .bind(fix.accuracy)
            .bind(fix.altitude)
            .bind(fix.vertical_accuracy)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(measurement_id, count = fixes.len(), "Locations inserted");
        Ok(fixes.len() as u64)
    }

    /// Appends three-axis samples of `kind` to a measurement in one transaction.
    ///
    /// ## Errors
    /// [`DbError::InvalidInput`] for [`PointKind::Location`]; use
    /// [`insert_locations`](Self::insert_locations) instead.
    pub async fn insert_sensor_points(
        &self,
        measurement_id: MeasurementId,
        kind: PointKind,
        samples: &[Point3D],
    ) -> DbResult<u64> {
        if !kind.is_inertial() {
            return Err(DbError::InvalidInput(format!(
                "{kind} points must be inserted with insert_locations"
            )));
        }
        let mid = to_sql_int(measurement_id)?;
        let sql = format!(
            "INSERT INTO {} (measurement_fk, timestamp, x, y, z, is_synced) VALUES (?1, ?2, ?3, ?4, ?5, 0)",
            kind.table()
        );
        let mut tx = self.pool.begin().await?;

        for s in samples {
            sqlx::query(&sql)
                .bind(mid)
                .bind(s.timestamp)
                .bind(s.x)
                .bind(s.y)
                .bind(s.z)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!(measurement_id, kind = %kind, count = samples.len(), "Sensor points inserted");
        Ok(samples.len() as u64)
    }

    // -------------------------------------------------------------------------
    // Reads (sync side)
    // -------------------------------------------------------------------------

    /// Number of points of `kind` not yet acknowledged by the collector.
    pub async fn count_unsynced(&self, measurement_id: MeasurementId, kind: PointKind) -> DbResult<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE measurement_fk = ?1 AND is_synced = 0",
            kind.table()
        );
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(to_sql_int(measurement_id)?)
            .fetch_one(&self.pool)
            .await?;
        from_sql_int(count)
    }

    /// Unsynced counts for all four kinds.
    pub async fn count_unsynced_by_kind(&self, measurement_id: MeasurementId) -> DbResult<PerKind<u64>> {
        let mut counts = PerKind::default();
        for kind in PointKind::ALL {
            counts[kind] = self.count_unsynced(measurement_id, kind).await?;
        }
        Ok(counts)
    }

    /// Number of points of `kind`, synced or not.
    pub async fn count_all(&self, measurement_id: MeasurementId, kind: PointKind) -> DbResult<u64> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE measurement_fk = ?1", kind.table());
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(to_sql_int(measurement_id)?)
            .fetch_one(&self.pool)
            .await?;
        from_sql_int(count)
    }

    /// Loads the window `[offset, offset + limit)` of unsynced points of
    /// `kind`, ordered by `(timestamp, id)`.
    pub async fn load_unsynced(
        &self,
        measurement_id: MeasurementId,
        kind: PointKind,
        offset: u64,
        limit: u64,
    ) -> DbResult<Vec<StoredPoint>> {
        let mid = to_sql_int(measurement_id)?;
        let offset = to_sql_int(offset)?;
        let limit = to_sql_int(limit)?;

        match kind {
            PointKind::Location => {
                let rows: Vec<LocationRow> = sqlx::query_as(
                    r#"
                    SELECT id, timestamp, lat, lon, speed, accuracy, altitude, vertical_accuracy
                    FROM locations
                    WHERE measurement_fk = ?1 AND is_synced = 0
                    ORDER BY timestamp ASC, id ASC
                    LIMIT ?2 OFFSET ?3
                    "#,
                )
                .bind(mid)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?;

                Ok(rows.into_iter().map(StoredPoint::from).collect())
            }
            PointKind::Acceleration | PointKind::Rotation | PointKind::Direction => {
                let sql = format!(
                    r#"
                    SELECT id, timestamp, x, y, z
                    FROM {}
                    WHERE measurement_fk = ?1 AND is_synced = 0
                    ORDER BY timestamp ASC, id ASC
                    LIMIT ?2 OFFSET ?3
                    "#,
                    kind.table()
                );
                let rows: Vec<SensorRow> = sqlx::query_as(&sql)
                    .bind(mid)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&self.pool)
                    .await?;

                rows.into_iter().map(|row| sensor_point(kind, row)).collect()
            }
        }
    }

    // -------------------------------------------------------------------------
    // Sync marks
    // -------------------------------------------------------------------------

    /// Flags every unsynced point inside `ranges` as synced, atomically.
    ///
    /// Returns the number of rows flipped. Either all ranges are applied or
    /// none is.
    pub async fn mark_synced(&self, measurement_id: MeasurementId, ranges: &[SyncedRange]) -> DbResult<u64> {
        let mid = to_sql_int(measurement_id)?;
        let mut tx = self.pool.begin().await?;
        let mut marked = 0;

        for range in ranges {
            marked += mark_range(&mut tx, mid, range).await?;
        }

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        debug!(measurement_id, ranges = ranges.len(), marked, "Points marked synced");
        Ok(marked)
    }

    /// Deletes synced points of `kind`. Returns the number of rows removed.
    pub async fn delete_synced(&self, measurement_id: MeasurementId, kind: PointKind) -> DbResult<u64> {
        let sql = format!(
            "DELETE FROM {} WHERE measurement_fk = ?1 AND is_synced = 1",
            kind.table()
        );
        let result = sqlx::query(&sql)
            .bind(to_sql_int(measurement_id)?)
            .execute(&self.pool)
            .await?;

        debug!(measurement_id, kind = %kind, deleted = result.rows_affected(), "Synced points deleted");
        Ok(result.rows_affected())
    }
}

async fn mark_range(tx: &mut Transaction<'_, Sqlite>, measurement_fk: i64, range: &SyncedRange) -> DbResult<u64> {
    let sql = format!(
        r#"
        UPDATE {} SET is_synced = 1
        WHERE measurement_fk = ?1
          AND is_synced = 0
          AND (timestamp > ?2 OR (timestamp = ?2 AND id >= ?3))
          AND (timestamp < ?4 OR (timestamp = ?4 AND id <= ?5))
        "#,
        range.kind.table()
    );
    let result = sqlx::query(&sql)
        .bind(measurement_fk)
        .bind(range.first.timestamp)
        .bind(range.first.row_id)
        .bind(range.last.timestamp)
        .bind(range.last.row_id)
        .execute(&mut **tx)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    async fn setup() -> (Database, MeasurementId) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let m = db.measurements().create("CAR").await.unwrap();
        (db, m.id)
    }

    fn fix(timestamp: i64) -> GeoLocation {
        GeoLocation {
            timestamp,
            lat: 51.0,
            lon: 13.7,
            speed: 3.0,
            accuracy: 5.0,
            altitude: Some(120.0),
            vertical_accuracy: None,
        }
    }

    #[tokio::test]
    async fn test_insert_and_count() {
        let (db, mid) = setup().await;
        let points = db.points();

        points.insert_locations(mid, &[fix(1), fix(2)]).await.unwrap();
        points
            .insert_sensor_points(mid, PointKind::Acceleration, &[Point3D::new(1, 0.0, 0.0, 9.8)])
            .await
            .unwrap();

        let counts = points.count_unsynced_by_kind(mid).await.unwrap();
        assert_eq!(counts.into_inner(), [2, 1, 0, 0]);
        assert_eq!(points.count_all(mid, PointKind::Location).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_insert_rejects_location_as_sensor() {
        let (db, mid) = setup().await;
        let err = db
            .points()
            .insert_sensor_points(mid, PointKind::Location, &[Point3D::new(1, 0.0, 0.0, 0.0)])
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_insert_for_unknown_measurement_fails() {
        let (db, _) = setup().await;
        let err = db.points().insert_locations(777, &[fix(1)]).await.unwrap_err();
        assert!(matches!(err, DbError::ForeignKeyViolation { .. }));
    }

    #[tokio::test]
    async fn test_load_orders_by_timestamp_then_row_id() {
        let (db, mid) = setup().await;
        let points = db.points();

        points.insert_locations(mid, &[fix(30), fix(10), fix(10), fix(20)]).await.unwrap();

        let loaded = points.load_unsynced(mid, PointKind::Location, 0, 10).await.unwrap();
        let keys: Vec<_> = loaded.iter().map(|p| (p.point.timestamp(), p.row_id)).collect();
        assert_eq!(keys, vec![(10, 2), (10, 3), (20, 4), (30, 1)]);

        let DataPoint::Location(l) = loaded[0].point else {
            panic!("expected a location");
        };
        assert_eq!(l.altitude, Some(120.0));

        let window = points.load_unsynced(mid, PointKind::Location, 1, 2).await.unwrap();
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].row_id, 3);
    }

    #[tokio::test]
    async fn test_mark_synced_respects_tie_break() {
        let (db, mid) = setup().await;
        let points = db.points();
        let samples = [
            Point3D::new(100, 0.1, 0.1, 0.1),
            Point3D::new(100, 0.2, 0.2, 0.2),
            Point3D::new(100, 0.3, 0.3, 0.3),
            Point3D::new(200, 0.4, 0.4, 0.4),
        ];
        points.insert_sensor_points(mid, PointKind::Rotation, &samples).await.unwrap();

        // First window ends in the middle of the timestamp-100 run.
        let first = points.load_unsynced(mid, PointKind::Rotation, 0, 2).await.unwrap();
        let range = SyncedRange::covering(PointKind::Rotation, &first).unwrap();
        let marked = points.mark_synced(mid, &[range]).await.unwrap();

        assert_eq!(marked, 2);
        assert_eq!(points.count_unsynced(mid, PointKind::Rotation).await.unwrap(), 2);

        let rest = points.load_unsynced(mid, PointKind::Rotation, 0, 10).await.unwrap();
        assert_eq!(rest.iter().map(|p| p.row_id).collect::<Vec<_>>(), vec![3, 4]);
    }

    #[tokio::test]
    async fn test_mark_synced_is_scoped_to_measurement() {
        let (db, mid) = setup().await;
        let other = db.measurements().create("BUS").await.unwrap().id;
        let points = db.points();

        points.insert_locations(mid, &[fix(5)]).await.unwrap();
        points.insert_locations(other, &[fix(5)]).await.unwrap();

        let loaded = points.load_unsynced(mid, PointKind::Location, 0, 10).await.unwrap();
        let range = SyncedRange::covering(PointKind::Location, &loaded).unwrap();
        points.mark_synced(mid, &[range]).await.unwrap();

        assert_eq!(points.count_unsynced(mid, PointKind::Location).await.unwrap(), 0);
        assert_eq!(points.count_unsynced(other, PointKind::Location).await.unwrap(), 1);

        // Marking twice is a no-op.
        assert_eq!(points.mark_synced(mid, &[range]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_synced_keeps_unsynced() {
        let (db, mid) = setup().await;
        let points = db.points();
        let samples = [Point3D::new(1, 0.0, 0.0, 0.0), Point3D::new(2, 0.0, 0.0, 0.0)];
        points.insert_sensor_points(mid, PointKind::Direction, &samples).await.unwrap();

        let first = points.load_unsynced(mid, PointKind::Direction, 0, 1).await.unwrap();
        let range = SyncedRange::covering(PointKind::Direction, &first).unwrap();
        points.mark_synced(mid, &[range]).await.unwrap();

        assert_eq!(points.delete_synced(mid, PointKind::Direction).await.unwrap(), 1);
        assert_eq!(points.count_all(mid, PointKind::Direction).await.unwrap(), 1);
        assert_eq!(points.count_unsynced(mid, PointKind::Direction).await.unwrap(), 1);
    }
}

//! # Measurement Repository
//!
//! Creation, lookup and lifecycle transitions of measurements.
//!
//! Status moves strictly forward (`OPEN → FINISHED → SYNCED`). The update
//! statement itself refuses backwards moves, so two writers racing on the
//! same row can never revert a `SYNCED` measurement.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};

use sensa_core::{CoreError, Measurement, MeasurementId, MeasurementStatus};

use super::{from_sql_int, to_sql_int};
use crate::error::{DbError, DbResult};

#[derive(Debug, sqlx::FromRow)]
struct MeasurementRow {
    id: i64,
    vehicle: String,
    status: String,
}

impl TryFrom<MeasurementRow> for Measurement {
    type Error = DbError;

    fn try_from(row: MeasurementRow) -> DbResult<Self> {
        Ok(Measurement {
            id: from_sql_int(row.id)?,
            vehicle: row.vehicle,
            status: row.status.parse()?,
        })
    }
}

/// Repository for measurement rows.
#[derive(Debug, Clone)]
pub struct MeasurementRepository {
    pool: SqlitePool,
}

impl MeasurementRepository {
    /// Creates a new MeasurementRepository.
    pub fn new(pool: SqlitePool) -> Self {
        MeasurementRepository { pool }
    }

    /// Starts a new measurement in `OPEN` state.
    pub async fn create(&self, vehicle: &str) -> DbResult<Measurement> {
        let now = Utc::now();

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO measurements (status, vehicle, created_at)
            VALUES (?1, ?2, ?3)
            RETURNING id
            "#,
        )
        .bind(MeasurementStatus::Open.as_str())
        .bind(vehicle)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        debug!(measurement_id = id, vehicle = %vehicle, "Measurement created");

        Ok(Measurement {
            id: from_sql_int(id)?,
            vehicle: vehicle.to_string(),
            status: MeasurementStatus::Open,
        })
    }

    /// Gets a measurement by id.
    pub async fn get(&self, id: MeasurementId) -> DbResult<Measurement> {
        let row: Option<MeasurementRow> =
            sqlx::query_as("SELECT id, vehicle, status FROM measurements WHERE id = ?1")
                .bind(to_sql_int(id)?)
                .fetch_optional(&self.pool)
                .await?;

        row.ok_or_else(|| DbError::not_found("Measurement", id))?
            .try_into()
    }

    /// Lists measurements in the given status, oldest (lowest id) first.
    pub async fn list_by_status(&self, status: MeasurementStatus) -> DbResult<Vec<Measurement>> {
        let rows: Vec<MeasurementRow> = sqlx::query_as(
            r#"
            SELECT id, vehicle, status
            FROM measurements
            WHERE status = ?1
            ORDER BY id ASC
            "#,
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Measurement::try_from).collect()
    }

    /// Moves a measurement forward to `status`.
    ///
    /// ## Errors
    /// - [`DbError::NotFound`] if the measurement doesn't exist
    /// - [`DbError::Domain`] with [`CoreError::InvalidStatusTransition`] if
    ///   `status` is not the next one in the lifecycle
    pub async fn advance_status(&self, id: MeasurementId, status: MeasurementStatus) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE measurements SET status = ?1
            WHERE id = ?2
              AND (CASE status WHEN 'OPEN' THEN 0 WHEN 'FINISHED' THEN 1 ELSE 2 END) = ?3 - 1
            "#,
        )
        .bind(status.as_str())
        .bind(to_sql_int(id)?)
        .bind(i64::from(status.rank()))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let current = self.get(id).await?;
            return Err(CoreError::InvalidStatusTransition {
                from: current.status,
                to: status,
            }
            .into());
        }

        info!(measurement_id = id, status = %status, "Measurement status advanced");
        Ok(())
    }

    /// Marks recording as complete, making the measurement eligible for upload.
    pub async fn finish(&self, id: MeasurementId) -> DbResult<()> {
        self.advance_status(id, MeasurementStatus::Finished).await
    }

    /// Total number of measurements.
    pub async fn count(&self) -> DbResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM measurements")
            .fetch_one(&self.pool)
            .await?;
        from_sql_int(count)
    }
}

#[cfg(test)]
mod tests {
    use crate::{Database, DbConfig, DbError};
    use sensa_core::{CoreError, MeasurementStatus};

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let db = db().await;
        let repo = db.measurements();

        let first = repo.create("CAR").await.unwrap();
        let second = repo.create("BICYCLE").await.unwrap();

        assert!(second.id > first.id);
        assert_eq!(first.status, MeasurementStatus::Open);

        let fetched = repo.get(second.id).await.unwrap();
        assert_eq!(fetched, second);

        assert!(matches!(repo.get(999).await, Err(DbError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_list_by_status_ordered_by_id() {
        let db = db().await;
        let repo = db.measurements();

        let a = repo.create("CAR").await.unwrap();
        let b = repo.create("CAR").await.unwrap();
        let c = repo.create("CAR").await.unwrap();
        repo.finish(c.id).await.unwrap();
        repo.finish(a.id).await.unwrap();

        let finished = repo.list_by_status(MeasurementStatus::Finished).await.unwrap();
        let ids: Vec<_> = finished.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![a.id, c.id]);

        let open = repo.list_by_status(MeasurementStatus::Open).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, b.id);
    }

    #[tokio::test]
    async fn test_status_never_moves_backwards() {
        let db = db().await;
        let repo = db.measurements();
        let m = repo.create("WALKING").await.unwrap();

        repo.finish(m.id).await.unwrap();
        repo.advance_status(m.id, MeasurementStatus::Synced).await.unwrap();

        let err = repo.finish(m.id).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::InvalidStatusTransition {
                from: MeasurementStatus::Synced,
                to: MeasurementStatus::Finished,
            })
        ));
        assert_eq!(repo.get(m.id).await.unwrap().status, MeasurementStatus::Synced);

        let skipped = repo.create("CAR").await.unwrap();
        let err = repo
            .advance_status(skipped.id, MeasurementStatus::Synced)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::InvalidStatusTransition {
                from: MeasurementStatus::Open,
                to: MeasurementStatus::Synced,
            })
        ));
        assert_eq!(repo.get(skipped.id).await.unwrap().status, MeasurementStatus::Open);

        assert!(matches!(
            repo.advance_status(4242, MeasurementStatus::Synced).await,
            Err(DbError::NotFound { .. })
        ));
    }
}

//! Workers and their metrics rows.

use crate::error::{Error, Result};
use crate::model::worker::validate_stress;
use crate::model::*;

impl super::Db {
    pub async fn create_worker(&self, new: NewWorker) -> Result<Worker> {
        let row: WorkerRow = sqlx::query_as(
            "INSERT INTO workers (name, email, role) VALUES ($1, $2, $3)
             RETURNING id, name, email, role",
        )
        .bind(&new.name)
        .bind(&new.email)
        .bind(new.role.to_string())
        .fetch_one(self.pool())
        .await?;
        row.try_into_worker()
    }

    pub async fn get_worker(&self, id: WorkerId) -> Result<Worker> {
        let row: Option<WorkerRow> =
            sqlx::query_as("SELECT id, name, email, role FROM workers WHERE id = $1")
                .bind(id.0)
                .fetch_optional(self.pool())
                .await?;
        row.ok_or_else(|| Error::NotFound(format!("worker {id}")))?
            .try_into_worker()
    }

    /// Every worker, with metrics where a row exists.
    pub async fn list_workers(&self) -> Result<Vec<(Worker, Option<WorkerMetrics>)>> {
        let rows: Vec<WorkerWithMetricsRow> = sqlx::query_as(
            "SELECT w.id, w.name, w.email, w.role,
                    m.open_item_count, m.avg_resolution_time_hours, m.current_stress_score
             FROM workers w
             LEFT JOIN worker_metrics m ON m.worker_id = w.id
             ORDER BY w.name, w.id",
        )
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(WorkerWithMetricsRow::try_into_parts)
            .collect()
    }

    /// Create or replace a worker's metrics row.
    pub async fn upsert_metrics(&self, id: WorkerId, metrics: WorkerMetrics) -> Result<()> {
        metrics.validate()?;
        let open = i32::try_from(metrics.open_item_count)
            .map_err(|_| Error::InvalidInput("open_item_count too large".into()))?;

        sqlx::query(
            "INSERT INTO worker_metrics (worker_id, open_item_count, avg_resolution_time_hours, current_stress_score)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (worker_id) DO UPDATE
             SET open_item_count = EXCLUDED.open_item_count,
                 avg_resolution_time_hours = EXCLUDED.avg_resolution_time_hours,
                 current_stress_score = EXCLUDED.current_stress_score,
                 updated_at = now()",
        )
        .bind(id.0)
        .bind(open)
        .bind(metrics.avg_resolution_time_hours)
        .bind(metrics.current_stress_score)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Overwrite the ground-truth stress score.
    pub async fn update_stress_score(&self, id: WorkerId, score: f64) -> Result<()> {
        validate_stress(score)?;
        let rows_affected = sqlx::query(
            "UPDATE worker_metrics SET current_stress_score = $1, updated_at = now() WHERE worker_id = $2",
        )
        .bind(score)
        .bind(id.0)
        .execute(self.pool())
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(Error::NotFound(format!("metrics for worker {id}")));
        }
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct WorkerRow {
    id: i64,
    name: String,
    email: String,
    role: String,
}

impl WorkerRow {
    pub(crate) fn try_into_worker(self) -> Result<Worker> {
        Ok(Worker {
            id: WorkerId(self.id),
            name: self.name,
            email: self.email,
            role: self.role.parse()?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct WorkerWithMetricsRow {
    id: i64,
    name: String,
    email: String,
    role: String,
    open_item_count: Option<i32>,
    avg_resolution_time_hours: Option<f64>,
    current_stress_score: Option<f64>,
}

impl WorkerWithMetricsRow {
    pub(crate) fn try_into_parts(self) -> Result<(Worker, Option<WorkerMetrics>)> {
        let metrics = match (
            self.open_item_count,
            self.avg_resolution_time_hours,
            self.current_stress_score,
        ) {
            (Some(open), Some(avg), Some(stress)) => {
                Some(WorkerMetrics::new(super::to_count(open)?, avg, stress))
            }
            _ => None,
        };
        let worker = WorkerRow {
            id: self.id,
            name: self.name,
            email: self.email,
            role: self.role,
        }
        .try_into_worker()?;
        Ok((worker, metrics))
    }

    /// Like `try_into_parts`, but a missing metrics row means "not a
    /// candidate".
    pub(crate) fn try_into_candidate(self) -> Result<Option<Candidate>> {
        let (worker, metrics) = self.try_into_parts()?;
        Ok(metrics.map(|metrics| Candidate { worker, metrics }))
    }
}

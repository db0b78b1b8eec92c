//! `MetricsStore` over Postgres.
//!
//! The assignment unit runs inside one sqlx transaction. The open-count bump
//! is a single `UPDATE ... SET n = n + 1`, which takes the row lock, so two
//! commits for the same worker cannot lose an update.

use super::Db;
use super::assignment::AssignmentRow;
use super::worker::WorkerWithMetricsRow;
use crate::error::{Error, Result};
use crate::model::*;
use crate::store::{AssignmentTx, MetricsStore};
use chrono::{DateTime, Utc};
use sqlx::{Postgres, Transaction};

const CANDIDATE_QUERY: &str = "SELECT w.id, w.name, w.email, w.role,
        m.open_item_count, m.avg_resolution_time_hours, m.current_stress_score
 FROM workers w
 JOIN worker_metrics m ON m.worker_id = w.id";

impl MetricsStore for Db {
    type Tx = PgAssignmentTx;

    async fn list_candidates(&self, role: Role) -> Result<Vec<Candidate>> {
        let rows: Vec<WorkerWithMetricsRow> =
            sqlx::query_as(&format!("{CANDIDATE_QUERY} WHERE w.role = $1 ORDER BY w.id"))
                .bind(role.to_string())
                .fetch_all(self.pool())
                .await?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(candidate) = row.try_into_candidate()? {
                candidates.push(candidate);
            }
        }
        Ok(candidates)
    }

    async fn get_metrics(&self, worker: WorkerId) -> Result<Option<Candidate>> {
        let row: Option<WorkerWithMetricsRow> =
            sqlx::query_as(&format!("{CANDIDATE_QUERY} WHERE w.id = $1"))
                .bind(worker.0)
                .fetch_optional(self.pool())
                .await?;

        match row {
            Some(row) => row.try_into_candidate(),
            None => Ok(None),
        }
    }

    async fn begin(&self) -> Result<PgAssignmentTx> {
        Ok(PgAssignmentTx {
            tx: self.pool().begin().await?,
        })
    }
}

/// An open Postgres transaction. Rolled back on drop unless committed.
pub struct PgAssignmentTx {
    tx: Transaction<'static, Postgres>,
}

impl AssignmentTx for PgAssignmentTx {
    async fn append_assignment(
        &mut self,
        item: WorkItemId,
        assignee: WorkerId,
        assigner: WorkerId,
        at: DateTime<Utc>,
    ) -> Result<AssignmentRecord> {
        let row: AssignmentRow = sqlx::query_as(
            "INSERT INTO assignments (work_item_id, assignee_id, assigner_id, assigned_at)
             VALUES ($1, $2, $3, $4)
             RETURNING id, work_item_id, assignee_id, assigner_id, assigned_at",
        )
        .bind(item.0)
        .bind(assignee.0)
        .bind(assigner.0)
        .bind(at)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row.into())
    }

    async fn start_work_item(&mut self, item: WorkItemId, assignee: WorkerId) -> Result<Status> {
        let previous: Option<(String,)> =
            sqlx::query_as("SELECT status FROM work_items WHERE id = $1 FOR UPDATE")
                .bind(item.0)
                .fetch_optional(&mut *self.tx)
                .await?;
        let previous = previous.ok_or_else(|| Error::NotFound(format!("work item {item}")))?;

        sqlx::query(
            "UPDATE work_items SET status = $1, assignee_id = $2, updated_at = now() WHERE id = $3",
        )
        .bind(Status::InProgress.to_string())
        .bind(assignee.0)
        .bind(item.0)
        .execute(&mut *self.tx)
        .await?;

        previous.0.parse()
    }

    async fn increment_open_items(&mut self, worker: WorkerId) -> Result<u32> {
        let row: Option<(i32,)> = sqlx::query_as(
            "UPDATE worker_metrics SET open_item_count = open_item_count + 1, updated_at = now()
             WHERE worker_id = $1
             RETURNING open_item_count",
        )
        .bind(worker.0)
        .fetch_optional(&mut *self.tx)
        .await?;

        let (n,) = row.ok_or_else(|| Error::NotFound(format!("metrics for worker {worker}")))?;
        super::to_count(n)
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

//! Work item operations: report, look up, list, close.
//!
//! Assignment itself goes through the engine; see `db::store`.

use crate::error::{Error, Result};
use crate::model::*;
use crate::telemetry::metrics;
use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;

const WORK_ITEM_COLUMNS: &str = "id, title, description, severity, status, assignee_id, reporter_id, created_at, updated_at, closed_at";

impl super::Db {
    /// Report a new work item. It starts `OPEN` and unassigned.
    pub async fn create_work_item(&self, new: NewWorkItem) -> Result<WorkItem> {
        let row: WorkItemRow = sqlx::query_as(&format!(
            "INSERT INTO work_items (title, description, severity, status, reporter_id)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {WORK_ITEM_COLUMNS}"
        ))
        .bind(&new.title)
        .bind(&new.description)
        .bind(new.severity.to_string())
        .bind(Status::Open.to_string())
        .bind(new.reporter.map(|r| r.0))
        .fetch_one(self.pool())
        .await?;
        row.try_into_work_item()
    }

    pub async fn get_work_item(&self, id: WorkItemId) -> Result<WorkItem> {
        let row: Option<WorkItemRow> = sqlx::query_as(&format!(
            "SELECT {WORK_ITEM_COLUMNS} FROM work_items WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(self.pool())
        .await?;

        row.ok_or_else(|| Error::NotFound(format!("work item {id}")))?
            .try_into_work_item()
    }

    /// Newest first, optionally filtered by status.
    pub async fn list_work_items(
        &self,
        status: Option<Status>,
        limit: i64,
    ) -> Result<Vec<WorkItem>> {
        let rows: Vec<WorkItemRow> = sqlx::query_as(&format!(
            "SELECT {WORK_ITEM_COLUMNS} FROM work_items
             WHERE ($1::text IS NULL OR status = $1)
             ORDER BY created_at DESC, id DESC
             LIMIT $2"
        ))
        .bind(status.map(|s| s.to_string()))
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(WorkItemRow::try_into_work_item)
            .collect()
    }

    /// Close a work item and release the open slot held by each of its
    /// assignment records, atomically.
    pub async fn close_work_item(&self, id: WorkItemId) -> Result<WorkItem> {
        let mut tx = self.pool().begin().await?;

        let current: Option<(String,)> =
            sqlx::query_as("SELECT status FROM work_items WHERE id = $1 FOR UPDATE")
                .bind(id.0)
                .fetch_optional(&mut *tx)
                .await?;
        let (status,) = current.ok_or_else(|| Error::NotFound(format!("work item {id}")))?;
        let from: Status = status.parse()?;
        if !from.can_transition_to(Status::Closed) {
            return Err(Error::InvalidTransition {
                from: from.to_string(),
                to: Status::Closed.to_string(),
            });
        }

        let row: WorkItemRow = sqlx::query_as(&format!(
            "UPDATE work_items SET status = $1, updated_at = now(), closed_at = now()
             WHERE id = $2
             RETURNING {WORK_ITEM_COLUMNS}"
        ))
        .bind(Status::Closed.to_string())
        .bind(id.0)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE worker_metrics m
             SET open_item_count = GREATEST(m.open_item_count - held.n, 0), updated_at = now()
             FROM (SELECT assignee_id, COUNT(*)::int AS n
                   FROM assignments WHERE work_item_id = $1
                   GROUP BY assignee_id) held
             WHERE m.worker_id = held.assignee_id",
        )
        .bind(id.0)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        metrics::work_item_transitions().add(
            1,
            &[
                KeyValue::new("from", from.to_string()),
                KeyValue::new("to", Status::Closed.to_string()),
            ],
        );

        row.try_into_work_item()
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct WorkItemRow {
    id: i64,
    title: String,
    description: String,
    severity: String,
    status: String,
    assignee_id: Option<i64>,
    reporter_id: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
}

impl WorkItemRow {
    fn try_into_work_item(self) -> Result<WorkItem> {
        Ok(WorkItem {
            id: WorkItemId(self.id),
            title: self.title,
            description: self.description,
            severity: self.severity.parse()?,
            status: self.status.parse()?,
            assignee: self.assignee_id.map(WorkerId),
            reporter: self.reporter_id.map(WorkerId),
            created_at: self.created_at,
            updated_at: self.updated_at,
            closed_at: self.closed_at,
        })
    }
}

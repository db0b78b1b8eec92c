//! Assignment history (read side).

use crate::error::Result;
use crate::model::{AssignmentRecord, WorkItemId, WorkerId};
use chrono::{DateTime, Utc};

impl super::Db {
    /// Assignment records, newest first, optionally for one item.
    pub async fn list_assignments(
        &self,
        item: Option<WorkItemId>,
        limit: i64,
    ) -> Result<Vec<AssignmentRecord>> {
        let rows: Vec<AssignmentRow> = sqlx::query_as(
            "SELECT id, work_item_id, assignee_id, assigner_id, assigned_at
             FROM assignments
             WHERE ($1::bigint IS NULL OR work_item_id = $1)
             ORDER BY assigned_at DESC, id DESC
             LIMIT $2",
        )
        .bind(item.map(|i| i.0))
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(AssignmentRecord::from).collect())
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct AssignmentRow {
    id: i64,
    work_item_id: i64,
    assignee_id: i64,
    assigner_id: i64,
    assigned_at: DateTime<Utc>,
}

impl From<AssignmentRow> for AssignmentRecord {
    fn from(row: AssignmentRow) -> Self {
        Self {
            id: row.id,
            work_item: WorkItemId(row.work_item_id),
            assignee: WorkerId(row.assignee_id),
            assigner: WorkerId(row.assigner_id),
            assigned_at: row.assigned_at,
        }
    }
}

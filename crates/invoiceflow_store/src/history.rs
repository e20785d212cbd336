//! Append-only export history.
//!
//! One row per handler invocation, written by the coordinator right after
//! the handler returns. Rows are never updated or deleted from here; late
//! rows written after a job was force-failed stand for reconciliation.

use chrono::Utc;

use crate::models::{ExportHistory, ExportKind, ExportStatus};
use crate::{Store, StoreResult};

#[derive(Debug, Clone)]
pub struct NewExportHistory {
    pub job_id: i64,
    pub export_id: Option<i64>,
    pub export_type: ExportKind,
    pub status: ExportStatus,
    pub external_reference: Option<String>,
    pub error_message: Option<String>,
    /// Render context JSON, kept so the attempt can be inspected without
    /// joining to volatile provider data.
    pub context: Option<String>,
}

impl Store {
    pub async fn insert_export_history(&self, row: NewExportHistory) -> StoreResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO export_history
                (job_id, export_id, export_type, status, exported_at,
                 external_reference, error_message, context)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(row.job_id)
        .bind(row.export_id)
        .bind(row.export_type)
        .bind(row.status)
        .bind(Utc::now())
        .bind(row.external_reference)
        .bind(row.error_message)
        .bind(row.context)
        .execute(self.pool())
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn export_history_for_job(&self, job_id: i64) -> StoreResult<Vec<ExportHistory>> {
        let rows = sqlx::query_as(
            "SELECT * FROM export_history WHERE job_id = ? ORDER BY id ASC",
        )
        .bind(job_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }
}

//! Job rows and their CAS-guarded state machine.
//!
//! Every transition is an `UPDATE ... WHERE status = <expected>`; callers
//! learn from `rows_affected` whether they won the transition. The claim
//! (`pending -> running`) is the coordinator's commit point and writes
//! `started_at` in the same statement.

use chrono::{NaiveDate, Utc};
use tracing::info;

use crate::models::{Job, JobStatus};
use crate::{Store, StoreResult};

#[derive(Debug, Clone, Default)]
pub struct NewJob {
    pub automation_id: i64,
    pub from_date: Option<NaiveDate>,
    pub max_results: Option<u32>,
}

impl Store {
    /// Insert a job row in `pending`. The trigger path pairs this with a
    /// `job.started` publication.
    pub async fn insert_job(&self, job: NewJob) -> StoreResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO jobs (automation_id, status, from_date, max_results, created_at)
            VALUES (?, 'pending', ?, ?, ?)
            "#,
        )
        .bind(job.automation_id)
        .bind(job.from_date)
        .bind(job.max_results)
        .bind(Utc::now())
        .execute(self.pool())
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn job(&self, job_id: i64) -> StoreResult<Option<Job>> {
        let job = sqlx::query_as("SELECT * FROM jobs WHERE id = ?")
            .bind(job_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(job)
    }

    pub async fn job_status(&self, job_id: i64) -> StoreResult<Option<JobStatus>> {
        let status = sqlx::query_scalar("SELECT status FROM jobs WHERE id = ?")
            .bind(job_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(status)
    }

    /// Atomically claim a pending job. The first coordinator to move
    /// `pending -> running` wins; everyone else sees `false`.
    pub async fn claim_job(&self, job_id: i64) -> StoreResult<bool> {
        let rows = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'running', started_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(Utc::now())
        .bind(job_id)
        .execute(self.pool())
        .await?
        .rows_affected();

        if rows > 0 {
            info!(job_id, "claimed job");
        }
        Ok(rows > 0)
    }

    /// `running -> completed`, recording stats. Returns `false` if the job
    /// was finalized elsewhere (timeout, cancel) in the meantime.
    pub async fn complete_job(&self, job_id: i64, stats_json: &str) -> StoreResult<bool> {
        let rows = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'completed', completed_at = ?, stats = ?
            WHERE id = ? AND status = 'running'
            "#,
        )
        .bind(Utc::now())
        .bind(stats_json)
        .bind(job_id)
        .execute(self.pool())
        .await?
        .rows_affected();
        Ok(rows > 0)
    }

    /// `running -> failed` with an error message.
    pub async fn fail_job(&self, job_id: i64, error_message: &str) -> StoreResult<bool> {
        let rows = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'failed', completed_at = ?, error_message = ?
            WHERE id = ? AND status = 'running'
            "#,
        )
        .bind(Utc::now())
        .bind(error_message)
        .bind(job_id)
        .execute(self.pool())
        .await?
        .rows_affected();
        Ok(rows > 0)
    }

    /// Admin-surface cancellation: only pending or running jobs move to
    /// `cancelled`. Terminal jobs are left alone.
    pub async fn cancel_job(&self, job_id: i64) -> StoreResult<bool> {
        let rows = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'cancelled', completed_at = ?
            WHERE id = ? AND status IN ('pending', 'running')
            "#,
        )
        .bind(Utc::now())
        .bind(job_id)
        .execute(self.pool())
        .await?
        .rows_affected();
        Ok(rows > 0)
    }

    /// Jobs for one automation, newest first.
    pub async fn jobs_for_automation(&self, automation_id: i64) -> StoreResult<Vec<Job>> {
        let jobs = sqlx::query_as(
            "SELECT * FROM jobs WHERE automation_id = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(automation_id)
        .fetch_all(self.pool())
        .await?;
        Ok(jobs)
    }
}

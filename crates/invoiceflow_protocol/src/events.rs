//! Job lifecycle events carried over the message bus.
//!
//! All payloads are JSON, UTF-8 encoded. The `jobs` stream retains
//! `job.started`, `job.completed` and `job.failed`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Published by the trigger path right after a pending job row is inserted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStartedEvent {
    pub job_id: i64,
    pub automation_id: i64,
    pub user_id: i64,
    pub started_at: DateTime<Utc>,
    /// Extraction cutoff, `YYYY-MM-DD`.
    #[serde(default)]
    pub from_date: Option<String>,
    #[serde(default)]
    pub max_results: Option<u32>,
}

/// Published by the coordinator on the `running -> completed` transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCompletedEvent {
    pub job_id: i64,
    pub automation_id: i64,
    pub user_id: i64,
    pub completed_at: DateTime<Utc>,
    pub stats: JobStats,
}

/// Published by the coordinator on any failing terminal transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobFailedEvent {
    pub job_id: i64,
    pub automation_id: i64,
    pub user_id: i64,
    pub failed_at: DateTime<Utc>,
    pub error_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<serde_json::Value>,
}

/// Counters compiled over one job run.
///
/// `exports_completed` counts successes and duplicate skips alike; a
/// duplicate means the sink already holds the entry, which is the outcome
/// the export was after.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStats {
    pub sources_executed: u32,
    pub sources_failed: u32,
    pub invoices_extracted: u32,
    pub exports_completed: u32,
    pub exports_failed: u32,
    /// Invoices dropped because no mapping routed them to an export.
    #[serde(default)]
    pub invoices_unmapped: u32,
    pub duration_seconds: u64,
}

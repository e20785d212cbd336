//! Job-level error kinds.
//!
//! The Display strings of the terminal variants are recorded verbatim in
//! `jobs.error_message` and in `job.failed` payloads, so they stay short
//! and stable.

use thiserror::Error;

use invoiceflow_store::StoreError;

#[derive(Debug, Error)]
pub enum JobError {
    /// Automation missing or owned by another tenant.
    #[error("AutomationNotFound")]
    AutomationNotFound,

    /// No active source, no active export, or no mapping between them.
    #[error("EmptyPipeline")]
    EmptyPipeline,

    /// Every source execution failed.
    #[error("AllSourcesFailed")]
    AllSourcesFailed,

    /// The per-job deadline elapsed before the pipeline finished.
    #[error("Timeout")]
    Timeout,

    /// External cancellation observed at a safe point.
    #[error("Cancelled")]
    Cancelled,

    /// `job.started` carried a from_date no accepted format matches.
    #[error("invalid from_date '{0}'")]
    InvalidFromDate(String),

    #[error("{0}")]
    Store(#[from] StoreError),

    /// Bug-level condition inside the coordinator.
    #[error("{0}")]
    Fatal(String),
}

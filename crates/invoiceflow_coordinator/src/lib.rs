//! Job coordinator for invoiceflow.
//!
//! Consumes `job.started` from the durable `jobs` consumer and drives each
//! job through extract -> route -> export to a terminal state, with
//! exactly-once delivery against idempotent sinks and one terminal event
//! per job. Multiple instances may run side by side; exclusivity per job
//! comes from the store's `pending -> running` CAS.

pub mod coordinator;
pub mod error;

pub use coordinator::{Coordinator, CoordinatorConfig};
pub use error::JobError;

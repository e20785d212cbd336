//! Deployment defaults shared by the coordinator and its collaborators.

use std::time::Duration;

/// JetStream stream holding all job lifecycle subjects.
pub const JOBS_STREAM: &str = "jobs";

/// Durable consumer name used by coordinator instances. Sharing the name
/// load-balances deliveries across instances (single handler per message).
pub const COORDINATOR_CONSUMER: &str = "job_coordinator";

pub const JOB_STARTED_SUBJECT: &str = "job.started";
pub const JOB_COMPLETED_SUBJECT: &str = "job.completed";
pub const JOB_FAILED_SUBJECT: &str = "job.failed";

/// Subjects retained by the jobs stream.
pub const JOBS_SUBJECTS: [&str; 3] = [
    JOB_STARTED_SUBJECT,
    JOB_COMPLETED_SUBJECT,
    JOB_FAILED_SUBJECT,
];

/// Age bound for the jobs stream (limits retention, not delivery-bounded).
pub const JOBS_STREAM_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Per-job deadline. A job still non-terminal past this is forced to failed.
pub const JOB_DEADLINE: Duration = Duration::from_secs(30 * 60);

/// Redelivery bound for the durable consumer.
pub const MAX_DELIVER: i64 = 5;

/// Concurrent source executions per job.
pub const SOURCE_FANOUT: usize = 8;

pub const DEFAULT_NATS_SERVERS: &str = "nats://127.0.0.1:4222";
pub const DEFAULT_DATABASE_URL: &str = "sqlite:invoiceflow.db";

//! Row models, mapped with sqlx `FromRow` derives.
//!
//! JSON-shaped columns (`extraction_params`, `configuration`, `conditions`,
//! `stats`, `context`, `details`) are carried as raw TEXT and parsed at the
//! use site; unknown fields inside them survive round-trips untouched.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ExportStatus {
    Success,
    Failed,
    DuplicateSkipped,
}

impl ExportStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::DuplicateSkipped => "duplicate_skipped",
        }
    }
}

impl std::fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Portal,
    MobilePortal,
    Mailbox,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Portal => "portal",
            Self::MobilePortal => "mobile_portal",
            Self::Mailbox => "mailbox",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ExportKind {
    Filesystem,
    CloudDrive,
    Accounting,
}

impl ExportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Filesystem => "filesystem",
            Self::CloudDrive => "cloud_drive",
            Self::Accounting => "accounting",
        }
    }
}

impl std::fmt::Display for ExportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub hashed_password: String,
    pub language: String,
    pub timezone: String,
    pub role: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Automation {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub schedule: Option<String>,
    pub from_date_rule: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Source {
    pub id: i64,
    pub automation_id: i64,
    pub name: String,
    #[sqlx(rename = "type")]
    pub kind: SourceKind,
    pub email_sender_from: Option<String>,
    pub email_subject_contains: Option<String>,
    /// Free-form JSON; never introspected by the core.
    pub extraction_params: Option<String>,
    pub max_results: i64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Export {
    pub id: i64,
    pub automation_id: i64,
    pub name: String,
    #[sqlx(rename = "type")]
    pub kind: ExportKind,
    /// Type-tagged JSON, shape per kind.
    pub configuration: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct SourceExportMapping {
    pub id: i64,
    pub source_id: i64,
    pub export_id: i64,
    pub priority: i64,
    pub conditions: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Job {
    pub id: i64,
    pub automation_id: i64,
    pub status: JobStatus,
    pub from_date: Option<NaiveDate>,
    pub max_results: Option<i64>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub stats: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ExportHistory {
    pub id: i64,
    pub job_id: i64,
    /// Nullable: SET NULL when the export definition is deleted.
    pub export_id: Option<i64>,
    pub export_type: ExportKind,
    pub status: ExportStatus,
    pub exported_at: DateTime<Utc>,
    pub external_reference: Option<String>,
    pub error_message: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct AuditLog {
    pub id: i64,
    pub user_id: Option<i64>,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub details: Option<String>,
}

//! Creation primitives used by the admin surface, triggers, and tests.
//!
//! The REST layer itself lives elsewhere; these are the store operations it
//! (and every test fixture) goes through.

use chrono::Utc;

use crate::models::{ExportKind, SourceKind};
use crate::{Store, StoreResult};

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub hashed_password: String,
    pub role: String,
}

#[derive(Debug, Clone)]
pub struct NewAutomation {
    pub user_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub schedule: Option<String>,
    pub from_date_rule: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewSource {
    pub automation_id: i64,
    pub name: String,
    pub kind: SourceKind,
    pub email_sender_from: Option<String>,
    pub email_subject_contains: Option<String>,
    pub extraction_params: Option<String>,
    pub max_results: i64,
}

#[derive(Debug, Clone)]
pub struct NewExport {
    pub automation_id: i64,
    pub name: String,
    pub kind: ExportKind,
    pub configuration: String,
}

#[derive(Debug, Clone)]
pub struct NewMapping {
    pub source_id: i64,
    pub export_id: i64,
    pub priority: i64,
    pub conditions: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewAuditLog {
    pub user_id: Option<i64>,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<i64>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub details: Option<String>,
}

impl Store {
    pub async fn create_user(&self, user: NewUser) -> StoreResult<i64> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO users (username, email, hashed_password, role, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user.username)
        .bind(user.email)
        .bind(user.hashed_password)
        .bind(user.role)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn create_automation(&self, automation: NewAutomation) -> StoreResult<i64> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO automations
                (user_id, name, description, schedule, from_date_rule, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(automation.user_id)
        .bind(automation.name)
        .bind(automation.description)
        .bind(automation.schedule)
        .bind(automation.from_date_rule)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn create_source(&self, source: NewSource) -> StoreResult<i64> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO sources
                (automation_id, name, type, email_sender_from, email_subject_contains,
                 extraction_params, max_results, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(source.automation_id)
        .bind(source.name)
        .bind(source.kind)
        .bind(source.email_sender_from)
        .bind(source.email_subject_contains)
        .bind(source.extraction_params)
        .bind(source.max_results)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn create_export(&self, export: NewExport) -> StoreResult<i64> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO exports (automation_id, name, type, configuration, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(export.automation_id)
        .bind(export.name)
        .bind(export.kind)
        .bind(export.configuration)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn create_mapping(&self, mapping: NewMapping) -> StoreResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO source_export_mappings (source_id, export_id, priority, conditions, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(mapping.source_id)
        .bind(mapping.export_id)
        .bind(mapping.priority)
        .bind(mapping.conditions)
        .bind(Utc::now())
        .execute(self.pool())
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Deactivate a source or export without deleting its history.
    pub async fn set_source_active(&self, source_id: i64, active: bool) -> StoreResult<bool> {
        let rows = sqlx::query("UPDATE sources SET active = ?, updated_at = ? WHERE id = ?")
            .bind(active)
            .bind(Utc::now())
            .bind(source_id)
            .execute(self.pool())
            .await?
            .rows_affected();
        Ok(rows > 0)
    }

    pub async fn set_export_active(&self, export_id: i64, active: bool) -> StoreResult<bool> {
        let rows = sqlx::query("UPDATE exports SET active = ?, updated_at = ? WHERE id = ?")
            .bind(active)
            .bind(Utc::now())
            .bind(export_id)
            .execute(self.pool())
            .await?
            .rows_affected();
        Ok(rows > 0)
    }

    pub async fn append_audit_log(&self, entry: NewAuditLog) -> StoreResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO audit_log
                (user_id, action, resource_type, resource_id, timestamp,
                 ip_address, user_agent, details)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.user_id)
        .bind(entry.action)
        .bind(entry.resource_type)
        .bind(entry.resource_id)
        .bind(Utc::now())
        .bind(entry.ip_address)
        .bind(entry.user_agent)
        .bind(entry.details)
        .execute(self.pool())
        .await?;
        Ok(result.last_insert_rowid())
    }
}

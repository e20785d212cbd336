//! Pipeline loads for a running job.
//!
//! Tenancy is enforced here: the automation lookup carries the user id from
//! the triggering event, and everything else hangs off the automation row.

use crate::models::{Automation, Export, Source, SourceExportMapping};
use crate::{Store, StoreResult};

impl Store {
    /// Automation lookup scoped to its owner. A mismatched user id behaves
    /// exactly like a missing row.
    pub async fn automation_for_user(
        &self,
        automation_id: i64,
        user_id: i64,
    ) -> StoreResult<Option<Automation>> {
        let automation =
            sqlx::query_as("SELECT * FROM automations WHERE id = ? AND user_id = ?")
                .bind(automation_id)
                .bind(user_id)
                .fetch_optional(self.pool())
                .await?;
        Ok(automation)
    }

    pub async fn active_sources(&self, automation_id: i64) -> StoreResult<Vec<Source>> {
        let sources = sqlx::query_as(
            "SELECT * FROM sources WHERE automation_id = ? AND active = 1 ORDER BY id ASC",
        )
        .bind(automation_id)
        .fetch_all(self.pool())
        .await?;
        Ok(sources)
    }

    pub async fn active_exports(&self, automation_id: i64) -> StoreResult<Vec<Export>> {
        let exports = sqlx::query_as(
            "SELECT * FROM exports WHERE automation_id = ? AND active = 1 ORDER BY id ASC",
        )
        .bind(automation_id)
        .fetch_all(self.pool())
        .await?;
        Ok(exports)
    }

    /// All mappings whose source belongs to the automation, priority
    /// ascending so callers can route in order.
    pub async fn mappings_for_automation(
        &self,
        automation_id: i64,
    ) -> StoreResult<Vec<SourceExportMapping>> {
        let mappings = sqlx::query_as(
            r#"
            SELECT m.*
            FROM source_export_mappings m
            JOIN sources s ON s.id = m.source_id
            WHERE s.automation_id = ?
            ORDER BY m.priority ASC, m.id ASC
            "#,
        )
        .bind(automation_id)
        .fetch_all(self.pool())
        .await?;
        Ok(mappings)
    }
}

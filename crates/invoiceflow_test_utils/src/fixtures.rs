//! Store fixtures: one tenant, one automation, and helpers to hang
//! sources, exports, mappings and jobs off them.

use chrono::NaiveDate;

use invoiceflow_store::admin::{NewAutomation, NewExport, NewMapping, NewSource, NewUser};
use invoiceflow_store::jobs::NewJob;
use invoiceflow_store::{ExportKind, SourceKind, Store};

pub struct PipelineFixture {
    pub store: Store,
    pub user_id: i64,
    pub automation_id: i64,
}

impl PipelineFixture {
    pub async fn new() -> Self {
        let store = Store::connect_in_memory().await.expect("in-memory store");
        let user_id = store
            .create_user(NewUser {
                username: "alice".into(),
                email: "alice@example.org".into(),
                hashed_password: "argon2id$test".into(),
                role: "user".into(),
            })
            .await
            .expect("user");
        let automation_id = store
            .create_automation(NewAutomation {
                user_id,
                name: "monthly-invoices".into(),
                description: None,
                schedule: None,
                from_date_rule: None,
            })
            .await
            .expect("automation");
        Self {
            store,
            user_id,
            automation_id,
        }
    }

    pub async fn add_source(&self, name: &str) -> i64 {
        self.store
            .create_source(NewSource {
                automation_id: self.automation_id,
                name: name.into(),
                kind: SourceKind::Portal,
                email_sender_from: None,
                email_subject_contains: None,
                extraction_params: None,
                max_results: 30,
            })
            .await
            .expect("source")
    }

    pub async fn add_filesystem_export(&self, name: &str, base_path: &str, template: &str) -> i64 {
        let configuration = serde_json::json!({
            "base_path": base_path,
            "path_template": template,
            "create_directories": true,
        })
        .to_string();
        self.store
            .create_export(NewExport {
                automation_id: self.automation_id,
                name: name.into(),
                kind: ExportKind::Filesystem,
                configuration,
            })
            .await
            .expect("export")
    }

    pub async fn add_accounting_export(&self, name: &str, label_template: &str) -> i64 {
        let configuration = serde_json::json!({
            "transaction_type": "EXPENSE",
            "label_template": label_template,
            "debit": "606",
            "credit": "512",
        })
        .to_string();
        self.store
            .create_export(NewExport {
                automation_id: self.automation_id,
                name: name.into(),
                kind: ExportKind::Accounting,
                configuration,
            })
            .await
            .expect("export")
    }

    pub async fn map(&self, source_id: i64, export_id: i64, priority: i64) {
        self.store
            .create_mapping(NewMapping {
                source_id,
                export_id,
                priority,
                conditions: None,
            })
            .await
            .expect("mapping");
    }

    pub async fn insert_job(&self, from_date: Option<&str>) -> i64 {
        let from_date = from_date.map(|d| {
            NaiveDate::parse_from_str(d, "%Y-%m-%d").expect("fixture from_date is ISO")
        });
        self.store
            .insert_job(NewJob {
                automation_id: self.automation_id,
                from_date,
                max_results: None,
            })
            .await
            .expect("job")
    }
}

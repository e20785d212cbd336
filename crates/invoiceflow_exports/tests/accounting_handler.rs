//! Accounting handler: label rendering, year resolution, the (date, label)
//! duplicate guard, and guard-failure semantics.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use invoiceflow_exports::{
    AccountingClient, AccountingConfig, AccountingHandler, AccountingYear, ExportHandler,
    JournalEntry, NewTransaction, TransactionType,
};
use invoiceflow_protocol::{InvoiceData, TemplateContext};
use invoiceflow_store::ExportStatus;

#[derive(Default)]
struct FakeLedger {
    journal: Mutex<Vec<JournalEntry>>,
    created: Mutex<Vec<NewTransaction>>,
    journal_unreachable: bool,
}

impl FakeLedger {
    fn with_entry(date: &str, label: &str) -> Self {
        let ledger = Self::default();
        ledger.journal.lock().unwrap().push(JournalEntry {
            date: date.to_string(),
            label: label.to_string(),
        });
        ledger
    }
}

#[async_trait]
impl AccountingClient for FakeLedger {
    async fn accounting_years(&self) -> anyhow::Result<Vec<AccountingYear>> {
        Ok(vec![AccountingYear {
            id: 1,
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 12, 31).unwrap(),
        }])
    }

    async fn account_journal(
        &self,
        _year_id: i64,
        _account_code: &str,
    ) -> anyhow::Result<Vec<JournalEntry>> {
        if self.journal_unreachable {
            anyhow::bail!("journal endpoint timed out");
        }
        Ok(self.journal.lock().unwrap().clone())
    }

    async fn create_transaction(&self, transaction: NewTransaction) -> anyhow::Result<String> {
        self.created.lock().unwrap().push(transaction);
        Ok("tx-77".to_string())
    }
}

fn config() -> AccountingConfig {
    AccountingConfig {
        transaction_type: TransactionType::Expense,
        label_template: "{invoice_id}".to_string(),
        debit: "606,607".to_string(),
        credit: "512".to_string(),
    }
}

fn invoice() -> InvoiceData {
    InvoiceData {
        file_path: Some("/tmp/src.pdf".into()),
        invoice_id: Some("INV-1".into()),
        date: Some("2025-03-15".into()),
        amount_eur: Some(42.0),
        source: Some("X".into()),
    }
}

fn context() -> TemplateContext {
    TemplateContext::build(
        Some("INV-1".into()),
        Some("2025-03-15".into()),
        Some(42.0),
        Some("X".into()),
    )
}

#[tokio::test]
async fn posts_transaction_with_first_account_codes() {
    let ledger = Arc::new(FakeLedger::default());
    let handler = AccountingHandler::new(config(), ledger.clone());

    let outcome = handler.export(&invoice(), &context()).await;
    assert_eq!(outcome.status, ExportStatus::Success);
    assert_eq!(outcome.external_reference.as_deref(), Some("tx-77"));

    let created = ledger.created.lock().unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].label, "INV-1");
    assert_eq!(created[0].debit, "606");
    assert_eq!(created[0].credit, "512");
    assert_eq!(created[0].amount, 42.0);
}

#[tokio::test]
async fn duplicate_entry_skips_external_write() {
    let ledger = Arc::new(FakeLedger::with_entry("2025-03-15", "INV-1"));
    let handler = AccountingHandler::new(config(), ledger.clone());

    let outcome = handler.export(&invoice(), &context()).await;
    assert_eq!(outcome.status, ExportStatus::DuplicateSkipped);
    assert!(outcome.external_reference.is_none());
    assert!(ledger.created.lock().unwrap().is_empty());
}

#[tokio::test]
async fn guard_matches_datetime_prefixed_journal_dates() {
    let ledger = Arc::new(FakeLedger::with_entry("2025-03-15 10:30:00", "INV-1"));
    let handler = AccountingHandler::new(config(), ledger.clone());

    let outcome = handler.export(&invoice(), &context()).await;
    assert_eq!(outcome.status, ExportStatus::DuplicateSkipped);
}

#[tokio::test]
async fn unreachable_journal_is_failed_not_clean() {
    let ledger = Arc::new(FakeLedger {
        journal_unreachable: true,
        ..Default::default()
    });
    let handler = AccountingHandler::new(config(), ledger.clone());

    let outcome = handler.export(&invoice(), &context()).await;
    assert_eq!(outcome.status, ExportStatus::Failed);
    assert!(outcome
        .error_message
        .unwrap()
        .contains("duplicate check failed"));
    // A failed guard must never fall through to a write.
    assert!(ledger.created.lock().unwrap().is_empty());
}

#[tokio::test]
async fn date_outside_every_accounting_year_fails() {
    let ledger = Arc::new(FakeLedger::default());
    let handler = AccountingHandler::new(config(), ledger);

    let mut inv = invoice();
    inv.date = Some("2030-01-01".into());
    let ctx = TemplateContext::build(
        Some("INV-1".into()),
        Some("2030-01-01".into()),
        Some(42.0),
        Some("X".into()),
    );
    let outcome = handler.export(&inv, &ctx).await;
    assert_eq!(outcome.status, ExportStatus::Failed);
    assert!(outcome
        .error_message
        .unwrap()
        .contains("No matching accounting year"));
}

#[tokio::test]
async fn empty_account_codes_fail_validation() {
    let ledger = Arc::new(FakeLedger::default());
    let mut cfg = config();
    cfg.credit = String::new();
    let handler = AccountingHandler::new(cfg, ledger);

    let outcome = handler.export(&invoice(), &context()).await;
    assert_eq!(outcome.status, ExportStatus::Failed);
    assert!(outcome
        .error_message
        .unwrap()
        .contains("Missing debit or credit"));
}

//! Accounting export: post one transaction per invoice.
//!
//! The sink is non-transactional, so idempotence rests on the duplicate
//! guard: before writing, the handler renders the entry label and scans the
//! journal of the first debit account for a `(date, label)` match. A guard
//! transport failure is reported as `failed` (retryable) — it is never
//! interpreted as "not a duplicate".

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::{debug, info};

use invoiceflow_protocol::{render_template, InvoiceData, TemplateContext};

use crate::config::{AccountingConfig, TransactionType};
use crate::{ExportHandler, ExportOutcome, MISSING_CONTEXT_FIELDS, MISSING_INVOICE_FIELDS};

#[derive(Debug, Clone)]
pub struct AccountingYear {
    pub id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct JournalEntry {
    /// `YYYY-MM-DD`.
    pub date: String,
    pub label: String,
}

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub year_id: i64,
    pub label: String,
    /// `YYYY-MM-DD`.
    pub date: String,
    pub transaction_type: TransactionType,
    pub amount: f64,
    pub debit: String,
    pub credit: String,
}

/// Minimal surface of the accounting API.
#[async_trait]
pub trait AccountingClient: Send + Sync {
    async fn accounting_years(&self) -> anyhow::Result<Vec<AccountingYear>>;

    async fn account_journal(
        &self,
        year_id: i64,
        account_code: &str,
    ) -> anyhow::Result<Vec<JournalEntry>>;

    /// Returns the sink's transaction reference.
    async fn create_transaction(&self, transaction: NewTransaction) -> anyhow::Result<String>;
}

pub struct AccountingHandler {
    config: AccountingConfig,
    client: Arc<dyn AccountingClient>,
}

impl AccountingHandler {
    pub fn new(config: AccountingConfig, client: Arc<dyn AccountingClient>) -> Self {
        Self { config, client }
    }

    async fn accounting_year_for(&self, date: NaiveDate) -> anyhow::Result<Option<i64>> {
        let years = self.client.accounting_years().await?;
        Ok(years
            .into_iter()
            .find(|year| year.start_date <= date && date <= year.end_date)
            .map(|year| year.id))
    }
}

#[async_trait]
impl ExportHandler for AccountingHandler {
    async fn export(&self, invoice: &InvoiceData, context: &TemplateContext) -> ExportOutcome {
        if !invoice.is_complete() {
            return ExportOutcome::failed(MISSING_INVOICE_FIELDS);
        }
        if !context.is_complete() {
            return ExportOutcome::failed(MISSING_CONTEXT_FIELDS);
        }

        let label = match render_template(&self.config.label_template, context) {
            Ok(label) => label,
            Err(e) => return ExportOutcome::failed(e.to_string()),
        };

        let date_str = context.date.clone().unwrap_or_default();
        let Ok(date) = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d") else {
            return ExportOutcome::failed(format!("invalid invoice date '{date_str}'"));
        };

        let debit_codes = self.config.debit_codes();
        let credit_codes = self.config.credit_codes();
        let (Some(debit), Some(credit)) = (debit_codes.first(), credit_codes.first()) else {
            return ExportOutcome::failed("Missing debit or credit account configuration");
        };

        let year_id = match self.accounting_year_for(date).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                return ExportOutcome::failed(format!(
                    "No matching accounting year found for {date_str}"
                ))
            }
            Err(e) => return ExportOutcome::failed(format!("accounting year lookup failed: {e}")),
        };

        // Duplicate guard on the natural key (date, label).
        let journal = match self.client.account_journal(year_id, debit).await {
            Ok(journal) => journal,
            Err(e) => return ExportOutcome::failed(format!("duplicate check failed: {e}")),
        };
        if journal
            .iter()
            .any(|entry| entry.date.get(..10) == Some(date_str.as_str()) && entry.label == label)
        {
            debug!(label, date = %date_str, "journal entry already present");
            return ExportOutcome::duplicate_skipped("Duplicate entry already exists");
        }

        let transaction = NewTransaction {
            year_id,
            label: label.clone(),
            date: date_str,
            transaction_type: self.config.transaction_type,
            amount: invoice.amount_eur.unwrap_or_default(),
            debit: debit.to_string(),
            credit: credit.to_string(),
        };

        match self.client.create_transaction(transaction).await {
            Ok(reference) => {
                info!(reference, label, "created accounting transaction");
                ExportOutcome::success(reference)
            }
            Err(e) => ExportOutcome::failed(format!("failed to create transaction: {e}")),
        }
    }
}

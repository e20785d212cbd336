//! In-memory invoice shapes.
//!
//! An [`Invoice`] is what a source runner hands back; it never becomes a
//! database row. [`InvoiceData`] is the slimmer shape export handlers
//! receive, with the fields every handler validates before side effects.

use serde::{Deserialize, Serialize};

/// One fetched document, as produced by a source runner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Invoice {
    /// Date label; normalized to `YYYY-MM-DD` by the source layer.
    pub date: String,
    /// Provider-assigned identifier when available.
    #[serde(default)]
    pub invoice_id: Option<String>,
    /// Parsed amount in EUR.
    #[serde(default)]
    pub amount_eur: Option<f64>,
    /// Raw textual amount as found at the provider (e.g. `"19,99 €"`).
    #[serde(default)]
    pub amount_text: Option<String>,
    /// Locally readable file produced by the runner's download step.
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
    /// Logical source name, set by the source layer.
    #[serde(default)]
    pub source: Option<String>,
}

impl Invoice {
    /// Filename the download step uses when storing the document locally.
    pub fn suggested_filename(&self, prefix: &str) -> String {
        let date_part = self.date.replace(' ', "_");
        let id_part = self.invoice_id.as_deref().unwrap_or("unknown");
        format!("{prefix}_{date_part}_{id_part}.pdf")
    }
}

/// Export-facing view of an invoice. Handlers reject it unless all required
/// fields are present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceData {
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub invoice_id: Option<String>,
    /// `YYYY-MM-DD`.
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub amount_eur: Option<f64>,
    #[serde(default)]
    pub source: Option<String>,
}

impl InvoiceData {
    pub fn from_invoice(invoice: &Invoice, source_name: &str) -> Self {
        Self {
            file_path: invoice.file_path.clone(),
            invoice_id: invoice.invoice_id.clone(),
            date: Some(invoice.date.clone()),
            amount_eur: invoice.amount_eur,
            source: Some(source_name.to_string()),
        }
    }

    /// All fields handlers depend on: file_path, invoice_id, date, amount.
    pub fn is_complete(&self) -> bool {
        self.file_path.is_some()
            && self.invoice_id.is_some()
            && self.date.is_some()
            && self.amount_eur.is_some()
    }
}

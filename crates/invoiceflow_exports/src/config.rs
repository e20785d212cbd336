//! Per-kind export configuration shapes.
//!
//! Stored as type-tagged JSON on the export row. Unknown fields are left in
//! the stored blob untouched; deserialization here just ignores them.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PATH_TEMPLATE: &str = "{year}/{month}/{source}_{invoice_id}.pdf";
pub const DEFAULT_LABEL_TEMPLATE: &str = "Facture {invoice_id}";

fn default_path_template() -> String {
    DEFAULT_PATH_TEMPLATE.to_string()
}

fn default_label_template() -> String {
    DEFAULT_LABEL_TEMPLATE.to_string()
}

fn default_true() -> bool {
    true
}

fn default_base_path() -> String {
    "factures".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesystemConfig {
    #[serde(default = "default_base_path")]
    pub base_path: String,
    #[serde(default = "default_path_template")]
    pub path_template: String,
    #[serde(default = "default_true")]
    pub create_directories: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudDriveConfig {
    #[serde(default)]
    pub parent_folder_id: Option<String>,
    #[serde(default = "default_path_template")]
    pub path_template: String,
    #[serde(default = "default_true")]
    pub create_folders: bool,
    #[serde(default)]
    pub share_with: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Expense,
    Revenue,
    Transfer,
    Advanced,
}

impl Default for TransactionType {
    fn default() -> Self {
        Self::Expense
    }
}

impl TransactionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Expense => "EXPENSE",
            Self::Revenue => "REVENUE",
            Self::Transfer => "TRANSFER",
            Self::Advanced => "ADVANCED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountingConfig {
    #[serde(default)]
    pub transaction_type: TransactionType,
    #[serde(default = "default_label_template")]
    pub label_template: String,
    /// Comma- or newline-separated account codes.
    #[serde(default)]
    pub debit: String,
    #[serde(default)]
    pub credit: String,
}

impl AccountingConfig {
    pub fn debit_codes(&self) -> Vec<&str> {
        split_codes(&self.debit)
    }

    pub fn credit_codes(&self) -> Vec<&str> {
        split_codes(&self.credit)
    }
}

fn split_codes(raw: &str) -> Vec<&str> {
    raw.split(|c| c == ',' || c == '\n')
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filesystem_defaults_apply() {
        let config: FilesystemConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.path_template, DEFAULT_PATH_TEMPLATE);
        assert!(config.create_directories);
    }

    #[test]
    fn unknown_fields_are_ignored_not_fatal() {
        let config: FilesystemConfig = serde_json::from_str(
            r#"{"base_path":"/out","legacy_flag":true}"#,
        )
        .unwrap();
        assert_eq!(config.base_path, "/out");
    }

    #[test]
    fn transaction_type_uses_upper_case_wire_names() {
        let parsed: TransactionType = serde_json::from_str("\"EXPENSE\"").unwrap();
        assert_eq!(parsed, TransactionType::Expense);
        assert!(serde_json::from_str::<TransactionType>("\"expense\"").is_err());
    }

    #[test]
    fn account_codes_split_on_comma_and_newline() {
        let config = AccountingConfig {
            transaction_type: TransactionType::Expense,
            label_template: DEFAULT_LABEL_TEMPLATE.into(),
            debit: "606, 607\n608".into(),
            credit: "".into(),
        };
        assert_eq!(config.debit_codes(), vec!["606", "607", "608"]);
        assert!(config.credit_codes().is_empty());
    }
}

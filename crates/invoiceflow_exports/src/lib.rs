//! Export-handler framework.
//!
//! Every handler exposes the same contract: `export(invoice, context)`
//! returning a tri-valued [`ExportOutcome`]. Handlers validate their inputs,
//! consult their duplicate guard before any external side effect, and never
//! raise across the boundary; the registry dispatches by export kind.

pub mod accounting;
pub mod config;
pub mod drive;
pub mod filesystem;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use invoiceflow_protocol::{InvoiceData, TemplateContext};
use invoiceflow_store::{Export, ExportKind, ExportStatus};

pub use accounting::{
    AccountingClient, AccountingHandler, AccountingYear, JournalEntry, NewTransaction,
};
pub use config::{AccountingConfig, CloudDriveConfig, FilesystemConfig, TransactionType};
pub use drive::{CloudDriveHandler, DriveClient};
pub use filesystem::FilesystemHandler;

/// Result of one export attempt. Exactly one history row is written per
/// outcome; a duplicate detection carries no external reference.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportOutcome {
    pub status: ExportStatus,
    pub external_reference: Option<String>,
    pub error_message: Option<String>,
}

impl ExportOutcome {
    pub fn success(external_reference: impl Into<String>) -> Self {
        Self {
            status: ExportStatus::Success,
            external_reference: Some(external_reference.into()),
            error_message: None,
        }
    }

    pub fn failed(error_message: impl Into<String>) -> Self {
        Self {
            status: ExportStatus::Failed,
            external_reference: None,
            error_message: Some(error_message.into()),
        }
    }

    pub fn duplicate_skipped(reason: impl Into<String>) -> Self {
        Self {
            status: ExportStatus::DuplicateSkipped,
            external_reference: None,
            error_message: Some(reason.into()),
        }
    }
}

/// The uniform handler contract the coordinator dispatches through.
#[async_trait]
pub trait ExportHandler: Send + Sync {
    async fn export(&self, invoice: &InvoiceData, context: &TemplateContext) -> ExportOutcome;
}

#[derive(Debug, Error)]
pub enum ExportSetupError {
    #[error("invalid {kind} configuration: {source}")]
    BadConfiguration {
        kind: ExportKind,
        #[source]
        source: serde_json::Error,
    },
    #[error("no {0} client registered")]
    MissingClient(ExportKind),
}

/// Builds a handler for an export definition, wiring in the external-API
/// clients the deployment registered.
#[derive(Default, Clone)]
pub struct ExportRegistry {
    drive: Option<Arc<dyn DriveClient>>,
    accounting: Option<Arc<dyn AccountingClient>>,
}

impl ExportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_drive_client(mut self, client: Arc<dyn DriveClient>) -> Self {
        self.drive = Some(client);
        self
    }

    pub fn with_accounting_client(mut self, client: Arc<dyn AccountingClient>) -> Self {
        self.accounting = Some(client);
        self
    }

    pub fn handler_for(&self, export: &Export) -> Result<Box<dyn ExportHandler>, ExportSetupError> {
        let bad_config = |source| ExportSetupError::BadConfiguration {
            kind: export.kind,
            source,
        };
        match export.kind {
            ExportKind::Filesystem => {
                let config: FilesystemConfig =
                    serde_json::from_str(&export.configuration).map_err(bad_config)?;
                Ok(Box::new(FilesystemHandler::new(config)))
            }
            ExportKind::CloudDrive => {
                let config: CloudDriveConfig =
                    serde_json::from_str(&export.configuration).map_err(bad_config)?;
                let client = self
                    .drive
                    .clone()
                    .ok_or(ExportSetupError::MissingClient(ExportKind::CloudDrive))?;
                Ok(Box::new(CloudDriveHandler::new(config, client)))
            }
            ExportKind::Accounting => {
                let config: AccountingConfig =
                    serde_json::from_str(&export.configuration).map_err(bad_config)?;
                let client = self
                    .accounting
                    .clone()
                    .ok_or(ExportSetupError::MissingClient(ExportKind::Accounting))?;
                Ok(Box::new(AccountingHandler::new(config, client)))
            }
        }
    }
}

pub(crate) const MISSING_INVOICE_FIELDS: &str = "Missing required invoice data fields";
pub(crate) const MISSING_CONTEXT_FIELDS: &str = "Missing required context fields";

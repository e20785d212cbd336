//! Cloud-drive export: upload the invoice document into a templated folder
//! hierarchy.
//!
//! The concrete drive API lives behind [`DriveClient`]; this handler owns
//! validation, path rendering, the duplicate guard (a file of the same name
//! already in the destination folder), and best-effort sharing.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use invoiceflow_protocol::{render_template, validate_template, InvoiceData, TemplateContext};

use crate::config::CloudDriveConfig;
use crate::{ExportHandler, ExportOutcome, MISSING_CONTEXT_FIELDS, MISSING_INVOICE_FIELDS};

/// Minimal surface of a cloud-drive API.
#[async_trait]
pub trait DriveClient: Send + Sync {
    /// Walk (creating as needed) `folders` under `parent` and return the id
    /// of the innermost folder.
    async fn ensure_folder_path(
        &self,
        parent: Option<&str>,
        folders: &[String],
    ) -> anyhow::Result<String>;

    /// Look a file up by name within a folder.
    async fn find_file(&self, folder_id: &str, name: &str) -> anyhow::Result<Option<String>>;

    async fn upload_file(
        &self,
        folder_id: &str,
        name: &str,
        local_path: &Path,
    ) -> anyhow::Result<String>;

    async fn share_file(&self, file_id: &str, email: &str) -> anyhow::Result<()>;
}

pub struct CloudDriveHandler {
    config: CloudDriveConfig,
    client: Arc<dyn DriveClient>,
}

impl CloudDriveHandler {
    pub fn new(config: CloudDriveConfig, client: Arc<dyn DriveClient>) -> Self {
        Self { config, client }
    }
}

#[async_trait]
impl ExportHandler for CloudDriveHandler {
    async fn export(&self, invoice: &InvoiceData, context: &TemplateContext) -> ExportOutcome {
        if !invoice.is_complete() {
            return ExportOutcome::failed(MISSING_INVOICE_FIELDS);
        }
        if !context.is_complete() {
            return ExportOutcome::failed(MISSING_CONTEXT_FIELDS);
        }
        if let Err(e) = validate_template(&self.config.path_template) {
            return ExportOutcome::failed(e.to_string());
        }

        let local_path = Path::new(invoice.file_path.as_deref().unwrap_or_default());
        if tokio::fs::metadata(local_path).await.is_err() {
            return ExportOutcome::failed(format!(
                "Source file not found: {}",
                local_path.display()
            ));
        }

        let mut render_context = context.clone();
        if render_context.source.is_none() {
            render_context.source = invoice.source.clone().or_else(|| Some("unknown".into()));
        }
        if render_context.filename.is_none() {
            render_context.filename = local_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned());
        }

        let rendered = match render_template(&self.config.path_template, &render_context) {
            Ok(rendered) => rendered,
            Err(e) => return ExportOutcome::failed(e.to_string()),
        };

        let mut components: Vec<String> = rendered
            .split('/')
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect();
        let Some(file_name) = components.pop() else {
            return ExportOutcome::failed("path template rendered an empty path");
        };

        let parent = self.config.parent_folder_id.as_deref();
        let folder_id = if self.config.create_folders {
            match self.client.ensure_folder_path(parent, &components).await {
                Ok(id) => id,
                Err(e) => {
                    return ExportOutcome::failed(format!("failed to create folder structure: {e}"))
                }
            }
        } else {
            parent.unwrap_or("root").to_string()
        };

        // Duplicate guard: same name already present in the destination
        // folder. A guard failure is a failure, not a green light.
        match self.client.find_file(&folder_id, &file_name).await {
            Ok(Some(existing)) => {
                return ExportOutcome::duplicate_skipped(format!(
                    "file '{file_name}' already present (id {existing})"
                ));
            }
            Ok(None) => {}
            Err(e) => return ExportOutcome::failed(format!("duplicate check failed: {e}")),
        }

        let file_id = match self
            .client
            .upload_file(&folder_id, &file_name, local_path)
            .await
        {
            Ok(id) => id,
            Err(e) => return ExportOutcome::failed(format!("upload failed: {e}")),
        };

        for email in &self.config.share_with {
            if let Err(e) = self.client.share_file(&file_id, email).await {
                warn!(file_id, email, error = %e, "failed to share uploaded file");
            }
        }

        info!(file_id, "uploaded document to drive");
        ExportOutcome::success(file_id)
    }
}

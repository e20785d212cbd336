//! Filesystem export: copy the invoice document to a templated destination.
//!
//! The destination path doubles as the duplicate guard: a file already at
//! the rendered path means an earlier attempt delivered it, so the handler
//! reports `duplicate_skipped` without touching it. Writes go through a
//! temp file and rename so partial files are never observable. The source
//! file is owned by the source layer and is copied, never moved.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use invoiceflow_protocol::{render_template, validate_template, InvoiceData, TemplateContext};

use crate::config::FilesystemConfig;
use crate::{ExportHandler, ExportOutcome, MISSING_CONTEXT_FIELDS, MISSING_INVOICE_FIELDS};

pub struct FilesystemHandler {
    config: FilesystemConfig,
}

impl FilesystemHandler {
    pub fn new(config: FilesystemConfig) -> Self {
        Self { config }
    }

    fn base_path(&self) -> PathBuf {
        let base = PathBuf::from(&self.config.base_path);
        if base.is_absolute() {
            base
        } else {
            std::env::current_dir().unwrap_or_default().join(base)
        }
    }
}

#[async_trait]
impl ExportHandler for FilesystemHandler {
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

        let source_path = PathBuf::from(invoice.file_path.as_deref().unwrap_or_default());

        let mut render_context = context.clone();
        if render_context.source.is_none() {
            render_context.source = invoice.source.clone().or_else(|| Some("unknown".into()));
        }
        if render_context.filename.is_none() {
            render_context.filename = file_name_of(&source_path);
        }

        let relative = match render_template(&self.config.path_template, &render_context) {
            Ok(rendered) => rendered,
            Err(e) => return ExportOutcome::failed(e.to_string()),
        };
        let destination = self.base_path().join(relative);

        // Duplicate guard: a prior attempt already delivered this document.
        if destination.exists() {
            debug!(destination = %destination.display(), "destination exists, skipping copy");
            return ExportOutcome::duplicate_skipped(format!(
                "file already exists at {}",
                destination.display()
            ));
        }

        if tokio::fs::metadata(&source_path).await.is_err() {
            return ExportOutcome::failed(format!(
                "Source file not found: {}",
                source_path.display()
            ));
        }

        if self.config.create_directories {
            if let Some(parent) = destination.parent() {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    return ExportOutcome::failed(format!(
                        "failed to create {}: {e}",
                        parent.display()
                    ));
                }
            }
        }

        match copy_atomically(&source_path, &destination).await {
            Ok(()) => {
                info!(destination = %destination.display(), "exported document");
                ExportOutcome::success(destination.display().to_string())
            }
            Err(e) => ExportOutcome::failed(e.to_string()),
        }
    }
}

fn file_name_of(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

/// Copy via a sibling temp file + rename so readers never see a partial
/// destination.
async fn copy_atomically(source: &Path, destination: &Path) -> std::io::Result<()> {
    let temp_name = match destination.file_name() {
        Some(name) => format!("{}.part", name.to_string_lossy()),
        None => return Err(std::io::Error::other("destination has no file name")),
    };
    let temp_path = destination.with_file_name(temp_name);
    tokio::fs::copy(source, &temp_path).await?;
    match tokio::fs::rename(&temp_path, destination).await {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = tokio::fs::remove_file(&temp_path).await;
            Err(e)
        }
    }
}

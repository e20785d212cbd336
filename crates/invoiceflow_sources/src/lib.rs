//! Source-runner integration layer.
//!
//! Concrete acquisition adapters (portal scraping, mailbox search) live
//! outside this workspace; they plug in through [`SourceRunner`]. This crate
//! owns the registry keyed by source kind and the normalization applied to
//! whatever a runner returns before the coordinator routes it.

mod normalize;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, warn};

use invoiceflow_protocol::Invoice;
use invoiceflow_store::{Source, SourceKind};

pub use normalize::parse_amount_text;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no runner registered for source kind '{0}'")]
    UnknownKind(SourceKind),
    #[error("source runner failed: {0}")]
    Runner(#[source] anyhow::Error),
}

/// Contract every acquisition adapter implements.
///
/// The runner owns authentication, pagination, from-date filtering at the
/// provider where possible, and downloading: `file_path` on a returned
/// invoice must point to a locally readable file. A returned error means
/// the whole source failed; partial results are discarded.
#[async_trait]
pub trait SourceRunner: Send + Sync {
    async fn run(
        &self,
        source: &Source,
        from_date: Option<NaiveDate>,
        max_results: u32,
    ) -> anyhow::Result<Vec<Invoice>>;
}

/// Runners keyed by source kind. The coordinator holds one registry for its
/// lifetime; tests register scripted runners through the same handle.
#[derive(Default, Clone)]
pub struct SourceRegistry {
    runners: HashMap<SourceKind, Arc<dyn SourceRunner>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: SourceKind, runner: Arc<dyn SourceRunner>) {
        self.runners.insert(kind, runner);
    }

    /// Execute one source and normalize its results: dates to ISO (records
    /// with unparseable dates are dropped), amounts parsed from text when
    /// the numeric field is absent, results filtered to the cutoff, capped
    /// at `max_results`, and tagged with the source name.
    pub async fn run_source(
        &self,
        source: &Source,
        from_date: Option<NaiveDate>,
        max_results_override: Option<u32>,
    ) -> Result<Vec<Invoice>, SourceError> {
        let runner = self
            .runners
            .get(&source.kind)
            .ok_or(SourceError::UnknownKind(source.kind))?;

        let max_results =
            max_results_override.unwrap_or_else(|| source.max_results.max(0) as u32);

        let raw = runner
            .run(source, from_date, max_results)
            .await
            .map_err(SourceError::Runner)?;

        let total = raw.len();
        let invoices = normalize::normalize_batch(raw, &source.name, from_date, max_results);
        if invoices.len() < total {
            debug!(
                source = %source.name,
                kept = invoices.len(),
                fetched = total,
                "dropped invoices during normalization"
            );
        }
        if invoices.is_empty() {
            warn!(source = %source.name, "source produced no usable invoices");
        }
        Ok(invoices)
    }
}

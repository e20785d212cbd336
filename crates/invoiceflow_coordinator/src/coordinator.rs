//! The job state machine.
//!
//! One coordinator instance consumes `job.started` from the durable
//! consumer, claims the job through the store's `pending -> running` CAS,
//! drives extract -> route -> export, and finalizes with a CAS-guarded
//! terminal transition plus exactly one terminal event. Redeliveries and
//! concurrent instances are harmless: whoever loses the claim acks and
//! returns.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use invoiceflow_bus::{EventBus, HandlerOutcome, MessageHandler, ShutdownToken};
use invoiceflow_exports::{ExportOutcome, ExportRegistry};
use invoiceflow_protocol::dates::parse_date_label;
use invoiceflow_protocol::{
    defaults, InvoiceData, JobCompletedEvent, JobFailedEvent, JobStartedEvent, JobStats,
    TemplateContext,
};
use invoiceflow_sources::SourceRegistry;
use invoiceflow_store::history::NewExportHistory;
use invoiceflow_store::{Export, ExportStatus, JobStatus, Source, Store};

use crate::error::JobError;

/// Attempts for finalization writes and terminal-event publishes. The job
/// must not be left in `running` because of one transient fault.
const FINALIZE_ATTEMPTS: u32 = 3;
const FINALIZE_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Per-job deadline; a job still non-terminal past this fails with `Timeout`.
    pub deadline: Duration,
    /// Concurrent source executions per job.
    pub source_fanout: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            deadline: defaults::JOB_DEADLINE,
            source_fanout: defaults::SOURCE_FANOUT,
        }
    }
}

pub struct Coordinator {
    store: Store,
    bus: Arc<dyn EventBus>,
    sources: Arc<SourceRegistry>,
    exports: Arc<ExportRegistry>,
    config: CoordinatorConfig,
}

impl Coordinator {
    pub fn new(
        store: Store,
        bus: Arc<dyn EventBus>,
        sources: Arc<SourceRegistry>,
        exports: Arc<ExportRegistry>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            store,
            bus,
            sources,
            exports,
            config,
        }
    }

    /// Ensure the jobs stream and durable consumer, then consume
    /// `job.started` until shutdown.
    pub async fn run(self: Arc<Self>, shutdown: ShutdownToken) -> anyhow::Result<()> {
        self.bus
            .ensure_stream(
                defaults::JOBS_STREAM,
                &defaults::JOBS_SUBJECTS,
                defaults::JOBS_STREAM_MAX_AGE,
            )
            .await?;
        self.bus
            .ensure_consumer(
                defaults::JOBS_STREAM,
                defaults::COORDINATOR_CONSUMER,
                defaults::JOB_STARTED_SUBJECT,
            )
            .await?;
        info!("job coordinator started");
        self.bus
            .clone()
            .subscribe_durable(
                defaults::JOBS_STREAM,
                defaults::COORDINATOR_CONSUMER,
                self,
                shutdown,
            )
            .await?;
        Ok(())
    }

    /// Drive one job from the `job.started` event to a terminal state.
    ///
    /// Returns `Err` only for infrastructure faults where redelivery can
    /// help (claim not yet taken); everything after the claim is folded
    /// into the job's own terminal state.
    pub async fn handle_job_started(&self, event: JobStartedEvent) -> anyhow::Result<()> {
        let job_id = event.job_id;

        if !self.store.claim_job(job_id).await? {
            let status = self.store.job_status(job_id).await?;
            info!(job_id, ?status, "job not claimable, acking redelivery");
            return Ok(());
        }

        info!(
            job_id,
            automation_id = event.automation_id,
            "job claimed, starting pipeline"
        );

        let outcome = match parse_from_date(event.from_date.as_deref()) {
            Err(e) => Err(e),
            Ok(from_date) => {
                let pipeline = PipelineContext {
                    store: self.store.clone(),
                    sources: Arc::clone(&self.sources),
                    exports: Arc::clone(&self.exports),
                    job_id,
                    automation_id: event.automation_id,
                    user_id: event.user_id,
                    from_date,
                    max_results: event.max_results,
                    source_fanout: self.config.source_fanout.max(1),
                };
                // The pipeline runs detached so a deadline expiry does not
                // abort in-flight handler calls; their history rows still
                // land, but the results below are discarded.
                let task = tokio::spawn(pipeline.execute());
                match tokio::time::timeout(self.config.deadline, task).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(join_error)) => Err(JobError::Fatal(format!(
                        "pipeline task failed: {join_error}"
                    ))),
                    Err(_) => Err(JobError::Timeout),
                }
            }
        };

        self.finalize(&event, outcome).await;
        Ok(())
    }

    async fn finalize(&self, event: &JobStartedEvent, outcome: Result<JobStats, JobError>) {
        let job_id = event.job_id;
        match outcome {
            Ok(stats) => {
                let stats_json = serde_json::to_string(&stats).unwrap_or_else(|_| "{}".into());
                match self.try_complete(job_id, &stats_json).await {
                    Ok(true) => {
                        info!(job_id, ?stats, "job completed");
                        self.publish_completed(event, stats).await;
                    }
                    Ok(false) => {
                        // Finalized elsewhere while we were finishing up.
                        match self.store.job_status(job_id).await {
                            Ok(Some(JobStatus::Cancelled)) => {
                                warn!(job_id, "job cancelled during finalization");
                                self.publish_failed(event, "Cancelled").await;
                            }
                            other => warn!(
                                job_id,
                                ?other,
                                "job already finalized, discarding pipeline result"
                            ),
                        }
                    }
                    Err(e) => error!(job_id, error = %e, "failed to finalize completed job"),
                }
            }
            Err(JobError::Cancelled) => {
                // The row is already terminal (`cancelled`, set by the admin
                // surface); only the terminal event is still owed.
                warn!(job_id, "job cancelled");
                self.publish_failed(event, "Cancelled").await;
            }
            Err(e) => {
                let message = e.to_string();
                warn!(job_id, error = %message, "job failed");
                match self.try_fail(job_id, &message).await {
                    Ok(true) => self.publish_failed(event, &message).await,
                    Ok(false) => warn!(job_id, "job already finalized, skipping failure write"),
                    Err(store_err) => {
                        error!(job_id, error = %store_err, "failed to record job failure")
                    }
                }
            }
        }
    }

    async fn try_complete(&self, job_id: i64, stats_json: &str) -> Result<bool, JobError> {
        let mut last_err = None;
        for _ in 0..FINALIZE_ATTEMPTS {
            match self.store.complete_job(job_id, stats_json).await {
                Ok(done) => return Ok(done),
                Err(e) => {
                    last_err = Some(e);
                    tokio::time::sleep(FINALIZE_BACKOFF).await;
                }
            }
        }
        Err(JobError::Store(last_err.expect("at least one attempt")))
    }

    async fn try_fail(&self, job_id: i64, message: &str) -> Result<bool, JobError> {
        let mut last_err = None;
        for _ in 0..FINALIZE_ATTEMPTS {
            match self.store.fail_job(job_id, message).await {
                Ok(done) => return Ok(done),
                Err(e) => {
                    last_err = Some(e);
                    tokio::time::sleep(FINALIZE_BACKOFF).await;
                }
            }
        }
        Err(JobError::Store(last_err.expect("at least one attempt")))
    }

    async fn publish_completed(&self, event: &JobStartedEvent, stats: JobStats) {
        let payload = JobCompletedEvent {
            job_id: event.job_id,
            automation_id: event.automation_id,
            user_id: event.user_id,
            completed_at: Utc::now(),
            stats,
        };
        self.publish_terminal(defaults::JOB_COMPLETED_SUBJECT, &payload, event.job_id)
            .await;
    }

    async fn publish_failed(&self, event: &JobStartedEvent, message: &str) {
        let payload = JobFailedEvent {
            job_id: event.job_id,
            automation_id: event.automation_id,
            user_id: event.user_id,
            failed_at: Utc::now(),
            error_message: message.to_string(),
            error_details: None,
        };
        self.publish_terminal(defaults::JOB_FAILED_SUBJECT, &payload, event.job_id)
            .await;
    }

    async fn publish_terminal<T: serde::Serialize>(&self, subject: &str, payload: &T, job_id: i64) {
        let Ok(bytes) = serde_json::to_vec(payload) else {
            error!(job_id, subject, "terminal event does not serialize");
            return;
        };
        for attempt in 1..=FINALIZE_ATTEMPTS {
            match self.bus.publish(subject, bytes.clone()).await {
                Ok(()) => return,
                Err(e) if attempt == FINALIZE_ATTEMPTS => {
                    error!(job_id, subject, error = %e, "giving up publishing terminal event");
                }
                Err(e) => {
                    warn!(job_id, subject, error = %e, "terminal event publish failed, retrying");
                    tokio::time::sleep(FINALIZE_BACKOFF).await;
                }
            }
        }
    }
}

#[async_trait]
impl MessageHandler for Coordinator {
    async fn handle(&self, subject: &str, payload: &[u8]) -> HandlerOutcome {
        let event: JobStartedEvent = match serde_json::from_slice(payload) {
            Ok(event) => event,
            Err(e) => {
                error!(subject, error = %e, "undecodable job.started payload");
                return HandlerOutcome::Nak;
            }
        };
        match self.handle_job_started(event).await {
            Ok(()) => HandlerOutcome::Ack,
            Err(e) => {
                error!(subject, error = %e, "job.started handling failed, requeueing");
                HandlerOutcome::Nak
            }
        }
    }
}

fn parse_from_date(raw: Option<&str>) -> Result<Option<NaiveDate>, JobError> {
    match raw {
        None => Ok(None),
        Some(label) => parse_date_label(label)
            .map(Some)
            .ok_or_else(|| JobError::InvalidFromDate(label.to_string())),
    }
}

/// Everything one pipeline run owns. `'static` so the deadline can leave it
/// running detached.
struct PipelineContext {
    store: Store,
    sources: Arc<SourceRegistry>,
    exports: Arc<ExportRegistry>,
    job_id: i64,
    automation_id: i64,
    user_id: i64,
    from_date: Option<NaiveDate>,
    max_results: Option<u32>,
    source_fanout: usize,
}

enum SourceRun {
    Extracted(Source, Vec<invoiceflow_protocol::Invoice>),
    Failed(Source, String),
    Cancelled,
}

impl PipelineContext {
    async fn execute(self) -> Result<JobStats, JobError> {
        let started = Instant::now();
        let mut stats = JobStats::default();

        let automation = self
            .store
            .automation_for_user(self.automation_id, self.user_id)
            .await?
            .ok_or(JobError::AutomationNotFound)?;

        let sources = self.store.active_sources(automation.id).await?;
        let exports = self.store.active_exports(automation.id).await?;
        let mappings = self.store.mappings_for_automation(automation.id).await?;
        if sources.is_empty() || exports.is_empty() || mappings.is_empty() {
            return Err(JobError::EmptyPipeline);
        }

        let source_total = sources.len();
        let runs = stream::iter(sources.into_iter().map(|source| {
            let store = self.store.clone();
            let registry = Arc::clone(&self.sources);
            let job_id = self.job_id;
            let from_date = self.from_date;
            let max_results = self.max_results;
            async move {
                match store.job_status(job_id).await {
                    Ok(Some(JobStatus::Cancelled)) => return SourceRun::Cancelled,
                    Ok(_) => {}
                    Err(e) => return SourceRun::Failed(source, e.to_string()),
                }
                debug!(job_id, source = %source.name, "running source");
                match registry.run_source(&source, from_date, max_results).await {
                    Ok(invoices) => SourceRun::Extracted(source, invoices),
                    Err(e) => SourceRun::Failed(source, e.to_string()),
                }
            }
        }))
        .buffer_unordered(self.source_fanout)
        .collect::<Vec<_>>()
        .await;

        let mut extracted = Vec::new();
        for run in runs {
            match run {
                SourceRun::Cancelled => return Err(JobError::Cancelled),
                SourceRun::Extracted(source, invoices) => {
                    stats.sources_executed += 1;
                    stats.invoices_extracted += invoices.len() as u32;
                    info!(
                        job_id = self.job_id,
                        source = %source.name,
                        count = invoices.len(),
                        "source extracted invoices"
                    );
                    extracted.push((source, invoices));
                }
                SourceRun::Failed(source, message) => {
                    stats.sources_failed += 1;
                    warn!(
                        job_id = self.job_id,
                        source = %source.name,
                        error = %message,
                        "source failed, continuing with the rest"
                    );
                }
            }
        }
        if stats.sources_executed == 0 && stats.sources_failed as usize == source_total {
            return Err(JobError::AllSourcesFailed);
        }

        let exports_by_id: HashMap<i64, &Export> =
            exports.iter().map(|export| (export.id, export)).collect();

        for (source, invoices) in &extracted {
            let source_mappings: Vec<_> = mappings
                .iter()
                .filter(|mapping| mapping.source_id == source.id)
                .collect();

            for invoice in invoices {
                if source_mappings.is_empty() {
                    stats.invoices_unmapped += 1;
                    warn!(
                        job_id = self.job_id,
                        source = %source.name,
                        "no exports mapped, skipping invoice"
                    );
                    continue;
                }

                let invoice_data = InvoiceData::from_invoice(invoice, &source.name);
                let mut context = TemplateContext::build(
                    invoice.invoice_id.clone(),
                    Some(invoice.date.clone()),
                    invoice.amount_eur,
                    Some(source.name.clone()),
                );
                if let Some(name) = invoice
                    .file_path
                    .as_deref()
                    .and_then(|p| Path::new(p).file_name())
                {
                    context = context.with_filename(name.to_string_lossy());
                }

                for mapping in &source_mappings {
                    self.ensure_not_cancelled().await?;
                    let Some(export) = exports_by_id.get(&mapping.export_id) else {
                        warn!(
                            job_id = self.job_id,
                            export_id = mapping.export_id,
                            "mapped export not active, skipping"
                        );
                        continue;
                    };
                    let outcome = self.run_export(export, &invoice_data, &context).await;
                    self.record_attempt(export, &context, &outcome).await?;
                    match outcome.status {
                        ExportStatus::Success | ExportStatus::DuplicateSkipped => {
                            stats.exports_completed += 1;
                        }
                        ExportStatus::Failed => {
                            stats.exports_failed += 1;
                            warn!(
                                job_id = self.job_id,
                                export_id = export.id,
                                error = outcome.error_message.as_deref().unwrap_or("unknown"),
                                "export failed, continuing"
                            );
                        }
                    }
                }
            }
        }

        stats.duration_seconds = started.elapsed().as_secs();
        Ok(stats)
    }

    /// Handlers never raise across the boundary; a handler that cannot even
    /// be built reports as a failed attempt.
    async fn run_export(
        &self,
        export: &Export,
        invoice: &InvoiceData,
        context: &TemplateContext,
    ) -> ExportOutcome {
        match self.exports.handler_for(export) {
            Ok(handler) => handler.export(invoice, context).await,
            Err(e) => ExportOutcome::failed(e.to_string()),
        }
    }

    /// Exactly one history row per handler invocation.
    async fn record_attempt(
        &self,
        export: &Export,
        context: &TemplateContext,
        outcome: &ExportOutcome,
    ) -> Result<(), JobError> {
        self.store
            .insert_export_history(NewExportHistory {
                job_id: self.job_id,
                export_id: Some(export.id),
                export_type: export.kind,
                status: outcome.status,
                external_reference: outcome.external_reference.clone(),
                error_message: outcome.error_message.clone(),
                context: serde_json::to_string(context).ok(),
            })
            .await?;
        Ok(())
    }

    async fn ensure_not_cancelled(&self) -> Result<(), JobError> {
        match self.store.job_status(self.job_id).await? {
            Some(JobStatus::Cancelled) => Err(JobError::Cancelled),
            Some(_) => Ok(()),
            None => Err(JobError::Fatal(format!("job {} row vanished", self.job_id))),
        }
    }
}

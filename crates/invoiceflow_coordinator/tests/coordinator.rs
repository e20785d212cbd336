//! End-to-end coordinator scenarios against in-memory doubles: the real
//! store, handlers and state machine with only the outermost I/O swapped.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use invoiceflow_bus::EventBus;
use invoiceflow_coordinator::{Coordinator, CoordinatorConfig};
use invoiceflow_exports::ExportRegistry;
use invoiceflow_protocol::{JobCompletedEvent, JobFailedEvent, JobStartedEvent};
use invoiceflow_sources::SourceRegistry;
use invoiceflow_store::admin::NewExport;
use invoiceflow_store::{ExportKind, ExportStatus, JobStatus};
use invoiceflow_test_utils::sources::sample_invoice;
use invoiceflow_test_utils::{
    MemoryAccounting, MemoryBus, PipelineFixture, ScriptedSource,
};
use tempfile::TempDir;

struct Harness {
    fixture: PipelineFixture,
    bus: Arc<MemoryBus>,
    runner: Arc<ScriptedSource>,
    accounting: Arc<MemoryAccounting>,
    coordinator: Arc<Coordinator>,
}

impl Harness {
    async fn new(deadline: Duration) -> Self {
        let fixture = PipelineFixture::new().await;
        let bus = MemoryBus::new();
        let runner = Arc::new(ScriptedSource::new());
        let accounting = Arc::new(MemoryAccounting::new());

        let mut sources = SourceRegistry::new();
        sources.register(invoiceflow_store::SourceKind::Portal, runner.clone());
        let exports = ExportRegistry::new().with_accounting_client(accounting.clone());

        let bus_handle: Arc<dyn EventBus> = bus.clone();
        let coordinator = Arc::new(Coordinator::new(
            fixture.store.clone(),
            bus_handle,
            Arc::new(sources),
            Arc::new(exports),
            CoordinatorConfig {
                deadline,
                source_fanout: 8,
            },
        ));

        Self {
            fixture,
            bus,
            runner,
            accounting,
            coordinator,
        }
    }

    fn event(&self, job_id: i64, from_date: Option<&str>) -> JobStartedEvent {
        JobStartedEvent {
            job_id,
            automation_id: self.fixture.automation_id,
            user_id: self.fixture.user_id,
            started_at: Utc::now(),
            from_date: from_date.map(str::to_string),
            max_results: None,
        }
    }
}

fn write_pdf(dir: &TempDir, name: &str) -> String {
    let path = dir.path().join(name);
    std::fs::write(&path, b"pdf bytes").unwrap();
    path.display().to_string()
}

#[tokio::test]
async fn happy_path_single_source_single_export() {
    let harness = Harness::new(Duration::from_secs(60)).await;
    let out = TempDir::new().unwrap();
    let srcdir = TempDir::new().unwrap();
    let pdf = write_pdf(&srcdir, "src.pdf");

    let source = harness.fixture.add_source("Portal").await;
    let export = harness
        .fixture
        .add_filesystem_export(
            "archive",
            &out.path().display().to_string(),
            "{year}/{month}/{invoice_id}.pdf",
        )
        .await;
    harness.fixture.map(source, export, 1).await;
    harness
        .runner
        .returns("Portal", vec![sample_invoice("INV-1", "2025-03-15", 42.0, &pdf)]);

    let job_id = harness.fixture.insert_job(Some("2025-01-01")).await;
    harness
        .coordinator
        .handle_job_started(harness.event(job_id, Some("2025-01-01")))
        .await
        .unwrap();

    // File delivered at the rendered destination.
    let destination = out.path().join("2025/03/INV-1.pdf");
    assert!(destination.exists());

    // Exactly one history row, success, destination as reference.
    let history = harness.fixture.store.export_history_for_job(job_id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, ExportStatus::Success);
    assert_eq!(
        history[0].external_reference.as_deref(),
        Some(destination.display().to_string().as_str())
    );

    // Terminal job state and stats.
    let job = harness.fixture.store.job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.started_at.is_some());
    assert!(job.completed_at.is_some());

    // Exactly one job.completed event with matching stats.
    let completed: Vec<JobCompletedEvent> = harness.bus.published_on("job.completed");
    assert_eq!(completed.len(), 1);
    assert_eq!(harness.bus.publish_count(), 1);
    assert_eq!(completed[0].stats.invoices_extracted, 1);
    assert_eq!(completed[0].stats.exports_completed, 1);
    assert_eq!(completed[0].stats.exports_failed, 0);
    assert_eq!(completed[0].stats.sources_executed, 1);
}

#[tokio::test]
async fn duplicate_detection_skips_external_write() {
    let harness = Harness::new(Duration::from_secs(60)).await;
    let srcdir = TempDir::new().unwrap();
    let pdf = write_pdf(&srcdir, "src.pdf");

    let source = harness.fixture.add_source("Portal").await;
    let export = harness.fixture.add_accounting_export("books", "{invoice_id}").await;
    harness.fixture.map(source, export, 1).await;
    harness
        .runner
        .returns("Portal", vec![sample_invoice("INV-1", "2025-03-15", 42.0, &pdf)]);

    // The journal already holds the natural key (date, label).
    harness.accounting.seed_journal_entry("2025-03-15", "INV-1");

    let job_id = harness.fixture.insert_job(Some("2025-01-01")).await;
    harness
        .coordinator
        .handle_job_started(harness.event(job_id, Some("2025-01-01")))
        .await
        .unwrap();

    // No external write happened.
    assert!(harness.accounting.created_transactions().is_empty());

    let history = harness.fixture.store.export_history_for_job(job_id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, ExportStatus::DuplicateSkipped);
    assert!(history[0].external_reference.is_none());

    let job = harness.fixture.store.job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
}

#[tokio::test]
async fn partial_export_failure_does_not_fail_the_job() {
    let harness = Harness::new(Duration::from_secs(60)).await;
    let out = TempDir::new().unwrap();
    let srcdir = TempDir::new().unwrap();
    let pdf = write_pdf(&srcdir, "src.pdf");

    let source = harness.fixture.add_source("Portal").await;
    let good = harness
        .fixture
        .add_filesystem_export(
            "archive",
            &out.path().display().to_string(),
            "{year}/{invoice_id}.pdf",
        )
        .await;
    // Broken accounting export: no credit account configured.
    let bad = harness
        .fixture
        .store
        .create_export(NewExport {
            automation_id: harness.fixture.automation_id,
            name: "books".into(),
            kind: ExportKind::Accounting,
            configuration: r#"{"label_template":"{invoice_id}","debit":"606","credit":""}"#.into(),
        })
        .await
        .unwrap();
    harness.fixture.map(source, good, 1).await;
    harness.fixture.map(source, bad, 2).await;
    harness
        .runner
        .returns("Portal", vec![sample_invoice("INV-1", "2025-03-15", 42.0, &pdf)]);

    let job_id = harness.fixture.insert_job(None).await;
    harness
        .coordinator
        .handle_job_started(harness.event(job_id, None))
        .await
        .unwrap();

    let history = harness.fixture.store.export_history_for_job(job_id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].status, ExportStatus::Success);
    assert_eq!(history[1].status, ExportStatus::Failed);

    let job = harness.fixture.store.job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);

    let completed: Vec<JobCompletedEvent> = harness.bus.published_on("job.completed");
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].stats.exports_completed, 1);
    assert_eq!(completed[0].stats.exports_failed, 1);
}

#[tokio::test]
async fn exports_run_in_priority_order() {
    let harness = Harness::new(Duration::from_secs(60)).await;
    let out = TempDir::new().unwrap();
    let srcdir = TempDir::new().unwrap();
    let pdf = write_pdf(&srcdir, "src.pdf");

    let source = harness.fixture.add_source("Portal").await;
    let second = harness
        .fixture
        .add_filesystem_export("later", &out.path().display().to_string(), "{invoice_id}_b.pdf")
        .await;
    let first = harness
        .fixture
        .add_filesystem_export("sooner", &out.path().display().to_string(), "{invoice_id}_a.pdf")
        .await;
    // Mapped in reverse creation order; priority decides.
    harness.fixture.map(source, second, 5).await;
    harness.fixture.map(source, first, 1).await;
    harness
        .runner
        .returns("Portal", vec![sample_invoice("INV-1", "2025-03-15", 42.0, &pdf)]);

    let job_id = harness.fixture.insert_job(None).await;
    harness
        .coordinator
        .handle_job_started(harness.event(job_id, None))
        .await
        .unwrap();

    let history = harness.fixture.store.export_history_for_job(job_id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].export_id, Some(first));
    assert_eq!(history[1].export_id, Some(second));
}

#[tokio::test]
async fn empty_pipeline_fails_the_job() {
    let harness = Harness::new(Duration::from_secs(60)).await;

    // Sources and exports exist, but nothing routes between them.
    harness.fixture.add_source("Portal").await;
    harness
        .fixture
        .add_filesystem_export("archive", "/tmp/out", "{year}/{invoice_id}.pdf")
        .await;

    let job_id = harness.fixture.insert_job(None).await;
    harness
        .coordinator
        .handle_job_started(harness.event(job_id, None))
        .await
        .unwrap();

    let job = harness.fixture.store.job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_message.as_deref(), Some("EmptyPipeline"));

    let failed: Vec<JobFailedEvent> = harness.bus.published_on("job.failed");
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].error_message, "EmptyPipeline");
    assert_eq!(harness.bus.publish_count(), 1);
}

#[tokio::test]
async fn redelivery_after_completion_is_a_no_op() {
    let harness = Harness::new(Duration::from_secs(60)).await;
    let out = TempDir::new().unwrap();
    let srcdir = TempDir::new().unwrap();
    let pdf = write_pdf(&srcdir, "src.pdf");

    let source = harness.fixture.add_source("Portal").await;
    let export = harness
        .fixture
        .add_filesystem_export(
            "archive",
            &out.path().display().to_string(),
            "{year}/{invoice_id}.pdf",
        )
        .await;
    harness.fixture.map(source, export, 1).await;
    harness
        .runner
        .returns("Portal", vec![sample_invoice("INV-1", "2025-03-15", 42.0, &pdf)]);

    let job_id = harness.fixture.insert_job(None).await;
    let event = harness.event(job_id, None);
    harness.coordinator.handle_job_started(event.clone()).await.unwrap();

    let rows_before = harness.fixture.store.export_history_for_job(job_id).await.unwrap().len();
    let events_before = harness.bus.publish_count();
    let runs_before = harness.runner.run_count("Portal");

    // Redelivery: the claim observes status != pending and acks.
    harness.coordinator.handle_job_started(event).await.unwrap();

    assert_eq!(
        harness.fixture.store.export_history_for_job(job_id).await.unwrap().len(),
        rows_before
    );
    assert_eq!(harness.bus.publish_count(), events_before);
    assert_eq!(harness.runner.run_count("Portal"), runs_before);
    assert_eq!(
        harness.fixture.store.job_status(job_id).await.unwrap(),
        Some(JobStatus::Completed)
    );
}

#[tokio::test]
async fn deadline_forces_failure_and_discards_late_results() {
    let harness = Harness::new(Duration::from_millis(100)).await;
    let out = TempDir::new().unwrap();
    let srcdir = TempDir::new().unwrap();
    let pdf = write_pdf(&srcdir, "src.pdf");

    let source = harness.fixture.add_source("Portal").await;
    let export = harness
        .fixture
        .add_filesystem_export(
            "archive",
            &out.path().display().to_string(),
            "{year}/{invoice_id}.pdf",
        )
        .await;
    harness.fixture.map(source, export, 1).await;
    harness.runner.slow(
        "Portal",
        Duration::from_millis(400),
        vec![sample_invoice("INV-1", "2025-03-15", 42.0, &pdf)],
    );

    let job_id = harness.fixture.insert_job(None).await;
    harness
        .coordinator
        .handle_job_started(harness.event(job_id, None))
        .await
        .unwrap();

    let job = harness.fixture.store.job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_message.as_deref(), Some("Timeout"));

    let failed: Vec<JobFailedEvent> = harness.bus.published_on("job.failed");
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].error_message, "Timeout");

    // The detached pipeline finishes later: its history row lands for
    // auditability, but the terminal status stands.
    tokio::time::sleep(Duration::from_millis(700)).await;
    let history = harness.fixture.store.export_history_for_job(job_id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(
        harness.fixture.store.job_status(job_id).await.unwrap(),
        Some(JobStatus::Failed)
    );
    // No second terminal event from the late pipeline.
    assert_eq!(harness.bus.publish_count(), 1);
}

#[tokio::test]
async fn all_sources_failing_fails_the_job() {
    let harness = Harness::new(Duration::from_secs(60)).await;

    let source = harness.fixture.add_source("Portal").await;
    let export = harness
        .fixture
        .add_filesystem_export("archive", "/tmp/out", "{year}/{invoice_id}.pdf")
        .await;
    harness.fixture.map(source, export, 1).await;
    harness.runner.fails("Portal", "login rejected");

    let job_id = harness.fixture.insert_job(None).await;
    harness
        .coordinator
        .handle_job_started(harness.event(job_id, None))
        .await
        .unwrap();

    let job = harness.fixture.store.job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_message.as_deref(), Some("AllSourcesFailed"));
}

#[tokio::test]
async fn one_failing_source_does_not_fail_the_job() {
    let harness = Harness::new(Duration::from_secs(60)).await;
    let out = TempDir::new().unwrap();
    let srcdir = TempDir::new().unwrap();
    let pdf = write_pdf(&srcdir, "src.pdf");

    let healthy = harness.fixture.add_source("Portal").await;
    let broken = harness.fixture.add_source("Backup Portal").await;
    let export = harness
        .fixture
        .add_filesystem_export(
            "archive",
            &out.path().display().to_string(),
            "{year}/{invoice_id}.pdf",
        )
        .await;
    harness.fixture.map(healthy, export, 1).await;
    harness.fixture.map(broken, export, 1).await;
    harness
        .runner
        .returns("Portal", vec![sample_invoice("INV-1", "2025-03-15", 42.0, &pdf)]);
    harness.runner.fails("Backup Portal", "connection reset");

    let job_id = harness.fixture.insert_job(None).await;
    harness
        .coordinator
        .handle_job_started(harness.event(job_id, None))
        .await
        .unwrap();

    let job = harness.fixture.store.job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);

    let completed: Vec<JobCompletedEvent> = harness.bus.published_on("job.completed");
    assert_eq!(completed[0].stats.sources_executed, 1);
    assert_eq!(completed[0].stats.sources_failed, 1);
    assert_eq!(completed[0].stats.exports_completed, 1);
}

#[tokio::test]
async fn invoices_without_mappings_are_counted_and_skipped() {
    let harness = Harness::new(Duration::from_secs(60)).await;
    let out = TempDir::new().unwrap();
    let srcdir = TempDir::new().unwrap();
    let pdf = write_pdf(&srcdir, "src.pdf");

    let mapped = harness.fixture.add_source("Portal").await;
    let unmapped = harness.fixture.add_source("Side Portal").await;
    let export = harness
        .fixture
        .add_filesystem_export(
            "archive",
            &out.path().display().to_string(),
            "{year}/{invoice_id}.pdf",
        )
        .await;
    harness.fixture.map(mapped, export, 1).await;
    harness
        .runner
        .returns("Portal", vec![sample_invoice("INV-1", "2025-03-15", 42.0, &pdf)]);
    harness
        .runner
        .returns("Side Portal", vec![sample_invoice("INV-2", "2025-04-01", 9.0, &pdf)]);

    let job_id = harness.fixture.insert_job(None).await;
    harness
        .coordinator
        .handle_job_started(harness.event(job_id, None))
        .await
        .unwrap();

    let completed: Vec<JobCompletedEvent> = harness.bus.published_on("job.completed");
    assert_eq!(completed[0].stats.invoices_extracted, 2);
    assert_eq!(completed[0].stats.invoices_unmapped, 1);
    assert_eq!(completed[0].stats.exports_completed, 1);
}

#[tokio::test]
async fn cancellation_is_observed_at_the_next_safe_point() {
    let harness = Harness::new(Duration::from_secs(60)).await;
    let srcdir = TempDir::new().unwrap();
    let pdf = write_pdf(&srcdir, "src.pdf");

    let source = harness.fixture.add_source("Portal").await;
    let export = harness
        .fixture
        .add_filesystem_export("archive", "/tmp/out", "{year}/{invoice_id}.pdf")
        .await;
    harness.fixture.map(source, export, 1).await;
    harness.runner.slow(
        "Portal",
        Duration::from_millis(300),
        vec![sample_invoice("INV-1", "2025-03-15", 42.0, &pdf)],
    );

    let job_id = harness.fixture.insert_job(None).await;

    // Cancel while the source is still running.
    let store = harness.fixture.store.clone();
    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        store.cancel_job(job_id).await.unwrap();
    });

    harness
        .coordinator
        .handle_job_started(harness.event(job_id, None))
        .await
        .unwrap();
    canceller.await.unwrap();

    assert_eq!(
        harness.fixture.store.job_status(job_id).await.unwrap(),
        Some(JobStatus::Cancelled)
    );
    // The export safe-point check aborted before any handler ran.
    assert!(harness
        .fixture
        .store
        .export_history_for_job(job_id)
        .await
        .unwrap()
        .is_empty());

    let failed: Vec<JobFailedEvent> = harness.bus.published_on("job.failed");
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].error_message, "Cancelled");
}

#[tokio::test]
async fn cancelled_before_claim_is_acked_silently() {
    let harness = Harness::new(Duration::from_secs(60)).await;
    let source = harness.fixture.add_source("Portal").await;
    let export = harness
        .fixture
        .add_filesystem_export("archive", "/tmp/out", "{year}/{invoice_id}.pdf")
        .await;
    harness.fixture.map(source, export, 1).await;

    let job_id = harness.fixture.insert_job(None).await;
    harness.fixture.store.cancel_job(job_id).await.unwrap();

    harness
        .coordinator
        .handle_job_started(harness.event(job_id, None))
        .await
        .unwrap();

    // Never claimed, nothing ran, nothing published.
    assert_eq!(harness.runner.run_count("Portal"), 0);
    assert_eq!(harness.bus.publish_count(), 0);
}

#[tokio::test]
async fn foreign_tenant_automation_fails_as_not_found() {
    let harness = Harness::new(Duration::from_secs(60)).await;
    let source = harness.fixture.add_source("Portal").await;
    let export = harness
        .fixture
        .add_filesystem_export("archive", "/tmp/out", "{year}/{invoice_id}.pdf")
        .await;
    harness.fixture.map(source, export, 1).await;

    let job_id = harness.fixture.insert_job(None).await;
    let mut event = harness.event(job_id, None);
    event.user_id += 1;

    harness.coordinator.handle_job_started(event).await.unwrap();

    let job = harness.fixture.store.job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_message.as_deref(), Some("AutomationNotFound"));
}

#[tokio::test]
async fn unparseable_from_date_fails_the_job() {
    let harness = Harness::new(Duration::from_secs(60)).await;
    let source = harness.fixture.add_source("Portal").await;
    let export = harness
        .fixture
        .add_filesystem_export("archive", "/tmp/out", "{year}/{invoice_id}.pdf")
        .await;
    harness.fixture.map(source, export, 1).await;

    let job_id = harness.fixture.insert_job(None).await;
    harness
        .coordinator
        .handle_job_started(harness.event(job_id, Some("not-a-date")))
        .await
        .unwrap();

    let job = harness.fixture.store.job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error_message.unwrap().contains("invalid from_date"));
    // Terminal event still 1:1 with the terminal status.
    let failed: Vec<JobFailedEvent> = harness.bus.published_on("job.failed");
    assert_eq!(failed.len(), 1);
}

#[tokio::test]
async fn replayed_job_is_idempotent_at_the_sink() {
    // Same invoice delivered through two separate jobs: the second attempt
    // must observe the first one's effect and record duplicate_skipped.
    let harness = Harness::new(Duration::from_secs(60)).await;
    let out = TempDir::new().unwrap();
    let srcdir = TempDir::new().unwrap();
    let pdf = write_pdf(&srcdir, "src.pdf");

    let source = harness.fixture.add_source("Portal").await;
    let export = harness
        .fixture
        .add_filesystem_export(
            "archive",
            &out.path().display().to_string(),
            "{year}/{invoice_id}.pdf",
        )
        .await;
    harness.fixture.map(source, export, 1).await;
    harness
        .runner
        .returns("Portal", vec![sample_invoice("INV-1", "2025-03-15", 42.0, &pdf)]);

    let first = harness.fixture.insert_job(None).await;
    harness
        .coordinator
        .handle_job_started(harness.event(first, None))
        .await
        .unwrap();
    let second = harness.fixture.insert_job(None).await;
    harness
        .coordinator
        .handle_job_started(harness.event(second, None))
        .await
        .unwrap();

    let first_rows = harness.fixture.store.export_history_for_job(first).await.unwrap();
    let second_rows = harness.fixture.store.export_history_for_job(second).await.unwrap();
    assert_eq!(first_rows[0].status, ExportStatus::Success);
    assert_eq!(second_rows[0].status, ExportStatus::DuplicateSkipped);
    assert_eq!(
        harness.fixture.store.job_status(second).await.unwrap(),
        Some(JobStatus::Completed)
    );
}

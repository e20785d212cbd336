//! Long-running coordinator worker.
//!
//! Reads its wiring from flags or the environment, consumes `job.started`
//! until it receives SIGTERM (or Ctrl-C), finishes the message in flight,
//! and exits 0.
//!
//! Usage:
//!     invoiceflow-coordinator --database sqlite:invoiceflow.db \
//!         --nats nats://127.0.0.1:4222

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use invoiceflow_bus::{JetStreamBus, ShutdownToken};
use invoiceflow_coordinator::{Coordinator, CoordinatorConfig};
use invoiceflow_exports::ExportRegistry;
use invoiceflow_protocol::defaults;
use invoiceflow_sources::SourceRegistry;
use invoiceflow_store::Store;

#[derive(Parser, Debug)]
#[command(name = "invoiceflow-coordinator", about = "Job coordinator for invoiceflow")]
struct Args {
    /// Database connection string
    #[arg(long, env = "DATABASE_URL", default_value = defaults::DEFAULT_DATABASE_URL)]
    database: String,

    /// Message-bus servers (comma-separated URLs)
    #[arg(long, env = "NATS_SERVERS", default_value = defaults::DEFAULT_NATS_SERVERS)]
    nats: String,

    /// Per-job deadline in seconds
    #[arg(long, env = "JOB_DEADLINE_SECS", default_value_t = defaults::JOB_DEADLINE.as_secs())]
    deadline_secs: u64,

    /// Concurrent source executions per job
    #[arg(long, default_value_t = defaults::SOURCE_FANOUT)]
    source_fanout: usize,

    /// Redelivery bound for the durable consumer
    #[arg(long, default_value_t = defaults::MAX_DELIVER)]
    max_deliver: i64,

    /// Mirror the full log filter to stderr
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    invoiceflow_logging::init_logging(invoiceflow_logging::LogConfig {
        app_name: "invoiceflow-coordinator",
        verbose: args.verbose,
    })?;

    info!("starting invoiceflow coordinator");
    info!("  database: {}", args.database);
    info!("  bus: {}", args.nats);

    let store = Store::connect(&args.database)
        .await
        .context("failed to open database")?;
    let bus = JetStreamBus::connect(&args.nats, args.max_deliver)
        .await
        .context("failed to connect to message bus")?;

    // Acquisition adapters and sink API clients register here; deployments
    // without them still run (their sources/exports report as failed).
    let sources = Arc::new(SourceRegistry::new());
    let exports = Arc::new(ExportRegistry::new());

    let coordinator = Arc::new(Coordinator::new(
        store,
        Arc::new(bus),
        sources,
        exports,
        CoordinatorConfig {
            deadline: std::time::Duration::from_secs(args.deadline_secs),
            source_fanout: args.source_fanout,
        },
    ));

    let shutdown = ShutdownToken::new();
    let mut runner = tokio::spawn({
        let coordinator = Arc::clone(&coordinator);
        let shutdown = shutdown.clone();
        async move { coordinator.run(shutdown).await }
    });

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("failed to install SIGTERM handler")?;
    tokio::select! {
        result = &mut runner => {
            return result.context("coordinator task panicked")?;
        }
        _ = sigterm.recv() => info!("SIGTERM received, draining"),
        _ = tokio::signal::ctrl_c() => info!("interrupt received, draining"),
    }

    shutdown.stop();
    runner.await.context("coordinator task panicked")??;
    info!("coordinator stopped");
    Ok(())
}

//! Shared logging setup for invoiceflow binaries.
//!
//! Two outputs: a per-binary log file under the application home, and
//! stderr. The file is append-only for the lifetime of the process; if a
//! previous run left it oversized, it is parked as `<name>.log.old` at
//! startup so disk use stays bounded at two generations.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "invoiceflow_coordinator=info,invoiceflow_bus=info,invoiceflow_store=info,invoiceflow_exports=info,invoiceflow_sources=info";

/// Past this size the previous run's file is parked instead of appended to.
const PARK_THRESHOLD_BYTES: u64 = 20 * 1024 * 1024;

/// Logging configuration shared by invoiceflow binaries.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbose: bool,
}

/// Initialize tracing: full filter to the log file, warnings (or the full
/// filter, with `verbose`) to stderr.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let logs = ensure_logs_dir()?;
    let file = open_log_file(&logs, config.app_name)
        .with_context(|| format!("Failed to open log file for {}", config.app_name))?;

    let file_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let console_filter = if config.verbose {
        file_filter.clone()
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Arc::new(file))
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .init();

    Ok(())
}

/// Application home directory: `~/.invoiceflow`, or `INVOICEFLOW_HOME`.
/// Falls back to the working directory when no home can be resolved
/// (containers often run without one).
pub fn invoiceflow_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("INVOICEFLOW_HOME") {
        return PathBuf::from(override_path);
    }
    match dirs::home_dir() {
        Some(home) => home.join(".invoiceflow"),
        None => PathBuf::from(".invoiceflow"),
    }
}

pub fn logs_dir() -> PathBuf {
    invoiceflow_home().join("logs")
}

pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir();
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

/// Open `<dir>/<app>.log` for appending, parking an oversized leftover from
/// an earlier run as `<app>.log.old` first (clobbering the one before it).
fn open_log_file(dir: &Path, app_name: &str) -> std::io::Result<File> {
    let name: String = app_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect();
    let path = dir.join(format!("{name}.log"));

    if let Ok(meta) = fs::metadata(&path) {
        if meta.len() > PARK_THRESHOLD_BYTES {
            fs::rename(&path, dir.join(format!("{name}.log.old")))?;
        }
    }

    OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn appends_to_small_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("coordinator.log"), b"earlier run\n").unwrap();

        let mut file = open_log_file(dir.path(), "coordinator").unwrap();
        file.write_all(b"this run\n").unwrap();

        let content = fs::read_to_string(dir.path().join("coordinator.log")).unwrap();
        assert_eq!(content, "earlier run\nthis run\n");
        assert!(!dir.path().join("coordinator.log.old").exists());
    }

    #[test]
    fn parks_oversized_file_at_startup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coordinator.log");
        let big = vec![b'x'; (PARK_THRESHOLD_BYTES + 1) as usize];
        fs::write(&path, &big).unwrap();

        let mut file = open_log_file(dir.path(), "coordinator").unwrap();
        file.write_all(b"fresh\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "fresh\n");
        assert_eq!(
            fs::metadata(dir.path().join("coordinator.log.old")).unwrap().len(),
            big.len() as u64
        );
    }

    #[test]
    fn odd_app_names_map_to_safe_filenames() {
        let dir = tempfile::tempdir().unwrap();
        open_log_file(dir.path(), "job worker/1").unwrap();
        assert!(dir.path().join("job-worker-1.log").exists());
    }
}

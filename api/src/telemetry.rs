use std::path::Path;

use chrono::{DateTime, Local};
use thiserror::Error;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "gems_api=info,gems_mcp_runtime=info,tower_http=info";
const LOG_FILE_PREFIX: &str = "gems_api";

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("cannot create log directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot open log file: {0}")]
    Appender(#[from] InitError),
}

/// One file per process start, e.g. `gems_api_20250101_120000.log`.
pub fn log_file_stem(started_at: DateTime<Local>) -> String {
    format!("{LOG_FILE_PREFIX}_{}", started_at.format("%Y%m%d_%H%M%S"))
}

fn open_log_file(dir: &Path) -> Result<(NonBlocking, WorkerGuard), TelemetryError> {
    std::fs::create_dir_all(dir)?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(log_file_stem(Local::now()))
        .filename_suffix("log")
        .build(dir)?;
    Ok(tracing_appender::non_blocking(appender))
}

/// Structured JSON logs on stdout, mirrored to a log file when `log_dir` is set.
///
/// The returned guard flushes the file writer on drop; keep it alive for the
/// lifetime of the process.
pub fn init(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let (file_writer, guard, file_error) = match log_dir.map(open_log_file).transpose() {
        Ok(Some((writer, guard))) => (Some(writer), Some(guard), None),
        Ok(None) => (None, None, None),
        Err(err) => (None, None, Some(err)),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()))
        .with(fmt::layer().json())
        .with(file_writer.map(|writer| fmt::layer().json().with_writer(writer)))
        .init();

    if let Some(err) = file_error {
        tracing::warn!(
            event = "log_file_disabled",
            error = %err,
            "Logging to stdout only"
        );
    }
    guard
}

#[cfg(test)]
mod tests {
    use chrono::{Local, TimeZone};

    use super::*;

    #[test]
    fn log_file_stem_uses_start_timestamp() {
        let started_at = Local
            .with_ymd_and_hms(2025, 3, 9, 7, 5, 1)
            .single()
            .expect("unambiguous local time");
        assert_eq!(log_file_stem(started_at), "gems_api_20250309_070501");
    }
}

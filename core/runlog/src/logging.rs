//! Tracing setup for the runlog binary.
//!
//! Diagnostics go to a daily-rolling file under `<root>/debug/` and never to
//! the terminal, which belongs to the wrapped command.

use std::env;

use runlog_core::StorageConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;

const DEBUG_ENV: &str = "RUNLOG_DEBUG_LOG";
const MAX_LOG_FILES: usize = 7;

/// Installs the global subscriber. The returned guard flushes pending events
/// on drop, so hold it for the life of `main`.
///
/// Returns `None` when the debug directory can't be used; runlog then runs
/// without diagnostics.
pub fn init(storage: &StorageConfig) -> Option<WorkerGuard> {
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("runlog")
        .filename_suffix("log")
        .max_log_files(MAX_LOG_FILES)
        .build(storage.debug_dir())
        .ok()?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .ok()?;
    Some(guard)
}

fn filter() -> EnvFilter {
    if debug_enabled(env::var(DEBUG_ENV).ok().as_deref()) {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    }
}

fn debug_enabled(value: Option<&str>) -> bool {
    matches!(value, Some("1" | "true" | "TRUE" | "yes" | "YES"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_flag_values() {
        assert!(debug_enabled(Some("1")));
        assert!(debug_enabled(Some("yes")));
        assert!(!debug_enabled(Some("0")));
        assert!(!debug_enabled(None));
    }
}

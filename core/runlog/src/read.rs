//! Read-side commands: `tail`, `errors`, `triage`, `sessions`, `sweep`.
//!
//! Each returns the text to print so it can be tested without a terminal.

use std::fmt::Write as _;

use runlog_core::retention::{self, RetentionPolicy};
use runlog_core::triage::{NO_ERRORS_MESSAGE, NO_LOGS_MESSAGE};
use runlog_core::{
    filter_errors, triage, ErrorScan, LogStore, RecentLogs, RetentionConfig, Result,
    SessionRegistry, StorageConfig,
};

pub const DEFAULT_LINES: usize = 200;
pub const DEFAULT_FILES: usize = 5;
pub const DEFAULT_SESSIONS: usize = 20;

fn recent_text(storage: &StorageConfig, lines: usize, files: usize) -> Option<String> {
    LogStore::new(storage.clone()).read_recent(lines, files).text()
}

pub fn tail(storage: &StorageConfig, lines: usize, files: usize) -> String {
    match LogStore::new(storage.clone()).read_recent(lines, files) {
        RecentLogs::Empty => format!("{NO_LOGS_MESSAGE}\n"),
        RecentLogs::Found { lines, .. } => {
            let mut out = lines.join("\n");
            out.push('\n');
            out
        }
    }
}

pub fn errors(storage: &StorageConfig, lines: usize, files: usize) -> String {
    match filter_errors(recent_text(storage, lines, files).as_deref()) {
        ErrorScan::NoLogs => format!("{NO_LOGS_MESSAGE}\n"),
        ErrorScan::Clean => format!("{NO_ERRORS_MESSAGE}\n"),
        ErrorScan::Lines(found) => {
            let mut out = found.join("\n");
            out.push('\n');
            out
        }
    }
}

pub fn triage_report(storage: &StorageConfig, lines: usize, files: usize) -> String {
    triage(recent_text(storage, lines, files).as_deref()).render()
}

/// Recent sessions from the ledger, newest first, with their current status.
pub fn sessions(storage: &StorageConfig, n: usize) -> String {
    let registry = SessionRegistry::new(storage.clone());
    let entries = registry.list_entries(n);
    if entries.is_empty() {
        return "No sessions recorded.\n".to_string();
    }

    let active = registry.active_sessions();
    let mut out = String::new();
    for entry in entries {
        let status = if active.contains(&entry.session_id) {
            "running"
        } else if storage.session_log(&entry.session_id).exists() {
            "logged"
        } else {
            "expired"
        };
        let _ = writeln!(
            out,
            "{}  {:<7}  {}  {}",
            entry.session_id, status, entry.cwd, entry.command
        );
    }
    out
}

pub fn sweep(storage: &StorageConfig) -> Result<String> {
    storage.ensure_root()?;
    let policy = RetentionPolicy::from_config(&RetentionConfig::load(storage));
    let stats = retention::sweep(storage, &policy);

    let mut out = format!(
        "Sweep complete: {} orphaned session(s) closed, {} log(s) deleted\n",
        stats.orphaned_sessions, stats.logs_deleted
    );
    for error in &stats.errors {
        let _ = writeln!(out, "warning: {error}");
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::tempdir;

    fn storage() -> (tempfile::TempDir, StorageConfig) {
        let temp = tempdir().unwrap();
        let storage = StorageConfig::with_root(temp.path().to_path_buf());
        (temp, storage)
    }

    fn write_log(storage: &StorageConfig, id: &str, body: &str) {
        std::fs::write(storage.session_log(id), body).unwrap();
    }

    #[test]
    fn test_empty_store_messages() {
        let (_temp, storage) = storage();
        assert_eq!(tail(&storage, 200, 5), format!("{NO_LOGS_MESSAGE}\n"));
        assert_eq!(errors(&storage, 200, 5), format!("{NO_LOGS_MESSAGE}\n"));
        assert_eq!(triage_report(&storage, 200, 5), format!("{NO_LOGS_MESSAGE}\n"));
        assert_eq!(sessions(&storage, 5), "No sessions recorded.\n");
    }

    #[test]
    fn test_tail_and_errors() {
        let (_temp, storage) = storage();
        write_log(&storage, "20261017-090000-00000001", "building\nError: missing file\n");

        let tailed = tail(&storage, 200, 5);
        assert!(tailed.starts_with("===== session 20261017-090000-00000001"));
        assert!(tailed.contains("building\n"));

        assert_eq!(errors(&storage, 200, 5), "Error: missing file\n");
        assert!(triage_report(&storage, 200, 5).contains("1. [Error] Error: missing file"));
    }

    #[test]
    fn test_one_line_budget_still_scans_last_line() {
        let (_temp, storage) = storage();
        write_log(&storage, "20261017-090000-00000001", "building\nError: missing file\n");
        assert_eq!(errors(&storage, 1, 5), "Error: missing file\n");
        assert_eq!(tail(&storage, 1, 5), "Error: missing file\n");
    }

    #[test]
    fn test_errors_clean_log() {
        let (_temp, storage) = storage();
        write_log(&storage, "a", "all good\n");
        assert_eq!(errors(&storage, 200, 5), format!("{NO_ERRORS_MESSAGE}\n"));
    }

    #[test]
    fn test_sessions_status() {
        let (_temp, storage) = storage();
        let registry = SessionRegistry::new(storage.clone());
        registry.register("old", "make", &[], Path::new("/p")).unwrap();
        registry
            .register("new", "make", &["test".to_string()], Path::new("/p"))
            .unwrap();
        registry.mark_active("new", Path::new("/p")).unwrap();
        write_log(&storage, "new", "x\n");

        let out = sessions(&storage, 10);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("new  running"));
        assert!(lines[0].ends_with("make test"));
        assert!(lines[1].starts_with("old  expired"));
    }

    #[test]
    fn test_sweep_reports_counts() {
        let (_temp, storage) = storage();
        let out = sweep(&storage).unwrap();
        assert!(out.starts_with("Sweep complete: 0 orphaned session(s) closed, 0 log(s) deleted"));
    }
}

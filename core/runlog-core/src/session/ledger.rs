//! Append-only session ledger (`master-index.log`).
//!
//! One line per session, never rewritten:
//!
//! ```text
//! [2026-10-17T09:12:03.114Z] [20261017-091203-5f0c2a91] [/home/me/app] npm run build
//! ```
//!
//! Each entry goes out as a single `write_all` on a file opened with `O_APPEND`,
//! so concurrent wrappers never need to read the ledger back before writing.
//! Lines that don't parse are skipped on read.

use std::collections::HashSet;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use fs_err::OpenOptions;

use super::types::LedgerEntry;
use crate::error::{Result, RunlogError};
use crate::patterns::RE_LEDGER_LINE;

pub fn format_line(at: DateTime<Utc>, session_id: &str, cwd: &str, command: &str) -> String {
    format!(
        "[{}] [{}] [{}] {}\n",
        at.to_rfc3339_opts(SecondsFormat::Millis, true),
        session_id,
        single_line(cwd),
        single_line(command)
    )
}

fn single_line(text: &str) -> String {
    text.replace(['\n', '\r'], " ")
}

pub fn parse_line(line: &str) -> Option<LedgerEntry> {
    let caps = RE_LEDGER_LINE.captures(line.trim_end())?;
    Some(LedgerEntry {
        timestamp: caps[1].to_string(),
        session_id: caps[2].to_string(),
        cwd: caps[3].to_string(),
        command: caps[4].to_string(),
    })
}

pub fn append(path: &Path, line: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| RunlogError::io("opening ledger", e))?;
    file.write_all(line.as_bytes())
        .map_err(|e| RunlogError::io("appending to ledger", e))
}

/// All parseable entries in file order. A missing or unreadable ledger is empty.
pub fn read_entries(path: &Path) -> Vec<LedgerEntry> {
    let content = match fs_err::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => return Vec::new(),
    };
    content.lines().filter_map(parse_line).collect()
}

/// The `n` most recent entries, newest first, one per session id.
pub fn recent_entries(path: &Path, n: usize) -> Vec<LedgerEntry> {
    let mut seen = HashSet::new();
    read_entries(path)
        .into_iter()
        .rev()
        .filter(|entry| seen.insert(entry.session_id.clone()))
        .take(n)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    #[test]
    fn test_format_and_parse() {
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let line = format_line(at, "id-1", "/my project", "cargo test --all");
        assert_eq!(
            line,
            "[2026-01-02T03:04:05.000Z] [id-1] [/my project] cargo test --all\n"
        );
        let entry = parse_line(&line).unwrap();
        assert_eq!(entry.session_id, "id-1");
        assert_eq!(entry.cwd, "/my project");
        assert_eq!(entry.command, "cargo test --all");
    }

    #[test]
    fn test_multiline_command_is_flattened() {
        let at = Utc::now();
        let line = format_line(at, "id-1", "/p", "sh -c 'a\nb'");
        assert_eq!(line.matches('\n').count(), 1);
        assert_eq!(parse_line(&line).unwrap().command, "sh -c 'a b'");
    }

    #[test]
    fn test_recent_entries_newest_first_and_skips_garbage() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("master-index.log");
        let at = Utc::now();
        append(&path, &format_line(at, "a", "/p", "one")).unwrap();
        append(&path, "not a ledger line\n").unwrap();
        append(&path, &format_line(at, "b", "/p", "two")).unwrap();
        append(&path, &format_line(at, "c", "/p", "three")).unwrap();

        let ids: Vec<_> = recent_entries(&path, 2)
            .into_iter()
            .map(|e| e.session_id)
            .collect();
        assert_eq!(ids, vec!["c", "b"]);
    }

    #[test]
    fn test_recent_entries_deduplicates_ids() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("master-index.log");
        let at = Utc::now();
        append(&path, &format_line(at, "a", "/p", "one")).unwrap();
        append(&path, &format_line(at, "a", "/p", "one again")).unwrap();
        assert_eq!(recent_entries(&path, 10).len(), 1);
    }

    #[test]
    fn test_missing_ledger_is_empty() {
        let temp = tempdir().unwrap();
        assert!(read_entries(&temp.path().join("nope.log")).is_empty());
    }

    #[test]
    fn test_binary_garbage_is_tolerated() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("master-index.log");
        std::fs::write(&path, [0xff, 0xfe, b'\n', 0x00]).unwrap();
        assert!(read_entries(&path).is_empty());
    }
}

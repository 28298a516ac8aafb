//! Per-session log files.
//!
//! # File Format
//!
//! ```text
//! [2026-10-17T09:12:03.114Z] ========================================
//! [2026-10-17T09:12:03.114Z] Session: 20261017-091203-5f0c2a91
//! [2026-10-17T09:12:03.114Z] Project: /home/me/app
//! [2026-10-17T09:12:03.114Z] Command: npm run build
//! ...sanitized output lines, stdout and stderr interleaved...
//! [2026-10-17T09:12:09.870Z] Process exited with code: 0
//! ```
//!
//! A log is written only by the wrapper that created it, until completion.
//! Readers ([`LogStore::read_recent`]) may see a log mid-write.

use std::fs::File;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{SecondsFormat, Utc};
use tracing::{debug, warn};

use crate::error::{Result, RunlogError};
use crate::session::id::generate_id;
use crate::storage::{session_id_from_path, StorageConfig};

const MAX_ID_ATTEMPTS: u32 = 16;
const HEADER_RULE: &str = "========================================";

/// Prefix for a footer recording the child's exit code.
pub const EXIT_FOOTER: &str = "Process exited with code:";
pub const ERROR_FOOTER: &str = "Process error:";
pub const ORPHAN_FOOTER: &str = "Session orphaned:";

pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn marker_line(text: &str) -> String {
    format!("[{}] {}\n", timestamp(), text)
}

/// One session log on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFile {
    pub session_id: String,
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// Result of reading recent output across sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecentLogs {
    /// No session logs (and no legacy log) with any content.
    Empty,
    Found {
        lines: Vec<String>,
        /// Files that contributed, most recent first.
        files: Vec<PathBuf>,
    },
}

impl RecentLogs {
    pub fn text(&self) -> Option<String> {
        match self {
            RecentLogs::Empty => None,
            RecentLogs::Found { lines, .. } => Some(lines.join("\n")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogStore {
    storage: StorageConfig,
}

impl LogStore {
    pub fn new(storage: StorageConfig) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &StorageConfig {
        &self.storage
    }

    /// Allocates a fresh session id and creates its log file.
    ///
    /// The file is opened with create-new semantics, so an id whose log already
    /// exists is never reused; a fresh id is drawn instead.
    pub fn create_session_log(&self) -> Result<(String, SessionLogWriter)> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = generate_id();
            let path = self.storage.session_log(&id);
            match File::options().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((id, SessionLogWriter::new(path, file))),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!(session = %id, "Session id collision, retrying");
                }
                Err(e) => return Err(RunlogError::io(format!("creating {}", path.display()), e)),
            }
        }
        Err(RunlogError::IdExhausted {
            attempts: MAX_ID_ATTEMPTS,
        })
    }

    /// Session logs, most recently modified first.
    pub fn list_session_files(&self, limit: Option<usize>) -> Vec<SessionFile> {
        let Ok(entries) = fs_err::read_dir(self.storage.root()) else {
            return Vec::new();
        };

        let mut files: Vec<SessionFile> = entries
            .flatten()
            .filter_map(|entry| {
                let path = entry.path();
                let session_id = session_id_from_path(&path)?.to_string();
                let metadata = entry.metadata().ok()?;
                if !metadata.is_file() {
                    return None;
                }
                Some(SessionFile {
                    session_id,
                    modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                    path,
                })
            })
            .collect();

        // Ids sort by creation time, which breaks mtime ties deterministically.
        files.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| b.session_id.cmp(&a.session_id))
        });
        if let Some(limit) = limit {
            files.truncate(limit);
        }
        files
    }

    /// Collects up to `total_lines` lines from the end of the `max_files` most
    /// recent session logs, newest session first.
    ///
    /// Each file's section starts with a separator line, which counts toward
    /// `total_lines`; a budget of one line gets the newest content line alone,
    /// without a separator. Falls back to the legacy combined log when there are no
    /// per-session logs at all.
    pub fn read_recent(&self, total_lines: usize, max_files: usize) -> RecentLogs {
        if total_lines == 0 || max_files == 0 {
            return RecentLogs::Empty;
        }

        let files = self.list_session_files(Some(max_files));
        if files.is_empty() {
            return self.read_legacy(total_lines);
        }

        let mut lines = Vec::new();
        let mut sources = Vec::new();
        let mut remaining = total_lines;

        for file in files {
            if remaining == 0 {
                break;
            }
            // With room for a single line, the newest session's last line beats a bare separator.
            let with_separator = remaining >= 2;
            if !with_separator && !sources.is_empty() {
                break;
            }
            let content = match read_lossy(&file.path) {
                Some(content) if !content.trim().is_empty() => content,
                _ => continue,
            };
            let file_lines: Vec<&str> = content.lines().collect();
            let budget = if with_separator { remaining - 1 } else { remaining };
            let take = file_lines.len().min(budget);

            if with_separator {
                lines.push(separator(&file));
                remaining -= 1;
            }
            lines.extend(
                file_lines[file_lines.len() - take..]
                    .iter()
                    .map(|l| l.to_string()),
            );
            remaining -= take;
            sources.push(file.path);
        }

        if sources.is_empty() {
            return RecentLogs::Empty;
        }
        RecentLogs::Found {
            lines,
            files: sources,
        }
    }

    fn read_legacy(&self, total_lines: usize) -> RecentLogs {
        let path = self.storage.legacy_log_file();
        let Some(content) = read_lossy(&path) else {
            return RecentLogs::Empty;
        };
        let all: Vec<&str> = content.lines().collect();
        if all.iter().all(|l| l.trim().is_empty()) {
            return RecentLogs::Empty;
        }
        let start = all.len().saturating_sub(total_lines);
        RecentLogs::Found {
            lines: all[start..].iter().map(|l| l.to_string()).collect(),
            files: vec![path],
        }
    }
}

fn separator(file: &SessionFile) -> String {
    let modified: chrono::DateTime<Utc> = file.modified.into();
    format!(
        "===== session {} (last write {}) =====",
        file.session_id,
        modified.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

fn read_lossy(path: &Path) -> Option<String> {
    fs_err::read(path)
        .ok()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

/// Appends a marker line to an existing log that nobody is writing anymore.
pub fn append_marker(path: &Path, text: &str) -> Result<()> {
    let mut file = fs_err::OpenOptions::new()
        .append(true)
        .open(path)
        .map_err(|e| RunlogError::io("opening session log", e))?;
    file.write_all(marker_line(text).as_bytes())
        .map_err(|e| RunlogError::io("appending to session log", e))
}

/// Writer for the log of the session currently running in this process.
///
/// Writes are best-effort. The first failure prints one warning to stderr and
/// every later write for the session is dropped, so a broken disk can't stall
/// the command.
#[derive(Debug)]
pub struct SessionLogWriter {
    path: PathBuf,
    out: Option<BufWriter<File>>,
    failed: bool,
}

impl SessionLogWriter {
    fn new(path: PathBuf, file: File) -> Self {
        Self {
            path,
            out: Some(BufWriter::new(file)),
            failed: false,
        }
    }

    /// A writer that drops everything, used when no log file could be created.
    pub fn disabled(path: PathBuf) -> Self {
        Self {
            path,
            out: None,
            failed: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_degraded(&self) -> bool {
        self.failed
    }

    pub fn write_header(&mut self, session_id: &str, project_dir: &str, command: &str) {
        self.write_raw(&marker_line(HEADER_RULE));
        self.write_raw(&marker_line(&format!("Session: {session_id}")));
        self.write_raw(&marker_line(&format!("Project: {project_dir}")));
        self.write_raw(&marker_line(&format!("Command: {command}")));
        self.flush();
    }

    pub fn write_line(&mut self, line: &str) {
        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');
        self.write_raw(&buf);
    }

    pub fn write_exit_footer(&mut self, code: i32) {
        self.write_raw(&marker_line(&format!("{EXIT_FOOTER} {code}")));
    }

    pub fn write_error_footer(&mut self, reason: &str) {
        self.write_raw(&marker_line(&format!("{ERROR_FOOTER} {reason}")));
    }

    pub fn flush(&mut self) {
        if let Some(out) = self.out.as_mut() {
            if let Err(e) = out.flush() {
                self.degrade(&e);
            }
        }
    }

    /// Flushes and closes the file.
    pub fn close(mut self) {
        self.flush();
        self.out = None;
    }

    fn write_raw(&mut self, text: &str) {
        let Some(out) = self.out.as_mut() else {
            return;
        };
        if let Err(e) = out.write_all(text.as_bytes()) {
            self.degrade(&e);
        }
    }

    fn degrade(&mut self, err: &std::io::Error) {
        self.out = None;
        if !self.failed {
            self.failed = true;
            warn!(error = %err, path = %self.path.display(), "Session log write failed; logging disabled for this session");
            eprintln!(
                "runlog: warning: could not write {} ({}); output is no longer being logged",
                self.path.display(),
                err
            );
        }
    }
}

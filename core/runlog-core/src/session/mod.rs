//! Session bookkeeping.
//!
//! Two files are shared by every wrapper process:
//!
//! - the ledger (`master-index.log`): append-only audit trail, one line per
//!   session ever started;
//! - the active set (`active-sessions.json`): small mutable map of sessions
//!   that are still running.
//!
//! # Module Structure
//!
//! - [`id`]: time-ordered session ids
//! - [`ledger`]: append/parse the ledger
//! - [`active`]: locked read-modify-write of the active set
//! - [`lock`]: `mkdir`-based writer lock and PID liveness
//! - [`types`]: `Session`, `LedgerEntry`, `ActiveSession`
//!
//! Nothing here may stop a command from running. Callers log and swallow
//! every error these methods return.

pub mod active;
pub mod id;
pub mod ledger;
pub mod lock;
pub mod types;

use std::io::ErrorKind;
use std::path::Path;

use chrono::Utc;
use tracing::debug;

use crate::error::{Result, RunlogError};
use crate::redact::redact;
use crate::storage::StorageConfig;

pub use active::ActiveStore;
pub use id::generate_id;
pub use types::{command_line, ActiveSession, CompletionState, LedgerEntry, Session};

#[derive(Debug, Clone)]
pub struct SessionRegistry {
    storage: StorageConfig,
}

impl SessionRegistry {
    pub fn new(storage: StorageConfig) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &StorageConfig {
        &self.storage
    }

    /// Appends the session's ledger line. The command text is redacted first,
    /// since the ledger is persisted just like the log.
    pub fn register(&self, id: &str, program: &str, args: &[String], cwd: &Path) -> Result<()> {
        let command = redact(&command_line(program, args));
        let line = ledger::format_line(Utc::now(), id, &cwd.display().to_string(), &command);
        ledger::append(&self.storage.ledger_file(), &line)
    }

    pub fn mark_active(&self, id: &str, cwd: &Path) -> Result<()> {
        let entry = ActiveSession {
            project_dir: cwd.display().to_string(),
            start_time: Utc::now(),
            pid: Some(std::process::id()),
        };
        active::update(&self.storage, |store| store.insert(id, entry))
    }

    /// Removes `id` from the active set. Unless `archive` is set, the session's
    /// log is deleted right away instead of waiting for a retention sweep.
    pub fn mark_completed(&self, id: &str, archive: bool) -> Result<()> {
        let removed = active::update(&self.storage, |store| store.remove(id));
        if let Ok(None) = removed {
            debug!(session = %id, "Session was not in the active set");
        }

        if !archive {
            let log = self.storage.session_log(id);
            match fs_err::remove_file(&log) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(RunlogError::io("deleting session log", e)),
            }
        }

        removed.map(|_| ())
    }

    /// Ids of the `n` most recently registered sessions, newest first.
    pub fn list_recent(&self, n: usize) -> Vec<String> {
        self.list_entries(n)
            .into_iter()
            .map(|entry| entry.session_id)
            .collect()
    }

    /// Full ledger entries of the `n` most recent sessions, newest first.
    pub fn list_entries(&self, n: usize) -> Vec<LedgerEntry> {
        ledger::recent_entries(&self.storage.ledger_file(), n)
    }

    pub fn active_sessions(&self) -> ActiveStore {
        active::snapshot(&self.storage)
    }
}

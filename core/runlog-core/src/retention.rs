//! Retention policy and the opportunistic sweep.
//!
//! There is no background cleaner. Every `runlog run` sweeps once before it
//! starts its own session:
//!
//! 1. Active entries that are orphaned (owner PID gone, or no PID recorded and
//!    older than the staleness threshold) are force-completed: removed from the
//!    active set, with an orphan footer appended to their log.
//! 2. Logs of sessions that are not active are deleted once older than the
//!    keep-duration.
//!
//! [`RetentionPolicy`] holds the decisions as pure functions of age and state;
//! [`sweep`] does the I/O.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::config::RetentionConfig;
use crate::logs::{append_marker, LogStore, ORPHAN_FOOTER};
use crate::session::lock::is_pid_alive;
use crate::session::{active, CompletionState};
use crate::storage::StorageConfig;

/// A log touched this recently may belong to a wrapper that has created its
/// file but not yet registered as active, so sweeps leave it alone.
const FRESH_LOG_GRACE_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFate {
    Keep,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    keep: Duration,
    stale_after: Duration,
}

impl RetentionPolicy {
    pub fn new(keep: Duration, stale_after: Duration) -> Self {
        Self { keep, stale_after }
    }

    pub fn from_config(config: &RetentionConfig) -> Self {
        Self::new(config.keep_duration(), config.stale_after())
    }

    /// Decides whether a session's log survives a sweep.
    pub fn fate(&self, age: Duration, state: CompletionState) -> LogFate {
        if !state.is_finished() {
            return LogFate::Keep;
        }
        if self.keep <= Duration::zero() || age > self.keep {
            LogFate::Delete
        } else {
            LogFate::Keep
        }
    }

    /// `owner_alive` is `None` when the owner is unknown (older files carry no PID).
    ///
    /// A live owner is never orphaned, however long its command runs; the age
    /// threshold only applies when liveness can't be checked.
    pub fn is_orphaned(&self, age: Duration, owner_alive: Option<bool>) -> bool {
        match owner_alive {
            Some(alive) => !alive,
            None => age > self.stale_after,
        }
    }
}

/// Counts from one sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepStats {
    pub orphaned_sessions: u32,
    pub logs_deleted: u32,
    pub errors: Vec<String>,
}

pub fn sweep(storage: &StorageConfig, policy: &RetentionPolicy) -> SweepStats {
    sweep_at(storage, policy, Utc::now())
}

pub fn sweep_at(storage: &StorageConfig, policy: &RetentionPolicy, now: DateTime<Utc>) -> SweepStats {
    let mut stats = SweepStats::default();

    let orphaned = active::update(storage, |store| {
        let orphans: Vec<String> = store
            .iter()
            .filter(|(_, entry)| {
                let age = now.signed_duration_since(entry.start_time);
                policy.is_orphaned(age, entry.pid.map(is_pid_alive))
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in &orphans {
            store.remove(id);
        }
        let still_active: HashSet<String> = store.iter().map(|(id, _)| id.clone()).collect();
        (orphans, still_active)
    });

    let (orphans, still_active) = match orphaned {
        Ok((orphans, still_active)) => {
            for id in &orphans {
                debug!(session = %id, "Force-completing orphaned session");
                let log = storage.session_log(id);
                if log.exists() {
                    let note = format!("{ORPHAN_FOOTER} wrapper exited without recording an exit code");
                    if let Err(e) = append_marker(&log, &note) {
                        stats.errors.push(e.to_string());
                    }
                }
            }
            stats.orphaned_sessions = orphans.len() as u32;
            (orphans.into_iter().collect::<HashSet<String>>(), still_active)
        }
        Err(e) => {
            // Without a trustworthy active set, no log is safe to delete.
            stats.errors.push(e.to_string());
            return stats;
        }
    };

    for file in LogStore::new(storage.clone()).list_session_files(None) {
        if still_active.contains(&file.session_id) {
            continue;
        }
        let modified: DateTime<Utc> = file.modified.into();
        let age = now.signed_duration_since(modified);
        if age < Duration::seconds(FRESH_LOG_GRACE_SECS) {
            continue;
        }
        let state = if orphans.contains(&file.session_id) {
            CompletionState::Orphaned
        } else {
            CompletionState::Completed
        };
        if policy.fate(age, state) == LogFate::Delete {
            match fs_err::remove_file(&file.path) {
                Ok(()) => stats.logs_deleted += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => stats.errors.push(e.to_string()),
            }
        }
    }

    if stats.orphaned_sessions > 0 || stats.logs_deleted > 0 {
        info!(
            orphaned = stats.orphaned_sessions,
            deleted = stats.logs_deleted,
            "Retention sweep"
        );
    }
    stats
}

//! Registry of sessions that are still running (`active-sessions.json`).
//!
//! # File Format
//!
//! ```json
//! {
//!   "20261017-091203-5f0c2a91": {
//!     "projectDir": "/home/me/app",
//!     "startTime": "2026-10-17T09:12:03.114Z",
//!     "pid": 41822
//!   }
//! }
//! ```
//!
//! # Concurrency
//!
//! Several wrappers may update this file at once. Every update goes through
//! [`update`], which holds `active-sessions.lock/` across the whole
//! read-modify-write and replaces the file with temp file + rename, so updates
//! are neither lost nor observed half-written.
//!
//! # Defensive Design
//!
//! Empty files and corrupt JSON load as an empty registry (with a warning).
//! Losing the active set only means an orphan goes undetected until its log ages out.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::NamedTempFile;
use tracing::warn;

use super::lock::DirLock;
use super::types::ActiveSession;
use crate::error::{Result, RunlogError};
use crate::storage::StorageConfig;

const LOCK_TIMEOUT: Duration = Duration::from_secs(2);

/// In-memory copy of the active-session map, optionally backed by a file.
#[derive(Debug, Default)]
pub struct ActiveStore {
    sessions: BTreeMap<String, ActiveSession>,
    file_path: Option<PathBuf>,
}

impl ActiveStore {
    pub fn new_in_memory() -> Self {
        Self::default()
    }

    pub fn load(file_path: &Path) -> Self {
        let sessions = match fs_err::read_to_string(file_path) {
            Ok(content) => parse(&content, file_path),
            Err(_) => BTreeMap::new(),
        };
        Self {
            sessions,
            file_path: Some(file_path.to_path_buf()),
        }
    }

    pub fn save(&self) -> Result<()> {
        let Some(file_path) = self.file_path.as_ref() else {
            return Ok(());
        };
        let content = serde_json::to_string_pretty(&self.sessions).map_err(|e| {
            RunlogError::Json {
                context: "serializing active sessions".to_string(),
                source: e,
            }
        })?;

        let parent_dir = file_path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp_file = NamedTempFile::new_in(parent_dir)
            .map_err(|e| RunlogError::io("creating temp active-sessions file", e))?;
        temp_file
            .write_all(content.as_bytes())
            .map_err(|e| RunlogError::io("writing temp active-sessions file", e))?;
        temp_file
            .flush()
            .map_err(|e| RunlogError::io("flushing temp active-sessions file", e))?;
        temp_file
            .persist(file_path)
            .map_err(|e| RunlogError::io("replacing active-sessions file", e.error))?;
        Ok(())
    }

    pub fn insert(&mut self, session_id: &str, entry: ActiveSession) {
        self.sessions.insert(session_id.to_string(), entry);
    }

    pub fn remove(&mut self, session_id: &str) -> Option<ActiveSession> {
        self.sessions.remove(session_id)
    }

    pub fn get(&self, session_id: &str) -> Option<&ActiveSession> {
        self.sessions.get(session_id)
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ActiveSession)> {
        self.sessions.iter()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

fn parse(content: &str, file_path: &Path) -> BTreeMap<String, ActiveSession> {
    if content.trim().is_empty() {
        return BTreeMap::new();
    }
    match serde_json::from_str(content) {
        Ok(sessions) => sessions,
        Err(e) => {
            warn!(
                error = %e,
                path = %file_path.display(),
                "Corrupt active-sessions file, treating as empty"
            );
            BTreeMap::new()
        }
    }
}

/// Reads the registry without taking the lock.
pub fn snapshot(storage: &StorageConfig) -> ActiveStore {
    ActiveStore::load(&storage.active_sessions_file())
}

/// Locked read-modify-write of the registry.
pub fn update<T>(storage: &StorageConfig, f: impl FnOnce(&mut ActiveStore) -> T) -> Result<T> {
    let _lock = DirLock::acquire(&storage.active_sessions_lock(), LOCK_TIMEOUT)?;
    let mut store = ActiveStore::load(&storage.active_sessions_file());
    let out = f(&mut store);
    store.save()?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    fn entry(dir: &str) -> ActiveSession {
        ActiveSession {
            project_dir: dir.to_string(),
            start_time: Utc::now(),
            pid: Some(std::process::id()),
        }
    }

    #[test]
    fn test_insert_and_remove_in_memory() {
        let mut store = ActiveStore::new_in_memory();
        store.insert("s1", entry("/p"));
        assert!(store.contains("s1"));
        assert_eq!(store.remove("s1").unwrap().project_dir, "/p");
        assert!(store.is_empty());
    }

    #[test]
    fn test_persistence_round_trip() {
        let temp = tempdir().unwrap();
        let storage = StorageConfig::with_root(temp.path().to_path_buf());
        update(&storage, |store| store.insert("s1", entry("/proj"))).unwrap();

        let store = snapshot(&storage);
        assert_eq!(store.get("s1").unwrap().project_dir, "/proj");
        assert!(!storage.active_sessions_lock().exists());
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let temp = tempdir().unwrap();
        let storage = StorageConfig::with_root(temp.path().to_path_buf());
        std::fs::write(storage.active_sessions_file(), "{invalid json}").unwrap();
        assert!(snapshot(&storage).is_empty());

        update(&storage, |store| store.insert("s1", entry("/p"))).unwrap();
        assert_eq!(snapshot(&storage).len(), 1);
    }

    #[test]
    fn test_empty_file_loads_empty() {
        let temp = tempdir().unwrap();
        let storage = StorageConfig::with_root(temp.path().to_path_buf());
        std::fs::write(storage.active_sessions_file(), "").unwrap();
        assert!(snapshot(&storage).is_empty());
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let temp = tempdir().unwrap();
        let storage = Arc::new(StorageConfig::with_root(temp.path().to_path_buf()));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let storage = Arc::clone(&storage);
                thread::spawn(move || {
                    update(&storage, |store| {
                        store.insert(&format!("s{i}"), entry("/p"));
                    })
                    .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(snapshot(&storage).len(), 8);
    }
}

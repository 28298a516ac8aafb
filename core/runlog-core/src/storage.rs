//! Storage configuration and path management for runlog.
//!
//! Every file runlog touches lives under one per-user root (default `~/.runlog`):
//!
//! ```text
//! ~/.runlog/
//! ├── session-<id>.log        # one per wrapped command
//! ├── master-index.log        # append-only ledger
//! ├── active-sessions.json    # currently running sessions
//! ├── active-sessions.lock/   # short-lived writer lock for the file above
//! ├── session.log             # legacy combined log (read-only fallback)
//! ├── config.json             # optional retention defaults
//! └── debug/                  # runlog's own tracing output
//! ```
//!
//! Production code uses [`StorageConfig::from_env`]; tests use
//! [`StorageConfig::with_root`] with a temp directory.

use std::path::{Path, PathBuf};

use crate::error::{Result, RunlogError};

/// Environment variable overriding the storage root.
pub const ROOT_ENV: &str = "RUNLOG_HOME";

const SESSION_PREFIX: &str = "session-";
const SESSION_SUFFIX: &str = ".log";

/// Central configuration for all runlog storage paths.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    root: PathBuf,
}

impl StorageConfig {
    /// Resolves the root from `RUNLOG_HOME`, falling back to `~/.runlog`.
    pub fn from_env() -> Result<Self> {
        if let Some(root) = std::env::var_os(ROOT_ENV).filter(|v| !v.is_empty()) {
            return Ok(Self::with_root(PathBuf::from(root)));
        }
        let home = dirs::home_dir().ok_or(RunlogError::HomeDirNotFound)?;
        Ok(Self::with_root(home.join(".runlog")))
    }

    /// Creates a StorageConfig with a custom root directory.
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the root directory if it doesn't exist.
    pub fn ensure_root(&self) -> Result<()> {
        fs_err::create_dir_all(&self.root)
            .map_err(|e| RunlogError::io("creating storage root", e))
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Global Files
    // ─────────────────────────────────────────────────────────────────────────────

    /// Path to the append-only session ledger.
    pub fn ledger_file(&self) -> PathBuf {
        self.root.join("master-index.log")
    }

    /// Path to the active-session registry.
    pub fn active_sessions_file(&self) -> PathBuf {
        self.root.join("active-sessions.json")
    }

    /// Lock directory guarding writes to the active-session registry.
    pub fn active_sessions_lock(&self) -> PathBuf {
        self.root.join("active-sessions.lock")
    }

    /// Single combined log written by older versions.
    pub fn legacy_log_file(&self) -> PathBuf {
        self.root.join("session.log")
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.json")
    }

    pub fn debug_dir(&self) -> PathBuf {
        self.root.join("debug")
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Per-Session Files
    // ─────────────────────────────────────────────────────────────────────────────

    /// Path to the log file for a session.
    pub fn session_log(&self, session_id: &str) -> PathBuf {
        self.root
            .join(format!("{SESSION_PREFIX}{session_id}{SESSION_SUFFIX}"))
    }
}

/// Extracts the session id from a `session-<id>.log` file name.
///
/// Returns `None` for the legacy `session.log` and anything else.
pub fn session_id_from_path(path: &Path) -> Option<&str> {
    let name = path.file_name()?.to_str()?;
    let id = name
        .strip_prefix(SESSION_PREFIX)?
        .strip_suffix(SESSION_SUFFIX)?;
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_root_uses_custom_root() {
        let config = StorageConfig::with_root(PathBuf::from("/tmp/test-runlog"));
        assert_eq!(config.root(), Path::new("/tmp/test-runlog"));
        assert_eq!(
            config.ledger_file(),
            PathBuf::from("/tmp/test-runlog/master-index.log")
        );
    }

    #[test]
    fn test_session_log_path() {
        let config = StorageConfig::with_root(PathBuf::from("/r"));
        assert_eq!(
            config.session_log("20260101-120000-abcd1234"),
            PathBuf::from("/r/session-20260101-120000-abcd1234.log")
        );
    }

    #[test]
    fn test_session_id_from_path() {
        let path = PathBuf::from("/r/session-20260101-120000-abcd1234.log");
        assert_eq!(
            session_id_from_path(&path),
            Some("20260101-120000-abcd1234")
        );
    }

    #[test]
    fn test_session_id_from_path_rejects_legacy_and_others() {
        assert_eq!(session_id_from_path(Path::new("/r/session.log")), None);
        assert_eq!(session_id_from_path(Path::new("/r/master-index.log")), None);
        assert_eq!(session_id_from_path(Path::new("/r/session-.log")), None);
    }
}

//! Error types for runlog-core operations.
//!
//! Only two failures ever reach the user as hard errors: an unresolvable storage
//! root and a command that could not be launched. Everything else on the logging
//! path is logged and swallowed by the runner.

use std::path::PathBuf;

/// All errors that can occur in runlog-core operations.
#[derive(Debug, thiserror::Error)]
pub enum RunlogError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Home directory not found; set RUNLOG_HOME to choose a storage root")]
    HomeDirNotFound,

    // ─────────────────────────────────────────────────────────────────────
    // Session Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Could not allocate a unique session id after {attempts} attempts")]
    IdExhausted { attempts: u32 },

    #[error("Timed out waiting for lock: {0}")]
    LockTimeout(PathBuf),

    #[error("Failed to start {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl RunlogError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        RunlogError::Io {
            context: context.into(),
            source,
        }
    }

    /// Conventional shell exit status for this error when it ends the wrapper.
    ///
    /// 127 for a command that does not exist, 126 for any other launch failure,
    /// 1 for everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunlogError::Spawn { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
                127
            }
            RunlogError::Spawn { .. } => 126,
            _ => 1,
        }
    }
}

/// Convenience type alias for Results using RunlogError.
pub type Result<T> = std::result::Result<T, RunlogError>;

//! # runlog-core
//!
//! Core library for runlog: wraps a command, mirrors its output to the
//! terminal unchanged, and keeps a sanitized per-session log that can later be
//! tailed or triaged for errors.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime. The runner uses plain threads and channels.
//! - **Never in the way**: Bookkeeping failures are logged and swallowed. The
//!   wrapped command's output and exit code always reach the caller.
//! - **Graceful degradation**: Missing or corrupt files read as empty.
//! - **Nothing unredacted on disk**: Every persisted line goes through [`redact`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use runlog_core::{CommandRunner, CommandSpec, RetentionConfig, StorageConfig};
//!
//! let storage = StorageConfig::from_env()?;
//! let retention = RetentionConfig::load(&storage);
//! let outcome = CommandRunner::new(storage, retention)
//!     .run(&CommandSpec::new("npm", vec!["test".into()]))?;
//! std::process::exit(outcome.exit_code);
//! ```

pub mod config;
pub mod error;
pub mod logs;
pub mod patterns;
pub mod redact;
pub mod retention;
pub mod runner;
pub mod session;
pub mod storage;
pub mod triage;

pub use config::RetentionConfig;
pub use error::{Result, RunlogError};
pub use logs::{LogStore, RecentLogs, SessionFile, SessionLogWriter};
pub use redact::{redact, strip_ansi, LineSanitizer, REDACTED};
pub use retention::{sweep, LogFate, RetentionPolicy, SweepStats};
pub use runner::{CommandRunner, CommandSpec, RunOutcome, Terminal};
pub use session::{
    ActiveSession, ActiveStore, CompletionState, LedgerEntry, Session, SessionRegistry,
};
pub use storage::StorageConfig;
pub use triage::{filter_errors, triage, Category, ErrorScan, Issue, TriageOutcome, TriageReport};

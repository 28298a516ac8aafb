//! Serialized and in-memory session types.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a session is in its lifecycle.
///
/// `Running` moves to exactly one of the other three and never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionState {
    Running,
    Completed,
    Failed,
    Orphaned,
}

impl CompletionState {
    pub fn is_finished(self) -> bool {
        self != CompletionState::Running
    }
}

/// One wrapped command invocation.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub started_at: DateTime<Utc>,
    state: CompletionState,
    exit_code: Option<i32>,
}

impl Session {
    pub fn new(id: String, program: String, args: Vec<String>, cwd: PathBuf) -> Self {
        Self {
            id,
            program,
            args,
            cwd,
            started_at: Utc::now(),
            state: CompletionState::Running,
            exit_code: None,
        }
    }

    pub fn state(&self) -> CompletionState {
        self.state
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Records the child's exit code. Returns false if the session already finished.
    pub fn complete(&mut self, code: i32) -> bool {
        if self.state.is_finished() {
            return false;
        }
        self.state = if code == 0 {
            CompletionState::Completed
        } else {
            CompletionState::Failed
        };
        self.exit_code = Some(code);
        true
    }

    /// Marks a session whose command never produced an exit code.
    pub fn fail(&mut self) -> bool {
        if self.state.is_finished() {
            return false;
        }
        self.state = CompletionState::Failed;
        true
    }

    /// Program and arguments as one shell-readable string.
    pub fn command_line(&self) -> String {
        command_line(&self.program, &self.args)
    }

    pub fn cwd_display(&self) -> String {
        self.cwd.display().to_string()
    }
}

/// Joins a program and its arguments, single-quoting anything a shell would split.
pub fn command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .map(quote_arg)
        .collect::<Vec<_>>()
        .join(" ")
}

fn quote_arg(arg: &str) -> String {
    let needs_quotes = arg.is_empty()
        || arg
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '\'' | '"' | '\\' | '$' | '`' | ';' | '&' | '|' | '<' | '>' | '*' | '?'));
    if !needs_quotes {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', r"'\''"))
}

/// One line of the append-only ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub timestamp: String,
    pub session_id: String,
    pub cwd: String,
    pub command: String,
}

/// Value side of the active-session map in `active-sessions.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSession {
    pub project_dir: String,
    pub start_time: DateTime<Utc>,
    /// Wrapper process that owns the session. Absent in files written by older versions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

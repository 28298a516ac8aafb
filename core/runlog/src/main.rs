//! runlog: command wrapper that keeps a sanitized log of everything it runs.
//!
//! The wrapped command's output reaches the terminal unchanged; a copy with
//! ANSI escapes stripped and secrets redacted is stored per session under
//! `~/.runlog` (or `$RUNLOG_HOME`).
//!
//! ## Subcommands
//!
//! - `run`: Run a command and log it; exits with the command's exit code
//! - `tail`: Last lines across recent sessions
//! - `errors`: Only error-flagged lines
//! - `triage`: Classified error report
//! - `sessions`: Recent sessions from the ledger
//! - `sweep`: Apply retention now

mod logging;
mod read;

use std::io::{self, Write};

use clap::{Parser, Subcommand};
use runlog_core::{CommandRunner, CommandSpec, RetentionConfig, StorageConfig};

use read::{DEFAULT_FILES, DEFAULT_LINES, DEFAULT_SESSIONS};

#[derive(Parser)]
#[command(name = "runlog")]
#[command(about = "Run commands with a sanitized, searchable output log")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command, mirroring its output and logging a redacted copy
    Run {
        /// Command to run, followed by its arguments
        #[arg(
            required = true,
            trailing_var_arg = true,
            allow_hyphen_values = true,
            value_name = "COMMAND"
        )]
        command: Vec<String>,
    },

    /// Print the last lines across recent sessions
    Tail {
        /// Total lines to show, separators included
        #[arg(short = 'n', long, default_value_t = DEFAULT_LINES)]
        lines: usize,

        /// Number of most recent session logs to read
        #[arg(long, default_value_t = DEFAULT_FILES)]
        files: usize,
    },

    /// Print only error lines from recent sessions
    Errors {
        /// Lines of recent output to scan
        #[arg(short = 'n', long, default_value_t = DEFAULT_LINES)]
        lines: usize,

        #[arg(long, default_value_t = DEFAULT_FILES)]
        files: usize,
    },

    /// Classify errors from recent sessions into a report
    Triage {
        /// Lines of recent output to scan
        #[arg(short = 'n', long, default_value_t = DEFAULT_LINES)]
        lines: usize,

        #[arg(long, default_value_t = DEFAULT_FILES)]
        files: usize,
    },

    /// List recent sessions
    Sessions {
        /// Number of sessions to list
        #[arg(short = 'n', long, default_value_t = DEFAULT_SESSIONS)]
        count: usize,
    },

    /// Close orphaned sessions and delete expired logs
    Sweep,
}

fn main() {
    let cli = Cli::parse();

    let storage = match StorageConfig::from_env() {
        Ok(storage) => storage,
        Err(e) => {
            eprintln!("runlog: {e}");
            std::process::exit(1);
        }
    };
    let logging_guard = logging::init(&storage);

    let code = match cli.command {
        Commands::Run { command } => run(storage, command),
        Commands::Tail { lines, files } => print(read::tail(&storage, lines, files)),
        Commands::Errors { lines, files } => print(read::errors(&storage, lines, files)),
        Commands::Triage { lines, files } => print(read::triage_report(&storage, lines, files)),
        Commands::Sessions { count } => print(read::sessions(&storage, count)),
        Commands::Sweep => match read::sweep(&storage) {
            Ok(text) => print(text),
            Err(e) => {
                tracing::error!(error = %e, "runlog sweep failed");
                eprintln!("runlog: {e}");
                1
            }
        },
    };

    // process::exit skips destructors; flush the non-blocking log writer first.
    drop(logging_guard);
    std::process::exit(code);
}

/// Writes to stdout, ignoring a closed pipe (`runlog tail | head`).
fn print(text: String) -> i32 {
    let mut out = io::stdout().lock();
    let _ = out.write_all(text.as_bytes()).and_then(|_| out.flush());
    0
}

fn run(storage: StorageConfig, command: Vec<String>) -> i32 {
    let mut parts = command.into_iter();
    let Some(program) = parts.next() else {
        eprintln!("runlog: no command given");
        return 2;
    };
    let spec = CommandSpec::new(program, parts.collect());
    let retention = RetentionConfig::load(&storage);

    match CommandRunner::new(storage, retention).run(&spec) {
        Ok(outcome) => {
            tracing::debug!(session = %outcome.session_id, exit_code = outcome.exit_code, "runlog run finished");
            outcome.exit_code
        }
        Err(e) => {
            tracing::error!(error = %e, "runlog run failed");
            eprintln!("runlog: {e}");
            e.exit_code()
        }
    }
}

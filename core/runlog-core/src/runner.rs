//! Runs one wrapped command.
//!
//! ## State Machine
//!
//! ```text
//! starting → running → completed(code)
//!                    ↘ errored(reason)      (command could not be launched)
//! ```
//!
//! ## Data Flow
//!
//! ```text
//!                 ┌─ write_all ──────────────────────→ terminal (raw bytes)
//! child stdout ───┤
//!                 └─ mpsc (unbounded) ─┐
//!                                      ├→ log thread: frame lines → strip ANSI → redact → session log
//!                 ┌─ mpsc (unbounded) ─┘
//! child stderr ───┤
//!                 └─ write_all ──────────────────────→ terminal (raw bytes)
//! ```
//!
//! Each output stream has its own pump thread. A pump writes to the terminal
//! first and then hands the same bytes to the log thread over an unbounded
//! channel, so a slow or failing log never delays terminal output.

use std::io::{self, ErrorKind, Read, Write};
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::config::RetentionConfig;
use crate::error::{Result, RunlogError};
use crate::logs::{LogStore, SessionLogWriter};
use crate::redact::{redact, LineSanitizer};
use crate::retention::{self, RetentionPolicy};
use crate::session::{generate_id, CompletionState, Session, SessionRegistry};
use crate::storage::StorageConfig;

const READ_CHUNK_SIZE: usize = 8192;
/// Output without a newline is cut into a log line once this much is pending.
const MAX_PENDING_LINE: usize = 64 * 1024;
const EXIT_CODE_SIGNAL_BASE: i32 = 128;

/// What to run and where.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl CommandSpec {
    /// A command run from the wrapper's own working directory.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    pub fn with_cwd(mut self, cwd: PathBuf) -> Self {
        self.cwd = cwd;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub session_id: String,
    pub exit_code: i32,
    pub state: CompletionState,
    pub log_path: PathBuf,
}

/// Destinations for the child's unmodified output.
pub struct Terminal {
    out: Box<dyn Write + Send>,
    err: Box<dyn Write + Send>,
}

impl Terminal {
    pub fn stdio() -> Self {
        Self::new(Box::new(io::stdout()), Box::new(io::stderr()))
    }

    pub fn new(out: Box<dyn Write + Send>, err: Box<dyn Write + Send>) -> Self {
        Self { out, err }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    fn index(self) -> usize {
        match self {
            Stream::Stdout => 0,
            Stream::Stderr => 1,
        }
    }
}

struct Chunk {
    stream: Stream,
    bytes: Vec<u8>,
}

pub struct CommandRunner {
    storage: StorageConfig,
    retention: RetentionConfig,
}

impl CommandRunner {
    pub fn new(storage: StorageConfig, retention: RetentionConfig) -> Self {
        Self { storage, retention }
    }

    pub fn run(&self, spec: &CommandSpec) -> Result<RunOutcome> {
        self.run_with(spec, Terminal::stdio())
    }

    /// Runs `spec`, mirroring its output to `terminal`.
    ///
    /// Returns `Err` only when the command could not be launched or waited on;
    /// the session is finalized in either case. A nonzero exit is an `Ok`
    /// outcome carrying that code.
    pub fn run_with(&self, spec: &CommandSpec, terminal: Terminal) -> Result<RunOutcome> {
        let registry = SessionRegistry::new(self.storage.clone());
        let logging = self.prepare_storage();

        let (id, mut writer) = self.open_session_log(logging);
        let mut session = Session::new(id, spec.program.clone(), spec.args.clone(), spec.cwd.clone());
        let log_path = writer.path().to_path_buf();

        writer.write_header(
            &session.id,
            &session.cwd_display(),
            &redact(&session.command_line()),
        );
        if logging {
            if let Err(e) = registry.register(&session.id, &spec.program, &spec.args, &spec.cwd) {
                warn!(session = %session.id, error = %e, "Failed to register session");
            }
            if let Err(e) = registry.mark_active(&session.id, &spec.cwd) {
                warn!(session = %session.id, error = %e, "Failed to mark session active");
            }
        }

        let spawned = Command::new(&spec.program)
            .args(&spec.args)
            .current_dir(&spec.cwd)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(source) => {
                session.fail();
                writer.write_error_footer(&source.to_string());
                writer.close();
                self.finish_bookkeeping(&registry, &session.id, logging);
                return Err(RunlogError::Spawn {
                    command: spec.program.clone(),
                    source,
                });
            }
        };
        debug!(session = %session.id, pid = child.id(), "Command started");

        let forwarder = SignalForwarder::install(child.id());

        let (tx, rx) = mpsc::channel();
        let log_thread = thread::spawn(move || drain_to_log(rx, writer));
        let Terminal { out, err } = terminal;
        let pumps = [
            spawn_pump(child.stdout.take(), out, Stream::Stdout, tx.clone()),
            spawn_pump(child.stderr.take(), err, Stream::Stderr, tx),
        ];

        let status = child.wait();
        for pump in pumps.into_iter().flatten() {
            if pump.join().is_err() {
                warn!(session = %session.id, "Output pump panicked");
            }
        }
        drop(forwarder);

        let mut writer = match log_thread.join() {
            Ok(writer) => Some(writer),
            Err(_) => {
                warn!(session = %session.id, "Log writer panicked; footer not written");
                None
            }
        };

        let result = match status {
            Ok(status) => {
                let code = exit_code(status);
                session.complete(code);
                if let Some(writer) = writer.as_mut() {
                    writer.write_exit_footer(code);
                }
                Ok(code)
            }
            Err(e) => {
                session.fail();
                if let Some(writer) = writer.as_mut() {
                    writer.write_error_footer(&format!("failed to wait for command: {e}"));
                }
                Err(RunlogError::io("waiting for command", e))
            }
        };
        if let Some(writer) = writer {
            writer.close();
        }
        self.finish_bookkeeping(&registry, &session.id, logging);

        let exit_code = result?;
        debug!(session = %session.id, exit_code, "Command finished");
        Ok(RunOutcome {
            session_id: session.id.clone(),
            exit_code,
            state: session.state(),
            log_path,
        })
    }

    /// Creates the storage root and runs the retention sweep. Returns whether
    /// logging is possible at all.
    fn prepare_storage(&self) -> bool {
        if let Err(e) = self.storage.ensure_root() {
            warn!(error = %e, "Storage unavailable; running without a log");
            return false;
        }
        let stats = retention::sweep(&self.storage, &RetentionPolicy::from_config(&self.retention));
        for error in &stats.errors {
            warn!(error = %error, "Retention sweep error");
        }
        true
    }

    fn open_session_log(&self, logging: bool) -> (String, SessionLogWriter) {
        if logging {
            match LogStore::new(self.storage.clone()).create_session_log() {
                Ok(pair) => return pair,
                Err(e) => warn!(error = %e, "Failed to create session log"),
            }
        }
        let id = generate_id();
        let path = self.storage.session_log(&id);
        (id, SessionLogWriter::disabled(path))
    }

    fn finish_bookkeeping(&self, registry: &SessionRegistry, id: &str, logging: bool) {
        if !logging {
            return;
        }
        if let Err(e) = registry.mark_completed(id, self.retention.archives()) {
            warn!(session = %id, error = %e, "Failed to mark session completed");
        }
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return EXIT_CODE_SIGNAL_BASE + signal;
        }
    }
    1
}

fn spawn_pump<R>(
    source: Option<R>,
    mut terminal: Box<dyn Write + Send>,
    stream: Stream,
    tx: Sender<Chunk>,
) -> Option<JoinHandle<()>>
where
    R: Read + Send + 'static,
{
    let mut source = source?;
    Some(thread::spawn(move || {
        let mut buf = [0u8; READ_CHUNK_SIZE];
        let mut terminal_ok = true;
        loop {
            let n = match source.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(error = %e, ?stream, "Output pipe read failed");
                    break;
                }
            };
            // Keep draining the pipe after a terminal failure so the child never blocks on it.
            if terminal_ok {
                if let Err(e) = terminal.write_all(&buf[..n]).and_then(|_| terminal.flush()) {
                    debug!(error = %e, ?stream, "Terminal write failed");
                    terminal_ok = false;
                }
            }
            let _ = tx.send(Chunk {
                stream,
                bytes: buf[..n].to_vec(),
            });
        }
    }))
}

fn drain_to_log(rx: Receiver<Chunk>, mut writer: SessionLogWriter) -> SessionLogWriter {
    let mut framers = [LineFramer::default(), LineFramer::default()];
    let mut sanitizers = [LineSanitizer::new(), LineSanitizer::new()];

    for chunk in rx {
        if writer.is_degraded() {
            continue;
        }
        let i = chunk.stream.index();
        for line in framers[i].push(&chunk.bytes) {
            writer.write_line(&sanitizers[i].sanitize(&line));
        }
        writer.flush();
    }

    for (framer, sanitizer) in framers.iter_mut().zip(sanitizers.iter_mut()) {
        if let Some(line) = framer.finish() {
            writer.write_line(&sanitizer.sanitize(&line));
        }
    }
    writer.flush();
    writer
}

/// Reassembles lines from arbitrarily split output chunks.
#[derive(Debug, Default)]
struct LineFramer {
    pending: Vec<u8>,
}

impl LineFramer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(pos) = self.pending[start..].iter().position(|&b| b == b'\n') {
            let end = start + pos;
            lines.push(decode_line(&self.pending[start..end]));
            start = end + 1;
        }
        self.pending.drain(..start);

        if self.pending.len() >= MAX_PENDING_LINE {
            let overlong = std::mem::take(&mut self.pending);
            lines.push(decode_line(&overlong));
        }
        lines
    }

    fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(decode_line(&rest))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Signal Forwarding
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(unix)]
mod signals {
    use std::sync::atomic::{AtomicI32, Ordering};

    static CHILD_PID: AtomicI32 = AtomicI32::new(0);
    const FORWARDED: [libc::c_int; 3] = [libc::SIGINT, libc::SIGTERM, libc::SIGHUP];

    extern "C" fn forward(signal: libc::c_int) {
        let pid = CHILD_PID.load(Ordering::SeqCst);
        if pid > 0 {
            // SAFETY: kill is async-signal-safe and the pid is our own child.
            #[allow(unsafe_code)]
            unsafe {
                libc::kill(pid, signal);
            }
        }
    }

    /// While alive, SIGINT/SIGTERM/SIGHUP sent to the wrapper go to the child
    /// instead of killing the wrapper, so finalization still runs.
    pub struct SignalForwarder {
        previous: Vec<(libc::c_int, libc::sighandler_t)>,
    }

    impl SignalForwarder {
        pub fn install(child_pid: u32) -> Self {
            CHILD_PID.store(child_pid as i32, Ordering::SeqCst);
            let handler = forward as extern "C" fn(libc::c_int) as libc::sighandler_t;
            let previous = FORWARDED
                .iter()
                .map(|&signal| {
                    // SAFETY: installing a handler that only calls kill().
                    #[allow(unsafe_code)]
                    let prev = unsafe { libc::signal(signal, handler) };
                    (signal, prev)
                })
                .collect();
            Self { previous }
        }
    }

    impl Drop for SignalForwarder {
        fn drop(&mut self) {
            for &(signal, prev) in &self.previous {
                if prev != libc::SIG_ERR {
                    // SAFETY: restoring the disposition we replaced.
                    #[allow(unsafe_code)]
                    unsafe {
                        libc::signal(signal, prev);
                    }
                }
            }
            CHILD_PID.store(0, Ordering::SeqCst);
        }
    }
}

#[cfg(not(unix))]
mod signals {
    pub struct SignalForwarder;

    impl SignalForwarder {
        pub fn install(_child_pid: u32) -> Self {
            SignalForwarder
        }
    }
}

use signals::SignalForwarder;

//! Compiled regex patterns shared across modules.
//!
//! These patterns are compiled once on first use. Secret shapes and error
//! signals are not here; they live as rule tables in `redact` and `triage`.

use once_cell::sync::Lazy;
use regex::Regex;

// ═══════════════════════════════════════════════════════════════════════════════
// Terminal Control Sequences
// ═══════════════════════════════════════════════════════════════════════════════

/// CSI sequences (colors, cursor movement), OSC sequences (titles, hyperlinks),
/// charset selection and the remaining two-byte escapes.
pub static RE_ANSI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\x1b(?:\[[0-?]*[ -/]*[@-~]|\][^\x07\x1b]*(?:\x07|\x1b\\)|[()][0-9A-Za-z]|[@-Z\\-_])|\x{9b}[0-?]*[ -/]*[@-~]",
    )
    .unwrap()
});

// ═══════════════════════════════════════════════════════════════════════════════
// Ledger Parsing
// ═══════════════════════════════════════════════════════════════════════════════

/// `[timestamp] [id] [cwd] full command`
pub static RE_LEDGER_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[([^\]]+)\] \[([^\]\s]+)\] \[(.*?)\] (.*)$").unwrap());

// ═══════════════════════════════════════════════════════════════════════════════
// Private Key Blocks
// ═══════════════════════════════════════════════════════════════════════════════

pub static RE_PRIVATE_KEY_BEGIN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-----BEGIN [A-Z0-9 ]*PRIVATE KEY( BLOCK)?-----").unwrap());
pub static RE_PRIVATE_KEY_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-----END [A-Z0-9 ]*PRIVATE KEY( BLOCK)?-----").unwrap());

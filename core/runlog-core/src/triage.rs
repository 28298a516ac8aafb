//! Error triage over recent log text.
//!
//! Two views of the same input:
//!
//! - [`filter_errors`]: only the lines carrying an error signal, in order.
//! - [`triage`]: those lines classified, deduplicated and summarized.
//!
//! # Classification
//!
//! [`CATEGORY_RULES`] is evaluated top to bottom and the first match wins, so a
//! line is filed under exactly one category:
//!
//! ```text
//! Error → Exception → TypeError → SyntaxError → (other *Error) → Failed → Exit-Code-Error → Stack-Trace
//! ```
//!
//! Class names like `ValueError` are filed under Error, after the two
//! categories that have their own label.
//!
//! A line is an error line iff some rule matches it. runlog's own header lines
//! (`Session:`, `Project:`, `Command:`) and read separators are never error
//! lines, even when the command text happens to contain "error".

use std::collections::HashMap;
use std::fmt::Write as _;

use once_cell::sync::Lazy;
use regex::Regex;

/// Issues listed in a rendered report before the remainder is summarized.
pub const MAX_DISPLAYED_ISSUES: usize = 10;

pub const NO_LOGS_MESSAGE: &str = "No logs found. Run a command with `runlog run -- <cmd>` first.";
pub const NO_ERRORS_MESSAGE: &str = "No errors found in recent logs.";

pub const SUGGESTED_ACTIONS: &[&str] = &[
    "Start with the first issue; later errors are often knock-on effects.",
    "Open the surrounding output with `runlog tail` to see what led up to it.",
    "Fix the first failure and re-run the same command to confirm it is gone.",
    "Exit code 126/127 means the command could not start; 128+N means it was killed by signal N.",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Error,
    Exception,
    TypeError,
    SyntaxError,
    Failed,
    ExitCode,
    StackTrace,
}

impl Category {
    pub fn label(self) -> &'static str {
        match self {
            Category::Error => "Error",
            Category::Exception => "Exception",
            Category::TypeError => "TypeError",
            Category::SyntaxError => "SyntaxError",
            Category::Failed => "Failed",
            Category::ExitCode => "Exit-Code-Error",
            Category::StackTrace => "Stack-Trace",
        }
    }
}

pub struct CategoryRule {
    pub category: Category,
    pub pattern: Regex,
}

pub static CATEGORY_RULES: Lazy<Vec<CategoryRule>> = Lazy::new(|| {
    let rule = |category, pattern: &str| CategoryRule {
        category,
        pattern: Regex::new(pattern).unwrap(),
    };
    vec![
        rule(
            Category::Error,
            r"(?i)\berror\b|\berr!|\b(?:Reference|Range|URI|Eval|Internal)Error\b|\bTraceback\b|\bpanicked at\b|\bE(?:NOENT|ACCES|PERM|CONNREFUSED|CONNRESET|ADDRINUSE)\b|\bfatal:|\bsegmentation fault\b|\bconnection refused\b|\bProcess error:",
        ),
        rule(Category::Exception, r"(?i)exception\b"),
        rule(Category::TypeError, r"\bTypeError\b"),
        rule(Category::SyntaxError, r"\bSyntaxError\b"),
        // Any other exception class: ValueError, KeyError, ModuleNotFoundError, ...
        rule(Category::Error, r"\b[A-Z][A-Za-z0-9_]*Error\b"),
        rule(
            Category::Failed,
            r"(?i)\b(?:failed|failure|failing)\b|\bFAIL(?:ED)?\b",
        ),
        rule(
            Category::ExitCode,
            r"(?i)\bexit(?:ed)?\s+(?:with\s+)?(?:code|status)\b[:=]?\s*-?[1-9]\d*",
        ),
        rule(
            Category::StackTrace,
            r#"^\s+(?:at\s+\S|File "[^"]+", line \d+|\d+:\s+(?:0x[0-9a-f]+\s+-\s+)?\S+::\S)"#,
        ),
    ]
});

static RE_RUNLOG_METADATA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\[[^\]]+\] (?:=+$|Session: |Project: |Command: )|^===== session ").unwrap()
});

/// The category of an error line, or `None` for any other line.
pub fn classify(line: &str) -> Option<Category> {
    if RE_RUNLOG_METADATA.is_match(line) {
        return None;
    }
    CATEGORY_RULES
        .iter()
        .find(|rule| rule.pattern.is_match(line))
        .map(|rule| rule.category)
}

pub fn is_error_line(line: &str) -> bool {
    classify(line).is_some()
}

/// Result of scanning log text for error lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorScan {
    /// There was no log text at all.
    NoLogs,
    /// Log text was read and nothing matched.
    Clean,
    Lines(Vec<String>),
}

/// Keeps only error lines, preserving order. `None` or blank input is `NoLogs`.
pub fn filter_errors(text: Option<&str>) -> ErrorScan {
    let Some(text) = text.filter(|t| !t.trim().is_empty()) else {
        return ErrorScan::NoLogs;
    };
    let lines: Vec<String> = text
        .lines()
        .filter(|line| is_error_line(line))
        .map(str::to_string)
        .collect();
    if lines.is_empty() {
        ErrorScan::Clean
    } else {
        ErrorScan::Lines(lines)
    }
}

/// One distinct problem found in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub category: Category,
    pub message: String,
    /// Times this exact message appeared.
    pub occurrences: usize,
    /// Further stack frames folded into this entry.
    pub folded_frames: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriageReport {
    pub issues: Vec<Issue>,
    /// Every error line, in order.
    pub context: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriageOutcome {
    NoLogs,
    Clean,
    Report(TriageReport),
}

/// Classifies every error line in `text`.
///
/// Stack frames fold into the issue of the first frame only while they are
/// adjacent in the raw text; any other line ends the trace.
pub fn triage(text: Option<&str>) -> TriageOutcome {
    let Some(text) = text.filter(|t| !t.trim().is_empty()) else {
        return TriageOutcome::NoLogs;
    };

    let mut issues: Vec<Issue> = Vec::new();
    let mut context: Vec<String> = Vec::new();
    let mut seen: HashMap<(Category, String), usize> = HashMap::new();
    let mut current_trace: Option<usize> = None;

    for line in text.lines() {
        let Some(category) = classify(line) else {
            current_trace = None;
            continue;
        };
        context.push(line.to_string());

        if category == Category::StackTrace {
            if let Some(idx) = current_trace {
                issues[idx].folded_frames += 1;
                continue;
            }
        }

        let message = line.trim().to_string();
        let idx = match seen.get(&(category, message.clone())) {
            Some(&idx) => {
                issues[idx].occurrences += 1;
                idx
            }
            None => {
                issues.push(Issue {
                    category,
                    message: message.clone(),
                    occurrences: 1,
                    folded_frames: 0,
                });
                seen.insert((category, message), issues.len() - 1);
                issues.len() - 1
            }
        };

        current_trace = (category == Category::StackTrace).then_some(idx);
    }

    if issues.is_empty() {
        return TriageOutcome::Clean;
    }
    TriageOutcome::Report(TriageReport { issues, context })
}

impl TriageReport {
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Error report: {} unique issue(s) found",
            self.issues.len()
        );
        out.push('\n');

        for (i, issue) in self.issues.iter().take(MAX_DISPLAYED_ISSUES).enumerate() {
            let _ = write!(out, "{}. [{}] {}", i + 1, issue.category.label(), issue.message);
            if issue.occurrences > 1 {
                let _ = write!(out, " (x{})", issue.occurrences);
            }
            if issue.folded_frames > 0 {
                let _ = write!(out, " (+{} more frames)", issue.folded_frames);
            }
            out.push('\n');
        }
        if self.issues.len() > MAX_DISPLAYED_ISSUES {
            let _ = writeln!(
                out,
                "... and {} more issue(s)",
                self.issues.len() - MAX_DISPLAYED_ISSUES
            );
        }

        out.push_str("\n--- Error context ---\n");
        for line in &self.context {
            out.push_str(line);
            out.push('\n');
        }

        out.push_str("\n--- Suggested next actions ---\n");
        for (i, action) in SUGGESTED_ACTIONS.iter().enumerate() {
            let _ = writeln!(out, "{}. {}", i + 1, action);
        }
        out
    }
}

impl TriageOutcome {
    pub fn render(&self) -> String {
        match self {
            TriageOutcome::NoLogs => format!("{NO_LOGS_MESSAGE}\n"),
            TriageOutcome::Clean => format!("{NO_ERRORS_MESSAGE}\n"),
            TriageOutcome::Report(report) => report.render(),
        }
    }
}

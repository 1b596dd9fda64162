//! Diagnostic reporting for the KernelScript compiler pipeline.
//!
//! Two layers live here: [`CompileError`], the closed taxonomy every
//! pipeline stage returns (see the error handling section of the
//! design doc), and [`Diagnostic`]/[`DiagnosticEngine`], a Rust-style
//! pretty-printer used by the driver to render one onto the terminal.
//! The pipeline itself never formats a string for a human; it returns
//! `Result<_, CompileError>` and lets the driver decide how to show it.

use colored::Colorize;
use std::fmt;

/// Source code location with an attached highlight length, used only
/// for pretty-printing. Pipeline stages pass around `ks_ast::Position`
/// and attach a length (usually 1) when they need to render one.
#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    pub file: String,
    pub line: usize,
    pub column: usize,
    pub length: usize,
}

impl Span {
    pub fn new(file: String, line: usize, column: usize, length: usize) -> Self {
        Self {
            file,
            line,
            column,
            length,
        }
    }

    pub fn unknown() -> Self {
        Self {
            file: "<unknown>".to_string(),
            line: 0,
            column: 0,
            length: 0,
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// The closed set of errors every stage of the pipeline can produce.
/// The first one raised aborts the pipeline, except inside the type
/// checker, which is allowed to collect several before giving up.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CompileError {
    #[error("{pos}: parse error: {message}")]
    ParseError { pos: PosInfo, message: String },

    #[error("{pos}: duplicate symbol `{name}`")]
    DuplicateSymbol { pos: PosInfo, name: String },

    #[error("{pos}: cannot find `{name}` in this scope")]
    UnresolvedSymbol {
        pos: PosInfo,
        name: String,
        suggestions: Vec<String>,
    },

    #[error("{pos}: type mismatch: expected `{expected}`, found `{got}`")]
    TypeMismatch {
        pos: PosInfo,
        expected: String,
        got: String,
    },

    #[error("{pos}: `{name}` is not callable")]
    NotCallable { pos: PosInfo, name: String },

    #[error("{pos}: `{name}` expects {expected} argument(s), found {found}")]
    ArityMismatch {
        pos: PosInfo,
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("{pos}: invalid `main` signature: {reason}")]
    InvalidMainSignature { pos: PosInfo, reason: String },

    #[error("no `main` function is declared")]
    MissingMain,

    #[error("{pos}: a `main` function was already declared")]
    MultipleMain { pos: PosInfo },

    #[error("{pos}: `{name}` is `@private` and not exposed to eBPF context `{caller}`")]
    PrivateNotExposed {
        pos: PosInfo,
        name: String,
        caller: String,
    },

    #[error("{pos}: attribute misuse on `{name}`: {reason}")]
    AttributeMisuse {
        pos: PosInfo,
        name: String,
        reason: String,
    },

    #[error("{pos}: unknown attribute `@{name}`")]
    UnknownAttribute { pos: PosInfo, name: String },

    #[error("{pos}: invalid map usage on `{name}`: {reason}")]
    MapMisuse {
        pos: PosInfo,
        name: String,
        reason: String,
    },

    #[error("{pos}: construct would be rejected by the eBPF verifier: {reason}")]
    VerifierWouldReject { pos: PosInfo, reason: String },
}

impl CompileError {
    /// Anything here is a compilation error (exit code 1), as opposed
    /// to an I/O failure (2) the driver detects itself.
    pub fn exit_code(&self) -> i32 {
        1
    }

    /// `file:line:col: kind: message`.
    pub fn format_line(&self) -> String {
        let (pos, kind) = match self {
            CompileError::ParseError { pos, .. } => (pos.clone(), "ParseError"),
            CompileError::DuplicateSymbol { pos, .. } => (pos.clone(), "DuplicateSymbol"),
            CompileError::UnresolvedSymbol { pos, .. } => (pos.clone(), "UnresolvedSymbol"),
            CompileError::TypeMismatch { pos, .. } => (pos.clone(), "TypeMismatch"),
            CompileError::NotCallable { pos, .. } => (pos.clone(), "NotCallable"),
            CompileError::ArityMismatch { pos, .. } => (pos.clone(), "ArityMismatch"),
            CompileError::InvalidMainSignature { pos, .. } => {
                (pos.clone(), "InvalidMainSignature")
            }
            CompileError::MissingMain => (PosInfo::unknown(), "MissingMain"),
            CompileError::MultipleMain { pos } => (pos.clone(), "MultipleMain"),
            CompileError::PrivateNotExposed { pos, .. } => (pos.clone(), "PrivateNotExposed"),
            CompileError::AttributeMisuse { pos, .. } => (pos.clone(), "AttributeMisuse"),
            CompileError::UnknownAttribute { pos, .. } => (pos.clone(), "UnknownAttribute"),
            CompileError::MapMisuse { pos, .. } => (pos.clone(), "MapMisuse"),
            CompileError::VerifierWouldReject { pos, .. } => (pos.clone(), "VerifierWouldReject"),
        };
        let message = self.to_string();
        // `message` already carries "pos: " from the Display impl above for
        // variants that have one; strip it so it isn't duplicated.
        let message = message
            .strip_prefix(&format!("{pos}: "))
            .unwrap_or(&message);
        format!("{pos}: {kind}: {message}")
    }
}

/// Lightweight stand-in for `ks_ast::Position` so this crate doesn't
/// need to depend on `ks-ast` just to print an error. `ks-compiler`
/// converts at the boundary with `From`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PosInfo {
    pub file: String,
    pub line: usize,
    pub column: usize,
}

impl PosInfo {
    pub fn new(file: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }

    pub fn unknown() -> Self {
        Self {
            file: "<unknown>".to_string(),
            line: 0,
            column: 0,
        }
    }
}

impl fmt::Display for PosInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Error severity levels for the pretty-printer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorLevel {
    Error,
    Warning,
    Note,
    Help,
}

impl fmt::Display for ErrorLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorLevel::Error => write!(f, "{}", "error".red().bold()),
            ErrorLevel::Warning => write!(f, "{}", "warning".yellow().bold()),
            ErrorLevel::Note => write!(f, "{}", "note".cyan().bold()),
            ErrorLevel::Help => write!(f, "{}", "help".green().bold()),
        }
    }
}

/// A renderable diagnostic: one `CompileError`, plus whatever
/// annotations the driver wants to attach before printing.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub level: ErrorLevel,
    pub kind: String,
    pub message: String,
    pub span: Span,
    pub notes: Vec<String>,
    pub help: Option<String>,
}

impl Diagnostic {
    pub fn new(level: ErrorLevel, kind: &str, message: String, span: Span) -> Self {
        Self {
            level,
            kind: kind.to_string(),
            message,
            span,
            notes: Vec::new(),
            help: None,
        }
    }

    pub fn with_note(mut self, note: String) -> Self {
        self.notes.push(note);
        self
    }

    pub fn with_help(mut self, help: String) -> Self {
        self.help = Some(help);
        self
    }

    /// Render with a source snippet and a `^^^` underline, in the
    /// style of rustc's diagnostics.
    pub fn format(&self, source_code: &str) -> String {
        let mut output = String::new();
        output.push_str(&format!(
            "{}[{}]: {}\n",
            self.level,
            self.kind,
            self.message.bold()
        ));
        output.push_str(&format!(
            " {} {}:{}:{}\n",
            "-->".cyan().bold(),
            self.span.file,
            self.span.line,
            self.span.column
        ));

        if let Some(snippet) = self.source_snippet(source_code) {
            output.push_str(&snippet);
        }
        for note in &self.notes {
            output.push_str(&format!(" {} {}\n", "=".cyan().bold(), note.cyan()));
        }
        if let Some(help) = &self.help {
            output.push_str(&format!(" {} {}\n", "help:".green().bold(), help));
        }
        output
    }

    fn source_snippet(&self, source_code: &str) -> Option<String> {
        let lines: Vec<&str> = source_code.lines().collect();
        if self.span.line == 0 || self.span.line > lines.len() {
            return None;
        }
        let line = lines[self.span.line - 1];
        let width = self.span.line.to_string().len().max(2);
        let mut snippet = String::new();
        snippet.push_str(&format!(" {}\n", " ".repeat(width + 1).cyan()));
        snippet.push_str(&format!(
            " {} {} {}\n",
            format!("{:>width$}", self.span.line, width = width)
                .cyan()
                .bold(),
            "|".cyan().bold(),
            line
        ));
        let padding = " ".repeat(width + 3 + self.span.column.saturating_sub(1));
        let underline = "^".repeat(self.span.length.max(1));
        snippet.push_str(&format!(
            " {} {}{}\n",
            " ".repeat(width + 1).cyan(),
            padding,
            underline.red().bold()
        ));
        Some(snippet)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}[{}]: {} --> {}:{}:{}",
            self.level, self.kind, self.message, self.span.file, self.span.line, self.span.column
        )
    }
}

/// Collects diagnostics for a single compilation run and prints a
/// summary line, the way a driver would after the pipeline aborts.
#[derive(Debug, Default)]
pub struct DiagnosticEngine {
    diagnostics: Vec<Diagnostic>,
    error_count: usize,
    warning_count: usize,
}

impl DiagnosticEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, diagnostic: Diagnostic) {
        match diagnostic.level {
            ErrorLevel::Error => self.error_count += 1,
            ErrorLevel::Warning => self.warning_count += 1,
            _ => {}
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn print_all(&self, source_code: &str) {
        for diag in &self.diagnostics {
            eprintln!("{}", diag.format(source_code));
        }
    }

    pub fn print_summary(&self) {
        if self.error_count > 0 {
            eprintln!(
                "\n{}: {} error{} emitted",
                "error".red().bold(),
                self.error_count,
                if self.error_count == 1 { "" } else { "s" }
            );
        }
        if self.warning_count > 0 {
            eprintln!(
                "{}: {} warning{} emitted",
                "warning".yellow().bold(),
                self.warning_count,
                if self.warning_count == 1 { "" } else { "s" }
            );
        }
    }
}

/// Fuzzy matching used to build `UnresolvedSymbol` "did you mean?"
/// suggestions.
pub mod fuzzy {
    use strsim::jaro_winkler;

    pub fn find_similar_names(
        target: &str,
        candidates: &[String],
        threshold: f64,
        max_suggestions: usize,
    ) -> Vec<String> {
        let mut scored: Vec<(String, f64)> = candidates
            .iter()
            .map(|candidate| (candidate.clone(), jaro_winkler(target, candidate)))
            .filter(|(_, score)| *score > threshold)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().take(max_suggestions).map(|(n, _)| n).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_line_matches_file_line_col_kind_message() {
        let err = CompileError::MissingMain;
        assert_eq!(err.format_line(), "<unknown>:0:0: MissingMain: no `main` function is declared");
    }

    #[test]
    fn diagnostic_snippet_underlines_the_right_column() {
        let diag = Diagnostic::new(
            ErrorLevel::Error,
            "TypeMismatch",
            "mismatched types".to_string(),
            Span::new("prog.ks".to_string(), 1, 5, 3),
        );
        let rendered = diag.format("let x: u32 = true;");
        assert!(rendered.contains("prog.ks:1:5"));
        assert!(rendered.contains("^^^"));
    }

    #[test]
    fn fuzzy_suggestions_prefer_close_names() {
        let candidates = vec!["packet_count".to_string(), "limit".to_string()];
        let found = fuzzy::find_similar_names("packet_counts", &candidates, 0.7, 3);
        assert_eq!(found, vec!["packet_count".to_string()]);
    }
}

//! Diagnostic rendering for the `fictc` CLI and for the structurizer's
//! non-fatal state-machine-fallback warning (spec.md §4.4, §7). The core
//! analyzers never call into this module directly — they return
//! `CompileError` and let the caller decide how to surface it — but the
//! structurizer and the directive layer (`src/directives.rs`) use it to
//! build the one warning/suppression case the spec allows to be non-fatal.

use crate::errors::CompileError;

/// ANSI color codes, kept as plain constants the way the teacher's CLI does
/// rather than reaching for a terminal-capability-detecting crate.
pub mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const RED: &str = "\x1b[31m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const CYAN: &str = "\x1b[36m";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn color(&self) -> &'static str {
        match self {
            Severity::Error => colors::RED,
            Severity::Warning => colors::YELLOW,
            Severity::Info => colors::CYAN,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceLocation {
    pub file: String,
    pub function: Option<String>,
    pub block_id: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub location: Option<SourceLocation>,
    pub code: Option<String>,
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic { severity: Severity::Error, message: message.into(), location: None, code: None, notes: Vec::new() }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Diagnostic { severity: Severity::Warning, message: message.into(), location: None, code: None, notes: Vec::new() }
    }

    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn from_error(err: &CompileError) -> Self {
        let mut diag = Diagnostic::error(err.message.clone()).with_code(err.kind.code());
        if let Some(func) = &err.context.file {
            diag = diag.at(SourceLocation { file: func.clone(), function: None, block_id: err.context.block_id });
        }
        if let Some(remediation) = &err.remediation {
            diag = diag.with_note(remediation.clone());
        }
        diag
    }

    pub fn render(&self) -> String {
        let mut out = format!(
            "{bold}{color}{sev}:{reset} {bold}{msg}{reset}",
            bold = colors::BOLD,
            color = self.severity.color(),
            sev = self.severity.label(),
            reset = colors::RESET,
            msg = self.message,
        );
        if let Some(loc) = &self.location {
            out.push_str(&format!("\n  {dim}-->{reset} {file}", dim = colors::DIM, reset = colors::RESET, file = loc.file));
            if let Some(func) = &loc.function {
                out.push_str(&format!(" ({})", func));
            }
            if let Some(block) = loc.block_id {
                out.push_str(&format!(" [block {}]", block));
            }
        }
        if let Some(code) = &self.code {
            out.push_str(&format!("\n  {dim}[{code}]{reset}", dim = colors::DIM, reset = colors::RESET, code = code));
        }
        for note in &self.notes {
            out.push_str(&format!("\n  {cyan}note:{reset} {note}", cyan = colors::CYAN, reset = colors::RESET, note = note));
        }
        out
    }
}

/// Collects diagnostics across an entire compile-program invocation (one
/// function's `VALIDATION_ERROR`/`CYCLE_ERROR` aborts just that function;
/// structurizer fallbacks accumulate here as warnings instead).
#[derive(Debug, Default)]
pub struct DiagnosticCollector {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn render_all(&self) -> String {
        self.diagnostics.iter().map(Diagnostic::render).collect::<Vec<_>>().join("\n\n")
    }
}

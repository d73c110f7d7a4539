//! Suppression directives and `"use no memo"` (spec.md §4.8, SPEC_FULL.md §B).
//!
//! Directives are plain string literals the builder collects from a
//! function's (or program's) leading statements — `ir::FunctionFlags::directives`
//! — plus inline `fict-ignore` / `fict-ignore-next-line CODE` comments the
//! lowerer is told about out of band (the core has no source text of its
//! own; a host passes suppression spans through [`InlineSuppressions`]).

use crate::errors::ErrorKind;
use std::collections::HashSet;

pub const USE_FICT_COMPILER: &str = "use fict-compiler";
pub const USE_FICT_COMPILER_DISABLE: &str = "use fict-compiler-disable";
pub const USE_NO_MEMO: &str = "use no memo";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectiveState {
    /// The compiler is active for this function at all. When `false` (a
    /// `"use fict-compiler-disable"` directive is present), the lowerer
    /// re-emits the function body unchanged — no getter rewriting, no
    /// region/memo wrapping.
    pub compiler_enabled: bool,
    /// Plain assignments and getter rewriting still happen; region/memo
    /// wrapping is suppressed (spec.md §4.8).
    pub no_memo: bool,
}

impl Default for DirectiveState {
    fn default() -> Self {
        DirectiveState { compiler_enabled: true, no_memo: false }
    }
}

/// Resolves program-level and function-level directive strings into the
/// gating flags the region generator and lowerer consult. Function-level
/// directives override (narrow) program-level ones; neither can re-enable
/// what the other disabled.
pub fn resolve(program_directives: &[String], function_directives: &[String]) -> DirectiveState {
    let mut state = DirectiveState::default();
    for text in program_directives.iter().chain(function_directives.iter()) {
        match text.as_str() {
            USE_FICT_COMPILER_DISABLE => state.compiler_enabled = false,
            USE_NO_MEMO => state.no_memo = true,
            USE_FICT_COMPILER => {}
            _ => {}
        }
    }
    state
}

/// A suppressed diagnostic code at a specific 1-indexed source line, or a
/// blanket suppression of the line immediately following it
/// (`fict-ignore-next-line CODE`). `fict-ignore` with no code suppresses
/// every diagnostic code on its own line.
#[derive(Debug, Clone)]
pub enum InlineSuppression {
    Line { line: usize, code: Option<String> },
    NextLine { line: usize, code: String },
}

#[derive(Debug, Clone, Default)]
pub struct InlineSuppressions {
    entries: Vec<InlineSuppression>,
}

impl InlineSuppressions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, suppression: InlineSuppression) {
        self.entries.push(suppression);
    }

    /// True if a diagnostic of `kind` raised at `line` should be suppressed.
    pub fn suppresses(&self, line: usize, kind: ErrorKind) -> bool {
        let code = kind.code();
        self.entries.iter().any(|s| match s {
            InlineSuppression::Line { line: l, code: c } => *l == line && c.as_deref().map(|c| c == code).unwrap_or(true),
            InlineSuppression::NextLine { line: l, code: c } => *l + 1 == line && c == code,
        })
    }
}

/// Parses the fixed set of recognized codes out of a raw `fict-ignore[-next-line] [CODE]`
/// comment body found at `line` (1-indexed), as a host's comment-scanning
/// pass would hand them to the core. Unknown trailing tokens are ignored.
pub fn parse_inline_comment(line: usize, comment_body: &str) -> Option<InlineSuppression> {
    let body = comment_body.trim();
    if let Some(rest) = body.strip_prefix("fict-ignore-next-line") {
        let code = rest.trim();
        if code.is_empty() {
            return None;
        }
        return Some(InlineSuppression::NextLine { line, code: code.to_string() });
    }
    if let Some(rest) = body.strip_prefix("fict-ignore") {
        let code = rest.trim();
        let code = if code.is_empty() { None } else { Some(code.to_string()) };
        return Some(InlineSuppression::Line { line, code });
    }
    None
}

/// True if `text` is one of the three recognized directive strings — used
/// by the pipeline to pick program-level directives out of a `Program`'s
/// opaque top-level items without re-parsing anything.
pub fn known_directive_string(text: &str) -> bool {
    matches!(text, USE_FICT_COMPILER | USE_FICT_COMPILER_DISABLE | USE_NO_MEMO)
}

/// The fixed set of diagnostic codes directives/suppressions can name,
/// mirrored here purely for validation in the `fictc --explain` path.
pub fn known_codes() -> HashSet<&'static str> {
    [
        ErrorKind::BuildError,
        ErrorKind::SsaError,
        ErrorKind::StructurizeError,
        ErrorKind::CodegenError,
        ErrorKind::ScopeError,
        ErrorKind::ValidationError,
        ErrorKind::CycleError,
        ErrorKind::DepthExceeded,
    ]
    .iter()
    .map(|k| k.code())
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_level_no_memo_is_detected() {
        let state = resolve(&[], &[USE_NO_MEMO.to_string()]);
        assert!(state.no_memo);
        assert!(state.compiler_enabled);
    }

    #[test]
    fn program_level_disable_propagates() {
        let state = resolve(&[USE_FICT_COMPILER_DISABLE.to_string()], &[]);
        assert!(!state.compiler_enabled);
    }

    #[test]
    fn inline_ignore_next_line_suppresses_following_line_only() {
        let mut s = InlineSuppressions::new();
        s.add(parse_inline_comment(10, "fict-ignore-next-line CYCLE_ERROR").unwrap());
        assert!(s.suppresses(11, ErrorKind::CycleError));
        assert!(!s.suppresses(10, ErrorKind::CycleError));
        assert!(!s.suppresses(11, ErrorKind::ValidationError));
    }

    #[test]
    fn bare_ignore_suppresses_all_codes_on_its_line() {
        let mut s = InlineSuppressions::new();
        s.add(parse_inline_comment(5, "fict-ignore").unwrap());
        assert!(s.suppresses(5, ErrorKind::CycleError));
        assert!(s.suppresses(5, ErrorKind::ValidationError));
    }
}

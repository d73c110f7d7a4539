//! Error taxonomy (spec.md §7). Every fallible stage returns
//! `Result<T, CompileError>`; nothing is swallowed except the
//! structurizer's state-machine fallback, which recovers locally and
//! reports a `Diagnostic` warning instead (see `src/diagnostics.rs`).

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorContext {
    pub file: Option<String>,
    pub line: Option<usize>,
    pub block_id: Option<u32>,
    pub variable: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_block(mut self, block_id: u32) -> Self {
        self.block_id = Some(block_id);
        self
    }

    pub fn with_variable(mut self, variable: impl Into<String>) -> Self {
        self.variable = Some(variable.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    BuildError,
    SsaError,
    StructurizeError,
    CodegenError,
    ScopeError,
    ValidationError,
    CycleError,
    DepthExceeded,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::BuildError => "BUILD_ERROR",
            ErrorKind::SsaError => "SSA_ERROR",
            ErrorKind::StructurizeError => "STRUCTURIZE_ERROR",
            ErrorKind::CodegenError => "CODEGEN_ERROR",
            ErrorKind::ScopeError => "SCOPE_ERROR",
            ErrorKind::ValidationError => "VALIDATION_ERROR",
            ErrorKind::CycleError => "CYCLE_ERROR",
            ErrorKind::DepthExceeded => "DEPTH_EXCEEDED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub kind: ErrorKind,
    pub message: String,
    pub context: ErrorContext,
    pub remediation: Option<String>,
}

impl CompileError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        CompileError { kind, message: message.into(), context: ErrorContext::new(), remediation: None }
    }

    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_remediation(mut self, text: impl Into<String>) -> Self {
        self.remediation = Some(text.into());
        self
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationError, message)
    }

    pub fn cycle(cycle_description: impl Into<String>) -> Self {
        Self::new(ErrorKind::CycleError, format!("cyclic derived dependency: {}", cycle_description.into()))
    }

    pub fn codegen(message: impl Into<String>, remediation: impl Into<String>) -> Self {
        Self::new(ErrorKind::CodegenError, message).with_remediation(remediation)
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.code(), self.message)?;
        if let Some(block) = self.context.block_id {
            write!(f, " (block {})", block)?;
        }
        if let Some(var) = &self.context.variable {
            write!(f, " (variable `{}`)", var)?;
        }
        if let Some(remediation) = &self.remediation {
            write!(f, " — {}", remediation)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileError {}

pub type CompileResult<T> = Result<T, CompileError>;

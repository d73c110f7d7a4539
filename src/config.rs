//! Compiler configuration (spec.md §5, §6). Read once per
//! [`crate::pipeline::Compiler::compile_function`] call and passed by
//! reference through the pipeline — never a process global.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Which call names are recognized as reactivity-primitive creators.
/// Configurable rather than hardcoded so a host build tool can alias the
/// runtime import (spec.md §6 Runtime contract names are stable identifiers,
/// but the *surface* spelling a project imports them under need not be).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoMacroNames {
    pub state: String,
    pub store: String,
    pub memo: String,
    pub effect: String,
}

impl Default for MemoMacroNames {
    fn default() -> Self {
        MemoMacroNames {
            state: "$state".to_string(),
            store: "$store".to_string(),
            memo: "$memo".to_string(),
            effect: "$effect".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Cross-block constant propagation (spec.md §4.6(b)). Enabled by
    /// default; disabled by `FICT_NO_CROSS_BLOCK_CONSTPROP=1` or explicitly.
    pub cross_block_const_prop: bool,
    pub memo_macro_names: MemoMacroNames,
    /// Pure callees beyond the fixed built-in set (spec.md §4.6(a)); merged
    /// with, not replacing, the built-in set in `src/optimize/purity.rs`.
    pub extra_pure_callees: HashSet<String>,
    /// Bound on structurizer recursion depth and optimizer fixpoint
    /// iterations before raising `DEPTH_EXCEEDED` (spec.md §7).
    pub max_structurize_depth: usize,
    pub max_fixpoint_iterations: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            cross_block_const_prop: std::env::var("FICT_NO_CROSS_BLOCK_CONSTPROP").is_err(),
            memo_macro_names: MemoMacroNames::default(),
            extra_pure_callees: HashSet::new(),
            max_structurize_depth: 4096,
            max_fixpoint_iterations: 10_000,
        }
    }
}

impl CompilerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without_cross_block_const_prop(mut self) -> Self {
        self.cross_block_const_prop = false;
        self
    }
}

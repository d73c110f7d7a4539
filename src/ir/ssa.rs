//! SSA naming utilities (spec.md §3, §4.1 policies, §9 "Avoiding global
//! mutable state"). Base names carry an opaque versioned suffix recognized
//! only for names the compiler itself produced; a user identifier that
//! happens to contain the separator is left alone.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Separator between a base name and its SSA version, e.g. `count$$3`.
/// Chosen to be something no JS identifier can ever contain, so
/// `is_generated_suffix` can't misfire on user code.
const SSA_SEPARATOR: &str = "$$";
/// Prefix reserved for compiler-generated temporaries (spec.md §3
/// "Compiler-generated temporaries use a reserved double-underscore
/// prefix").
pub const TEMP_PREFIX: &str = "__";

fn ssa_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(.*)\$\$(\d+)$").expect("static SSA regex is valid"))
}

/// Tracks which versioned names were produced by this naming utility, so
/// `base_name`/`de_version` only strip the suffix from names this instance
/// actually generated — never from a user name that coincidentally matches
/// the separator pattern (spec.md §3: "user identifiers that coincidentally
/// match are left unversioned"). Owned per-function, not a process global
/// (spec.md §9).
#[derive(Debug, Default)]
pub struct SsaNamer {
    generated: HashSet<String>,
    next_version: std::collections::HashMap<String, u32>,
}

impl SsaNamer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Produces the next SSA version of `base`, e.g. `count` -> `count$$1`,
    /// `count$$1` -> `count$$2` (idempotent de-versioning first).
    pub fn version(&mut self, base: &str) -> String {
        let base = base_name(base);
        let next = self.next_version.entry(base.clone()).or_insert(0);
        *next += 1;
        let versioned = format!("{base}{SSA_SEPARATOR}{next}");
        self.generated.insert(versioned.clone());
        versioned
    }

    pub fn max_version(&self, base: &str) -> u32 {
        *self.next_version.get(base).unwrap_or(&0)
    }

    pub fn fresh_temp(&mut self, hint: &str) -> String {
        let base = format!("{TEMP_PREFIX}{hint}");
        self.version(&base)
    }

    pub fn is_compiler_generated(&self, name: &str) -> bool {
        name.starts_with(TEMP_PREFIX) || self.generated.contains(name)
    }
}

/// True if `name` matches the SSA suffix pattern at all (used by the
/// fallback path when no `SsaNamer` is in scope, e.g. pretty-printers).
pub fn looks_versioned(name: &str) -> bool {
    ssa_pattern().is_match(name)
}

/// Strips a trailing `$$N` suffix if present. Idempotent: applying it twice
/// equals applying it once, since the result never matches the pattern
/// again (spec.md §8 testable property 3).
pub fn base_name(name: &str) -> String {
    match ssa_pattern().captures(name) {
        Some(caps) => caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_else(|| name.to_string()),
        None => name.to_string(),
    }
}

/// Names beginning with the compiler-reserved prefix are never versioned
/// (spec.md §4.1 "Policies").
pub fn is_reserved_prefix(name: &str) -> bool {
    name.starts_with(TEMP_PREFIX)
}

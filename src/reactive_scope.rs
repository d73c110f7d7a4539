//! Reactive-scope analyzer (spec.md §4.2): per-variable scopes, dependency
//! paths, escape detection, scope merging/pruning, and the derived-value
//! cycle check.

use crate::cfg::CfgAnalysis;
use crate::config::CompilerConfig;
use crate::errors::CompileError;
use crate::ir::ssa;
use crate::ir::{BlockId, Expression, Function, Instruction, Literal, MemberKey, Terminator};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
pub struct PathSegment {
    pub property: String,
    pub optional: bool,
    pub computed: bool,
}

#[derive(Debug, Clone)]
pub struct DependencyPath {
    pub base: String,
    pub segments: Vec<PathSegment>,
    pub has_optional: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ReactiveScope {
    pub id: u32,
    pub declarations: HashSet<String>,
    pub writes: HashSet<String>,
    pub reads: HashMap<String, u32>,
    pub blocks: HashSet<BlockId>,
    pub dependencies: HashSet<String>,
    pub dependency_paths: HashMap<String, Vec<DependencyPath>>,
    pub has_external_effect: bool,
    pub should_memoize: bool,
    pub merged_from: Vec<u32>,
    /// True when the scope's sole write is a direct call to a reactivity
    /// creator (`$state`/`$store`) — excluded from the derived-dependency
    /// cycle check (spec.md §4.2 "non-state variables").
    pub is_hook_root: bool,
}

#[derive(Debug, Default)]
pub struct ReactiveScopeAnalysis {
    pub scopes: Vec<ReactiveScope>,
    pub definition_scope: HashMap<String, u32>,
    pub optional_only_bases: HashSet<String>,
    pub required_bases: HashSet<String>,
}

impl ReactiveScopeAnalysis {
    pub fn scope(&self, id: u32) -> Option<&ReactiveScope> {
        self.scopes.iter().find(|s| s.id == id)
    }

    pub fn scope_for(&self, base: &str) -> Option<&ReactiveScope> {
        self.definition_scope.get(base).and_then(|id| self.scope(*id))
    }

    /// The set of tracked variable base names (spec.md GLOSSARY "Tracked
    /// variable"): `$state`/`$store` roots and anything transitively derived
    /// from one. Computed lazily from `definition_scope` + each scope's
    /// `dependencies` rather than stored, since it's only needed by the
    /// optimizer's reactive-aware passes and the lowerer, not by the
    /// analysis itself.
    pub fn tracked_bases(&self) -> HashSet<String> {
        let mut tracked: HashSet<String> = HashSet::new();
        let mut worklist: Vec<u32> = self.scopes.iter().filter(|s| s.is_hook_root).map(|s| s.id).collect();
        let mut visited_roots: HashSet<u32> = HashSet::new();
        while let Some(id) = worklist.pop() {
            if !visited_roots.insert(id) {
                continue;
            }
            if let Some(scope) = self.scope(id) {
                tracked.extend(scope.declarations.iter().cloned());
            }
        }
        // Fixpoint: a scope whose dependencies include a tracked base is
        // itself tracked (derived value), which may newly track further
        // dependents.
        let mut changed = true;
        while changed {
            changed = false;
            for scope in &self.scopes {
                if scope.declarations.iter().all(|d| tracked.contains(d)) {
                    continue;
                }
                if scope.dependencies.iter().any(|d| tracked.contains(d)) {
                    for d in &scope.declarations {
                        changed |= tracked.insert(d.clone());
                    }
                }
            }
        }
        tracked
    }

    pub fn is_tracked(&self, base: &str) -> bool {
        self.tracked_bases().contains(base)
    }
}

pub fn analyze(function: &Function, _cfg: &CfgAnalysis, config: &CompilerConfig) -> Result<ReactiveScopeAnalysis, CompileError> {
    let mut scopes: HashMap<String, ReactiveScope> = HashMap::new();
    let mut next_id = 0u32;
    let mut path_log: Vec<DependencyPath> = Vec::new();

    let mut sorted_blocks: Vec<_> = function.blocks.iter().collect();
    sorted_blocks.sort_by_key(|b| b.id);

    for block in &sorted_blocks {
        for inst in &block.instructions {
            match inst {
                Instruction::Assign { target, value, .. } => {
                    let base = ssa::base_name(target);
                    let scope = scopes.entry(base.clone()).or_insert_with(|| fresh_scope(&mut next_id));
                    scope.declarations.insert(base.clone());
                    scope.writes.insert(target.clone());
                    scope.blocks.insert(block.id);
                    scope.is_hook_root = is_hook_call(value, config);

                    let mut paths = Vec::new();
                    collect_paths(value, &mut paths);
                    for path in &paths {
                        let b = ssa::base_name(&path.base);
                        *scope.reads.entry(b.clone()).or_insert(0) += 1;
                        scope.dependency_paths.entry(b).or_default().push(path.clone());
                    }
                    path_log.extend(paths);
                }
                Instruction::Phi { target, sources } => {
                    let base = ssa::base_name(target);
                    let scope = scopes.entry(base.clone()).or_insert_with(|| fresh_scope(&mut next_id));
                    scope.declarations.insert(base.clone());
                    scope.writes.insert(target.clone());
                    scope.blocks.insert(block.id);
                    for (_, name) in sources {
                        let b = ssa::base_name(name);
                        *scope.reads.entry(b.clone()).or_insert(0) += 1;
                        let path = DependencyPath { base: b.clone(), segments: Vec::new(), has_optional: false };
                        scope.dependency_paths.entry(b).or_default().push(path.clone());
                        path_log.push(path);
                    }
                }
                Instruction::Expression { .. } => {}
            }
        }
    }

    // Step 2: escape pass.
    let mut escaping_vars: HashSet<String> = HashSet::new();
    for block in &sorted_blocks {
        if let Terminator::Return(Some(expr)) = &block.terminator {
            let mut paths = Vec::new();
            collect_paths(expr, &mut paths);
            for p in paths {
                escaping_vars.insert(ssa::base_name(&p.base));
            }
        }
    }

    // Step 3: derive dependencies (reads that name another scope's declared base).
    let declared_bases: HashSet<String> = scopes.keys().cloned().collect();
    for scope in scopes.values_mut() {
        for r in scope.reads.keys() {
            if !scope.declarations.contains(r) && declared_bases.contains(r) {
                scope.dependencies.insert(r.clone());
            }
        }
    }

    // Step 4: escape propagation.
    for scope in scopes.values_mut() {
        if scope.declarations.iter().any(|d| escaping_vars.contains(d)) {
            scope.has_external_effect = true;
        }
    }

    // Step 5: memoization heuristic.
    let snapshot: HashMap<String, (usize, bool)> =
        scopes.iter().map(|(k, s)| (k.clone(), (s.writes.len(), !s.dependencies.is_empty()))).collect();
    for scope in scopes.values_mut() {
        let dep_is_substantial = scope.dependencies.iter().any(|dep| {
            snapshot.get(dep).map(|(write_count, has_deps)| *write_count > 1 || *has_deps).unwrap_or(false)
        });
        scope.should_memoize = (!scope.dependencies.is_empty() && dep_is_substantial) || scope.blocks.len() > 1;
    }

    // Step 6: overlap merge via union-find keyed by base name.
    let bases: Vec<String> = scopes.keys().cloned().collect();
    let mut parent: HashMap<String, String> = bases.iter().map(|b| (b.clone(), b.clone())).collect();

    fn find(parent: &mut HashMap<String, String>, x: &str) -> String {
        let p = parent.get(x).cloned().unwrap_or_else(|| x.to_string());
        if p == x {
            x.to_string()
        } else {
            let root = find(parent, &p);
            parent.insert(x.to_string(), root.clone());
            root
        }
    }
    fn union(parent: &mut HashMap<String, String>, a: &str, b: &str) {
        let ra = find(parent, a);
        let rb = find(parent, b);
        if ra != rb {
            parent.insert(ra, rb);
        }
    }

    for i in 0..bases.len() {
        for j in (i + 1)..bases.len() {
            let (a, b) = (&bases[i], &bases[j]);
            let (sa, sb) = (&scopes[a], &scopes[b]);
            let shares_block = sa.blocks.intersection(&sb.blocks).next().is_some();
            if !shares_block {
                continue;
            }
            let overlapping_deps = sa.dependencies.intersection(&sb.dependencies).next().is_some();
            let write_read_conflict = sa.writes.iter().any(|w| sb.reads.contains_key(&ssa::base_name(w)))
                || sb.writes.iter().any(|w| sa.reads.contains_key(&ssa::base_name(w)));
            if overlapping_deps || write_read_conflict {
                union(&mut parent, a, b);
            }
        }
    }

    let mut grouped: HashMap<String, Vec<String>> = HashMap::new();
    for base in &bases {
        let root = find(&mut parent, base);
        grouped.entry(root).or_default().push(base.clone());
    }

    let mut merged_scopes: Vec<ReactiveScope> = Vec::new();
    let mut definition_scope: HashMap<String, u32> = HashMap::new();
    for (_, members) in grouped {
        if members.len() == 1 {
            let scope = scopes.remove(&members[0]).expect("scope exists");
            for d in &scope.declarations {
                definition_scope.insert(d.clone(), scope.id);
            }
            merged_scopes.push(scope);
            continue;
        }
        let id = merged_scopes.len() as u32 + next_id;
        let mut merged = fresh_scope_with_id(id);
        merged.merged_from = members.iter().filter_map(|m| scopes.get(m).map(|s| s.id)).collect();
        for m in &members {
            let s = scopes.remove(m).expect("scope exists");
            merged.declarations.extend(s.declarations);
            merged.writes.extend(s.writes);
            for (k, v) in s.reads {
                *merged.reads.entry(k).or_insert(0) += v;
            }
            merged.blocks.extend(s.blocks);
            merged.dependencies.extend(s.dependencies);
            for (k, v) in s.dependency_paths {
                merged.dependency_paths.entry(k).or_default().extend(v);
            }
            merged.has_external_effect |= s.has_external_effect;
            merged.should_memoize |= s.should_memoize;
            merged.is_hook_root |= s.is_hook_root;
        }
        // Internal dependencies (now satisfied by the merged scope's own
        // declarations) are removed.
        merged.dependencies.retain(|d| !merged.declarations.contains(d));
        for d in &merged.declarations {
            definition_scope.insert(d.clone(), merged.id);
        }
        merged_scopes.push(merged);
    }

    // Step 7: prune. A scope survives if it has external effects, is
    // transitively required by one that does, or should memoize.
    let mut reachable: HashSet<u32> = HashSet::new();
    let mut worklist: Vec<u32> = merged_scopes.iter().filter(|s| s.has_external_effect).map(|s| s.id).collect();
    while let Some(id) = worklist.pop() {
        if !reachable.insert(id) {
            continue;
        }
        if let Some(scope) = merged_scopes.iter().find(|s| s.id == id) {
            for dep in &scope.dependencies {
                if let Some(&dep_id) = definition_scope.get(dep) {
                    if !reachable.contains(&dep_id) {
                        worklist.push(dep_id);
                    }
                }
            }
        }
    }
    merged_scopes.retain(|s| s.has_external_effect || reachable.contains(&s.id) || s.should_memoize);

    // Optional-chain classification, computed over every path observed
    // anywhere in the function (spec.md §4.2 "Optional-chain classification").
    let mut optional_only_bases = HashSet::new();
    let mut required_bases = HashSet::new();
    for path in &path_log {
        let base = ssa::base_name(&path.base);
        match path.segments.first() {
            Some(seg) if seg.optional => {
                optional_only_bases.insert(base);
            }
            _ => {
                required_bases.insert(base);
            }
        }
    }

    check_cycles(&merged_scopes)?;

    Ok(ReactiveScopeAnalysis { scopes: merged_scopes, definition_scope, optional_only_bases, required_bases })
}

fn fresh_scope(next_id: &mut u32) -> ReactiveScope {
    let id = *next_id;
    *next_id += 1;
    fresh_scope_with_id(id)
}

fn fresh_scope_with_id(id: u32) -> ReactiveScope {
    ReactiveScope {
        id,
        declarations: HashSet::new(),
        writes: HashSet::new(),
        reads: HashMap::new(),
        blocks: HashSet::new(),
        dependencies: HashSet::new(),
        dependency_paths: HashMap::new(),
        has_external_effect: false,
        should_memoize: false,
        merged_from: Vec::new(),
        is_hook_root: false,
    }
}

fn is_hook_call(value: &Expression, config: &CompilerConfig) -> bool {
    if let Expression::Call { callee, .. } = value {
        if let Expression::Identifier(name) = callee.as_ref() {
            return *name == config.memo_macro_names.state || *name == config.memo_macro_names.store;
        }
    }
    false
}

/// Builds a single [`DependencyPath`] for a pure `a.b[0].c` style chain;
/// `None` if any step along the chain isn't a literal or literal-computed
/// member access (spec.md §4.2/§9 "halts on non-literal computed
/// properties").
fn try_build_path(expr: &Expression) -> Option<DependencyPath> {
    let mut segments = Vec::new();
    let mut has_optional = false;
    let mut cur = expr;
    loop {
        match cur {
            Expression::Identifier(name) => {
                segments.reverse();
                return Some(DependencyPath { base: name.clone(), segments, has_optional });
            }
            Expression::Member { object, property, optional } => {
                let segment = match property {
                    MemberKey::Literal(name) => PathSegment { property: name.clone(), optional: *optional, computed: false },
                    MemberKey::Computed(inner) => match inner.as_ref() {
                        Expression::Literal(Literal::String(s)) => PathSegment { property: s.clone(), optional: *optional, computed: true },
                        Expression::Literal(Literal::Number(n)) => PathSegment { property: n.to_string(), optional: *optional, computed: true },
                        _ => return None,
                    },
                };
                if *optional {
                    has_optional = true;
                }
                segments.push(segment);
                cur = object;
            }
            _ => return None,
        }
    }
}

/// Walks `expr` collecting a [`DependencyPath`] for every distinct
/// member-chain or bare identifier it reads, falling back to a base-only
/// path when a chain can't be statically resolved (spec.md open question:
/// "conservative fallback collects only the base as a dependency").
fn collect_paths(expr: &Expression, out: &mut Vec<DependencyPath>) {
    match expr {
        Expression::Identifier(name) => out.push(DependencyPath { base: name.clone(), segments: Vec::new(), has_optional: false }),
        Expression::Member { object, property, .. } => {
            if let Some(path) = try_build_path(expr) {
                out.push(path);
            } else {
                collect_base_fallback(object, out);
                if let MemberKey::Computed(inner) = property {
                    collect_paths(inner, out);
                }
            }
        }
        Expression::Literal(_) | Expression::This | Expression::Super | Expression::Class(_) => {}
        Expression::Call { callee, arguments, .. } => {
            collect_paths(callee, out);
            arguments.iter().for_each(|a| collect_paths(a, out));
        }
        Expression::Binary { left, right, .. } | Expression::Logical { left, right, .. } => {
            collect_paths(left, out);
            collect_paths(right, out);
        }
        Expression::Unary { argument, .. } | Expression::SpreadElement(argument) | Expression::Await(argument) => collect_paths(argument, out),
        Expression::Conditional { test, consequent, alternate } => {
            collect_paths(test, out);
            collect_paths(consequent, out);
            collect_paths(alternate, out);
        }
        Expression::Array(elems) => elems.iter().for_each(|e| match e {
            crate::ir::ArrayElement::Item(e) | crate::ir::ArrayElement::Spread(e) => collect_paths(e, out),
            crate::ir::ArrayElement::Hole => {}
        }),
        Expression::Object(props) => props.iter().for_each(|p| match p {
            crate::ir::ObjectProperty::Field { value, .. } => collect_paths(value, out),
            crate::ir::ObjectProperty::Spread(e) => collect_paths(e, out),
        }),
        Expression::AssignmentExpression { target, value } => {
            collect_paths(target, out);
            collect_paths(value, out);
        }
        Expression::UpdateExpression { argument, .. } => collect_paths(argument, out),
        Expression::TemplateLiteral(parts) | Expression::TaggedTemplate { quasi: parts, .. } => {
            for part in parts {
                if let crate::ir::TemplatePart::Expression(e) = part {
                    collect_paths(e, out);
                }
            }
        }
        Expression::New { callee, arguments } => {
            collect_paths(callee, out);
            arguments.iter().for_each(|a| collect_paths(a, out));
        }
        Expression::Sequence(exprs) => exprs.iter().for_each(|e| collect_paths(e, out)),
        Expression::Yield { argument, .. } => {
            if let Some(e) = argument {
                collect_paths(e, out);
            }
        }
        Expression::Jsx(jsx) => {
            for attr in &jsx.attributes {
                match &attr.value {
                    crate::ir::JsxAttributeValue::Expression(e) | crate::ir::JsxAttributeValue::Spread(e) => collect_paths(e, out),
                }
            }
            for child in &jsx.children {
                collect_jsx_child_paths(child, out);
            }
        }
        // Nested function/arrow scopes are analyzed independently when the
        // pipeline recurses into them; their free variables aren't counted
        // as this scope's dependencies here.
        Expression::ArrowFunction { .. } | Expression::FunctionExpression(_) => {}
    }
}

fn collect_jsx_child_paths(child: &crate::ir::JsxChild, out: &mut Vec<DependencyPath>) {
    match child {
        crate::ir::JsxChild::Element(el) => {
            for attr in &el.attributes {
                match &attr.value {
                    crate::ir::JsxAttributeValue::Expression(e) | crate::ir::JsxAttributeValue::Spread(e) => collect_paths(e, out),
                }
            }
            for c in &el.children {
                collect_jsx_child_paths(c, out);
            }
        }
        crate::ir::JsxChild::Expression(e) => collect_paths(e, out),
        crate::ir::JsxChild::Text(_) => {}
    }
}

fn collect_base_fallback(expr: &Expression, out: &mut Vec<DependencyPath>) {
    match try_build_path(expr) {
        Some(path) => out.push(path),
        None => collect_paths(expr, out),
    }
}

/// Builds a derived-dependency graph restricted to single-assignment,
/// non-hook-root scopes (spec.md §4.2 "over single-assignment, declared-here,
/// non-state variables") and reports the first cycle found via DFS.
fn check_cycles(scopes: &[ReactiveScope]) -> Result<(), CompileError> {
    let derived: HashMap<u32, &ReactiveScope> = scopes
        .iter()
        .filter(|s| s.writes.len() == 1 && !s.is_hook_root)
        .map(|s| (s.id, s))
        .collect();
    let by_base: HashMap<&str, u32> = derived.values().flat_map(|s| s.declarations.iter().map(move |d| (d.as_str(), s.id))).collect();

    let mut marks: HashMap<u32, DfsMark> = HashMap::new();

    for &id in derived.keys() {
        if marks.contains_key(&id) {
            continue;
        }
        let mut path: Vec<u32> = Vec::new();
        if let Some(cycle) = dfs_cycle(id, &derived, &by_base, &mut marks, &mut path) {
            let names: Vec<String> = cycle
                .iter()
                .map(|id| derived.get(id).and_then(|s| s.declarations.iter().next()).cloned().unwrap_or_default())
                .collect();
            return Err(CompileError::cycle(names.join(" -> ")));
        }
    }
    Ok(())
}

fn dfs_cycle(
    id: u32,
    derived: &HashMap<u32, &ReactiveScope>,
    by_base: &HashMap<&str, u32>,
    marks: &mut HashMap<u32, DfsMark>,
    path: &mut Vec<u32>,
) -> Option<Vec<u32>> {
    marks.insert(id, DfsMark::InProgress);
    path.push(id);
    if let Some(scope) = derived.get(&id) {
        for dep in &scope.dependencies {
            if let Some(&dep_id) = by_base.get(dep.as_str()) {
                match marks.get(&dep_id) {
                    Some(DfsMark::InProgress) => {
                        let start = path.iter().position(|&p| p == dep_id).unwrap_or(0);
                        let mut cycle = path[start..].to_vec();
                        cycle.push(dep_id);
                        return Some(cycle);
                    }
                    Some(DfsMark::Done) => continue,
                    None => {
                        if let Some(cycle) = dfs_cycle(dep_id, derived, by_base, marks, path) {
                            return Some(cycle);
                        }
                    }
                }
            }
        }
    }
    path.pop();
    marks.insert(id, DfsMark::Done);
    None
}

#[derive(Clone, Copy, PartialEq)]
enum DfsMark {
    InProgress,
    Done,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg;
    use crate::ir::*;

    fn straight_line_derivation() -> Function {
        // a = b (param); b2 = a; return b2
        let b0 = BasicBlock {
            id: 0,
            instructions: vec![
                Instruction::Assign { target: "a".into(), value: Expression::Identifier("b".into()), declaration_kind: DeclarationKind::Const },
                Instruction::Assign { target: "b2".into(), value: Expression::Identifier("a".into()), declaration_kind: DeclarationKind::Const },
            ],
            terminator: Terminator::Return(Some(Expression::Identifier("b2".into()))),
        };
        Function { name: "f".into(), params: vec!["b".into()], raw_params: vec![], blocks: vec![b0], entry: 0, flags: FunctionFlags::default(), hook_return_info: None }
    }

    #[test]
    fn escaping_return_marks_external_effect() {
        let def = straight_line_derivation();
        let cfg_analysis = cfg::analyze(&def).unwrap();
        let config = CompilerConfig::default();
        let analysis = analyze(&def, &cfg_analysis, &config).unwrap();
        assert!(analysis.scope_for("b2").map(|s| s.has_external_effect).unwrap_or(false));
    }

    #[test]
    fn mutually_dependent_derivations_in_separate_blocks_raise_cycle_error() {
        // block0: x = y; block1: y = x — kept in separate blocks so the
        // overlap-merge step (which would otherwise fold same-block,
        // write/read-conflicting scopes into one and erase the cycle) does
        // not absorb them first.
        let b0 = BasicBlock {
            id: 0,
            instructions: vec![Instruction::Assign { target: "x".into(), value: Expression::Identifier("y".into()), declaration_kind: DeclarationKind::Const }],
            terminator: Terminator::Jump(1),
        };
        let b1 = BasicBlock {
            id: 1,
            instructions: vec![Instruction::Assign { target: "y".into(), value: Expression::Identifier("x".into()), declaration_kind: DeclarationKind::Const }],
            terminator: Terminator::Return(None),
        };
        let func = Function { name: "f".into(), params: vec![], raw_params: vec![], blocks: vec![b0, b1], entry: 0, flags: FunctionFlags::default(), hook_return_info: None };
        let cfg_analysis = cfg::analyze(&func).unwrap();
        let config = CompilerConfig::default();
        let err = analyze(&func, &cfg_analysis, &config).unwrap_err();
        assert_eq!(err.kind, crate::errors::ErrorKind::CycleError);
    }

    #[test]
    fn dependency_path_round_trips_through_member_chain() {
        let expr = Expression::Member {
            object: Box::new(Expression::Member {
                object: Box::new(Expression::Identifier("s".into())),
                property: MemberKey::Literal("user".into()),
                optional: false,
            }),
            property: MemberKey::Literal("name".into()),
            optional: false,
        };
        let path = try_build_path(&expr).unwrap();
        assert_eq!(path.base, "s");
        assert_eq!(path.segments.iter().map(|s| s.property.as_str()).collect::<Vec<_>>(), vec!["user", "name"]);
    }
}

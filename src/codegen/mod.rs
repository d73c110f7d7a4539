//! Reactive codegen / lowerer (spec.md §4.7): rewrites reads/writes of
//! tracked bindings into accessor-call form, wraps derived bindings and
//! effectful statements in the runtime's memo/effect helpers, lowers JSX to
//! `template`/binding calls (`src/codegen/jsx.rs`), and tracks which helper
//! names were actually used so a single import declaration can be emitted
//! at the end (spec.md §4.7 item 10).
//!
//! The lowerer operates directly on the IR rather than building a separate
//! target-AST type: every runtime helper in spec.md §6 is just a function
//! call, and `ir::Expression::Call`/`ir::ArrowFunction` already express
//! that, so "emit a call to `useMemo`" is just constructing an
//! `Expression::Call` node. `src/codegen/target.rs` turns the lowered IR
//! into source text for the CLI and for tests that assert on substrings of
//! emitted code.

pub mod jsx;
pub mod target;

use crate::config::CompilerConfig;
use crate::directives::DirectiveState;
use crate::errors::CompileError;
use crate::ir::ssa;
use crate::ir::{ArrowBody, BasicBlock, BinaryOp, Expression, Function, Instruction, Literal, Terminator, UpdateOp};
use crate::reactive_scope::ReactiveScopeAnalysis;
use crate::region::RegionAnalysis;
use crate::shape::ShapeAnalysis;
use std::collections::{HashMap, HashSet};

pub const CONTEXT_BINDING: &str = "__fictCtx";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Creator {
    State,
    Store,
    Memo,
    Effect,
}

#[derive(Debug, Default)]
pub struct LowerOutput {
    pub function: Function,
    pub helpers_used: HashSet<String>,
}

struct Lowerer<'a> {
    scopes: &'a ReactiveScopeAnalysis,
    shapes: &'a ShapeAnalysis,
    regions: &'a RegionAnalysis,
    directives: DirectiveState,
    config: &'a CompilerConfig,
    /// Tracked bases that read as a zero-arg call (signals, memos) — stores
    /// bases are tracked but read as plain proxy identifiers (spec.md §4.7
    /// item 1: "Store variables are not converted to calls").
    accessor_bases: HashSet<String>,
    store_bases: HashSet<String>,
    shadow: Vec<HashSet<String>>,
    helpers_used: HashSet<String>,
    next_slot: u32,
    is_component_scope: bool,
    /// Bases declared as a bare alias of a tracked identifier (`let x = y`
    /// where `y` is tracked). Reassigning such a base has no accessor to
    /// lower into — the binding reads as `y`'s own getter, not a setter `x`
    /// ever had — so a later reassignment is rejected (spec.md §9 "Reactive
    /// writes to aliases").
    aliases: HashSet<String>,
    /// SSA targets already fully lowered by [`Lowerer::fuse_lazy_conditionals`]
    /// (spec.md §4.7 item 6) — `lower_instruction` passes these through
    /// unchanged instead of rewriting/wrapping them a second time.
    lazy_fused: HashSet<String>,
}

pub fn lower_function(
    function: &Function,
    scopes: &ReactiveScopeAnalysis,
    shapes: &ShapeAnalysis,
    regions: &RegionAnalysis,
    directives: DirectiveState,
    config: &CompilerConfig,
) -> Result<LowerOutput, CompileError> {
    if !directives.compiler_enabled {
        return Ok(LowerOutput { function: function.clone(), helpers_used: HashSet::new() });
    }

    let mut lowerer = Lowerer::new(function, scopes, shapes, regions, directives, config);
    let mut out = function.clone();
    lowerer.lower(&mut out)?;

    if lowerer.uses_context_helper() {
        inject_context_binding(&mut out);
        lowerer.helpers_used.insert("useContext".to_string());
    }

    Ok(LowerOutput { function: out, helpers_used: lowerer.helpers_used })
}

pub(crate) fn creator_kind(value: &Expression, config: &CompilerConfig) -> Option<Creator> {
    if let Expression::Call { callee, .. } = value {
        if let Expression::Identifier(name) = callee.as_ref() {
            let macros = &config.memo_macro_names;
            if name == &macros.state {
                return Some(Creator::State);
            }
            if name == &macros.store {
                return Some(Creator::Store);
            }
            if name == &macros.memo {
                return Some(Creator::Memo);
            }
            if name == &macros.effect {
                return Some(Creator::Effect);
            }
        }
    }
    None
}

fn function_contains_jsx(function: &Function) -> bool {
    for block in &function.blocks {
        for inst in &block.instructions {
            if let Some(v) = inst.value() {
                if expr_contains_jsx(v) {
                    return true;
                }
            }
        }
        if let crate::ir::Terminator::Return(Some(e)) = &block.terminator {
            if expr_contains_jsx(e) {
                return true;
            }
        }
    }
    false
}

/// Counts identifier reads of `base` across every instruction value and
/// terminator expression in `function`, plus `Phi` sources — used by
/// [`Lowerer::try_fuse_window`] to confirm a candidate branch value has
/// exactly its one expected use (inside the conditional being fused) before
/// folding it into a lazy conditional memo.
fn count_reads(function: &Function, base: &str) -> usize {
    let mut count = 0;
    for block in &function.blocks {
        for inst in &block.instructions {
            if let Some(v) = inst.value() {
                crate::ir::walk_expression(v, &mut |e| {
                    if let Expression::Identifier(name) = e {
                        if ssa::base_name(name) == base {
                            count += 1;
                        }
                    }
                });
            }
            if let Instruction::Phi { sources, .. } = inst {
                count += sources.iter().filter(|(_, name)| ssa::base_name(name) == base).count();
            }
        }
        match &block.terminator {
            crate::ir::Terminator::Return(Some(e)) | crate::ir::Terminator::Throw(e) => {
                crate::ir::walk_expression(e, &mut |e| {
                    if let Expression::Identifier(name) = e {
                        if ssa::base_name(name) == base {
                            count += 1;
                        }
                    }
                });
            }
            crate::ir::Terminator::Branch { test, .. } => {
                crate::ir::walk_expression(test, &mut |e| {
                    if let Expression::Identifier(name) = e {
                        if ssa::base_name(name) == base {
                            count += 1;
                        }
                    }
                });
            }
            _ => {}
        }
    }
    count
}

fn expr_contains_jsx(expr: &Expression) -> bool {
    let mut found = false;
    crate::ir::walk_expression(expr, &mut |e| {
        if matches!(e, Expression::Jsx(_)) {
            found = true;
        }
    });
    found
}

impl<'a> Lowerer<'a> {
    fn new(function: &Function, scopes: &'a ReactiveScopeAnalysis, shapes: &'a ShapeAnalysis, regions: &'a RegionAnalysis, directives: DirectiveState, config: &'a CompilerConfig) -> Self {
        let mut store_bases = HashSet::new();
        for block in &function.blocks {
            for inst in &block.instructions {
                if let Instruction::Assign { target, value, .. } = inst {
                    if creator_kind(value, config) == Some(Creator::Store) {
                        store_bases.insert(ssa::base_name(target));
                    }
                }
            }
        }
        let mut accessor_bases = scopes.tracked_bases();
        for base in &store_bases {
            accessor_bases.remove(base);
        }

        let mut shadow_root = HashSet::new();
        shadow_root.extend(function.params.iter().cloned());

        Lowerer {
            scopes,
            shapes,
            regions,
            directives,
            config,
            accessor_bases,
            store_bases,
            shadow: vec![shadow_root],
            helpers_used: HashSet::new(),
            next_slot: 0,
            is_component_scope: function_contains_jsx(function) || function.hook_return_info.is_some(),
            aliases: HashSet::new(),
            lazy_fused: HashSet::new(),
        }
    }

    fn is_shadowed(&self, base: &str) -> bool {
        self.shadow.iter().any(|frame| frame.contains(base))
    }

    fn uses_context_helper(&self) -> bool {
        const NEEDS_CTX: &[&str] = &["useSignal", "useStore", "useMemo", "useEffect", "runInScope"];
        self.helpers_used.iter().any(|h| NEEDS_CTX.contains(&h.as_str()))
    }

    fn lower(&mut self, function: &mut Function) -> Result<(), CompileError> {
        self.fuse_lazy_conditionals(function);
        for block in &mut function.blocks {
            self.lower_block(block)?;
        }
        Ok(())
    }

    /// Lazy conditional memo (spec.md §4.7 item 6): `const a = <Va>; const b
    /// = <Vb>; const r = cond ? a : b;` where `a`/`b` are each used nowhere
    /// else and would each otherwise be individually memoized, is fused into
    /// one `useMemo`/`memo` whose body computes only the live branch:
    /// `r = useMemo(ctx, () => { if (cond) { return <Va> } else { return
    /// <Vb> } }, slot)`. Wrapping `a` and `b` as two *separate* memos would
    /// run both eagerly (they're two unconditional statements); fusing them
    /// behind the branch is what actually defers the inactive side's work.
    fn fuse_lazy_conditionals(&mut self, function: &mut Function) {
        if self.directives.no_memo {
            return;
        }
        let snapshot = function.clone();
        for block in &mut function.blocks {
            let mut fused = Vec::with_capacity(block.instructions.len());
            let mut i = 0;
            while i < block.instructions.len() {
                if let Some(replacement) = self.try_fuse_window(&block.instructions, i, &snapshot) {
                    fused.push(replacement);
                    i += 3;
                } else {
                    fused.push(block.instructions[i].clone());
                    i += 1;
                }
            }
            block.instructions = fused;
        }
    }

    fn try_fuse_window(&mut self, insts: &[Instruction], i: usize, whole_function: &Function) -> Option<Instruction> {
        let (a_target, a_value) = match insts.get(i)? {
            Instruction::Assign { target, value, .. } if !self.is_reassignment(target) => (target.clone(), value.clone()),
            _ => return None,
        };
        let (b_target, b_value, _b_decl) = match insts.get(i + 1)? {
            Instruction::Assign { target, value, declaration_kind } if !self.is_reassignment(target) => (target.clone(), value.clone(), *declaration_kind),
            _ => return None,
        };
        let (r_target, test, r_decl) = match insts.get(i + 2)? {
            Instruction::Assign { target, value: Expression::Conditional { test, consequent, alternate }, declaration_kind } if !self.is_reassignment(target) => {
                let Expression::Identifier(cons_name) = consequent.as_ref() else { return None };
                let Expression::Identifier(alt_name) = alternate.as_ref() else { return None };
                if ssa::base_name(cons_name) != ssa::base_name(&a_target) || ssa::base_name(alt_name) != ssa::base_name(&b_target) {
                    return None;
                }
                (target.clone(), test.as_ref().clone(), *declaration_kind)
            }
            _ => return None,
        };

        // Each branch's value must be used nowhere but inside this one
        // conditional, or fusing would silently drop the other use.
        if count_reads(whole_function, &ssa::base_name(&a_target)) != 1 || count_reads(whole_function, &ssa::base_name(&b_target)) != 1 {
            return None;
        }

        let rewritten_test = self.rewrite_reads(test);
        let rewritten_a = self.rewrite_reads(a_value);
        let rewritten_b = self.rewrite_reads(b_value);
        if !self.expr_reads_any_tracked_accessor(&rewritten_a) && !self.expr_reads_any_tracked_accessor(&rewritten_b) {
            return None;
        }

        let branch_block = BasicBlock { id: 0, instructions: vec![], terminator: Terminator::Branch { test: rewritten_test, consequent: 1, alternate: 2 } };
        let cons_block = BasicBlock { id: 1, instructions: vec![], terminator: Terminator::Return(Some(rewritten_a)) };
        let alt_block = BasicBlock { id: 2, instructions: vec![], terminator: Terminator::Return(Some(rewritten_b)) };
        let arrow = Expression::ArrowFunction {
            params: vec![],
            body: Box::new(ArrowBody::Block(vec![branch_block, cons_block, alt_block], 0)),
            is_expression: false,
            is_async: false,
        };

        let slot = self.next_slot;
        self.next_slot += 1;
        let value = if self.is_component_scope {
            self.helpers_used.insert("useMemo".to_string());
            self.make_call("useMemo", vec![Expression::Identifier(CONTEXT_BINDING.to_string()), arrow, Expression::Literal(Literal::Number(slot as f64))])
        } else {
            self.helpers_used.insert("memo".to_string());
            self.make_call("memo", vec![arrow])
        };

        self.lazy_fused.insert(r_target.clone());
        Some(Instruction::Assign { target: r_target, value, declaration_kind: r_decl })
    }

    fn lower_block(&mut self, block: &mut BasicBlock) -> Result<(), CompileError> {
        let mut rewritten = Vec::with_capacity(block.instructions.len());
        for inst in block.instructions.drain(..) {
            rewritten.push(self.lower_instruction(inst)?);
        }
        block.instructions = rewritten;
        self.lower_terminator(&mut block.terminator)?;
        Ok(())
    }

    fn lower_instruction(&mut self, inst: Instruction) -> Result<Instruction, CompileError> {
        match inst {
            Instruction::Phi { .. } => Ok(inst),
            Instruction::Assign { ref target, .. } if self.lazy_fused.contains(target) => Ok(inst),
            Instruction::Assign { target, value, declaration_kind } => {
                let base = ssa::base_name(&target);
                if let Some(kind) = creator_kind(&value, self.config) {
                    // The creation call itself: rewrite its arguments, then
                    // swap the macro name for the runtime helper it denotes
                    // (spec.md §6 runtime contract) — never wrap the result
                    // in an extra memo/effect, the creator call already is one.
                    let value = self.rewrite_call_arguments(value);
                    let value = self.rewrite_creator_call(kind, value);
                    return Ok(Instruction::Assign { target: base, value, declaration_kind });
                }

                let reassignment = self.accessor_bases.contains(&base) && self.scopes.is_tracked(&base) && self.is_reassignment(&target);
                let is_redecl = self.is_reassignment(&target);

                if self.aliases.contains(&base) && is_redecl {
                    return Err(CompileError::codegen(
                        format!("cannot reassign `{base}`: it was declared as a bare alias of a tracked binding and has no setter of its own"),
                        format!("give `{base}` its own `$state`/`$store`/`$memo` creation instead of aliasing, or read the tracked value directly at each use site"),
                    ));
                }
                if !is_redecl {
                    if let Expression::Identifier(aliased) = &value {
                        let aliased_base = ssa::base_name(aliased);
                        if !self.is_shadowed(&aliased_base) && self.scopes.is_tracked(&aliased_base) {
                            self.aliases.insert(base.clone());
                        }
                    }
                }

                let rewritten_value = self.rewrite_reads(value);

                if reassignment {
                    // spec.md §4.7 item 2: `x = e` on a tracked `x` becomes
                    // `x(e)` — a call, not a new binding.
                    return Ok(Instruction::Expression { value: self.make_call(&base, vec![rewritten_value]) });
                }

                let depends_on_tracked = self.expr_reads_any_tracked_accessor(&rewritten_value);
                let should_memoize = depends_on_tracked && self.regions.region_for_declaration(&base).map(|r| r.should_memoize).unwrap_or(depends_on_tracked) && !self.directives.no_memo;

                let value = if should_memoize {
                    self.wrap_memo(rewritten_value)
                } else {
                    rewritten_value
                };
                Ok(Instruction::Assign { target: base, value, declaration_kind })
            }
            Instruction::Expression { value } => {
                if let Some(setter_call) = self.try_lower_update_expression(&value) {
                    // spec.md §4.7 item 2: `x++`/`x--` on a tracked `x`
                    // becomes `x(x() +/- 1)`, same as `x = x + 1` would.
                    return Ok(Instruction::Expression { value: setter_call });
                }

                let rewritten_value = self.rewrite_reads(value);
                let wrap_effect = self.is_component_scope
                    && !self.directives.no_memo
                    && self.expr_reads_any_tracked_accessor(&rewritten_value)
                    && !has_early_exit(&rewritten_value);
                let value = if wrap_effect { self.wrap_effect(rewritten_value) } else { rewritten_value };
                Ok(Instruction::Expression { value })
            }
        }
    }

    fn is_reassignment(&self, target: &str) -> bool {
        // A versioned SSA name (`base$$1`, `base$$2`, …) past the zeroth
        // version is a reassignment; the unversioned name is the original
        // declaration, whether or not it happens to be a creator call.
        ssa::looks_versioned(target)
    }

    fn make_call(&mut self, callee: &str, arguments: Vec<Expression>) -> Expression {
        Expression::Call { callee: Box::new(Expression::Identifier(callee.to_string())), arguments, optional: false, pure: None }
    }

    /// Recognizes a bare `x++`/`x--` statement on a tracked `x` and lowers
    /// it straight to `x(x() +/- 1)`, since `x++` has no call-expression
    /// equivalent the generic read-rewrite pass could produce on its own.
    fn try_lower_update_expression(&mut self, expr: &Expression) -> Option<Expression> {
        let Expression::UpdateExpression { argument, operator, .. } = expr else { return None };
        let Expression::Identifier(name) = argument.as_ref() else { return None };
        let base = ssa::base_name(name);
        if self.is_shadowed(&base) || !self.accessor_bases.contains(&base) || !self.scopes.is_tracked(&base) {
            return None;
        }
        let operator = match operator {
            UpdateOp::Increment => BinaryOp::Add,
            UpdateOp::Decrement => BinaryOp::Sub,
        };
        let new_value = Expression::Binary { left: Box::new(self.make_call(&base, vec![])), operator, right: Box::new(Expression::Literal(Literal::Number(1.0))) };
        Some(self.make_call(&base, vec![new_value]))
    }

    /// Renames a `$state`/`$store`/`$memo`/`$effect` creation call to the
    /// runtime helper it denotes (spec.md §6). Signals and stores always
    /// bind to the ambient context; memos and effects fall back to the
    /// context-free `memo`/`effect` forms outside component scope, mirroring
    /// the derived-binding and effect-statement wrapping rules in items 3-4.
    fn rewrite_creator_call(&mut self, kind: Creator, expr: Expression) -> Expression {
        let Expression::Call { arguments, .. } = expr else { return expr };
        match kind {
            Creator::State => {
                self.helpers_used.insert("useSignal".to_string());
                let mut args = vec![Expression::Identifier(CONTEXT_BINDING.to_string())];
                args.extend(arguments);
                self.make_call("useSignal", args)
            }
            Creator::Store => {
                self.helpers_used.insert("useStore".to_string());
                let mut args = vec![Expression::Identifier(CONTEXT_BINDING.to_string())];
                args.extend(arguments);
                self.make_call("useStore", args)
            }
            Creator::Memo => {
                let slot = self.next_slot;
                self.next_slot += 1;
                if self.is_component_scope {
                    self.helpers_used.insert("useMemo".to_string());
                    let mut args = vec![Expression::Identifier(CONTEXT_BINDING.to_string())];
                    args.extend(arguments);
                    args.push(Expression::Literal(Literal::Number(slot as f64)));
                    self.make_call("useMemo", args)
                } else {
                    self.helpers_used.insert("memo".to_string());
                    self.make_call("memo", arguments)
                }
            }
            Creator::Effect => {
                let slot = self.next_slot;
                self.next_slot += 1;
                if self.is_component_scope {
                    self.helpers_used.insert("useEffect".to_string());
                    let mut args = vec![Expression::Identifier(CONTEXT_BINDING.to_string())];
                    args.extend(arguments);
                    args.push(Expression::Literal(Literal::Number(slot as f64)));
                    self.make_call("useEffect", args)
                } else {
                    self.helpers_used.insert("effect".to_string());
                    self.make_call("effect", arguments)
                }
            }
        }
    }

    fn wrap_memo(&mut self, body: Expression) -> Expression {
        let slot = self.next_slot;
        self.next_slot += 1;
        let arrow = Expression::ArrowFunction { params: vec![], body: Box::new(ArrowBody::Expression(body)), is_expression: true, is_async: false };
        if self.is_component_scope {
            self.helpers_used.insert("useMemo".to_string());
            self.make_call("useMemo", vec![Expression::Identifier(CONTEXT_BINDING.to_string()), arrow, Expression::Literal(Literal::Number(slot as f64))])
        } else {
            self.helpers_used.insert("memo".to_string());
            self.make_call("memo", vec![arrow])
        }
    }

    fn wrap_effect(&mut self, body: Expression) -> Expression {
        let slot = self.next_slot;
        self.next_slot += 1;
        let arrow = Expression::ArrowFunction { params: vec![], body: Box::new(ArrowBody::Expression(body)), is_expression: true, is_async: false };
        self.helpers_used.insert("useEffect".to_string());
        self.make_call("useEffect", vec![Expression::Identifier(CONTEXT_BINDING.to_string()), arrow, Expression::Literal(Literal::Number(slot as f64))])
    }

    fn expr_reads_any_tracked_accessor(&self, expr: &Expression) -> bool {
        let mut found = false;
        crate::ir::walk_expression(expr, &mut |e| {
            if let Expression::Call { callee, arguments, .. } = e {
                if arguments.is_empty() {
                    if let Expression::Identifier(name) = callee.as_ref() {
                        if self.accessor_bases.contains(&ssa::base_name(name)) {
                            found = true;
                        }
                    }
                }
            }
        });
        found
    }

    fn rewrite_call_arguments(&mut self, expr: Expression) -> Expression {
        match expr {
            Expression::Call { callee, arguments, optional, pure } => {
                Expression::Call { callee, arguments: arguments.into_iter().map(|a| self.rewrite_reads(a)).collect(), optional, pure }
            }
            other => other,
        }
    }

    /// Rewrites every tracked-identifier read in `expr` into its
    /// accessor-call form (spec.md §4.7 items 1 and 8, consolidated into a
    /// single pass here rather than a separate post-pass). Call-target
    /// positions, nested-function parameters, and statically shadowed names
    /// are left untouched.
    fn rewrite_reads(&mut self, expr: Expression) -> Expression {
        match expr {
            Expression::Identifier(name) => {
                let base = ssa::base_name(&name);
                if !self.is_shadowed(&base) && self.accessor_bases.contains(&base) {
                    self.make_call(&base, vec![])
                } else if self.store_bases.contains(&base) || self.accessor_bases.contains(&base) {
                    Expression::Identifier(base)
                } else {
                    Expression::Identifier(name)
                }
            }
            Expression::Call { callee, arguments, optional, pure } => {
                // The callee itself is never rewritten into a nested call
                // (spec.md §4.7 item 8: "skips call-target positions").
                let callee = match *callee {
                    Expression::Identifier(name) => {
                        let base = ssa::base_name(&name);
                        if self.store_bases.contains(&base) || self.accessor_bases.contains(&base) {
                            Box::new(Expression::Identifier(base))
                        } else {
                            Box::new(Expression::Identifier(name))
                        }
                    }
                    other => Box::new(self.rewrite_reads(other)),
                };
                Expression::Call { callee, arguments: arguments.into_iter().map(|a| self.rewrite_reads(a)).collect(), optional, pure }
            }
            Expression::Member { object, property, optional } => {
                let property = match property {
                    crate::ir::MemberKey::Computed(e) => crate::ir::MemberKey::Computed(Box::new(self.rewrite_reads(*e))),
                    literal => literal,
                };
                Expression::Member { object: Box::new(self.rewrite_reads(*object)), property, optional }
            }
            Expression::Binary { left, operator, right } => {
                Expression::Binary { left: Box::new(self.rewrite_reads(*left)), operator, right: Box::new(self.rewrite_reads(*right)) }
            }
            Expression::Logical { left, operator, right } => {
                Expression::Logical { left: Box::new(self.rewrite_reads(*left)), operator, right: Box::new(self.rewrite_reads(*right)) }
            }
            Expression::Unary { operator, argument } => Expression::Unary { operator, argument: Box::new(self.rewrite_reads(*argument)) },
            Expression::SpreadElement(e) => Expression::SpreadElement(Box::new(self.rewrite_reads(*e))),
            Expression::Await(e) => Expression::Await(Box::new(self.rewrite_reads(*e))),
            Expression::Conditional { test, consequent, alternate } => Expression::Conditional {
                test: Box::new(self.rewrite_reads(*test)),
                consequent: Box::new(self.rewrite_reads(*consequent)),
                alternate: Box::new(self.rewrite_reads(*alternate)),
            },
            Expression::Array(elems) => Expression::Array(
                elems
                    .into_iter()
                    .map(|e| match e {
                        crate::ir::ArrayElement::Item(e) => crate::ir::ArrayElement::Item(self.rewrite_reads(e)),
                        crate::ir::ArrayElement::Spread(e) => crate::ir::ArrayElement::Spread(self.rewrite_reads(e)),
                        crate::ir::ArrayElement::Hole => crate::ir::ArrayElement::Hole,
                    })
                    .collect(),
            ),
            Expression::Object(props) => Expression::Object(
                props
                    .into_iter()
                    .map(|p| match p {
                        crate::ir::ObjectProperty::Field { key, computed, value } => {
                            crate::ir::ObjectProperty::Field { key, computed, value: self.rewrite_reads(value) }
                        }
                        crate::ir::ObjectProperty::Spread(e) => crate::ir::ObjectProperty::Spread(self.rewrite_reads(e)),
                    })
                    .collect(),
            ),
            Expression::Jsx(jsx) => jsx::lower(self, *jsx),
            Expression::ArrowFunction { params, body, is_expression, is_async } => {
                self.shadow.push(params.iter().cloned().collect());
                let body = match *body {
                    ArrowBody::Expression(e) => ArrowBody::Expression(self.rewrite_reads(e)),
                    block @ ArrowBody::Block(..) => block,
                };
                self.shadow.pop();
                Expression::ArrowFunction { params, body: Box::new(body), is_expression, is_async }
            }
            Expression::FunctionExpression(f) => Expression::FunctionExpression(f),
            Expression::AssignmentExpression { target, value } => {
                Expression::AssignmentExpression { target: Box::new(self.rewrite_reads(*target)), value: Box::new(self.rewrite_reads(*value)) }
            }
            Expression::UpdateExpression { argument, operator, prefix } => {
                Expression::UpdateExpression { argument: Box::new(self.rewrite_reads(*argument)), operator, prefix }
            }
            Expression::TemplateLiteral(parts) => Expression::TemplateLiteral(self.rewrite_template_parts(parts)),
            Expression::TaggedTemplate { tag, quasi } => {
                Expression::TaggedTemplate { tag: Box::new(self.rewrite_reads(*tag)), quasi: self.rewrite_template_parts(quasi) }
            }
            Expression::New { callee, arguments } => {
                Expression::New { callee: Box::new(self.rewrite_reads(*callee)), arguments: arguments.into_iter().map(|a| self.rewrite_reads(a)).collect() }
            }
            Expression::Sequence(exprs) => Expression::Sequence(exprs.into_iter().map(|e| self.rewrite_reads(e)).collect()),
            Expression::Yield { argument, delegate } => Expression::Yield { argument: argument.map(|e| Box::new(self.rewrite_reads(*e))), delegate },
            literal_or_opaque => literal_or_opaque,
        }
    }

    fn rewrite_template_parts(&mut self, parts: Vec<crate::ir::TemplatePart>) -> Vec<crate::ir::TemplatePart> {
        parts
            .into_iter()
            .map(|p| match p {
                crate::ir::TemplatePart::String(s) => crate::ir::TemplatePart::String(s),
                crate::ir::TemplatePart::Expression(e) => crate::ir::TemplatePart::Expression(self.rewrite_reads(e)),
            })
            .collect()
    }

    fn lower_terminator(&mut self, term: &mut crate::ir::Terminator) -> Result<(), CompileError> {
        use crate::ir::Terminator::*;
        match term {
            Return(Some(e)) | Throw(e) => {
                *e = self.rewrite_reads(std::mem::replace(e, Expression::This));
            }
            Branch { test, .. } => {
                *test = self.rewrite_reads(std::mem::replace(test, Expression::This));
            }
            Switch { discriminant, cases } => {
                *discriminant = self.rewrite_reads(std::mem::replace(discriminant, Expression::This));
                for (test, _) in cases {
                    if let Some(e) = test {
                        *e = self.rewrite_reads(std::mem::replace(e, Expression::This));
                    }
                }
            }
            ForOf { iter, .. } => {
                *iter = self.rewrite_reads(std::mem::replace(iter, Expression::This));
            }
            ForIn { obj, .. } => {
                *obj = self.rewrite_reads(std::mem::replace(obj, Expression::This));
            }
            _ => {}
        }
        Ok(())
    }
}

/// A crude, conservative early-exit check (spec.md §4.7 item 4): an effect
/// body built from a single expression can still contain an early exit via
/// a nested arrow function's control flow only if that arrow wraps a block
/// body, which this lowerer never auto-wraps in `useEffect` (only the
/// direct expression is); kept as a named hook for the case a future region
/// body is multi-statement.
fn has_early_exit(_expr: &Expression) -> bool {
    false
}

fn inject_context_binding(function: &mut Function) {
    let Some(entry) = function.blocks.iter_mut().find(|b| b.id == function.entry) else { return };
    let already = entry.instructions.iter().any(|i| i.target_name() == Some(CONTEXT_BINDING));
    if already {
        return;
    }
    entry.instructions.insert(
        0,
        Instruction::Assign {
            target: CONTEXT_BINDING.to_string(),
            value: Expression::Call { callee: Box::new(Expression::Identifier("useContext".to_string())), arguments: vec![], optional: false, pure: None },
            declaration_kind: crate::ir::DeclarationKind::Const,
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use crate::directives::DirectiveState;
    use crate::ir::*;

    fn pipeline(func: &Function) -> LowerOutput {
        let cfg = crate::cfg::analyze(func).unwrap();
        let config = CompilerConfig::default();
        let scopes = crate::reactive_scope::analyze(func, &cfg, &config).unwrap();
        let shapes = crate::shape::analyze(func);
        let regions = crate::region::generate(func, &scopes, &shapes);
        lower_function(func, &scopes, &shapes, &regions, DirectiveState::default(), &config).unwrap()
    }

    #[test]
    fn tracked_read_becomes_accessor_call() {
        let b0 = BasicBlock {
            id: 0,
            instructions: vec![Instruction::Assign {
                target: "count".into(),
                value: Expression::Call { callee: Box::new(Expression::Identifier("$state".into())), arguments: vec![Expression::Literal(Literal::Number(0.0))], optional: false, pure: None },
                declaration_kind: DeclarationKind::Let,
            }],
            terminator: Terminator::Return(Some(Expression::Identifier("count".into()))),
        };
        let func = Function { name: "Counter".into(), params: vec![], raw_params: vec![], blocks: vec![b0], entry: 0, flags: FunctionFlags::default(), hook_return_info: None };
        let out = pipeline(&func);
        match &out.function.block(0).terminator {
            Terminator::Return(Some(Expression::Call { callee, arguments, .. })) => {
                assert!(matches!(callee.as_ref(), Expression::Identifier(n) if n == "count"));
                assert!(arguments.is_empty());
            }
            other => panic!("expected accessor call, got {other:?}"),
        }
    }

    #[test]
    fn reassigning_an_alias_of_a_tracked_binding_is_a_codegen_error() {
        let b0 = BasicBlock {
            id: 0,
            instructions: vec![
                Instruction::Assign {
                    target: "count".into(),
                    value: Expression::Call { callee: Box::new(Expression::Identifier("$state".into())), arguments: vec![Expression::Literal(Literal::Number(0.0))], optional: false, pure: None },
                    declaration_kind: DeclarationKind::Let,
                },
                Instruction::Assign { target: "alias".into(), value: Expression::Identifier("count".into()), declaration_kind: DeclarationKind::Let },
                Instruction::Assign { target: "alias$$1".into(), value: Expression::Literal(Literal::Number(5.0)), declaration_kind: DeclarationKind::None },
            ],
            terminator: Terminator::Return(Some(Expression::Identifier("alias$$1".into()))),
        };
        let func = Function { name: "Counter".into(), params: vec![], raw_params: vec![], blocks: vec![b0], entry: 0, flags: FunctionFlags::default(), hook_return_info: None };
        let cfg = crate::cfg::analyze(&func).unwrap();
        let config = CompilerConfig::default();
        let scopes = crate::reactive_scope::analyze(&func, &cfg, &config).unwrap();
        let shapes = crate::shape::analyze(&func);
        let regions = crate::region::generate(&func, &scopes, &shapes);
        let result = lower_function(&func, &scopes, &shapes, &regions, DirectiveState::default(), &config);
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().kind.code(), "CODEGEN_ERROR");
    }

    #[test]
    fn reassignment_of_tracked_binding_becomes_setter_call() {
        let b0 = BasicBlock {
            id: 0,
            instructions: vec![
                Instruction::Assign {
                    target: "count".into(),
                    value: Expression::Call { callee: Box::new(Expression::Identifier("$state".into())), arguments: vec![Expression::Literal(Literal::Number(0.0))], optional: false, pure: None },
                    declaration_kind: DeclarationKind::Let,
                },
                Instruction::Assign {
                    target: "count$$1".into(),
                    value: Expression::Binary { left: Box::new(Expression::Identifier("count".into())), operator: BinaryOp::Add, right: Box::new(Expression::Literal(Literal::Number(1.0))) },
                    declaration_kind: DeclarationKind::None,
                },
            ],
            terminator: Terminator::Return(Some(Expression::Identifier("count$$1".into()))),
        };
        let func = Function { name: "Counter".into(), params: vec![], raw_params: vec![], blocks: vec![b0], entry: 0, flags: FunctionFlags::default(), hook_return_info: None };
        let out = pipeline(&func);
        // instructions[0] is now the injected `const __fictCtx = useContext()`
        // (useSignal needs it), so the setter call shifts to index 2.
        match &out.function.block(0).instructions[2] {
            Instruction::Expression { value: Expression::Call { callee, .. } } => {
                assert!(matches!(callee.as_ref(), Expression::Identifier(n) if n == "count"));
            }
            other => panic!("expected setter call, got {other:?}"),
        }
    }
}

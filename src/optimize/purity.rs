//! Purity context (spec.md §4.6(a)): fixpoint-computed set of identifiers
//! assigned from an impure expression. Feeds CSE, single-use inlining, and
//! the reactive-graph DCE pass, all of which must never hoist or duplicate
//! an impure (observable) computation.

use crate::config::CompilerConfig;
use crate::ir::ssa;
use crate::ir::{Expression, Function, Instruction};
use std::collections::HashSet;

/// Built-in pure callees (spec.md §4.6(a)) — kept as a fixed list regardless
/// of `CompilerConfig`, since these are language built-ins, not project
/// aliases.
const PURE_GLOBAL_CALLEES: &[&str] = &["String", "Number", "Boolean", "BigInt", "parseInt", "parseFloat"];
const PURE_MATH_METHODS: &[&str] =
    &["abs", "floor", "ceil", "round", "trunc", "sign", "max", "min", "sqrt", "cbrt", "pow", "log", "log2", "log10", "exp", "hypot"];

/// Runtime helpers (spec.md §6) that create or subscribe reactive state, or
/// mutate the DOM — always impure regardless of arguments.
const IMPURE_RUNTIME_HELPERS: &[&str] = &[
    "useContext", "useSignal", "useStore", "useMemo", "memo", "useEffect", "effect", "runInScope", "template", "insert", "bindText",
    "bindAttribute", "bindProperty", "bindClass", "bindStyle", "bindEvent", "bindRef", "createElement", "conditional", "keyedList",
    "toNodeArray", "onDestroy",
];

#[derive(Debug, Default)]
pub struct PurityContext {
    impure_vars: HashSet<String>,
}

impl PurityContext {
    pub fn is_impure_var(&self, base: &str) -> bool {
        self.impure_vars.contains(base)
    }
}

pub fn analyze(function: &Function, config: &CompilerConfig) -> PurityContext {
    let mut ctx = PurityContext::default();
    let mut changed = true;
    let mut iterations = 0;
    while changed && iterations < 10_000 {
        changed = false;
        iterations += 1;
        let mut sorted_blocks: Vec<_> = function.blocks.iter().collect();
        sorted_blocks.sort_by_key(|b| b.id);
        for block in sorted_blocks {
            for inst in &block.instructions {
                if let Instruction::Assign { target, value, .. } = inst {
                    let base = ssa::base_name(target);
                    if ctx.impure_vars.contains(&base) {
                        continue;
                    }
                    if !expression_is_pure(value, &ctx, config) {
                        changed |= ctx.impure_vars.insert(base);
                    }
                }
            }
        }
    }
    ctx
}

fn callee_name(expr: &Expression) -> Option<String> {
    match expr {
        Expression::Identifier(name) => Some(name.clone()),
        Expression::Member { object, property: crate::ir::MemberKey::Literal(prop), .. } => {
            if let Expression::Identifier(obj) = object.as_ref() {
                Some(format!("{obj}.{prop}"))
            } else {
                None
            }
        }
        _ => None,
    }
}

pub fn is_pure_callee(expr: &Expression, config: &CompilerConfig) -> bool {
    let Some(name) = callee_name(expr) else { return false };
    if PURE_GLOBAL_CALLEES.contains(&name.as_str()) {
        return true;
    }
    if let Some(method) = name.strip_prefix("Math.") {
        return PURE_MATH_METHODS.contains(&method);
    }
    config.extra_pure_callees.contains(&name)
}

pub fn is_impure_callee(expr: &Expression, config: &CompilerConfig) -> bool {
    let Some(name) = callee_name(expr) else { return true };
    let macros = &config.memo_macro_names;
    if name == macros.state || name == macros.store || name == macros.memo || name == macros.effect {
        return true;
    }
    IMPURE_RUNTIME_HELPERS.contains(&name.as_str())
}

/// A sub-expression is pure if every call within it is either an explicitly
/// hinted pure call, a recognized pure builtin, not a known impure runtime
/// helper, and every identifier it reads is not itself marked impure.
pub fn expression_is_pure(expr: &Expression, ctx: &PurityContext, config: &CompilerConfig) -> bool {
    let mut pure = true;
    walk_purity(expr, ctx, config, &mut pure);
    pure
}

fn walk_purity(expr: &Expression, ctx: &PurityContext, config: &CompilerConfig, pure: &mut bool) {
    if !*pure {
        return;
    }
    match expr {
        Expression::Identifier(name) => {
            if ctx.is_impure_var(&ssa::base_name(name)) {
                *pure = false;
            }
        }
        Expression::Call { callee, arguments, pure: pure_hint, .. } => {
            let hinted = *pure_hint == Some(true);
            // Conservative default (spec.md §4.9): an unhinted call whose
            // callee isn't a recognized pure builtin is treated as impure,
            // even if it also isn't one of the known impure runtime helpers.
            if !hinted && !is_pure_callee(callee, config) {
                *pure = false;
                return;
            }
            for a in arguments {
                walk_purity(a, ctx, config, pure);
            }
        }
        Expression::New { .. } | Expression::Await(_) | Expression::Yield { .. } | Expression::AssignmentExpression { .. } | Expression::UpdateExpression { .. } => {
            *pure = false;
        }
        _ => crate::ir::walk_expression(expr, &mut |sub| {
            if let Expression::Identifier(name) = sub {
                if ctx.is_impure_var(&ssa::base_name(name)) {
                    *pure = false;
                }
            }
        }),
    }
}

fn callee_is_unknown(callee: &Expression) -> bool {
    !matches!(callee, Expression::Identifier(_)) || callee_name(callee).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::*;

    #[test]
    fn state_creator_call_marks_its_binding_impure() {
        let b0 = BasicBlock {
            id: 0,
            instructions: vec![Instruction::Assign {
                target: "c".into(),
                value: Expression::Call { callee: Box::new(Expression::Identifier("$state".into())), arguments: vec![Expression::Literal(Literal::Number(0.0))], optional: false, pure: None },
                declaration_kind: DeclarationKind::Let,
            }],
            terminator: Terminator::Return(Some(Expression::Identifier("c".into()))),
        };
        let func = Function { name: "f".into(), params: vec![], raw_params: vec![], blocks: vec![b0], entry: 0, flags: FunctionFlags::default(), hook_return_info: None };
        let config = CompilerConfig::default();
        let ctx = analyze(&func, &config);
        assert!(ctx.is_impure_var("c"));
    }

    #[test]
    fn plain_arithmetic_is_pure() {
        let b0 = BasicBlock {
            id: 0,
            instructions: vec![Instruction::Assign {
                target: "n".into(),
                value: Expression::Binary { left: Box::new(Expression::Literal(Literal::Number(1.0))), operator: BinaryOp::Add, right: Box::new(Expression::Literal(Literal::Number(2.0))) },
                declaration_kind: DeclarationKind::Const,
            }],
            terminator: Terminator::Return(Some(Expression::Identifier("n".into()))),
        };
        let func = Function { name: "f".into(), params: vec![], raw_params: vec![], blocks: vec![b0], entry: 0, flags: FunctionFlags::default(), hook_return_info: None };
        let config = CompilerConfig::default();
        let ctx = analyze(&func, &config);
        assert!(!ctx.is_impure_var("n"));
    }
}

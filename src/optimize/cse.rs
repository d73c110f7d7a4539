//! Common subexpression elimination (spec.md §4.6(d)): replaces a
//! recomputation of a previously-seen pure expression with a read of the
//! binding that first computed it. Intra-block candidates are tracked
//! directly; a cross-block candidate is only reused when the earlier
//! definition's block dominates the later use AND the path between them is
//! straight-line (a single successor/predecessor chain crossing no loop
//! header), with no impure operation or write to one of the expression's
//! dependencies sitting between the definition and the use.

use crate::cfg::CfgAnalysis;
use crate::ir::{ssa, BlockId, Expression, Function, Instruction};
use crate::optimize::purity::{self, PurityContext};
use crate::reactive_scope::ReactiveScopeAnalysis;
use std::collections::{HashMap, HashSet};

/// A normalized textual key for an expression, used to recognize syntactic
/// duplicates. Two expressions with the same key are assumed to compute the
/// same value whenever both are pure and read the same (unmutated) bindings.
fn key_of(expr: &Expression) -> Option<String> {
    match expr {
        Expression::Identifier(_) | Expression::Literal(_) => None,
        Expression::Member { .. } | Expression::Binary { .. } | Expression::Logical { .. } | Expression::Unary { .. } | Expression::Call { .. } => {
            Some(format!("{expr:?}"))
        }
        _ => None,
    }
}

struct Available {
    name: String,
    block: BlockId,
    /// Index of `block` within `function.blocks` at the time this candidate
    /// was recorded.
    block_vec_idx: usize,
    /// Index of the defining instruction within its block.
    inst_idx: usize,
    deps: HashSet<String>,
}

/// Runs CSE over `function`. Only expressions the purity pass proved pure
/// (spec.md §4.6(a)) and that read no reactive binding are eligible — a
/// reactive read must re-execute on every access by definition, so caching
/// it would be an observable behavior change, not just an optimization.
pub fn run(function: &mut Function, cfg: &CfgAnalysis, purity: &PurityContext, scopes: &ReactiveScopeAnalysis) {
    let mut available: HashMap<String, Available> = HashMap::new();

    let mut order: Vec<BlockId> = cfg.reverse_postorder.clone();
    if order.is_empty() {
        order = function.blocks.iter().map(|b| b.id).collect();
    }

    for block_id in order {
        let Some(block_idx) = function.blocks.iter().position(|b| b.id == block_id) else { continue };
        let len = function.blocks[block_idx].instructions.len();
        for i in 0..len {
            let (target, is_eligible_value) = {
                let inst = &function.blocks[block_idx].instructions[i];
                match inst {
                    Instruction::Assign { target, value, .. } => (Some(target.clone()), is_eligible(value, purity, scopes)),
                    _ => (None, false),
                }
            };

            if !is_eligible_value {
                continue;
            }
            let Some(target) = target else { continue };

            let key = {
                let inst = &function.blocks[block_idx].instructions[i];
                inst.value().and_then(key_of)
            };
            let Some(key) = key else { continue };

            if let Some(existing) = available.get(&key) {
                let reusable = if existing.block == block_id {
                    true
                } else if cfg.dominates(existing.block, block_id) {
                    match straight_line_path(cfg, existing.block, block_id) {
                        Some(path) => !path_invalidated(function, &path, existing.block_vec_idx, existing.inst_idx, block_idx, i, &existing.deps, purity),
                        None => false,
                    }
                } else {
                    false
                };
                if reusable {
                    let replacement = existing.name.clone();
                    if let Instruction::Assign { value, .. } = &mut function.blocks[block_idx].instructions[i] {
                        *value = Expression::Identifier(replacement);
                    }
                    continue;
                }
            }

            let deps = {
                let inst = &function.blocks[block_idx].instructions[i];
                inst.value().map(expression_deps).unwrap_or_default()
            };
            available.insert(key, Available { name: target, block: block_id, block_vec_idx: block_idx, inst_idx: i, deps });
        }
    }
}

/// Collects the base names of every identifier `expr` reads, used to detect
/// an intervening write to one of a candidate's dependencies (spec.md
/// §4.6(d) "writes to ... any dep").
fn expression_deps(expr: &Expression) -> HashSet<String> {
    let mut deps = HashSet::new();
    crate::ir::walk_expression(expr, &mut |sub| {
        if let Expression::Identifier(name) = sub {
            deps.insert(ssa::base_name(name));
        }
    });
    deps
}

/// The single successor/predecessor chain of block ids from `from` to `to`
/// inclusive, or `None` if the blocks aren't connected by a straight
/// (non-branching) run, or the chain crosses a loop header (spec.md
/// §4.6(d): cross-block reuse requires "the path between is straight-line
/// (single successor/predecessor chain, no loop header)").
fn straight_line_path(cfg: &CfgAnalysis, from: BlockId, to: BlockId) -> Option<Vec<BlockId>> {
    if from == to {
        return Some(vec![from]);
    }
    let mut path = vec![from];
    let mut current = from;
    let bound = cfg.reverse_postorder.len().max(1) + 1;
    for _ in 0..bound {
        if cfg.loop_headers.contains(&current) {
            return None;
        }
        let succs = cfg.succs.get(&current).map(|v| v.as_slice()).unwrap_or(&[]);
        if succs.len() != 1 {
            return None;
        }
        current = succs[0];
        path.push(current);
        if current == to {
            return if cfg.loop_headers.contains(&current) { None } else { Some(path) };
        }
    }
    None
}

/// True if some instruction strictly between the candidate's definition and
/// its prospective reuse is impure, or writes to one of the candidate's
/// dependencies (spec.md §4.6(d)). `path` runs from the defining block to
/// the using block inclusive (as produced by `straight_line_path`).
#[allow(clippy::too_many_arguments)]
fn path_invalidated(
    function: &Function,
    path: &[BlockId],
    def_block_vec_idx: usize,
    def_inst_idx: usize,
    use_block_vec_idx: usize,
    use_inst_idx: usize,
    deps: &HashSet<String>,
    purity: &PurityContext,
) -> bool {
    for (step, &block_id) in path.iter().enumerate() {
        let is_first = step == 0;
        let is_last = step == path.len() - 1;
        let idx = if is_first {
            def_block_vec_idx
        } else if is_last {
            use_block_vec_idx
        } else {
            let Some(idx) = function.blocks.iter().position(|b| b.id == block_id) else { continue };
            idx
        };
        let start = if is_first { def_inst_idx + 1 } else { 0 };
        let end = if is_last { use_inst_idx } else { function.blocks[idx].instructions.len() };
        if start >= end {
            continue;
        }
        for inst in &function.blocks[idx].instructions[start..end] {
            if instruction_writes_dep(inst, deps) || instruction_is_impure(inst, purity) {
                return true;
            }
        }
    }
    false
}

fn instruction_writes_dep(inst: &Instruction, deps: &HashSet<String>) -> bool {
    matches!(inst, Instruction::Assign { target, .. } if deps.contains(&ssa::base_name(target)))
}

fn instruction_is_impure(inst: &Instruction, purity: &PurityContext) -> bool {
    match inst {
        Instruction::Assign { value, .. } | Instruction::Expression { value } => {
            !purity::expression_is_pure(value, purity, &crate::config::CompilerConfig::default())
        }
        Instruction::Phi { .. } => false,
    }
}

fn is_eligible(expr: &Expression, purity: &PurityContext, scopes: &ReactiveScopeAnalysis) -> bool {
    if !purity::expression_is_pure(expr, purity, &crate::config::CompilerConfig::default()) {
        return false;
    }
    let mut reads_tracked = false;
    crate::ir::walk_expression(expr, &mut |sub| {
        if let Expression::Identifier(name) = sub {
            if scopes.is_tracked(&crate::ir::ssa::base_name(name)) {
                reads_tracked = true;
            }
        }
    });
    !reads_tracked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use crate::ir::*;

    #[test]
    fn repeated_pure_binary_expression_is_deduplicated() {
        let make_expr = || Expression::Binary { left: Box::new(Expression::Identifier("a".into())), operator: BinaryOp::Add, right: Box::new(Expression::Identifier("b".into())) };
        let b0 = BasicBlock {
            id: 0,
            instructions: vec![
                Instruction::Assign { target: "x".into(), value: make_expr(), declaration_kind: DeclarationKind::Const },
                Instruction::Assign { target: "y".into(), value: make_expr(), declaration_kind: DeclarationKind::Const },
            ],
            terminator: Terminator::Return(Some(Expression::Identifier("y".into()))),
        };
        let mut func = Function { name: "f".into(), params: vec!["a".into(), "b".into()], raw_params: vec![], blocks: vec![b0], entry: 0, flags: FunctionFlags::default(), hook_return_info: None };
        let cfg = crate::cfg::analyze(&func).unwrap();
        let config = CompilerConfig::default();
        let scopes = crate::reactive_scope::analyze(&func, &cfg, &config).unwrap();
        let purity = purity::analyze(&func, &config);
        run(&mut func, &cfg, &purity, &scopes);
        match &func.block(0).instructions[1] {
            Instruction::Assign { value: Expression::Identifier(name), .. } => assert_eq!(name, "x"),
            other => panic!("expected CSE'd identifier, got {other:?}"),
        }
    }

    fn ab_binary() -> Expression {
        Expression::Binary { left: Box::new(Expression::Identifier("a".into())), operator: BinaryOp::Add, right: Box::new(Expression::Identifier("b".into())) }
    }

    #[test]
    fn straight_line_cross_block_candidate_is_reused() {
        let b0 = BasicBlock {
            id: 0,
            instructions: vec![Instruction::Assign { target: "x".into(), value: ab_binary(), declaration_kind: DeclarationKind::Const }],
            terminator: Terminator::Jump(1),
        };
        let b1 = BasicBlock {
            id: 1,
            instructions: vec![Instruction::Assign { target: "y".into(), value: ab_binary(), declaration_kind: DeclarationKind::Const }],
            terminator: Terminator::Return(Some(Expression::Identifier("y".into()))),
        };
        let mut func = Function { name: "f".into(), params: vec!["a".into(), "b".into()], raw_params: vec![], blocks: vec![b0, b1], entry: 0, flags: FunctionFlags::default(), hook_return_info: None };
        let cfg = crate::cfg::analyze(&func).unwrap();
        let config = CompilerConfig::default();
        let scopes = crate::reactive_scope::analyze(&func, &cfg, &config).unwrap();
        let purity = purity::analyze(&func, &config);
        run(&mut func, &cfg, &purity, &scopes);
        match &func.block(1).instructions[0] {
            Instruction::Assign { value: Expression::Identifier(name), .. } => assert_eq!(name, "x"),
            other => panic!("expected CSE'd identifier, got {other:?}"),
        }
    }

    #[test]
    fn intervening_impure_call_blocks_cross_block_reuse() {
        let b0 = BasicBlock {
            id: 0,
            instructions: vec![
                Instruction::Assign { target: "x".into(), value: ab_binary(), declaration_kind: DeclarationKind::Const },
                Instruction::Expression {
                    value: Expression::Call { callee: Box::new(Expression::Identifier("logIt".into())), arguments: vec![], optional: false, pure: None },
                },
            ],
            terminator: Terminator::Jump(1),
        };
        let b1 = BasicBlock {
            id: 1,
            instructions: vec![Instruction::Assign { target: "y".into(), value: ab_binary(), declaration_kind: DeclarationKind::Const }],
            terminator: Terminator::Return(Some(Expression::Identifier("y".into()))),
        };
        let mut func = Function { name: "f".into(), params: vec!["a".into(), "b".into()], raw_params: vec![], blocks: vec![b0, b1], entry: 0, flags: FunctionFlags::default(), hook_return_info: None };
        let cfg = crate::cfg::analyze(&func).unwrap();
        let config = CompilerConfig::default();
        let scopes = crate::reactive_scope::analyze(&func, &cfg, &config).unwrap();
        let purity = purity::analyze(&func, &config);
        run(&mut func, &cfg, &purity, &scopes);
        match &func.block(1).instructions[0] {
            Instruction::Assign { value: Expression::Binary { .. }, .. } => {}
            other => panic!("expected recomputation to survive, got {other:?}"),
        }
    }

    #[test]
    fn candidate_crossing_a_loop_header_is_not_reused() {
        let b0 = BasicBlock {
            id: 0,
            instructions: vec![Instruction::Assign { target: "x".into(), value: ab_binary(), declaration_kind: DeclarationKind::Const }],
            terminator: Terminator::Jump(1),
        };
        let b1 = BasicBlock {
            id: 1,
            instructions: vec![],
            terminator: Terminator::Branch { test: Expression::Identifier("cond".into()), consequent: 1, alternate: 2 },
        };
        let b2 = BasicBlock {
            id: 2,
            instructions: vec![Instruction::Assign { target: "y".into(), value: ab_binary(), declaration_kind: DeclarationKind::Const }],
            terminator: Terminator::Return(Some(Expression::Identifier("y".into()))),
        };
        let mut func = Function {
            name: "f".into(),
            params: vec!["a".into(), "b".into(), "cond".into()],
            raw_params: vec![],
            blocks: vec![b0, b1, b2],
            entry: 0,
            flags: FunctionFlags::default(),
            hook_return_info: None,
        };
        let cfg = crate::cfg::analyze(&func).unwrap();
        assert!(cfg.loop_headers.contains(&1), "block 1 should be a natural loop header via its self back-edge");
        let config = CompilerConfig::default();
        let scopes = crate::reactive_scope::analyze(&func, &cfg, &config).unwrap();
        let purity = purity::analyze(&func, &config);
        run(&mut func, &cfg, &purity, &scopes);
        match &func.block(2).instructions[0] {
            Instruction::Assign { value: Expression::Binary { .. }, .. } => {}
            other => panic!("expected recomputation to survive a loop-header crossing, got {other:?}"),
        }
    }
}

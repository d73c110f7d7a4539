//! Reactive-aware optimizer (spec.md §4.6): a small fixed pipeline of
//! passes run to a fixpoint over the IR before structurization and region
//! generation. Every pass here treats a read of a tracked (reactive)
//! binding as observable and off-limits for hoisting, duplication, or
//! reordering — that's what "reactive-aware" means in this module's name,
//! as opposed to a generic SSA optimizer that only has to respect purity.

pub mod algebraic;
pub mod const_prop;
pub mod cse;
pub mod dce;
pub mod inline;
pub mod phi_elim;
pub mod purity;

use crate::cfg;
use crate::config::CompilerConfig;
use crate::errors::CompileError;
use crate::ir::Function;
use crate::reactive_scope::ReactiveScopeAnalysis;

#[derive(Debug, Clone, Copy, Default)]
pub struct OptimizeStats {
    pub fixpoint_iterations: u32,
}

/// Runs the full optimizer pipeline over `function`: purity analysis feeds
/// constant propagation, algebraic simplification, CSE, and single-use
/// inlining, which are iterated together since each can expose more
/// opportunity for the others (an inlined constant may simplify an
/// expression CSE can then dedupe); dead code elimination and phi
/// elimination each run once at the end, in that order, since DCE still
/// needs phi source lists intact to trace liveness through a merge point.
pub fn optimize_function(function: &mut Function, scopes: &ReactiveScopeAnalysis, config: &CompilerConfig) -> Result<OptimizeStats, CompileError> {
    let cfg_analysis = cfg::analyze(function)?;

    let mut iterations = 0;
    let mut changed = true;
    while changed && iterations < 64 {
        changed = false;
        iterations += 1;

        let purity_ctx = purity::analyze(function, config);

        let before = snapshot(function);
        const_prop::run(function, &cfg_analysis, scopes, config);
        algebraic::run(function);
        cse::run(function, &cfg_analysis, &purity_ctx, scopes);
        inline::run(function, &cfg_analysis, &purity_ctx, scopes);
        if snapshot(function) != before {
            changed = true;
        }
    }

    dce::run(function, scopes);
    phi_elim::run(function);

    Ok(OptimizeStats { fixpoint_iterations: iterations })
}

/// Cheap structural fingerprint used only to detect whether a fixpoint round
/// changed anything; not meant to be a general-purpose IR equality check.
fn snapshot(function: &Function) -> String {
    format!("{:?}", function.blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::*;

    #[test]
    fn pipeline_folds_and_drops_dead_constant() {
        let b0 = BasicBlock {
            id: 0,
            instructions: vec![
                Instruction::Assign { target: "a".into(), value: Expression::Literal(Literal::Number(1.0)), declaration_kind: DeclarationKind::Const },
                Instruction::Assign {
                    target: "b".into(),
                    value: Expression::Binary { left: Box::new(Expression::Identifier("a".into())), operator: BinaryOp::Add, right: Box::new(Expression::Literal(Literal::Number(1.0))) },
                    declaration_kind: DeclarationKind::Const,
                },
                Instruction::Assign { target: "unused".into(), value: Expression::Literal(Literal::Number(99.0)), declaration_kind: DeclarationKind::Const },
            ],
            terminator: Terminator::Return(Some(Expression::Identifier("b".into()))),
        };
        let mut func = Function { name: "f".into(), params: vec![], raw_params: vec![], blocks: vec![b0], entry: 0, flags: FunctionFlags::default(), hook_return_info: None };
        let cfg_analysis = crate::cfg::analyze(&func).unwrap();
        let config = CompilerConfig::default();
        let scopes = crate::reactive_scope::analyze(&func, &cfg_analysis, &config).unwrap();
        optimize_function(&mut func, &scopes, &config).unwrap();
        assert!(!func.block(0).instructions.iter().any(|i| i.target_name() == Some("unused")));
        match &func.block(0).terminator {
            Terminator::Return(Some(Expression::Literal(Literal::Number(n)))) => assert_eq!(*n, 2.0),
            other => panic!("expected folded return, got {other:?}"),
        }
    }
}

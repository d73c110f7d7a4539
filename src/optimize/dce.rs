//! Dead code elimination (spec.md §4.6(f)): drops any assignment whose
//! target is never read by a live instruction, a terminator, a hook return
//! binding, or (transitively) by another assignment that is itself live.
//! Reachability is computed over the reactive dependency graph rather than
//! plain SSA use-def, so a scope kept alive because it feeds a JSX binding
//! keeps everything it in turn depends on alive too.

use crate::ir::{Expression, Function, Instruction};
use crate::reactive_scope::ReactiveScopeAnalysis;
use std::collections::HashSet;

fn instruction_reads(expr: &Expression, out: &mut HashSet<String>) {
    crate::ir::walk_expression(expr, &mut |sub| {
        if let Expression::Identifier(name) = sub {
            out.insert(name.clone());
        }
    });
}

fn terminator_reads(term: &crate::ir::Terminator, out: &mut HashSet<String>) {
    use crate::ir::Terminator::*;
    match term {
        Return(Some(e)) | Throw(e) => instruction_reads(e, out),
        Branch { test, .. } => instruction_reads(test, out),
        Switch { discriminant, cases } => {
            instruction_reads(discriminant, out);
            for (test, _) in cases {
                if let Some(e) = test {
                    instruction_reads(e, out);
                }
            }
        }
        ForOf { iter, .. } => instruction_reads(iter, out),
        ForIn { obj, .. } => instruction_reads(obj, out),
        _ => {}
    }
}

fn hook_return_names(function: &Function) -> HashSet<String> {
    function
        .hook_return_info
        .as_ref()
        .map(|info| {
            info.bindings
                .iter()
                .filter_map(|b| match &b.index_or_name {
                    crate::ir::HookReturnKey::Name(n) => Some(n.clone()),
                    crate::ir::HookReturnKey::Index(_) => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Removes every `Assign`/`Phi` instruction not transitively reachable from
/// a terminator read, a hook return binding, an instruction an
/// externally-effectful scope retains (spec.md §4.2 `has_external_effect`),
/// or a bare `Expression` statement (kept unconditionally — it exists for
/// its side effect).
pub fn run(function: &mut Function, scopes: &ReactiveScopeAnalysis) {
    let mut live: HashSet<String> = hook_return_names(function);

    for block in &function.blocks {
        terminator_reads(&block.terminator, &mut live);
        for inst in &block.instructions {
            if let Instruction::Expression { value } = inst {
                instruction_reads(value, &mut live);
            }
        }
    }

    for scope in &scopes.scopes {
        if scope.has_external_effect {
            live.extend(scope.declarations.iter().cloned());
        }
    }

    // Fixpoint: a live name's defining expression's own reads become live.
    let mut changed = true;
    while changed {
        changed = false;
        for block in &function.blocks {
            for inst in &block.instructions {
                let target = match inst.target_name() {
                    Some(t) => t,
                    None => continue,
                };
                let base = crate::ir::ssa::base_name(target);
                if !live.contains(target) && !live.contains(&base) {
                    continue;
                }
                let mut reads = HashSet::new();
                match inst {
                    Instruction::Assign { value, .. } => instruction_reads(value, &mut reads),
                    Instruction::Phi { sources, .. } => {
                        for (_, name) in sources {
                            reads.insert(name.clone());
                        }
                    }
                    Instruction::Expression { .. } => {}
                }
                for r in reads {
                    changed |= live.insert(r);
                }
            }
        }
    }

    for block in &mut function.blocks {
        block.instructions.retain(|inst| match inst {
            Instruction::Expression { .. } => true,
            _ => {
                let target = inst.target_name().unwrap();
                live.contains(target) || live.contains(&crate::ir::ssa::base_name(target))
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use crate::ir::*;

    #[test]
    fn unread_binding_is_removed() {
        let b0 = BasicBlock {
            id: 0,
            instructions: vec![
                Instruction::Assign { target: "unused".into(), value: Expression::Literal(Literal::Number(1.0)), declaration_kind: DeclarationKind::Const },
                Instruction::Assign { target: "kept".into(), value: Expression::Literal(Literal::Number(2.0)), declaration_kind: DeclarationKind::Const },
            ],
            terminator: Terminator::Return(Some(Expression::Identifier("kept".into()))),
        };
        let mut func = Function { name: "f".into(), params: vec![], raw_params: vec![], blocks: vec![b0], entry: 0, flags: FunctionFlags::default(), hook_return_info: None };
        let cfg = crate::cfg::analyze(&func).unwrap();
        let config = CompilerConfig::default();
        let scopes = crate::reactive_scope::analyze(&func, &cfg, &config).unwrap();
        run(&mut func, &scopes);
        assert_eq!(func.block(0).instructions.len(), 1);
        assert_eq!(func.block(0).instructions[0].target_name(), Some("kept"));
    }
}

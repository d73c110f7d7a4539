//! Phi elimination (spec.md §4.6(g)): replaces each `Phi` instruction with
//! an ordinary copy assignment placed on every incoming edge, so the
//! lowerer never has to reason about SSA join semantics. Each phi target is
//! a distinct, freshly-versioned SSA name (`ir::ssa::SsaNamer`), so the
//! classical "lost copy"/parallel-copy swap problem that register allocators
//! worry about doesn't arise here — sequential assignment is always
//! semantically equivalent to the simultaneous one. The one structural
//! hazard is the critical edge: copies can only be appended to a
//! predecessor block unconditionally when that predecessor has a single
//! successor; otherwise the edge is split into a new block carrying just
//! the copies.

use crate::ir::{BasicBlock, BlockId, DeclarationKind, Expression, Function, Instruction, Terminator};
use std::collections::HashMap;

fn retarget(term: &mut Terminator, from: BlockId, to: BlockId) {
    match term {
        Terminator::Jump(b) => {
            if *b == from {
                *b = to;
            }
        }
        Terminator::Branch { consequent, alternate, .. } => {
            if *consequent == from {
                *consequent = to;
            }
            if *alternate == from {
                *alternate = to;
            }
        }
        Terminator::Switch { cases, .. } => {
            for (_, target) in cases {
                if *target == from {
                    *target = to;
                }
            }
        }
        Terminator::Break { target, .. } | Terminator::Continue { target, .. } => {
            if *target == from {
                *target = to;
            }
        }
        Terminator::ForOf { body, exit, .. } | Terminator::ForIn { body, exit, .. } => {
            if *body == from {
                *body = to;
            }
            if *exit == from {
                *exit = to;
            }
        }
        Terminator::Try { try_block, catch_block, finally_block, exit, .. } => {
            if *try_block == from {
                *try_block = to;
            }
            if let Some(c) = catch_block {
                if *c == from {
                    *c = to;
                }
            }
            if let Some(f) = finally_block {
                if *f == from {
                    *f = to;
                }
            }
            if *exit == from {
                *exit = to;
            }
        }
        Terminator::Return(_) | Terminator::Throw(_) | Terminator::Unreachable => {}
    }
}

/// Removes every `Phi` instruction from `function`, pushing the equivalent
/// copy onto each incoming edge. Mutates `function.blocks` in place,
/// possibly appending freshly split edge blocks.
pub fn run(function: &mut Function) {
    let mut next_block_id: BlockId = function.blocks.iter().map(|b| b.id).max().unwrap_or(0) + 1;

    // Collect phi targets/sources per block before mutating anything.
    let mut phi_blocks: Vec<(BlockId, Vec<(String, Vec<(BlockId, String)>)>)> = Vec::new();
    for block in &function.blocks {
        let mut phis = Vec::new();
        for inst in &block.instructions {
            if let Instruction::Phi { target, sources } = inst {
                phis.push((target.clone(), sources.clone()));
            }
        }
        if !phis.is_empty() {
            phi_blocks.push((block.id, phis));
        }
    }
    if phi_blocks.is_empty() {
        return;
    }

    // pred -> copies needed on the edge pred -> succ.
    let mut edge_copies: HashMap<(BlockId, BlockId), Vec<(String, String)>> = HashMap::new();
    for (succ, phis) in &phi_blocks {
        for (target, sources) in phis {
            for (pred, source) in sources {
                edge_copies.entry((*pred, *succ)).or_default().push((target.clone(), source.clone()));
            }
        }
    }

    // Drop the Phi instructions themselves.
    for (succ, _) in &phi_blocks {
        if let Some(block) = function.blocks.iter_mut().find(|b| b.id == *succ) {
            block.instructions.retain(|inst| !matches!(inst, Instruction::Phi { .. }));
        }
    }

    // Determine, for each predecessor block, how many distinct successor
    // targets its terminator has — more than one means any edge out of it
    // is critical and must be split before copies can be inserted safely.
    let mut successor_counts: HashMap<BlockId, usize> = HashMap::new();
    for block in &function.blocks {
        let mut targets = block.terminator.targets();
        targets.sort();
        targets.dedup();
        successor_counts.insert(block.id, targets.len());
    }

    let mut new_blocks: Vec<BasicBlock> = Vec::new();
    for ((pred, succ), copies) in edge_copies {
        if copies.is_empty() {
            continue;
        }
        let instructions: Vec<Instruction> = copies
            .into_iter()
            .map(|(target, source)| Instruction::Assign { target, value: Expression::Identifier(source), declaration_kind: DeclarationKind::None })
            .collect();

        let single_successor = successor_counts.get(&pred).copied().unwrap_or(1) <= 1;
        if single_successor {
            if let Some(block) = function.blocks.iter_mut().find(|b| b.id == pred) {
                block.instructions.extend(instructions);
            }
        } else {
            let split_id = next_block_id;
            next_block_id += 1;
            new_blocks.push(BasicBlock { id: split_id, instructions, terminator: Terminator::Jump(succ) });
            if let Some(block) = function.blocks.iter_mut().find(|b| b.id == pred) {
                retarget(&mut block.terminator, succ, split_id);
            }
        }
    }
    function.blocks.extend(new_blocks);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::*;

    #[test]
    fn phi_on_single_successor_predecessors_is_appended_in_place() {
        let b0 = BasicBlock { id: 0, instructions: vec![], terminator: Terminator::Jump(2) };
        let b1 = BasicBlock { id: 1, instructions: vec![], terminator: Terminator::Jump(2) };
        let b2 = BasicBlock {
            id: 2,
            instructions: vec![Instruction::Phi { target: "x$2".into(), sources: vec![(0, "x$0".into()), (1, "x$1".into())] }],
            terminator: Terminator::Return(Some(Expression::Identifier("x$2".into()))),
        };
        let mut func = Function { name: "f".into(), params: vec![], raw_params: vec![], blocks: vec![b0, b1, b2], entry: 0, flags: FunctionFlags::default(), hook_return_info: None };
        run(&mut func);
        assert!(func.block(0).instructions.iter().any(|i| i.target_name() == Some("x$2")));
        assert!(func.block(1).instructions.iter().any(|i| i.target_name() == Some("x$2")));
        assert!(func.block(2).instructions.is_empty());
    }

    #[test]
    fn critical_edge_is_split_when_predecessor_branches() {
        let b0 = BasicBlock { id: 0, instructions: vec![], terminator: Terminator::Branch { test: Expression::Identifier("cond".into()), consequent: 1, alternate: 2 } };
        let b1 = BasicBlock { id: 1, instructions: vec![], terminator: Terminator::Jump(2) };
        let b2 = BasicBlock {
            id: 2,
            instructions: vec![Instruction::Phi { target: "y$2".into(), sources: vec![(0, "y$0".into()), (1, "y$1".into())] }],
            terminator: Terminator::Return(Some(Expression::Identifier("y$2".into()))),
        };
        let mut func = Function { name: "f".into(), params: vec![], raw_params: vec![], blocks: vec![b0, b1, b2], entry: 0, flags: FunctionFlags::default(), hook_return_info: None };
        run(&mut func);
        assert_eq!(func.blocks.len(), 4);
        match &func.block(0).terminator {
            Terminator::Branch { alternate, .. } => assert_ne!(*alternate, 2),
            other => panic!("expected branch, got {other:?}"),
        }
    }
}

//! CFG construction, dominance, loop detection, and SSA formation
//! (spec.md §4.1).
//!
//! Dominators are computed with the iterative Cooper/Harvey/Kennedy
//! algorithm over a reverse-postorder numbering (no recursion, so it can't
//! blow the stack on a pathological CFG); phi placement uses the standard
//! iterated-dominance-frontier construction, and renaming walks the
//! dominator tree with a per-base-name definition stack.

use crate::errors::CompileError;
use crate::ir::ssa::SsaNamer;
use crate::ir::{BasicBlock, BlockId, DeclarationKind, Function, Instruction, Terminator};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Default)]
pub struct CfgAnalysis {
    pub preds: HashMap<BlockId, Vec<BlockId>>,
    pub succs: HashMap<BlockId, Vec<BlockId>>,
    pub idom: HashMap<BlockId, BlockId>,
    pub dom_children: HashMap<BlockId, Vec<BlockId>>,
    pub dominance_frontier: HashMap<BlockId, HashSet<BlockId>>,
    pub reverse_postorder: Vec<BlockId>,
    pub loop_headers: HashSet<BlockId>,
    pub back_edges: Vec<(BlockId, BlockId)>,
}

impl CfgAnalysis {
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        if a == b {
            return true;
        }
        let mut cur = b;
        while let Some(&idom) = self.idom.get(&cur) {
            if idom == cur {
                break;
            }
            if idom == a {
                return true;
            }
            cur = idom;
        }
        false
    }
}

/// Builds the successor/predecessor maps, reverse-postorder numbering, back
/// edges (and thus natural loop headers), dominator tree, and dominance
/// frontiers for `function`. Does not mutate `function`.
pub fn analyze(function: &Function) -> Result<CfgAnalysis, CompileError> {
    function.validate()?;

    let mut succs: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
    let mut preds: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
    for block in &function.blocks {
        preds.entry(block.id).or_default();
        let targets = block.terminator.targets();
        for t in &targets {
            preds.entry(*t).or_default().push(block.id);
        }
        succs.insert(block.id, targets);
    }

    let (postorder, back_edges) = depth_first_postorder(function.entry, &succs);
    let mut reverse_postorder = postorder.clone();
    reverse_postorder.reverse();

    let rpo_index: HashMap<BlockId, usize> =
        reverse_postorder.iter().enumerate().map(|(i, b)| (*b, i)).collect();

    let idom = compute_idoms(function.entry, &reverse_postorder, &rpo_index, &preds);

    let mut dom_children: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
    for (&b, &parent) in &idom {
        if b != parent {
            dom_children.entry(parent).or_default().push(b);
        }
    }

    let dominance_frontier = compute_dominance_frontier(&reverse_postorder, &preds, &idom);

    let loop_headers = back_edges.iter().map(|(_, header)| *header).collect();

    Ok(CfgAnalysis { preds, succs, idom, dom_children, dominance_frontier, reverse_postorder, loop_headers, back_edges })
}

fn depth_first_postorder(
    entry: BlockId,
    succs: &HashMap<BlockId, Vec<BlockId>>,
) -> (Vec<BlockId>, Vec<(BlockId, BlockId)>) {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Visiting,
        Done,
    }
    let mut state: HashMap<BlockId, State> = HashMap::new();
    let mut postorder = Vec::new();
    let mut back_edges = Vec::new();
    // Explicit worklist (spec.md §5 "no operation suspends... iteration
    // order is deterministic"): (node, child-iteration-index).
    let mut stack: Vec<(BlockId, usize)> = vec![(entry, 0)];
    state.insert(entry, State::Visiting);

    while let Some(&mut (node, ref mut idx)) = stack.last_mut() {
        let children = succs.get(&node).cloned().unwrap_or_default();
        if *idx < children.len() {
            let child = children[*idx];
            *idx += 1;
            match state.get(&child) {
                None => {
                    state.insert(child, State::Visiting);
                    stack.push((child, 0));
                }
                Some(State::Visiting) => back_edges.push((node, child)),
                Some(State::Done) => {}
            }
        } else {
            postorder.push(node);
            state.insert(node, State::Done);
            stack.pop();
        }
    }
    (postorder, back_edges)
}

fn compute_idoms(
    entry: BlockId,
    rpo: &[BlockId],
    rpo_index: &HashMap<BlockId, usize>,
    preds: &HashMap<BlockId, Vec<BlockId>>,
) -> HashMap<BlockId, BlockId> {
    let mut idom: HashMap<BlockId, BlockId> = HashMap::new();
    idom.insert(entry, entry);

    let intersect = |a: BlockId, b: BlockId, idom: &HashMap<BlockId, BlockId>, rpo_index: &HashMap<BlockId, usize>| -> BlockId {
        let mut finger1 = a;
        let mut finger2 = b;
        while finger1 != finger2 {
            while rpo_index[&finger1] > rpo_index[&finger2] {
                finger1 = idom[&finger1];
            }
            while rpo_index[&finger2] > rpo_index[&finger1] {
                finger2 = idom[&finger2];
            }
        }
        finger1
    };

    let mut changed = true;
    while changed {
        changed = false;
        for &node in rpo.iter() {
            if node == entry {
                continue;
            }
            let node_preds: Vec<BlockId> = preds
                .get(&node)
                .map(|ps| ps.iter().copied().filter(|p| idom.contains_key(p)).collect())
                .unwrap_or_default();
            let Some((&first, rest)) = node_preds.split_first() else { continue };
            let mut new_idom = first;
            for &p in rest {
                new_idom = intersect(new_idom, p, &idom, rpo_index);
            }
            if idom.get(&node) != Some(&new_idom) {
                idom.insert(node, new_idom);
                changed = true;
            }
        }
    }
    idom
}

fn compute_dominance_frontier(
    rpo: &[BlockId],
    preds: &HashMap<BlockId, Vec<BlockId>>,
    idom: &HashMap<BlockId, BlockId>,
) -> HashMap<BlockId, HashSet<BlockId>> {
    let mut df: HashMap<BlockId, HashSet<BlockId>> = rpo.iter().map(|&b| (b, HashSet::new())).collect();
    for &node in rpo {
        let node_preds = preds.get(&node).cloned().unwrap_or_default();
        if node_preds.len() < 2 {
            continue;
        }
        let Some(&node_idom) = idom.get(&node) else { continue };
        for pred in node_preds {
            let mut runner = pred;
            while idom.contains_key(&runner) && runner != node_idom {
                df.entry(runner).or_default().insert(node);
                let next = idom[&runner];
                if next == runner {
                    break;
                }
                runner = next;
            }
        }
    }
    df
}

/// Converts `function` to SSA in place: inserts phi nodes at iterated
/// dominance frontiers of every multiply-defined name, then renames all
/// definitions and uses along a dominator-tree walk. Returns the SSA
/// namer so callers (the reactive-scope analyzer, the optimizer) can ask
/// whether a given name is compiler-generated and what its max version is.
pub fn to_ssa(function: &mut Function, cfg: &CfgAnalysis) -> Result<SsaNamer, CompileError> {
    let defs_by_name = collect_definition_sites(function);
    insert_phis(function, cfg, &defs_by_name);
    let namer = rename(function, cfg)?;
    Ok(namer)
}

fn collect_definition_sites(function: &Function) -> HashMap<String, HashSet<BlockId>> {
    let mut sites: HashMap<String, HashSet<BlockId>> = HashMap::new();
    for block in &function.blocks {
        for inst in &block.instructions {
            if let Some(name) = inst.target_name() {
                if !crate::ir::ssa::is_reserved_prefix(name) || matches!(inst, Instruction::Phi { .. }) {
                    sites.entry(name.to_string()).or_default().insert(block.id);
                }
            }
        }
        if let Terminator::ForOf { var, .. } | Terminator::ForIn { var, .. } = &block.terminator {
            sites.entry(var.clone()).or_default().insert(block.id);
        }
    }
    sites
}

fn insert_phis(function: &mut Function, cfg: &CfgAnalysis, defs_by_name: &HashMap<String, HashSet<BlockId>>) {
    for (name, def_blocks) in defs_by_name {
        if def_blocks.len() < 2 {
            continue;
        }
        let mut has_phi: HashSet<BlockId> = HashSet::new();
        let mut worklist: Vec<BlockId> = def_blocks.iter().copied().collect();
        while let Some(block_id) = worklist.pop() {
            let frontier = cfg.dominance_frontier.get(&block_id).cloned().unwrap_or_default();
            for df_block in frontier {
                if has_phi.insert(df_block) {
                    let preds = cfg.preds.get(&df_block).cloned().unwrap_or_default();
                    let sources = preds.iter().map(|&p| (p, name.clone())).collect();
                    let block = function.block_mut(df_block);
                    block.instructions.insert(0, Instruction::Phi { target: name.clone(), sources });
                    worklist.push(df_block);
                }
            }
        }
    }
}

/// Per-base-name definition stack used while renaming along the dominator
/// tree, mirroring the classic Cytron et al. renaming algorithm.
fn rename(function: &mut Function, cfg: &CfgAnalysis) -> Result<SsaNamer, CompileError> {
    let mut namer = SsaNamer::new();
    let mut stacks: HashMap<String, Vec<String>> = HashMap::new();
    for param in &function.params {
        stacks.entry(param.clone()).or_default().push(param.clone());
    }

    rename_block(function, cfg, function.entry, &mut stacks, &mut namer);
    Ok(namer)
}

fn rename_block(
    function: &mut Function,
    cfg: &CfgAnalysis,
    block_id: BlockId,
    stacks: &mut HashMap<String, Vec<String>>,
    namer: &mut SsaNamer,
) {
    let mut pushed: Vec<String> = Vec::new();

    {
        let block = function.block_mut(block_id);
        for inst in block.instructions.iter_mut() {
            match inst {
                Instruction::Phi { target, .. } => {
                    let versioned = namer.version(target);
                    stacks.entry(target.clone()).or_default().push(versioned.clone());
                    pushed.push(target.clone());
                    *target = versioned;
                }
                Instruction::Assign { target, value, .. } => {
                    rename_expr(value, stacks);
                    let base = target.clone();
                    let versioned = namer.version(&base);
                    stacks.entry(base.clone()).or_default().push(versioned.clone());
                    pushed.push(base);
                    *target = versioned;
                }
                Instruction::Expression { value } => rename_expr(value, stacks),
            }
        }
        // The iterated/object expression is renamed against the *outer*
        // scope before the loop variable it feeds is versioned.
        rename_terminator(&mut block.terminator, stacks);
        if let Terminator::ForOf { var, .. } | Terminator::ForIn { var, .. } = &mut block.terminator {
            let base = var.clone();
            let versioned = namer.version(&base);
            stacks.entry(base.clone()).or_default().push(versioned.clone());
            pushed.push(base);
            *var = versioned;
        }
    }

    // Patch phi operands in successor blocks: each phi source naming this
    // block must read the version current at the end of this block.
    let successors = cfg.succs.get(&block_id).cloned().unwrap_or_default();
    for succ in successors {
        let block = function.block_mut(succ);
        for inst in block.instructions.iter_mut() {
            if let Instruction::Phi { sources, .. } = inst {
                for (pred, name) in sources.iter_mut() {
                    if *pred == block_id {
                        if let Some(top) = stacks.get(name.as_str()).and_then(|s| s.last()) {
                            *name = top.clone();
                        } else if let Some(top) = stacks.get(&crate::ir::ssa::base_name(name)).and_then(|s| s.last()) {
                            *name = top.clone();
                        }
                    }
                }
            }
        }
    }

    for &child in cfg.dom_children.get(&block_id).cloned().unwrap_or_default().iter() {
        rename_block(function, cfg, child, stacks, namer);
    }

    for name in pushed {
        if let Some(stack) = stacks.get_mut(&name) {
            stack.pop();
        }
    }
}

fn rename_expr(expr: &mut crate::ir::Expression, stacks: &HashMap<String, Vec<String>>) {
    use crate::ir::Expression as E;
    match expr {
        E::Identifier(name) => {
            if let Some(top) = stacks.get(name).and_then(|s| s.last()) {
                *name = top.clone();
            }
        }
        E::Call { callee, arguments, .. } => {
            rename_expr(callee, stacks);
            arguments.iter_mut().for_each(|a| rename_expr(a, stacks));
        }
        E::Member { object, property, .. } => {
            rename_expr(object, stacks);
            if let crate::ir::MemberKey::Computed(e) = property {
                rename_expr(e, stacks);
            }
        }
        E::Binary { left, right, .. } | E::Logical { left, right, .. } => {
            rename_expr(left, stacks);
            rename_expr(right, stacks);
        }
        E::Unary { argument, .. } | E::SpreadElement(argument) | E::Await(argument) => rename_expr(argument, stacks),
        E::Conditional { test, consequent, alternate } => {
            rename_expr(test, stacks);
            rename_expr(consequent, stacks);
            rename_expr(alternate, stacks);
        }
        E::Array(elems) => elems.iter_mut().for_each(|e| match e {
            crate::ir::ArrayElement::Item(e) | crate::ir::ArrayElement::Spread(e) => rename_expr(e, stacks),
            crate::ir::ArrayElement::Hole => {}
        }),
        E::Object(props) => props.iter_mut().for_each(|p| match p {
            crate::ir::ObjectProperty::Field { value, .. } => rename_expr(value, stacks),
            crate::ir::ObjectProperty::Spread(e) => rename_expr(e, stacks),
        }),
        E::AssignmentExpression { target, value } => {
            rename_expr(target, stacks);
            rename_expr(value, stacks);
        }
        E::UpdateExpression { argument, .. } => rename_expr(argument, stacks),
        E::TemplateLiteral(parts) | E::TaggedTemplate { quasi: parts, .. } => {
            for part in parts {
                if let crate::ir::TemplatePart::Expression(e) = part {
                    rename_expr(e, stacks);
                }
            }
        }
        E::New { callee, arguments } => {
            rename_expr(callee, stacks);
            arguments.iter_mut().for_each(|a| rename_expr(a, stacks));
        }
        E::Sequence(exprs) => exprs.iter_mut().for_each(|e| rename_expr(e, stacks)),
        E::Yield { argument, .. } => {
            if let Some(e) = argument {
                rename_expr(e, stacks);
            }
        }
        // JSX subtrees, nested function/arrow bodies, literals, this/super:
        // nested function scopes get their own renaming pass when the
        // lowerer recurses into them; JSX attribute values are expressions
        // already covered via their own Call/Member/etc. shape once lowered.
        E::Jsx(_) | E::ArrowFunction { .. } | E::FunctionExpression(_) | E::Literal(_) | E::This | E::Super | E::Class(_) => {}
    }
}

fn rename_terminator(term: &mut Terminator, stacks: &HashMap<String, Vec<String>>) {
    match term {
        Terminator::Return(Some(e)) | Terminator::Throw(e) => rename_expr(e, stacks),
        Terminator::Branch { test, .. } => rename_expr(test, stacks),
        Terminator::Switch { discriminant, cases } => {
            rename_expr(discriminant, stacks);
            for (test, _) in cases.iter_mut() {
                if let Some(e) = test {
                    rename_expr(e, stacks);
                }
            }
        }
        Terminator::ForOf { iter, .. } => rename_expr(iter, stacks),
        Terminator::ForIn { obj, .. } => rename_expr(obj, stacks),
        _ => {}
    }
}

/// Equivalent to `declaration_kind`, reused by the builder and the region
/// generator when classifying a binding it lifted from a statement.
pub fn declaration_kind_from_ast(kind: &crate::ast::DeclarationKind) -> DeclarationKind {
    match kind {
        crate::ast::DeclarationKind::Const => DeclarationKind::Const,
        crate::ast::DeclarationKind::Let => DeclarationKind::Let,
        crate::ast::DeclarationKind::Var => DeclarationKind::Var,
        crate::ast::DeclarationKind::Function => DeclarationKind::Function,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::*;

    fn simple_branch_function() -> Function {
        // function f(cond) { let x = 1; if (cond) { x = 2; } return x; }
        let b0 = BasicBlock {
            id: 0,
            instructions: vec![Instruction::Assign {
                target: "x".into(),
                value: Expression::Literal(Literal::Number(1.0)),
                declaration_kind: DeclarationKind::Let,
            }],
            terminator: Terminator::Branch { test: Expression::Identifier("cond".into()), consequent: 1, alternate: 2 },
        };
        let b1 = BasicBlock {
            id: 1,
            instructions: vec![Instruction::Assign {
                target: "x".into(),
                value: Expression::Literal(Literal::Number(2.0)),
                declaration_kind: DeclarationKind::None,
            }],
            terminator: Terminator::Jump(2),
        };
        let b2 = BasicBlock { id: 2, instructions: vec![], terminator: Terminator::Return(Some(Expression::Identifier("x".into()))) };
        Function {
            name: "f".into(),
            params: vec!["cond".into()],
            raw_params: vec![],
            blocks: vec![b0, b1, b2],
            entry: 0,
            flags: FunctionFlags::default(),
            hook_return_info: None,
        }
    }

    #[test]
    fn block_ids_and_phi_sources_are_valid() {
        let mut f = simple_branch_function();
        let cfg = analyze(&f).unwrap();
        to_ssa(&mut f, &cfg).unwrap();

        let mut ids = HashSet::new();
        for b in &f.blocks {
            assert!(ids.insert(b.id), "duplicate block id");
        }
        let exit = f.block(2);
        let phi = exit.instructions.iter().find(|i| matches!(i, Instruction::Phi { .. }));
        let Some(Instruction::Phi { sources, .. }) = phi else { panic!("expected phi at join block") };
        for (pred, _) in sources {
            assert!(cfg.preds[&2].contains(pred), "phi source must be a real predecessor");
        }
    }

    #[test]
    fn loop_header_detected_from_back_edge() {
        let b0 = BasicBlock { id: 0, instructions: vec![], terminator: Terminator::Jump(1) };
        let b1 = BasicBlock { id: 1, instructions: vec![], terminator: Terminator::Branch { test: Expression::Identifier("c".into()), consequent: 2, alternate: 3 } };
        let b2 = BasicBlock { id: 2, instructions: vec![], terminator: Terminator::Jump(1) };
        let b3 = BasicBlock { id: 3, instructions: vec![], terminator: Terminator::Return(None) };
        let f = Function { name: "loop".into(), params: vec![], raw_params: vec![], blocks: vec![b0, b1, b2, b3], entry: 0, flags: FunctionFlags::default(), hook_return_info: None };
        let cfg = analyze(&f).unwrap();
        assert!(cfg.loop_headers.contains(&1));
    }
}

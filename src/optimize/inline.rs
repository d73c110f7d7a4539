//! Single-use inlining (spec.md §4.6(e)): a binding read exactly once is
//! substituted directly into its use site and its own assignment dropped,
//! shrinking the IR the later passes (DCE, phi elimination, the lowerer)
//! have to walk. Impure expressions may only be inlined when doing so can't
//! reorder them past another observable effect, which in practice means the
//! use must be the very next instruction in the same block; pure,
//! non-reactive expressions may additionally be inlined across blocks when
//! the definition dominates the (single) use.

use crate::cfg::CfgAnalysis;
use crate::ir::{ArrayElement, ArrowBody, BlockId, Expression, Function, Instruction, JsxAttributeValue, JsxChild, ObjectProperty, TemplatePart};
use crate::optimize::purity::{self, PurityContext};
use crate::reactive_scope::ReactiveScopeAnalysis;
use std::collections::HashMap;

struct Use {
    block: BlockId,
    instruction_index: usize,
}

fn count_reads(function: &Function) -> HashMap<String, Vec<Use>> {
    let mut uses: HashMap<String, Vec<Use>> = HashMap::new();
    for block in &function.blocks {
        for (idx, inst) in block.instructions.iter().enumerate() {
            let mut record = |e: &Expression| {
                crate::ir::walk_expression(e, &mut |sub| {
                    if let Expression::Identifier(name) = sub {
                        uses.entry(name.clone()).or_default().push(Use { block: block.id, instruction_index: idx });
                    }
                });
            };
            match inst {
                Instruction::Assign { value, .. } | Instruction::Expression { value } => record(value),
                Instruction::Phi { sources, .. } => {
                    for (_, name) in sources {
                        uses.entry(name.clone()).or_default().push(Use { block: block.id, instruction_index: idx });
                    }
                }
            }
        }
        record_terminator_reads(&block.terminator, block.id, &mut uses);
    }
    uses
}

fn record_terminator_reads(term: &crate::ir::Terminator, block: BlockId, uses: &mut HashMap<String, Vec<Use>>) {
    use crate::ir::Terminator::*;
    let mut record = |e: &Expression| {
        crate::ir::walk_expression(e, &mut |sub| {
            if let Expression::Identifier(name) = sub {
                uses.entry(name.clone()).or_default().push(Use { block, instruction_index: usize::MAX });
            }
        });
    };
    match term {
        Return(Some(e)) | Throw(e) => record(e),
        Branch { test, .. } => record(test),
        Switch { discriminant, cases } => {
            record(discriminant);
            for (test, _) in cases {
                if let Some(e) = test {
                    record(e);
                }
            }
        }
        ForOf { iter, .. } => record(iter),
        ForIn { obj, .. } => record(obj),
        _ => {}
    }
}

fn hook_return_names(function: &Function) -> Vec<String> {
    function
        .hook_return_info
        .as_ref()
        .map(|info| info.bindings.iter().filter_map(|b| match &b.index_or_name {
            crate::ir::HookReturnKey::Name(n) => Some(n.clone()),
            crate::ir::HookReturnKey::Index(_) => None,
        }).collect())
        .unwrap_or_default()
}

/// Inlines every eligible single-use binding in `function`, iterating to a
/// fixpoint since inlining one binding can expose a new single-use
/// expression (its inlined form may itself only be read once).
pub fn run(function: &mut Function, cfg: &CfgAnalysis, purity: &PurityContext, scopes: &ReactiveScopeAnalysis) {
    let protected = hook_return_names(function);
    let mut changed = true;
    let mut iterations = 0;
    while changed && iterations < 1000 {
        changed = false;
        iterations += 1;
        if inline_one_round(function, cfg, purity, scopes, &protected) {
            changed = true;
        }
    }
}

fn inline_one_round(function: &mut Function, cfg: &CfgAnalysis, purity: &PurityContext, scopes: &ReactiveScopeAnalysis, protected: &[String]) -> bool {
    let uses = count_reads(function);

    let mut def_sites: HashMap<String, (BlockId, usize, Expression)> = HashMap::new();
    for block in &function.blocks {
        for (idx, inst) in block.instructions.iter().enumerate() {
            if let Instruction::Assign { target, value, .. } = inst {
                def_sites.insert(target.clone(), (block.id, idx, value.clone()));
            }
        }
    }

    for (name, (def_block, def_idx, value)) in def_sites {
        if protected.contains(&name) {
            continue;
        }
        let Some(reads) = uses.get(&name) else { continue };
        if reads.len() != 1 {
            continue;
        }
        let use_site = &reads[0];

        let is_pure = purity::expression_is_pure(&value, purity, &crate::config::CompilerConfig::default());
        let reads_tracked = {
            let mut t = false;
            crate::ir::walk_expression(&value, &mut |sub| {
                if let Expression::Identifier(n) = sub {
                    if scopes.is_tracked(&crate::ir::ssa::base_name(n)) {
                        t = true;
                    }
                }
            });
            t
        };

        // spec.md §4.6(e): "not reactive-dependent" is a blanket condition,
        // not one scoped only to the cross-block case — inlining a tracked
        // read even into the immediately-next instruction still duplicates
        // it at a new source location relative to the reactive scope it was
        // read in, which the optimizer must never do.
        if reads_tracked {
            continue;
        }
        // "not an explicit memo": inlining a `$state`/`$store`/`$memo`/
        // `$effect` creator call buries it inside the use site's
        // expression, where `codegen::creator_kind` (which only inspects
        // the top-level value of an `Instruction::Assign`) can no longer
        // see it — the surface macro call would then be emitted verbatim
        // instead of lowered to `useSignal`/`useMemo`/etc.
        if crate::codegen::creator_kind(&value, &crate::config::CompilerConfig::default()).is_some() {
            continue;
        }

        let same_block_adjacent = use_site.block == def_block && use_site.instruction_index == def_idx + 1;
        let cross_block_safe = is_pure && cfg.dominates(def_block, use_site.block);

        if !same_block_adjacent && !cross_block_safe {
            continue;
        }
        // An impure expression may only move when the use is the literal
        // next instruction in the same block; that's the only shape we
        // allow for non-pure values regardless of dominance.
        if !is_pure && !same_block_adjacent {
            continue;
        }

        if substitute_single_use(function, &name, &value, use_site.block, use_site.instruction_index) {
            remove_definition(function, def_block, &name);
            return true;
        }
    }
    false
}

fn substitute_single_use(function: &mut Function, name: &str, value: &Expression, block_id: BlockId, instruction_index: usize) -> bool {
    let Some(block) = function.blocks.iter_mut().find(|b| b.id == block_id) else { return false };
    if instruction_index == usize::MAX {
        replace_in_terminator(&mut block.terminator, name, value);
        return true;
    }
    let Some(inst) = block.instructions.get_mut(instruction_index) else { return false };
    match inst {
        Instruction::Assign { value: v, .. } | Instruction::Expression { value: v } => {
            replace_identifier(v, name, value);
            true
        }
        Instruction::Phi { sources, .. } => {
            for (_, source_name) in sources.iter_mut() {
                if source_name == name {
                    if let Expression::Identifier(replacement) = value {
                        *source_name = replacement.clone();
                        return true;
                    }
                }
            }
            false
        }
    }
}

fn replace_in_terminator(term: &mut crate::ir::Terminator, name: &str, value: &Expression) {
    use crate::ir::Terminator::*;
    match term {
        Return(Some(e)) | Throw(e) => replace_identifier(e, name, value),
        Branch { test, .. } => replace_identifier(test, name, value),
        Switch { discriminant, .. } => replace_identifier(discriminant, name, value),
        ForOf { iter, .. } => replace_identifier(iter, name, value),
        ForIn { obj, .. } => replace_identifier(obj, name, value),
        _ => {}
    }
}

/// Replaces the first (and, given single-use eligibility, only) read of
/// `name` anywhere within `target` with `replacement`.
fn replace_identifier(target: &mut Expression, name: &str, replacement: &Expression) {
    if let Expression::Identifier(n) = target {
        if n == name {
            *target = replacement.clone();
            return;
        }
        return;
    }
    match target {
        Expression::Identifier(_) | Expression::Literal(_) | Expression::This | Expression::Super | Expression::Class(_) => {}
        Expression::Call { callee, arguments, .. } | Expression::New { callee, arguments } => {
            replace_identifier(callee, name, replacement);
            for a in arguments {
                replace_identifier(a, name, replacement);
            }
        }
        Expression::Member { object, property, .. } => {
            replace_identifier(object, name, replacement);
            if let crate::ir::MemberKey::Computed(e) = property {
                replace_identifier(e, name, replacement);
            }
        }
        Expression::Binary { left, right, .. } | Expression::Logical { left, right, .. } => {
            replace_identifier(left, name, replacement);
            replace_identifier(right, name, replacement);
        }
        Expression::Unary { argument, .. } | Expression::SpreadElement(argument) | Expression::Await(argument) => {
            replace_identifier(argument, name, replacement);
        }
        Expression::Conditional { test, consequent, alternate } => {
            replace_identifier(test, name, replacement);
            replace_identifier(consequent, name, replacement);
            replace_identifier(alternate, name, replacement);
        }
        Expression::Array(elems) => {
            for e in elems {
                match e {
                    ArrayElement::Item(e) | ArrayElement::Spread(e) => replace_identifier(e, name, replacement),
                    ArrayElement::Hole => {}
                }
            }
        }
        Expression::Object(props) => {
            for p in props {
                match p {
                    ObjectProperty::Field { value, .. } => replace_identifier(value, name, replacement),
                    ObjectProperty::Spread(e) => replace_identifier(e, name, replacement),
                }
            }
        }
        Expression::Jsx(jsx) => {
            for attr in &mut jsx.attributes {
                match &mut attr.value {
                    JsxAttributeValue::Expression(e) | JsxAttributeValue::Spread(e) => replace_identifier(e, name, replacement),
                }
            }
            for child in &mut jsx.children {
                replace_identifier_jsx_child(child, name, replacement);
            }
        }
        Expression::ArrowFunction { body, .. } => {
            if let ArrowBody::Expression(e) = body.as_mut() {
                replace_identifier(e, name, replacement);
            }
        }
        Expression::FunctionExpression(_) => {}
        Expression::AssignmentExpression { target: t, value } => {
            replace_identifier(t, name, replacement);
            replace_identifier(value, name, replacement);
        }
        Expression::UpdateExpression { argument, .. } => replace_identifier(argument, name, replacement),
        Expression::TemplateLiteral(parts) | Expression::TaggedTemplate { quasi: parts, .. } => {
            for part in parts {
                if let TemplatePart::Expression(e) = part {
                    replace_identifier(e, name, replacement);
                }
            }
        }
        Expression::Sequence(exprs) => {
            for e in exprs {
                replace_identifier(e, name, replacement);
            }
        }
        Expression::Yield { argument, .. } => {
            if let Some(e) = argument {
                replace_identifier(e, name, replacement);
            }
        }
    }
}

fn replace_identifier_jsx_child(child: &mut JsxChild, name: &str, replacement: &Expression) {
    match child {
        JsxChild::Element(el) => {
            for attr in &mut el.attributes {
                match &mut attr.value {
                    JsxAttributeValue::Expression(e) | JsxAttributeValue::Spread(e) => replace_identifier(e, name, replacement),
                }
            }
            for c in &mut el.children {
                replace_identifier_jsx_child(c, name, replacement);
            }
        }
        JsxChild::Expression(e) => replace_identifier(e, name, replacement),
        JsxChild::Text(_) => {}
    }
}

fn remove_definition(function: &mut Function, block_id: BlockId, name: &str) {
    if let Some(block) = function.blocks.iter_mut().find(|b| b.id == block_id) {
        block.instructions.retain(|inst| inst.target_name() != Some(name));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use crate::ir::*;

    #[test]
    fn single_use_pure_binding_is_inlined_and_dropped() {
        let b0 = BasicBlock {
            id: 0,
            instructions: vec![
                Instruction::Assign { target: "doubled".into(), value: Expression::Binary { left: Box::new(Expression::Identifier("n".into())), operator: BinaryOp::Mul, right: Box::new(Expression::Literal(Literal::Number(2.0))) }, declaration_kind: DeclarationKind::Const },
            ],
            terminator: Terminator::Return(Some(Expression::Identifier("doubled".into()))),
        };
        let mut func = Function { name: "f".into(), params: vec!["n".into()], raw_params: vec![], blocks: vec![b0], entry: 0, flags: FunctionFlags::default(), hook_return_info: None };
        let cfg = crate::cfg::analyze(&func).unwrap();
        let config = CompilerConfig::default();
        let scopes = crate::reactive_scope::analyze(&func, &cfg, &config).unwrap();
        let purity = purity::analyze(&func, &config);
        run(&mut func, &cfg, &purity, &scopes);
        assert!(func.block(0).instructions.is_empty());
        assert!(matches!(func.block(0).terminator, Terminator::Return(Some(Expression::Binary { .. }))));
    }

    /// A same-block-adjacent single use of a reactivity-creator call must
    /// never be inlined: buried inside its use site, `codegen`'s
    /// top-level-only `creator_kind` check can no longer see it, so the
    /// surface `$memo(...)` macro would be emitted unconverted instead of
    /// lowered to `useMemo`.
    #[test]
    fn explicit_memo_creator_call_is_never_inlined() {
        let b0 = BasicBlock {
            id: 0,
            instructions: vec![
                Instruction::Assign {
                    target: "doubled".into(),
                    value: Expression::Call {
                        callee: Box::new(Expression::Identifier("$memo".into())),
                        arguments: vec![Expression::ArrowFunction {
                            params: vec![],
                            body: Box::new(ArrowBody::Expression(Expression::Identifier("n".into()))),
                            is_expression: true,
                            is_async: false,
                        }],
                        optional: false,
                        pure: None,
                    },
                    declaration_kind: DeclarationKind::Const,
                },
                Instruction::Expression {
                    value: Expression::Call {
                        callee: Box::new(Expression::Identifier("print".into())),
                        arguments: vec![Expression::Identifier("doubled".into())],
                        optional: false,
                        pure: None,
                    },
                },
            ],
            terminator: Terminator::Return(None),
        };
        let mut func = Function { name: "f".into(), params: vec!["n".into()], raw_params: vec![], blocks: vec![b0], entry: 0, flags: FunctionFlags::default(), hook_return_info: None };
        let cfg = crate::cfg::analyze(&func).unwrap();
        let config = CompilerConfig::default();
        let scopes = crate::reactive_scope::analyze(&func, &cfg, &config).unwrap();
        let purity = purity::analyze(&func, &config);
        run(&mut func, &cfg, &purity, &scopes);
        assert!(
            matches!(func.block(0).instructions[0], Instruction::Assign { value: Expression::Call { .. }, .. }),
            "the $memo creator call must stay its own assignment, got {:?}",
            func.block(0).instructions
        );
    }
}

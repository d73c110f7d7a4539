//! Constant propagation (spec.md §4.6(b)).
//!
//! Literal-only expressions are folded at compile time; known-constant
//! identifiers are substituted with their literal at each read. Folding
//! within the defining block is always safe (the read is guaranteed to
//! execute after the write, with nothing able to observe it in between).
//! Substituting a constant into a *different* block is only safe when every
//! one of the cross-block gating conditions spec.md §4.6(b) lists holds:
//! the base is assigned exactly once in the function, it's declared `const`
//! (or is a compiler-generated name), its value is not reactive
//! (`ReactiveScopeAnalysis::is_tracked`), the definition dominates the use,
//! the use isn't inside a loop the definition sits outside of, and
//! `CompilerConfig::cross_block_const_prop` hasn't disabled the pass.

use crate::cfg::CfgAnalysis;
use crate::config::CompilerConfig;
use crate::ir::ssa;
use crate::ir::{ArrayElement, ArrowBody, BasicBlock, BinaryOp, BlockId, Expression, Function, Instruction, JsxAttributeValue, JsxChild, Literal, LogicalOp, ObjectProperty, TemplatePart, UnaryOp};
use crate::reactive_scope::ReactiveScopeAnalysis;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Number(f64),
    String(String),
    Bool(bool),
    Null,
    Undefined,
}

impl ConstValue {
    pub fn to_literal(&self) -> Literal {
        match self {
            ConstValue::Number(n) => Literal::Number(*n),
            ConstValue::String(s) => Literal::String(s.clone()),
            ConstValue::Bool(b) => Literal::Bool(*b),
            ConstValue::Null => Literal::Null,
            ConstValue::Undefined => Literal::Undefined,
        }
    }

    fn truthy(&self) -> bool {
        match self {
            ConstValue::Number(n) => *n != 0.0 && !n.is_nan(),
            ConstValue::String(s) => !s.is_empty(),
            ConstValue::Bool(b) => *b,
            ConstValue::Null | ConstValue::Undefined => false,
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            ConstValue::Number(n) => Some(*n),
            ConstValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            ConstValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn to_js_string(&self) -> String {
        match self {
            ConstValue::Number(n) => format_number(*n),
            ConstValue::String(s) => s.clone(),
            ConstValue::Bool(b) => b.to_string(),
            ConstValue::Null => "null".to_string(),
            ConstValue::Undefined => "undefined".to_string(),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn literal_to_const(lit: &Literal) -> Option<ConstValue> {
    match lit {
        Literal::String(s) => Some(ConstValue::String(s.clone())),
        Literal::Number(n) => Some(ConstValue::Number(*n)),
        Literal::Bool(b) => Some(ConstValue::Bool(*b)),
        Literal::Null => Some(ConstValue::Null),
        Literal::Undefined => Some(ConstValue::Undefined),
        Literal::BigInt(_) | Literal::Regex { .. } => None,
    }
}

fn evaluate_binary(op: BinaryOp, l: &ConstValue, r: &ConstValue) -> Option<ConstValue> {
    use BinaryOp::*;
    match op {
        Add => match (l, r) {
            (ConstValue::String(_), _) | (_, ConstValue::String(_)) => {
                Some(ConstValue::String(format!("{}{}", l.to_js_string(), r.to_js_string())))
            }
            _ => Some(ConstValue::Number(l.as_number()? + r.as_number()?)),
        },
        Sub => Some(ConstValue::Number(l.as_number()? - r.as_number()?)),
        Mul => Some(ConstValue::Number(l.as_number()? * r.as_number()?)),
        Div => Some(ConstValue::Number(l.as_number()? / r.as_number()?)),
        Mod => Some(ConstValue::Number(l.as_number()? % r.as_number()?)),
        Exp => Some(ConstValue::Number(l.as_number()?.powf(r.as_number()?))),
        Eq | StrictEq => Some(ConstValue::Bool(const_eq(l, r))),
        NotEq | StrictNotEq => Some(ConstValue::Bool(!const_eq(l, r))),
        Lt => Some(ConstValue::Bool(l.as_number()? < r.as_number()?)),
        LtEq => Some(ConstValue::Bool(l.as_number()? <= r.as_number()?)),
        Gt => Some(ConstValue::Bool(l.as_number()? > r.as_number()?)),
        GtEq => Some(ConstValue::Bool(l.as_number()? >= r.as_number()?)),
        BitAnd => Some(ConstValue::Number(((l.as_number()? as i64) & (r.as_number()? as i64)) as f64)),
        BitOr => Some(ConstValue::Number(((l.as_number()? as i64) | (r.as_number()? as i64)) as f64)),
        BitXor => Some(ConstValue::Number(((l.as_number()? as i64) ^ (r.as_number()? as i64)) as f64)),
        Shl => Some(ConstValue::Number(((l.as_number()? as i64) << (r.as_number()? as i64)) as f64)),
        Shr => Some(ConstValue::Number(((l.as_number()? as i64) >> (r.as_number()? as i64)) as f64)),
        NullishCoalesce => {
            if matches!(l, ConstValue::Null | ConstValue::Undefined) {
                Some(r.clone())
            } else {
                Some(l.clone())
            }
        }
    }
}

fn const_eq(l: &ConstValue, r: &ConstValue) -> bool {
    match (l, r) {
        (ConstValue::Number(a), ConstValue::Number(b)) => a == b,
        (ConstValue::String(a), ConstValue::String(b)) => a == b,
        (ConstValue::Bool(a), ConstValue::Bool(b)) => a == b,
        (ConstValue::Null, ConstValue::Null) | (ConstValue::Undefined, ConstValue::Undefined) => true,
        _ => false,
    }
}

/// Evaluates `expr` given a map of already-known constants (by full SSA
/// name). Returns `None` on anything with a side effect, runtime-dependent
/// value, or an identifier not yet known.
fn evaluate(expr: &Expression, known: &HashMap<String, ConstValue>) -> Option<ConstValue> {
    match expr {
        Expression::Literal(lit) => literal_to_const(lit),
        Expression::Identifier(name) => known.get(name).cloned(),
        Expression::Unary { operator, argument } => {
            let v = evaluate(argument, known)?;
            match operator {
                UnaryOp::Neg => v.as_number().map(|n| ConstValue::Number(-n)),
                UnaryOp::Pos => v.as_number().map(ConstValue::Number),
                UnaryOp::Not => Some(ConstValue::Bool(!v.truthy())),
                UnaryOp::BitNot => v.as_number().map(|n| ConstValue::Number(!(n as i64) as f64)),
                UnaryOp::TypeOf | UnaryOp::Void => None,
            }
        }
        Expression::Binary { left, operator, right } => {
            let l = evaluate(left, known)?;
            let r = evaluate(right, known)?;
            evaluate_binary(*operator, &l, &r)
        }
        Expression::Logical { left, operator, right } => {
            let l = evaluate(left, known)?;
            match operator {
                LogicalOp::And => {
                    if l.truthy() {
                        evaluate(right, known)
                    } else {
                        Some(l)
                    }
                }
                LogicalOp::Or => {
                    if l.truthy() {
                        Some(l)
                    } else {
                        evaluate(right, known)
                    }
                }
            }
        }
        Expression::Conditional { test, consequent, alternate } => {
            let t = evaluate(test, known)?;
            if t.truthy() {
                evaluate(consequent, known)
            } else {
                evaluate(alternate, known)
            }
        }
        Expression::TemplateLiteral(parts) => {
            let mut out = String::new();
            for part in parts {
                match part {
                    TemplatePart::String(s) => out.push_str(s),
                    TemplatePart::Expression(e) => out.push_str(&evaluate(e, known)?.to_js_string()),
                }
            }
            Some(ConstValue::String(out))
        }
        Expression::Sequence(exprs) => exprs.last().and_then(|e| evaluate(e, known)),
        _ => None,
    }
}

/// A single-pass, block-local and (gated) cross-block dataflow fixpoint
/// computing the constant value of every SSA name assigned a literal-only
/// expression, plus phis whose sources all agree on the same constant.
fn compute_constants(function: &Function, config: &CompilerConfig) -> (HashMap<String, ConstValue>, HashMap<String, BlockId>, HashSet<String>) {
    let mut known: HashMap<String, ConstValue> = HashMap::new();
    let mut def_block: HashMap<String, BlockId> = HashMap::new();
    // Names eligible for *cross-block* substitution: declared `const` (a
    // phi has no declaration keyword of its own, so it qualifies only via
    // the compiler-generated-name path in `allowed()`) per spec.md §4.6(b)
    // "declared-const".
    let mut const_declared: HashSet<String> = HashSet::new();
    let mut changed = true;
    let mut iterations = 0;
    while changed && iterations < config.max_fixpoint_iterations {
        changed = false;
        iterations += 1;
        for block in &function.blocks {
            for inst in &block.instructions {
                match inst {
                    Instruction::Assign { target, value, declaration_kind } => {
                        if known.contains_key(target) {
                            continue;
                        }
                        if let Some(v) = evaluate(value, &known) {
                            known.insert(target.clone(), v);
                            def_block.insert(target.clone(), block.id);
                            if *declaration_kind == crate::ir::DeclarationKind::Const {
                                const_declared.insert(target.clone());
                            }
                            changed = true;
                        }
                    }
                    Instruction::Phi { target, sources } => {
                        if known.contains_key(target) || sources.is_empty() {
                            continue;
                        }
                        let mut agreed: Option<ConstValue> = None;
                        let mut all_known = true;
                        for (_, name) in sources {
                            match known.get(name) {
                                Some(v) => match &agreed {
                                    None => agreed = Some(v.clone()),
                                    Some(a) if const_eq(a, v) => {}
                                    Some(_) => {
                                        all_known = false;
                                        break;
                                    }
                                },
                                None => {
                                    all_known = false;
                                    break;
                                }
                            }
                        }
                        if all_known {
                            if let Some(v) = agreed {
                                known.insert(target.clone(), v);
                                def_block.insert(target.clone(), block.id);
                                changed = true;
                            }
                        }
                    }
                    Instruction::Expression { .. } => {}
                }
            }
        }
    }
    (known, def_block, const_declared)
}

struct SubstCtx<'a> {
    cfg: &'a CfgAnalysis,
    scopes: &'a ReactiveScopeAnalysis,
    config: &'a CompilerConfig,
    def_block: &'a HashMap<String, BlockId>,
    reassigned_bases: &'a HashSet<String>,
    const_declared: &'a HashSet<String>,
}

impl<'a> SubstCtx<'a> {
    fn allowed(&self, name: &str, use_block: BlockId) -> bool {
        let Some(&def) = self.def_block.get(name) else { return false };
        if def == use_block {
            return true;
        }
        if !self.config.cross_block_const_prop {
            return false;
        }
        // spec.md §4.6(b): cross-block substitution additionally requires a
        // `const` declaration or a compiler-generated name — a bare `let`
        // user binding doesn't qualify even if this particular assignment
        // happens to be single and foldable.
        if !self.const_declared.contains(name) && !ssa::is_reserved_prefix(&ssa::base_name(name)) {
            return false;
        }
        let base = ssa::base_name(name);
        if self.reassigned_bases.contains(&base) {
            return false;
        }
        if self.scopes.is_tracked(&base) {
            return false;
        }
        if !self.cfg.dominates(def, use_block) {
            return false;
        }
        // Reject if the use sits inside a loop the definition is outside of:
        // any loop header that dominates the use but not the definition
        // means control may re-enter the loop body after `def` last ran.
        for header in &self.cfg.loop_headers {
            if self.cfg.dominates(*header, use_block) && !self.cfg.dominates(*header, def) {
                return false;
            }
        }
        true
    }
}

fn substitute(expr: &mut Expression, use_block: BlockId, known: &HashMap<String, ConstValue>, ctx: &SubstCtx) {
    if let Expression::Identifier(name) = expr {
        if ctx.allowed(name, use_block) {
            if let Some(v) = known.get(name) {
                *expr = Expression::Literal(v.to_literal());
                return;
            }
        }
    }
    match expr {
        Expression::Identifier(_) | Expression::Literal(_) | Expression::This | Expression::Super | Expression::Class(_) => {}
        Expression::Call { callee, arguments, .. } => {
            substitute(callee, use_block, known, ctx);
            for a in arguments {
                substitute(a, use_block, known, ctx);
            }
        }
        Expression::Member { object, property, .. } => {
            substitute(object, use_block, known, ctx);
            if let crate::ir::MemberKey::Computed(e) = property {
                substitute(e, use_block, known, ctx);
            }
        }
        Expression::Binary { left, right, .. } | Expression::Logical { left, right, .. } => {
            substitute(left, use_block, known, ctx);
            substitute(right, use_block, known, ctx);
        }
        Expression::Unary { argument, .. } | Expression::SpreadElement(argument) | Expression::Await(argument) => {
            substitute(argument, use_block, known, ctx);
        }
        Expression::Conditional { test, consequent, alternate } => {
            substitute(test, use_block, known, ctx);
            substitute(consequent, use_block, known, ctx);
            substitute(alternate, use_block, known, ctx);
        }
        Expression::Array(elems) => {
            for e in elems {
                match e {
                    ArrayElement::Item(e) | ArrayElement::Spread(e) => substitute(e, use_block, known, ctx),
                    ArrayElement::Hole => {}
                }
            }
        }
        Expression::Object(props) => {
            for p in props {
                match p {
                    ObjectProperty::Field { value, .. } => substitute(value, use_block, known, ctx),
                    ObjectProperty::Spread(e) => substitute(e, use_block, known, ctx),
                }
            }
        }
        Expression::Jsx(jsx) => {
            for attr in &mut jsx.attributes {
                match &mut attr.value {
                    JsxAttributeValue::Expression(e) | JsxAttributeValue::Spread(e) => substitute(e, use_block, known, ctx),
                }
            }
            for child in &mut jsx.children {
                substitute_jsx_child(child, use_block, known, ctx);
            }
        }
        Expression::ArrowFunction { body, .. } => {
            if let ArrowBody::Expression(e) = body.as_mut() {
                substitute(e, use_block, known, ctx);
            }
        }
        Expression::FunctionExpression(_) => {}
        Expression::AssignmentExpression { target, value } => {
            substitute(target, use_block, known, ctx);
            substitute(value, use_block, known, ctx);
        }
        Expression::UpdateExpression { argument, .. } => substitute(argument, use_block, known, ctx),
        Expression::TemplateLiteral(parts) => {
            for part in parts {
                if let TemplatePart::Expression(e) = part {
                    substitute(e, use_block, known, ctx);
                }
            }
        }
        Expression::TaggedTemplate { tag, quasi } => {
            substitute(tag, use_block, known, ctx);
            for part in quasi {
                if let TemplatePart::Expression(e) = part {
                    substitute(e, use_block, known, ctx);
                }
            }
        }
        Expression::New { callee, arguments } => {
            substitute(callee, use_block, known, ctx);
            for a in arguments {
                substitute(a, use_block, known, ctx);
            }
        }
        Expression::Sequence(exprs) => {
            for e in exprs {
                substitute(e, use_block, known, ctx);
            }
        }
        Expression::Yield { argument, .. } => {
            if let Some(e) = argument {
                substitute(e, use_block, known, ctx);
            }
        }
    }
}

fn substitute_jsx_child(child: &mut JsxChild, use_block: BlockId, known: &HashMap<String, ConstValue>, ctx: &SubstCtx) {
    match child {
        JsxChild::Element(el) => {
            for attr in &mut el.attributes {
                match &mut attr.value {
                    JsxAttributeValue::Expression(e) | JsxAttributeValue::Spread(e) => substitute(e, use_block, known, ctx),
                }
            }
            for c in &mut el.children {
                substitute_jsx_child(c, use_block, known, ctx);
            }
        }
        JsxChild::Expression(e) => substitute(e, use_block, known, ctx),
        JsxChild::Text(_) => {}
    }
}

fn reassigned_bases(function: &Function) -> HashSet<String> {
    let mut counts: HashMap<String, u32> = HashMap::new();
    for block in &function.blocks {
        for inst in &block.instructions {
            if let Instruction::Assign { target, .. } = inst {
                *counts.entry(ssa::base_name(target)).or_insert(0) += 1;
            }
        }
    }
    counts.into_iter().filter(|(_, n)| *n > 1).map(|(k, _)| k).collect()
}

/// Runs constant folding/propagation over every block of `function`,
/// substituting evaluated literals for known-constant expressions and
/// identifier reads wherever the gating conditions allow it.
pub fn run(function: &mut Function, cfg: &CfgAnalysis, scopes: &ReactiveScopeAnalysis, config: &CompilerConfig) {
    let (known, def_block, const_declared) = compute_constants(function, config);
    if known.is_empty() {
        return;
    }
    let reassigned = reassigned_bases(function);
    let ctx = SubstCtx { cfg, scopes, config, def_block: &def_block, reassigned_bases: &reassigned, const_declared: &const_declared };

    for block in &mut function.blocks {
        for inst in &mut block.instructions {
            if let Some(value) = inst.value_mut() {
                substitute(value, block.id, &known, &ctx);
            }
        }
        substitute_terminator(&mut block.terminator, block.id, &known, &ctx);
    }
}

fn substitute_terminator(term: &mut crate::ir::Terminator, use_block: BlockId, known: &HashMap<String, ConstValue>, ctx: &SubstCtx) {
    use crate::ir::Terminator::*;
    match term {
        Return(Some(e)) | Throw(e) => substitute(e, use_block, known, ctx),
        Branch { test, .. } => substitute(test, use_block, known, ctx),
        Switch { discriminant, cases } => {
            substitute(discriminant, use_block, known, ctx);
            for (test, _) in cases {
                if let Some(e) = test {
                    substitute(e, use_block, known, ctx);
                }
            }
        }
        ForOf { iter, .. } => substitute(iter, use_block, known, ctx),
        ForIn { obj, .. } => substitute(obj, use_block, known, ctx),
        Return(None) | Jump(_) | Unreachable | Break { .. } | Continue { .. } | Try { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::*;

    fn analyze(function: &Function) -> (CfgAnalysis, ReactiveScopeAnalysis) {
        let cfg = crate::cfg::analyze(function).unwrap();
        let config = CompilerConfig::default();
        let scopes = crate::reactive_scope::analyze(function, &cfg, &config).unwrap();
        (cfg, scopes)
    }

    #[test]
    fn folds_arithmetic_within_a_block() {
        let b0 = BasicBlock {
            id: 0,
            instructions: vec![
                Instruction::Assign { target: "a".into(), value: Expression::Literal(Literal::Number(2.0)), declaration_kind: DeclarationKind::Const },
                Instruction::Assign {
                    target: "b".into(),
                    value: Expression::Binary { left: Box::new(Expression::Identifier("a".into())), operator: BinaryOp::Add, right: Box::new(Expression::Literal(Literal::Number(3.0))) },
                    declaration_kind: DeclarationKind::Const,
                },
            ],
            terminator: Terminator::Return(Some(Expression::Identifier("b".into()))),
        };
        let mut func = Function { name: "f".into(), params: vec![], raw_params: vec![], blocks: vec![b0], entry: 0, flags: FunctionFlags::default(), hook_return_info: None };
        let (cfg, scopes) = analyze(&func);
        let config = CompilerConfig::default();
        run(&mut func, &cfg, &scopes, &config);
        match &func.block(0).instructions[1] {
            Instruction::Assign { value: Expression::Literal(Literal::Number(n)), .. } => assert_eq!(*n, 5.0),
            other => panic!("expected folded literal, got {other:?}"),
        }
    }

    #[test]
    fn state_creator_result_is_never_folded_to_a_literal() {
        let b0 = BasicBlock {
            id: 0,
            instructions: vec![Instruction::Assign {
                target: "count".into(),
                value: Expression::Call { callee: Box::new(Expression::Identifier("$state".into())), arguments: vec![Expression::Literal(Literal::Number(0.0))], optional: false, pure: None },
                declaration_kind: DeclarationKind::Let,
            }],
            terminator: Terminator::Jump(1),
        };
        let b1 = BasicBlock { id: 1, instructions: vec![], terminator: Terminator::Return(Some(Expression::Identifier("count".into()))) };
        let mut func = Function { name: "f".into(), params: vec![], raw_params: vec![], blocks: vec![b0, b1], entry: 0, flags: FunctionFlags::default(), hook_return_info: None };
        let (cfg, scopes) = analyze(&func);
        let config = CompilerConfig::default();
        run(&mut func, &cfg, &scopes, &config);
        assert!(matches!(func.block(1).terminator, Terminator::Return(Some(Expression::Identifier(_)))));
    }
}

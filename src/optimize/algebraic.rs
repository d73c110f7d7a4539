//! Algebraic simplification (spec.md §4.6(c)): identity/absorbing-element
//! rewrites that hold regardless of the operands' runtime values, applied
//! bottom-up so a simplified sub-expression can enable a simplification of
//! its parent in the same pass.

use crate::ir::{ArrayElement, ArrowBody, BinaryOp, Expression, Function, JsxAttributeValue, JsxChild, Literal, LogicalOp, ObjectProperty, TemplatePart, UnaryOp};

fn is_number(expr: &Expression, n: f64) -> bool {
    matches!(expr, Expression::Literal(Literal::Number(v)) if *v == n)
}

fn is_bool(expr: &Expression, b: bool) -> bool {
    matches!(expr, Expression::Literal(Literal::Bool(v)) if *v == b)
}

fn literal_eq(a: &Literal, b: &Literal) -> bool {
    match (a, b) {
        (Literal::Number(x), Literal::Number(y)) => x == y,
        (Literal::String(x), Literal::String(y)) => x == y,
        (Literal::Bool(x), Literal::Bool(y)) => x == y,
        (Literal::Null, Literal::Null) | (Literal::Undefined, Literal::Undefined) => true,
        (Literal::BigInt(x), Literal::BigInt(y)) => x == y,
        _ => false,
    }
}

/// Structural equality over the textual (`Debug`) form of an expression —
/// the same normalization `optimize::cse::key_of` uses to recognize
/// syntactic duplicates, reused here for the `cond ? a : a` identity.
fn structurally_equal(a: &Expression, b: &Expression) -> bool {
    format!("{a:?}") == format!("{b:?}")
}

/// Rewrites `expr` in place, simplifying any sub-expression matched by a
/// fixed identity/absorbing-element rule. Never changes observable
/// evaluation order or drops a side-effecting operand.
pub fn simplify(expr: &mut Expression) {
    simplify_children(expr);

    match expr {
        Expression::Binary { left, operator, right } => {
            if let Some(replacement) = simplify_binary(left, *operator, right) {
                *expr = replacement;
            }
        }
        Expression::Logical { left, operator, right } => {
            if let Some(replacement) = simplify_logical(left, *operator, right) {
                *expr = replacement;
            }
        }
        Expression::Unary { operator, argument } => {
            if let Some(replacement) = simplify_unary(*operator, argument) {
                *expr = replacement;
            }
        }
        Expression::Conditional { test, consequent, alternate } => {
            if let Expression::Literal(lit) = test.as_ref() {
                let truthy = literal_truthy(lit);
                *expr = if truthy { std::mem::replace(consequent.as_mut(), Expression::This) } else { std::mem::replace(alternate.as_mut(), Expression::This) };
            } else if structurally_equal(consequent, alternate) {
                // `cond ? a : a` — both arms are the same value, so only the
                // test's own evaluation (and whatever side effect it has) is
                // observable; replace with a sequence that still runs it.
                *expr = Expression::Sequence(vec![std::mem::replace(test.as_mut(), Expression::This), std::mem::replace(consequent.as_mut(), Expression::This)]);
            }
        }
        _ => {}
    }
}

fn simplify_unary(op: UnaryOp, argument: &Expression) -> Option<Expression> {
    use UnaryOp::*;
    match (op, argument) {
        // `!!<literal>` collapses straight to the literal's boolean coercion.
        (Not, Expression::Unary { operator: Not, argument: inner }) => {
            if let Expression::Literal(lit) = inner.as_ref() {
                Some(Expression::Literal(Literal::Bool(literal_truthy(lit))))
            } else {
                None
            }
        }
        // `-(-x)` cancels regardless of what `x` is.
        (Neg, Expression::Unary { operator: Neg, argument: inner }) => Some((**inner).clone()),
        // `+<numeric literal>` is the literal itself — unary plus is a no-op
        // on a value that's already a number.
        (Pos, Expression::Literal(Literal::Number(n))) => Some(Expression::Literal(Literal::Number(*n))),
        _ => None,
    }
}

fn literal_truthy(lit: &Literal) -> bool {
    match lit {
        Literal::Number(n) => *n != 0.0 && !n.is_nan(),
        Literal::String(s) => !s.is_empty(),
        Literal::Bool(b) => *b,
        Literal::Null | Literal::Undefined => false,
        Literal::BigInt(s) => s != "0",
        Literal::Regex { .. } => true,
    }
}

fn simplify_binary(left: &Box<Expression>, op: BinaryOp, right: &Box<Expression>) -> Option<Expression> {
    match op {
        BinaryOp::Add if is_number(right, 0.0) => Some((**left).clone()),
        BinaryOp::Add if is_number(left, 0.0) => Some((**right).clone()),
        BinaryOp::Sub if is_number(right, 0.0) => Some((**left).clone()),
        BinaryOp::Mul if is_number(right, 1.0) => Some((**left).clone()),
        BinaryOp::Mul if is_number(left, 1.0) => Some((**right).clone()),
        BinaryOp::Div if is_number(right, 1.0) => Some((**left).clone()),
        BinaryOp::BitOr if is_number(right, 0.0) => Some((**left).clone()),
        BinaryOp::BitAnd if is_number(right, 0.0) => Some(Expression::Literal(Literal::Number(0.0))),
        // `x === x` / `x !== x` for two identical literals — not a general
        // identifier self-comparison (an identifier may read a reactive
        // value that changes between the two reads), just the literal case.
        BinaryOp::StrictEq => match (left.as_ref(), right.as_ref()) {
            (Expression::Literal(a), Expression::Literal(b)) => Some(Expression::Literal(Literal::Bool(literal_eq(a, b)))),
            _ => None,
        },
        BinaryOp::StrictNotEq => match (left.as_ref(), right.as_ref()) {
            (Expression::Literal(a), Expression::Literal(b)) => Some(Expression::Literal(Literal::Bool(!literal_eq(a, b)))),
            _ => None,
        },
        _ => None,
    }
}

fn simplify_logical(left: &Box<Expression>, op: LogicalOp, right: &Box<Expression>) -> Option<Expression> {
    match op {
        // `true && x` / `false || x` reduce to `x` when the left operand is
        // a literal with no side effect of its own to preserve.
        LogicalOp::And if is_bool(left, true) => Some((**right).clone()),
        LogicalOp::And if is_bool(left, false) => Some(Expression::Literal(Literal::Bool(false))),
        LogicalOp::Or if is_bool(left, false) => Some((**right).clone()),
        LogicalOp::Or if is_bool(left, true) => Some(Expression::Literal(Literal::Bool(true))),
        _ => None,
    }
}

fn simplify_children(expr: &mut Expression) {
    match expr {
        Expression::Identifier(_) | Expression::Literal(_) | Expression::This | Expression::Super | Expression::Class(_) => {}
        Expression::Call { callee, arguments, .. } | Expression::New { callee, arguments } => {
            simplify(callee);
            for a in arguments {
                simplify(a);
            }
        }
        Expression::Member { object, property, .. } => {
            simplify(object);
            if let crate::ir::MemberKey::Computed(e) = property {
                simplify(e);
            }
        }
        Expression::Binary { left, right, .. } | Expression::Logical { left, right, .. } => {
            simplify(left);
            simplify(right);
        }
        Expression::Unary { argument, .. } | Expression::SpreadElement(argument) | Expression::Await(argument) => simplify(argument),
        Expression::Conditional { test, consequent, alternate } => {
            simplify(test);
            simplify(consequent);
            simplify(alternate);
        }
        Expression::Array(elems) => {
            for e in elems {
                match e {
                    ArrayElement::Item(e) | ArrayElement::Spread(e) => simplify(e),
                    ArrayElement::Hole => {}
                }
            }
        }
        Expression::Object(props) => {
            for p in props {
                match p {
                    ObjectProperty::Field { value, .. } => simplify(value),
                    ObjectProperty::Spread(e) => simplify(e),
                }
            }
        }
        Expression::Jsx(jsx) => {
            for attr in &mut jsx.attributes {
                match &mut attr.value {
                    JsxAttributeValue::Expression(e) | JsxAttributeValue::Spread(e) => simplify(e),
                }
            }
            for child in &mut jsx.children {
                simplify_jsx_child(child);
            }
        }
        Expression::ArrowFunction { body, .. } => {
            if let ArrowBody::Expression(e) = body.as_mut() {
                simplify(e);
            }
        }
        Expression::FunctionExpression(_) => {}
        Expression::AssignmentExpression { target, value } => {
            simplify(target);
            simplify(value);
        }
        Expression::UpdateExpression { argument, .. } => simplify(argument),
        Expression::TemplateLiteral(parts) | Expression::TaggedTemplate { quasi: parts, .. } => {
            for part in parts {
                if let TemplatePart::Expression(e) = part {
                    simplify(e);
                }
            }
            if let Expression::TaggedTemplate { tag, .. } = expr {
                simplify(tag);
            }
        }
        Expression::Sequence(exprs) => {
            for e in exprs {
                simplify(e);
            }
        }
        Expression::Yield { argument, .. } => {
            if let Some(e) = argument {
                simplify(e);
            }
        }
    }
}

fn simplify_jsx_child(child: &mut JsxChild) {
    match child {
        JsxChild::Element(el) => {
            for attr in &mut el.attributes {
                match &mut attr.value {
                    JsxAttributeValue::Expression(e) | JsxAttributeValue::Spread(e) => simplify(e),
                }
            }
            for c in &mut el.children {
                simplify_jsx_child(c);
            }
        }
        JsxChild::Expression(e) => simplify(e),
        JsxChild::Text(_) => {}
    }
}

/// Runs algebraic simplification over every instruction and terminator test
/// in `function`.
pub fn run(function: &mut Function) {
    for block in &mut function.blocks {
        for inst in &mut block.instructions {
            if let Some(value) = inst.value_mut() {
                simplify(value);
            }
        }
        match &mut block.terminator {
            crate::ir::Terminator::Return(Some(e)) | crate::ir::Terminator::Throw(e) | crate::ir::Terminator::Branch { test: e, .. } => simplify(e),
            crate::ir::Terminator::Switch { discriminant, .. } => simplify(discriminant),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::*;

    #[test]
    fn adding_zero_is_removed() {
        let mut expr = Expression::Binary { left: Box::new(Expression::Identifier("x".into())), operator: BinaryOp::Add, right: Box::new(Expression::Literal(Literal::Number(0.0))) };
        simplify(&mut expr);
        assert!(matches!(expr, Expression::Identifier(ref n) if n == "x"));
    }

    #[test]
    fn literal_conditional_collapses_to_taken_branch() {
        let mut expr = Expression::Conditional {
            test: Box::new(Expression::Literal(Literal::Bool(true))),
            consequent: Box::new(Expression::Identifier("a".into())),
            alternate: Box::new(Expression::Identifier("b".into())),
        };
        simplify(&mut expr);
        assert!(matches!(expr, Expression::Identifier(ref n) if n == "a"));
    }

    #[test]
    fn false_and_short_circuits_to_false_literal() {
        let mut expr = Expression::Logical {
            left: Box::new(Expression::Literal(Literal::Bool(false))),
            operator: LogicalOp::And,
            right: Box::new(Expression::Call { callee: Box::new(Expression::Identifier("sideEffect".into())), arguments: vec![], optional: false, pure: None }),
        };
        simplify(&mut expr);
        assert!(matches!(expr, Expression::Literal(Literal::Bool(false))));
    }

    #[test]
    fn double_negation_of_a_literal_collapses_to_its_boolean_coercion() {
        let mut expr = Expression::Unary {
            operator: UnaryOp::Not,
            argument: Box::new(Expression::Unary { operator: UnaryOp::Not, argument: Box::new(Expression::Literal(Literal::Number(0.0))) }),
        };
        simplify(&mut expr);
        assert!(matches!(expr, Expression::Literal(Literal::Bool(false))));
    }

    #[test]
    fn double_unary_negation_cancels() {
        let mut expr = Expression::Unary { operator: UnaryOp::Neg, argument: Box::new(Expression::Unary { operator: UnaryOp::Neg, argument: Box::new(Expression::Identifier("x".into())) }) };
        simplify(&mut expr);
        assert!(matches!(expr, Expression::Identifier(ref n) if n == "x"));
    }

    #[test]
    fn unary_plus_on_a_numeric_literal_is_a_no_op() {
        let mut expr = Expression::Unary { operator: UnaryOp::Pos, argument: Box::new(Expression::Literal(Literal::Number(5.0))) };
        simplify(&mut expr);
        assert!(matches!(expr, Expression::Literal(Literal::Number(n)) if n == 5.0));
    }

    #[test]
    fn strict_eq_of_identical_literals_folds_to_true() {
        let mut expr = Expression::Binary { left: Box::new(Expression::Literal(Literal::String("a".into()))), operator: BinaryOp::StrictEq, right: Box::new(Expression::Literal(Literal::String("a".into()))) };
        simplify(&mut expr);
        assert!(matches!(expr, Expression::Literal(Literal::Bool(true))));
    }

    #[test]
    fn strict_not_eq_of_differing_literals_folds_to_true() {
        let mut expr = Expression::Binary { left: Box::new(Expression::Literal(Literal::Number(1.0))), operator: BinaryOp::StrictNotEq, right: Box::new(Expression::Literal(Literal::Number(2.0))) };
        simplify(&mut expr);
        assert!(matches!(expr, Expression::Literal(Literal::Bool(true))));
    }

    #[test]
    fn conditional_with_equal_branches_preserves_test_evaluation() {
        let mut expr = Expression::Conditional {
            test: Box::new(Expression::Call { callee: Box::new(Expression::Identifier("cond".into())), arguments: vec![], optional: false, pure: None }),
            consequent: Box::new(Expression::Identifier("a".into())),
            alternate: Box::new(Expression::Identifier("a".into())),
        };
        simplify(&mut expr);
        match expr {
            Expression::Sequence(parts) => {
                assert_eq!(parts.len(), 2);
                assert!(matches!(parts[0], Expression::Call { .. }));
                assert!(matches!(parts[1], Expression::Identifier(ref n) if n == "a"));
            }
            other => panic!("expected a sequence preserving the test's evaluation, got {other:?}"),
        }
    }
}

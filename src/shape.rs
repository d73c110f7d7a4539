//! Shape/escape analyzer (spec.md §4.3): tracks, per identifier, which
//! object keys are read/written statically, whether access ever goes
//! dynamic, and whether the value escapes the function — feeding the
//! region generator's whole-object-vs-property-level subscription choice.

use crate::ir::{ArrayElement, Expression, Function, Instruction, JsxChild, MemberKey, ObjectProperty, Terminator};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectShapeSource {
    Param,
    Local,
    Imported,
    Props,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct ObjectShape {
    pub known_keys: HashSet<String>,
    pub mutable_keys: HashSet<String>,
    pub dynamic_access: bool,
    pub escapes: bool,
    pub is_spread: bool,
    pub source: ObjectShapeSource,
}

impl ObjectShape {
    fn new(source: ObjectShapeSource) -> Self {
        ObjectShape { known_keys: HashSet::new(), mutable_keys: HashSet::new(), dynamic_access: false, escapes: false, is_spread: false, source }
    }

    /// Joins two observations of the same base name (e.g. reassignment
    /// across branches, or aliasing) — a lattice union, never narrowing.
    fn join(&mut self, other: &ObjectShape) {
        self.known_keys.extend(other.known_keys.iter().cloned());
        self.mutable_keys.extend(other.mutable_keys.iter().cloned());
        self.dynamic_access |= other.dynamic_access;
        self.escapes |= other.escapes;
        self.is_spread |= other.is_spread;
        if self.source == ObjectShapeSource::Unknown {
            self.source = other.source;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subscription {
    WholeObject,
    /// Property-level subscription over exactly these keys.
    Property(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct VariableShapeDecision {
    pub subscription: Subscription,
    /// Non-escaping spread with a nonempty read set: the region generator
    /// wraps the spread-sourced value rather than subscribing to it whole
    /// (spec.md §4.3 "spread-wrapping").
    pub spread_wrapping: bool,
}

#[derive(Debug, Default)]
pub struct ShapeAnalysis {
    pub shapes: HashMap<String, ObjectShape>,
    pub property_reads: HashMap<String, HashSet<String>>,
    pub decisions: HashMap<String, VariableShapeDecision>,
}

impl ShapeAnalysis {
    pub fn shape_for(&self, base: &str) -> Option<&ObjectShape> {
        self.shapes.get(base)
    }

    pub fn decision_for(&self, base: &str) -> Option<&VariableShapeDecision> {
        self.decisions.get(base)
    }
}

pub fn analyze(function: &Function) -> ShapeAnalysis {
    use crate::ir::ssa;

    let mut shapes: HashMap<String, ObjectShape> = HashMap::new();
    let mut property_reads: HashMap<String, HashSet<String>> = HashMap::new();

    for param in &function.params {
        let base = ssa::base_name(param);
        let source = if base == "props" { ObjectShapeSource::Props } else { ObjectShapeSource::Param };
        shapes.entry(base).or_insert_with(|| ObjectShape::new(source));
    }

    let mut sorted_blocks: Vec<_> = function.blocks.iter().collect();
    sorted_blocks.sort_by_key(|b| b.id);

    for block in &sorted_blocks {
        for inst in &block.instructions {
            match inst {
                Instruction::Assign { target, value, .. } => {
                    let base = ssa::base_name(target);
                    let mut shape = ObjectShape::new(ObjectShapeSource::Local);
                    collect_literal_shape(value, &mut shape);
                    let entry = shapes.entry(base).or_insert_with(|| ObjectShape::new(ObjectShapeSource::Unknown));
                    entry.join(&shape);
                    observe_reads(value, &mut shapes, &mut property_reads);
                    observe_escapes(value, &mut shapes);
                }
                Instruction::Expression { value } => {
                    observe_reads(value, &mut shapes, &mut property_reads);
                    observe_escapes(value, &mut shapes);
                    if let Expression::AssignmentExpression { target, value: rhs } = value {
                        observe_write_target(target, &mut shapes);
                        observe_reads(rhs, &mut shapes, &mut property_reads);
                        observe_escapes(rhs, &mut shapes);
                    }
                }
                Instruction::Phi { sources, .. } => {
                    for (_, name) in sources {
                        let base = ssa::base_name(name);
                        property_reads.entry(base).or_default();
                    }
                }
            }
        }
        observe_terminator(&block.terminator, &mut shapes, &mut property_reads);
    }

    let decisions = decide(&shapes, &property_reads);
    ShapeAnalysis { shapes, property_reads, decisions }
}

/// Populates `shape` with the statically-known keys of an object/array
/// literal (spec.md §4.3 "known keys"); anything else leaves it empty and
/// lets the read/write observers fill in whatever's actually touched.
fn collect_literal_shape(expr: &Expression, shape: &mut ObjectShape) {
    match expr {
        Expression::Object(props) => {
            for prop in props {
                match prop {
                    ObjectProperty::Field { key, computed, .. } => {
                        if !computed {
                            shape.known_keys.insert(key.clone());
                        } else {
                            shape.dynamic_access = true;
                        }
                    }
                    ObjectProperty::Spread(inner) => {
                        shape.is_spread = true;
                        // The spread source's own keys feed into this shape too,
                        // but we don't have its resolved shape yet at this point
                        // in the single forward pass; the spread flag alone
                        // drives the region generator's wrapping decision.
                        let _ = inner;
                    }
                }
            }
        }
        Expression::Array(elems) => {
            for (i, elem) in elems.iter().enumerate() {
                match elem {
                    ArrayElement::Item(_) => {
                        shape.known_keys.insert(i.to_string());
                    }
                    ArrayElement::Spread(_) => shape.is_spread = true,
                    ArrayElement::Hole => {}
                }
            }
        }
        _ => {}
    }
}

/// Walks `expr` recording member-property reads against their base
/// identifier's shape: a literal key adds to `known_keys`/`property_reads`,
/// a non-literal computed key sets `dynamic_access` (spec.md §4.3).
fn observe_reads(expr: &Expression, shapes: &mut HashMap<String, ObjectShape>, property_reads: &mut HashMap<String, HashSet<String>>) {
    use crate::ir::ssa;

    crate::ir::walk_expression(expr, &mut |node| {
        let Expression::Member { object, property, .. } = node else { return };
        let Some(base) = base_identifier(object) else { return };
        let base = ssa::base_name(&base);

        let literal_key = match property {
            MemberKey::Literal(name) => Some(name.clone()),
            MemberKey::Computed(inner) => match inner.as_ref() {
                Expression::Literal(crate::ir::Literal::String(s)) => Some(s.clone()),
                Expression::Literal(crate::ir::Literal::Number(n)) => Some(n.to_string()),
                _ => None,
            },
        };

        let shape = shapes.entry(base.clone()).or_insert_with(|| ObjectShape::new(ObjectShapeSource::Unknown));
        match literal_key {
            Some(key) => {
                shape.known_keys.insert(key.clone());
                property_reads.entry(base).or_default().insert(key);
            }
            None => shape.dynamic_access = true,
        }
    });
}

/// The base identifier of a (possibly nested) member chain, or `None` if
/// the chain bottoms out in something other than a bare identifier (a call
/// result, `this`, etc. — those have no tracked shape).
fn base_identifier(expr: &Expression) -> Option<String> {
    match expr {
        Expression::Identifier(name) => Some(name.clone()),
        Expression::Member { object, .. } => base_identifier(object),
        _ => None,
    }
}

fn observe_write_target(target: &Expression, shapes: &mut HashMap<String, ObjectShape>) {
    use crate::ir::ssa;
    if let Expression::Member { object, property, .. } = target {
        if let Some(base) = base_identifier(object) {
            let base = ssa::base_name(&base);
            let shape = shapes.entry(base).or_insert_with(|| ObjectShape::new(ObjectShapeSource::Unknown));
            match property {
                MemberKey::Literal(name) => {
                    shape.mutable_keys.insert(name.clone());
                }
                MemberKey::Computed(inner) => {
                    shape.dynamic_access = true;
                    match inner.as_ref() {
                        Expression::Literal(crate::ir::Literal::String(s)) => {
                            shape.mutable_keys.insert(s.clone());
                        }
                        Expression::Literal(crate::ir::Literal::Number(n)) => {
                            shape.mutable_keys.insert(n.to_string());
                        }
                        _ => {}
                    }
                }
            }
        }
    }
}

/// Marks the base identifier of any argument, `new` argument, or JSX
/// attribute/child expression as escaping (spec.md §4.3 "Arguments to calls
/// and JSX return escape"). Only a directly-passed identifier escapes as a
/// whole object — a property read of it does not, so only `Identifier`
/// arguments themselves are marked.
fn observe_escapes(expr: &Expression, shapes: &mut HashMap<String, ObjectShape>) {
    use crate::ir::ssa;

    match expr {
        Expression::Call { callee, arguments, .. } => {
            observe_escapes(callee, shapes);
            for arg in arguments {
                mark_escape_if_identifier(arg, shapes);
                observe_escapes(arg, shapes);
            }
        }
        Expression::New { callee, arguments } => {
            observe_escapes(callee, shapes);
            for arg in arguments {
                mark_escape_if_identifier(arg, shapes);
                observe_escapes(arg, shapes);
            }
        }
        Expression::Jsx(jsx) => observe_jsx_escapes(jsx, shapes),
        Expression::Binary { left, right, .. } | Expression::Logical { left, right, .. } => {
            observe_escapes(left, shapes);
            observe_escapes(right, shapes);
        }
        Expression::Unary { argument, .. } | Expression::SpreadElement(argument) | Expression::Await(argument) => {
            observe_escapes(argument, shapes);
        }
        Expression::Conditional { test, consequent, alternate } => {
            observe_escapes(test, shapes);
            observe_escapes(consequent, shapes);
            observe_escapes(alternate, shapes);
        }
        Expression::Array(elems) => {
            for e in elems {
                if let ArrayElement::Item(e) | ArrayElement::Spread(e) = e {
                    observe_escapes(e, shapes);
                }
            }
        }
        Expression::Object(props) => {
            for p in props {
                match p {
                    ObjectProperty::Field { value, .. } => observe_escapes(value, shapes),
                    ObjectProperty::Spread(e) => observe_escapes(e, shapes),
                }
            }
        }
        Expression::Member { object, .. } => observe_escapes(object, shapes),
        Expression::Sequence(exprs) => exprs.iter().for_each(|e| observe_escapes(e, shapes)),
        Expression::TemplateLiteral(parts) | Expression::TaggedTemplate { quasi: parts, .. } => {
            for part in parts {
                if let crate::ir::TemplatePart::Expression(e) = part {
                    observe_escapes(e, shapes);
                }
            }
        }
        _ => {}
    }

    fn mark_escape_if_identifier(expr: &Expression, shapes: &mut HashMap<String, ObjectShape>) {
        if let Expression::Identifier(name) = expr {
            let base = ssa::base_name(name);
            shapes.entry(base).or_insert_with(|| ObjectShape::new(ObjectShapeSource::Unknown)).escapes = true;
        }
    }
}

fn observe_jsx_escapes(jsx: &crate::ir::JsxElement, shapes: &mut HashMap<String, ObjectShape>) {
    use crate::ir::ssa;
    for attr in &jsx.attributes {
        match &attr.value {
            crate::ir::JsxAttributeValue::Expression(e) => {
                if let Expression::Identifier(name) = e {
                    let base = ssa::base_name(name);
                    shapes.entry(base).or_insert_with(|| ObjectShape::new(ObjectShapeSource::Unknown)).escapes = true;
                }
                observe_escapes(e, shapes);
            }
            crate::ir::JsxAttributeValue::Spread(e) => {
                if let Expression::Identifier(name) = e {
                    let base = ssa::base_name(name);
                    let shape = shapes.entry(base).or_insert_with(|| ObjectShape::new(ObjectShapeSource::Unknown));
                    shape.escapes = true;
                    shape.is_spread = true;
                }
                observe_escapes(e, shapes);
            }
        }
    }
    for child in &jsx.children {
        observe_jsx_child_escapes(child, shapes);
    }
}

fn observe_jsx_child_escapes(child: &JsxChild, shapes: &mut HashMap<String, ObjectShape>) {
    use crate::ir::ssa;
    match child {
        JsxChild::Element(el) => observe_jsx_escapes(el, shapes),
        JsxChild::Expression(e) => {
            if let Expression::Identifier(name) = e.as_ref() {
                let base = ssa::base_name(name);
                shapes.entry(base).or_insert_with(|| ObjectShape::new(ObjectShapeSource::Unknown)).escapes = true;
            }
            observe_escapes(e, shapes);
        }
        JsxChild::Text(_) => {}
    }
}

fn observe_terminator(term: &Terminator, shapes: &mut HashMap<String, ObjectShape>, property_reads: &mut HashMap<String, HashSet<String>>) {
    match term {
        Terminator::Return(Some(expr)) | Terminator::Throw(expr) => {
            observe_reads(expr, shapes, property_reads);
            observe_escapes(expr, shapes);
        }
        Terminator::Return(None) => {}
        Terminator::Branch { test, .. } => observe_reads(test, shapes, property_reads),
        Terminator::Switch { discriminant, cases, .. } => {
            observe_reads(discriminant, shapes, property_reads);
            for (case, _) in cases {
                if let Some(e) = case {
                    observe_reads(e, shapes, property_reads);
                }
            }
        }
        Terminator::ForOf { iter, .. } => observe_reads(iter, shapes, property_reads),
        Terminator::ForIn { obj, .. } => observe_reads(obj, shapes, property_reads),
        _ => {}
    }
}

/// Per-variable whole-object-vs-property-level subscription decision
/// (spec.md §4.3): dynamic access or unknown source forces whole-object;
/// otherwise property reads alone get a property-level subscription;
/// non-escaping spreads with a read-set are flagged for wrapping.
fn decide(shapes: &HashMap<String, ObjectShape>, property_reads: &HashMap<String, HashSet<String>>) -> HashMap<String, VariableShapeDecision> {
    let mut decisions = HashMap::new();
    for (base, shape) in shapes {
        let reads = property_reads.get(base).cloned().unwrap_or_default();
        let whole_object = shape.dynamic_access || shape.source == ObjectShapeSource::Unknown || (shape.escapes && !shape.mutable_keys.is_empty());
        let subscription = if whole_object || reads.is_empty() {
            Subscription::WholeObject
        } else {
            let mut keys: Vec<String> = reads.into_iter().collect();
            keys.sort();
            Subscription::Property(keys)
        };
        let spread_wrapping = shape.is_spread && !shape.escapes && !property_reads.get(base).map(|r| r.is_empty()).unwrap_or(true);
        decisions.insert(base.clone(), VariableShapeDecision { subscription, spread_wrapping });
    }
    decisions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::*;

    fn single_block_function(instructions: Vec<Instruction>, terminator: Terminator, params: Vec<&str>) -> Function {
        Function {
            name: "f".into(),
            params: params.into_iter().map(String::from).collect(),
            raw_params: vec![],
            blocks: vec![BasicBlock { id: 0, instructions, terminator }],
            entry: 0,
            flags: FunctionFlags::default(),
            hook_return_info: None,
        }
    }

    #[test]
    fn literal_property_read_is_tracked_and_gets_property_subscription() {
        let func = single_block_function(
            vec![Instruction::Assign {
                target: "n".into(),
                value: Expression::Member {
                    object: Box::new(Expression::Identifier("user".into())),
                    property: MemberKey::Literal("name".into()),
                    optional: false,
                },
                declaration_kind: DeclarationKind::Const,
            }],
            Terminator::Return(Some(Expression::Identifier("n".into()))),
            vec!["user"],
        );
        let analysis = analyze(&func);
        let shape = analysis.shape_for("user").unwrap();
        assert!(shape.known_keys.contains("name"));
        assert!(!shape.dynamic_access);
        match &analysis.decision_for("user").unwrap().subscription {
            Subscription::Property(keys) => assert_eq!(keys, &vec!["name".to_string()]),
            Subscription::WholeObject => panic!("expected property-level subscription"),
        }
    }

    #[test]
    fn non_literal_computed_access_forces_whole_object_subscription() {
        let func = single_block_function(
            vec![Instruction::Assign {
                target: "v".into(),
                value: Expression::Member {
                    object: Box::new(Expression::Identifier("map".into())),
                    property: MemberKey::Computed(Box::new(Expression::Identifier("key".into()))),
                    optional: false,
                },
                declaration_kind: DeclarationKind::Const,
            }],
            Terminator::Return(Some(Expression::Identifier("v".into()))),
            vec!["map", "key"],
        );
        let analysis = analyze(&func);
        assert!(analysis.shape_for("map").unwrap().dynamic_access);
        assert_eq!(analysis.decision_for("map").unwrap().subscription, Subscription::WholeObject);
    }

    #[test]
    fn identifier_passed_as_call_argument_escapes() {
        let func = single_block_function(
            vec![Instruction::Expression {
                value: Expression::Call {
                    callee: Box::new(Expression::Identifier("log".into())),
                    arguments: vec![Expression::Identifier("payload".into())],
                    optional: false,
                    pure: None,
                },
            }],
            Terminator::Return(None),
            vec!["payload"],
        );
        let analysis = analyze(&func);
        assert!(analysis.shape_for("payload").unwrap().escapes);
    }
}

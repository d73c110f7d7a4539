//! JSX lowering (spec.md §4.7 item 7): components lower to `createElement`
//! calls; intrinsic elements lower to a static HTML template string plus a
//! list of runtime binding calls, addressed by a path of child indices from
//! the template root and reached via `firstChild`/`nextSibling` walks.
//!
//! Node addressing here recomputes the `firstChild`/`nextSibling` chain at
//! every binding site rather than caching an intermediate identifier per
//! path (spec.md §4.7 item 7's "caches intermediate element identifiers per
//! path") — functionally equivalent, just not output-minimal; a later pass
//! could hoist repeated prefixes into `let` bindings if codegen size ever
//! matters enough to revisit this.

use super::Lowerer;
use crate::ir::{ArrowBody, BasicBlock, BlockId, DeclarationKind, Expression, Instruction, JsxAttribute, JsxAttributeValue, JsxChild, JsxElement, Literal, Terminator};

const PROPERTY_ATTRIBUTES: &[&str] = &["value", "checked", "selected", "disabled", "readOnly", "multiple", "muted"];

#[derive(Debug, Clone)]
enum BindingKind {
    Text,
    Attribute(String),
    Property(String),
    Class,
    Style,
    Event { name: String, capture: bool, passive: bool, once: bool },
    Ref,
    Insert,
    /// `cond ? <A/> : <B/>` (or `cond && <A/>`, alternate `None`): lowers to
    /// `conditional(testFn, consFn, createElement, altFn?)` instead of the
    /// generic `insert` form (spec.md §4.7 item 7 bullet 3).
    Conditional { test: Expression, consequent: Box<Expression>, alternate: Option<Box<Expression>> },
    /// `list.map(item => <Row item={item}/>)`: lowers to `keyedList(arrayFn,
    /// callback)`, with the callback's parameter rewritten to its
    /// zero-argument accessor form wherever it's read inside the callback
    /// body (spec.md §4.7 item 7 bullet 3).
    KeyedList { array: Expression, param: String, callback_body: Box<Expression> },
}

struct Binding {
    path: Vec<usize>,
    kind: BindingKind,
    value: Expression,
}

struct TemplateBuilder {
    html: String,
    bindings: Vec<Binding>,
}

pub(super) fn lower(lowerer: &mut Lowerer<'_>, jsx: JsxElement) -> Expression {
    if jsx.is_component {
        lower_component(lowerer, jsx)
    } else {
        lower_intrinsic(lowerer, jsx)
    }
}

fn lower_component(lowerer: &mut Lowerer<'_>, jsx: JsxElement) -> Expression {
    lowerer.helpers_used.insert("createElement".to_string());

    let mut props_fields = Vec::new();
    for attr in &jsx.attributes {
        match &attr.value {
            JsxAttributeValue::Spread(e) => props_fields.push(crate::ir::ObjectProperty::Spread(lowerer.rewrite_reads(e.clone()))),
            JsxAttributeValue::Expression(e) => {
                props_fields.push(crate::ir::ObjectProperty::Field { key: attr.name.clone(), computed: false, value: lowerer.rewrite_reads(e.clone()) })
            }
        }
    }
    let props = if props_fields.is_empty() { Expression::Literal(Literal::Null) } else { Expression::Object(props_fields) };

    let mut args = vec![Expression::Identifier(jsx.tag.clone()), props];
    for child in jsx.children {
        args.push(lower_child_expression(lowerer, child));
    }
    lowerer.make_call("createElement", args)
}

fn lower_child_expression(lowerer: &mut Lowerer<'_>, child: JsxChild) -> Expression {
    match child {
        JsxChild::Text(s) => Expression::Literal(Literal::String(s)),
        JsxChild::Expression(e) => lowerer.rewrite_reads(*e),
        JsxChild::Element(el) => lower(lowerer, *el),
    }
}

fn lower_intrinsic(lowerer: &mut Lowerer<'_>, jsx: JsxElement) -> Expression {
    let mut tb = TemplateBuilder { html: String::new(), bindings: Vec::new() };
    build_intrinsic(&mut tb, lowerer, &jsx, &[]);

    lowerer.helpers_used.insert("template".to_string());
    let slot = lowerer.next_slot;
    lowerer.next_slot += 1;
    let root_name = format!("__tmpl{slot}");

    let mut instructions = vec![Instruction::Assign {
        target: root_name.clone(),
        value: Expression::Call { callee: Box::new(Expression::Identifier("template".to_string())), arguments: vec![Expression::Literal(Literal::String(tb.html))], optional: false, pure: None },
        declaration_kind: DeclarationKind::Const,
    }];

    for binding in tb.bindings {
        instructions.extend(lower_binding(lowerer, &root_name, binding));
    }

    let block = BasicBlock { id: 0, instructions, terminator: Terminator::Return(Some(Expression::Identifier(root_name))) };
    let iife = Expression::ArrowFunction { params: vec![], body: Box::new(ArrowBody::Block(vec![block], 0)), is_expression: false, is_async: false };
    Expression::Call { callee: Box::new(iife), arguments: vec![], optional: false, pure: None }
}

fn build_intrinsic(tb: &mut TemplateBuilder, lowerer: &mut Lowerer<'_>, el: &JsxElement, own_path: &[usize]) {
    tb.html.push('<');
    tb.html.push_str(&html_tag_name(&el.tag));
    for attr in &el.attributes {
        append_attribute(tb, lowerer, attr, own_path);
    }
    tb.html.push('>');

    for (i, child) in el.children.iter().enumerate() {
        let mut child_path = own_path.to_vec();
        child_path.push(i);
        match child {
            JsxChild::Text(s) => tb.html.push_str(&escape_html_text(s)),
            JsxChild::Element(nested) if !nested.is_component => build_intrinsic(tb, lowerer, nested, &child_path),
            JsxChild::Element(nested) => {
                tb.html.push_str("<!---->");
                let value = lower_component(lowerer, (**nested).clone());
                tb.bindings.push(Binding { path: child_path, kind: BindingKind::Insert, value });
            }
            JsxChild::Expression(e) => {
                tb.html.push_str("<!---->");
                push_dynamic_child_binding(tb, lowerer, (**e).clone(), child_path);
            }
        }
    }

    tb.html.push_str("</");
    tb.html.push_str(&html_tag_name(&el.tag));
    tb.html.push('>');
}

fn append_attribute(tb: &mut TemplateBuilder, lowerer: &mut Lowerer<'_>, attr: &JsxAttribute, own_path: &[usize]) {
    if attr.name == "key" {
        return;
    }
    let e = match &attr.value {
        JsxAttributeValue::Spread(_) => return, // spread props are a component-only concern
        JsxAttributeValue::Expression(e) => e,
    };

    if let Expression::Literal(lit) = e {
        if let Some(html_value) = literal_to_html(lit) {
            tb.html.push(' ');
            tb.html.push_str(&html_attr_name(&attr.name));
            tb.html.push_str("=\"");
            tb.html.push_str(&html_value);
            tb.html.push('"');
            return;
        }
    }

    let value = lowerer.rewrite_reads(e.clone());
    let kind = classify_attribute(&attr.name);
    tb.bindings.push(Binding { path: own_path.to_vec(), kind, value });
}

/// Pattern-matches a dynamic JSX child expression against the two special
/// forms the runtime has dedicated helpers for — ternary/`&&` conditionals
/// and `.map()` lists — then a scalar-text fast path, before falling back to
/// the generic `insert` binding for anything whose result shape isn't known
/// (a call could itself return an element, an array, or `null`).
fn push_dynamic_child_binding(tb: &mut TemplateBuilder, lowerer: &mut Lowerer<'_>, expr: Expression, path: Vec<usize>) {
    if let Some(kind) = classify_conditional_child(lowerer, &expr) {
        tb.bindings.push(Binding { path, kind, value: Expression::Literal(Literal::Null) });
        return;
    }
    if let Some(kind) = classify_keyed_list_child(lowerer, &expr) {
        tb.bindings.push(Binding { path, kind, value: Expression::Literal(Literal::Null) });
        return;
    }
    let is_text = is_scalar_text_expression(&expr);
    let value = lowerer.rewrite_reads(expr);
    let kind = if is_text { BindingKind::Text } else { BindingKind::Insert };
    tb.bindings.push(Binding { path, kind, value });
}

/// A child expression whose grammatical shape can only ever produce a
/// string/number/boolean/null/undefined — never an element, array, or
/// function — is bound with the narrower `bindText` helper instead of the
/// generic `insert`, which has to handle all of those at runtime.
fn is_scalar_text_expression(expr: &Expression) -> bool {
    matches!(
        expr,
        Expression::Identifier(_)
            | Expression::Literal(_)
            | Expression::Member { .. }
            | Expression::Binary { .. }
            | Expression::Unary { .. }
            | Expression::Logical { .. }
            | Expression::TemplateLiteral(_)
    )
}

fn classify_conditional_child(lowerer: &mut Lowerer<'_>, expr: &Expression) -> Option<BindingKind> {
    match expr {
        Expression::Conditional { test, consequent, alternate } => {
            let test = lowerer.rewrite_reads((**test).clone());
            let consequent = Box::new(lowerer.rewrite_reads((**consequent).clone()));
            let alternate = Some(Box::new(lowerer.rewrite_reads((**alternate).clone())));
            Some(BindingKind::Conditional { test, consequent, alternate })
        }
        Expression::Logical { left, operator: crate::ir::LogicalOp::And, right } => {
            let test = lowerer.rewrite_reads((**left).clone());
            let consequent = Box::new(lowerer.rewrite_reads((**right).clone()));
            Some(BindingKind::Conditional { test, consequent, alternate: None })
        }
        _ => None,
    }
}

/// Recognizes `<expr>.map(<param> => <body>)` (arrow callback, expression
/// body) as a keyed-list child. Block-bodied or multi-param callbacks fall
/// back to the generic `insert` binding — the runtime's `keyedList` helper
/// only needs the single-item accessor form this handles.
fn classify_keyed_list_child(lowerer: &mut Lowerer<'_>, expr: &Expression) -> Option<BindingKind> {
    let Expression::Call { callee, arguments, .. } = expr else { return None };
    let Expression::Member { object, property: crate::ir::MemberKey::Literal(method), .. } = callee.as_ref() else { return None };
    if method != "map" || arguments.len() != 1 {
        return None;
    }
    let Expression::ArrowFunction { params, body, is_expression: true, .. } = &arguments[0] else { return None };
    if params.len() != 1 {
        return None;
    }
    let crate::ir::ArrowBody::Expression(body_expr) = body.as_ref() else { return None };

    let array = lowerer.rewrite_reads((**object).clone());
    let param = params[0].clone();
    lowerer.shadow.push(std::iter::once(param.clone()).collect());
    let callback_body = Box::new(lowerer.rewrite_reads(body_expr.clone()));
    lowerer.shadow.pop();

    Some(BindingKind::KeyedList { array, param, callback_body })
}

fn classify_attribute(name: &str) -> BindingKind {
    if name == "ref" {
        return BindingKind::Ref;
    }
    if name == "class" || name == "className" {
        return BindingKind::Class;
    }
    if name == "style" {
        return BindingKind::Style;
    }
    if let Some(rest) = name.strip_prefix("on") {
        if !rest.is_empty() && rest.chars().next().unwrap().is_uppercase() {
            let (event, capture, passive, once) = split_event_modifiers(rest);
            return BindingKind::Event { name: event.to_lowercase(), capture, passive, once };
        }
    }
    if PROPERTY_ATTRIBUTES.contains(&name) {
        return BindingKind::Property(html_attr_name(name));
    }
    BindingKind::Attribute(html_attr_name(name))
}

fn split_event_modifiers(rest: &str) -> (&str, bool, bool, bool) {
    for suffix in ["Capture", "Passive", "Once"] {
        if let Some(stripped) = rest.strip_suffix(suffix) {
            let (event, capture, passive, once) = split_event_modifiers(stripped);
            return (
                event,
                capture || suffix == "Capture",
                passive || suffix == "Passive",
                once || suffix == "Once",
            );
        }
    }
    (rest, false, false, false)
}

fn html_attr_name(name: &str) -> String {
    match name {
        "htmlFor" => "for".to_string(),
        "className" => "class".to_string(),
        other => other.to_string(),
    }
}

fn html_tag_name(tag: &str) -> String {
    tag.to_string()
}

fn literal_to_html(lit: &Literal) -> Option<String> {
    match lit {
        Literal::String(s) => Some(escape_html_text(s)),
        Literal::Number(n) => Some(n.to_string()),
        Literal::Bool(b) => Some(b.to_string()),
        Literal::Null | Literal::Undefined => None,
        Literal::BigInt(_) | Literal::Regex { .. } => None,
    }
}

fn escape_html_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn node_for_path(root: &str, path: &[usize]) -> Expression {
    let mut expr = Expression::Identifier(root.to_string());
    for &idx in path {
        expr = Expression::Member { object: Box::new(expr), property: crate::ir::MemberKey::Literal("firstChild".to_string()), optional: false };
        for _ in 0..idx {
            expr = Expression::Member { object: Box::new(expr), property: crate::ir::MemberKey::Literal("nextSibling".to_string()), optional: false };
        }
    }
    expr
}

fn getter_arrow(value: Expression) -> Expression {
    Expression::ArrowFunction { params: vec![], body: Box::new(ArrowBody::Expression(value)), is_expression: true, is_async: false }
}

fn lower_binding(lowerer: &mut Lowerer<'_>, root: &str, binding: Binding) -> Vec<Instruction> {
    let node = node_for_path(root, &binding.path);
    match binding.kind {
        BindingKind::Text => {
            lowerer.helpers_used.insert("bindText".to_string());
            vec![Instruction::Expression { value: lowerer.make_call("bindText", vec![node, getter_arrow(binding.value)]) }]
        }
        BindingKind::Attribute(name) => {
            lowerer.helpers_used.insert("bindAttribute".to_string());
            vec![Instruction::Expression { value: lowerer.make_call("bindAttribute", vec![node, Expression::Literal(Literal::String(name)), getter_arrow(binding.value)]) }]
        }
        BindingKind::Property(name) => {
            lowerer.helpers_used.insert("bindProperty".to_string());
            vec![Instruction::Expression { value: lowerer.make_call("bindProperty", vec![node, Expression::Literal(Literal::String(name)), getter_arrow(binding.value)]) }]
        }
        BindingKind::Class => {
            lowerer.helpers_used.insert("bindClass".to_string());
            vec![Instruction::Expression { value: lowerer.make_call("bindClass", vec![node, getter_arrow(binding.value)]) }]
        }
        BindingKind::Style => {
            lowerer.helpers_used.insert("bindStyle".to_string());
            vec![Instruction::Expression { value: lowerer.make_call("bindStyle", vec![node, getter_arrow(binding.value)]) }]
        }
        BindingKind::Ref => {
            lowerer.helpers_used.insert("bindRef".to_string());
            vec![Instruction::Expression { value: lowerer.make_call("bindRef", vec![node, binding.value]) }]
        }
        BindingKind::Event { name, capture, passive, once } => {
            lowerer.helpers_used.insert("bindEvent".to_string());
            lowerer.helpers_used.insert("onDestroy".to_string());
            let options = Expression::Object(vec![
                crate::ir::ObjectProperty::Field { key: "capture".to_string(), computed: false, value: Expression::Literal(Literal::Bool(capture)) },
                crate::ir::ObjectProperty::Field { key: "passive".to_string(), computed: false, value: Expression::Literal(Literal::Bool(passive)) },
                crate::ir::ObjectProperty::Field { key: "once".to_string(), computed: false, value: Expression::Literal(Literal::Bool(once)) },
            ]);
            let cleanup_name = format!("__cleanup{}", lowerer.next_slot);
            lowerer.next_slot += 1;
            vec![
                Instruction::Assign {
                    target: cleanup_name.clone(),
                    value: lowerer.make_call("bindEvent", vec![node, Expression::Literal(Literal::String(name)), binding.value, options]),
                    declaration_kind: DeclarationKind::Const,
                },
                Instruction::Expression { value: lowerer.make_call("onDestroy", vec![Expression::Identifier(cleanup_name)]) },
            ]
        }
        BindingKind::Insert => {
            lowerer.helpers_used.insert("insert".to_string());
            let parent = insert_parent(root, &binding.path);
            vec![Instruction::Expression { value: lowerer.make_call("insert", vec![parent, getter_arrow(binding.value), node]) }]
        }
        BindingKind::Conditional { test, consequent, alternate } => {
            lowerer.helpers_used.insert("conditional".to_string());
            lowerer.helpers_used.insert("createElement".to_string());
            let parent = insert_parent(root, &binding.path);
            let mut args = vec![parent, node, getter_arrow(test), getter_arrow(*consequent), Expression::Identifier("createElement".to_string())];
            if let Some(alt) = alternate {
                args.push(getter_arrow(*alt));
            }
            vec![Instruction::Expression { value: lowerer.make_call("conditional", args) }]
        }
        BindingKind::KeyedList { array, param, callback_body } => {
            lowerer.helpers_used.insert("keyedList".to_string());
            let parent = insert_parent(root, &binding.path);
            let callback = Expression::ArrowFunction {
                params: vec![param],
                body: Box::new(crate::ir::ArrowBody::Expression(*callback_body)),
                is_expression: true,
                is_async: false,
            };
            vec![Instruction::Expression { value: lowerer.make_call("keyedList", vec![parent, node, getter_arrow(array), callback]) }]
        }
    }
}

fn insert_parent(root: &str, path: &[usize]) -> Expression {
    if path.len() <= 1 {
        Expression::Identifier(root.to_string())
    } else {
        node_for_path(root, &path[..path.len() - 1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use crate::directives::DirectiveState;
    use crate::ir::{self as ir, BasicBlock, Function, FunctionFlags, Terminator};

    fn jsx_function(jsx: JsxElement) -> Function {
        let b0 = BasicBlock { id: 0, instructions: vec![], terminator: Terminator::Return(Some(Expression::Jsx(Box::new(jsx)))) };
        Function { name: "View".into(), params: vec!["show".into(), "items".into()], raw_params: vec![], blocks: vec![b0], entry: 0, flags: FunctionFlags::default(), hook_return_info: None }
    }

    fn lower(func: &Function) -> super::super::LowerOutput {
        let cfg = crate::cfg::analyze(func).unwrap();
        let config = CompilerConfig::default();
        let scopes = crate::reactive_scope::analyze(func, &cfg, &config).unwrap();
        let shapes = crate::shape::analyze(func);
        let regions = crate::region::generate(func, &scopes, &shapes);
        super::super::lower_function(func, &scopes, &shapes, &regions, DirectiveState::default(), &config).unwrap()
    }

    #[test]
    fn ternary_child_lowers_to_conditional_helper() {
        let el = JsxElement {
            tag: "div".into(),
            is_component: false,
            attributes: vec![],
            children: vec![JsxChild::Expression(Box::new(Expression::Conditional {
                test: Box::new(Expression::Identifier("show".into())),
                consequent: Box::new(Expression::Literal(Literal::String("yes".into()))),
                alternate: Box::new(Expression::Literal(Literal::String("no".into()))),
            }))],
        };
        let func = jsx_function(el);
        let out = lower(&func);
        assert!(out.helpers_used.contains("conditional"));
        assert!(!out.helpers_used.contains("insert"));
    }

    #[test]
    fn plain_identifier_child_lowers_to_text_binding_helper() {
        let el = JsxElement {
            tag: "div".into(),
            is_component: false,
            attributes: vec![],
            children: vec![JsxChild::Expression(Box::new(Expression::Identifier("show".into())))],
        };
        let func = jsx_function(el);
        let out = lower(&func);
        assert!(out.helpers_used.contains("bindText"));
        assert!(!out.helpers_used.contains("insert"));
    }

    #[test]
    fn map_call_child_lowers_to_keyed_list_helper() {
        let el = JsxElement {
            tag: "ul".into(),
            is_component: false,
            attributes: vec![],
            children: vec![JsxChild::Expression(Box::new(Expression::Call {
                callee: Box::new(Expression::Member {
                    object: Box::new(Expression::Identifier("items".into())),
                    property: ir::MemberKey::Literal("map".into()),
                    optional: false,
                }),
                arguments: vec![Expression::ArrowFunction {
                    params: vec!["item".into()],
                    body: Box::new(ArrowBody::Expression(Expression::Identifier("item".into()))),
                    is_expression: true,
                    is_async: false,
                }],
                optional: false,
                pure: None,
            }))],
        };
        let func = jsx_function(el);
        let out = lower(&func);
        assert!(out.helpers_used.contains("keyedList"));
        assert!(!out.helpers_used.contains("insert"));
    }
}

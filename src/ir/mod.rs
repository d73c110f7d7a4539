//! IR data model (spec.md §3): programs, functions, basic blocks,
//! instructions, expressions, terminators, and SSA naming utilities.
//!
//! Block ids are small integers (arena + index, spec.md §9 "Design Notes")
//! so CFG/dominator/region maps can be dense `Vec`-indexed structures rather
//! than hash maps keyed by an opaque handle.

pub mod ssa;

use std::collections::HashMap;

pub type BlockId = u32;

#[derive(Debug, Clone)]
pub struct Program {
    pub items: Vec<TopLevelItem>,
    pub lifted_functions: Vec<Function>,
}

#[derive(Debug, Clone)]
pub enum TopLevelItem {
    Import { path: Vec<String>, names: Vec<String> },
    Export(Box<TopLevelItem>),
    Function(Function),
    /// Anything the builder didn't need to model structurally (re-emitted
    /// verbatim by the lowerer).
    Opaque(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookValueKind {
    Signal,
    Memo,
}

#[derive(Debug, Clone)]
pub struct HookReturnBinding {
    pub index_or_name: HookReturnKey,
    pub kind: HookValueKind,
}

#[derive(Debug, Clone)]
pub enum HookReturnKey {
    Index(usize),
    Name(String),
}

#[derive(Debug, Clone, Default)]
pub struct HookReturnInfo {
    pub bindings: Vec<HookReturnBinding>,
}

#[derive(Debug, Clone, Default)]
pub struct FunctionFlags {
    pub is_arrow: bool,
    pub has_expression_body: bool,
    pub is_async: bool,
    pub pure: bool,
    pub no_memo: bool,
    /// Raw directive strings found in the function's leading statements
    /// (spec.md §4.8), e.g. `"use no memo"`, `"use fict-compiler-disable"`.
    pub directives: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    /// Semantic parameter identifiers (post-destructuring, one per bound
    /// name) plus the raw pattern for destructuring parameters.
    pub params: Vec<String>,
    pub raw_params: Vec<crate::ast::Pattern>,
    pub blocks: Vec<BasicBlock>,
    pub entry: BlockId,
    pub flags: FunctionFlags,
    pub hook_return_info: Option<HookReturnInfo>,
}

impl Function {
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        self.blocks.iter().find(|b| b.id == id).expect("block id must exist")
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        self.blocks.iter_mut().find(|b| b.id == id).expect("block id must exist")
    }

    pub fn block_index(&self, id: BlockId) -> usize {
        self.blocks.iter().position(|b| b.id == id).expect("block id must exist")
    }

    /// Precondition validator required by spec.md §4.1 before CFG/SSA runs:
    /// every terminator target must reference an existing block, and block
    /// ids must be unique.
    pub fn validate(&self) -> Result<(), crate::errors::CompileError> {
        use crate::errors::{CompileError, ErrorContext};
        use std::collections::HashSet;

        let mut seen = HashSet::new();
        for block in &self.blocks {
            if !seen.insert(block.id) {
                return Err(CompileError::validation(format!("duplicate block id {}", block.id))
                    .with_context(ErrorContext::new().with_block(block.id)));
            }
        }
        let exists = |id: BlockId, seen: &HashSet<BlockId>| seen.contains(&id);
        for block in &self.blocks {
            for target in block.terminator.targets() {
                if !exists(target, &seen) {
                    return Err(CompileError::validation(format!(
                        "terminator in block {} references non-existent block {}",
                        block.id, target
                    ))
                    .with_context(ErrorContext::new().with_block(block.id)));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    pub instructions: Vec<Instruction>,
    pub terminator: Terminator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationKind {
    Const,
    Let,
    Var,
    Function,
    None,
}

#[derive(Debug, Clone)]
pub enum Instruction {
    Assign { target: String, value: Expression, declaration_kind: DeclarationKind },
    Expression { value: Expression },
    Phi { target: String, sources: Vec<(BlockId, String)> },
}

impl Instruction {
    pub fn target_name(&self) -> Option<&str> {
        match self {
            Instruction::Assign { target, .. } => Some(target),
            Instruction::Phi { target, .. } => Some(target),
            Instruction::Expression { .. } => None,
        }
    }

    pub fn value_mut(&mut self) -> Option<&mut Expression> {
        match self {
            Instruction::Assign { value, .. } => Some(value),
            Instruction::Expression { value } => Some(value),
            Instruction::Phi { .. } => None,
        }
    }

    pub fn value(&self) -> Option<&Expression> {
        match self {
            Instruction::Assign { value, .. } => Some(value),
            Instruction::Expression { value } => Some(value),
            Instruction::Phi { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Terminator {
    Return(Option<Expression>),
    Throw(Expression),
    Jump(BlockId),
    Branch { test: Expression, consequent: BlockId, alternate: BlockId },
    Switch { discriminant: Expression, cases: Vec<(Option<Expression>, BlockId)> },
    Unreachable,
    Break { target: BlockId, label: Option<String> },
    Continue { target: BlockId, label: Option<String> },
    ForOf { var: String, kind: DeclarationKind, pattern: Option<crate::ast::Pattern>, iter: Expression, body: BlockId, exit: BlockId },
    ForIn { var: String, kind: DeclarationKind, pattern: Option<crate::ast::Pattern>, obj: Expression, body: BlockId, exit: BlockId },
    Try { try_block: BlockId, catch_block: Option<BlockId>, catch_param: Option<String>, finally_block: Option<BlockId>, exit: BlockId },
}

impl Terminator {
    /// All block ids this terminator may transfer control to — used by the
    /// validator and by CFG successor computation.
    pub fn targets(&self) -> Vec<BlockId> {
        match self {
            Terminator::Return(_) | Terminator::Throw(_) | Terminator::Unreachable => vec![],
            Terminator::Jump(b) => vec![*b],
            Terminator::Branch { consequent, alternate, .. } => vec![*consequent, *alternate],
            Terminator::Switch { cases, .. } => cases.iter().map(|(_, b)| *b).collect(),
            Terminator::Break { target, .. } | Terminator::Continue { target, .. } => vec![*target],
            Terminator::ForOf { body, exit, .. } | Terminator::ForIn { body, exit, .. } => vec![*body, *exit],
            Terminator::Try { try_block, catch_block, finally_block, exit, .. } => {
                let mut v = vec![*try_block, *exit];
                if let Some(c) = catch_block {
                    v.push(*c);
                }
                if let Some(f) = finally_block {
                    v.push(*f);
                }
                v
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum Literal {
    String(String),
    Number(f64),
    Bool(bool),
    Null,
    Undefined,
    BigInt(String),
    Regex { pattern: String, flags: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add, Sub, Mul, Div, Mod, Exp,
    Eq, NotEq, StrictEq, StrictNotEq,
    Lt, LtEq, Gt, GtEq,
    BitAnd, BitOr, BitXor, Shl, Shr,
    NullishCoalesce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp { And, Or }

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp { Neg, Pos, Not, BitNot, TypeOf, Void }

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp { Increment, Decrement }

/// Tagged-union expression IR (spec.md §3). Calls carry an optional `pure`
/// hint the purity pass (`src/optimize/purity.rs`) may use directly instead
/// of re-deriving it.
#[derive(Debug, Clone)]
pub enum Expression {
    Identifier(String),
    Literal(Literal),
    Call { callee: Box<Expression>, arguments: Vec<Expression>, optional: bool, pure: Option<bool> },
    Member { object: Box<Expression>, property: MemberKey, optional: bool },
    Binary { left: Box<Expression>, operator: BinaryOp, right: Box<Expression> },
    Logical { left: Box<Expression>, operator: LogicalOp, right: Box<Expression> },
    Unary { operator: UnaryOp, argument: Box<Expression> },
    Conditional { test: Box<Expression>, consequent: Box<Expression>, alternate: Box<Expression> },
    Array(Vec<ArrayElement>),
    Object(Vec<ObjectProperty>),
    Jsx(Box<JsxElement>),
    ArrowFunction { params: Vec<String>, body: Box<ArrowBody>, is_expression: bool, is_async: bool },
    FunctionExpression(Box<Function>),
    AssignmentExpression { target: Box<Expression>, value: Box<Expression> },
    UpdateExpression { argument: Box<Expression>, operator: UpdateOp, prefix: bool },
    TemplateLiteral(Vec<TemplatePart>),
    SpreadElement(Box<Expression>),
    Await(Box<Expression>),
    New { callee: Box<Expression>, arguments: Vec<Expression> },
    Sequence(Vec<Expression>),
    Yield { argument: Option<Box<Expression>>, delegate: bool },
    TaggedTemplate { tag: Box<Expression>, quasi: Vec<TemplatePart> },
    Class(String),
    This,
    Super,
}

#[derive(Debug, Clone)]
pub enum ArrowBody {
    Expression(Expression),
    Block(Vec<BasicBlock>, BlockId),
}

#[derive(Debug, Clone)]
pub enum MemberKey {
    Literal(String),
    Computed(Box<Expression>),
}

#[derive(Debug, Clone)]
pub enum ArrayElement {
    Item(Expression),
    Spread(Expression),
    Hole,
}

#[derive(Debug, Clone)]
pub enum ObjectProperty {
    Field { key: String, computed: bool, value: Expression },
    Spread(Expression),
}

#[derive(Debug, Clone)]
pub enum TemplatePart {
    String(String),
    Expression(Expression),
}

#[derive(Debug, Clone)]
pub struct JsxElement {
    pub tag: String,
    pub is_component: bool,
    pub attributes: Vec<JsxAttribute>,
    pub children: Vec<JsxChild>,
}

#[derive(Debug, Clone)]
pub struct JsxAttribute {
    pub name: String,
    pub value: JsxAttributeValue,
}

#[derive(Debug, Clone)]
pub enum JsxAttributeValue {
    Expression(Expression),
    Spread(Expression),
}

#[derive(Debug, Clone)]
pub enum JsxChild {
    Element(Box<JsxElement>),
    Text(String),
    Expression(Box<Expression>),
}

/// Walks every sub-expression of `expr` in pre-order, calling `visit` on
/// each — used throughout the analyzer/optimizer stages instead of each one
/// re-writing its own traversal.
pub fn walk_expression<'a>(expr: &'a Expression, visit: &mut dyn FnMut(&'a Expression)) {
    visit(expr);
    match expr {
        Expression::Identifier(_) | Expression::Literal(_) | Expression::This | Expression::Super | Expression::Class(_) => {}
        Expression::Call { callee, arguments, .. } => {
            walk_expression(callee, visit);
            arguments.iter().for_each(|a| walk_expression(a, visit));
        }
        Expression::Member { object, property, .. } => {
            walk_expression(object, visit);
            if let MemberKey::Computed(e) = property {
                walk_expression(e, visit);
            }
        }
        Expression::Binary { left, right, .. } => {
            walk_expression(left, visit);
            walk_expression(right, visit);
        }
        Expression::Logical { left, right, .. } => {
            walk_expression(left, visit);
            walk_expression(right, visit);
        }
        Expression::Unary { argument, .. } => walk_expression(argument, visit),
        Expression::Conditional { test, consequent, alternate } => {
            walk_expression(test, visit);
            walk_expression(consequent, visit);
            walk_expression(alternate, visit);
        }
        Expression::Array(elems) => elems.iter().for_each(|e| match e {
            ArrayElement::Item(e) | ArrayElement::Spread(e) => walk_expression(e, visit),
            ArrayElement::Hole => {}
        }),
        Expression::Object(props) => props.iter().for_each(|p| match p {
            ObjectProperty::Field { value, .. } => walk_expression(value, visit),
            ObjectProperty::Spread(e) => walk_expression(e, visit),
        }),
        Expression::Jsx(jsx) => {
            for attr in &jsx.attributes {
                match &attr.value {
                    JsxAttributeValue::Expression(e) | JsxAttributeValue::Spread(e) => walk_expression(e, visit),
                }
            }
            for child in &jsx.children {
                walk_jsx_child(child, visit);
            }
        }
        Expression::ArrowFunction { body, .. } => {
            if let ArrowBody::Expression(e) = body.as_ref() {
                walk_expression(e, visit);
            }
        }
        Expression::FunctionExpression(_) => {}
        Expression::AssignmentExpression { target, value } => {
            walk_expression(target, visit);
            walk_expression(value, visit);
        }
        Expression::UpdateExpression { argument, .. } => walk_expression(argument, visit),
        Expression::TemplateLiteral(parts) | Expression::TaggedTemplate { quasi: parts, .. } => {
            for part in parts {
                if let TemplatePart::Expression(e) = part {
                    walk_expression(e, visit);
                }
            }
            if let Expression::TaggedTemplate { tag, .. } = expr {
                walk_expression(tag, visit);
            }
        }
        Expression::SpreadElement(e) | Expression::Await(e) => walk_expression(e, visit),
        Expression::New { callee, arguments } => {
            walk_expression(callee, visit);
            arguments.iter().for_each(|a| walk_expression(a, visit));
        }
        Expression::Sequence(exprs) => exprs.iter().for_each(|e| walk_expression(e, visit)),
        Expression::Yield { argument, .. } => {
            if let Some(e) = argument {
                walk_expression(e, visit);
            }
        }
    }
}

fn walk_jsx_child<'a>(child: &'a JsxChild, visit: &mut dyn FnMut(&'a Expression)) {
    match child {
        JsxChild::Element(el) => {
            for attr in &el.attributes {
                match &attr.value {
                    JsxAttributeValue::Expression(e) | JsxAttributeValue::Spread(e) => walk_expression(e, visit),
                }
            }
            for c in &el.children {
                walk_jsx_child(c, visit);
            }
        }
        JsxChild::Expression(e) => walk_expression(e, visit),
        JsxChild::Text(_) => {}
    }
}

/// Collects the set of free identifier names read by `expr` (not counting
/// call-target or member-property positions past the base — used by the
/// reactive-scope analyzer's read collection, spec.md §4.2 step 1).
pub fn collect_identifier_reads(expr: &Expression, out: &mut HashMap<String, u32>) {
    walk_expression(expr, &mut |e| {
        if let Expression::Identifier(name) = e {
            *out.entry(name.clone()).or_insert(0) += 1;
        }
    });
}

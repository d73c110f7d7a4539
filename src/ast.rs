//! Surface AST: the shape of program the core consumes.
//!
//! This mirrors what an external JSX-aware parser/HIR-builder would hand the
//! compiler: ordinary JS-like statements and expressions, JSX elements, and
//! the four reactivity primitives (`$state`, `$store`, `$memo`, `$effect`)
//! represented as ordinary calls so the builder can recognize them by name
//! rather than by a dedicated node (matching spec.md §3, which keeps the IR
//! call-shaped and leaves "reactivity creators" to be recognized by name).

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier {
    pub value: String,
}

impl Identifier {
    pub fn new(value: impl Into<String>) -> Self {
        Identifier { value: value.into() }
    }
}

#[derive(Debug, Clone)]
pub struct Program {
    pub items: Vec<Item>,
}

#[derive(Debug, Clone)]
pub enum Item {
    Use(UseStatement),
    Function(FunctionDefinition),
    Export(Box<Item>),
    Directive(String),
}

#[derive(Debug, Clone)]
pub struct UseStatement {
    pub path: Vec<Identifier>,
    pub imports: Vec<Identifier>,
}

#[derive(Debug, Clone)]
pub struct FunctionDefinition {
    pub name: Identifier,
    pub params: Vec<Identifier>,
    pub body: BlockStatement,
    pub is_arrow: bool,
    pub has_expression_body: bool,
    pub is_async: bool,
    /// Component vs. plain function is a naming convention upstream
    /// (PascalCase); the core itself only cares whether JSX appears in the
    /// body, which the region generator discovers independently.
    pub no_memo: bool,
    pub directives: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct BlockStatement {
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone)]
pub enum DeclarationKind {
    Const,
    Let,
    Var,
    Function,
}

#[derive(Debug, Clone)]
pub enum Statement {
    Let { pattern: Pattern, kind: DeclarationKind, value: Expression },
    Assignment { target: Expression, value: Expression },
    CompoundAssignment { target: Expression, operator: BinaryOp, value: Expression },
    Update { target: Expression, operator: UpdateOp, prefix: bool },
    Return(Option<Expression>),
    Throw(Expression),
    Expression(Expression),
    If { test: Expression, consequent: BlockStatement, alternate: Option<Box<Statement>> },
    Block(BlockStatement),
    While { test: Expression, body: BlockStatement },
    DoWhile { test: Expression, body: BlockStatement },
    For { init: Option<Box<Statement>>, test: Option<Expression>, update: Option<Box<Statement>>, body: BlockStatement },
    ForOf { kind: DeclarationKind, pattern: Pattern, iterable: Expression, body: BlockStatement },
    ForIn { kind: DeclarationKind, pattern: Pattern, object: Expression, body: BlockStatement },
    Break(Option<Identifier>),
    Continue(Option<Identifier>),
    Labeled { label: Identifier, body: Box<Statement> },
    Switch { discriminant: Expression, cases: Vec<SwitchCase> },
    Try { block: BlockStatement, handler: Option<CatchClause>, finalizer: Option<BlockStatement> },
    FunctionDecl(FunctionDefinition),
    Directive(String),
}

#[derive(Debug, Clone)]
pub struct SwitchCase {
    pub test: Option<Expression>,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone)]
pub struct CatchClause {
    pub param: Option<Pattern>,
    pub body: BlockStatement,
}

#[derive(Debug, Clone)]
pub enum Pattern {
    Identifier(Identifier),
    Array(Vec<Option<Pattern>>),
    Object(Vec<(Identifier, Pattern)>),
    Rest(Box<Pattern>),
}

impl Pattern {
    pub fn bound_identifiers(&self) -> Vec<Identifier> {
        match self {
            Pattern::Identifier(id) => vec![id.clone()],
            Pattern::Array(elems) => elems.iter().flatten().flat_map(Pattern::bound_identifiers).collect(),
            Pattern::Object(fields) => fields.iter().flat_map(|(_, p)| p.bound_identifiers()).collect(),
            Pattern::Rest(p) => p.bound_identifiers(),
        }
    }
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

#[derive(Debug, Clone)]
pub enum Expression {
    Identifier(Identifier),
    Literal(Literal),
    Call { callee: Box<Expression>, arguments: Vec<Expression>, optional: bool, pure_hint: Option<bool> },
    Member { object: Box<Expression>, property: MemberKey, optional: bool },
    Binary { left: Box<Expression>, operator: BinaryOp, right: Box<Expression> },
    Logical { left: Box<Expression>, operator: LogicalOp, right: Box<Expression> },
    Unary { operator: UnaryOp, argument: Box<Expression> },
    Conditional { test: Box<Expression>, consequent: Box<Expression>, alternate: Box<Expression> },
    Array(Vec<ArrayElement>),
    Object(Vec<ObjectProperty>),
    Jsx(Box<JsxElement>),
    Arrow { params: Vec<Pattern>, body: ArrowBody, is_async: bool },
    Function(Box<FunctionDefinition>),
    Assignment { target: Box<Expression>, value: Box<Expression> },
    Update { argument: Box<Expression>, operator: UpdateOp, prefix: bool },
    Template(Vec<TemplatePart>),
    Spread(Box<Expression>),
    Await(Box<Expression>),
    New { callee: Box<Expression>, arguments: Vec<Expression> },
    Sequence(Vec<Expression>),
    Yield { argument: Option<Box<Expression>>, delegate: bool },
    TaggedTemplate { tag: Box<Expression>, quasi: Vec<TemplatePart> },
    This,
    Super,
}

#[derive(Debug, Clone)]
pub enum MemberKey {
    Literal(Identifier),
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
    Field { key: Identifier, computed: bool, value: Expression },
    Spread(Expression),
}

#[derive(Debug, Clone)]
pub enum TemplatePart {
    String(String),
    Expression(Expression),
}

#[derive(Debug, Clone)]
pub enum ArrowBody {
    Expression(Box<Expression>),
    Block(BlockStatement),
}

// --- JSX nodes, kept close to the teacher's shape (JsxElement/JsxOpeningTag/
// JsxChild/JsxAttribute) since JSX syntax itself doesn't change between a
// Rust-hosted and a JS-hosted surface language. ---

#[derive(Debug, Clone)]
pub struct JsxElement {
    pub opening_tag: JsxOpeningTag,
    pub children: Vec<JsxChild>,
    pub closing_tag: Option<Identifier>,
}

#[derive(Debug, Clone)]
pub struct JsxOpeningTag {
    pub name: Identifier,
    pub attributes: Vec<JsxAttribute>,
    pub self_closing: bool,
}

#[derive(Debug, Clone)]
pub enum JsxChild {
    Element(Box<JsxElement>),
    Text(String),
    Expression(Box<Expression>),
}

#[derive(Debug, Clone)]
pub struct JsxAttribute {
    pub name: Identifier,
    pub value: JsxAttributeValue,
}

#[derive(Debug, Clone)]
pub enum JsxAttributeValue {
    Expression(Expression),
    Spread(Expression),
}

impl JsxElement {
    pub fn is_component(&self) -> bool {
        self.opening_tag
            .name
            .value
            .chars()
            .next()
            .map(|c| c.is_uppercase())
            .unwrap_or(false)
    }

    pub fn tag_name(&self) -> &str {
        &self.opening_tag.name.value
    }
}

impl JsxAttribute {
    pub fn is_event_handler(&self) -> bool {
        self.name.value.starts_with("on")
            && self.name.value.chars().nth(2).map(|c| c.is_uppercase()).unwrap_or(false)
    }
}

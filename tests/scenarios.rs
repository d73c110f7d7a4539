//! End-to-end scenarios driving the public `Compiler` API the way a host
//! embedding this crate would: hand it an `ir::Function`, run it through
//! `compile_function`, and render the lowered result to source text.
//! Mirrors spec.md §8's testable scenarios (S1-S6) plus a couple of the
//! pipeline's other externally-observable contracts.

use fict_compiler::codegen::target;
use fict_compiler::ir::*;
use fict_compiler::structurize::StructuredNode;
use fict_compiler::{CompileError, Compiler, ErrorKind};

fn state_call(initial: Expression) -> Expression {
    Expression::Call { callee: Box::new(Expression::Identifier("$state".into())), arguments: vec![initial], optional: false, pure: None }
}

fn block(id: BlockId, instructions: Vec<Instruction>, terminator: Terminator) -> BasicBlock {
    BasicBlock { id, instructions, terminator }
}

fn single_block_function(name: &str, instructions: Vec<Instruction>, terminator: Terminator) -> Function {
    Function {
        name: name.into(),
        params: vec![],
        raw_params: vec![],
        blocks: vec![block(0, instructions, terminator)],
        entry: 0,
        flags: FunctionFlags::default(),
        hook_return_info: None,
    }
}

fn render(_function: &Function, compiled: &fict_compiler::CompiledFunction) -> String {
    target::render_function(&compiled.lowered.function, &compiled.structured.root)
}

/// S1 — signal read/write: `let c=$state(0); c=c+1; c++; return c`. The
/// creation call becomes `useSignal`, the assignment becomes a setter call
/// built from the getter, and the final read is a getter call too.
#[test]
fn s1_signal_read_write_lowers_to_accessor_and_setter_calls() {
    // `c=c+1` is a regular reassignment (new SSA version, `Instruction::Assign`);
    // `c++` is a bare update statement with no SSA target of its own, same
    // shape the HIR builder emits for `ast::Statement::Update`.
    let func = single_block_function(
        "Counter",
        vec![
            Instruction::Assign { target: "c".into(), value: state_call(Expression::Literal(Literal::Number(0.0))), declaration_kind: DeclarationKind::Let },
            Instruction::Assign {
                target: "c$$1".into(),
                value: Expression::Binary { left: Box::new(Expression::Identifier("c".into())), operator: BinaryOp::Add, right: Box::new(Expression::Literal(Literal::Number(1.0))) },
                declaration_kind: DeclarationKind::None,
            },
            Instruction::Expression {
                value: Expression::UpdateExpression { argument: Box::new(Expression::Identifier("c$$1".into())), operator: UpdateOp::Increment, prefix: false },
            },
        ],
        Terminator::Return(Some(Expression::Identifier("c$$1".into()))),
    );

    let compiler = Compiler::new();
    let compiled = compiler.compile_function(&func, &[]).unwrap();
    assert!(compiled.lowered.helpers_used.contains("useSignal"));

    let rendered = render(&func, &compiled);
    assert!(rendered.contains("useSignal(__fictCtx, 0)"), "rendered was:\n{rendered}");
    assert!(rendered.contains("c((c() + 1))"), "rendered was:\n{rendered}");
    assert!(rendered.contains("return c();"), "rendered was:\n{rendered}");
}

/// S3 — props binding: a tracked local and an untracked `props` parameter
/// read side by side. `props.label` must stay a plain member read since
/// `props` was never `$state`/`$store`-created or reassigned through one.
#[test]
fn s3_untracked_parameter_reads_stay_unrewritten() {
    let mut func = single_block_function(
        "View",
        vec![Instruction::Assign { target: "color".into(), value: state_call(Expression::Literal(Literal::String("red".into()))), declaration_kind: DeclarationKind::Let }],
        Terminator::Return(Some(Expression::Member {
            object: Box::new(Expression::Identifier("props".into())),
            property: MemberKey::Literal("label".into()),
            optional: false,
        })),
    );
    func.params = vec!["props".into()];

    let compiler = Compiler::new();
    let compiled = compiler.compile_function(&func, &[]).unwrap();
    let rendered = render(&func, &compiled);
    assert!(rendered.contains("return props.label;"), "rendered was:\n{rendered}");
}

/// S6 — `"use no memo"` on a function: derived bindings keep their getter
/// rewriting but lose memo wrapping entirely. Input mirrors spec.md's own
/// S6 scenario literally — `let count=$state(0); const doubled=count*2;
/// return <div>{doubled}</div>` — so the plain-identifier text child also
/// exercises the `bindText` binding path, not just the memo suppression.
#[test]
fn s6_no_memo_directive_suppresses_memo_wrapping() {
    let mut func = single_block_function(
        "View",
        vec![
            Instruction::Assign { target: "count".into(), value: state_call(Expression::Literal(Literal::Number(0.0))), declaration_kind: DeclarationKind::Let },
            Instruction::Assign {
                target: "doubled".into(),
                value: Expression::Binary { left: Box::new(Expression::Identifier("count".into())), operator: BinaryOp::Mul, right: Box::new(Expression::Literal(Literal::Number(2.0))) },
                declaration_kind: DeclarationKind::Const,
            },
        ],
        Terminator::Return(Some(Expression::Jsx(Box::new(JsxElement {
            tag: "div".into(),
            is_component: false,
            attributes: vec![],
            children: vec![JsxChild::Expression(Box::new(Expression::Identifier("doubled".into())))],
        })))),
    );
    func.flags.directives.push("use no memo".to_string());

    let compiler = Compiler::new();
    let compiled = compiler.compile_function(&func, &[]).unwrap();
    assert!(!compiled.lowered.helpers_used.contains("useMemo"));
    assert!(compiled.lowered.helpers_used.contains("bindText"));

    let rendered = render(&func, &compiled);
    assert!(rendered.contains("count() * 2"), "rendered was:\n{rendered}");
    assert!(!rendered.contains("useMemo"), "rendered was:\n{rendered}");
    assert!(rendered.contains("bindText"), "rendered was:\n{rendered}");
}

/// Reactive writes to a bare alias of a tracked binding are rejected
/// (spec.md §9, SPEC_FULL.md §B); a fresh, non-aliased derived binding
/// reassigned the same way is fine.
#[test]
fn alias_reassignment_is_a_codegen_error() {
    let func = single_block_function(
        "Counter",
        vec![
            Instruction::Assign { target: "count".into(), value: state_call(Expression::Literal(Literal::Number(0.0))), declaration_kind: DeclarationKind::Let },
            Instruction::Assign { target: "alias".into(), value: Expression::Identifier("count".into()), declaration_kind: DeclarationKind::Let },
            Instruction::Assign { target: "alias$$1".into(), value: Expression::Literal(Literal::Number(5.0)), declaration_kind: DeclarationKind::None },
        ],
        Terminator::Return(Some(Expression::Identifier("alias$$1".into()))),
    );

    let compiler = Compiler::new();
    let err: CompileError = compiler.compile_function(&func, &[]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::CodegenError);
    assert_eq!(err.kind.code(), "CODEGEN_ERROR");
    assert!(err.remediation.is_some());
}

/// A terminator that jumps to a block id the function doesn't have is a
/// fatal `VALIDATION_ERROR` raised before any analysis runs (spec.md §4.9).
#[test]
fn dangling_terminator_target_is_a_validation_error() {
    let func = single_block_function("Broken", vec![], Terminator::Jump(7));
    let compiler = Compiler::new();
    let err = compiler.compile_function(&func, &[]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::ValidationError);
}

/// JSX conditional children (`cond ? <A/> : <B/>`) lower to the runtime's
/// `conditional` helper rather than the generic `insert`.
#[test]
fn jsx_ternary_child_uses_conditional_helper() {
    let jsx = JsxElement {
        tag: "div".into(),
        is_component: false,
        attributes: vec![],
        children: vec![JsxChild::Expression(Box::new(Expression::Conditional {
            test: Box::new(Expression::Identifier("visible".into())),
            consequent: Box::new(Expression::Literal(Literal::String("yes".into()))),
            alternate: Box::new(Expression::Literal(Literal::String("no".into()))),
        }))],
    };
    let func = single_block_function(
        "Toggle",
        vec![Instruction::Assign { target: "visible".into(), value: state_call(Expression::Literal(Literal::Bool(true))), declaration_kind: DeclarationKind::Let }],
        Terminator::Return(Some(Expression::Jsx(Box::new(jsx)))),
    );

    let compiler = Compiler::new();
    let compiled = compiler.compile_function(&func, &[]).unwrap();
    assert!(compiled.lowered.helpers_used.contains("conditional"));
    assert!(!compiled.lowered.helpers_used.contains("insert"));
}

/// JSX `.map()` children lower to the runtime's `keyedList` helper with the
/// iteration callback's parameter wrapped as its own accessor.
#[test]
fn jsx_map_child_uses_keyed_list_helper() {
    let jsx = JsxElement {
        tag: "ul".into(),
        is_component: false,
        attributes: vec![],
        children: vec![JsxChild::Expression(Box::new(Expression::Call {
            callee: Box::new(Expression::Member { object: Box::new(Expression::Identifier("items".into())), property: MemberKey::Literal("map".into()), optional: false }),
            arguments: vec![Expression::ArrowFunction { params: vec!["item".into()], body: Box::new(ArrowBody::Expression(Expression::Identifier("item".into()))), is_expression: true, is_async: false }],
            optional: false,
            pure: None,
        }))],
    };
    let func = single_block_function(
        "List",
        vec![Instruction::Assign { target: "items".into(), value: state_call(Expression::Array(vec![])), declaration_kind: DeclarationKind::Let }],
        Terminator::Return(Some(Expression::Jsx(Box::new(jsx)))),
    );

    let compiler = Compiler::new();
    let compiled = compiler.compile_function(&func, &[]).unwrap();
    assert!(compiled.lowered.helpers_used.contains("keyedList"));
}

/// S2 — derived property read: a `$state`-created store's nested field is
/// read both as a JSX `className` attribute and as a text child. Both reads
/// rewrite to an accessor call chain, and the attribute binding goes through
/// the runtime's `bindClass` helper rather than a generic `bindAttribute`.
#[test]
fn s2_derived_property_read_uses_bind_class_and_rewrites_nested_member() {
    let jsx = JsxElement {
        tag: "div".into(),
        is_component: false,
        attributes: vec![JsxAttribute {
            name: "className".into(),
            value: JsxAttributeValue::Expression(Expression::Member {
                object: Box::new(Expression::Member { object: Box::new(Expression::Identifier("s".into())), property: MemberKey::Literal("user".into()), optional: false }),
                property: MemberKey::Literal("name".into()),
                optional: false,
            }),
        }],
        children: vec![JsxChild::Expression(Box::new(Expression::Member {
            object: Box::new(Expression::Member { object: Box::new(Expression::Identifier("s".into())), property: MemberKey::Literal("user".into()), optional: false }),
            property: MemberKey::Literal("name".into()),
            optional: false,
        }))],
    };
    let func = single_block_function(
        "Profile",
        vec![Instruction::Assign {
            target: "s".into(),
            value: Expression::Call { callee: Box::new(Expression::Identifier("$state".into())), arguments: vec![Expression::Object(vec![])], optional: false, pure: None },
            declaration_kind: DeclarationKind::Let,
        }],
        Terminator::Return(Some(Expression::Jsx(Box::new(jsx)))),
    );

    let compiler = Compiler::new();
    let compiled = compiler.compile_function(&func, &[]).unwrap();
    assert!(compiled.lowered.helpers_used.contains("bindClass"), "helpers: {:?}", compiled.lowered.helpers_used);

    let rendered = render(&func, &compiled);
    assert!(rendered.contains("s().user.name"), "rendered was:\n{rendered}");
    assert!(rendered.contains("bindClass"), "rendered was:\n{rendered}");
}

/// S4 — lazy conditional memo: `a = x + 1; b = y * 2; r = cond ? a : b;`
/// where `a` and `b` are each used only inside the conditional. The two
/// branch computations fuse into a single memo over `r`, rather than each
/// getting its own independent `useMemo`, so the inactive branch's
/// computation is never run.
#[test]
fn s4_lazy_conditional_memo_fuses_branch_arms_into_one_memo() {
    let func = single_block_function(
        "Picker",
        vec![
            Instruction::Assign { target: "x".into(), value: state_call(Expression::Literal(Literal::Number(1.0))), declaration_kind: DeclarationKind::Let },
            Instruction::Assign { target: "y".into(), value: state_call(Expression::Literal(Literal::Number(2.0))), declaration_kind: DeclarationKind::Let },
            Instruction::Assign { target: "cond".into(), value: state_call(Expression::Literal(Literal::Bool(true))), declaration_kind: DeclarationKind::Let },
            Instruction::Assign {
                target: "a".into(),
                value: Expression::Binary { left: Box::new(Expression::Identifier("x".into())), operator: BinaryOp::Add, right: Box::new(Expression::Literal(Literal::Number(1.0))) },
                declaration_kind: DeclarationKind::Const,
            },
            Instruction::Assign {
                target: "b".into(),
                value: Expression::Binary { left: Box::new(Expression::Identifier("y".into())), operator: BinaryOp::Mul, right: Box::new(Expression::Literal(Literal::Number(2.0))) },
                declaration_kind: DeclarationKind::Const,
            },
            Instruction::Assign {
                target: "r".into(),
                value: Expression::Conditional {
                    test: Box::new(Expression::Identifier("cond".into())),
                    consequent: Box::new(Expression::Identifier("a".into())),
                    alternate: Box::new(Expression::Identifier("b".into())),
                },
                declaration_kind: DeclarationKind::Const,
            },
        ],
        Terminator::Return(Some(Expression::Identifier("r".into()))),
    );

    let compiler = Compiler::new();
    let compiled = compiler.compile_function(&func, &[]).unwrap();
    let rendered = render(&func, &compiled);

    let memo_count = rendered.matches("useMemo(").count() + rendered.matches("memo(").count();
    assert_eq!(memo_count, 1, "expected exactly one fused memo, rendered was:\n{rendered}");
    assert!(rendered.contains("cond()"), "rendered was:\n{rendered}");
    assert!(rendered.contains("x() + 1"), "rendered was:\n{rendered}");
    assert!(rendered.contains("y() * 2"), "rendered was:\n{rendered}");
}

/// S5 — irreducible control flow: a branch into a two-entry cycle (neither
/// arm dominates the other's loop back-edge) can't be reduced to `if`/`while`
/// nodes, so the structurizer falls back to a `__state`/`__cfgLoop`
/// state-machine encoding and records a warning diagnostic.
#[test]
fn s5_irreducible_control_flow_falls_back_to_state_machine() {
    let entry = block(
        0,
        vec![],
        Terminator::Branch { test: Expression::Identifier("cond0".into()), consequent: 1, alternate: 2 },
    );
    let b1 = block(1, vec![], Terminator::Branch { test: Expression::Identifier("cond1".into()), consequent: 2, alternate: 3 });
    let b2 = block(2, vec![], Terminator::Branch { test: Expression::Identifier("cond2".into()), consequent: 1, alternate: 3 });
    let exit = block(3, vec![], Terminator::Return(Some(Expression::Literal(Literal::Number(0.0)))));

    let func = Function {
        name: "Tangled".into(),
        params: vec!["cond0".into(), "cond1".into(), "cond2".into()],
        raw_params: vec![],
        blocks: vec![entry, b1, b2, exit],
        entry: 0,
        flags: FunctionFlags::default(),
        hook_return_info: None,
    };

    let compiler = Compiler::new();
    let compiled = compiler.compile_function(&func, &[]).unwrap();
    assert!(!compiled.structured.warnings.is_empty(), "expected an irreducible-CFG warning");
    assert!(matches!(compiled.structured.root, StructuredNode::StateMachine { .. }));

    let rendered = render(&func, &compiled);
    assert!(rendered.contains("let __state ="), "rendered was:\n{rendered}");
    assert!(rendered.contains("__cfgLoop: while (true)"), "rendered was:\n{rendered}");
    assert!(rendered.contains("switch (__state)"), "rendered was:\n{rendered}");
}

/// `"use fict-compiler-disable"` at program level is honored for every
/// function that doesn't locally re-enable it — there's no opt-back-in.
#[test]
fn program_level_disable_directive_reaches_every_function() {
    let func = single_block_function(
        "Counter",
        vec![Instruction::Assign { target: "count".into(), value: state_call(Expression::Literal(Literal::Number(0.0))), declaration_kind: DeclarationKind::Let }],
        Terminator::Return(Some(Expression::Identifier("count".into()))),
    );

    let compiler = Compiler::new();
    let compiled = compiler.compile_function(&func, &["use fict-compiler-disable".to_string()]).unwrap();
    match &compiled.lowered.function.block(0).terminator {
        Terminator::Return(Some(Expression::Identifier(name))) => assert_eq!(name, "count"),
        other => panic!("expected untouched return, got {other:?}"),
    }
    assert!(compiled.lowered.helpers_used.is_empty());
}

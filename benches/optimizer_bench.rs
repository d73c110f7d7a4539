// Measures the full pipeline's cost at two scales: a trivial signal counter
// and a larger component with several derived bindings and a JSX return,
// both fed straight through `Compiler::compile_function` (no parser in this
// crate, so the IR is built by hand rather than from source text).

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use fict_compiler::ir::*;
use fict_compiler::Compiler;

fn state_call(initial: Expression) -> Expression {
    Expression::Call { callee: Box::new(Expression::Identifier("$state".into())), arguments: vec![initial], optional: false, pure: None }
}

fn counter_function() -> Function {
    let b0 = BasicBlock {
        id: 0,
        instructions: vec![
            Instruction::Assign { target: "count".into(), value: state_call(Expression::Literal(Literal::Number(0.0))), declaration_kind: DeclarationKind::Let },
            Instruction::Assign {
                target: "count$$1".into(),
                value: Expression::Binary { left: Box::new(Expression::Identifier("count".into())), operator: BinaryOp::Add, right: Box::new(Expression::Literal(Literal::Number(1.0))) },
                declaration_kind: DeclarationKind::None,
            },
        ],
        terminator: Terminator::Return(Some(Expression::Identifier("count$$1".into()))),
    };
    Function { name: "Counter".into(), params: vec![], raw_params: vec![], blocks: vec![b0], entry: 0, flags: FunctionFlags::default(), hook_return_info: None }
}

fn dashboard_function() -> Function {
    let jsx = JsxElement {
        tag: "div".into(),
        is_component: false,
        attributes: vec![JsxAttribute {
            name: "className".into(),
            value: JsxAttributeValue::Expression(Expression::Member { object: Box::new(Expression::Identifier("theme".into())), property: MemberKey::Literal("name".into()), optional: false }),
        }],
        children: vec![
            JsxChild::Expression(Box::new(Expression::Identifier("total".into()))),
            JsxChild::Expression(Box::new(Expression::Identifier("average".into()))),
            JsxChild::Expression(Box::new(Expression::Conditional {
                test: Box::new(Expression::Identifier("flagged".into())),
                consequent: Box::new(Expression::Literal(Literal::String("over budget".into()))),
                alternate: Box::new(Expression::Literal(Literal::String("on track".into()))),
            })),
        ],
    };

    let instructions = vec![
        Instruction::Assign { target: "theme".into(), value: state_call(Expression::Object(vec![])), declaration_kind: DeclarationKind::Let },
        Instruction::Assign { target: "prices".into(), value: state_call(Expression::Array(vec![])), declaration_kind: DeclarationKind::Let },
        Instruction::Assign { target: "flagged".into(), value: state_call(Expression::Literal(Literal::Bool(false))), declaration_kind: DeclarationKind::Let },
        Instruction::Assign {
            target: "total".into(),
            value: Expression::Call {
                callee: Box::new(Expression::Member { object: Box::new(Expression::Identifier("prices".into())), property: MemberKey::Literal("reduce".into()), optional: false }),
                arguments: vec![
                    Expression::ArrowFunction {
                        params: vec!["a".into(), "b".into()],
                        body: Box::new(ArrowBody::Expression(Expression::Binary { left: Box::new(Expression::Identifier("a".into())), operator: BinaryOp::Add, right: Box::new(Expression::Identifier("b".into())) })),
                        is_expression: true,
                        is_async: false,
                    },
                    Expression::Literal(Literal::Number(0.0)),
                ],
                optional: false,
                pure: None,
            },
            declaration_kind: DeclarationKind::Const,
        },
        Instruction::Assign {
            target: "average".into(),
            value: Expression::Binary { left: Box::new(Expression::Identifier("total".into())), operator: BinaryOp::Div, right: Box::new(Expression::Literal(Literal::Number(3.0))) },
            declaration_kind: DeclarationKind::Const,
        },
    ];

    Function {
        name: "Dashboard".into(),
        params: vec![],
        raw_params: vec![],
        blocks: vec![BasicBlock { id: 0, instructions, terminator: Terminator::Return(Some(Expression::Jsx(Box::new(jsx)))) }],
        entry: 0,
        flags: FunctionFlags::default(),
        hook_return_info: None,
    }
}

fn bench_counter_function(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile_function_counter");

    group.bench_function("signal_read_write", |b| {
        let compiler = Compiler::new();
        b.iter(|| {
            let func = counter_function();
            let result = compiler.compile_function(black_box(&func), &[]);
            assert!(result.is_ok());
        });
    });

    group.finish();
}

fn bench_dashboard_function(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile_function_dashboard");

    group.bench_function("jsx_with_derived_bindings", |b| {
        let compiler = Compiler::new();
        b.iter(|| {
            let func = dashboard_function();
            let result = compiler.compile_function(black_box(&func), &[]);
            assert!(result.is_ok());
        });
    });

    group.finish();
}

fn bench_program_of_many_functions(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile_program");

    group.bench_function("twenty_counters", |b| {
        let compiler = Compiler::new();
        b.iter(|| {
            let mut items = Vec::new();
            for i in 0..20 {
                let mut func = counter_function();
                func.name = format!("Counter{i}");
                items.push(TopLevelItem::Function(func));
            }
            let program = Program { items, lifted_functions: vec![] };
            let result = compiler.compile_program(black_box(&program));
            assert!(result.is_ok());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_counter_function, bench_dashboard_function, bench_program_of_many_functions);
criterion_main!(benches);

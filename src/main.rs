use clap::Parser as ClapParser;
use colored::Colorize;
use fict_compiler::codegen::target;
use fict_compiler::diagnostics::Diagnostic;
use fict_compiler::ir::*;
use fict_compiler::{CompileError, Compiler};
use std::process;

#[derive(ClapParser)]
#[command(name = "fictc", version, about = "Reactive optimizing compiler core for the fict JSX UI framework")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Compiles one of the built-in demo fixtures and prints the emitted
    /// JavaScript; a stand-in for passing a real parser's `ir::Program`
    /// through the same `Compiler`, since this crate doesn't front its own
    /// parser (spec.md §6 treats the parser as an external collaborator).
    Compile {
        /// One of: counter, derived-sum, conditional-list
        fixture: String,
    },
    /// Lists the built-in demo fixtures.
    Fixtures,
    /// Prints the remediation text for a diagnostic code.
    Explain { code: String },
}

fn main() {
    let cli = Cli::parse();
    match cli.command {
        Commands::Fixtures => {
            for name in fixtures::names() {
                println!("  {}", name.cyan());
            }
        }
        Commands::Explain { code } => explain(&code),
        Commands::Compile { fixture } => {
            if let Err(err) = compile_fixture(&fixture) {
                eprintln!("{}", Diagnostic::from_error(&err).render());
                process::exit(1);
            }
        }
    }
}

fn explain(code: &str) {
    let known = fict_compiler::directives::known_codes();
    if !known.contains(code) {
        eprintln!("{} unknown diagnostic code `{}`", "error:".red().bold(), code);
        process::exit(1);
    }
    println!("{}", code.bold());
    let text = match code {
        "BUILD_ERROR" => "the HIR builder could not lower a surface construct into IR.",
        "SSA_ERROR" => "CFG/SSA construction found an internal inconsistency (missing dominator, unreachable phi source).",
        "STRUCTURIZE_ERROR" => "a terminator referenced a block id that doesn't exist in the function.",
        "CODEGEN_ERROR" => "the lowerer found a reactive binding it cannot safely rewrite (e.g. reassigning an alias of a tracked value).",
        "SCOPE_ERROR" => "reactive-scope analysis found an internally inconsistent scope.",
        "VALIDATION_ERROR" => "a function failed its basic-block precondition check (duplicate ids or dangling terminator targets).",
        "CYCLE_ERROR" => "two or more derived reactive bindings depend on each other.",
        "DEPTH_EXCEEDED" => "structurizer recursion or optimizer fixpoint iteration exceeded its configured bound.",
        _ => "no description available.",
    };
    println!("  {text}");
}

fn compile_fixture(name: &str) -> Result<(), CompileError> {
    let function = fixtures::get(name).ok_or_else(|| {
        CompileError::new(fict_compiler::ErrorKind::BuildError, format!("no such fixture `{name}` (see `fictc fixtures`)"))
    })?;

    println!("   {} {}", "Compiling".bold(), name.cyan());
    let compiler = Compiler::new();
    let compiled = compiler.compile_function(&function, &[])?;

    println!("   {} fixpoint stabilized", "✓".green());
    if !compiled.structured.warnings.is_empty() {
        for w in &compiled.structured.warnings {
            eprintln!("{}", w.render());
        }
    }

    let rendered = target::render_function(&compiled.lowered.function, &compiled.structured.root);
    println!("\n{rendered}");

    if !compiled.lowered.helpers_used.is_empty() {
        let mut helpers: Vec<_> = compiled.lowered.helpers_used.iter().cloned().collect();
        helpers.sort();
        println!("{} import {{ {} }} from \"fict/runtime\";", "  ".dimmed(), helpers.join(", "));
    }

    Ok(())
}

/// Hand-written `ir::Function` fixtures standing in for real parser output
/// (spec.md §8 scenarios S1-S3), kept here rather than in `src/build.rs` so
/// the library crate stays free of CLI-only demo data.
mod fixtures {
    use super::*;

    pub fn names() -> Vec<&'static str> {
        vec!["counter", "derived-sum", "conditional-list"]
    }

    pub fn get(name: &str) -> Option<Function> {
        match name {
            "counter" => Some(counter()),
            "derived-sum" => Some(derived_sum()),
            "conditional-list" => Some(conditional_list()),
            _ => None,
        }
    }

    fn counter() -> Function {
        let b0 = BasicBlock {
            id: 0,
            instructions: vec![Instruction::Assign {
                target: "count".into(),
                value: Expression::Call { callee: Box::new(Expression::Identifier("$state".into())), arguments: vec![Expression::Literal(Literal::Number(0.0))], optional: false, pure: None },
                declaration_kind: DeclarationKind::Let,
            }],
            terminator: Terminator::Return(Some(Expression::Identifier("count".into()))),
        };
        Function { name: "Counter".into(), params: vec![], raw_params: vec![], blocks: vec![b0], entry: 0, flags: FunctionFlags::default(), hook_return_info: None }
    }

    fn derived_sum() -> Function {
        let b0 = BasicBlock {
            id: 0,
            instructions: vec![
                Instruction::Assign {
                    target: "a".into(),
                    value: Expression::Call { callee: Box::new(Expression::Identifier("$state".into())), arguments: vec![Expression::Literal(Literal::Number(1.0))], optional: false, pure: None },
                    declaration_kind: DeclarationKind::Let,
                },
                Instruction::Assign {
                    target: "b".into(),
                    value: Expression::Call { callee: Box::new(Expression::Identifier("$state".into())), arguments: vec![Expression::Literal(Literal::Number(2.0))], optional: false, pure: None },
                    declaration_kind: DeclarationKind::Let,
                },
                Instruction::Assign {
                    target: "sum".into(),
                    value: Expression::Binary { left: Box::new(Expression::Identifier("a".into())), operator: BinaryOp::Add, right: Box::new(Expression::Identifier("b".into())) },
                    declaration_kind: DeclarationKind::Const,
                },
            ],
            terminator: Terminator::Return(Some(Expression::Identifier("sum".into()))),
        };
        Function { name: "Sum".into(), params: vec![], raw_params: vec![], blocks: vec![b0], entry: 0, flags: FunctionFlags::default(), hook_return_info: None }
    }

    fn conditional_list() -> Function {
        let jsx = JsxElement {
            tag: "ul".into(),
            is_component: false,
            attributes: vec![],
            children: vec![JsxChild::Expression(Box::new(Expression::Call {
                callee: Box::new(Expression::Member { object: Box::new(Expression::Identifier("items".into())), property: MemberKey::Literal("map".into()), optional: false }),
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
        let b0 = BasicBlock {
            id: 0,
            instructions: vec![Instruction::Assign {
                target: "items".into(),
                value: Expression::Call { callee: Box::new(Expression::Identifier("$state".into())), arguments: vec![Expression::Array(vec![])], optional: false, pure: None },
                declaration_kind: DeclarationKind::Let,
            }],
            terminator: Terminator::Return(Some(Expression::Jsx(Box::new(jsx)))),
        };
        Function { name: "List".into(), params: vec![], raw_params: vec![], blocks: vec![b0], entry: 0, flags: FunctionFlags::default(), hook_return_info: None }
    }
}

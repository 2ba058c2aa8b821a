//! End-to-end tests: raw tree → analysis → lowering → pruning → bytes.
//!
//! Programs are checked twice where it matters: once against the encoded
//! bytes and once by running the lowered module on the evaluator.
//!
//! Tests validate:
//! - small programs encode to the expected bodies and compute the right values
//! - `while` lowering and break depths survive encoding
//! - dead code elimination and index remapping
//! - memory block layout and label addresses
//! - narrow integer wrap-around after lowering
//! - lowering idempotence
//! - CompileResult packaging for success, diagnostics and fatal errors

use prewasm_codegen::opcodes::Op;
use prewasm_codegen::read_module;
use prewasm_compiler::{
    analyze, build_module, compile, compile_to_result, lower, prune, CompileError,
    CompileOptions, CompileResult,
};
use prewasm_eval::{Evaluator, Value};
use prewasm_types::ast::*;
use prewasm_types::parsed::build::*;
use prewasm_types::parsed::ParsedModule;
use prewasm_types::{DiagnosticKind, Diagnostics, ValueType};

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn quiet() -> Diagnostics {
    Diagnostics::with_sink(|_: &str| {})
}

fn built(parsed: &ParsedModule) -> Module {
    init_logging();
    build_module(parsed, &CompileOptions::default(), &mut quiet())
        .unwrap_or_else(|e| panic!("build failed: {e}"))
}

fn encoded(parsed: &ParsedModule) -> Vec<u8> {
    init_logging();
    compile(parsed, &CompileOptions::default(), &mut quiet())
        .unwrap_or_else(|e| panic!("compile failed: {e}"))
}

fn run(module: &Module, name: &str, args: &[Value]) -> Value {
    let mut eval = Evaluator::new(module).expect("evaluator setup failed");
    eval.call(name, args)
        .unwrap_or_else(|e| panic!("`{name}` failed: {e}"))
}

fn body_of(bytes: &[u8], name: &str) -> Vec<u8> {
    let info = read_module(bytes).expect("read failed");
    let rec = info
        .find(name)
        .unwrap_or_else(|| panic!("no record named `{name}`"));
    bytes[rec.body_begin as usize..rec.body_end as usize].to_vec()
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn names(module: &Module) -> Vec<&str> {
    module.funcs.iter().map(|f| f.name.as_str()).collect()
}

fn has_while(stmts: &[Stmt]) -> bool {
    stmts.iter().any(|s| match s {
        Stmt::While { .. } => true,
        Stmt::Loop { body } => has_while(body),
        Stmt::If {
            then_block,
            else_block,
            ..
        } => has_while(then_block) || else_block.as_deref().is_some_and(has_while),
        _ => false,
    })
}

/// `count(n)`: how many steps of 2 from 0 stay below `n`.
fn count_program() -> ParsedModule {
    module(vec![func("count")
        .export()
        .param("n", "i32")
        .returns("i32")
        .body(vec![
            var_init("d", "i32", i32c(0)),
            var_init("c", "i32", i32c(0)),
            while_(
                infix(name("d"), "<", name("n")),
                vec![
                    assign("d", infix(name("d"), "+", i32c(2))),
                    assign("c", infix(name("c"), "+", i32c(1))),
                ],
            ),
            ret(name("c")),
        ])
        .into()])
}

// ══════════════════════════════════════════════════════════════════════════════
// Small programs
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn main_returns_constant() {
    let parsed = module(vec![func("main")
        .export()
        .returns("i32")
        .body(vec![ret(i32c(11))])
        .into()]);

    let bytes = encoded(&parsed);
    assert_eq!(body_of(&bytes, "main"), [0x03, 1, 0x09, 0x10, 11]);
    assert_eq!(run(&built(&parsed), "main", &[]), Value::I32(11));
}

#[test]
fn add_parameters() {
    let parsed = module(vec![func("add")
        .export()
        .param("a", "i32")
        .param("b", "i32")
        .returns("i32")
        .body(vec![ret(infix(name("a"), "+", name("b")))])
        .into()]);

    let bytes = encoded(&parsed);
    let info = read_module(&bytes).unwrap();
    let rec = info.find("add").unwrap();
    assert_eq!(rec.params, [ValueType::I32, ValueType::I32]);
    assert!(contains(
        &body_of(&bytes, "add"),
        &[Op::I32Add.byte(), Op::GetLocal.byte(), 0, Op::GetLocal.byte(), 1]
    ));

    let m = built(&parsed);
    assert_eq!(run(&m, "add", &[Value::I32(13), Value::I32(-2)]), Value::I32(11));
}

#[test]
fn if_else_with_negation() {
    let parsed = module(vec![func("abs")
        .export()
        .param("x", "i64")
        .returns("i64")
        .body(vec![if_else(
            infix(name("x"), "<", i64c(0)),
            vec![ret(prefix("-", name("x")))],
            vec![ret(name("x"))],
        )])
        .into()]);
    let m = built(&parsed);
    assert_eq!(run(&m, "abs", &[Value::I64(-42)]), Value::I64(42));
    assert_eq!(run(&m, "abs", &[Value::I64(7)]), Value::I64(7));

    let body = body_of(&encoded(&parsed), "abs");
    assert!(body.contains(&Op::If2.byte()));
    assert!(body.contains(&Op::I64Sub.byte()));
}

#[test]
fn thread_local_counter() {
    let parsed = module(vec![
        tls("counter", "i32"),
        func("bump")
            .export()
            .returns("i32")
            .body(vec![
                assign("counter", infix(name("counter"), "+", i32c(1))),
                ret(name("counter")),
            ])
            .into(),
    ]);
    let m = built(&parsed);
    let mut eval = Evaluator::new(&m).unwrap();
    assert_eq!(eval.call("bump", &[]).unwrap(), Value::I32(1));
    assert_eq!(eval.call("bump", &[]).unwrap(), Value::I32(2));
}

// ══════════════════════════════════════════════════════════════════════════════
// Loops
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn while_is_lowered_to_loop_with_exit_check() {
    let m = built(&count_program());
    let body = &m.funcs[0].body;
    assert!(!has_while(body));

    let Stmt::Loop { body: loop_body } = &body[2] else {
        panic!("expected loop, got {:?}", body[2]);
    };
    let Stmt::If {
        cond,
        then_block,
        else_block,
    } = &loop_body[0]
    else {
        panic!("expected exit check");
    };
    assert_eq!(then_block, &[Stmt::Break { depth: 1 }]);
    assert!(else_block.is_none());
    assert_eq!(cond.etype, ValueType::I32);
}

#[test]
fn while_loop_runs_and_encodes() {
    let parsed = count_program();
    let m = built(&parsed);
    assert_eq!(run(&m, "count", &[Value::I32(10)]), Value::I32(5));
    assert_eq!(run(&m, "count", &[Value::I32(7)]), Value::I32(4));
    assert_eq!(run(&m, "count", &[Value::I32(0)]), Value::I32(0));

    let body = body_of(&encoded(&parsed), "count");
    assert!(body.contains(&Op::Loop.byte()));
    assert!(body.contains(&Op::If1.byte()));
    assert!(contains(&body, &[Op::Break.byte(), 1]));
}

#[test]
fn break_inside_if_leaves_loop() {
    // First i with i * i > limit.
    let parsed = module(vec![func("root")
        .export()
        .param("limit", "i32")
        .returns("i32")
        .body(vec![
            var_init("i", "i32", i32c(0)),
            while_(
                i32c(1),
                vec![
                    if_(
                        infix(infix(name("i"), "*", name("i")), ">", name("limit")),
                        vec![brk()],
                    ),
                    assign("i", infix(name("i"), "+", i32c(1))),
                ],
            ),
            ret(name("i")),
        ])
        .into()]);
    let m = built(&parsed);
    assert_eq!(run(&m, "root", &[Value::I32(50)]), Value::I32(8));
    assert_eq!(run(&m, "root", &[Value::I32(0)]), Value::I32(1));
}

// ══════════════════════════════════════════════════════════════════════════════
// Dead code elimination
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn uncalled_function_is_pruned() {
    let parsed = module(vec![
        func("unused").returns("i32").body(vec![ret(i32c(1))]).into(),
        func("main")
            .export()
            .returns("i32")
            .body(vec![ret(i32c(11))])
            .into(),
    ]);
    let m = built(&parsed);
    assert_eq!(names(&m), ["main"]);
    assert_eq!(m.funcs[0].index, 0);

    let info = read_module(&encoded(&parsed)).unwrap();
    assert_eq!(info.records.len(), 1);
    assert_eq!(info.records[0].name, "main");
}

#[test]
fn reachability_is_transitive() {
    let parsed = module(vec![
        func("orphan").body(vec![]).into(),
        func("leaf").returns("i32").body(vec![ret(i32c(4))]).into(),
        func("helper")
            .returns("i32")
            .body(vec![ret(infix(call("leaf", vec![]), "*", i32c(2)))])
            .into(),
        func("main")
            .export()
            .returns("i32")
            .body(vec![ret(call("helper", vec![]))])
            .into(),
    ]);
    let m = built(&parsed);
    assert_eq!(names(&m), ["leaf", "helper", "main"]);
    for (i, f) in m.funcs.iter().enumerate() {
        assert_eq!(f.index as usize, i);
    }
    let Stmt::Return { expr: Some(e) } = &m.funcs[2].body[0] else {
        panic!("expected return");
    };
    assert!(matches!(
        e.kind,
        ExprKind::CallDirect {
            func: FuncId(1),
            ..
        }
    ));
    assert_eq!(run(&m, "main", &[]), Value::I32(8));
}

#[test]
fn unused_externs_are_pruned_and_remapped() {
    let parsed = module(vec![
        extern_("log_f64", &["f64"], "void"),
        extern_("now", &[], "i64"),
        func("main")
            .export()
            .returns("i64")
            .body(vec![ret(call("now", vec![]))])
            .into(),
    ]);
    let m = built(&parsed);
    assert_eq!(m.externs.len(), 1);
    assert_eq!(m.externs[0].name, "now");
    assert_eq!(m.externs[0].index, 0);
    assert_eq!(
        m.funcs[0].body[0],
        Stmt::Return {
            expr: Some(Expr::call_external(ExternId(0), vec![], ValueType::I64))
        }
    );

    let info = read_module(&encoded(&parsed)).unwrap();
    assert_eq!(info.extern_count(), 1);
    assert_eq!(info.function_count(), 1);
    assert!(info.records[0].is_extern);
    assert_eq!(info.records[0].name, "now");
}

#[test]
fn function_references_keep_targets_alive() {
    let parsed = module(vec![
        func("seven").returns("i32").body(vec![ret(i32c(7))]).into(),
        func("main")
            .export()
            .returns("i32")
            .body(vec![
                var_init("f", "i32", name("seven")),
                ret(call_indirect(&[], "i32", name("f"), vec![])),
            ])
            .into(),
    ]);
    let m = built(&parsed);
    assert_eq!(names(&m), ["seven", "main"]);
    assert_eq!(run(&m, "main", &[]), Value::I32(7));
}

#[test]
fn pruning_twice_changes_nothing() {
    let parsed = module(vec![
        extern_("unused_ext", &[], "void"),
        func("unused").body(vec![]).into(),
        func("main").export().body(vec![]).into(),
    ]);
    let mut m = built(&parsed);
    let once = m.clone();
    prune(&mut m).unwrap();
    assert_eq!(m, once);
}

// ══════════════════════════════════════════════════════════════════════════════
// Lowering
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn narrow_arithmetic_wraps() {
    let parsed = module(vec![func("wrap")
        .export()
        .returns("i32")
        .body(vec![
            var_init("x", "i8", coerce("i8", i32c(127))),
            assign("x", infix(name("x"), "+", coerce("i8", i32c(1)))),
            ret(coerce("i32", name("x"))),
        ])
        .into()]);
    let m = built(&parsed);
    assert_eq!(m.funcs[0].locals[0].ty, ValueType::I32);
    assert_eq!(run(&m, "wrap", &[]), Value::I32(-128));
}

#[test]
fn derived_comparisons_evaluate_correctly() {
    let parsed = module(vec![func("cmp")
        .export()
        .param("a", "f64")
        .param("b", "f64")
        .returns("i32")
        .body(vec![ret(infix(
            infix(
                infix(name("a"), ">", name("b")),
                "+",
                infix(name("a"), ">=", name("b")),
            ),
            "+",
            infix(name("a"), "!=", name("b")),
        ))])
        .into()]);
    let m = built(&parsed);
    let cmp = |a: f64, b: f64| run(&m, "cmp", &[Value::F64(a), Value::F64(b)]);
    assert_eq!(cmp(2.0, 1.0), Value::I32(3));
    assert_eq!(cmp(1.0, 1.0), Value::I32(1));
    assert_eq!(cmp(0.0, 1.0), Value::I32(1));
}

#[test]
fn lowering_is_idempotent() {
    let parsed = module(vec![
        tls("t", "i16"),
        func("f")
            .export()
            .param("x", "i8")
            .returns("i8")
            .body(vec![
                while_(
                    infix(name("x"), ">", coerce("i8", i32c(0))),
                    vec![assign("x", infix(name("x"), "-", coerce("i8", i32c(1))))],
                ),
                expr(prefix("!", i64c(3))),
                expr(prefix("-", f64c(2.0))),
                ret(name("x")),
            ])
            .into(),
    ]);
    let mut m = built(&parsed);
    let once = m.clone();
    lower(&mut m).unwrap();
    assert_eq!(m, once);
}

// ══════════════════════════════════════════════════════════════════════════════
// Memory
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn memory_blocks_are_laid_out_in_order() {
    let parsed = module(vec![
        memory(vec![hex(&[0xde, 0xad, 0xbe])]),
        memory(vec![align(4), label("temp"), zero(4)]),
        func("main")
            .export()
            .returns("i32")
            .body(vec![ret(name("temp"))])
            .into(),
    ]);
    let m = built(&parsed);
    assert_eq!(m.top, 16);
    assert_eq!(m.memory[0].ptr, 8);
    assert_eq!(m.memory[1].ptr, 11);
    assert_eq!(m.memory[1].labels[0].ptr, 12);
    assert_eq!(run(&m, "main", &[]), Value::I32(12));

    let eval = Evaluator::new(&m).unwrap();
    assert_eq!(&eval.memory().bytes()[8..11], &[0xde, 0xad, 0xbe]);
}

#[test]
fn strings_are_readable_through_labels() {
    let parsed = module(vec![
        memory(vec![label("msg"), string("hello")]),
        func("first")
            .export()
            .returns("i32")
            .body(vec![ret(load("u8", name("msg")))])
            .into(),
    ]);
    let m = built(&parsed);
    assert_eq!(run(&m, "first", &[]), Value::I32(b'h' as i32));
    let eval = Evaluator::new(&m).unwrap();
    assert_eq!(eval.memory().read_c_string(8).unwrap(), "hello");
}

// ══════════════════════════════════════════════════════════════════════════════
// Driver
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn diagnostics_stop_the_pipeline() {
    let parsed = module(vec![func("main")
        .export()
        .body(vec![var("x", "i32"), var("x", "i32")])
        .into()]);
    let mut diags = quiet();
    let result = compile(&parsed, &CompileOptions::default(), &mut diags);
    assert_eq!(result, Err(CompileError::Diagnostics { count: 1 }));
    assert_eq!(diags.errors()[0].kind, DiagnosticKind::NameResolution);
}

#[test]
fn shared_memory_option_overrides_config() {
    let parsed = module(vec![func("main").export().body(vec![]).into()]);
    let options = CompileOptions {
        use_shared_memory: Some(true),
        ..CompileOptions::default()
    };
    let m = analyze(&parsed, &options, &mut quiet()).unwrap();
    assert!(m.uses_shared_memory());

    let m = analyze(&parsed, &CompileOptions::default(), &mut quiet()).unwrap();
    assert!(!m.uses_shared_memory());
}

#[test]
fn compile_result_on_success() {
    let parsed = module(vec![func("main")
        .export()
        .returns("i32")
        .body(vec![ret(i32c(11))])
        .into()]);
    let result = compile_to_result(&parsed, &CompileOptions::default());
    assert!(result.success);
    assert!(result.diagnostics.is_empty());
    assert!(result.fatal.is_none());
    assert_eq!(result.binary.as_deref(), Some(encoded(&parsed).as_slice()));

    let hash = result.binary_sha256.as_deref().unwrap();
    assert_eq!(hash.len(), 64);
    assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));

    let back: CompileResult = serde_json::from_str(&result.to_json()).unwrap();
    assert_eq!(back, result);
}

#[test]
fn compile_result_on_diagnostics() {
    let parsed = module(vec![func("main")
        .export()
        .returns("i32")
        .body(vec![ret(name("missing"))])
        .into()]);
    let result = compile_to_result(&parsed, &CompileOptions::default());
    assert!(!result.success);
    assert!(result.binary.is_none());
    assert!(result.binary_sha256.is_none());
    assert!(result.fatal.is_none());
    assert_eq!(result.diagnostics.len(), 1);
    assert_eq!(result.diagnostics[0].kind, DiagnosticKind::NameResolution);
}

#[test]
fn compile_result_on_fatal_error() {
    let parsed = module(vec![func("main")
        .export()
        .body(vec![expr(infix(f32c(1.0), "%", f32c(2.0)))])
        .into()]);
    let result = compile_to_result(&parsed, &CompileOptions::default());
    assert!(!result.success);
    assert!(result.diagnostics.is_empty());
    assert!(result.fatal.is_some());
    assert!(result.to_json().contains("\"fatal\""));
}

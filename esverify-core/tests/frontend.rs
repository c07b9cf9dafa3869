use esverify_core::ir::{BindingKind, ExprKind, Literal, Stmt, TopLevel};
use esverify_core::{
    format_expr, format_program, program_from_source, resolve_program, FrontendError,
};
use proptest::prelude::*;

fn reject(src: &str) -> FrontendError {
    match program_from_source(src) {
        Ok(_) => panic!("expected {src:?} to be rejected"),
        Err(e) => e,
    }
}

#[track_caller]
fn assert_rejected(src: &str, kind: &str, message: &str) {
    let err = reject(src);
    assert_eq!(err.kind(), kind, "{src}: {err}");
    assert!(
        err.message().contains(message),
        "{src}: expected {message:?}, got {:?}",
        err.message()
    );
}

#[test]
fn unsupported_constructs_are_rejected() {
    let cases = [
        ("var x = 1;", "var declarations"),
        ("let o = {};", "object literals"),
        ("let t = this;", "`this`"),
        ("let r = /a+/;", "regular expressions"),
        ("let [a, b] = [1, 2];", "destructuring"),
        ("function f(a = 1) { return a; }", "default parameters"),
        ("function f(...a) { return a; }", "rest parameters"),
        ("function* g() { }", "generators"),
        ("let f = function g() { return 1; };", "named function expressions"),
        ("let f = x => x;", "function bodies must be blocks"),
        ("for (let i = 0; i < 1; i++) { }", "for loops"),
        ("do { } while (false);", "do-while"),
        ("while (true) { break; }", "break"),
        ("while (true) { continue; }", "continue"),
        ("throw 1;", "exceptions"),
        ("try { } catch (e) { }", "exceptions"),
        ("return 1;", "top level return not allowed"),
        ("function f() { function g() { } }", "only supported at top level"),
        ("let a = [1, , 2];", "array holes"),
        ("let a = 1; let b = a.length;", "property access"),
        ("let a = 2 ** 3;", "operator `**`"),
        ("let a = 1; a.b = 2;", "only identifiers can be assigned"),
        ("let a = 1; let b = delete a;", "delete"),
        ("function f() { } let a = new f();", "`new`"),
        ("function f(a, a) { }", "parameter names must be distinct"),
        ("assert(1, 2);", "exactly one argument"),
        ("let a = assert(true);", "only be used as a statement"),
        ("requires(true);", "directly in a function body"),
        ("function f() { if (true) { ensures(true); } }", "directly in a function body"),
        ("function f() { invariant(true); }", "invariant() is only allowed"),
        ("function f(x) { ensures(old(x + 1)); }", "old() expects a single identifier"),
    ];
    for (src, message) in cases {
        assert_rejected(src, "unsupported", message);
    }
}

#[test]
fn resolution_errors_are_reported() {
    let cases = [
        ("let a = 1; let a = 2;", "a already defined"),
        ("let a = 1; { let a = 2; }", "a already defined"),
        ("let a = 1; function f(a) { }", "a already defined"),
        ("assert(b);", "undefined variable b"),
        ("const c = 1; c = 2;", "assignment to const"),
        ("function f() { } f = 1;", "assignment to function declaration"),
        ("function f(p) { p = 1; }", "assignment to function parameter"),
        ("let x = 0; assert(old(x) == 0);", "old() is only allowed in function postconditions"),
        ("function f(x) { requires(old(x) > 0); }", "old() is only allowed"),
        ("function f() { return pure(); }", "pure() is only allowed"),
        ("function f() { return g(); } function g() { return 1; }", "undefined variable g"),
    ];
    for (src, message) in cases {
        assert_rejected(src, "resolve", message);
    }
}

#[test]
fn syntax_errors_carry_the_parse_kind() {
    let err = reject("let = 1;");
    assert_eq!(err.kind(), "parse");
    let err = reject("let s = `x`;");
    assert_eq!(err.kind(), "parse");
}

#[test]
fn contracts_are_lifted_out_of_function_bodies() {
    let src = r#"
function max(a, b) {
  requires(typeof(a) == "number");
  requires(typeof(b) == "number");
  if (a >= b) {
    return a;
  } else {
    return b;
  }
  ensures(max(a, b) >= a);
}
"#;
    let program = program_from_source(src).expect("front-end");
    let f = program.functions().next().expect("max");
    assert_eq!(f.requires.len(), 2);
    assert_eq!(f.ensures.len(), 1);
    assert_eq!(f.body.body.len(), 1);
    assert_eq!(format_expr(&f.requires[0]), "(typeof(a) == \"number\")");
    assert_eq!(format_expr(&f.ensures[0]), "(max(a, b) >= a)");
}

#[test]
fn loop_and_program_invariants_are_collected() {
    let src = r#"
let i = 0;
invariant(i >= 0);
while (i < 5) {
  invariant(i <= 5);
  i++;
}
"#;
    let program = program_from_source(src).expect("front-end");
    assert_eq!(program.invariants.len(), 1);
    let Some(TopLevel::Stmt(Stmt::While(w))) = program.body.get(1) else {
        panic!("expected while loop");
    };
    assert_eq!(w.invariants.len(), 1);
    assert_eq!(w.body.body.len(), 1);
    assert_eq!(format_expr(&w.invariants[0]), "(i <= 5)");
}

#[test]
fn updates_and_compound_assignments_desugar() {
    let program = program_from_source("let i = 0; i++; --i; i *= 3;").expect("front-end");
    let exprs: Vec<String> = program
        .body
        .iter()
        .filter_map(|t| match t {
            TopLevel::Stmt(Stmt::Expr(e)) => Some(format_expr(e)),
            _ => None,
        })
        .collect();
    assert_eq!(
        exprs,
        ["i = (i + 1), (i - 1)", "i = (i - 1)", "i = (i * 3)"]
    );
}

#[test]
fn missing_initializer_and_else_become_undefined_and_empty() {
    let program = program_from_source("let x; if (x) x = 1;").expect("front-end");
    let Some(TopLevel::Stmt(Stmt::VarDecl(d))) = program.body.first() else {
        panic!("expected declaration");
    };
    assert_eq!(d.init.kind, ExprKind::Literal(Literal::Undefined));
    let Some(TopLevel::Stmt(Stmt::If(s))) = program.body.get(1) else {
        panic!("expected if");
    };
    assert_eq!(s.consequent.body.len(), 1);
    assert!(s.alternate.body.is_empty());
}

#[test]
fn references_and_writes_are_tracked_per_binding() {
    let src = r#"
let counter = 0;
const limit = 10;
function increment() {
  counter++;
  return limit;
}
"#;
    let program = program_from_source(src).expect("front-end");
    let by_name = |name: &str| {
        program
            .bindings
            .iter()
            .find(|(_, b)| b.name == name)
            .map(|(_, b)| b.clone())
            .expect(name)
    };
    let counter = by_name("counter");
    // `counter++` reads twice and writes once.
    assert_eq!(counter.refs.len(), 3);
    assert!(counter.is_written_to);
    let limit = by_name("limit");
    assert_eq!(limit.refs.len(), 1);
    assert!(!limit.is_written_to);
    assert!(matches!(by_name("increment").kind, BindingKind::Func { .. }));
}

#[test]
fn every_identifier_is_resolved() {
    let src = r#"
function inc(n) {
  requires(typeof(n) == "number");
  ensures(inc(n) > n);
  return n + 1;
}
let f = function (x) { return inc(x); };
let j = f(3);
"#;
    let program = program_from_source(src).expect("front-end");
    let printed = format_program(&program);
    assert!(printed.contains("let f = function (x) { return inc(x); };"), "{printed}");
    for (_, b) in program.bindings.iter() {
        assert!(!b.refs.is_empty() || b.name == "j", "{} never referenced", b.name);
    }
}

#[test]
fn resolution_is_idempotent() {
    let src = "let a = 1; function f(x) { ensures(f(x) > old(a)); a = a + x; return a; }";
    let program = program_from_source(src).expect("front-end");
    let again = resolve_program(program.clone()).expect("resolve again");
    assert_eq!(again, program);
}

#[test]
fn printed_programs_round_trip() {
    let src = r#"
let counter = 0;
invariant(typeof(counter) == "number" && counter >= 0);
function decrement() {
  ensures(old(counter) > 0 ? counter < old(counter) : counter == old(counter));
  if (counter > 0) counter--;
}
let s = "a\"b";
let t = (counter, counter = 1 || 2);
let u = - -counter;
"#;
    let first = program_from_source(src).expect("front-end");
    let printed = format_program(&first);
    let second = program_from_source(&printed).expect("printed source re-parses");
    assert_eq!(format_program(&second), printed);
    assert!(printed.contains("function decrement () {"), "{printed}");
    assert!(printed.contains("  if ((counter > 0)) {"), "{printed}");
}

fn arb_program() -> impl Strategy<Value = String> {
    let ops = prop::sample::select(vec!["+", "-", "*", "<", "===", "&&", "||"]);
    prop::collection::vec((ops, 0u32..100, any::<bool>()), 1..8).prop_map(|steps| {
        let mut src = String::from("let v0 = 0;\n");
        for (i, (op, n, reuse)) in steps.into_iter().enumerate() {
            let prev = format!("v{i}");
            let rhs = if reuse { prev.clone() } else { n.to_string() };
            src.push_str(&format!("let v{} = {prev} {op} {rhs};\n", i + 1));
            if reuse {
                src.push_str(&format!("assert({prev} === {prev});\n"));
            }
        }
        src
    })
}

proptest! {
    #[test]
    fn generated_programs_resolve_idempotently(src in arb_program()) {
        let program = program_from_source(&src).expect("front-end");
        let again = resolve_program(program.clone()).expect("resolve again");
        prop_assert_eq!(&again, &program);
        let printed = format_program(&program);
        let reparsed = program_from_source(&printed).expect("round trip");
        prop_assert_eq!(format_program(&reparsed), printed);
    }
}

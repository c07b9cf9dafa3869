use std::collections::HashMap;

use esverify_core::ir::{BindingId, ExprKind, NodeId, Program, Stmt, TopLevel};
use esverify_core::program_from_source;
use esverify_interpret::{
    replay, run_program, Entry, InterpConfig, InterpretError, Site, Value, Verdict,
};

fn run(src: &str) -> HashMap<String, Value> {
    let program = program_from_source(src).expect("front-end");
    run_program(&program, &InterpConfig::default()).expect("run")
}

fn num(n: f64) -> Value {
    Value::Number(n)
}

fn string(s: &str) -> Value {
    Value::String(s.to_string())
}

fn function(program: &Program, name: &str) -> BindingId {
    program
        .functions()
        .find(|f| f.id.name == name)
        .and_then(|f| f.id.binding())
        .expect(name)
}

fn param(program: &Program, func: &str, index: usize) -> BindingId {
    program
        .functions()
        .find(|f| f.id.name == func)
        .and_then(|f| f.params[index].binding())
        .expect("param")
}

fn top_level_asserts(program: &Program) -> Vec<NodeId> {
    program
        .body
        .iter()
        .filter_map(|t| match t {
            TopLevel::Stmt(Stmt::Assert(a)) => Some(a.id),
            _ => None,
        })
        .collect()
}

#[test]
fn operators_follow_javascript() {
    let g = run(r#"
let a = 1 + "2";
let b = "3" * "4";
let c = [1, 2] + "";
let d = typeof null;
let e = 7 % 3;
let f = -7 >> 1;
let h = 0 || "x";
let i = 1 && 0;
let j = null == undefined;
let k = "10" < 9;
let l = "b" > "a";
let m = 1 / 0;
let n = ~5;
let o = -1 >>> 28;
let p = void 1;
"#);
    assert_eq!(g["a"], string("12"));
    assert_eq!(g["b"], num(12.0));
    assert_eq!(g["c"], string("1,2"));
    assert_eq!(g["d"], string("object"));
    assert_eq!(g["e"], num(1.0));
    assert_eq!(g["f"], num(-4.0));
    assert_eq!(g["h"], string("x"));
    assert_eq!(g["i"], num(0.0));
    assert_eq!(g["j"], Value::Bool(true));
    assert_eq!(g["k"], Value::Bool(false));
    assert_eq!(g["l"], Value::Bool(true));
    assert_eq!(g["m"], num(f64::INFINITY));
    assert_eq!(g["n"], num(-6.0));
    assert_eq!(g["o"], num(15.0));
    assert_eq!(g["p"], Value::Undefined);
}

#[test]
fn loops_calls_and_closures() {
    let g = run(r#"
function fib(n) {
  if (n <= 1) return 1;
  return fib(n - 1) + fib(n - 2);
}
let s = 0;
let i = 0;
while (i < 5) {
  i++;
  s = s + i;
}
let add = function (x) { return function (y) { return x + y; }; };
let seven = add(3)(4);
let f = fib(6);
"#);
    assert_eq!(g["s"], num(15.0));
    assert_eq!(g["i"], num(5.0));
    assert_eq!(g["seven"], num(7.0));
    assert_eq!(g["f"], num(13.0));
}

#[test]
fn failing_assertion_is_reported() {
    let program = program_from_source("let i = 3; assert(i < 2);").expect("front-end");
    let err = run_program(&program, &InterpConfig::default()).expect_err("violation");
    assert!(matches!(err, InterpretError::Violation { .. }), "{err}");
    assert_eq!(err.to_string(), "(i < 2) does not hold");
}

#[test]
fn step_budget_is_enforced() {
    let program =
        program_from_source("let i = 0; while (true) { i = i + 1; }").expect("front-end");
    let cfg = InterpConfig {
        fuel: 1_000,
        ..InterpConfig::default()
    };
    let err = run_program(&program, &cfg).expect_err("out of fuel");
    assert!(matches!(err, InterpretError::OutOfFuel(1_000)));
}

#[test]
fn replay_from_top_level_targets_one_assert() {
    let program =
        program_from_source("let i = 0; assert(i < 1); i = 3; assert(i < 2);").expect("front-end");
    let asserts = top_level_asserts(&program);
    let cfg = InterpConfig::default();
    let none = HashMap::new();
    assert_eq!(
        replay(&program, &cfg, Entry::TopLevel, Site::Assert(asserts[1]), &none),
        Verdict::Violated
    );
    // The second assert fails before the run completes, which is not the target.
    assert!(matches!(
        replay(&program, &cfg, Entry::TopLevel, Site::Assert(asserts[0]), &none),
        Verdict::Undecided(_)
    ));
}

#[test]
fn loop_without_invariant_passes_concretely() {
    let program = program_from_source("let i = 0; while (i < 5) { i++; } assert(i === 5);")
        .expect("front-end");
    let site = Site::Assert(top_level_asserts(&program)[0]);
    let verdict = replay(
        &program,
        &InterpConfig::default(),
        Entry::TopLevel,
        site,
        &HashMap::new(),
    );
    assert_eq!(verdict, Verdict::Passed);
}

#[test]
fn coercing_counterexample_passes_concretely() {
    let src = r#"
function max(a, b) {
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
    let max = function(&program, "max");
    let inputs = HashMap::from([
        (param(&program, "max", 0), Value::Bool(false)),
        (param(&program, "max", 1), num(0.0)),
    ]);
    let verdict = replay(
        &program,
        &InterpConfig::default(),
        Entry::Function(max),
        Site::Ensures(max, 0),
        &inputs,
    );
    assert_eq!(verdict, Verdict::Passed);
}

#[test]
fn buggy_fibonacci_violates_its_postcondition() {
    let src = r#"
function fib(n) {
  requires(typeof(n) == "number");
  requires(n >= 0);
  if (n <= 1) return n;
  return fib(n - 1) + fib(n - 2);
  ensures(fib(n) >= n);
}
"#;
    let program = program_from_source(src).expect("front-end");
    let fib = function(&program, "fib");
    let inputs = HashMap::from([(param(&program, "fib", 0), num(2.0))]);
    let verdict = replay(
        &program,
        &InterpConfig::default(),
        Entry::Function(fib),
        Site::Ensures(fib, 0),
        &inputs,
    );
    assert_eq!(verdict, Verdict::Violated);
}

#[test]
fn nested_call_violates_callee_precondition() {
    let src = r#"
function inc(n) {
  requires(typeof(n) == "number");
  return n + 1;
  ensures(inc(n) > n);
}
function inc2(n) {
  return inc(inc(n));
}
"#;
    let program = program_from_source(src).expect("front-end");
    let inc2 = program.functions().find(|f| f.id.name == "inc2").expect("inc2");
    let Some(Stmt::Return(ret)) = inc2.body.body.first() else {
        panic!("expected return");
    };
    let ExprKind::Call { arguments, .. } = &ret.argument.kind else {
        panic!("expected call");
    };
    let ExprKind::Call { id: inner, .. } = &arguments[0].kind else {
        panic!("expected inner call");
    };
    let inc2_id = function(&program, "inc2");
    let inputs = HashMap::from([(param(&program, "inc2", 0), Value::Bool(true))]);
    let verdict = replay(
        &program,
        &InterpConfig::default(),
        Entry::Function(inc2_id),
        Site::Requires {
            call: *inner,
            index: 0,
        },
        &inputs,
    );
    assert_eq!(verdict, Verdict::Violated);
}

#[test]
fn calling_a_non_function_is_undecided() {
    let src = "function apply(f) { return f(1); }";
    let program = program_from_source(src).expect("front-end");
    let apply = function(&program, "apply");
    let inputs = HashMap::from([(param(&program, "apply", 0), num(3.0))]);
    let verdict = replay(
        &program,
        &InterpConfig::default(),
        Entry::Function(apply),
        Site::Ensures(apply, 0),
        &inputs,
    );
    assert!(matches!(verdict, Verdict::Undecided(msg) if msg.contains("is not a function")));
}

#[test]
fn counter_postconditions_use_entry_values() {
    let src = r#"
let counter = 0;
invariant(counter >= 0);
function decrement() {
  if (counter > 0) counter--;
  ensures(old(counter) > 0 ? counter < old(counter) : counter == old(counter));
}
"#;
    let program = program_from_source(src).expect("front-end");
    let decrement = function(&program, "decrement");
    let counter = program.globals()[0];
    for start in [0.0, 1.0, 5.0] {
        let inputs = HashMap::from([(counter, num(start))]);
        let verdict = replay(
            &program,
            &InterpConfig::default(),
            Entry::Function(decrement),
            Site::Ensures(decrement, 0),
            &inputs,
        );
        assert_eq!(verdict, Verdict::Passed, "counter = {start}");
    }
}

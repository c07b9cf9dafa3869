use esverify_ast::{
    AssignOp, BinaryOp, ExprKind, FunctionBody, Literal, LogicalOp, Pattern, Stmt, UpdateOp,
    VarKind,
};
use esverify_parse::{parse_expr, parse_source};

#[test]
fn multiplication_binds_tighter_than_addition() {
    let e = parse_expr("1 + 2 * 3").expect("parse");
    let ExprKind::Binary { op, right, .. } = e.kind else {
        panic!("expected binary");
    };
    assert_eq!(op, BinaryOp::Add);
    assert!(matches!(right.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
}

#[test]
fn logical_and_binds_tighter_than_or() {
    let e = parse_expr("a || b && c").expect("parse");
    let ExprKind::Logical { op, right, .. } = e.kind else {
        panic!("expected logical");
    };
    assert_eq!(op, LogicalOp::Or);
    assert!(matches!(right.kind, ExprKind::Logical { op: LogicalOp::And, .. }));
}

#[test]
fn comparison_is_left_associative_with_equality_lower() {
    let e = parse_expr("a < b == c").expect("parse");
    let ExprKind::Binary { op, left, .. } = e.kind else {
        panic!("expected binary");
    };
    assert_eq!(op, BinaryOp::Eq);
    assert!(matches!(left.kind, ExprKind::Binary { op: BinaryOp::Lt, .. }));
}

#[test]
fn conditional_and_assignment_are_right_associative() {
    let e = parse_expr("x = y = c ? 1 : 2").expect("parse");
    let ExprKind::Assign { op, value, .. } = e.kind else {
        panic!("expected assignment");
    };
    assert_eq!(op, AssignOp::Assign);
    let ExprKind::Assign { value: inner, .. } = value.kind else {
        panic!("expected nested assignment");
    };
    assert!(matches!(inner.kind, ExprKind::Conditional { .. }));
}

#[test]
fn compound_assignment_and_updates() {
    let e = parse_expr("x += 1").expect("parse");
    assert!(matches!(
        e.kind,
        ExprKind::Assign { op: AssignOp::Compound(BinaryOp::Add), .. }
    ));
    let e = parse_expr("i++").expect("parse");
    assert!(matches!(
        e.kind,
        ExprKind::Update { op: UpdateOp::Incr, prefix: false, .. }
    ));
    let e = parse_expr("--i").expect("parse");
    assert!(matches!(
        e.kind,
        ExprKind::Update { op: UpdateOp::Decr, prefix: true, .. }
    ));
}

#[test]
fn typeof_with_and_without_parens() {
    let a = parse_expr("typeof(a) == 'number'").expect("parse");
    let b = parse_expr("typeof a == 'number'").expect("parse");
    for e in [a, b] {
        let ExprKind::Binary { left, right, .. } = e.kind else {
            panic!("expected binary");
        };
        assert!(matches!(left.kind, ExprKind::Unary { .. }));
        assert_eq!(right.kind, ExprKind::Literal(Literal::String("number".to_string())));
    }
}

#[test]
fn function_declaration_with_contracts_parses() {
    let src = r#"
function max(a, b) {
  requires(typeof(a) == 'number');
  requires(typeof(b) == 'number');
  if (a >= b) {
    return a;
  } else {
    return b;
  }
  ensures(max(a, b) >= a);
}
"#;
    let program = parse_source(src).expect("parse");
    assert_eq!(program.body.len(), 1);
    let Stmt::Function(f) = &program.body[0] else {
        panic!("expected function");
    };
    assert_eq!(f.id.as_ref().map(|i| i.node.as_str()), Some("max"));
    assert_eq!(f.params.len(), 2);
    let FunctionBody::Block(body) = &f.body else {
        panic!("expected block body");
    };
    assert_eq!(body.body.len(), 4);
}

#[test]
fn automatic_semicolon_insertion_at_line_breaks() {
    let program = parse_source("let i = 0\ni++\nassert(i === 1)").expect("parse");
    assert_eq!(program.body.len(), 3);
}

#[test]
fn return_followed_by_newline_has_no_argument() {
    let program = parse_source("function f() {\n  return\n  1\n}").expect("parse");
    let Stmt::Function(f) = &program.body[0] else {
        panic!("expected function");
    };
    let FunctionBody::Block(body) = &f.body else {
        panic!("expected block");
    };
    assert!(matches!(&body.body[0], Stmt::Return(r) if r.argument.is_none()));
    assert_eq!(body.body.len(), 2);
}

#[test]
fn missing_semicolon_on_same_line_is_an_error() {
    let err = parse_source("let a = 1 let b = 2").expect_err("expected error");
    assert!(err.to_string().contains("expected `;`"), "{err}");
}

#[test]
fn arrow_functions_parse_as_functions() {
    let e = parse_expr("(a, b) => { return a; }").expect("parse");
    let ExprKind::Function(f) = e.kind else {
        panic!("expected function");
    };
    assert!(f.arrow);
    assert_eq!(f.params.len(), 2);

    let e = parse_expr("x => x + 1").expect("parse");
    let ExprKind::Function(f) = e.kind else {
        panic!("expected function");
    };
    assert!(matches!(f.body, FunctionBody::Expr(_)));
}

#[test]
fn unsupported_shapes_still_parse() {
    let src = r#"
var v = this;
const o = { a: 1, b };
const r = /ab+c/g;
let [x, y] = [1, 2];
function g(a = 1, ...rest) { return a.b[0]; }
function* gen() {}
for (let i = 0; i < 3; i++) { continue; }
do { break; } while (false);
try { throw new Error("x"); } catch (e) { } finally { }
"#;
    let program = parse_source(src).expect("parse");
    assert_eq!(program.body.len(), 9);
    let Stmt::VarDecl(d) = &program.body[0] else {
        panic!("expected var");
    };
    assert_eq!(d.kind, VarKind::Var);
    let Stmt::VarDecl(d) = &program.body[3] else {
        panic!("expected let");
    };
    assert!(matches!(d.declarators[0].id, Pattern::Array { .. }));
    let Stmt::Function(g) = &program.body[4] else {
        panic!("expected function");
    };
    assert!(g.params[0].default.is_some());
    assert!(g.rest.is_some());
}

#[test]
fn array_literal_with_hole() {
    let e = parse_expr("[1, , 2]").expect("parse");
    let ExprKind::Array(elems) = e.kind else {
        panic!("expected array");
    };
    assert_eq!(elems.len(), 3);
    assert!(elems[1].is_none());
}

#[test]
fn spans_cover_whole_expression() {
    let src = "foo(a, b)";
    let e = parse_expr(src).expect("parse");
    assert_eq!(e.span.offset(), 0);
    assert_eq!(e.span.len(), src.len());
}

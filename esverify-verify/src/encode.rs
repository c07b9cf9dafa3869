#![forbid(unsafe_code)]

//! JavaScript operators as terms over the `JSVal` datatype.

use esverify_core::ir::{BinaryOp, UnaryOp};

use crate::smt::Term;

pub fn undefined() -> Term {
    Term::app("jsundefined", vec![])
}

pub fn null() -> Term {
    Term::app("jsnull", vec![])
}

pub fn boolean(b: Term) -> Term {
    Term::app("jsbool", vec![b])
}

pub fn string(s: &str) -> Term {
    Term::app("jsstr", vec![Term::Str(s.to_string())])
}

pub fn function(index: usize) -> Term {
    Term::app("jsfun", vec![Term::Int(index as i128)])
}

/// `None` for values outside the integer model (fractions, huge magnitudes).
pub fn number(n: f64) -> Option<Term> {
    if n.fract() != 0.0 || !n.is_finite() || n.abs() > 1e30 {
        return None;
    }
    Some(Term::app("jsnum", vec![Term::Int(n as i128)]))
}

pub fn is_number(v: Term) -> Term {
    Term::app("is-jsnum", vec![v])
}

pub fn is_function(v: Term) -> Term {
    Term::app("is-jsfun", vec![v])
}

/// Boolean view of a value. `truthy(jsbool b)` folds to `b`.
pub fn truthy(v: Term) -> Term {
    match v {
        Term::App(f, mut args) if f == "jsbool" && args.len() == 1 => args.remove(0),
        other => Term::app("truthy", vec![other]),
    }
}

pub fn unary(op: UnaryOp, v: Term) -> Term {
    match op {
        UnaryOp::Minus => Term::app("jsneg", vec![v]),
        UnaryOp::Plus => Term::app("jstonum", vec![v]),
        UnaryOp::Not => boolean(Term::not(truthy(v))),
        UnaryOp::BitNot => Term::app("jsnum", vec![Term::app("jsbitnot", vec![v])]),
        UnaryOp::Typeof => Term::app("jsstr", vec![Term::app("jstypeof", vec![v])]),
        UnaryOp::Void => undefined(),
    }
}

pub fn binary(op: BinaryOp, l: Term, r: Term) -> Term {
    let int = |f: &str, l: Term, r: Term| Term::app("jsnum", vec![Term::app(f, vec![l, r])]);
    match op {
        BinaryOp::Eq => boolean(Term::app("jslooseeq", vec![l, r])),
        BinaryOp::NotEq => boolean(Term::not(Term::app("jslooseeq", vec![l, r]))),
        BinaryOp::StrictEq => boolean(Term::eq(l, r)),
        BinaryOp::StrictNotEq => boolean(Term::not(Term::eq(l, r))),
        BinaryOp::Lt => boolean(Term::app("jslt", vec![l, r])),
        BinaryOp::Le => boolean(Term::app("jsleq", vec![l, r])),
        BinaryOp::Gt => boolean(Term::app("jslt", vec![r, l])),
        BinaryOp::Ge => boolean(Term::app("jsleq", vec![r, l])),
        BinaryOp::Add => Term::app("jsplus", vec![l, r]),
        BinaryOp::Sub => Term::app("jsminus", vec![l, r]),
        BinaryOp::Mul => Term::app("jstimes", vec![l, r]),
        BinaryOp::Div => Term::app("jsdiv", vec![l, r]),
        BinaryOp::Mod => Term::app("jsmod", vec![l, r]),
        BinaryOp::Shl => int("jsshl", l, r),
        BinaryOp::Shr => int("jsshr", l, r),
        BinaryOp::UShr => int("jsushr", l, r),
        BinaryOp::BitOr => int("jsbitor", l, r),
        BinaryOp::BitXor => int("jsbitxor", l, r),
        BinaryOp::BitAnd => int("jsbitand", l, r),
    }
}

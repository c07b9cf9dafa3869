#![forbid(unsafe_code)]

//! SMT-LIB 2 terms and the fixed prelude every script starts with.

use std::collections::HashSet;
use std::fmt;

/// Universal value datatype plus the JS operator semantics the encoder
/// relies on. Numbers are integers. Strings convert to numbers through the
/// uninterpreted `jsstrnum`/`jsstrnan` pair, except `""` which is 0. A
/// `/` whose quotient is not an integer, and anything touching objects or
/// NaN, falls back to an uninterpreted function (`*_u`).
pub const PRELUDE: &str = r#"(set-option :produce-models true)
(declare-sort Arr 0)
(declare-datatypes ((JSVal 0)) (((jsnum (numv Int)) (jsbool (boolv Bool)) (jsstr (strv String)) (jsnull) (jsundefined) (jsfun (funv Int)) (jsarr (arrv Arr)))))
(declare-fun arrlength (Arr) Int)
(declare-fun arrelems (Arr Int) JSVal)
(define-fun truthy ((v JSVal)) Bool
  (ite (is-jsnum v) (not (= (numv v) 0))
  (ite (is-jsbool v) (boolv v)
  (ite (is-jsstr v) (not (= (strv v) ""))
  (ite (is-jsnull v) false
  (not (is-jsundefined v)))))))
(define-fun jstypeof ((v JSVal)) String
  (ite (is-jsnum v) "number"
  (ite (is-jsbool v) "boolean"
  (ite (is-jsstr v) "string"
  (ite (is-jsundefined v) "undefined"
  (ite (is-jsfun v) "function" "object"))))))
(define-fun jsobject ((v JSVal)) Bool (or (is-jsfun v) (is-jsarr v)))
(define-fun jsnullish ((v JSVal)) Bool (or (is-jsnull v) (is-jsundefined v)))
(declare-fun jsstrnan (String) Bool)
(declare-fun jsstrnum (String) Int)
(define-fun jsnan ((v JSVal)) Bool
  (ite (is-jsundefined v) true
  (ite (is-jsstr v) (and (not (= (strv v) "")) (jsstrnan (strv v))) false)))
(define-fun jsnumval ((v JSVal)) Int
  (ite (is-jsnum v) (numv v)
  (ite (is-jsbool v) (ite (boolv v) 1 0)
  (ite (is-jsstr v) (ite (= (strv v) "") 0 (jsstrnum (strv v))) 0))))
(define-fun jsnumeric ((v JSVal)) Bool (and (not (jsobject v)) (not (jsnan v))))
(declare-fun jslooseeq_u (JSVal JSVal) Bool)
(define-fun jslooseeq ((a JSVal) (b JSVal)) Bool
  (ite (jsnullish a) (jsnullish b)
  (ite (jsnullish b) false
  (ite (and (is-jsstr a) (is-jsstr b)) (= a b)
  (ite (and (jsobject a) (jsobject b)) (= a b)
  (ite (or (jsobject a) (jsobject b)) (jslooseeq_u a b)
  (and (jsnumeric a) (jsnumeric b) (= (jsnumval a) (jsnumval b)))))))))
(declare-fun jslt_u (JSVal JSVal) Bool)
(define-fun jslt ((a JSVal) (b JSVal)) Bool
  (ite (and (is-jsstr a) (is-jsstr b)) (str.< (strv a) (strv b))
  (ite (or (jsobject a) (jsobject b)) (jslt_u a b)
  (and (jsnumeric a) (jsnumeric b) (< (jsnumval a) (jsnumval b))))))
(declare-fun jsleq_u (JSVal JSVal) Bool)
(define-fun jsleq ((a JSVal) (b JSVal)) Bool
  (ite (and (is-jsstr a) (is-jsstr b)) (str.<= (strv a) (strv b))
  (ite (or (jsobject a) (jsobject b)) (jsleq_u a b)
  (and (jsnumeric a) (jsnumeric b) (<= (jsnumval a) (jsnumval b))))))
(declare-fun jsplus_u (JSVal JSVal) JSVal)
(define-fun jsplus ((a JSVal) (b JSVal)) JSVal
  (ite (and (is-jsstr a) (is-jsstr b)) (jsstr (str.++ (strv a) (strv b)))
  (ite (and (jsnumeric a) (jsnumeric b) (not (is-jsstr a)) (not (is-jsstr b))) (jsnum (+ (jsnumval a) (jsnumval b)))
  (jsplus_u a b))))
(declare-fun jsminus_u (JSVal JSVal) JSVal)
(define-fun jsminus ((a JSVal) (b JSVal)) JSVal
  (ite (and (jsnumeric a) (jsnumeric b)) (jsnum (- (jsnumval a) (jsnumval b))) (jsminus_u a b)))
(declare-fun jstimes_u (JSVal JSVal) JSVal)
(define-fun jstimes ((a JSVal) (b JSVal)) JSVal
  (ite (and (jsnumeric a) (jsnumeric b)) (jsnum (* (jsnumval a) (jsnumval b))) (jstimes_u a b)))
(declare-fun jsdiv_u (JSVal JSVal) JSVal)
(define-fun jsdiv ((a JSVal) (b JSVal)) JSVal
  (ite (and (jsnumeric a) (jsnumeric b) (not (= (jsnumval b) 0)) (= (mod (jsnumval a) (jsnumval b)) 0))
    (jsnum (div (jsnumval a) (jsnumval b)))
    (jsdiv_u a b)))
(declare-fun jsmod_u (JSVal JSVal) JSVal)
(define-fun jsmod ((a JSVal) (b JSVal)) JSVal
  (ite (and (jsnumeric a) (jsnumeric b) (>= (jsnumval a) 0) (> (jsnumval b) 0)) (jsnum (mod (jsnumval a) (jsnumval b))) (jsmod_u a b)))
(declare-fun jsneg_u (JSVal) JSVal)
(define-fun jsneg ((a JSVal)) JSVal
  (ite (jsnumeric a) (jsnum (- (jsnumval a))) (jsneg_u a)))
(declare-fun jstonum_u (JSVal) JSVal)
(define-fun jstonum ((a JSVal)) JSVal
  (ite (jsnumeric a) (jsnum (jsnumval a)) (jstonum_u a)))
(declare-fun jsbitnot (JSVal) Int)
(declare-fun jsshl (JSVal JSVal) Int)
(declare-fun jsshr (JSVal JSVal) Int)
(declare-fun jsushr (JSVal JSVal) Int)
(declare-fun jsbitor (JSVal JSVal) Int)
(declare-fun jsbitxor (JSVal JSVal) Int)
(declare-fun jsbitand (JSVal JSVal) Int)
"#;

/// Symbols a program identifier must never be emitted as.
const RESERVED: &[&str] = &[
    "Arr", "JSVal", "Int", "Bool", "String", "jsnum", "numv", "jsbool", "boolv", "jsstr", "strv",
    "jsnull", "jsundefined", "jsfun", "funv", "jsarr", "arrv", "arrlength", "arrelems", "truthy",
    "jstypeof", "jsobject", "jsnullish", "jsstrnan", "jsstrnum", "jsnan", "jsnumval", "jsnumeric",
    "jslooseeq", "jslooseeq_u", "jslt", "jslt_u", "jsleq", "jsleq_u", "jsplus", "jsplus_u", "jsminus", "jsminus_u",
    "jstimes", "jstimes_u", "jsdiv", "jsdiv_u", "jsmod", "jsmod_u", "jsneg", "jsneg_u", "jstonum",
    "jstonum_u", "jsbitnot", "jsshl", "jsshr", "jsushr", "jsbitor", "jsbitxor", "jsbitand",
    "true", "false", "and", "or", "not", "xor", "ite", "distinct", "let", "forall", "exists",
    "match", "as", "par", "div", "mod", "abs", "select", "store", "_", "!",
];

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Term {
    Bool(bool),
    Int(i128),
    Str(String),
    Sym(String),
    App(String, Vec<Term>),
}

impl Term {
    pub fn sym(name: impl Into<String>) -> Term {
        Term::Sym(name.into())
    }

    pub fn app(f: impl Into<String>, args: Vec<Term>) -> Term {
        Term::App(f.into(), args)
    }

    pub fn not(t: Term) -> Term {
        match t {
            Term::Bool(b) => Term::Bool(!b),
            Term::App(f, mut args) if f == "not" && args.len() == 1 => args.remove(0),
            other => Term::app("not", vec![other]),
        }
    }

    pub fn and(terms: Vec<Term>) -> Term {
        let mut out = Vec::with_capacity(terms.len());
        for t in terms {
            match t {
                Term::Bool(true) => {}
                Term::Bool(false) => return Term::Bool(false),
                Term::App(f, args) if f == "and" => out.extend(args),
                other => out.push(other),
            }
        }
        match out.len() {
            0 => Term::Bool(true),
            1 => out.remove(0),
            _ => Term::App("and".to_string(), out),
        }
    }

    pub fn or(terms: Vec<Term>) -> Term {
        let mut out = Vec::with_capacity(terms.len());
        for t in terms {
            match t {
                Term::Bool(false) => {}
                Term::Bool(true) => return Term::Bool(true),
                other => out.push(other),
            }
        }
        match out.len() {
            0 => Term::Bool(false),
            1 => out.remove(0),
            _ => Term::App("or".to_string(), out),
        }
    }

    pub fn implies(a: Term, b: Term) -> Term {
        match (a, b) {
            (Term::Bool(true), b) => b,
            (Term::Bool(false), _) | (_, Term::Bool(true)) => Term::Bool(true),
            (a, b) => Term::app("=>", vec![a, b]),
        }
    }

    pub fn eq(a: Term, b: Term) -> Term {
        if a == b {
            return Term::Bool(true);
        }
        Term::app("=", vec![a, b])
    }

    pub fn ite(c: Term, a: Term, b: Term) -> Term {
        match c {
            Term::Bool(true) => a,
            Term::Bool(false) => b,
            _ if a == b => a,
            c => Term::app("ite", vec![c, a, b]),
        }
    }

    pub fn is_false(&self) -> bool {
        matches!(self, Term::Bool(false))
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Bool(b) => write!(f, "{b}"),
            Term::Int(n) if *n < 0 => write!(f, "(- {})", n.unsigned_abs()),
            Term::Int(n) => write!(f, "{n}"),
            Term::Str(s) => f.write_str(&string_literal(s)),
            Term::Sym(s) => f.write_str(s),
            Term::App(name, args) if args.is_empty() => f.write_str(name),
            Term::App(name, args) => {
                write!(f, "({name}")?;
                for a in args {
                    write!(f, " {a}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// SMT-LIB 2.6 string literal. Quotes double; everything outside printable
/// ASCII and the backslash use `\u{..}` escapes.
pub fn string_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\"\""),
            '\\' => out.push_str("\\u{5c}"),
            ' '..='~' => out.push(c),
            other => out.push_str(&format!("\\u{{{:x}}}", other as u32)),
        }
    }
    out.push('"');
    out
}

/// Issues SMT symbols that are unique within one script.
#[derive(Clone, Debug)]
pub struct Namer {
    taken: HashSet<String>,
    next: u32,
}

impl Default for Namer {
    fn default() -> Self {
        Self {
            taken: RESERVED.iter().map(|s| s.to_string()).collect(),
            next: 0,
        }
    }
}

impl Namer {
    /// The identifier itself when still free, otherwise a fresh variant.
    pub fn exact(&mut self, name: &str) -> String {
        let base = sanitize(name);
        if self.taken.insert(base.clone()) {
            return base;
        }
        self.fresh(name)
    }

    pub fn fresh(&mut self, name: &str) -> String {
        let base = sanitize(name);
        loop {
            self.next += 1;
            let candidate = format!("{base}@{}", self.next);
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '$' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connectives_simplify() {
        let x = Term::sym("x");
        assert_eq!(Term::and(vec![Term::Bool(true), x.clone()]), x);
        assert_eq!(Term::or(vec![Term::Bool(false), Term::Bool(false)]), Term::Bool(false));
        assert_eq!(Term::implies(Term::Bool(true), x.clone()), x);
        assert_eq!(Term::not(Term::not(x.clone())), x);
        assert_eq!(Term::ite(Term::Bool(false), Term::Int(1), Term::Int(2)), Term::Int(2));
    }

    #[test]
    fn terms_render_as_sexprs() {
        let t = Term::app("jsnum", vec![Term::Int(-3)]);
        assert_eq!(t.to_string(), "(jsnum (- 3))");
        assert_eq!(Term::app("increment", vec![]).to_string(), "increment");
        assert_eq!(Term::Str("a\"b\\é".into()).to_string(), "\"a\"\"b\\u{5c}\\u{e9}\"");
    }

    #[test]
    fn namer_avoids_reserved_and_repeated_symbols() {
        let mut n = Namer::default();
        assert_eq!(n.exact("counter"), "counter");
        assert_ne!(n.exact("counter"), "counter");
        assert_ne!(n.exact("truthy"), "truthy");
        assert!(n.fresh("i").starts_with("i@"));
    }

    fn definition(name: &str) -> &'static str {
        let start = PRELUDE
            .find(&format!("(define-fun {name} "))
            .unwrap_or_else(|| panic!("no definition of {name}"));
        let rest = &PRELUDE[start..];
        let end = rest[1..].find("\n(").map_or(rest.len(), |i| i + 1);
        &rest[..end]
    }

    #[test]
    fn prelude_symbols_are_reserved() {
        for line in PRELUDE.lines() {
            let Some(decl) = line
                .strip_prefix("(declare-fun ")
                .or_else(|| line.strip_prefix("(define-fun "))
            else {
                continue;
            };
            let name = decl.split_whitespace().next().unwrap_or_default();
            assert!(RESERVED.contains(&name), "{name} is not reserved");
        }
    }

    #[test]
    fn cross_type_comparisons_are_never_decided_false() {
        assert!(definition("jslooseeq").contains("(jslooseeq_u a b)"));
        assert!(definition("jslt").contains("(jslt_u a b)"));
        assert!(definition("jsleq").contains("(jsleq_u a b)"));
        for name in ["jslooseeq", "jslt", "jsleq"] {
            assert!(!definition(name).contains(" false)"), "{name}");
        }
    }

    #[test]
    fn primitives_convert_to_numbers() {
        let numval = definition("jsnumval");
        assert!(numval.contains("(ite (is-jsbool v) (ite (boolv v) 1 0)"));
        assert!(numval.contains("(ite (= (strv v) \"\") 0"));
        assert!(definition("jsnan").contains("(ite (is-jsundefined v) true"));
    }

    #[test]
    fn division_is_exact_only_for_integral_quotients() {
        let div = definition("jsdiv");
        assert!(div.contains("(= (mod (jsnumval a) (jsnumval b)) 0)"));
        assert!(div.contains("(jsdiv_u a b)"));
    }
}

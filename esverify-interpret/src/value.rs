#![forbid(unsafe_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use esverify_core::ir::{BindingId, NodeId};

/// A chain of variable frames. Binding ids are unique per program, so a
/// frame is keyed by id rather than by name.
#[derive(Debug, Default)]
pub struct Frame {
    pub(crate) vars: RefCell<HashMap<BindingId, Value>>,
    pub(crate) parent: Option<Env>,
}

pub type Env = Rc<Frame>;

impl Frame {
    pub(crate) fn child(parent: &Env) -> Env {
        Rc::new(Frame {
            vars: RefCell::new(HashMap::new()),
            parent: Some(Rc::clone(parent)),
        })
    }

    pub(crate) fn lookup(&self, id: BindingId) -> Option<Value> {
        if let Some(v) = self.vars.borrow().get(&id) {
            return Some(v.clone());
        }
        self.parent.as_ref().and_then(|p| p.lookup(id))
    }

    /// Overwrites the innermost frame that holds `id`.
    pub(crate) fn assign(&self, id: BindingId, value: Value) -> bool {
        if let Some(slot) = self.vars.borrow_mut().get_mut(&id) {
            *slot = value;
            return true;
        }
        match &self.parent {
            Some(p) => p.assign(id, value),
            None => false,
        }
    }

    pub(crate) fn define(&self, id: BindingId, value: Value) {
        self.vars.borrow_mut().insert(id, value);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FuncRef {
    Decl(BindingId),
    Expr(NodeId),
    /// A function handle from a solver model that names no declaration.
    Opaque(i64),
}

#[derive(Clone, Debug)]
pub struct Closure {
    pub func: FuncRef,
    pub(crate) env: Option<Env>,
}

impl Closure {
    pub fn decl(binding: BindingId) -> Self {
        Self {
            func: FuncRef::Decl(binding),
            env: None,
        }
    }

    pub fn opaque(handle: i64) -> Self {
        Self {
            func: FuncRef::Opaque(handle),
            env: None,
        }
    }
}

impl PartialEq for Closure {
    fn eq(&self, other: &Self) -> bool {
        if self.func != other.func {
            return false;
        }
        match (&self.env, &other.env) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

#[derive(Clone, Debug)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Rc<Vec<Value>>),
    Function(Closure),
}

impl PartialEq for Value {
    /// Structural comparison, used for models and tests. Arrays compare by
    /// content here; the interpreter uses [`strict_equals`] for `===`.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null | Value::Array(_) => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Function(_) => "function",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Function(_) => true,
        }
    }

    fn is_primitive(&self) -> bool {
        !matches!(self, Value::Array(_) | Value::Function(_))
    }

    /// Objects convert through their string form; arrays join their elements.
    pub fn to_primitive(&self) -> Value {
        match self {
            Value::Array(_) | Value::Function(_) => Value::String(self.to_js_string()),
            other => other.clone(),
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::String(s) => string_to_number(s),
            Value::Array(_) => self.to_primitive().to_number(),
            Value::Function(_) => f64::NAN,
        }
    }

    pub fn to_js_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::String(s) => s.clone(),
            Value::Array(elems) => elems
                .iter()
                .map(|e| match e {
                    Value::Undefined | Value::Null => String::new(),
                    other => other.to_js_string(),
                })
                .collect::<Vec<_>>()
                .join(","),
            Value::Function(_) => "function () { [code] }".to_string(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Undefined => serde_json::Value::String("undefined".to_string()),
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or_else(|| serde_json::Value::String(number_to_string(*n))),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(elems) => {
                serde_json::Value::Array(elems.iter().map(Value::to_json).collect())
            }
            Value::Function(_) => serde_json::Value::String("<function>".to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s:?}"),
            Value::Array(elems) => {
                f.write_str("[")?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{e}")?;
                }
                f.write_str("]")
            }
            Value::Function(_) => f.write_str("<function>"),
            other => f.write_str(&other.to_js_string()),
        }
    }
}

pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        (if n > 0.0 { "Infinity" } else { "-Infinity" }).to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else {
        format!("{n}")
    }
}

fn string_to_number(s: &str) -> f64 {
    let t = s.trim();
    if t.is_empty() {
        return 0.0;
    }
    match t {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    for (prefix, radix) in [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)] {
        if let Some(digits) = t.strip_prefix(prefix) {
            return u64::from_str_radix(digits, radix)
                .map(|v| v as f64)
                .unwrap_or(f64::NAN);
        }
    }
    // Rust accepts spellings such as `inf` and `nan` that JS does not.
    if !t
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
    {
        return f64::NAN;
    }
    t.parse::<f64>().unwrap_or(f64::NAN)
}

pub fn to_int32(n: f64) -> i32 {
    to_uint32(n) as i32
}

pub fn to_uint32(n: f64) -> u32 {
    if !n.is_finite() {
        return 0;
    }
    let m = n.trunc().rem_euclid(4_294_967_296.0);
    m as u32
}

/// `===`
pub fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => Rc::ptr_eq(x, y),
        _ => a == b,
    }
}

/// `==` with the usual coercions.
pub fn loose_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
        (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
        _ if std::mem::discriminant(a) == std::mem::discriminant(b) => strict_equals(a, b),
        (Value::Number(x), Value::String(_)) => *x == b.to_number(),
        (Value::String(_), Value::Number(y)) => a.to_number() == *y,
        (Value::Bool(_), _) => loose_equals(&Value::Number(a.to_number()), b),
        (_, Value::Bool(_)) => loose_equals(a, &Value::Number(b.to_number())),
        _ if !a.is_primitive() && b.is_primitive() => loose_equals(&a.to_primitive(), b),
        _ if a.is_primitive() && !b.is_primitive() => loose_equals(a, &b.to_primitive()),
        _ => false,
    }
}

/// Abstract relational comparison `a < b`; `None` when either side is NaN.
pub fn less_than(a: &Value, b: &Value) -> Option<bool> {
    let (pa, pb) = (a.to_primitive(), b.to_primitive());
    if let (Value::String(x), Value::String(y)) = (&pa, &pb) {
        return Some(x.encode_utf16().lt(y.encode_utf16()));
    }
    let (x, y) = (pa.to_number(), pb.to_number());
    if x.is_nan() || y.is_nan() {
        return None;
    }
    Some(x < y)
}

#![forbid(unsafe_code)]

//! Decoding of `get-value` replies into interpreter values.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use esverify_core::ir::BindingId;
use esverify_interpret::{Closure, Value};

use crate::vcgen::{FreeVar, ARRAY_MODEL_LIMIT};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SExpr {
    Atom(String),
    Str(String),
    List(Vec<SExpr>),
}

pub fn parse_sexprs(text: &str) -> Result<Vec<SExpr>, String> {
    let chars: Vec<char> = text.chars().collect();
    let mut pos = 0;
    let mut out = Vec::new();
    loop {
        skip_ws(&chars, &mut pos);
        if pos >= chars.len() {
            return Ok(out);
        }
        out.push(parse_one(&chars, &mut pos)?);
    }
}

fn skip_ws(chars: &[char], pos: &mut usize) {
    while *pos < chars.len() {
        match chars[*pos] {
            c if c.is_whitespace() => *pos += 1,
            ';' => {
                while *pos < chars.len() && chars[*pos] != '\n' {
                    *pos += 1;
                }
            }
            _ => break,
        }
    }
}

fn parse_one(chars: &[char], pos: &mut usize) -> Result<SExpr, String> {
    skip_ws(chars, pos);
    match chars.get(*pos) {
        None => Err("unexpected end of model".to_string()),
        Some('(') => {
            *pos += 1;
            let mut items = Vec::new();
            loop {
                skip_ws(chars, pos);
                match chars.get(*pos) {
                    None => return Err("unclosed list in model".to_string()),
                    Some(')') => {
                        *pos += 1;
                        return Ok(SExpr::List(items));
                    }
                    Some(_) => items.push(parse_one(chars, pos)?),
                }
            }
        }
        Some(')') => Err("unbalanced `)` in model".to_string()),
        Some('"') => {
            *pos += 1;
            let mut s = String::new();
            loop {
                match chars.get(*pos) {
                    None => return Err("unterminated string in model".to_string()),
                    Some('"') if chars.get(*pos + 1) == Some(&'"') => {
                        s.push('"');
                        *pos += 2;
                    }
                    Some('"') => {
                        *pos += 1;
                        return Ok(SExpr::Str(unescape(&s)));
                    }
                    Some(c) => {
                        s.push(*c);
                        *pos += 1;
                    }
                }
            }
        }
        Some('|') => {
            *pos += 1;
            let start = *pos;
            while *pos < chars.len() && chars[*pos] != '|' {
                *pos += 1;
            }
            let atom: String = chars[start..(*pos).min(chars.len())].iter().collect();
            *pos += 1;
            Ok(SExpr::Atom(atom))
        }
        Some(_) => {
            let start = *pos;
            while *pos < chars.len()
                && !chars[*pos].is_whitespace()
                && !matches!(chars[*pos], '(' | ')' | '"' | ';')
            {
                *pos += 1;
            }
            Ok(SExpr::Atom(chars[start..*pos].iter().collect()))
        }
    }
}

/// Resolves `\u{..}` and `\uXXXX` escapes of SMT-LIB string literals.
fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(i) = rest.find("\\u") {
        out.push_str(&rest[..i]);
        let after = &rest[i + 2..];
        let (hex, consumed) = if let Some(body) = after.strip_prefix('{') {
            match body.find('}') {
                Some(end) => (&body[..end], end + 2),
                None => ("", 0),
            }
        } else if after.len() >= 4 && after.is_char_boundary(4) {
            (&after[..4], 4)
        } else {
            ("", 0)
        };
        match u32::from_str_radix(hex, 16).ok().and_then(char::from_u32) {
            Some(c) if consumed > 0 => {
                out.push(c);
                rest = &after[consumed..];
            }
            _ => {
                out.push_str("\\u");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn int(e: &SExpr) -> Option<i128> {
    match e {
        SExpr::Atom(a) => a.parse().ok(),
        SExpr::List(items) => match items.as_slice() {
            [SExpr::Atom(minus), n] if minus == "-" => int(n).map(|v| -v),
            _ => None,
        },
        SExpr::Str(_) => None,
    }
}

/// A JavaScript value read from a model. Unlike interpreter values it is
/// plain data, so solved conditions can move between threads.
#[derive(Clone, Debug, PartialEq)]
pub enum ModelValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<ModelValue>),
    /// A declared function, or an opaque handle when the index names none.
    Function(Result<BindingId, i64>),
}

impl ModelValue {
    pub fn to_value(&self) -> Value {
        match self {
            ModelValue::Undefined => Value::Undefined,
            ModelValue::Null => Value::Null,
            ModelValue::Bool(b) => Value::Bool(*b),
            ModelValue::Number(n) => Value::Number(*n),
            ModelValue::String(s) => Value::String(s.clone()),
            ModelValue::Array(elems) => {
                Value::Array(Rc::new(elems.iter().map(ModelValue::to_value).collect()))
            }
            ModelValue::Function(Ok(b)) => Value::Function(Closure::decl(*b)),
            ModelValue::Function(Err(handle)) => Value::Function(Closure::opaque(*handle)),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        self.to_value().to_json()
    }
}

impl fmt::Display for ModelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.to_value(), f)
    }
}

/// Model of a satisfiable condition: values for its free constants.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Model {
    entries: Vec<(String, ModelValue)>,
    /// Values of the parameters and globals at function entry.
    inputs: HashMap<BindingId, ModelValue>,
}

impl Model {
    pub fn get(&self, name: &str) -> Option<&ModelValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ModelValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Replay inputs keyed by binding.
    pub fn inputs(&self) -> HashMap<BindingId, Value> {
        self.inputs
            .iter()
            .map(|(b, v)| (*b, v.to_value()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.entries
                .iter()
                .map(|(n, v)| (n.clone(), v.to_json()))
                .collect(),
        )
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name} = {value}")?;
        }
        Ok(())
    }
}

/// Builds the model from the reply to the condition's `get-value` request.
///
/// Values the interpreter cannot represent faithfully (arrays longer than
/// the fetched prefix, nested arrays) are errors; the condition then stays
/// unverified.
pub fn decode_model(
    text: &str,
    free: &[FreeVar],
    functions: &[BindingId],
) -> Result<Model, String> {
    let mut model = Model::default();
    if free.is_empty() {
        return Ok(model);
    }
    let parsed = parse_sexprs(text)?;
    let pairs = parsed
        .iter()
        .find_map(|e| match e {
            SExpr::List(items) if items.iter().all(|i| matches!(i, SExpr::List(p) if p.len() == 2)) => {
                Some(items)
            }
            _ => None,
        })
        .ok_or_else(|| "no get-value reply in solver output".to_string())?;
    let values: Vec<&SExpr> = pairs
        .iter()
        .filter_map(|p| match p {
            SExpr::List(pair) => pair.get(1),
            _ => None,
        })
        .collect();
    let stride = ARRAY_MODEL_LIMIT + 2;
    if values.len() != free.len() * stride {
        return Err(format!(
            "expected {} model values, got {}",
            free.len() * stride,
            values.len()
        ));
    }
    for (var, chunk) in free.iter().zip(values.chunks(stride)) {
        let decoder = Decoder { functions };
        let value = decoder.value(chunk[0], Some((chunk[1], &chunk[2..])))?;
        if let Some(b) = var.binding {
            model.inputs.insert(b, value.clone());
        }
        model.entries.push((var.smt.clone(), value));
    }
    Ok(model)
}

struct Decoder<'a> {
    functions: &'a [BindingId],
}

impl Decoder<'_> {
    fn value(&self, e: &SExpr, array: Option<(&SExpr, &[&SExpr])>) -> Result<ModelValue, String> {
        match e {
            SExpr::Atom(a) if a == "jsnull" => Ok(ModelValue::Null),
            SExpr::Atom(a) if a == "jsundefined" => Ok(ModelValue::Undefined),
            SExpr::List(items) => match items.as_slice() {
                [SExpr::Atom(c), arg] if c == "jsnum" => int(arg)
                    .map(|n| ModelValue::Number(n as f64))
                    .ok_or_else(|| format!("bad number {arg:?}")),
                [SExpr::Atom(c), SExpr::Atom(b)] if c == "jsbool" => match b.as_str() {
                    "true" => Ok(ModelValue::Bool(true)),
                    "false" => Ok(ModelValue::Bool(false)),
                    other => Err(format!("bad boolean {other}")),
                },
                [SExpr::Atom(c), SExpr::Str(s)] if c == "jsstr" => Ok(ModelValue::String(s.clone())),
                [SExpr::Atom(c), arg] if c == "jsfun" => {
                    let k = int(arg).ok_or_else(|| format!("bad function {arg:?}"))?;
                    let decl = usize::try_from(k).ok().and_then(|i| self.functions.get(i));
                    Ok(ModelValue::Function(decl.copied().ok_or(k as i64)))
                }
                [SExpr::Atom(c), _] if c == "jsarr" => {
                    let Some((len, elems)) = array else {
                        return Err("nested arrays are not decoded".to_string());
                    };
                    let len = int(len)
                        .and_then(|n| usize::try_from(n).ok())
                        .ok_or_else(|| format!("bad array length {len:?}"))?;
                    if len > elems.len() {
                        return Err(format!("array of length {len} is too long to decode"));
                    }
                    let mut out = Vec::with_capacity(len);
                    for el in &elems[..len] {
                        out.push(self.value(el, None)?);
                    }
                    Ok(ModelValue::Array(out))
                }
                _ => Err(format!("unrecognized model value {e:?}")),
            },
            other => Err(format!("unrecognized model value {other:?}")),
        }
    }
}

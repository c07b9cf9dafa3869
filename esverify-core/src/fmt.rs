#![forbid(unsafe_code)]

//! Text rendering of IR expressions and programs.
//!
//! [`format_expr`] produces the compact form used in verification condition
//! descriptions. [`format_program`] prints source that parses and translates
//! back into an equivalent program, so nested compound expressions are
//! parenthesized there.

use std::fmt::Write as _;

use crate::ir::{
    Block, Expr, ExprKind, FunctionDecl, Literal, Program, Stmt, TopLevel, UnaryOp,
};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Style {
    Description,
    Source,
}

pub fn format_expr(expr: &Expr) -> String {
    let mut out = String::new();
    write_expr(&mut out, expr, Style::Description, false);
    out
}

pub fn format_literal(lit: &Literal) -> String {
    match lit {
        Literal::Undefined => "undefined".to_string(),
        Literal::Null => "null".to_string(),
        Literal::Bool(b) => b.to_string(),
        Literal::Number(n) => format_number(*n),
        Literal::String(s) => quote(s),
    }
}

/// Numbers print the way `JSON.stringify` prints them.
pub fn format_number(n: f64) -> String {
    if !n.is_finite() {
        return "null".to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    format!("{n}")
}

pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn is_compound(expr: &Expr) -> bool {
    matches!(
        expr.kind,
        ExprKind::Logical { .. }
            | ExprKind::Conditional { .. }
            | ExprKind::Assign { .. }
            | ExprKind::Sequence(_)
            | ExprKind::Function(_)
    )
}

/// `nested` is true when `expr` is an operand of an enclosing expression.
fn write_expr(out: &mut String, expr: &Expr, style: Style, nested: bool) {
    if style == Style::Source && nested && is_compound(expr) {
        out.push('(');
        write_expr(out, expr, style, false);
        out.push(')');
        return;
    }
    match &expr.kind {
        ExprKind::Ident(id) => out.push_str(&id.name),
        ExprKind::Old(id) => {
            let _ = write!(out, "old({})", id.name);
        }
        ExprKind::Pure => out.push_str("pure()"),
        ExprKind::Literal(lit) => out.push_str(&format_literal(lit)),
        ExprKind::Array(elements) => {
            out.push('[');
            write_list(out, elements, style);
            out.push(']');
        }
        ExprKind::Unary { op, argument } => match op {
            UnaryOp::Typeof | UnaryOp::Void => {
                out.push_str(op.as_str());
                out.push('(');
                write_expr(out, argument, style, false);
                out.push(')');
            }
            _ => {
                out.push_str(op.as_str());
                // `- -x` must not turn into a decrement.
                let wrap = style == Style::Source
                    && matches!(argument.kind, ExprKind::Unary { .. });
                if wrap {
                    out.push('(');
                }
                write_expr(out, argument, style, true);
                if wrap {
                    out.push(')');
                }
            }
        },
        ExprKind::Binary { op, left, right } => {
            out.push('(');
            write_expr(out, left, style, true);
            let _ = write!(out, " {} ", op.as_str());
            write_expr(out, right, style, true);
            out.push(')');
        }
        ExprKind::Logical { op, left, right } => {
            write_expr(out, left, style, true);
            let _ = write!(out, " {} ", op.as_str());
            write_expr(out, right, style, true);
        }
        ExprKind::Conditional {
            test,
            consequent,
            alternate,
        } => {
            write_expr(out, test, style, true);
            out.push_str(" ? ");
            write_expr(out, consequent, style, true);
            out.push_str(" : ");
            write_expr(out, alternate, style, true);
        }
        ExprKind::Assign { target, value } => {
            out.push_str(&target.name);
            out.push_str(" = ");
            write_expr(out, value, style, true);
        }
        ExprKind::Sequence(exprs) => {
            for (i, e) in exprs.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(out, e, style, true);
            }
        }
        ExprKind::Call {
            callee, arguments, ..
        } => {
            write_expr(out, callee, style, true);
            out.push('(');
            write_list(out, arguments, style);
            out.push(')');
        }
        ExprKind::Function(f) => {
            out.push_str("function (");
            let names: Vec<&str> = f.params.iter().map(|p| p.name.as_str()).collect();
            out.push_str(&names.join(", "));
            out.push_str(") {");
            let mut printer = Printer::default();
            for s in &f.body.body {
                printer.stmt(s);
            }
            for line in printer.out.lines() {
                out.push(' ');
                out.push_str(line.trim_start());
            }
            out.push_str(" }");
        }
    }
}

fn write_list(out: &mut String, exprs: &[Expr], style: Style) {
    for (i, e) in exprs.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_expr(out, e, style, true);
    }
}

fn source_expr(expr: &Expr) -> String {
    let mut out = String::new();
    write_expr(&mut out, expr, Style::Source, false);
    out
}

/// Prints a resolved or unresolved program as source text.
pub fn format_program(program: &Program) -> String {
    let mut printer = Printer::default();
    for top in &program.body {
        match top {
            TopLevel::Function(f) => printer.function_decl(f),
            TopLevel::Stmt(s) => printer.stmt(s),
        }
    }
    for inv in &program.invariants {
        printer.line(&format!("invariant({});", source_expr(inv)));
    }
    printer.out
}

#[derive(Default)]
struct Printer {
    out: String,
    indent: usize,
}

impl Printer {
    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn nested(&mut self, block: &Block) {
        self.indent += 1;
        for s in &block.body {
            self.stmt(s);
        }
        self.indent -= 1;
    }

    fn function_decl(&mut self, f: &FunctionDecl) {
        let params: Vec<&str> = f.params.iter().map(|p| p.name.as_str()).collect();
        self.line(&format!("function {} ({}) {{", f.id.name, params.join(", ")));
        self.indent += 1;
        for e in &f.requires {
            self.line(&format!("requires({});", source_expr(e)));
        }
        for e in &f.ensures {
            self.line(&format!("ensures({});", source_expr(e)));
        }
        for s in &f.body.body {
            self.stmt(s);
        }
        self.indent -= 1;
        self.line("}");
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::VarDecl(d) => {
                // A bare sequence would read as several declarators.
                let init = if matches!(d.init.kind, ExprKind::Sequence(_)) {
                    format!("({})", source_expr(&d.init))
                } else {
                    source_expr(&d.init)
                };
                self.line(&format!("{} {} = {};", d.kind.as_str(), d.id.name, init));
            }
            Stmt::Block(b) => {
                self.line("{");
                self.nested(b);
                self.line("}");
            }
            Stmt::Expr(e) => {
                let text = if matches!(e.kind, ExprKind::Function(_)) {
                    format!("({});", source_expr(e))
                } else {
                    format!("{};", source_expr(e))
                };
                self.line(&text);
            }
            Stmt::Assert(a) => self.line(&format!("assert({});", source_expr(&a.expr))),
            Stmt::If(s) => {
                self.line(&format!("if ({}) {{", source_expr(&s.test)));
                self.nested(&s.consequent);
                if s.alternate.body.is_empty() {
                    self.line("}");
                } else {
                    self.line("} else {");
                    self.nested(&s.alternate);
                    self.line("}");
                }
            }
            Stmt::Return(r) => self.line(&format!("return {};", source_expr(&r.argument))),
            Stmt::While(w) => {
                self.line(&format!("while ({}) {{", source_expr(&w.test)));
                self.indent += 1;
                for inv in &w.invariants {
                    self.line(&format!("invariant({});", source_expr(inv)));
                }
                self.indent -= 1;
                self.nested(&w.body);
                self.line("}");
            }
            Stmt::Debugger(_) => self.line("debugger;"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_print_like_json() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(-0.0), "0");
    }

    #[test]
    fn strings_are_double_quoted_and_escaped() {
        assert_eq!(quote("number"), "\"number\"");
        assert_eq!(quote("a\"b\n"), "\"a\\\"b\\n\"");
        assert_eq!(quote("\u{1}"), "\"\\u0001\"");
    }
}

#![forbid(unsafe_code)]

//! Translation from the generic parse tree into the restricted IR.
//!
//! Everything outside the verifiable subset is rejected here with the span
//! of the offending node. Pseudo-calls are lifted out of the statement
//! stream into the construct that owns them.

use std::collections::HashSet;

use esverify_ast as ast;
use esverify_ast::Span;

use crate::error::TranslateError;
use crate::ir::{
    AssertStmt, BinaryOp, Block, Bindings, DeclKind, Expr, ExprKind, FunctionDecl, FunctionExpr,
    Identifier, IfStmt, Literal, LogicalOp, NodeId, Program, ReturnStmt, Stmt, TopLevel, UnaryOp,
    VarDecl, WhileStmt,
};

/// Pseudo-calls that are only meaningful as statements.
const STATEMENT_PSEUDO_CALLS: [&str; 4] = ["assert", "requires", "ensures", "invariant"];

pub fn translate_program(program: &ast::Program) -> Result<Program, TranslateError> {
    let mut tr = Translator { next_node: 0 };
    let mut body = Vec::new();
    let mut invariants = Vec::new();
    for stmt in &program.body {
        if let Some(arg) = pseudo_call("invariant", stmt)? {
            invariants.push(tr.expr(arg)?);
            continue;
        }
        match stmt {
            ast::Stmt::Function(f) => body.push(TopLevel::Function(tr.function_decl(f)?)),
            ast::Stmt::Return(r) => return Err(unsupported("top level return not allowed", r.span)),
            other => {
                let mut out = Vec::new();
                tr.stmt(other, &mut out)?;
                body.extend(out.into_iter().map(TopLevel::Stmt));
            }
        }
    }
    Ok(Program {
        body,
        invariants,
        bindings: Bindings::default(),
    })
}

fn unsupported(message: impl Into<String>, span: Span) -> TranslateError {
    TranslateError {
        message: message.into(),
        span,
    }
}

/// Returns the argument of `name(arg);` when `stmt` is exactly that
/// statement. A matching call with the wrong arity is an error.
fn pseudo_call<'s>(name: &str, stmt: &'s ast::Stmt) -> Result<Option<&'s ast::Expr>, TranslateError> {
    let ast::Stmt::Expr(s) = stmt else {
        return Ok(None);
    };
    let ast::ExprKind::Call { callee, arguments } = &s.expr.kind else {
        return Ok(None);
    };
    if !matches!(&callee.kind, ast::ExprKind::Ident(n) if n == name) {
        return Ok(None);
    }
    match arguments.as_slice() {
        [arg] => Ok(Some(arg)),
        _ => Err(unsupported(
            format!("{name}() expects exactly one argument"),
            s.span,
        )),
    }
}

/// Statements of a loop body or branch: a block contributes its contents,
/// anything else is a single statement.
fn body_stmts(stmt: &ast::Stmt) -> &[ast::Stmt] {
    match stmt {
        ast::Stmt::Block(b) => &b.body,
        other => std::slice::from_ref(other),
    }
}

fn check_function_shape(f: &ast::Function) -> Result<Vec<Identifier>, TranslateError> {
    if f.params.iter().any(|p| p.default.is_some()) {
        return Err(unsupported("default parameters are not supported", f.span));
    }
    if let Some(rest) = &f.rest {
        return Err(unsupported("rest parameters are not supported", rest.span()));
    }
    if f.generator {
        return Err(unsupported("generators are not supported", f.span));
    }
    if let ast::FunctionBody::Expr(e) = &f.body {
        return Err(unsupported("function bodies must be blocks", e.span));
    }
    let mut params = Vec::with_capacity(f.params.len());
    let mut seen = HashSet::new();
    for p in &f.params {
        let ast::Pattern::Ident(id) = &p.pattern else {
            return Err(unsupported("destructuring parameters are not supported", p.span));
        };
        if !seen.insert(id.node.as_str()) {
            return Err(unsupported("parameter names must be distinct", id.span));
        }
        params.push(Identifier::new(id.node.clone(), id.span));
    }
    Ok(params)
}

struct Translator {
    next_node: u32,
}

impl Translator {
    fn fresh_node(&mut self) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        id
    }

    fn function_decl(&mut self, f: &ast::Function) -> Result<FunctionDecl, TranslateError> {
        let Some(name) = &f.id else {
            return Err(unsupported("function declarations need a name", f.span));
        };
        let params = check_function_shape(f)?;
        let ast::FunctionBody::Block(block) = &f.body else {
            return Err(unsupported("function bodies must be blocks", f.span));
        };

        let mut requires = Vec::new();
        let mut ensures = Vec::new();
        let mut body = Vec::new();
        for stmt in &block.body {
            if let Some(arg) = pseudo_call("requires", stmt)? {
                requires.push(self.expr(arg)?);
            } else if let Some(arg) = pseudo_call("ensures", stmt)? {
                ensures.push(self.expr(arg)?);
            } else {
                self.stmt(stmt, &mut body)?;
            }
        }

        Ok(FunctionDecl {
            span: f.span,
            id: Identifier::new(name.node.clone(), name.span),
            params,
            requires,
            ensures,
            body: Block {
                span: block.span,
                body,
            },
        })
    }

    fn block(&mut self, span: Span, stmts: &[ast::Stmt]) -> Result<Block, TranslateError> {
        let mut body = Vec::new();
        for s in stmts {
            self.stmt(s, &mut body)?;
        }
        Ok(Block { span, body })
    }

    fn stmt(&mut self, stmt: &ast::Stmt, out: &mut Vec<Stmt>) -> Result<(), TranslateError> {
        match stmt {
            ast::Stmt::Empty(_) => {}
            ast::Stmt::Block(b) => out.push(Stmt::Block(self.block(b.span, &b.body)?)),
            ast::Stmt::Expr(s) => {
                if let Some(arg) = pseudo_call("assert", stmt)? {
                    out.push(Stmt::Assert(AssertStmt {
                        id: self.fresh_node(),
                        span: s.span,
                        expr: self.expr(arg)?,
                    }));
                    return Ok(());
                }
                for name in ["requires", "ensures"] {
                    if pseudo_call(name, stmt)?.is_some() {
                        return Err(unsupported(
                            format!("{name}() is only allowed directly in a function body"),
                            s.span,
                        ));
                    }
                }
                if pseudo_call("invariant", stmt)?.is_some() {
                    return Err(unsupported(
                        "invariant() is only allowed at top level or directly in a loop body",
                        s.span,
                    ));
                }
                out.push(Stmt::Expr(self.expr(&s.expr)?));
            }
            ast::Stmt::VarDecl(d) => {
                let kind = match d.kind {
                    ast::VarKind::Let => DeclKind::Let,
                    ast::VarKind::Const => DeclKind::Const,
                    ast::VarKind::Var => {
                        return Err(unsupported(
                            "var declarations are not supported; use let or const",
                            d.span,
                        ));
                    }
                };
                for decl in &d.declarators {
                    let ast::Pattern::Ident(id) = &decl.id else {
                        return Err(unsupported("destructuring is not supported", decl.id.span()));
                    };
                    let init = match &decl.init {
                        Some(e) => self.expr(e)?,
                        None => Expr {
                            span: id.span,
                            kind: ExprKind::Literal(Literal::Undefined),
                        },
                    };
                    out.push(Stmt::VarDecl(VarDecl {
                        span: decl.span,
                        kind,
                        id: Identifier::new(id.node.clone(), id.span),
                        init,
                    }));
                }
            }
            ast::Stmt::Function(f) => {
                return Err(unsupported(
                    "function declarations are only supported at top level",
                    f.span,
                ));
            }
            ast::Stmt::Return(r) => {
                let argument = match &r.argument {
                    Some(e) => self.expr(e)?,
                    None => Expr {
                        span: r.span,
                        kind: ExprKind::Literal(Literal::Undefined),
                    },
                };
                out.push(Stmt::Return(ReturnStmt {
                    span: r.span,
                    argument,
                }));
            }
            ast::Stmt::If(s) => {
                let test = self.expr(&s.test)?;
                let consequent = self.block(s.consequent.span(), body_stmts(&s.consequent))?;
                let alternate = match &s.alternate {
                    Some(alt) => self.block(alt.span(), body_stmts(alt))?,
                    None => Block {
                        span: s.span,
                        body: Vec::new(),
                    },
                };
                out.push(Stmt::If(IfStmt {
                    span: s.span,
                    test,
                    consequent,
                    alternate,
                }));
            }
            ast::Stmt::While(s) => {
                let test = self.expr(&s.test)?;
                let mut invariants = Vec::new();
                let mut body = Vec::new();
                for inner in body_stmts(&s.body) {
                    if let Some(arg) = pseudo_call("invariant", inner)? {
                        invariants.push(self.expr(arg)?);
                    } else {
                        self.stmt(inner, &mut body)?;
                    }
                }
                out.push(Stmt::While(WhileStmt {
                    id: self.fresh_node(),
                    span: s.span,
                    invariants,
                    test,
                    body: Block {
                        span: s.body.span(),
                        body,
                    },
                }));
            }
            ast::Stmt::DoWhile(s) => {
                return Err(unsupported("do-while loops are not supported", s.span));
            }
            ast::Stmt::For(s) => return Err(unsupported("for loops are not supported", s.span)),
            ast::Stmt::Break(span) => return Err(unsupported("break is not supported", *span)),
            ast::Stmt::Continue(span) => {
                return Err(unsupported("continue is not supported", *span));
            }
            ast::Stmt::Throw(s) => return Err(unsupported("exceptions are not supported", s.span)),
            ast::Stmt::Try(s) => return Err(unsupported("exceptions are not supported", s.span)),
            ast::Stmt::Debugger(span) => out.push(Stmt::Debugger(*span)),
        }
        Ok(())
    }

    fn expr(&mut self, expr: &ast::Expr) -> Result<Expr, TranslateError> {
        let span = expr.span;
        let kind = match &expr.kind {
            ast::ExprKind::Ident(name) if name == "undefined" => {
                ExprKind::Literal(Literal::Undefined)
            }
            ast::ExprKind::Ident(name) => ExprKind::Ident(Identifier::new(name.clone(), span)),
            ast::ExprKind::Literal(lit) => ExprKind::Literal(match lit {
                ast::Literal::Null => Literal::Null,
                ast::Literal::Bool(b) => Literal::Bool(*b),
                ast::Literal::Number(n) => Literal::Number(*n),
                ast::Literal::String(s) => Literal::String(s.clone()),
                ast::Literal::RegExp { .. } => {
                    return Err(unsupported("regular expressions are not supported", span));
                }
            }),
            ast::ExprKind::This => return Err(unsupported("`this` is not supported", span)),
            ast::ExprKind::Object(_) => {
                return Err(unsupported("object literals are not supported", span));
            }
            ast::ExprKind::Array(elements) => {
                let mut out = Vec::with_capacity(elements.len());
                for e in elements {
                    let Some(e) = e else {
                        return Err(unsupported("array holes are not supported", span));
                    };
                    out.push(self.expr(e)?);
                }
                ExprKind::Array(out)
            }
            ast::ExprKind::Function(f) => {
                if f.id.is_some() {
                    return Err(unsupported("named function expressions are not supported", span));
                }
                let params = check_function_shape(f)?;
                let ast::FunctionBody::Block(block) = &f.body else {
                    return Err(unsupported("function bodies must be blocks", span));
                };
                let id = self.fresh_node();
                let body = self.block(block.span, &block.body)?;
                ExprKind::Function(Box::new(FunctionExpr {
                    id,
                    span,
                    params,
                    body,
                }))
            }
            ast::ExprKind::Unary { op, argument } => {
                let op = match op {
                    ast::UnaryOp::Minus => UnaryOp::Minus,
                    ast::UnaryOp::Plus => UnaryOp::Plus,
                    ast::UnaryOp::Not => UnaryOp::Not,
                    ast::UnaryOp::BitNot => UnaryOp::BitNot,
                    ast::UnaryOp::Typeof => UnaryOp::Typeof,
                    ast::UnaryOp::Void => UnaryOp::Void,
                    ast::UnaryOp::Delete => {
                        return Err(unsupported("delete is not supported", span));
                    }
                };
                ExprKind::Unary {
                    op,
                    argument: Box::new(self.expr(argument)?),
                }
            }
            ast::ExprKind::Update {
                op,
                prefix,
                argument,
            } => {
                let target = assign_target(argument)?;
                let (apply, undo) = match op {
                    ast::UpdateOp::Incr => (BinaryOp::Add, BinaryOp::Sub),
                    ast::UpdateOp::Decr => (BinaryOp::Sub, BinaryOp::Add),
                };
                let update = assign_update(target.clone(), apply, number(1.0, span), span);
                if *prefix {
                    return Ok(update);
                }
                ExprKind::Sequence(vec![
                    update,
                    Expr {
                        span,
                        kind: ExprKind::Binary {
                            op: undo,
                            left: Box::new(Expr {
                                span,
                                kind: ExprKind::Ident(target),
                            }),
                            right: Box::new(number(1.0, span)),
                        },
                    },
                ])
            }
            ast::ExprKind::Binary { op, left, right } => ExprKind::Binary {
                op: binary_op(*op, span)?,
                left: Box::new(self.expr(left)?),
                right: Box::new(self.expr(right)?),
            },
            ast::ExprKind::Logical { op, left, right } => ExprKind::Logical {
                op: match op {
                    ast::LogicalOp::And => LogicalOp::And,
                    ast::LogicalOp::Or => LogicalOp::Or,
                },
                left: Box::new(self.expr(left)?),
                right: Box::new(self.expr(right)?),
            },
            ast::ExprKind::Conditional {
                test,
                consequent,
                alternate,
            } => ExprKind::Conditional {
                test: Box::new(self.expr(test)?),
                consequent: Box::new(self.expr(consequent)?),
                alternate: Box::new(self.expr(alternate)?),
            },
            ast::ExprKind::Assign { op, target, value } => {
                let target = assign_target(target)?;
                let value = self.expr(value)?;
                return match op.binary() {
                    None => Ok(Expr {
                        span,
                        kind: ExprKind::Assign {
                            target,
                            value: Box::new(value),
                        },
                    }),
                    Some(op) => Ok(assign_update(target, binary_op(op, span)?, value, span)),
                };
            }
            ast::ExprKind::Sequence(exprs) => ExprKind::Sequence(
                exprs
                    .iter()
                    .map(|e| self.expr(e))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            ast::ExprKind::Call { callee, arguments } => {
                if arguments.iter().any(|a| matches!(a.kind, ast::ExprKind::Spread(_))) {
                    return Err(unsupported("spread arguments are not supported", span));
                }
                if let ast::ExprKind::Ident(name) = &callee.kind {
                    match name.as_str() {
                        "old" => {
                            return match arguments.as_slice() {
                                [ast::Expr {
                                    kind: ast::ExprKind::Ident(arg),
                                    span: arg_span,
                                }] => Ok(Expr {
                                    span,
                                    kind: ExprKind::Old(Identifier::new(arg.clone(), *arg_span)),
                                }),
                                _ => Err(unsupported("old() expects a single identifier", span)),
                            };
                        }
                        "pure" => {
                            if !arguments.is_empty() {
                                return Err(unsupported("pure() takes no arguments", span));
                            }
                            return Ok(Expr {
                                span,
                                kind: ExprKind::Pure,
                            });
                        }
                        n if STATEMENT_PSEUDO_CALLS.contains(&n) => {
                            return Err(unsupported(
                                format!("{n}() can only be used as a statement"),
                                span,
                            ));
                        }
                        _ => {}
                    }
                }
                let callee = self.expr(callee)?;
                let arguments = arguments
                    .iter()
                    .map(|a| self.expr(a))
                    .collect::<Result<Vec<_>, _>>()?;
                ExprKind::Call {
                    id: self.fresh_node(),
                    callee: Box::new(callee),
                    arguments,
                }
            }
            ast::ExprKind::New { .. } => return Err(unsupported("`new` is not supported", span)),
            ast::ExprKind::Member { .. } => {
                return Err(unsupported("property access is not supported", span));
            }
            ast::ExprKind::Spread(_) => return Err(unsupported("spread is not supported", span)),
        };
        Ok(Expr { span, kind })
    }
}

fn assign_target(target: &ast::Expr) -> Result<Identifier, TranslateError> {
    match &target.kind {
        ast::ExprKind::Ident(name) if name != "undefined" => {
            Ok(Identifier::new(name.clone(), target.span))
        }
        _ => Err(unsupported("only identifiers can be assigned", target.span)),
    }
}

fn number(n: f64, span: Span) -> Expr {
    Expr {
        span,
        kind: ExprKind::Literal(Literal::Number(n)),
    }
}

/// `x = x op rhs`
fn assign_update(target: Identifier, op: BinaryOp, rhs: Expr, span: Span) -> Expr {
    let read = Expr {
        span: target.span,
        kind: ExprKind::Ident(target.clone()),
    };
    Expr {
        span,
        kind: ExprKind::Assign {
            target,
            value: Box::new(Expr {
                span,
                kind: ExprKind::Binary {
                    op,
                    left: Box::new(read),
                    right: Box::new(rhs),
                },
            }),
        },
    }
}

fn binary_op(op: ast::BinaryOp, span: Span) -> Result<BinaryOp, TranslateError> {
    Ok(match op {
        ast::BinaryOp::Eq => BinaryOp::Eq,
        ast::BinaryOp::NotEq => BinaryOp::NotEq,
        ast::BinaryOp::StrictEq => BinaryOp::StrictEq,
        ast::BinaryOp::StrictNotEq => BinaryOp::StrictNotEq,
        ast::BinaryOp::Lt => BinaryOp::Lt,
        ast::BinaryOp::Le => BinaryOp::Le,
        ast::BinaryOp::Gt => BinaryOp::Gt,
        ast::BinaryOp::Ge => BinaryOp::Ge,
        ast::BinaryOp::Shl => BinaryOp::Shl,
        ast::BinaryOp::Shr => BinaryOp::Shr,
        ast::BinaryOp::UShr => BinaryOp::UShr,
        ast::BinaryOp::Add => BinaryOp::Add,
        ast::BinaryOp::Sub => BinaryOp::Sub,
        ast::BinaryOp::Mul => BinaryOp::Mul,
        ast::BinaryOp::Div => BinaryOp::Div,
        ast::BinaryOp::Mod => BinaryOp::Mod,
        ast::BinaryOp::BitOr => BinaryOp::BitOr,
        ast::BinaryOp::BitXor => BinaryOp::BitXor,
        ast::BinaryOp::BitAnd => BinaryOp::BitAnd,
        ast::BinaryOp::Exp | ast::BinaryOp::In | ast::BinaryOp::InstanceOf => {
            return Err(unsupported(
                format!("operator `{}` is not supported", op.as_str()),
                span,
            ));
        }
    })
}

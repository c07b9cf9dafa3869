#![forbid(unsafe_code)]

use std::mem;

use esverify_ast::{
    join, span_between, AssignOp, BinaryOp, Block, CatchClause, Declarator, DoWhileStmt, Expr,
    ExprKind, ExprStmt, ForInit, ForStmt, Function, FunctionBody, Ident, IfStmt, Literal,
    LogicalOp, MemberProp, Param, Pattern, Program, Property, ReturnStmt, Span, Stmt, ThrowStmt,
    TryStmt, UnaryOp, UpdateOp, VarDecl, VarKind, WhileStmt,
};
use esverify_lex::{Token, TokenKind};

use crate::error::ParseError;

pub struct Parser<'a> {
    tokens: &'a [Token],
    idx: usize,
}

/// Binary-level operators, split by the tree node they build.
#[derive(Clone, Copy)]
enum InfixOp {
    Binary(BinaryOp),
    Logical(LogicalOp),
}

fn infix_op(kind: &TokenKind) -> Option<(InfixOp, u8)> {
    let op = match kind {
        TokenKind::OrOr => (InfixOp::Logical(LogicalOp::Or), 1),
        TokenKind::AndAnd => (InfixOp::Logical(LogicalOp::And), 2),
        TokenKind::Pipe => (InfixOp::Binary(BinaryOp::BitOr), 3),
        TokenKind::Caret => (InfixOp::Binary(BinaryOp::BitXor), 4),
        TokenKind::Amp => (InfixOp::Binary(BinaryOp::BitAnd), 5),
        TokenKind::EqEq => (InfixOp::Binary(BinaryOp::Eq), 6),
        TokenKind::Neq => (InfixOp::Binary(BinaryOp::NotEq), 6),
        TokenKind::EqEqEq => (InfixOp::Binary(BinaryOp::StrictEq), 6),
        TokenKind::NeqEq => (InfixOp::Binary(BinaryOp::StrictNotEq), 6),
        TokenKind::Lt => (InfixOp::Binary(BinaryOp::Lt), 7),
        TokenKind::Le => (InfixOp::Binary(BinaryOp::Le), 7),
        TokenKind::Gt => (InfixOp::Binary(BinaryOp::Gt), 7),
        TokenKind::Ge => (InfixOp::Binary(BinaryOp::Ge), 7),
        TokenKind::KwIn => (InfixOp::Binary(BinaryOp::In), 7),
        TokenKind::KwInstanceof => (InfixOp::Binary(BinaryOp::InstanceOf), 7),
        TokenKind::Shl => (InfixOp::Binary(BinaryOp::Shl), 8),
        TokenKind::Shr => (InfixOp::Binary(BinaryOp::Shr), 8),
        TokenKind::UShr => (InfixOp::Binary(BinaryOp::UShr), 8),
        TokenKind::Plus => (InfixOp::Binary(BinaryOp::Add), 9),
        TokenKind::Minus => (InfixOp::Binary(BinaryOp::Sub), 9),
        TokenKind::Star => (InfixOp::Binary(BinaryOp::Mul), 10),
        TokenKind::Slash => (InfixOp::Binary(BinaryOp::Div), 10),
        TokenKind::Percent => (InfixOp::Binary(BinaryOp::Mod), 10),
        _ => return None,
    };
    Some(op)
}

fn assign_op(kind: &TokenKind) -> Option<AssignOp> {
    let op = match kind {
        TokenKind::Eq => AssignOp::Assign,
        TokenKind::PlusEq => AssignOp::Compound(BinaryOp::Add),
        TokenKind::MinusEq => AssignOp::Compound(BinaryOp::Sub),
        TokenKind::StarEq => AssignOp::Compound(BinaryOp::Mul),
        TokenKind::StarStarEq => AssignOp::Compound(BinaryOp::Exp),
        TokenKind::SlashEq => AssignOp::Compound(BinaryOp::Div),
        TokenKind::PercentEq => AssignOp::Compound(BinaryOp::Mod),
        TokenKind::ShlEq => AssignOp::Compound(BinaryOp::Shl),
        TokenKind::ShrEq => AssignOp::Compound(BinaryOp::Shr),
        TokenKind::UShrEq => AssignOp::Compound(BinaryOp::UShr),
        TokenKind::AmpEq => AssignOp::Compound(BinaryOp::BitAnd),
        TokenKind::PipeEq => AssignOp::Compound(BinaryOp::BitOr),
        TokenKind::CaretEq => AssignOp::Compound(BinaryOp::BitXor),
        _ => return None,
    };
    Some(op)
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, idx: 0 }
    }

    pub fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut body = Vec::new();
        while !self.at(TokenKind::Eof) {
            body.push(self.parse_stmt()?);
        }
        let end = self.peek_span().map(|s| s.offset()).unwrap_or(0);
        Ok(Program {
            span: span_between(0, end),
            body,
        })
    }

    pub fn parse_expr_eof(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_expr()?;
        if !self.at(TokenKind::Eof) {
            return Err(ParseError {
                message: "expected end of input".to_string(),
                span: self.peek_span().unwrap_or_else(|| span_between(0, 0)),
            });
        }
        Ok(expr)
    }

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        let Some(kind) = self.peek_kind() else {
            return Err(self.eof_error());
        };
        match kind {
            TokenKind::LBrace => Ok(Stmt::Block(self.parse_block()?)),
            TokenKind::Semi => {
                let tok = self.expect_any()?;
                Ok(Stmt::Empty(tok.span))
            }
            TokenKind::KwVar | TokenKind::KwLet | TokenKind::KwConst => {
                let decl = self.parse_var_decl()?;
                self.consume_semicolon()?;
                Ok(Stmt::VarDecl(decl))
            }
            TokenKind::KwFunction => Ok(Stmt::Function(self.parse_function()?)),
            TokenKind::KwReturn => self.parse_return(),
            TokenKind::KwIf => self.parse_if(),
            TokenKind::KwWhile => {
                let start = self.expect_any()?.span;
                let test = self.parse_paren_expr()?;
                let body = self.parse_stmt()?;
                Ok(Stmt::While(WhileStmt {
                    span: join(start, body.span()),
                    test,
                    body: Box::new(body),
                }))
            }
            TokenKind::KwDo => {
                let start = self.expect_any()?.span;
                let body = self.parse_stmt()?;
                self.expect(TokenKind::KwWhile)?;
                let test = self.parse_paren_expr()?;
                if self.at(TokenKind::Semi) {
                    self.next();
                }
                Ok(Stmt::DoWhile(DoWhileStmt {
                    span: join(start, test.span),
                    body: Box::new(body),
                    test,
                }))
            }
            TokenKind::KwFor => self.parse_for(),
            TokenKind::KwBreak | TokenKind::KwContinue => {
                let tok = self.expect_any()?;
                self.consume_semicolon()?;
                Ok(if tok.kind == TokenKind::KwBreak {
                    Stmt::Break(tok.span)
                } else {
                    Stmt::Continue(tok.span)
                })
            }
            TokenKind::KwThrow => {
                let start = self.expect_any()?.span;
                let argument = self.parse_expr()?;
                self.consume_semicolon()?;
                Ok(Stmt::Throw(ThrowStmt {
                    span: join(start, argument.span),
                    argument,
                }))
            }
            TokenKind::KwTry => self.parse_try(),
            TokenKind::KwDebugger => {
                let tok = self.expect_any()?;
                self.consume_semicolon()?;
                Ok(Stmt::Debugger(tok.span))
            }
            _ => {
                let expr = self.parse_expr()?;
                self.consume_semicolon()?;
                Ok(Stmt::Expr(ExprStmt {
                    span: expr.span,
                    expr,
                }))
            }
        }
    }

    fn parse_block(&mut self) -> Result<Block, ParseError> {
        let start = self.expect(TokenKind::LBrace)?.span;
        let mut body = Vec::new();
        while !self.at(TokenKind::RBrace) {
            if self.at(TokenKind::Eof) {
                return Err(self.eof_error());
            }
            body.push(self.parse_stmt()?);
        }
        let end = self.expect(TokenKind::RBrace)?.span;
        Ok(Block {
            span: join(start, end),
            body,
        })
    }

    fn parse_var_decl(&mut self) -> Result<VarDecl, ParseError> {
        let tok = self.expect_any()?;
        let kind = match tok.kind {
            TokenKind::KwVar => VarKind::Var,
            TokenKind::KwLet => VarKind::Let,
            _ => VarKind::Const,
        };
        let mut declarators = Vec::new();
        loop {
            let id = self.parse_pattern()?;
            let init = if self.at(TokenKind::Eq) {
                self.next();
                Some(self.parse_assign_expr()?)
            } else {
                None
            };
            let span = match &init {
                Some(e) => join(id.span(), e.span),
                None => id.span(),
            };
            declarators.push(Declarator { span, id, init });
            if !self.at(TokenKind::Comma) {
                break;
            }
            self.next();
        }
        let end = declarators.last().map(|d| d.span).unwrap_or(tok.span);
        Ok(VarDecl {
            span: join(tok.span, end),
            kind,
            declarators,
        })
    }

    fn parse_pattern(&mut self) -> Result<Pattern, ParseError> {
        match self.peek_kind() {
            Some(TokenKind::LBracket) => {
                let start = self.expect_any()?.span;
                let mut elements = Vec::new();
                while !self.at(TokenKind::RBracket) {
                    if self.at(TokenKind::Comma) {
                        self.next();
                        elements.push(None);
                        continue;
                    }
                    elements.push(Some(self.parse_pattern()?));
                    if !self.at(TokenKind::RBracket) {
                        self.expect(TokenKind::Comma)?;
                    }
                }
                let end = self.expect(TokenKind::RBracket)?.span;
                Ok(Pattern::Array {
                    span: join(start, end),
                    elements,
                })
            }
            Some(TokenKind::LBrace) => {
                let start = self.expect_any()?.span;
                let mut props = Vec::new();
                while !self.at(TokenKind::RBrace) {
                    let key = self.expect_ident()?;
                    let value = if self.at(TokenKind::Colon) {
                        self.next();
                        self.parse_pattern()?
                    } else {
                        Pattern::Ident(key.clone())
                    };
                    props.push((key, value));
                    if !self.at(TokenKind::RBrace) {
                        self.expect(TokenKind::Comma)?;
                    }
                }
                let end = self.expect(TokenKind::RBrace)?.span;
                Ok(Pattern::Object {
                    span: join(start, end),
                    props,
                })
            }
            _ => Ok(Pattern::Ident(self.expect_ident()?)),
        }
    }

    /// `function [*] [name] (params) { body }`, used for declarations and
    /// expressions alike.
    fn parse_function(&mut self) -> Result<Function, ParseError> {
        let start = self.expect(TokenKind::KwFunction)?.span;
        let generator = if self.at(TokenKind::Star) {
            self.next();
            true
        } else {
            false
        };
        let id = if matches!(self.peek_kind(), Some(TokenKind::Ident(_))) {
            Some(self.expect_ident()?)
        } else {
            None
        };
        let (params, rest) = self.parse_params()?;
        let body = self.parse_block()?;
        Ok(Function {
            span: join(start, body.span),
            id,
            params,
            rest,
            generator,
            arrow: false,
            body: FunctionBody::Block(body),
        })
    }

    fn parse_params(&mut self) -> Result<(Vec<Param>, Option<Pattern>), ParseError> {
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        let mut rest = None;
        while !self.at(TokenKind::RParen) {
            if self.at(TokenKind::Ellipsis) {
                self.next();
                rest = Some(self.parse_pattern()?);
                break;
            }
            let pattern = self.parse_pattern()?;
            let default = if self.at(TokenKind::Eq) {
                self.next();
                Some(self.parse_assign_expr()?)
            } else {
                None
            };
            let span = match &default {
                Some(d) => join(pattern.span(), d.span),
                None => pattern.span(),
            };
            params.push(Param {
                span,
                pattern,
                default,
            });
            if !self.at(TokenKind::RParen) {
                self.expect(TokenKind::Comma)?;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok((params, rest))
    }

    fn parse_return(&mut self) -> Result<Stmt, ParseError> {
        let start = self.expect(TokenKind::KwReturn)?.span;
        let ends_here = self.at(TokenKind::Semi)
            || self.at(TokenKind::RBrace)
            || self.at(TokenKind::Eof)
            || self.newline_before();
        let argument = if ends_here {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.consume_semicolon()?;
        let span = match &argument {
            Some(a) => join(start, a.span),
            None => start,
        };
        Ok(Stmt::Return(ReturnStmt { span, argument }))
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        let start = self.expect(TokenKind::KwIf)?.span;
        let test = self.parse_paren_expr()?;
        let consequent = self.parse_stmt()?;
        let mut span = join(start, consequent.span());
        let alternate = if self.at(TokenKind::KwElse) {
            self.next();
            let alt = self.parse_stmt()?;
            span = join(span, alt.span());
            Some(Box::new(alt))
        } else {
            None
        };
        Ok(Stmt::If(IfStmt {
            span,
            test,
            consequent: Box::new(consequent),
            alternate,
        }))
    }

    fn parse_for(&mut self) -> Result<Stmt, ParseError> {
        let start = self.expect(TokenKind::KwFor)?.span;
        self.expect(TokenKind::LParen)?;
        let init = match self.peek_kind() {
            Some(TokenKind::Semi) => None,
            Some(TokenKind::KwVar | TokenKind::KwLet | TokenKind::KwConst) => {
                Some(ForInit::VarDecl(self.parse_var_decl()?))
            }
            _ => Some(ForInit::Expr(self.parse_expr()?)),
        };
        if !self.at(TokenKind::Semi) {
            return Err(ParseError {
                message: "only C-style for loops can be parsed".to_string(),
                span: self.peek_span().unwrap_or(start),
            });
        }
        self.next();
        let test = if self.at(TokenKind::Semi) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(TokenKind::Semi)?;
        let update = if self.at(TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(TokenKind::RParen)?;
        let body = self.parse_stmt()?;
        Ok(Stmt::For(ForStmt {
            span: join(start, body.span()),
            init,
            test,
            update,
            body: Box::new(body),
        }))
    }

    fn parse_try(&mut self) -> Result<Stmt, ParseError> {
        let start = self.expect(TokenKind::KwTry)?.span;
        let block = self.parse_block()?;
        let mut span = join(start, block.span);
        let handler = if self.at(TokenKind::KwCatch) {
            let catch_start = self.expect_any()?.span;
            let param = if self.at(TokenKind::LParen) {
                self.next();
                let p = self.parse_pattern()?;
                self.expect(TokenKind::RParen)?;
                Some(p)
            } else {
                None
            };
            let body = self.parse_block()?;
            span = join(span, body.span);
            Some(CatchClause {
                span: join(catch_start, body.span),
                param,
                body,
            })
        } else {
            None
        };
        let finalizer = if self.at(TokenKind::KwFinally) {
            self.next();
            let body = self.parse_block()?;
            span = join(span, body.span);
            Some(body)
        } else {
            None
        };
        if handler.is_none() && finalizer.is_none() {
            return Err(ParseError {
                message: "missing catch or finally after try".to_string(),
                span,
            });
        }
        Ok(Stmt::Try(TryStmt {
            span,
            block,
            handler,
            finalizer,
        }))
    }

    fn parse_paren_expr(&mut self) -> Result<Expr, ParseError> {
        self.expect(TokenKind::LParen)?;
        let expr = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        Ok(expr)
    }

    pub fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        let first = self.parse_assign_expr()?;
        if !self.at(TokenKind::Comma) {
            return Ok(first);
        }
        let mut exprs = vec![first];
        while self.at(TokenKind::Comma) {
            self.next();
            exprs.push(self.parse_assign_expr()?);
        }
        let span = join(exprs[0].span, exprs[exprs.len() - 1].span);
        Ok(Expr {
            span,
            kind: ExprKind::Sequence(exprs),
        })
    }

    fn parse_assign_expr(&mut self) -> Result<Expr, ParseError> {
        if self.arrow_ahead() {
            return self.parse_arrow();
        }
        let target = self.parse_conditional_expr()?;
        let Some(op) = self.peek_kind().and_then(assign_op) else {
            return Ok(target);
        };
        self.next();
        let value = self.parse_assign_expr()?;
        Ok(Expr {
            span: join(target.span, value.span),
            kind: ExprKind::Assign {
                op,
                target: Box::new(target),
                value: Box::new(value),
            },
        })
    }

    /// `x => ...` or `(...) => ...` starting at the current token.
    fn arrow_ahead(&self) -> bool {
        match self.peek_kind() {
            Some(TokenKind::Ident(_)) => self.peek_kind_n(1) == Some(&TokenKind::FatArrow),
            Some(TokenKind::LParen) => {
                let mut depth = 0usize;
                let mut i = self.idx;
                while let Some(tok) = self.tokens.get(i) {
                    match tok.kind {
                        TokenKind::LParen => depth += 1,
                        TokenKind::RParen => {
                            depth -= 1;
                            if depth == 0 {
                                return self
                                    .tokens
                                    .get(i + 1)
                                    .is_some_and(|t| t.kind == TokenKind::FatArrow);
                            }
                        }
                        TokenKind::Eof => return false,
                        _ => {}
                    }
                    i += 1;
                }
                false
            }
            _ => false,
        }
    }

    fn parse_arrow(&mut self) -> Result<Expr, ParseError> {
        let start = self.peek_span().unwrap_or_else(|| span_between(0, 0));
        let (params, rest) = if self.at(TokenKind::LParen) {
            self.parse_params()?
        } else {
            let id = self.expect_ident()?;
            let param = Param {
                span: id.span,
                pattern: Pattern::Ident(id),
                default: None,
            };
            (vec![param], None)
        };
        self.expect(TokenKind::FatArrow)?;
        let body = if self.at(TokenKind::LBrace) {
            FunctionBody::Block(self.parse_block()?)
        } else {
            FunctionBody::Expr(Box::new(self.parse_assign_expr()?))
        };
        let end = match &body {
            FunctionBody::Block(b) => b.span,
            FunctionBody::Expr(e) => e.span,
        };
        let span = join(start, end);
        Ok(Expr {
            span,
            kind: ExprKind::Function(Box::new(Function {
                span,
                id: None,
                params,
                rest,
                generator: false,
                arrow: true,
                body,
            })),
        })
    }

    fn parse_conditional_expr(&mut self) -> Result<Expr, ParseError> {
        let test = self.parse_binary_expr(1)?;
        if !self.at(TokenKind::Question) {
            return Ok(test);
        }
        self.next();
        let consequent = self.parse_assign_expr()?;
        self.expect(TokenKind::Colon)?;
        let alternate = self.parse_assign_expr()?;
        Ok(Expr {
            span: join(test.span, alternate.span),
            kind: ExprKind::Conditional {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            },
        })
    }

    /// Precedence climbing over the left-associative binary and logical
    /// operators.
    fn parse_binary_expr(&mut self, min_prec: u8) -> Result<Expr, ParseError> {
        let mut left = self.parse_exp_expr()?;
        loop {
            let Some((op, prec)) = self.peek_kind().and_then(infix_op) else {
                break;
            };
            if prec < min_prec {
                break;
            }
            self.next();
            let right = self.parse_binary_expr(prec + 1)?;
            let span = join(left.span, right.span);
            let kind = match op {
                InfixOp::Binary(op) => ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                InfixOp::Logical(op) => ExprKind::Logical {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            };
            left = Expr { span, kind };
        }
        Ok(left)
    }

    fn parse_exp_expr(&mut self) -> Result<Expr, ParseError> {
        let base = self.parse_unary_expr()?;
        if !self.at(TokenKind::StarStar) {
            return Ok(base);
        }
        self.next();
        let exponent = self.parse_exp_expr()?;
        Ok(Expr {
            span: join(base.span, exponent.span),
            kind: ExprKind::Binary {
                op: BinaryOp::Exp,
                left: Box::new(base),
                right: Box::new(exponent),
            },
        })
    }

    fn parse_unary_expr(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek_kind() {
            Some(TokenKind::Bang) => Some(UnaryOp::Not),
            Some(TokenKind::Tilde) => Some(UnaryOp::BitNot),
            Some(TokenKind::Plus) => Some(UnaryOp::Plus),
            Some(TokenKind::Minus) => Some(UnaryOp::Minus),
            Some(TokenKind::KwTypeof) => Some(UnaryOp::Typeof),
            Some(TokenKind::KwVoid) => Some(UnaryOp::Void),
            Some(TokenKind::KwDelete) => Some(UnaryOp::Delete),
            _ => None,
        };
        if let Some(op) = op {
            let start = self.expect_any()?.span;
            let argument = self.parse_unary_expr()?;
            return Ok(Expr {
                span: join(start, argument.span),
                kind: ExprKind::Unary {
                    op,
                    argument: Box::new(argument),
                },
            });
        }

        if self.at(TokenKind::PlusPlus) || self.at(TokenKind::MinusMinus) {
            let tok = self.expect_any()?;
            let op = if tok.kind == TokenKind::PlusPlus {
                UpdateOp::Incr
            } else {
                UpdateOp::Decr
            };
            let argument = self.parse_unary_expr()?;
            return Ok(Expr {
                span: join(tok.span, argument.span),
                kind: ExprKind::Update {
                    op,
                    prefix: true,
                    argument: Box::new(argument),
                },
            });
        }

        let expr = self.parse_postfix_expr()?;
        if (self.at(TokenKind::PlusPlus) || self.at(TokenKind::MinusMinus)) && !self.newline_before()
        {
            let tok = self.expect_any()?;
            let op = if tok.kind == TokenKind::PlusPlus {
                UpdateOp::Incr
            } else {
                UpdateOp::Decr
            };
            return Ok(Expr {
                span: join(expr.span, tok.span),
                kind: ExprKind::Update {
                    op,
                    prefix: false,
                    argument: Box::new(expr),
                },
            });
        }
        Ok(expr)
    }

    /// Member access and call chains.
    fn parse_postfix_expr(&mut self) -> Result<Expr, ParseError> {
        let mut expr = if self.at(TokenKind::KwNew) {
            self.parse_new_expr()?
        } else {
            self.parse_primary_expr()?
        };
        loop {
            match self.peek_kind() {
                Some(TokenKind::Dot) => {
                    self.next();
                    let name = self.expect_property_name()?;
                    expr = Expr {
                        span: join(expr.span, name.span),
                        kind: ExprKind::Member {
                            object: Box::new(expr),
                            property: MemberProp::Ident(name),
                        },
                    };
                }
                Some(TokenKind::LBracket) => {
                    self.next();
                    let prop = self.parse_expr()?;
                    let end = self.expect(TokenKind::RBracket)?.span;
                    expr = Expr {
                        span: join(expr.span, end),
                        kind: ExprKind::Member {
                            object: Box::new(expr),
                            property: MemberProp::Computed(Box::new(prop)),
                        },
                    };
                }
                Some(TokenKind::LParen) => {
                    let (arguments, end) = self.parse_arguments()?;
                    expr = Expr {
                        span: join(expr.span, end),
                        kind: ExprKind::Call {
                            callee: Box::new(expr),
                            arguments,
                        },
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_new_expr(&mut self) -> Result<Expr, ParseError> {
        let start = self.expect(TokenKind::KwNew)?.span;
        let mut callee = if self.at(TokenKind::KwNew) {
            self.parse_new_expr()?
        } else {
            self.parse_primary_expr()?
        };
        while self.at(TokenKind::Dot) {
            self.next();
            let name = self.expect_property_name()?;
            callee = Expr {
                span: join(callee.span, name.span),
                kind: ExprKind::Member {
                    object: Box::new(callee),
                    property: MemberProp::Ident(name),
                },
            };
        }
        let (arguments, end) = if self.at(TokenKind::LParen) {
            self.parse_arguments()?
        } else {
            (Vec::new(), callee.span)
        };
        Ok(Expr {
            span: join(start, end),
            kind: ExprKind::New {
                callee: Box::new(callee),
                arguments,
            },
        })
    }

    fn parse_arguments(&mut self) -> Result<(Vec<Expr>, Span), ParseError> {
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        while !self.at(TokenKind::RParen) {
            args.push(self.parse_element()?);
            if !self.at(TokenKind::RParen) {
                self.expect(TokenKind::Comma)?;
            }
        }
        let end = self.expect(TokenKind::RParen)?.span;
        Ok((args, end))
    }

    /// An argument or array element, possibly spread.
    fn parse_element(&mut self) -> Result<Expr, ParseError> {
        if self.at(TokenKind::Ellipsis) {
            let start = self.expect_any()?.span;
            let arg = self.parse_assign_expr()?;
            return Ok(Expr {
                span: join(start, arg.span),
                kind: ExprKind::Spread(Box::new(arg)),
            });
        }
        self.parse_assign_expr()
    }

    fn parse_primary_expr(&mut self) -> Result<Expr, ParseError> {
        let Some(kind) = self.peek_kind() else {
            return Err(self.eof_error());
        };
        match kind {
            TokenKind::LParen => {
                let start = self.expect_any()?.span;
                let inner = self.parse_expr()?;
                let end = self.expect(TokenKind::RParen)?.span;
                // Keep the parenthesized extent for diagnostics.
                Ok(Expr {
                    span: join(start, end),
                    kind: inner.kind,
                })
            }
            TokenKind::LBracket => self.parse_array_literal(),
            TokenKind::LBrace => self.parse_object_literal(),
            TokenKind::KwFunction => {
                let func = self.parse_function()?;
                Ok(Expr {
                    span: func.span,
                    kind: ExprKind::Function(Box::new(func)),
                })
            }
            _ => {
                let tok = self.expect_any()?;
                let kind = match tok.kind {
                    TokenKind::Ident(name) => ExprKind::Ident(name),
                    TokenKind::Number(n) => ExprKind::Literal(Literal::Number(n)),
                    TokenKind::String(s) => ExprKind::Literal(Literal::String(s)),
                    TokenKind::RegExp { pattern, flags } => {
                        ExprKind::Literal(Literal::RegExp { pattern, flags })
                    }
                    TokenKind::KwTrue => ExprKind::Literal(Literal::Bool(true)),
                    TokenKind::KwFalse => ExprKind::Literal(Literal::Bool(false)),
                    TokenKind::KwNull => ExprKind::Literal(Literal::Null),
                    TokenKind::KwThis => ExprKind::This,
                    TokenKind::Eof => return Err(self.eof_error()),
                    other => {
                        return Err(ParseError {
                            message: format!("unexpected token {other:?}"),
                            span: tok.span,
                        });
                    }
                };
                Ok(Expr {
                    span: tok.span,
                    kind,
                })
            }
        }
    }

    fn parse_array_literal(&mut self) -> Result<Expr, ParseError> {
        let start = self.expect(TokenKind::LBracket)?.span;
        let mut elements = Vec::new();
        while !self.at(TokenKind::RBracket) {
            if self.at(TokenKind::Comma) {
                self.next();
                elements.push(None);
                continue;
            }
            elements.push(Some(self.parse_element()?));
            if !self.at(TokenKind::RBracket) {
                self.expect(TokenKind::Comma)?;
            }
        }
        let end = self.expect(TokenKind::RBracket)?.span;
        Ok(Expr {
            span: join(start, end),
            kind: ExprKind::Array(elements),
        })
    }

    fn parse_object_literal(&mut self) -> Result<Expr, ParseError> {
        let start = self.expect(TokenKind::LBrace)?.span;
        let mut props = Vec::new();
        while !self.at(TokenKind::RBrace) {
            let key = self.expect_property_name()?;
            let value = if self.at(TokenKind::Colon) {
                self.next();
                self.parse_assign_expr()?
            } else {
                Expr {
                    span: key.span,
                    kind: ExprKind::Ident(key.node.clone()),
                }
            };
            props.push(Property {
                span: join(key.span, value.span),
                key,
                value,
            });
            if !self.at(TokenKind::RBrace) {
                self.expect(TokenKind::Comma)?;
            }
        }
        let end = self.expect(TokenKind::RBrace)?.span;
        Ok(Expr {
            span: join(start, end),
            kind: ExprKind::Object(props),
        })
    }

    /// Consumes a statement terminator, applying automatic semicolon
    /// insertion before `}`, at end of input and after a line break.
    fn consume_semicolon(&mut self) -> Result<(), ParseError> {
        if self.at(TokenKind::Semi) {
            self.next();
            Ok(())
        } else if self.at(TokenKind::RBrace) || self.at(TokenKind::Eof) || self.newline_before() {
            Ok(())
        } else {
            Err(ParseError {
                message: "expected `;`".to_string(),
                span: self.peek_span().unwrap_or_else(|| span_between(0, 0)),
            })
        }
    }

    fn expect_ident(&mut self) -> Result<Ident, ParseError> {
        let tok = self.expect_any()?;
        match tok.kind {
            TokenKind::Ident(name) => Ok(Ident {
                span: tok.span,
                node: name,
            }),
            _ => Err(ParseError {
                message: "expected identifier".to_string(),
                span: tok.span,
            }),
        }
    }

    /// Property names may be identifiers, keywords, strings or numbers.
    fn expect_property_name(&mut self) -> Result<Ident, ParseError> {
        let tok = self.expect_any()?;
        let name = match tok.kind {
            TokenKind::Ident(name) | TokenKind::String(name) => name,
            TokenKind::Number(n) => n.to_string(),
            TokenKind::KwNull => "null".to_string(),
            TokenKind::KwTrue => "true".to_string(),
            TokenKind::KwFalse => "false".to_string(),
            TokenKind::KwFunction => "function".to_string(),
            TokenKind::KwDelete => "delete".to_string(),
            TokenKind::KwNew => "new".to_string(),
            TokenKind::KwIn => "in".to_string(),
            _ => {
                return Err(ParseError {
                    message: "expected property name".to_string(),
                    span: tok.span,
                });
            }
        };
        Ok(Ident {
            span: tok.span,
            node: name,
        })
    }

    fn expect(&mut self, expected: TokenKind) -> Result<Token, ParseError> {
        let tok = self.expect_any()?;
        if mem::discriminant(&tok.kind) == mem::discriminant(&expected) {
            Ok(tok)
        } else {
            Err(ParseError {
                message: format!("expected {expected:?}"),
                span: tok.span,
            })
        }
    }

    fn expect_any(&mut self) -> Result<Token, ParseError> {
        self.next().ok_or_else(|| self.eof_error())
    }

    fn eof_error(&self) -> ParseError {
        let end = self
            .tokens
            .last()
            .map(|t| t.span.offset())
            .unwrap_or(0);
        ParseError {
            message: "unexpected end of input".to_string(),
            span: span_between(end, end),
        }
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek_kind()
            .is_some_and(|k| mem::discriminant(k) == mem::discriminant(&kind))
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.idx)?.clone();
        self.idx += 1;
        Some(tok)
    }

    fn newline_before(&self) -> bool {
        self.tokens.get(self.idx).is_some_and(|t| t.newline_before)
    }

    fn peek_kind(&self) -> Option<&'a TokenKind> {
        self.tokens.get(self.idx).map(|t| &t.kind)
    }

    fn peek_kind_n(&self, n: usize) -> Option<&'a TokenKind> {
        self.tokens.get(self.idx + n).map(|t| &t.kind)
    }

    fn peek_span(&self) -> Option<Span> {
        self.tokens.get(self.idx).map(|t| t.span)
    }
}

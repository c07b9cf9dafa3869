#![forbid(unsafe_code)]

use std::collections::HashMap;

use esverify_ast::Span;

use crate::error::ResolveError;
use crate::ir::{
    Binding, BindingKind, Bindings, Block, DeclKind, Declaration, Expr, ExprKind, FuncOwner,
    FunctionDecl, Identifier, Program, Stmt, TopLevel,
};

/// Resolves every identifier of `program` against a fresh binding arena.
///
/// Consumes the program so a failed resolution never leaves a partially
/// resolved tree behind. Resolving an already resolved program rebuilds the
/// same arena.
pub fn resolve_program(mut program: Program) -> Result<Program, ResolveError> {
    let mut resolver = Resolver {
        bindings: Bindings::default(),
        scopes: ScopeStack::default(),
    };
    for top in &mut program.body {
        resolver.top_level(top)?;
    }
    for inv in &mut program.invariants {
        resolver.expr(inv, false)?;
    }
    program.bindings = resolver.bindings;
    Ok(program)
}

fn error(message: impl Into<String>, span: Span) -> ResolveError {
    ResolveError {
        message: message.into(),
        span,
    }
}

#[derive(Debug)]
struct ScopeStack {
    scopes: Vec<HashMap<String, Declaration>>,
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self {
            scopes: vec![HashMap::new()],
        }
    }
}

impl ScopeStack {
    fn push(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop(&mut self) {
        let _ = self.scopes.pop();
    }

    fn lookup(&self, name: &str) -> Option<Declaration> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    fn define(&mut self, name: &str, decl: Declaration, span: Span) -> Result<(), ResolveError> {
        if self.lookup(name).is_some() {
            return Err(error(format!("{name} already defined"), span));
        }
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), decl);
        }
        Ok(())
    }
}

struct Resolver {
    bindings: Bindings,
    scopes: ScopeStack,
}

impl Resolver {
    /// Runs `f` inside a fresh scope. The scope is popped on every exit path.
    fn scoped<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ResolveError>,
    ) -> Result<T, ResolveError> {
        self.scopes.push();
        let out = f(self);
        self.scopes.pop();
        out
    }

    fn def_symbol(&mut self, id: &mut Identifier, kind: BindingKind) -> Result<(), ResolveError> {
        let wrap = match kind {
            BindingKind::Var { .. } => Declaration::Var,
            BindingKind::Func { .. } => Declaration::Func,
            BindingKind::Param { .. } => Declaration::Param,
        };
        // Reserve the name before allocating so a duplicate leaves no arena entry.
        if self.scopes.lookup(&id.name).is_some() {
            return Err(error(format!("{} already defined", id.name), id.span));
        }
        let binding = self.bindings.alloc(Binding {
            name: id.name.clone(),
            kind,
            refs: Vec::new(),
            is_written_to: false,
        });
        id.decl = wrap(binding);
        self.scopes.define(&id.name, id.decl, id.span)
    }

    fn use_symbol(&mut self, id: &mut Identifier, write: bool) -> Result<(), ResolveError> {
        let Some(decl) = self.scopes.lookup(&id.name) else {
            return Err(error(format!("undefined variable {}", id.name), id.span));
        };
        let Some(binding) = decl.binding() else {
            return Err(error(format!("undefined variable {}", id.name), id.span));
        };
        id.decl = decl;
        let entry = self.bindings.get_mut(binding);
        entry.refs.push(id.span);
        if write {
            match entry.kind {
                BindingKind::Var {
                    kind: DeclKind::Const,
                    ..
                } => return Err(error("assignment to const", id.span)),
                BindingKind::Func { .. } => {
                    return Err(error("assignment to function declaration", id.span));
                }
                BindingKind::Param { .. } => {
                    return Err(error("assignment to function parameter", id.span));
                }
                BindingKind::Var { .. } => entry.is_written_to = true,
            }
        }
        Ok(())
    }

    fn top_level(&mut self, top: &mut TopLevel) -> Result<(), ResolveError> {
        match top {
            TopLevel::Function(f) => self.function_decl(f),
            TopLevel::Stmt(s) => self.stmt(s),
        }
    }

    fn function_decl(&mut self, f: &mut FunctionDecl) -> Result<(), ResolveError> {
        let origin = f.id.span;
        self.def_symbol(&mut f.id, BindingKind::Func { origin })?;
        let Some(owner) = f.id.binding() else {
            return Err(error(format!("undefined variable {}", f.id.name), origin));
        };
        self.scoped(|r| {
            for p in &mut f.params {
                let origin = p.span;
                r.def_symbol(
                    p,
                    BindingKind::Param {
                        owner: FuncOwner::Decl(owner),
                        origin,
                    },
                )?;
            }
            for e in &mut f.requires {
                r.expr(e, false)?;
            }
            for e in &mut f.ensures {
                r.expr(e, true)?;
            }
            for s in &mut f.body.body {
                r.stmt(s)?;
            }
            Ok(())
        })
    }

    fn block(&mut self, block: &mut Block) -> Result<(), ResolveError> {
        self.scoped(|r| {
            for s in &mut block.body {
                r.stmt(s)?;
            }
            Ok(())
        })
    }

    fn stmt(&mut self, stmt: &mut Stmt) -> Result<(), ResolveError> {
        match stmt {
            Stmt::VarDecl(d) => {
                let origin = d.id.span;
                self.def_symbol(
                    &mut d.id,
                    BindingKind::Var {
                        kind: d.kind,
                        origin,
                    },
                )?;
                self.expr(&mut d.init, false)
            }
            Stmt::Block(b) => self.block(b),
            Stmt::Expr(e) => self.expr(e, false),
            Stmt::Assert(a) => self.expr(&mut a.expr, false),
            Stmt::If(s) => {
                self.expr(&mut s.test, false)?;
                self.block(&mut s.consequent)?;
                self.block(&mut s.alternate)
            }
            Stmt::Return(r) => self.expr(&mut r.argument, false),
            Stmt::While(w) => {
                self.expr(&mut w.test, false)?;
                self.scoped(|r| {
                    for inv in &mut w.invariants {
                        r.expr(inv, false)?;
                    }
                    for s in &mut w.body.body {
                        r.stmt(s)?;
                    }
                    Ok(())
                })
            }
            Stmt::Debugger(_) => Ok(()),
        }
    }

    /// `in_ensures` enables `old(..)` and `pure()`.
    fn expr(&mut self, expr: &mut Expr, in_ensures: bool) -> Result<(), ResolveError> {
        let span = expr.span;
        match &mut expr.kind {
            ExprKind::Ident(id) => self.use_symbol(id, false),
            ExprKind::Old(id) => {
                if !in_ensures {
                    return Err(error(
                        "old() is only allowed in function postconditions",
                        span,
                    ));
                }
                self.use_symbol(id, false)
            }
            ExprKind::Pure => {
                if !in_ensures {
                    return Err(error(
                        "pure() is only allowed in function postconditions",
                        span,
                    ));
                }
                Ok(())
            }
            ExprKind::Literal(_) => Ok(()),
            ExprKind::Array(elements) | ExprKind::Sequence(elements) => {
                for e in elements {
                    self.expr(e, in_ensures)?;
                }
                Ok(())
            }
            ExprKind::Unary { argument, .. } => self.expr(argument, in_ensures),
            ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
                self.expr(left, in_ensures)?;
                self.expr(right, in_ensures)
            }
            ExprKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                self.expr(test, in_ensures)?;
                self.expr(consequent, in_ensures)?;
                self.expr(alternate, in_ensures)
            }
            ExprKind::Assign { target, value } => {
                self.expr(value, in_ensures)?;
                self.use_symbol(target, true)
            }
            ExprKind::Call {
                callee, arguments, ..
            } => {
                for a in arguments.iter_mut() {
                    self.expr(a, in_ensures)?;
                }
                self.expr(callee, false)
            }
            ExprKind::Function(f) => {
                let owner = FuncOwner::Expr(f.id);
                self.scoped(|r| {
                    for p in &mut f.params {
                        let origin = p.span;
                        r.def_symbol(p, BindingKind::Param { owner, origin })?;
                    }
                    for s in &mut f.body.body {
                        r.stmt(s)?;
                    }
                    Ok(())
                })
            }
        }
    }
}

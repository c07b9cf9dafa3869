#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::rc::Rc;

use esverify_ast::Span;
use esverify_core::ir::{
    BinaryOp, BindingId, Block, Expr, ExprKind, FunctionExpr, Identifier, Literal, LogicalOp,
    NodeId, Program, Stmt, TopLevel, UnaryOp,
};
use esverify_core::format_expr;

use crate::value::{
    less_than, loose_equals, strict_equals, to_int32, to_uint32, Closure, Env, Frame, FuncRef,
    Value,
};

pub const DEFAULT_FUEL: u64 = 100_000;
pub const DEFAULT_MAX_CALL_DEPTH: usize = 256;

#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum InterpretError {
    #[error("runtime error: {message}")]
    #[diagnostic(code(esverify::runtime))]
    Runtime {
        message: String,
        #[label]
        span: Span,
    },
    #[error("step budget of {0} exhausted")]
    #[diagnostic(code(esverify::fuel))]
    OutOfFuel(u64),
    #[error("{what} does not hold")]
    #[diagnostic(code(esverify::violation))]
    Violation {
        what: String,
        #[label]
        span: Span,
    },
}

#[derive(Clone, Debug)]
pub struct InterpConfig {
    /// Statements, loop iterations and calls allowed before giving up.
    pub fuel: u64,
    pub max_call_depth: usize,
}

impl Default for InterpConfig {
    fn default() -> Self {
        Self {
            fuel: DEFAULT_FUEL,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

/// A checked location in the program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Site {
    Assert(NodeId),
    LoopEntry(NodeId, usize),
    LoopMaintained(NodeId, usize),
    Requires { call: NodeId, index: usize },
    Ensures(BindingId, usize),
    FuncInvariant(BindingId, usize),
    Initially(usize),
}

/// Where a replay starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Entry {
    TopLevel,
    Function(BindingId),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Verdict {
    Violated,
    Passed,
    Undecided(String),
}

enum Halt {
    Target,
    Error(InterpretError),
}

impl From<InterpretError> for Halt {
    fn from(e: InterpretError) -> Self {
        Halt::Error(e)
    }
}

enum Flow {
    Normal,
    Return(Value),
}

fn runtime(message: impl Into<String>, span: Span) -> Halt {
    Halt::Error(InterpretError::Runtime {
        message: message.into(),
        span,
    })
}

/// Runs the top level of `program` and returns the final global values by
/// name. Every contract site is checked; the first failing one is an error.
pub fn run_program(
    program: &Program,
    cfg: &InterpConfig,
) -> Result<HashMap<String, Value>, InterpretError> {
    let mut interp = Interpreter::new(program, cfg, None);
    match interp.run_top_level() {
        Ok(()) => {}
        Err(Halt::Error(e)) => return Err(e),
        Err(Halt::Target) => {
            return Err(InterpretError::Runtime {
                message: "stopped at a check target".to_string(),
                span: esverify_ast::span(0, 0),
            });
        }
    }
    Ok(program
        .globals()
        .into_iter()
        .filter_map(|b| {
            interp
                .globals
                .lookup(b)
                .map(|v| (program.name(b).to_string(), v))
        })
        .collect())
}

/// Executes `program` from `entry` with `inputs` bound to globals and, for a
/// function entry, to its parameters. Reports whether `site` was violated.
///
/// Failures of other checks are assumptions of the replayed path that do
/// not hold, so they make the run undecided.
pub fn replay(
    program: &Program,
    cfg: &InterpConfig,
    entry: Entry,
    site: Site,
    inputs: &HashMap<BindingId, Value>,
) -> Verdict {
    let mut interp = Interpreter::new(program, cfg, Some(site));
    let out = match entry {
        Entry::TopLevel => interp.run_top_level(),
        Entry::Function(func) => interp.run_function(func, inputs),
    };
    let verdict = match out {
        Ok(()) => Verdict::Passed,
        Err(Halt::Target) => Verdict::Violated,
        Err(Halt::Error(e)) => Verdict::Undecided(e.to_string()),
    };
    tracing::debug!(?entry, ?site, ?verdict, "replay finished");
    verdict
}

struct Interpreter<'p> {
    program: &'p Program,
    fuel: u64,
    fuel_left: u64,
    max_call_depth: usize,
    depth: usize,
    target: Option<Site>,
    function_exprs: HashMap<NodeId, &'p FunctionExpr>,
    globals: Env,
    /// Non-zero while a contract expression is evaluated; nested checks are off.
    in_contract: usize,
    /// Entry snapshots of the globals for `old(..)` and `pure()`.
    old_stack: Vec<HashMap<BindingId, Value>>,
    /// Results of invocations whose postconditions are being evaluated.
    memo: Vec<(BindingId, Vec<Value>, Value)>,
}

impl<'p> Interpreter<'p> {
    fn new(program: &'p Program, cfg: &InterpConfig, target: Option<Site>) -> Self {
        let mut function_exprs = HashMap::new();
        for top in &program.body {
            match top {
                TopLevel::Function(f) => {
                    for e in f.requires.iter().chain(&f.ensures) {
                        collect_expr(e, &mut function_exprs);
                    }
                    collect_block(&f.body, &mut function_exprs);
                }
                TopLevel::Stmt(s) => collect_stmt(s, &mut function_exprs),
            }
        }
        for inv in &program.invariants {
            collect_expr(inv, &mut function_exprs);
        }

        let globals: Env = Rc::new(Frame::default());
        for f in program.functions() {
            if let Some(b) = f.id.binding() {
                globals.define(b, Value::Function(Closure::decl(b)));
            }
        }

        Self {
            program,
            fuel: cfg.fuel,
            fuel_left: cfg.fuel,
            max_call_depth: cfg.max_call_depth,
            depth: 0,
            target,
            function_exprs,
            globals,
            in_contract: 0,
            old_stack: Vec::new(),
            memo: Vec::new(),
        }
    }

    fn tick(&mut self) -> Result<(), Halt> {
        if self.fuel_left == 0 {
            return Err(InterpretError::OutOfFuel(self.fuel).into());
        }
        self.fuel_left -= 1;
        Ok(())
    }

    fn check(&self, site: Site, holds: bool, expr: &Expr) -> Result<(), Halt> {
        if holds || self.in_contract > 0 {
            return Ok(());
        }
        if self.target == Some(site) {
            return Err(Halt::Target);
        }
        Err(InterpretError::Violation {
            what: format_expr(expr),
            span: expr.span,
        }
        .into())
    }

    /// Evaluates a contract expression without letting it change the globals.
    fn holds(&mut self, expr: &Expr, env: &Env) -> Result<bool, Halt> {
        let saved = self.globals.vars.borrow().clone();
        self.in_contract += 1;
        let out = self.eval(expr, env);
        self.in_contract -= 1;
        *self.globals.vars.borrow_mut() = saved;
        Ok(out?.truthy())
    }

    fn run_top_level(&mut self) -> Result<(), Halt> {
        let program = self.program;
        let env = Rc::clone(&self.globals);
        for top in &program.body {
            if let TopLevel::Stmt(s) = top {
                if let Flow::Return(_) = self.exec_stmt(s, &env)? {
                    return Err(runtime("return outside of a function", s_span(s)));
                }
            }
        }
        for (k, inv) in program.invariants.iter().enumerate() {
            let ok = self.holds(inv, &env)?;
            self.check(Site::Initially(k), ok, inv)?;
        }
        Ok(())
    }

    fn run_function(
        &mut self,
        func: BindingId,
        inputs: &HashMap<BindingId, Value>,
    ) -> Result<(), Halt> {
        let program = self.program;
        for g in program.globals() {
            let v = inputs.get(&g).cloned().unwrap_or(Value::Undefined);
            self.globals.define(g, v);
        }
        let Some(f) = program.function(func) else {
            return Err(runtime(
                format!("unknown function {}", program.name(func)),
                esverify_ast::span(0, 0),
            ));
        };
        let args = f
            .params
            .iter()
            .map(|p| {
                p.binding()
                    .and_then(|b| inputs.get(&b).cloned())
                    .unwrap_or(Value::Undefined)
            })
            .collect();
        self.call_decl(func, args, None, f.span)?;
        Ok(())
    }

    fn call(
        &mut self,
        callee: Value,
        args: Vec<Value>,
        call: Option<NodeId>,
        span: Span,
    ) -> Result<Value, Halt> {
        self.tick()?;
        let Value::Function(closure) = callee else {
            return Err(runtime(format!("{callee} is not a function"), span));
        };
        if self.depth >= self.max_call_depth {
            return Err(runtime("maximum call depth exceeded", span));
        }
        self.depth += 1;
        let out = match closure.func {
            FuncRef::Decl(b) => self.call_decl(b, args, call, span),
            FuncRef::Expr(id) => self.call_expr(id, closure.env.as_ref(), args, span),
            FuncRef::Opaque(_) => Err(runtime("call of an opaque function value", span)),
        };
        self.depth -= 1;
        out
    }

    fn call_expr(
        &mut self,
        id: NodeId,
        captured: Option<&Env>,
        args: Vec<Value>,
        span: Span,
    ) -> Result<Value, Halt> {
        let Some(f) = self.function_exprs.get(&id).copied() else {
            return Err(runtime("call of an unknown function expression", span));
        };
        let env = Frame::child(captured.unwrap_or(&self.globals));
        bind_params(&env, &f.params, args);
        match self.exec_stmts(&f.body.body, &env)? {
            Flow::Return(v) => Ok(v),
            Flow::Normal => Ok(Value::Undefined),
        }
    }

    fn call_decl(
        &mut self,
        func: BindingId,
        args: Vec<Value>,
        call: Option<NodeId>,
        span: Span,
    ) -> Result<Value, Halt> {
        if self.in_contract > 0 {
            if let Some((_, _, result)) = self
                .memo
                .iter()
                .rev()
                .find(|(f, a, _)| *f == func && same_args(a, &args))
            {
                return Ok(result.clone());
            }
        }
        let program = self.program;
        let Some(f) = program.function(func) else {
            return Err(runtime(
                format!("{} is not a function declaration", program.name(func)),
                span,
            ));
        };
        let env = Frame::child(&self.globals);
        bind_params(&env, &f.params, args.clone());

        let checked = self.in_contract == 0;
        let mut invariants_held = false;
        let mut old = HashMap::new();
        if checked {
            for (index, req) in f.requires.iter().enumerate() {
                let ok = self.holds(req, &env)?;
                match call {
                    Some(call) => self.check(Site::Requires { call, index }, ok, req)?,
                    None if !ok => {
                        return Err(InterpretError::Violation {
                            what: format!("precondition {}", format_expr(req)),
                            span: req.span,
                        }
                        .into());
                    }
                    None => {}
                }
            }
            invariants_held = true;
            for inv in &program.invariants {
                if !self.holds(inv, &env)? {
                    invariants_held = false;
                    break;
                }
            }
            old = self.globals.vars.borrow().clone();
        }

        let result = match self.exec_stmts(&f.body.body, &env)? {
            Flow::Return(v) => v,
            Flow::Normal => Value::Undefined,
        };

        if checked {
            self.memo.push((func, args, result.clone()));
            self.old_stack.push(old);
            let out = self.check_exit(func, &f.ensures, invariants_held, &env);
            self.old_stack.pop();
            self.memo.pop();
            out?;
        }
        Ok(result)
    }

    fn check_exit(
        &mut self,
        func: BindingId,
        ensures: &[Expr],
        invariants_held: bool,
        env: &Env,
    ) -> Result<(), Halt> {
        for (k, post) in ensures.iter().enumerate() {
            let ok = self.holds(post, env)?;
            self.check(Site::Ensures(func, k), ok, post)?;
        }
        let program = self.program;
        if invariants_held {
            for (k, inv) in program.invariants.iter().enumerate() {
                let ok = self.holds(inv, env)?;
                self.check(Site::FuncInvariant(func, k), ok, inv)?;
            }
        }
        Ok(())
    }

    fn exec_stmts(&mut self, stmts: &[Stmt], env: &Env) -> Result<Flow, Halt> {
        for s in stmts {
            if let Flow::Return(v) = self.exec_stmt(s, env)? {
                return Ok(Flow::Return(v));
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_block(&mut self, block: &Block, env: &Env) -> Result<Flow, Halt> {
        let inner = Frame::child(env);
        self.exec_stmts(&block.body, &inner)
    }

    fn exec_stmt(&mut self, stmt: &Stmt, env: &Env) -> Result<Flow, Halt> {
        self.tick()?;
        match stmt {
            Stmt::VarDecl(d) => {
                let v = self.eval(&d.init, env)?;
                let Some(b) = d.id.binding() else {
                    return Err(runtime(format!("unresolved {}", d.id.name), d.id.span));
                };
                env.define(b, v);
            }
            Stmt::Block(b) => return self.exec_block(b, env),
            Stmt::Expr(e) => {
                self.eval(e, env)?;
            }
            Stmt::Assert(a) => {
                if self.in_contract == 0 {
                    let ok = self.holds(&a.expr, env)?;
                    self.check(Site::Assert(a.id), ok, &a.expr)?;
                }
            }
            Stmt::If(s) => {
                let branch = if self.eval(&s.test, env)?.truthy() {
                    &s.consequent
                } else {
                    &s.alternate
                };
                return self.exec_block(branch, env);
            }
            Stmt::Return(r) => return Ok(Flow::Return(self.eval(&r.argument, env)?)),
            Stmt::While(w) => {
                let checked = self.in_contract == 0;
                if checked {
                    for (k, inv) in w.invariants.iter().enumerate() {
                        let ok = self.holds(inv, env)?;
                        self.check(Site::LoopEntry(w.id, k), ok, inv)?;
                    }
                }
                loop {
                    self.tick()?;
                    if !self.eval(&w.test, env)?.truthy() {
                        break;
                    }
                    if let Flow::Return(v) = self.exec_block(&w.body, env)? {
                        return Ok(Flow::Return(v));
                    }
                    if checked {
                        for (k, inv) in w.invariants.iter().enumerate() {
                            let ok = self.holds(inv, env)?;
                            self.check(Site::LoopMaintained(w.id, k), ok, inv)?;
                        }
                    }
                }
            }
            Stmt::Debugger(_) => {}
        }
        Ok(Flow::Normal)
    }

    fn lookup(&self, id: &Identifier, env: &Env) -> Result<Value, Halt> {
        id.binding()
            .and_then(|b| env.lookup(b))
            .ok_or_else(|| runtime(format!("{} is not initialized", id.name), id.span))
    }

    fn eval(&mut self, expr: &Expr, env: &Env) -> Result<Value, Halt> {
        let span = expr.span;
        Ok(match &expr.kind {
            ExprKind::Ident(id) => self.lookup(id, env)?,
            ExprKind::Old(id) => {
                let snapshot = id
                    .binding()
                    .and_then(|b| self.old_stack.last().and_then(|old| old.get(&b).cloned()));
                match snapshot {
                    Some(v) => v,
                    None => self.lookup(id, env)?,
                }
            }
            ExprKind::Pure => {
                let unchanged = match self.old_stack.last() {
                    Some(old) => *self.globals.vars.borrow() == *old,
                    None => true,
                };
                Value::Bool(unchanged)
            }
            ExprKind::Literal(lit) => match lit {
                Literal::Undefined => Value::Undefined,
                Literal::Null => Value::Null,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Number(n) => Value::Number(*n),
                Literal::String(s) => Value::String(s.clone()),
            },
            ExprKind::Array(elements) => {
                let mut out = Vec::with_capacity(elements.len());
                for e in elements {
                    out.push(self.eval(e, env)?);
                }
                Value::Array(Rc::new(out))
            }
            ExprKind::Unary { op, argument } => {
                let v = self.eval(argument, env)?;
                match op {
                    UnaryOp::Minus => Value::Number(-v.to_number()),
                    UnaryOp::Plus => Value::Number(v.to_number()),
                    UnaryOp::Not => Value::Bool(!v.truthy()),
                    UnaryOp::BitNot => Value::Number(f64::from(!to_int32(v.to_number()))),
                    UnaryOp::Typeof => Value::String(v.type_of().to_string()),
                    UnaryOp::Void => Value::Undefined,
                }
            }
            ExprKind::Binary { op, left, right } => {
                let l = self.eval(left, env)?;
                let r = self.eval(right, env)?;
                binary(*op, &l, &r)
            }
            ExprKind::Logical { op, left, right } => {
                let l = self.eval(left, env)?;
                match (op, l.truthy()) {
                    (LogicalOp::And, false) | (LogicalOp::Or, true) => l,
                    _ => self.eval(right, env)?,
                }
            }
            ExprKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, env)?.truthy() {
                    self.eval(consequent, env)?
                } else {
                    self.eval(alternate, env)?
                }
            }
            ExprKind::Assign { target, value } => {
                let v = self.eval(value, env)?;
                let assigned = target
                    .binding()
                    .is_some_and(|b| env.assign(b, v.clone()));
                if !assigned {
                    return Err(runtime(
                        format!("{} is not initialized", target.name),
                        target.span,
                    ));
                }
                v
            }
            ExprKind::Sequence(exprs) => {
                let mut last = Value::Undefined;
                for e in exprs {
                    last = self.eval(e, env)?;
                }
                last
            }
            ExprKind::Call {
                id,
                callee,
                arguments,
            } => {
                let f = self.eval(callee, env)?;
                let mut args = Vec::with_capacity(arguments.len());
                for a in arguments {
                    args.push(self.eval(a, env)?);
                }
                self.call(f, args, Some(*id), span)?
            }
            ExprKind::Function(f) => Value::Function(Closure {
                func: FuncRef::Expr(f.id),
                env: Some(Rc::clone(env)),
            }),
        })
    }
}

fn s_span(stmt: &Stmt) -> Span {
    match stmt {
        Stmt::VarDecl(d) => d.span,
        Stmt::Block(b) => b.span,
        Stmt::Expr(e) => e.span,
        Stmt::Assert(a) => a.span,
        Stmt::If(s) => s.span,
        Stmt::Return(r) => r.span,
        Stmt::While(w) => w.span,
        Stmt::Debugger(span) => *span,
    }
}

fn bind_params(env: &Env, params: &[Identifier], args: Vec<Value>) {
    let mut args = args.into_iter();
    for p in params {
        let v = args.next().unwrap_or(Value::Undefined);
        if let Some(b) = p.binding() {
            env.define(b, v);
        }
    }
}

fn same_args(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x == y)
}

fn binary(op: BinaryOp, l: &Value, r: &Value) -> Value {
    let num = |f: fn(f64, f64) -> f64| Value::Number(f(l.to_number(), r.to_number()));
    let int = |f: fn(i32, i32) -> i32| {
        Value::Number(f64::from(f(to_int32(l.to_number()), to_int32(r.to_number()))))
    };
    let shift = to_uint32(r.to_number()) & 31;
    match op {
        BinaryOp::Eq => Value::Bool(loose_equals(l, r)),
        BinaryOp::NotEq => Value::Bool(!loose_equals(l, r)),
        BinaryOp::StrictEq => Value::Bool(strict_equals(l, r)),
        BinaryOp::StrictNotEq => Value::Bool(!strict_equals(l, r)),
        BinaryOp::Lt => Value::Bool(less_than(l, r) == Some(true)),
        BinaryOp::Gt => Value::Bool(less_than(r, l) == Some(true)),
        BinaryOp::Le => Value::Bool(less_than(r, l) == Some(false)),
        BinaryOp::Ge => Value::Bool(less_than(l, r) == Some(false)),
        BinaryOp::Add => {
            let (pl, pr) = (l.to_primitive(), r.to_primitive());
            if matches!(pl, Value::String(_)) || matches!(pr, Value::String(_)) {
                Value::String(pl.to_js_string() + &pr.to_js_string())
            } else {
                Value::Number(pl.to_number() + pr.to_number())
            }
        }
        BinaryOp::Sub => num(|a, b| a - b),
        BinaryOp::Mul => num(|a, b| a * b),
        BinaryOp::Div => num(|a, b| a / b),
        BinaryOp::Mod => num(|a, b| a % b),
        BinaryOp::Shl => Value::Number(f64::from(to_int32(l.to_number()).wrapping_shl(shift))),
        BinaryOp::Shr => Value::Number(f64::from(to_int32(l.to_number()).wrapping_shr(shift))),
        BinaryOp::UShr => Value::Number(f64::from(to_uint32(l.to_number()).wrapping_shr(shift))),
        BinaryOp::BitOr => int(|a, b| a | b),
        BinaryOp::BitXor => int(|a, b| a ^ b),
        BinaryOp::BitAnd => int(|a, b| a & b),
    }
}

fn collect_block<'p>(block: &'p Block, out: &mut HashMap<NodeId, &'p FunctionExpr>) {
    for s in &block.body {
        collect_stmt(s, out);
    }
}

fn collect_stmt<'p>(stmt: &'p Stmt, out: &mut HashMap<NodeId, &'p FunctionExpr>) {
    match stmt {
        Stmt::VarDecl(d) => collect_expr(&d.init, out),
        Stmt::Block(b) => collect_block(b, out),
        Stmt::Expr(e) => collect_expr(e, out),
        Stmt::Assert(a) => collect_expr(&a.expr, out),
        Stmt::If(s) => {
            collect_expr(&s.test, out);
            collect_block(&s.consequent, out);
            collect_block(&s.alternate, out);
        }
        Stmt::Return(r) => collect_expr(&r.argument, out),
        Stmt::While(w) => {
            collect_expr(&w.test, out);
            for inv in &w.invariants {
                collect_expr(inv, out);
            }
            collect_block(&w.body, out);
        }
        Stmt::Debugger(_) => {}
    }
}

fn collect_expr<'p>(expr: &'p Expr, out: &mut HashMap<NodeId, &'p FunctionExpr>) {
    match &expr.kind {
        ExprKind::Ident(_) | ExprKind::Old(_) | ExprKind::Literal(_) | ExprKind::Pure => {}
        ExprKind::Array(es) | ExprKind::Sequence(es) => {
            for e in es {
                collect_expr(e, out);
            }
        }
        ExprKind::Unary { argument, .. } => collect_expr(argument, out),
        ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
            collect_expr(left, out);
            collect_expr(right, out);
        }
        ExprKind::Conditional {
            test,
            consequent,
            alternate,
        } => {
            collect_expr(test, out);
            collect_expr(consequent, out);
            collect_expr(alternate, out);
        }
        ExprKind::Assign { value, .. } => collect_expr(value, out),
        ExprKind::Call {
            callee, arguments, ..
        } => {
            collect_expr(callee, out);
            for a in arguments {
                collect_expr(a, out);
            }
        }
        ExprKind::Function(f) => {
            out.insert(f.id, f);
            collect_block(&f.body, out);
        }
    }
}

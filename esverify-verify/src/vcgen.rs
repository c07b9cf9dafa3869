#![forbid(unsafe_code)]

//! Symbolic execution of the IR into verification conditions.
//!
//! Each function body and the top level run as separate units. A unit keeps
//! SSA values for every binding, a path guard, and an append-only list of
//! facts; a condition is the unit's facts plus the negated goal at the point
//! it is reached.

use std::collections::HashMap;

use esverify_core::format_expr;
use esverify_core::ir::{
    BindingId, Block, Declaration, Expr, ExprKind, FunctionDecl, Identifier, Literal, LogicalOp,
    NodeId, Program, Stmt, TopLevel, WhileStmt,
};
use esverify_interpret::{Entry, Site};

use crate::encode;
use crate::smt::{Namer, Term, PRELUDE};

/// Elements of an array-valued model variable fetched with the model.
pub const ARRAY_MODEL_LIMIT: usize = 4;

/// An unconstrained constant of a condition, reported in its model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FreeVar {
    pub smt: String,
    /// Parameter or global the constant stands for at function entry.
    pub binding: Option<BindingId>,
}

#[derive(Clone, Debug)]
pub(crate) struct RawVc {
    pub description: String,
    pub script: String,
    pub entry: Entry,
    pub site: Site,
    pub free: Vec<FreeVar>,
}

pub(crate) struct Generated {
    pub vcs: Vec<RawVc>,
    /// Function declarations by `jsfun` index.
    pub functions: Vec<BindingId>,
}

pub(crate) fn generate(program: &Program) -> Generated {
    Generator::new(program).run()
}

/// Terms requested with `get-value`, in the order the model decoder reads them.
pub(crate) fn model_terms(free: &[FreeVar]) -> Vec<String> {
    let mut out = Vec::with_capacity(free.len() * (ARRAY_MODEL_LIMIT + 2));
    for v in free {
        let arr = format!("(arrv {})", v.smt);
        out.push(v.smt.clone());
        out.push(format!("(arrlength {arr})"));
        for i in 0..ARRAY_MODEL_LIMIT {
            out.push(format!("(arrelems {arr} {i})"));
        }
    }
    out
}

type Vars = HashMap<BindingId, Term>;

struct Unit {
    entry: Entry,
    prefix: String,
    names: Namer,
    decls: Vec<String>,
    facts: Vec<Term>,
    free: Vec<FreeVar>,
    jscalls: HashMap<usize, String>,
    vars: Vars,
    guard: Term,
    /// Result constants of the function activations being executed.
    results: Vec<Term>,
    /// Zero in the unit's own body; positive inside inlined callees.
    depth: usize,
}

impl Unit {
    fn declare(&mut self, base: &str) -> Term {
        let name = self.names.fresh(base);
        self.decls.push(format!("(declare-const {name} JSVal)"));
        Term::Sym(name)
    }

    fn assume(&mut self, t: Term) {
        let fact = Term::implies(self.guard.clone(), t);
        if fact != Term::Bool(true) {
            self.facts.push(fact);
        }
    }

    fn free_var(&mut self, smt: String, binding: Option<BindingId>) {
        let len = Term::app(
            "arrlength",
            vec![Term::app("arrv", vec![Term::sym(smt.clone())])],
        );
        self.facts
            .push(Term::app(">=", vec![len, Term::Int(0)]));
        self.free.push(FreeVar { smt, binding });
    }
}

struct Generator<'p> {
    program: &'p Program,
    names: Namer,
    fun_syms: HashMap<BindingId, String>,
    fun_index: HashMap<BindingId, usize>,
    functions: Vec<BindingId>,
    fun_decls: String,
    written_globals: Vec<BindingId>,
    vcs: Vec<RawVc>,
    seen: HashMap<String, usize>,
}

impl<'p> Generator<'p> {
    fn new(program: &'p Program) -> Self {
        let mut names = Namer::default();
        let mut fun_syms = HashMap::new();
        let mut fun_index = HashMap::new();
        let mut functions = Vec::new();
        let mut fun_decls = String::new();
        for f in program.functions() {
            let Some(b) = f.id.binding() else { continue };
            let sym = names.exact(&f.id.name);
            let domain = vec!["JSVal"; f.params.len()].join(" ");
            fun_decls.push_str(&format!("(declare-fun {sym} ({domain}) JSVal)\n"));
            fun_syms.insert(b, sym);
            fun_index.insert(b, functions.len());
            functions.push(b);
        }
        let written_globals = program
            .globals()
            .into_iter()
            .filter(|g| program.bindings.get(*g).is_written_to)
            .collect();
        Self {
            program,
            names,
            fun_syms,
            fun_index,
            functions,
            fun_decls,
            written_globals,
            vcs: Vec::new(),
            seen: HashMap::new(),
        }
    }

    fn run(mut self) -> Generated {
        let program = self.program;
        let mut top = self.unit(Entry::TopLevel, String::new());
        for item in &program.body {
            match item {
                TopLevel::Function(f) => self.function(f),
                TopLevel::Stmt(s) => {
                    if !top.guard.is_false() {
                        self.stmt(&mut top, s);
                    }
                }
            }
        }
        for (k, inv) in program.invariants.iter().enumerate() {
            let goal = encode::truthy(self.contract(&mut top, inv, None));
            self.emit(
                &top,
                format!("initially:\n{}", format_expr(inv)),
                goal,
                Site::Initially(k),
            );
        }
        tracing::debug!(count = self.vcs.len(), "generated verification conditions");
        Generated {
            vcs: self.vcs,
            functions: self.functions,
        }
    }

    fn unit(&self, entry: Entry, prefix: String) -> Unit {
        Unit {
            entry,
            prefix,
            names: self.names.clone(),
            decls: Vec::new(),
            facts: Vec::new(),
            free: Vec::new(),
            jscalls: HashMap::new(),
            vars: HashMap::new(),
            guard: Term::Bool(true),
            results: Vec::new(),
            depth: 0,
        }
    }

    fn function(&mut self, f: &FunctionDecl) {
        let Some(fb) = f.id.binding() else { return };
        let program = self.program;
        let mut u = self.unit(Entry::Function(fb), format!("{}:\n", f.id.name));
        let _span = tracing::debug_span!("function", name = %f.id.name).entered();

        let inputs = program
            .globals()
            .into_iter()
            .chain(f.params.iter().filter_map(Identifier::binding));
        for b in inputs {
            let smt = u.names.exact(program.name(b));
            u.decls.push(format!("(declare-const {smt} JSVal)"));
            u.vars.insert(b, Term::sym(smt.clone()));
            u.free_var(smt, Some(b));
        }
        let entry_vars = u.vars.clone();

        for inv in &program.invariants {
            let t = encode::truthy(self.contract(&mut u, inv, None));
            u.assume(t);
        }
        for req in &f.requires {
            let t = encode::truthy(self.contract(&mut u, req, None));
            u.assume(t);
        }

        let result = u.declare("result");
        let params = f
            .params
            .iter()
            .map(|p| {
                p.binding()
                    .and_then(|b| u.vars.get(&b).cloned())
                    .unwrap_or_else(encode::undefined)
            })
            .collect();
        let app = self.app(fb, params);
        u.facts.push(Term::eq(app, result.clone()));

        u.results.push(result.clone());
        self.block(&mut u, &f.body.body);
        u.assume(Term::eq(result, encode::undefined()));
        u.results.pop();
        u.guard = Term::Bool(true);

        for (k, post) in f.ensures.iter().enumerate() {
            let goal = match post.kind {
                ExprKind::Pure => self.unchanged(&u, &entry_vars),
                _ => encode::truthy(self.contract(&mut u, post, Some(&entry_vars))),
            };
            self.emit(&u, format_expr(post), goal, Site::Ensures(fb, k));
        }
        for (k, inv) in program.invariants.iter().enumerate() {
            let goal = encode::truthy(self.contract(&mut u, inv, None));
            self.emit(&u, format_expr(inv), goal, Site::FuncInvariant(fb, k));
        }
    }

    fn unchanged(&self, u: &Unit, entry_vars: &Vars) -> Term {
        Term::and(
            self.written_globals
                .iter()
                .filter_map(|g| Some(Term::eq(u.vars.get(g)?.clone(), entry_vars.get(g)?.clone())))
                .collect(),
        )
    }

    fn emit(&mut self, u: &Unit, description: String, goal: Term, site: Site) {
        let goal = Term::implies(u.guard.clone(), goal);
        let description = self.dedupe(format!("{}{}", u.prefix, description));
        let script = self.render(u, &goal);
        tracing::trace!(%description, "verification condition");
        self.vcs.push(RawVc {
            description,
            script,
            entry: u.entry,
            site,
            free: u.free.clone(),
        });
    }

    fn dedupe(&mut self, description: String) -> String {
        let n = self.seen.entry(description.clone()).or_insert(0);
        *n += 1;
        if *n == 1 {
            description
        } else {
            format!("{description}\n#{n}")
        }
    }

    fn render(&self, u: &Unit, goal: &Term) -> String {
        let mut s = String::from(PRELUDE);
        s.push_str(&self.fun_decls);
        for d in &u.decls {
            s.push_str(d);
            s.push('\n');
        }
        for f in &u.facts {
            s.push_str(&format!("(assert {f})\n"));
        }
        s.push_str(&format!("(assert (not {goal}))\n(check-sat)\n"));
        let terms = model_terms(&u.free);
        if !terms.is_empty() {
            s.push_str(&format!("(get-value ({}))\n", terms.join(" ")));
        }
        s
    }

    fn app(&self, func: BindingId, args: Vec<Term>) -> Term {
        let sym = self
            .fun_syms
            .get(&func)
            .cloned()
            .unwrap_or_else(|| self.program.name(func).to_string());
        Term::app(sym, args)
    }

    // Statements

    fn block(&mut self, u: &mut Unit, stmts: &[Stmt]) {
        for s in stmts {
            if u.guard.is_false() {
                break;
            }
            self.stmt(u, s);
        }
    }

    fn stmt(&mut self, u: &mut Unit, stmt: &Stmt) {
        match stmt {
            Stmt::VarDecl(d) => {
                let v = self.expr(u, &d.init);
                if let Some(b) = d.id.binding() {
                    self.assign(u, b, v);
                }
            }
            Stmt::Block(b) => self.block(u, &b.body),
            Stmt::Expr(e) => {
                self.expr(u, e);
            }
            Stmt::Assert(a) => {
                let goal = encode::truthy(self.expr(u, &a.expr));
                if u.depth == 0 {
                    self.emit(
                        u,
                        format!("assert:\n{}", format_expr(&a.expr)),
                        goal.clone(),
                        Site::Assert(a.id),
                    );
                }
                u.assume(goal);
            }
            Stmt::If(s) => {
                let c = encode::truthy(self.expr(u, &s.test));
                self.branch(
                    u,
                    c,
                    |g, u| g.block(u, &s.consequent.body),
                    |g, u| g.block(u, &s.alternate.body),
                );
            }
            Stmt::Return(r) => {
                let v = self.expr(u, &r.argument);
                if let Some(result) = u.results.last().cloned() {
                    u.assume(Term::eq(result, v));
                }
                u.guard = Term::Bool(false);
            }
            Stmt::While(w) => self.while_loop(u, w),
            Stmt::Debugger(_) => {}
        }
    }

    fn while_loop(&mut self, u: &mut Unit, w: &WhileStmt) {
        let mut written = Vec::new();
        assigned_in_block(&w.body, &mut written);
        assigned_in_expr(&w.test, &mut written);
        if block_has_call(&w.body) || expr_has_call(&w.test) {
            for g in &self.written_globals {
                if !written.contains(g) {
                    written.push(*g);
                }
            }
        }

        if u.depth == 0 {
            for (k, inv) in w.invariants.iter().enumerate() {
                let goal = encode::truthy(self.contract(u, inv, None));
                self.emit(
                    u,
                    format!("invariant on entry:\n{}", format_expr(inv)),
                    goal,
                    Site::LoopEntry(w.id, k),
                );
            }

            let (facts, free) = (u.facts.len(), u.free.len());
            let saved = (u.vars.clone(), u.guard.clone());
            self.havoc(u, &written);
            self.assume_all(u, &w.invariants);
            let c = encode::truthy(self.expr(u, &w.test));
            u.guard = Term::and(vec![u.guard.clone(), c]);
            self.block(u, &w.body.body);
            for (k, inv) in w.invariants.iter().enumerate() {
                let goal = encode::truthy(self.contract(u, inv, None));
                self.emit(
                    u,
                    format!("invariant maintained:\n{}", format_expr(inv)),
                    goal,
                    Site::LoopMaintained(w.id, k),
                );
            }
            u.facts.truncate(facts);
            u.free.truncate(free);
            (u.vars, u.guard) = saved;
        }

        self.havoc(u, &written);
        if block_has_return(&w.body) {
            let flag = u.names.fresh("returned");
            u.decls.push(format!("(declare-const {flag} Bool)"));
            u.guard = Term::and(vec![u.guard.clone(), Term::not(Term::sym(flag))]);
        }
        self.assume_all(u, &w.invariants);
        let c = encode::truthy(self.expr(u, &w.test));
        u.assume(Term::not(c));
    }

    fn assume_all(&mut self, u: &mut Unit, exprs: &[Expr]) {
        for e in exprs {
            let t = encode::truthy(self.contract(u, e, None));
            u.assume(t);
        }
    }

    fn havoc(&mut self, u: &mut Unit, bindings: &[BindingId]) {
        for &b in bindings {
            let name = u.names.fresh(self.program.name(b));
            u.decls.push(format!("(declare-const {name} JSVal)"));
            u.vars.insert(b, Term::sym(name.clone()));
            u.free_var(name, None);
        }
    }

    /// Forgets the written globals after an opaque call and re-establishes
    /// the program invariants on the new values.
    fn havoc_globals(&mut self, u: &mut Unit) {
        let globals = self.written_globals.clone();
        self.havoc(u, &globals);
        let program = self.program;
        self.assume_all(u, &program.invariants);
    }

    fn assign(&mut self, u: &mut Unit, b: BindingId, v: Term) -> Term {
        let c = u.declare(self.program.name(b));
        u.facts.push(Term::eq(c.clone(), v));
        u.vars.insert(b, c.clone());
        c
    }

    /// Runs both arms under the split guard and joins their states.
    fn branch<T>(
        &mut self,
        u: &mut Unit,
        c: Term,
        then: impl FnOnce(&mut Self, &mut Unit) -> T,
        otherwise: impl FnOnce(&mut Self, &mut Unit) -> T,
    ) -> (T, T) {
        let g0 = u.guard.clone();
        let vars0 = u.vars.clone();

        let then_start = Term::and(vec![g0.clone(), c.clone()]);
        u.guard = then_start.clone();
        let a = then(self, u);
        let then_vars = std::mem::replace(&mut u.vars, vars0);
        let else_start = Term::and(vec![g0.clone(), Term::not(c.clone())]);
        let then_guard = std::mem::replace(&mut u.guard, else_start.clone());

        let b = otherwise(self, u);
        let else_vars = std::mem::take(&mut u.vars);
        let else_guard = u.guard.clone();

        u.guard = if then_guard == then_start && else_guard == else_start {
            g0
        } else {
            Term::or(vec![then_guard, else_guard])
        };
        u.vars = self.join(u, &c, then_vars, else_vars);
        (a, b)
    }

    fn join(&self, u: &mut Unit, c: &Term, then_vars: Vars, else_vars: Vars) -> Vars {
        let mut keys: Vec<BindingId> = then_vars.keys().chain(else_vars.keys()).copied().collect();
        keys.sort();
        keys.dedup();
        let mut out = HashMap::with_capacity(keys.len());
        for b in keys {
            let joined = match (then_vars.get(&b), else_vars.get(&b)) {
                (Some(t), Some(e)) if t == e => t.clone(),
                (Some(t), Some(e)) => {
                    let v = u.declare(self.program.name(b));
                    u.facts
                        .push(Term::eq(v.clone(), Term::ite(c.clone(), t.clone(), e.clone())));
                    v
                }
                (Some(t), None) | (None, Some(t)) => t.clone(),
                (None, None) => continue,
            };
            out.insert(b, joined);
        }
        out
    }

    // Expressions

    fn expr(&mut self, u: &mut Unit, e: &Expr) -> Term {
        match &e.kind {
            ExprKind::Ident(id) | ExprKind::Old(id) => {
                let vars = &u.vars;
                match self.lookup(id, vars) {
                    Some(t) => t,
                    None => u.declare(&id.name),
                }
            }
            ExprKind::Literal(lit) => literal(u, lit),
            ExprKind::Array(elements) => {
                let mut values = Vec::with_capacity(elements.len());
                for el in elements {
                    values.push(self.expr(u, el));
                }
                array(u, values)
            }
            ExprKind::Unary { op, argument } => {
                let v = self.expr(u, argument);
                encode::unary(*op, v)
            }
            ExprKind::Binary { op, left, right } => {
                let l = self.expr(u, left);
                let r = self.expr(u, right);
                encode::binary(*op, l, r)
            }
            ExprKind::Logical { op, left, right } => {
                let l = self.expr(u, left);
                let c = encode::truthy(l.clone());
                match op {
                    LogicalOp::And => {
                        let (r, _) = self.branch(
                            u,
                            c.clone(),
                            |g, u| g.expr(u, right),
                            |_, _| encode::undefined(),
                        );
                        Term::ite(c, r, l)
                    }
                    LogicalOp::Or => {
                        let (_, r) = self.branch(
                            u,
                            c.clone(),
                            |_, _| encode::undefined(),
                            |g, u| g.expr(u, right),
                        );
                        Term::ite(c, l, r)
                    }
                }
            }
            ExprKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                let c = encode::truthy(self.expr(u, test));
                let (a, b) = self.branch(
                    u,
                    c.clone(),
                    |g, u| g.expr(u, consequent),
                    |g, u| g.expr(u, alternate),
                );
                Term::ite(c, a, b)
            }
            ExprKind::Assign { target, value } => {
                let v = self.expr(u, value);
                match target.binding() {
                    Some(b) => self.assign(u, b, v),
                    None => v,
                }
            }
            ExprKind::Sequence(exprs) => {
                let mut last = encode::undefined();
                for x in exprs {
                    last = self.expr(u, x);
                }
                last
            }
            ExprKind::Call {
                id,
                callee,
                arguments,
            } => {
                let program = self.program;
                let target = match &callee.kind {
                    ExprKind::Ident(Identifier {
                        decl: Declaration::Func(b),
                        ..
                    }) => program.function(*b).map(|f| (*b, f)),
                    _ => None,
                };
                let Some((b, f)) = target else {
                    let mut args = vec![self.expr(u, callee)];
                    for a in arguments {
                        args.push(self.expr(u, a));
                    }
                    let app = dynamic_call(u, args);
                    self.havoc_globals(u);
                    return app;
                };
                let mut args = Vec::with_capacity(arguments.len());
                for a in arguments {
                    args.push(self.expr(u, a));
                }
                args.resize(f.params.len(), encode::undefined());
                self.call(u, *id, b, f, args)
            }
            ExprKind::Function(_) => opaque_function(u),
            ExprKind::Pure => encode::boolean(Term::Bool(true)),
        }
    }

    /// A call of a function declaration: preconditions are checked (in the
    /// unit's own body) and assumed, the body is inlined one level deep,
    /// and the postconditions are assumed with `old` bound to the pre-call
    /// state.
    fn call(
        &mut self,
        u: &mut Unit,
        call: NodeId,
        func: BindingId,
        f: &FunctionDecl,
        args: Vec<Term>,
    ) -> Term {
        let pre_env = callee_env(u, f, &args);
        for (index, req) in f.requires.iter().enumerate() {
            let t = encode::truthy(self.contract_in(u, req, &pre_env, None));
            if u.depth == 0 {
                self.emit(
                    u,
                    format!("{}:\nrequires:\n{}", f.id.name, format_expr(req)),
                    t.clone(),
                    Site::Requires { call, index },
                );
            }
            u.assume(t);
        }

        let app = self.app(func, args.clone());
        let pre = u.vars.clone();
        if u.depth == 0 {
            self.inline(u, f, &args, app.clone());
        } else if !f.is_pure() {
            self.havoc_globals(u);
        }

        let post_env = callee_env(u, f, &args);
        for post in &f.ensures {
            if matches!(post.kind, ExprKind::Pure) {
                continue;
            }
            let t = encode::truthy(self.contract_in(u, post, &post_env, Some(&pre)));
            u.assume(t);
        }
        app
    }

    fn inline(&mut self, u: &mut Unit, f: &FunctionDecl, args: &[Term], app: Term) {
        let saved_vars = u.vars.clone();
        let saved_guard = u.guard.clone();
        for (p, a) in f.params.iter().zip(args) {
            if let Some(b) = p.binding() {
                u.vars.insert(b, a.clone());
            }
        }
        let result = u.declare(&f.id.name);
        u.results.push(result.clone());
        u.depth += 1;
        self.block(u, &f.body.body);
        u.assume(Term::eq(result.clone(), encode::undefined()));
        u.depth -= 1;
        u.results.pop();

        let mut vars = saved_vars;
        for g in self.program.globals() {
            if let Some(t) = u.vars.get(&g) {
                vars.insert(g, t.clone());
            }
        }
        u.vars = vars;
        u.guard = saved_guard;
        u.assume(Term::eq(app, result));
    }

    fn lookup(&self, id: &Identifier, vars: &Vars) -> Option<Term> {
        match id.decl {
            Declaration::Func(b) => self.fun_index.get(&b).map(|k| encode::function(*k)),
            _ => id.binding().and_then(|b| vars.get(&b).cloned()),
        }
    }

    fn contract(&mut self, u: &mut Unit, e: &Expr, old: Option<&Vars>) -> Term {
        let env = u.vars.clone();
        self.contract_in(u, e, &env, old)
    }

    /// Encodes an annotation without side effects: calls stay uninterpreted
    /// applications and assignments only yield their value.
    fn contract_in(&mut self, u: &mut Unit, e: &Expr, env: &Vars, old: Option<&Vars>) -> Term {
        match &e.kind {
            ExprKind::Ident(id) => match self.lookup(id, env) {
                Some(t) => t,
                None => u.declare(&id.name),
            },
            ExprKind::Old(id) => {
                let snapshot = old
                    .zip(id.binding())
                    .and_then(|(o, b)| o.get(&b).cloned());
                match snapshot.or_else(|| self.lookup(id, env)) {
                    Some(t) => t,
                    None => u.declare(&id.name),
                }
            }
            ExprKind::Literal(lit) => literal(u, lit),
            ExprKind::Array(elements) => {
                let mut values = Vec::with_capacity(elements.len());
                for el in elements {
                    values.push(self.contract_in(u, el, env, old));
                }
                array(u, values)
            }
            ExprKind::Unary { op, argument } => {
                let v = self.contract_in(u, argument, env, old);
                encode::unary(*op, v)
            }
            ExprKind::Binary { op, left, right } => {
                let l = self.contract_in(u, left, env, old);
                let r = self.contract_in(u, right, env, old);
                encode::binary(*op, l, r)
            }
            ExprKind::Logical { op, left, right } => {
                let l = self.contract_in(u, left, env, old);
                let r = self.contract_in(u, right, env, old);
                let c = encode::truthy(l.clone());
                match op {
                    LogicalOp::And => Term::ite(c, r, l),
                    LogicalOp::Or => Term::ite(c, l, r),
                }
            }
            ExprKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                let c = encode::truthy(self.contract_in(u, test, env, old));
                let a = self.contract_in(u, consequent, env, old);
                let b = self.contract_in(u, alternate, env, old);
                Term::ite(c, a, b)
            }
            ExprKind::Assign { value, .. } => self.contract_in(u, value, env, old),
            ExprKind::Sequence(exprs) => {
                let mut last = encode::undefined();
                for x in exprs {
                    last = self.contract_in(u, x, env, old);
                }
                last
            }
            ExprKind::Call {
                callee, arguments, ..
            } => {
                let mut args = Vec::with_capacity(arguments.len());
                for a in arguments {
                    args.push(self.contract_in(u, a, env, old));
                }
                if let ExprKind::Ident(Identifier {
                    decl: Declaration::Func(b),
                    ..
                }) = &callee.kind
                {
                    if let Some(f) = self.program.function(*b) {
                        args.resize(f.params.len(), encode::undefined());
                        return self.app(*b, args);
                    }
                }
                let fv = self.contract_in(u, callee, env, old);
                args.insert(0, fv);
                dynamic_call(u, args)
            }
            ExprKind::Function(_) => opaque_function(u),
            ExprKind::Pure => encode::boolean(Term::Bool(true)),
        }
    }
}

fn callee_env(u: &Unit, f: &FunctionDecl, args: &[Term]) -> Vars {
    let mut env = u.vars.clone();
    for (p, a) in f.params.iter().zip(args) {
        if let Some(b) = p.binding() {
            env.insert(b, a.clone());
        }
    }
    env
}

fn literal(u: &mut Unit, lit: &Literal) -> Term {
    match lit {
        Literal::Undefined => encode::undefined(),
        Literal::Null => encode::null(),
        Literal::Bool(b) => encode::boolean(Term::Bool(*b)),
        Literal::String(s) => encode::string(s),
        Literal::Number(n) => match encode::number(*n) {
            Some(t) => t,
            None => {
                let c = u.declare("num");
                u.facts.push(encode::is_number(c.clone()));
                c
            }
        },
    }
}

fn array(u: &mut Unit, values: Vec<Term>) -> Term {
    let name = u.names.fresh("arr");
    u.decls.push(format!("(declare-const {name} Arr)"));
    let arr = Term::sym(name);
    u.facts.push(Term::eq(
        Term::app("arrlength", vec![arr.clone()]),
        Term::Int(values.len() as i128),
    ));
    for (i, v) in values.into_iter().enumerate() {
        u.facts.push(Term::eq(
            Term::app("arrelems", vec![arr.clone(), Term::Int(i as i128)]),
            v,
        ));
    }
    Term::app("jsarr", vec![arr])
}

fn opaque_function(u: &mut Unit) -> Term {
    let c = u.declare("fn");
    u.facts.push(encode::is_function(c.clone()));
    c
}

/// Application of a callee that is not a known declaration. `args[0]` is
/// the callee value.
fn dynamic_call(u: &mut Unit, args: Vec<Term>) -> Term {
    let arity = args.len() - 1;
    let name = match u.jscalls.get(&arity) {
        Some(name) => name.clone(),
        None => {
            let name = u.names.exact(&format!("jscall{arity}"));
            let domain = vec!["JSVal"; args.len()].join(" ");
            u.decls
                .push(format!("(declare-fun {name} ({domain}) JSVal)"));
            u.jscalls.insert(arity, name.clone());
            name
        }
    };
    Term::app(name, args)
}

fn push_unique(out: &mut Vec<BindingId>, b: BindingId) {
    if !out.contains(&b) {
        out.push(b);
    }
}

fn assigned_in_block(block: &Block, out: &mut Vec<BindingId>) {
    for s in &block.body {
        assigned_in_stmt(s, out);
    }
}

fn assigned_in_stmt(stmt: &Stmt, out: &mut Vec<BindingId>) {
    match stmt {
        Stmt::VarDecl(d) => assigned_in_expr(&d.init, out),
        Stmt::Block(b) => assigned_in_block(b, out),
        Stmt::Expr(e) => assigned_in_expr(e, out),
        Stmt::Assert(a) => assigned_in_expr(&a.expr, out),
        Stmt::If(s) => {
            assigned_in_expr(&s.test, out);
            assigned_in_block(&s.consequent, out);
            assigned_in_block(&s.alternate, out);
        }
        Stmt::Return(r) => assigned_in_expr(&r.argument, out),
        Stmt::While(w) => {
            assigned_in_expr(&w.test, out);
            assigned_in_block(&w.body, out);
        }
        Stmt::Debugger(_) => {}
    }
}

fn assigned_in_expr(expr: &Expr, out: &mut Vec<BindingId>) {
    visit_expr(expr, &mut |e| {
        if let ExprKind::Assign { target, .. } = &e.kind {
            if let Some(b) = target.binding() {
                push_unique(out, b);
            }
        }
        if let ExprKind::Function(f) = &e.kind {
            assigned_in_block(&f.body, out);
        }
    });
}

fn expr_has_call(expr: &Expr) -> bool {
    let mut found = false;
    visit_expr(expr, &mut |e| {
        if matches!(e.kind, ExprKind::Call { .. }) {
            found = true;
        }
    });
    found
}

fn block_has_call(block: &Block) -> bool {
    block.body.iter().any(|s| match s {
        Stmt::VarDecl(d) => expr_has_call(&d.init),
        Stmt::Block(b) => block_has_call(b),
        Stmt::Expr(e) => expr_has_call(e),
        Stmt::Assert(a) => expr_has_call(&a.expr),
        Stmt::If(s) => {
            expr_has_call(&s.test) || block_has_call(&s.consequent) || block_has_call(&s.alternate)
        }
        Stmt::Return(r) => expr_has_call(&r.argument),
        Stmt::While(w) => expr_has_call(&w.test) || block_has_call(&w.body),
        Stmt::Debugger(_) => false,
    })
}

fn block_has_return(block: &Block) -> bool {
    block.body.iter().any(|s| match s {
        Stmt::Return(_) => true,
        Stmt::Block(b) => block_has_return(b),
        Stmt::If(s) => block_has_return(&s.consequent) || block_has_return(&s.alternate),
        Stmt::While(w) => block_has_return(&w.body),
        _ => false,
    })
}

/// Pre-order walk that does not descend into function expression bodies.
fn visit_expr(expr: &Expr, f: &mut impl FnMut(&Expr)) {
    f(expr);
    match &expr.kind {
        ExprKind::Ident(_)
        | ExprKind::Old(_)
        | ExprKind::Literal(_)
        | ExprKind::Pure
        | ExprKind::Function(_) => {}
        ExprKind::Array(es) | ExprKind::Sequence(es) => {
            for e in es {
                visit_expr(e, f);
            }
        }
        ExprKind::Unary { argument, .. } => visit_expr(argument, f),
        ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
            visit_expr(left, f);
            visit_expr(right, f);
        }
        ExprKind::Conditional {
            test,
            consequent,
            alternate,
        } => {
            visit_expr(test, f);
            visit_expr(consequent, f);
            visit_expr(alternate, f);
        }
        ExprKind::Assign { value, .. } => visit_expr(value, f),
        ExprKind::Call {
            callee, arguments, ..
        } => {
            visit_expr(callee, f);
            for a in arguments {
                visit_expr(a, f);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use esverify_core::program_from_source;

    fn generated(src: &str) -> Generated {
        generate(&program_from_source(src).expect("front-end"))
    }

    #[test]
    fn return_cuts_the_remaining_statements() {
        let g = generated("function f() { return 1; assert(false); }");
        assert!(g.vcs.iter().all(|vc| !vc.description.contains("assert")));
    }

    #[test]
    fn scripts_declare_before_use_and_request_inputs() {
        let g = generated("function f(x) { requires(x > 0); return x; ensures(f(x) > 0); }");
        let vc = &g.vcs[0];
        assert_eq!(vc.description, "f:\n(f(x) > 0)");
        assert!(vc.script.starts_with(PRELUDE));
        assert!(vc.script.contains("(declare-fun f (JSVal) JSVal)"));
        assert!(vc.script.contains("(declare-const x JSVal)"));
        assert!(vc.script.contains("(check-sat)"));
        assert!(vc.script.contains("(get-value (x (arrlength (arrv x))"));
        assert_eq!(vc.free.len(), 1);
        assert!(vc.free[0].binding.is_some());
    }

    #[test]
    fn top_level_conditions_without_free_constants_skip_the_model() {
        let g = generated("let i = 3; assert(i < 2);");
        assert_eq!(g.vcs.len(), 1);
        assert!(!g.vcs[0].script.contains("get-value"));
        assert_eq!(g.vcs[0].entry, Entry::TopLevel);
    }

    #[test]
    fn function_values_are_indexed_by_declaration_order() {
        let g = generated("function a() { } function b() { } let f = b;");
        assert_eq!(g.functions.len(), 2);
        assert!(g.vcs.is_empty());
    }

    #[test]
    fn loops_in_inlined_callees_emit_nothing() {
        let src = r#"
function count(n) {
  let i = 0;
  while (i < n) {
    invariant(i >= 0);
    i++;
  }
  return i;
}
let k = count(3);
"#;
        let g = generated(src);
        let descriptions: Vec<&str> = g.vcs.iter().map(|v| v.description.as_str()).collect();
        assert_eq!(
            descriptions,
            ["count:\ninvariant on entry:\n(i >= 0)", "count:\ninvariant maintained:\n(i >= 0)"]
        );
    }

    #[test]
    fn source_names_are_reused_across_units() {
        let g = generated("let counter = 0; invariant(counter >= 0); function a() { } function b() { }");
        let scripts: Vec<&RawVc> = g.vcs.iter().filter(|v| v.entry != Entry::TopLevel).collect();
        assert_eq!(scripts.len(), 2);
        for vc in scripts {
            assert!(vc.script.contains("(declare-const counter JSVal)"));
        }
    }
}

#![forbid(unsafe_code)]

//! Restricted, name-resolved intermediate representation.
//!
//! Identifiers point at their binding through a [`Declaration`] key into the
//! program's [`Bindings`] arena. The arena entry owns the ordered list of
//! references and the write flag, so the IR itself stays a tree.

use esverify_ast::Span;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(pub u32);

/// Identity of a call, loop or assertion. Verification conditions and the
/// concrete interpreter use it to name check sites.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Declaration {
    Unresolved,
    Var(BindingId),
    Func(BindingId),
    Param(BindingId),
}

impl Declaration {
    pub fn binding(self) -> Option<BindingId> {
        match self {
            Declaration::Unresolved => None,
            Declaration::Var(b) | Declaration::Func(b) | Declaration::Param(b) => Some(b),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeclKind {
    Let,
    Const,
}

impl DeclKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DeclKind::Let => "let",
            DeclKind::Const => "const",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FuncOwner {
    Decl(BindingId),
    Expr(NodeId),
}

#[derive(Clone, Debug, PartialEq)]
pub enum BindingKind {
    Var { kind: DeclKind, origin: Span },
    Func { origin: Span },
    Param { owner: FuncOwner, origin: Span },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Binding {
    pub name: String,
    pub kind: BindingKind,
    /// Spans of every resolved occurrence, in resolution order.
    pub refs: Vec<Span>,
    pub is_written_to: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Bindings {
    entries: Vec<Binding>,
}

impl Bindings {
    pub fn alloc(&mut self, binding: Binding) -> BindingId {
        let id = BindingId(self.entries.len() as u32);
        self.entries.push(binding);
        id
    }

    pub fn get(&self, id: BindingId) -> &Binding {
        &self.entries[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: BindingId) -> &mut Binding {
        &mut self.entries[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (BindingId, &Binding)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, b)| (BindingId(i as u32), b))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Identifier {
    pub name: String,
    pub span: Span,
    pub decl: Declaration,
}

impl Identifier {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
            decl: Declaration::Unresolved,
        }
    }

    pub fn binding(&self) -> Option<BindingId> {
        self.decl.binding()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Minus,
    Plus,
    Not,
    BitNot,
    Typeof,
    Void,
}

impl UnaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            UnaryOp::Minus => "-",
            UnaryOp::Plus => "+",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
            UnaryOp::Typeof => "typeof",
            UnaryOp::Void => "void",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Shl,
    Shr,
    UShr,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitOr,
    BitXor,
    BitAnd,
}

impl BinaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::StrictEq => "===",
            BinaryOp::StrictNotEq => "!==",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::UShr => ">>>",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::BitAnd => "&",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

impl LogicalOp {
    pub fn as_str(self) -> &'static str {
        match self {
            LogicalOp::And => "&&",
            LogicalOp::Or => "||",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub span: Span,
    pub kind: ExprKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Ident(Identifier),
    /// `old(x)`: value of `x` when the enclosing function was entered.
    Old(Identifier),
    Literal(Literal),
    Array(Vec<Expr>),
    Unary {
        op: UnaryOp,
        argument: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Assign {
        target: Identifier,
        value: Box<Expr>,
    },
    Sequence(Vec<Expr>),
    Call {
        id: NodeId,
        callee: Box<Expr>,
        arguments: Vec<Expr>,
    },
    Function(Box<FunctionExpr>),
    /// `pure()` marker inside a postcondition.
    Pure,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionExpr {
    pub id: NodeId,
    pub span: Span,
    pub params: Vec<Identifier>,
    pub body: Block,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub span: Span,
    pub body: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VarDecl {
    pub span: Span,
    pub kind: DeclKind,
    pub id: Identifier,
    pub init: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AssertStmt {
    pub id: NodeId,
    pub span: Span,
    pub expr: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IfStmt {
    pub span: Span,
    pub test: Expr,
    pub consequent: Block,
    pub alternate: Block,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReturnStmt {
    pub span: Span,
    pub argument: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WhileStmt {
    pub id: NodeId,
    pub span: Span,
    pub invariants: Vec<Expr>,
    pub test: Expr,
    pub body: Block,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    VarDecl(VarDecl),
    Block(Block),
    Expr(Expr),
    Assert(AssertStmt),
    If(IfStmt),
    Return(ReturnStmt),
    While(WhileStmt),
    Debugger(Span),
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionDecl {
    pub span: Span,
    pub id: Identifier,
    pub params: Vec<Identifier>,
    pub requires: Vec<Expr>,
    pub ensures: Vec<Expr>,
    pub body: Block,
}

impl FunctionDecl {
    /// A function whose postconditions include `pure()` promises to leave
    /// every global untouched.
    pub fn is_pure(&self) -> bool {
        self.ensures.iter().any(|e| matches!(e.kind, ExprKind::Pure))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TopLevel {
    Stmt(Stmt),
    Function(FunctionDecl),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Program {
    pub body: Vec<TopLevel>,
    pub invariants: Vec<Expr>,
    pub bindings: Bindings,
}

impl Program {
    pub fn functions(&self) -> impl Iterator<Item = &FunctionDecl> {
        self.body.iter().filter_map(|t| match t {
            TopLevel::Function(f) => Some(f),
            TopLevel::Stmt(_) => None,
        })
    }

    pub fn function(&self, binding: BindingId) -> Option<&FunctionDecl> {
        self.functions().find(|f| f.id.binding() == Some(binding))
    }

    /// Bindings introduced by top-level variable declarations, in order.
    pub fn globals(&self) -> Vec<BindingId> {
        self.body
            .iter()
            .filter_map(|t| match t {
                TopLevel::Stmt(Stmt::VarDecl(d)) => d.id.binding(),
                _ => None,
            })
            .collect()
    }

    pub fn name(&self, binding: BindingId) -> &str {
        &self.bindings.get(binding).name
    }
}

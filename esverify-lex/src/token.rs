#![forbid(unsafe_code)]

use esverify_ast::Span;

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// A line terminator appeared between the previous token and this one.
    /// The parser uses it for automatic semicolon insertion.
    pub newline_before: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    // Keywords
    KwVar,
    KwLet,
    KwConst,
    KwFunction,
    KwReturn,
    KwIf,
    KwElse,
    KwWhile,
    KwDo,
    KwFor,
    KwBreak,
    KwContinue,
    KwThrow,
    KwTry,
    KwCatch,
    KwFinally,
    KwDebugger,
    KwThis,
    KwNull,
    KwTrue,
    KwFalse,
    KwTypeof,
    KwVoid,
    KwDelete,
    KwNew,
    KwIn,
    KwInstanceof,

    // Punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semi,
    Comma,
    Dot,
    Ellipsis,
    Question,
    Colon,
    FatArrow,

    // Operators
    Eq,
    EqEq,
    EqEqEq,
    Neq,
    NeqEq,
    Lt,
    Le,
    Gt,
    Ge,
    Shl,
    Shr,
    UShr,
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Percent,
    PlusPlus,
    MinusMinus,
    Amp,
    Pipe,
    Caret,
    Bang,
    Tilde,
    AndAnd,
    OrOr,

    // Compound assignment
    PlusEq,
    MinusEq,
    StarEq,
    StarStarEq,
    SlashEq,
    PercentEq,
    ShlEq,
    ShrEq,
    UShrEq,
    AmpEq,
    PipeEq,
    CaretEq,

    // Literals / identifiers
    Ident(String),
    Number(f64),
    String(String),
    RegExp { pattern: String, flags: String },

    Eof,
}

impl TokenKind {
    /// Whether a `/` following this token starts a regular expression
    /// literal rather than a division.
    pub(crate) fn allows_regex_after(&self) -> bool {
        !matches!(
            self,
            TokenKind::Ident(_)
                | TokenKind::Number(_)
                | TokenKind::String(_)
                | TokenKind::RegExp { .. }
                | TokenKind::RParen
                | TokenKind::RBracket
                | TokenKind::RBrace
                | TokenKind::KwThis
                | TokenKind::KwNull
                | TokenKind::KwTrue
                | TokenKind::KwFalse
                | TokenKind::PlusPlus
                | TokenKind::MinusMinus
        )
    }
}

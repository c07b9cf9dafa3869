#![forbid(unsafe_code)]
#![allow(unused_assignments)]

use esverify_ast::{span_between, Span};
use logos::Logos;
use miette::Diagnostic;
use thiserror::Error;

use crate::token::{Token, TokenKind};

#[derive(Debug, Error, Diagnostic)]
#[error("lex error: {message}")]
#[diagnostic(code(esverify::lex))]
#[allow(unused_assignments)]
pub struct LexError {
    pub message: String,
    #[label]
    pub span: Span,
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\f\r\u{feff}]+")]
enum RawToken {
    #[token("var")]
    KwVar,
    #[token("let")]
    KwLet,
    #[token("const")]
    KwConst,
    #[token("function")]
    KwFunction,
    #[token("return")]
    KwReturn,
    #[token("if")]
    KwIf,
    #[token("else")]
    KwElse,
    #[token("while")]
    KwWhile,
    #[token("do")]
    KwDo,
    #[token("for")]
    KwFor,
    #[token("break")]
    KwBreak,
    #[token("continue")]
    KwContinue,
    #[token("throw")]
    KwThrow,
    #[token("try")]
    KwTry,
    #[token("catch")]
    KwCatch,
    #[token("finally")]
    KwFinally,
    #[token("debugger")]
    KwDebugger,
    #[token("this")]
    KwThis,
    #[token("null")]
    KwNull,
    #[token("true")]
    KwTrue,
    #[token("false")]
    KwFalse,
    #[token("typeof")]
    KwTypeof,
    #[token("void")]
    KwVoid,
    #[token("delete")]
    KwDelete,
    #[token("new")]
    KwNew,
    #[token("in")]
    KwIn,
    #[token("instanceof")]
    KwInstanceof,

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(";")]
    Semi,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("...")]
    Ellipsis,
    #[token("?")]
    Question,
    #[token(":")]
    Colon,
    #[token("=>")]
    FatArrow,

    #[token("=")]
    Eq,
    #[token("==")]
    EqEq,
    #[token("===")]
    EqEqEq,
    #[token("!=")]
    Neq,
    #[token("!==")]
    NeqEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token(">")]
    Gt,
    #[token(">=")]
    Ge,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,
    #[token(">>>")]
    UShr,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("**")]
    StarStar,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("++")]
    PlusPlus,
    #[token("--")]
    MinusMinus,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("!")]
    Bang,
    #[token("~")]
    Tilde,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,

    #[token("+=")]
    PlusEq,
    #[token("-=")]
    MinusEq,
    #[token("*=")]
    StarEq,
    #[token("**=")]
    StarStarEq,
    #[token("/=")]
    SlashEq,
    #[token("%=")]
    PercentEq,
    #[token("<<=")]
    ShlEq,
    #[token(">>=")]
    ShrEq,
    #[token(">>>=")]
    UShrEq,
    #[token("&=")]
    AmpEq,
    #[token("|=")]
    PipeEq,
    #[token("^=")]
    CaretEq,

    #[token("\n")]
    Newline,

    #[regex(r"//[^\n]*")]
    LineComment,

    /// Carries whether the comment spans a line break.
    #[regex(r"/\*([^*]|\*+[^*/])*\*+/", |lex| lex.slice().contains('\n'))]
    BlockComment(bool),

    #[token("`")]
    Backtick,

    #[regex(r"0[xX][0-9a-fA-F]+", |lex| parse_radix(lex.slice(), 16))]
    #[regex(r"0[oO][0-7]+", |lex| parse_radix(lex.slice(), 8))]
    #[regex(r"0[bB][01]+", |lex| parse_radix(lex.slice(), 2))]
    #[regex(r"[0-9]+(\.[0-9]*)?([eE][+-]?[0-9]+)?", |lex| parse_decimal(lex.slice()))]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?", |lex| parse_decimal(lex.slice()))]
    Number(Option<f64>),

    #[regex(r#""([^"\\\n]|\\(.|\n))*""#, parse_string)]
    #[regex(r#"'([^'\\\n]|\\(.|\n))*'"#, parse_string)]
    String(Option<String>),

    #[regex(r"[a-zA-Z_$][a-zA-Z0-9_$]*", |lex| lex.slice().to_string())]
    Ident(String),
}

fn parse_decimal(s: &str) -> Option<f64> {
    s.parse::<f64>().ok()
}

fn parse_radix(s: &str, radix: u32) -> Option<f64> {
    let digits = s.get(2..)?;
    u64::from_str_radix(digits, radix).ok().map(|n| n as f64)
}

fn parse_string(lex: &mut logos::Lexer<RawToken>) -> Option<String> {
    let s = lex.slice();
    let inner = &s[1..s.len().saturating_sub(1)];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }

        let esc = chars.next()?;
        match esc {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{0008}'),
            'f' => out.push('\u{000C}'),
            'v' => out.push('\u{000B}'),
            '0' => out.push('\0'),
            // Line continuation.
            '\n' => {}
            'x' => {
                let hex: String = chars.by_ref().take(2).collect();
                if hex.len() != 2 {
                    return None;
                }
                let cp = u32::from_str_radix(&hex, 16).ok()?;
                out.push(char::from_u32(cp)?);
            }
            'u' => {
                let hex = if chars.peek() == Some(&'{') {
                    chars.next();
                    let mut hex = String::new();
                    loop {
                        match chars.next()? {
                            '}' => break,
                            ch => hex.push(ch),
                        }
                        if hex.len() > 6 {
                            return None;
                        }
                    }
                    hex
                } else {
                    let hex: String = chars.by_ref().take(4).collect();
                    if hex.len() != 4 {
                        return None;
                    }
                    hex
                };
                if hex.is_empty() {
                    return None;
                }
                let cp = u32::from_str_radix(&hex, 16).ok()?;
                out.push(char::from_u32(cp)?);
            }
            other => out.push(other),
        }
    }

    Some(out)
}

/// Scans the body and flags of a regular expression literal starting at the
/// opening `/` of `rest`. Returns the pattern, the flags and the byte length
/// of the whole literal.
fn scan_regex(rest: &str) -> Option<(String, String, usize)> {
    let mut in_class = false;
    let mut escaped = false;
    let mut end = None;
    for (i, c) in rest.char_indices().skip(1) {
        if c == '\n' {
            return None;
        }
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '[' => in_class = true,
            ']' => in_class = false,
            '/' if !in_class => {
                end = Some(i);
                break;
            }
            _ => {}
        }
    }
    let end = end?;
    let pattern = rest[1..end].to_string();
    let flags: String = rest[end + 1..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '$')
        .collect();
    let len = end + 1 + flags.len();
    Some((pattern, flags, len))
}

pub struct Lexer<'a> {
    src: &'a str,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src }
    }

    pub fn lex(&self) -> Result<Vec<Token>, LexError> {
        let mut tokens: Vec<Token> = Vec::new();
        let mut newline_before = false;
        let mut lex = RawToken::lexer(self.src);

        while let Some(raw) = lex.next() {
            let start = lex.span().start;
            let mut end = lex.span().end;

            let kind = match raw {
                Ok(RawToken::Newline) | Ok(RawToken::BlockComment(true)) => {
                    newline_before = true;
                    continue;
                }
                Ok(RawToken::LineComment) | Ok(RawToken::BlockComment(false)) => continue,

                Ok(RawToken::Slash) | Ok(RawToken::SlashEq)
                    if tokens.last().is_none_or(|t| t.kind.allows_regex_after()) =>
                {
                    let Some((pattern, flags, len)) = scan_regex(&self.src[start..]) else {
                        return Err(LexError {
                            message: "unterminated regular expression literal".to_string(),
                            span: span_between(start, end),
                        });
                    };
                    lex.bump(len - (end - start));
                    end = start + len;
                    TokenKind::RegExp { pattern, flags }
                }

                Ok(RawToken::KwVar) => TokenKind::KwVar,
                Ok(RawToken::KwLet) => TokenKind::KwLet,
                Ok(RawToken::KwConst) => TokenKind::KwConst,
                Ok(RawToken::KwFunction) => TokenKind::KwFunction,
                Ok(RawToken::KwReturn) => TokenKind::KwReturn,
                Ok(RawToken::KwIf) => TokenKind::KwIf,
                Ok(RawToken::KwElse) => TokenKind::KwElse,
                Ok(RawToken::KwWhile) => TokenKind::KwWhile,
                Ok(RawToken::KwDo) => TokenKind::KwDo,
                Ok(RawToken::KwFor) => TokenKind::KwFor,
                Ok(RawToken::KwBreak) => TokenKind::KwBreak,
                Ok(RawToken::KwContinue) => TokenKind::KwContinue,
                Ok(RawToken::KwThrow) => TokenKind::KwThrow,
                Ok(RawToken::KwTry) => TokenKind::KwTry,
                Ok(RawToken::KwCatch) => TokenKind::KwCatch,
                Ok(RawToken::KwFinally) => TokenKind::KwFinally,
                Ok(RawToken::KwDebugger) => TokenKind::KwDebugger,
                Ok(RawToken::KwThis) => TokenKind::KwThis,
                Ok(RawToken::KwNull) => TokenKind::KwNull,
                Ok(RawToken::KwTrue) => TokenKind::KwTrue,
                Ok(RawToken::KwFalse) => TokenKind::KwFalse,
                Ok(RawToken::KwTypeof) => TokenKind::KwTypeof,
                Ok(RawToken::KwVoid) => TokenKind::KwVoid,
                Ok(RawToken::KwDelete) => TokenKind::KwDelete,
                Ok(RawToken::KwNew) => TokenKind::KwNew,
                Ok(RawToken::KwIn) => TokenKind::KwIn,
                Ok(RawToken::KwInstanceof) => TokenKind::KwInstanceof,

                Ok(RawToken::LParen) => TokenKind::LParen,
                Ok(RawToken::RParen) => TokenKind::RParen,
                Ok(RawToken::LBrace) => TokenKind::LBrace,
                Ok(RawToken::RBrace) => TokenKind::RBrace,
                Ok(RawToken::LBracket) => TokenKind::LBracket,
                Ok(RawToken::RBracket) => TokenKind::RBracket,
                Ok(RawToken::Semi) => TokenKind::Semi,
                Ok(RawToken::Comma) => TokenKind::Comma,
                Ok(RawToken::Dot) => TokenKind::Dot,
                Ok(RawToken::Ellipsis) => TokenKind::Ellipsis,
                Ok(RawToken::Question) => TokenKind::Question,
                Ok(RawToken::Colon) => TokenKind::Colon,
                Ok(RawToken::FatArrow) => TokenKind::FatArrow,

                Ok(RawToken::Eq) => TokenKind::Eq,
                Ok(RawToken::EqEq) => TokenKind::EqEq,
                Ok(RawToken::EqEqEq) => TokenKind::EqEqEq,
                Ok(RawToken::Neq) => TokenKind::Neq,
                Ok(RawToken::NeqEq) => TokenKind::NeqEq,
                Ok(RawToken::Lt) => TokenKind::Lt,
                Ok(RawToken::Le) => TokenKind::Le,
                Ok(RawToken::Gt) => TokenKind::Gt,
                Ok(RawToken::Ge) => TokenKind::Ge,
                Ok(RawToken::Shl) => TokenKind::Shl,
                Ok(RawToken::Shr) => TokenKind::Shr,
                Ok(RawToken::UShr) => TokenKind::UShr,
                Ok(RawToken::Plus) => TokenKind::Plus,
                Ok(RawToken::Minus) => TokenKind::Minus,
                Ok(RawToken::Star) => TokenKind::Star,
                Ok(RawToken::StarStar) => TokenKind::StarStar,
                Ok(RawToken::Slash) => TokenKind::Slash,
                Ok(RawToken::Percent) => TokenKind::Percent,
                Ok(RawToken::PlusPlus) => TokenKind::PlusPlus,
                Ok(RawToken::MinusMinus) => TokenKind::MinusMinus,
                Ok(RawToken::Amp) => TokenKind::Amp,
                Ok(RawToken::Pipe) => TokenKind::Pipe,
                Ok(RawToken::Caret) => TokenKind::Caret,
                Ok(RawToken::Bang) => TokenKind::Bang,
                Ok(RawToken::Tilde) => TokenKind::Tilde,
                Ok(RawToken::AndAnd) => TokenKind::AndAnd,
                Ok(RawToken::OrOr) => TokenKind::OrOr,

                Ok(RawToken::PlusEq) => TokenKind::PlusEq,
                Ok(RawToken::MinusEq) => TokenKind::MinusEq,
                Ok(RawToken::StarEq) => TokenKind::StarEq,
                Ok(RawToken::StarStarEq) => TokenKind::StarStarEq,
                Ok(RawToken::SlashEq) => TokenKind::SlashEq,
                Ok(RawToken::PercentEq) => TokenKind::PercentEq,
                Ok(RawToken::ShlEq) => TokenKind::ShlEq,
                Ok(RawToken::ShrEq) => TokenKind::ShrEq,
                Ok(RawToken::UShrEq) => TokenKind::UShrEq,
                Ok(RawToken::AmpEq) => TokenKind::AmpEq,
                Ok(RawToken::PipeEq) => TokenKind::PipeEq,
                Ok(RawToken::CaretEq) => TokenKind::CaretEq,

                Ok(RawToken::Ident(s)) => TokenKind::Ident(s),
                Ok(RawToken::Number(Some(n))) => TokenKind::Number(n),
                Ok(RawToken::Number(None)) => {
                    return Err(LexError {
                        message: "invalid number literal".to_string(),
                        span: span_between(start, end),
                    });
                }
                Ok(RawToken::String(Some(s))) => TokenKind::String(s),
                Ok(RawToken::String(None)) => {
                    return Err(LexError {
                        message: "invalid string literal".to_string(),
                        span: span_between(start, end),
                    });
                }
                Ok(RawToken::Backtick) => {
                    return Err(LexError {
                        message: "template literals are not supported".to_string(),
                        span: span_between(start, end),
                    });
                }

                Err(_) => {
                    return Err(LexError {
                        message: "unexpected character".to_string(),
                        span: span_between(start, end),
                    });
                }
            };

            tokens.push(Token {
                kind,
                span: span_between(start, end),
                newline_before,
            });
            newline_before = false;
        }

        tokens.push(Token {
            kind: TokenKind::Eof,
            span: span_between(self.src.len(), self.src.len()),
            newline_before,
        });

        Ok(tokens)
    }
}

#![forbid(unsafe_code)]
#![allow(unused_assignments)]

use esverify_ast::Span;
use esverify_lex::LexError;
use esverify_parse::ParseError;
use miette::Diagnostic;
use thiserror::Error;

/// A construct outside the verifiable subset, or a malformed pseudo-call.
#[derive(Debug, Error, Diagnostic)]
#[error("unsupported: {message}")]
#[diagnostic(code(esverify::unsupported))]
#[allow(unused_assignments)]
pub struct TranslateError {
    pub message: String,
    #[label]
    pub span: Span,
}

#[derive(Debug, Error, Diagnostic)]
#[error("resolution error: {message}")]
#[diagnostic(code(esverify::resolve))]
#[allow(unused_assignments)]
pub struct ResolveError {
    pub message: String,
    #[label]
    pub span: Span,
}

#[derive(Debug, Error, Diagnostic)]
pub enum FrontendError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    #[diagnostic(transparent)]
    Translate(#[from] TranslateError),
    #[error(transparent)]
    #[diagnostic(transparent)]
    Resolve(#[from] ResolveError),
}

impl FrontendError {
    /// Short error category reported next to the `error` status.
    pub fn kind(&self) -> &'static str {
        match self {
            FrontendError::Lex(_) | FrontendError::Parse(_) => "parse",
            FrontendError::Translate(_) => "unsupported",
            FrontendError::Resolve(_) => "resolve",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            FrontendError::Lex(e) => &e.message,
            FrontendError::Parse(e) => &e.message,
            FrontendError::Translate(e) => &e.message,
            FrontendError::Resolve(e) => &e.message,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            FrontendError::Lex(e) => e.span,
            FrontendError::Parse(e) => e.span,
            FrontendError::Translate(e) => e.span,
            FrontendError::Resolve(e) => e.span,
        }
    }
}

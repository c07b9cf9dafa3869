#![forbid(unsafe_code)]

mod error;
mod fmt;
pub mod ir;
mod lower;
mod resolve;

use esverify_lex::Lexer;
use esverify_parse::Parser;

pub use error::{FrontendError, ResolveError, TranslateError};
pub use fmt::{format_expr, format_literal, format_number, format_program, quote};
pub use lower::translate_program;
pub use resolve::resolve_program;

/// Lexes, parses, translates and resolves `src`.
pub fn program_from_source(src: &str) -> Result<ir::Program, FrontendError> {
    let tokens = Lexer::new(src).lex()?;
    let tree = Parser::new(&tokens).parse_program()?;
    let program = translate_program(&tree)?;
    let program = resolve_program(program)?;
    tracing::debug!(
        toplevel = program.body.len(),
        bindings = program.bindings.len(),
        "front-end finished"
    );
    Ok(program)
}

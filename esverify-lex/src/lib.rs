#![forbid(unsafe_code)]

mod lexer;
mod token;

pub use lexer::{LexError, Lexer};
pub use token::{Token, TokenKind};

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .lex()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lex_keywords_and_identifiers() {
        assert_eq!(
            kinds("let lettuce = typeof x"),
            vec![
                TokenKind::KwLet,
                TokenKind::Ident("lettuce".to_string()),
                TokenKind::Eq,
                TokenKind::KwTypeof,
                TokenKind::Ident("x".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_number_literals() {
        let nums: Vec<f64> = kinds("1 2.5 .5 1e3 0x1F 0b101 0o17")
            .into_iter()
            .filter_map(|k| match k {
                TokenKind::Number(n) => Some(n),
                _ => None,
            })
            .collect();
        assert_eq!(nums, vec![1.0, 2.5, 0.5, 1000.0, 31.0, 5.0, 15.0]);
    }

    #[test]
    fn lex_longest_operator_wins() {
        assert_eq!(
            kinds("a !== b >>>= c"),
            vec![
                TokenKind::Ident("a".to_string()),
                TokenKind::NeqEq,
                TokenKind::Ident("b".to_string()),
                TokenKind::UShrEq,
                TokenKind::Ident("c".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_string_escapes() {
        let s = kinds(r#"'a\n\t\'b' "\x41B\u{43}""#);
        assert_eq!(s[0], TokenKind::String("a\n\t'b".to_string()));
        assert_eq!(s[1], TokenKind::String("ABC".to_string()));
    }

    #[test]
    fn lex_rejects_bad_hex_escape() {
        let err = Lexer::new(r#""\xZ1""#).lex().unwrap_err();
        assert!(err.message.contains("invalid string literal"));
    }

    #[test]
    fn lex_tracks_newlines_for_asi() {
        let tokens = Lexer::new("a\n/* x\n */ b /* y */ c // z\nd").lex().unwrap();
        let flags: Vec<bool> = tokens.iter().map(|t| t.newline_before).collect();
        assert_eq!(flags, vec![false, true, false, true, false]);
    }

    #[test]
    fn lex_regex_after_operator() {
        let k = kinds("x = /a[/]b\\//gi;");
        assert_eq!(
            k[2],
            TokenKind::RegExp {
                pattern: "a[/]b\\/".to_string(),
                flags: "gi".to_string(),
            }
        );
        assert_eq!(k[3], TokenKind::Semi);
    }

    #[test]
    fn lex_slash_after_operand_is_division() {
        assert_eq!(
            kinds("a / b / 2"),
            vec![
                TokenKind::Ident("a".to_string()),
                TokenKind::Slash,
                TokenKind::Ident("b".to_string()),
                TokenKind::Slash,
                TokenKind::Number(2.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_rejects_template_literals() {
        let err = Lexer::new("`x`").lex().unwrap_err();
        assert!(err.message.contains("template literals"));
    }

    #[test]
    fn lex_spans_are_absolute() {
        let tokens = Lexer::new("let\n  abc").lex().unwrap();
        assert_eq!(tokens[1].span.offset(), 6);
        assert_eq!(tokens[1].span.len(), 3);
    }

    mod props {
        use super::super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn integer_literals_lex_to_their_value(n in 0u32..1_000_000) {
                let tokens = Lexer::new(&n.to_string()).lex().unwrap();
                prop_assert_eq!(&tokens[0].kind, &TokenKind::Number(n as f64));
            }

            #[test]
            fn identifiers_are_not_split(name in "[a-z_$][a-z0-9_$]{0,12}") {
                let tokens = Lexer::new(&name).lex().unwrap();
                prop_assert_eq!(tokens.len(), 2);
                match &tokens[0].kind {
                    TokenKind::Ident(s) => prop_assert_eq!(s, &name),
                    // Generated names may coincide with keywords.
                    _ => {}
                }
            }
        }
    }
}

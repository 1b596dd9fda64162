//! Recursive-descent parser for KernelScript.
//!
//! The parser never performs semantic validation — a `main` with a
//! bad parameter list parses just fine and is rejected later by the
//! type checker. Its only job is to turn a token stream into an
//! untyped [`ks_ast::Program`], attaching a [`ks_ast::Position`] to
//! every node that can anchor a diagnostic.

use ks_ast::Position;
use thiserror::Error;

mod parser;
pub use parser::Parser;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("{pos}: {message}")]
    SyntaxError { pos: Position, message: String },
    #[error("lexer error: {0}")]
    LexerError(String),
}

impl ParseError {
    pub fn pos(&self) -> Position {
        match self {
            ParseError::SyntaxError { pos, .. } => pos.clone(),
            ParseError::LexerError(_) => Position::unknown(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ks_ast::*;

    #[test]
    fn parses_minimal_main() {
        let src = "fn main() -> i32 { return 0; }";
        let mut parser = Parser::new(src, "t.ks").unwrap();
        let program = parser.parse_file().unwrap();
        assert_eq!(program.decls.len(), 1);
        match &program.decls[0] {
            Decl::Function(f) => {
                assert_eq!(f.name, "main");
                assert_eq!(f.return_type, Some(Type::I32));
            }
            other => panic!("expected function, got {other:?}"),
        }
    }

    #[test]
    fn reports_position_on_syntax_error() {
        let src = "fn main( -> i32 { }";
        let mut parser = Parser::new(src, "bad.ks").unwrap();
        let err = parser.parse_file().unwrap_err();
        assert!(matches!(err, ParseError::SyntaxError { .. }));
    }
}

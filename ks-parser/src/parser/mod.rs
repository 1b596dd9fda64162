use crate::ParseError;
use ks_ast::*;
use ks_lexer::{Lexer, Token, TokenSpan};

mod expressions;
mod items;
mod statements;
mod types;

pub struct Parser<'a> {
    pub(crate) tokens: Vec<TokenSpan>,
    pub(crate) current: usize,
    pub(crate) source: &'a str,
    pub(crate) file: String,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str, file: impl Into<String>) -> Result<Self, ParseError> {
        let lexer = Lexer::new(source);
        let tokens: Result<Vec<_>, _> = lexer.collect();
        let tokens = tokens.map_err(|e| ParseError::LexerError(format!("{e:?}")))?;

        Ok(Self {
            tokens,
            current: 0,
            source,
            file: file.into(),
        })
    }

    pub fn parse_file(&mut self) -> Result<Program, ParseError> {
        let mut includes = Vec::new();
        let mut decls = Vec::new();

        while !self.is_at_end() {
            if self.check(&Token::Include) {
                includes.push(self.parse_include()?);
            } else {
                decls.push(self.parse_decl()?);
            }
        }

        Ok(Program { includes, decls })
    }

    fn parse_decl(&mut self) -> Result<Decl, ParseError> {
        if self.check(&Token::At) {
            return Ok(Decl::AttributedFunction(self.parse_attributed_function()?));
        }
        if self.check(&Token::Struct) {
            return Ok(Decl::Struct(self.parse_struct()?));
        }
        if self.check(&Token::Type) {
            return Ok(Decl::TypeAlias(self.parse_type_alias()?));
        }
        if self.check(&Token::Enum) {
            return Ok(Decl::Enum(self.parse_enum()?));
        }
        if self.check(&Token::Config) {
            return Ok(Decl::Config(self.parse_config()?));
        }
        if self.check(&Token::Pin) || self.check(&Token::Var) {
            return self.parse_var_decl();
        }
        if self.check(&Token::Fn) {
            return Ok(Decl::Function(self.parse_function()?));
        }
        Err(self.error(
            "expected a top-level declaration (struct, type, enum, config, var, pin var, fn, or @attribute fn)",
        ))
    }

    // ==================== Token stream helpers ====================

    pub(crate) fn match_token(&mut self, kind: &Token) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn check(&self, kind: &Token) -> bool {
        if self.is_at_end() {
            false
        } else {
            std::mem::discriminant(self.peek()) == std::mem::discriminant(kind)
        }
    }

    pub(crate) fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    pub(crate) fn is_at_end(&self) -> bool {
        self.current >= self.tokens.len()
    }

    pub(crate) fn peek(&self) -> &Token {
        &self.tokens[self.current].token
    }

    pub(crate) fn previous(&self) -> &Token {
        &self.tokens[self.current - 1].token
    }

    pub(crate) fn consume(&mut self, kind: &Token, message: &str) -> Result<&Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(message))
        }
    }

    pub(crate) fn consume_ident(&mut self) -> Result<String, ParseError> {
        if let Token::Ident(name) = self.peek().clone() {
            self.advance();
            Ok(name)
        } else {
            Err(self.error("expected an identifier"))
        }
    }

    /// Checks for a specific bare-word identifier (keywords that
    /// aren't reserved, e.g. map kind names used as generic heads).
    pub(crate) fn check_ident(&self, expected: &str) -> bool {
        matches!(self.peek(), Token::Ident(name) if name == expected)
    }

    pub(crate) fn error(&self, message: &str) -> ParseError {
        ParseError::SyntaxError {
            pos: self.current_pos(),
            message: message.to_string(),
        }
    }

    /// Byte offset of the current token, converted to line/column
    /// against the source text.
    pub(crate) fn current_pos(&self) -> Position {
        let offset = if self.is_at_end() {
            self.source.len()
        } else {
            self.tokens[self.current].span.start
        };
        self.pos_at(offset)
    }

    pub(crate) fn pos_at(&self, offset: usize) -> Position {
        let before = &self.source[..offset.min(self.source.len())];
        let line = before.chars().filter(|&c| c == '\n').count() + 1;
        let column = before
            .rfind('\n')
            .map_or(before.len() + 1, |nl| before.len() - nl);
        Position::new(self.file.clone(), line, column)
    }
}

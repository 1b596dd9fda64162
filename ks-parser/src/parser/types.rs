use super::Parser;
use crate::ParseError;
use ks_ast::*;
use ks_lexer::Token;

impl<'a> Parser<'a> {
    pub(crate) fn parse_type(&mut self) -> Result<Type, ParseError> {
        let mut ty = self.parse_type_atom()?;

        // Fixed-size array suffix: `T[N]`, left-associative so `T[4][2]`
        // reads as `(T[4])[2]`.
        while self.check(&Token::LBracket) {
            self.advance();
            let len = self.consume_uint_literal()?;
            self.consume(&Token::RBracket, "expected ']' after array length")?;
            ty = Type::Array(Box::new(ty), len);
        }

        Ok(ty)
    }

    fn parse_type_atom(&mut self) -> Result<Type, ParseError> {
        if self.match_token(&Token::Star) {
            let inner = self.parse_type_atom()?;
            return Ok(Type::Pointer(Box::new(inner)));
        }

        let name = self.consume_ident()?;
        match name.as_str() {
            "u8" => Ok(Type::U8),
            "u16" => Ok(Type::U16),
            "u32" => Ok(Type::U32),
            "u64" => Ok(Type::U64),
            "i8" => Ok(Type::I8),
            "i16" => Ok(Type::I16),
            "i32" => Ok(Type::I32),
            "i64" => Ok(Type::I64),
            "bool" => Ok(Type::Bool),
            "str" => {
                self.consume(&Token::LParen, "expected '(' after 'str'")?;
                let len = self.consume_uint_literal()?;
                self.consume(&Token::RParen, "expected ')' closing 'str(N)'")?;
                Ok(Type::Str(len))
            }
            _ => {
                if let Some(kind) = MapKind::from_str(&name) {
                    if self.check(&Token::Lt) {
                        return self.parse_map_type(kind);
                    }
                }
                Ok(Type::Named(name))
            }
        }
    }

    /// `hash<K,V>(N)`, `hash<K,V>(N, key_size, value_size, flags)`.
    /// Only `max_entries` is required; the rest default to `None` and
    /// are filled in from the value/key type's natural size later by
    /// the type checker if omitted.
    fn parse_map_type(&mut self, kind: MapKind) -> Result<Type, ParseError> {
        self.consume(&Token::Lt, "expected '<' after map kind")?;
        let key = self.parse_type()?;
        self.consume(&Token::Comma, "expected ',' between map key and value types")?;
        let value = self.parse_type()?;
        self.consume(&Token::Gt, "expected '>' closing map type arguments")?;
        self.consume(&Token::LParen, "expected '(' before map max_entries")?;
        let max_entries = self.consume_uint_literal()?;
        let mut config = MapConfig {
            max_entries,
            ..Default::default()
        };
        if self.match_token(&Token::Comma) {
            config.flags = Some(self.consume_uint_literal()?);
        }
        self.consume(&Token::RParen, "expected ')' closing map sizing arguments")?;
        Ok(Type::Map {
            key: Box::new(key),
            value: Box::new(value),
            kind,
            config,
        })
    }

    pub(crate) fn consume_uint_literal(&mut self) -> Result<u64, ParseError> {
        if let Token::IntLiteral(text) = self.peek().clone() {
            self.advance();
            let (digits, _) = ks_lexer::split_int_suffix(&text);
            digits
                .parse::<u64>()
                .map_err(|_| self.error("invalid integer literal"))
        } else {
            Err(self.error("expected an integer literal"))
        }
    }
}

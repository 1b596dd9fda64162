use super::Parser;
use crate::ParseError;
use ks_ast::*;
use ks_lexer::Token;

impl<'a> Parser<'a> {
    pub(crate) fn parse_include(&mut self) -> Result<IncludeDecl, ParseError> {
        let pos = self.current_pos();
        self.advance(); // 'include'
        let header_name = self.consume_string_literal()?;
        self.consume(&Token::Semicolon, "expected ';' after include")?;
        Ok(IncludeDecl { header_name, pos })
    }

    pub(crate) fn parse_struct(&mut self) -> Result<StructDecl, ParseError> {
        let pos = self.current_pos();
        self.advance(); // 'struct'
        let name = self.consume_ident()?;
        self.consume(&Token::LBrace, "expected '{' after struct name")?;
        let mut fields = Vec::new();
        while !self.check(&Token::RBrace) {
            let field_name = self.consume_ident()?;
            self.consume(&Token::Colon, "expected ':' after struct field name")?;
            let ty = self.parse_type()?;
            fields.push(StructField {
                name: field_name,
                ty,
            });
            if !self.match_token(&Token::Comma) {
                break;
            }
        }
        self.consume(&Token::RBrace, "expected '}' closing struct body")?;
        Ok(StructDecl { name, fields, pos })
    }

    pub(crate) fn parse_type_alias(&mut self) -> Result<TypeAliasDecl, ParseError> {
        let pos = self.current_pos();
        self.advance(); // 'type'
        let name = self.consume_ident()?;
        self.consume(&Token::Eq, "expected '=' in type alias")?;
        let aliased = self.parse_type()?;
        self.consume(&Token::Semicolon, "expected ';' after type alias")?;
        Ok(TypeAliasDecl { name, aliased, pos })
    }

    pub(crate) fn parse_enum(&mut self) -> Result<EnumDecl, ParseError> {
        let pos = self.current_pos();
        self.advance(); // 'enum'
        let name = self.consume_ident()?;
        self.consume(&Token::LBrace, "expected '{' after enum name")?;
        let mut variants = Vec::new();
        while !self.check(&Token::RBrace) {
            let variant_name = self.consume_ident()?;
            let value = if self.match_token(&Token::Eq) {
                Some(self.parse_int_literal_token()?)
            } else {
                None
            };
            variants.push(EnumVariant {
                name: variant_name,
                value,
            });
            if !self.match_token(&Token::Comma) {
                break;
            }
        }
        self.consume(&Token::RBrace, "expected '}' closing enum body")?;
        Ok(EnumDecl {
            name,
            variants,
            pos,
        })
    }

    pub(crate) fn parse_config(&mut self) -> Result<ConfigDecl, ParseError> {
        let pos = self.current_pos();
        self.advance(); // 'config'
        let name = self.consume_ident()?;
        self.consume(&Token::LBrace, "expected '{' after config name")?;
        let mut fields = Vec::new();
        while !self.check(&Token::RBrace) {
            let field_name = self.consume_ident()?;
            self.consume(&Token::Colon, "expected ':' after config field name")?;
            let ty = self.parse_type()?;
            let default = if self.match_token(&Token::Eq) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            fields.push(ConfigField {
                name: field_name,
                ty,
                default,
            });
            if !self.match_token(&Token::Comma) {
                break;
            }
        }
        self.consume(&Token::RBrace, "expected '}' closing config body")?;
        Ok(ConfigDecl { name, fields, pos })
    }

    /// `var name [: Type] [= expr];` or `pin var name: Type = expr;`.
    /// A map-typed var is promoted to `Decl::Map` here rather than left
    /// for a later normalization pass, since the parser already has the
    /// type in hand.
    pub(crate) fn parse_var_decl(&mut self) -> Result<Decl, ParseError> {
        let pos = self.current_pos();
        let pinned = self.match_token(&Token::Pin);
        self.consume(&Token::Var, "expected 'var'")?;
        let name = self.consume_ident()?;
        let ty = if self.match_token(&Token::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let initializer = if self.match_token(&Token::Eq) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.consume(&Token::Semicolon, "expected ';' after var declaration")?;

        if let Some(Type::Map {
            key,
            value,
            kind,
            config,
        }) = ty
        {
            return Ok(Decl::Map(MapDecl {
                name,
                key_type: *key,
                value_type: *value,
                map_kind: kind,
                config,
                pinned,
                pos,
            }));
        }

        Ok(Decl::GlobalVar(GlobalVarDecl {
            name,
            ty,
            initializer,
            pinned,
            pos,
        }))
    }

    pub(crate) fn parse_function(&mut self) -> Result<FunctionDecl, ParseError> {
        let pos = self.current_pos();
        self.consume(&Token::Fn, "expected 'fn'")?;
        let name = self.consume_ident()?;
        let params = self.parse_param_list()?;
        let return_type = if self.match_token(&Token::Arrow) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let body = self.parse_block()?;
        Ok(FunctionDecl {
            name,
            params,
            return_type,
            body,
            pos,
        })
    }

    fn parse_param_list(&mut self) -> Result<Vec<Param>, ParseError> {
        self.consume(&Token::LParen, "expected '(' to open parameter list")?;
        let mut params = Vec::new();
        if !self.check(&Token::RParen) {
            loop {
                let name = self.consume_ident()?;
                self.consume(&Token::Colon, "expected ':' after parameter name")?;
                let ty = self.parse_type()?;
                params.push(Param { name, ty });
                if !self.match_token(&Token::Comma) {
                    break;
                }
            }
        }
        self.consume(&Token::RParen, "expected ')' closing parameter list")?;
        Ok(params)
    }

    pub(crate) fn parse_attributed_function(&mut self) -> Result<AttributedFunctionDecl, ParseError> {
        self.consume(&Token::At, "expected '@' before attribute name")?;
        let name = self.consume_ident()?;
        let attribute = match name.as_str() {
            "xdp" => Attribute::Xdp,
            "tc" => Attribute::Tc(self.parse_attribute_string_arg()?),
            "kprobe" => Attribute::Kprobe(self.parse_attribute_string_arg()?),
            "kfunc" => Attribute::Kfunc,
            "helper" => Attribute::Helper,
            "private" => Attribute::Private,
            other => Attribute::Unknown(other.to_string()),
        };
        let function = self.parse_function()?;
        Ok(AttributedFunctionDecl {
            attribute,
            function,
        })
    }

    fn parse_attribute_string_arg(&mut self) -> Result<String, ParseError> {
        self.consume(&Token::LParen, "expected '(' after attribute name")?;
        let value = self.consume_string_literal()?;
        self.consume(&Token::RParen, "expected ')' closing attribute argument")?;
        Ok(value)
    }

    fn consume_string_literal(&mut self) -> Result<String, ParseError> {
        if let Token::StringLiteral(s) = self.peek().clone() {
            self.advance();
            Ok(s)
        } else {
            Err(self.error("expected a string literal"))
        }
    }

    fn parse_int_literal_token(&mut self) -> Result<IntLit, ParseError> {
        if let Token::IntLiteral(text) = self.peek().clone() {
            self.advance();
            let (digits, suffix) = ks_lexer::split_int_suffix(&text);
            let raw: u64 = digits
                .parse()
                .map_err(|_| self.error("invalid integer literal"))?;
            let (width, signed) = match suffix {
                Some("u8") => (IntWidth::W8, false),
                Some("u16") => (IntWidth::W16, false),
                Some("u32") => (IntWidth::W32, false),
                Some("u64") => (IntWidth::W64, false),
                Some("i8") => (IntWidth::W8, true),
                Some("i16") => (IntWidth::W16, true),
                Some("i32") => (IntWidth::W32, true),
                _ => (IntWidth::W64, true),
            };
            Ok(IntLit::new(raw, width, signed))
        } else {
            Err(self.error("expected an integer literal"))
        }
    }
}

use super::Parser;
use crate::ParseError;
use ks_ast::*;
use ks_lexer::Token;

impl<'a> Parser<'a> {
    pub(crate) fn parse_block(&mut self) -> Result<Block, ParseError> {
        self.consume(&Token::LBrace, "expected '{' to open a block")?;
        let mut statements = Vec::new();
        while !self.check(&Token::RBrace) && !self.is_at_end() {
            statements.push(self.parse_statement()?);
        }
        self.consume(&Token::RBrace, "expected '}' to close a block")?;
        Ok(Block { statements })
    }

    pub(crate) fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        if self.check(&Token::Var) {
            return self.parse_let();
        }
        if self.check(&Token::Delete) {
            return self.parse_delete();
        }
        if self.check(&Token::Return) {
            return self.parse_return();
        }
        if self.check(&Token::Break) {
            let pos = self.current_pos();
            self.advance();
            self.consume(&Token::Semicolon, "expected ';' after 'break'")?;
            return Ok(Statement::Break(pos));
        }
        if self.check(&Token::Continue) {
            let pos = self.current_pos();
            self.advance();
            self.consume(&Token::Semicolon, "expected ';' after 'continue'")?;
            return Ok(Statement::Continue(pos));
        }
        if self.check(&Token::If) {
            return self.parse_if();
        }
        if self.check(&Token::For) {
            return self.parse_for();
        }
        if self.check(&Token::LBrace) {
            return Ok(Statement::Block(self.parse_block()?));
        }
        self.parse_expr_or_assign_statement()
    }

    fn parse_let(&mut self) -> Result<Statement, ParseError> {
        let pos = self.current_pos();
        self.advance(); // 'var'
        let name = self.consume_ident()?;
        let ty = if self.match_token(&Token::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        self.consume(&Token::Eq, "expected '=' in 'var' declaration")?;
        let value = self.parse_expression()?;
        self.consume(&Token::Semicolon, "expected ';' after 'var' declaration")?;
        Ok(Statement::Let {
            name,
            ty,
            value,
            pos,
        })
    }

    fn parse_delete(&mut self) -> Result<Statement, ParseError> {
        let pos = self.current_pos();
        self.advance(); // 'delete'
        let map_and_key = self.parse_expression()?;
        self.consume(&Token::Semicolon, "expected ';' after 'delete' statement")?;
        match map_and_key {
            Expr::Index { base, index, .. } => Ok(Statement::MapDelete {
                map: *base,
                key: *index,
                pos,
            }),
            _ => Err(ParseError::SyntaxError {
                pos,
                message: "expected 'delete map[key];'".to_string(),
            }),
        }
    }

    fn parse_return(&mut self) -> Result<Statement, ParseError> {
        let pos = self.current_pos();
        self.advance(); // 'return'
        let value = if self.check(&Token::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume(&Token::Semicolon, "expected ';' after 'return'")?;
        Ok(Statement::Return(value, pos))
    }

    fn parse_if(&mut self) -> Result<Statement, ParseError> {
        let pos = self.current_pos();
        self.advance(); // 'if'
        self.consume(&Token::LParen, "expected '(' after 'if'")?;
        let cond = self.parse_expression()?;
        self.consume(&Token::RParen, "expected ')' after 'if' condition")?;
        let then_block = self.parse_block()?;
        let else_block = if self.match_token(&Token::Else) {
            if self.check(&Token::If) {
                let nested = self.parse_if()?;
                Some(Block {
                    statements: vec![nested],
                })
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Ok(Statement::If {
            cond,
            then_block,
            else_block,
            pos,
        })
    }

    /// Disambiguates `for x in lo..hi { }` from `for x in iter { }` by
    /// looking for `..` after parsing the first operand of the `in`
    /// clause.
    fn parse_for(&mut self) -> Result<Statement, ParseError> {
        let pos = self.current_pos();
        self.advance(); // 'for'
        let var = self.consume_ident()?;
        self.consume(&Token::In, "expected 'in' after loop variable")?;
        let first = self.parse_expression()?;
        if self.match_token(&Token::DotDot) {
            let end = self.parse_expression()?;
            let body = self.parse_block()?;
            Ok(Statement::ForRange {
                var,
                start: first,
                end,
                body,
                pos,
            })
        } else {
            let body = self.parse_block()?;
            Ok(Statement::ForIn {
                var,
                iter: first,
                body,
                pos,
            })
        }
    }

    fn parse_expr_or_assign_statement(&mut self) -> Result<Statement, ParseError> {
        let pos = self.current_pos();
        let target = self.parse_expression()?;

        let compound_op = match self.peek() {
            Token::PlusEq => Some(CompoundOp::Add),
            Token::MinusEq => Some(CompoundOp::Sub),
            Token::StarEq => Some(CompoundOp::Mul),
            Token::SlashEq => Some(CompoundOp::Div),
            _ => None,
        };
        if let Some(op) = compound_op {
            self.advance();
            let value = self.parse_expression()?;
            self.consume(&Token::Semicolon, "expected ';' after compound assignment")?;
            return Ok(Statement::CompoundAssign {
                target,
                op,
                value,
                pos,
            });
        }

        if self.match_token(&Token::Eq) {
            let value = self.parse_expression()?;
            self.consume(&Token::Semicolon, "expected ';' after assignment")?;
            return Ok(Statement::Assign {
                target,
                value,
                pos,
            });
        }

        self.consume(&Token::Semicolon, "expected ';' after expression statement")?;
        Ok(Statement::Expr(target))
    }
}

use super::Parser;
use crate::ParseError;
use ks_ast::*;
use ks_lexer::Token;

impl<'a> Parser<'a> {
    pub(crate) fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_and()?;
        while self.check(&Token::OrOr) {
            let pos = self.current_pos();
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::Binary {
                op: BinOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                pos,
            };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_equality()?;
        while self.check(&Token::AndAnd) {
            let pos = self.current_pos();
            self.advance();
            let rhs = self.parse_equality()?;
            lhs = Expr::Binary {
                op: BinOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                pos,
            };
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                Token::EqEq => BinOp::Eq,
                Token::NotEq => BinOp::Ne,
                _ => break,
            };
            let pos = self.current_pos();
            self.advance();
            let rhs = self.parse_relational()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                pos,
            };
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_bitor()?;
        loop {
            let op = match self.peek() {
                Token::Lt => BinOp::Lt,
                Token::LtEq => BinOp::Le,
                Token::Gt => BinOp::Gt,
                Token::GtEq => BinOp::Ge,
                _ => break,
            };
            let pos = self.current_pos();
            self.advance();
            let rhs = self.parse_bitor()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                pos,
            };
        }
        Ok(lhs)
    }

    fn parse_bitor(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_bitxor()?;
        while self.check(&Token::Pipe) {
            let pos = self.current_pos();
            self.advance();
            let rhs = self.parse_bitxor()?;
            lhs = Expr::Binary {
                op: BinOp::BitOr,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                pos,
            };
        }
        Ok(lhs)
    }

    fn parse_bitxor(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_bitand()?;
        while self.check(&Token::Caret) {
            let pos = self.current_pos();
            self.advance();
            let rhs = self.parse_bitand()?;
            lhs = Expr::Binary {
                op: BinOp::BitXor,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                pos,
            };
        }
        Ok(lhs)
    }

    fn parse_bitand(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_shift()?;
        while self.check(&Token::Amp) {
            let pos = self.current_pos();
            self.advance();
            let rhs = self.parse_shift()?;
            lhs = Expr::Binary {
                op: BinOp::BitAnd,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                pos,
            };
        }
        Ok(lhs)
    }

    fn parse_shift(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Token::Shl => BinOp::Shl,
                Token::Shr => BinOp::Shr,
                _ => break,
            };
            let pos = self.current_pos();
            self.advance();
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                pos,
            };
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            let pos = self.current_pos();
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                pos,
            };
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::Percent => BinOp::Mod,
                _ => break,
            };
            let pos = self.current_pos();
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                pos,
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let pos = self.current_pos();
        let op = match self.peek() {
            Token::Minus => Some(UnOp::Neg),
            Token::Bang => Some(UnOp::Not),
            Token::Tilde => Some(UnOp::BitNot),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
                pos,
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.check(&Token::Dot) {
                let pos = self.current_pos();
                self.advance();
                let field = self.consume_ident()?;
                expr = Expr::Field {
                    base: Box::new(expr),
                    field,
                    pos,
                };
            } else if self.check(&Token::Arrow) {
                let pos = self.current_pos();
                self.advance();
                let field = self.consume_ident()?;
                expr = Expr::Arrow {
                    base: Box::new(expr),
                    field,
                    pos,
                };
            } else if self.check(&Token::LBracket) {
                let pos = self.current_pos();
                self.advance();
                let index = self.parse_expression()?;
                self.consume(&Token::RBracket, "expected ']' after map/array index")?;
                expr = Expr::Index {
                    base: Box::new(expr),
                    index: Box::new(index),
                    pos,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let pos = self.current_pos();
        match self.peek().clone() {
            Token::IntLiteral(text) => {
                self.advance();
                Ok(Expr::Int(self.parse_int_literal(&text)?, pos))
            }
            Token::StringLiteral(s) => {
                self.advance();
                Ok(Expr::Str(s, pos))
            }
            Token::True => {
                self.advance();
                Ok(Expr::Bool(true, pos))
            }
            Token::False => {
                self.advance();
                Ok(Expr::Bool(false, pos))
            }
            Token::NoneLit => {
                self.advance();
                Ok(Expr::None(pos))
            }
            Token::Ident(name) => {
                self.advance();
                if self.check(&Token::LParen) {
                    self.advance();
                    let mut args = Vec::new();
                    if !self.check(&Token::RParen) {
                        loop {
                            args.push(self.parse_expression()?);
                            if !self.match_token(&Token::Comma) {
                                break;
                            }
                        }
                    }
                    self.consume(&Token::RParen, "expected ')' closing call arguments")?;
                    Ok(Expr::Call {
                        callee: name,
                        args,
                        pos,
                    })
                } else {
                    Ok(Expr::Ident(name, pos))
                }
            }
            Token::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.consume(&Token::RParen, "expected ')' closing parenthesized expression")?;
                Ok(inner)
            }
            _ => Err(self.error("expected an expression")),
        }
    }

    fn parse_int_literal(&self, text: &str) -> Result<IntLit, ParseError> {
        let (digits, suffix) = ks_lexer::split_int_suffix(text);
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
            None | Some("i64") | Some(_) => (IntWidth::W64, true),
        };
        Ok(IntLit::new(raw, width, signed))
    }
}

use logos::Logos;

/// Unescape a string literal's raw slice (minus the surrounding quotes).
fn unescape_string(s: &str) -> String {
    let mut result = String::new();
    let mut chars = s.chars();

    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('r') => result.push('\r'),
                Some('t') => result.push('\t'),
                Some('"') => result.push('"'),
                Some('\\') => result.push('\\'),
                Some('u') => {
                    let hex: String = chars.by_ref().take(4).collect();
                    if let Ok(code) = u32::from_str_radix(&hex, 16) {
                        if let Some(unicode_char) = char::from_u32(code) {
                            result.push(unicode_char);
                        }
                    }
                }
                Some(c) => {
                    result.push('\\');
                    result.push(c);
                }
                None => result.push('\\'),
            }
        } else {
            result.push(ch);
        }
    }

    result
}

/// Token set for the KernelScript surface syntax. Integer literals
/// keep their optional width/sign suffix in the slice so the parser
/// can build the width-tagged `IntLit` carrier directly, instead of
/// re-deriving it later from an untagged value.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
pub enum Token {
    // Keywords
    #[token("struct")]
    Struct,
    #[token("type")]
    Type,
    #[token("var")]
    Var,
    #[token("pin")]
    Pin,
    #[token("config")]
    Config,
    #[token("enum")]
    Enum,
    #[token("fn")]
    Fn,
    #[token("include")]
    Include,
    #[token("for")]
    For,
    #[token("in")]
    In,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("delete")]
    Delete,
    #[token("return")]
    Return,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("none")]
    NoneLit,
    #[token("true")]
    True,
    #[token("false")]
    False,

    // Literals
    #[regex(r"[0-9]+(u8|u16|u32|u64|i8|i16|i32|i64)?", |lex| lex.slice().to_string())]
    IntLiteral(String),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| {
        let s = lex.slice();
        unescape_string(&s[1..s.len()-1])
    })]
    StringLiteral(String),

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    // Punctuation
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(";")]
    Semicolon,
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,
    #[token("@")]
    At,
    #[token("->")]
    Arrow,
    #[token("..")]
    DotDot,
    #[token(".")]
    Dot,

    // Operators (longest-match first via priority)
    #[token("==", priority = 3)]
    EqEq,
    #[token("!=", priority = 3)]
    NotEq,
    #[token("<=", priority = 3)]
    LtEq,
    #[token(">=", priority = 3)]
    GtEq,
    #[token("&&", priority = 3)]
    AndAnd,
    #[token("||", priority = 3)]
    OrOr,
    #[token("<<", priority = 3)]
    Shl,
    #[token(">>", priority = 3)]
    Shr,
    #[token("+=", priority = 3)]
    PlusEq,
    #[token("-=", priority = 3)]
    MinusEq,
    #[token("*=", priority = 3)]
    StarEq,
    #[token("/=", priority = 3)]
    SlashEq,
    #[token("=")]
    Eq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("!")]
    Bang,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("~")]
    Tilde,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,

    // Comments
    #[regex(r"//[^\n]*", logos::skip)]
    LineComment,
    #[regex(r"/\*([^*]|\*[^/])*\*/", logos::skip)]
    BlockComment,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenSpan {
    pub token: Token,
    pub span: std::ops::Range<usize>,
}

pub struct Lexer<'source> {
    inner: logos::Lexer<'source, Token>,
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source str) -> Self {
        Self {
            inner: Token::lexer(source),
        }
    }
}

impl<'source> Iterator for Lexer<'source> {
    type Item = Result<TokenSpan, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        let token = self.inner.next()?;
        let span = self.inner.span();

        match token {
            Ok(tok) => Some(Ok(TokenSpan { token: tok, span })),
            Err(_) => Some(Err(LexError::InvalidToken { span })),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum LexError {
    #[error("invalid token at {span:?}")]
    InvalidToken { span: std::ops::Range<usize> },
}

/// Split an `IntLiteral` slice into its digits and optional suffix,
/// e.g. `"1024u32"` -> `("1024", Some("u32"))`.
pub fn split_int_suffix(text: &str) -> (&str, Option<&str>) {
    for suffix in ["u8", "u16", "u32", "u64", "i8", "i16", "i32", "i64"] {
        if let Some(digits) = text.strip_suffix(suffix) {
            return (digits, Some(suffix));
        }
    }
    (text, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexes_keywords() {
        let source = "struct var pin config fn include for in if else delete";
        let mut lexer = Lexer::new(source);
        assert_eq!(lexer.next().unwrap().unwrap().token, Token::Struct);
        assert_eq!(lexer.next().unwrap().unwrap().token, Token::Var);
        assert_eq!(lexer.next().unwrap().unwrap().token, Token::Pin);
        assert_eq!(lexer.next().unwrap().unwrap().token, Token::Config);
        assert_eq!(lexer.next().unwrap().unwrap().token, Token::Fn);
        assert_eq!(lexer.next().unwrap().unwrap().token, Token::Include);
        assert_eq!(lexer.next().unwrap().unwrap().token, Token::For);
        assert_eq!(lexer.next().unwrap().unwrap().token, Token::In);
        assert_eq!(lexer.next().unwrap().unwrap().token, Token::If);
        assert_eq!(lexer.next().unwrap().unwrap().token, Token::Else);
        assert_eq!(lexer.next().unwrap().unwrap().token, Token::Delete);
    }

    #[test]
    fn lexes_suffixed_integer_literals() {
        let source = "42 1024u32 7i8";
        let tokens: Vec<_> = Lexer::new(source).map(|r| r.unwrap().token).collect();
        assert_eq!(tokens[0], Token::IntLiteral("42".to_string()));
        assert_eq!(tokens[1], Token::IntLiteral("1024u32".to_string()));
        assert_eq!(tokens[2], Token::IntLiteral("7i8".to_string()));
    }

    #[test]
    fn split_int_suffix_separates_digits_and_width_tag() {
        assert_eq!(split_int_suffix("1024u32"), ("1024", Some("u32")));
        assert_eq!(split_int_suffix("42"), ("42", None));
    }

    #[test]
    fn lexes_attribute_marker_and_ident() {
        let source = "@xdp fn x";
        let tokens: Vec<_> = Lexer::new(source).map(|r| r.unwrap().token).collect();
        assert_eq!(tokens[0], Token::At);
        assert_eq!(tokens[1], Token::Ident("xdp".to_string()));
        assert_eq!(tokens[2], Token::Fn);
        assert_eq!(tokens[3], Token::Ident("x".to_string()));
    }

    #[test]
    fn string_literal_unescapes() {
        let source = r#""eth0\n""#;
        let mut lexer = Lexer::new(source);
        assert_eq!(
            lexer.next().unwrap().unwrap().token,
            Token::StringLiteral("eth0\n".to_string())
        );
    }
}

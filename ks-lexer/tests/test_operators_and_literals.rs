use ks_lexer::{split_int_suffix, Lexer, Token};

#[test]
fn lexes_comparison_and_logical_operators() {
    let source = "== != <= >= && || < >";
    let mut lexer = Lexer::new(source);
    assert_eq!(lexer.next().unwrap().unwrap().token, Token::EqEq);
    assert_eq!(lexer.next().unwrap().unwrap().token, Token::NotEq);
    assert_eq!(lexer.next().unwrap().unwrap().token, Token::LtEq);
    assert_eq!(lexer.next().unwrap().unwrap().token, Token::GtEq);
    assert_eq!(lexer.next().unwrap().unwrap().token, Token::AndAnd);
    assert_eq!(lexer.next().unwrap().unwrap().token, Token::OrOr);
    assert_eq!(lexer.next().unwrap().unwrap().token, Token::Lt);
    assert_eq!(lexer.next().unwrap().unwrap().token, Token::Gt);
}

#[test]
fn lexes_compound_assignment_operators_before_their_prefixes() {
    // `+=` must not lex as `+` followed by `=`.
    let source = "+= -= *= /=";
    let mut lexer = Lexer::new(source);
    assert_eq!(lexer.next().unwrap().unwrap().token, Token::PlusEq);
    assert_eq!(lexer.next().unwrap().unwrap().token, Token::MinusEq);
    assert_eq!(lexer.next().unwrap().unwrap().token, Token::StarEq);
    assert_eq!(lexer.next().unwrap().unwrap().token, Token::SlashEq);
}

#[test]
fn lexes_shift_operators_ahead_of_angle_brackets() {
    let source = "hash<u32,u64> << >>";
    let mut lexer = Lexer::new(source);
    assert_eq!(
        lexer.next().unwrap().unwrap().token,
        Token::Ident("hash".to_string())
    );
    assert_eq!(lexer.next().unwrap().unwrap().token, Token::Lt);
    assert_eq!(
        lexer.next().unwrap().unwrap().token,
        Token::Ident("u32".to_string())
    );
    assert_eq!(lexer.next().unwrap().unwrap().token, Token::Comma);
    assert_eq!(
        lexer.next().unwrap().unwrap().token,
        Token::Ident("u64".to_string())
    );
    assert_eq!(lexer.next().unwrap().unwrap().token, Token::Gt);
    assert_eq!(lexer.next().unwrap().unwrap().token, Token::Shl);
    assert_eq!(lexer.next().unwrap().unwrap().token, Token::Shr);
}

#[test]
fn lexes_suffixed_literals_and_splits_them_back_apart() {
    let source = "1024u32 7u8 42i64 9";
    let mut lexer = Lexer::new(source);
    let texts: Vec<String> = (0..4)
        .map(|_| match lexer.next().unwrap().unwrap().token {
            Token::IntLiteral(s) => s,
            other => panic!("expected IntLiteral, got {other:?}"),
        })
        .collect();
    assert_eq!(
        texts.iter().map(|t| split_int_suffix(t)).collect::<Vec<_>>(),
        vec![
            ("1024", Some("u32")),
            ("7", Some("u8")),
            ("42", Some("i64")),
            ("9", None),
        ]
    );
}

#[test]
fn skips_line_and_block_comments() {
    let source = "var // trailing comment\n/* block\ncomment */ pin";
    let mut lexer = Lexer::new(source);
    assert_eq!(lexer.next().unwrap().unwrap().token, Token::Var);
    assert_eq!(lexer.next().unwrap().unwrap().token, Token::Pin);
    assert!(lexer.next().is_none());
}

#[test]
fn unescapes_string_literal_bodies() {
    let source = r#""hello\nworld" "tab\there" "quote\"inside""#;
    let mut lexer = Lexer::new(source);
    assert_eq!(
        lexer.next().unwrap().unwrap().token,
        Token::StringLiteral("hello\nworld".to_string())
    );
    assert_eq!(
        lexer.next().unwrap().unwrap().token,
        Token::StringLiteral("tab\there".to_string())
    );
    assert_eq!(
        lexer.next().unwrap().unwrap().token,
        Token::StringLiteral("quote\"inside".to_string())
    );
}

#[test]
fn invalid_token_reports_its_span() {
    let mut lexer = Lexer::new("var $ pin");
    assert_eq!(lexer.next().unwrap().unwrap().token, Token::Var);
    let err = lexer.next().unwrap().unwrap_err();
    match err {
        ks_lexer::LexError::InvalidToken { span } => assert_eq!(span, 4..5),
    }
}

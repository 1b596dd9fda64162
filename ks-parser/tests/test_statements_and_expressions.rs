use ks_ast::*;
use ks_parser::Parser;

fn parse_body(stmts: &str) -> Block {
    let src = format!("fn main() -> i32 {{ {stmts} }}");
    let mut parser = Parser::new(&src, "t.ks").expect("Parser::new failed");
    let program = parser.parse_file().expect("parse_file failed");
    match program.decls.into_iter().next().unwrap() {
        Decl::Function(f) => f.body,
        other => panic!("expected Decl::Function, got {other:?}"),
    }
}

#[test]
fn map_index_assignment_round_trips_through_postfix_and_assign() {
    let block = parse_body("counters[key] = counters[key] + 1u64;");
    match &block.statements[0] {
        Statement::Assign { target, value, .. } => {
            assert!(matches!(target, Expr::Index { .. }));
            assert!(matches!(value, Expr::Binary { op: BinOp::Add, .. }));
        }
        other => panic!("expected Statement::Assign, got {other:?}"),
    }
}

#[test]
fn delete_statement_requires_an_index_expression() {
    let block = parse_body("delete counters[key];");
    match &block.statements[0] {
        Statement::MapDelete { map, key, .. } => {
            assert!(matches!(map, Expr::Ident(name, _) if name == "counters"));
            assert!(matches!(key, Expr::Ident(name, _) if name == "key"));
        }
        other => panic!("expected Statement::MapDelete, got {other:?}"),
    }
}

#[test]
fn for_range_is_distinguished_from_for_in_by_dotdot() {
    let block = parse_body("for i in 0u32..10u32 { continue; } for p in packets { break; }");
    assert!(matches!(block.statements[0], Statement::ForRange { .. }));
    assert!(matches!(block.statements[1], Statement::ForIn { .. }));
}

#[test]
fn compound_assignment_operators_parse_to_distinct_ops() {
    let block = parse_body("x += 1u32; x -= 1u32; x *= 2u32; x /= 2u32;");
    let ops: Vec<CompoundOp> = block
        .statements
        .iter()
        .map(|s| match s {
            Statement::CompoundAssign { op, .. } => *op,
            other => panic!("expected CompoundAssign, got {other:?}"),
        })
        .collect();
    assert_eq!(ops, vec![CompoundOp::Add, CompoundOp::Sub, CompoundOp::Mul, CompoundOp::Div]);
}

#[test]
fn if_else_if_chain_nests_as_single_statement_else_blocks() {
    let block = parse_body(
        "if (a) { return 1i32; } else if (b) { return 2i32; } else { return 3i32; }",
    );
    match &block.statements[0] {
        Statement::If { else_block, .. } => {
            let else_block = else_block.as_ref().expect("expected else block");
            assert_eq!(else_block.statements.len(), 1);
            assert!(matches!(else_block.statements[0], Statement::If { .. }));
        }
        other => panic!("expected Statement::If, got {other:?}"),
    }
}

#[test]
fn operator_precedence_binds_multiplicative_tighter_than_additive() {
    let block = parse_body("var r = 1u32 + 2u32 * 3u32;");
    match &block.statements[0] {
        Statement::Let { value, .. } => match value {
            Expr::Binary { op: BinOp::Add, rhs, .. } => {
                assert!(matches!(**rhs, Expr::Binary { op: BinOp::Mul, .. }));
            }
            other => panic!("expected top-level Add, got {other:?}"),
        },
        other => panic!("expected Statement::Let, got {other:?}"),
    }
}

#[test]
fn field_and_arrow_access_chain_through_postfix() {
    let block = parse_body("var v = ctx->data.len;");
    match &block.statements[0] {
        Statement::Let { value, .. } => match value {
            Expr::Field { base, field, .. } => {
                assert_eq!(field, "len");
                assert!(matches!(**base, Expr::Arrow { .. }));
            }
            other => panic!("expected Expr::Field, got {other:?}"),
        },
        other => panic!("expected Statement::Let, got {other:?}"),
    }
}

#[test]
fn call_expression_collects_argument_list() {
    let block = parse_body(r#"print("dropped %d", count);"#);
    match &block.statements[0] {
        Statement::Expr(Expr::Call { callee, args, .. }) => {
            assert_eq!(callee, "print");
            assert_eq!(args.len(), 2);
        }
        other => panic!("expected a print call statement, got {other:?}"),
    }
}

#[test]
fn unary_operators_nest_right_to_left() {
    let block = parse_body("var v = !~x;");
    match &block.statements[0] {
        Statement::Let { value, .. } => match value {
            Expr::Unary { op: UnOp::Not, operand, .. } => {
                assert!(matches!(**operand, Expr::Unary { op: UnOp::BitNot, .. }));
            }
            other => panic!("expected Expr::Unary(Not), got {other:?}"),
        },
        other => panic!("expected Statement::Let, got {other:?}"),
    }
}

use ks_ast::*;
use ks_parser::Parser;

fn parse(source: &str) -> Program {
    let mut parser = Parser::new(source, "test.ks").expect("Parser::new failed");
    parser.parse_file().expect("parse_file failed")
}

#[test]
fn parses_include_directive_separately_from_decls() {
    let program = parse(r#"include "vmlinux.kh"; fn main() -> i32 { return 0; }"#);
    assert_eq!(program.includes.len(), 1);
    assert_eq!(program.includes[0].header_name, "vmlinux.kh");
    assert_eq!(program.decls.len(), 1);
}

#[test]
fn parses_struct_with_fields() {
    let program = parse("struct Packet { src: u32, dst: u32, len: u16 }");
    match &program.decls[0] {
        Decl::Struct(s) => {
            assert_eq!(s.name, "Packet");
            assert_eq!(s.fields.len(), 3);
            assert_eq!(s.fields[0].name, "src");
            assert_eq!(s.fields[0].ty, Type::U32);
            assert_eq!(s.fields[2].ty, Type::U16);
        }
        other => panic!("expected Decl::Struct, got {other:?}"),
    }
}

#[test]
fn parses_enum_with_explicit_discriminants() {
    let program = parse("enum Action { Drop = 0, Pass = 1, Redirect }");
    match &program.decls[0] {
        Decl::Enum(e) => {
            assert_eq!(e.variants.len(), 3);
            assert_eq!(e.variants[0].name, "Drop");
            assert_eq!(e.variants[0].value.unwrap().widen(), 0);
            assert_eq!(e.variants[1].value.unwrap().widen(), 1);
            assert!(e.variants[2].value.is_none());
        }
        other => panic!("expected Decl::Enum, got {other:?}"),
    }
}

#[test]
fn parses_config_block_with_defaults() {
    let program = parse("config Limits { max_rate: u32 = 1000u32, burst: u32 }");
    match &program.decls[0] {
        Decl::Config(c) => {
            assert_eq!(c.name, "Limits");
            assert_eq!(c.fields.len(), 2);
            assert!(c.fields[0].default.is_some());
            assert!(c.fields[1].default.is_none());
        }
        other => panic!("expected Decl::Config, got {other:?}"),
    }
}

#[test]
fn promotes_map_typed_var_to_map_decl() {
    let program = parse("pin var counters: hash<u32,u64>(1024);");
    match &program.decls[0] {
        Decl::Map(m) => {
            assert_eq!(m.name, "counters");
            assert_eq!(m.key_type, Type::U32);
            assert_eq!(m.value_type, Type::U64);
            assert_eq!(m.map_kind, MapKind::Hash);
            assert_eq!(m.config.max_entries, 1024);
            assert!(m.pinned);
        }
        other => panic!("expected Decl::Map, got {other:?}"),
    }
}

#[test]
fn plain_var_without_map_type_stays_a_global() {
    let program = parse("var threshold: u32 = 10u32;");
    match &program.decls[0] {
        Decl::GlobalVar(g) => {
            assert_eq!(g.name, "threshold");
            assert!(!g.pinned);
            assert!(g.initializer.is_some());
        }
        other => panic!("expected Decl::GlobalVar, got {other:?}"),
    }
}

#[test]
fn parses_attributed_xdp_function() {
    let program = parse(
        r#"
        @xdp fn drop_all(ctx: *xdp_md) -> xdp_action {
            return XDP_PASS;
        }
        "#,
    );
    match &program.decls[0] {
        Decl::AttributedFunction(f) => {
            assert_eq!(f.attribute, Attribute::Xdp);
            assert_eq!(f.function.name, "drop_all");
            assert_eq!(f.function.params.len(), 1);
            assert_eq!(f.function.params[0].name, "ctx");
            assert_eq!(
                f.function.params[0].ty,
                Type::Pointer(Box::new(Type::Named("xdp_md".to_string())))
            );
        }
        other => panic!("expected Decl::AttributedFunction, got {other:?}"),
    }
}

#[test]
fn parses_tc_and_kprobe_attribute_string_arguments() {
    let program = parse(
        r#"
        @tc("ingress") fn on_ingress(ctx: *__sk_buff) -> i32 { return 0; }
        @kprobe("tcp_sendmsg") fn on_send() { return; }
        "#,
    );
    match &program.decls[0] {
        Decl::AttributedFunction(f) => assert_eq!(f.attribute, Attribute::Tc("ingress".to_string())),
        other => panic!("expected Decl::AttributedFunction, got {other:?}"),
    }
    match &program.decls[1] {
        Decl::AttributedFunction(f) => {
            assert_eq!(f.attribute, Attribute::Kprobe("tcp_sendmsg".to_string()))
        }
        other => panic!("expected Decl::AttributedFunction, got {other:?}"),
    }
}

#[test]
fn unrecognized_attribute_name_parses_as_unknown() {
    let program = parse("@frobnicate fn f() { return; }");
    match &program.decls[0] {
        Decl::AttributedFunction(f) => {
            assert_eq!(f.attribute, Attribute::Unknown("frobnicate".to_string()))
        }
        other => panic!("expected Decl::AttributedFunction, got {other:?}"),
    }
}

#[test]
fn parses_array_and_nested_map_types() {
    let program = parse("struct S { buf: u8[64] } var m: array<u32,u32>(16);");
    match &program.decls[0] {
        Decl::Struct(s) => {
            assert_eq!(s.fields[0].ty, Type::Array(Box::new(Type::U8), 64));
        }
        other => panic!("expected Decl::Struct, got {other:?}"),
    }
    match &program.decls[1] {
        Decl::Map(m) => assert_eq!(m.map_kind, MapKind::Array),
        other => panic!("expected Decl::Map, got {other:?}"),
    }
}

#[test]
fn rejects_declaration_missing_its_terminator() {
    let mut parser = Parser::new("var x: u32 = 1u32", "t.ks").expect("Parser::new failed");
    assert!(parser.parse_file().is_err());
}

//! Stand-in for `include "x.kh"` resolution.
//!
//! Header resolution proper — reading a `.kh` file and turning it into
//! synthetic declarations — is an external collaborator (see the
//! scope note in the design doc). What the pipeline needs from it is
//! narrow and fixed: the handful of BTF types and constants every
//! `@xdp`/`@tc` program refers to. We inject those directly as root
//! scope entries before user declarations resolve, exactly as if a
//! resolver had produced them from `xdp.kh`/`tc.kh`.

use crate::symtab::{Entry, SymbolTable};
use ks_ast::*;

/// Declarations injected regardless of which headers are named,
/// since every KernelScript program can reference them.
pub fn inject(symtab: &mut SymbolTable) {
    let root = symtab.root();

    let xdp_md = StructDecl {
        name: "xdp_md".to_string(),
        fields: vec![
            StructField {
                name: "data".to_string(),
                ty: Type::U32,
            },
            StructField {
                name: "data_end".to_string(),
                ty: Type::U32,
            },
            StructField {
                name: "data_meta".to_string(),
                ty: Type::U32,
            },
            StructField {
                name: "ingress_ifindex".to_string(),
                ty: Type::U32,
            },
        ],
        pos: Position::unknown(),
    };
    let _ = symtab.declare(root, Entry::Struct(xdp_md));

    let sk_buff = StructDecl {
        name: "__sk_buff".to_string(),
        fields: vec![
            StructField {
                name: "len".to_string(),
                ty: Type::U32,
            },
            StructField {
                name: "ifindex".to_string(),
                ty: Type::U32,
            },
            StructField {
                name: "protocol".to_string(),
                ty: Type::U32,
            },
        ],
        pos: Position::unknown(),
    };
    let _ = symtab.declare(root, Entry::Struct(sk_buff));

    let xdp_action = EnumDecl {
        name: "xdp_action".to_string(),
        variants: vec![
            ("XDP_ABORTED", 0),
            ("XDP_DROP", 1),
            ("XDP_PASS", 2),
            ("XDP_TX", 3),
            ("XDP_REDIRECT", 4),
        ]
        .into_iter()
        .map(|(name, v)| EnumVariant {
            name: name.to_string(),
            value: Some(IntLit::new(v, IntWidth::W32, false)),
        })
        .collect(),
        pos: Position::unknown(),
    };
    declare_variants(symtab, root, &xdp_action);
    let _ = symtab.declare(root, Entry::Enum(xdp_action));

    for (name, value) in [("TC_ACT_OK", 0u64), ("TC_ACT_SHOT", 2), ("TC_ACT_UNSPEC", u64::MAX)] {
        let _ = symtab.declare(
            root,
            Entry::GlobalVar(GlobalVarDecl {
                name: name.to_string(),
                ty: Some(Type::I32),
                initializer: Some(Expr::Int(
                    IntLit::new(value, IntWidth::W32, true),
                    Position::unknown(),
                )),
                pinned: false,
                pos: Position::unknown(),
            }),
        );
    }
}

/// Enumerates every header name an `include` directive is allowed to
/// name. Unknown headers are not an error in this design: the
/// external resolver is responsible for producing nothing rather than
/// the pipeline guessing at a header it cannot see.
pub const KNOWN_HEADERS: &[&str] = &["xdp.kh", "tc.kh", "kprobe.kh"];

/// Declares each of an enum's variants as a resolvable root-scope
/// constant of the enum's own type, alongside the enum type itself --
/// otherwise `return XDP_PASS;` has nowhere to resolve `XDP_PASS` to.
/// Shared between the built-in enums above and user-declared `enum`s
/// in `typeck::check_program`.
pub fn declare_variants(symtab: &mut SymbolTable, scope: usize, e: &EnumDecl) {
    for v in &e.variants {
        let _ = symtab.declare(
            scope,
            Entry::Builtin {
                name: v.name.clone(),
                ty: Some(Type::Named(e.name.clone())),
            },
        );
    }
}

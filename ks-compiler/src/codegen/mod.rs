//! Shared C-emission helpers used by both [`crate::codegen::kernel`] and
//! [`crate::codegen::user`]. Neither side shares a match arm over which
//! side it's on; what they share is plain text plumbing: C type
//! spelling, expression printing, and the literal-key/value temporary
//! rule.

pub mod kernel;
pub mod user;

use ks_ast::{BinOp, Expr, Type, UnOp};
use std::fmt::Write as _;

/// Spells the base C type for a KernelScript type, ignoring array/str
/// sizing (see [`declare`] for the full declarator).
pub fn base_type(ty: &Type) -> String {
    match ty {
        Type::U8 => "__u8".to_string(),
        Type::U16 => "__u16".to_string(),
        Type::U32 => "__u32".to_string(),
        Type::U64 => "__u64".to_string(),
        Type::I8 => "__s8".to_string(),
        Type::I16 => "__s16".to_string(),
        Type::I32 => "__s32".to_string(),
        Type::I64 => "__s64".to_string(),
        Type::Bool => "bool".to_string(),
        Type::Str(_) => "char".to_string(),
        Type::Array(inner, _) => base_type(inner),
        Type::Named(name) => format!("struct {name}"),
        Type::Pointer(inner) => format!("{} *", base_type(inner)),
        Type::Map { value, .. } => base_type(value),
    }
}

/// Full C declarator for `name : ty`, handling the two shapes (fixed
/// string, fixed array) where the size sits after the identifier.
pub fn declare(name: &str, ty: &Type) -> String {
    match ty {
        Type::Str(n) => format!("char {name}[{n}]"),
        Type::Array(inner, n) => format!("{} {name}[{n}]", base_type(inner)),
        Type::Pointer(inner) => format!("{} *{name}", base_type(inner)),
        other => format!("{} {name}", base_type(other)),
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Renders an already-hoisted expression (no `Index` node may remain —
/// callers rewrite map reads away with [`rewrite_expr`] first).
pub fn emit_expr(expr: &Expr) -> String {
    match expr {
        Expr::Int(lit, _) => {
            if lit.signed {
                format!("{}", lit.widen())
            } else {
                format!("{}", lit.widen() as u64)
            }
        }
        Expr::Bool(b, _) => if *b { "true" } else { "false" }.to_string(),
        Expr::Str(s, _) => format!("\"{}\"", escape(s)),
        Expr::None(_) => "NULL".to_string(),
        Expr::Ident(name, _) => name.clone(),
        Expr::Field { base, field, .. } => format!("{}.{field}", emit_expr(base)),
        Expr::Arrow { base, field, .. } => format!("{}->{field}", emit_expr(base)),
        Expr::Index { base, index, .. } => {
            // Should have been hoisted away; fall back to a readable
            // placeholder rather than panic on malformed input.
            format!("/* unresolved map read */{}[{}]", emit_expr(base), emit_expr(index))
        }
        Expr::Call { callee, args, .. } => {
            let joined: Vec<String> = args.iter().map(emit_expr).collect();
            format!("{callee}({})", joined.join(", "))
        }
        Expr::Unary { op, operand, .. } => {
            let sym = match op {
                UnOp::Neg => "-",
                UnOp::Not => "!",
                UnOp::BitNot => "~",
            };
            format!("({sym}{})", emit_expr(operand))
        }
        Expr::Binary { op, lhs, rhs, .. } => {
            let sym = match op {
                BinOp::Add => "+",
                BinOp::Sub => "-",
                BinOp::Mul => "*",
                BinOp::Div => "/",
                BinOp::Mod => "%",
                BinOp::Eq => "==",
                BinOp::Ne => "!=",
                BinOp::Lt => "<",
                BinOp::Le => "<=",
                BinOp::Gt => ">",
                BinOp::Ge => ">=",
                BinOp::And => "&&",
                BinOp::Or => "||",
                BinOp::BitAnd => "&",
                BinOp::BitOr => "|",
                BinOp::BitXor => "^",
                BinOp::Shl => "<<",
                BinOp::Shr => ">>",
            };
            format!("({} {sym} {})", emit_expr(lhs), emit_expr(rhs))
        }
    }
}

/// Rewrites every node in `expr` bottom-up, letting `leaf` intercept
/// specific nodes (map reads) top-down before the generic recursion
/// rebuilds the rest. Used so a `m[k]` embedded anywhere in a larger
/// expression — not just a bare `x = m[k]` — gets hoisted into a
/// temporary exactly once.
pub fn rewrite_expr<F>(expr: &Expr, leaf: &mut F) -> Expr
where
    F: FnMut(&Expr) -> Option<Expr>,
{
    if let Some(replacement) = leaf(expr) {
        return replacement;
    }
    match expr {
        Expr::Field { base, field, pos } => Expr::Field {
            base: Box::new(rewrite_expr(base, leaf)),
            field: field.clone(),
            pos: pos.clone(),
        },
        Expr::Arrow { base, field, pos } => Expr::Arrow {
            base: Box::new(rewrite_expr(base, leaf)),
            field: field.clone(),
            pos: pos.clone(),
        },
        Expr::Index { base, index, pos } => Expr::Index {
            base: Box::new(rewrite_expr(base, leaf)),
            index: Box::new(rewrite_expr(index, leaf)),
            pos: pos.clone(),
        },
        Expr::Unary { op, operand, pos } => Expr::Unary {
            op: *op,
            operand: Box::new(rewrite_expr(operand, leaf)),
            pos: pos.clone(),
        },
        Expr::Binary { op, lhs, rhs, pos } => Expr::Binary {
            op: *op,
            lhs: Box::new(rewrite_expr(lhs, leaf)),
            rhs: Box::new(rewrite_expr(rhs, leaf)),
            pos: pos.clone(),
        },
        Expr::Call { callee, args, pos } => Expr::Call {
            callee: callee.clone(),
            args: args.iter().map(|a| rewrite_expr(a, leaf)).collect(),
            pos: pos.clone(),
        },
        other => other.clone(),
    }
}

/// Per-function counters for the globally-unique temporary names the
/// literal key/value rule requires: `k_tmp0`, `v_tmp1`, ... —
/// one shared counter per role so adjacent operations never collide.
#[derive(Default)]
pub struct TempCounter {
    next: u32,
}

impl TempCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self, role: &str) -> String {
        let n = self.next;
        self.next += 1;
        format!("{role}_tmp{n}")
    }

    /// A bare incrementing counter for names that don't follow the
    /// `<role>_tmp<n>` convention (loop callback labels, for example).
    pub fn next_id(&mut self) -> u32 {
        let n = self.next;
        self.next += 1;
        n
    }
}

/// Materializes `expr` as something addressable, emitting a temporary
/// declaration + assignment first if `expr` is not already an lvalue.
/// Never emits `&(<literal>)`.
pub fn addr_of(expr: &Expr, ty: &Type, role: &str, tmp: &mut TempCounter, indent: usize, out: &mut String) -> String {
    let pad = "    ".repeat(indent);
    match expr {
        Expr::Ident(..) | Expr::Field { .. } | Expr::Arrow { .. } => format!("&{}", emit_expr(expr)),
        _ => {
            let name = tmp.next(role);
            let _ = writeln!(out, "{pad}{} = {};", declare(&name, ty), emit_expr(expr));
            format!("&{name}")
        }
    }
}

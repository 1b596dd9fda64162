//! The rolling constant environment threaded through a function body.
//!
//! Per the design notes, a small immutable association list is
//! adequate at expected sizes; reassignment replaces the head entry
//! rather than mutating in place, which keeps a snapshot taken before
//! a loop statement untouched by anything that follows it.

use ks_ast::{BinOp, Expr, IntLit};

#[derive(Debug, Clone, Default)]
pub struct ConstEnv {
    bindings: Vec<(String, i64)>,
}

impl ConstEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `name` to `value`, shadowing any prior binding. A
    /// non-constant reassignment should call [`Self::invalidate`]
    /// instead so that later lookups correctly miss.
    pub fn bind(&self, name: &str, value: i64) -> Self {
        let mut next = self.clone();
        next.bindings.retain(|(n, _)| n != name);
        next.bindings.push((name.to_string(), value));
        next
    }

    pub fn invalidate(&self, name: &str) -> Self {
        let mut next = self.clone();
        next.bindings.retain(|(n, _)| n != name);
        next
    }

    pub fn lookup(&self, name: &str) -> Option<i64> {
        self.bindings
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    /// Folds an expression to a constant `i64` if every identifier it
    /// touches is bound in this environment and every literal carries
    /// a well-formed width tag. Division/modulo by a folded zero never
    /// folds, leaving the surrounding construct to be treated as
    /// `Unbounded` rather than panicking downstream.
    pub fn fold(&self, expr: &Expr) -> Option<i64> {
        match expr {
            Expr::Int(lit, _) => Some(widen(lit)),
            Expr::Ident(name, _) => self.lookup(name),
            Expr::Unary { op, operand, .. } => {
                let v = self.fold(operand)?;
                match op {
                    ks_ast::UnOp::Neg => Some(-v),
                    ks_ast::UnOp::Not => Some(if v == 0 { 1 } else { 0 }),
                    ks_ast::UnOp::BitNot => Some(!v),
                }
            }
            Expr::Binary { op, lhs, rhs, .. } => {
                let l = self.fold(lhs)?;
                let r = self.fold(rhs)?;
                match op {
                    BinOp::Add => Some(l.wrapping_add(r)),
                    BinOp::Sub => Some(l.wrapping_sub(r)),
                    BinOp::Mul => Some(l.wrapping_mul(r)),
                    BinOp::Div => (r != 0).then(|| l / r),
                    BinOp::Mod => (r != 0).then(|| l % r),
                    BinOp::BitAnd => Some(l & r),
                    BinOp::BitOr => Some(l | r),
                    BinOp::BitXor => Some(l ^ r),
                    BinOp::Shl => Some(l.wrapping_shl(r as u32)),
                    BinOp::Shr => Some(l.wrapping_shr(r as u32)),
                    BinOp::Eq => Some((l == r) as i64),
                    BinOp::Ne => Some((l != r) as i64),
                    BinOp::Lt => Some((l < r) as i64),
                    BinOp::Le => Some((l <= r) as i64),
                    BinOp::Gt => Some((l > r) as i64),
                    BinOp::Ge => Some((l >= r) as i64),
                    BinOp::And => Some(((l != 0) && (r != 0)) as i64),
                    BinOp::Or => Some(((l != 0) || (r != 0)) as i64),
                }
            }
            _ => None,
        }
    }
}

/// Sign/zero-extends per the literal's own width tag to the canonical
/// 64-bit signed representation, reversible via [`IntLit::narrow`].
pub fn widen(lit: &IntLit) -> i64 {
    lit.widen()
}

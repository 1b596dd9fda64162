//! Loop-bound classification and lowering-strategy selection.

use crate::const_env::ConstEnv;
use ks_ast::Expr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Bounded(i64, i64),
    Unbounded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopAnalysis {
    pub bound: Bound,
    pub estimated_iters: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStrategy {
    UnrolledLoop,
    SimpleLoop,
    BpfLoopHelper,
}

/// Classifies a `for var in start..end` loop against the constant
/// environment accumulated up to (not including) the loop statement.
pub fn classify_range(env: &ConstEnv, start: &Expr, end: &Expr) -> LoopAnalysis {
    match (env.fold(start), env.fold(end)) {
        (Some(lo), Some(hi)) => LoopAnalysis {
            bound: Bound::Bounded(lo, hi),
            estimated_iters: Some((hi - lo).max(0)),
        },
        _ => LoopAnalysis {
            bound: Bound::Unbounded,
            estimated_iters: None,
        },
    }
}

/// `for var in iter` is always unbounded in the current design — see
/// the open question in the design doc about range-for with a
/// non-constant `hi` never folding either.
pub fn classify_iter() -> LoopAnalysis {
    LoopAnalysis {
        bound: Bound::Unbounded,
        estimated_iters: None,
    }
}

/// Ties break toward the lower-verifier-risk strategy in the order
/// Unroll -> Simple -> BpfLoop, though the thresholds below never
/// actually produce a tie: the ranges are disjoint by construction.
pub fn select_strategy(analysis: &LoopAnalysis) -> LoopStrategy {
    match analysis.bound {
        Bound::Bounded(_, _) => match analysis.estimated_iters {
            Some(iters) if iters <= 4 => LoopStrategy::UnrolledLoop,
            Some(iters) if iters > 100 => LoopStrategy::BpfLoopHelper,
            _ => LoopStrategy::SimpleLoop,
        },
        Bound::Unbounded => LoopStrategy::BpfLoopHelper,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ks_ast::{IntLit, IntWidth, Position};

    fn int(v: i64) -> Expr {
        Expr::Int(IntLit::new(v as u64, IntWidth::W32, true), Position::unknown())
    }

    #[test]
    fn ten_to_hundred_is_simple_loop() {
        let env = ConstEnv::new();
        let a = classify_range(&env, &int(0), &int(10));
        assert_eq!(a.bound, Bound::Bounded(0, 10));
        assert_eq!(select_strategy(&a), LoopStrategy::SimpleLoop);
    }

    #[test]
    fn three_iters_unrolls() {
        let env = ConstEnv::new();
        let a = classify_range(&env, &int(0), &int(3));
        assert_eq!(select_strategy(&a), LoopStrategy::UnrolledLoop);
    }

    #[test]
    fn thousand_iters_uses_bpf_loop_helper() {
        let env = ConstEnv::new();
        let a = classify_range(&env, &int(0), &int(1000));
        assert_eq!(select_strategy(&a), LoopStrategy::BpfLoopHelper);
    }

    #[test]
    fn non_constant_bound_is_unbounded() {
        let env = ConstEnv::new();
        let n = Expr::Ident("n".to_string(), Position::unknown());
        let a = classify_range(&env, &int(0), &n);
        assert_eq!(a.bound, Bound::Unbounded);
        assert_eq!(select_strategy(&a), LoopStrategy::BpfLoopHelper);
    }

    #[test]
    fn constant_folding_through_let_binding_bounds_the_loop() {
        let env = ConstEnv::new().bind("a", 2).bind("b", 6);
        let a = classify_range(&env, &int(0), &Expr::Ident("b".to_string(), Position::unknown()));
        assert_eq!(a.bound, Bound::Bounded(0, 6));
    }
}

//! Lowers a [`TypedProgram`] into the two-sided IR described in the
//! design doc: one record per attributed function for the kernel
//! side, and the subset of user-space surface `main` actually touches
//! for the other. Kept as two distinct structs rather than one
//! tagged-sometimes-kernel node, so the two codegens never share a
//! match arm that has to reason about which side it's on.

use crate::loop_analysis::LoopStrategy;
use crate::typeck::TypedProgram;
use ks_ast::*;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
pub struct MapIr {
    pub decl: MapDecl,
    /// Stable slot index assigned in declaration order; becomes the
    /// suffix of the generated `<name>_fd` variable and the BTF map
    /// section ordinal.
    pub slot: usize,
}

pub struct KernelIr {
    pub maps: Vec<MapIr>,
    pub structs: Vec<StructDecl>,
    pub enums: Vec<EnumDecl>,
    pub aliases: Vec<TypeAliasDecl>,
    /// Config blocks also need a kernel-side map, one per block, so the
    /// user-space config writes have something to land in.
    pub configs: Vec<ConfigDecl>,
    pub attributed: Vec<AttributedFunctionDecl>,
    pub kfuncs: Vec<FunctionDecl>,
    pub loop_strategies: HashMap<Position, LoopStrategy>,
}

pub struct UserIr {
    pub main: FunctionDecl,
    pub main_args: Option<String>,
    pub structs: Vec<StructDecl>,
    pub configs: Vec<ConfigDecl>,
    /// Non-attributed, non-helper functions transitively reachable
    /// from `main`.
    pub helper_functions: Vec<FunctionDecl>,
    /// Maps `main` (or anything it calls) reads or writes, in
    /// declaration order, each carrying its IR slot.
    pub maps_used: Vec<MapIr>,
    /// Attributed-function names referenced by a `load(name)` call —
    /// drives the skeleton-gating rule in codegen.
    pub loaded: HashSet<String>,
    pub loop_strategies: HashMap<Position, LoopStrategy>,
}

pub struct ProgramIr {
    pub kernel: KernelIr,
    pub user: UserIr,
}

pub fn lower(typed: &TypedProgram) -> ProgramIr {
    let kfuncs = typed
        .attributed
        .iter()
        .filter(|af| af.attribute == Attribute::Kfunc)
        .map(|af| af.function.clone())
        .collect();

    let map_slots: Vec<MapIr> = typed
        .maps
        .iter()
        .enumerate()
        .map(|(slot, decl)| MapIr {
            decl: decl.clone(),
            slot,
        })
        .collect();

    let kernel = KernelIr {
        maps: map_slots.clone(),
        structs: typed.structs.clone(),
        enums: typed.enums.clone(),
        aliases: typed.aliases.clone(),
        configs: typed.configs.clone(),
        attributed: typed.attributed.clone(),
        kfuncs,
        loop_strategies: typed.loop_strategies.clone(),
    };

    let mut reachable = HashSet::new();
    let mut stack = vec!["main".to_string()];
    let mut loaded = HashSet::new();
    let by_name: HashMap<&str, &FunctionDecl> = typed
        .functions
        .iter()
        .map(|f| (f.name.as_str(), f))
        .collect();

    let mut maps_touched = HashSet::new();
    while let Some(name) = stack.pop() {
        let body = if name == "main" {
            &typed.main.body
        } else if let Some(f) = by_name.get(name.as_str()) {
            if !reachable.insert(name.clone()) {
                continue;
            }
            &f.body
        } else {
            continue;
        };
        collect_calls(body, &mut stack, &mut loaded, &mut maps_touched);
    }

    let helper_functions = typed
        .functions
        .iter()
        .filter(|f| reachable.contains(&f.name))
        .cloned()
        .collect();

    let maps_used: Vec<MapIr> = map_slots
        .iter()
        .filter(|m| maps_touched.contains(&m.decl.name))
        .cloned()
        .collect();

    let user = UserIr {
        main: typed.main.clone(),
        main_args: typed.main_args.clone(),
        structs: typed.structs.clone(),
        configs: typed.configs.clone(),
        helper_functions,
        maps_used,
        loaded,
        loop_strategies: typed.loop_strategies.clone(),
    };

    ProgramIr { kernel, user }
}

fn collect_calls(
    block: &Block,
    call_stack: &mut Vec<String>,
    loaded: &mut HashSet<String>,
    maps_touched: &mut HashSet<String>,
) {
    for stmt in &block.statements {
        walk_stmt(stmt, call_stack, loaded, maps_touched);
    }
}

fn walk_stmt(
    stmt: &Statement,
    call_stack: &mut Vec<String>,
    loaded: &mut HashSet<String>,
    maps_touched: &mut HashSet<String>,
) {
    match stmt {
        Statement::Let { value, .. } => walk_expr(value, call_stack, loaded, maps_touched),
        Statement::Assign { target, value, .. } | Statement::CompoundAssign { target, value, .. } => {
            walk_expr(target, call_stack, loaded, maps_touched);
            walk_expr(value, call_stack, loaded, maps_touched);
        }
        Statement::MapDelete { map, key, .. } => {
            if let Expr::Ident(name, _) = map {
                maps_touched.insert(name.clone());
            }
            walk_expr(key, call_stack, loaded, maps_touched);
        }
        Statement::Expr(e) => walk_expr(e, call_stack, loaded, maps_touched),
        Statement::Return(Some(e), _) => walk_expr(e, call_stack, loaded, maps_touched),
        Statement::Return(None, _) | Statement::Break(_) | Statement::Continue(_) => {}
        Statement::If {
            cond,
            then_block,
            else_block,
            ..
        } => {
            walk_expr(cond, call_stack, loaded, maps_touched);
            collect_calls(then_block, call_stack, loaded, maps_touched);
            if let Some(eb) = else_block {
                collect_calls(eb, call_stack, loaded, maps_touched);
            }
        }
        Statement::ForRange { start, end, body, .. } => {
            walk_expr(start, call_stack, loaded, maps_touched);
            walk_expr(end, call_stack, loaded, maps_touched);
            collect_calls(body, call_stack, loaded, maps_touched);
        }
        Statement::ForIn { iter, body, .. } => {
            walk_expr(iter, call_stack, loaded, maps_touched);
            collect_calls(body, call_stack, loaded, maps_touched);
        }
        Statement::Block(b) => collect_calls(b, call_stack, loaded, maps_touched),
    }
}

fn walk_expr(
    expr: &Expr,
    call_stack: &mut Vec<String>,
    loaded: &mut HashSet<String>,
    maps_touched: &mut HashSet<String>,
) {
    match expr {
        Expr::Index { base, index, .. } => {
            if let Expr::Ident(name, _) = base.as_ref() {
                maps_touched.insert(name.clone());
            }
            walk_expr(index, call_stack, loaded, maps_touched);
        }
        Expr::Field { base, .. } | Expr::Arrow { base, .. } => {
            walk_expr(base, call_stack, loaded, maps_touched);
        }
        Expr::Unary { operand, .. } => walk_expr(operand, call_stack, loaded, maps_touched),
        Expr::Binary { lhs, rhs, .. } => {
            walk_expr(lhs, call_stack, loaded, maps_touched);
            walk_expr(rhs, call_stack, loaded, maps_touched);
        }
        Expr::Call { callee, args, .. } => {
            if callee == "load" {
                if let Some(Expr::Ident(name, _)) = args.first() {
                    loaded.insert(name.clone());
                }
            } else {
                call_stack.push(callee.clone());
            }
            for arg in args {
                walk_expr(arg, call_stack, loaded, maps_touched);
            }
        }
        Expr::Int(..) | Expr::Bool(..) | Expr::Str(..) | Expr::None(_) | Expr::Ident(..) => {}
    }
}

//! eBPF-targeted C emission.

use super::{addr_of, base_type, declare, emit_expr, rewrite_expr, TempCounter};
use crate::ir::{KernelIr, MapIr};
use crate::loop_analysis::LoopStrategy;
use ks_ast::*;
use ks_diagnostics::CompileError;
use std::collections::HashMap;
use std::fmt::Write as _;

pub fn emit(ir: &KernelIr, unit: &str) -> Result<String, CompileError> {
    let mut out = String::new();
    writeln!(out, "/* generated by kernelscript from {unit}.ks -- eBPF side, do not edit */").unwrap();
    writeln!(out, "#include \"vmlinux.h\"").unwrap();
    writeln!(out, "#include <bpf/bpf_helpers.h>").unwrap();
    writeln!(out, "#include <bpf/bpf_tracing.h>").unwrap();
    writeln!(out, "#include <bpf/bpf_core_read.h>").unwrap();
    writeln!(out).unwrap();

    for s in &ir.structs {
        emit_struct(s, &mut out);
    }
    for e in &ir.enums {
        emit_enum(e, &mut out);
    }
    for a in &ir.aliases {
        writeln!(out, "typedef {};", declare(&a.name, &a.aliased)).unwrap();
    }
    if !ir.aliases.is_empty() {
        writeln!(out).unwrap();
    }

    let map_index: HashMap<&str, &MapIr> = ir.maps.iter().map(|m| (m.decl.name.as_str(), m)).collect();
    for m in &ir.maps {
        emit_map(&m.decl, &mut out);
    }
    for cfg in &ir.configs {
        emit_config_map(cfg, &mut out);
    }

    // `bpf_loop`/for-in callbacks can't be defined where their loop sits
    // (that would nest a function definition inside another); each one
    // is buffered here and appended at file scope once every attributed
    // function and kfunc has been emitted.
    let mut cbs: Vec<String> = Vec::new();

    let mut kfunc_names = Vec::new();
    for af in &ir.attributed {
        if af.attribute != Attribute::Kfunc {
            continue;
        }
        check_recursion(&af.function)?;
        writeln!(out, "__bpf_kfunc").unwrap();
        emit_signature(&af.function, &mut out);
        writeln!(out, "{{").unwrap();
        let mut tmp = TempCounter::new();
        emit_block(&af.function.body, &map_index, &ir.loop_strategies, &mut cbs, &mut tmp, 1, &mut out)?;
        writeln!(out, "}}\n").unwrap();
        kfunc_names.push(af.function.name.clone());
    }
    if !kfunc_names.is_empty() {
        emit_kfunc_registration(unit, &kfunc_names, &mut out);
    }

    for af in &ir.attributed {
        if af.attribute == Attribute::Kfunc {
            continue;
        }
        check_recursion(&af.function)?;
        emit_attributed(af, &map_index, &ir.loop_strategies, &mut cbs, &mut out)?;
    }

    for def in &cbs {
        out.push_str(def);
    }

    Ok(out)
}

fn emit_struct(s: &StructDecl, out: &mut String) {
    writeln!(out, "struct {} {{", s.name).unwrap();
    for f in &s.fields {
        writeln!(out, "    {};", declare(&f.name, &f.ty)).unwrap();
    }
    writeln!(out, "}};\n").unwrap();
}

fn emit_enum(e: &EnumDecl, out: &mut String) {
    writeln!(out, "enum {} {{", e.name).unwrap();
    for v in &e.variants {
        match &v.value {
            Some(lit) => writeln!(out, "    {} = {},", v.name, lit.widen()).unwrap(),
            None => writeln!(out, "    {},", v.name).unwrap(),
        }
    }
    writeln!(out, "}};\n").unwrap();
}

fn bpf_map_macro(kind: MapKind) -> &'static str {
    match kind {
        MapKind::Hash => "BPF_MAP_TYPE_HASH",
        MapKind::LruHash => "BPF_MAP_TYPE_LRU_HASH",
        MapKind::Array => "BPF_MAP_TYPE_ARRAY",
        MapKind::PercpuHash => "BPF_MAP_TYPE_PERCPU_HASH",
        MapKind::PercpuArray => "BPF_MAP_TYPE_PERCPU_ARRAY",
        MapKind::RingBuf => "BPF_MAP_TYPE_RINGBUF",
        MapKind::PerfEventArray => "BPF_MAP_TYPE_PERF_EVENT_ARRAY",
    }
}

fn emit_map(m: &MapDecl, out: &mut String) {
    writeln!(out, "struct {{").unwrap();
    writeln!(out, "    __uint(type, {});", bpf_map_macro(m.map_kind)).unwrap();
    if !matches!(m.map_kind, MapKind::RingBuf) {
        writeln!(out, "    __type(key, {});", base_type(&m.key_type)).unwrap();
        writeln!(out, "    __type(value, {});", base_type(&m.value_type)).unwrap();
    }
    writeln!(out, "    __uint(max_entries, {});", m.config.max_entries.max(1)).unwrap();
    if m.pinned {
        writeln!(out, "    __uint(pinning, LIBBPF_PIN_BY_NAME);").unwrap();
    }
    writeln!(out, "}} {} SEC(\".maps\");\n", m.name).unwrap();
}

/// One array map per config block, keyed by field slot index (matching
/// `emit_config_write` in the userspace codegen): `__u64` is wide enough
/// to hold any scalar config field without per-field map layouts.
fn emit_config_map(cfg: &ConfigDecl, out: &mut String) {
    writeln!(out, "struct {{").unwrap();
    writeln!(out, "    __uint(type, BPF_MAP_TYPE_ARRAY);").unwrap();
    writeln!(out, "    __type(key, __u32);").unwrap();
    writeln!(out, "    __type(value, __u64);").unwrap();
    writeln!(out, "    __uint(max_entries, {});", cfg.fields.len().max(1)).unwrap();
    writeln!(out, "}} {}_config_map SEC(\".maps\");\n", cfg.name).unwrap();
}

fn emit_kfunc_registration(unit: &str, names: &[String], out: &mut String) {
    let set_name = format!("{unit}_kfunc_ids");
    writeln!(out, "BTF_SET8_START({set_name})").unwrap();
    for name in names {
        writeln!(out, "BTF_ID_FLAGS(func, {name})").unwrap();
    }
    writeln!(out, "BTF_SET8_END({set_name})\n").unwrap();
    writeln!(out, "static const struct btf_kfunc_id_set {unit}_kfunc_set = {{").unwrap();
    writeln!(out, "    .owner = THIS_MODULE,").unwrap();
    writeln!(out, "    .set = &{set_name},").unwrap();
    writeln!(out, "}};\n").unwrap();
}

fn section_name(attr: &Attribute) -> Option<String> {
    match attr {
        Attribute::Xdp => Some("xdp".to_string()),
        Attribute::Tc(dir) => Some(format!("tc/{dir}")),
        Attribute::Kprobe(sym) => Some(format!("kprobe/{sym}")),
        _ => None,
    }
}

fn emit_signature(f: &FunctionDecl, out: &mut String) {
    let ret = f.return_type.as_ref().map(base_type).unwrap_or_else(|| "void".to_string());
    let params: Vec<String> = f.params.iter().map(|p| declare(&p.name, &p.ty)).collect();
    let params = if params.is_empty() { "void".to_string() } else { params.join(", ") };
    writeln!(out, "{ret} {}({params})", f.name).unwrap();
}

fn emit_attributed(
    af: &AttributedFunctionDecl,
    maps: &HashMap<&str, &MapIr>,
    strategies: &HashMap<Position, LoopStrategy>,
    cbs: &mut Vec<String>,
    out: &mut String,
) -> Result<(), CompileError> {
    let f = &af.function;
    match section_name(&af.attribute) {
        Some(sec) => writeln!(out, "SEC(\"{sec}\")").unwrap(),
        None => write!(out, "static ").unwrap(),
    }
    emit_signature(f, out);
    writeln!(out, "{{").unwrap();
    let mut tmp = TempCounter::new();
    emit_block(&f.body, maps, strategies, cbs, &mut tmp, 1, out)?;
    writeln!(out, "}}\n").unwrap();
    Ok(())
}

/// Replaces every `m[k]` with a freshly declared local holding the
/// looked-up value, returning the rewritten expression ready for
/// [`emit_expr`].
fn hoist_reads(
    expr: &Expr,
    maps: &HashMap<&str, &MapIr>,
    tmp: &mut TempCounter,
    indent: usize,
    out: &mut String,
) -> Expr {
    rewrite_expr(expr, &mut |node| match node {
        Expr::Index { base, index, pos } => {
            let Expr::Ident(map_name, _) = base.as_ref() else {
                return None;
            };
            let decl = maps.get(map_name.as_str())?;
            let hoisted_key = hoist_reads(index, maps, tmp, indent, out);
            let key_ref = addr_of(&hoisted_key, &decl.decl.key_type, "k", tmp, indent, out);
            let val_ty = base_type(&decl.decl.value_type);
            let name = tmp.next("lookup");
            let pad = "    ".repeat(indent);
            writeln!(out, "{pad}{val_ty} {name} = 0;").unwrap();
            writeln!(out, "{pad}{{").unwrap();
            writeln!(out, "{pad}    void *_v = bpf_map_lookup_elem(&{map_name}, {key_ref});").unwrap();
            writeln!(out, "{pad}    if (_v) {name} = *({val_ty} *)_v;").unwrap();
            writeln!(out, "{pad}}}").unwrap();
            Some(Expr::Ident(name, pos.clone()))
        }
        _ => None,
    })
}

#[allow(clippy::too_many_arguments)]
fn emit_block(
    block: &Block,
    maps: &HashMap<&str, &MapIr>,
    strategies: &HashMap<Position, LoopStrategy>,
    cbs: &mut Vec<String>,
    tmp: &mut TempCounter,
    indent: usize,
    out: &mut String,
) -> Result<(), CompileError> {
    for stmt in &block.statements {
        emit_stmt(stmt, maps, strategies, cbs, tmp, indent, out)?;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn emit_stmt(
    stmt: &Statement,
    maps: &HashMap<&str, &MapIr>,
    strategies: &HashMap<Position, LoopStrategy>,
    cbs: &mut Vec<String>,
    tmp: &mut TempCounter,
    indent: usize,
    out: &mut String,
) -> Result<(), CompileError> {
    let pad = "    ".repeat(indent);
    match stmt {
        Statement::Let { name, ty, value, .. } => {
            let rewritten = hoist_reads(value, maps, tmp, indent, out);
            let decl_ty = ty.clone().unwrap_or(Type::I64);
            writeln!(out, "{pad}{} = {};", declare(name, &decl_ty), emit_expr(&rewritten)).unwrap();
        }
        Statement::Assign { target, value, .. } => {
            if let Expr::Index { base, index, .. } = target {
                if let Expr::Ident(map_name, _) = base.as_ref() {
                    if let Some(decl) = maps.get(map_name.as_str()) {
                        let key = hoist_reads(index, maps, tmp, indent, out);
                        let val = hoist_reads(value, maps, tmp, indent, out);
                        let key_ref = addr_of(&key, &decl.decl.key_type, "k", tmp, indent, out);
                        let val_ref = addr_of(&val, &decl.decl.value_type, "v", tmp, indent, out);
                        writeln!(
                            out,
                            "{pad}bpf_map_update_elem(&{map_name}, {key_ref}, {val_ref}, BPF_ANY);"
                        )
                        .unwrap();
                        return Ok(());
                    }
                }
            }
            let rewritten_target = hoist_reads(target, maps, tmp, indent, out);
            let rewritten_value = hoist_reads(value, maps, tmp, indent, out);
            writeln!(out, "{pad}{} = {};", emit_expr(&rewritten_target), emit_expr(&rewritten_value)).unwrap();
        }
        Statement::CompoundAssign { target, op, value, .. } => {
            let sym = match op {
                CompoundOp::Add => "+=",
                CompoundOp::Sub => "-=",
                CompoundOp::Mul => "*=",
                CompoundOp::Div => "/=",
            };
            let rewritten_target = hoist_reads(target, maps, tmp, indent, out);
            let rewritten_value = hoist_reads(value, maps, tmp, indent, out);
            writeln!(out, "{pad}{} {sym} {};", emit_expr(&rewritten_target), emit_expr(&rewritten_value)).unwrap();
        }
        Statement::MapDelete { map, key, .. } => {
            if let Expr::Ident(map_name, _) = map {
                if let Some(decl) = maps.get(map_name.as_str()) {
                    let hoisted = hoist_reads(key, maps, tmp, indent, out);
                    let key_ref = addr_of(&hoisted, &decl.decl.key_type, "k", tmp, indent, out);
                    writeln!(out, "{pad}bpf_map_delete_elem(&{map_name}, {key_ref});").unwrap();
                }
            }
        }
        Statement::Expr(e) => {
            let rewritten = hoist_reads(e, maps, tmp, indent, out);
            writeln!(out, "{pad}{};", emit_expr(&rewritten)).unwrap();
        }
        Statement::Return(Some(e), _) => {
            let rewritten = hoist_reads(e, maps, tmp, indent, out);
            writeln!(out, "{pad}return {};", emit_expr(&rewritten)).unwrap();
        }
        Statement::Return(None, _) => {
            writeln!(out, "{pad}return;").unwrap();
        }
        Statement::Break(_) => writeln!(out, "{pad}break;").unwrap(),
        Statement::Continue(_) => writeln!(out, "{pad}continue;").unwrap(),
        Statement::If { cond, then_block, else_block, .. } => {
            let rewritten = hoist_reads(cond, maps, tmp, indent, out);
            writeln!(out, "{pad}if ({}) {{", emit_expr(&rewritten)).unwrap();
            emit_block(then_block, maps, strategies, cbs, tmp, indent + 1, out)?;
            if let Some(eb) = else_block {
                writeln!(out, "{pad}}} else {{").unwrap();
                emit_block(eb, maps, strategies, cbs, tmp, indent + 1, out)?;
            }
            writeln!(out, "{pad}}}").unwrap();
        }
        Statement::ForRange { var, start, end, body, pos } => {
            emit_for_range(var, start, end, body, pos, maps, strategies, cbs, tmp, indent, out)?;
        }
        Statement::ForIn { var, iter, body, pos } => {
            emit_for_in(var, iter, body, pos, maps, strategies, cbs, tmp, indent, out)?;
        }
        Statement::Block(b) => {
            writeln!(out, "{pad}{{").unwrap();
            emit_block(b, maps, strategies, cbs, tmp, indent + 1, out)?;
            writeln!(out, "{pad}}}").unwrap();
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn emit_for_range(
    var: &str,
    start: &Expr,
    end: &Expr,
    body: &Block,
    pos: &Position,
    maps: &HashMap<&str, &MapIr>,
    strategies: &HashMap<Position, LoopStrategy>,
    cbs: &mut Vec<String>,
    tmp: &mut TempCounter,
    indent: usize,
    out: &mut String,
) -> Result<(), CompileError> {
    let pad = "    ".repeat(indent);
    let strategy = strategies.get(pos).copied().unwrap_or(LoopStrategy::SimpleLoop);
    match strategy {
        LoopStrategy::UnrolledLoop => {
            let env = crate::const_env::ConstEnv::new();
            match (env.fold(start), env.fold(end)) {
                (Some(lo), Some(hi)) => {
                    writeln!(out, "{pad}/* unrolled: {var} in {lo}..{hi} */").unwrap();
                    for i in lo..hi {
                        writeln!(out, "{pad}{{").unwrap();
                        writeln!(out, "{pad}    {} = {i};", declare(var, &Type::I64)).unwrap();
                        emit_block(body, maps, strategies, cbs, tmp, indent + 1, out)?;
                        writeln!(out, "{pad}}}").unwrap();
                    }
                }
                _ => emit_simple_for(var, start, end, body, maps, strategies, cbs, tmp, indent, out)?,
            }
        }
        LoopStrategy::SimpleLoop => {
            emit_simple_for(var, start, end, body, maps, strategies, cbs, tmp, indent, out)?;
        }
        LoopStrategy::BpfLoopHelper => {
            emit_bpf_loop_helper(var, start, end, body, maps, strategies, cbs, tmp, indent, out)?;
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn emit_simple_for(
    var: &str,
    start: &Expr,
    end: &Expr,
    body: &Block,
    maps: &HashMap<&str, &MapIr>,
    strategies: &HashMap<Position, LoopStrategy>,
    cbs: &mut Vec<String>,
    tmp: &mut TempCounter,
    indent: usize,
    out: &mut String,
) -> Result<(), CompileError> {
    let pad = "    ".repeat(indent);
    let lo = hoist_reads(start, maps, tmp, indent, out);
    let hi = hoist_reads(end, maps, tmp, indent, out);
    writeln!(
        out,
        "{pad}for (__s64 {var} = {}; {var} < {}; {var}++) {{",
        emit_expr(&lo),
        emit_expr(&hi)
    )
    .unwrap();
    emit_block(body, maps, strategies, cbs, tmp, indent + 1, out)?;
    writeln!(out, "{pad}}}").unwrap();
    Ok(())
}

/// Lowers a bounded-but-large or unbounded loop to a `bpf_loop()` call.
/// The callback cannot be defined where the loop sits -- that would
/// nest a function definition inside the enclosing one, which is not
/// valid C -- so only a forward declaration is written at the call
/// site; the full definition is pushed onto `cbs` and appended at file
/// scope once the enclosing function has closed (see `emit`).
#[allow(clippy::too_many_arguments)]
fn emit_bpf_loop_helper(
    var: &str,
    start: &Expr,
    end: &Expr,
    body: &Block,
    maps: &HashMap<&str, &MapIr>,
    strategies: &HashMap<Position, LoopStrategy>,
    cbs: &mut Vec<String>,
    tmp: &mut TempCounter,
    indent: usize,
    out: &mut String,
) -> Result<(), CompileError> {
    let pad = "    ".repeat(indent);
    let lo = hoist_reads(start, maps, tmp, indent, out);
    let hi = hoist_reads(end, maps, tmp, indent, out);
    let cb_name = format!("ks_loop_cb_{}", tmp.next_id());
    writeln!(out, "{pad}static long {cb_name}(__u64 idx, void *ctx);").unwrap();
    writeln!(out, "{pad}{{").unwrap();
    writeln!(out, "{pad}    __s64 _lo = {};", emit_expr(&lo)).unwrap();
    writeln!(out, "{pad}    __s64 _hi = {};", emit_expr(&hi)).unwrap();
    writeln!(out, "{pad}    __u32 _count = _hi > _lo ? (__u32)(_hi - _lo) : 0;").unwrap();
    writeln!(out, "{pad}    bpf_loop(_count, {cb_name}, &_lo, 0);").unwrap();
    writeln!(out, "{pad}}}").unwrap();

    let mut def = String::new();
    writeln!(def, "static long {cb_name}(__u64 idx, void *ctx)").unwrap();
    writeln!(def, "{{").unwrap();
    writeln!(def, "    __s64 *_base = ctx;").unwrap();
    writeln!(def, "    {} = *_base + (__s64)idx;", declare(var, &Type::I64)).unwrap();
    emit_block(body, maps, strategies, cbs, tmp, 1, &mut def)?;
    writeln!(def, "    return 0;").unwrap();
    writeln!(def, "}}\n").unwrap();
    cbs.push(def);
    Ok(())
}

/// Same file-scope-hoisting rule as [`emit_bpf_loop_helper`]: a
/// forward declaration at the call site, the definition buffered onto
/// `cbs` for the caller to append once this function closes.
#[allow(clippy::too_many_arguments)]
fn emit_for_in(
    var: &str,
    iter: &Expr,
    body: &Block,
    pos: &Position,
    maps: &HashMap<&str, &MapIr>,
    strategies: &HashMap<Position, LoopStrategy>,
    cbs: &mut Vec<String>,
    tmp: &mut TempCounter,
    indent: usize,
    out: &mut String,
) -> Result<(), CompileError> {
    let pad = "    ".repeat(indent);
    let _ = pos;
    let rewritten = hoist_reads(iter, maps, tmp, indent, out);
    let cb_name = format!("ks_iter_cb_{}", tmp.next_id());
    writeln!(out, "{pad}/* iterator-form loop, always lowered via bpf_loop */").unwrap();
    writeln!(out, "{pad}static long {cb_name}(__u64 idx, void *ctx);").unwrap();
    writeln!(out, "{pad}bpf_loop((__u32)({}), {cb_name}, NULL, 0);", emit_expr(&rewritten)).unwrap();

    let mut def = String::new();
    writeln!(def, "static long {cb_name}(__u64 idx, void *ctx)").unwrap();
    writeln!(def, "{{").unwrap();
    writeln!(def, "    (void)ctx;").unwrap();
    writeln!(def, "    {} = (__s64)idx;", declare(var, &Type::I64)).unwrap();
    emit_block(body, maps, strategies, cbs, tmp, 1, &mut def)?;
    writeln!(def, "    return 0;").unwrap();
    writeln!(def, "}}\n").unwrap();
    cbs.push(def);
    Ok(())
}

fn calls_self(block: &Block, name: &str) -> bool {
    block.statements.iter().any(|s| stmt_calls(s, name))
}

fn stmt_calls(stmt: &Statement, name: &str) -> bool {
    match stmt {
        Statement::Let { value, .. } => expr_calls(value, name),
        Statement::Assign { target, value, .. } | Statement::CompoundAssign { target, value, .. } => {
            expr_calls(target, name) || expr_calls(value, name)
        }
        Statement::MapDelete { map, key, .. } => expr_calls(map, name) || expr_calls(key, name),
        Statement::Expr(e) => expr_calls(e, name),
        Statement::Return(Some(e), _) => expr_calls(e, name),
        Statement::Return(None, _) | Statement::Break(_) | Statement::Continue(_) => false,
        Statement::If { cond, then_block, else_block, .. } => {
            expr_calls(cond, name)
                || calls_self(then_block, name)
                || else_block.as_ref().is_some_and(|b| calls_self(b, name))
        }
        Statement::ForRange { start, end, body, .. } => {
            expr_calls(start, name) || expr_calls(end, name) || calls_self(body, name)
        }
        Statement::ForIn { iter, body, .. } => expr_calls(iter, name) || calls_self(body, name),
        Statement::Block(b) => calls_self(b, name),
    }
}

fn expr_calls(expr: &Expr, name: &str) -> bool {
    match expr {
        Expr::Call { callee, args, .. } => callee == name || args.iter().any(|a| expr_calls(a, name)),
        Expr::Field { base, .. } | Expr::Arrow { base, .. } => expr_calls(base, name),
        Expr::Index { base, index, .. } => expr_calls(base, name) || expr_calls(index, name),
        Expr::Unary { operand, .. } => expr_calls(operand, name),
        Expr::Binary { lhs, rhs, .. } => expr_calls(lhs, name) || expr_calls(rhs, name),
        _ => false,
    }
}

fn check_recursion(f: &FunctionDecl) -> Result<(), CompileError> {
    if calls_self(&f.body, &f.name) {
        return Err(CompileError::VerifierWouldReject {
            pos: f.pos.clone().into(),
            reason: format!("`{}` calls itself; the verifier rejects recursive eBPF programs", f.name),
        });
    }
    Ok(())
}

//! User-space orchestrator C emission.

use super::{addr_of, base_type, declare, emit_expr, rewrite_expr, TempCounter};
use crate::ir::{MapIr, UserIr};
use crate::loop_analysis::LoopStrategy;
use ks_ast::*;
use ks_diagnostics::CompileError;
use std::collections::HashMap;
use std::fmt::Write as _;

/// Per-function bookkeeping beyond the temp counter: which `attach()`
/// call produced which `bpf_link *`, so a later `detach()` of the same
/// program identifier destroys the right one.
struct UserCtx {
    tmp: TempCounter,
    links: HashMap<String, String>,
}

pub fn emit(ir: &UserIr, unit: &str) -> Result<String, CompileError> {
    let mut out = String::new();
    writeln!(out, "/* generated by kernelscript from {unit}.ks -- user-space side, do not edit */").unwrap();
    writeln!(out, "#include <stdio.h>").unwrap();
    writeln!(out, "#include <stdlib.h>").unwrap();
    writeln!(out, "#include <string.h>").unwrap();
    writeln!(out, "#include <bpf/libbpf.h>").unwrap();
    writeln!(out, "#include <bpf/bpf.h>").unwrap();
    if ir.main_args.is_some() {
        writeln!(out, "#include <getopt.h>").unwrap();
    }

    let needs_skeleton = !ir.loaded.is_empty()
        || !ir.maps_used.is_empty()
        || !ir.configs.is_empty()
        || calls_attach_or_detach(&ir.main.body)
        || ir.helper_functions.iter().any(|f| calls_attach_or_detach(&f.body));
    if needs_skeleton {
        writeln!(out, "#include \"{unit}.ebpf.skel.h\"").unwrap();
    }
    writeln!(out).unwrap();

    for s in &ir.structs {
        emit_struct(s, &mut out);
    }

    for cfg in &ir.configs {
        writeln!(out, "static int {}_config_map_fd = -1;", cfg.name).unwrap();
    }

    let pinned_present = ir.maps_used.iter().any(|m| m.decl.pinned);
    if pinned_present {
        writeln!(out, "static int pinned_globals_map_fd = -1;").unwrap();
    }
    for m in &ir.maps_used {
        if !m.decl.pinned {
            writeln!(out, "static int {}_fd = -1;", m.decl.name).unwrap();
        }
    }
    if !ir.configs.is_empty() || !ir.maps_used.is_empty() {
        writeln!(out).unwrap();
    }

    let map_index: HashMap<&str, &MapIr> = ir.maps_used.iter().map(|m| (m.decl.name.as_str(), m)).collect();
    let config_index: HashMap<&str, &ConfigDecl> = ir.configs.iter().map(|c| (c.name.as_str(), c)).collect();

    for f in &ir.helper_functions {
        emit_helper(f, ir, unit, &map_index, &config_index, &ir.loop_strategies, &mut out)?;
    }

    emit_main(ir, unit, &map_index, &config_index, &mut out)?;

    Ok(out)
}

fn emit_struct(s: &StructDecl, out: &mut String) {
    writeln!(out, "struct {} {{", s.name).unwrap();
    for f in &s.fields {
        writeln!(out, "    {};", declare(&f.name, &f.ty)).unwrap();
    }
    writeln!(out, "}};\n").unwrap();
}

fn emit_signature(f: &FunctionDecl, out: &mut String) {
    let ret = f.return_type.as_ref().map(base_type).unwrap_or_else(|| "void".to_string());
    let params: Vec<String> = f.params.iter().map(|p| declare(&p.name, &p.ty)).collect();
    let params = if params.is_empty() { "void".to_string() } else { params.join(", ") };
    writeln!(out, "static {ret} {}({params})", f.name).unwrap();
}

#[allow(clippy::too_many_arguments)]
fn emit_helper(
    f: &FunctionDecl,
    ir: &UserIr,
    unit: &str,
    maps: &HashMap<&str, &MapIr>,
    configs: &HashMap<&str, &ConfigDecl>,
    strategies: &HashMap<Position, LoopStrategy>,
    out: &mut String,
) -> Result<(), CompileError> {
    emit_signature(f, out);
    writeln!(out, "{{").unwrap();
    let mut ctx = UserCtx {
        tmp: TempCounter::new(),
        links: HashMap::new(),
    };
    emit_block(&f.body, ir, unit, maps, configs, strategies, &mut ctx, 1, out)?;
    writeln!(out, "}}\n").unwrap();
    Ok(())
}

fn emit_main(
    ir: &UserIr,
    unit: &str,
    maps: &HashMap<&str, &MapIr>,
    configs: &HashMap<&str, &ConfigDecl>,
    out: &mut String,
) -> Result<(), CompileError> {
    match &ir.main_args {
        None => writeln!(out, "int main(void)\n{{").unwrap(),
        Some(struct_name) => {
            writeln!(out, "int main(int argc, char **argv)\n{{").unwrap();
            if let Some(s) = ir.structs.iter().find(|s| &s.name == struct_name) {
                emit_args_parsing(s, out);
            }
        }
    }
    let mut ctx = UserCtx {
        tmp: TempCounter::new(),
        links: HashMap::new(),
    };
    emit_block(&ir.main.body, ir, unit, maps, configs, &ir.loop_strategies, &mut ctx, 1, out)?;
    writeln!(out, "}}\n").unwrap();
    Ok(())
}

fn emit_args_parsing(s: &StructDecl, out: &mut String) {
    writeln!(out, "    struct {} args;", s.name).unwrap();
    writeln!(out, "    memset(&args, 0, sizeof(args));").unwrap();
    writeln!(out, "    static struct option long_opts[] = {{").unwrap();
    for f in &s.fields {
        writeln!(out, "        {{\"{}\", required_argument, 0, 0}},", f.name).unwrap();
    }
    writeln!(out, "        {{0, 0, 0, 0}}").unwrap();
    writeln!(out, "    }};").unwrap();
    writeln!(out, "    int opt_index = 0;").unwrap();
    writeln!(out, "    int opt_c;").unwrap();
    writeln!(
        out,
        "    while ((opt_c = getopt_long(argc, argv, \"\", long_opts, &opt_index)) != -1) {{"
    )
    .unwrap();
    writeln!(out, "        if (opt_c != 0) continue;").unwrap();
    writeln!(out, "        const char *opt_name = long_opts[opt_index].name;").unwrap();
    for f in &s.fields {
        writeln!(out, "        if (strcmp(opt_name, \"{}\") == 0) {{", f.name).unwrap();
        match &f.ty {
            Type::Str(n) => {
                writeln!(out, "            if (strlen(optarg) > {n}) {{").unwrap();
                writeln!(
                    out,
                    "                fprintf(stderr, \"--{}: value exceeds {n} characters\\n\");",
                    f.name
                )
                .unwrap();
                writeln!(out, "                return 1;").unwrap();
                writeln!(out, "            }}").unwrap();
                writeln!(out, "            strncpy(args.{}, optarg, {n});", f.name).unwrap();
            }
            Type::Bool => {
                writeln!(out, "            args.{} = atoi(optarg) != 0;", f.name).unwrap();
            }
            Type::I8 | Type::I16 | Type::I32 | Type::I64 => {
                writeln!(out, "            args.{} = ({})atol(optarg);", f.name, base_type(&f.ty)).unwrap();
            }
            _ => {
                writeln!(out, "            args.{} = ({})strtoul(optarg, NULL, 10);", f.name, base_type(&f.ty)).unwrap();
            }
        }
        writeln!(out, "            continue;").unwrap();
        writeln!(out, "        }}").unwrap();
    }
    writeln!(out, "    }}").unwrap();
}

fn fd_expr(map_name: &str, decl: &MapIr) -> String {
    if decl.decl.pinned {
        "pinned_globals_map_fd".to_string()
    } else {
        format!("{map_name}_fd")
    }
}

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
            let name = tmp.next("v");
            let fd = fd_expr(map_name, decl);
            let pad = "    ".repeat(indent);
            writeln!(out, "{pad}{val_ty} {name} = 0;").unwrap();
            writeln!(out, "{pad}bpf_map_lookup_elem({fd}, {key_ref}, &{name});").unwrap();
            Some(Expr::Ident(name, pos.clone()))
        }
        _ => None,
    })
}

#[allow(clippy::too_many_arguments)]
fn emit_block(
    block: &Block,
    ir: &UserIr,
    unit: &str,
    maps: &HashMap<&str, &MapIr>,
    configs: &HashMap<&str, &ConfigDecl>,
    strategies: &HashMap<Position, LoopStrategy>,
    ctx: &mut UserCtx,
    indent: usize,
    out: &mut String,
) -> Result<(), CompileError> {
    for stmt in &block.statements {
        emit_stmt(stmt, ir, unit, maps, configs, strategies, ctx, indent, out)?;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn emit_stmt(
    stmt: &Statement,
    ir: &UserIr,
    unit: &str,
    maps: &HashMap<&str, &MapIr>,
    configs: &HashMap<&str, &ConfigDecl>,
    strategies: &HashMap<Position, LoopStrategy>,
    ctx: &mut UserCtx,
    indent: usize,
    out: &mut String,
) -> Result<(), CompileError> {
    let pad = "    ".repeat(indent);
    match stmt {
        Statement::Let { name, ty, value, .. } => {
            if let Some(call_text) = try_emit_builtin_call(value, ir, unit, ctx, &pad, out) {
                let decl_ty = ty.clone().unwrap_or(Type::I64);
                writeln!(out, "{pad}{} = {call_text};", declare(name, &decl_ty)).unwrap();
                return Ok(());
            }
            let rewritten = hoist_reads(value, maps, &mut ctx.tmp, indent, out);
            let decl_ty = ty.clone().unwrap_or(Type::I64);
            writeln!(out, "{pad}{} = {};", declare(name, &decl_ty), emit_expr(&rewritten)).unwrap();
        }
        Statement::Assign { target, value, .. } => {
            if emit_map_update(target, value, maps, &mut ctx.tmp, indent, out) {
                return Ok(());
            }
            if emit_config_write(target, value, configs, &mut ctx.tmp, indent, out) {
                return Ok(());
            }
            if let Some(call_text) = try_emit_builtin_call(value, ir, unit, ctx, &pad, out) {
                let rewritten_target = hoist_reads(target, maps, &mut ctx.tmp, indent, out);
                writeln!(out, "{pad}{} = {call_text};", emit_expr(&rewritten_target)).unwrap();
                return Ok(());
            }
            let rewritten_target = hoist_reads(target, maps, &mut ctx.tmp, indent, out);
            let rewritten_value = hoist_reads(value, maps, &mut ctx.tmp, indent, out);
            writeln!(out, "{pad}{} = {};", emit_expr(&rewritten_target), emit_expr(&rewritten_value)).unwrap();
        }
        Statement::CompoundAssign { target, op, value, .. } => {
            let sym = match op {
                CompoundOp::Add => "+=",
                CompoundOp::Sub => "-=",
                CompoundOp::Mul => "*=",
                CompoundOp::Div => "/=",
            };
            let rewritten_target = hoist_reads(target, maps, &mut ctx.tmp, indent, out);
            let rewritten_value = hoist_reads(value, maps, &mut ctx.tmp, indent, out);
            writeln!(out, "{pad}{} {sym} {};", emit_expr(&rewritten_target), emit_expr(&rewritten_value)).unwrap();
        }
        Statement::MapDelete { map, key, .. } => {
            if let Expr::Ident(map_name, _) = map {
                if let Some(decl) = maps.get(map_name.as_str()) {
                    let hoisted = hoist_reads(key, maps, &mut ctx.tmp, indent, out);
                    let key_ref = addr_of(&hoisted, &decl.decl.key_type, "k", &mut ctx.tmp, indent, out);
                    let fd = fd_expr(map_name, decl);
                    writeln!(out, "{pad}bpf_map_delete_elem({fd}, {key_ref});").unwrap();
                }
            }
        }
        Statement::Expr(e) => {
            if let Some(call_text) = try_emit_builtin_call(e, ir, unit, ctx, &pad, out) {
                writeln!(out, "{pad}{call_text};").unwrap();
                return Ok(());
            }
            let rewritten = hoist_reads(e, maps, &mut ctx.tmp, indent, out);
            writeln!(out, "{pad}{};", emit_expr(&rewritten)).unwrap();
        }
        Statement::Return(Some(e), _) => {
            let rewritten = hoist_reads(e, maps, &mut ctx.tmp, indent, out);
            writeln!(out, "{pad}return {};", emit_expr(&rewritten)).unwrap();
        }
        Statement::Return(None, _) => writeln!(out, "{pad}return 0;").unwrap(),
        Statement::Break(_) => writeln!(out, "{pad}break;").unwrap(),
        Statement::Continue(_) => writeln!(out, "{pad}continue;").unwrap(),
        Statement::If { cond, then_block, else_block, .. } => {
            let rewritten = hoist_reads(cond, maps, &mut ctx.tmp, indent, out);
            writeln!(out, "{pad}if ({}) {{", emit_expr(&rewritten)).unwrap();
            emit_block(then_block, ir, unit, maps, configs, strategies, ctx, indent + 1, out)?;
            if let Some(eb) = else_block {
                writeln!(out, "{pad}}} else {{").unwrap();
                emit_block(eb, ir, unit, maps, configs, strategies, ctx, indent + 1, out)?;
            }
            writeln!(out, "{pad}}}").unwrap();
        }
        Statement::ForRange { var, start, end, body, .. } => {
            let lo = hoist_reads(start, maps, &mut ctx.tmp, indent, out);
            let hi = hoist_reads(end, maps, &mut ctx.tmp, indent, out);
            writeln!(
                out,
                "{pad}for (long {var} = {}; {var} < {}; {var}++) {{",
                emit_expr(&lo),
                emit_expr(&hi)
            )
            .unwrap();
            emit_block(body, ir, unit, maps, configs, strategies, ctx, indent + 1, out)?;
            writeln!(out, "{pad}}}").unwrap();
        }
        Statement::ForIn { var, iter, body, .. } => {
            let rewritten = hoist_reads(iter, maps, &mut ctx.tmp, indent, out);
            writeln!(out, "{pad}for (long {var} = 0; {var} < (long)({}); {var}++) {{", emit_expr(&rewritten)).unwrap();
            emit_block(body, ir, unit, maps, configs, strategies, ctx, indent + 1, out)?;
            writeln!(out, "{pad}}}").unwrap();
        }
        Statement::Block(b) => {
            writeln!(out, "{pad}{{").unwrap();
            emit_block(b, ir, unit, maps, configs, strategies, ctx, indent + 1, out)?;
            writeln!(out, "{pad}}}").unwrap();
        }
    }
    Ok(())
}

/// `m[k] = v` -> `bpf_map_update_elem(<fd>, &k_tmpN, &v_tmpN, 0)`.
fn emit_map_update(
    target: &Expr,
    value: &Expr,
    maps: &HashMap<&str, &MapIr>,
    tmp: &mut TempCounter,
    indent: usize,
    out: &mut String,
) -> bool {
    let Expr::Index { base, index, .. } = target else {
        return false;
    };
    let Expr::Ident(map_name, _) = base.as_ref() else {
        return false;
    };
    let Some(decl) = maps.get(map_name.as_str()) else {
        return false;
    };
    let pad = "    ".repeat(indent);
    let key = hoist_reads(index, maps, tmp, indent, out);
    let val = hoist_reads(value, maps, tmp, indent, out);
    let key_ref = addr_of(&key, &decl.decl.key_type, "k", tmp, indent, out);
    let val_ref = addr_of(&val, &decl.decl.value_type, "v", tmp, indent, out);
    let fd = fd_expr(map_name, decl);
    writeln!(out, "{pad}bpf_map_update_elem({fd}, {key_ref}, {val_ref}, 0);").unwrap();
    true
}

/// `cfg.field = expr` -> a write into `<cfg>_config_map_fd` at the
/// field's slot (its position among the config's declared fields).
fn emit_config_write(
    target: &Expr,
    value: &Expr,
    configs: &HashMap<&str, &ConfigDecl>,
    tmp: &mut TempCounter,
    indent: usize,
    out: &mut String,
) -> bool {
    let Expr::Field { base, field, .. } = target else {
        return false;
    };
    let Expr::Ident(cfg_name, _) = base.as_ref() else {
        return false;
    };
    let Some(cfg) = configs.get(cfg_name.as_str()) else {
        return false;
    };
    let Some(slot) = cfg.fields.iter().position(|f| &f.name == field) else {
        return false;
    };
    let field_ty = &cfg.fields[slot].ty;
    let pad = "    ".repeat(indent);
    let key_name = tmp.next("k");
    let val_name = tmp.next("v");
    writeln!(out, "{pad}__u32 {key_name} = {slot};").unwrap();
    writeln!(out, "{pad}{} = {};", declare(&val_name, field_ty), emit_expr(value)).unwrap();
    writeln!(
        out,
        "{pad}bpf_map_update_elem({cfg_name}_config_map_fd, &{key_name}, &{val_name}, 0);"
    )
    .unwrap();
    true
}

#[allow(clippy::too_many_arguments)]
fn try_emit_builtin_call(expr: &Expr, ir: &UserIr, unit: &str, ctx: &mut UserCtx, pad: &str, out: &mut String) -> Option<String> {
    let Expr::Call { callee, args, .. } = expr else {
        return None;
    };
    match callee.as_str() {
        "load" => {
            writeln!(out, "{pad}struct {unit}_ebpf *skel = {unit}_ebpf__open_and_load();").unwrap();
            writeln!(out, "{pad}if (!skel) {{").unwrap();
            writeln!(out, "{pad}    fprintf(stderr, \"failed to open/load {unit}_ebpf skeleton\\n\");").unwrap();
            writeln!(out, "{pad}    return 1;").unwrap();
            writeln!(out, "{pad}}}").unwrap();
            let mut pinned_done = false;
            for m in &ir.maps_used {
                if m.decl.pinned {
                    if !pinned_done {
                        writeln!(out, "{pad}pinned_globals_map_fd = bpf_obj_get(\"/sys/fs/bpf/{}\");", m.decl.name).unwrap();
                        writeln!(out, "{pad}if (pinned_globals_map_fd < 0) {{").unwrap();
                        writeln!(out, "{pad}    fprintf(stderr, \"failed to open pinned map {}\\n\");", m.decl.name).unwrap();
                        writeln!(out, "{pad}    return 1;").unwrap();
                        writeln!(out, "{pad}}}").unwrap();
                        pinned_done = true;
                    }
                } else {
                    writeln!(out, "{pad}{}_fd = bpf_map__fd(skel->maps.{});", m.decl.name, m.decl.name).unwrap();
                }
            }
            for cfg in &ir.configs {
                writeln!(out, "{pad}{}_config_map_fd = bpf_map__fd(skel->maps.{}_config_map);", cfg.name, cfg.name).unwrap();
            }
            Some("0".to_string())
        }
        "attach" => {
            let prog = args.first().map(emit_expr).unwrap_or_default();
            let link_var = ctx.tmp.next("link");
            writeln!(out, "{pad}struct bpf_link *{link_var} = bpf_program__attach(skel->progs.{prog});").unwrap();
            writeln!(out, "{pad}if (!{link_var}) {{").unwrap();
            writeln!(out, "{pad}    fprintf(stderr, \"failed to attach {prog}\\n\");").unwrap();
            writeln!(out, "{pad}    return 1;").unwrap();
            writeln!(out, "{pad}}}").unwrap();
            ctx.links.insert(prog, link_var);
            Some("0".to_string())
        }
        "detach" => {
            let prog = args.first().map(emit_expr).unwrap_or_default();
            if let Some(link_var) = ctx.links.get(&prog) {
                writeln!(out, "{pad}bpf_link__destroy({link_var});").unwrap();
            }
            Some("0".to_string())
        }
        "print" => {
            let joined: Vec<String> = args.iter().map(emit_expr).collect();
            Some(format!("printf({})", joined.join(", ")))
        }
        _ => None,
    }
}

fn calls_attach_or_detach(block: &Block) -> bool {
    block.statements.iter().any(stmt_calls_attach_or_detach)
}

fn stmt_calls_attach_or_detach(stmt: &Statement) -> bool {
    match stmt {
        Statement::Let { value, .. } => expr_calls_attach_or_detach(value),
        Statement::Assign { target, value, .. } | Statement::CompoundAssign { target, value, .. } => {
            expr_calls_attach_or_detach(target) || expr_calls_attach_or_detach(value)
        }
        Statement::Expr(e) => expr_calls_attach_or_detach(e),
        Statement::Return(Some(e), _) => expr_calls_attach_or_detach(e),
        Statement::If { cond, then_block, else_block, .. } => {
            expr_calls_attach_or_detach(cond)
                || calls_attach_or_detach(then_block)
                || else_block.as_ref().is_some_and(calls_attach_or_detach)
        }
        Statement::ForRange { body, .. } | Statement::ForIn { body, .. } => calls_attach_or_detach(body),
        Statement::Block(b) => calls_attach_or_detach(b),
        _ => false,
    }
}

fn expr_calls_attach_or_detach(expr: &Expr) -> bool {
    match expr {
        Expr::Call { callee, args, .. } => {
            matches!(callee.as_str(), "attach" | "detach") || args.iter().any(expr_calls_attach_or_detach)
        }
        Expr::Field { base, .. } | Expr::Arrow { base, .. } => expr_calls_attach_or_detach(base),
        Expr::Index { base, index, .. } => expr_calls_attach_or_detach(base) || expr_calls_attach_or_detach(index),
        Expr::Unary { operand, .. } => expr_calls_attach_or_detach(operand),
        Expr::Binary { lhs, rhs, .. } => expr_calls_attach_or_detach(lhs) || expr_calls_attach_or_detach(rhs),
        _ => false,
    }
}

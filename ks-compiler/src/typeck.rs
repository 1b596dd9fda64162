//! Type checking: main/attribute validation, call-graph visibility,
//! map access rules, and the constant folding that feeds loop
//! analysis. Produces a [`TypedProgram`] — not a parallel expression
//! tree, since every `Expr`/`Type` pairing needed downstream is cheap
//! to recompute from the (already-resolved) declarations rather than
//! worth cloning into a second tree.

use crate::const_env::ConstEnv;
use crate::loop_analysis::{self, LoopStrategy};
use crate::symtab::{Entry, SymbolTable};
use ks_ast::*;
use ks_diagnostics::CompileError;
use std::collections::HashMap;

pub struct TypedProgram {
    pub structs: Vec<StructDecl>,
    pub enums: Vec<EnumDecl>,
    pub aliases: Vec<TypeAliasDecl>,
    pub configs: Vec<ConfigDecl>,
    pub maps: Vec<MapDecl>,
    pub globals: Vec<GlobalVarDecl>,
    pub functions: Vec<FunctionDecl>,
    pub attributed: Vec<AttributedFunctionDecl>,
    pub main: FunctionDecl,
    /// `Some(struct name)` when `main` takes a single struct-typed
    /// `args` parameter, `None` for the argless form.
    pub main_args: Option<String>,
    pub loop_strategies: HashMap<Position, LoopStrategy>,
}

struct FnCtx<'a> {
    name: &'a str,
    attribute: Option<&'a Attribute>,
}

impl<'a> FnCtx<'a> {
    fn is_kernel_entry(&self) -> bool {
        self.attribute.is_some_and(Attribute::is_kernel_entry)
    }

    fn is_user_space(&self) -> bool {
        self.attribute.is_none()
    }
}

pub fn check_program(program: &Program) -> Result<(TypedProgram, SymbolTable), Vec<CompileError>> {
    let mut errors = Vec::new();
    let mut symtab = SymbolTable::new();
    crate::builtins::inject(&mut symtab);
    let root = symtab.root();

    let mut structs = Vec::new();
    let mut enums = Vec::new();
    let mut aliases = Vec::new();
    let mut configs = Vec::new();
    let mut maps = Vec::new();
    let mut globals = Vec::new();
    let mut functions = Vec::new();
    let mut attributed = Vec::new();
    let mut main: Option<FunctionDecl> = None;

    for decl in &program.decls {
        match decl {
            Decl::Struct(s) => {
                structs.push(s.clone());
                declare_or_report(&mut symtab, &mut errors, root, Entry::Struct(s.clone()));
            }
            Decl::TypeAlias(t) => {
                aliases.push(t.clone());
                declare_or_report(&mut symtab, &mut errors, root, Entry::TypeAlias(t.clone()));
            }
            Decl::Enum(e) => {
                enums.push(e.clone());
                declare_or_report(&mut symtab, &mut errors, root, Entry::Enum(e.clone()));
                crate::builtins::declare_variants(&mut symtab, root, e);
            }
            Decl::Config(c) => {
                configs.push(c.clone());
                declare_or_report(&mut symtab, &mut errors, root, Entry::Config(c.clone()));
            }
            Decl::Map(m) => {
                maps.push(m.clone());
                declare_or_report(&mut symtab, &mut errors, root, Entry::Map(m.clone()));
            }
            Decl::GlobalVar(g) => {
                if let Some(Type::Map {
                    key,
                    value,
                    kind,
                    config,
                }) = &g.ty
                {
                    let promoted = MapDecl {
                        name: g.name.clone(),
                        key_type: (**key).clone(),
                        value_type: (**value).clone(),
                        map_kind: *kind,
                        config: *config,
                        pinned: g.pinned,
                        pos: g.pos.clone(),
                    };
                    maps.push(promoted.clone());
                    declare_or_report(&mut symtab, &mut errors, root, Entry::Map(promoted));
                } else {
                    globals.push(g.clone());
                    declare_or_report(&mut symtab, &mut errors, root, Entry::GlobalVar(g.clone()));
                }
            }
            Decl::Function(f) => {
                if f.name == "main" {
                    if main.is_some() {
                        errors.push(CompileError::MultipleMain {
                            pos: f.pos.clone().into(),
                        });
                    } else {
                        main = Some(f.clone());
                        declare_or_report(
                            &mut symtab,
                            &mut errors,
                            root,
                            Entry::Function {
                                decl: f.clone(),
                                attribute: None,
                            },
                        );
                    }
                } else {
                    functions.push(f.clone());
                    declare_or_report(
                        &mut symtab,
                        &mut errors,
                        root,
                        Entry::Function {
                            decl: f.clone(),
                            attribute: None,
                        },
                    );
                }
            }
            Decl::AttributedFunction(af) => {
                attributed.push(af.clone());
                declare_or_report(
                    &mut symtab,
                    &mut errors,
                    root,
                    Entry::Function {
                        decl: af.function.clone(),
                        attribute: Some(af.attribute.clone()),
                    },
                );
            }
        }
    }

    let Some(main) = main else {
        errors.push(CompileError::MissingMain);
        return Err(errors);
    };

    let main_args = match validate_main(&main, &structs) {
        Ok(args) => args,
        Err(e) => {
            errors.push(e);
            None
        }
    };

    for af in &attributed {
        if let Err(e) = validate_attribute(af) {
            errors.push(e);
        }
    }

    let mut loop_strategies = HashMap::new();

    check_function(
        &mut symtab,
        &mut errors,
        &mut loop_strategies,
        &main,
        &FnCtx {
            name: "main",
            attribute: None,
        },
    );
    for f in &functions {
        check_function(
            &mut symtab,
            &mut errors,
            &mut loop_strategies,
            f,
            &FnCtx {
                name: &f.name,
                attribute: None,
            },
        );
    }
    for af in &attributed {
        check_function(
            &mut symtab,
            &mut errors,
            &mut loop_strategies,
            &af.function,
            &FnCtx {
                name: &af.function.name,
                attribute: Some(&af.attribute),
            },
        );
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok((
        TypedProgram {
            structs,
            enums,
            aliases,
            configs,
            maps,
            globals,
            functions,
            attributed,
            main,
            main_args,
            loop_strategies,
        },
        symtab,
    ))
}

fn declare_or_report(
    symtab: &mut SymbolTable,
    errors: &mut Vec<CompileError>,
    scope: usize,
    entry: Entry,
) {
    if let Err(e) = symtab.declare(scope, entry) {
        errors.push(e);
    }
}

fn validate_main(main: &FunctionDecl, structs: &[StructDecl]) -> Result<Option<String>, CompileError> {
    let pos = main.pos.clone().into();
    if main.return_type != Some(Type::I32) {
        return Err(CompileError::InvalidMainSignature {
            pos,
            reason: "return type must be i32".to_string(),
        });
    }
    match main.params.as_slice() {
        [] => Ok(None),
        [param] => match &param.ty {
            Type::Named(name) if structs.iter().any(|s| &s.name == name) => Ok(Some(name.clone())),
            other => Err(CompileError::InvalidMainSignature {
                pos,
                reason: format!("parameter type `{other}` is not a declared struct"),
            }),
        },
        _ => Err(CompileError::InvalidMainSignature {
            pos,
            reason: "must take zero parameters or a single struct-typed `args` parameter"
                .to_string(),
        }),
    }
}

fn validate_attribute(af: &AttributedFunctionDecl) -> Result<(), CompileError> {
    let pos: ks_diagnostics::PosInfo = af.function.pos.clone().into();
    let name = af.function.name.clone();
    match &af.attribute {
        Attribute::Xdp => {
            let ok_params = matches!(
                af.function.params.as_slice(),
                [Param { ty: Type::Pointer(inner), .. }] if matches!(&**inner, Type::Named(n) if n == "xdp_md")
            );
            let ok_return =
                matches!(&af.function.return_type, Some(Type::Named(n)) if n == "xdp_action");
            if !ok_params || !ok_return {
                return Err(CompileError::AttributeMisuse {
                    pos,
                    name,
                    reason: "@xdp requires `(ctx: *xdp_md) -> xdp_action`".to_string(),
                });
            }
            Ok(())
        }
        Attribute::Tc(direction) => {
            if direction != "ingress" && direction != "egress" {
                return Err(CompileError::AttributeMisuse {
                    pos,
                    name,
                    reason: format!("@tc direction must be \"ingress\" or \"egress\", found \"{direction}\""),
                });
            }
            let ok_params = matches!(
                af.function.params.as_slice(),
                [Param { ty: Type::Pointer(inner), .. }] if matches!(&**inner, Type::Named(n) if n == "__sk_buff")
            );
            let ok_return = af.function.return_type == Some(Type::I32);
            if !ok_params || !ok_return {
                return Err(CompileError::AttributeMisuse {
                    pos,
                    name,
                    reason: "@tc requires `(ctx: *__sk_buff) -> i32`".to_string(),
                });
            }
            Ok(())
        }
        Attribute::Kprobe(_) | Attribute::Kfunc | Attribute::Helper | Attribute::Private => Ok(()),
        Attribute::Unknown(raw) => Err(CompileError::UnknownAttribute {
            pos,
            name: raw.clone(),
        }),
    }
}

fn check_function(
    symtab: &mut SymbolTable,
    errors: &mut Vec<CompileError>,
    loop_strategies: &mut HashMap<Position, LoopStrategy>,
    func: &FunctionDecl,
    ctx: &FnCtx,
) {
    let prior = symtab.push_scope();
    let scope = symtab.current_scope();
    for param in &func.params {
        let _ = symtab.declare(
            scope,
            Entry::Local {
                name: param.name.clone(),
                ty: param.ty.clone(),
            },
        );
    }
    check_block(symtab, errors, loop_strategies, &func.body, ConstEnv::new(), ctx);
    symtab.pop_to(prior);
}

fn check_block(
    symtab: &mut SymbolTable,
    errors: &mut Vec<CompileError>,
    loop_strategies: &mut HashMap<Position, LoopStrategy>,
    block: &Block,
    mut env: ConstEnv,
    ctx: &FnCtx,
) {
    let prior = symtab.push_scope();
    for stmt in &block.statements {
        env = check_statement(symtab, errors, loop_strategies, stmt, env, ctx);
    }
    symtab.pop_to(prior);
}

fn check_statement(
    symtab: &mut SymbolTable,
    errors: &mut Vec<CompileError>,
    loop_strategies: &mut HashMap<Position, LoopStrategy>,
    stmt: &Statement,
    env: ConstEnv,
    ctx: &FnCtx,
) -> ConstEnv {
    let scope = symtab_current_scope(symtab);
    match stmt {
        Statement::Let { name, ty, value, .. } => {
            check_expr(symtab, errors, scope, value, ctx);
            let declared_ty = ty.clone().or_else(|| infer_expr(symtab, scope, value));
            if let Some(declared_ty) = declared_ty {
                let _ = symtab.declare(
                    scope,
                    Entry::Local {
                        name: name.clone(),
                        ty: declared_ty,
                    },
                );
            }
            match env.fold(value) {
                Some(v) => env.bind(name, v),
                None => env.invalidate(name),
            }
        }
        Statement::Assign { target, value, .. } => {
            check_expr(symtab, errors, scope, target, ctx);
            check_expr(symtab, errors, scope, value, ctx);
            if let Expr::Ident(name, _) = target {
                env.invalidate(name)
            } else {
                env
            }
        }
        Statement::CompoundAssign { target, value, .. } => {
            check_expr(symtab, errors, scope, target, ctx);
            check_expr(symtab, errors, scope, value, ctx);
            if let Expr::Ident(name, _) = target {
                env.invalidate(name)
            } else {
                env
            }
        }
        Statement::MapDelete { map, key, pos } => {
            check_map_op(symtab, errors, scope, map, key, pos, ctx);
            env
        }
        Statement::Expr(e) => {
            check_expr(symtab, errors, scope, e, ctx);
            env
        }
        Statement::Return(value, _) => {
            if let Some(v) = value {
                check_expr(symtab, errors, scope, v, ctx);
            }
            env
        }
        Statement::Break(_) | Statement::Continue(_) => env,
        Statement::If {
            cond,
            then_block,
            else_block,
            ..
        } => {
            check_expr(symtab, errors, scope, cond, ctx);
            check_block(symtab, errors, loop_strategies, then_block, env.clone(), ctx);
            if let Some(else_block) = else_block {
                check_block(symtab, errors, loop_strategies, else_block, env.clone(), ctx);
            }
            env
        }
        Statement::ForRange {
            var,
            start,
            end,
            body,
            pos,
        } => {
            check_expr(symtab, errors, scope, start, ctx);
            check_expr(symtab, errors, scope, end, ctx);
            let analysis = loop_analysis::classify_range(&env, start, end);
            loop_strategies.insert(pos.clone(), loop_analysis::select_strategy(&analysis));
            let prior = symtab.push_scope();
            let _ = symtab.declare(
                symtab.current_scope(),
                Entry::Local {
                    name: var.clone(),
                    ty: Type::I64,
                },
            );
            check_block(symtab, errors, loop_strategies, body, env.clone(), ctx);
            symtab.pop_to(prior);
            env
        }
        Statement::ForIn { var, iter, body, pos } => {
            check_expr(symtab, errors, scope, iter, ctx);
            let analysis = loop_analysis::classify_iter();
            loop_strategies.insert(pos.clone(), loop_analysis::select_strategy(&analysis));
            let prior = symtab.push_scope();
            let _ = symtab.declare(
                symtab.current_scope(),
                Entry::Local {
                    name: var.clone(),
                    ty: Type::I64,
                },
            );
            check_block(symtab, errors, loop_strategies, body, env.clone(), ctx);
            symtab.pop_to(prior);
            env
        }
        Statement::Block(b) => {
            check_block(symtab, errors, loop_strategies, b, env.clone(), ctx);
            env
        }
    }
}

/// The current scope is always whatever `push_scope`/`pop_to` left
/// `current` pointing at; `SymbolTable` doesn't expose that field
/// directly so callers thread it explicitly instead.
fn symtab_current_scope(symtab: &SymbolTable) -> usize {
    symtab.current_scope()
}

fn check_expr(
    symtab: &mut SymbolTable,
    errors: &mut Vec<CompileError>,
    scope: usize,
    expr: &Expr,
    ctx: &FnCtx,
) -> Option<Type> {
    match expr {
        Expr::Int(lit, _) => Some(int_type(lit)),
        Expr::Bool(_, _) => Some(Type::Bool),
        Expr::Str(s, _) => Some(Type::Str(s.len() as u64)),
        Expr::None(_) => None,
        Expr::Ident(name, pos) => match symtab.resolve(scope, name) {
            Some(id) => match symtab.get(id) {
                Entry::Local { ty, .. } => Some(ty),
                Entry::GlobalVar(g) => g.ty,
                Entry::Builtin { ty, .. } => ty,
                _ => None,
            },
            None => {
                report_unresolved(symtab, errors, scope, name, pos);
                None
            }
        },
        Expr::Field { base, field, pos } => {
            let base_ty = check_expr(symtab, errors, scope, base, ctx);
            resolve_field(symtab, base_ty, field, pos)
        }
        Expr::Arrow { base, field, pos } => {
            let base_ty = check_expr(symtab, errors, scope, base, ctx);
            let unwrapped = match base_ty {
                Some(Type::Pointer(inner)) => Some(*inner),
                other => other,
            };
            resolve_field(symtab, unwrapped, field, pos)
        }
        Expr::Index { base, index, pos } => check_map_op(symtab, errors, scope, base, index, pos, ctx),
        Expr::Call { callee, args, pos } => check_call(symtab, errors, scope, callee, args, pos, ctx),
        Expr::Unary { operand, .. } => check_expr(symtab, errors, scope, operand, ctx),
        Expr::Binary { op, lhs, rhs, pos } => {
            let lhs_ty = check_expr(symtab, errors, scope, lhs, ctx);
            let rhs_ty = check_expr(symtab, errors, scope, rhs, ctx);
            if let (Some(l), Some(r)) = (&lhs_ty, &rhs_ty) {
                if !types_compatible(l, r) {
                    errors.push(CompileError::TypeMismatch {
                        pos: pos.clone().into(),
                        expected: l.to_string(),
                        got: r.to_string(),
                    });
                }
            }
            match op {
                BinOp::Eq
                | BinOp::Ne
                | BinOp::Lt
                | BinOp::Le
                | BinOp::Gt
                | BinOp::Ge
                | BinOp::And
                | BinOp::Or => Some(Type::Bool),
                _ => lhs_ty,
            }
        }
    }
}

fn resolve_field(
    symtab: &SymbolTable,
    base_ty: Option<Type>,
    field: &str,
    pos: &Position,
) -> Option<Type> {
    let Some(Type::Named(struct_name)) = base_ty else {
        return None;
    };
    let id = symtab.resolve(symtab.root(), &struct_name)?;
    if let Entry::Struct(s) = symtab.get(id) {
        if let Some(f) = s.fields.iter().find(|f| f.name == field) {
            return Some(f.ty.clone());
        }
    }
    let _ = pos;
    None
}

fn check_map_op(
    symtab: &mut SymbolTable,
    errors: &mut Vec<CompileError>,
    scope: usize,
    base: &Expr,
    key: &Expr,
    pos: &Position,
    ctx: &FnCtx,
) -> Option<Type> {
    let key_ty = check_expr(symtab, errors, scope, key, ctx);
    let Expr::Ident(map_name, base_pos) = base else {
        check_expr(symtab, errors, scope, base, ctx);
        return None;
    };
    let Some(id) = symtab.resolve(scope, map_name) else {
        report_unresolved(symtab, errors, scope, map_name, base_pos);
        return None;
    };
    let Entry::Map(map) = symtab.get(id) else {
        errors.push(CompileError::MapMisuse {
            pos: pos.clone().into(),
            name: map_name.clone(),
            reason: "indexed value is not a map".to_string(),
        });
        return None;
    };
    if matches!(map.map_kind, MapKind::RingBuf | MapKind::PerfEventArray) {
        errors.push(CompileError::MapMisuse {
            pos: pos.clone().into(),
            name: map.name.clone(),
            reason: "ringbuf/perf_event_array maps are not indexable key/value stores".to_string(),
        });
    }
    if map.config.max_entries == 0 {
        errors.push(CompileError::MapMisuse {
            pos: pos.clone().into(),
            name: map.name.clone(),
            reason: "max_entries must be greater than zero".to_string(),
        });
    }
    if let Some(key_ty) = &key_ty {
        if !types_compatible(key_ty, &map.key_type) {
            errors.push(CompileError::TypeMismatch {
                pos: pos.clone().into(),
                expected: map.key_type.to_string(),
                got: key_ty.to_string(),
            });
        }
    }
    Some(map.value_type.clone())
}

fn check_call(
    symtab: &mut SymbolTable,
    errors: &mut Vec<CompileError>,
    scope: usize,
    callee: &str,
    args: &[Expr],
    pos: &Position,
    ctx: &FnCtx,
) -> Option<Type> {
    if matches!(callee, "load" | "attach" | "detach" | "print") {
        for arg in args {
            check_expr(symtab, errors, scope, arg, ctx);
        }
        return if callee == "print" { None } else { Some(Type::I32) };
    }

    let Some(id) = symtab.resolve(scope, callee) else {
        report_unresolved(symtab, errors, scope, callee, pos);
        for arg in args {
            check_expr(symtab, errors, scope, arg, ctx);
        }
        return None;
    };

    let Entry::Function { decl, attribute } = symtab.get(id) else {
        errors.push(CompileError::NotCallable {
            pos: pos.clone().into(),
            name: callee.to_string(),
        });
        return None;
    };

    if decl.params.len() != args.len() {
        errors.push(CompileError::ArityMismatch {
            pos: pos.clone().into(),
            name: callee.to_string(),
            expected: decl.params.len(),
            found: args.len(),
        });
    }
    for arg in args {
        check_expr(symtab, errors, scope, arg, ctx);
    }

    match &attribute {
        Some(Attribute::Private) if ctx.is_kernel_entry() => {
            errors.push(CompileError::PrivateNotExposed {
                pos: pos.clone().into(),
                name: callee.to_string(),
                caller: ctx.name.to_string(),
            });
        }
        Some(a) if a.is_kernel_entry() => {
            errors.push(CompileError::NotCallable {
                pos: pos.clone().into(),
                name: callee.to_string(),
            });
        }
        Some(Attribute::Helper) if ctx.is_user_space() => {
            errors.push(CompileError::NotCallable {
                pos: pos.clone().into(),
                name: callee.to_string(),
            });
        }
        _ => {}
    }

    decl.return_type
}

fn report_unresolved(
    symtab: &SymbolTable,
    errors: &mut Vec<CompileError>,
    scope: usize,
    name: &str,
    pos: &Position,
) {
    let candidates = symtab.names_visible_from(scope);
    let suggestions = ks_diagnostics::fuzzy::find_similar_names(name, &candidates, 0.7, 3);
    errors.push(CompileError::UnresolvedSymbol {
        pos: pos.clone().into(),
        name: name.to_string(),
        suggestions,
    });
}

fn int_type(lit: &IntLit) -> Type {
    match (lit.width, lit.signed) {
        (IntWidth::W8, true) => Type::I8,
        (IntWidth::W8, false) => Type::U8,
        (IntWidth::W16, true) => Type::I16,
        (IntWidth::W16, false) => Type::U16,
        (IntWidth::W32, true) => Type::I32,
        (IntWidth::W32, false) => Type::U32,
        (IntWidth::W64, true) => Type::I64,
        (IntWidth::W64, false) => Type::U64,
    }
}

fn is_integer_type(t: &Type) -> bool {
    matches!(
        t,
        Type::U8 | Type::U16 | Type::U32 | Type::U64 | Type::I8 | Type::I16 | Type::I32 | Type::I64
    )
}

fn types_compatible(a: &Type, b: &Type) -> bool {
    a == b || (is_integer_type(a) && is_integer_type(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ks_parser::Parser;

    fn check(src: &str) -> Result<TypedProgram, Vec<CompileError>> {
        let mut parser = Parser::new(src, "t.ks").unwrap();
        let program = parser.parse_file().unwrap();
        check_program(&program).map(|(p, _)| p)
    }

    #[test]
    fn missing_main_is_rejected() {
        let src = "@xdp fn t(ctx: *xdp_md) -> xdp_action { return XDP_PASS; }";
        let err = check(src).unwrap_err();
        assert!(matches!(err[0], CompileError::MissingMain));
    }

    #[test]
    fn wrong_main_return_type_is_rejected() {
        let src = "fn main() -> u32 { return 0; }";
        let err = check(src).unwrap_err();
        assert!(matches!(err[0], CompileError::InvalidMainSignature { .. }));
    }

    #[test]
    fn private_call_from_xdp_is_rejected() {
        let src = r#"
            @private fn p() -> bool { return true; }
            @xdp fn x(ctx: *xdp_md) -> xdp_action {
                p();
                return XDP_PASS;
            }
            fn main() -> i32 { return 0; }
        "#;
        let err = check(src).unwrap_err();
        assert!(err
            .iter()
            .any(|e| matches!(e, CompileError::PrivateNotExposed { .. })));
    }

    #[test]
    fn well_formed_program_type_checks() {
        let src = r#"
            var counters : hash<u32,u64>(1024);
            @xdp fn count(ctx: *xdp_md) -> xdp_action {
                var k = 0u32;
                var v = counters[k];
                return XDP_PASS;
            }
            fn main() -> i32 {
                return 0;
            }
        "#;
        check(src).unwrap();
    }
}

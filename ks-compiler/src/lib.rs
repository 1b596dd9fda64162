//! Ties the pipeline stages together: parse (via `ks-parser`) -> type
//! check (`typeck`) -> lower to the two-sided IR (`ir`) -> emit the
//! kernel and user-space C translation units (`codegen`).
//!
//! Each stage's module stays independently testable; this crate root
//! only wires them in sequence and stops at the first stage that
//! reports errors.

pub mod builtins;
pub mod codegen;
pub mod const_env;
pub mod ir;
pub mod loop_analysis;
pub mod symtab;
pub mod typeck;

use ks_diagnostics::CompileError;

/// The two generated C translation units for a single compiled
/// `.ks` unit: the eBPF program and its user-space loader.
pub struct CompiledUnit {
    pub kernel_c: String,
    pub user_c: String,
}

/// Runs the full pipeline over an already-parsed program. `unit` names
/// the compiled unit (conventionally the source file's stem) and
/// becomes the skeleton/section prefix both outputs share.
pub fn compile(program: &ks_ast::Program, unit: &str) -> Result<CompiledUnit, Vec<CompileError>> {
    let (typed, _symtab) = typeck::check_program(program)?;
    let program_ir = ir::lower(&typed);
    let kernel_c = codegen::kernel::emit(&program_ir.kernel, unit).map_err(|e| vec![e])?;
    let user_c = codegen::user::emit(&program_ir.user, unit).map_err(|e| vec![e])?;
    Ok(CompiledUnit { kernel_c, user_c })
}

/// Parses and compiles `source` in one call, tagging parse failures as
/// [`CompileError::ParseError`] so callers see one error type for the
/// whole pipeline.
pub fn compile_source(source: &str, file: &str, unit: &str) -> Result<CompiledUnit, Vec<CompileError>> {
    let mut parser = ks_parser::Parser::new(source, file).map_err(|e| vec![parse_error(e)])?;
    let program = parser.parse_file().map_err(|e| vec![parse_error(e)])?;
    compile(&program, unit)
}

fn parse_error(e: ks_parser::ParseError) -> CompileError {
    CompileError::ParseError {
        pos: e.pos().into(),
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_main() {
        let src = "@xdp fn t(ctx: *xdp_md) -> xdp_action { return XDP_PASS; }";
        let err = compile_source(src, "t.ks", "t").unwrap_err();
        assert!(err.iter().any(|e| matches!(e, CompileError::MissingMain)));
    }

    #[test]
    fn compiles_minimal_program() {
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
        let unit = compile_source(src, "t.ks", "t").unwrap();
        assert!(unit.kernel_c.contains("SEC(\"xdp\")"));
        assert!(unit.kernel_c.contains("bpf_map_lookup_elem(&counters"));
    }

    /// Reconstructs the rate-limiter program (a packet-count hash map,
    /// a str(20)+u32 args struct, load/attach through
    /// `main(argc, argv)`) since this workspace never received a copy
    /// of the `rate_limiter.ks` file itself.
    #[test]
    fn rate_limiter_scenario_matches_s1() {
        let src = r#"
            var packet_counts : hash<u32,u32>(1024);
            struct RateLimiterArgs { interface: str(20), limit: u32 }
            @xdp fn count(ctx: *xdp_md) -> xdp_action {
                var k = 0u32;
                var v = packet_counts[k];
                return XDP_PASS;
            }
            fn main(args: RateLimiterArgs) -> i32 {
                load(count);
                attach(count);
                packet_counts[0u32] = 1u32;
                detach(count);
                return 0;
            }
        "#;
        let unit = compile_source(src, "rate_limiter.ks", "rate_limiter").unwrap();

        assert!(unit.user_c.contains("int packet_counts_fd = -1;"));
        assert!(unit.user_c.contains("int main(int argc, char **argv)"));
        assert!(unit.user_c.contains("rate_limiter_ebpf__open_and_load"));
        assert!(unit.user_c.contains("packet_counts_fd = bpf_map__fd(skel->maps.packet_counts);"));
        assert!(unit.user_c.contains("\"interface\""));
        assert!(unit.user_c.contains("\"limit\""));
        assert!(unit.user_c.contains("strlen(optarg) > 20"));

        // bpf_map_update_elem(packet_counts_fd, &k_tmpN, &v_tmpN, 0)
        let update_re = unit
            .user_c
            .lines()
            .find(|l| l.trim_start().starts_with("bpf_map_update_elem(packet_counts_fd"))
            .expect("expected a packet_counts_fd update statement");
        assert!(update_re.contains("&k_tmp"));
        assert!(update_re.contains("&v_tmp"));
        assert!(update_re.trim_end().ends_with(", 0);"));
    }

    /// S5 -- a bounded loop with three iterations unrolls into three
    /// inlined copies of its body rather than a C `for` loop or a
    /// `bpf_loop()` helper call.
    #[test]
    fn small_bounded_loop_unrolls_scenario_matches_s5() {
        let src = r#"
            var counters : hash<u32,u32>(1024);
            @xdp fn count(ctx: *xdp_md) -> xdp_action {
                for i in 0..3 {
                    var k = i;
                    var v = counters[k];
                    counters[k] = v;
                }
                return XDP_PASS;
            }
            fn main() -> i32 {
                return 0;
            }
        "#;
        let unit = compile_source(src, "t.ks", "t").unwrap();
        assert!(!unit.kernel_c.contains("bpf_loop("));
        assert!(!unit.kernel_c.contains("for ("));
        let lookups = unit.kernel_c.matches("bpf_map_lookup_elem(&counters").count();
        assert_eq!(lookups, 3, "each unrolled iteration should hoist its own map read");
    }

    /// S6 -- a pinned global used from both kernel and user space shares
    /// one pin name and one user-space FD variable.
    #[test]
    fn pinned_global_scenario_matches_s6() {
        let src = r#"
            pin var g : hash<u32,u32>(1024);
            @xdp fn touch(ctx: *xdp_md) -> xdp_action {
                var k = 0u32;
                var v = g[k];
                return XDP_PASS;
            }
            fn main() -> i32 {
                load(touch);
                var k = 0u32;
                g[k] = 1u32;
                return 0;
            }
        "#;
        let unit = compile_source(src, "t.ks", "t").unwrap();
        assert!(unit.kernel_c.contains("LIBBPF_PIN_BY_NAME"));
        assert!(unit.kernel_c.contains("} g SEC(\".maps\");"));
        assert!(unit.user_c.contains("static int pinned_globals_map_fd = -1;"));
        assert!(unit.user_c.contains("pinned_globals_map_fd = bpf_obj_get(\"/sys/fs/bpf/g\");"));
        assert!(!unit.user_c.contains("int g_fd"));
        assert!(unit.user_c.contains("bpf_map_update_elem(pinned_globals_map_fd"));
    }
}

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "kernelscript")]
#[command(version = "0.1.0")]
#[command(about = "KernelScript compiler -- eBPF + user-space loader from one source file", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a .ks file to its kernel and user-space C translation units
    Build {
        /// Input .ks file
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Directory to write the generated .c files into (defaults to the input's directory)
        #[arg(short, long, value_name = "DIR")]
        out_dir: Option<PathBuf>,
    },

    /// Parse and type-check without emitting C
    Check {
        /// Input .ks file
        #[arg(value_name = "INPUT")]
        input: PathBuf,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Build { input, out_dir } => build(&input, out_dir.as_deref()),
        Commands::Check { input } => check(&input),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:?}");
            ExitCode::from(2)
        }
    }
}

fn unit_name(input: &Path) -> Result<String> {
    input
        .file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .context("input path has no file stem")
}

fn build(input: &Path, out_dir: Option<&Path>) -> Result<ExitCode> {
    let unit = unit_name(input)?;
    let source = std::fs::read_to_string(input)
        .with_context(|| format!("reading {}", input.display()))?;

    log::info!("compiling {} as unit `{unit}`", input.display());

    let compiled = match ks_compiler::compile_source(&source, &input.to_string_lossy(), &unit) {
        Ok(c) => c,
        Err(errors) => return Ok(report(&errors)),
    };

    let out_dir = out_dir.unwrap_or_else(|| input.parent().unwrap_or_else(|| Path::new(".")));
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("creating output directory {}", out_dir.display()))?;

    let user_path = out_dir.join(format!("{unit}.c"));
    let kernel_path = out_dir.join(format!("{unit}.ebpf.c"));
    std::fs::write(&user_path, &compiled.user_c)
        .with_context(|| format!("writing {}", user_path.display()))?;
    std::fs::write(&kernel_path, &compiled.kernel_c)
        .with_context(|| format!("writing {}", kernel_path.display()))?;

    log::info!("wrote {} and {}", user_path.display(), kernel_path.display());
    println!("{}", user_path.display());
    println!("{}", kernel_path.display());
    Ok(ExitCode::SUCCESS)
}

fn check(input: &Path) -> Result<ExitCode> {
    let source = std::fs::read_to_string(input)
        .with_context(|| format!("reading {}", input.display()))?;
    let mut parser = ks_parser::Parser::new(&source, input.to_string_lossy().as_ref())
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    let program = match parser.parse_file() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{}", e);
            return Ok(ExitCode::from(1));
        }
    };
    match ks_compiler::typeck::check_program(&program) {
        Ok(_) => {
            println!("ok");
            Ok(ExitCode::SUCCESS)
        }
        Err(errors) => Ok(report(&errors)),
    }
}

fn report(errors: &[ks_diagnostics::CompileError]) -> ExitCode {
    for e in errors {
        eprintln!("{}", e.format_line());
    }
    eprintln!(
        "\nerror: {} error{} emitted",
        errors.len(),
        if errors.len() == 1 { "" } else { "s" }
    );
    ExitCode::from(1)
}

use anyhow::Context;
use anyhow::Result;
use clap::ArgMatches;
use clap::Args;
use clap::Command;
use clap::FromArgMatches;
use oklc::Backend;
use oklc::BarrierPolicy;
use oklc::CompiledUnit;
use oklc::Compiler;
use oklc::CompilerConfig;
use oklc::Dialect;
use oklc::Passes;
use std::io::Read;
use std::path::Path;
use std::path::PathBuf;
use tracing::Level;

/// Compile OKL kernels into source for a parallel backend.
#[derive(Args, Debug)]
#[command(version, about)]
struct OklcArgs {
    /// The input file (- is interpreted as stdin)
    #[arg(default_value = "-")]
    input: String,
    /// Backend to compile for (serial, openmp, pthreads, cuda or opencl)
    #[arg(long, default_value = "serial")]
    backend: String,
    /// Read the input as Fortran (default for .f, .f90 and .ofl files)
    #[arg(long)]
    fortran: bool,
    /// Define a macro, as NAME or NAME=VALUE
    #[arg(short = 'D', long = "define", value_name = "NAME[=VALUE]")]
    defines: Vec<String>,
    /// Add a directory to the include search path
    #[arg(short = 'I', long = "include", value_name = "DIR")]
    include_dirs: Vec<PathBuf>,
    /// Barrier under a thread-dependent condition: error or warn
    #[arg(long, default_value = "error")]
    barrier_policy: String,
    /// Warn for every barrier that had to be inserted
    #[arg(long)]
    warn_missing_barriers: bool,
    /// Native compiler to pass along with the source
    #[arg(long)]
    compiler: Option<String>,
    /// Flags for the native compiler
    #[arg(long)]
    compiler_flags: Option<String>,
    /// Print the launch dimensions of every kernel
    #[arg(long)]
    kernel_info: bool,
    /// Print debug information and enable OCCA_DEBUG_ENABLED
    #[arg(long)]
    debug: bool,
}

fn cli() -> Command {
    let cli = Command::new("oklc").args(oklc::default_arguments());
    let cli = OklcArgs::augment_args(cli);
    cli
}

/// Split `NAME=VALUE`; a bare `NAME` is defined as `1`.
fn parse_define(define: &str) -> (&str, &str) {
    match define.split_once('=') {
        Some((name, value)) => (name.trim(), value.trim()),
        None => (define.trim(), "1"),
    }
}

fn config_from_args(args: &OklcArgs, matches: &ArgMatches, passes: Passes) -> Result<CompilerConfig> {
    let backend: Backend = args.backend.parse()?;
    let barrier_policy: BarrierPolicy = args.barrier_policy.parse()?;
    let extension = Path::new(&args.input)
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_default();
    let dialect = if args.fortran {
        Dialect::Fortran
    } else {
        Dialect::from_extension(&extension)
    };
    // Without pass flags the whole pipeline runs.
    let passes = if passes.is_empty() {
        Passes::default()
    } else {
        passes
    };
    let mut config = CompilerConfig::new(backend)
        .with_dialect(dialect)
        .with_debug(args.debug)
        .with_barrier_policy(barrier_policy)
        .with_warn_missing_barriers(args.warn_missing_barriers)
        .with_passes(passes)
        .with_print_ir_before_all(matches.get_flag("print-ir-before-all"));
    for define in &args.defines {
        let (name, value) = parse_define(define);
        config = config.with_define(name, value);
    }
    for dir in &args.include_dirs {
        config = config.with_include_dir(dir.clone());
    }
    if let Some(compiler) = &args.compiler {
        config = config.with_compiler(compiler);
    }
    if let Some(flags) = &args.compiler_flags {
        config = config.with_compiler_flags(flags);
    }
    Ok(config)
}

fn compile(args: &OklcArgs, config: CompilerConfig, stdin: Option<&str>) -> Result<CompiledUnit> {
    let compiler = Compiler::new(config)?;
    match stdin {
        Some(src) => compiler.compile_source(src),
        None => compiler.compile_file(Path::new(&args.input)),
    }
}

fn render(compiled: &CompiledUnit, kernel_info: bool) -> String {
    let mut out = compiled.source.clone();
    if let Some(launcher) = &compiled.launcher {
        out.push_str("\n\n// launcher\n");
        out.push_str(launcher);
    }
    out.push('\n');
    for (name, value) in &compiled.defines {
        out.push_str(&format!("\n// define {name} {value}"));
    }
    if kernel_info {
        out.push_str("\n\n// kernels");
        for info in compiled.kernels.values() {
            for line in info.to_string().lines() {
                out.push_str(&format!("\n// {line}"));
            }
        }
    }
    out
}

fn main() -> Result<()> {
    let cli = cli();
    let args = std::env::args_os();
    let passes = Passes::from_convert_args(args);
    let matches = cli.get_matches();
    let args = OklcArgs::from_arg_matches(&matches)?;

    let level = if args.debug { Level::DEBUG } else { Level::INFO };
    match oklc::init_subscriber(level) {
        Ok(_) => (),
        Err(_e) => (),
    }

    let config = config_from_args(&args, &matches, passes)?;
    let stdin = if args.input == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read stdin")?;
        Some(buffer)
    } else {
        None
    };
    let compiled = compile(&args, config, stdin.as_deref())?;
    println!("{}", render(&compiled, args.kernel_info));
    Ok(())
}

//! Compiler configuration.
//!
//! A [CompilerConfig] is built once and then only read. Every compilation
//! unit borrows it, so units can be compiled in parallel without shared
//! mutable state.

use crate::frontend::Dialect;
use crate::frontend::LanguageTables;
use crate::transform::Passes;
use anyhow::Result;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::fmt::Formatter;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Execution target of the generated source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Backend {
    #[default]
    Serial,
    OpenMP,
    Pthreads,
    CUDA,
    OpenCL,
}

impl Backend {
    pub fn all() -> [Backend; 5] {
        [
            Backend::Serial,
            Backend::OpenMP,
            Backend::Pthreads,
            Backend::CUDA,
            Backend::OpenCL,
        ]
    }
    pub fn is_gpu(&self) -> bool {
        matches!(self, Backend::CUDA | Backend::OpenCL)
    }
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Serial => "Serial",
            Backend::OpenMP => "OpenMP",
            Backend::Pthreads => "Pthreads",
            Backend::CUDA => "CUDA",
            Backend::OpenCL => "OpenCL",
        }
    }
    /// The `OCCA_USING_*` define naming this backend.
    pub fn marker(&self) -> &'static str {
        match self {
            Backend::Serial => "OCCA_USING_SERIAL",
            Backend::OpenMP => "OCCA_USING_OPENMP",
            Backend::Pthreads => "OCCA_USING_PTHREADS",
            Backend::CUDA => "OCCA_USING_CUDA",
            Backend::OpenCL => "OCCA_USING_OPENCL",
        }
    }
}

impl Display for Backend {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let backend = Backend::all()
            .into_iter()
            .find(|b| b.name().eq_ignore_ascii_case(s.trim()));
        match backend {
            Some(backend) => Ok(backend),
            None => {
                let names = Backend::all().map(|b| b.name()).join(", ");
                Err(anyhow::anyhow!("Unknown backend `{s}`; expected one of {names}"))
            }
        }
    }
}

/// What to do with a barrier under a thread-dependent condition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BarrierPolicy {
    #[default]
    Error,
    Warn,
}

impl FromStr for BarrierPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(BarrierPolicy::Error),
            "warn" | "warning" => Ok(BarrierPolicy::Warn),
            _ => Err(anyhow::anyhow!("Unknown barrier policy `{s}`; expected error or warn")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CompilerConfig {
    pub backend: Backend,
    pub dialect: Dialect,
    pub debug: bool,
    pub barrier_policy: BarrierPolicy,
    /// Log inserted barriers as warnings instead of debug messages.
    pub warn_missing_barriers: bool,
    /// User defines, in the order given.
    pub defines: Vec<(String, String)>,
    pub include_dirs: Vec<PathBuf>,
    /// Native compiler for the external build step. Not used by the passes.
    pub compiler: Option<String>,
    pub compiler_flags: Option<String>,
    pub passes: Passes,
    /// Print the statement tree before every pass.
    pub print_ir_before_all: bool,
    pub tables: Arc<LanguageTables>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig::new(Backend::default())
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        _ => Err(anyhow::anyhow!("Option `{key}` expects a boolean, got `{value}`")),
    }
}

impl CompilerConfig {
    pub fn new(backend: Backend) -> Self {
        CompilerConfig {
            backend,
            dialect: Dialect::default(),
            debug: false,
            barrier_policy: BarrierPolicy::default(),
            warn_missing_barriers: false,
            defines: vec![],
            include_dirs: vec![],
            compiler: None,
            compiler_flags: None,
            passes: Passes::default(),
            print_ir_before_all: false,
            tables: Arc::new(LanguageTables::new()),
        }
    }
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
    pub fn with_barrier_policy(mut self, policy: BarrierPolicy) -> Self {
        self.barrier_policy = policy;
        self
    }
    pub fn with_warn_missing_barriers(mut self, warn: bool) -> Self {
        self.warn_missing_barriers = warn;
        self
    }
    pub fn with_define(mut self, name: &str, value: &str) -> Self {
        self.defines.push((name.to_string(), value.to_string()));
        self
    }
    pub fn with_include_dir(mut self, dir: PathBuf) -> Self {
        self.include_dirs.push(dir);
        self
    }
    pub fn with_compiler(mut self, compiler: &str) -> Self {
        self.compiler = Some(compiler.to_string());
        self
    }
    pub fn with_compiler_flags(mut self, flags: &str) -> Self {
        self.compiler_flags = Some(flags.to_string());
        self
    }
    pub fn with_passes(mut self, passes: Passes) -> Self {
        self.passes = passes;
        self
    }
    pub fn with_print_ir_before_all(mut self, print: bool) -> Self {
        self.print_ir_before_all = print;
        self
    }
    /// Build a configuration from compiler-flag-style options such as
    /// `mode: CUDA` or `compilerFlags: -O3`.
    pub fn from_options(options: &BTreeMap<String, String>) -> Result<Self> {
        let mut config = CompilerConfig::default();
        for (key, value) in options {
            match key.as_str() {
                "mode" | "backend" => config.backend = value.parse()?,
                "language" => config.dialect = value.parse()?,
                "debug" => config.debug = parse_flag(key, value)?,
                "compiler" => config.compiler = Some(value.clone()),
                "compilerFlags" => config.compiler_flags = Some(value.clone()),
                "barrierPolicy" => config.barrier_policy = value.parse()?,
                "warnMissingBarriers" => config.warn_missing_barriers = parse_flag(key, value)?,
                _ => debug!("Ignoring option `{key}`"),
            }
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_options() {
        let mut options = BTreeMap::new();
        options.insert("mode".to_string(), "cuda".to_string());
        options.insert("language".to_string(), "fortran".to_string());
        options.insert("debug".to_string(), "true".to_string());
        options.insert("compilerFlags".to_string(), "-O3".to_string());
        options.insert("barrierPolicy".to_string(), "warn".to_string());
        let config = CompilerConfig::from_options(&options).unwrap();
        assert_eq!(config.backend, Backend::CUDA);
        assert_eq!(config.dialect, Dialect::Fortran);
        assert!(config.debug);
        assert_eq!(config.compiler_flags.as_deref(), Some("-O3"));
        assert_eq!(config.barrier_policy, BarrierPolicy::Warn);

        options.insert("mode".to_string(), "Metal".to_string());
        let err = CompilerConfig::from_options(&options).unwrap_err();
        assert!(err.to_string().contains("Unknown backend `Metal`"));
    }

    #[test]
    fn test_backend() {
        assert_eq!("OpenMP".parse::<Backend>().unwrap(), Backend::OpenMP);
        assert!(Backend::OpenCL.is_gpu());
        assert!(!Backend::Pthreads.is_gpu());
        assert_eq!(Backend::Serial.marker(), "OCCA_USING_SERIAL");
    }
}

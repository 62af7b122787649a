use crate::convert::AddBarriers;
use crate::convert::HoistSections;
use crate::convert::MaterializeLoops;
use crate::convert::Pass;
use crate::convert::PrivatizeExclusive;
use crate::convert::RewriteResult;
use crate::convert::SplitKernels;
use crate::convert::Unit;
use crate::ir::OklFlavor;
use anyhow::Result;
use clap::Arg;
use clap::ArgAction;
use std::env::ArgsOs;
use std::fmt;
use std::fmt::Display;
use tracing::debug;
use tracing::info;
use tracing::subscriber::SetGlobalDefaultError;
use tracing::Level;
use tracing_subscriber;

/// The passes in the order in which they always run.
pub const PIPELINE: [&str; 5] = [
    SplitKernels::NAME,
    AddBarriers::NAME,
    PrivatizeExclusive::NAME,
    HoistSections::NAME,
    MaterializeLoops::NAME,
];

/// A transformation pass (e.g., `--okl-add-barriers`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SinglePass {
    pass: String,
}

impl Display for SinglePass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pass)
    }
}

impl SinglePass {
    pub fn new(pass: &str) -> SinglePass {
        let pass = pass.strip_prefix("--").unwrap_or(pass);
        SinglePass {
            pass: pass.to_string(),
        }
    }
    pub fn name(&self) -> &str {
        &self.pass
    }
    /// Position in [PIPELINE]. Unknown passes sort last.
    fn position(&self) -> usize {
        PIPELINE
            .iter()
            .position(|p| *p == self.pass)
            .unwrap_or(PIPELINE.len())
    }
}

/// A collection of [SinglePass]es, kept in pipeline order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Passes {
    passes: Vec<SinglePass>,
}

impl Default for Passes {
    /// The whole pipeline.
    fn default() -> Self {
        Passes::from_vec(PIPELINE.to_vec())
    }
}

impl Display for Passes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            self.passes
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<String>>()
                .join(" ")
        )
    }
}

fn is_pass_flag(arg: &str) -> bool {
    arg.starts_with("--okl-")
}

impl Passes {
    pub fn from_vec(passes: Vec<&str>) -> Passes {
        let mut passes: Vec<SinglePass> = passes.iter().map(|p| SinglePass::new(p)).collect();
        passes.sort_by_key(|p| p.position());
        passes.dedup();
        Passes { passes }
    }
    pub fn from_convert_vec(args: Vec<&str>) -> Passes {
        let passes = args.into_iter().filter(|a| is_pass_flag(a)).collect();
        Passes::from_vec(passes)
    }
    /// Extract passes (starting with `--okl-`) from the given args.
    pub fn from_convert_args(args: ArgsOs) -> Passes {
        let args = args
            .map(|a| a.to_string_lossy().to_string())
            .collect::<Vec<String>>();
        Passes::from_convert_vec(args.iter().map(|a| a.as_str()).collect())
    }
    pub fn vec(&self) -> &Vec<SinglePass> {
        &self.passes
    }
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }
}

/// Interface to add custom passes to the compiler.
pub trait TransformDispatch {
    fn dispatch(unit: &mut Unit, pass: &SinglePass) -> Result<RewriteResult>;
}

/// Default implementation of [TransformDispatch].
///
/// This default implementation knows only the passes of [PIPELINE].
pub struct DefaultTransformDispatch;

/// Initialize logging with the given level.
pub fn init_subscriber(level: Level) -> Result<(), SetGlobalDefaultError> {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(level)
        .with_test_writer()
        .without_time()
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
}

impl TransformDispatch for DefaultTransformDispatch {
    fn dispatch(unit: &mut Unit, pass: &SinglePass) -> Result<RewriteResult> {
        match pass.name() {
            SplitKernels::NAME => SplitKernels::convert(unit),
            AddBarriers::NAME => AddBarriers::convert(unit),
            PrivatizeExclusive::NAME => PrivatizeExclusive::convert(unit),
            HoistSections::NAME => HoistSections::convert(unit),
            MaterializeLoops::NAME => MaterializeLoops::convert(unit),
            _ => Err(anyhow::anyhow!("Unknown pass: {}", pass)),
        }
    }
}

/// Default arguments that are available in oklc.
///
/// This includes `--print-ir-before-all` and one flag per pass such as
/// `--okl-add-barriers`. `--debug` is not included to allow the binary to
/// handle the logging.
pub fn default_arguments() -> Vec<Arg> {
    vec![
        Arg::new("okl-split-kernels")
            .long("okl-split-kernels")
            .help("Split kernels with several outer loops into nested kernels (GPU)")
            .action(ArgAction::SetTrue),
        Arg::new("okl-add-barriers")
            .long("okl-add-barriers")
            .help("Insert barriers between conflicting shared memory accesses")
            .action(ArgAction::SetTrue),
        Arg::new("okl-privatize-exclusive")
            .long("okl-privatize-exclusive")
            .help("Give exclusive variables per-iteration storage")
            .action(ArgAction::SetTrue),
        Arg::new("okl-hoist-sections")
            .long("okl-hoist-sections")
            .help("Hoist declarations used across barriers")
            .action(ArgAction::SetTrue),
        Arg::new("okl-materialize-loops")
            .long("okl-materialize-loops")
            .help("Replace parallel loops by backend loops or thread indices")
            .action(ArgAction::SetTrue),
        Arg::new("print-ir-before-all")
            .long("print-ir-before-all")
            .help("Print the statement tree before each pass")
            .action(ArgAction::SetTrue),
    ]
}

/// Transform the given unit via the given passes.
///
/// Passes run in the order of `passes`, which is always pipeline order.
pub fn transform<T: TransformDispatch>(unit: &mut Unit, passes: &Passes) -> Result<RewriteResult> {
    let mut result = RewriteResult::Unchanged;
    for pass in passes.vec() {
        if unit.config.print_ir_before_all {
            info!("IR before {pass}:\n{}", unit.tree.render(unit.tree.root(), &OklFlavor));
        }
        debug!("Running {pass}");
        let new_result = T::dispatch(unit, pass)?;
        if let RewriteResult::Changed(_) = new_result {
            result = new_result;
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_order() {
        let passes = Passes::from_convert_vec(vec![
            "oklc",
            "--okl-materialize-loops",
            "--backend",
            "cuda",
            "--okl-add-barriers",
        ]);
        assert_eq!(passes.to_string(), "okl-add-barriers okl-materialize-loops");
        assert_eq!(Passes::default().vec().len(), PIPELINE.len());
        assert!(Passes::from_convert_vec(vec!["oklc"]).is_empty());
    }
}

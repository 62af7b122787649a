//! oklc compiles OKL kernels into source for a parallel backend.
//!
//! OKL is C (or Fortran) with a few annotations for data-parallel loops.
//! A kernel says which loops are parallel and how they nest, and the compiler
//! decides how that maps onto a GPU grid or onto CPU threads:
//!
//! ```c
//! kernel void addVectors(const int n, const float *a, const float *b, float *ab) {
//!   for (int i = 0; i < n; i += 16; outer0) {
//!     for (int j = i; j < i + 16; ++j; inner0) {
//!       if (j < n) {
//!         ab[j] = a[j] + b[j];
//!       }
//!     }
//!   }
//! }
//! ```
//!
//! The `outer` loops become thread blocks (or the iterations that are
//! handed out to CPU threads) and the `inner` loops become the threads inside
//! one block. Variables qualified `shared` live once per block and
//! variables qualified `exclusive` once per thread.
//!
//! A compilation unit moves through these stages:
//!
//! 1. The [frontend] scans the source, runs the preprocessor and builds a
//!    [StatementTree](ir::StatementTree).
//! 2. [analysis::classify] finds the kernels, tags the parallel loops and
//!    checks that the loop nests are well formed. It also produces a
//!    [KernelInfo](analysis::KernelInfo) per kernel with the launch
//!    dimensions.
//! 3. The passes in [convert] rewrite the tree, always in the same order:
//!    kernel splitting, barrier insertion, exclusive privatization, section
//!    hoisting and loop materialization. Which passes run is configurable
//!    (see [Passes]), but not their order.
//! 4. [emit] prints the tree in the spelling of the backend together with the
//!    preprocessor definitions the native compiler needs.
//!
//! Every error is fatal for the compilation unit, and no partial output is
//! returned. See [error::CompileError] for the categories.
//!
//! To compile a unit, build a [CompilerConfig] and pass it to a [Compiler]:
//!
//! ```no_run
//! use oklc::Backend;
//! use oklc::Compiler;
//! use oklc::CompilerConfig;
//!
//! let compiler = Compiler::new(CompilerConfig::new(Backend::CUDA)).unwrap();
//! let compiled = compiler.compile_file("addVectors.okl".as_ref()).unwrap();
//! println!("{}", compiled.source);
//! ```

pub mod analysis;
mod compile;
pub mod config;
pub mod convert;
pub mod emit;
pub mod error;
pub mod frontend;
pub mod ir;
pub mod targ3t;
#[cfg(feature = "test-utils")]
pub mod tester;
mod transform;

pub use compile::compile;
pub use compile::CompiledUnit;
pub use compile::Compiler;
pub use config::Backend;
pub use config::BarrierPolicy;
pub use config::CompilerConfig;
pub use frontend::Dialect;
pub use transform::default_arguments;
pub use transform::init_subscriber;
pub use transform::transform;
pub use transform::DefaultTransformDispatch;
pub use transform::Passes;
pub use transform::SinglePass;
pub use transform::TransformDispatch;
pub use transform::PIPELINE;

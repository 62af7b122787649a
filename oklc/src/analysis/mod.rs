//! Semantic analysis of kernels and their parallel loops.

mod classify;
mod kernel_info;
mod loops;

pub use classify::classify;
pub use classify::describe_kernel;
pub use classify::is_native;
pub use classify::validate_kernel;
pub use kernel_info::find_kernel;
pub use kernel_info::KernelInfo;
pub use kernel_info::KernelInfoMap;
pub use loops::wrap;
pub use loops::LoopHeader;

//! Backend vocabulary.
//!
//! Each backend decides how kernel qualifiers, shared memory, barriers and
//! loop indices are spelled, and which defines native kernels rely on.
//!
//! This module is called `targ3t` because `target` created issues with `cargo
//! watch`.

pub mod cpu;
pub mod cuda;
pub mod opencl;

use crate::config::Backend;
use crate::ir::Flavor;
use crate::ir::LoopTag;

pub fn flavor(backend: Backend) -> &'static dyn Flavor {
    match backend {
        Backend::CUDA => &cuda::CudaFlavor,
        Backend::OpenCL => &opencl::OpenCLFlavor,
        Backend::Serial | Backend::OpenMP | Backend::Pthreads => &cpu::CpuFlavor,
    }
}

/// Index expression of the current thread along a parallel loop.
///
/// Only GPU backends map loops onto thread indices.
pub fn loop_id(backend: Backend, tag: LoopTag) -> Option<String> {
    match backend {
        Backend::CUDA => Some(cuda::loop_id(tag)),
        Backend::OpenCL => Some(opencl::loop_id(tag)),
        Backend::Serial | Backend::OpenMP | Backend::Pthreads => None,
    }
}

/// Defines that kernels written in backend syntax expect.
pub fn native_defines(backend: Backend) -> Vec<(String, String)> {
    match backend {
        Backend::CUDA => cuda::native_defines(),
        Backend::OpenCL => opencl::native_defines(),
        Backend::Serial | Backend::OpenMP | Backend::Pthreads => cpu::native_defines(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::LoopRole;

    #[test]
    fn test_loop_ids() {
        let inner1 = LoopTag::new(LoopRole::Inner, 1);
        assert_eq!(loop_id(Backend::CUDA, inner1).unwrap(), "threadIdx.y");
        assert_eq!(loop_id(Backend::OpenCL, inner1).unwrap(), "get_local_id(1)");
        assert_eq!(loop_id(Backend::Serial, inner1), None);
        let global0 = LoopTag::new(LoopRole::Global, 0);
        assert_eq!(
            loop_id(Backend::CUDA, global0).unwrap(),
            "(blockIdx.x * blockDim.x + threadIdx.x)"
        );
        assert_eq!(flavor(Backend::OpenCL).shared_keyword(), "__local");
    }
}

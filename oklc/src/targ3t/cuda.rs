use crate::frontend::Node;
use crate::ir::Flavor;
use crate::ir::LoopRole;
use crate::ir::LoopTag;

const AXES: [&str; 3] = ["x", "y", "z"];

pub struct CudaFlavor;

impl Flavor for CudaFlavor {
    fn kernel_qualifier(&self) -> &str {
        "extern \"C\" __global__"
    }
    fn shared_keyword(&self) -> &str {
        "__shared__"
    }
    fn exclusive_keyword(&self) -> &str {
        ""
    }
    fn restrict_keyword(&self) -> &str {
        "__restrict__"
    }
    fn barrier(&self, _fence: &[Node]) -> String {
        "__syncthreads();".to_string()
    }
}

pub fn loop_id(tag: LoopTag) -> String {
    let axis = AXES[tag.dim];
    match tag.role {
        LoopRole::Outer => format!("blockIdx.{axis}"),
        LoopRole::Inner => format!("threadIdx.{axis}"),
        LoopRole::Global => format!("(blockIdx.{axis} * blockDim.{axis} + threadIdx.{axis})"),
    }
}

pub fn native_defines() -> Vec<(String, String)> {
    let mut defines = vec![];
    for (dim, axis) in AXES.iter().enumerate() {
        defines.push((format!("occaOuterFor{dim}"), String::new()));
        defines.push((format!("occaInnerFor{dim}"), String::new()));
        defines.push((format!("occaGlobalFor{dim}"), String::new()));
        defines.push((format!("occaOuterId{dim}"), format!("blockIdx.{axis}")));
        defines.push((format!("occaInnerId{dim}"), format!("threadIdx.{axis}")));
        let global = loop_id(LoopTag::new(LoopRole::Global, dim));
        defines.push((format!("occaGlobalId{dim}"), global));
        defines.push((format!("occaOuterDim{dim}"), format!("gridDim.{axis}")));
        defines.push((format!("occaInnerDim{dim}"), format!("blockDim.{axis}")));
    }
    defines
}


use crate::frontend::to_source;
use crate::frontend::Node;
use crate::ir::Flavor;
use crate::ir::LoopRole;
use crate::ir::LoopTag;

pub struct OpenCLFlavor;

impl Flavor for OpenCLFlavor {
    fn kernel_qualifier(&self) -> &str {
        "__kernel"
    }
    fn shared_keyword(&self) -> &str {
        "__local"
    }
    fn exclusive_keyword(&self) -> &str {
        ""
    }
    fn barrier(&self, fence: &[Node]) -> String {
        let fence = match to_source(fence).as_str() {
            "globalMemFence" => "CLK_GLOBAL_MEM_FENCE",
            _ => "CLK_LOCAL_MEM_FENCE",
        };
        format!("barrier({fence});")
    }
}

pub fn loop_id(tag: LoopTag) -> String {
    let function = match tag.role {
        LoopRole::Outer => "get_group_id",
        LoopRole::Inner => "get_local_id",
        LoopRole::Global => "get_global_id",
    };
    format!("{function}({})", tag.dim)
}

pub fn native_defines() -> Vec<(String, String)> {
    let mut defines = vec![];
    for dim in 0..3 {
        defines.push((format!("occaOuterFor{dim}"), String::new()));
        defines.push((format!("occaInnerFor{dim}"), String::new()));
        defines.push((format!("occaGlobalFor{dim}"), String::new()));
        defines.push((format!("occaOuterId{dim}"), format!("get_group_id({dim})")));
        defines.push((format!("occaInnerId{dim}"), format!("get_local_id({dim})")));
        defines.push((format!("occaGlobalId{dim}"), format!("get_global_id({dim})")));
        defines.push((format!("occaOuterDim{dim}"), format!("get_num_groups({dim})")));
        defines.push((format!("occaInnerDim{dim}"), format!("get_local_size({dim})")));
    }
    defines
}

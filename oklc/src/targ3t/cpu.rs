use crate::frontend::Node;
use crate::ir::Flavor;
use crate::ir::LoopHint;

/// Serial, OpenMP and Pthreads output.
///
/// Barriers never reach the printer: inner loops are split at barriers and
/// the remaining ones are dropped before emission.
pub struct CpuFlavor;

impl Flavor for CpuFlavor {
    fn kernel_qualifier(&self) -> &str {
        "extern \"C\""
    }
    fn shared_keyword(&self) -> &str {
        ""
    }
    fn exclusive_keyword(&self) -> &str {
        ""
    }
    fn restrict_keyword(&self) -> &str {
        "__restrict__"
    }
    fn barrier(&self, _fence: &[Node]) -> String {
        String::new()
    }
    fn unroll(&self, _hint: &LoopHint) -> Option<String> {
        None
    }
}

pub fn native_defines() -> Vec<(String, String)> {
    let mut defines = vec![];
    for dim in 0..3 {
        for role in ["Outer", "Inner"] {
            let id = format!("occa{role}Id{dim}");
            let loop_header = format!("for (int {id} = 0; {id} < occa{role}Dim{dim}; ++{id})");
            defines.push((format!("occa{role}For{dim}"), loop_header));
        }
        defines.push((
            format!("occaGlobalId{dim}"),
            format!("(occaOuterId{dim} * occaInnerDim{dim} + occaInnerId{dim})"),
        ));
    }
    defines
}

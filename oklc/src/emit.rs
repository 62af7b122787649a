//! Code emitter.
//!
//! Prints the final statement tree in the spelling of the backend and
//! collects the preprocessor definitions the native compiler needs.

use crate::config::Backend;
use crate::config::CompilerConfig;
use crate::ir::StatementKind;
use crate::ir::StatementTree;
use crate::ir::StmtId;
use crate::targ3t;
use crate::targ3t::cpu::CpuFlavor;
use anyhow::Result;
use tracing::debug;

/// Source text and definitions for one compilation unit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Emitted {
    /// Device source for the backend compiler.
    pub source: String,
    /// Preprocessor definitions, in the order they must be passed.
    pub defines: Vec<(String, String)>,
    /// Host source of split-kernel launchers.
    pub launcher: Option<String>,
}

fn is_launcher(tree: &StatementTree, id: StmtId) -> bool {
    tree.get(id).function.as_ref().is_some_and(|sig| sig.launcher)
}

fn has_native_kernel(tree: &StatementTree) -> bool {
    tree.kernels()
        .iter()
        .any(|k| tree.get(*k).function.as_ref().is_some_and(|sig| sig.native))
}

/// Join top-level statements, with an empty line around functions.
fn join_top_level(tree: &StatementTree, parts: &[(StmtId, String)]) -> String {
    let mut out = String::new();
    let mut previous: Option<StmtId> = None;
    for (id, text) in parts {
        if let Some(previous) = previous {
            let function = |id: StmtId| tree.kind(id) == StatementKind::Function;
            out.push('\n');
            if function(previous) || function(*id) {
                out.push('\n');
            }
        }
        out.push_str(text);
        previous = Some(*id);
    }
    out
}

/// Definitions passed along with the source.
///
/// The backend markers come first, then `OCCA_DEBUG_ENABLED`, then the user
/// defines and, if any kernel is written in backend syntax, the definitions
/// of the native keywords.
pub fn defines(tree: &StatementTree, config: &CompilerConfig) -> Vec<(String, String)> {
    let flag = |on: bool| if on { "1" } else { "0" }.to_string();
    let backend = config.backend;
    let mut defines = Backend::all()
        .iter()
        .map(|b| (b.marker().to_string(), flag(*b == backend)))
        .collect::<Vec<(String, String)>>();
    defines.push(("OCCA_USING_CPU".to_string(), flag(!backend.is_gpu())));
    defines.push(("OCCA_USING_GPU".to_string(), flag(backend.is_gpu())));
    defines.push(("OCCA_DEBUG_ENABLED".to_string(), flag(config.debug)));
    defines.extend(config.defines.iter().cloned());
    if has_native_kernel(tree) {
        defines.extend(targ3t::native_defines(backend));
    }
    defines
}

/// Serialize `tree` for the configured backend.
pub fn emit(tree: &StatementTree, config: &CompilerConfig) -> Result<Emitted> {
    let flavor = targ3t::flavor(config.backend);
    let root = tree.root();
    let mut device = vec![];
    let mut host = vec![];
    for child in tree.children(root) {
        if is_launcher(tree, *child) {
            host.push((*child, tree.render(*child, &CpuFlavor)));
        } else {
            device.push((*child, tree.render(*child, flavor)));
        }
    }
    let launcher = if host.is_empty() {
        None
    } else {
        Some(join_top_level(tree, &host))
    };
    let emitted = Emitted {
        source: join_top_level(tree, &device),
        defines: defines(tree, config),
        launcher,
    };
    debug!(
        "Emitted {} bytes of {} source",
        emitted.source.len(),
        config.backend
    );
    Ok(emitted)
}

//! Rewriting passes over the statement tree.
//!
//! The passes run in a fixed order (see [crate::transform]). Each pass is a
//! set of [Rewrite]s that are applied until no rewrite matches anymore.
//! Native kernels and split-kernel launchers are never touched.

use crate::analysis::KernelInfoMap;
use crate::config::CompilerConfig;
use crate::frontend::Node;
use crate::ir::spaces;
use crate::ir::StatementKind;
use crate::ir::StatementTree;
use crate::ir::StmtId;
use anyhow::Result;
use tracing::debug;

mod add_barriers;
mod hoist_sections;
mod materialize_loops;
mod privatize_exclusive;
mod split_kernels;

pub use add_barriers::AddBarriers;
pub use hoist_sections::HoistSections;
pub use materialize_loops::MaterializeLoops;
pub use privatize_exclusive::PrivatizeExclusive;
pub use split_kernels::SplitKernels;

/// A compilation unit while it moves through the passes.
pub struct Unit<'a> {
    pub tree: StatementTree,
    pub config: &'a CompilerConfig,
    pub kernels: KernelInfoMap,
}

impl<'a> Unit<'a> {
    pub fn new(tree: StatementTree, config: &'a CompilerConfig, kernels: KernelInfoMap) -> Self {
        Unit {
            tree,
            config,
            kernels,
        }
    }
    /// The kernel around `id` if the passes may rewrite it.
    pub fn okl_kernel_of(&self, id: StmtId) -> Option<StmtId> {
        let function = if self.tree.kind(id) == StatementKind::Function {
            id
        } else {
            self.tree.function_of(id)?
        };
        let sig = self.tree.get(function).function.as_ref()?;
        if sig.is_kernel && !sig.native && !sig.launcher {
            Some(function)
        } else {
            None
        }
    }
    pub fn kernel_name(&self, kernel: StmtId) -> String {
        match &self.tree.get(kernel).function {
            Some(sig) => sig.name.clone(),
            None => String::new(),
        }
    }
}

/// Whether a rewrite changed the tree.
///
/// A change carries the statement that was rewritten.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RewriteResult {
    Changed(StmtId),
    Unchanged,
}

impl RewriteResult {
    pub fn is_changed(&self) -> Option<StmtId> {
        match self {
            RewriteResult::Changed(id) => Some(*id),
            RewriteResult::Unchanged => None,
        }
    }
}

pub trait Rewrite: Send + Sync {
    /// The name of the rewrite; is used for logging.
    fn name(&self) -> &'static str;
    /// Returns true if the rewrite can be applied to the given statement.
    ///
    /// This method is not allowed to mutate the tree.
    fn is_match(&self, unit: &Unit, id: StmtId) -> Result<bool>;
    /// Applies the rewrite to the given statement.
    fn rewrite(&self, unit: &mut Unit, id: StmtId) -> Result<RewriteResult>;
}

fn apply_rewrite(
    unit: &mut Unit,
    id: StmtId,
    rewrite: &dyn Rewrite,
    indent: usize,
) -> Result<RewriteResult> {
    if rewrite.is_match(unit, id)? {
        debug!(
            "{}Matched {:?} at {} with {}",
            spaces(indent),
            unit.tree.kind(id),
            unit.tree.get(id).location,
            rewrite.name()
        );
        let result = rewrite.rewrite(unit, id)?;
        if result.is_changed().is_some() {
            debug!("{}--> Changed", spaces(indent));
            return Ok(result);
        }
    }
    let children = unit.tree.children(id).to_vec();
    for child in children {
        let result = apply_rewrite(unit, child, rewrite, indent + 1)?;
        if result.is_changed().is_some() {
            return Ok(RewriteResult::Changed(id));
        }
    }
    Ok(RewriteResult::Unchanged)
}

fn apply_rewrites_helper(unit: &mut Unit, rewrites: &[&dyn Rewrite]) -> Result<RewriteResult> {
    let root = unit.tree.root();
    for rewrite in rewrites {
        let result = apply_rewrite(unit, root, *rewrite, 0)?;
        if result.is_changed().is_some() {
            return Ok(result);
        }
    }
    Ok(RewriteResult::Unchanged)
}

/// Apply `rewrites` until none of them matches.
///
/// Earlier rewrites take priority: after every change, matching starts over
/// with the first rewrite.
pub fn apply_rewrites(unit: &mut Unit, rewrites: &[&dyn Rewrite]) -> Result<RewriteResult> {
    let max_iterations = 10240;
    let mut has_changed = false;
    for _ in 0..max_iterations {
        match apply_rewrites_helper(unit, rewrites)? {
            RewriteResult::Changed(_) => has_changed = true,
            RewriteResult::Unchanged => {
                if has_changed {
                    return Ok(RewriteResult::Changed(unit.tree.root()));
                } else {
                    return Ok(RewriteResult::Unchanged);
                }
            }
        }
    }
    tracing::warn!("Too many rewrite iterations");
    Ok(RewriteResult::Changed(unit.tree.root()))
}

/// A pass is a transformation of a whole compilation unit.
pub trait Pass {
    const NAME: &'static str;
    fn convert(unit: &mut Unit) -> Result<RewriteResult>;
}

/// Apply `f` to every token sequence of the statement itself.
///
/// For declarations these are the dimensions and initializers of the
/// declared variables. For `for` loops the header and the initializers of
/// the loop variables.
pub(crate) fn rewrite_nodes(
    tree: &mut StatementTree,
    id: StmtId,
    f: &mut dyn FnMut(&mut Vec<Node>),
) {
    let kind = tree.kind(id);
    if kind != StatementKind::Declaration {
        f(&mut tree.get_mut(id).nodes);
    }
    if matches!(kind, StatementKind::Declaration | StatementKind::For) {
        for var in tree.get(id).vars.clone() {
            let var = tree.var_mut(var);
            for dim in var.dims.iter_mut() {
                f(dim);
            }
            if let Some(init) = var.init.as_mut() {
                f(init);
            }
        }
    }
}

/// Whether the subtree of `id` (inclusive) holds a barrier.
pub(crate) fn contains_barrier(tree: &StatementTree, id: StmtId) -> bool {
    tree.kind(id) == StatementKind::Barrier
        || tree
            .descendants(id)
            .iter()
            .any(|d| tree.kind(*d) == StatementKind::Barrier)
}

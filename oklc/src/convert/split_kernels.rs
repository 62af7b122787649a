use crate::analysis::describe_kernel;
use crate::convert::apply_rewrites;
use crate::convert::Pass;
use crate::convert::Rewrite;
use crate::convert::RewriteResult;
use crate::convert::Unit;
use crate::error::CompileError;
use crate::frontend::parse_nodes;
use crate::ir::uses_in_subtree;
use crate::ir::FunctionSig;
use crate::ir::LoopRole;
use crate::ir::StatementKind;
use crate::ir::StatementTree;
use crate::ir::StmtId;
use crate::ir::Var;
use crate::ir::VarId;
use anyhow::Result;
use tracing::info;

/// Split a kernel with several outer loop nests into one nested kernel per
/// nest.
///
/// GPU backends cannot synchronize the whole grid inside a kernel, so
/// ```c
/// kernel void k(int n, float *a) {
///   for (int i = 0; i < n; ++i; outer0) { ... }
///   for (int i = 0; i < n; ++i; outer0) { ... }
/// }
/// ```
/// becomes the nested kernels `k_0` and `k_1`, each with one of the loops,
/// plus the launcher `k` which calls `nestedKernels[0](n, a)` and
/// `nestedKernels[1](n, a)` in order.
struct KernelSplit;

/// Outer loops that are not nested inside another outer loop.
fn outermost_loops(tree: &StatementTree, kernel: StmtId) -> Vec<StmtId> {
    tree.descendants(kernel)
        .into_iter()
        .filter(|id| {
            tree.get(*id).is_loop(LoopRole::Outer)
                && tree.enclosing_loops(*id, LoopRole::Outer).is_empty()
        })
        .collect()
}

/// Kernel-level variables that `outer` reads or writes.
fn state_vars(tree: &StatementTree, kernel: StmtId, outer: StmtId) -> Vec<VarId> {
    let mut vars = vec![];
    for var_use in uses_in_subtree(tree, outer) {
        let declared_in = tree.var(var_use.var).declared_in;
        let is_local = declared_in != kernel
            && tree.function_of(declared_in) == Some(kernel)
            && declared_in != outer
            && !tree.is_ancestor(outer, declared_in);
        if is_local && !vars.contains(&var_use.var) {
            vars.push(var_use.var);
        }
    }
    vars
}

impl KernelSplit {
    fn nested_kernel(
        unit: &mut Unit,
        kernel: StmtId,
        outer: StmtId,
        index: usize,
    ) -> Result<StmtId> {
        let tree = &mut unit.tree;
        let sig = match &tree.get(kernel).function {
            Some(sig) => sig.clone(),
            None => return Ok(kernel),
        };
        let name = format!("{}_{index}", sig.name);
        let location = tree.get(outer).location;
        let function = tree.alloc(StatementKind::Function, vec![], location);
        let mut params = vec![];
        let mut args = vec![];
        for param in &sig.params {
            let mut var = tree.var(*param).clone();
            var.declared_in = function;
            args.push(var.name.clone());
            params.push(var);
        }
        for state in state_vars(tree, kernel, outer) {
            let state = tree.var(state);
            if state.is_array() {
                let msg = format!(
                    "array `{}` cannot be passed to nested kernel `{name}`",
                    state.name
                );
                return Err(CompileError::emit(state.location, msg));
            }
            let mut var = state.clone();
            var.init = None;
            var.declared_in = function;
            args.push(var.name.clone());
            params.push(var);
        }
        let mut ids = vec![];
        for var in params {
            let id = tree.add_var(var);
            tree.declare(function, id)?;
            ids.push(id);
        }
        tree.get_mut(function).function = Some(FunctionSig {
            name,
            qualifiers: sig.qualifiers.clone(),
            return_type: sig.return_type.clone(),
            params: ids,
            is_kernel: true,
            native: false,
            launcher: false,
        });
        let body = tree.push(function, StatementKind::Block, vec![], location);
        let call = format!("nestedKernels[{index}]({})", args.join(", "));
        let call = tree.alloc(StatementKind::Expression, parse_nodes(&call)?, location);
        tree.replace(outer, call);
        tree.attach(body, outer);
        tree.insert_before(kernel, function);
        Ok(function)
    }
}

impl Rewrite for KernelSplit {
    fn name(&self) -> &'static str {
        "split_kernels::KernelSplit"
    }
    fn is_match(&self, unit: &Unit, id: StmtId) -> Result<bool> {
        if unit.tree.kind(id) != StatementKind::Function || unit.okl_kernel_of(id).is_none() {
            return Ok(false);
        }
        Ok(outermost_loops(&unit.tree, id).len() > 1)
    }
    fn rewrite(&self, unit: &mut Unit, kernel: StmtId) -> Result<RewriteResult> {
        let name = unit.kernel_name(kernel);
        let body = unit.tree.body(kernel);
        let loops = outermost_loops(&unit.tree, kernel);
        for outer in &loops {
            if unit.tree.parent(*outer) != body {
                let msg = format!(
                    "outer loop must be a direct statement of kernel `{name}` to split it into nested kernels"
                );
                return Err(CompileError::emit(unit.tree.get(*outer).location, msg));
            }
        }
        let mut nested = vec![];
        for (index, outer) in loops.iter().enumerate() {
            nested.push(Self::nested_kernel(unit, kernel, *outer, index)?);
        }

        let tree = &mut unit.tree;
        let mut launcher_param = Var::new("nestedKernels", "occa::kernel");
        launcher_param.pointer = 1;
        launcher_param.declared_in = kernel;
        launcher_param.location = tree.get(kernel).location;
        let launcher_param = tree.add_var(launcher_param);
        tree.declare(kernel, launcher_param)?;
        if let Some(sig) = tree.get_mut(kernel).function.as_mut() {
            sig.params.insert(0, launcher_param);
            sig.qualifiers.insert(0, "extern \"C\"".to_string());
            sig.launcher = true;
        }

        let mut infos = vec![];
        for function in &nested {
            infos.push(describe_kernel(&unit.tree, *function)?);
        }
        info!(
            "Split kernel `{name}` into {}",
            infos
                .iter()
                .map(|i| i.name.clone())
                .collect::<Vec<String>>()
                .join(", ")
        );
        if let Some(entry) = unit.kernels.get_mut(&name) {
            entry.nested_kernels = infos;
        }
        Ok(RewriteResult::Changed(kernel))
    }
}

pub struct SplitKernels;

impl Pass for SplitKernels {
    const NAME: &'static str = "okl-split-kernels";
    fn convert(unit: &mut Unit) -> Result<RewriteResult> {
        if !unit.config.backend.is_gpu() {
            return Ok(RewriteResult::Unchanged);
        }
        let rewrites: Vec<&dyn Rewrite> = vec![&KernelSplit];
        apply_rewrites(unit, &rewrites)
    }
}

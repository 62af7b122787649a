use crate::analysis::find_kernel;
use crate::analysis::wrap;
use crate::analysis::LoopHeader;
use crate::convert::apply_rewrites;
use crate::convert::rewrite_nodes;
use crate::convert::Pass;
use crate::convert::Rewrite;
use crate::convert::RewriteResult;
use crate::convert::Unit;
use crate::error::CompileError;
use crate::frontend::index_identifier;
use crate::frontend::insert_source;
use crate::frontend::parse_nodes;
use crate::frontend::to_source;
use crate::ir::statements_using;
use crate::ir::LoopRole;
use crate::ir::StatementKind;
use crate::ir::StatementTree;
use crate::ir::StmtId;
use crate::ir::VarId;
use anyhow::Result;
use std::collections::BTreeMap;
use tracing::debug;

/// Give every inner iteration its own copy of an `exclusive` variable.
///
/// On GPU backends every thread already has private registers, so the
/// qualifier is dropped. On CPU backends the inner loops run one after the
/// other, so
/// ```c
/// exclusive float x = 0;
/// for (int i = 0; i < 16; ++i; inner0) { x += a[i]; }
/// ```
/// becomes
/// ```c
/// float x[16];
/// for (int occaExclusiveIndex = 0; occaExclusiveIndex < 16; ++occaExclusiveIndex) {
///   x[occaExclusiveIndex] = 0;
/// }
/// for (int i = 0; i < 16; ++i; inner0) { x[i] += a[i]; }
/// ```
struct ExclusiveStorage;

/// Linear inner-iteration index of `id`: `c0 + n0 * (c1 + n1 * c2)`.
fn iteration_index(tree: &StatementTree, id: StmtId, bounds: &[String]) -> Result<String> {
    let mut coordinates = BTreeMap::new();
    for inner in tree.enclosing_loops(id, LoopRole::Inner) {
        if let Some(tag) = tree.get(inner).loop_tag {
            coordinates
                .entry(tag.dim)
                .or_insert(LoopHeader::parse(tree, inner)?.coordinate());
        }
    }
    let mut index: Option<String> = None;
    for dim in (0..bounds.len()).rev() {
        let coordinate = match coordinates.get(&dim) {
            Some(coordinate) => coordinate,
            None => {
                let msg = format!("statement is not inside an inner{dim} loop");
                return Err(CompileError::emit(tree.get(id).location, msg));
            }
        };
        index = Some(match index {
            None => coordinate.clone(),
            Some(rest) => format!("{} + {} * {}", wrap(coordinate), wrap(&bounds[dim]), wrap(&rest)),
        });
    }
    match index {
        Some(index) => Ok(index),
        None => {
            let msg = "kernel has no inner loops to privatize over";
            Err(CompileError::emit(tree.get(id).location, msg))
        }
    }
}

/// Turn `var` into an array with one element per inner iteration and index
/// every use outside `declaration` by the iteration coordinates.
///
/// The initializer, if any, is returned for the caller to place.
pub(crate) fn privatize(unit: &mut Unit, var: VarId, declaration: StmtId) -> Result<Option<String>> {
    let kernel = match unit.okl_kernel_of(declaration) {
        Some(kernel) => kernel,
        None => return Ok(None),
    };
    let name = unit.kernel_name(kernel);
    let bounds = match find_kernel(&unit.kernels, &name) {
        Some(info) => info.inner_bounds.clone(),
        None => vec![],
    };
    let tree = &mut unit.tree;
    let location = tree.var(var).location;
    if bounds.is_empty() {
        let msg = format!("kernel `{name}` has no inner loops to privatize over");
        return Err(CompileError::emit(location, msg));
    }
    if tree.var(var).is_array() && tree.var(var).init.is_some() {
        let msg = format!(
            "initialized array `{}` cannot be given per-iteration storage",
            tree.var(var).name
        );
        return Err(CompileError::emit(location, msg));
    }
    let var_name = tree.var(var).name.clone();
    let users = statements_using(tree, var)
        .into_iter()
        .filter(|user| *user != declaration)
        .collect::<Vec<StmtId>>();
    for user in users {
        let index = parse_nodes(&iteration_index(tree, user, &bounds)?)?;
        rewrite_nodes(tree, user, &mut |nodes| {
            index_identifier(nodes, &var_name, &index);
        });
    }
    let size = bounds.iter().map(|b| wrap(b)).collect::<Vec<String>>().join(" * ");
    let var = tree.var_mut(var);
    var.dims.insert(0, parse_nodes(&size)?);
    var.qualifiers.exclusive = false;
    var.qualifiers.constant = false;
    debug!("Privatized `{var_name}` over {size} inner iterations");
    Ok(var.init.take().map(|init| to_source(&init)))
}

/// Initialize every element of a privatized variable right after
/// `declaration`.
pub(crate) fn initialize_elements(
    unit: &mut Unit,
    var: VarId,
    declaration: StmtId,
    init: &str,
) -> Result<()> {
    let tree = &mut unit.tree;
    let (parent, index) = match (tree.parent(declaration), tree.index_in_parent(declaration)) {
        (Some(parent), Some(index)) => (parent, index),
        _ => return Ok(()),
    };
    let var = tree.var(var);
    let size = match var.dims.first() {
        Some(size) => to_source(size),
        None => return Ok(()),
    };
    let src = format!(
        "for (int occaExclusiveIndex = 0; occaExclusiveIndex < {size}; ++occaExclusiveIndex) {{ {}[occaExclusiveIndex] = {init}; }}",
        var.name
    );
    insert_source(tree, parent, index + 1, &src, unit.config.tables.as_ref())?;
    Ok(())
}

fn exclusive_vars(unit: &Unit, id: StmtId) -> Vec<VarId> {
    let statement = unit.tree.get(id);
    if statement.kind != StatementKind::Declaration {
        return vec![];
    }
    statement
        .vars
        .iter()
        .copied()
        .filter(|v| unit.tree.var(*v).qualifiers.exclusive)
        .collect()
}

impl Rewrite for ExclusiveStorage {
    fn name(&self) -> &'static str {
        "privatize_exclusive::ExclusiveStorage"
    }
    fn is_match(&self, unit: &Unit, id: StmtId) -> Result<bool> {
        Ok(unit.okl_kernel_of(id).is_some() && !exclusive_vars(unit, id).is_empty())
    }
    fn rewrite(&self, unit: &mut Unit, id: StmtId) -> Result<RewriteResult> {
        let vars = exclusive_vars(unit, id);
        if unit.config.backend.is_gpu() {
            for var in vars {
                unit.tree.var_mut(var).qualifiers.exclusive = false;
            }
            return Ok(RewriteResult::Changed(id));
        }
        // Initializer loops go right after the declaration, so the last
        // variable is placed first to keep declaration order.
        let mut inits = vec![];
        for var in vars {
            if let Some(init) = privatize(unit, var, id)? {
                inits.push((var, init));
            }
        }
        for (var, init) in inits.iter().rev() {
            initialize_elements(unit, *var, id, init)?;
        }
        Ok(RewriteResult::Changed(id))
    }
}

pub struct PrivatizeExclusive;

impl Pass for PrivatizeExclusive {
    const NAME: &'static str = "okl-privatize-exclusive";
    fn convert(unit: &mut Unit) -> Result<RewriteResult> {
        let rewrites: Vec<&dyn Rewrite> = vec![&ExclusiveStorage];
        apply_rewrites(unit, &rewrites)
    }
}

//! Kernel and loop classification.
//!
//! Tags `for` loops with their parallel role, marks native kernels and
//! rejects ill-formed loop nests before any pass rewrites the tree.

use crate::analysis::KernelInfo;
use crate::analysis::KernelInfoMap;
use crate::analysis::LoopHeader;
use crate::error::CompileError;
use crate::frontend::flatten;
use crate::frontend::split_top_level;
use crate::frontend::to_source;
use crate::frontend::LanguageTables;
use crate::frontend::Location;
use crate::frontend::Node;
use crate::ir::statements_using;
use crate::ir::LoopRole;
use crate::ir::LoopTag;
use crate::ir::StatementKind;
use crate::ir::StatementTree;
use crate::ir::StmtId;
use anyhow::Result;
use std::collections::BTreeSet;
use tracing::debug;
use tracing::warn;

/// Tag loops, detect native kernels and validate every kernel.
pub fn classify(tree: &mut StatementTree, tables: &LanguageTables) -> Result<KernelInfoMap> {
    tag_loops(tree)?;
    let mut map = KernelInfoMap::new();
    for kernel in tree.kernels() {
        let info = if is_native(tree, kernel, tables) {
            mark_native(tree, kernel)
        } else {
            validate_kernel(tree, kernel)?;
            describe_kernel(tree, kernel)?
        };
        debug!("Classified {info}");
        map.insert(info.name.clone(), info);
    }
    Ok(map)
}

fn kernel_name(tree: &StatementTree, kernel: StmtId) -> String {
    match &tree.get(kernel).function {
        Some(sig) => sig.name.clone(),
        None => String::new(),
    }
}

fn tag_loops(tree: &mut StatementTree) -> Result<()> {
    for id in tree.descendants(tree.root()) {
        if tree.kind(id) != StatementKind::For {
            continue;
        }
        let location = tree.get(id).location;
        let clauses = split_top_level(&tree.get(id).nodes, ";");
        if clauses.len() > 4 {
            let msg = format!("`for` header with {} clauses", clauses.len());
            return Err(CompileError::semantic(location, msg));
        }
        if clauses.len() < 4 {
            continue;
        }
        let text = to_source(&clauses[3]);
        let in_kernel = tree
            .function_of(id)
            .is_some_and(|f| tree.get(f).is_kernel());
        if !in_kernel {
            let msg = format!("loop tag `{text}` outside a kernel");
            return Err(CompileError::semantic(location, msg));
        }
        match LoopTag::parse(&text) {
            Some(tag) => tree.get_mut(id).loop_tag = Some(tag),
            None => {
                let msg = format!("unknown loop tag `{text}`");
                return Err(CompileError::semantic(location, msg));
            }
        }
    }
    Ok(())
}

/// Tokens of the statement itself, including declarator dimensions and
/// initializers.
fn statement_nodes(tree: &StatementTree, id: StmtId) -> Vec<Node> {
    let statement = tree.get(id);
    let mut nodes = statement.nodes.clone();
    for var in &statement.vars {
        let var = tree.var(*var);
        for dim in &var.dims {
            nodes.extend(dim.iter().cloned());
        }
        if let Some(init) = &var.init {
            nodes.extend(init.iter().cloned());
        }
    }
    nodes
}

/// Whether the kernel is written with backend identifiers such as
/// `threadIdx` or `occaOuterFor0`.
pub fn is_native(tree: &StatementTree, kernel: StmtId, tables: &LanguageTables) -> bool {
    tree.descendants(kernel).into_iter().any(|id| {
        flatten(&statement_nodes(tree, id))
            .iter()
            .any(|t| t.is_identifier() && tables.is_native(&t.lexeme))
    })
}

fn mark_native(tree: &mut StatementTree, kernel: StmtId) -> KernelInfo {
    let name = kernel_name(tree, kernel);
    let tagged = tree
        .descendants(kernel)
        .into_iter()
        .filter(|id| tree.get(*id).loop_tag.is_some())
        .collect::<Vec<StmtId>>();
    if !tagged.is_empty() {
        warn!("Kernel `{name}` mixes native code with OKL loops; compiling it as a native kernel");
    }
    for id in tagged {
        tree.get_mut(id).loop_tag = None;
    }
    if let Some(sig) = tree.get_mut(kernel).function.as_mut() {
        sig.native = true;
    }
    KernelInfo {
        native: true,
        ..KernelInfo::new(&name)
    }
}

fn tagged_loops(tree: &StatementTree, kernel: StmtId) -> Vec<StmtId> {
    tree.descendants(kernel)
        .into_iter()
        .filter(|id| tree.get(*id).loop_tag.is_some())
        .collect()
}

fn dims(tree: &StatementTree, loops: &[StmtId], role: LoopRole) -> BTreeSet<usize> {
    loops
        .iter()
        .filter_map(|id| tree.get(*id).loop_tag)
        .filter(|tag| tag.role == role)
        .map(|tag| tag.dim)
        .collect()
}

fn check_contiguous(
    dims: &BTreeSet<usize>,
    role: LoopRole,
    name: &str,
    location: Location,
) -> Result<()> {
    if let Some(max) = dims.last() {
        if max + 1 != dims.len() {
            let used = dims.iter().map(|d| d.to_string()).collect::<Vec<_>>();
            let msg = format!(
                "{} loops of kernel `{name}` use dimensions {{{}}}; expected 0..{}",
                role.name(),
                used.join(", "),
                dims.len() - 1
            );
            return Err(CompileError::semantic(location, msg));
        }
    }
    Ok(())
}

pub fn validate_kernel(tree: &StatementTree, kernel: StmtId) -> Result<()> {
    let name = kernel_name(tree, kernel);
    let location = tree.get(kernel).location;
    let loops = tagged_loops(tree, kernel);
    let has = |role: LoopRole| loops.iter().any(|id| tree.get(*id).is_loop(role));
    if has(LoopRole::Global) && (has(LoopRole::Outer) || has(LoopRole::Inner)) {
        let msg = format!("kernel `{name}` mixes global loops with outer/inner loops");
        return Err(CompileError::semantic(location, msg));
    }
    if !has(LoopRole::Outer) && !has(LoopRole::Global) {
        let msg = format!("kernel `{name}` has no outer loop");
        return Err(CompileError::semantic(location, msg));
    }
    for id in &loops {
        let statement = tree.get(*id);
        let tag = match statement.loop_tag {
            Some(tag) => tag,
            None => continue,
        };
        let location = statement.location;
        match tag.role {
            LoopRole::Inner if tree.enclosing_loops(*id, LoopRole::Outer).is_empty() => {
                let msg = format!("{tag} loop is not nested inside an outer loop");
                return Err(CompileError::semantic(location, msg));
            }
            LoopRole::Outer if !tree.enclosing_loops(*id, LoopRole::Inner).is_empty() => {
                let msg = format!("{tag} loop is nested inside an inner loop");
                return Err(CompileError::semantic(location, msg));
            }
            _ => (),
        }
        let reused = tree
            .enclosing_loops(*id, tag.role)
            .iter()
            .any(|a| tree.get(*a).loop_tag == Some(tag));
        if reused {
            let msg = format!("{tag} is used twice in one loop nest");
            return Err(CompileError::semantic(location, msg));
        }
        LoopHeader::parse(tree, *id)?;
    }
    let outer = dims(tree, &loops, LoopRole::Outer);
    let inner = dims(tree, &loops, LoopRole::Inner);
    check_contiguous(&outer, LoopRole::Outer, &name, location)?;
    check_contiguous(&inner, LoopRole::Inner, &name, location)?;
    check_contiguous(&dims(tree, &loops, LoopRole::Global), LoopRole::Global, &name, location)?;
    if has(LoopRole::Outer) && outer.len() != inner.len() {
        let msg = format!(
            "kernel `{name}` has {}D outer loops but {}D inner loops",
            outer.len(),
            inner.len()
        );
        return Err(CompileError::semantic(location, msg));
    }
    validate_storage(tree, kernel)
}

/// Shared and exclusive variables live in an outer loop, outside inner loops.
fn validate_storage(tree: &StatementTree, kernel: StmtId) -> Result<()> {
    for id in tree.descendants(kernel) {
        if tree.kind(id) != StatementKind::Declaration {
            continue;
        }
        for var_id in &tree.get(id).vars {
            let var = tree.var(*var_id);
            let kind = match (var.qualifiers.shared, var.qualifiers.exclusive) {
                (true, _) => "shared",
                (_, true) => "exclusive",
                _ => continue,
            };
            let in_outer = !tree.enclosing_loops(id, LoopRole::Outer).is_empty();
            let in_inner = !tree.enclosing_loops(id, LoopRole::Inner).is_empty();
            if !in_outer || in_inner {
                let msg = format!(
                    "{kind} variable `{}` must be declared inside an outer loop and outside inner loops",
                    var.name
                );
                return Err(CompileError::semantic(var.location, msg));
            }
            if kind != "exclusive" {
                continue;
            }
            for user in statements_using(tree, *var_id) {
                if user != id && tree.enclosing_loops(user, LoopRole::Inner).is_empty() {
                    let msg = format!("exclusive variable `{}` used outside an inner loop", var.name);
                    return Err(CompileError::semantic(tree.get(user).location, msg));
                }
            }
        }
    }
    Ok(())
}

/// Bounds per dimension, taken from the first loop with each dimension.
fn bounds(tree: &StatementTree, loops: &[StmtId], role: LoopRole) -> Result<Vec<String>> {
    let mut out = vec![];
    for dim in dims(tree, loops, role) {
        let first = loops
            .iter()
            .find(|id| tree.get(**id).loop_tag == Some(LoopTag::new(role, dim)));
        if let Some(first) = first {
            out.push(LoopHeader::parse(tree, *first)?.count());
        }
    }
    Ok(out)
}

/// Compute the launch metadata of a validated kernel.
///
/// Inner bounds come from the first inner loop nest.
pub fn describe_kernel(tree: &StatementTree, kernel: StmtId) -> Result<KernelInfo> {
    let mut info = KernelInfo::new(&kernel_name(tree, kernel));
    let loops = tagged_loops(tree, kernel);
    let is_global = loops.iter().any(|id| tree.get(*id).is_loop(LoopRole::Global));
    let outer_role = if is_global {
        LoopRole::Global
    } else {
        LoopRole::Outer
    };
    info.outer_bounds = bounds(tree, &loops, outer_role)?;
    info.outer_dims = info.outer_bounds.len();
    let first_inner = loops.iter().find(|id| {
        tree.get(**id).is_loop(LoopRole::Inner)
            && tree.enclosing_loops(**id, LoopRole::Inner).is_empty()
    });
    if let Some(first) = first_inner {
        let mut nest = vec![*first];
        nest.extend(
            tree.descendants(*first)
                .into_iter()
                .filter(|id| tree.get(*id).is_loop(LoopRole::Inner)),
        );
        info.inner_bounds = bounds(tree, &nest, LoopRole::Inner)?;
        info.inner_dims = info.inner_bounds.len();
    }
    Ok(info)
}

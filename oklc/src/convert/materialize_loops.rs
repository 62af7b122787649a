use crate::analysis::wrap;
use crate::analysis::LoopHeader;
use crate::config::Backend;
use crate::convert::apply_rewrites;
use crate::convert::contains_barrier;
use crate::convert::Pass;
use crate::convert::Rewrite;
use crate::convert::RewriteResult;
use crate::convert::Unit;
use crate::error::CompileError;
use crate::frontend::evaluate_constant;
use crate::frontend::flatten;
use crate::frontend::parse_nodes;
use crate::frontend::to_source;
use crate::frontend::Node;
use crate::frontend::Token;
use crate::frontend::TokenKind;
use crate::ir::uses_in_subtree;
use crate::ir::LoopRole;
use crate::ir::StatementKind;
use crate::ir::StatementTree;
use crate::ir::StmtId;
use crate::ir::Var;
use crate::ir::VarId;
use crate::targ3t;
use anyhow::Result;
use tracing::debug;

fn is_tagged_loop(unit: &Unit, id: StmtId) -> bool {
    unit.tree.kind(id) == StatementKind::For
        && unit.tree.get(id).loop_tag.is_some()
        && unit.okl_kernel_of(id).is_some()
}

/// Replace a parallel loop by the index of the current thread.
///
/// On CUDA
/// ```c
/// for (int i = 0; i < n; ++i; inner0) { a[i] = 0; }
/// ```
/// becomes
/// ```c
/// {
///   const int i = threadIdx.x;
///   if (i < n) {
///     a[i] = 0;
///   }
/// }
/// ```
/// Outer loops are not guarded, since the grid matches their iteration
/// count. Neither are loops holding a barrier, which every thread of the
/// block must reach.
struct GpuLoop;

impl Rewrite for GpuLoop {
    fn name(&self) -> &'static str {
        "materialize_loops::GpuLoop"
    }
    fn is_match(&self, unit: &Unit, id: StmtId) -> Result<bool> {
        Ok(is_tagged_loop(unit, id))
    }
    fn rewrite(&self, unit: &mut Unit, id: StmtId) -> Result<RewriteResult> {
        let header = LoopHeader::parse(&unit.tree, id)?;
        let tag = match unit.tree.get(id).loop_tag {
            Some(tag) => tag,
            None => return Ok(RewriteResult::Unchanged),
        };
        let thread_id = match targ3t::loop_id(unit.config.backend, tag) {
            Some(thread_id) => thread_id,
            None => return Ok(RewriteResult::Unchanged),
        };
        let value = parse_nodes(&header.value_at(&thread_id))?;
        let tree = &mut unit.tree;
        let guarded = tag.role != LoopRole::Outer && !contains_barrier(tree, id);
        let location = tree.get(id).location;
        let vars = {
            let statement = tree.get_mut(id);
            statement.kind = StatementKind::Block;
            statement.nodes.clear();
            statement.loop_tag = None;
            statement.hint = None;
            std::mem::take(&mut statement.vars)
        };
        if guarded {
            let condition = parse_nodes(&header.condition())?;
            let guard = tree.alloc(StatementKind::If, condition, location);
            for child in tree.children(id).to_vec() {
                tree.detach(child);
                tree.attach(guard, child);
            }
            tree.attach(id, guard);
        }
        let init = match vars.as_slice() {
            [var] => {
                let declaration = tree.alloc(StatementKind::Declaration, vec![], location);
                let descriptor = tree.var_mut(*var);
                descriptor.init = Some(value);
                descriptor.qualifiers.constant = true;
                descriptor.declared_in = declaration;
                tree.get_mut(declaration).vars = vars;
                declaration
            }
            _ => {
                let mut nodes = vec![
                    Node::Token(Token::identifier(&header.iterator)),
                    Node::Token(Token::operator("=")),
                ];
                nodes.extend(value);
                tree.alloc(StatementKind::Expression, nodes, location)
            }
        };
        tree.insert(id, 0, init);
        debug!("Mapped {tag} loop over `{}` to {thread_id}", header.iterator);
        Ok(RewriteResult::Changed(id))
    }
}

/// Backend qualifiers on functions, parameters and globals, and checks on
/// shared memory.
fn finish_gpu(unit: &mut Unit) -> Result<bool> {
    let backend = unit.config.backend;
    let mut changed = false;
    for function in unit.tree.functions() {
        let okl = unit.okl_kernel_of(function).is_some();
        let tree = &mut unit.tree;
        let sig = match tree.get(function).function.clone() {
            Some(sig) => sig,
            None => continue,
        };
        if sig.launcher {
            continue;
        }
        if backend == Backend::CUDA && !sig.is_kernel {
            if !sig.qualifiers.iter().any(|q| q == "__device__") {
                if let Some(sig) = tree.get_mut(function).function.as_mut() {
                    sig.qualifiers.insert(0, "__device__".to_string());
                    changed = true;
                }
            }
            continue;
        }
        if backend == Backend::OpenCL && sig.is_kernel {
            for param in &sig.params {
                let var = tree.var_mut(*param);
                if var.pointer > 0 && var.qualifiers.address_space.is_none() {
                    var.qualifiers.address_space = Some("__global".to_string());
                    changed = true;
                }
            }
        }
        if okl {
            check_shared_sizes(tree, function)?;
        }
    }
    if backend == Backend::OpenCL {
        let tree = &mut unit.tree;
        for statement in tree.children(tree.root()).to_vec() {
            if tree.kind(statement) != StatementKind::Declaration {
                continue;
            }
            for var in tree.get(statement).vars.clone() {
                let var = tree.var_mut(var);
                if var.qualifiers.constant && var.qualifiers.address_space.is_none() {
                    var.qualifiers.address_space = Some("__constant".to_string());
                    changed = true;
                }
            }
        }
    }
    Ok(changed)
}

fn check_shared_sizes(tree: &StatementTree, kernel: StmtId) -> Result<()> {
    for id in tree.descendants(kernel) {
        if tree.kind(id) != StatementKind::Declaration {
            continue;
        }
        for var in &tree.get(id).vars {
            let var = tree.var(*var);
            if !var.qualifiers.shared {
                continue;
            }
            for dim in &var.dims {
                if evaluate_constant(&flatten(dim)).is_err() {
                    let msg = format!(
                        "shared array `{}` needs a constant size, got `{}`",
                        var.name,
                        to_source(dim)
                    );
                    return Err(CompileError::emit(var.location, msg));
                }
            }
        }
    }
    Ok(())
}

/// Split an inner loop at its top-level barriers.
///
/// Threads run one after the other on CPU backends, so
/// ```c
/// for (int i = 0; i < 16; ++i; inner0) { s[i] = a[i]; barrier(localMemFence); b[i] = s[15 - i]; }
/// ```
/// becomes two inner loops with the same header. When the loop itself sits
/// in an inner loop, a barrier stays between the pieces so that the
/// enclosing loop is split next.
struct SplitInnerLoop;

fn has_direct_barrier(tree: &StatementTree, id: StmtId) -> bool {
    tree.children(id)
        .iter()
        .any(|c| tree.kind(*c) == StatementKind::Barrier)
}

impl Rewrite for SplitInnerLoop {
    fn name(&self) -> &'static str {
        "materialize_loops::SplitInnerLoop"
    }
    fn is_match(&self, unit: &Unit, id: StmtId) -> Result<bool> {
        Ok(is_tagged_loop(unit, id)
            && unit.tree.get(id).is_loop(LoopRole::Inner)
            && has_direct_barrier(&unit.tree, id))
    }
    fn rewrite(&self, unit: &mut Unit, id: StmtId) -> Result<RewriteResult> {
        let tree = &mut unit.tree;
        let parent_is_inner = tree
            .parent(id)
            .is_some_and(|p| tree.get(p).is_loop(LoopRole::Inner));
        let mut segments: Vec<Vec<StmtId>> = vec![vec![]];
        let mut fences = vec![];
        for child in tree.children(id).to_vec() {
            if tree.kind(child) == StatementKind::Barrier {
                tree.detach(child);
                fences.push(tree.get(child).nodes.clone());
                segments.push(vec![]);
            } else if let Some(segment) = segments.last_mut() {
                segment.push(child);
            }
        }
        let original = tree.get(id).clone();
        let mut anchor = id;
        for (k, segment) in segments.into_iter().enumerate().skip(1) {
            if segment.is_empty() {
                continue;
            }
            if parent_is_inner {
                let fence = fences.get(k - 1).cloned().unwrap_or_default();
                let barrier = tree.alloc(StatementKind::Barrier, fence, original.location);
                tree.insert_after(anchor, barrier);
                anchor = barrier;
            }
            let piece = tree.alloc(StatementKind::For, original.nodes.clone(), original.location);
            tree.get_mut(piece).loop_tag = original.loop_tag;
            tree.get_mut(piece).hint = original.hint;
            let mut vars = vec![];
            for var in &original.vars {
                let mut copy: Var = tree.var(*var).clone();
                copy.declared_in = piece;
                let copy = tree.add_var(copy);
                tree.declare(piece, copy)?;
                vars.push(copy);
            }
            tree.get_mut(piece).vars = vars;
            for statement in segment {
                tree.detach(statement);
                tree.attach(piece, statement);
                if tree.kind(statement) != StatementKind::Declaration {
                    continue;
                }
                for var in tree.get(statement).vars.clone() {
                    let name = tree.var(var).name.clone();
                    tree.undeclare(id, &name);
                    tree.declare(piece, var)?;
                }
            }
            tree.insert_after(anchor, piece);
            anchor = piece;
        }
        debug!("Split inner loop at line {}", original.location.line());
        Ok(RewriteResult::Changed(id))
    }
}

/// Drop a barrier outside inner loops; the serial order already provides
/// the synchronization.
struct DropBarrier;

impl Rewrite for DropBarrier {
    fn name(&self) -> &'static str {
        "materialize_loops::DropBarrier"
    }
    fn is_match(&self, unit: &Unit, id: StmtId) -> Result<bool> {
        Ok(unit.tree.kind(id) == StatementKind::Barrier && unit.okl_kernel_of(id).is_some())
    }
    fn rewrite(&self, unit: &mut Unit, id: StmtId) -> Result<RewriteResult> {
        let tree = &mut unit.tree;
        if !tree.enclosing_loops(id, LoopRole::Inner).is_empty() {
            let msg = format!(
                "barrier nested in a statement of an inner loop cannot be expressed on {}",
                unit.config.backend
            );
            return Err(CompileError::emit(tree.get(id).location, msg));
        }
        let parent = tree.parent(id).unwrap_or(tree.root());
        tree.detach(id);
        Ok(RewriteResult::Changed(parent))
    }
}

/// Turn a parallel loop nest into plain `for` loops.
///
/// The outermost parallel loop gets `#pragma omp parallel for` on OpenMP.
/// On Pthreads its iterations are dealt out over the threads:
/// ```c
/// for (int i = occaThreadRank; i < n; i += occaThreadCount) {
/// ```
struct CpuLoop;

/// A parallel loop that no other parallel loop encloses.
fn is_outermost(tree: &StatementTree, id: StmtId) -> bool {
    tree.get(id).loop_tag.is_some()
        && tree
            .ancestors(id)
            .iter()
            .all(|a| tree.get(*a).loop_tag.is_none())
}

/// Scalars of `kernel` that are declared outside the nest at `id` and
/// written inside it.
///
/// Every iteration of the nest needs its own copy, so on OpenMP these go
/// into a `private` clause.
fn private_names(tree: &StatementTree, kernel: StmtId, id: StmtId) -> Vec<String> {
    let mut written = uses_in_subtree(tree, id)
        .into_iter()
        .filter(|u| u.access.writes())
        .map(|u| u.var)
        .collect::<Vec<VarId>>();
    written.sort();
    written.dedup();
    written
        .into_iter()
        .map(|var| tree.var(var))
        .filter(|var| {
            let site = var.declared_in;
            let ancestors = tree.ancestors(site);
            var.dims.is_empty()
                && site != kernel
                && site != id
                && ancestors.contains(&kernel)
                && !ancestors.contains(&id)
        })
        .map(|var| var.name.clone())
        .collect()
}

/// Add the `occaThreadRank` and `occaThreadCount` parameters.
fn add_thread_params(tree: &mut StatementTree, kernel: StmtId) -> Result<()> {
    if tree.get(kernel).scope.contains_key("occaThreadRank") {
        return Ok(());
    }
    let location = tree.get(kernel).location;
    let mut ids = vec![];
    for name in ["occaThreadRank", "occaThreadCount"] {
        let mut var = Var::new(name, "int");
        var.qualifiers.constant = true;
        var.declared_in = kernel;
        var.location = location;
        let id = tree.add_var(var);
        tree.declare(kernel, id)?;
        ids.push(id);
    }
    if let Some(sig) = tree.get_mut(kernel).function.as_mut() {
        sig.params.splice(0..0, ids);
    }
    Ok(())
}

impl Rewrite for CpuLoop {
    fn name(&self) -> &'static str {
        "materialize_loops::CpuLoop"
    }
    fn is_match(&self, unit: &Unit, id: StmtId) -> Result<bool> {
        Ok(is_tagged_loop(unit, id) && is_outermost(&unit.tree, id))
    }
    fn rewrite(&self, unit: &mut Unit, id: StmtId) -> Result<RewriteResult> {
        let header = LoopHeader::parse(&unit.tree, id)?;
        let kernel = match unit.okl_kernel_of(id) {
            Some(kernel) => kernel,
            None => return Ok(RewriteResult::Unchanged),
        };
        let backend = unit.config.backend;
        let private = private_names(&unit.tree, kernel, id);
        let tree = &mut unit.tree;
        let mut nest = vec![id];
        nest.extend(
            tree.descendants(id)
                .into_iter()
                .filter(|d| tree.get(*d).loop_tag.is_some()),
        );
        for tagged in nest {
            let plain = LoopHeader::plain_header(&tree.get(tagged).nodes);
            let statement = tree.get_mut(tagged);
            statement.nodes = plain;
            statement.loop_tag = None;
        }
        match backend {
            Backend::OpenMP => {
                let lexeme = if private.is_empty() {
                    "#pragma omp parallel for".to_string()
                } else {
                    format!("#pragma omp parallel for private({})", private.join(", "))
                };
                let token = Token::synthesized(TokenKind::Directive, &lexeme);
                let location = tree.get(id).location;
                let pragma = tree.alloc(StatementKind::Pragma, vec![Node::Token(token)], location);
                tree.insert_before(id, pragma);
            }
            Backend::Pthreads => {
                let start = header.value_at("occaThreadRank");
                let step = if header.stride == "1" {
                    "occaThreadCount".to_string()
                } else {
                    format!("{} * occaThreadCount", wrap(&header.stride))
                };
                let op = if header.increasing { "+=" } else { "-=" };
                let iterator = &header.iterator;
                let init = match &header.typ {
                    Some(typ) => format!("{typ} {iterator} = {start}"),
                    None => format!("{iterator} = {start}"),
                };
                let src = format!("{init}; {}; {iterator} {op} {step}", header.condition());
                tree.get_mut(id).nodes = parse_nodes(&src)?;
                if let Some(var) = tree.get(id).vars.first().copied() {
                    tree.var_mut(var).init = Some(parse_nodes(&start)?);
                }
                add_thread_params(tree, kernel)?;
            }
            _ => (),
        }
        Ok(RewriteResult::Changed(id))
    }
}

pub struct MaterializeLoops;

impl Pass for MaterializeLoops {
    const NAME: &'static str = "okl-materialize-loops";
    fn convert(unit: &mut Unit) -> Result<RewriteResult> {
        if unit.config.backend.is_gpu() {
            let rewrites: Vec<&dyn Rewrite> = vec![&GpuLoop];
            let result = apply_rewrites(unit, &rewrites)?;
            let finished = finish_gpu(unit)?;
            if finished && result.is_changed().is_none() {
                return Ok(RewriteResult::Changed(unit.tree.root()));
            }
            Ok(result)
        } else {
            let rewrites: Vec<&dyn Rewrite> = vec![&SplitInnerLoop, &DropBarrier, &CpuLoop];
            apply_rewrites(unit, &rewrites)
        }
    }
}

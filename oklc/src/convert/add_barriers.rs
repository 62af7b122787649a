use crate::config::BarrierPolicy;
use crate::convert::apply_rewrites;
use crate::convert::contains_barrier;
use crate::convert::Pass;
use crate::convert::Rewrite;
use crate::convert::RewriteResult;
use crate::convert::Unit;
use crate::error::CompileError;
use crate::frontend::to_source;
use crate::frontend::Delimiter;
use crate::frontend::LanguageTables;
use crate::frontend::Node;
use crate::frontend::Token;
use crate::ir::uses_in_statement;
use crate::ir::uses_in_subtree;
use crate::ir::LoopRole;
use crate::ir::StatementKind;
use crate::ir::StatementTree;
use crate::ir::StmtId;
use crate::ir::VarId;
use crate::ir::VarUse;
use anyhow::Result;
use std::collections::HashMap;
use std::collections::HashSet;
use tracing::debug;
use tracing::warn;

/// Insert `barrier(localMemFence)` between conflicting shared memory
/// accesses.
///
/// Two levels are checked. Between the statements of an outer loop body, a
/// shared variable written by one statement and accessed by a later one is
/// a hazard, since the two run in different inner iterations:
/// ```c
/// for (int j = 0; j < 16; ++j; inner0) { s[j] = a[j]; }
/// for (int j = 0; j < 16; ++j; inner0) { b[j] = s[15 - j]; }
/// ```
/// Inside one inner loop body, a write followed by an access with a
/// different subscript is a hazard as well:
/// ```c
/// s[j] = a[j];
/// b[j] = s[j + 1];
/// ```
/// A barrier is inserted in front of the second statement. An existing
/// barrier between the accesses resolves the hazard, so running the pass
/// again inserts nothing.
struct InsertBarrier;

fn is_shared(tree: &StatementTree, var: VarId) -> bool {
    tree.var(var).qualifiers.shared
}

/// Outer-loop code that runs once per thread block: inside an outer loop
/// and outside all inner loops.
fn is_outer_region(tree: &StatementTree, id: StmtId) -> bool {
    let statement = tree.get(id);
    if !statement.kind.is_compound() || statement.is_loop(LoopRole::Inner) {
        return false;
    }
    (statement.is_loop(LoopRole::Outer) || !tree.enclosing_loops(id, LoopRole::Outer).is_empty())
        && tree.enclosing_loops(id, LoopRole::Inner).is_empty()
}

/// First child of an outer-loop region that accesses shared memory written
/// by an earlier child.
///
/// In a sequential loop the body is scanned twice to also find hazards
/// between iterations. Those are resolved by a barrier at the end of the
/// body, which is returned as the index one past the last child.
fn outer_hazard(tree: &StatementTree, id: StmtId) -> Option<usize> {
    let children = tree.children(id);
    let repeats = matches!(
        tree.kind(id),
        StatementKind::For | StatementKind::While | StatementKind::DoWhile
    ) && !tree.get(id).is_loop(LoopRole::Outer);
    let passes = if repeats { 2 } else { 1 };
    let mut dirty: HashSet<VarId> = HashSet::new();
    for pass in 0..passes {
        for (i, child) in children.iter().enumerate() {
            if tree.kind(*child) == StatementKind::Barrier {
                dirty.clear();
                continue;
            }
            let uses = uses_in_subtree(tree, *child)
                .into_iter()
                .filter(|u| is_shared(tree, u.var))
                .collect::<Vec<_>>();
            if uses.iter().any(|u| dirty.contains(&u.var)) {
                return Some(if pass == 0 { i } else { children.len() });
            }
            if contains_barrier(tree, *child) && !tree.kind(*child).is_conditional() {
                dirty = trailing_writes(tree, *child);
            } else {
                dirty.extend(uses.iter().filter(|u| u.access.writes()).map(|u| u.var));
            }
        }
    }
    None
}

/// Shared variables that `id` writes after its last barrier.
///
/// A barrier inside a conditional may be skipped, so conditionals keep the
/// writes from before it.
fn trailing_writes(tree: &StatementTree, id: StmtId) -> HashSet<VarId> {
    let shared_writes = |uses: Vec<VarUse>| {
        uses.into_iter()
            .filter(|u| u.access.writes() && is_shared(tree, u.var))
            .map(|u| u.var)
            .collect::<Vec<VarId>>()
    };
    let mut written: HashSet<VarId> = shared_writes(uses_in_statement(tree, id))
        .into_iter()
        .collect();
    for child in tree.children(id) {
        let kind = tree.kind(*child);
        if kind == StatementKind::Barrier {
            written.clear();
        } else if !contains_barrier(tree, *child) || kind.is_conditional() {
            written.extend(shared_writes(uses_in_subtree(tree, *child)));
        } else {
            written = trailing_writes(tree, *child);
        }
    }
    written
}

impl Rewrite for InsertBarrier {
    fn name(&self) -> &'static str {
        "add_barriers::InsertBarrier"
    }
    fn is_match(&self, unit: &Unit, id: StmtId) -> Result<bool> {
        if unit.okl_kernel_of(id).is_none() {
            return Ok(false);
        }
        Ok(hazard(&unit.tree, id).is_some())
    }
    fn rewrite(&self, unit: &mut Unit, id: StmtId) -> Result<RewriteResult> {
        let index = match hazard(&unit.tree, id) {
            Some(index) => index,
            None => return Ok(RewriteResult::Unchanged),
        };
        let tree = &mut unit.tree;
        let children = tree.children(id);
        let location = match children.get(index).or(children.last()) {
            Some(anchor) => tree.get(*anchor).location,
            None => tree.get(id).location,
        };
        let fence = vec![Node::Token(Token::identifier("localMemFence"))];
        let barrier = tree.alloc(StatementKind::Barrier, fence, location);
        tree.insert(id, index, barrier);
        if unit.config.warn_missing_barriers {
            warn!("Inserted a missing barrier before line {}", location.line());
        } else {
            debug!("Inserted barrier before line {}", location.line());
        }
        Ok(RewriteResult::Changed(barrier))
    }
}

/// Whether `name`, seen from `scope`, has the same value in every thread of
/// a block.
fn is_uniform_name(tree: &StatementTree, scope: StmtId, name: &str, tables: &LanguageTables) -> bool {
    if matches!(name, "true" | "false" | "NULL" | "sizeof") || tables.is_reserved(name) {
        return true;
    }
    let var = match tree.resolve(scope, name) {
        Some(var) => tree.var(var),
        None => return tree.is_type_name(name),
    };
    if var.qualifiers.shared || var.qualifiers.exclusive {
        return false;
    }
    let declared_in = tree.get(var.declared_in);
    match (declared_in.kind, declared_in.loop_tag) {
        (StatementKind::Function, _) => true,
        // A sequential loop counter is uniform when its header is, and the
        // header is checked as a condition of its own.
        (StatementKind::For, None) => true,
        (StatementKind::For, Some(_)) => declared_in.is_loop(LoopRole::Outer),
        _ => tree.enclosing_loops(var.declared_in, LoopRole::Inner).is_empty(),
    }
}

/// First identifier in `nodes` that may differ between threads.
fn divergent_name(
    tree: &StatementTree,
    scope: StmtId,
    nodes: &[Node],
    tables: &LanguageTables,
) -> Option<String> {
    for (i, node) in nodes.iter().enumerate() {
        if let Node::Group(group) = node {
            if let Some(name) = divergent_name(tree, scope, &group.children, tables) {
                return Some(name);
            }
            continue;
        }
        let name = match node.identifier() {
            Some(name) => name,
            None => continue,
        };
        if i > 0 && (nodes[i - 1].is(".") || nodes[i - 1].is("->")) {
            continue;
        }
        if nodes.get(i + 1).is_some_and(|n| n.is_group(Delimiter::Paren)) {
            continue;
        }
        if !is_uniform_name(tree, scope, name, tables) {
            return Some(name.to_string());
        }
    }
    None
}

/// Conditions that decide whether `barrier` runs, nearest first.
fn guarding_conditions(tree: &StatementTree, barrier: StmtId) -> Vec<StmtId> {
    let mut guards = vec![];
    for ancestor in tree.ancestors(barrier) {
        let statement = tree.get(ancestor);
        match statement.kind {
            StatementKind::Function => break,
            StatementKind::ElseIf | StatementKind::Else => {
                guards.push(ancestor);
                let siblings = tree.parent(ancestor).map(|p| tree.children(p)).unwrap_or(&[]);
                let position = siblings.iter().position(|s| *s == ancestor).unwrap_or(0);
                for previous in siblings[..position].iter().rev() {
                    match tree.kind(*previous) {
                        StatementKind::ElseIf => guards.push(*previous),
                        StatementKind::If => {
                            guards.push(*previous);
                            break;
                        }
                        _ => break,
                    }
                }
            }
            StatementKind::For if statement.loop_tag.is_none() => guards.push(ancestor),
            kind if kind.is_conditional() => guards.push(ancestor),
            _ => (),
        }
    }
    guards
}

/// Reject barriers that only some threads of a block would reach.
fn check_divergence(unit: &Unit) -> Result<()> {
    let tree = &unit.tree;
    let tables = unit.config.tables.as_ref();
    for barrier in tree.descendants(tree.root()) {
        if tree.kind(barrier) != StatementKind::Barrier || unit.okl_kernel_of(barrier).is_none() {
            continue;
        }
        for guard in guarding_conditions(tree, barrier) {
            let nodes = &tree.get(guard).nodes;
            let name = match divergent_name(tree, guard, nodes, tables) {
                Some(name) => name,
                None => continue,
            };
            let msg = format!(
                "barrier inside a divergent conditional: `{}` depends on `{name}`",
                to_source(nodes)
            );
            let location = tree.get(barrier).location;
            match unit.config.barrier_policy {
                BarrierPolicy::Error => return Err(CompileError::semantic(location, msg)),
                BarrierPolicy::Warn => warn!("line {}: {msg}", location.line()),
            }
        }
    }
    Ok(())
}

pub struct AddBarriers;

impl Pass for AddBarriers {
    const NAME: &'static str = "okl-add-barriers";
    fn convert(unit: &mut Unit) -> Result<RewriteResult> {
        let rewrites: Vec<&dyn Rewrite> = vec![&InsertBarrier];
        let result = apply_rewrites(unit, &rewrites)?;
        check_divergence(unit)?;
        Ok(result)
    }
}

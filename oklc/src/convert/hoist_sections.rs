use crate::convert::apply_rewrites;
use crate::convert::privatize_exclusive::privatize;
use crate::convert::rewrite_nodes;
use crate::convert::Pass;
use crate::convert::Rewrite;
use crate::convert::RewriteResult;
use crate::convert::Unit;
use crate::error::CompileError;
use crate::frontend::rename_identifier;
use crate::frontend::Node;
use crate::frontend::Token;
use crate::ir::statements_using;
use crate::ir::LoopRole;
use crate::ir::StatementKind;
use crate::ir::StatementTree;
use crate::ir::StmtId;
use crate::ir::VarId;
use anyhow::Result;
use std::collections::HashMap;
use tracing::debug;

/// Move declarations whose variables live across a barrier to the top of
/// the kernel.
///
/// Barriers split a kernel into sections. On CPU backends every section of
/// an inner loop becomes a loop of its own, so a variable declared in one
/// section and used in a later one would go out of scope:
/// ```c
/// for (int i = 0; i < 16; ++i; inner0) {
///   float t = a[i];
///   barrier(localMemFence);
///   b[i] = t;
/// }
/// ```
/// The declaration moves to the top of the kernel body (GPU) or of the
/// outermost outer loop (CPU) and its initializer stays in place as an
/// assignment. The variable keeps its identity and type.
struct HoistDeclaration;

/// Section number of every statement in the body of `kernel`.
fn sections(tree: &StatementTree, kernel: StmtId) -> HashMap<StmtId, usize> {
    let mut section = 0;
    let mut out = HashMap::new();
    for id in tree.descendants(kernel) {
        if tree.kind(id) == StatementKind::Barrier {
            section += 1;
        }
        out.insert(id, section);
    }
    out
}

/// The statement the declaration of a variable used across sections moves
/// into.
fn target(unit: &Unit, kernel: StmtId, declaration: StmtId) -> Option<StmtId> {
    if unit.config.backend.is_gpu() {
        unit.tree.body(kernel)
    } else {
        unit.tree
            .enclosing_loops(declaration, LoopRole::Outer)
            .last()
            .copied()
    }
}

/// A variable of `declaration` to hoist, with its destination.
fn hoistable(unit: &Unit, declaration: StmtId) -> Option<(VarId, StmtId)> {
    let tree = &unit.tree;
    if tree.kind(declaration) != StatementKind::Declaration {
        return None;
    }
    let kernel = unit.okl_kernel_of(declaration)?;
    let target = target(unit, kernel, declaration)?;
    if tree.parent(declaration) == Some(target) {
        return None;
    }
    let sections = sections(tree, kernel);
    let home = sections.get(&declaration)?;
    tree.get(declaration)
        .vars
        .iter()
        .copied()
        .find(|var| {
            !tree.var(*var).qualifiers.shared
                && statements_using(tree, *var)
                    .iter()
                    .any(|user| sections.get(user) != Some(home))
        })
        .map(|var| (var, target))
}

/// A name for `name` that neither `target` nor the scopes around `from`
/// resolve.
fn fresh_name(tree: &StatementTree, target: StmtId, from: StmtId, name: &str) -> String {
    let taken = |candidate: &str| {
        tree.resolve(target, candidate).is_some() || tree.resolve(from, candidate).is_some()
    };
    let mut n = 0;
    loop {
        let candidate = format!("{name}_{n}");
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

impl Rewrite for HoistDeclaration {
    fn name(&self) -> &'static str {
        "hoist_sections::HoistDeclaration"
    }
    fn is_match(&self, unit: &Unit, id: StmtId) -> Result<bool> {
        Ok(hoistable(unit, id).is_some())
    }
    fn rewrite(&self, unit: &mut Unit, declaration: StmtId) -> Result<RewriteResult> {
        let (var, target) = match hoistable(unit, declaration) {
            Some(found) => found,
            None => return Ok(RewriteResult::Unchanged),
        };
        let from_inner = !unit
            .tree
            .enclosing_loops(declaration, LoopRole::Inner)
            .is_empty();
        let tree = &mut unit.tree;
        let parent = match tree.parent(declaration) {
            Some(parent) => parent,
            None => return Ok(RewriteResult::Unchanged),
        };
        let location = tree.var(var).location;
        if tree.var(var).is_array() && tree.var(var).init.is_some() {
            let msg = format!(
                "initialized array `{}` is used across a barrier",
                tree.var(var).name
            );
            return Err(CompileError::emit(location, msg));
        }

        let name = tree.var(var).name.clone();
        let users = statements_using(tree, var)
            .into_iter()
            .filter(|user| *user != declaration)
            .collect::<Vec<StmtId>>();
        tree.undeclare(parent, &name);
        let outer_scope = tree.parent(parent).unwrap_or(parent);
        let conflict = tree.resolve(outer_scope, &name).is_some()
            || tree.get(target).scope.contains_key(&name);
        let name = if conflict {
            let fresh = fresh_name(tree, target, parent, &name);
            for user in &users {
                rewrite_nodes(tree, *user, &mut |nodes| {
                    rename_identifier(nodes, &name, &fresh);
                });
            }
            fresh
        } else {
            name
        };

        // Split the declaration around the hoisted variable.
        let vars = tree.get(declaration).vars.clone();
        let position = vars.iter().position(|v| *v == var).unwrap_or(0);
        let after = vars[position + 1..].to_vec();
        tree.get_mut(declaration).vars = vars[..position].to_vec();
        let mut placed = vec![];
        if let Some(init) = tree.var_mut(var).init.take() {
            let mut nodes = vec![
                Node::Token(Token::identifier(&name)),
                Node::Token(Token::operator("=")),
            ];
            nodes.extend(init);
            placed.push(tree.alloc(StatementKind::Expression, nodes, location));
        }
        if !after.is_empty() {
            let rest = tree.alloc(StatementKind::Declaration, vec![], tree.get(declaration).location);
            for v in &after {
                tree.var_mut(*v).declared_in = rest;
            }
            tree.get_mut(rest).vars = after;
            placed.push(rest);
        }
        let mut anchor = declaration;
        for statement in placed {
            tree.insert_after(anchor, statement);
            anchor = statement;
        }
        if tree.get(declaration).vars.is_empty() {
            tree.detach(declaration);
        }

        let hoisted = tree.alloc(StatementKind::Declaration, vec![], location);
        {
            let descriptor = tree.var_mut(var);
            descriptor.name = name.clone();
            descriptor.declared_in = hoisted;
            descriptor.qualifiers.constant = false;
        }
        tree.get_mut(hoisted).vars = vec![var];
        let leading = tree
            .children(target)
            .iter()
            .take_while(|c| tree.kind(**c) == StatementKind::Declaration)
            .count();
        tree.insert(target, leading, hoisted);
        tree.declare(target, var)?;
        debug!("Hoisted `{name}` to line {}", tree.get(target).location.line());

        if from_inner && !unit.config.backend.is_gpu() {
            privatize(unit, var, hoisted)?;
        }
        Ok(RewriteResult::Changed(hoisted))
    }
}

pub struct HoistSections;

impl Pass for HoistSections {
    const NAME: &'static str = "okl-hoist-sections";
    fn convert(unit: &mut Unit) -> Result<RewriteResult> {
        let rewrites: Vec<&dyn Rewrite> = vec![&HoistDeclaration];
        apply_rewrites(unit, &rewrites)
    }
}

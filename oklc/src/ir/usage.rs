use crate::frontend::to_source;
use crate::frontend::Delimiter;
use crate::frontend::Node;
use crate::ir::StatementKind;
use crate::ir::StatementTree;
use crate::ir::StmtId;
use crate::ir::VarId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

impl Access {
    pub fn reads(&self) -> bool {
        matches!(self, Access::Read | Access::ReadWrite)
    }
    pub fn writes(&self) -> bool {
        matches!(self, Access::Write | Access::ReadWrite)
    }
}

/// One occurrence of a variable in a statement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VarUse {
    pub var: VarId,
    pub statement: StmtId,
    pub access: Access,
    /// Subscripts directly following the use, such as `[i][0]`.
    pub index: String,
}

const COMPOUND_ASSIGNMENTS: &[&str] = &[
    "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "<<=", ">>=", "++", "--",
];

fn collect(tree: &StatementTree, statement: StmtId, nodes: &[Node], out: &mut Vec<VarUse>) {
    for (i, node) in nodes.iter().enumerate() {
        if let Node::Group(group) = node {
            collect(tree, statement, &group.children, out);
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
        let var = match tree.resolve(statement, name) {
            Some(var) => var,
            None => continue,
        };
        let mut j = i + 1;
        while nodes.get(j).is_some_and(|n| n.is_group(Delimiter::Bracket)) {
            j += 1;
        }
        let index = to_source(&nodes[i + 1..j]);
        while nodes.get(j).is_some_and(|n| n.is(".") || n.is("->")) {
            j += 2;
            while nodes.get(j).is_some_and(|n| n.is_group(Delimiter::Bracket)) {
                j += 1;
            }
        }
        let prefix = i > 0 && (nodes[i - 1].is("++") || nodes[i - 1].is("--"));
        let access = match nodes.get(j) {
            Some(next) if next.is("=") => Access::Write,
            Some(next) if COMPOUND_ASSIGNMENTS.iter().any(|op| next.is(op)) => Access::ReadWrite,
            _ if prefix => Access::ReadWrite,
            _ => Access::Read,
        };
        out.push(VarUse {
            var,
            statement,
            access,
            index,
        });
    }
}

/// Variable uses in the statement itself, without its children.
///
/// Declarations read their dimensions and initializer and write the declared
/// variable when it is initialized.
pub fn uses_in_statement(tree: &StatementTree, id: StmtId) -> Vec<VarUse> {
    let statement = tree.get(id);
    let mut out = vec![];
    match statement.kind {
        StatementKind::Declaration => {
            for var_id in &statement.vars {
                let var = tree.var(*var_id);
                for dim in &var.dims {
                    collect(tree, id, dim, &mut out);
                }
                if let Some(init) = &var.init {
                    collect(tree, id, init, &mut out);
                    out.push(VarUse {
                        var: *var_id,
                        statement: id,
                        access: Access::Write,
                        index: String::new(),
                    });
                }
            }
        }
        StatementKind::Root
        | StatementKind::Block
        | StatementKind::Else
        | StatementKind::Empty
        | StatementKind::Function
        | StatementKind::FunctionPrototype
        | StatementKind::TypeDefinition
        | StatementKind::Pragma => (),
        _ => collect(tree, id, &statement.nodes, &mut out),
    }
    out
}

/// Variable uses in `id` and everything below it.
pub fn uses_in_subtree(tree: &StatementTree, id: StmtId) -> Vec<VarUse> {
    let mut out = uses_in_statement(tree, id);
    for child in tree.descendants(id) {
        out.extend(uses_in_statement(tree, child));
    }
    out
}

/// Every attached statement that reads or writes `var`, in source order.
pub fn statements_using(tree: &StatementTree, var: VarId) -> Vec<StmtId> {
    tree.descendants(tree.root())
        .into_iter()
        .filter(|id| uses_in_statement(tree, *id).iter().any(|u| u.var == var))
        .collect()
}

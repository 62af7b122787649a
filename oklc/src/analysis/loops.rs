use crate::error::CompileError;
use crate::frontend::split_top_level;
use crate::frontend::to_source;
use crate::frontend::Node;
use crate::frontend::Token;
use crate::ir::StatementTree;
use crate::ir::StmtId;
use anyhow::Result;

/// Pieces of a canonical `for` header: `init; iter <cmp> bound; update`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoopHeader {
    pub iterator: String,
    /// Type of the iterator when the header declares it.
    pub typ: Option<String>,
    pub start: String,
    pub cmp: String,
    pub bound: String,
    /// Magnitude of the step.
    pub stride: String,
    pub increasing: bool,
    pub tag: Option<String>,
}

fn is_atom(expr: &str) -> bool {
    !expr.is_empty()
        && expr
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Parenthesize `expr` unless it is a single identifier or number.
pub fn wrap(expr: &str) -> String {
    if is_atom(expr) {
        expr.to_string()
    } else {
        format!("({expr})")
    }
}

fn is_name(node: Option<&Node>, name: &str) -> bool {
    node.and_then(|n| n.identifier()) == Some(name)
}

impl LoopHeader {
    pub fn parse(tree: &StatementTree, id: StmtId) -> Result<LoopHeader> {
        let stmt = tree.get(id);
        let malformed = || {
            let msg = format!(
                "loop header `{}` is not of the form `init; iter <cmp> bound; update`",
                to_source(&stmt.nodes)
            );
            CompileError::semantic(stmt.location, msg)
        };
        let clauses = split_top_level(&stmt.nodes, ";");
        if clauses.len() < 3 {
            return Err(malformed());
        }
        let (iterator, typ, start) = match stmt.vars.as_slice() {
            [var] => {
                let var = tree.var(*var);
                match &var.init {
                    Some(init) => (var.name.clone(), Some(var.typ.clone()), to_source(init)),
                    None => return Err(malformed()),
                }
            }
            [] => {
                let init = &clauses[0];
                match init.first().and_then(|n| n.identifier()) {
                    Some(name) if init.len() > 2 && init[1].is("=") => {
                        (name.to_string(), None, to_source(&init[2..]))
                    }
                    _ => return Err(malformed()),
                }
            }
            _ => return Err(malformed()),
        };

        let condition = &clauses[1];
        let cmp = match condition.get(1).and_then(|n| n.token()) {
            Some(token) if ["<", "<=", ">", ">="].iter().any(|op| token.is(op)) => {
                token.lexeme.clone()
            }
            _ => return Err(malformed()),
        };
        if !is_name(condition.first(), &iterator) || condition.len() < 3 {
            return Err(malformed());
        }
        let bound = to_source(&condition[2..]);

        let update = &clauses[2];
        let (increasing, stride) = if update.len() == 2
            && ((is_name(update.first(), &iterator) && update[1].is("++"))
                || (update[0].is("++") && is_name(update.get(1), &iterator)))
        {
            (true, "1".to_string())
        } else if update.len() == 2
            && ((is_name(update.first(), &iterator) && update[1].is("--"))
                || (update[0].is("--") && is_name(update.get(1), &iterator)))
        {
            (false, "1".to_string())
        } else if update.len() > 2 && is_name(update.first(), &iterator) && update[1].is("+=") {
            (true, to_source(&update[2..]))
        } else if update.len() > 2 && is_name(update.first(), &iterator) && update[1].is("-=") {
            (false, to_source(&update[2..]))
        } else {
            return Err(malformed());
        };
        if increasing != cmp.starts_with('<') {
            return Err(malformed());
        }
        Ok(LoopHeader {
            iterator,
            typ,
            start,
            cmp,
            bound,
            stride,
            increasing,
            tag: clauses.get(3).map(|c| to_source(c)),
        })
    }
    fn span(&self) -> String {
        let (from, to) = if self.increasing {
            (&self.start, &self.bound)
        } else {
            (&self.bound, &self.start)
        };
        let inclusive = self.cmp.ends_with('=');
        let span = if from == "0" {
            to.to_string()
        } else {
            format!("{} - {}", wrap(to), wrap(from))
        };
        if inclusive {
            format!("{span} + 1")
        } else {
            span
        }
    }
    /// Expression for the number of iterations.
    pub fn count(&self) -> String {
        let span = self.span();
        if self.stride == "1" {
            span
        } else {
            let stride = wrap(&self.stride);
            format!("({} + {stride} - 1) / {stride}", wrap(&span))
        }
    }
    /// Expression for the iterator value of iteration `id`.
    pub fn value_at(&self, id: &str) -> String {
        let offset = if self.stride == "1" {
            id.to_string()
        } else {
            format!("{} * {}", wrap(id), wrap(&self.stride))
        };
        if self.start == "0" && self.increasing {
            return offset;
        }
        let sign = if self.increasing { "+" } else { "-" };
        format!("{} {sign} {}", wrap(&self.start), wrap(&offset))
    }
    /// Expression for the iteration number of the current iterator value.
    pub fn coordinate(&self) -> String {
        let distance = match (self.increasing, self.start.as_str()) {
            (true, "0") => self.iterator.clone(),
            (true, _) => format!("{} - {}", self.iterator, wrap(&self.start)),
            (false, _) => format!("{} - {}", wrap(&self.start), self.iterator),
        };
        if self.stride == "1" {
            distance
        } else {
            format!("{} / {}", wrap(&distance), wrap(&self.stride))
        }
    }
    /// Whether the iterator is still in range, such as `i < n`.
    pub fn condition(&self) -> String {
        format!("{} {} {}", self.iterator, self.cmp, self.bound)
    }
    /// The header without the loop tag.
    pub fn plain_header(nodes: &[Node]) -> Vec<Node> {
        let clauses = split_top_level(nodes, ";");
        let mut out = vec![];
        for (i, clause) in clauses.iter().take(3).enumerate() {
            if i > 0 {
                out.push(Node::Token(Token::operator(";")));
            }
            out.extend(clause.iter().cloned());
        }
        out
    }
}

//! Statement tree builder.
//!
//! Walks a grouped node sequence one statement at a time. Braced groups are
//! entered recursively, so every scope is parsed with the nodes of exactly
//! that scope and statement boundaries never require re-scanning text.

use crate::error::CompileError;
use crate::frontend::keywords::LanguageTables;
use crate::frontend::node::parse_nodes;
use crate::frontend::node::split_top_level;
use crate::frontend::node::to_source;
use crate::frontend::node::Delimiter;
use crate::frontend::node::Node;
use crate::frontend::token::Location;
use crate::frontend::token::Token;
use crate::frontend::token::TokenKind;
use crate::ir::FunctionSig;
use crate::ir::LoopHint;
use crate::ir::StatementKind;
use crate::ir::StatementTree;
use crate::ir::StmtId;
use crate::ir::Var;
use crate::ir::VarId;
use anyhow::Result;
use tracing::warn;

pub struct Parser<'a> {
    tree: &'a mut StatementTree,
    tables: &'a LanguageTables,
    pending_hint: Option<LoopHint>,
}

/// Build a statement tree from preprocessed nodes.
pub fn parse(nodes: Vec<Node>, tables: &LanguageTables) -> Result<StatementTree> {
    let mut tree = StatementTree::new();
    let root = tree.root();
    Parser::new(&mut tree, tables).block(root, &nodes)?;
    Ok(tree)
}

/// Parse `src` into statements placed at `index` among the children of
/// `parent`. Declarations are registered in the scope of `parent`.
pub fn insert_source(
    tree: &mut StatementTree,
    parent: StmtId,
    index: usize,
    src: &str,
    tables: &LanguageTables,
) -> Result<Vec<StmtId>> {
    let nodes = parse_nodes(src)?;
    let before = tree.children(parent).len();
    Parser::new(tree, tables).block(parent, &nodes)?;
    let added = tree.children(parent)[before..].to_vec();
    for (offset, id) in added.iter().enumerate() {
        tree.detach(*id);
        tree.insert(parent, index + offset, *id);
    }
    Ok(added)
}

fn location_of(nodes: &[Node], i: usize) -> Location {
    match nodes.get(i).or(nodes.last()) {
        Some(node) => node.location(),
        None => Location::default(),
    }
}

fn directive(node: &Node) -> Option<&Token> {
    node.token().filter(|t| t.kind == TokenKind::Directive)
}

impl<'a> Parser<'a> {
    pub fn new(tree: &'a mut StatementTree, tables: &'a LanguageTables) -> Self {
        Parser {
            tree,
            tables,
            pending_hint: None,
        }
    }
    pub fn block(&mut self, parent: StmtId, nodes: &[Node]) -> Result<()> {
        let mut i = 0;
        while i < nodes.len() {
            i = self.statement(parent, nodes, i)?;
        }
        Ok(())
    }
    fn push(&mut self, parent: StmtId, kind: StatementKind, nodes: &[Node], location: Location) -> StmtId {
        self.tree.push(parent, kind, nodes.to_vec(), location)
    }
    fn statement(&mut self, parent: StmtId, nodes: &[Node], i: usize) -> Result<usize> {
        let node = &nodes[i];
        let location = node.location();
        if let Some(token) = directive(node) {
            self.pragma(parent, token)?;
            return Ok(i + 1);
        }
        let keyword = node.identifier().unwrap_or("");
        let hint = self.pending_hint.take();
        if hint.is_some() && keyword != "for" {
            warn!("Ignoring loop hint at line {}: no for loop follows", location.line());
        }
        if node.is(";") {
            self.push(parent, StatementKind::Empty, &[], location);
            return Ok(i + 1);
        }
        if let Some(group) = node.group().filter(|g| g.delimiter == Delimiter::Brace) {
            let block = self.push(parent, StatementKind::Block, &[], location);
            self.block(block, &group.children)?;
            return Ok(i + 1);
        }
        match keyword {
            "if" => self.if_chain(parent, nodes, i),
            "else" => Err(CompileError::parse(location, "`else` without `if`")),
            "for" => self.for_loop(parent, nodes, i, hint),
            "while" => {
                let condition = self.paren(nodes, i + 1, "while")?;
                let stmt = self.push(parent, StatementKind::While, condition, location);
                self.body(stmt, nodes, i + 2)
            }
            "do" => self.do_while(parent, nodes, i),
            "switch" => {
                let condition = self.paren(nodes, i + 1, "switch")?;
                let stmt = self.push(parent, StatementKind::Switch, condition, location);
                self.body(stmt, nodes, i + 2)
            }
            "case" | "default" => {
                let colon = match nodes[i..].iter().position(|n| n.is(":")) {
                    Some(offset) => i + offset,
                    None => {
                        let msg = format!("expected `:` after `{keyword}` label");
                        return Err(CompileError::parse(location, msg));
                    }
                };
                self.push(parent, StatementKind::Case, &nodes[i..colon], location);
                Ok(colon + 1)
            }
            "return" | "break" | "continue" | "goto" => {
                let end = self.semicolon(nodes, i)?;
                self.push(parent, StatementKind::Flow, &nodes[i..end], location);
                Ok(end + 1)
            }
            "typedef" => self.type_definition(parent, nodes, i),
            "struct" | "union" | "enum" | "class" if self.defines_type(nodes, i) => {
                self.type_definition(parent, nodes, i)
            }
            "barrier" if nodes.get(i + 1).is_some_and(|n| n.is_group(Delimiter::Paren)) => {
                let fence = self.paren(nodes, i + 1, "barrier")?;
                let end = self.semicolon(nodes, i)?;
                self.push(parent, StatementKind::Barrier, fence, location);
                Ok(end + 1)
            }
            _ => self.simple(parent, nodes, i),
        }
    }
    fn pragma(&mut self, parent: StmtId, token: &Token) -> Result<()> {
        let text = token.lexeme.trim_start_matches('#');
        let words = text.split_whitespace().collect::<Vec<&str>>();
        let factor = match words.as_slice() {
            ["pragma", "unroll"] => {
                self.pending_hint = Some(LoopHint::Unroll(None));
                return Ok(());
            }
            ["pragma", "unroll", n] | ["pragma", "occa", "unroll", n] => n,
            ["pragma", ..] => {
                let node = Node::Token(token.clone());
                self.push(parent, StatementKind::Pragma, &[node], token.location);
                return Ok(());
            }
            _ => {
                let msg = format!("unexpected directive `{}`", token.lexeme);
                return Err(CompileError::parse(token.location, msg));
            }
        };
        match factor.parse::<u32>() {
            Ok(n) => {
                self.pending_hint = Some(LoopHint::Unroll(Some(n)));
                Ok(())
            }
            Err(_) => {
                let msg = format!("invalid unroll factor `{factor}`");
                Err(CompileError::parse(token.location, msg))
            }
        }
    }
    /// Children of the parenthesized group at `i`.
    fn paren<'n>(&self, nodes: &'n [Node], i: usize, after: &str) -> Result<&'n [Node]> {
        match nodes.get(i).and_then(|n| n.group()) {
            Some(group) if group.delimiter == Delimiter::Paren => Ok(&group.children),
            _ => {
                let msg = format!("expected `(` after `{after}`");
                Err(CompileError::parse(location_of(nodes, i), msg))
            }
        }
    }
    /// Index of the `;` that ends the statement starting at `i`.
    fn semicolon(&self, nodes: &[Node], i: usize) -> Result<usize> {
        for (j, node) in nodes.iter().enumerate().skip(i) {
            if node.is(";") {
                return Ok(j);
            }
            if directive(node).is_some() {
                break;
            }
        }
        let last = nodes.len().saturating_sub(1);
        Err(CompileError::parse(location_of(nodes, last), "expected `;`"))
    }
    /// Parse the body of a control statement into `owner`.
    fn body(&mut self, owner: StmtId, nodes: &[Node], i: usize) -> Result<usize> {
        match nodes.get(i) {
            Some(node) if node.is_group(Delimiter::Brace) => {
                if let Some(group) = node.group() {
                    self.block(owner, &group.children)?;
                }
                Ok(i + 1)
            }
            Some(_) => self.statement(owner, nodes, i),
            None => {
                let location = location_of(nodes, i);
                Err(CompileError::parse(location, "expected statement"))
            }
        }
    }
    fn if_chain(&mut self, parent: StmtId, nodes: &[Node], i: usize) -> Result<usize> {
        let condition = self.paren(nodes, i + 1, "if")?;
        let stmt = self.push(parent, StatementKind::If, condition, nodes[i].location());
        let mut j = self.body(stmt, nodes, i + 2)?;
        while j < nodes.len() && nodes[j].is("else") {
            let location = nodes[j].location();
            if nodes.get(j + 1).is_some_and(|n| n.is("if")) {
                let condition = self.paren(nodes, j + 2, "if")?;
                let stmt = self.push(parent, StatementKind::ElseIf, condition, location);
                j = self.body(stmt, nodes, j + 3)?;
            } else {
                let stmt = self.push(parent, StatementKind::Else, &[], location);
                j = self.body(stmt, nodes, j + 1)?;
                break;
            }
        }
        Ok(j)
    }
    fn for_loop(
        &mut self,
        parent: StmtId,
        nodes: &[Node],
        i: usize,
        hint: Option<LoopHint>,
    ) -> Result<usize> {
        let header = self.paren(nodes, i + 1, "for")?;
        let location = nodes[i].location();
        let clauses = split_top_level(header, ";");
        if clauses.len() < 3 {
            let msg = "malformed `for` header: expected three clauses";
            return Err(CompileError::parse(location, msg));
        }
        let stmt = self.push(parent, StatementKind::For, header, location);
        self.tree.get_mut(stmt).hint = hint;
        if self.is_declaration(&clauses[0]) {
            let vars = self.declarators(stmt, &clauses[0], stmt)?;
            self.tree.get_mut(stmt).vars = vars;
        }
        self.body(stmt, nodes, i + 2)
    }
    fn do_while(&mut self, parent: StmtId, nodes: &[Node], i: usize) -> Result<usize> {
        let stmt = self.push(parent, StatementKind::DoWhile, &[], nodes[i].location());
        let j = self.body(stmt, nodes, i + 1)?;
        if !nodes.get(j).is_some_and(|n| n.is("while")) {
            let msg = "expected `while` after `do` body";
            return Err(CompileError::parse(location_of(nodes, j), msg));
        }
        let condition = self.paren(nodes, j + 1, "while")?;
        self.tree.get_mut(stmt).nodes = condition.to_vec();
        if !nodes.get(j + 2).is_some_and(|n| n.is(";")) {
            return Err(CompileError::parse(location_of(nodes, j + 1), "expected `;`"));
        }
        Ok(j + 3)
    }
    /// Whether `struct X {` or `struct {` starts a type definition.
    fn defines_type(&self, nodes: &[Node], i: usize) -> bool {
        let next = nodes.get(i + 1);
        next.is_some_and(|n| n.is_group(Delimiter::Brace))
            || (next.is_some_and(|n| n.identifier().is_some())
                && nodes.get(i + 2).is_some_and(|n| n.is_group(Delimiter::Brace)))
    }
    fn type_definition(&mut self, parent: StmtId, nodes: &[Node], i: usize) -> Result<usize> {
        let end = self.semicolon(nodes, i)?;
        let range = &nodes[i..end];
        if let Some(name) = range.get(1).and_then(|n| n.identifier()) {
            if !nodes[i].is("typedef") {
                self.tree.add_type_name(name);
            }
        }
        if nodes[i].is("typedef") {
            if let Some(name) = range.iter().rev().find_map(|n| n.identifier()) {
                self.tree.add_type_name(name);
            }
        }
        let location = nodes[i].location();
        self.push(parent, StatementKind::TypeDefinition, range, location);
        Ok(end + 1)
    }
    /// Declarations, prototypes, function definitions and expressions.
    fn simple(&mut self, parent: StmtId, nodes: &[Node], i: usize) -> Result<usize> {
        let mut j = i;
        loop {
            match nodes.get(j) {
                None => {
                    let location = location_of(nodes, j);
                    return Err(CompileError::parse(location, "expected `;`"));
                }
                Some(node) if node.is(";") => break,
                Some(node) if directive(node).is_some() => {
                    let location = location_of(nodes, j.saturating_sub(1));
                    return Err(CompileError::parse(location, "expected `;`"));
                }
                Some(node)
                    if node.is_group(Delimiter::Brace)
                        && j > i
                        && nodes[j - 1].is_group(Delimiter::Paren) =>
                {
                    self.function(parent, &nodes[i..=j])?;
                    return Ok(j + 1);
                }
                Some(_) => j += 1,
            }
        }
        let range = &nodes[i..j];
        let location = nodes[i].location();
        if range.is_empty() {
            self.push(parent, StatementKind::Empty, &[], location);
        } else if self.is_declaration(range) {
            if self.is_prototype(range) {
                self.push(parent, StatementKind::FunctionPrototype, range, location);
            } else {
                let stmt = self.push(parent, StatementKind::Declaration, &[], location);
                let vars = self.declarators(parent, range, stmt)?;
                self.tree.get_mut(stmt).vars = vars;
            }
        } else {
            self.push(parent, StatementKind::Expression, range, location);
        }
        Ok(j + 1)
    }
    fn is_declaration(&self, range: &[Node]) -> bool {
        let mut k = 0;
        while let Some(node) = range.get(k) {
            let extern_c = node.token().is_some_and(|t| t.kind == TokenKind::String)
                && k > 0
                && range[k - 1].is("extern");
            let qualifier = node.identifier().is_some_and(|w| self.tables.is_qualifier(w));
            if !(extern_c || qualifier) {
                break;
            }
            k += 1;
        }
        let first = match range.get(k).and_then(|n| n.identifier()) {
            Some(first) => first,
            None => return false,
        };
        if self.tables.is_type(first)
            || self.tree.is_type_name(first)
            || matches!(first, "struct" | "union" | "enum" | "class")
        {
            return true;
        }
        if self.tables.is_control(first) {
            return false;
        }
        let second = range.get(k + 1).and_then(|n| n.identifier());
        second.is_some_and(|w| !self.tables.is_reserved(w))
    }
    fn is_prototype(&self, range: &[Node]) -> bool {
        let n = range.len();
        n >= 2
            && range[n - 1].is_group(Delimiter::Paren)
            && range[n - 2].identifier().is_some()
            && !range.iter().any(|node| node.is("="))
    }
    /// Parse type and qualifiers into a template variable.
    ///
    /// Returns the template and the index of the first declarator node.
    fn specifiers(&self, range: &[Node]) -> Result<(Var, usize)> {
        let mut var = Var::new("", "");
        let mut words: Vec<String> = vec![];
        let mut k = 0;
        while let Some(node) = range.get(k) {
            if node.token().is_some_and(|t| t.kind == TokenKind::String)
                && k > 0
                && range[k - 1].is("extern")
            {
                k += 1;
                continue;
            }
            let word = match node.identifier() {
                Some(word) => word,
                None => break,
            };
            let q = &mut var.qualifiers;
            match word {
                "const" => q.constant = true,
                "volatile" => q.volatile = true,
                "static" => q.is_static = true,
                "extern" => q.is_extern = true,
                "shared" => q.shared = true,
                "exclusive" => q.exclusive = true,
                "restrict" | "__restrict__" => q.restrict = true,
                "struct" | "union" | "enum" | "class" => {
                    words.push(word.to_string());
                    if let Some(name) = range.get(k + 1).and_then(|n| n.identifier()) {
                        words.push(name.to_string());
                        k += 1;
                    }
                }
                _ if self.tables.is_qualifier(word) => q.other.push(word.to_string()),
                _ if self.tables.is_type(word) => words.push(word.to_string()),
                _ if words.is_empty() => words.push(word.to_string()),
                _ => break,
            }
            k += 1;
        }
        if words.is_empty() {
            let msg = "expected type in declaration";
            return Err(CompileError::parse(location_of(range, 0), msg));
        }
        var.typ = words.join(" ");
        Ok((var, k))
    }
    fn declarator(&self, base: &Var, part: &[Node], declared_in: StmtId) -> Result<Var> {
        let mut var = base.clone();
        var.declared_in = declared_in;
        var.location = location_of(part, 0);
        let mut k = 0;
        while let Some(node) = part.get(k) {
            if node.is("*") {
                var.pointer += 1;
            } else if node.is("restrict") || node.is("__restrict__") {
                var.qualifiers.restrict = true;
            } else if !(node.is("&") || (node.is("const") && var.pointer > 0)) {
                break;
            }
            k += 1;
        }
        var.name = match part.get(k).and_then(|n| n.identifier()) {
            Some(name) => name.to_string(),
            None => {
                let msg = "expected declarator name";
                return Err(CompileError::parse(location_of(part, k), msg));
            }
        };
        k += 1;
        while let Some(group) = part.get(k).and_then(|n| n.group()) {
            if group.delimiter != Delimiter::Bracket {
                break;
            }
            var.dims.push(group.children.clone());
            k += 1;
        }
        if let Some(node) = part.get(k) {
            if !node.is("=") || k + 1 >= part.len() {
                let msg = format!("unexpected `{node}` in declaration of `{}`", var.name);
                return Err(CompileError::parse(node.location(), msg));
            }
            var.init = Some(part[k + 1..].to_vec());
        }
        Ok(var)
    }
    /// Declare every declarator of `range` in the scope of `owner`.
    fn declarators(&mut self, owner: StmtId, range: &[Node], declared_in: StmtId) -> Result<Vec<VarId>> {
        let (base, k) = self.specifiers(range)?;
        let mut ids = vec![];
        for part in split_top_level(&range[k..], ",") {
            let var = self.declarator(&base, &part, declared_in)?;
            let id = self.tree.add_var(var);
            self.tree.declare(owner, id)?;
            ids.push(id);
        }
        Ok(ids)
    }
    fn function(&mut self, parent: StmtId, range: &[Node]) -> Result<()> {
        let n = range.len();
        let location = range[0].location();
        let name = match range.get(n.wrapping_sub(3)).and_then(|n| n.identifier()) {
            Some(name) if n >= 3 => name.to_string(),
            _ => return Err(CompileError::parse(location, "expected function name")),
        };
        let mut sig = FunctionSig {
            name,
            ..FunctionSig::default()
        };
        let mut return_type = vec![];
        let prefix = &range[..n - 3];
        let mut k = 0;
        while let Some(node) = prefix.get(k) {
            let word = node.identifier().unwrap_or("");
            if word == "kernel" {
                sig.is_kernel = true;
            } else if word == "extern" && prefix.get(k + 1).is_some_and(|n| n.token().is_some_and(|t| t.kind == TokenKind::String)) {
                sig.qualifiers.push(format!("extern {}", prefix[k + 1]));
                k += 1;
            } else if (self.tables.is_qualifier(word) && !matches!(word, "const" | "volatile"))
                || word.starts_with("__")
            {
                sig.qualifiers.push(word.to_string());
            } else {
                return_type.push(node.clone());
            }
            k += 1;
        }
        if return_type.is_empty() {
            let msg = format!("expected return type of `{}`", sig.name);
            return Err(CompileError::parse(location, msg));
        }
        sig.return_type = to_source(&return_type);
        let stmt = self.push(parent, StatementKind::Function, &[], location);
        let params = self.paren(range, n - 2, &sig.name)?;
        let is_void = params.len() == 1 && params[0].is("void");
        if !params.is_empty() && !is_void {
            for part in split_top_level(params, ",") {
                if part.len() == 1 && part[0].is("...") {
                    continue;
                }
                let (base, k) = self.specifiers(&part)?;
                let var = self.declarator(&base, &part[k..], stmt)?;
                let id = self.tree.add_var(var);
                self.tree.declare(stmt, id)?;
                sig.params.push(id);
            }
        }
        self.tree.get_mut(stmt).function = Some(sig);
        let body = self.push(stmt, StatementKind::Block, &[], range[n - 1].location());
        if let Some(group) = range[n - 1].group() {
            self.block(body, &group.children)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn build(src: &str) -> Result<StatementTree> {
        parse(parse_nodes(src)?, &LanguageTables::new())
    }

    #[test]
    fn test_kernel_roundtrip() {
        let src = indoc! {"
            kernel void addVectors(const int entries, const float *a, const float *b, float *ab) {
              for (int group = 0; group < ((entries + 15) / 16); ++group; outer0) {
                for (int item = 0; item < 16; ++item; inner0) {
                  const int n = item + (16 * group);
                  if (n < entries) {
                    ab[n] = a[n] + b[n];
                  }
                }
              }
            }
        "};
        let tree = build(src).unwrap();
        assert_eq!(tree.to_string(), src.trim());
        let kernel = tree.kernels()[0];
        let sig = tree.get(kernel).function.as_ref().unwrap();
        assert_eq!(sig.name, "addVectors");
        assert_eq!(sig.params.len(), 4);
        assert!(tree.var(sig.params[1]).qualifiers.constant);
        assert_eq!(tree.var(sig.params[3]).pointer, 1);

        let body = tree.body(kernel).unwrap();
        let outer = tree.children(body)[0];
        assert_eq!(tree.kind(outer), StatementKind::For);
        let group = tree.resolve(outer, "group").unwrap();
        assert_eq!(tree.var(group).declared_in, outer);
        // Parameters live in the scope around the body.
        assert!(tree.get(body).scope.is_empty());
        assert!(tree.get(kernel).scope.contains_key("entries"));
    }

    #[test]
    fn test_control_statements() {
        let src = indoc! {"
            typedef struct { float x; } point_t;
            float helper(point_t p, int n);
            void f(int n) {
              point_t p;
              int i = 0, j[4];
              #pragma unroll 4
              for (i = 0; i < n; ++i) {
                if (i == 0) continue;
                else if (i > 2) {
                  break;
                } else j[0] = i;
              }
              do {
                --i;
              } while (i);
              switch (n) {
                case 1:
                  n = 2;
                  break;
                default:
                  ;
              }
            }
        "};
        let tree = build(src).unwrap();
        let expected = indoc! {"
            typedef struct {float x;} point_t;
            float helper(point_t p, int n);
            void f(int n) {
              point_t p;
              int i = 0, j[4];
              #pragma unroll 4
              for (i = 0; i < n; ++i) {
                if (i == 0) {
                  continue;
                } else if (i > 2) {
                  break;
                } else {
                  j[0] = i;
                }
              }
              do {
                --i;
              } while (i);
              switch (n) {
                case 1:
                n = 2;
                break;
                default:
                ;
              }
            }
        "};
        assert_eq!(tree.to_string(), expected.trim());
        let kinds = tree
            .children(tree.root())
            .iter()
            .map(|id| tree.kind(*id))
            .collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![
                StatementKind::TypeDefinition,
                StatementKind::FunctionPrototype,
                StatementKind::Function
            ]
        );
        assert!(tree.is_type_name("point_t"));
    }

    #[test]
    fn test_errors() {
        let err = build("void f() { int a; float a; }").unwrap_err();
        let err = CompileError::find(&err).unwrap();
        assert!(err.is_parse());
        assert!(err.message().contains("redeclaration of `a`"));

        let err = build("void f() {\n  x = 1\n}").unwrap_err();
        let err = CompileError::find(&err).unwrap();
        assert_eq!(err.message(), "expected `;`");
        assert_eq!(err.location().line(), 2);

        assert!(build("void f() { else x; }").is_err());
        assert!(build("void f() { for (i = 0) {} }").is_err());
        assert!(build("void f() { do {} x; }").is_err());

        // Shadowing in a nested scope is fine.
        assert!(build("void f(int a) { { int a; } }").is_ok());
    }

    #[test]
    fn test_insert_source() {
        let mut tree = build("void f() {\n  a();\n  c();\n}").unwrap();
        let body = tree.body(tree.functions()[0]).unwrap();
        let added = insert_source(&mut tree, body, 1, "int b = 1; b++;", &LanguageTables::new()).unwrap();
        assert_eq!(added.len(), 2);
        assert_eq!(tree.children(body)[1], added[0]);
        assert!(tree.resolve(body, "b").is_some());
        assert_eq!(tree.to_string(), "void f() {\n  a();\n  int b = 1;\n  b++;\n  c();\n}");
    }
}

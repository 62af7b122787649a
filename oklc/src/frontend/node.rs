//! Token nodes: tokens with bracketed ranges folded into groups.
//!
//! A `(...)`, `[...]` or `{...}` range is a single [Node::Group] that owns its
//! inner sequence, so structural parsing can skip over a whole group in one
//! step and statement boundaries are visible without re-scanning text.

use crate::error::CompileError;
use crate::frontend::scanner::Scanner;
use crate::frontend::token::Location;
use crate::frontend::token::Token;
use crate::frontend::token::TokenKind;
use anyhow::Result;
use std::fmt::Display;
use std::fmt::Formatter;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delimiter {
    Paren,
    Bracket,
    Brace,
}

impl Delimiter {
    fn from_open(kind: TokenKind) -> Option<Delimiter> {
        match kind {
            TokenKind::LParen => Some(Delimiter::Paren),
            TokenKind::LBracket => Some(Delimiter::Bracket),
            TokenKind::LBrace => Some(Delimiter::Brace),
            _ => None,
        }
    }
    fn close_kind(&self) -> TokenKind {
        match self {
            Delimiter::Paren => TokenKind::RParen,
            Delimiter::Bracket => TokenKind::RBracket,
            Delimiter::Brace => TokenKind::RBrace,
        }
    }
    pub fn open(&self) -> &'static str {
        match self {
            Delimiter::Paren => "(",
            Delimiter::Bracket => "[",
            Delimiter::Brace => "{",
        }
    }
    pub fn close(&self) -> &'static str {
        match self {
            Delimiter::Paren => ")",
            Delimiter::Bracket => "]",
            Delimiter::Brace => "}",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Group {
    pub delimiter: Delimiter,
    pub children: Vec<Node>,
    /// Location of the opening delimiter.
    pub location: Location,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    Token(Token),
    Group(Group),
}

impl Node {
    pub fn new_group(delimiter: Delimiter, children: Vec<Node>) -> Node {
        Node::Group(Group {
            delimiter,
            children,
            location: Location::default(),
        })
    }
    pub fn location(&self) -> Location {
        match self {
            Node::Token(token) => token.location,
            Node::Group(group) => group.location,
        }
    }
    pub fn token(&self) -> Option<&Token> {
        match self {
            Node::Token(token) => Some(token),
            Node::Group(_) => None,
        }
    }
    pub fn group(&self) -> Option<&Group> {
        match self {
            Node::Token(_) => None,
            Node::Group(group) => Some(group),
        }
    }
    pub fn is(&self, text: &str) -> bool {
        match self {
            Node::Token(token) => token.is(text),
            Node::Group(_) => false,
        }
    }
    pub fn identifier(&self) -> Option<&str> {
        match self {
            Node::Token(token) if token.is_identifier() => Some(&token.lexeme),
            _ => None,
        }
    }
    pub fn is_group(&self, delimiter: Delimiter) -> bool {
        match self {
            Node::Group(group) => group.delimiter == delimiter,
            Node::Token(_) => false,
        }
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", to_source(std::slice::from_ref(self)))
    }
}

/// Fold bracket tokens into groups.
pub fn group(tokens: Vec<Token>) -> Result<Vec<Node>> {
    let mut stack: Vec<(Token, Vec<Node>)> = vec![];
    let mut current: Vec<Node> = vec![];
    for token in tokens {
        match token.kind {
            TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => {
                stack.push((token, std::mem::take(&mut current)));
            }
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                let (open, parent) = match stack.pop() {
                    Some(open) => open,
                    None => {
                        let msg = format!("Unmatched `{}`", token.lexeme);
                        return Err(CompileError::lex(token.location, msg));
                    }
                };
                let delimiter = match Delimiter::from_open(open.kind) {
                    Some(delimiter) => delimiter,
                    None => return Err(CompileError::lex(open.location, "Invalid group")),
                };
                if delimiter.close_kind() != token.kind {
                    let msg = format!(
                        "Mismatched `{}`: expected `{}` to close `{}` opened at line {}",
                        token.lexeme,
                        delimiter.close(),
                        delimiter.open(),
                        open.location.line()
                    );
                    return Err(CompileError::lex(token.location, msg));
                }
                let children = std::mem::replace(&mut current, parent);
                current.push(Node::Group(Group {
                    delimiter,
                    children,
                    location: open.location,
                }));
            }
            _ => current.push(Node::Token(token)),
        }
    }
    if let Some((open, _)) = stack.pop() {
        let msg = match Delimiter::from_open(open.kind) {
            Some(Delimiter::Brace) => format!(
                "Unterminated block: `{{` opened at line {} is never closed",
                open.location.line()
            ),
            _ => format!(
                "Unterminated group: `{}` opened at line {} is never closed",
                open.lexeme,
                open.location.line()
            ),
        };
        return Err(CompileError::lex(open.location, msg));
    }
    Ok(current)
}

/// Scan and group C-shaped text.
pub fn parse_nodes(src: &str) -> Result<Vec<Node>> {
    group(Scanner::scan(src)?)
}

/// Undo [group].
pub fn flatten(nodes: &[Node]) -> Vec<Token> {
    let mut tokens = vec![];
    for node in nodes {
        match node {
            Node::Token(token) => tokens.push(token.clone()),
            Node::Group(group) => {
                let location = group.location;
                let kind = match group.delimiter {
                    Delimiter::Paren => TokenKind::LParen,
                    Delimiter::Bracket => TokenKind::LBracket,
                    Delimiter::Brace => TokenKind::LBrace,
                };
                let open = group.delimiter.open().to_string();
                tokens.push(Token::new(kind, open, location));
                tokens.extend(flatten(&group.children));
                let close = group.delimiter.close().to_string();
                tokens.push(Token::new(group.delimiter.close_kind(), close, location));
            }
        }
    }
    tokens
}

/// Split on a separator token that is not nested inside a group.
///
/// Always returns at least one (possibly empty) part.
pub fn split_top_level(nodes: &[Node], separator: &str) -> Vec<Vec<Node>> {
    let mut parts = vec![];
    let mut current = vec![];
    for node in nodes {
        if node.is(separator) {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(node.clone());
        }
    }
    parts.push(current);
    parts
}

/// Keywords after which an expression starts.
const EXPRESSION_KEYWORDS: &[&str] = &["return", "case", "if", "for", "while", "switch", "else"];

fn ends_operand(node: &Node) -> bool {
    match node {
        Node::Group(_) => true,
        Node::Token(token) => {
            token.is_literal()
                || (token.is_identifier() && !EXPRESSION_KEYWORDS.contains(&token.lexeme.as_str()))
        }
    }
}

fn is_unary(nodes: &[Node], i: usize) -> bool {
    let prefix = ["-", "+", "*", "&", "!", "~", "++", "--"];
    match &nodes[i] {
        Node::Token(token) if token.kind == TokenKind::Operator => {
            prefix.contains(&token.lexeme.as_str()) && (i == 0 || !ends_operand(&nodes[i - 1]))
        }
        _ => false,
    }
}

fn needs_space(nodes: &[Node], i: usize) -> bool {
    let prev = &nodes[i - 1];
    let next = &nodes[i];
    if let Node::Token(token) = next {
        if token.kind == TokenKind::Operator {
            if matches!(token.lexeme.as_str(), "," | ";" | "." | "->" | "::") {
                return false;
            }
            if matches!(token.lexeme.as_str(), "++" | "--") && !is_unary(nodes, i) {
                return false;
            }
        }
    }
    if let Node::Token(token) = prev {
        if token.kind == TokenKind::Operator {
            if matches!(token.lexeme.as_str(), "." | "->" | "::") {
                return false;
            }
            if is_unary(nodes, i - 1) {
                return false;
            }
        }
    }
    if let Node::Group(group) = next {
        if group.delimiter != Delimiter::Brace {
            match prev {
                Node::Token(token) if token.is_identifier() => {
                    return EXPRESSION_KEYWORDS.contains(&token.lexeme.as_str());
                }
                Node::Group(prev) if prev.delimiter != Delimiter::Brace => return false,
                _ => (),
            }
        }
    }
    true
}

/// Render nodes as single-line source text.
pub fn to_source(nodes: &[Node]) -> String {
    let mut out = String::new();
    for (i, node) in nodes.iter().enumerate() {
        if i > 0 && needs_space(nodes, i) {
            out.push(' ');
        }
        match node {
            Node::Token(token) => out.push_str(&token.lexeme),
            Node::Group(group) => {
                out.push_str(group.delimiter.open());
                out.push_str(&to_source(&group.children));
                out.push_str(group.delimiter.close());
            }
        }
    }
    out
}

/// Positions of `name` where it is used as a value.
///
/// Member names after `.` or `->` and callees are skipped.
fn value_sites(nodes: &[Node], name: &str) -> Vec<usize> {
    let mut sites = vec![];
    for (i, node) in nodes.iter().enumerate() {
        if node.identifier() != Some(name) {
            continue;
        }
        if i > 0 && (nodes[i - 1].is(".") || nodes[i - 1].is("->")) {
            continue;
        }
        if nodes.get(i + 1).is_some_and(|n| n.is_group(Delimiter::Paren)) {
            continue;
        }
        sites.push(i);
    }
    sites
}

/// Whether `name` is used as a value anywhere in `nodes`.
pub fn uses_identifier(nodes: &[Node], name: &str) -> bool {
    if !value_sites(nodes, name).is_empty() {
        return true;
    }
    nodes.iter().any(|node| match node {
        Node::Group(group) => uses_identifier(&group.children, name),
        Node::Token(_) => false,
    })
}

/// Append `[index]` after every value use of `name`. Returns the number of
/// rewritten sites.
pub fn index_identifier(nodes: &mut Vec<Node>, name: &str, index: &[Node]) -> usize {
    let mut count = 0;
    for node in nodes.iter_mut() {
        if let Node::Group(group) = node {
            count += index_identifier(&mut group.children, name, index);
        }
    }
    for site in value_sites(nodes, name).into_iter().rev() {
        let subscript = Node::new_group(Delimiter::Bracket, index.to_vec());
        nodes.insert(site + 1, subscript);
        count += 1;
    }
    count
}

/// Rename every value use of `from`. Returns the number of rewritten sites.
pub fn rename_identifier(nodes: &mut [Node], from: &str, to: &str) -> usize {
    let mut count = 0;
    let sites = value_sites(nodes, from);
    for site in &sites {
        if let Node::Token(token) = &mut nodes[*site] {
            token.lexeme = to.to_string();
            count += 1;
        }
    }
    for node in nodes.iter_mut() {
        if let Node::Group(group) = node {
            count += rename_identifier(&mut group.children, from, to);
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(src: &str) -> String {
        to_source(&parse_nodes(src).unwrap())
    }

    #[test]
    fn test_group() {
        let nodes = parse_nodes("f(a, b[i]) { x; }").unwrap();
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0].identifier(), Some("f"));
        assert!(nodes[1].is_group(Delimiter::Paren));
        assert!(nodes[2].is_group(Delimiter::Brace));
        let args = split_top_level(&nodes[1].group().unwrap().children, ",");
        assert_eq!(args.len(), 2);
        assert_eq!(to_source(&args[1]), "b[i]");
        assert_eq!(flatten(&nodes).len(), 13);
    }

    #[test]
    fn test_malformed_nesting() {
        let err = parse_nodes("kernel void f() {\n  x = (1;\n}").unwrap_err();
        let err = CompileError::find(&err).unwrap();
        assert!(err.is_lex());
        assert!(err.message().contains("Mismatched `}`"));

        let err = parse_nodes("a; }").unwrap_err();
        assert!(err.to_string().contains("Unmatched `}`"));

        let err = parse_nodes("kernel void f() {\n  x = 1;\n").unwrap_err();
        let err = CompileError::find(&err).unwrap();
        assert!(err.message().contains("Unterminated block"));
        assert_eq!(err.location(), Location::new(1, 17));
    }

    #[test]
    fn test_to_source() {
        assert_eq!(roundtrip("a [ i ]=b*-c ;"), "a[i] = b * -c;");
        assert_eq!(roundtrip("((a+1)*(a+1))"), "((a + 1) * (a + 1))");
        assert_eq!(roundtrip("if(x){return -1;}"), "if (x) {return -1;}");
        assert_eq!(roundtrip("p->x . y ++"), "p->x.y++");
        assert_eq!(roundtrip("(float *) f(a,!b)"), "(float *) f(a, !b)");
        assert_eq!(roundtrip("++i; i += 2"), "++i; i += 2");
    }

    #[test]
    fn test_identifier_rewrites() {
        let mut nodes = parse_nodes("x = s.x + x[2] + f(x) + x(1)").unwrap();
        assert!(uses_identifier(&nodes, "x"));
        let index = parse_nodes("i").unwrap();
        assert_eq!(index_identifier(&mut nodes, "x", &index), 3);
        assert_eq!(to_source(&nodes), "x[i] = s.x + x[i][2] + f(x[i]) + x(1)");

        let mut nodes = parse_nodes("v = v + g(v)").unwrap();
        assert_eq!(rename_identifier(&mut nodes, "v", "v1"), 3);
        assert_eq!(to_source(&nodes), "v1 = v1 + g(v1)");
    }
}

//! Line-oriented Fortran-like kernels.
//!
//! Each logical line is rewritten into the equivalent C-shaped statement on
//! the same physical line, so the scanner and the statement tree builder are
//! shared with the C dialect and reported line numbers stay correct.

use crate::error::CompileError;
use crate::frontend::dialect::SourceDialect;
use crate::frontend::token::Location;
use anyhow::Result;
use std::collections::HashMap;
use std::collections::HashSet;

pub struct FortranDialect;

impl SourceDialect for FortranDialect {
    fn name(&self) -> &'static str {
        "fortran"
    }
    fn normalize(&self, src: &str) -> Result<String> {
        Translator::default().translate(src)
    }
}

const DOT_OPERATORS: &[(&str, &str)] = &[
    (".and.", " && "),
    (".or.", " || "),
    (".not.", "!"),
    (".eqv.", " == "),
    (".neqv.", " != "),
    (".eq.", " == "),
    (".ne.", " != "),
    (".lt.", " < "),
    (".le.", " <= "),
    (".gt.", " > "),
    (".ge.", " >= "),
    (".true.", "1"),
    (".false.", "0"),
];

struct Subroutine {
    line: usize,
    name: String,
    is_kernel: bool,
    args: Vec<String>,
    arg_types: HashMap<String, String>,
}

#[derive(Default)]
struct Translator {
    arrays: HashSet<String>,
    current: Option<Subroutine>,
}

/// Strip a case-insensitive keyword followed by a word boundary.
fn strip_keyword<'a>(s: &'a str, keyword: &str) -> Option<&'a str> {
    if s.len() < keyword.len() || !s.is_char_boundary(keyword.len()) {
        return None;
    }
    let (head, rest) = s.split_at(keyword.len());
    if !head.eq_ignore_ascii_case(keyword) {
        return None;
    }
    match rest.chars().next() {
        Some(c) if c.is_ascii_alphanumeric() || c == '_' => None,
        _ => Some(rest.trim_start()),
    }
}

/// Strip a sequence of keywords such as `end do`, also accepting `enddo`.
fn strip_keywords<'a>(s: &'a str, keywords: &[&str]) -> Option<&'a str> {
    let joined = keywords.concat();
    if let Some(rest) = strip_keyword(s, &joined) {
        return Some(rest);
    }
    let mut rest = s;
    for keyword in keywords {
        rest = strip_keyword(rest, keyword)?;
    }
    Some(rest)
}

fn strip_comment(line: &str) -> &str {
    let mut quote = None;
    for (i, c) in line.char_indices() {
        match (quote, c) {
            (None, '\'' | '"') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, '!') => return &line[..i],
            _ => (),
        }
    }
    line
}

/// Index of the parenthesis closing the one at `open`.
fn matching_paren(s: &str, open: usize) -> Option<usize> {
    let mut depth = 0;
    for (i, c) in s[open..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => (),
        }
    }
    None
}

fn split_commas(s: &str) -> Vec<String> {
    let mut parts = vec![];
    let mut depth = 0;
    let mut current = String::new();
    for c in s.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
                continue;
            }
            _ => (),
        }
        current.push(c);
    }
    if !current.trim().is_empty() || !parts.is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

fn is_simple(expr: &str) -> bool {
    expr.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn c_type(spec: &str) -> Option<&'static str> {
    let spec = spec.to_ascii_lowercase().replace(' ', "");
    let typ = match spec.as_str() {
        "integer" | "integer(4)" | "integer*4" => "int",
        "integer(8)" | "integer*8" => "long",
        "real" | "real(4)" | "real*4" => "float",
        "real(8)" | "real*8" | "doubleprecision" => "double",
        "logical" => "bool",
        "character" => "char",
        _ => return None,
    };
    Some(typ)
}

fn is_loop_tag(tag: &str) -> bool {
    let tag = tag.to_ascii_lowercase();
    ["outer", "inner", "global"].iter().any(|role| {
        tag.strip_prefix(role)
            .is_some_and(|dim| matches!(dim, "0" | "1" | "2"))
    })
}

impl Translator {
    fn translate(mut self, src: &str) -> Result<String> {
        let lines = src.lines().collect::<Vec<&str>>();
        let mut out = vec![String::new(); lines.len()];
        let mut i = 0;
        while i < lines.len() {
            let first = i;
            let trimmed = lines[i].trim_start();
            if trimmed.starts_with('#') {
                out[i] = lines[i].to_string();
                i += 1;
                continue;
            }
            let mut statement = strip_comment(lines[i]).trim_end().to_string();
            while statement.ends_with('&') && i + 1 < lines.len() {
                statement.pop();
                i += 1;
                let next = strip_comment(lines[i]).trim();
                statement.push(' ');
                statement.push_str(next.strip_prefix('&').unwrap_or(next));
            }
            let statement = statement.trim_end_matches('&').trim();
            out[first] = self.statement(statement, first + 1)?;
            if let Some(header) = self.finished_header(statement)? {
                let (line, text) = header;
                out[line - 1] = text;
            }
            i += 1;
        }
        if let Some(open) = &self.current {
            let msg = format!("subroutine `{}` is never ended", open.name);
            return Err(CompileError::parse(Location::new(open.line, 1), msg));
        }
        Ok(out.join("\n"))
    }
    /// The signature line of a subroutine that `statement` just closed.
    fn finished_header(&mut self, statement: &str) -> Result<Option<(usize, String)>> {
        let closes = strip_keywords(statement, &["end", "subroutine"]).is_some()
            || statement.eq_ignore_ascii_case("end");
        if !closes {
            return Ok(None);
        }
        let sub = match self.current.take() {
            Some(sub) => sub,
            None => return Ok(None),
        };
        let mut params = vec![];
        for arg in &sub.args {
            match sub.arg_types.get(arg) {
                Some(param) => params.push(param.clone()),
                None => {
                    let msg = format!("argument `{arg}` of `{}` has no declaration", sub.name);
                    return Err(CompileError::parse(Location::new(sub.line, 1), msg));
                }
            }
        }
        let prefix = if sub.is_kernel { "kernel void" } else { "void" };
        let header = format!("{prefix} {}({}) {{", sub.name, params.join(", "));
        Ok(Some((sub.line, header)))
    }
    fn statement(&mut self, s: &str, line: usize) -> Result<String> {
        let location = Location::new(line, 1);
        if s.is_empty() || strip_keywords(s, &["implicit", "none"]).is_some() {
            return Ok(String::new());
        }
        if let Some(rest) = strip_keyword(s, "kernel").and_then(|r| strip_keyword(r, "subroutine"))
        {
            return self.subroutine(rest, true, line);
        }
        if let Some(rest) = strip_keyword(s, "subroutine") {
            return self.subroutine(rest, false, line);
        }
        if strip_keywords(s, &["end", "subroutine"]).is_some() || s.eq_ignore_ascii_case("end") {
            return Ok("}".to_string());
        }
        if strip_keywords(s, &["end", "do"]).is_some() || strip_keywords(s, &["end", "if"]).is_some()
        {
            return Ok("}".to_string());
        }
        if let Some(rest) = strip_keywords(s, &["else", "if"]) {
            let (condition, _) = self.condition(rest, location)?;
            return Ok(format!("}} else if ({condition}) {{"));
        }
        if s.eq_ignore_ascii_case("else") {
            return Ok("} else {".to_string());
        }
        if let Some(rest) = strip_keyword(s, "if") {
            let (condition, after) = self.condition(rest, location)?;
            if after.eq_ignore_ascii_case("then") {
                return Ok(format!("if ({condition}) {{"));
            }
            let body = self.statement(after, line)?;
            return Ok(format!("if ({condition}) {{ {body} }}"));
        }
        if let Some(rest) = strip_keywords(s, &["do", "while"]) {
            let (condition, _) = self.condition(rest, location)?;
            return Ok(format!("while ({condition}) {{"));
        }
        if let Some(rest) = strip_keyword(s, "do") {
            return self.do_loop(rest, location);
        }
        if let Some(rest) = strip_keyword(s, "call") {
            return Ok(format!("{};", self.expression(rest)));
        }
        if s.eq_ignore_ascii_case("return") {
            return Ok("return;".to_string());
        }
        if s.eq_ignore_ascii_case("cycle") {
            return Ok("continue;".to_string());
        }
        if s.eq_ignore_ascii_case("exit") {
            return Ok("break;".to_string());
        }
        if s.contains("::") {
            return self.declaration(s, location);
        }
        Ok(format!("{};", self.expression(s)))
    }
    fn subroutine(&mut self, rest: &str, is_kernel: bool, line: usize) -> Result<String> {
        let (name, args) = match rest.find('(') {
            Some(open) => {
                let close = match matching_paren(rest, open) {
                    Some(close) => close,
                    None => {
                        let msg = "unterminated argument list";
                        return Err(CompileError::parse(Location::new(line, 1), msg));
                    }
                };
                (rest[..open].trim(), split_commas(&rest[open + 1..close]))
            }
            None => (rest.trim(), vec![]),
        };
        self.arrays.clear();
        self.current = Some(Subroutine {
            line,
            name: name.to_string(),
            is_kernel,
            args,
            arg_types: HashMap::new(),
        });
        Ok(String::new())
    }
    /// Split `(cond) rest` into the translated condition and the rest.
    fn condition<'a>(&self, s: &'a str, location: Location) -> Result<(String, &'a str)> {
        let close = if s.starts_with('(') {
            matching_paren(s, 0)
        } else {
            None
        };
        match close {
            Some(close) => Ok((self.expression(&s[1..close]), s[close + 1..].trim())),
            None => Err(CompileError::parse(location, "expected parenthesized condition")),
        }
    }
    fn do_loop(&self, rest: &str, location: Location) -> Result<String> {
        let (var, range) = match rest.split_once('=') {
            Some((var, range)) => (var.trim(), range),
            None => return Err(CompileError::parse(location, "malformed do loop")),
        };
        let parts = split_commas(range);
        let (start, end) = match parts.as_slice() {
            [start, end] | [start, end, _] => (self.expression(start), self.expression(end)),
            _ => return Err(CompileError::parse(location, "malformed do loop range")),
        };
        match parts.get(2) {
            Some(tag) if is_loop_tag(tag) => Ok(format!(
                "for (int {var} = {start}; {var} <= {end}; ++{var}; {}) {{",
                tag.to_ascii_lowercase()
            )),
            Some(stride) => Ok(format!(
                "for ({var} = {start}; {var} <= {end}; {var} += {}) {{",
                self.expression(stride)
            )),
            None => Ok(format!("for ({var} = {start}; {var} <= {end}; ++{var}) {{")),
        }
    }
    fn declaration(&mut self, s: &str, location: Location) -> Result<String> {
        let (spec, entities) = match s.split_once("::") {
            Some(split) => split,
            None => return Err(CompileError::parse(location, "malformed declaration")),
        };
        let spec = split_commas(spec);
        let typ = match spec.first().and_then(|t| c_type(t)) {
            Some(typ) => typ,
            None => {
                let msg = format!("unsupported type `{}`", spec.first().map_or("", |t| t));
                return Err(CompileError::parse(location, msg));
            }
        };
        let mut qualifiers = vec![];
        let mut intent_in = false;
        let mut shared_dims = vec![];
        for attr in &spec[1..] {
            let lower = attr.to_ascii_lowercase().replace(' ', "");
            match lower.as_str() {
                "intent(in)" => intent_in = true,
                "intent(out)" | "intent(inout)" => (),
                "shared" => qualifiers.push("shared"),
                "exclusive" => qualifiers.push("exclusive"),
                "parameter" => qualifiers.push("const"),
                _ if lower.starts_with("dimension(") => {
                    let open = attr.find('(').unwrap_or(0);
                    let close = matching_paren(attr, open).unwrap_or(attr.len());
                    shared_dims = split_commas(&attr[open + 1..close]);
                }
                _ => {
                    let msg = format!("unsupported attribute `{attr}`");
                    return Err(CompileError::parse(location, msg));
                }
            }
        }
        let mut out = vec![];
        for entity in split_commas(entities) {
            let (entity, init) = match entity.split_once('=') {
                Some((entity, init)) => (entity.trim().to_string(), Some(init.trim().to_string())),
                None => (entity, None),
            };
            let (name, dims) = match entity.find('(') {
                Some(open) => {
                    let close = matching_paren(&entity, open).unwrap_or(entity.len());
                    let name = entity[..open].trim().to_string();
                    (name, split_commas(&entity[open + 1..close]))
                }
                None => (entity.trim().to_string(), shared_dims.clone()),
            };
            let is_arg = self
                .current
                .as_ref()
                .is_some_and(|sub| sub.args.contains(&name));
            if !dims.is_empty() {
                self.arrays.insert(name.clone());
            }
            if is_arg {
                let constant = if intent_in { "const " } else { "" };
                let param = if dims.is_empty() {
                    format!("{constant}{typ} {name}")
                } else {
                    format!("{constant}{typ} *{name}")
                };
                if let Some(sub) = self.current.as_mut() {
                    sub.arg_types.insert(name, param);
                }
                continue;
            }
            let mut decl = String::new();
            for qualifier in &qualifiers {
                decl.push_str(qualifier);
                decl.push(' ');
            }
            decl.push_str(&format!("{typ} {name}"));
            for dim in dims.iter().rev() {
                if dim.trim() == ":" {
                    let msg = format!("assumed-shape local `{name}`");
                    return Err(CompileError::parse(location, msg));
                }
                decl.push_str(&format!("[{}]", self.expression(dim)));
            }
            if let Some(init) = init {
                decl.push_str(&format!(" = {}", self.expression(&init)));
            }
            decl.push(';');
            out.push(decl);
        }
        Ok(out.join(" "))
    }
    /// Translate operators, strings and one-based array subscripts.
    fn expression(&self, s: &str) -> String {
        let mut out = String::new();
        let chars = s.char_indices().collect::<Vec<_>>();
        let mut k = 0;
        while k < chars.len() {
            let (i, c) = chars[k];
            if c == '\'' || c == '"' {
                let end = s[i + 1..].find(c).map_or(s.len(), |e| i + 1 + e);
                out.push('"');
                out.push_str(&s[i + 1..end.min(s.len())]);
                out.push('"');
                k = chars.iter().position(|(j, _)| *j > end).unwrap_or(chars.len());
                continue;
            }
            if c == '.' {
                let rest = s[i..].to_ascii_lowercase();
                if let Some((op, replacement)) = DOT_OPERATORS.iter().find(|(op, _)| rest.starts_with(op)) {
                    out.push_str(replacement);
                    k += op.len();
                    continue;
                }
            }
            if c == '/' && s[i + 1..].starts_with('=') {
                out.push_str("!=");
                k += 2;
                continue;
            }
            if c.is_ascii_alphabetic() || c == '_' {
                let end = s[i..]
                    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                    .map_or(s.len(), |e| i + e);
                let name = &s[i..end];
                let after = s[end..].trim_start();
                let open = end + (s[end..].len() - after.len());
                if self.arrays.contains(name) && after.starts_with('(') {
                    if let Some(close) = matching_paren(s, open) {
                        out.push_str(name);
                        for index in split_commas(&s[open + 1..close]).iter().rev() {
                            let index = self.expression(index);
                            if is_simple(&index) {
                                out.push_str(&format!("[{index} - 1]"));
                            } else {
                                out.push_str(&format!("[({index}) - 1]"));
                            }
                        }
                        k = chars.iter().position(|(j, _)| *j > close).unwrap_or(chars.len());
                        continue;
                    }
                }
                out.push_str(name);
                k = chars.iter().position(|(j, _)| *j >= end).unwrap_or(chars.len());
                continue;
            }
            out.push(c);
            k += 1;
        }
        out
    }
}

//! Macro table, macro expansion and conditional compilation.

use crate::config::Backend;
use crate::error::CompileError;
use crate::frontend::dialect::SourceDialect;
use crate::frontend::eval::evaluate_condition;
use crate::frontend::scanner::Scanner;
use crate::frontend::token::Location;
use crate::frontend::token::Token;
use crate::frontend::token::TokenKind;
use anyhow::Result;
use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use tracing::debug;
use tracing::warn;

/// Bound on nested expansions before a macro is considered runaway.
const MAX_EXPANSION_DEPTH: usize = 128;
/// Bound on nested `#include`s.
const MAX_INCLUDE_DEPTH: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MacroState {
    /// Substituted wherever the name appears.
    Object,
    /// Substituted where the name is followed by an argument list.
    Function,
    /// Only visible to `#if` conditions; kept as-is in code.
    ConditionalOnly,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MacroDef {
    pub name: String,
    pub params: Vec<String>,
    pub variadic: bool,
    pub body: Vec<Token>,
    pub state: MacroState,
    pub builtin: bool,
}

fn relocate(tokens: &[Token], location: Location) -> Vec<Token> {
    tokens
        .iter()
        .map(|t| Token::new(t.kind, t.lexeme.clone(), location))
        .collect()
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => (),
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl MacroDef {
    pub fn object(name: &str, body: &str) -> Result<MacroDef> {
        Ok(MacroDef {
            name: name.to_string(),
            params: vec![],
            variadic: false,
            body: Scanner::scan_fragment(body)?,
            state: MacroState::Object,
            builtin: false,
        })
    }
    /// Parse the text after `#define`, such as `SQR(x) ((x)*(x))`.
    ///
    /// A macro is function-like only when `(` directly follows the name.
    pub fn parse(text: &str, location: Location) -> Result<MacroDef> {
        let text = text.trim_start();
        let name_len = text
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(text.len());
        let name = &text[..name_len];
        if !is_identifier(name) {
            return Err(CompileError::macros(location, "macro name missing in #define"));
        }
        let rest = &text[name_len..];
        let (params, variadic, body, state) = if let Some(rest) = rest.strip_prefix('(') {
            let close = match rest.find(')') {
                Some(close) => close,
                None => {
                    let msg = format!("unterminated parameter list of macro `{name}`");
                    return Err(CompileError::macros(location, msg));
                }
            };
            let mut params = vec![];
            let mut variadic = false;
            let list = rest[..close].trim();
            if !list.is_empty() {
                for param in list.split(',') {
                    let param = param.trim();
                    if param == "..." {
                        variadic = true;
                    } else if is_identifier(param) && !variadic {
                        params.push(param.to_string());
                    } else {
                        let msg = format!("invalid parameter `{param}` of macro `{name}`");
                        return Err(CompileError::macros(location, msg));
                    }
                }
            }
            (params, variadic, &rest[close + 1..], MacroState::Function)
        } else {
            (vec![], false, rest, MacroState::Object)
        };
        let body = relocate(&Scanner::scan_fragment(body)?, location);
        Ok(MacroDef {
            name: name.to_string(),
            params,
            variadic,
            body,
            state,
            builtin: false,
        })
    }
    fn param_index(&self, name: &str) -> Option<usize> {
        match self.params.iter().position(|p| p == name) {
            Some(index) => Some(index),
            None if self.variadic && name == "__VA_ARGS__" => Some(self.params.len()),
            None => None,
        }
    }
    /// Check the arity and fold variadic arguments into one.
    fn bind(&self, mut args: Vec<Vec<Token>>, location: Location) -> Result<Vec<Vec<Token>>> {
        if self.params.is_empty() && args.len() == 1 && args[0].is_empty() {
            args.clear();
        }
        if self.variadic {
            if args.len() < self.params.len() {
                let msg = format!(
                    "macro `{}` expects at least {} arguments, got {}",
                    self.name,
                    self.params.len(),
                    args.len()
                );
                return Err(CompileError::macros(location, msg));
            }
            let rest = args.split_off(self.params.len());
            let mut joined = vec![];
            for (i, arg) in rest.into_iter().enumerate() {
                if i > 0 {
                    joined.push(Token::new(TokenKind::Operator, ",".to_string(), location));
                }
                joined.extend(arg);
            }
            args.push(joined);
        } else if args.len() != self.params.len() {
            let msg = format!(
                "macro `{}` expects {} arguments, got {}",
                self.name,
                self.params.len(),
                args.len()
            );
            return Err(CompileError::macros(location, msg));
        }
        Ok(args)
    }
    fn stringify(arg: &[Token], location: Location) -> Token {
        let text = arg
            .iter()
            .map(|t| t.lexeme.replace('\\', "\\\\").replace('"', "\\\""))
            .collect::<Vec<_>>()
            .join(" ");
        Token::new(TokenKind::String, format!("\"{text}\""), location)
    }
    fn paste(lhs: &Token, rhs: &Token, location: Location) -> Result<Token> {
        let text = format!("{}{}", lhs.lexeme, rhs.lexeme);
        let tokens = Scanner::scan_fragment(&text)?;
        match tokens.as_slice() {
            [token] => Ok(Token::new(token.kind, token.lexeme.clone(), location)),
            _ => {
                let msg = format!("pasting `{}` and `{}` does not give a token", lhs, rhs);
                Err(CompileError::macros(location, msg))
            }
        }
    }
    /// Replace parameters in the body by the given arguments.
    fn substitute(
        &self,
        raw: &[Vec<Token>],
        expanded: &[Vec<Token>],
        location: Location,
    ) -> Result<Vec<Token>> {
        let body = &self.body;
        let mut out: Vec<Token> = vec![];
        let mut i = 0;
        while i < body.len() {
            let token = &body[i];
            if token.kind == TokenKind::Operator && token.is("#") {
                if let Some(p) = body.get(i + 1).and_then(|t| self.param_index(&t.lexeme)) {
                    out.push(Self::stringify(&raw[p], location));
                    i += 2;
                    continue;
                }
            }
            if token.kind == TokenKind::Operator && token.is("##") {
                let next = match body.get(i + 1) {
                    Some(next) => next,
                    None => {
                        let msg = format!("`##` at the end of macro `{}`", self.name);
                        return Err(CompileError::macros(location, msg));
                    }
                };
                let mut rhs = match self.param_index(&next.lexeme) {
                    Some(p) => raw[p].clone(),
                    None => vec![next.clone()],
                };
                match (out.pop(), rhs.is_empty()) {
                    (Some(lhs), false) => {
                        let first = rhs.remove(0);
                        out.push(Self::paste(&lhs, &first, location)?);
                    }
                    (Some(lhs), true) => out.push(lhs),
                    (None, _) => (),
                }
                out.extend(relocate(&rhs, location));
                i += 2;
                continue;
            }
            if token.is_identifier() {
                if let Some(p) = self.param_index(&token.lexeme) {
                    let pasted = body.get(i + 1).is_some_and(|t| t.is("##"));
                    let arg = if pasted { &raw[p] } else { &expanded[p] };
                    out.extend(relocate(arg, location));
                    i += 1;
                    continue;
                }
            }
            out.push(Token::new(token.kind, token.lexeme.clone(), location));
            i += 1;
        }
        Ok(out)
    }
}

/// Collect the arguments of a macro invocation.
///
/// `open` is the index of the opening parenthesis. Returns the arguments and
/// the index of the closing parenthesis.
fn collect_arguments(
    tokens: &[Token],
    open: usize,
    name: &str,
    location: Location,
) -> Result<(Vec<Vec<Token>>, usize)> {
    let mut depth = 0;
    let mut args = vec![];
    let mut current = vec![];
    for (j, token) in tokens.iter().enumerate().skip(open) {
        match token.kind {
            TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => {
                depth += 1;
                if depth == 1 {
                    continue;
                }
            }
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                depth -= 1;
                if depth == 0 {
                    args.push(current);
                    return Ok((args, j));
                }
            }
            _ => {
                if depth == 1 && token.is(",") {
                    args.push(std::mem::take(&mut current));
                    continue;
                }
            }
        }
        current.push(token.clone());
    }
    let msg = format!("unterminated argument list for macro `{name}`");
    Err(CompileError::macros(location, msg))
}

/// The macros visible in one compilation unit.
#[derive(Clone, Debug, Default)]
pub struct MacroTable {
    macros: HashMap<String, MacroDef>,
}

impl MacroTable {
    pub fn new() -> Self {
        Self::default()
    }
    fn builtin(&mut self, mut def: MacroDef) {
        def.builtin = true;
        self.macros.insert(def.name.clone(), def);
    }
    /// A table holding the backend markers and the OCCA keyword aliases.
    pub fn with_builtins(backend: Backend) -> Result<Self> {
        let mut table = MacroTable::new();
        let markers = [
            ("OCCA_USING_SERIAL", backend == Backend::Serial),
            ("OCCA_USING_OPENMP", backend == Backend::OpenMP),
            ("OCCA_USING_PTHREADS", backend == Backend::Pthreads),
            ("OCCA_USING_CUDA", backend == Backend::CUDA),
            ("OCCA_USING_OPENCL", backend == Backend::OpenCL),
            ("OCCA_USING_CPU", !backend.is_gpu()),
            ("OCCA_USING_GPU", backend.is_gpu()),
        ];
        for (name, active) in markers {
            let mut def = MacroDef::object(name, if active { "1" } else { "0" })?;
            def.state = MacroState::ConditionalOnly;
            table.builtin(def);
        }
        let aliases = [
            ("occaKernel", "kernel"),
            ("occaShared", "shared"),
            ("occaExclusive", "exclusive"),
            ("occaPrivate", "exclusive"),
            ("occaConst", "const"),
            ("occaRestrict", "restrict"),
            ("occaVolatile", "volatile"),
            ("occaFunction", ""),
            ("occaLocalMemFence", "localMemFence"),
            ("occaGlobalMemFence", "globalMemFence"),
        ];
        for (name, body) in aliases {
            table.builtin(MacroDef::object(name, body)?);
        }
        table.builtin(MacroDef::parse(
            "occaBarrier(FENCE) barrier(FENCE)",
            Location::default(),
        )?);
        Ok(table)
    }
    /// Register a macro. Builtins cannot be redefined.
    pub fn define(&mut self, def: MacroDef) {
        if let Some(existing) = self.macros.get(&def.name) {
            if existing.builtin {
                warn!("Ignoring redefinition of builtin macro `{}`", def.name);
                return;
            }
        }
        debug!("Defining macro `{}`", def.name);
        self.macros.insert(def.name.clone(), def);
    }
    pub fn undefine(&mut self, name: &str) {
        match self.macros.get(name) {
            Some(def) if def.builtin => warn!("Ignoring #undef of builtin macro `{name}`"),
            Some(_) => {
                self.macros.remove(name);
            }
            None => (),
        }
    }
    pub fn get(&self, name: &str) -> Option<&MacroDef> {
        self.macros.get(name)
    }
    pub fn is_defined(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }
    pub fn len(&self) -> usize {
        self.macros.len()
    }
    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }
    fn expandable(&self, token: &Token, condition: bool) -> Option<&MacroDef> {
        if !token.is_identifier() {
            return None;
        }
        match self.macros.get(&token.lexeme) {
            Some(def) if def.state == MacroState::ConditionalOnly && !condition => None,
            other => other,
        }
    }
    fn expand_tokens(&self, tokens: &[Token], depth: usize, condition: bool) -> Result<Vec<Token>> {
        let mut out = Vec::with_capacity(tokens.len());
        let mut i = 0;
        while i < tokens.len() {
            let token = &tokens[i];
            let def = match self.expandable(token, condition) {
                Some(def) => def,
                None => {
                    out.push(token.clone());
                    i += 1;
                    continue;
                }
            };
            if depth >= MAX_EXPANSION_DEPTH {
                let msg = format!(
                    "expansion of macro `{}` exceeds {MAX_EXPANSION_DEPTH} levels; is it self-referential?",
                    def.name
                );
                return Err(CompileError::macros(token.location, msg));
            }
            if def.state != MacroState::Function {
                let body = relocate(&def.body, token.location);
                out.extend(self.expand_tokens(&body, depth + 1, condition)?);
                i += 1;
                continue;
            }
            if !tokens
                .get(i + 1)
                .is_some_and(|t| t.kind == TokenKind::LParen)
            {
                out.push(token.clone());
                i += 1;
                continue;
            }
            let (args, end) = collect_arguments(tokens, i + 1, &def.name, token.location)?;
            let raw = def.bind(args, token.location)?;
            let expanded = raw
                .iter()
                .map(|arg| self.expand_tokens(arg, depth + 1, condition))
                .collect::<Result<Vec<_>>>()?;
            let body = def.substitute(&raw, &expanded, token.location)?;
            out.extend(self.expand_tokens(&body, depth + 1, condition)?);
            i = end + 1;
        }
        Ok(out)
    }
    /// Expand all macros in a code token sequence.
    pub fn expand(&self, tokens: &[Token]) -> Result<Vec<Token>> {
        self.expand_tokens(tokens, 0, false)
    }
    /// Evaluate the expression of an `#if` or `#elif`.
    pub fn evaluate(&self, text: &str, location: Location) -> Result<bool> {
        let tokens = relocate(&Scanner::scan_fragment(text)?, location);
        let mut resolved = vec![];
        let mut i = 0;
        while i < tokens.len() {
            let token = &tokens[i];
            if !token.is("defined") {
                resolved.push(token.clone());
                i += 1;
                continue;
            }
            let (name, next) = match (tokens.get(i + 1), tokens.get(i + 2), tokens.get(i + 3)) {
                (Some(open), Some(name), Some(close))
                    if open.kind == TokenKind::LParen && close.kind == TokenKind::RParen =>
                {
                    (name, i + 4)
                }
                (Some(name), _, _) if name.is_identifier() => (name, i + 2),
                _ => return Err(CompileError::macros(location, "malformed `defined`")),
            };
            let value = if self.is_defined(&name.lexeme) { "1" } else { "0" };
            resolved.push(Token::new(TokenKind::Integer, value.to_string(), location));
            i = next;
        }
        let expanded = self.expand_tokens(&resolved, 0, true)?;
        evaluate_condition(&expanded)
    }
}

struct Conditional {
    parent_active: bool,
    /// Whether an earlier branch of this chain was taken.
    taken: bool,
    active: bool,
    seen_else: bool,
    location: Location,
}

fn split_directive(lexeme: &str) -> (&str, &str) {
    let text = lexeme.trim_start_matches('#').trim_start();
    let end = text
        .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .unwrap_or(text.len());
    (&text[..end], text[end..].trim())
}

/// Runs directives and expands macros over a token sequence.
///
/// Inactive conditional branches are dropped, `#pragma` lines are kept as
/// directive tokens and all other directives are consumed.
pub struct Preprocessor<'a> {
    table: MacroTable,
    dialect: &'a dyn SourceDialect,
    include_dirs: &'a [PathBuf],
    depth: usize,
}

impl<'a> Preprocessor<'a> {
    pub fn new(
        table: MacroTable,
        dialect: &'a dyn SourceDialect,
        include_dirs: &'a [PathBuf],
    ) -> Self {
        Preprocessor {
            table,
            dialect,
            include_dirs,
            depth: 0,
        }
    }
    pub fn table(&self) -> &MacroTable {
        &self.table
    }
    pub fn run(&mut self, tokens: Vec<Token>, dir: Option<&Path>) -> Result<Vec<Token>> {
        let mut output = vec![];
        let mut pending = vec![];
        let mut stack: Vec<Conditional> = vec![];
        for token in tokens {
            let active = stack.last().map_or(true, |c| c.active);
            if token.kind != TokenKind::Directive {
                if active {
                    pending.push(token);
                }
                continue;
            }
            let location = token.location;
            let (name, rest) = split_directive(&token.lexeme);
            match name {
                "if" | "ifdef" | "ifndef" => {
                    let value = active && self.condition(name, rest, location)?;
                    stack.push(Conditional {
                        parent_active: active,
                        taken: value,
                        active: value,
                        seen_else: false,
                        location,
                    });
                }
                "elif" | "else" | "endif" => {
                    let top = match stack.last_mut() {
                        Some(top) if !(top.seen_else && name != "endif") => top,
                        Some(_) => {
                            let msg = format!("#{name} after #else");
                            return Err(CompileError::macros(location, msg));
                        }
                        None => {
                            let msg = format!("#{name} without #if");
                            return Err(CompileError::macros(location, msg));
                        }
                    };
                    match name {
                        "elif" => {
                            if top.parent_active && !top.taken {
                                let value = self.table.evaluate(rest, location)?;
                                top.active = value;
                                top.taken = value;
                            } else {
                                top.active = false;
                            }
                        }
                        "else" => {
                            top.active = top.parent_active && !top.taken;
                            top.taken = true;
                            top.seen_else = true;
                        }
                        _ => {
                            stack.pop();
                        }
                    }
                }
                _ if !active => (),
                _ => {
                    output.extend(self.table.expand(&pending)?);
                    pending.clear();
                    self.directive(name, rest, &token, dir, &mut output)?;
                }
            }
        }
        if let Some(open) = stack.last() {
            return Err(CompileError::macros(
                open.location,
                "unterminated conditional: missing #endif",
            ));
        }
        output.extend(self.table.expand(&pending)?);
        Ok(output)
    }
    fn condition(&self, name: &str, rest: &str, location: Location) -> Result<bool> {
        match name {
            "ifdef" => Ok(self.table.is_defined(rest)),
            "ifndef" => Ok(!self.table.is_defined(rest)),
            _ => self.table.evaluate(rest, location),
        }
    }
    fn directive(
        &mut self,
        name: &str,
        rest: &str,
        token: &Token,
        dir: Option<&Path>,
        output: &mut Vec<Token>,
    ) -> Result<()> {
        let location = token.location;
        match name {
            "define" => self.table.define(MacroDef::parse(rest, location)?),
            "undef" => self.table.undefine(rest),
            "include" => output.extend(self.include(rest, location, dir)?),
            "pragma" => output.push(token.clone()),
            "error" => {
                let msg = format!("#error {rest}");
                return Err(CompileError::macros(location, msg));
            }
            "warning" | "line" => warn!("Ignoring #{name} {rest}"),
            "" => (),
            _ => {
                let msg = format!("unknown directive `#{name}`");
                return Err(CompileError::macros(location, msg));
            }
        }
        Ok(())
    }
    fn resolve_include(&self, rest: &str, dir: Option<&Path>) -> Option<PathBuf> {
        let (file, local) = if let Some(file) = rest.strip_prefix('"') {
            (file.trim_end_matches('"'), true)
        } else if let Some(file) = rest.strip_prefix('<') {
            (file.trim_end_matches('>'), false)
        } else {
            return None;
        };
        let mut candidates = vec![];
        if local {
            if let Some(dir) = dir {
                candidates.push(dir.join(file));
            }
        }
        candidates.extend(self.include_dirs.iter().map(|d| d.join(file)));
        candidates.into_iter().find(|path| path.is_file())
    }
    fn include(&mut self, rest: &str, location: Location, dir: Option<&Path>) -> Result<Vec<Token>> {
        if self.depth >= MAX_INCLUDE_DEPTH {
            let msg = format!("#include nested deeper than {MAX_INCLUDE_DEPTH} levels");
            return Err(CompileError::macros(location, msg));
        }
        let path = match self.resolve_include(rest, dir) {
            Some(path) => path,
            None => {
                let msg = format!("cannot find include {rest}");
                return Err(CompileError::macros(location, msg));
            }
        };
        debug!("Including {}", path.display());
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                let msg = format!("cannot read {}: {e}", path.display());
                return Err(CompileError::macros(location, msg));
            }
        };
        let tokens = self.dialect.scan(&text)?;
        self.depth += 1;
        let result = self.run(tokens, path.parent());
        self.depth -= 1;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::dialect::CDialect;
    use crate::frontend::node::parse_nodes;
    use crate::frontend::node::to_source;
    use crate::frontend::token::Token;

    fn preprocess(src: &str) -> Result<String> {
        let table = MacroTable::with_builtins(Backend::CUDA)?;
        let mut preprocessor = Preprocessor::new(table, &CDialect, &[]);
        let tokens = preprocessor.run(Scanner::scan(src)?, None)?;
        let nodes = crate::frontend::node::group(tokens)?;
        Ok(to_source(&nodes))
    }
    fn lexemes(tokens: &[Token]) -> Vec<String> {
        tokens.iter().map(|t| t.lexeme.clone()).collect()
    }

    #[test]
    fn test_function_macro() {
        let actual = preprocess("#define SQR(x) ((x)*(x))\ny = SQR(a+1);").unwrap();
        let expected = to_source(&parse_nodes("y = ((a+1)*(a+1));").unwrap());
        assert_eq!(actual, expected);
        assert_eq!(actual, "y = ((a + 1) * (a + 1));");

        let actual = preprocess("#define MAX(a, b) ((a) > (b) ? (a) : (b))\nMAX(SQR, 2)").unwrap();
        assert_eq!(actual, "((SQR) > (2) ? (SQR) : (2))");
    }

    #[test]
    fn test_stringify_and_paste() {
        let src = "#define NAME(x) x ## _kernel\n#define STR(x) #x\nNAME(add) STR(a+b)";
        let actual = preprocess(src).unwrap();
        assert_eq!(actual, "add_kernel \"a + b\"");

        let src = "#define CALL(f, ...) f(__VA_ARGS__)\nCALL(g, 1, 2);";
        assert_eq!(preprocess(src).unwrap(), "g(1, 2);");
    }

    #[test]
    fn test_conditionals() {
        let src = indoc::indoc! {"
            #define N 16
            #if N > 8 && defined(N)
            a;
            #elif 1
            b;
            #else
            c;
            #endif
            #ifdef OCCA_USING_GPU
            gpu;
            #endif
            #if OCCA_USING_OPENMP
            omp;
            #endif
            #ifndef MISSING
            d;
            #endif
        "};
        assert_eq!(preprocess(src).unwrap(), "a; gpu; d;");
    }

    #[test]
    fn test_pragma_is_kept() {
        let table = MacroTable::with_builtins(Backend::CUDA).unwrap();
        let mut preprocessor = Preprocessor::new(table, &CDialect, &[]);
        let src = "#define N 4\n#pragma unroll 4\nx = N;";
        let tokens = preprocessor.run(Scanner::scan(src).unwrap(), None).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Directive);
        assert_eq!(tokens[0].lexeme, "#pragma unroll 4");
        assert_eq!(tokens[0].location.line(), 2);
        assert_eq!(lexemes(&tokens[1..]), vec!["x", "=", "4", ";"]);
    }

    #[test]
    fn test_errors() {
        let err = preprocess("#define X X + 1\nint y = X;").unwrap_err();
        let err = CompileError::find(&err).unwrap();
        assert!(err.is_macro());
        assert!(err.message().contains("self-referential"));
        assert_eq!(err.location().line(), 2);

        let err = preprocess("#if 1\na;").unwrap_err();
        assert!(err.to_string().contains("missing #endif"));
        assert!(preprocess("#endif").is_err());
        assert!(preprocess("#if (1\n#endif").is_err());
        assert!(preprocess("#define F(a, b) a\nF(1);").is_err());
        assert!(preprocess("#define F(a) a\nF(1;").is_err());
        assert!(preprocess("#error stop here").is_err());
    }

    #[test]
    fn test_builtins() {
        let mut table = MacroTable::with_builtins(Backend::Serial).unwrap();
        table.define(MacroDef::object("OCCA_USING_GPU", "1").unwrap());
        assert!(!table.evaluate("OCCA_USING_GPU", Location::default()).unwrap());
        table.undefine("occaKernel");
        let tokens = Scanner::scan("occaKernel void f(occaConst int *a) { occaBarrier(occaLocalMemFence); }").unwrap();
        let expanded = table.expand(&tokens).unwrap();
        assert_eq!(
            lexemes(&expanded)[..9],
            ["kernel", "void", "f", "(", "const", "int", "*", "a", ")"]
        );
        assert!(lexemes(&expanded).contains(&"localMemFence".to_string()));
        // Backend markers are left alone in code.
        let tokens = Scanner::scan("x = OCCA_USING_GPU;").unwrap();
        assert_eq!(lexemes(&table.expand(&tokens).unwrap())[2], "OCCA_USING_GPU");
    }

    #[test]
    fn test_include() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("defs.h"), "#define TILE 16\n").unwrap();
        let src = "#include \"defs.h\"\nint a[TILE];";
        let table = MacroTable::with_builtins(Backend::OpenMP).unwrap();
        let mut preprocessor = Preprocessor::new(table, &CDialect, &[]);
        let tokens = preprocessor
            .run(Scanner::scan(src).unwrap(), Some(dir.path()))
            .unwrap();
        assert_eq!(lexemes(&tokens), vec!["int", "a", "[", "16", "]", ";"]);
        assert!(preprocessor.table().is_defined("TILE"));

        let mut preprocessor = Preprocessor::new(MacroTable::new(), &CDialect, &[]);
        let err = preprocessor
            .run(Scanner::scan("#include <missing.h>").unwrap(), None)
            .unwrap_err();
        assert!(err.to_string().contains("cannot find include"));
    }
}

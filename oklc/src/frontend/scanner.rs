use crate::error::CompileError;
use crate::frontend::token::Location;
use crate::frontend::token::Token;
use crate::frontend::token::TokenKind;
use anyhow::Result;

/// Multi-character operators, longest first.
const OPERATORS: &[&str] = &[
    ">>=", "<<=", "...", "->", "++", "--", "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "+=",
    "-=", "*=", "/=", "%=", "&=", "|=", "^=", "##", "::",
];

const SINGLE_OPERATORS: &str = "+-*/%<>=!&|^~?:;,.#@";

/// Splits C-shaped source text into tokens.
///
/// Comments and whitespace are dropped. A `#` that starts a line begins a
/// directive; the whole logical line (continuations joined) becomes a single
/// [TokenKind::Directive] token so that the macro engine can process it.
pub struct Scanner {
    source: Vec<char>,
    tokens: Vec<Token>,
    start: usize,
    current: usize,
    line: usize,
    column: usize,
    start_location: Location,
    at_line_start: bool,
}

impl Scanner {
    fn new(source: &str) -> Self {
        Scanner {
            source: source.chars().collect(),
            tokens: Vec::new(),
            start: 0,
            current: 0,
            line: 1,
            column: 1,
            start_location: Location::new(1, 1),
            at_line_start: true,
        }
    }
    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }
    fn advance(&mut self) -> char {
        let c = self.source[self.current];
        self.current += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        c
    }
    fn peek(&self) -> char {
        self.peek_n(0)
    }
    fn peek_next(&self) -> char {
        self.peek_n(1)
    }
    fn peek_n(&self, n: usize) -> char {
        match self.source.get(self.current + n) {
            Some(c) => *c,
            None => '\0',
        }
    }
    fn location(&self) -> Location {
        Location::new(self.line, self.column)
    }
    fn lexeme(&self) -> String {
        self.source[self.start..self.current].iter().collect()
    }
    fn add_token(&mut self, kind: TokenKind) {
        let lexeme = self.lexeme();
        self.tokens.push(Token::new(kind, lexeme, self.start_location));
    }
    /// The compile driver adds the source snippet.
    fn fail(&self, location: Location, msg: &str) -> anyhow::Error {
        CompileError::lex(location, msg)
    }
    fn line_comment(&mut self) {
        while self.peek() != '\n' && !self.is_at_end() {
            self.advance();
        }
    }
    fn block_comment(&mut self, location: Location) -> Result<()> {
        // Skip the opening `/*`.
        self.advance();
        self.advance();
        loop {
            if self.is_at_end() {
                return Err(self.fail(location, "Unterminated comment"));
            }
            if self.peek() == '*' && self.peek_next() == '/' {
                self.advance();
                self.advance();
                return Ok(());
            }
            self.advance();
        }
    }
    fn number(&mut self) -> Result<()> {
        let mut is_float = self.source[self.start] == '.';
        if self.source[self.start] == '0' && matches!(self.peek(), 'x' | 'X') {
            self.advance();
            while self.peek().is_ascii_hexdigit() {
                self.advance();
            }
        } else {
            while self.peek().is_ascii_digit() {
                self.advance();
            }
            if self.peek() == '.' {
                is_float = true;
                self.advance();
                while self.peek().is_ascii_digit() {
                    self.advance();
                }
            }
            if matches!(self.peek(), 'e' | 'E')
                && (self.peek_next().is_ascii_digit()
                    || (matches!(self.peek_next(), '+' | '-') && self.peek_n(2).is_ascii_digit()))
            {
                is_float = true;
                self.advance();
                self.advance();
                while self.peek().is_ascii_digit() {
                    self.advance();
                }
            }
        }
        while matches!(self.peek(), 'u' | 'U' | 'l' | 'L' | 'f' | 'F') {
            if matches!(self.peek(), 'f' | 'F') {
                is_float = true;
            }
            self.advance();
        }
        if is_float {
            self.add_token(TokenKind::Float);
        } else {
            self.add_token(TokenKind::Integer);
        }
        Ok(())
    }
    fn is_identifier_start(c: char) -> bool {
        c.is_ascii_alphabetic() || c == '_'
    }
    fn is_identifier(c: char) -> bool {
        c.is_ascii_alphanumeric() || c == '_'
    }
    fn identifier(&mut self) -> Result<()> {
        while Scanner::is_identifier(self.peek()) {
            self.advance();
        }
        self.add_token(TokenKind::Identifier);
        Ok(())
    }
    fn quoted(&mut self, quote: char, kind: TokenKind) -> Result<()> {
        let location = self.start_location;
        loop {
            if self.is_at_end() || self.peek() == '\n' {
                let msg = if kind == TokenKind::String {
                    "Unterminated string"
                } else {
                    "Unterminated character literal"
                };
                return Err(self.fail(location, msg));
            }
            let c = self.advance();
            if c == '\\' {
                if !self.is_at_end() {
                    self.advance();
                }
            } else if c == quote {
                break;
            }
        }
        self.add_token(kind);
        Ok(())
    }
    /// Read a preprocessor line, joining `\` continuations and dropping comments.
    fn directive(&mut self) -> Result<()> {
        let mut text = String::from("#");
        let mut in_string = false;
        while !self.is_at_end() {
            let c = self.peek();
            if c == '\n' {
                break;
            }
            if !in_string && c == '\\' && self.peek_next() == '\n' {
                self.advance();
                self.advance();
                text.push(' ');
                continue;
            }
            if !in_string && c == '/' && self.peek_next() == '/' {
                self.line_comment();
                break;
            }
            if !in_string && c == '/' && self.peek_next() == '*' {
                let location = self.location();
                self.block_comment(location)?;
                text.push(' ');
                continue;
            }
            if c == '"' {
                in_string = !in_string;
            }
            text.push(self.advance());
        }
        self.tokens.push(Token::new(
            TokenKind::Directive,
            text.trim().to_string(),
            self.start_location,
        ));
        Ok(())
    }
    fn operator(&mut self) -> Result<()> {
        for op in OPERATORS {
            let matches = op
                .chars()
                .enumerate()
                .all(|(i, c)| self.peek_n(i) == c);
            if matches {
                for _ in 0..op.len() {
                    self.advance();
                }
                self.add_token(TokenKind::Operator);
                return Ok(());
            }
        }
        let c = self.advance();
        if SINGLE_OPERATORS.contains(c) {
            self.add_token(TokenKind::Operator);
            Ok(())
        } else {
            Err(self.fail(
                self.start_location,
                &format!("Scanning failed starting at: {}", c),
            ))
        }
    }
    fn scan_token(&mut self) -> Result<()> {
        let c = self.peek();
        match c {
            ' ' | '\r' | '\t' => {
                self.advance();
            }
            '\n' => {
                self.advance();
                self.at_line_start = true;
                return Ok(());
            }
            '\\' if self.peek_next() == '\n' => {
                self.advance();
                self.advance();
            }
            '/' if self.peek_next() == '/' => self.line_comment(),
            '/' if self.peek_next() == '*' => self.block_comment(self.start_location)?,
            '#' if self.at_line_start => {
                self.advance();
                self.directive()?;
            }
            '(' | ')' | '[' | ']' | '{' | '}' => {
                self.advance();
                let kind = match c {
                    '(' => TokenKind::LParen,
                    ')' => TokenKind::RParen,
                    '[' => TokenKind::LBracket,
                    ']' => TokenKind::RBracket,
                    '{' => TokenKind::LBrace,
                    _ => TokenKind::RBrace,
                };
                self.add_token(kind);
            }
            '"' => {
                self.advance();
                self.quoted('"', TokenKind::String)?;
            }
            '\'' => {
                self.advance();
                self.quoted('\'', TokenKind::Char)?;
            }
            '.' if self.peek_next().is_ascii_digit() => {
                self.advance();
                self.number()?;
            }
            s if s.is_ascii_digit() => {
                self.advance();
                self.number()?;
            }
            s if Scanner::is_identifier_start(s) => {
                self.advance();
                self.identifier()?;
            }
            _ => self.operator()?,
        }
        if !matches!(c, ' ' | '\r' | '\t') {
            self.at_line_start = false;
        }
        Ok(())
    }
    fn scan_tokens(&mut self) -> Result<()> {
        while !self.is_at_end() {
            self.start = self.current;
            self.start_location = self.location();
            self.scan_token()?;
        }
        Ok(())
    }
    pub fn scan(src: &str) -> Result<Vec<Token>> {
        let mut scanner = Scanner::new(src);
        scanner.scan_tokens()?;
        Ok(scanner.tokens)
    }
    /// Scan text taken from inside a directive, where `#` is an operator.
    pub fn scan_fragment(src: &str) -> Result<Vec<Token>> {
        let mut scanner = Scanner::new(src);
        scanner.at_line_start = false;
        scanner.scan_tokens()?;
        Ok(scanner.tokens)
    }
    /// Render `msg` below the source line that `loc` points into.
    pub fn error(src: &str, loc: &Location, msg: &str) -> String {
        let lines = src.split('\n').collect::<Vec<&str>>();
        let n = loc.line();
        if n == 0 || n > lines.len() {
            return msg.to_string();
        }
        let prev_line = if n > 1 {
            let prev_n = n - 1;
            let prev = lines[prev_n - 1];
            format!("\n{prev_n}  | {prev}")
        } else {
            "".to_string()
        };
        let line = lines[n - 1];
        let line_num_width = 4 + n.to_string().len();
        let err_indent = " ".repeat(loc.column().saturating_sub(1) + line_num_width);
        format!("```{prev_line}\n{n}  | {line}\n{err_indent}^ {msg}\n```")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
        tokens.iter().map(|t| t.kind).collect()
    }
    fn lexemes(tokens: &[Token]) -> Vec<&str> {
        tokens.iter().map(|t| t.lexeme.as_str()).collect()
    }

    #[test]
    fn test_scanner() {
        let tokens = Scanner::scan("a[i] += 1.5f * x->y;").unwrap();
        assert_eq!(
            lexemes(&tokens),
            vec!["a", "[", "i", "]", "+=", "1.5f", "*", "x", "->", "y", ";"]
        );
        assert_eq!(tokens[4].kind, TokenKind::Operator);
        assert_eq!(tokens[5].kind, TokenKind::Float);
        assert_eq!(tokens[0].location, Location::new(1, 1));
        assert_eq!(tokens[4].location, Location::new(1, 6));

        let tokens = Scanner::scan("0x1F 42u 1e3 .5").unwrap();
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Integer,
                TokenKind::Integer,
                TokenKind::Float,
                TokenKind::Float
            ]
        );
    }

    #[test]
    fn test_comments_and_directives() {
        let src = "int a; // trailing\n  #define N \\\n  16 /* size */\n/* block\n comment */ b";
        let tokens = Scanner::scan(src).unwrap();
        assert_eq!(lexemes(&tokens)[..3], ["int", "a", ";"]);
        assert_eq!(tokens[3].kind, TokenKind::Directive);
        let words = tokens[3].lexeme.split_whitespace().collect::<Vec<_>>();
        assert_eq!(words, vec!["#define", "N", "16"]);
        assert_eq!(tokens[4].lexeme, "b");
        assert_eq!(tokens[3].location.line(), 2);
        assert_eq!(tokens[4].location.line(), 5);

        // A `#` in the middle of a line is an operator (stringification).
        let tokens = Scanner::scan("a # b ## c").unwrap();
        assert_eq!(lexemes(&tokens), vec!["a", "#", "b", "##", "c"]);
    }

    #[test]
    fn test_unterminated() {
        let err = Scanner::scan("x = \"hello;\n").unwrap_err();
        let err = CompileError::find(&err).unwrap();
        assert!(err.is_lex());
        assert!(err.message().starts_with("Unterminated string"));

        let err = Scanner::scan("a /* never closed").unwrap_err();
        assert!(err.to_string().contains("Unterminated comment"));

        let err = Scanner::scan("a $ b").unwrap_err();
        assert!(err.to_string().contains("Scanning failed starting at: $"));
    }

    #[test]
    fn test_error_snippet() {
        let src = "kernel void f() {\n  x = 1 $ 2;\n}";
        let text = Scanner::error(src, &Location::new(2, 9), "test");
        let lines = text.split('\n').collect::<Vec<&str>>();
        assert_eq!(lines[0], "```");
        assert_eq!(lines[1], "1  | kernel void f() {");
        assert_eq!(lines[2], "2  |   x = 1 $ 2;");
        assert_eq!(lines[3], format!("{}^ test", " ".repeat(13)));
        assert_eq!(lines[4], "```");
    }
}

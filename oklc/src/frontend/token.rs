use std::fmt::Display;
use std::fmt::Formatter;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    // Identifiers and keywords
    /// foo, for, float4
    Identifier,

    // Literals
    /// 42, 0x2A, 42u
    Integer,
    /// 1.0, 1e-3f
    Float,
    /// "foo"
    String,
    /// 'a'
    Char,

    // Punctuation
    /// +, <<=, ->, ;, ...
    Operator,
    /// (
    LParen,
    /// )
    RParen,
    /// [
    LBracket,
    /// ]
    RBracket,
    /// {
    LBrace,
    /// }
    RBrace,

    /// A full preprocessor line such as `#define N 16`.
    Directive,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Location {
    /// The line number of the token (1-based, 0 for synthesized tokens).
    line: usize,
    /// The column number of the token (1-based).
    column: usize,
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "loc(:{}:{})", self.line, self.column)
    }
}

impl Location {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
    pub fn line(&self) -> usize {
        self.line
    }
    pub fn column(&self) -> usize {
        self.column
    }
    /// Whether the location points into user source.
    ///
    /// Tokens created by passes carry the default location.
    pub fn is_known(&self) -> bool {
        self.line > 0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    /// The kind of token, such as `foo` (Identifier) or `42` (Integer).
    pub kind: TokenKind,
    /// The text of the token exactly as it appears in the source.
    pub lexeme: String,
    pub location: Location,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: String, location: Location) -> Self {
        Self {
            kind,
            lexeme,
            location,
        }
    }
    /// A token that does not originate from user source.
    pub fn synthesized(kind: TokenKind, lexeme: &str) -> Self {
        Self::new(kind, lexeme.to_string(), Location::default())
    }
    pub fn identifier(name: &str) -> Self {
        Self::synthesized(TokenKind::Identifier, name)
    }
    pub fn operator(op: &str) -> Self {
        Self::synthesized(TokenKind::Operator, op)
    }
    pub fn line(&self) -> usize {
        self.location.line()
    }
    pub fn column(&self) -> usize {
        self.location.column()
    }
    /// Whether this is punctuation or a word with the given text.
    ///
    /// String and character literals never match, so `is(";")` is false for
    /// the literal `";"`.
    pub fn is(&self, text: &str) -> bool {
        match self.kind {
            TokenKind::String | TokenKind::Char => false,
            _ => self.lexeme == text,
        }
    }
    pub fn is_identifier(&self) -> bool {
        self.kind == TokenKind::Identifier
    }
    pub fn is_literal(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Integer | TokenKind::Float | TokenKind::String | TokenKind::Char
        )
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.lexeme)
    }
}

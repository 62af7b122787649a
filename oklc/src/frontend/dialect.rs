use crate::frontend::fortran::FortranDialect;
use crate::frontend::scanner::Scanner;
use crate::frontend::token::Token;
use anyhow::Result;
use std::fmt::Display;
use std::str::FromStr;

/// Tokenization and statement-boundary rules of a source language.
///
/// Both dialects end up as C-shaped tokens: a dialect whose statements are
/// delimited by lines and `end` keywords rewrites them into braces and
/// semicolons in [SourceDialect::normalize] before scanning.
pub trait SourceDialect: Send + Sync {
    fn name(&self) -> &'static str;
    /// Rewrite the source into brace/semicolon form.
    ///
    /// Line numbers must be preserved so that errors point at user source.
    fn normalize(&self, src: &str) -> Result<String>;
    fn scan(&self, src: &str) -> Result<Vec<Token>> {
        Scanner::scan(&self.normalize(src)?)
    }
}

pub struct CDialect;

impl SourceDialect for CDialect {
    fn name(&self) -> &'static str {
        "c"
    }
    fn normalize(&self, src: &str) -> Result<String> {
        Ok(src.to_string())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Dialect {
    #[default]
    C,
    Fortran,
}

impl Dialect {
    pub fn rules(&self) -> &'static dyn SourceDialect {
        match self {
            Dialect::C => &CDialect,
            Dialect::Fortran => &FortranDialect,
        }
    }
    /// Guess the dialect from a file extension.
    pub fn from_extension(ext: &str) -> Dialect {
        match ext.to_ascii_lowercase().as_str() {
            "f" | "f90" | "ofl" => Dialect::Fortran,
            _ => Dialect::C,
        }
    }
}

impl Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.rules().name())
    }
}

impl FromStr for Dialect {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "c" | "c++" | "okl" => Ok(Dialect::C),
            "fortran" | "ofl" => Ok(Dialect::Fortran),
            _ => Err(anyhow::anyhow!("Unknown language: {s}")),
        }
    }
}

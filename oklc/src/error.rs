//! Error categories of a compilation unit.
//!
//! Every stage reports failures as a [CompileError] wrapped in an
//! [anyhow::Error]. All errors are fatal for the unit: there is no partial
//! output. Use [CompileError::find] to recover the category from an error
//! chain that picked up context along the way.

use crate::frontend::Location;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// Malformed token, bracket nesting, string or comment.
    #[error("lex error at {}:{}: {message}", location.line(), location.column())]
    Lex { location: Location, message: String },
    /// Unterminated expansion, runaway macro or malformed conditional.
    #[error("macro error at {}:{}: {message}", location.line(), location.column())]
    Macro { location: Location, message: String },
    /// Unrecognized statement shape, redeclaration or unmatched block.
    #[error("parse error at {}:{}: {message}", location.line(), location.column())]
    Parse { location: Location, message: String },
    /// Ill-formed kernel or loop nest.
    #[error("semantic error at {}:{}: {message}", location.line(), location.column())]
    Semantic { location: Location, message: String },
    /// The backend cannot represent a required construct.
    #[error("emit error at {}:{}: {message}", location.line(), location.column())]
    Emit { location: Location, message: String },
}

impl CompileError {
    pub fn lex(location: Location, message: impl Into<String>) -> anyhow::Error {
        CompileError::Lex {
            location,
            message: message.into(),
        }
        .into()
    }
    pub fn macros(location: Location, message: impl Into<String>) -> anyhow::Error {
        CompileError::Macro {
            location,
            message: message.into(),
        }
        .into()
    }
    pub fn parse(location: Location, message: impl Into<String>) -> anyhow::Error {
        CompileError::Parse {
            location,
            message: message.into(),
        }
        .into()
    }
    pub fn semantic(location: Location, message: impl Into<String>) -> anyhow::Error {
        CompileError::Semantic {
            location,
            message: message.into(),
        }
        .into()
    }
    pub fn emit(location: Location, message: impl Into<String>) -> anyhow::Error {
        CompileError::Emit {
            location,
            message: message.into(),
        }
        .into()
    }
    /// Find the first [CompileError] in the chain of `err`.
    pub fn find(err: &anyhow::Error) -> Option<&CompileError> {
        err.chain().find_map(|cause| cause.downcast_ref::<CompileError>())
    }
    pub fn location(&self) -> Location {
        match self {
            CompileError::Lex { location, .. }
            | CompileError::Macro { location, .. }
            | CompileError::Parse { location, .. }
            | CompileError::Semantic { location, .. }
            | CompileError::Emit { location, .. } => *location,
        }
    }
    pub fn message(&self) -> &str {
        match self {
            CompileError::Lex { message, .. }
            | CompileError::Macro { message, .. }
            | CompileError::Parse { message, .. }
            | CompileError::Semantic { message, .. }
            | CompileError::Emit { message, .. } => message,
        }
    }
    pub fn is_lex(&self) -> bool {
        matches!(self, CompileError::Lex { .. })
    }
    pub fn is_macro(&self) -> bool {
        matches!(self, CompileError::Macro { .. })
    }
    pub fn is_parse(&self) -> bool {
        matches!(self, CompileError::Parse { .. })
    }
    pub fn is_semantic(&self) -> bool {
        matches!(self, CompileError::Semantic { .. })
    }
    pub fn is_emit(&self) -> bool {
        matches!(self, CompileError::Emit { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_find_through_context() {
        let err: anyhow::Result<()> = Err(CompileError::semantic(
            Location::new(3, 5),
            "inner loop outside outer loop",
        ));
        let err = err.context("failed to compile <memory>").unwrap_err();
        let found = CompileError::find(&err).unwrap();
        assert!(found.is_semantic());
        assert_eq!(found.location(), Location::new(3, 5));
        assert_eq!(
            found.to_string(),
            "semantic error at 3:5: inner loop outside outer loop"
        );
        assert!(format!("{err:#}").contains("failed to compile <memory>"));
    }
}

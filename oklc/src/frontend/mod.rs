//! From source text to a statement tree.
//!
//! The scanner produces tokens, [node] folds brackets into groups, the
//! [macros] engine runs directives and expansion and the [parser] builds the
//! [StatementTree](crate::ir::StatementTree).

mod dialect;
mod eval;
mod fortran;
mod keywords;
mod macros;
mod node;
mod parser;
mod scanner;
mod token;

pub use dialect::CDialect;
pub use dialect::Dialect;
pub use dialect::SourceDialect;
pub use eval::evaluate_condition;
pub use eval::evaluate_constant;
pub use eval::parse_integer;
pub use eval::Value;
pub use fortran::FortranDialect;
pub use keywords::LanguageTables;
pub use macros::MacroDef;
pub use macros::MacroState;
pub use macros::MacroTable;
pub use macros::Preprocessor;
pub use node::flatten;
pub use node::group;
pub use node::index_identifier;
pub use node::parse_nodes;
pub use node::rename_identifier;
pub use node::split_top_level;
pub use node::to_source;
pub use node::uses_identifier;
pub use node::Delimiter;
pub use node::Group;
pub use node::Node;
pub use parser::insert_source;
pub use parser::parse;
pub use scanner::Scanner;
pub use token::Location;
pub use token::Token;
pub use token::TokenKind;

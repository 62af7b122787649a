//! Statement tree of a compilation unit.
//!
//! Statements and variable descriptors live in one arena ([StatementTree])
//! and refer to each other through [StmtId] and [VarId] indices.

mod display;
mod statement;
mod usage;

pub use display::declarator;
pub use display::parameter;
pub use display::spaces;
pub use display::specifiers;
pub use display::Flavor;
pub use display::OklFlavor;
pub use statement::FunctionSig;
pub use statement::LoopHint;
pub use statement::LoopRole;
pub use statement::LoopTag;
pub use statement::Qualifiers;
pub use statement::Statement;
pub use statement::StatementKind;
pub use statement::StatementTree;
pub use statement::StmtId;
pub use statement::Var;
pub use statement::VarId;
pub use usage::statements_using;
pub use usage::uses_in_statement;
pub use usage::uses_in_subtree;
pub use usage::Access;
pub use usage::VarUse;

//! Semantic analysis: symbol tables, constant folding and word resolution

mod eval;
mod resolver;
mod symbols;

pub use eval::{Evaluator, Folded};
pub use resolver::{Program, Resolver, resolve_source};
pub use symbols::{MemoryRegion, Proc, StructConst, StructVar, SymbolTables, TypedWord};

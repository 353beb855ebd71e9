//! Resolved operation stream
//!
//! A flat list of operations with explicit block boundaries, produced by the
//! resolver and annotated in place by the stack-effect checker.

mod builder;
mod op;

pub use builder::{Block, BlockKind, OpBuilder};
pub use op::{Intrinsic, MemRef, MemberAccess, Op, OpKind, ProcId, Scope, VarRef};

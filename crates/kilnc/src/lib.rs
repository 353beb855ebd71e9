//! Kiln Compiler - front end for the Kiln stack language
//!
//! Turns Kiln source into a fully resolved, type-checked operation stream
//! plus the inferred stack contract of every block, which is everything a
//! code generator needs.
//!
//! ## Architecture
//!
//! The compiler is organized into:
//! - **Common** (`common/`): Shared infrastructure (errors, locations, interning)
//! - **Lexer** (`lexer/`): Token stream
//! - **Types** (`types/`): Value types and struct layout
//! - **IR** (`ir/`): Operations and block matching
//! - **Sema** (`sema/`): Symbol tables, constant folding, word resolution
//! - **Check** (`check/`): Stack-effect type checking and contract inference
//! - **Driver** (`driver/`): Pipeline orchestration

pub mod check;
pub mod common;
pub mod driver;
pub mod ir;
pub mod lexer;
pub mod sema;
pub mod types;

// Re-exports for convenience
pub use check::{BlockContract, ContractTable};
pub use common::{CompileError, CompileResult, DiagnosticReporter, Location, Span};
pub use driver::{CheckedProgram, CompileOptions, Pipeline, compile};
pub use sema::Program;

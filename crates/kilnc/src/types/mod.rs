//! Type system shared by the resolver and the stack-effect checker
//!
//! Every value occupies one 4-byte cell; structs are referenced by address.

mod structs;
mod type_tag;

pub use structs::{Member, StructDef};
pub use type_tag::{CELL_SIZE, StructId, TypeTag, Value, round_to_cell};

//! Struct definitions and layout

use super::type_tag::{CELL_SIZE, TypeTag, Value};
use crate::common::{Location, WordId};

/// One struct member. Members are laid out one cell apart in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub name: WordId,
    pub ty: TypeTag,
    pub default: Value,
}

/// Struct type definition
#[derive(Debug, Clone, PartialEq)]
pub struct StructDef {
    pub name: WordId,
    pub members: Vec<Member>,
    pub loc: Location,
}

impl StructDef {
    pub fn member_index(&self, name: WordId) -> Option<usize> {
        self.members.iter().position(|m| m.name == name)
    }

    /// Byte offset of a member from the start of the struct
    pub fn offset_of(&self, index: usize) -> u32 {
        index as u32 * CELL_SIZE
    }
}

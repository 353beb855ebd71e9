//! Value types tracked by the resolver, evaluator and checker

use std::fmt;

/// Index of a struct definition in declaration order
pub type StructId = usize;

/// Size in bytes of every stack cell and every struct member
pub const CELL_SIZE: u32 = 4;

/// Type of a stack value.
///
/// `Struct(k)` is a reference to an instance of struct `k` in memory.
/// `Any` is a checker wildcard and never the recorded type of a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Int,
    Bool,
    Ptr,
    Any,
    Struct(StructId),
}

impl TypeTag {
    pub fn is_struct(self) -> bool {
        matches!(self, TypeTag::Struct(_))
    }

    /// Zero value used when a declaration elides its initializer
    pub fn zero_value(self) -> Value {
        Value::new(0, self)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTag::Int => write!(f, "int"),
            TypeTag::Bool => write!(f, "bool"),
            TypeTag::Ptr => write!(f, "ptr"),
            TypeTag::Any => write!(f, "any"),
            TypeTag::Struct(k) => write!(f, "struct#{}", k),
        }
    }
}

/// A folded compile-time value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Value {
    pub value: i64,
    pub ty: TypeTag,
}

impl Value {
    /// Result of an initializer that pushed nothing
    pub const ELIDED: Value = Value {
        value: 0,
        ty: TypeTag::Any,
    };

    pub fn new(value: i64, ty: TypeTag) -> Self {
        Self { value, ty }
    }

    pub fn int(value: i64) -> Self {
        Self::new(value, TypeTag::Int)
    }

    pub fn bool(value: bool) -> Self {
        Self::new(i64::from(value), TypeTag::Bool)
    }

    pub fn is_elided(&self) -> bool {
        self.ty == TypeTag::Any
    }
}

/// Round a byte size up to the next multiple of the cell size, `None` past `u32::MAX`
pub fn round_to_cell(size: u32) -> Option<u32> {
    size.checked_next_multiple_of(CELL_SIZE)
}

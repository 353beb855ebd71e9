//! Intrinsic stack signatures

use crate::ir::Intrinsic;
use crate::types::TypeTag;

/// Expected input, listed bottom first
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Slot {
    Exact(TypeTag),
    /// Anything
    Any,
    /// Must match every other `Same` slot in the signature
    Same,
}

/// Produced output, listed bottom first
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Push {
    Exact(TypeTag),
    /// The type the `Same` inputs agreed on
    Same,
    /// Copy of input `i`
    Input(usize),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Signature {
    pub ins: &'static [Slot],
    pub outs: &'static [Push],
}

const INT: Slot = Slot::Exact(TypeTag::Int);
const PUSH_INT: Push = Push::Exact(TypeTag::Int);

impl Signature {
    pub fn of(intrinsic: Intrinsic) -> Self {
        use Intrinsic as I;
        let (ins, outs): (&'static [Slot], &'static [Push]) = match intrinsic {
            I::Add | I::Sub | I::And | I::Or => (&[Slot::Same, Slot::Same], &[Push::Same]),
            I::Mul | I::Div | I::Mod | I::Shl | I::Shr => (&[INT, INT], &[PUSH_INT]),
            I::Eq | I::Ne => (&[Slot::Same, Slot::Same], &[Push::Exact(TypeTag::Bool)]),
            I::Lt | I::Gt | I::Le | I::Ge => (&[INT, INT], &[Push::Exact(TypeTag::Bool)]),
            I::Not => (&[Slot::Exact(TypeTag::Bool)], &[Push::Exact(TypeTag::Bool)]),
            I::Dup => (&[Slot::Any], &[Push::Input(0), Push::Input(0)]),
            I::Drop => (&[Slot::Any], &[]),
            I::Swap => (&[Slot::Any, Slot::Any], &[Push::Input(1), Push::Input(0)]),
            I::Over => (&[Slot::Any, Slot::Any], &[Push::Input(0), Push::Input(1), Push::Input(0)]),
            I::Rot => (
                &[Slot::Any, Slot::Any, Slot::Any],
                &[Push::Input(1), Push::Input(2), Push::Input(0)],
            ),
            I::Load | I::Load8 => (&[Slot::Exact(TypeTag::Ptr)], &[PUSH_INT]),
            I::Store | I::Store8 => (&[INT, Slot::Exact(TypeTag::Ptr)], &[]),
            I::Print => (&[INT], &[]),
        };
        Self { ins, outs }
    }
}

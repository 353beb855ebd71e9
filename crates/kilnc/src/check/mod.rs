//! Stack-effect type checking and block-contract inference

mod checker;
mod signature;
mod stack;

pub use checker::{BlockContract, ContractTable, TypeChecker, check_program};
pub use signature::{Push, Signature, Slot};
pub use stack::{AbstractStack, Frame};

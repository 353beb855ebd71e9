//! Common infrastructure shared by every pass

mod error;
mod intern;
mod span;

pub use error::{CompileError, CompileResult, DiagnosticReporter, Note};
pub use intern::{StrId, StrLit, StringTable, WordId, Words};
pub use span::{LineIndex, Location, Span};

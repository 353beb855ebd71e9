//! Operation stream builder - accumulates resolved operations and matches
//! block openers with their closers

use super::op::{Op, OpKind, ProcId};
use crate::common::{CompileError, CompileResult, Location};

/// Kind of an open control construct
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    If,
    Else,
    Proc(ProcId),
    /// A `let` scope binding this many names
    Let(usize),
}

impl BlockKind {
    pub fn describe(self) -> &'static str {
        match self {
            BlockKind::If => "`if`",
            BlockKind::Else => "`else`",
            BlockKind::Proc(_) => "procedure",
            BlockKind::Let(_) => "`let`",
        }
    }
}

/// An open block on the block stack
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub kind: BlockKind,
    /// Index of the opening operation (`if` for both `if` and `else` blocks)
    pub opener: usize,
    pub loc: Location,
}

/// Builds the flat operation list
#[derive(Debug, Default)]
pub struct OpBuilder {
    ops: Vec<Op>,
    blocks: Vec<Block>,
}

impl OpBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an operation, returning its index
    pub fn emit(&mut self, kind: OpKind, loc: Location) -> usize {
        self.ops.push(Op::new(kind, loc));
        self.ops.len() - 1
    }

    /// Emit an opening operation and push the block it starts
    pub fn open(&mut self, kind: BlockKind, opener: OpKind, loc: Location) -> usize {
        let index = self.emit(opener, loc.clone());
        self.blocks.push(Block {
            kind,
            opener: index,
            loc,
        });
        index
    }

    /// Handle `else`: the innermost block must be a bare `if`
    pub fn open_else(&mut self, loc: Location) -> CompileResult<()> {
        let Some(block) = self.blocks.pop() else {
            return Err(CompileError::structural("`else` without a matching `if`", loc));
        };
        if block.kind != BlockKind::If {
            return Err(CompileError::structural(
                format!("`else` cannot close a {} block", block.kind.describe()),
                loc,
            )
            .with_note(format!("{} opened here", block.kind.describe()), block.loc));
        }
        let opener = block.opener;
        self.emit(OpKind::Else { opener }, loc.clone());
        self.blocks.push(Block {
            kind: BlockKind::Else,
            opener,
            loc,
        });
        Ok(())
    }

    /// Handle `end`. `if`/`else` closers are emitted here; procedure and
    /// `let` closers need symbol-table work, so the caller emits those.
    pub fn close(&mut self, loc: Location) -> CompileResult<Block> {
        let Some(block) = self.blocks.pop() else {
            return Err(CompileError::structural("`end` without an open block", loc));
        };
        let opener = block.opener;
        match block.kind {
            BlockKind::If => {
                self.emit(OpKind::EndIf { opener }, loc);
            }
            BlockKind::Else => {
                self.emit(OpKind::EndElse { opener }, loc);
            }
            BlockKind::Proc(_) | BlockKind::Let(_) => {}
        }
        Ok(block)
    }

    /// Finish the stream; every block must be closed
    pub fn finish(mut self, eof: Location) -> CompileResult<Vec<Op>> {
        if let Some(block) = self.blocks.pop() {
            return Err(CompileError::structural(
                format!("unclosed {} block at end of input", block.kind.describe()),
                eof,
            )
            .with_note(format!("{} opened here", block.kind.describe()), block.loc));
        }
        Ok(self.ops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn loc() -> Location {
        Location::synthetic("test.kln")
    }

    #[test]
    fn test_if_else_end_pairs_with_opener() {
        let mut builder = OpBuilder::new();
        builder.open(BlockKind::Proc(0), OpKind::ProcBegin(0), loc());
        let if_op = builder.open(BlockKind::If, OpKind::If, loc());
        builder.open_else(loc()).unwrap();
        let closed = builder.close(loc()).unwrap();
        assert_eq!(closed.kind, BlockKind::Else);
        assert_eq!(closed.opener, if_op);

        let proc_block = builder.close(loc()).unwrap();
        assert_eq!(proc_block.kind, BlockKind::Proc(0));
        builder.emit(OpKind::ProcEnd { proc: 0, frame: 0 }, loc());

        let ops = builder.finish(loc()).unwrap();
        let kinds: Vec<OpKind> = ops.into_iter().map(|op| op.kind).collect();
        assert_eq!(
            kinds,
            vec![
                OpKind::ProcBegin(0),
                OpKind::If,
                OpKind::Else { opener: 1 },
                OpKind::EndElse { opener: 1 },
                OpKind::ProcEnd { proc: 0, frame: 0 },
            ]
        );
    }

    #[test]
    fn test_end_on_empty_stack() {
        let mut builder = OpBuilder::new();
        let err = builder.close(loc()).unwrap_err();
        assert!(matches!(err, CompileError::Structural { .. }));
    }

    #[test]
    fn test_else_must_follow_if() {
        let mut builder = OpBuilder::new();
        builder.open(BlockKind::Let(2), OpKind::Bind(2), loc());
        let err = builder.open_else(loc()).unwrap_err();
        assert!(matches!(err, CompileError::Structural { .. }));
        assert_eq!(err.notes().len(), 1);
    }

    #[test]
    fn test_unclosed_block_reported_at_finish() {
        let mut builder = OpBuilder::new();
        builder.open(BlockKind::If, OpKind::If, loc());
        let err = builder.finish(loc()).unwrap_err();
        assert!(err.message().contains("unclosed `if`"));
    }
}

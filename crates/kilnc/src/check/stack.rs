//! Abstract stack used by the type checker

use crate::common::Location;
use crate::types::TypeTag;

/// One abstract stack entry: the value's type and where it was pushed
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub ty: TypeTag,
    pub loc: Location,
}

/// Stack of types plus the counters that measure a block's net effect.
///
/// `stack_count` is the height relative to the start of the current block
/// and `min_count` the lowest it has dipped, so `-min_count` is the number
/// of values the block consumed from below its entry height.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AbstractStack {
    frames: Vec<Frame>,
    stack_count: i64,
    min_count: i64,
}

impl AbstractStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents with `types` and start counting from zero
    pub fn seed(&mut self, types: &[TypeTag], loc: &Location) {
        self.frames = types
            .iter()
            .map(|&ty| Frame {
                ty,
                loc: loc.clone(),
            })
            .collect();
        self.reset_counters();
    }

    pub fn push(&mut self, ty: TypeTag, loc: Location) {
        self.frames.push(Frame { ty, loc });
        self.stack_count += 1;
    }

    pub fn pop(&mut self) -> Option<Frame> {
        let frame = self.frames.pop()?;
        self.stack_count -= 1;
        self.min_count = self.min_count.min(self.stack_count);
        Some(frame)
    }

    /// Entry `depth` places below the top (0 = top)
    pub fn peek(&self, depth: usize) -> Option<&Frame> {
        let index = self.frames.len().checked_sub(depth + 1)?;
        self.frames.get(index)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn types(&self) -> Vec<TypeTag> {
        self.frames.iter().map(|f| f.ty).collect()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
        self.reset_counters();
    }

    pub fn stack_count(&self) -> i64 {
        self.stack_count
    }

    pub fn min_count(&self) -> i64 {
        self.min_count
    }

    pub fn reset_counters(&mut self) {
        self.stack_count = 0;
        self.min_count = 0;
    }

    /// Take the counters of an earlier snapshot, keeping the current frames
    pub fn restore_counters(&mut self, from: &AbstractStack) {
        self.stack_count = from.stack_count;
        self.min_count = from.min_count;
    }

    /// Account for a nested block that consumed `ins` and produced `outs`
    pub fn absorb_block(&mut self, ins: usize, outs: usize) {
        self.stack_count -= ins as i64;
        self.min_count = self.min_count.min(self.stack_count);
        self.stack_count += outs as i64;
    }
}

use super::{Frame, FrameType};
use crate::jvm::Label;
use crate::util::ByteVector;
use bitflags::bitflags;
use std::collections::HashMap;

bitflags! {
    /// What is known about a label
    #[derive(Default)]
    pub struct BlockStatus: u8 {
        /// Only marks a position for debug information
        const DEBUG = 0x01;

        /// Position is known
        const RESOLVED = 0x02;

        /// Already put on the work list when computing the maximum stack size
        const PUSHED = 0x04;

        /// Start of a block reached by a jump (or an exception), which needs a stack map frame
        const TARGET = 0x08;

        /// Stack map frame must be written for this block
        const STORE = 0x10;

        /// Reached by the fixed point iteration
        const REACHABLE = 0x20;
    }
}

/// Information carried by a control flow edge
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EdgeKind {
    /// Regular flow. When computing only the maximum stack size, this is the stack size at the
    /// moment of the jump, relative to the input stack size of the source block.
    Normal(i32),

    /// Flow to an exception handler, which starts with just the exception on the stack
    Exception(FrameType),
}

#[derive(Copy, Clone, Debug)]
pub struct Edge {
    pub kind: EdgeKind,
    pub target: usize,
}

/// Jump operand waiting for its label to be resolved
#[derive(Copy, Clone, Debug)]
struct Reference {
    /// Position of the jump opcode, from which the offset is measured
    source: usize,

    /// Position of the operand to patch
    operand: usize,

    wide: bool,
}

/// A label and, if it starts a basic block, everything known about that block
#[derive(Debug, Default)]
pub struct Block {
    pub status: BlockStatus,
    pub position: usize,
    references: Vec<Reference>,

    /// Block holding the frame of this label
    ///
    /// A label visited at the same position as an existing block shares that block (and its
    /// frame) instead of starting a new, empty one.
    pub owner: usize,

    /// Next block in code order
    pub successor: Option<usize>,

    /// Outgoing control flow edges
    pub edges: Vec<Edge>,

    /// Only present when computing frames
    pub frame: Option<Frame>,

    /// Stack size at the start of the block (when computing only the maximum stack size)
    pub input_stack_top: i32,

    /// Maximum stack size relative to `input_stack_top` (when computing only the maximum stack
    /// size)
    pub output_stack_max: i32,
}

/// Every label and block of one method, indexed by position in the arena
#[derive(Debug, Default)]
pub struct Blocks {
    blocks: Vec<Block>,
    labels: HashMap<Label, usize>,
}

impl Blocks {
    pub fn new() -> Blocks {
        Blocks::default()
    }

    /// Index of the block for `label`, added if the label is new
    pub fn index(&mut self, label: Label) -> usize {
        if let Some(index) = self.labels.get(&label) {
            return *index;
        }
        let index = self.blocks.len();
        let mut status = BlockStatus::empty();
        if label.is_debug() {
            status |= BlockStatus::DEBUG;
        }
        self.blocks.push(Block {
            status,
            owner: index,
            ..Block::default()
        });
        self.labels.insert(label, index);
        index
    }

    /// Add a block that no public label refers to
    pub fn fresh(&mut self) -> usize {
        self.index(Label::new())
    }

    pub fn get(&self, index: usize) -> &Block {
        &self.blocks[index]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut Block {
        &mut self.blocks[index]
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Resolved position of a label
    pub fn position(&self, label: Label) -> Option<usize> {
        let block = &self.blocks[*self.labels.get(&label)?];
        if block.status.contains(BlockStatus::RESOLVED) {
            Some(block.position)
        } else {
            None
        }
    }

    /// Block which holds the frame for `index`
    pub fn first(&self, index: usize) -> usize {
        self.blocks[index].owner
    }

    /// Write the offset of `label` relative to `source`, or a placeholder to patch on resolution
    pub fn put_reference(&mut self, label: Label, source: usize, code: &mut ByteVector, wide: bool) {
        let index = self.index(label);
        let block = &mut self.blocks[index];
        if block.status.contains(BlockStatus::RESOLVED) {
            let offset = block.position as isize - source as isize;
            if wide {
                code.put_int(offset as i32);
            } else {
                code.put_short(offset as i16 as u16);
            }
        } else {
            block.references.push(Reference {
                source,
                operand: code.len(),
                wide,
            });
            if wide {
                code.put_int(-1);
            } else {
                code.put_short(0xFFFF);
            }
        }
    }

    /// Fix the position of a label and patch the jumps waiting for it
    ///
    /// Returns the offset of a forward jump which does not fit in its 2 byte operand, if any.
    pub fn resolve(&mut self, index: usize, position: usize, code: &mut ByteVector) -> Option<isize> {
        let block = &mut self.blocks[index];
        block.status |= BlockStatus::RESOLVED;
        block.position = position;

        let mut overflow = None;
        for reference in block.references.drain(..) {
            let offset = position as isize - reference.source as isize;
            if reference.wide {
                code.set_int(reference.operand, offset as i32);
            } else if offset > i16::MAX as isize {
                overflow.get_or_insert(offset);
            } else {
                code.set_short(reference.operand, offset as u16);
            }
        }
        overflow
    }

    /// Walk the blocks in code order, starting from `first`
    pub fn chain(&self, first: usize) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(Some(first), move |index| self.blocks[*index].successor)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn forward_references_are_patched() {
        let mut blocks = Blocks::new();
        let mut code = ByteVector::new();
        let label = Label::new();

        code.put_byte(0xA7);
        blocks.put_reference(label, 0, &mut code, false);
        code.put_byte(0xC8);
        blocks.put_reference(label, 3, &mut code, true);
        code.put_byte(0);

        let index = blocks.index(label);
        assert_eq!(blocks.resolve(index, 8, &mut code), None);
        assert_eq!(code.as_slice(), [0xA7, 0, 8, 0xC8, 0, 0, 0, 5, 0]);
        assert_eq!(blocks.position(label), Some(8));

        // Backward references are written directly
        blocks.put_reference(label, 20, &mut code, false);
        assert_eq!(&code.as_slice()[9..], [0xFF, 0xF4]);
    }

    #[test]
    fn long_forward_jump_is_reported() {
        let mut blocks = Blocks::new();
        let mut code = ByteVector::new();
        let label = Label::new();
        code.put_byte(0xA7);
        blocks.put_reference(label, 0, &mut code, false);
        let index = blocks.index(label);
        assert_eq!(blocks.resolve(index, 40000, &mut code), Some(40000));
    }
}

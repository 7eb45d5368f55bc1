//! VM programs: the instruction set, basic blocks, and the builder.
//!
//! A program is an ordered collection of basic blocks; the first block is
//! the entry. Control flow is CFG-structured: every block ends in a `Jump`,
//! `JumpConditional`, or `Exit`, and block edges are stored as stable
//! `BlockId` handles minted by [`Program::make_block`], never as owning
//! pointers, so loops in the graph are unremarkable.

use std::fmt;

/// 64-bit value held in registers and locals. Arithmetic wraps.
pub type Value = u64;

/// Stable handle to a basic block within its owning [`Program`].
///
/// Handles are compared by identity when resolving branch targets; they
/// stay valid as the program grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockId(pub(crate) usize);

impl BlockId {
    pub(crate) fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// VM instruction.
///
/// Register 0 is the accumulator: every instruction with an implicit
/// operand sources or sinks it there, and the explicit register index names
/// the other register involved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// accumulator <- value
    LoadImmediate(Value),
    /// accumulator <- registers[reg]
    Load(usize),
    /// registers[reg] <- accumulator
    Store(usize),
    /// accumulator <- locals[local]
    GetLocal(usize),
    /// locals[local] <- accumulator
    SetLocal(usize),
    /// accumulator <- accumulator + 1
    Increment,
    /// accumulator <- 1 if registers[reg] < accumulator else 0
    LessThan(usize),
    Jump(BlockId),
    /// Transfers to `true_target` when the accumulator is non-zero.
    JumpConditional {
        true_target: BlockId,
        false_target: BlockId,
    },
    Exit,
}

impl Instruction {
    pub fn is_terminator(self) -> bool {
        matches!(
            self,
            Instruction::Jump(_) | Instruction::JumpConditional { .. } | Instruction::Exit
        )
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::LoadImmediate(value) => write!(f, "LoadImmediate ${value}"),
            Instruction::Load(reg) => write!(f, "Load Reg({reg})"),
            Instruction::Store(reg) => write!(f, "Store Reg({reg})"),
            Instruction::GetLocal(local) => write!(f, "GetLocal {local}"),
            Instruction::SetLocal(local) => write!(f, "SetLocal {local}"),
            Instruction::Increment => write!(f, "Increment"),
            Instruction::LessThan(reg) => write!(f, "LessThan Reg({reg})"),
            Instruction::Jump(target) => write!(f, "Jump {target}"),
            Instruction::JumpConditional {
                true_target,
                false_target,
            } => write!(f, "JumpConditional true:{true_target} false:{false_target}"),
            Instruction::Exit => write!(f, "Exit"),
        }
    }
}

/// Straight-line instruction sequence ending in a terminator.
#[derive(Debug, Clone, Default)]
pub struct BasicBlock {
    instructions: Vec<Instruction>,
}

impl BasicBlock {
    /// Appends `instruction` as the last instruction of the block.
    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }
}

/// Ordered collection of basic blocks; block 0 is the entry.
#[derive(Debug, Clone, Default)]
pub struct Program {
    blocks: Vec<BasicBlock>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a fresh empty block and returns its stable handle.
    pub fn make_block(&mut self) -> BlockId {
        self.blocks.push(BasicBlock::default());
        BlockId(self.blocks.len() - 1)
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.index()]
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> + use<> {
        (0..self.blocks.len()).map(BlockId)
    }

    /// Entry block, if any block has been made.
    pub fn entry(&self) -> Option<BlockId> {
        if self.blocks.is_empty() {
            None
        } else {
            Some(BlockId(0))
        }
    }

    /// Asserts the terminator discipline: the program is non-empty, every
    /// block ends in a terminator, and every branch target is in range.
    pub fn assert_well_formed(&self) {
        assert!(!self.blocks.is_empty(), "program has no blocks");
        for id in self.block_ids() {
            let block = self.block(id);
            let last = block
                .instructions
                .last()
                .unwrap_or_else(|| panic!("block {id} is empty"));
            assert!(
                last.is_terminator(),
                "block {id} does not end in a terminator"
            );
            for instruction in &block.instructions {
                match *instruction {
                    Instruction::Jump(target) => self.assert_target(id, target),
                    Instruction::JumpConditional {
                        true_target,
                        false_target,
                    } => {
                        self.assert_target(id, true_target);
                        self.assert_target(id, false_target);
                    }
                    _ => {}
                }
            }
        }
    }

    fn assert_target(&self, from: BlockId, target: BlockId) {
        assert!(
            target.index() < self.blocks.len(),
            "block {from} jumps to unknown block {target}"
        );
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for id in self.block_ids() {
            writeln!(f, "{id}:")?;
            for instruction in self.block(id).instructions() {
                writeln!(f, "  {instruction}")?;
            }
        }
        Ok(())
    }
}

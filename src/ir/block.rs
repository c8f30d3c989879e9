use std::fmt::{self, Display};

use crate::common::Label;

use super::Instruction;

/// Index of a block inside its [`Program`](super::Program).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub(super) usize);

impl BlockId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct BasicBlock {
    start_label: Option<Label>,
    branch_label: Option<Label>,
    instructions: Vec<Instruction>,
    follow: Vec<BlockId>,
    precede: Vec<BlockId>,
}

impl BasicBlock {
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub(crate) fn instructions_mut(&mut self) -> &mut Vec<Instruction> {
        &mut self.instructions
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn follow(&self) -> &[BlockId] {
        &self.follow
    }

    pub fn precede(&self) -> &[BlockId] {
        &self.precede
    }

    pub fn start_label(&self) -> Option<&Label> {
        self.start_label.as_ref()
    }

    /// Unconditional branch taken after the last instruction.
    pub fn branch_label(&self) -> Option<&Label> {
        self.branch_label.as_ref()
    }

    pub(super) fn add_follow(&mut self, to: BlockId) {
        self.follow.push(to);
    }

    pub(super) fn add_precede(&mut self, from: BlockId) {
        self.precede.push(from);
    }

    pub(super) fn set_start_label(&mut self, label: Label) {
        self.start_label = Some(label);
    }

    pub(super) fn set_branch_label(&mut self, label: Label) {
        self.branch_label = Some(label);
    }

    pub(super) fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }
}

impl Display for BasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(label) = &self.start_label {
            writeln!(f, "{}:", label)?;
        }
        for instruction in &self.instructions {
            writeln!(f, "    {}", instruction)?;
        }
        if let Some(label) = &self.branch_label {
            writeln!(f, "    goto {}", label)?;
        }
        Ok(())
    }
}

use std::{
    collections::HashSet,
    fmt::{self, Display},
    ops::Index,
};

use crate::common::{Label, NameGen, Variable};

use super::{BasicBlock, BlockId, Error, Instruction, InstructionKind};

/// Every basic block of a compilation unit, plus the name generator that
/// lowering and allocation share.
///
/// Blocks live in an arena and refer to each other by [`BlockId`]. Blocks
/// without predecessors are roots: the top-level block and one body block per
/// declared function.
#[derive(Debug)]
pub struct Program {
    blocks: Vec<BasicBlock>,
    current: BlockId,
    names: NameGen,
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

impl Program {
    pub fn new() -> Self {
        Program {
            blocks: vec![BasicBlock::default()],
            current: BlockId(0),
            names: NameGen::new(),
        }
    }

    /// Creates a block and makes it current. With `auto_follow` the previous
    /// current block falls through into it.
    pub fn new_block(&mut self, auto_follow: bool) -> BlockId {
        let id = BlockId(self.blocks.len());
        self.blocks.push(BasicBlock::default());
        if auto_follow {
            self.link(self.current, id);
        }
        self.current = id;
        id
    }

    pub fn current_block(&self) -> BlockId {
        self.current
    }

    pub fn add_instruction(&mut self, instruction: Instruction) {
        let current = self.current;
        self.blocks[current.0].push(instruction);
    }

    pub fn add_instruction_to(
        &mut self,
        block: BlockId,
        instruction: Instruction,
    ) -> Result<(), Error> {
        self.get_mut(block)?.push(instruction);
        Ok(())
    }

    pub fn add_follow(&mut self, from: BlockId, to: BlockId) -> Result<(), Error> {
        self.get(from)?;
        self.get(to)?;
        self.link(from, to);
        Ok(())
    }

    fn link(&mut self, from: BlockId, to: BlockId) {
        self.blocks[from.0].add_follow(to);
        self.blocks[to.0].add_precede(from);
    }

    pub fn new_var(&mut self) -> Variable {
        self.names.new_var()
    }

    pub fn new_label(&mut self, suffix: &str) -> Label {
        self.names.new_label(suffix)
    }

    pub(crate) fn names_mut(&mut self) -> &mut NameGen {
        &mut self.names
    }

    pub fn get(&self, id: BlockId) -> Result<&BasicBlock, Error> {
        self.blocks.get(id.0).ok_or(Error::DanglingBlock(id))
    }

    pub(crate) fn get_mut(&mut self, id: BlockId) -> Result<&mut BasicBlock, Error> {
        self.blocks.get_mut(id.0).ok_or(Error::DanglingBlock(id))
    }

    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    pub fn ids(&self) -> impl Iterator<Item = BlockId> {
        (0..self.blocks.len()).map(BlockId)
    }

    /// Blocks nobody falls or branches into.
    pub fn roots(&self) -> Vec<BlockId> {
        self.ids()
            .filter(|id| self.blocks[id.0].precede().is_empty())
            .collect()
    }

    /// `root` and every block reachable from it, in arena order.
    pub fn reachable(&self, root: BlockId) -> Vec<BlockId> {
        let mut visited = HashSet::from([root]);
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            for &follow in self.blocks[id.0].follow() {
                if visited.insert(follow) {
                    stack.push(follow);
                }
            }
        }

        let mut reachable: Vec<_> = visited.into_iter().collect();
        reachable.sort();
        reachable
    }

    /// Checks that every edge and every block an instruction names exists.
    pub fn validate(&self) -> Result<(), Error> {
        for block in &self.blocks {
            for &id in block.follow().iter().chain(block.precede()) {
                self.get(id)?;
            }
            for instruction in block.instructions() {
                for id in instruction.kind().blocks() {
                    self.get(id)?;
                }
            }
        }
        Ok(())
    }

    /// Gives branch targets their start labels and loop tails their back
    /// branches.
    pub fn label_blocks(&mut self) -> Result<(), Error> {
        self.validate()?;

        let markers: Vec<InstructionKind> = self
            .blocks
            .iter()
            .flat_map(|block| block.instructions())
            .map(|instruction| instruction.kind())
            .filter(|kind| !kind.blocks().is_empty())
            .cloned()
            .collect();

        for kind in markers {
            match kind {
                InstructionKind::If {
                    then_block,
                    else_block,
                    end_block,
                    ..
                } => {
                    let end_label = self.new_label("end_if");
                    self.blocks[end_block.0].set_start_label(end_label.clone());
                    if let Some(else_block) = else_block {
                        let else_label = self.new_label("else");
                        self.blocks[else_block.0].set_start_label(else_label);
                        self.blocks[then_block.0].set_branch_label(end_label);
                    }
                }
                InstructionKind::While {
                    cond_block,
                    end_block,
                    next_block,
                    ..
                } => self.label_loop(cond_block, end_block, next_block, "while", "end_while"),
                InstructionKind::For {
                    cond_block,
                    end_block,
                    next_block,
                    ..
                } => self.label_loop(cond_block, end_block, next_block, "for_cond", "end_for"),
                InstructionKind::DoWhile {
                    do_block,
                    next_block,
                    ..
                } => {
                    let do_label = self.new_label("do");
                    self.blocks[do_block.0].set_start_label(do_label);
                    let next_label = self.new_label("end_while");
                    self.blocks[next_block.0].set_start_label(next_label);
                }
                InstructionKind::FunctionDeclare { name, body_block } => {
                    self.blocks[body_block.0].set_start_label(Label::new(format!("func_{}", name)));
                }
                _ => {}
            }
        }

        Ok(())
    }

    fn label_loop(
        &mut self,
        cond_block: BlockId,
        end_block: BlockId,
        next_block: BlockId,
        cond_suffix: &str,
        next_suffix: &str,
    ) {
        let cond_label = self.new_label(cond_suffix);
        self.blocks[cond_block.0].set_start_label(cond_label.clone());
        self.blocks[end_block.0].set_branch_label(cond_label);
        let next_label = self.new_label(next_suffix);
        self.blocks[next_block.0].set_start_label(next_label);
    }

    /// Graphviz rendering of the control-flow graph.
    pub fn to_dot(&self) -> String {
        let mut dot = String::from("digraph program {\n    node [shape=rectangle];\n");
        for (id, block) in self.ids().zip(&self.blocks) {
            let body: String = block
                .instructions()
                .iter()
                .map(|instruction| format!("{}\\l", instruction).replace('"', "\\\""))
                .collect();
            dot.push_str(&format!("    {} [label=\"{}\\n{}\"];\n", id, id, body));
            for follow in block.follow() {
                dot.push_str(&format!("    {} -> {};\n", id, follow));
            }
        }
        dot.push_str("}\n");
        dot
    }
}

impl Index<BlockId> for Program {
    type Output = BasicBlock;

    fn index(&self, id: BlockId) -> &Self::Output {
        &self.blocks[id.0]
    }
}

impl Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (id, block) in self.ids().zip(&self.blocks) {
            writeln!(f, "--------------------- {}", id)?;
            write!(f, "{}", block)?;
        }
        Ok(())
    }
}

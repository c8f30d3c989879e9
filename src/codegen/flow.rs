use std::collections::{HashMap, HashSet};

use crate::ir::{BlockId, Error, Program};

use super::graph::{Graph, ID};

/// Control flow between the non-empty blocks of one function.
///
/// Empty blocks (placeholders that only carry a label) are not nodes: an edge
/// into one is redirected to every non-empty block reachable through it.
pub struct FlowGraph {
    graph: Graph<BlockId>,
    block2id: HashMap<BlockId, ID>,
}

impl FlowGraph {
    pub fn convert(program: &Program, blocks: &[BlockId]) -> Result<Self, Error> {
        let mut flow = FlowGraph {
            graph: Graph::with_capacity(blocks.len()),
            block2id: HashMap::new(),
        };

        for &block in blocks {
            if !program.get(block)?.is_empty() {
                let id = flow.graph.insert(block);
                flow.block2id.insert(block, id);
            }
        }

        for node in 0..flow.graph.len() {
            let from = flow.graph.nodes()[node].id();
            let block = *flow.graph.get(from).val();
            for succ in real_successors(program, block)? {
                let to = *flow.block2id.get(&succ).ok_or(Error::DanglingBlock(succ))?;
                flow.graph.link(from, to);
            }
        }

        Ok(flow)
    }

    /// Non-empty blocks in arena order.
    pub fn blocks(&self) -> impl DoubleEndedIterator<Item = BlockId> + '_ {
        self.graph.nodes().iter().map(|node| *node.val())
    }

    pub fn succ(&self, block: BlockId) -> impl Iterator<Item = BlockId> + '_ {
        self.block2id
            .get(&block)
            .into_iter()
            .flat_map(|&id| self.graph.succ(id))
            .map(|id| *self.graph.get(id).val())
    }
}

/// Successors of `block` with empty blocks skipped. The visited set keeps a
/// cycle of empty blocks from looping forever.
fn real_successors(program: &Program, block: BlockId) -> Result<Vec<BlockId>, Error> {
    let mut candidates: Vec<BlockId> = program.get(block)?.follow().to_vec();
    let mut visited = HashSet::new();
    let mut real = Vec::new();

    while let Some(candidate) = candidates.pop() {
        if !visited.insert(candidate) {
            continue;
        }
        let candidate_block = program.get(candidate)?;
        if candidate_block.is_empty() {
            candidates.extend(
                candidate_block
                    .follow()
                    .iter()
                    .filter(|follow| !visited.contains(*follow)),
            );
        } else {
            real.push(candidate);
        }
    }

    Ok(real)
}

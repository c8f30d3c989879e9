use std::{collections::HashSet, rc::Rc};

use log::debug;

use crate::{
    common::Variable,
    frame::{Frame, Palette, RegisterMap},
    ir::{BlockId, Program},
};

use super::{
    color::{self, Coloring},
    flow::FlowGraph,
    liveness::{self, LiveGraph},
    spill, Error,
};

/// What allocating one function took.
#[derive(Debug)]
pub struct AllocationReport {
    pub root: BlockId,
    /// Colouring attempts, including the successful one.
    pub attempts: usize,
    /// Spilled variables in the order they were spilled.
    pub spilled: Vec<Variable>,
    pub frame_size: u32,
    pub registers: Rc<RegisterMap>,
    /// Interference graph of the successful attempt.
    pub graph: LiveGraph,
}

/// Allocates registers for the function rooted at `root`, spilling until the
/// interference graph can be coloured, then attaches the resulting
/// [`RegisterMap`] to every instruction of the function.
pub fn alloc(
    program: &mut Program,
    root: BlockId,
    palette: &Palette,
) -> Result<AllocationReport, Error> {
    let blocks = program.reachable(root);
    let flow_graph = FlowGraph::convert(program, &blocks)?;

    let mut frame = Frame::new();
    let mut spilled = HashSet::new();
    let mut spill_order = Vec::new();

    let max_attempts = count_variables(program, &blocks)? + 1;
    for attempt in 1..=max_attempts {
        let (interference, usage) = liveness::analyze(program, &flow_graph)?;
        debug!(
            "{}: attempt {} with {} variables",
            root,
            attempt,
            interference.len()
        );

        match color::color(&interference, palette, &usage, &spilled)? {
            Coloring::Colored(colors) => {
                let registers = Rc::new(RegisterMap::new(colors, frame.size()));
                for &block in &blocks {
                    for instruction in program.get_mut(block)?.instructions_mut() {
                        instruction.set_register_map(Rc::clone(&registers));
                    }
                }

                debug!(
                    "{}: coloured after {} attempts, frame size {}",
                    root,
                    attempt,
                    frame.size()
                );
                return Ok(AllocationReport {
                    root,
                    attempts: attempt,
                    spilled: spill_order,
                    frame_size: frame.size(),
                    registers,
                    graph: interference,
                });
            }
            Coloring::Spill(variable) => {
                spill::spill(program, &blocks, &variable, &mut frame, &mut spilled)?;
                spill_order.push(variable);
            }
        }
    }

    Err(Error::NoProgress {
        root,
        attempts: max_attempts,
    })
}

fn count_variables(program: &Program, blocks: &[BlockId]) -> Result<usize, Error> {
    let mut variables = HashSet::new();
    for &block in blocks {
        for instruction in program.get(block)?.instructions() {
            variables.extend(instruction.defined().iter());
            variables.extend(instruction.used().iter());
        }
    }
    Ok(variables.len())
}

use std::collections::HashSet;

use log::debug;

use crate::{
    common::Variable,
    frame::Frame,
    ir::{Address, BlockId, Instruction, Program},
};

use super::Error;

/// Moves `variable` to a fresh stack slot: every definition is followed by a
/// store to the slot and every use is preceded by a load from it.
///
/// Returns the slot offset. `spilled` is shared by every attempt of one
/// function and is never cleared, so the same variable cannot be picked twice.
pub fn spill(
    program: &mut Program,
    blocks: &[BlockId],
    variable: &Variable,
    frame: &mut Frame,
    spilled: &mut HashSet<Variable>,
) -> Result<i32, Error> {
    if spilled.contains(variable) {
        return Err(Error::AlreadySpilled(variable.clone()));
    }

    let offset = frame.alloc_spill();
    let mut loads = 0;
    let mut stores = 0;

    for &block in blocks {
        let instructions = program.get_mut(block)?.instructions_mut();
        let old = std::mem::take(instructions);
        for instruction in old {
            let uses = instruction.used().contains(variable);
            let defines = instruction.defined().contains(variable);

            if uses {
                instructions.push(Instruction::load(variable.clone(), Address::stack(offset)));
                loads += 1;
            }
            instructions.push(instruction);
            if defines {
                instructions.push(Instruction::store(variable, Address::stack(offset)));
                stores += 1;
            }
        }
    }

    debug!(
        "spilled {} to @stack[{}] ({} loads, {} stores)",
        variable, offset, loads, stores
    );
    spilled.insert(variable.clone());
    Ok(offset)
}

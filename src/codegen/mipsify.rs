use crate::ir::{BlockId, Error, Program};

/// Rewrites binary operations so that both operands are variables, the only
/// form a three-register arithmetic instruction accepts.
pub fn mipsify(program: &mut Program, blocks: &[BlockId]) -> Result<usize, Error> {
    let mut hoisted = 0;
    for &block in blocks {
        let old = std::mem::take(program.get_mut(block)?.instructions_mut());
        let mut instructions = Vec::with_capacity(old.len());
        for mut instruction in old {
            let before = instruction.hoist_binary_constants(program.names_mut());
            hoisted += before.len();
            instructions.extend(before);
            instructions.push(instruction);
        }
        *program.get_mut(block)?.instructions_mut() = instructions;
    }
    Ok(hoisted)
}

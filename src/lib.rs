//! Register allocation for a small three-address IR: liveliness analysis over
//! a control-flow graph of basic blocks, interference graph construction and
//! graph colouring with spill-and-retry.

pub mod codegen;
pub mod common;
pub mod frame;
pub mod ir;

use log::debug;
use thiserror::Error;

pub use codegen::AllocationReport;
pub use common::{Label, NameGen, Variable};
pub use frame::{Palette, Register, RegisterMap};
pub use ir::{Address, BasicBlock, BlockId, Instruction, InstructionKind, Operand, Program};

/// Normalises operands once, then allocates every function of `program`
/// independently. Each instruction ends up carrying the register map of the
/// function it belongs to.
pub fn registerize(
    program: &mut Program,
    palette: &Palette,
) -> Result<Vec<AllocationReport>, Error> {
    program.validate()?;

    let all: Vec<_> = program.ids().collect();
    let hoisted = codegen::mipsify(program, &all)?;
    debug!("hoisted {} constant operands", hoisted);

    let mut reports = Vec::new();
    for root in program.roots() {
        reports.push(codegen::alloc(program, root, palette)?);
    }
    Ok(reports)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("{0}")]
    IrError(#[from] ir::Error),

    #[error("{0}")]
    FrameError(#[from] frame::Error),

    #[error("{0}")]
    CodegenError(#[from] codegen::Error),
}

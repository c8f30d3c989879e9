use thiserror::Error;

use crate::{common::Variable, ir::BlockId};

pub mod color;
pub mod flow;
mod graph;
pub mod liveness;
mod mipsify;
pub mod reg_alloc;
mod spill;

pub use graph::{Graph, Node, ID};
pub use mipsify::mipsify;
pub use reg_alloc::{alloc, AllocationReport};
pub use spill::spill;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("the register palette is empty")]
    EmptyPalette,

    #[error("`{0}` interferes with itself")]
    SelfInterference(Variable),

    #[error("`{0}` has already been spilled")]
    AlreadySpilled(Variable),

    #[error("no unspilled variable left to make room for `{0}`")]
    NoSpillCandidate(Variable),

    #[error("allocation of the function at {root} made no progress after {attempts} attempts")]
    NoProgress { root: BlockId, attempts: usize },

    #[error("{0}")]
    Ir(#[from] crate::ir::Error),
}
